// Path: crates/state/src/tree/avl/store.rs
//! The versioned node store.
//!
//! A [`NodeStore`] owns the working tree and the version history on top
//! of a [`NodeBackend`]. Mutations stage freshly built nodes and record
//! displaced ones; `commit` turns the staged state into an atomic batch,
//! binds the working root to the working version, and advances it.
//! Committed nodes are shared through an internally synchronized
//! digest → node cache, so concurrent readers of committed versions never
//! see a node mutate.

use super::node::Node;
use super::ops;
use arbor_api::backend::{
    CommitBatch, NodeBackend, NodeRecord, OrphanRecord, PruneStats, StorageError,
};
use arbor_api::hash::{Sha256TreeHasher, TreeHasher};
use arbor_types::error::TreeError;
use arbor_types::{NodeHash, Version};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

/// Versioned container binding tree algorithms to a backend.
pub struct NodeStore<B: NodeBackend, H: TreeHasher = Sha256TreeHasher> {
    backend: B,
    hasher: H,
    /// Committed version → root digest.
    roots: BTreeMap<Version, NodeHash>,
    working_version: Version,
    working_root: Arc<Node>,
    /// Nodes created in the current working cycle, keyed by digest.
    pending: BTreeMap<NodeHash, Arc<Node>>,
    /// Committed nodes displaced in the current working cycle, with their
    /// birth versions.
    pending_orphans: BTreeMap<NodeHash, Version>,
    /// Shared digest → node cache over committed nodes.
    cache: Mutex<HashMap<NodeHash, Arc<Node>>>,
    empty: Arc<Node>,
}

fn storage_err(err: StorageError) -> TreeError {
    TreeError::Storage(err.to_string())
}

impl<B: NodeBackend, H: TreeHasher> NodeStore<B, H> {
    /// Open a store over `backend`. A fresh backend gets version 0 bound
    /// to the empty root; an existing one resumes with the working tree
    /// at its latest committed root.
    pub fn open(backend: B, hasher: H) -> Result<Self, TreeError> {
        let empty = Arc::new(Node::empty(&hasher));
        let mut roots = backend.roots().map_err(storage_err)?;
        if roots.is_empty() {
            let batch = CommitBatch {
                version: 0,
                root: *empty.hash(),
                new_nodes: &[],
                orphans: &[],
            };
            backend.commit(&batch).map_err(storage_err)?;
            roots.insert(0, *empty.hash());
        }
        let latest = roots.keys().next_back().copied().unwrap_or(0);
        let latest_root = roots.get(&latest).copied().unwrap_or(*empty.hash());

        let mut store = NodeStore {
            backend,
            hasher,
            roots,
            working_version: latest + 1,
            working_root: empty.clone(),
            pending: BTreeMap::new(),
            pending_orphans: BTreeMap::new(),
            cache: Mutex::new(HashMap::new()),
            empty,
        };
        store.working_root = store.resolve(&latest_root)?;
        Ok(store)
    }

    /// The hasher every node and proof of this store is built with.
    pub fn hasher(&self) -> &H {
        &self.hasher
    }

    /// The version the working tree will commit as.
    pub fn version(&self) -> Version {
        self.working_version
    }

    /// The newest committed version.
    pub fn latest_version(&self) -> Version {
        self.roots.keys().next_back().copied().unwrap_or(0)
    }

    /// All committed versions, ascending.
    pub fn versions(&self) -> Vec<Version> {
        self.roots.keys().copied().collect()
    }

    /// Digest of the newest committed root.
    pub fn latest_hash(&self) -> NodeHash {
        self.roots
            .values()
            .next_back()
            .copied()
            .unwrap_or(*self.empty.hash())
    }

    /// Digest of the working (uncommitted) root.
    pub fn working_hash(&self) -> NodeHash {
        *self.working_root.hash()
    }

    /// The working root node.
    pub fn working_root(&self) -> Arc<Node> {
        self.working_root.clone()
    }

    /// Root node of a committed version.
    pub fn root_at(&self, version: Version) -> Result<Arc<Node>, TreeError> {
        let hash = self
            .roots
            .get(&version)
            .copied()
            .ok_or(TreeError::VersionMissing(version))?;
        self.resolve(&hash)
    }

    /// Materialize a node by digest: staged nodes first, then the shared
    /// cache, then the backend. Loaded records are digest-checked before
    /// they are trusted.
    pub fn resolve(&self, hash: &NodeHash) -> Result<Arc<Node>, TreeError> {
        if hash == self.empty.hash() {
            return Ok(self.empty.clone());
        }
        if let Some(node) = self.pending.get(hash) {
            return Ok(node.clone());
        }
        {
            let cache = self
                .cache
                .lock()
                .map_err(|_| TreeError::Storage("node cache lock poisoned".into()))?;
            if let Some(node) = cache.get(hash) {
                return Ok(node.clone());
            }
        }
        let record = self
            .backend
            .node(hash)
            .map_err(storage_err)?
            .ok_or_else(|| TreeError::Corrupt(format!("missing node {}", hash)))?;
        let node = Arc::new(Node::from_record(record, &self.hasher));
        if node.hash() != hash {
            log::error!(
                "node loaded for {} hashes to {}",
                hash,
                node.hash()
            );
            return Err(TreeError::Corrupt(format!(
                "node {} fails its digest check",
                hash
            )));
        }
        let mut cache = self
            .cache
            .lock()
            .map_err(|_| TreeError::Storage("node cache lock poisoned".into()))?;
        cache.insert(*hash, node.clone());
        Ok(node)
    }

    /// The empty node singleton.
    pub(crate) fn empty_node(&self) -> Arc<Node> {
        self.empty.clone()
    }

    fn stage(&mut self, node: Node) -> Arc<Node> {
        let node = Arc::new(node);
        self.pending.insert(*node.hash(), node.clone());
        node
    }

    /// New leaf stamped with the working version.
    pub(crate) fn make_leaf(&mut self, key: &[u8], value: &[u8]) -> Arc<Node> {
        let node = Node::leaf(
            key.to_vec(),
            value.to_vec(),
            self.working_version,
            &self.hasher,
        );
        self.stage(node)
    }

    /// New inner node stamped with the working version.
    pub(crate) fn make_inner(&mut self, key: Vec<u8>, left: &Node, right: &Node) -> Arc<Node> {
        let node = Node::inner(key, left, right, self.working_version, &self.hasher);
        self.stage(node)
    }

    /// Account for a displaced node: forget it if it was created in this
    /// working cycle, otherwise record it as an orphan of the working
    /// version.
    pub(crate) fn drop_node(&mut self, node: &Node) {
        if node.is_empty() {
            return;
        }
        if node.version() == self.working_version {
            self.pending.remove(node.hash());
        } else {
            self.pending_orphans.insert(*node.hash(), node.version());
        }
    }

    /// Insert or update a key in the working tree. Returns whether an
    /// existing leaf was replaced.
    pub fn set(&mut self, key: &[u8], value: &[u8]) -> Result<bool, TreeError> {
        let root = self.working_root();
        let (new_root, updated) = ops::recursive_set(self, root, key, value)?;
        self.working_root = new_root;
        Ok(updated)
    }

    /// Remove a key from the working tree. Returns the removed value and
    /// whether anything was removed.
    pub fn remove(&mut self, key: &[u8]) -> Result<(Option<Vec<u8>>, bool), TreeError> {
        let root = self.working_root();
        let (new_root, _, value) = ops::recursive_remove(self, root, key)?;
        if value.is_none() {
            return Ok((None, false));
        }
        self.working_root = new_root.unwrap_or_else(|| self.empty_node());
        Ok((value, true))
    }

    /// Look up a key in the working tree: its in-order index (or the
    /// index it would take) and its value when present.
    pub fn get(&self, key: &[u8]) -> Result<(u64, Option<Vec<u8>>), TreeError> {
        ops::get_with_index(self, &self.working_root(), key)
    }

    /// Look up a key under a committed version.
    pub fn get_at(
        &self,
        key: &[u8],
        version: Version,
    ) -> Result<(u64, Option<Vec<u8>>), TreeError> {
        let root = self.root_at(version)?;
        ops::get_with_index(self, &root, key)
    }

    /// The key/value at an in-order position of the working tree.
    pub fn get_by_index(&self, index: u64) -> Result<Option<(Vec<u8>, Vec<u8>)>, TreeError> {
        ops::get_by_index(self, &self.working_root(), index)
    }

    /// Whether the working tree holds `key`.
    pub fn has(&self, key: &[u8]) -> Result<bool, TreeError> {
        Ok(self.get(key)?.1.is_some())
    }

    /// Smallest key of the working tree strictly greater than `key`.
    pub fn next_key(&self, key: &[u8]) -> Result<Option<Vec<u8>>, TreeError> {
        ops::next_key(self, &self.working_root(), key)
    }

    /// Finalize the working tree as the working version and start the
    /// next cycle from it.
    pub fn commit(&mut self) -> Result<(NodeHash, Version), TreeError> {
        let version = self.working_version;
        let root = *self.working_root.hash();
        let new_nodes: Vec<(NodeHash, NodeRecord)> = self
            .pending
            .values()
            .filter_map(|node| node.to_record().map(|record| (*node.hash(), record)))
            .collect();
        let orphans: Vec<(NodeHash, Version)> = self
            .pending_orphans
            .iter()
            .map(|(hash, birth)| (*hash, *birth))
            .collect();
        let batch = CommitBatch {
            version,
            root,
            new_nodes: &new_nodes,
            orphans: &orphans,
        };
        self.backend.commit(&batch).map_err(storage_err)?;

        {
            let mut cache = self
                .cache
                .lock()
                .map_err(|_| TreeError::Storage("node cache lock poisoned".into()))?;
            for (hash, node) in std::mem::take(&mut self.pending) {
                cache.insert(hash, node);
            }
        }
        self.pending_orphans.clear();
        self.roots.insert(version, root);
        self.working_version = version + 1;
        log::debug!(
            "committed version {} with {} new nodes, root {}",
            version,
            new_nodes.len(),
            root
        );
        Ok((root, version))
    }

    /// Discard every mutation since the last commit.
    pub fn rollback(&mut self) -> Result<(), TreeError> {
        self.pending.clear();
        self.pending_orphans.clear();
        self.working_root = self.root_at(self.latest_version())?;
        Ok(())
    }

    /// Remove the newest committed version. The initial empty version 0
    /// cannot be deleted.
    pub fn delete_last(&mut self) -> Result<(), TreeError> {
        self.delete_all(self.latest_version())
    }

    /// Remove every committed version at or above `from`; the working
    /// version becomes `from`, rooted at the newest version before it.
    pub fn delete_all(&mut self, from: Version) -> Result<(), TreeError> {
        if from < 1 || from > self.latest_version() {
            return Err(TreeError::VersionMissing(from));
        }
        // The surviving base may sit below from - 1 when older versions
        // were pruned; resolve it before touching anything.
        let base = self
            .roots
            .range(..from)
            .next_back()
            .map(|(_, hash)| *hash)
            .ok_or(TreeError::VersionMissing(from))?;
        let base_root = self.resolve(&base)?;

        self.backend.delete_from(from).map_err(storage_err)?;
        self.roots.split_off(&from);
        self.pending.clear();
        self.pending_orphans.clear();
        {
            let mut cache = self
                .cache
                .lock()
                .map_err(|_| TreeError::Storage("node cache lock poisoned".into()))?;
            cache.retain(|_, node| node.version() < from);
        }
        self.working_version = from;
        self.working_root = base_root;
        log::debug!("deleted versions >= {}", from);
        Ok(())
    }

    /// Nodes that can be deleted if every version in `[lo, hi]` is
    /// dropped: born at or after `lo`, unreachable at or before `hi`.
    pub fn prunable(&self, lo: Version, hi: Version) -> Result<Vec<NodeHash>, TreeError> {
        let orphans = self.backend.orphans_in(lo, hi).map_err(storage_err)?;
        Ok(orphans.into_iter().map(|o| o.hash).collect())
    }

    /// Drop the versions in `[lo, hi]` and garbage-collect the nodes only
    /// they kept alive. The newest committed version cannot be pruned.
    pub fn prune(&mut self, lo: Version, hi: Version) -> Result<PruneStats, TreeError> {
        if lo > hi || hi >= self.latest_version() {
            return Err(TreeError::InvalidRange);
        }
        let stats = self.backend.prune(lo, hi).map_err(storage_err)?;
        let doomed: Vec<Version> = self
            .roots
            .range(lo..=hi)
            .map(|(version, _)| *version)
            .collect();
        for version in doomed {
            self.roots.remove(&version);
        }
        log::debug!(
            "pruned versions {}..={}: {} nodes deleted",
            lo,
            hi,
            stats.nodes_deleted
        );
        Ok(stats)
    }

    /// The orphan ledger entries wholly contained in `[lo, hi]`.
    pub fn orphans_in(&self, lo: Version, hi: Version) -> Result<Vec<OrphanRecord>, TreeError> {
        self.backend.orphans_in(lo, hi).map_err(storage_err)
    }
}

/// In-process backend holding the node arena, roots, and orphan ledger
/// in maps.
#[derive(Default)]
pub struct MemoryBackend {
    state: Mutex<MemoryState>,
}

#[derive(Default)]
struct MemoryState {
    nodes: HashMap<NodeHash, NodeRecord>,
    roots: BTreeMap<Version, NodeHash>,
    /// hash → (birth, until).
    orphans: HashMap<NodeHash, (Version, Version)>,
}

impl MemoryBackend {
    /// A fresh, empty backend.
    pub fn new() -> Self {
        Self::default()
    }

    fn locked(&self) -> Result<std::sync::MutexGuard<'_, MemoryState>, StorageError> {
        self.state
            .lock()
            .map_err(|_| StorageError::Backend("memory backend lock poisoned".into()))
    }
}

impl NodeBackend for MemoryBackend {
    fn node(&self, hash: &NodeHash) -> Result<Option<NodeRecord>, StorageError> {
        Ok(self.locked()?.nodes.get(hash).cloned())
    }

    fn roots(&self) -> Result<BTreeMap<Version, NodeHash>, StorageError> {
        Ok(self.locked()?.roots.clone())
    }

    fn commit(&self, batch: &CommitBatch<'_>) -> Result<(), StorageError> {
        let mut state = self.locked()?;
        for (hash, record) in batch.new_nodes {
            state.nodes.insert(*hash, record.clone());
        }
        for (hash, birth) in batch.orphans {
            state.orphans.insert(*hash, (*birth, batch.version));
        }
        state.roots.insert(batch.version, batch.root);
        Ok(())
    }

    fn delete_from(&self, version: Version) -> Result<(), StorageError> {
        let mut state = self.locked()?;
        state.roots.split_off(&version);
        state.orphans.retain(|_, entry| entry.1 < version);
        state.nodes.retain(|_, record| record.version() < version);
        Ok(())
    }

    fn orphans_in(&self, lo: Version, hi: Version) -> Result<Vec<OrphanRecord>, StorageError> {
        let state = self.locked()?;
        let mut found: Vec<OrphanRecord> = state
            .orphans
            .iter()
            .filter(|(_, (birth, until))| *birth >= lo && *until <= hi)
            .map(|(hash, (birth, until))| OrphanRecord {
                hash: *hash,
                birth: *birth,
                until: *until,
            })
            .collect();
        found.sort_by_key(|o| (o.until, o.hash));
        Ok(found)
    }

    fn prune(&self, lo: Version, hi: Version) -> Result<PruneStats, StorageError> {
        let mut state = self.locked()?;
        let doomed: Vec<NodeHash> = state
            .orphans
            .iter()
            .filter(|(_, (birth, until))| *birth >= lo && *until <= hi)
            .map(|(hash, _)| *hash)
            .collect();
        for hash in &doomed {
            state.nodes.remove(hash);
            state.orphans.remove(hash);
        }
        let versions: Vec<Version> = state
            .roots
            .range(lo..=hi)
            .map(|(version, _)| *version)
            .collect();
        for version in &versions {
            state.roots.remove(version);
        }
        Ok(PruneStats {
            versions_pruned: versions.len(),
            nodes_deleted: doomed.len(),
        })
    }
}
