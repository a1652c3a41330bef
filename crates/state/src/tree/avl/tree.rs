// Path: crates/state/src/tree/avl/tree.rs
use super::proof::RangeProof;
use super::proof_builder;
use super::store::{MemoryBackend, NodeStore};
use super::{ops, Node};
use arbor_api::backend::NodeBackend;
use arbor_api::hash::{Sha256TreeHasher, TreeHasher};
use arbor_types::error::TreeError;
use arbor_types::{NodeHash, Version};
use std::sync::Arc;

/// User-facing handle binding a node store to the tree operation verbs.
/// Every method is a direct translation into store operations; the
/// facade carries no state of its own.
pub struct Tree<B: NodeBackend, H: TreeHasher = Sha256TreeHasher> {
    store: NodeStore<B, H>,
}

impl Tree<MemoryBackend> {
    /// A fresh tree over the in-memory backend with the default hasher.
    pub fn in_memory() -> Result<Self, TreeError> {
        Tree::open(MemoryBackend::new(), Sha256TreeHasher)
    }
}

impl<B: NodeBackend, H: TreeHasher> Tree<B, H> {
    /// Open a tree over `backend`, resuming any committed history it
    /// holds.
    pub fn open(backend: B, hasher: H) -> Result<Self, TreeError> {
        Ok(Tree {
            store: NodeStore::open(backend, hasher)?,
        })
    }

    /// The underlying versioned store.
    pub fn store(&self) -> &NodeStore<B, H> {
        &self.store
    }

    /// Mutable access to the underlying store, e.g. for pruning.
    pub fn store_mut(&mut self) -> &mut NodeStore<B, H> {
        &mut self.store
    }

    /// Insert or update a key in the working tree.
    pub fn set(&mut self, key: &[u8], value: &[u8]) -> Result<bool, TreeError> {
        self.store.set(key, value)
    }

    /// Remove a key from the working tree.
    pub fn remove(&mut self, key: &[u8]) -> Result<(Option<Vec<u8>>, bool), TreeError> {
        self.store.remove(key)
    }

    /// Look up a key in the working tree: its in-order index (or the one
    /// it would take) and its value when present.
    pub fn get(&self, key: &[u8]) -> Result<(u64, Option<Vec<u8>>), TreeError> {
        self.store.get(key)
    }

    /// The key/value at an in-order position of the working tree.
    pub fn get_by_index(&self, index: u64) -> Result<Option<(Vec<u8>, Vec<u8>)>, TreeError> {
        self.store.get_by_index(index)
    }

    /// Whether the working tree holds `key`.
    pub fn has(&self, key: &[u8]) -> Result<bool, TreeError> {
        self.store.has(key)
    }

    /// Smallest key strictly greater than `key` in the working tree.
    pub fn next_key(&self, key: &[u8]) -> Result<Option<Vec<u8>>, TreeError> {
        self.store.next_key(key)
    }

    /// Number of leaves in the working tree.
    pub fn size(&self) -> u64 {
        self.store.working_root().size()
    }

    /// Height of the working tree.
    pub fn height(&self) -> i8 {
        self.store.working_root().height()
    }

    /// Digest of the newest committed root.
    pub fn hash(&self) -> NodeHash {
        self.store.latest_hash()
    }

    /// Digest of the working (uncommitted) root.
    pub fn working_hash(&self) -> NodeHash {
        self.store.working_hash()
    }

    /// In-order traversal of the working tree; the callback returns
    /// `true` to stop early.
    pub fn iterate<F>(&self, ascending: bool, mut f: F) -> Result<bool, TreeError>
    where
        F: FnMut(&[u8], &[u8]) -> bool,
    {
        let root = self.store.working_root();
        ops::iterate(&self.store, &root, ascending, &mut f)
    }

    /// Traversal of the working tree restricted to `start ≤ key < end`
    /// (`≤ end` when `inclusive`); either bound may be absent.
    pub fn iterate_range<F>(
        &self,
        start: Option<&[u8]>,
        end: Option<&[u8]>,
        ascending: bool,
        inclusive: bool,
        mut f: F,
    ) -> Result<bool, TreeError>
    where
        F: FnMut(&[u8], &[u8]) -> bool,
    {
        if let (Some(s), Some(e)) = (start, end) {
            if s >= e {
                return Err(TreeError::InvalidRange);
            }
        }
        let root = self.store.working_root();
        ops::iterate_range(&self.store, &root, start, end, ascending, inclusive, &mut f)
    }

    /// Commit the working tree, binding its root to the working version.
    pub fn commit(&mut self) -> Result<(NodeHash, Version), TreeError> {
        self.store.commit()
    }

    /// Discard every mutation since the last commit.
    pub fn rollback(&mut self) -> Result<(), TreeError> {
        self.store.rollback()
    }

    /// All committed versions, ascending.
    pub fn versions(&self) -> Vec<Version> {
        self.store.versions()
    }

    /// The version the working tree will commit as.
    pub fn version(&self) -> Version {
        self.store.version()
    }

    /// Look up a key under a committed version.
    pub fn get_versioned(
        &self,
        key: &[u8],
        version: Version,
    ) -> Result<(u64, Option<Vec<u8>>), TreeError> {
        self.store.get_at(key, version)
    }

    /// Value and existence-or-absence proof for a key under the newest
    /// committed version.
    pub fn get_with_proof(&self, key: &[u8]) -> Result<(Option<Vec<u8>>, RangeProof), TreeError> {
        self.get_versioned_with_proof(key, self.store.latest_version())
    }

    /// Value and existence-or-absence proof for a key under a committed
    /// version.
    pub fn get_versioned_with_proof(
        &self,
        key: &[u8],
        version: Version,
    ) -> Result<(Option<Vec<u8>>, RangeProof), TreeError> {
        let root = self.store.root_at(version)?;
        proof_builder::proof_of_key(&self.store, &root, key)
    }

    /// Keys, values, and proof for `[start, end)` under a committed
    /// version, truncated to `limit` leaves (0 = unlimited).
    #[allow(clippy::type_complexity)]
    pub fn get_versioned_range_with_proof(
        &self,
        start: Option<&[u8]>,
        end: Option<&[u8]>,
        limit: usize,
        version: Version,
    ) -> Result<(Vec<Vec<u8>>, Vec<Vec<u8>>, RangeProof), TreeError> {
        let root = self.store.root_at(version)?;
        let (proof, keys, values) = proof_builder::range_proof(&self.store, &root, start, end, limit)?;
        Ok((keys, values, proof))
    }

    /// Remove the newest committed version.
    pub fn delete_last(&mut self) -> Result<(), TreeError> {
        self.store.delete_last()
    }

    /// Remove every committed version at or above `from`.
    pub fn delete_all(&mut self, from: Version) -> Result<(), TreeError> {
        self.store.delete_all(from)
    }

    /// Root node of a committed version.
    pub fn root_at(&self, version: Version) -> Result<Arc<Node>, TreeError> {
        self.store.root_at(version)
    }
}
