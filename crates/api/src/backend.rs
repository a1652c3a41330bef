// Path: crates/api/src/backend.rs
//! Contract for durable, content-addressed node storage.
//!
//! A backend persists three things: node records keyed by digest, the
//! version → root-digest bindings, and the orphan ledger that makes
//! pruning safe. The versioned store drives it through atomic
//! [`CommitBatch`]es; everything else is bookkeeping reads.

use arbor_types::{NodeHash, Version};
use parity_scale_codec::{Decode, Encode};
use std::collections::BTreeMap;
use thiserror::Error;

/// Represents errors that can occur within the durable storage layer.
#[derive(Debug, Error)]
pub enum StorageError {
    /// A generic error originating from the underlying store (e.g. redb).
    #[error("backend error: {0}")]
    Backend(String),
    /// Stored bytes could not be decoded into a node record.
    #[error("decode error: {0}")]
    Decode(String),
    /// The requested item was not found in the store.
    #[error("not found")]
    NotFound,
}

/// Wire form of a tree node as a backend stores it.
///
/// Digests are not stored: the store re-derives a loaded record's digest
/// and checks it against the hash the record was requested under.
#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode)]
pub enum NodeRecord {
    /// Terminal node carrying a user key/value pair.
    Leaf {
        /// User key.
        key: Vec<u8>,
        /// Opaque value bytes.
        value: Vec<u8>,
        /// Version at which the leaf was created.
        version: Version,
    },
    /// Two-child branch node.
    Inner {
        /// Minimum key of the right subtree.
        key: Vec<u8>,
        /// One more than the taller child's height.
        height: i8,
        /// Number of leaves beneath this node.
        size: u64,
        /// Version at which the node was created.
        version: Version,
        /// Digest of the left child.
        left: NodeHash,
        /// Digest of the right child.
        right: NodeHash,
    },
}

impl NodeRecord {
    /// Version at which the recorded node was created.
    pub fn version(&self) -> Version {
        match self {
            NodeRecord::Leaf { version, .. } | NodeRecord::Inner { version, .. } => *version,
        }
    }
}

/// An orphaned node: created at `birth`, displaced at `until`.
///
/// The node is reachable from the committed roots of versions in
/// `[birth, until)` and from nothing newer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrphanRecord {
    /// Digest of the orphaned node.
    pub hash: NodeHash,
    /// Version that created the node.
    pub birth: Version,
    /// Version at which it became unreachable.
    pub until: Version,
}

/// Everything a backend must persist, atomically, for one committed
/// version.
pub struct CommitBatch<'a> {
    /// The version being committed.
    pub version: Version,
    /// Digest of the committed root node.
    pub root: NodeHash,
    /// Nodes created by this version.
    pub new_nodes: &'a [(NodeHash, NodeRecord)],
    /// Nodes this version displaced, with their birth versions.
    pub orphans: &'a [(NodeHash, Version)],
}

/// Contains statistics about a completed pruning operation.
#[derive(Debug, Default, Clone, Copy)]
pub struct PruneStats {
    /// The number of version bindings that were removed.
    pub versions_pruned: usize,
    /// The number of nodes that were garbage collected.
    pub nodes_deleted: usize,
}

/// A durable, content-addressed store for tree nodes and version roots.
///
/// Implementations must make [`NodeBackend::commit`] atomic: either the
/// whole batch is visible after a crash or none of it is.
pub trait NodeBackend: Send + Sync {
    /// Load a node record by digest.
    fn node(&self, hash: &NodeHash) -> Result<Option<NodeRecord>, StorageError>;

    /// All committed version → root-digest bindings, in version order.
    fn roots(&self) -> Result<BTreeMap<Version, NodeHash>, StorageError>;

    /// Atomically persist one committed version.
    fn commit(&self, batch: &CommitBatch<'_>) -> Result<(), StorageError>;

    /// Remove every version binding at or above `version`, every node
    /// born at or above it, and every orphan record whose displacement
    /// version is at or above it (those nodes are reachable again).
    fn delete_from(&self, version: Version) -> Result<(), StorageError>;

    /// Orphan records wholly contained in `[lo, hi]`: birth at or above
    /// `lo` and displacement at or below `hi`. Exactly the nodes that can
    /// be deleted if every version in the range is dropped.
    fn orphans_in(&self, lo: Version, hi: Version) -> Result<Vec<OrphanRecord>, StorageError>;

    /// Drop the version bindings in `[lo, hi]` together with every node
    /// `orphans_in(lo, hi)` reports.
    fn prune(&self, lo: Version, hi: Version) -> Result<PruneStats, StorageError>;
}
