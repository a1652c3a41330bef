// Path: crates/api/src/lib.rs
#![forbid(unsafe_code)]
#![deny(missing_docs)]
//! # Arbor API
//!
//! Stable contracts for the arbor state store: the canonical digest
//! construction every node and proof shares, and the persistence
//! interface a durable backend must satisfy.

pub mod backend;
pub mod hash;

/// A curated set of the most commonly used traits and types.
pub mod prelude {
    pub use crate::backend::{CommitBatch, NodeBackend, NodeRecord, StorageError};
    pub use crate::hash::{Sha256TreeHasher, TreeHasher};
}
