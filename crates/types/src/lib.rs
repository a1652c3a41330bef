// Path: crates/types/src/lib.rs
#![forbid(unsafe_code)]
//! Core types shared across the arbor state store.

pub mod error;

use parity_scale_codec::{Decode, Encode};

/// Identifier of a committed snapshot. Monotonically increasing; the
/// working (uncommitted) tree is always at the latest version + 1.
pub type Version = i64;

/// A user key. Keys compare lexicographically and are unique within a
/// single version.
pub type Key = Vec<u8>;

/// An opaque user value.
pub type Value = Vec<u8>;

/// A 32-byte content-addressed digest of a tree node's canonical form.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Encode, Decode)]
pub struct NodeHash(pub [u8; 32]);

impl NodeHash {
    /// The digest as a byte slice.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl std::fmt::Debug for NodeHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "NodeHash({})", hex::encode(self.0))
    }
}

impl std::fmt::Display for NodeHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl From<[u8; 32]> for NodeHash {
    fn from(bytes: [u8; 32]) -> Self {
        NodeHash(bytes)
    }
}

impl AsRef<[u8]> for NodeHash {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}
