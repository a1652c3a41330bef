// Path: crates/api/src/hash.rs
//! Canonical digest construction for tree nodes.
//!
//! The leaf and inner pre-images are fixed here so that every hasher, and
//! every remote verifier, binds the same structure: a one-byte tag or
//! height, LEB128 varints for size and version, and varint
//! length-prefixed digests. The version is part of every pre-image so
//! that re-committing identical content under a new version yields a new
//! root.

use arbor_types::{NodeHash, Version};
use prost::encoding::encode_varint;
use sha2::{Digest, Sha256};

/// Number of bytes in every node digest.
pub const DIGEST_SIZE: usize = 32;

/// Appends the unsigned LEB128 encoding of `value`. Negative versions go
/// through their two's-complement bit pattern, which is what the wire
/// format requires.
fn put_varint(value: u64, out: &mut Vec<u8>) {
    encode_varint(value, out);
}

/// Appends `bytes` preceded by a varint length delimiter.
fn put_length_prefixed(bytes: &[u8], out: &mut Vec<u8>) {
    encode_varint(bytes.len() as u64, out);
    out.extend_from_slice(bytes);
}

/// Pluggable digest function for tree nodes.
///
/// Implementations supply `digest`; the node pre-images are canonical and
/// provided here so that swapping the hash function cannot change the
/// structure being committed to.
pub trait TreeHasher: Send + Sync {
    /// Hash an arbitrary byte string into a fixed-width digest.
    fn digest(&self, bytes: &[u8]) -> NodeHash;

    /// Digest of the empty tree.
    fn empty_digest(&self) -> NodeHash {
        self.digest(&[])
    }

    /// Digest of a leaf node. `value_digest` is `digest(value)`, not the
    /// value itself; proofs carry only the digest.
    fn leaf_digest(&self, key: &[u8], value_digest: &NodeHash, version: Version) -> NodeHash {
        let mut data = Vec::with_capacity(32 + key.len() + DIGEST_SIZE);
        data.push(0u8);
        put_varint(1, &mut data); // size
        put_varint(version as u64, &mut data);
        put_length_prefixed(key, &mut data);
        put_length_prefixed(value_digest.as_bytes(), &mut data);
        self.digest(&data)
    }

    /// Digest of an inner node over its two child digests. The boundary
    /// key is deliberately absent: it is recomputable from the right
    /// subtree and does not need to be committed to twice.
    fn inner_digest(
        &self,
        height: i8,
        size: u64,
        version: Version,
        left: &NodeHash,
        right: &NodeHash,
    ) -> NodeHash {
        let mut data = Vec::with_capacity(32 + 2 * DIGEST_SIZE);
        data.push(height as u8);
        put_varint(size, &mut data);
        put_varint(version as u64, &mut data);
        put_length_prefixed(left.as_bytes(), &mut data);
        put_length_prefixed(right.as_bytes(), &mut data);
        self.digest(&data)
    }
}

/// SHA-256, the default digest for all tree operations.
#[derive(Debug, Default, Clone, Copy)]
pub struct Sha256TreeHasher;

impl TreeHasher for Sha256TreeHasher {
    fn digest(&self, bytes: &[u8]) -> NodeHash {
        let mut hasher = Sha256::new();
        hasher.update(bytes);
        NodeHash(hasher.finalize().into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SHA256_EMPTY: &str = "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";

    #[test]
    fn empty_digest_is_sha256_of_nothing() {
        let hasher = Sha256TreeHasher;
        assert_eq!(hex::encode(hasher.empty_digest().0), SHA256_EMPTY);
    }

    #[test]
    fn varint_encoding_matches_leb128() {
        let mut buf = Vec::new();
        put_varint(0, &mut buf);
        assert_eq!(buf, [0x00]);

        buf.clear();
        put_varint(1, &mut buf);
        assert_eq!(buf, [0x01]);

        buf.clear();
        put_varint(300, &mut buf);
        assert_eq!(buf, [0xAC, 0x02]);

        // A negative version encodes as the varint of its bit pattern.
        buf.clear();
        put_varint(-1i64 as u64, &mut buf);
        assert_eq!(
            buf,
            [0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0x01]
        );
    }

    #[test]
    fn leaf_preimage_layout() {
        let hasher = Sha256TreeHasher;
        let value_digest = hasher.digest(b"value");

        let mut expected = Vec::new();
        expected.push(0u8);
        expected.push(0x01); // varint(1)
        expected.push(0x07); // varint(version 7)
        expected.push(0x03); // len(key)
        expected.extend_from_slice(b"key");
        expected.push(32); // len(value digest)
        expected.extend_from_slice(value_digest.as_bytes());

        assert_eq!(
            hasher.leaf_digest(b"key", &value_digest, 7),
            hasher.digest(&expected)
        );
    }

    #[test]
    fn inner_preimage_layout() {
        let hasher = Sha256TreeHasher;
        let left = hasher.digest(b"left");
        let right = hasher.digest(b"right");

        let mut expected = Vec::new();
        expected.push(3u8); // height
        expected.push(0x05); // varint(size 5)
        expected.push(0x02); // varint(version 2)
        expected.push(32);
        expected.extend_from_slice(left.as_bytes());
        expected.push(32);
        expected.extend_from_slice(right.as_bytes());

        assert_eq!(
            hasher.inner_digest(3, 5, 2, &left, &right),
            hasher.digest(&expected)
        );
    }

    #[test]
    fn version_changes_the_digest() {
        let hasher = Sha256TreeHasher;
        let vd = hasher.digest(b"v");
        assert_ne!(
            hasher.leaf_digest(b"k", &vd, 1),
            hasher.leaf_digest(b"k", &vd, 2)
        );
    }
}
