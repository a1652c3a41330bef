// Path: crates/state/src/tree/avl/proof.rs
//! Range/existence/absence proofs and their stateless verifier.
//!
//! A [`RangeProof`] certifies a contiguous run of leaves under a known
//! root digest. `left_path` reaches the first leaf; each entry of
//! `inner_paths` is the partial path from where a later leaf diverges
//! from its predecessor down to that leaf. Paths are ordered
//! leaf-adjacent first, so the last element of a path sits next to the
//! root.

use arbor_api::hash::TreeHasher;
use arbor_types::error::ProofError;
use arbor_types::{NodeHash, Version};
use parity_scale_codec::{Decode, Encode};
use std::sync::OnceLock;

/// Which side of an inner node the recorded sibling digest occupies.
/// `Left` means the path descends into the right child.
#[derive(Encode, Decode, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    /// The sibling digest is the left child.
    Left,
    /// The sibling digest is the right child.
    Right,
}

/// One inner node on a path from a leaf toward the root.
#[derive(Encode, Decode, Debug, Clone, PartialEq, Eq)]
pub struct ProofInner {
    /// Height of the inner node.
    pub height: i8,
    /// Leaf count of the inner node.
    pub size: u64,
    /// Version stamped on the inner node.
    pub version: Version,
    /// Where the sibling digest sits.
    pub side: Side,
    /// Digest of the child the path does not descend into.
    pub sibling_digest: NodeHash,
}

impl ProofInner {
    /// Fold a subtree digest one level up through this node.
    fn fold<H: TreeHasher>(&self, hasher: &H, child: &NodeHash) -> NodeHash {
        let (left, right) = match self.side {
            Side::Left => (&self.sibling_digest, child),
            Side::Right => (child, &self.sibling_digest),
        };
        hasher.inner_digest(self.height, self.size, self.version, left, right)
    }
}

/// A leaf as recorded in a proof; the value is carried as its digest.
#[derive(Encode, Decode, Debug, Clone, PartialEq, Eq)]
pub struct ProofLeaf {
    /// User key.
    pub key: Vec<u8>,
    /// Digest of the value bytes.
    pub value_digest: NodeHash,
    /// Version stamped on the leaf.
    pub version: Version,
}

impl ProofLeaf {
    fn digest<H: TreeHasher>(&self, hasher: &H) -> NodeHash {
        hasher.leaf_digest(&self.key, &self.value_digest, self.version)
    }
}

/// True when every remaining step has its sibling on the left, i.e. the
/// path only ever descends right: the leaf is the rightmost of the tree.
fn is_rightmost(path: &[ProofInner]) -> bool {
    path.iter().all(|p| p.side == Side::Left)
}

/// Symmetric: the leaf is the leftmost of the tree.
fn is_leftmost(path: &[ProofInner]) -> bool {
    path.iter().all(|p| p.side == Side::Right)
}

/// Proof that a contiguous run of leaves (and the gaps around them) hangs
/// under a known root digest.
#[derive(Encode, Decode, Debug, Clone)]
pub struct RangeProof {
    /// Path to the first leaf.
    pub left_path: Vec<ProofInner>,
    /// Partial paths for every subsequent leaf; always one fewer than
    /// the leaves.
    pub inner_paths: Vec<Vec<ProofInner>>,
    /// The covered leaves, in key order.
    pub leaves: Vec<ProofLeaf>,
    #[codec(skip)]
    computed: OnceLock<Result<(NodeHash, bool), ProofError>>,
}

impl PartialEq for RangeProof {
    fn eq(&self, other: &Self) -> bool {
        self.left_path == other.left_path
            && self.inner_paths == other.inner_paths
            && self.leaves == other.leaves
    }
}

impl Eq for RangeProof {}

impl RangeProof {
    pub(crate) fn new(
        left_path: Vec<ProofInner>,
        inner_paths: Vec<Vec<ProofInner>>,
        leaves: Vec<ProofLeaf>,
    ) -> Self {
        RangeProof {
            left_path,
            inner_paths,
            leaves,
            computed: OnceLock::new(),
        }
    }

    /// Re-derive the root digest and the tree-end flag, computing them at
    /// most once per proof instance.
    fn computed<H: TreeHasher>(&self, hasher: &H) -> Result<(NodeHash, bool), ProofError> {
        self.computed
            .get_or_init(|| self.compute_root(hasher))
            .clone()
    }

    /// The root digest this proof folds up to.
    pub fn root_digest<H: TreeHasher>(&self, hasher: &H) -> Result<NodeHash, ProofError> {
        self.computed(hasher).map(|(digest, _)| digest)
    }

    /// True iff the last leaf of the proof is the rightmost leaf of the
    /// whole tree. Distinguishes "spans to the end" from "truncated by
    /// the limit".
    pub fn tree_end<H: TreeHasher>(&self, hasher: &H) -> Result<bool, ProofError> {
        self.computed(hasher).map(|(_, tree_end)| tree_end)
    }

    /// In-order index of the first leaf, or -1 when the proof has no
    /// path (single-leaf tree).
    pub fn left_index(&self) -> i64 {
        if self.left_path.is_empty() {
            return -1;
        }
        // Walking leaf → root: a sibling on the left means the path is
        // the right child there, so every leaf of that sibling subtree
        // precedes ours. The sibling's size is the node's size minus the
        // size recorded one step below (the leaf itself at the bottom).
        let mut index = 0i64;
        let mut below = 1u64;
        for step in &self.left_path {
            if step.side == Side::Left {
                index += step.size.saturating_sub(below) as i64;
            }
            below = step.size;
        }
        index
    }

    /// Check that this proof folds up to `root`.
    pub fn verify<H: TreeHasher>(&self, hasher: &H, root: &NodeHash) -> Result<(), ProofError> {
        let (digest, _) = self.computed(hasher)?;
        if digest != *root {
            log::debug!(
                "range proof rejected: derived {} trusted {}",
                digest,
                root
            );
            return Err(ProofError::RootMismatch);
        }
        Ok(())
    }

    /// Check that the proof binds `key` to `value` under `root`.
    pub fn verify_item<H: TreeHasher>(
        &self,
        hasher: &H,
        root: &NodeHash,
        key: &[u8],
        value: &[u8],
    ) -> Result<(), ProofError> {
        self.verify(hasher, root)?;
        let leaf = self
            .leaves
            .iter()
            .find(|leaf| leaf.key == key)
            .ok_or(ProofError::KeyNotInProof)?;
        if leaf.value_digest != hasher.digest(value) {
            return Err(ProofError::ValueDigestMismatch);
        }
        Ok(())
    }

    /// Check that the proof shows `key` to be absent under `root`.
    ///
    /// Absence holds when the key falls before a provably-leftmost first
    /// leaf, inside a gap between adjacent proved leaves, or after a last
    /// leaf that is provably the end of the tree.
    pub fn verify_absence<H: TreeHasher>(
        &self,
        hasher: &H,
        root: &NodeHash,
        key: &[u8],
    ) -> Result<(), ProofError> {
        self.verify(hasher, root)?;
        let first = self.leaves.first().ok_or(ProofError::Empty)?;

        if key < first.key.as_slice() {
            if is_leftmost(&self.left_path) {
                return Ok(());
            }
            return Err(ProofError::AbsenceNotProven(
                "first leaf is not the leftmost of the tree".into(),
            ));
        }
        for (position, leaf) in self.leaves.iter().enumerate() {
            if leaf.key == key {
                return Err(ProofError::AbsenceDisproved(position));
            }
        }
        let last = self.leaves.last().ok_or(ProofError::Empty)?;
        if key > last.key.as_slice() {
            if self.left_path.is_empty()
                || is_rightmost(&self.left_path)
                || self.tree_end(hasher)?
            {
                return Ok(());
            }
            return Err(ProofError::AbsenceNotProven(
                "proof does not reach the end of the tree".into(),
            ));
        }
        // The key lies strictly between the first and last leaf; the
        // leaves are contiguous, so some adjacent pair brackets it.
        for pair in self.leaves.windows(2) {
            if pair[0].key.as_slice() < key && key < pair[1].key.as_slice() {
                return Ok(());
            }
        }
        Err(ProofError::AbsenceNotProven(
            "no gap between proved leaves brackets the key".into(),
        ))
    }

    /// Shared root recomputation for construction and verification.
    fn compute_root<H: TreeHasher>(&self, hasher: &H) -> Result<(NodeHash, bool), ProofError> {
        if self.leaves.is_empty() {
            return Err(ProofError::Empty);
        }
        if self.inner_paths.len() + 1 != self.leaves.len() {
            return Err(ProofError::Malformed(format!(
                "{} inner paths for {} leaves",
                self.inner_paths.len(),
                self.leaves.len()
            )));
        }
        for pair in self.leaves.windows(2) {
            if pair[0].key >= pair[1].key {
                return Err(ProofError::Malformed("leaves out of order".into()));
            }
        }
        let mut leaves = self.leaves.iter();
        let mut paths = self.inner_paths.iter();
        let (digest, tree_end, done) =
            compute_subtree(hasher, &mut leaves, &mut paths, &self.left_path, true)?;
        if !done {
            return Err(ProofError::Malformed("leftover leaves".into()));
        }
        Ok((digest, tree_end))
    }
}

/// Fold one leaf up its path, then substantiate every right-sibling
/// digest on that path from the subsequent leaves.
///
/// Returns the subtree digest, whether the deepest consumed leaf ended
/// the tree, and whether all leaves were consumed. The subtree root is
/// derived in full from the sibling digests; the recursion then checks
/// each right-hand sibling against the digest re-derived from the leaves
/// that claim to live under it, and any inequality fails the proof.
fn compute_subtree<'a, H: TreeHasher>(
    hasher: &H,
    leaves: &mut std::slice::Iter<'a, ProofLeaf>,
    paths: &mut std::slice::Iter<'a, Vec<ProofInner>>,
    path: &[ProofInner],
    rightmost: bool,
) -> Result<(NodeHash, bool, bool), ProofError> {
    let leaf = leaves
        .next()
        .ok_or_else(|| ProofError::Malformed("inner path without a leaf".into()))?;
    let mut digest = leaf.digest(hasher);
    for step in path {
        digest = step.fold(hasher, &digest);
    }
    if leaves.as_slice().is_empty() {
        return Ok((digest, rightmost && is_rightmost(path), true));
    }
    for (depth, step) in path.iter().enumerate() {
        if step.side == Side::Left {
            continue;
        }
        let next_path = paths
            .next()
            .ok_or_else(|| ProofError::Malformed("leaf without an inner path".into()))?;
        // Later leaves always sit leftmost under some right sibling; a
        // left-side step in here would let a prover skip leaves.
        if next_path.iter().any(|p| p.side == Side::Left) {
            return Err(ProofError::Malformed(
                "inner path with a left-side step".into(),
            ));
        }
        let (derived, tree_end, done) = compute_subtree(
            hasher,
            leaves,
            paths,
            next_path,
            rightmost && is_rightmost(&path[depth + 1..]),
        )?;
        if derived != step.sibling_digest {
            return Err(ProofError::Malformed(
                "sibling digest does not match its leaves".into(),
            ));
        }
        if done {
            return Ok((digest, tree_end, true));
        }
    }
    Ok((digest, false, false))
}
