// Path: crates/state/src/tree/avl/proof_builder.rs
//! Range proof construction.
//!
//! A proof is built in two passes: a BST descent to the left boundary
//! leaf records `left_path`, then an in-order walk strictly after that
//! leaf emits every further leaf together with the partial inner path
//! from where it diverges from the paths already recorded.

use super::node::{InnerNode, LeafNode, Node};
use super::proof::{ProofInner, ProofLeaf, RangeProof, Side};
use super::store::NodeStore;
use arbor_api::backend::NodeBackend;
use arbor_api::hash::TreeHasher;
use arbor_types::error::TreeError;
use std::sync::Arc;

/// Immediate lexicographic successor of a key.
pub(crate) fn key_after(key: &[u8]) -> Vec<u8> {
    let mut next = Vec::with_capacity(key.len() + 1);
    next.extend_from_slice(key);
    next.push(0);
    next
}

/// Existence-or-absence proof for a single key: a range proof over
/// `[key, key+ε)` widened by the boundary leaves that absence needs.
pub(crate) fn proof_of_key<B: NodeBackend, H: TreeHasher>(
    store: &NodeStore<B, H>,
    root: &Node,
    key: &[u8],
) -> Result<(Option<Vec<u8>>, RangeProof), TreeError> {
    let end = key_after(key);
    let (proof, _, values) = range_proof(store, root, Some(key), Some(&end), 10)?;
    Ok((values.into_iter().next(), proof))
}

/// Build a proof covering `[start, end)` with at most `limit` leaves
/// (0 = unlimited), returning it with the in-range keys and values.
///
/// The first proved leaf is the one the BST descent for `start` lands
/// on: `start` itself when present, otherwise its predecessor, or the
/// leftmost leaf when no predecessor exists. One leaf at or past `end`
/// may be included to pin down the right boundary.
pub(crate) fn range_proof<B: NodeBackend, H: TreeHasher>(
    store: &NodeStore<B, H>,
    root: &Node,
    start: Option<&[u8]>,
    end: Option<&[u8]>,
    limit: usize,
) -> Result<(RangeProof, Vec<Vec<u8>>, Vec<Vec<u8>>), TreeError> {
    if let (Some(s), Some(e)) = (start, end) {
        if s >= e {
            return Err(TreeError::InvalidRange);
        }
    }
    if root.is_empty() {
        return Ok((RangeProof::new(Vec::new(), Vec::new(), Vec::new()), Vec::new(), Vec::new()));
    }

    let (left_path, first) = path_to_key(store, root, start.unwrap_or(&[]))?;
    let hasher = store.hasher();

    let leaves = vec![ProofLeaf {
        key: first.key.clone(),
        value_digest: hasher.digest(&first.value),
        version: first.version,
    }];
    let mut keys = Vec::new();
    let mut values = Vec::new();
    let start_ok = start.map_or(true, |s| s <= first.key.as_slice());
    let end_ok = end.map_or(true, |e| first.key.as_slice() < e);
    if start_ok && end_ok {
        keys.push(first.key.clone());
        values.push(first.value.clone());
    }

    // Nothing after the first leaf can still be wanted.
    let exhausted = end.map_or(false, |e| e <= key_after(&first.key).as_slice());
    if limit == 1 || exhausted {
        return Ok((RangeProof::new(left_path, Vec::new(), leaves), keys, values));
    }

    let mut builder = RangeBuilder {
        left_path: &left_path,
        matched: 0,
        diverged: false,
        current: Vec::new(),
        inner_paths: Vec::new(),
        leaves,
        keys,
        values,
        count: 1,
        limit,
        end,
    };
    walk(store, root, &first.key, &mut builder)?;
    let RangeBuilder {
        inner_paths,
        leaves,
        keys,
        values,
        ..
    } = builder;
    Ok((RangeProof::new(left_path, inner_paths, leaves), keys, values))
}

/// BST descent to the leaf where `key` is or would be, recording the
/// path leaf-adjacent first. Reaches `key`'s own leaf when present,
/// otherwise its predecessor, otherwise the leftmost leaf.
fn path_to_key<B: NodeBackend, H: TreeHasher>(
    store: &NodeStore<B, H>,
    root: &Node,
    key: &[u8],
) -> Result<(Vec<ProofInner>, LeafNode), TreeError> {
    let mut path = Vec::new();
    let mut node: Arc<Node> = store.resolve(root.hash())?;
    loop {
        match node.as_ref() {
            Node::Empty { .. } => {
                return Err(TreeError::Corrupt("empty node on a descent path".into()))
            }
            Node::Leaf(leaf) => {
                let leaf = leaf.clone();
                path.reverse();
                return Ok((path, leaf));
            }
            Node::Inner(inner) => {
                let (next, side, sibling) = if key < inner.key.as_slice() {
                    (inner.left, Side::Right, inner.right)
                } else {
                    (inner.right, Side::Left, inner.left)
                };
                path.push(ProofInner {
                    height: inner.height,
                    size: inner.size,
                    version: inner.version,
                    side,
                    sibling_digest: sibling,
                });
                node = store.resolve(&next)?;
            }
        }
    }
}

struct RangeBuilder<'a> {
    left_path: &'a [ProofInner],
    /// Prefix of `left_path` (seen from the root) the walk has re-visited.
    matched: usize,
    diverged: bool,
    current: Vec<ProofInner>,
    inner_paths: Vec<Vec<ProofInner>>,
    leaves: Vec<ProofLeaf>,
    keys: Vec<Vec<u8>>,
    values: Vec<Vec<u8>>,
    count: usize,
    limit: usize,
    end: Option<&'a [u8]>,
}

struct WalkMark {
    current_len: usize,
    matched: usize,
    diverged: bool,
}

impl RangeBuilder<'_> {
    fn mark(&self) -> WalkMark {
        WalkMark {
            current_len: self.current.len(),
            matched: self.matched,
            diverged: self.diverged,
        }
    }

    /// Undo tentative inner records: a pin only stays once a leaf was
    /// found under its left child.
    fn reset_to(&mut self, mark: WalkMark) {
        self.current.truncate(mark.current_len);
        self.matched = mark.matched;
        self.diverged = mark.diverged;
    }

    fn visit_inner(&mut self, inner: &InnerNode) {
        if !self.diverged {
            if self.matched < self.left_path.len() {
                // left_path is leaf-first; the walk meets nodes from the
                // root side.
                let step = &self.left_path[self.left_path.len() - 1 - self.matched];
                let matches = step.height == inner.height
                    && match step.side {
                        Side::Left => step.sibling_digest == inner.left,
                        Side::Right => step.sibling_digest == inner.right,
                    };
                if matches {
                    self.matched += 1;
                    return;
                }
            }
            self.diverged = true;
        }
        self.current.push(ProofInner {
            height: inner.height,
            size: inner.size,
            version: inner.version,
            side: Side::Right,
            sibling_digest: inner.right,
        });
    }

    /// Returns true when the walk should stop.
    fn visit_leaf<H: TreeHasher>(&mut self, hasher: &H, leaf: &LeafNode) -> bool {
        // Pins were recorded on the way down; paths are stored
        // leaf-adjacent first.
        let mut path = std::mem::take(&mut self.current);
        path.reverse();
        self.inner_paths.push(path);
        self.leaves.push(ProofLeaf {
            key: leaf.key.clone(),
            value_digest: hasher.digest(&leaf.value),
            version: leaf.version,
        });
        self.count += 1;
        if self.limit > 0 && self.count >= self.limit {
            return true;
        }
        if let Some(end) = self.end {
            // The boundary leaf at or past the end stays in the proof but
            // out of the results.
            if leaf.key.as_slice() >= end {
                return true;
            }
        }
        self.keys.push(leaf.key.clone());
        self.values.push(leaf.value.clone());
        if let Some(end) = self.end {
            if end <= key_after(&leaf.key).as_slice() {
                return true;
            }
        }
        false
    }
}

/// In-order walk over leaves with keys strictly greater than `after`.
fn walk<B: NodeBackend, H: TreeHasher>(
    store: &NodeStore<B, H>,
    node: &Node,
    after: &[u8],
    builder: &mut RangeBuilder<'_>,
) -> Result<bool, TreeError> {
    match node {
        Node::Empty { .. } => Ok(false),
        Node::Leaf(leaf) => {
            if leaf.key.as_slice() > after {
                Ok(builder.visit_leaf(store.hasher(), leaf))
            } else {
                Ok(false)
            }
        }
        Node::Inner(inner) => {
            let mut stopped = false;
            if after < inner.key.as_slice() {
                let mark = builder.mark();
                builder.visit_inner(inner);
                let emitted = builder.leaves.len();
                let left = store.resolve(&inner.left)?;
                stopped = walk(store, &left, after, builder)?;
                if builder.leaves.len() == emitted {
                    builder.reset_to(mark);
                }
            }
            if !stopped {
                let right = store.resolve(&inner.right)?;
                stopped = walk(store, &right, after, builder)?;
            }
            Ok(stopped)
        }
    }
}
