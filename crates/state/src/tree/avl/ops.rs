// Path: crates/state/src/tree/avl/ops.rs
//! Pure algorithms over immutable tree nodes.
//!
//! Mutating operations never touch an existing node: they build fresh
//! nodes along the touched path and hand every displaced node to the
//! store, which either forgets it (created in the same working cycle) or
//! records it as an orphan of the working version.

use super::node::Node;
use super::store::NodeStore;
use arbor_api::backend::NodeBackend;
use arbor_api::hash::TreeHasher;
use arbor_types::error::TreeError;
use std::cmp::Ordering;
use std::sync::Arc;

/// Insert or update `key`. Returns the new subtree root and whether an
/// existing leaf was updated in place.
pub(crate) fn recursive_set<B: NodeBackend, H: TreeHasher>(
    store: &mut NodeStore<B, H>,
    node: Arc<Node>,
    key: &[u8],
    value: &[u8],
) -> Result<(Arc<Node>, bool), TreeError> {
    match node.as_ref() {
        Node::Empty { .. } => Ok((store.make_leaf(key, value), false)),
        Node::Leaf(leaf) => match key.cmp(&leaf.key) {
            Ordering::Equal => {
                store.drop_node(&node);
                Ok((store.make_leaf(key, value), true))
            }
            Ordering::Less => {
                let boundary = leaf.key.clone();
                let new_leaf = store.make_leaf(key, value);
                Ok((store.make_inner(boundary, &new_leaf, &node), false))
            }
            Ordering::Greater => {
                let new_leaf = store.make_leaf(key, value);
                Ok((store.make_inner(key.to_vec(), &node, &new_leaf), false))
            }
        },
        Node::Inner(inner) => {
            let boundary = inner.key.clone();
            let left = store.resolve(&inner.left)?;
            let right = store.resolve(&inner.right)?;
            store.drop_node(&node);
            let (new_left, new_right, updated) = if key < boundary.as_slice() {
                let (child, updated) = recursive_set(store, left, key, value)?;
                (child, right, updated)
            } else {
                let (child, updated) = recursive_set(store, right, key, value)?;
                (left, child, updated)
            };
            let rebuilt = store.make_inner(boundary, &new_left, &new_right);
            Ok((balance(store, rebuilt)?, updated))
        }
    }
}

/// Remove `key`. Returns the replacement subtree (`None` when the whole
/// subtree vanished), the subtree's new minimum key when removal changed
/// it, and the removed value (`None` when the key was not found, in
/// which case the subtree is returned untouched).
pub(crate) fn recursive_remove<B: NodeBackend, H: TreeHasher>(
    store: &mut NodeStore<B, H>,
    node: Arc<Node>,
    key: &[u8],
) -> Result<RemoveOutcome, TreeError> {
    match node.as_ref() {
        Node::Empty { .. } => Ok((Some(node), None, None)),
        Node::Leaf(leaf) => {
            if leaf.key == key {
                let value = leaf.value.clone();
                store.drop_node(&node);
                Ok((None, None, Some(value)))
            } else {
                Ok((Some(node), None, None))
            }
        }
        Node::Inner(inner) => {
            let boundary = inner.key.clone();
            if key < boundary.as_slice() {
                let left = store.resolve(&inner.left)?;
                let (new_left, new_key, value) = recursive_remove(store, left, key)?;
                if value.is_none() {
                    return Ok((Some(node), None, None));
                }
                let right = store.resolve(&inner.right)?;
                store.drop_node(&node);
                match new_left {
                    // The left child vanished: the right sibling takes this
                    // node's place, and ancestors must learn the subtree's
                    // new minimum.
                    None => Ok((Some(right), Some(boundary), value)),
                    Some(new_left) => {
                        let rebuilt = store.make_inner(boundary, &new_left, &right);
                        Ok((Some(balance(store, rebuilt)?), new_key, value))
                    }
                }
            } else {
                let right = store.resolve(&inner.right)?;
                let (new_right, new_key, value) = recursive_remove(store, right, key)?;
                if value.is_none() {
                    return Ok((Some(node), None, None));
                }
                let left = store.resolve(&inner.left)?;
                store.drop_node(&node);
                match new_right {
                    None => Ok((Some(left), None, value)),
                    Some(new_right) => {
                        // A boundary key bubbling up from the right subtree
                        // lands here: this node's key tracks exactly that
                        // minimum.
                        let boundary = new_key.unwrap_or(boundary);
                        let rebuilt = store.make_inner(boundary, &left, &new_right);
                        Ok((Some(balance(store, rebuilt)?), None, value))
                    }
                }
            }
        }
    }
}

pub(crate) type RemoveOutcome = (Option<Arc<Node>>, Option<Vec<u8>>, Option<Vec<u8>>);

/// Difference between the children's heights, positive when the left is
/// taller.
fn balance_factor<B: NodeBackend, H: TreeHasher>(
    store: &NodeStore<B, H>,
    node: &Node,
) -> Result<i32, TreeError> {
    match node {
        Node::Inner(inner) => {
            let left = store.resolve(&inner.left)?;
            let right = store.resolve(&inner.right)?;
            Ok(i32::from(left.height()) - i32::from(right.height()))
        }
        _ => Ok(0),
    }
}

/// Restore the AVL invariant after a child of `node` changed height.
pub(crate) fn balance<B: NodeBackend, H: TreeHasher>(
    store: &mut NodeStore<B, H>,
    node: Arc<Node>,
) -> Result<Arc<Node>, TreeError> {
    let bf = balance_factor(store, &node)?;
    if bf.abs() <= 1 {
        return Ok(node);
    }
    let inner = node
        .as_inner()
        .ok_or_else(|| TreeError::Corrupt("unbalanced node without children".into()))?;
    let boundary = inner.key.clone();
    let left = store.resolve(&inner.left)?;
    let right = store.resolve(&inner.right)?;

    if bf > 1 {
        if balance_factor(store, &left)? >= 0 {
            // Left-Left
            rotate_right(store, node)
        } else {
            // Left-Right
            store.drop_node(&node);
            let new_left = rotate_left(store, left)?;
            let rebuilt = store.make_inner(boundary, &new_left, &right);
            rotate_right(store, rebuilt)
        }
    } else if balance_factor(store, &right)? <= 0 {
        // Right-Right
        rotate_left(store, node)
    } else {
        // Right-Left
        store.drop_node(&node);
        let new_right = rotate_right(store, right)?;
        let rebuilt = store.make_inner(boundary, &left, &new_right);
        rotate_left(store, rebuilt)
    }
}

/// Single left rotation around `node` (its right child becomes the
/// subtree root). Displaces `node` and the right child; allocates two
/// inner nodes.
fn rotate_left<B: NodeBackend, H: TreeHasher>(
    store: &mut NodeStore<B, H>,
    node: Arc<Node>,
) -> Result<Arc<Node>, TreeError> {
    let inner = node
        .as_inner()
        .ok_or_else(|| TreeError::Corrupt("left rotation of a non-inner node".into()))?;
    let boundary = inner.key.clone();
    let left = store.resolve(&inner.left)?;
    let right = store.resolve(&inner.right)?;
    let r = right
        .as_inner()
        .ok_or_else(|| TreeError::Corrupt("left rotation without an inner right child".into()))?;
    let pivot_key = r.key.clone();
    let rl = store.resolve(&r.left)?;
    let rr = store.resolve(&r.right)?;

    store.drop_node(&node);
    store.drop_node(&right);
    let new_left = store.make_inner(boundary, &left, &rl);
    Ok(store.make_inner(pivot_key, &new_left, &rr))
}

/// Single right rotation around `node` (its left child becomes the
/// subtree root).
fn rotate_right<B: NodeBackend, H: TreeHasher>(
    store: &mut NodeStore<B, H>,
    node: Arc<Node>,
) -> Result<Arc<Node>, TreeError> {
    let inner = node
        .as_inner()
        .ok_or_else(|| TreeError::Corrupt("right rotation of a non-inner node".into()))?;
    let boundary = inner.key.clone();
    let left = store.resolve(&inner.left)?;
    let right = store.resolve(&inner.right)?;
    let l = left
        .as_inner()
        .ok_or_else(|| TreeError::Corrupt("right rotation without an inner left child".into()))?;
    let pivot_key = l.key.clone();
    let ll = store.resolve(&l.left)?;
    let lr = store.resolve(&l.right)?;

    store.drop_node(&node);
    store.drop_node(&left);
    let new_right = store.make_inner(boundary, &lr, &right);
    Ok(store.make_inner(pivot_key, &ll, &new_right))
}

/// Look up `key`, returning its in-order position (or the position it
/// would occupy) and its value when present.
pub(crate) fn get_with_index<B: NodeBackend, H: TreeHasher>(
    store: &NodeStore<B, H>,
    node: &Node,
    key: &[u8],
) -> Result<(u64, Option<Vec<u8>>), TreeError> {
    match node {
        Node::Empty { .. } => Ok((0, None)),
        Node::Leaf(leaf) => match key.cmp(&leaf.key) {
            Ordering::Less => Ok((0, None)),
            Ordering::Equal => Ok((0, Some(leaf.value.clone()))),
            Ordering::Greater => Ok((1, None)),
        },
        Node::Inner(inner) => {
            if key < inner.key.as_slice() {
                let left = store.resolve(&inner.left)?;
                get_with_index(store, &left, key)
            } else {
                let left = store.resolve(&inner.left)?;
                let right = store.resolve(&inner.right)?;
                let (index, value) = get_with_index(store, &right, key)?;
                Ok((index + left.size(), value))
            }
        }
    }
}

/// The key/value pair at in-order position `index`, if the tree is that
/// large.
pub(crate) fn get_by_index<B: NodeBackend, H: TreeHasher>(
    store: &NodeStore<B, H>,
    node: &Node,
    index: u64,
) -> Result<Option<(Vec<u8>, Vec<u8>)>, TreeError> {
    match node {
        Node::Empty { .. } => Ok(None),
        Node::Leaf(leaf) => {
            if index == 0 {
                Ok(Some((leaf.key.clone(), leaf.value.clone())))
            } else {
                Ok(None)
            }
        }
        Node::Inner(inner) => {
            let left = store.resolve(&inner.left)?;
            if index < left.size() {
                get_by_index(store, &left, index)
            } else {
                let right = store.resolve(&inner.right)?;
                get_by_index(store, &right, index - left.size())
            }
        }
    }
}

/// Smallest key strictly greater than `key`, if any.
pub(crate) fn next_key<B: NodeBackend, H: TreeHasher>(
    store: &NodeStore<B, H>,
    node: &Node,
    key: &[u8],
) -> Result<Option<Vec<u8>>, TreeError> {
    match node {
        Node::Empty { .. } => Ok(None),
        Node::Leaf(leaf) => Ok((leaf.key.as_slice() > key).then(|| leaf.key.clone())),
        Node::Inner(inner) => {
            if key < inner.key.as_slice() {
                let left = store.resolve(&inner.left)?;
                match next_key(store, &left, key)? {
                    Some(found) => Ok(Some(found)),
                    // The right subtree's minimum is this node's key.
                    None => Ok(Some(inner.key.clone())),
                }
            } else {
                let right = store.resolve(&inner.right)?;
                next_key(store, &right, key)
            }
        }
    }
}

/// In-order (or reverse) traversal. The callback returns `true` to stop;
/// the return value reports whether it did.
pub(crate) fn iterate<B, H, F>(
    store: &NodeStore<B, H>,
    node: &Node,
    ascending: bool,
    f: &mut F,
) -> Result<bool, TreeError>
where
    B: NodeBackend,
    H: TreeHasher,
    F: FnMut(&[u8], &[u8]) -> bool,
{
    iterate_range(store, node, None, None, ascending, false, f)
}

/// Traversal restricted to `start ≤ key < end` (or `≤ end` when
/// `inclusive`); either bound may be absent.
pub(crate) fn iterate_range<B, H, F>(
    store: &NodeStore<B, H>,
    node: &Node,
    start: Option<&[u8]>,
    end: Option<&[u8]>,
    ascending: bool,
    inclusive: bool,
    f: &mut F,
) -> Result<bool, TreeError>
where
    B: NodeBackend,
    H: TreeHasher,
    F: FnMut(&[u8], &[u8]) -> bool,
{
    match node {
        Node::Empty { .. } => Ok(false),
        Node::Leaf(leaf) => {
            let after_start = start.map_or(true, |s| leaf.key.as_slice() >= s);
            let before_end = end.map_or(true, |e| {
                leaf.key.as_slice() < e || (inclusive && leaf.key.as_slice() == e)
            });
            if after_start && before_end {
                Ok(f(&leaf.key, &leaf.value))
            } else {
                Ok(false)
            }
        }
        Node::Inner(inner) => {
            // Left subtree keys are < inner.key, right subtree keys ≥ it.
            let descend_left = start.map_or(true, |s| s < inner.key.as_slice());
            let descend_right = end.map_or(true, |e| {
                inner.key.as_slice() < e || (inclusive && inner.key.as_slice() == e)
            });
            let mut stopped = false;
            let (first, second) = if ascending {
                (
                    (descend_left, &inner.left),
                    (descend_right, &inner.right),
                )
            } else {
                (
                    (descend_right, &inner.right),
                    (descend_left, &inner.left),
                )
            };
            if first.0 {
                let child = store.resolve(first.1)?;
                stopped = iterate_range(store, &child, start, end, ascending, inclusive, f)?;
            }
            if !stopped && second.0 {
                let child = store.resolve(second.1)?;
                stopped = iterate_range(store, &child, start, end, ascending, inclusive, f)?;
            }
            Ok(stopped)
        }
    }
}
