// Path: crates/state/src/tree/avl/tests.rs

use super::node::Node;
use super::proof::RangeProof;
use super::store::{MemoryBackend, NodeStore};
use super::tree::Tree;
use arbor_api::hash::{Sha256TreeHasher, TreeHasher};
use arbor_types::error::{ProofError, TreeError};
use parity_scale_codec::{Decode, Encode};
use proptest::prelude::*;
use std::collections::BTreeMap;

fn tree_with_bytes(range: std::ops::Range<u8>) -> Tree<MemoryBackend> {
    let mut tree = Tree::in_memory().unwrap();
    for byte in range {
        tree.set(&[byte], &[byte]).unwrap();
    }
    tree
}

/// Recursively checks the AVL balance, height/size bookkeeping, strict
/// BST order, and the boundary-key invariant; returns (height, size,
/// min key, max key).
#[allow(clippy::type_complexity)]
fn check_subtree(
    store: &NodeStore<MemoryBackend>,
    node: &Node,
) -> (i8, u64, Option<(Vec<u8>, Vec<u8>)>) {
    match node {
        Node::Empty { .. } => (0, 0, None),
        Node::Leaf(_) => (0, 1, Some((node.key().to_vec(), node.key().to_vec()))),
        Node::Inner(_) => {
            let inner = node.as_inner().unwrap();
            let left = store.resolve(&inner.left).unwrap();
            let right = store.resolve(&inner.right).unwrap();
            let (lh, ls, lrange) = check_subtree(store, &left);
            let (rh, rs, rrange) = check_subtree(store, &right);
            let (lmin, lmax) = lrange.expect("inner node with an empty left child");
            let (rmin, rmax) = rrange.expect("inner node with an empty right child");

            assert!((i32::from(lh) - i32::from(rh)).abs() <= 1, "AVL balance");
            assert_eq!(inner.height, 1 + lh.max(rh), "height bookkeeping");
            assert_eq!(inner.size, ls + rs, "size bookkeeping");
            assert!(lmax < rmin, "BST order");
            assert_eq!(inner.key, rmin, "boundary key is the right-subtree minimum");

            (inner.height, inner.size, Some((lmin, rmax)))
        }
    }
}

fn check_invariants(tree: &Tree<MemoryBackend>) {
    let root = tree.store().working_root();
    check_subtree(tree.store(), &root);
}

fn collect(tree: &Tree<MemoryBackend>, ascending: bool) -> Vec<(Vec<u8>, Vec<u8>)> {
    let mut out = Vec::new();
    tree.iterate(ascending, |key, value| {
        out.push((key.to_vec(), value.to_vec()));
        false
    })
    .unwrap();
    out
}

/// Every node digest reachable from `node`.
fn reachable(store: &NodeStore<MemoryBackend>, node: &Node, out: &mut Vec<arbor_types::NodeHash>) {
    out.push(*node.hash());
    if let Some(inner) = node.as_inner() {
        let left = store.resolve(&inner.left).unwrap();
        let right = store.resolve(&inner.right).unwrap();
        reachable(store, &left, out);
        reachable(store, &right, out);
    }
}

#[test]
fn sequential_inserts_balance_out() {
    let tree = tree_with_bytes(0..10);
    assert_eq!(tree.size(), 10);
    assert_eq!(tree.height(), 4);
    check_invariants(&tree);

    let (index, value) = tree.get(&[0x06]).unwrap();
    assert_eq!(index, 6);
    assert_eq!(value, Some(vec![0x06]));
}

#[test]
fn remove_rebalances_and_updates_boundaries() {
    let mut tree = tree_with_bytes(0..10);
    let (value, removed) = tree.remove(&[0x04]).unwrap();
    assert_eq!(value, Some(vec![0x04]));
    assert!(removed);

    assert_eq!(tree.size(), 9);
    // Nine leaves cannot fit a height-3 tree of two-child inners.
    assert_eq!(tree.height(), 4);
    assert!(!tree.has(&[0x04]).unwrap());
    assert!(tree.has(&[0x05]).unwrap());
    check_invariants(&tree);

    let (_, missing) = tree.remove(&[0x40]).unwrap();
    assert!(!missing);
    assert_eq!(tree.size(), 9);
}

#[test]
fn set_reports_updates() {
    let mut tree = Tree::in_memory().unwrap();
    assert!(!tree.set(b"a", b"1").unwrap());
    assert!(tree.set(b"a", b"2").unwrap());
    assert_eq!(tree.get(b"a").unwrap().1, Some(b"2".to_vec()));
    assert_eq!(tree.size(), 1);
}

#[test]
fn range_iteration_is_end_exclusive() {
    let tree = tree_with_bytes(0..10);

    let mut keys = Vec::new();
    tree.iterate_range(Some(&[0x04]), Some(&[0x09]), true, false, |key, _| {
        keys.push(key.to_vec());
        false
    })
    .unwrap();
    assert_eq!(
        keys,
        vec![vec![0x04], vec![0x05], vec![0x06], vec![0x07], vec![0x08]]
    );

    let mut inclusive = Vec::new();
    tree.iterate_range(Some(&[0x04]), Some(&[0x09]), true, true, |key, _| {
        inclusive.push(key[0]);
        false
    })
    .unwrap();
    assert_eq!(inclusive, vec![4, 5, 6, 7, 8, 9]);

    let mut descending = Vec::new();
    tree.iterate_range(Some(&[0x04]), Some(&[0x09]), false, false, |key, _| {
        descending.push(key[0]);
        false
    })
    .unwrap();
    assert_eq!(descending, vec![8, 7, 6, 5, 4]);

    assert!(matches!(
        tree.iterate_range(Some(&[0x09]), Some(&[0x04]), true, false, |_, _| false),
        Err(TreeError::InvalidRange)
    ));
}

#[test]
fn iteration_can_abort() {
    let tree = tree_with_bytes(0..10);
    let mut seen = 0;
    let stopped = tree
        .iterate(true, |key, _| {
            seen += 1;
            key[0] == 3
        })
        .unwrap();
    assert!(stopped);
    assert_eq!(seen, 4);
}

#[test]
fn indexed_access_and_next_key() {
    let tree = tree_with_bytes(0..10);
    assert_eq!(
        tree.get_by_index(6).unwrap(),
        Some((vec![0x06], vec![0x06]))
    );
    assert_eq!(tree.get_by_index(10).unwrap(), None);

    assert_eq!(tree.next_key(&[0x05]).unwrap(), Some(vec![0x06]));
    assert_eq!(tree.next_key(&[0x04, 0x00]).unwrap(), Some(vec![0x05]));
    assert_eq!(tree.next_key(&[0x09]).unwrap(), None);

    // The index of an absent key is the slot it would occupy.
    let mut tree = tree;
    tree.remove(&[0x04]).unwrap();
    assert_eq!(tree.get(&[0x04]).unwrap(), (4, None));
}

#[test]
fn proof_for_present_key() {
    let mut tree = tree_with_bytes(0..10);
    tree.commit().unwrap();
    let hasher = Sha256TreeHasher;

    let (value, proof) = tree.get_with_proof(&[0x04]).unwrap();
    assert_eq!(value, Some(vec![0x04]));
    assert_eq!(proof.root_digest(&hasher).unwrap(), tree.hash());
    proof.verify(&hasher, &tree.hash()).unwrap();
    proof
        .verify_item(&hasher, &tree.hash(), &[0x04], &[0x04])
        .unwrap();
    assert_eq!(proof.left_index(), 4);

    assert_eq!(
        proof.verify_item(&hasher, &tree.hash(), &[0x04], &[0x05]),
        Err(ProofError::ValueDigestMismatch)
    );
    let wrong_root = hasher.digest(b"nonsense");
    assert_eq!(
        proof.verify(&hasher, &wrong_root),
        Err(ProofError::RootMismatch)
    );
}

#[test]
fn proof_for_key_past_the_end() {
    let mut tree = tree_with_bytes(0..10);
    tree.commit().unwrap();
    let hasher = Sha256TreeHasher;

    let (value, proof) = tree.get_with_proof(&[0x0A]).unwrap();
    assert_eq!(value, None);
    assert!(proof.tree_end(&hasher).unwrap());
    proof.verify_absence(&hasher, &tree.hash(), &[0x0A]).unwrap();
    assert_eq!(
        proof.verify_item(&hasher, &tree.hash(), &[0x0A], &[]),
        Err(ProofError::KeyNotInProof)
    );
}

#[test]
fn proof_for_key_in_a_gap() {
    let mut tree = tree_with_bytes(0..10);
    tree.remove(&[0x04]).unwrap();
    tree.commit().unwrap();
    let hasher = Sha256TreeHasher;

    let (value, proof) = tree.get_with_proof(&[0x04]).unwrap();
    assert_eq!(value, None);
    // The proof brackets the gap with the neighbors 0x03 and 0x05.
    assert_eq!(proof.leaves.len(), 2);
    proof.verify_absence(&hasher, &tree.hash(), &[0x04]).unwrap();

    // Absence of a present key is disproved.
    let (_, proof) = tree.get_with_proof(&[0x05]).unwrap();
    assert_eq!(
        proof.verify_absence(&hasher, &tree.hash(), &[0x05]),
        Err(ProofError::AbsenceDisproved(0))
    );
}

#[test]
fn proof_for_key_before_the_start() {
    let mut tree = Tree::in_memory().unwrap();
    for byte in 5..10u8 {
        tree.set(&[byte], &[byte]).unwrap();
    }
    tree.commit().unwrap();
    let hasher = Sha256TreeHasher;

    let (value, proof) = tree.get_with_proof(&[0x01]).unwrap();
    assert_eq!(value, None);
    proof.verify_absence(&hasher, &tree.hash(), &[0x01]).unwrap();
}

#[test]
fn range_proof_covers_the_interval() {
    let mut tree = tree_with_bytes(0..10);
    let (_, version) = tree.commit().unwrap();
    let hasher = Sha256TreeHasher;

    let (keys, values, proof) = tree
        .get_versioned_range_with_proof(Some(&[0x02]), Some(&[0x08]), 0, version)
        .unwrap();
    assert_eq!(keys.len(), 6);
    assert_eq!(keys.first(), Some(&vec![0x02]));
    assert_eq!(keys.last(), Some(&vec![0x07]));
    assert_eq!(values[3], vec![0x05]);
    proof.verify(&hasher, &tree.hash()).unwrap();
    assert_eq!(proof.left_index(), 2);
    for (key, value) in keys.iter().zip(&values) {
        proof.verify_item(&hasher, &tree.hash(), key, value).unwrap();
    }

    // An unbounded query proves the whole tree and its end.
    let (keys, _, proof) = tree
        .get_versioned_range_with_proof(None, None, 0, version)
        .unwrap();
    assert_eq!(keys.len(), 10);
    proof.verify(&hasher, &tree.hash()).unwrap();
    assert!(proof.tree_end(&hasher).unwrap());

    // A limited query is truncated and says so. The limit caps proof
    // leaves; the last one is the boundary and yields no result.
    let (keys, _, proof) = tree
        .get_versioned_range_with_proof(None, None, 3, version)
        .unwrap();
    assert_eq!(proof.leaves.len(), 3);
    assert_eq!(keys.len(), 2);
    proof.verify(&hasher, &tree.hash()).unwrap();
    assert!(!proof.tree_end(&hasher).unwrap());
}

#[test]
fn range_proof_from_a_right_subtree_boundary() {
    // Shape: root {L1, {L2, L3}}. A range starting at 2 walks straight
    // into the right subtree while the first leaf sits on its left
    // spine, which is where path re-matching is trickiest.
    let mut tree = Tree::in_memory().unwrap();
    for byte in 1..4u8 {
        tree.set(&[byte], &[byte]).unwrap();
    }
    let (_, version) = tree.commit().unwrap();
    let hasher = Sha256TreeHasher;

    let (keys, _, proof) = tree
        .get_versioned_range_with_proof(Some(&[0x02]), None, 0, version)
        .unwrap();
    assert_eq!(keys, vec![vec![0x02], vec![0x03]]);
    proof.verify(&hasher, &tree.hash()).unwrap();
    assert!(proof.tree_end(&hasher).unwrap());
}

#[test]
fn proofs_handle_suffix_keys() {
    // [2, 0] sorts between [2] and [3]; key arithmetic must not skip it.
    let mut tree = Tree::in_memory().unwrap();
    tree.set(&[0x02], b"a").unwrap();
    tree.set(&[0x02, 0x00], b"b").unwrap();
    tree.set(&[0x03], b"c").unwrap();
    let (_, version) = tree.commit().unwrap();
    let hasher = Sha256TreeHasher;

    let (keys, values, proof) = tree
        .get_versioned_range_with_proof(Some(&[0x02]), Some(&[0x03]), 0, version)
        .unwrap();
    assert_eq!(keys, vec![vec![0x02], vec![0x02, 0x00]]);
    assert_eq!(values, vec![b"a".to_vec(), b"b".to_vec()]);
    proof.verify(&hasher, &tree.hash()).unwrap();

    let (value, proof) = tree.get_with_proof(&[0x02, 0x01]).unwrap();
    assert_eq!(value, None);
    proof
        .verify_absence(&hasher, &tree.hash(), &[0x02, 0x01])
        .unwrap();

    let (value, _) = tree.get_with_proof(&[0x02, 0x00]).unwrap();
    assert_eq!(value, Some(b"b".to_vec()));
}

#[test]
fn proofs_on_a_single_leaf_tree() {
    let mut tree = Tree::in_memory().unwrap();
    tree.set(&[0x05], b"only").unwrap();
    tree.commit().unwrap();
    let hasher = Sha256TreeHasher;

    let (value, proof) = tree.get_with_proof(&[0x05]).unwrap();
    assert_eq!(value, Some(b"only".to_vec()));
    assert!(proof.left_path.is_empty());
    assert_eq!(proof.left_index(), -1);
    proof
        .verify_item(&hasher, &tree.hash(), &[0x05], b"only")
        .unwrap();

    // With no path at all, the single leaf is both ends of the tree.
    let (_, proof) = tree.get_with_proof(&[0x01]).unwrap();
    proof.verify_absence(&hasher, &tree.hash(), &[0x01]).unwrap();
    let (_, proof) = tree.get_with_proof(&[0x09]).unwrap();
    proof.verify_absence(&hasher, &tree.hash(), &[0x09]).unwrap();
}

#[test]
fn empty_commit_rebinds_the_same_root() {
    let mut tree = tree_with_bytes(0..4);
    let (root1, v1) = tree.commit().unwrap();
    let (root2, v2) = tree.commit().unwrap();
    assert_eq!(root1, root2);
    assert_eq!(v2, v1 + 1);
    assert_eq!(tree.versions(), vec![0, 1, 2]);
}

#[test]
fn proofs_survive_the_wire() {
    let mut tree = tree_with_bytes(0..10);
    let (_, version) = tree.commit().unwrap();
    let hasher = Sha256TreeHasher;

    let (_, _, proof) = tree
        .get_versioned_range_with_proof(Some(&[0x02]), Some(&[0x08]), 0, version)
        .unwrap();
    let decoded = RangeProof::decode(&mut proof.encode().as_slice()).unwrap();
    assert_eq!(decoded, proof);
    decoded.verify(&hasher, &tree.hash()).unwrap();
}

#[test]
fn malformed_proofs_are_rejected() {
    let mut tree = tree_with_bytes(0..10);
    let (_, version) = tree.commit().unwrap();
    let hasher = Sha256TreeHasher;

    let (_, _, proof) = tree
        .get_versioned_range_with_proof(Some(&[0x02]), Some(&[0x08]), 0, version)
        .unwrap();

    // Dropping a leaf breaks the path/leaf length invariant.
    let mut leaves = proof.leaves.clone();
    leaves.pop();
    let truncated = RangeProof::new(proof.left_path.clone(), proof.inner_paths.clone(), leaves);
    assert!(matches!(
        truncated.verify(&hasher, &tree.hash()),
        Err(ProofError::Malformed(_))
    ));

    // Reordering leaves is structural damage, not just a bad root.
    let mut swapped = proof.leaves.clone();
    swapped.swap(0, 1);
    let reordered = RangeProof::new(proof.left_path.clone(), proof.inner_paths.clone(), swapped);
    assert!(matches!(
        reordered.verify(&hasher, &tree.hash()),
        Err(ProofError::Malformed(_))
    ));

    // Tampering with a sibling digest changes the derived root.
    let mut path = proof.left_path.clone();
    path[0].sibling_digest = hasher.digest(b"tampered");
    let tampered = RangeProof::new(path, proof.inner_paths.clone(), proof.leaves.clone());
    assert!(tampered.verify(&hasher, &tree.hash()).is_err());

    let empty = RangeProof::new(Vec::new(), Vec::new(), Vec::new());
    assert_eq!(
        empty.verify(&hasher, &tree.hash()),
        Err(ProofError::Empty)
    );
}

#[test]
fn commit_binds_versions_in_sequence() {
    let mut tree = tree_with_bytes(0..10);
    let (root1, version1) = tree.commit().unwrap();
    assert_eq!(version1, 1);
    assert_eq!(root1, tree.hash());

    for byte in 10..20u8 {
        tree.set(&[byte], &[byte]).unwrap();
    }
    let (_, version2) = tree.commit().unwrap();
    assert_eq!(version2, 2);

    assert_eq!(tree.versions(), vec![0, 1, 2]);
    assert_eq!(tree.root_at(1).unwrap().size(), 10);
    assert_eq!(tree.root_at(2).unwrap().size(), 20);
    assert!(matches!(
        tree.root_at(3),
        Err(TreeError::VersionMissing(3))
    ));

    tree.delete_last().unwrap();
    assert_eq!(tree.versions(), vec![0, 1]);
    assert_eq!(tree.size(), 10);
    assert_eq!(tree.version(), 2);
    assert_eq!(tree.working_hash(), root1);
}

#[test]
fn versioned_reads_see_their_snapshot() {
    let mut tree = Tree::in_memory().unwrap();
    tree.set(b"key", b"one").unwrap();
    let (_, v1) = tree.commit().unwrap();
    tree.set(b"key", b"two").unwrap();
    let (_, v2) = tree.commit().unwrap();

    assert_eq!(tree.get_versioned(b"key", v1).unwrap().1, Some(b"one".to_vec()));
    assert_eq!(tree.get_versioned(b"key", v2).unwrap().1, Some(b"two".to_vec()));
    assert_ne!(tree.root_at(v1).unwrap().hash(), tree.root_at(v2).unwrap().hash());

    // Re-writing the same key/value still yields a fresh leaf stamped
    // with the new version, so even identical content gets a new root.
    tree.set(b"key", b"two").unwrap();
    let (_, v3) = tree.commit().unwrap();
    assert_ne!(tree.root_at(v2).unwrap().hash(), tree.root_at(v3).unwrap().hash());
}

#[test]
fn rollback_restores_the_committed_root() {
    let mut tree = tree_with_bytes(0..10);
    tree.commit().unwrap();
    let committed = tree.working_hash();

    tree.set(&[0x20], &[0x20]).unwrap();
    tree.remove(&[0x03]).unwrap();
    assert_ne!(tree.working_hash(), committed);

    tree.rollback().unwrap();
    assert_eq!(tree.working_hash(), committed);
    assert!(tree.has(&[0x03]).unwrap());
    assert!(!tree.has(&[0x20]).unwrap());
}

#[test]
fn delete_all_rewinds_history() {
    let mut tree = Tree::in_memory().unwrap();
    for round in 0..4u8 {
        tree.set(&[round], &[round]).unwrap();
        tree.commit().unwrap();
    }
    assert_eq!(tree.versions(), vec![0, 1, 2, 3, 4]);

    tree.delete_all(2).unwrap();
    assert_eq!(tree.versions(), vec![0, 1]);
    assert_eq!(tree.version(), 2);
    assert_eq!(tree.size(), 1);
    assert!(tree.has(&[0]).unwrap());
    assert!(!tree.has(&[1]).unwrap());

    // Deleting the initial empty version is refused.
    assert!(matches!(
        tree.delete_all(0),
        Err(TreeError::VersionMissing(0))
    ));
}

#[test]
fn orphans_account_for_every_displaced_node() {
    let mut tree = tree_with_bytes(0..8);
    tree.commit().unwrap();
    tree.set(&[0x03], b"updated").unwrap();
    tree.commit().unwrap();

    // Updating one leaf displaces it and every inner node on its path.
    let orphans = tree.store().orphans_in(1, 2).unwrap();
    assert!(!orphans.is_empty());
    for orphan in &orphans {
        assert_eq!(orphan.birth, 1);
        assert_eq!(orphan.until, 2);
    }

    // No orphan is reachable from the latest root.
    let mut live = Vec::new();
    let root = tree.root_at(2).unwrap();
    reachable(tree.store(), &root, &mut live);
    for orphan in &orphans {
        assert!(!live.contains(&orphan.hash));
    }
}

#[test]
fn pruning_keeps_retained_versions_whole() {
    let mut tree = tree_with_bytes(0..8);
    tree.commit().unwrap();
    tree.set(&[0x02], b"two").unwrap();
    tree.commit().unwrap();
    tree.set(&[0x05], b"five").unwrap();
    tree.commit().unwrap();

    assert!(!tree.store().prunable(1, 2).unwrap().is_empty());
    let stats = tree.store_mut().prune(1, 2).unwrap();
    assert_eq!(stats.versions_pruned, 2);
    assert!(stats.nodes_deleted > 0);

    assert!(matches!(tree.root_at(1), Err(TreeError::VersionMissing(1))));
    assert!(matches!(tree.root_at(2), Err(TreeError::VersionMissing(2))));

    // Every node of the surviving version is still materializable.
    let mut live = Vec::new();
    let root = tree.root_at(3).unwrap();
    reachable(tree.store(), &root, &mut live);
    assert_eq!(live.len() as u64, 2 * root.size() - 1);
    assert_eq!(tree.get_versioned(&[0x05], 3).unwrap().1, Some(b"five".to_vec()));

    // Pruning up to the newest version is refused.
    assert!(matches!(
        tree.store_mut().prune(3, 3),
        Err(TreeError::InvalidRange)
    ));
}

#[test]
fn set_then_remove_round_trips() {
    let mut tree = tree_with_bytes(0..10);
    tree.commit().unwrap();

    tree.set(b"extra", b"value").unwrap();
    tree.remove(b"extra").unwrap();
    assert!(!tree.has(b"extra").unwrap());
    assert_eq!(tree.size(), 10);
    check_invariants(&tree);

    let (before, _) = tree.remove(&[0x07]).unwrap();
    tree.set(&[0x07], &before.unwrap()).unwrap();
    assert_eq!(tree.get(&[0x07]).unwrap(), (7, Some(vec![0x07])));
    check_invariants(&tree);
}

#[test]
fn proofs_on_an_empty_tree_are_empty() {
    let tree = Tree::in_memory().unwrap();
    let hasher = Sha256TreeHasher;
    assert_eq!(tree.hash(), hasher.empty_digest());

    let (value, proof) = tree.get_with_proof(b"anything").unwrap();
    assert_eq!(value, None);
    assert_eq!(
        proof.verify(&hasher, &tree.hash()),
        Err(ProofError::Empty)
    );
}

#[test]
fn every_key_is_provable_or_provably_absent() {
    let mut tree = Tree::in_memory().unwrap();
    for byte in (1..20u8).step_by(2) {
        tree.set(&[byte], &[byte, byte]).unwrap();
    }
    tree.commit().unwrap();
    let hasher = Sha256TreeHasher;
    let root = tree.hash();

    for key in 0..=20u8 {
        let (value, proof) = tree.get_with_proof(&[key]).unwrap();
        match value {
            Some(value) => {
                assert_eq!(value, vec![key, key]);
                proof.verify_item(&hasher, &root, &[key], &value).unwrap();
            }
            None => proof.verify_absence(&hasher, &root, &[key]).unwrap(),
        }
    }
}

proptest! {
    #[test]
    fn random_edits_preserve_every_invariant(
        ops in prop::collection::vec((any::<bool>(), 0u8..24, any::<u8>()), 1..120),
    ) {
        let mut tree = Tree::in_memory().unwrap();
        let mut model: BTreeMap<Vec<u8>, Vec<u8>> = BTreeMap::new();

        for (insert, key, value) in ops {
            let key = vec![key];
            if insert {
                let updated = tree.set(&key, &[value]).unwrap();
                prop_assert_eq!(updated, model.contains_key(&key));
                model.insert(key, vec![value]);
            } else {
                let (removed, did_remove) = tree.remove(&key).unwrap();
                prop_assert_eq!(did_remove, model.remove(&key).is_some());
                if !did_remove {
                    prop_assert_eq!(removed, None);
                }
            }
        }

        check_invariants(&tree);
        prop_assert_eq!(tree.size(), model.len() as u64);

        let contents = collect(&tree, true);
        let expected: Vec<(Vec<u8>, Vec<u8>)> =
            model.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
        prop_assert_eq!(contents, expected);

        // In-order indices agree with the model's sorted order.
        for (position, key) in model.keys().enumerate() {
            let (index, value) = tree.get(key).unwrap();
            prop_assert_eq!(index, position as u64);
            prop_assert_eq!(value.as_ref(), model.get(key));
        }
    }

    #[test]
    fn random_trees_prove_membership_and_absence(
        keys in prop::collection::btree_set(0u8..48, 1..24),
    ) {
        let mut tree = Tree::in_memory().unwrap();
        for key in &keys {
            tree.set(&[*key], &[*key]).unwrap();
        }
        tree.commit().unwrap();
        let hasher = Sha256TreeHasher;
        let root = tree.hash();

        for key in 0..48u8 {
            let (value, proof) = tree.get_with_proof(&[key]).unwrap();
            if keys.contains(&key) {
                prop_assert_eq!(value.clone(), Some(vec![key]));
                proof.verify_item(&hasher, &root, &[key], &[key]).unwrap();
            } else {
                prop_assert_eq!(value, None);
                proof.verify_absence(&hasher, &root, &[key]).unwrap();
            }
        }
    }

    #[test]
    fn commit_rollback_is_hash_stable(
        base in prop::collection::btree_map(any::<u8>(), any::<u8>(), 1..24),
        edits in prop::collection::vec((any::<bool>(), any::<u8>(), any::<u8>()), 1..24),
    ) {
        let mut tree = Tree::in_memory().unwrap();
        for (key, value) in &base {
            tree.set(&[*key], &[*value]).unwrap();
        }
        tree.commit().unwrap();
        let committed = tree.working_hash();

        for (insert, key, value) in edits {
            if insert {
                tree.set(&[key], &[value]).unwrap();
            } else {
                tree.remove(&[key]).unwrap();
            }
        }
        tree.rollback().unwrap();
        prop_assert_eq!(tree.working_hash(), committed);
    }
}
