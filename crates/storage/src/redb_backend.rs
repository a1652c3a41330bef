// Path: crates/storage/src/redb_backend.rs

use arbor_api::backend::{
    CommitBatch, NodeBackend, NodeRecord, OrphanRecord, PruneStats, StorageError,
};
use arbor_types::{NodeHash, Version};
use parity_scale_codec::{Decode, Encode};
use redb::{Database, ReadableTable, TableDefinition};
use std::collections::BTreeMap;
use std::path::Path;

/// ---- Table definitions (single DB) ----
/// Content-addressed node records, split by variant.
const LEAVES: TableDefinition<&[u8; 32], &[u8]> = TableDefinition::new("LEAVES");
const INNERS: TableDefinition<&[u8; 32], &[u8]> = TableDefinition::new("INNERS");
/// version_be(8) -> root digest.
const ROOTS: TableDefinition<&[u8; 8], &[u8; 32]> = TableDefinition::new("ROOTS");
/// node digest -> [birth_be(8)][until_be(8)].
const ORPHANS: TableDefinition<&[u8; 32], &[u8; 16]> = TableDefinition::new("ORPHANS");
/// Layout metadata; holds the schema tag.
const META: TableDefinition<&str, &str> = TableDefinition::new("META");

const SCHEMA: &str = "v1";

fn enc_version(version: Version) -> [u8; 8] {
    (version as u64).to_be_bytes()
}

fn dec_version(bytes: &[u8; 8]) -> Version {
    u64::from_be_bytes(*bytes) as Version
}

fn enc_orphan(birth: Version, until: Version) -> [u8; 16] {
    let mut out = [0u8; 16];
    out[..8].copy_from_slice(&enc_version(birth));
    out[8..].copy_from_slice(&enc_version(until));
    out
}

fn dec_orphan(bytes: &[u8; 16]) -> (Version, Version) {
    let mut birth = [0u8; 8];
    let mut until = [0u8; 8];
    birth.copy_from_slice(&bytes[..8]);
    until.copy_from_slice(&bytes[8..]);
    (dec_version(&birth), dec_version(&until))
}

/// Durable node backend over a single redb database.
pub struct RedbBackend {
    db: Database,
}

impl RedbBackend {
    /// Create or open the database at `path`, ensuring the tables exist
    /// and the schema tag matches.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        let db = Database::create(path).map_err(|e| StorageError::Backend(e.to_string()))?;
        {
            let w = db
                .begin_write()
                .map_err(|e| StorageError::Backend(e.to_string()))?;
            {
                w.open_table(LEAVES)
                    .map_err(|e| StorageError::Backend(e.to_string()))?;
                w.open_table(INNERS)
                    .map_err(|e| StorageError::Backend(e.to_string()))?;
                w.open_table(ROOTS)
                    .map_err(|e| StorageError::Backend(e.to_string()))?;
                w.open_table(ORPHANS)
                    .map_err(|e| StorageError::Backend(e.to_string()))?;
                let mut meta = w
                    .open_table(META)
                    .map_err(|e| StorageError::Backend(e.to_string()))?;
                let schema = meta
                    .get("schema")
                    .map_err(|e| StorageError::Backend(e.to_string()))?
                    .map(|g| g.value().to_string());
                match schema {
                    None => {
                        meta.insert("schema", SCHEMA)
                            .map_err(|e| StorageError::Backend(e.to_string()))?;
                    }
                    Some(tag) if tag == SCHEMA => {}
                    Some(tag) => {
                        return Err(StorageError::Backend(format!(
                            "unsupported schema {tag}, expected {SCHEMA}"
                        )))
                    }
                }
            }
            w.commit()
                .map_err(|e| StorageError::Backend(e.to_string()))?;
        }
        Ok(Self { db })
    }

    fn get_record(
        table: &impl ReadableTable<&'static [u8; 32], &'static [u8]>,
        hash: &NodeHash,
    ) -> Result<Option<NodeRecord>, StorageError> {
        let bytes = match table
            .get(&hash.0)
            .map_err(|e| StorageError::Backend(e.to_string()))?
        {
            Some(guard) => guard.value().to_vec(),
            None => return Ok(None),
        };
        let record = NodeRecord::decode(&mut bytes.as_slice())
            .map_err(|e| StorageError::Decode(e.to_string()))?;
        Ok(Some(record))
    }
}

impl NodeBackend for RedbBackend {
    fn node(&self, hash: &NodeHash) -> Result<Option<NodeRecord>, StorageError> {
        let r = self
            .db
            .begin_read()
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        let leaves = r
            .open_table(LEAVES)
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        if let Some(record) = Self::get_record(&leaves, hash)? {
            return Ok(Some(record));
        }
        let inners = r
            .open_table(INNERS)
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        Self::get_record(&inners, hash)
    }

    fn roots(&self) -> Result<BTreeMap<Version, NodeHash>, StorageError> {
        let r = self
            .db
            .begin_read()
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        let table = r
            .open_table(ROOTS)
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        let mut roots = BTreeMap::new();
        for entry in table
            .iter()
            .map_err(|e| StorageError::Backend(e.to_string()))?
        {
            let (key, value) = entry.map_err(|e| StorageError::Backend(e.to_string()))?;
            roots.insert(dec_version(key.value()), NodeHash(*value.value()));
        }
        Ok(roots)
    }

    fn commit(&self, batch: &CommitBatch<'_>) -> Result<(), StorageError> {
        let w = self
            .db
            .begin_write()
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        {
            let mut leaves = w
                .open_table(LEAVES)
                .map_err(|e| StorageError::Backend(e.to_string()))?;
            let mut inners = w
                .open_table(INNERS)
                .map_err(|e| StorageError::Backend(e.to_string()))?;
            for (hash, record) in batch.new_nodes {
                let bytes = record.encode();
                match record {
                    NodeRecord::Leaf { .. } => {
                        leaves
                            .insert(&hash.0, bytes.as_slice())
                            .map_err(|e| StorageError::Backend(e.to_string()))?;
                    }
                    NodeRecord::Inner { .. } => {
                        inners
                            .insert(&hash.0, bytes.as_slice())
                            .map_err(|e| StorageError::Backend(e.to_string()))?;
                    }
                }
            }
            let mut orphans = w
                .open_table(ORPHANS)
                .map_err(|e| StorageError::Backend(e.to_string()))?;
            for (hash, birth) in batch.orphans {
                orphans
                    .insert(&hash.0, &enc_orphan(*birth, batch.version))
                    .map_err(|e| StorageError::Backend(e.to_string()))?;
            }
            let mut roots = w
                .open_table(ROOTS)
                .map_err(|e| StorageError::Backend(e.to_string()))?;
            roots
                .insert(&enc_version(batch.version), &batch.root.0)
                .map_err(|e| StorageError::Backend(e.to_string()))?;
        }
        w.commit()
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        log::debug!(
            "persisted version {} ({} nodes, {} orphans)",
            batch.version,
            batch.new_nodes.len(),
            batch.orphans.len()
        );
        Ok(())
    }

    fn delete_from(&self, version: Version) -> Result<(), StorageError> {
        let w = self
            .db
            .begin_write()
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        {
            let mut roots = w
                .open_table(ROOTS)
                .map_err(|e| StorageError::Backend(e.to_string()))?;
            let doomed_roots: Vec<[u8; 8]> = {
                let mut found = Vec::new();
                for entry in roots
                    .iter()
                    .map_err(|e| StorageError::Backend(e.to_string()))?
                {
                    let (key, _) = entry.map_err(|e| StorageError::Backend(e.to_string()))?;
                    if dec_version(key.value()) >= version {
                        found.push(*key.value());
                    }
                }
                found
            };
            for key in &doomed_roots {
                roots
                    .remove(key)
                    .map_err(|e| StorageError::Backend(e.to_string()))?;
            }

            // Orphans displaced at or after the deleted versions are
            // reachable again.
            let mut orphans = w
                .open_table(ORPHANS)
                .map_err(|e| StorageError::Backend(e.to_string()))?;
            let reinstated: Vec<[u8; 32]> = {
                let mut found = Vec::new();
                for entry in orphans
                    .iter()
                    .map_err(|e| StorageError::Backend(e.to_string()))?
                {
                    let (key, value) = entry.map_err(|e| StorageError::Backend(e.to_string()))?;
                    let (_, until) = dec_orphan(value.value());
                    if until >= version {
                        found.push(*key.value());
                    }
                }
                found
            };
            for key in &reinstated {
                orphans
                    .remove(key)
                    .map_err(|e| StorageError::Backend(e.to_string()))?;
            }

            for table in [LEAVES, INNERS] {
                let mut nodes = w
                    .open_table(table)
                    .map_err(|e| StorageError::Backend(e.to_string()))?;
                let doomed: Vec<[u8; 32]> = {
                    let mut found = Vec::new();
                    for entry in nodes
                        .iter()
                        .map_err(|e| StorageError::Backend(e.to_string()))?
                    {
                        let (key, value) =
                            entry.map_err(|e| StorageError::Backend(e.to_string()))?;
                        let record = NodeRecord::decode(&mut value.value())
                            .map_err(|e| StorageError::Decode(e.to_string()))?;
                        if record.version() >= version {
                            found.push(*key.value());
                        }
                    }
                    found
                };
                for key in &doomed {
                    nodes
                        .remove(key)
                        .map_err(|e| StorageError::Backend(e.to_string()))?;
                }
            }
        }
        w.commit()
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        log::debug!("deleted persisted versions >= {}", version);
        Ok(())
    }

    fn orphans_in(&self, lo: Version, hi: Version) -> Result<Vec<OrphanRecord>, StorageError> {
        let r = self
            .db
            .begin_read()
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        let table = r
            .open_table(ORPHANS)
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        let mut found = Vec::new();
        for entry in table
            .iter()
            .map_err(|e| StorageError::Backend(e.to_string()))?
        {
            let (key, value) = entry.map_err(|e| StorageError::Backend(e.to_string()))?;
            let (birth, until) = dec_orphan(value.value());
            if birth >= lo && until <= hi {
                found.push(OrphanRecord {
                    hash: NodeHash(*key.value()),
                    birth,
                    until,
                });
            }
        }
        found.sort_by_key(|o| (o.until, o.hash));
        Ok(found)
    }

    fn prune(&self, lo: Version, hi: Version) -> Result<PruneStats, StorageError> {
        let doomed = self.orphans_in(lo, hi)?;
        let w = self
            .db
            .begin_write()
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        let mut versions_pruned = 0;
        {
            let mut leaves = w
                .open_table(LEAVES)
                .map_err(|e| StorageError::Backend(e.to_string()))?;
            let mut inners = w
                .open_table(INNERS)
                .map_err(|e| StorageError::Backend(e.to_string()))?;
            let mut orphans = w
                .open_table(ORPHANS)
                .map_err(|e| StorageError::Backend(e.to_string()))?;
            for orphan in &doomed {
                leaves
                    .remove(&orphan.hash.0)
                    .map_err(|e| StorageError::Backend(e.to_string()))?;
                inners
                    .remove(&orphan.hash.0)
                    .map_err(|e| StorageError::Backend(e.to_string()))?;
                orphans
                    .remove(&orphan.hash.0)
                    .map_err(|e| StorageError::Backend(e.to_string()))?;
            }

            let mut roots = w
                .open_table(ROOTS)
                .map_err(|e| StorageError::Backend(e.to_string()))?;
            let doomed_roots: Vec<[u8; 8]> = {
                let mut found = Vec::new();
                for entry in roots
                    .iter()
                    .map_err(|e| StorageError::Backend(e.to_string()))?
                {
                    let (key, _) = entry.map_err(|e| StorageError::Backend(e.to_string()))?;
                    let v = dec_version(key.value());
                    if v >= lo && v <= hi {
                        found.push(*key.value());
                    }
                }
                found
            };
            versions_pruned += doomed_roots.len();
            for key in &doomed_roots {
                roots
                    .remove(key)
                    .map_err(|e| StorageError::Backend(e.to_string()))?;
            }
        }
        w.commit()
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        log::debug!(
            "pruned versions {}..={}: {} nodes dropped",
            lo,
            hi,
            doomed.len()
        );
        Ok(PruneStats {
            versions_pruned,
            nodes_deleted: doomed.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arbor_api::hash::Sha256TreeHasher;
    use arbor_state::Tree;

    fn open_tree(path: &Path) -> Tree<RedbBackend> {
        Tree::open(RedbBackend::open(path).unwrap(), Sha256TreeHasher).unwrap()
    }

    #[test]
    fn history_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.redb");

        let root1;
        {
            let mut tree = open_tree(&path);
            for byte in 0..10u8 {
                tree.set(&[byte], &[byte]).unwrap();
            }
            let (root, version) = tree.commit().unwrap();
            assert_eq!(version, 1);
            root1 = root;
            tree.set(&[0x03], b"updated").unwrap();
            tree.commit().unwrap();
        }

        let tree = open_tree(&path);
        assert_eq!(tree.versions(), vec![0, 1, 2]);
        assert_eq!(tree.version(), 3);
        assert_eq!(tree.size(), 10);
        assert_eq!(
            tree.get_versioned(&[0x03], 1).unwrap().1,
            Some(vec![0x03])
        );
        assert_eq!(
            tree.get_versioned(&[0x03], 2).unwrap().1,
            Some(b"updated".to_vec())
        );
        assert_eq!(tree.root_at(1).unwrap().hash(), &root1);

        // Proofs still come straight off disk.
        let hasher = Sha256TreeHasher;
        let (value, proof) = tree.get_versioned_with_proof(&[0x07], 1).unwrap();
        assert_eq!(value, Some(vec![0x07]));
        proof.verify_item(&hasher, &root1, &[0x07], &[0x07]).unwrap();
    }

    #[test]
    fn delete_last_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.redb");

        {
            let mut tree = open_tree(&path);
            for byte in 0..8u8 {
                tree.set(&[byte], &[byte]).unwrap();
            }
            tree.commit().unwrap();
            tree.set(&[0x02], b"two").unwrap();
            tree.commit().unwrap();
            tree.set(&[0x05], b"five").unwrap();
            tree.commit().unwrap();

            tree.delete_last().unwrap();
            assert_eq!(tree.versions(), vec![0, 1, 2]);
        }

        // The deleted version is gone on disk and the nodes it displaced
        // are reachable again.
        let tree = open_tree(&path);
        assert_eq!(tree.versions(), vec![0, 1, 2]);
        assert_eq!(tree.get_versioned(&[0x05], 2).unwrap().1, Some(vec![0x05]));
        assert_eq!(tree.get_versioned(&[0x02], 2).unwrap().1, Some(b"two".to_vec()));
    }

    #[test]
    fn pruning_rewrites_disk_state() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.redb");

        {
            let mut tree = open_tree(&path);
            for byte in 0..8u8 {
                tree.set(&[byte], &[byte]).unwrap();
            }
            tree.commit().unwrap();
            tree.set(&[0x02], b"two").unwrap();
            tree.commit().unwrap();
            tree.set(&[0x05], b"five").unwrap();
            tree.commit().unwrap();

            let stats = tree.store_mut().prune(1, 2).unwrap();
            assert_eq!(stats.versions_pruned, 2);
            assert!(stats.nodes_deleted > 0);
        }

        let tree = open_tree(&path);
        assert_eq!(tree.versions(), vec![0, 3]);
        assert!(tree.root_at(1).is_err());
        assert_eq!(tree.get_versioned(&[0x02], 3).unwrap().1, Some(b"two".to_vec()));
        assert_eq!(tree.get_versioned(&[0x05], 3).unwrap().1, Some(b"five".to_vec()));
        assert_eq!(tree.get_versioned(&[0x07], 3).unwrap().1, Some(vec![0x07]));
    }

    #[test]
    fn empty_store_reopens_at_version_zero() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.redb");
        {
            let tree = open_tree(&path);
            assert_eq!(tree.versions(), vec![0]);
        }
        let tree = open_tree(&path);
        assert_eq!(tree.versions(), vec![0]);
        assert_eq!(tree.version(), 1);
        assert_eq!(tree.size(), 0);
    }
}
