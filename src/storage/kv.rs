//! KV store adapter (spec.md §4.1).
//!
//! The teacher crate backs this contract with a full multi-level LSM tree
//! (`storage::lsm`, with memtables, SSTables, bloom filters and background
//! compaction) sized for a vector-search workload. This spec's KV surface
//! is the much smaller "RocksDB key/value + iterator + batch +
//! backup/restore" surface `spec.md` §1 calls out as the only assumed
//! slice of that dependency, so the adapter here collapses the teacher's
//! engine to one in-memory ordered map plus one Snappy-compressed,
//! CRC-framed segment file per flush/backup — the teacher's "memtable +
//! immutable segment" shape with compaction removed.

use crate::error::{DbError, Result};
use crate::storage::checksum::Checksum;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::debug;

type KMap = BTreeMap<Vec<u8>, Vec<u8>>;

/// One staged mutation in a write batch.
#[derive(Debug, Clone)]
enum BatchOp {
    Put(Vec<u8>, Vec<u8>),
    Delete(Vec<u8>),
}

/// Atomic write batch: either every staged operation is applied, or none
/// are (`commit` takes `self` by value so a dropped, uncommitted batch is
/// simply discarded).
pub struct WriteBatch<'a> {
    store: &'a FileKvStore,
    ops: Vec<BatchOp>,
}

impl<'a> WriteBatch<'a> {
    pub fn put(&mut self, key: &[u8], value: &[u8]) -> &mut Self {
        self.ops.push(BatchOp::Put(key.to_vec(), value.to_vec()));
        self
    }

    pub fn delete(&mut self, key: &[u8]) -> &mut Self {
        self.ops.push(BatchOp::Delete(key.to_vec()));
        self
    }

    pub fn commit(self) -> Result<()> {
        self.store.ensure_open()?;
        let mut map = self.store.map.write();
        for op in self.ops {
            match op {
                BatchOp::Put(k, v) => {
                    map.insert(k, v);
                }
                BatchOp::Delete(k) => {
                    map.remove(&k);
                }
            }
        }
        Ok(())
    }
}

/// A point-in-time, sorted snapshot of the store's contents at iterator
/// construction, exposing the teacher's cursor-style API
/// (`seek_to_first`/`seek`/`next`/`is_valid`/`key`/`value`).
pub struct KvIterator {
    entries: Vec<(Vec<u8>, Vec<u8>)>,
    pos: Option<usize>,
}

impl KvIterator {
    fn new(entries: Vec<(Vec<u8>, Vec<u8>)>) -> Self {
        Self { entries, pos: None }
    }

    pub fn seek_to_first(&mut self) {
        self.pos = if self.entries.is_empty() { None } else { Some(0) };
    }

    pub fn seek(&mut self, key: &[u8]) {
        match self.entries.binary_search_by(|(k, _)| k.as_slice().cmp(key)) {
            Ok(idx) => self.pos = Some(idx),
            Err(idx) => self.pos = if idx < self.entries.len() { Some(idx) } else { None },
        }
    }

    pub fn next(&mut self) {
        self.pos = match self.pos {
            Some(idx) if idx + 1 < self.entries.len() => Some(idx + 1),
            _ => None,
        };
    }

    pub fn is_valid(&self) -> bool {
        self.pos.is_some()
    }

    pub fn key(&self) -> Option<&[u8]> {
        self.pos.map(|idx| self.entries[idx].0.as_slice())
    }

    pub fn value(&self) -> Option<&[u8]> {
        self.pos.map(|idx| self.entries[idx].1.as_slice())
    }
}

#[derive(Serialize, Deserialize)]
struct Segment {
    entries: Vec<(Vec<u8>, Vec<u8>)>,
}

/// In-memory, ordered KV adapter with file-backed backup/restore.
pub struct FileKvStore {
    map: RwLock<KMap>,
    closed: AtomicBool,
}

impl FileKvStore {
    pub fn new() -> Self {
        Self {
            map: RwLock::new(BTreeMap::new()),
            closed: AtomicBool::new(false),
        }
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(DbError::DatabaseClosed);
        }
        Ok(())
    }

    pub fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        self.ensure_open()?;
        self.map.write().insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        self.ensure_open()?;
        Ok(self.map.read().get(key).cloned())
    }

    pub fn delete(&self, key: &[u8]) -> Result<()> {
        self.ensure_open()?;
        self.map.write().remove(key);
        Ok(())
    }

    pub fn iterate(&self) -> Result<KvIterator> {
        self.ensure_open()?;
        let entries: Vec<_> = self
            .map
            .read()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        let mut it = KvIterator::new(entries);
        it.seek_to_first();
        Ok(it)
    }

    pub fn batch(&self) -> WriteBatch<'_> {
        WriteBatch {
            store: self,
            ops: Vec::new(),
        }
    }

    /// Snapshot the full key space to `dir/kv.segment`, Snappy-compressed
    /// and CRC-framed, mirroring the teacher's SSTable write path.
    pub fn create_backup(&self, dir: &Path) -> Result<()> {
        self.ensure_open()?;
        fs::create_dir_all(dir)?;
        let entries: Vec<_> = self
            .map
            .read()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        let count = entries.len();
        let segment = Segment { entries };
        let raw = bincode::serialize(&segment)?;
        let compressed = snap::raw::Encoder::new()
            .compress_vec(&raw)
            .map_err(|e| DbError::Serialization(e.to_string()))?;
        let crc = Checksum::compute(&compressed);

        let path = dir.join("kv.segment");
        let mut buf = Vec::with_capacity(4 + compressed.len());
        buf.extend_from_slice(&crc.to_le_bytes());
        buf.extend_from_slice(&compressed);
        fs::write(&path, &buf)?;
        debug!(entries = count, path = %path.display(), "kv backup written");
        Ok(())
    }

    pub fn restore_from_backup(&self, dir: &Path) -> Result<()> {
        self.ensure_open()?;
        let path = dir.join("kv.segment");
        let buf = fs::read(&path).map_err(|_| DbError::BackupNotFound(path.display().to_string()))?;
        if buf.len() < 4 {
            return Err(DbError::BackupCorrupted("kv segment truncated".into()));
        }
        let crc = u32::from_le_bytes(buf[0..4].try_into().unwrap());
        let compressed = &buf[4..];
        Checksum::verify(compressed, crc)
            .map_err(|e| DbError::BackupCorrupted(e.to_string()))?;
        let raw = snap::raw::Decoder::new()
            .decompress_vec(compressed)
            .map_err(|e| DbError::BackupCorrupted(e.to_string()))?;
        let segment: Segment = bincode::deserialize(&raw)?;

        let mut map = self.map.write();
        map.clear();
        for (k, v) in segment.entries {
            map.insert(k, v);
        }
        Ok(())
    }

    pub fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::Release);
        Ok(())
    }

    pub fn reopen(&self) {
        self.closed.store(false, Ordering::Release);
    }

    pub fn len(&self) -> usize {
        self.map.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for FileKvStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn put_get_delete() {
        let store = FileKvStore::new();
        store.put(b"a", b"1").unwrap();
        assert_eq!(store.get(b"a").unwrap(), Some(b"1".to_vec()));
        store.delete(b"a").unwrap();
        assert_eq!(store.get(b"a").unwrap(), None);
    }

    #[test]
    fn iterator_is_ordered() {
        let store = FileKvStore::new();
        store.put(b"c", b"3").unwrap();
        store.put(b"a", b"1").unwrap();
        store.put(b"b", b"2").unwrap();

        let mut it = store.iterate().unwrap();
        let mut keys = Vec::new();
        while it.is_valid() {
            keys.push(it.key().unwrap().to_vec());
            it.next();
        }
        assert_eq!(keys, vec![b"a".to_vec(), b"b".to_vec(), b"c".to_vec()]);
    }

    #[test]
    fn batch_applies_atomically() {
        let store = FileKvStore::new();
        store.put(b"x", b"old").unwrap();
        let mut batch = store.batch();
        batch.put(b"x", b"new");
        batch.put(b"y", b"1");
        batch.delete(b"missing");
        batch.commit().unwrap();

        assert_eq!(store.get(b"x").unwrap(), Some(b"new".to_vec()));
        assert_eq!(store.get(b"y").unwrap(), Some(b"1".to_vec()));
    }

    #[test]
    fn dropped_batch_is_discarded() {
        let store = FileKvStore::new();
        {
            let mut batch = store.batch();
            batch.put(b"never", b"applied");
        }
        assert_eq!(store.get(b"never").unwrap(), None);
    }

    #[test]
    fn backup_restore_round_trip() {
        let dir = tempdir().unwrap();
        let store = FileKvStore::new();
        store.put(b"k1", b"v1").unwrap();
        store.put(b"k2", b"v2").unwrap();
        store.create_backup(dir.path()).unwrap();

        let restored = FileKvStore::new();
        restored.restore_from_backup(dir.path()).unwrap();
        assert_eq!(restored.get(b"k1").unwrap(), Some(b"v1".to_vec()));
        assert_eq!(restored.len(), 2);
    }

    #[test]
    fn closed_store_rejects_operations() {
        let store = FileKvStore::new();
        store.close().unwrap();
        assert!(matches!(store.get(b"a"), Err(DbError::DatabaseClosed)));
    }
}
