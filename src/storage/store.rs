//! A single named, byte-ordered key/value store.
//!
//! Backed by a `BTreeMap`, which iterates in byte order of its `Vec<u8>`
//! keys — exactly the ordering the `Symbol` store needs for file-major
//! prefix scans (spec.md §4.1), with no custom comparator required.
//! Persisted as one bincode blob per store, written atomically via a
//! temp-file-then-rename, the same pattern the teacher's persistence
//! layer uses.

use crate::error::{IndexError, IndexResult};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub struct Store {
    name: &'static str,
    path: PathBuf,
    map: Arc<RwLock<BTreeMap<Vec<u8>, Vec<u8>>>>,
}

impl Store {
    /// Open (or create) the store at `dir/<name>.bin`.
    ///
    /// Idempotent: an existing blob is loaded, otherwise an empty map is
    /// created on first persist.
    pub fn open(dir: &Path, name: &'static str) -> IndexResult<Self> {
        fs::create_dir_all(dir).map_err(|e| IndexError::StoreOpenFailed {
            path: dir.to_path_buf(),
            reason: e.to_string(),
        })?;
        let path = dir.join(format!("{name}.bin"));
        let map = if path.exists() {
            let bytes = fs::read(&path).map_err(|e| IndexError::StoreOpenFailed {
                path: path.clone(),
                reason: e.to_string(),
            })?;
            bincode::deserialize(&bytes).map_err(|e| IndexError::StoreOpenFailed {
                path: path.clone(),
                reason: e.to_string(),
            })?
        } else {
            BTreeMap::new()
        };
        Ok(Self {
            name,
            path,
            map: Arc::new(RwLock::new(map)),
        })
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn get(&self, key: &[u8]) -> Option<Vec<u8>> {
        self.map.read().get(key).cloned()
    }

    pub fn put(&self, key: Vec<u8>, value: Vec<u8>) {
        self.map.write().insert(key, value);
    }

    pub fn delete(&self, key: &[u8]) {
        self.map.write().remove(key);
    }

    pub fn len(&self) -> usize {
        self.map.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.read().is_empty()
    }

    /// Keys/values in `[floor, ceiling)`, collected under one read lock.
    pub fn range(&self, floor: &[u8], ceiling: &[u8]) -> Vec<(Vec<u8>, Vec<u8>)> {
        self.map
            .read()
            .range(floor.to_vec()..ceiling.to_vec())
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    pub fn prefix(&self, prefix: &[u8]) -> Vec<(Vec<u8>, Vec<u8>)> {
        self.map
            .read()
            .range(prefix.to_vec()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Acquire the store's read lock for the caller's lifetime (spec.md
    /// §4.1: a scoped handle holds its lock for as long as it lives, so
    /// writers wait out any outstanding reader).
    pub(super) fn read_guard(&self) -> parking_lot::RwLockReadGuard<'_, BTreeMap<Vec<u8>, Vec<u8>>> {
        self.map.read()
    }

    /// Acquire the store's write lock for the caller's lifetime (see
    /// `read_guard`).
    pub(super) fn write_guard(&self) -> parking_lot::RwLockWriteGuard<'_, BTreeMap<Vec<u8>, Vec<u8>>> {
        self.map.write()
    }

    /// Serialize and atomically persist an already-locked snapshot of the
    /// map, without taking a fresh lock — used by a `StoreHandleMut` that
    /// is already holding the write guard for its own lifetime.
    pub(super) fn persist_locked(&self, map: &BTreeMap<Vec<u8>, Vec<u8>>) -> IndexResult<()> {
        let bytes = bincode::serialize(map).map_err(|e| IndexError::BatchWriteFailed {
            store: self.name.to_string(),
            reason: e.to_string(),
        })?;

        let temp_path = self.path.with_extension("tmp");
        fs::write(&temp_path, bytes).map_err(|e| IndexError::BatchWriteFailed {
            store: self.name.to_string(),
            reason: e.to_string(),
        })?;
        fs::rename(&temp_path, &self.path).map_err(|e| IndexError::BatchWriteFailed {
            store: self.name.to_string(),
            reason: e.to_string(),
        })?;
        Ok(())
    }

    /// Write the current map to disk, atomically.
    pub fn persist(&self) -> IndexResult<()> {
        let snapshot = self.map.read();
        self.persist_locked(&snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn open_creates_empty_store() {
        let dir = TempDir::new().unwrap();
        let store = Store::open(dir.path(), "General").unwrap();
        assert!(store.is_empty());
    }

    #[test]
    fn put_then_persist_then_reopen_roundtrips() {
        let dir = TempDir::new().unwrap();
        {
            let store = Store::open(dir.path(), "General").unwrap();
            store.put(b"k".to_vec(), b"v".to_vec());
            store.persist().unwrap();
        }
        let reopened = Store::open(dir.path(), "General").unwrap();
        assert_eq!(reopened.get(b"k"), Some(b"v".to_vec()));
    }

    #[test]
    fn range_respects_byte_order() {
        let dir = TempDir::new().unwrap();
        let store = Store::open(dir.path(), "Symbol").unwrap();
        store.put(vec![0, 0, 0, 1], b"a".to_vec());
        store.put(vec![0, 0, 0, 2], b"b".to_vec());
        store.put(vec![0, 0, 0, 3], b"c".to_vec());
        let got = store.range(&[0, 0, 0, 1], &[0, 0, 0, 3]);
        assert_eq!(got.len(), 2);
        assert_eq!(got[0].1, b"a");
        assert_eq!(got[1].1, b"b");
    }

    #[test]
    fn prefix_stops_at_boundary() {
        let dir = TempDir::new().unwrap();
        let store = Store::open(dir.path(), "SymbolName").unwrap();
        store.put(b"foo:1".to_vec(), b"a".to_vec());
        store.put(b"foo:2".to_vec(), b"b".to_vec());
        store.put(b"foz".to_vec(), b"c".to_vec());
        let got = store.prefix(b"foo");
        assert_eq!(got.len(), 2);
    }
}
