//! Scoped read/write handles over a store (spec.md §4.1 "mediated by a
//! scoped read/write handle" rule). A handle acquires the store's
//! `RwLock` up front and holds the guard for its entire lifetime, so a
//! writer blocks out any reader holding a handle (and vice versa)
//! instead of the lock being re-acquired per call.

use super::batch::Batch;
use super::store::Store;
use parking_lot::{RwLockReadGuard, RwLockWriteGuard};
use std::cell::RefCell;
use std::collections::BTreeMap;

pub struct StoreHandle<'a> {
    guard: RwLockReadGuard<'a, BTreeMap<Vec<u8>, Vec<u8>>>,
}

impl<'a> StoreHandle<'a> {
    pub fn new(store: &'a Store) -> Self {
        Self {
            guard: store.read_guard(),
        }
    }

    pub fn get(&self, key: &[u8]) -> Option<Vec<u8>> {
        self.guard.get(key).cloned()
    }

    pub fn range(&self, floor: &[u8], ceiling: &[u8]) -> Vec<(Vec<u8>, Vec<u8>)> {
        self.guard
            .range(floor.to_vec()..ceiling.to_vec())
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    pub fn prefix(&self, prefix: &[u8]) -> Vec<(Vec<u8>, Vec<u8>)> {
        self.guard
            .range(prefix.to_vec()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.guard.len()
    }

    pub fn is_empty(&self) -> bool {
        self.guard.is_empty()
    }
}

/// Writer handle. The write guard sits behind a `RefCell` rather than
/// being taken `&mut` so `get`/`put`/`delete`/`batch` can all stay `&self`
/// — the same way a `Batch` borrowed from this handle keeps reading and
/// writing through it without the handle needing to be re-acquired.
pub struct StoreHandleMut<'a> {
    store: &'a Store,
    guard: RefCell<RwLockWriteGuard<'a, BTreeMap<Vec<u8>, Vec<u8>>>>,
    flush_threshold_bytes: usize,
}

impl<'a> StoreHandleMut<'a> {
    pub fn new(store: &'a Store, flush_threshold_bytes: usize) -> Self {
        Self {
            store,
            guard: RefCell::new(store.write_guard()),
            flush_threshold_bytes,
        }
    }

    pub fn get(&self, key: &[u8]) -> Option<Vec<u8>> {
        self.guard.borrow().get(key).cloned()
    }

    pub fn put(&self, key: Vec<u8>, value: Vec<u8>) {
        self.guard.borrow_mut().insert(key, value);
    }

    pub fn delete(&self, key: &[u8]) {
        self.guard.borrow_mut().remove(key);
    }

    pub fn range(&self, floor: &[u8], ceiling: &[u8]) -> Vec<(Vec<u8>, Vec<u8>)> {
        self.guard
            .borrow()
            .range(floor.to_vec()..ceiling.to_vec())
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    pub fn prefix(&self, prefix: &[u8]) -> Vec<(Vec<u8>, Vec<u8>)> {
        self.guard
            .borrow()
            .range(prefix.to_vec()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    pub(crate) fn flush_threshold_bytes(&self) -> usize {
        self.flush_threshold_bytes
    }

    pub fn batch(&self) -> Batch<'_, 'a> {
        Batch::new(self)
    }

    /// Persist the store from the guard this handle already holds,
    /// rather than through `Store::persist` (which would try to
    /// re-acquire the same lock and deadlock).
    pub fn persist(&self) -> crate::error::IndexResult<()> {
        self.store.persist_locked(&self.guard.borrow())
    }
}
