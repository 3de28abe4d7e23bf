//! Write batch with byte-size auto-flush (spec.md §4.1).
//!
//! Accumulates puts/deletes against one store, flushing when the summed
//! serialized value size crosses `flush_threshold_bytes`. Any remainder is
//! flushed on drop so a batch can never silently lose writes. Writes go
//! through the handle that created the batch, not a fresh lock on the
//! store — the handle already holds the store's write guard for its
//! lifetime (spec.md §4.1).

use super::handle::StoreHandleMut;

enum Op {
    Put(Vec<u8>, Vec<u8>),
    Delete(Vec<u8>),
}

pub struct Batch<'h, 's> {
    handle: &'h StoreHandleMut<'s>,
    ops: Vec<Op>,
    pending_bytes: usize,
    flush_threshold_bytes: usize,
}

impl<'h, 's> Batch<'h, 's> {
    pub fn new(handle: &'h StoreHandleMut<'s>) -> Self {
        Self {
            handle,
            ops: Vec::new(),
            pending_bytes: 0,
            flush_threshold_bytes: handle.flush_threshold_bytes(),
        }
    }

    pub fn put(&mut self, key: Vec<u8>, value: Vec<u8>) {
        self.pending_bytes += value.len();
        self.ops.push(Op::Put(key, value));
        if self.pending_bytes >= self.flush_threshold_bytes {
            self.flush();
        }
    }

    pub fn delete(&mut self, key: Vec<u8>) {
        self.ops.push(Op::Delete(key));
    }

    /// Apply every accumulated op to the store and reset the batch.
    pub fn flush(&mut self) {
        for op in self.ops.drain(..) {
            match op {
                Op::Put(k, v) => self.handle.put(k, v),
                Op::Delete(k) => self.handle.delete(&k),
            }
        }
        self.pending_bytes = 0;
    }
}

impl Drop for Batch<'_, '_> {
    fn drop(&mut self) {
        if !self.ops.is_empty() {
            self.flush();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::store::Store;
    use tempfile::TempDir;

    #[test]
    fn flush_applies_accumulated_ops() {
        let dir = TempDir::new().unwrap();
        let store = Store::open(dir.path(), "General").unwrap();
        let handle = StoreHandleMut::new(&store, 1024);
        {
            let mut batch = Batch::new(&handle);
            batch.put(b"a".to_vec(), b"1".to_vec());
            batch.put(b"b".to_vec(), b"2".to_vec());
            batch.flush();
        }
        assert_eq!(handle.get(b"a"), Some(b"1".to_vec()));
        assert_eq!(handle.get(b"b"), Some(b"2".to_vec()));
    }

    #[test]
    fn auto_flushes_past_byte_threshold() {
        let dir = TempDir::new().unwrap();
        let store = Store::open(dir.path(), "General").unwrap();
        let handle = StoreHandleMut::new(&store, 4);
        let mut batch = Batch::new(&handle);
        batch.put(b"a".to_vec(), b"big!".to_vec());
        assert_eq!(handle.get(b"a"), Some(b"big!".to_vec()));
    }

    #[test]
    fn drop_flushes_remainder() {
        let dir = TempDir::new().unwrap();
        let store = Store::open(dir.path(), "General").unwrap();
        let handle = StoreHandleMut::new(&store, 1024);
        {
            let mut batch = Batch::new(&handle);
            batch.put(b"a".to_vec(), b"1".to_vec());
        }
        assert_eq!(handle.get(b"a"), Some(b"1".to_vec()));
    }

    #[test]
    fn delete_removes_key_on_flush() {
        let dir = TempDir::new().unwrap();
        let store = Store::open(dir.path(), "General").unwrap();
        let handle = StoreHandleMut::new(&store, 1024);
        handle.put(b"a".to_vec(), b"1".to_vec());
        {
            let mut batch = Batch::new(&handle);
            batch.delete(b"a".to_vec());
        }
        assert_eq!(handle.get(b"a"), None);
    }
}
