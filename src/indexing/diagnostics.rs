//! Per-file diagnostics/fix-it cache (spec.md §4.4, §7).
//!
//! No dedicated store was budgeted for this, so entries share `General`
//! under a `diag:<file id>` key namespace, the same way the teacher keeps
//! ad-hoc counters alongside its metadata in one store
//! (`storage/metadata.rs`).

use crate::indexing::index_data::FixIt;
use crate::storage::{StoreHandle, StoreHandleMut};
use crate::types::FileId;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct DiagnosticsRecord {
    diagnostics: Vec<String>,
    fix_its: Vec<(u64, u32, String)>,
}

fn diag_key(file: FileId) -> Vec<u8> {
    format!("diag:{}", file.value()).into_bytes()
}

/// Replace the stored diagnostics/fix-its for `file` with a fresh bundle.
pub fn record(handle: &StoreHandleMut<'_>, file: FileId, diagnostics: &[String], fix_its: &[FixIt]) {
    let record = DiagnosticsRecord {
        diagnostics: diagnostics.to_vec(),
        fix_its: fix_its
            .iter()
            .map(|f| (u64::from_be_bytes(f.location.to_key()), f.length, f.replacement.clone()))
            .collect(),
    };
    let bytes = bincode::serialize(&record).expect("bincode serialization of plain data cannot fail");
    handle.put(diag_key(file), bytes);
}

/// Read back the diagnostics recorded for `file`, if any.
pub fn diagnostics_for(handle: &StoreHandle<'_>, file: FileId) -> Vec<String> {
    handle
        .get(&diag_key(file))
        .and_then(|bytes| bincode::deserialize::<DiagnosticsRecord>(&bytes).ok())
        .map(|r| r.diagnostics)
        .unwrap_or_default()
}

pub fn clear(handle: &StoreHandleMut<'_>, file: FileId) {
    handle.delete(&diag_key(file));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::Store;
    use tempfile::TempDir;

    #[test]
    fn record_then_read_back_roundtrips() {
        let dir = TempDir::new().unwrap();
        let store = Store::open(dir.path(), "General").unwrap();
        let mut_handle = StoreHandleMut::new(&store, 1024);
        let file = FileId::new(1).unwrap();

        record(&mut_handle, file, &["1:1: syntax error".to_string()], &[]);

        let read_handle = StoreHandle::new(&store);
        let diags = diagnostics_for(&read_handle, file);
        assert_eq!(diags, vec!["1:1: syntax error".to_string()]);
    }

    #[test]
    fn clear_removes_record() {
        let dir = TempDir::new().unwrap();
        let store = Store::open(dir.path(), "General").unwrap();
        let mut_handle = StoreHandleMut::new(&store, 1024);
        let file = FileId::new(1).unwrap();

        record(&mut_handle, file, &["x".to_string()], &[]);
        clear(&mut_handle, file);

        let read_handle = StoreHandle::new(&store);
        assert!(diagnostics_for(&read_handle, file).is_empty());
    }

    #[test]
    fn missing_file_yields_empty_diagnostics() {
        let dir = TempDir::new().unwrap();
        let store = Store::open(dir.path(), "General").unwrap();
        let read_handle = StoreHandle::new(&store);
        assert!(diagnostics_for(&read_handle, FileId::new(9).unwrap()).is_empty());
    }
}
