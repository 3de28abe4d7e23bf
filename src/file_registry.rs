//! Bidirectional path to `FileId` registry.
//!
//! File ids are monotonically assigned and never reused within a process,
//! so a `FileId` can be safely cached across merge passes without risk of
//! referring to a different file later (spec.md §3).

use crate::types::FileId;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::path::{Path, PathBuf};

pub struct FileRegistry {
    by_path: DashMap<PathBuf, FileId>,
    by_id: DashMap<FileId, PathBuf>,
    next: Mutex<u32>,
}

impl FileRegistry {
    pub fn new() -> Self {
        Self {
            by_path: DashMap::new(),
            by_id: DashMap::new(),
            next: Mutex::new(1),
        }
    }

    /// Restore a registry from a persisted set of (path, id) pairs,
    /// continuing id allocation past the highest id seen.
    pub fn from_entries(entries: impl IntoIterator<Item = (PathBuf, FileId)>) -> Self {
        let registry = Self::new();
        let mut max_seen = 0u32;
        for (path, id) in entries {
            max_seen = max_seen.max(id.value());
            registry.by_path.insert(path.clone(), id);
            registry.by_id.insert(id, path);
        }
        *registry.next.lock() = max_seen + 1;
        registry
    }

    /// Look up the id for a path, assigning a new one if the path is unseen.
    pub fn intern(&self, path: &Path) -> FileId {
        if let Some(existing) = self.by_path.get(path) {
            return *existing;
        }
        let mut next = self.next.lock();
        if let Some(existing) = self.by_path.get(path) {
            return *existing;
        }
        let id = FileId::new(*next).expect("registry counter never yields 0");
        *next += 1;
        drop(next);
        self.by_path.insert(path.to_path_buf(), id);
        self.by_id.insert(id, path.to_path_buf());
        id
    }

    pub fn id_for(&self, path: &Path) -> Option<FileId> {
        self.by_path.get(path).map(|id| *id)
    }

    pub fn path_for(&self, id: FileId) -> Option<PathBuf> {
        self.by_id.get(&id).map(|p| p.clone())
    }

    pub fn entries(&self) -> Vec<(PathBuf, FileId)> {
        self.by_path
            .iter()
            .map(|entry| (entry.key().clone(), *entry.value()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.by_path.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_path.is_empty()
    }
}

impl Default for FileRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn intern_assigns_distinct_monotonic_ids() {
        let reg = FileRegistry::new();
        let a = reg.intern(Path::new("a.c"));
        let b = reg.intern(Path::new("b.c"));
        assert_ne!(a, b);
        assert!(a.value() < b.value());
    }

    #[test]
    fn intern_is_idempotent() {
        let reg = FileRegistry::new();
        let a1 = reg.intern(Path::new("a.c"));
        let a2 = reg.intern(Path::new("a.c"));
        assert_eq!(a1, a2);
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn path_for_and_id_for_roundtrip() {
        let reg = FileRegistry::new();
        let id = reg.intern(Path::new("a.c"));
        assert_eq!(reg.path_for(id), Some(PathBuf::from("a.c")));
        assert_eq!(reg.id_for(Path::new("a.c")), Some(id));
    }

    #[test]
    fn from_entries_continues_counter_past_max() {
        let reg = FileRegistry::from_entries(vec![
            (PathBuf::from("a.c"), FileId::new(5).unwrap()),
            (PathBuf::from("b.c"), FileId::new(2).unwrap()),
        ]);
        let next = reg.intern(Path::new("c.c"));
        assert_eq!(next.value(), 6);
    }
}
