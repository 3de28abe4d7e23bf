//! File-level include graph and dirtiness computation (spec.md §4.2).
//!
//! Specializes the teacher's `RwLock`-guarded adjacency/BFS-closure style
//! (`storage/graph.rs`, there tracking symbol relationships) down to one
//! edge kind: "file A is (transitively or directly) included by file B",
//! stored as reverse adjacency so `dirty_dependents` is a direct lookup
//! plus closure walk.

use crate::types::FileId;
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};

pub struct DependencyGraph {
    /// file id -> set of file ids that include it.
    reverse: RwLock<HashMap<FileId, HashSet<FileId>>>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self {
            reverse: RwLock::new(HashMap::new()),
        }
    }

    pub fn from_entries(entries: impl IntoIterator<Item = (FileId, HashSet<FileId>)>) -> Self {
        Self {
            reverse: RwLock::new(entries.into_iter().collect()),
        }
    }

    /// Record that `includer` includes `included` in its translation unit.
    pub fn add_edge(&self, includer: FileId, included: FileId) {
        self.reverse
            .write()
            .entry(included)
            .or_default()
            .insert(includer);
    }

    /// Replace the full set of files that include `included`, as emitted
    /// by the parse job for one translation unit's inclusion tree.
    pub fn set_includers(&self, included: FileId, includers: HashSet<FileId>) {
        self.reverse.write().insert(included, includers);
    }

    /// Direct includers of `f` — translation units that reference `f`
    /// straight from their own source, not transitively.
    pub fn direct_dependents(&self, f: FileId) -> HashSet<FileId> {
        self.reverse.read().get(&f).cloned().unwrap_or_default()
    }

    /// Files that `f` itself directly includes — the forward direction,
    /// found by scanning for `f` in each file's includer set (the graph
    /// only stores the reverse adjacency, per spec.md §4.2).
    pub fn includes_of(&self, f: FileId) -> HashSet<FileId> {
        self.reverse
            .read()
            .iter()
            .filter_map(|(included, includers)| includers.contains(&f).then_some(*included))
            .collect()
    }

    /// All file ids whose translation units must be reparsed if `f`
    /// changes: the closure under the reverse-adjacency relation.
    pub fn dirty_dependents(&self, f: FileId) -> HashSet<FileId> {
        let graph = self.reverse.read();
        let mut seen = HashSet::new();
        let mut frontier = vec![f];
        while let Some(current) = frontier.pop() {
            if let Some(includers) = graph.get(&current) {
                for &includer in includers {
                    if seen.insert(includer) {
                        frontier.push(includer);
                    }
                }
            }
        }
        seen
    }

    pub fn entries(&self) -> Vec<(FileId, HashSet<FileId>)> {
        self.reverse
            .read()
            .iter()
            .map(|(k, v)| (*k, v.clone()))
            .collect()
    }

    pub fn remove_file(&self, f: FileId) {
        let mut graph = self.reverse.write();
        graph.remove(&f);
        for includers in graph.values_mut() {
            includers.remove(&f);
        }
    }
}

impl Default for DependencyGraph {
    fn default() -> Self {
        Self::new()
    }
}

/// Inputs needed to evaluate the dirtiness algorithm of spec.md §4.2 for
/// one candidate source file.
pub struct DirtinessInput {
    pub file: FileId,
    pub mtime: u64,
    pub last_parsed: u64,
    pub deps: Vec<(FileId, u64)>,
}

/// Evaluate the dirtiness algorithm: returns `true` if `p` itself is
/// dirty, plus the set of dependency file ids newly discovered dirty in
/// the process (spec.md §4.2 steps 1-2).
pub fn compute_dirty(input: &DirtinessInput) -> (bool, HashSet<FileId>) {
    let mut dirty_set = HashSet::new();
    let mut is_dirty = input.mtime > input.last_parsed;

    for &(dep, dep_mtime) in &input.deps {
        if dirty_set.contains(&dep) {
            is_dirty = true;
        } else if dep_mtime > input.last_parsed {
            dirty_set.insert(dep);
            is_dirty = true;
        }
    }

    (is_dirty, dirty_set)
}
