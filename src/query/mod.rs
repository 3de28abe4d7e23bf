//! Read-only query jobs against the six stores (spec.md §4.7).
//!
//! Every query acquires scoped read handles only — never the write side —
//! and checks a cancellation flag between emitted rows, mirroring the
//! cooperative-cancellation style `indexing/job.rs` uses for writes.

use crate::dependency::DependencyGraph;
use crate::file_registry::FileRegistry;
use crate::indexing::CursorInfo;
use crate::location::Location;
use crate::storage::Stores;
use crate::types::FileId;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

fn decode_location_set(bytes: &[u8]) -> Vec<Location> {
    let raw: Vec<[u8; 8]> = bincode::deserialize(bytes).unwrap_or_default();
    raw.iter().filter_map(|k| Location::from_key(k)).collect()
}

fn decode_cursor(bytes: &[u8]) -> Option<CursorInfo> {
    bincode::deserialize(bytes).ok()
}

pub struct Queries<'a> {
    stores: &'a Stores,
    graph: &'a DependencyGraph,
    registry: &'a FileRegistry,
}

impl<'a> Queries<'a> {
    pub fn new(stores: &'a Stores, graph: &'a DependencyGraph, registry: &'a FileRegistry) -> Self {
        Self {
            stores,
            graph,
            registry,
        }
    }

    /// The cursor at `loc`, following its `target` link if it is itself a
    /// reference (spec.md §4.7 `follow_location`).
    pub fn follow_location(&self, loc: Location) -> Option<(Location, CursorInfo)> {
        let handle = self.stores.symbol();
        let cursor = decode_cursor(&handle.get(&loc.to_key())?)?;
        match cursor.target {
            Some(target) => {
                let target_cursor = decode_cursor(&handle.get(&target.to_key())?)?;
                Some((target, target_cursor))
            }
            None => Some((loc, cursor)),
        }
    }

    /// Every location recorded against `name` in `SymbolName`, honoring
    /// any of the four permuted forms a caller might supply.
    pub fn references_for_name(&self, name: &str, cancelled: &AtomicBool) -> Vec<Location> {
        let handle = self.stores.symbol_name();
        let Some(bytes) = handle.get(name.as_bytes()) else {
            return Vec::new();
        };
        let mut out = Vec::new();
        for loc in decode_location_set(&bytes) {
            if cancelled.load(Ordering::Acquire) {
                break;
            }
            out.push(loc);
        }
        out
    }

    /// Prefix scan over `SymbolName`, returning matching names alongside
    /// their locations (spec.md §4.7 `list_symbols`).
    pub fn list_symbols(&self, prefix: &str, cancelled: &AtomicBool) -> Vec<(String, Vec<Location>)> {
        let handle = self.stores.symbol_name();
        let mut out = Vec::new();
        for (key, value) in handle.prefix(prefix.as_bytes()) {
            if cancelled.load(Ordering::Acquire) {
                break;
            }
            let Ok(name) = String::from_utf8(key) else {
                continue;
            };
            out.push((name, decode_location_set(&value)));
        }
        out
    }

    /// Files `path` directly includes (walks the in-memory reverse graph
    /// backwards, since the graph only stores includer sets per included
    /// file — this scans `Dependency` directly for the forward direction).
    pub fn file_includes(&self, file: FileId) -> Vec<PathBuf> {
        let handle = self.stores.dependency();
        let mut out = Vec::new();
        for (key, value) in handle.prefix(&[]) {
            let bytes: Result<[u8; 4], _> = key.try_into();
            let Ok(bytes) = bytes else {
                continue;
            };
            let included = FileId::new(u32::from_le_bytes(bytes));
            let Some(included) = included else { continue };
            let includers: Vec<u32> = bincode::deserialize(&value).unwrap_or_default();
            if includers.contains(&file.value()) {
                if let Some(path) = self.registry.path_for(included) {
                    out.push(path);
                }
            }
        }
        out
    }

    /// Files that directly include `file` (spec.md §4.7 `file_included_by`).
    pub fn file_included_by(&self, file: FileId) -> Vec<PathBuf> {
        self.graph
            .direct_dependents(file)
            .into_iter()
            .filter_map(|id| self.registry.path_for(id))
            .collect()
    }
}

pub fn new_cancellation_flag() -> Arc<AtomicBool> {
    Arc::new(AtomicBool::new(false))
}
