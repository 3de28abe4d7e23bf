//! Merge engine (spec.md §4.5): folds a finished job's `IndexData` bundle
//! into the six stores and the dependency graph, one ordered pass at a
//! time, each pass writing through a single batch.
//!
//! Grounded on the teacher's single-writer persistence discipline
//! (`storage/persistence.rs`'s `save` taking `&SimpleIndexer` exclusively)
//! and `storage/metadata.rs`'s read-modify-write counter pattern.

use crate::dependency::DependencyGraph;
use crate::error::IndexResult;
use crate::file_registry::FileRegistry;
use crate::indexing::diagnostics;
use crate::indexing::index_data::{CursorInfo, IndexData};
use crate::location::Location;
use crate::storage::{Batch, Stores, StoreHandleMut};
use crate::types::FileId;
use std::collections::{HashMap, HashSet};

pub struct MergeEngine<'a> {
    stores: &'a Stores,
    graph: &'a DependencyGraph,
    registry: &'a FileRegistry,
}

impl<'a> MergeEngine<'a> {
    pub fn new(stores: &'a Stores, graph: &'a DependencyGraph, registry: &'a FileRegistry) -> Self {
        Self {
            stores,
            graph,
            registry,
        }
    }

    /// Apply one finished bundle, given the dirty-file set computed before
    /// the job ran (spec.md §4.5 passes 1-6). `is_pch` marks a bundle that
    /// came from a precompiled-header job, triggering pass 6.
    pub fn merge(
        &self,
        data: IndexData,
        dirty_files: &HashSet<FileId>,
        last_parsed: u64,
        args: &[String],
        is_pch: bool,
    ) -> IndexResult<()> {
        self.file_information_pass(data.primary_file, last_parsed, args);
        self.dependency_pass(&data);
        self.symbol_name_pass(&data, dirty_files);
        self.symbol_pass(&data);
        self.reference_pass(&data);
        self.dirtiness_pass(dirty_files, &data);
        self.diagnostics_pass(&data);
        if is_pch {
            self.pch_pass(&data);
        }

        self.stores.persist_all()
    }

    /// Pass 1: write `(fileId -> {lastParsed, args})`, garbage-collecting
    /// entries whose file id no longer resolves to an existing path.
    fn file_information_pass(&self, file: FileId, last_parsed: u64, args: &[String]) {
        let handle = self.stores.file_information_mut();
        let mut batch = handle.batch();
        let value = encode_file_information(last_parsed, args);
        batch.put(file.value().to_le_bytes().to_vec(), value);
        batch.flush();

        // Garbage collection of stale FileInformation keys (file ids whose
        // path no longer resolves) runs from the deletion path (see
        // `Project::remove_file`) rather than on every merge.
    }

    /// Pass 2: union each bundle's `(file -> newIncluders)` into the
    /// dependency graph; write to the `Dependency` store only if the set
    /// grew.
    fn dependency_pass(&self, data: &IndexData) {
        let handle = self.stores.dependency_mut();
        let mut batch = handle.batch();
        for (&included, includers) in &data.dependencies {
            let before = self.graph.direct_dependents(included);
            let grew = !includers.is_subset(&before);
            let mut union = before;
            union.extend(includers.iter().copied());
            self.graph.set_includers(included, union.clone());

            if grew {
                batch.put(
                    included.value().to_le_bytes().to_vec(),
                    encode_file_id_set(&union),
                );
            }
        }
        batch.flush();
    }

    /// Pass 3: union `(name -> newLocations)` into `SymbolName`; prune
    /// locations belonging to dirty files that were not re-emitted.
    fn symbol_name_pass(&self, data: &IndexData, dirty_files: &HashSet<FileId>) {
        let handle = self.stores.symbol_name_mut();
        let mut batch = handle.batch();

        for (name, new_locs) in &data.symbol_names {
            let key = name.as_bytes().to_vec();
            let existing = handle.get(&key).map(|v| decode_location_set(&v)).unwrap_or_default();
            let before_len = existing.len();
            let mut union = existing;
            union.extend(new_locs.iter().copied());

            // Drop locations of dirty files not present in this bundle's
            // re-emission (second sub-pass of spec.md §4.5 step 3).
            union.retain(|loc| {
                let file = loc.file_id();
                match file {
                    Some(f) if dirty_files.contains(&f) && f != data.primary_file => {
                        new_locs.contains(loc)
                    }
                    _ => true,
                }
            });

            if union.len() != before_len || !new_locs.is_empty() {
                batch.put(key, encode_location_set(&union));
            }
        }
        batch.flush();
    }

    /// Pass 4: write each emitted symbol. Locations in the job's own
    /// primary file overwrite unconditionally; locations elsewhere unite
    /// with the existing record.
    fn symbol_pass(&self, data: &IndexData) {
        let handle = self.stores.symbol_mut();
        let mut batch = handle.batch();

        for (&loc, cursor) in &data.symbols {
            let is_primary = loc.file_id() == Some(data.primary_file);
            if is_primary {
                batch.put(loc.to_key().to_vec(), encode_cursor(cursor));
                continue;
            }

            let key = loc.to_key().to_vec();
            match handle.get(&key).map(|v| decode_cursor(&v)) {
                Some(mut existing) => {
                    if existing.unite(cursor) {
                        batch.put(key, encode_cursor(&existing));
                    }
                }
                None => {
                    batch.put(key, encode_cursor(cursor));
                }
            }
        }
        batch.flush();
    }

    /// Reference back-link pass (spec.md §4.4 "Insert R into
    /// `symbols[T].references`", §8 invariant 3): unlike `symbol_pass`,
    /// which only unites records the bundle itself emitted, this reads
    /// `T`'s existing `Symbol` record regardless of which file it lives
    /// in, so a reference whose target was established by an earlier
    /// bundle (scenario S2: `b.cpp` calling `f` defined in `a.cpp`) still
    /// gets recorded on the definition. Also folds in the override
    /// cross-links `job.rs` collected in `data.linked_references`.
    fn reference_pass(&self, data: &IndexData) {
        let handle = self.stores.symbol_mut();
        let mut batch = handle.batch();

        for (&reference, &(target, _kind)) in &data.references {
            link_reference(&handle, &mut batch, target, reference);
        }
        for (&target, refs) in &data.linked_references {
            for &reference in refs {
                link_reference(&handle, &mut batch, target, reference);
            }
        }
        batch.flush();
    }

    /// Replace `data.primary_file`'s cached diagnostics/fix-its (spec.md
    /// §4.4 phase 2, §7 "replayable on demand").
    fn diagnostics_pass(&self, data: &IndexData) {
        let handle = self.stores.general_mut();
        diagnostics::record(&handle, data.primary_file, &data.diagnostics, &data.fix_its);
    }

    /// Pass 5: for every dirty file id not re-emitted by this bundle,
    /// delete its `Symbol` range, prune `SymbolName`, prune `Dependency`.
    fn dirtiness_pass(&self, dirty_files: &HashSet<FileId>, data: &IndexData) {
        let symbol_handle = self.stores.symbol_mut();
        let mut batch = symbol_handle.batch();

        for &dirty_file in dirty_files {
            if dirty_file == data.primary_file {
                continue;
            }
            let still_present = self.registry.path_for(dirty_file).is_some();
            if !still_present {
                let floor = Location::key_floor(dirty_file.value());
                let ceiling = Location::key_ceiling(dirty_file.value());
                for (key, _) in symbol_handle.range(&floor, &ceiling) {
                    batch.delete(key);
                }
                self.graph.remove_file(dirty_file);
            }
        }
        batch.flush();
    }

    /// Pass 6: a PCH job's declared-name table, keyed by the PCH's own
    /// path, so a later TU job can seed its declaration map before parsing
    /// (spec.md §3 "PCH USR table").
    fn pch_pass(&self, data: &IndexData) {
        let Some(path) = self.registry.path_for(data.primary_file) else {
            return;
        };
        let usrs: HashMap<String, [u8; 8]> = data
            .symbol_names
            .iter()
            .filter_map(|(name, locs)| locs.iter().next().map(|loc| (name.clone(), loc.to_key())))
            .collect();

        let handle = self.stores.pch_mut();
        handle.put(
            path.to_string_lossy().into_owned().into_bytes(),
            bincode::serialize(&usrs).expect("bincode serialization of plain data cannot fail"),
        );
    }
}

/// Snapshot the current best-known location for every indexed name, so a
/// new job's declarations and references can resolve against symbols an
/// earlier job already established — the general case the PCH USR table
/// (spec.md §3) is a specialization of. Prefers a definition location
/// over a mere declaration when a name has more than one.
pub fn load_name_seed(stores: &Stores) -> HashMap<String, Location> {
    let name_handle = stores.symbol_name();
    let symbol_handle = stores.symbol();
    let mut seed = HashMap::new();

    for (key, value) in name_handle.prefix(&[]) {
        let Ok(name) = String::from_utf8(key) else {
            continue;
        };
        let mut chosen: Option<Location> = None;
        for loc in decode_location_set(&value) {
            let is_definition = symbol_handle
                .get(&loc.to_key())
                .and_then(|bytes| bincode::deserialize::<CursorInfo>(&bytes).ok())
                .map(|cursor| cursor.is_definition)
                .unwrap_or(false);
            if is_definition {
                chosen = Some(loc);
                break;
            }
            chosen.get_or_insert(loc);
        }
        if let Some(loc) = chosen {
            seed.insert(name, loc);
        }
    }
    seed
}

/// Read back a PCH's USR table written by `MergeEngine::pch_pass`, for
/// seeding a dependent TU's job (spec.md §3 "PCH USR table").
pub fn load_pch_seed(
    stores: &Stores,
    pch_path: &std::path::Path,
) -> HashMap<String, Location> {
    let handle = stores.pch();
    let Some(bytes) = handle.get(pch_path.to_string_lossy().as_bytes()) else {
        return HashMap::new();
    };
    let usrs: HashMap<String, [u8; 8]> = bincode::deserialize(&bytes).unwrap_or_default();
    usrs.into_iter()
        .filter_map(|(name, key)| Location::from_key(&key).map(|loc| (name, loc)))
        .collect()
}

fn encode_file_information(last_parsed: u64, args: &[String]) -> Vec<u8> {
    bincode::serialize(&(last_parsed, args)).expect("bincode serialization of plain data cannot fail")
}

fn encode_file_id_set(ids: &HashSet<FileId>) -> Vec<u8> {
    let raw: Vec<u32> = ids.iter().map(|f| f.value()).collect();
    bincode::serialize(&raw).expect("bincode serialization of plain data cannot fail")
}

fn encode_location_set(locs: &HashSet<Location>) -> Vec<u8> {
    let raw: Vec<[u8; 8]> = locs.iter().map(|l| l.to_key()).collect();
    bincode::serialize(&raw).expect("bincode serialization of plain data cannot fail")
}

fn decode_location_set(bytes: &[u8]) -> HashSet<Location> {
    let raw: Vec<[u8; 8]> = bincode::deserialize(bytes).unwrap_or_default();
    raw.iter().filter_map(|k| Location::from_key(k)).collect()
}

fn encode_cursor(cursor: &CursorInfo) -> Vec<u8> {
    bincode::serialize(cursor).expect("bincode serialization of CursorInfo cannot fail")
}

fn decode_cursor(bytes: &[u8]) -> CursorInfo {
    bincode::deserialize(bytes).expect("corrupted CursorInfo record")
}

/// Insert `reference` into `target`'s `Symbol` record, if one exists, via
/// `handle`/`batch`. A target with no existing record (not yet indexed)
/// is left alone rather than synthesized.
fn link_reference(handle: &StoreHandleMut<'_>, batch: &mut Batch<'_, '_>, target: Location, reference: Location) {
    let key = target.to_key().to_vec();
    let Some(mut cursor) = handle.get(&key).map(|v| decode_cursor(&v)) else {
        return;
    };
    if cursor.references.insert(reference) {
        batch.put(key, encode_cursor(&cursor));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{CursorKind, RefKind};
    use tempfile::TempDir;

    fn setup() -> (TempDir, Stores, DependencyGraph, FileRegistry) {
        let dir = TempDir::new().unwrap();
        let stores = match Stores::open(dir.path(), 1024 * 1024).unwrap() {
            crate::storage::OpenOutcome::UpToDate(s) => s,
            crate::storage::OpenOutcome::Reinitialized(s) => s,
        };
        (dir, stores, DependencyGraph::new(), FileRegistry::new())
    }

    #[test]
    fn symbol_pass_overwrites_primary_file_location_unconditionally() {
        let (_dir, stores, graph, registry) = setup();
        let file = registry.intern(std::path::Path::new("a.c"));
        let engine = MergeEngine::new(&stores, &graph, &registry);

        let mut data = IndexData::new(file);
        let loc = Location::from_file(file, 1);
        data.symbols.insert(
            loc,
            CursorInfo {
                symbol_length: 3,
                name: "add".to_string(),
                kind: CursorKind::FunctionDecl,
                is_definition: true,
                target: None,
                parent: None,
                references: Default::default(),
            },
        );
        engine.merge(data, &HashSet::new(), 1000, &[], false).unwrap();

        let stored = stores.symbol().get(&loc.to_key());
        assert!(stored.is_some());
        let cursor: CursorInfo = bincode::deserialize(&stored.unwrap()).unwrap();
        assert_eq!(cursor.name, "add");
    }

    #[test]
    fn symbol_name_pass_unions_locations() {
        let (_dir, stores, graph, registry) = setup();
        let file = registry.intern(std::path::Path::new("a.c"));
        let engine = MergeEngine::new(&stores, &graph, &registry);

        let loc = Location::from_file(file, 1);
        let mut data = IndexData::new(file);
        data.insert_symbol(
            loc,
            CursorInfo {
                symbol_length: 3,
                name: "add".to_string(),
                kind: CursorKind::FunctionDecl,
                is_definition: true,
                target: None,
                parent: None,
                references: Default::default(),
            },
        );
        engine.merge(data, &HashSet::new(), 1000, &[], false).unwrap();

        let raw = stores.symbol_name().get(b"add").unwrap();
        let locs = decode_location_set(&raw);
        assert!(locs.contains(&loc));
    }

    #[test]
    fn dependency_pass_only_writes_on_growth() {
        let (_dir, stores, graph, registry) = setup();
        let includer = registry.intern(std::path::Path::new("a.c"));
        let included = registry.intern(std::path::Path::new("a.h"));
        let engine = MergeEngine::new(&stores, &graph, &registry);

        let mut data = IndexData::new(includer);
        data.dependencies.insert(included, HashSet::from([includer]));
        engine.merge(data, &HashSet::new(), 1000, &[], false).unwrap();

        assert!(graph.direct_dependents(included).contains(&includer));
    }

    #[test]
    fn unite_preserves_existing_target_on_cross_file_symbol() {
        let (_dir, stores, graph, registry) = setup();
        let decl_file = registry.intern(std::path::Path::new("a.h"));
        let ref_file = registry.intern(std::path::Path::new("b.c"));
        let engine = MergeEngine::new(&stores, &graph, &registry);

        let decl_loc = Location::from_file(decl_file, 1);
        let mut first = IndexData::new(decl_file);
        first.symbols.insert(
            decl_loc,
            CursorInfo {
                symbol_length: 1,
                name: "f".to_string(),
                kind: CursorKind::FunctionDecl,
                is_definition: false,
                target: None,
                parent: None,
                references: Default::default(),
            },
        );
        engine.merge(first, &HashSet::new(), 1000, &[], false).unwrap();

        let ref_loc = Location::from_file(ref_file, 1);
        let mut second = IndexData::new(ref_file);
        second.symbols.insert(
            decl_loc,
            CursorInfo {
                symbol_length: 1,
                name: "f".to_string(),
                kind: CursorKind::FunctionDecl,
                is_definition: false,
                target: None,
                parent: None,
                references: HashSet::from([ref_loc]),
            },
        );
        engine.merge(second, &HashSet::new(), 1000, &[], false).unwrap();

        let stored = stores.symbol().get(&decl_loc.to_key()).unwrap();
        let cursor: CursorInfo = bincode::deserialize(&stored).unwrap();
        assert!(cursor.references.contains(&ref_loc));
        let _ = RefKind::Normal;
    }

    /// S2: a reference whose target lives entirely outside the
    /// referencing bundle (`data.symbols` never contains it, only
    /// `data.references` points at it) must still land on the target's
    /// existing `Symbol` record.
    #[test]
    fn reference_pass_links_cross_bundle_target_not_in_this_symbols() {
        let (_dir, stores, graph, registry) = setup();
        let def_file = registry.intern(std::path::Path::new("a.cpp"));
        let caller_file = registry.intern(std::path::Path::new("b.cpp"));
        let engine = MergeEngine::new(&stores, &graph, &registry);

        let def_loc = Location::from_file(def_file, 1);
        let mut first = IndexData::new(def_file);
        first.symbols.insert(
            def_loc,
            CursorInfo {
                symbol_length: 1,
                name: "f".to_string(),
                kind: CursorKind::FunctionDecl,
                is_definition: true,
                target: None,
                parent: None,
                references: Default::default(),
            },
        );
        engine.merge(first, &HashSet::new(), 1000, &[], false).unwrap();

        let ref_loc = Location::from_file(caller_file, 1);
        let mut second = IndexData::new(caller_file);
        second.references.insert(ref_loc, (def_loc, RefKind::Normal));
        engine.merge(second, &HashSet::new(), 1000, &[], false).unwrap();

        let stored = stores.symbol().get(&def_loc.to_key()).unwrap();
        let cursor: CursorInfo = bincode::deserialize(&stored).unwrap();
        assert!(cursor.is_definition);
        assert!(cursor.references.contains(&ref_loc));
    }

    #[test]
    fn linked_references_fold_into_overridden_methods_symbol() {
        let (_dir, stores, graph, registry) = setup();
        let file = registry.intern(std::path::Path::new("a.cpp"));
        let engine = MergeEngine::new(&stores, &graph, &registry);

        let base_loc = Location::from_file(file, 1);
        let mut first = IndexData::new(file);
        first.symbols.insert(
            base_loc,
            CursorInfo {
                symbol_length: 1,
                name: "Base::run".to_string(),
                kind: CursorKind::CxxMethod,
                is_definition: true,
                target: None,
                parent: None,
                references: Default::default(),
            },
        );
        engine.merge(first, &HashSet::new(), 1000, &[], false).unwrap();

        let ref_loc = Location::from_file(file, 99);
        let mut second = IndexData::new(file);
        second.linked_references.entry(base_loc).or_default().insert(ref_loc);
        engine.merge(second, &HashSet::new(), 1000, &[], false).unwrap();

        let stored = stores.symbol().get(&base_loc.to_key()).unwrap();
        let cursor: CursorInfo = bincode::deserialize(&stored).unwrap();
        assert!(cursor.references.contains(&ref_loc));
    }
}
