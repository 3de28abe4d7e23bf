//! Top-level coordinator for one source tree (spec.md §2, §3 "Ownership").
//!
//! Owns the six stores, the file-id registry, the dependency graph, the
//! scheduler and (optionally) the watcher. `Project::open` checks the
//! `General` store's schema version before wiring anything else together,
//! the same gate `storage::Stores::open` already applies internally.

use crate::config::Settings;
use crate::dependency::{compute_dirty, DependencyGraph, DirtinessInput};
use crate::error::{IndexError, IndexResult};
use crate::file_registry::FileRegistry;
use crate::indexing::job::CompileMessage;
use crate::indexing::{IndexData, MergeEngine, ParseJob, Scheduler};
use crate::storage::{OpenOutcome, Stores};
use crate::types::FileId;
use crate::watcher::DirectoryWatcher;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

/// Build the `#include` resolver a job needs (spec.md §4.4): quoted
/// includes resolve against the including file's own directory first,
/// falling back to whatever the registry already knows the name as.
fn build_include_resolver(
    registry: Arc<FileRegistry>,
    base_dir: Option<PathBuf>,
) -> Arc<dyn Fn(&str) -> Option<(FileId, PathBuf)> + Send + Sync> {
    Arc::new(move |include: &str| {
        let candidate = base_dir
            .as_ref()
            .map(|dir| dir.join(include))
            .unwrap_or_else(|| PathBuf::from(include));
        if candidate.exists() {
            let id = registry.intern(&candidate);
            Some((id, candidate))
        } else {
            let id = registry.id_for(Path::new(include))?;
            let path = registry.path_for(id)?;
            Some((id, path))
        }
    })
}

/// Re-submit every tracked file that depends on `pch_file` once that PCH
/// finishes a reparse (spec.md §4.3 PCH barrier, §4.5 step 6: "all users
/// of a PCH are marked dirty whenever the PCH completes a reparse").
fn requeue_pch_dependents(
    pch_file: FileId,
    stores: &Arc<Stores>,
    registry: &Arc<FileRegistry>,
    file_state: &Arc<Mutex<HashMap<FileId, FileState>>>,
    scheduler: &Arc<Scheduler>,
) {
    let Some(pch_path) = registry.path_for(pch_file) else {
        return;
    };
    let dependents: Vec<(FileId, PathBuf, Vec<String>)> = {
        let state = file_state.lock();
        state
            .iter()
            .filter(|(_, s)| s.pch_dependency == Some(pch_file))
            .filter_map(|(&file, s)| registry.path_for(file).map(|path| (file, path, s.args.clone())))
            .collect()
    };

    for (file, path, args) in dependents {
        let pch_seed = crate::indexing::load_pch_seed(stores, &pch_path);
        let mut seed = crate::indexing::load_name_seed(stores);
        seed.extend(pch_seed);

        let resolver = build_include_resolver(registry.clone(), path.parent().map(Path::to_path_buf));

        {
            let mut state = file_state.lock();
            state.insert(
                file,
                FileState {
                    last_parsed: now_unix(),
                    args: args.clone(),
                    pch_dependency: Some(pch_file),
                    dirty_files: HashSet::new(),
                    is_pch: false,
                },
            );
        }

        let mut job = ParseJob::new(file, path, args, resolver);
        job.pch_dependency = Some(pch_file);
        job.pch_seed = seed;
        scheduler.submit(job);
    }
}

/// Per-file bookkeeping the project keeps alongside the stores: the last
/// time a file was parsed, so dirtiness (spec.md §4.2) can be evaluated
/// without re-reading `FileInformation` on every watch event.
struct FileState {
    last_parsed: u64,
    args: Vec<String>,
    pch_dependency: Option<FileId>,
    /// Files known dirty at submission time (spec.md §4.2), passed
    /// through to the merge engine so it prunes only what actually went
    /// stale for this job, not every file the project has ever seen.
    dirty_files: HashSet<FileId>,
    /// Whether this file is itself a precompiled header, so the merge
    /// callback knows to run the PCH pass on its completed bundle.
    is_pch: bool,
}

pub struct Project {
    root: PathBuf,
    stores: Arc<Stores>,
    registry: Arc<FileRegistry>,
    graph: Arc<DependencyGraph>,
    scheduler: Arc<Scheduler>,
    file_state: Arc<Mutex<HashMap<FileId, FileState>>>,
    settings: Settings,
    watcher: Mutex<Option<DirectoryWatcher>>,
}

fn now_unix() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

fn mtime_unix(path: &Path) -> u64 {
    std::fs::metadata(path)
        .and_then(|m| m.modified())
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

impl Project {
    /// Open (or initialize) a project rooted at `root`. Re-indexes fully
    /// if the on-disk schema version did not match (spec.md §6).
    pub fn open(root: impl Into<PathBuf>, settings: Settings) -> IndexResult<Self> {
        let root = root.into();
        let index_path = root.join(&settings.index_path);
        std::fs::create_dir_all(&index_path).map_err(|e| IndexError::StoreOpenFailed {
            path: index_path.clone(),
            reason: e.to_string(),
        })?;

        let outcome = Stores::open(&index_path, settings.indexing.batch_flush_bytes)?;
        let (stores, needs_full_reindex) = match outcome {
            OpenOutcome::UpToDate(s) => (s, false),
            OpenOutcome::Reinitialized(s) => (s, true),
        };

        let stores = Arc::new(stores);
        let registry = Arc::new(FileRegistry::new());
        let graph = Arc::new(DependencyGraph::new());
        let file_state = Arc::new(Mutex::new(HashMap::new()));

        let merge_stores = stores.clone();
        let merge_graph = graph.clone();
        let merge_registry = registry.clone();
        let merge_file_state = file_state.clone();

        // `on_complete` needs to resubmit a PCH's dependents once its own
        // merge lands (spec.md §4.5 step 6), but the scheduler that would
        // do the resubmitting doesn't exist until after this callback is
        // built; it's threaded in afterwards through this cell.
        let scheduler_cell: Arc<Mutex<Option<Arc<Scheduler>>>> = Arc::new(Mutex::new(None));
        let requeue_scheduler_cell = scheduler_cell.clone();
        let requeue_stores = stores.clone();
        let requeue_registry = registry.clone();
        let requeue_file_state = file_state.clone();

        let on_complete: crate::indexing::MergeCallback = Arc::new(move |file, result| {
            let Ok(data) = result else { return };
            let (last_parsed, args, dirty_files, is_pch) = {
                let state = merge_file_state.lock();
                match state.get(&file) {
                    Some(s) => (s.last_parsed, s.args.clone(), s.dirty_files.clone(), s.is_pch),
                    None => (now_unix(), Vec::new(), HashSet::new(), false),
                }
            };
            let engine = MergeEngine::new(&merge_stores, &merge_graph, &merge_registry);
            match engine.merge(data, &dirty_files, last_parsed, &args, is_pch) {
                Ok(()) => {
                    if is_pch {
                        if let Some(scheduler) = requeue_scheduler_cell.lock().as_ref() {
                            requeue_pch_dependents(
                                file,
                                &requeue_stores,
                                &requeue_registry,
                                &requeue_file_state,
                                scheduler,
                            );
                        }
                    }
                }
                Err(err) => {
                    // Abandon this batch (spec.md §4.1/§7): leave the file
                    // dirty so the next `refresh` retries it instead of
                    // treating a half-applied merge as committed.
                    tracing::error!("merge pass for file {} failed: {}; leaving it dirty for retry", file, err);
                    if let Some(s) = merge_file_state.lock().get_mut(&file) {
                        s.last_parsed = 0;
                    }
                }
            }
        });

        let scheduler = Arc::new(Scheduler::new(settings.indexing.parallel_threads, on_complete));
        *scheduler_cell.lock() = Some(scheduler.clone());

        let project = Self {
            root,
            stores,
            registry,
            graph,
            scheduler,
            file_state,
            settings,
            watcher: Mutex::new(None),
        };

        if needs_full_reindex {
            tracing::info!("schema mismatch detected; a full re-index is required");
        }

        Ok(project)
    }

    /// Submit a compile message for indexing (spec.md §6 `index`
    /// operation entry point). `dirty_files` is the set of files already
    /// known stale by the caller (empty for a first-time index); the
    /// merge engine uses it to decide what to prune for this pass.
    pub fn index_dirty(&self, message: CompileMessage, dirty_files: HashSet<FileId>) -> Option<u64> {
        let file = self.registry.intern(&message.path);

        let pch_dependency = {
            let state = self.file_state.lock();
            state.get(&file).and_then(|s| s.pch_dependency)
        };

        let pch_seed = match pch_dependency.and_then(|pch| self.registry.path_for(pch)) {
            Some(pch_path) => crate::indexing::load_pch_seed(&self.stores, &pch_path),
            None => HashMap::new(),
        };

        self.submit_job(message, dirty_files, pch_dependency, pch_seed, false)
    }

    /// Submit a compile message for indexing with an empty dirty set.
    pub fn index(&self, message: CompileMessage) -> Option<u64> {
        self.index_dirty(message, HashSet::new())
    }

    /// Index `message` as a precompiled header (spec.md §4.3 PCH barrier):
    /// any job already submitted that declares it as a PCH dependency
    /// parks until this one completes, and its declared-name table is
    /// written to the `PCH` store for later seeding.
    pub fn index_pch(&self, message: CompileMessage) -> Option<u64> {
        self.submit_job(message, HashSet::new(), None, HashMap::new(), true)
    }

    /// Index `message` as a translation unit that depends on the PCH at
    /// `pch_path`. The dependency is remembered so every future reparse of
    /// this file re-seeds from the PCH's current table, and a PCH still
    /// in flight parks this job in the scheduler's waiting-for-PCH map.
    pub fn index_with_pch(&self, message: CompileMessage, pch_path: &Path) -> Option<u64> {
        let pch_file = self.registry.intern(pch_path);
        let pch_seed = crate::indexing::load_pch_seed(&self.stores, pch_path);
        self.submit_job(message, HashSet::new(), Some(pch_file), pch_seed, false)
    }

    fn submit_job(
        &self,
        message: CompileMessage,
        dirty_files: HashSet<FileId>,
        pch_dependency: Option<FileId>,
        pch_seed: HashMap<String, crate::location::Location>,
        is_pch: bool,
    ) -> Option<u64> {
        let file = self.registry.intern(&message.path);
        // `#include "x.h"` carries only the raw text between the quotes
        // (spec.md §4.4); resolve it against the including file's own
        // directory and intern it so a header seen for the first time
        // still gets a file id in the dependency graph.
        let base_dir = message.path.parent().map(Path::to_path_buf);
        let resolver = build_include_resolver(self.registry.clone(), base_dir);

        {
            let mut state = self.file_state.lock();
            state.insert(
                file,
                FileState {
                    last_parsed: now_unix(),
                    args: message.args.clone(),
                    pch_dependency,
                    dirty_files,
                    is_pch,
                },
            );
        }

        // Every job sees the project's current best-known location for
        // each name (spec.md §8 S2 cross-file resolution); an explicit
        // PCH seed, where present, takes precedence for names it covers.
        let mut seed = crate::indexing::load_name_seed(&self.stores);
        seed.extend(pch_seed);

        let mut job = ParseJob::new(file, message.path, message.args, resolver);
        job.is_pch = is_pch;
        job.pch_dependency = pch_dependency;
        job.pch_seed = seed;
        self.scheduler.submit(job)
    }

    /// Evaluate dirtiness for `file` given its tracked dependencies and
    /// current mtimes (spec.md §4.2), re-submitting it (and any newly
    /// dirty dependencies) for indexing if stale.
    pub fn refresh(&self, file: FileId, path: &Path, args: Vec<String>) -> Option<u64> {
        let last_parsed = {
            let state = self.file_state.lock();
            state.get(&file).map(|s| s.last_parsed).unwrap_or(0)
        };
        let deps: Vec<(FileId, u64)> = self
            .graph
            .includes_of(file)
            .into_iter()
            .filter_map(|dep| self.registry.path_for(dep).map(|p| (dep, mtime_unix(&p))))
            .collect();

        let input = DirtinessInput {
            file,
            mtime: mtime_unix(path),
            last_parsed,
            deps,
        };
        let (dirty, newly_dirty) = compute_dirty(&input);
        if !dirty {
            return None;
        }

        self.index_dirty(
            CompileMessage {
                path: path.to_path_buf(),
                args,
            },
            newly_dirty,
        )
    }

    /// Remove a file entirely: drop its symbols, dependency edges and
    /// file-registry entry.
    pub fn remove_file(&self, file: FileId) {
        self.graph.remove_file(file);
        self.file_state.lock().remove(&file);

        let symbol_handle = self.stores.symbol_mut();
        let mut batch = symbol_handle.batch();
        let floor = crate::location::Location::key_floor(file.value());
        let ceiling = crate::location::Location::key_ceiling(file.value());
        for (key, _) in symbol_handle.range(&floor, &ceiling) {
            batch.delete(key);
        }
        batch.flush();

        let fi_handle = self.stores.file_information_mut();
        fi_handle.delete(&file.value().to_le_bytes());

        let general_handle = self.stores.general_mut();
        crate::indexing::diagnostics::clear(&general_handle, file);
    }

    /// Start the filesystem watcher over the currently tracked files
    /// (spec.md §4.6). Replaces any previously running watcher and spawns
    /// a background thread that walks the dependency graph from each
    /// dirty path and re-submits every affected translation unit.
    pub fn start_watching(self: &Arc<Self>) -> IndexResult<()> {
        let mut directories: HashMap<PathBuf, Vec<PathBuf>> = HashMap::new();
        for (path, _id) in self.registry.entries() {
            if let Some(dir) = path.parent() {
                directories.entry(dir.to_path_buf()).or_default().push(path);
            }
        }
        let watcher = DirectoryWatcher::start(directories, self.settings.watcher.debounce_ms)
            .map_err(|e| IndexError::General(e.to_string()))?;

        let dirty_rx = watcher.dirty_files().clone();
        let project = self.clone();
        std::thread::spawn(move || {
            for path in dirty_rx.iter() {
                project.handle_dirty_path(&path);
            }
        });

        *self.watcher.lock() = Some(watcher);
        Ok(())
    }

    /// Resolve one dirty path reported by the watcher (spec.md §4.6) to the
    /// set of translation units that must be reparsed: the file itself, if
    /// it is a tracked TU, plus every TU that transitively includes it.
    fn handle_dirty_path(&self, path: &Path) {
        let Some(file) = self.registry.id_for(path) else {
            return;
        };
        let mut targets = self.graph.dirty_dependents(file);
        if self.file_state.lock().contains_key(&file) {
            targets.insert(file);
        }
        for target in targets {
            let Some(target_path) = self.registry.path_for(target) else {
                continue;
            };
            let args = self
                .file_state
                .lock()
                .get(&target)
                .map(|s| s.args.clone())
                .unwrap_or_default();
            self.refresh(target, &target_path, args);
        }
    }

    pub fn queries(&self) -> crate::query::Queries<'_> {
        crate::query::Queries::new(&self.stores, &self.graph, &self.registry)
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn registry(&self) -> &FileRegistry {
        &self.registry
    }

    pub fn stores(&self) -> &Stores {
        &self.stores
    }

    pub fn graph(&self) -> &DependencyGraph {
        &self.graph
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn open_creates_index_directory_and_is_reusable() {
        let dir = TempDir::new().unwrap();
        let project = Project::open(dir.path(), Settings::default()).unwrap();
        assert!(dir.path().join(".cxindex").is_dir());
        drop(project);

        let reopened = Project::open(dir.path(), Settings::default()).unwrap();
        assert!(reopened.root().is_dir());
    }

    #[test]
    fn index_then_query_finds_declared_symbol() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("a.c");
        fs::write(&source, "int add(int x){return x+1;}").unwrap();

        let project = Project::open(dir.path(), Settings::default()).unwrap();
        project.index(CompileMessage {
            path: source.clone(),
            args: vec![],
        });

        let mut waited = 0;
        while project.scheduler().in_flight_count() > 0 && waited < 500 {
            std::thread::sleep(std::time::Duration::from_millis(10));
            waited += 10;
        }

        let queries = project.queries();
        let flag = std::sync::atomic::AtomicBool::new(false);
        let matches = queries.list_symbols("add", &flag);
        assert!(!matches.is_empty());
    }

    #[test]
    fn remove_file_clears_symbols_for_that_file() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("a.c");
        fs::write(&source, "int add(int x){return x+1;}").unwrap();

        let project = Project::open(dir.path(), Settings::default()).unwrap();
        project.index(CompileMessage {
            path: source.clone(),
            args: vec![],
        });
        let mut waited = 0;
        while project.scheduler().in_flight_count() > 0 && waited < 500 {
            std::thread::sleep(std::time::Duration::from_millis(10));
            waited += 10;
        }

        let file = project.registry().id_for(&source).unwrap();
        project.remove_file(file);

        let symbol_handle = project.stores.symbol();
        let floor = crate::location::Location::key_floor(file.value());
        let ceiling = crate::location::Location::key_ceiling(file.value());
        assert!(symbol_handle.range(&floor, &ceiling).is_empty());
    }

    fn wait_for_quiescence(project: &Project) {
        let mut waited = 0;
        while project.scheduler().in_flight_count() > 0
            || project.scheduler().waiting_for_pch_count() > 0
        {
            if waited >= 1000 {
                break;
            }
            std::thread::sleep(std::time::Duration::from_millis(10));
            waited += 10;
        }
    }

    #[test]
    fn pch_seed_resolves_reference_in_dependent_tu() {
        let dir = TempDir::new().unwrap();
        let pch_path = dir.path().join("pch.h");
        fs::write(&pch_path, "int shared(){return 0;}").unwrap();
        let tu_path = dir.path().join("a.c");
        fs::write(&tu_path, "int main(){return shared();}").unwrap();

        let project = Project::open(dir.path(), Settings::default()).unwrap();
        project.index_pch(CompileMessage {
            path: pch_path.clone(),
            args: vec![],
        });
        wait_for_quiescence(&project);

        project.index_with_pch(
            CompileMessage {
                path: tu_path.clone(),
                args: vec![],
            },
            &pch_path,
        );
        wait_for_quiescence(&project);

        let pch_file = project.registry().id_for(&pch_path).unwrap();
        let pch_handle = project.stores.pch();
        assert!(pch_handle.get(pch_path.to_string_lossy().as_bytes()).is_some());

        let queries = project.queries();
        let flag = std::sync::atomic::AtomicBool::new(false);
        let matches = queries.references_for_name("shared", &flag);
        assert!(matches.iter().any(|loc| loc.file_id() == Some(pch_file)));
    }
}
