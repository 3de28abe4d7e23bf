//! Directory-granularity file watcher (spec.md §4.6).
//!
//! Watches directories, not individual files. On a notify event for a
//! directory, the affected directory is debounced; once stable, its
//! tracked `(filename, mtime)` pairs are diffed against the filesystem and
//! every path whose mtime advanced or which disappeared is sent on
//! `dirty_rx` as a dirty file. The caller (the project) is responsible for
//! walking the reverse dependency graph from each dirty file and enqueuing
//! `index()` requests on the scheduler — the watcher itself has no
//! knowledge of the dependency graph or scheduler (spec.md §3 ownership).

use super::debouncer::Debouncer;
use crate::error::{WatchError, WatchResult};
use crossbeam_channel::{unbounded, Receiver, Sender};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, SystemTime};

/// Per-directory snapshot of tracked files and their last-seen mtimes.
struct WatchedDir {
    files: HashMap<PathBuf, SystemTime>,
}

pub struct DirectoryWatcher {
    _watcher: RecommendedWatcher,
    dirty_rx: Receiver<PathBuf>,
}

impl DirectoryWatcher {
    /// Start watching `directories`, each pre-populated with the files it
    /// should track. `debounce_ms` is the coalescing window (spec.md §4.6).
    pub fn start(
        directories: HashMap<PathBuf, Vec<PathBuf>>,
        debounce_ms: u64,
    ) -> WatchResult<Self> {
        let watched: Arc<Mutex<HashMap<PathBuf, WatchedDir>>> =
            Arc::new(Mutex::new(HashMap::new()));
        {
            let mut guard = watched.lock().unwrap();
            for (dir, files) in &directories {
                let mut snapshot = HashMap::new();
                for f in files {
                    if let Ok(meta) = std::fs::metadata(f) {
                        if let Ok(mtime) = meta.modified() {
                            snapshot.insert(f.clone(), mtime);
                        }
                    }
                }
                guard.insert(dir.clone(), WatchedDir { files: snapshot });
            }
        }

        let (event_tx, event_rx) = unbounded::<Event>();
        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| {
                if let Ok(event) = res {
                    let _ = event_tx.send(event);
                }
            },
            notify::Config::default(),
        )
        .map_err(|e| WatchError::InitFailed {
            reason: e.to_string(),
        })?;

        for dir in directories.keys() {
            watcher
                .watch(dir, RecursiveMode::NonRecursive)
                .map_err(WatchError::Notify)?;
        }

        let (dirty_tx, dirty_rx) = unbounded::<PathBuf>();
        spawn_debounce_loop(event_rx, dirty_tx, watched, debounce_ms);

        Ok(Self {
            _watcher: watcher,
            dirty_rx,
        })
    }

    /// Receiver of dirty file paths. The caller drains this in a loop and
    /// walks the dependency graph for each.
    pub fn dirty_files(&self) -> &Receiver<PathBuf> {
        &self.dirty_rx
    }
}

fn spawn_debounce_loop(
    event_rx: Receiver<Event>,
    dirty_tx: Sender<PathBuf>,
    watched: Arc<Mutex<HashMap<PathBuf, WatchedDir>>>,
    debounce_ms: u64,
) {
    thread::spawn(move || {
        let mut debouncer = Debouncer::new(debounce_ms);
        loop {
            match event_rx.recv_timeout(Duration::from_millis(debounce_ms.max(50))) {
                Ok(event) => {
                    if matches!(
                        event.kind,
                        EventKind::Modify(_) | EventKind::Create(_) | EventKind::Remove(_)
                    ) {
                        for path in &event.paths {
                            if let Some(dir) = path.parent() {
                                debouncer.record(dir.to_path_buf());
                            }
                        }
                    }
                }
                Err(crossbeam_channel::RecvTimeoutError::Timeout) => {}
                Err(crossbeam_channel::RecvTimeoutError::Disconnected) => break,
            }

            for dir in debouncer.take_ready() {
                diff_and_emit(&dir, &watched, &dirty_tx);
            }
        }
    });
}

fn diff_and_emit(
    dir: &Path,
    watched: &Arc<Mutex<HashMap<PathBuf, WatchedDir>>>,
    dirty_tx: &Sender<PathBuf>,
) {
    let mut guard = watched.lock().unwrap();
    let Some(entry) = guard.get_mut(dir) else {
        return;
    };

    let mut updated = HashMap::new();
    for (path, last_mtime) in entry.files.drain() {
        match std::fs::metadata(&path).and_then(|m| m.modified()) {
            Ok(mtime) if mtime > last_mtime => {
                let _ = dirty_tx.send(path.clone());
                updated.insert(path, mtime);
            }
            Ok(mtime) => {
                updated.insert(path, mtime);
            }
            Err(_) => {
                let _ = dirty_tx.send(path.clone());
            }
        }
    }
    entry.files = updated;
}
