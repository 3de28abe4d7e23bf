//! Error types for the indexing engine.
//!
//! Structured via `thiserror` so callers get actionable messages instead of
//! opaque strings (spec.md §7).

use crate::types::FileId;
use std::path::PathBuf;
use thiserror::Error;

/// Main error type for indexing operations (spec.md §7).
#[derive(Error, Debug)]
pub enum IndexError {
    #[error("Failed to open store at '{path}': {reason}")]
    StoreOpenFailed { path: PathBuf, reason: String },

    #[error("Failed to parse translation unit '{path}': {reason}")]
    ParseFailed { path: PathBuf, reason: String },

    #[error("Operation cancelled")]
    CancelRequested,

    #[error("Schema version mismatch: on-disk {on_disk}, expected {expected}")]
    SchemaMismatch { on_disk: u32, expected: u32 },

    #[error("Failed to resolve path '{path}': {reason}")]
    PathResolveFailed { path: PathBuf, reason: String },

    #[error("Invalid location key (expected 8 bytes, got {len})")]
    InvalidLocation { len: usize },

    #[error("Batch write to store '{store}' failed: {reason}")]
    BatchWriteFailed { store: String, reason: String },

    #[error("File id {id:?} not found")]
    FileNotFound { id: FileId },

    #[error("{0}")]
    General(String),
}

impl IndexError {
    /// Get recovery suggestions for this error.
    pub fn recovery_suggestions(&self) -> Vec<&'static str> {
        match self {
            Self::StoreOpenFailed { .. } => vec![
                "Check disk space and permissions in the index directory",
                "Delete the store directory to force a clean re-index",
            ],
            Self::SchemaMismatch { .. } => {
                vec!["A full re-index runs automatically on next open"]
            }
            Self::BatchWriteFailed { .. } => vec![
                "The merge pass was abandoned; affected files are dirty again",
                "Re-trigger indexing for the affected files",
            ],
            Self::ParseFailed { .. } => vec![
                "Check the compile arguments passed for this file",
                "The file is still tracked with a self-dependency, so edits retry it",
            ],
            _ => vec![],
        }
    }
}

/// Errors specific to the store layer.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors specific to the directory watcher.
#[derive(Error, Debug)]
pub enum WatchError {
    #[error("failed to initialize watcher: {reason}")]
    InitFailed { reason: String },

    #[error("notify error: {0}")]
    Notify(#[from] notify::Error),
}

pub type IndexResult<T> = Result<T, IndexError>;
pub type StorageResult<T> = Result<T, StorageError>;
pub type WatchResult<T> = Result<T, WatchError>;

/// Helper trait for adding context to errors.
pub trait ErrorContext<T> {
    fn context(self, msg: &str) -> Result<T, IndexError>;
    fn with_path(self, path: &std::path::Path) -> Result<T, IndexError>;
}

impl<T, E> ErrorContext<T> for Result<T, E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    fn context(self, msg: &str) -> Result<T, IndexError> {
        self.map_err(|e| IndexError::General(format!("{msg}: {e}")))
    }

    fn with_path(self, path: &std::path::Path) -> Result<T, IndexError> {
        self.map_err(|e| IndexError::General(format!("Error processing '{}': {e}", path.display())))
    }
}
