//! Minimal `compile_commands.json` reader (spec.md §1.4): the de-facto
//! standard compilation database, the modern stand-in for a bespoke
//! Makefile parser, which spec.md §1 explicitly keeps outside the core.

use crate::error::{IndexError, IndexResult};
use crate::indexing::CompileMessage;
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize)]
struct CompileDbEntry {
    directory: PathBuf,
    file: PathBuf,
    #[serde(default)]
    arguments: Option<Vec<String>>,
    #[serde(default)]
    command: Option<String>,
}

/// Parse a `compile_commands.json` file into one `CompileMessage` per
/// translation unit, resolving relative `file` entries against each
/// entry's `directory`.
pub fn load(path: &Path) -> IndexResult<Vec<CompileMessage>> {
    let bytes = std::fs::read(path).map_err(|e| IndexError::PathResolveFailed {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    let entries: Vec<CompileDbEntry> =
        serde_json::from_slice(&bytes).map_err(|e| IndexError::PathResolveFailed {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

    Ok(entries
        .into_iter()
        .map(|entry| {
            let resolved = if entry.file.is_absolute() {
                entry.file
            } else {
                entry.directory.join(entry.file)
            };
            let args = entry
                .arguments
                .unwrap_or_else(|| split_command(entry.command.as_deref().unwrap_or("")));
            CompileMessage {
                path: resolved,
                args,
            }
        })
        .collect())
}

fn split_command(command: &str) -> Vec<String> {
    command.split_whitespace().map(str::to_string).collect()
}
