//! Core id and range types shared across the indexing engine.

use serde::{Deserialize, Serialize};
use std::num::NonZeroU32;

/// A file identifier, monotonically assigned by the file-id registry.
///
/// Id 0 is reserved as "null" and is never handed out by the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FileId(NonZeroU32);

impl FileId {
    pub fn new(value: u32) -> Option<Self> {
        NonZeroU32::new(value).map(Self)
    }

    pub fn value(&self) -> u32 {
        self.0.get()
    }
}

impl std::fmt::Display for FileId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.get())
    }
}

/// A half-open source range, line/column addressed (0-based lines).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Range {
    pub start_line: u32,
    pub start_column: u16,
    pub end_line: u32,
    pub end_column: u16,
}

impl Range {
    pub fn new(start_line: u32, start_column: u16, end_line: u32, end_column: u16) -> Self {
        Self {
            start_line,
            start_column,
            end_line,
            end_column,
        }
    }

    pub fn contains(&self, line: u32, column: u16) -> bool {
        if line < self.start_line || line > self.end_line {
            return false;
        }
        if line == self.start_line && column < self.start_column {
            return false;
        }
        if line == self.end_line && column > self.end_column {
            return false;
        }
        true
    }
}

/// Cursor kinds produced by the external C/C++ indexer adapter.
///
/// A small, closed enumeration covering declarations, definitions and
/// references — mirrors the subset of libclang's `CXCursorKind` that the
/// merge engine actually branches on (spec.md §4.4/§4.5).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CursorKind {
    FunctionDecl,
    VarDecl,
    StructDecl,
    UnionDecl,
    EnumDecl,
    TypedefDecl,
    MacroDefinition,
    FieldDecl,
    Constructor,
    Destructor,
    CxxMethod,
    Reference,
}

/// Kind of edge recorded in a `CursorInfo`'s reference set (spec.md §4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RefKind {
    Normal,
    LinkedTarget,
}
