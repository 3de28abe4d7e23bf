//! `CursorInfo`, the `IndexData` bundle a parse job hands to the merge
//! engine, and symbol-name permutation (spec.md §3, §4.4).

use crate::location::Location;
use crate::types::{CursorKind, FileId, RefKind};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// The record stored at each location key in the `Symbol` store
/// (spec.md §3). A cursor with symbol length 0 is empty and must never be
/// stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CursorInfo {
    pub symbol_length: u32,
    pub name: String,
    pub kind: CursorKind,
    pub is_definition: bool,
    pub target: Option<Location>,
    /// For a constructor/destructor cursor, the location of its enclosing
    /// class/struct (spec.md §4.4 reference rules, §6 wire format).
    #[serde(default)]
    pub parent: Option<Location>,
    pub references: HashSet<Location>,
}

impl CursorInfo {
    pub fn is_empty(&self) -> bool {
        self.symbol_length == 0
    }

    /// Unite `other` (newly emitted) into `self` (existing record) per the
    /// merge rules of spec.md §4.5 step 4. Returns whether anything changed.
    pub fn unite(&mut self, other: &CursorInfo) -> bool {
        let mut changed = false;

        if self.target.is_none() && other.target.is_some() {
            self.target = other.target;
            changed = true;
        }
        if self.parent.is_none() && other.parent.is_some() {
            self.parent = other.parent;
            changed = true;
        }
        if self.symbol_length == 0 && other.symbol_length != 0 {
            self.symbol_length = other.symbol_length;
            changed = true;
        }
        if self.name.is_empty() && !other.name.is_empty() {
            self.name = other.name.clone();
            changed = true;
        }
        if !self.is_definition && other.is_definition {
            self.is_definition = true;
            changed = true;
        }
        let before = self.references.len();
        self.references.extend(other.references.iter().copied());
        if self.references.len() != before {
            changed = true;
        }

        changed
    }
}

#[derive(Debug, Clone)]
pub struct FixIt {
    pub location: Location,
    pub length: u32,
    pub replacement: String,
}

/// Everything a single parse job emits for one translation unit
/// (spec.md §4.4). Owned exclusively by the job until handed to the merge
/// engine.
#[derive(Debug)]
pub struct IndexData {
    pub primary_file: FileId,
    pub symbols: HashMap<Location, CursorInfo>,
    pub symbol_names: HashMap<String, HashSet<Location>>,
    pub references: HashMap<Location, (Location, RefKind)>,
    /// Extra back-links discovered through override chasing (spec.md §4.4
    /// `CXXMethod` rule): `target -> {references}` pairs to fold into
    /// `target`'s `Symbol` record the same way `references` is, but kept
    /// separate since `target` here is the *overridden* method, not the
    /// method the reference's name actually resolved to.
    pub linked_references: HashMap<Location, HashSet<Location>>,
    pub dependencies: HashMap<FileId, HashSet<FileId>>,
    pub diagnostics: Vec<String>,
    pub fix_its: Vec<FixIt>,
}

impl IndexData {
    pub fn new(primary_file: FileId) -> Self {
        Self {
            primary_file,
            symbols: HashMap::new(),
            symbol_names: HashMap::new(),
            references: HashMap::new(),
            linked_references: HashMap::new(),
            dependencies: HashMap::new(),
            diagnostics: Vec::new(),
            fix_its: Vec::new(),
        }
    }

    /// Bundle produced when the external indexer failed to parse a file
    /// (spec.md §4.4 phase 1, §7): no symbols, only a self-dependency, so
    /// the merge engine still records the file exists and watching stays
    /// armed for future edits.
    pub fn self_dependency_only(primary_file: FileId) -> Self {
        let mut data = Self::new(primary_file);
        data.dependencies
            .insert(primary_file, HashSet::from([primary_file]));
        data
    }

    pub fn insert_symbol(&mut self, loc: Location, cursor: CursorInfo) {
        if cursor.is_empty() {
            return;
        }
        for name in permute_name(&cursor.name) {
            self.symbol_names.entry(name).or_default().insert(loc);
        }
        self.symbols.insert(loc, cursor);
    }
}

/// Synthesize the name forms spec.md §4.4 describes for one qualified
/// name: the full qualified form, with-parameters stripped, template
/// angle brackets stripped, and (for the outermost symbol) the bare base
/// name.
pub fn permute_name(qualified: &str) -> Vec<String> {
    let mut forms = HashSet::new();
    forms.insert(qualified.to_string());

    let without_params = strip_parens(qualified);
    forms.insert(without_params.clone());

    let without_template = strip_angles(&without_params);
    forms.insert(without_template.clone());

    if let Some(base) = without_template.rsplit("::").next() {
        forms.insert(base.to_string());
    }

    forms.into_iter().collect()
}

fn strip_parens(s: &str) -> String {
    match s.find('(') {
        Some(idx) => s[..idx].to_string(),
        None => s.to_string(),
    }
}

fn strip_angles(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut depth = 0u32;
    for c in s.chars() {
        match c {
            '<' => depth += 1,
            '>' if depth > 0 => depth -= 1,
            _ if depth == 0 => out.push(c),
            _ => {}
        }
    }
    out
}
