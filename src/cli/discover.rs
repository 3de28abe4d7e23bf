//! Directory discovery for trees with no compile_commands.json, grounded
//! on the teacher's `indexing/walker.rs`: walk a root, respect
//! `.gitignore`, and let `indexing.ignore_patterns` exclude additional
//! globs, keeping only C/C++ source and header files.

use ignore::WalkBuilder;
use std::path::{Path, PathBuf};

const SOURCE_EXTENSIONS: &[&str] = &["c", "cc", "cpp", "cxx", "h", "hh", "hpp", "hxx"];

pub fn discover_sources(root: &Path, ignore_patterns: &[String]) -> Vec<PathBuf> {
    let mut builder = WalkBuilder::new(root);
    builder
        .hidden(false)
        .git_ignore(true)
        .git_global(true)
        .git_exclude(true)
        .follow_links(false)
        .require_git(false);

    let mut overrides = ignore::overrides::OverrideBuilder::new(root);
    for pattern in ignore_patterns {
        if overrides.add(&format!("!{pattern}")).is_err() {
            tracing::warn!(%pattern, "ignoring invalid glob pattern in indexing.ignore_patterns");
        }
    }
    if let Ok(overrides) = overrides.build() {
        builder.overrides(overrides);
    }

    builder
        .build()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_some_and(|ft| ft.is_file()))
        .map(|entry| entry.into_path())
        .filter(|path| {
            path.extension()
                .and_then(|e| e.to_str())
                .is_some_and(|ext| SOURCE_EXTENSIONS.contains(&ext))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn discovers_source_and_header_files() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.cpp"), "int main(){}").unwrap();
        fs::write(dir.path().join("a.h"), "int f();").unwrap();
        fs::write(dir.path().join("readme.txt"), "not code").unwrap();

        let found = discover_sources(dir.path(), &[]);
        assert_eq!(found.len(), 2);
    }

    #[test]
    fn ignore_pattern_excludes_matching_files() {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join("build")).unwrap();
        fs::write(dir.path().join("build/gen.cpp"), "int x(){return 0;}").unwrap();
        fs::write(dir.path().join("a.cpp"), "int main(){}").unwrap();

        let found = discover_sources(dir.path(), &["build/**".to_string()]);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].file_name().unwrap(), "a.cpp");
    }
}
