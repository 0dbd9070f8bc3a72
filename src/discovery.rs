//! Source file discovery for the `bling-split` binary.

use crate::extract::MARKER;
use std::path::{Path, PathBuf};
use walkdir::{DirEntry, WalkDir};

/// Extensions of modules the transform understands.
pub const SOURCE_EXTENSIONS: &[&str] = &["js", "jsx", "ts", "tsx", "mjs", "cjs", "mts", "cts"];

fn is_skipped_dir(entry: &DirEntry) -> bool {
    entry.depth() > 0
        && entry.file_type().is_dir()
        && entry
            .file_name()
            .to_str()
            .is_some_and(|name| name == "node_modules" || name.starts_with('.'))
}

pub fn is_source_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| SOURCE_EXTENSIONS.contains(&ext))
}

/// Recursively finds source modules under `dir`, skipping `node_modules` and
/// dot directories. A file path is returned as is.
pub fn find_source_files(dir: &Path) -> Vec<PathBuf> {
    if dir.is_file() {
        return if is_source_file(dir) {
            vec![dir.to_path_buf()]
        } else {
            Vec::new()
        };
    }

    let mut files: Vec<PathBuf> = WalkDir::new(dir)
        .follow_links(true)
        .into_iter()
        .filter_entry(|entry| !is_skipped_dir(entry))
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file() && is_source_file(entry.path()))
        .map(|entry| entry.into_path())
        .collect();
    files.sort();
    files
}

/// Only modules that mention the marker need splitting.
pub fn contains_marker(source: &str) -> bool {
    source.contains(MARKER)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_find_source_files() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("routes/admin")).unwrap();
        fs::create_dir_all(root.join("node_modules/pkg")).unwrap();
        fs::create_dir_all(root.join(".cache")).unwrap();
        fs::write(root.join("routes/index.tsx"), "").unwrap();
        fs::write(root.join("routes/admin/users.ts"), "").unwrap();
        fs::write(root.join("routes/readme.md"), "").unwrap();
        fs::write(root.join("node_modules/pkg/index.js"), "").unwrap();
        fs::write(root.join(".cache/old.js"), "").unwrap();

        let files: Vec<PathBuf> = find_source_files(root)
            .into_iter()
            .map(|p| p.strip_prefix(root).unwrap().to_path_buf())
            .collect();
        assert_eq!(
            files,
            vec![
                PathBuf::from("routes/admin/users.ts"),
                PathBuf::from("routes/index.tsx")
            ]
        );
    }

    #[test]
    fn test_single_file_input() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("a.mjs");
        fs::write(&file, "").unwrap();
        assert_eq!(find_source_files(&file), vec![file]);
        assert!(find_source_files(&dir.path().join("missing.txt")).is_empty());
    }

    #[test]
    fn test_contains_marker() {
        assert!(contains_marker("const f = serverFn$(() => 1);"));
        assert!(!contains_marker("const f = () => 1;"));
    }
}
