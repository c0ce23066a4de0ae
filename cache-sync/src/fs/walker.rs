//! Local cache directory traversal.
//!
//! Walks `<data_dir>/cache/v1` and reports every regular file whose path,
//! relative to the data directory, is a valid cache path. Lock files, temp
//! downloads and other stray artifacts never show up in the result.

use crate::cache::path::{is_valid_cache_path, CACHE_DIR, CACHE_VERSION};
use std::collections::BTreeSet;
use std::io;
use std::path::{Component, Path};
use walkdir::{DirEntry, WalkDir};

/// Return the set of valid relative cache paths present under `data_dir`.
///
/// A missing `cache/v1` directory is an empty cache, not an error.
pub fn scan_local(data_dir: &Path) -> io::Result<BTreeSet<String>> {
    let mut files = BTreeSet::new();
    walk_cache_files(data_dir, |rel| {
        files.insert(rel);
    })?;
    Ok(files)
}

/// Walk the cache tree and call `callback` with each valid relative path.
pub fn walk_cache_files<F>(data_dir: &Path, mut callback: F) -> io::Result<()>
where
    F: FnMut(String),
{
    let cache_dir = data_dir.join(CACHE_DIR).join(CACHE_VERSION);
    if !cache_dir.is_dir() {
        return Ok(());
    }

    for entry in WalkDir::new(&cache_dir).follow_links(false) {
        let entry = entry?;

        if !is_regular_file(&entry) {
            continue;
        }

        let Some(rel) = relative_key(entry.path(), data_dir) else {
            continue;
        };

        if is_valid_cache_path(&rel) {
            callback(rel);
        }
    }

    Ok(())
}

/// Regular files, or symlinks resolving to regular files.
fn is_regular_file(entry: &DirEntry) -> bool {
    let file_type = entry.file_type();
    if file_type.is_file() {
        return true;
    }
    if file_type.is_symlink() {
        // Broken links and links to directories are skipped
        return std::fs::metadata(entry.path())
            .map(|m| m.is_file())
            .unwrap_or(false);
    }
    false
}

/// Forward-slash relative path of `path` below `root`, if representable.
pub fn relative_key(path: &Path, root: &Path) -> Option<String> {
    let rel = path.strip_prefix(root).ok()?;
    let mut parts = Vec::new();
    for component in rel.components() {
        match component {
            Component::Normal(part) => parts.push(part.to_str()?),
            _ => return None,
        }
    }
    Some(parts.join("/"))
}
