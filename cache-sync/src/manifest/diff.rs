//! Manifest vs local cache comparison.
//!
//! [`diff`] yields one [`DiffEntry`] per file in two phases, each sorted by
//! path:
//!
//! 1. every valid manifest key, as `OnlyRemote`, `Matching` or
//!    `Sha256Mismatch`;
//! 2. every valid local file absent from the manifest, as `OnlyLocal`.
//!
//! The local tree is listed up front but files are hashed lazily, one per
//! call to `next()`, so a consumer that stops early does not pay for
//! hashing the rest of the cache. Nothing is written to disk.

use super::{FileEntry, Manifest};
use crate::cache::path::is_valid_cache_path;
use crate::fs::hash::hash_file;
use crate::fs::walker::scan_local;
use crate::utils::errors::Result;
use std::collections::{btree_map, btree_set, BTreeSet};
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::debug;

/// State of a single file when comparing manifest and local cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DiffState {
    /// In the manifest, not on disk.
    OnlyRemote,
    /// On disk, not in the manifest.
    OnlyLocal,
    /// On disk and in the manifest with a different hash.
    Sha256Mismatch,
    /// On disk and in the manifest with the same hash.
    Matching,
}

impl DiffState {
    /// One-letter status used by `status`: D(ownload), M(odified), A(dded).
    pub fn status_char(self) -> char {
        match self {
            DiffState::OnlyRemote => 'D',
            DiffState::Sha256Mismatch => 'M',
            DiffState::OnlyLocal => 'A',
            DiffState::Matching => ' ',
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            DiffState::OnlyRemote => "only_remote",
            DiffState::OnlyLocal => "only_local",
            DiffState::Sha256Mismatch => "sha256_mismatch",
            DiffState::Matching => "matching",
        }
    }
}

impl fmt::Display for DiffState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One file in a manifest-vs-local comparison.
///
/// `url` and `remote_sha256` are set iff the file is in the manifest;
/// `local_sha256` is set iff it is on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffEntry {
    pub file: String,
    pub url: Option<String>,
    pub remote_sha256: Option<String>,
    pub local_sha256: Option<String>,
    pub state: DiffState,
}

type AcceptFn<'a> = Box<dyn Fn(&str) -> bool + 'a>;

/// Lazy iterator over diff results. See the module docs.
pub struct Diff<'a> {
    data_dir: PathBuf,
    remote: btree_map::Iter<'a, String, FileEntry>,
    local_files: BTreeSet<String>,
    local_only: btree_set::IntoIter<String>,
    accept: Option<AcceptFn<'a>>,
}

/// Compare every manifest entry and local file.
pub fn diff<'a>(manifest: &'a Manifest, data_dir: &Path) -> Result<Diff<'a>> {
    Diff::new(manifest, data_dir, None)
}

/// Like [`diff`], restricted to relative paths accepted by `accept`.
pub fn diff_filtered<'a, F>(manifest: &'a Manifest, data_dir: &Path, accept: F) -> Result<Diff<'a>>
where
    F: Fn(&str) -> bool + 'a,
{
    Diff::new(manifest, data_dir, Some(Box::new(accept)))
}

impl<'a> Diff<'a> {
    fn new(manifest: &'a Manifest, data_dir: &Path, accept: Option<AcceptFn<'a>>) -> Result<Self> {
        let mut local_files = scan_local(data_dir)?;
        if let Some(accept) = &accept {
            local_files.retain(|f| accept(f.as_str()));
        }

        let local_only: BTreeSet<String> = local_files
            .iter()
            .filter(|f| !manifest.files.contains_key(*f))
            .cloned()
            .collect();

        Ok(Self {
            data_dir: data_dir.to_path_buf(),
            remote: manifest.files.iter(),
            local_files,
            local_only: local_only.into_iter(),
            accept,
        })
    }

    fn accepts(&self, key: &str) -> bool {
        self.accept.as_ref().map_or(true, |accept| accept(key))
    }

    fn compare_remote(&self, key: &str, entry: &FileEntry) -> Result<DiffEntry> {
        if !self.local_files.contains(key) {
            return Ok(DiffEntry {
                file: key.to_string(),
                url: Some(entry.url.clone()),
                remote_sha256: Some(entry.sha256.clone()),
                local_sha256: None,
                state: DiffState::OnlyRemote,
            });
        }

        let local_sha256 = hash_file(&self.data_dir.join(key))?;
        let state = if local_sha256 == entry.sha256 {
            DiffState::Matching
        } else {
            DiffState::Sha256Mismatch
        };
        Ok(DiffEntry {
            file: key.to_string(),
            url: Some(entry.url.clone()),
            remote_sha256: Some(entry.sha256.clone()),
            local_sha256: Some(local_sha256),
            state,
        })
    }
}

impl Iterator for Diff<'_> {
    type Item = Result<DiffEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        while let Some((key, entry)) = self.remote.next() {
            if !self.accepts(key) {
                continue;
            }
            if !is_valid_cache_path(key) {
                debug!("ignoring invalid manifest key {:?}", key);
                continue;
            }
            return Some(self.compare_remote(key, entry));
        }

        let key = self.local_only.next()?;
        let result = hash_file(&self.data_dir.join(&key))
            .map(|local_sha256| DiffEntry {
                file: key,
                url: None,
                remote_sha256: None,
                local_sha256: Some(local_sha256),
                state: DiffState::OnlyLocal,
            })
            .map_err(Into::into);
        Some(result)
    }
}
