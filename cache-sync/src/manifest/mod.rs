//! Remote cache manifest.
//!
//! The manifest maps relative cache paths to the SHA-256 and download URL of
//! the remotely stored copy:
//!
//! ```json
//! {
//!   "files": {
//!     "cache/v1/20241001T000000Z/20241101T000000Z/downloads/data.parquet": {
//!       "sha256": "3a421c62179a...",
//!       "url": "https://storage.googleapis.com/bucket/cache/v1/..."
//!     }
//!   },
//!   "v": 0
//! }
//! ```
//!
//! It lives at `$datadir/state/ghremote/manifest.json` and is written with
//! sorted keys and a trailing newline so that it diffs cleanly under version
//! control.

pub mod diff;
pub mod scan;

use crate::fs::install_tempfile_builder;
use crate::fs::walker::relative_key;
use crate::utils::errors::{Result, SyncError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

/// The only manifest version this crate understands.
pub const MANIFEST_VERSION: i64 = 0;

/// Remote cache manifest. Field order matches the serialized key order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    #[serde(default)]
    pub files: BTreeMap<String, FileEntry>,
    #[serde(rename = "v")]
    pub version: i64,
}

/// Identity of a single remotely cached file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry {
    pub sha256: String,
    pub url: String,
}

impl Default for Manifest {
    fn default() -> Self {
        Self {
            files: BTreeMap::new(),
            version: MANIFEST_VERSION,
        }
    }
}

impl Manifest {
    /// Look up the entry for a relative cache path.
    pub fn get_file_entry(&self, key: &str) -> Result<&FileEntry> {
        self.files
            .get(key)
            .ok_or_else(|| SyncError::NotFound(key.to_string()))
    }

    /// Look up the entry for an absolute path below `data_dir`.
    pub fn file_entry_for(&self, full_path: &Path, data_dir: &Path) -> Result<&FileEntry> {
        let key = relative_key(full_path, data_dir)
            .ok_or_else(|| SyncError::NotFound(full_path.display().to_string()))?;
        self.get_file_entry(&key)
    }

    /// Insert or replace the entry for `key`.
    pub fn record(&mut self, key: impl Into<String>, entry: FileEntry) {
        self.files.insert(key.into(), entry);
    }

    /// Point every entry at `<base_url>/<key>`. Returns the number of entries.
    pub fn rewrite_urls(&mut self, base_url: &str) -> usize {
        let base = base_url.trim_end_matches('/');
        for (key, entry) in self.files.iter_mut() {
            entry.url = format!("{base}/{key}");
        }
        self.files.len()
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

/// Canonical manifest location for a data directory.
pub fn manifest_path_for(data_dir: &Path) -> PathBuf {
    data_dir.join("state").join("ghremote").join("manifest.json")
}

/// Load a manifest, or return an empty one if the file does not exist.
pub fn load_manifest(path: &Path) -> Result<Manifest> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            debug!("no manifest at {}, starting empty", path.display());
            return Ok(Manifest::default());
        }
        Err(e) => return Err(e.into()),
    };

    let manifest: Manifest = serde_json::from_str(&content)
        .map_err(|e| SyncError::from_manifest_json(path.to_path_buf(), e))?;

    if manifest.version != MANIFEST_VERSION {
        return Err(SyncError::UnsupportedVersion(manifest.version));
    }

    debug!("loaded manifest {} ({} files)", path.display(), manifest.len());
    Ok(manifest)
}

/// Atomically write the manifest to `path`.
///
/// The JSON goes to a temp file in the destination directory which is then
/// renamed over `path`, so readers see either the old or the new manifest.
pub fn save_manifest(manifest: &Manifest, path: &Path) -> Result<()> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent)?;

    let mut json = serde_json::to_string_pretty(manifest)?;
    json.push('\n');

    let mut tmp = install_tempfile_builder(".manifest-", ".tmp").tempfile_in(parent)?;
    tmp.write_all(json.as_bytes())?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| SyncError::Io(e.error))?;

    debug!("saved manifest {} ({} files)", path.display(), manifest.len());
    Ok(())
}
