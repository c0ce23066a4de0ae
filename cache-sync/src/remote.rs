//! Remote cache backed by the manifest and the object store.
//!
//! [`GhRemoteCache`] plugs into [`CacheEntry`] as a syncer: it looks up both
//! entry files in the manifest and downloads them with the same verified,
//! atomic install path used by `pull`.

use crate::cache::entry::{CacheEntry, RemoteCache};
use crate::config::TransferConfig;
use crate::fs::hash::hash_file;
use crate::manifest::{load_manifest, manifest_path_for, Manifest};
use crate::transfer::progress::TransferProgress;
use crate::transfer::Fetcher;
use crate::utils::errors::{Result, SyncError};
use futures_util::future::BoxFuture;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

pub struct GhRemoteCache {
    manifest: Manifest,
    fetcher: Fetcher,
}

impl GhRemoteCache {
    /// Load the manifest from `<data_dir>/state/ghremote/manifest.json`.
    ///
    /// A missing manifest yields an empty cache that syncs nothing.
    pub fn new(data_dir: &Path, transfer: &TransferConfig) -> Result<Self> {
        let manifest = load_manifest(&manifest_path_for(data_dir))?;
        Self::with_manifest(manifest, data_dir, transfer)
    }

    pub fn with_manifest(manifest: Manifest, data_dir: &Path, transfer: &TransferConfig) -> Result<Self> {
        Ok(Self {
            manifest,
            fetcher: Fetcher::new(data_dir, transfer)?,
        })
    }

    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    /// Fetch `stats.json` then `data.parquet` for `entry`.
    ///
    /// Both files must be in the manifest before anything is downloaded.
    /// Files already on disk with the right hash are left alone.
    pub async fn sync_entry(&self, entry: &CacheEntry) -> Result<()> {
        let files = [
            (entry.stats_json_key(), entry.stats_json_path()),
            (entry.data_parquet_key(), entry.data_parquet_path()),
        ];

        let mut planned = Vec::with_capacity(files.len());
        for (key, path) in files {
            let file_entry = self.manifest.get_file_entry(&key)?;
            planned.push((key, path, file_entry));
        }

        for (key, path, file_entry) in planned {
            if local_hash_matches(path, &file_entry.sha256).await? {
                debug!("{} is up to date", key);
                continue;
            }
            let progress = Arc::new(TransferProgress::new(1));
            self.fetcher
                .fetch_file(&key, &file_entry.url, &file_entry.sha256, &progress)
                .await?;
        }
        Ok(())
    }
}

async fn local_hash_matches(path: PathBuf, expected: &str) -> Result<bool> {
    if !path.is_file() {
        return Ok(false);
    }
    let actual = tokio::task::spawn_blocking(move || hash_file(&path))
        .await
        .map_err(|e| SyncError::Network(format!("hash task failed: {e}")))??;
    Ok(actual == expected)
}

impl RemoteCache for GhRemoteCache {
    fn sync<'a>(&'a self, entry: &'a CacheEntry) -> BoxFuture<'a, bool> {
        Box::pin(async move {
            info!("syncing {}... start", entry);
            match self.sync_entry(entry).await {
                Ok(()) => {
                    info!("syncing {}... ok", entry);
                    true
                }
                Err(e) => {
                    warn!("syncing {}... failed: {}", entry, e);
                    false
                }
            }
        })
    }
}
