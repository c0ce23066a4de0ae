//! Cache entries and the remote-cache seam used to populate them.
//!
//! A [`CacheEntry`] names one dataset over one period: a directory holding
//! `data.parquet` and `stats.json`. The population pipeline locks the entry,
//! checks whether it exists and otherwise asks its syncers, in order, to
//! bring it onto disk.

use super::path::{
    is_valid_name, CACHE_DIR, CACHE_VERSION, DATA_FILENAME, STATS_FILENAME, TIMESTAMP_DIR_FORMAT,
};
use crate::fs::lock::{acquire_lock, EntryLock};
use crate::utils::errors::{Result, SyncError};
use chrono::NaiveDate;
use futures_util::future::BoxFuture;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

/// Something that can bring a cache entry onto disk, e.g. an object store.
pub trait RemoteCache: Send + Sync {
    /// Try to sync `entry` to disk. Returns whether it succeeded; failures
    /// are expected to be logged by the implementation.
    fn sync<'a>(&'a self, entry: &'a CacheEntry) -> BoxFuture<'a, bool>;
}

/// One dataset over one `[start, end)` period.
#[derive(Clone)]
pub struct CacheEntry {
    pub data_dir: PathBuf,
    pub dataset_name: String,
    pub start_time: NaiveDate,
    pub end_time: NaiveDate,
    syncers: Vec<Arc<dyn RemoteCache>>,
}

impl CacheEntry {
    pub fn new(
        data_dir: &Path,
        dataset_name: &str,
        start_time: NaiveDate,
        end_time: NaiveDate,
    ) -> Self {
        Self {
            data_dir: data_dir.to_path_buf(),
            dataset_name: dataset_name.to_string(),
            start_time,
            end_time,
            syncers: Vec::new(),
        }
    }

    /// Append a syncer; syncers are tried in insertion order.
    pub fn with_syncer(mut self, syncer: Arc<dyn RemoteCache>) -> Self {
        self.syncers.push(syncer);
        self
    }

    /// `cache/v1/{start}/{end}/{dataset}`, relative to the data directory.
    pub fn relative_dir(&self) -> String {
        format!(
            "{}/{}/{}/{}/{}",
            CACHE_DIR,
            CACHE_VERSION,
            self.start_time.format(TIMESTAMP_DIR_FORMAT),
            self.end_time.format(TIMESTAMP_DIR_FORMAT),
            self.dataset_name
        )
    }

    pub fn dir_path(&self) -> PathBuf {
        self.data_dir.join(self.relative_dir())
    }

    pub fn data_parquet_path(&self) -> PathBuf {
        self.dir_path().join(DATA_FILENAME)
    }

    pub fn stats_json_path(&self) -> PathBuf {
        self.dir_path().join(STATS_FILENAME)
    }

    /// Manifest key of `data.parquet`.
    pub fn data_parquet_key(&self) -> String {
        format!("{}/{}", self.relative_dir(), DATA_FILENAME)
    }

    /// Manifest key of `stats.json`.
    pub fn stats_json_key(&self) -> String {
        format!("{}/{}", self.relative_dir(), STATS_FILENAME)
    }

    /// Both files are present on disk.
    pub fn exists(&self) -> bool {
        self.stats_json_path().is_file() && self.data_parquet_path().is_file()
    }

    /// Block until this entry's lock is held. Creates the entry directory.
    pub fn lock(&self) -> Result<EntryLock> {
        acquire_lock(&self.dir_path())
    }

    /// Sync the entry using the configured syncers.
    ///
    /// With syncers, the first one reporting success wins and
    /// [`SyncError::EntrySync`] is returned if all fail. Without syncers,
    /// this only succeeds if the files are already on disk.
    pub async fn sync(&self) -> Result<()> {
        if !self.syncers.is_empty() {
            for syncer in &self.syncers {
                if syncer.sync(self).await {
                    return Ok(());
                }
            }
            return Err(SyncError::EntrySync(self.to_string()));
        }

        if self.exists() {
            Ok(())
        } else {
            Err(SyncError::EntryMissing(self.to_string()))
        }
    }

    /// Make sure the entry is on disk, syncing it under the entry lock.
    ///
    /// The lock is taken once here; syncers run while it is held and must
    /// not try to take it again.
    pub async fn ensure(&self) -> Result<()> {
        let entry = self.clone();
        let _lock = tokio::task::spawn_blocking(move || entry.lock())
            .await
            .map_err(|e| SyncError::Lock(format!("lock task failed: {e}")))??;

        if self.exists() {
            debug!("{} already cached", self);
            return Ok(());
        }
        self.sync().await
    }
}

impl fmt::Display for CacheEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({} to {})",
            self.dataset_name, self.start_time, self.end_time
        )
    }
}

impl fmt::Debug for CacheEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheEntry")
            .field("data_dir", &self.data_dir)
            .field("dataset_name", &self.dataset_name)
            .field("start_time", &self.start_time)
            .field("end_time", &self.end_time)
            .field("syncers", &self.syncers.len())
            .finish()
    }
}

/// Hands out cache entries rooted at one data directory.
#[derive(Clone)]
pub struct CacheManager {
    data_dir: PathBuf,
    remote_cache: Option<Arc<dyn RemoteCache>>,
}

impl CacheManager {
    pub fn new(data_dir: &Path, remote_cache: Option<Arc<dyn RemoteCache>>) -> Self {
        Self {
            data_dir: data_dir.to_path_buf(),
            remote_cache,
        }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Entry for `dataset_name` over `[start_date, end_date)`.
    ///
    /// Dates are `YYYY-MM-DD` and `start_date` must precede `end_date`.
    /// The entry is lazy: it may not exist on disk until synced.
    pub fn get_cache_entry(
        &self,
        dataset_name: &str,
        start_date: &str,
        end_date: &str,
    ) -> Result<CacheEntry> {
        let start_time = parse_date(start_date, "start date")?;
        let end_time = parse_date(end_date, "end date")?;
        if start_time >= end_time {
            return Err(SyncError::InvalidEntry(format!(
                "start_date must be < end_date, got: {start_date} >= {end_date}"
            )));
        }

        if !is_valid_name(dataset_name) {
            return Err(SyncError::InvalidEntry(format!(
                "Invalid dataset name: {dataset_name}"
            )));
        }

        let mut entry = CacheEntry::new(&self.data_dir, dataset_name, start_time, end_time);
        if let Some(remote) = &self.remote_cache {
            entry = entry.with_syncer(Arc::clone(remote));
        }
        Ok(entry)
    }
}

fn parse_date(value: &str, descr: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d").map_err(|_| {
        SyncError::InvalidEntry(format!(
            "Invalid {descr} format: {value} (expected YYYY-MM-DD)"
        ))
    })
}
