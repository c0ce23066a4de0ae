//! Pull: download remote cache files into the local cache.
//!
//! Each file is streamed into a temp file in the destination directory while
//! being hashed. Only if the digest matches the manifest is the temp file
//! renamed over the destination, so readers never see a partial or corrupt
//! file and a failed download leaves any existing copy untouched.

use super::progress::{TransferProgress, REPORT_INTERVAL};
use super::progress_stream::ProgressStream;
use super::report::{TransferFailure, TransferKind, TransferReport};
use super::build_client;
use crate::cache::path::is_valid_cache_path;
use crate::config::TransferConfig;
use crate::fs::hash::finalize_hex;
use crate::fs::install_tempfile_builder;
use crate::manifest::diff::{DiffEntry, DiffState};
use crate::utils::errors::{Result, SyncError};
use futures_util::StreamExt;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tokio::io::AsyncWriteExt;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Prefix of in-flight download temp files. Never a valid cache file name.
pub const PARTIAL_PREFIX: &str = ".download-";

/// Keep the entries a pull should download.
///
/// `OnlyRemote` entries always qualify; `Sha256Mismatch` entries only with
/// `force`, so local modifications are never overwritten silently.
pub fn select_pull_targets<I>(entries: I, force: bool) -> Result<Vec<DiffEntry>>
where
    I: IntoIterator<Item = Result<DiffEntry>>,
{
    let mut targets = Vec::new();
    for entry in entries {
        let entry = entry?;
        match entry.state {
            DiffState::OnlyRemote => targets.push(entry),
            DiffState::Sha256Mismatch if force => targets.push(entry),
            DiffState::Sha256Mismatch => {
                debug!("pull: skipping modified {} (use --force)", entry.file);
            }
            DiffState::OnlyLocal | DiffState::Matching => {}
        }
    }
    Ok(targets)
}

/// Downloads cache files with bounded parallelism.
#[derive(Clone)]
pub struct Fetcher {
    client: reqwest::Client,
    data_dir: PathBuf,
    jobs: usize,
    cancel: CancellationToken,
}

impl Fetcher {
    pub fn new(data_dir: &Path, config: &TransferConfig) -> Result<Self> {
        if config.jobs == 0 {
            return Err(SyncError::Config("jobs must be at least 1".to_string()));
        }
        Ok(Self {
            client: build_client(config)?,
            data_dir: data_dir.to_path_buf(),
            jobs: config.jobs,
            cancel: CancellationToken::new(),
        })
    }

    /// Abort outstanding downloads when `cancel` fires.
    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Download every target, at most `jobs` at a time.
    ///
    /// A failing entry never stops the others; its error ends up in the
    /// report's failure list.
    pub async fn pull(&self, targets: Vec<DiffEntry>) -> TransferReport {
        let started = Instant::now();
        let total = targets.len();
        info!("pull: {} file(s), {} parallel job(s)", total, self.jobs);

        let progress = Arc::new(TransferProgress::new(total));
        let reporter_stop = self.cancel.child_token();
        let reporter = progress.spawn_reporter(TransferKind::Download, REPORT_INTERVAL, reporter_stop.clone());

        let semaphore = Arc::new(Semaphore::new(self.jobs));
        let mut handles = Vec::with_capacity(total);

        for entry in targets {
            let fetcher = self.clone();
            let sem = Arc::clone(&semaphore);
            let progress = Arc::clone(&progress);
            let file = entry.file.clone();

            let handle = tokio::spawn(async move {
                // Cancellation wins over a free permit
                let _permit = tokio::select! {
                    biased;
                    _ = fetcher.cancel.cancelled() => return Err(SyncError::Cancelled),
                    permit = sem.acquire_owned() => permit.map_err(|e| {
                        SyncError::Network(format!("worker pool closed: {e}"))
                    })?,
                };

                let result = tokio::select! {
                    result = fetcher.fetch_entry(&entry, &progress) => result,
                    _ = fetcher.cancel.cancelled() => Err(SyncError::Cancelled),
                };
                progress.file_done();
                result
            });

            handles.push((file, handle));
        }

        let mut failures = Vec::new();
        for (file, handle) in handles {
            let reason = match handle.await {
                Ok(Ok(_bytes)) => continue,
                Ok(Err(e)) => e.to_string(),
                Err(e) => format!("download task failed: {e}"),
            };
            warn!("pull: {} failed: {}", file, reason);
            failures.push(TransferFailure { file, reason });
        }

        reporter_stop.cancel();
        let _ = reporter.await;

        TransferReport::new(
            TransferKind::Download,
            total,
            failures,
            progress.transferred_bytes(),
            started.elapsed(),
        )
    }

    async fn fetch_entry(&self, entry: &DiffEntry, progress: &Arc<TransferProgress>) -> Result<u64> {
        let (Some(url), Some(sha256)) = (entry.url.as_deref(), entry.remote_sha256.as_deref()) else {
            return Err(SyncError::InvalidEntry(format!(
                "{} has no remote URL or hash",
                entry.file
            )));
        };
        self.fetch_file(&entry.file, url, sha256, progress).await
    }

    /// Download `url` to `<data_dir>/<key>`, verifying its SHA-256.
    ///
    /// Returns the number of bytes installed. On any error the destination
    /// is left exactly as it was and the temp file is removed.
    pub async fn fetch_file(
        &self,
        key: &str,
        url: &str,
        expected_sha256: &str,
        progress: &Arc<TransferProgress>,
    ) -> Result<u64> {
        if !is_valid_cache_path(key) {
            return Err(SyncError::InvalidEntry(key.to_string()));
        }
        let dest = self.data_dir.join(key);
        let parent = dest
            .parent()
            .ok_or_else(|| SyncError::InvalidEntry(key.to_string()))?;
        tokio::fs::create_dir_all(parent).await?;

        info!("fetching {}... start", key);

        // Same directory as the destination so the final rename is atomic
        let (file, tmp_path) = install_tempfile_builder(PARTIAL_PREFIX, "")
            .tempfile_in(parent)?
            .into_parts();
        let mut file = tokio::fs::File::from_std(file);

        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(SyncError::Network(format!("HTTP {status} for {url}")));
        }

        let mut hasher = Sha256::new();
        let mut written = 0u64;
        let mut stream = ProgressStream::new(Box::pin(response.bytes_stream()), progress.byte_counter());
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            hasher.update(&chunk);
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        file.flush().await?;
        file.sync_all().await?;
        drop(file);

        let actual = finalize_hex(hasher);
        if actual != expected_sha256 {
            return Err(SyncError::Integrity {
                file: key.to_string(),
                expected: expected_sha256.to_string(),
                actual,
            });
        }

        tmp_path.persist(&dest).map_err(|e| SyncError::Io(e.error))?;
        info!("fetching {}... ok ({} bytes)", key, written);
        Ok(written)
    }
}
