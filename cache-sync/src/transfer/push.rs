//! Push: upload local cache files and record them in the manifest.
//!
//! The manifest is updated and saved right after each confirmed upload,
//! never before and never batched at the end. An interrupted push loses at
//! most the records of uploads still in flight.

use super::progress::{TransferProgress, REPORT_INTERVAL};
use super::progress_stream::ProgressStream;
use super::report::{TransferFailure, TransferKind, TransferReport};
use super::build_client;
use crate::cache::path::is_valid_cache_path;
use crate::config::{RemoteConfig, TransferConfig};
use crate::manifest::diff::{DiffEntry, DiffState};
use crate::manifest::{save_manifest, FileEntry, Manifest};
use crate::utils::errors::{Result, SyncError};
use reqwest::header::{CONTENT_LENGTH, CONTENT_TYPE};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{Mutex, Semaphore};
use tokio_util::io::ReaderStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Keep the entries a push should upload.
///
/// `OnlyLocal` entries always qualify; `Sha256Mismatch` entries only with
/// `force`.
pub fn select_push_targets<I>(entries: I, force: bool) -> Result<Vec<DiffEntry>>
where
    I: IntoIterator<Item = Result<DiffEntry>>,
{
    let mut targets = Vec::new();
    for entry in entries {
        let entry = entry?;
        match entry.state {
            DiffState::OnlyLocal => targets.push(entry),
            DiffState::Sha256Mismatch if force => targets.push(entry),
            DiffState::Sha256Mismatch => {
                debug!("push: skipping modified {} (use --force)", entry.file);
            }
            DiffState::OnlyRemote | DiffState::Matching => {}
        }
    }
    Ok(targets)
}

/// Uploads cache files to the object store with bounded parallelism.
#[derive(Clone)]
pub struct Pusher {
    client: reqwest::Client,
    data_dir: PathBuf,
    remote: RemoteConfig,
    jobs: usize,
    cancel: CancellationToken,
}

impl Pusher {
    pub fn new(data_dir: &Path, remote: &RemoteConfig, transfer: &TransferConfig) -> Result<Self> {
        if transfer.jobs == 0 {
            return Err(SyncError::Config("jobs must be at least 1".to_string()));
        }
        Ok(Self {
            client: build_client(transfer)?,
            data_dir: data_dir.to_path_buf(),
            remote: remote.clone(),
            jobs: transfer.jobs,
            cancel: CancellationToken::new(),
        })
    }

    /// Abort outstanding uploads when `cancel` fires.
    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Upload every target and record each success in `manifest`.
    ///
    /// The manifest is saved to `manifest_path` after every successful
    /// upload; workers serialise on a mutex for the update+save. Failed
    /// entries keep their previous manifest state. Returns the updated
    /// manifest together with the report.
    pub async fn push(
        &self,
        manifest: Manifest,
        manifest_path: &Path,
        targets: Vec<DiffEntry>,
    ) -> (Manifest, TransferReport) {
        let started = Instant::now();
        let total = targets.len();
        info!(
            "push: {} file(s) to bucket {}, {} parallel job(s)",
            total, self.remote.bucket, self.jobs
        );

        let shared = Arc::new(Mutex::new(manifest));
        let manifest_path = Arc::new(manifest_path.to_path_buf());
        let progress = Arc::new(TransferProgress::new(total));
        let reporter_stop = self.cancel.child_token();
        let reporter = progress.spawn_reporter(TransferKind::Upload, REPORT_INTERVAL, reporter_stop.clone());

        let semaphore = Arc::new(Semaphore::new(self.jobs));
        let mut handles = Vec::with_capacity(total);

        for entry in targets {
            let pusher = self.clone();
            let sem = Arc::clone(&semaphore);
            let progress = Arc::clone(&progress);
            let shared = Arc::clone(&shared);
            let manifest_path = Arc::clone(&manifest_path);
            let file = entry.file.clone();

            let handle = tokio::spawn(async move {
                // Cancellation wins over a free permit
                let _permit = tokio::select! {
                    biased;
                    _ = pusher.cancel.cancelled() => return Err(SyncError::Cancelled),
                    permit = sem.acquire_owned() => permit.map_err(|e| {
                        SyncError::Network(format!("worker pool closed: {e}"))
                    })?,
                };

                let result = pusher
                    .push_entry(&entry, &shared, &manifest_path, &progress)
                    .await;
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
                Err(e) => format!("upload task failed: {e}"),
            };
            warn!("push: {} failed: {}", file, reason);
            failures.push(TransferFailure { file, reason });
        }

        reporter_stop.cancel();
        let _ = reporter.await;

        let manifest = match Arc::try_unwrap(shared) {
            Ok(mutex) => mutex.into_inner(),
            Err(shared) => shared.lock().await.clone(),
        };

        let report = TransferReport::new(
            TransferKind::Upload,
            total,
            failures,
            progress.transferred_bytes(),
            started.elapsed(),
        );
        (manifest, report)
    }

    async fn push_entry(
        &self,
        entry: &DiffEntry,
        shared: &Mutex<Manifest>,
        manifest_path: &Path,
        progress: &Arc<TransferProgress>,
    ) -> Result<u64> {
        let Some(sha256) = entry.local_sha256.clone() else {
            return Err(SyncError::InvalidEntry(format!("{} has no local hash", entry.file)));
        };

        let bytes = tokio::select! {
            result = self.upload_file(&entry.file, progress) => result?,
            _ = self.cancel.cancelled() => return Err(SyncError::Cancelled),
        };

        // Record only after the object store confirmed the upload
        let url = self.remote.object_url(&entry.file);
        let mut manifest = shared.lock().await;
        let previous = manifest.files.insert(entry.file.clone(), FileEntry { sha256, url });
        if let Err(e) = save_manifest(&manifest, manifest_path) {
            error!("push: uploaded {} but could not save manifest: {}", entry.file, e);
            match previous {
                Some(previous) => manifest.record(entry.file.clone(), previous),
                None => {
                    manifest.files.remove(&entry.file);
                }
            }
            return Err(e);
        }

        Ok(bytes)
    }

    /// Stream `<data_dir>/<key>` to the object store. Returns bytes sent.
    pub async fn upload_file(&self, key: &str, progress: &Arc<TransferProgress>) -> Result<u64> {
        if !is_valid_cache_path(key) {
            return Err(SyncError::InvalidEntry(key.to_string()));
        }
        let source = self.data_dir.join(key);
        let file = tokio::fs::File::open(&source).await?;
        let size = file.metadata().await?.len();
        let upload_url = self.remote.upload_url(key);

        info!("uploading {}... start ({} bytes)", key, size);

        let stream = ProgressStream::new(ReaderStream::new(file), progress.byte_counter());
        let mut request = self
            .client
            .put(&upload_url)
            .header(CONTENT_LENGTH, size)
            .header(CONTENT_TYPE, "application/octet-stream")
            .body(reqwest::Body::wrap_stream(stream));
        if let Some(token) = &self.remote.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(SyncError::Network(format!(
                "upload failed: HTTP {status} - {}",
                error_text.trim()
            )));
        }

        info!("uploading {}... ok", key);
        Ok(size)
    }
}
