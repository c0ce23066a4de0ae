//! Aggregate progress tracking for batch transfers.
//!
//! Workers bump shared atomic counters; a single background task logs a
//! progress line at a fixed interval until the batch finishes.

use super::report::TransferKind;
use super::progress_stream::ProgressCallback;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// How often the background reporter logs.
pub const REPORT_INTERVAL: Duration = Duration::from_secs(5);

/// Shared counters for one batch of transfers.
#[derive(Debug)]
pub struct TransferProgress {
    total_files: usize,
    completed_files: AtomicUsize,
    transferred_bytes: AtomicU64,
    started: Instant,
}

impl TransferProgress {
    pub fn new(total_files: usize) -> Self {
        Self {
            total_files,
            completed_files: AtomicUsize::new(0),
            transferred_bytes: AtomicU64::new(0),
            started: Instant::now(),
        }
    }

    pub fn add_bytes(&self, bytes: u64) {
        self.transferred_bytes.fetch_add(bytes, Ordering::Relaxed);
    }

    /// Mark one file as finished, successfully or not.
    pub fn file_done(&self) {
        self.completed_files.fetch_add(1, Ordering::Relaxed);
    }

    pub fn completed_files(&self) -> usize {
        self.completed_files.load(Ordering::Relaxed)
    }

    pub fn total_files(&self) -> usize {
        self.total_files
    }

    pub fn transferred_bytes(&self) -> u64 {
        self.transferred_bytes.load(Ordering::Relaxed)
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Average speed since the batch started.
    pub fn average_speed(&self) -> u64 {
        let elapsed = self.elapsed().as_secs_f64();
        if elapsed > 0.0 {
            (self.transferred_bytes() as f64 / elapsed) as u64
        } else {
            0
        }
    }

    /// Callback feeding a [`ProgressStream`](super::progress_stream::ProgressStream).
    pub fn byte_counter(self: &Arc<Self>) -> ProgressCallback {
        let progress = Arc::clone(self);
        Arc::new(move |bytes| progress.add_bytes(bytes))
    }

    /// Log progress every `interval` until `stop` is cancelled.
    pub fn spawn_reporter(
        self: &Arc<Self>,
        kind: TransferKind,
        interval: Duration,
        stop: CancellationToken,
    ) -> JoinHandle<()> {
        let progress = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // The first tick completes immediately
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {}
                    _ = stop.cancelled() => break,
                }

                info!(
                    "{}: {}/{} file(s), {} at {}",
                    kind.noun(),
                    progress.completed_files(),
                    progress.total_files(),
                    format_bytes(progress.transferred_bytes()),
                    format_speed(progress.average_speed()),
                );
            }
        })
    }
}

/// Format bytes as human-readable string
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    let mut size = bytes as f64;
    let mut unit_index = 0;

    while size >= 1024.0 && unit_index < UNITS.len() - 1 {
        size /= 1024.0;
        unit_index += 1;
    }

    format!("{:.2} {}", size, UNITS[unit_index])
}

/// Format speed as human-readable string
pub fn format_speed(bytes_per_second: u64) -> String {
    format!("{}/s", format_bytes(bytes_per_second))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters() {
        let progress = Arc::new(TransferProgress::new(3));
        let counter = progress.byte_counter();
        counter(100);
        counter(24);
        progress.file_done();

        assert_eq!(progress.transferred_bytes(), 124);
        assert_eq!(progress.completed_files(), 1);
        assert_eq!(progress.total_files(), 3);
    }

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(0), "0.00 B");
        assert_eq!(format_bytes(1023), "1023.00 B");
        assert_eq!(format_bytes(1024), "1.00 KB");
        assert_eq!(format_bytes(1024 * 1024), "1.00 MB");
        assert_eq!(format_bytes(1024 * 1024 * 1024), "1.00 GB");
    }

    #[test]
    fn test_format_speed() {
        assert_eq!(format_speed(1024), "1.00 KB/s");
        assert_eq!(format_speed(1024 * 1024), "1.00 MB/s");
    }

    #[tokio::test]
    async fn test_reporter_stops_on_cancel() {
        let progress = Arc::new(TransferProgress::new(1));
        let stop = CancellationToken::new();
        let handle = progress.spawn_reporter(
            TransferKind::Download,
            Duration::from_millis(10),
            stop.clone(),
        );

        tokio::time::sleep(Duration::from_millis(30)).await;
        stop.cancel();
        assert!(handle.await.is_ok());
    }
}
