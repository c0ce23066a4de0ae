//! Outcome of a batch pull or push.

use std::fmt;
use std::time::Duration;

/// Direction of a batch transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferKind {
    Download,
    Upload,
}

impl TransferKind {
    /// Past tense used in the summary line.
    pub fn verb(self) -> &'static str {
        match self {
            TransferKind::Download => "Downloaded",
            TransferKind::Upload => "Uploaded",
        }
    }

    pub fn noun(self) -> &'static str {
        match self {
            TransferKind::Download => "download",
            TransferKind::Upload => "upload",
        }
    }
}

/// One entry that could not be transferred.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct TransferFailure {
    pub file: String,
    pub reason: String,
}

impl fmt::Display for TransferFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.file, self.reason)
    }
}

/// Aggregate result of a batch transfer.
///
/// Failures are kept sorted by path so the report does not depend on the
/// order in which workers finished.
#[derive(Debug, Clone)]
pub struct TransferReport {
    pub kind: TransferKind,
    pub attempted: usize,
    pub failures: Vec<TransferFailure>,
    pub transferred_bytes: u64,
    pub elapsed: Duration,
}

impl TransferReport {
    pub fn new(
        kind: TransferKind,
        attempted: usize,
        mut failures: Vec<TransferFailure>,
        transferred_bytes: u64,
        elapsed: Duration,
    ) -> Self {
        failures.sort();
        Self {
            kind,
            attempted,
            failures,
            transferred_bytes,
            elapsed,
        }
    }

    pub fn succeeded(&self) -> usize {
        self.attempted.saturating_sub(self.failures.len())
    }

    /// True iff no entry failed. A partially successful batch is a failure.
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    /// `Downloaded 2/3 file(s) in 1.2s.`
    pub fn summary(&self) -> String {
        format!(
            "{} {}/{} file(s) in {:.1}s.",
            self.kind.verb(),
            self.succeeded(),
            self.attempted,
            self.elapsed.as_secs_f64()
        )
    }

    /// Header plus one line per failure, or `None` if nothing failed.
    pub fn failure_lines(&self) -> Option<Vec<String>> {
        if self.failures.is_empty() {
            return None;
        }
        let mut lines = Vec::with_capacity(self.failures.len() + 1);
        lines.push(format!("{} {}(s) failed:", self.failures.len(), self.kind.noun()));
        lines.extend(self.failures.iter().map(|f| format!("  {f}")));
        Some(lines)
    }
}
