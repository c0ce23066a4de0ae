//! Error types for the cache synchronisation engine.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Cannot parse manifest {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid manifest schema in {}: {details}", path.display())]
    Schema { path: PathBuf, details: String },

    #[error("Unsupported manifest version: {0} (only v=0 supported)")]
    UnsupportedVersion(i64),

    #[error("No remotely-cached file for {0}")]
    NotFound(String),

    #[error("SHA256 mismatch for {file}: expected {expected}, got {actual}")]
    Integrity {
        file: String,
        expected: String,
        actual: String,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid cache entry: {0}")]
    InvalidEntry(String),

    #[error("Lock error: {0}")]
    Lock(String),

    #[error("Cannot sync {0}: every remote cache failed")]
    EntrySync(String),

    #[error("Cache entry not found: {0}")]
    EntryMissing(String),

    #[error("Transfer cancelled")]
    Cancelled,
}

impl SyncError {
    /// Classify a manifest deserialization failure.
    ///
    /// Syntax and truncation errors are parse failures; well-formed JSON
    /// with the wrong shape is a schema failure.
    pub fn from_manifest_json(path: PathBuf, err: serde_json::Error) -> Self {
        use serde_json::error::Category;
        match err.classify() {
            Category::Data => SyncError::Schema {
                path,
                details: err.to_string(),
            },
            Category::Io | Category::Syntax | Category::Eof => SyncError::Parse { path, source: err },
        }
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;
