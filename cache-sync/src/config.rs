//! Configuration management for the cache synchroniser.
//!
//! Loads configuration from a TOML file. Every section and key has a
//! default, so an empty file (or no file at all) is a valid configuration.

use crate::utils::errors::{Result, SyncError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub data: DataConfig,
    pub remote: RemoteConfig,
    pub transfer: TransferConfig,
    pub log: LogConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    /// Data directory holding `cache/` and `state/` (default: `./.iqb`)
    pub dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    /// Object store endpoint that receives uploads
    pub endpoint: String,

    /// Base of the download URLs written into the manifest (default: `endpoint`)
    pub public_base_url: Option<String>,

    /// Bucket holding the cache objects
    pub bucket: String,

    /// Bearer token sent with uploads
    pub token: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransferConfig {
    /// Maximum concurrent transfers
    pub jobs: usize,

    /// TCP connect timeout in seconds
    pub connect_timeout_secs: u64,

    /// Whole-request timeout in seconds
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
}

// Default values
pub const DEFAULT_ENDPOINT: &str = "https://storage.googleapis.com";
pub const DEFAULT_BUCKET: &str = "mlab-sandbox-iqb-us-central1";
pub const DEFAULT_JOBS: usize = 8;

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            public_base_url: None,
            bucket: DEFAULT_BUCKET.to_string(),
            token: None,
        }
    }
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            jobs: DEFAULT_JOBS,
            connect_timeout_secs: 30,
            request_timeout_secs: 3600,
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| SyncError::Config(format!("{}: {e}", path.display())))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values that would make transfers impossible.
    pub fn validate(&self) -> Result<()> {
        if self.transfer.jobs == 0 {
            return Err(SyncError::Config("transfer.jobs must be at least 1".to_string()));
        }
        if self.remote.bucket.trim().is_empty() {
            return Err(SyncError::Config("remote.bucket must not be empty".to_string()));
        }
        Ok(())
    }

    /// Configured data directory, or `./.iqb` like git's `.git`.
    pub fn data_dir(&self) -> PathBuf {
        data_dir_or_default(self.data.dir.as_deref())
    }
}

impl RemoteConfig {
    /// Where a cache key is uploaded.
    pub fn upload_url(&self, key: &str) -> String {
        format!("{}/{}/{}", self.endpoint.trim_end_matches('/'), self.bucket, key)
    }

    /// Public download URL recorded in the manifest for a cache key.
    pub fn object_url(&self, key: &str) -> String {
        let base = self.public_base_url.as_deref().unwrap_or(&self.endpoint);
        format!("{}/{}/{}", base.trim_end_matches('/'), self.bucket, key)
    }
}

impl TransferConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// `dir` if given, otherwise `.iqb` in the current working directory.
pub fn data_dir_or_default(dir: Option<&Path>) -> PathBuf {
    match dir {
        Some(dir) => dir.to_path_buf(),
        None => std::env::current_dir()
            .unwrap_or_else(|_| PathBuf::from("."))
            .join(".iqb"),
    }
}
