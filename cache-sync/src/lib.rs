//! Cache Sync Library
//!
//! Keeps a local tree of cached measurement data in step with an object
//! store, using a JSON manifest of SHA-256 hashes and download URLs.

pub mod cache;
pub mod config;
pub mod fs;
pub mod manifest;
pub mod remote;
pub mod shutdown;
pub mod transfer;
pub mod utils;

// Re-export commonly used types
pub use config::Config;
pub use utils::errors::{Result, SyncError};
