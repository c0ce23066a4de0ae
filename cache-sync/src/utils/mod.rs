//! Utility modules for the cache synchroniser.

pub mod errors;
pub mod logger;

pub use errors::{Result, SyncError};
