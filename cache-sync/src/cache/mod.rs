//! On-disk cache layout and cache entries.

pub mod entry;
pub mod path;

pub use entry::{CacheEntry, CacheManager, RemoteCache};
pub use path::is_valid_cache_path;
