//! Shape validation for relative cache paths.
//!
//! A cache path looks like
//! `cache/v1/{start}/{end}/{name}/{file}` where both timestamps are compact
//! UTC timestamps (`20241001T000000Z`), `name` is `[a-z0-9_]+` and `file` is
//! one of the fixed cache file names. Anything else is treated as if it did
//! not exist, which keeps manifest keys from escaping the data directory.

use regex::Regex;
use std::sync::LazyLock;

/// First path component of every cache file.
pub const CACHE_DIR: &str = "cache";

/// Cache layout version component.
pub const CACHE_VERSION: &str = "v1";

/// Query results.
pub const DATA_FILENAME: &str = "data.parquet";

/// Query metadata (bytes billed, duration, ...).
pub const STATS_FILENAME: &str = "stats.json";

/// Per-entry lock file. Deliberately not a valid cache file name.
pub const LOCK_FILENAME: &str = ".lock";

/// File names allowed as the last component.
pub const CACHE_FILENAMES: [&str; 2] = [DATA_FILENAME, STATS_FILENAME];

/// strftime format used for the timestamp directories.
pub const TIMESTAMP_DIR_FORMAT: &str = "%Y%m%dT000000Z";

const SEGMENT_COUNT: usize = 6;

static TIMESTAMP_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9]{8}T[0-9]{6}Z$").expect("valid timestamp regex"));

static NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z0-9_]+$").expect("valid name regex"));

/// Return whether `path` is a well-formed, forward-slash separated cache path.
pub fn is_valid_cache_path(path: &str) -> bool {
    let parts: Vec<&str> = path.split('/').collect();
    if parts.len() != SEGMENT_COUNT {
        return false;
    }
    if parts.iter().any(|p| p.is_empty() || *p == "..") {
        return false;
    }

    parts[0] == CACHE_DIR
        && parts[1] == CACHE_VERSION
        && is_valid_timestamp(parts[2])
        && is_valid_timestamp(parts[3])
        && is_valid_name(parts[4])
        && CACHE_FILENAMES.contains(&parts[5])
}

/// Compact UTC timestamp directory name, e.g. `20241001T000000Z`.
pub fn is_valid_timestamp(segment: &str) -> bool {
    TIMESTAMP_RE.is_match(segment)
}

/// Dataset name: lowercase ASCII letters, digits and underscores.
pub fn is_valid_name(segment: &str) -> bool {
    NAME_RE.is_match(segment)
}
