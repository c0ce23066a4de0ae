//! Object store transfers: pull (download) and push (upload).

pub mod fetch;
pub mod progress;
pub mod progress_stream;
pub mod push;
pub mod report;

use crate::config::TransferConfig;
use crate::utils::errors::Result;

pub use fetch::{select_pull_targets, Fetcher};
pub use push::{select_push_targets, Pusher};
pub use report::{TransferFailure, TransferKind, TransferReport};

/// HTTP client shared by all workers of a fetcher or pusher.
pub(crate) fn build_client(config: &TransferConfig) -> Result<reqwest::Client> {
    let client = reqwest::Client::builder()
        .user_agent(concat!("cache-sync/", env!("CARGO_PKG_VERSION")))
        .connect_timeout(config.connect_timeout())
        .timeout(config.request_timeout())
        .build()?;
    Ok(client)
}
