//! HTTP fetching with session cookies, caching and retry
//!
//! A fetcher performs one blocking (from the caller's point of view) fetch
//! of an Armory page: it consults the shared response cache, establishes
//! and reuses a per-fetcher session cookie, requests gzip on the wire, and
//! applies the randomized linear backoff policy on transient failures.

mod backoff;
mod fetcher;

pub use backoff::{BackoffPolicy, BackoffSchedule};
pub use fetcher::{build_http_client, decompress_payload, ArmoryFetcher};

use async_trait::async_trait;
use thiserror::Error;

/// Errors surfaced by a fetch, in the order the caller should care:
/// `NotFound` is permanent, everything else is some flavor of "try again
/// later or give up".
#[derive(Debug, Error)]
pub enum FetchError {
    /// Upstream returned 404; the resource is permanently absent.
    #[error("resource not found: {url}")]
    NotFound { url: String },

    /// Transient upstream failure that outlived the retry budget.
    #[error("upstream unavailable after {attempts} attempts: {url}")]
    Unavailable { url: String, attempts: u32 },

    /// A worker crashed while handling the request. The pool replaces the
    /// worker; the caller may resubmit.
    #[error("download worker crashed while fetching")]
    WorkerFaulted,

    /// The download pool has been shut down.
    #[error("download pool is closed")]
    PoolClosed,

    /// The response body could not be decoded (corrupt gzip stream).
    #[error("invalid payload from {url}: {message}")]
    Payload { url: String, message: String },
}

impl FetchError {
    /// Whether retrying the same request could ever succeed.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, FetchError::NotFound { .. } | FetchError::Payload { .. })
    }
}

/// Object-safe fetch seam between the worker pool and the HTTP layer.
///
/// Production workers hold an [`ArmoryFetcher`]; tests substitute scripted
/// fetchers to exercise pool behavior without a network.
#[async_trait]
pub trait Fetch: Send {
    /// Fetches `url`, returning the decompressed payload bytes.
    async fn fetch(&mut self, url: &str) -> Result<Vec<u8>, FetchError>;
}
