//! Client-facing download gateway
//!
//! Entity parsers call [`Downloader::download`] synchronously per page;
//! all concurrency lives in the pool behind it.

use crate::fetch::FetchError;
use crate::pool::DownloadPool;
use std::sync::Arc;

/// Thin synchronous façade over the download pool.
#[derive(Clone)]
pub struct Downloader {
    pool: Arc<DownloadPool>,
}

impl Downloader {
    pub fn new(pool: Arc<DownloadPool>) -> Self {
        Self { pool }
    }

    /// Fetches a page and returns its decoded text, blocking the caller
    /// until a worker finishes. Errors deposited by the worker are raised
    /// here instead of being returned as values.
    pub async fn download(&self, url: &str) -> Result<String, FetchError> {
        let payload = self.pool.submit(url).await?;
        // Armory pages declare UTF-8; anything that is not gets replaced
        // rather than failing the whole page.
        Ok(String::from_utf8_lossy(&payload).into_owned())
    }

    /// Access to the pool for lifecycle calls (shutdown).
    pub fn pool(&self) -> &DownloadPool {
        &self.pool
    }
}
