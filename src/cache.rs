//! Process-wide response cache
//!
//! The cache maps a request URL to the last successful raw (still
//! gzip-compressed) response payload. It is shared by every fetcher in the
//! download pool and has no per-entry expiry: the pool's flush timer clears
//! the whole store on a fixed interval, which bounds memory growth without
//! any bookkeeping per entry. Readers that observe a cleared cache simply
//! go back to the network.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Shared handle to the in-memory response cache.
///
/// Cloning a `CacheStore` produces another handle to the same underlying
/// map, so one store can be handed to every worker's fetcher and to the
/// pool's flush timer.
#[derive(Debug, Clone, Default)]
pub struct CacheStore {
    entries: Arc<Mutex<HashMap<String, Vec<u8>>>>,
}

impl CacheStore {
    /// Creates an empty cache store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cached raw payload for `url`, if present.
    pub fn get(&self, url: &str) -> Option<Vec<u8>> {
        self.entries.lock().unwrap().get(url).cloned()
    }

    /// Stores the raw payload of a successful fetch.
    ///
    /// Overlapping puts for the same URL are benign: payloads for a given
    /// URL are idempotent, so last-writer-wins is acceptable.
    pub fn put(&self, url: &str, payload: Vec<u8>) {
        self.entries.lock().unwrap().insert(url.to_string(), payload);
    }

    /// Drops every cached entry, returning how many were evicted.
    ///
    /// Safe to call concurrently with `get`/`put` from any worker.
    pub fn clear(&self) -> usize {
        let mut entries = self.entries.lock().unwrap();
        let evicted = entries.len();
        entries.clear();
        evicted
    }

    /// Returns the number of cached entries.
    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    /// Returns whether the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
