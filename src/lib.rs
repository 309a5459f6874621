//! Armory-Spyder: a polite Armory crawler
//!
//! This crate crawls a regional game-data service (an "Armory") for realms,
//! guilds, teams and characters, persisting normalized records to SQLite.
//! Multiple crawler processes can run concurrently: a locking work queue
//! hands out one realm at a time per host, and a pool of download workers
//! with per-worker sessions throttles and retries the actual HTTP traffic.

pub mod armory;
pub mod cache;
pub mod config;
pub mod crawler;
pub mod fetch;
pub mod pool;
pub mod queue;
pub mod storage;

use thiserror::Error;

/// Main error type for Armory-Spyder operations
#[derive(Debug, Error)]
pub enum SpyderError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Fetch error: {0}")]
    Fetch(#[from] fetch::FetchError),

    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("Unknown site code: {0}")]
    UnknownSite(String),

    #[error("Seed file error: {0}")]
    Seed(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),
}

/// Result type alias for Armory-Spyder operations
pub type Result<T> = std::result::Result<T, SpyderError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

// Re-export commonly used types
pub use armory::{ArmoryUrls, Site};
pub use cache::CacheStore;
pub use config::Config;
pub use crawler::Crawler;
pub use fetch::{ArmoryFetcher, BackoffPolicy, Fetch, FetchError};
pub use pool::{DownloadPool, Downloader, PoolConfig};
pub use queue::{CallerIdentity, QueueManager};
pub use storage::SqliteStorage;
