use crate::armory::Site;
use crate::fetch::BackoffPolicy;
use crate::pool::PoolConfig;
use serde::Deserialize;
use std::time::Duration;

/// Main configuration structure for Armory-Spyder
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub crawler: CrawlerConfig,
    #[serde(default)]
    pub downloader: DownloaderConfig,
    #[serde(default)]
    pub armory: ArmoryConfig,
    #[serde(default, rename = "user-agent")]
    pub user_agent: UserAgentConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

/// Crawl scope configuration
#[derive(Debug, Clone, Deserialize)]
pub struct CrawlerConfig {
    /// Site to crawl ("us" or "eu"); omitted means pick at random
    #[serde(default)]
    pub site: Option<Site>,

    /// Re-crawl guilds that already carry a refresh stamp
    #[serde(default, rename = "refresh-all")]
    pub refresh_all: bool,

    /// Lock identity override; omitted means the machine hostname
    #[serde(default)]
    pub identity: Option<String>,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            site: None,
            refresh_all: false,
            identity: None,
        }
    }
}

/// Download pool and retry configuration
#[derive(Debug, Clone, Deserialize)]
pub struct DownloaderConfig {
    /// Number of concurrent download workers
    #[serde(default = "default_workers")]
    pub workers: u32,

    /// Base per-worker pause between jobs (seconds)
    #[serde(default = "default_sleep_secs", rename = "sleep-secs")]
    pub sleep_secs: u64,

    /// Retry budget for transient failures
    #[serde(default = "default_backoff_attempts", rename = "backoff-attempts")]
    pub backoff_attempts: u32,

    /// First retry delay (seconds)
    #[serde(default = "default_backoff_initial_secs", rename = "backoff-initial-secs")]
    pub backoff_initial_secs: u64,

    /// Base growth added to the delay after each retry (seconds)
    #[serde(
        default = "default_backoff_increment_secs",
        rename = "backoff-increment-secs"
    )]
    pub backoff_increment_secs: u64,

    /// Interval between full cache flushes (seconds)
    #[serde(default = "default_cache_flush_secs", rename = "cache-flush-secs")]
    pub cache_flush_secs: u64,
}

fn default_workers() -> u32 {
    20
}

fn default_sleep_secs() -> u64 {
    10
}

fn default_backoff_attempts() -> u32 {
    3
}

fn default_backoff_initial_secs() -> u64 {
    30
}

fn default_backoff_increment_secs() -> u64 {
    60
}

fn default_cache_flush_secs() -> u64 {
    300
}

impl Default for DownloaderConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            sleep_secs: default_sleep_secs(),
            backoff_attempts: default_backoff_attempts(),
            backoff_initial_secs: default_backoff_initial_secs(),
            backoff_increment_secs: default_backoff_increment_secs(),
            cache_flush_secs: default_cache_flush_secs(),
        }
    }
}

impl DownloaderConfig {
    pub fn pool_config(&self) -> PoolConfig {
        PoolConfig {
            workers: self.workers as usize,
            sleep_time: Duration::from_secs(self.sleep_secs),
            cache_flush_interval: Duration::from_secs(self.cache_flush_secs),
        }
    }

    pub fn backoff_policy(&self) -> BackoffPolicy {
        BackoffPolicy {
            attempts: self.backoff_attempts,
            initial: Duration::from_secs(self.backoff_initial_secs),
            increment: Duration::from_secs(self.backoff_increment_secs),
        }
    }
}

/// Armory endpoint configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ArmoryConfig {
    /// URL scheme for armory requests
    #[serde(default = "default_scheme")]
    pub scheme: String,

    /// Armory domain; the site picks the host prefix
    #[serde(default = "default_domain")]
    pub domain: String,
}

fn default_scheme() -> String {
    "http".to_string()
}

fn default_domain() -> String {
    "wowarmory.com".to_string()
}

impl Default for ArmoryConfig {
    fn default() -> Self {
        Self {
            scheme: default_scheme(),
            domain: default_domain(),
        }
    }
}

/// User agent identification configuration
#[derive(Debug, Clone, Deserialize)]
pub struct UserAgentConfig {
    /// Name of the crawler
    #[serde(default = "default_crawler_name", rename = "crawler-name")]
    pub crawler_name: String,

    /// Version of the crawler
    #[serde(default = "default_crawler_version", rename = "crawler-version")]
    pub crawler_version: String,

    /// Email address for crawler-related contact
    #[serde(default, rename = "contact-email")]
    pub contact_email: Option<String>,
}

fn default_crawler_name() -> String {
    "ArmorySpyder".to_string()
}

fn default_crawler_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

impl Default for UserAgentConfig {
    fn default() -> Self {
        Self {
            crawler_name: default_crawler_name(),
            crawler_version: default_crawler_version(),
            contact_email: None,
        }
    }
}

impl UserAgentConfig {
    /// Builds the User-Agent header value sent with every request.
    pub fn header_value(&self) -> String {
        match &self.contact_email {
            Some(email) => format!("{}/{} ({})", self.crawler_name, self.crawler_version, email),
            None => format!("{}/{}", self.crawler_name, self.crawler_version),
        }
    }
}

/// Storage configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Path to the SQLite database file
    #[serde(default = "default_database_path", rename = "database-path")]
    pub database_path: String,
}

fn default_database_path() -> String {
    "./spyder.db".to_string()
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
        }
    }
}
