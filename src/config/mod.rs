//! Configuration module for Armory-Spyder
//!
//! This module handles loading, parsing, and validating TOML configuration
//! files. Every key has a default, so a missing section (or a missing file
//! handled by the caller) still yields a working configuration.

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{
    ArmoryConfig, Config, CrawlerConfig, DownloaderConfig, StorageConfig, UserAgentConfig,
};

// Re-export parser functions
pub use parser::{default_config, load_config};
