use crate::config::types::Config;
use crate::ConfigError;

/// Validates a parsed configuration.
///
/// Every numeric knob the pool and backoff consume must be usable as-is;
/// catching zeros here keeps the runtime code free of re-checks.
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    if config.downloader.workers == 0 {
        return Err(ConfigError::Validation(
            "downloader.workers must be greater than 0".to_string(),
        ));
    }

    if config.downloader.backoff_attempts == 0 {
        return Err(ConfigError::Validation(
            "downloader.backoff-attempts must be greater than 0".to_string(),
        ));
    }

    if config.downloader.cache_flush_secs == 0 {
        return Err(ConfigError::Validation(
            "downloader.cache-flush-secs must be greater than 0".to_string(),
        ));
    }

    match config.armory.scheme.as_str() {
        "http" | "https" => {}
        other => {
            return Err(ConfigError::Validation(format!(
                "armory.scheme must be http or https, got {:?}",
                other
            )));
        }
    }

    if config.armory.domain.is_empty() {
        return Err(ConfigError::Validation(
            "armory.domain must not be empty".to_string(),
        ));
    }

    if config.storage.database_path.is_empty() {
        return Err(ConfigError::Validation(
            "storage.database-path must not be empty".to_string(),
        ));
    }

    if let Some(identity) = &config.crawler.identity {
        if identity.trim().is_empty() {
            return Err(ConfigError::Validation(
                "crawler.identity must not be blank".to_string(),
            ));
        }
    }

    Ok(())
}
