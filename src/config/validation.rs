use crate::config::types::{Config, CrawlerConfig, PortalConfig, StorageConfig};
use crate::ConfigError;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_portal_config(&config.portal)?;
    validate_crawler_config(&config.crawler)?;
    validate_storage_config(&config.storage)?;
    Ok(())
}

/// Validates portal connection settings
fn validate_portal_config(config: &PortalConfig) -> Result<(), ConfigError> {
    validate_http_url("api-base", &config.api_base)?;
    validate_http_url("site-url", &config.site_url)?;

    if config.authorization.trim().is_empty() {
        return Err(ConfigError::Validation(
            "authorization cannot be empty".to_string(),
        ));
    }

    if config.timeout_secs < 1 || config.timeout_secs > 600 {
        return Err(ConfigError::Validation(format!(
            "timeout-secs must be between 1 and 600, got {}",
            config.timeout_secs
        )));
    }

    for path in &config.referer_paths {
        if !path.starts_with('/') {
            return Err(ConfigError::Validation(format!(
                "referer path '{}' must start with '/'",
                path
            )));
        }
    }

    Ok(())
}

/// Validates crawler pacing and pool sizes
fn validate_crawler_config(config: &CrawlerConfig) -> Result<(), ConfigError> {
    validate_range("listing-workers", config.listing_workers, 1, 512)?;
    validate_range("category-workers", config.category_workers, 1, 512)?;
    validate_range("product-workers", config.product_workers, 1, 64)?;
    validate_range("page-size", config.page_size as usize, 1, 100)?;

    if config.batch_size < 1 {
        return Err(ConfigError::Validation(format!(
            "batch-size must be >= 1, got {}",
            config.batch_size
        )));
    }

    if config.session_max_age_hours < 1 {
        return Err(ConfigError::Validation(
            "session-max-age-hours must be >= 1".to_string(),
        ));
    }

    if config.lock_ttl_secs < 1 {
        return Err(ConfigError::Validation(
            "lock-ttl-secs must be >= 1".to_string(),
        ));
    }

    Ok(())
}

fn validate_storage_config(config: &StorageConfig) -> Result<(), ConfigError> {
    if config.database_path.is_empty() {
        return Err(ConfigError::Validation(
            "database-path cannot be empty".to_string(),
        ));
    }
    Ok(())
}

fn validate_range(name: &str, value: usize, min: usize, max: usize) -> Result<(), ConfigError> {
    if value < min || value > max {
        return Err(ConfigError::Validation(format!(
            "{} must be between {} and {}, got {}",
            name, min, max, value
        )));
    }
    Ok(())
}

fn validate_http_url(name: &str, value: &str) -> Result<(), ConfigError> {
    let url = Url::parse(value)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid {} '{}': {}", name, value, e)))?;

    if url.scheme() != "https" && url.scheme() != "http" {
        return Err(ConfigError::Validation(format!(
            "{} must use http or https, got '{}'",
            name,
            url.scheme()
        )));
    }

    Ok(())
}
