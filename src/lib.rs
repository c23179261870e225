//! Catalog-Harvest: incremental ingestion of a remote e-commerce catalog
//!
//! This crate mirrors a remote marketplace catalog into SQLite. It keeps the
//! category tree in sync, pages through category listings to collect product
//! stubs, and enriches those stubs with full product detail while discarding
//! crawls whose content has not changed.

pub mod catalog;
pub mod config;
pub mod crawler;
pub mod output;
pub mod portal;
pub mod storage;

use thiserror::Error;

/// Main error type for Catalog-Harvest operations
#[derive(Debug, Error)]
pub enum HarvestError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Upstream reported an error for {context}: {message}")]
    Upstream { context: String, message: String },

    #[error("HTTP error for {url}: {source}")]
    Transport { url: String, source: reqwest::Error },

    #[error("Unexpected HTTP status {status} from {url}")]
    Status { url: String, status: u16 },

    #[error("Malformed response from {url}: {source}")]
    Decode {
        url: String,
        source: serde_json::Error,
    },

    #[error("Response from {url} carried no payload")]
    MissingPayload { url: String },

    #[error("Category not found: {0}")]
    CategoryNotFound(i64),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("Worker pool error: {0}")]
    Pool(#[from] crawler::QueueClosed),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] ::url::ParseError),

    #[error("HTTP client error: {0}")]
    Client(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl HarvestError {
    /// Returns true for failures of a single remote unit of work
    ///
    /// These abort the page, product or category they occurred in and are
    /// never retried; sibling work keeps running.
    pub fn is_upstream_failure(&self) -> bool {
        matches!(
            self,
            Self::Upstream { .. }
                | Self::Transport { .. }
                | Self::Status { .. }
                | Self::Decode { .. }
                | Self::MissingPayload { .. }
        )
    }
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

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),
}

/// Result type alias for Catalog-Harvest operations
pub type Result<T> = std::result::Result<T, HarvestError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

// Re-export commonly used types
pub use catalog::{fingerprint, CategoryNode, ProductDetail};
pub use config::Config;
pub use crawler::{CategorySync, ListingCrawler, ProductCrawler, WorkerPool};
pub use portal::{PortalClient, Upstream};
pub use storage::{Database, SqliteStorage, Storage};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upstream_failures_are_classified() {
        let upstream = HarvestError::Upstream {
            context: "product 7".to_string(),
            message: "not found".to_string(),
        };
        assert!(upstream.is_upstream_failure());

        let missing = HarvestError::MissingPayload {
            url: "https://example.test/".to_string(),
        };
        assert!(missing.is_upstream_failure());

        let storage = HarvestError::CategoryNotFound(3);
        assert!(!storage.is_upstream_failure());
    }
}
