use serde::Deserialize;
use std::time::Duration;

/// Main configuration structure for Catalog-Harvest
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub portal: PortalConfig,
    #[serde(default)]
    pub crawler: CrawlerConfig,
    pub storage: StorageConfig,
}

/// Remote portal connection settings
#[derive(Debug, Clone, Deserialize)]
pub struct PortalConfig {
    /// Base URL of the portal API (e.g. "https://api.example.test/api/v2")
    #[serde(rename = "api-base")]
    pub api_base: String,

    /// Public site URL used as Referer and Origin
    #[serde(rename = "site-url")]
    pub site_url: String,

    /// Fixed Authorization header value
    pub authorization: String,

    /// Portal id of the category whose children form the tree roots
    #[serde(rename = "root-category-id", default = "default_root_category_id")]
    pub root_category_id: i64,

    /// Request timeout in seconds
    #[serde(rename = "timeout-secs", default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Referer paths rotated per request; empty means the bare site URL
    #[serde(rename = "referer-paths", default)]
    pub referer_paths: Vec<String>,
}

/// Crawl pacing and concurrency
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct CrawlerConfig {
    /// Concurrent category listing crawls
    #[serde(default = "default_listing_workers")]
    pub listing_workers: usize,

    /// Concurrent categories during product crawls
    #[serde(default = "default_category_workers")]
    pub category_workers: usize,

    /// Product detail fetchers per category
    #[serde(default = "default_product_workers")]
    pub product_workers: usize,

    /// Width of the id window scanned per batch
    #[serde(default = "default_batch_size")]
    pub batch_size: i64,

    /// Listing items requested per page
    #[serde(default = "default_page_size")]
    pub page_size: u32,

    /// Upper bound of the random pause after a listing page (milliseconds)
    #[serde(default = "default_max_page_delay_ms")]
    pub max_page_delay_ms: u64,

    /// Upper bound of the random pause after a product fetch (milliseconds)
    #[serde(default = "default_max_product_delay_ms")]
    pub max_product_delay_ms: u64,

    /// Stubs from older listing sessions are not enriched
    #[serde(default = "default_session_max_age_hours")]
    pub session_max_age_hours: u64,

    /// Product locks older than this are treated as abandoned
    #[serde(default = "default_lock_ttl_secs")]
    pub lock_ttl_secs: u64,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            listing_workers: default_listing_workers(),
            category_workers: default_category_workers(),
            product_workers: default_product_workers(),
            batch_size: default_batch_size(),
            page_size: default_page_size(),
            max_page_delay_ms: default_max_page_delay_ms(),
            max_product_delay_ms: default_max_product_delay_ms(),
            session_max_age_hours: default_session_max_age_hours(),
            lock_ttl_secs: default_lock_ttl_secs(),
        }
    }
}

impl CrawlerConfig {
    /// Upper bound of the pause after each listing page
    pub fn page_delay(&self) -> Duration {
        Duration::from_millis(self.max_page_delay_ms)
    }

    /// Upper bound of the pause after each product fetch
    pub fn product_delay(&self) -> Duration {
        Duration::from_millis(self.max_product_delay_ms)
    }

    pub fn session_max_age(&self) -> Duration {
        Duration::from_secs(self.session_max_age_hours * 3600)
    }

    pub fn lock_ttl(&self) -> Duration {
        Duration::from_secs(self.lock_ttl_secs)
    }
}

/// Storage configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Path to the SQLite database file
    #[serde(rename = "database-path")]
    pub database_path: String,
}

fn default_root_category_id() -> i64 {
    1
}

fn default_timeout_secs() -> u64 {
    120
}

fn default_listing_workers() -> usize {
    100
}

fn default_category_workers() -> usize {
    100
}

fn default_product_workers() -> usize {
    2
}

fn default_batch_size() -> i64 {
    100
}

fn default_page_size() -> u32 {
    24
}

fn default_max_page_delay_ms() -> u64 {
    6000
}

fn default_max_product_delay_ms() -> u64 {
    2000
}

fn default_session_max_age_hours() -> u64 {
    24
}

fn default_lock_ttl_secs() -> u64 {
    600
}
