//! Blocking HTTP client for the portal API
//!
//! Handles all remote calls for the crawlers:
//! - building the shared HTTP client
//! - endpoint URL construction
//! - envelope decoding and error classification
//!
//! There is no retry here. Every failure surfaces to the caller, which
//! abandons the unit of work it belongs to.

use crate::catalog::{CategoryNode, ListingPage, ProductDetail};
use crate::config::PortalConfig;
use crate::portal::request::RequestBuilder;
use crate::portal::types::{CategoryTreePayload, Envelope, ProductPayload};
use crate::portal::Upstream;
use crate::{HarvestError, Result};
use reqwest::blocking::Client;
use serde::de::DeserializeOwned;
use std::time::Duration;
use url::Url;

/// Portal API client
pub struct PortalClient {
    client: Client,
    requests: RequestBuilder,
    api_base: String,
    root_category_id: i64,
}

impl PortalClient {
    /// Creates a client from the portal configuration
    pub fn new(config: &PortalConfig) -> Result<Self> {
        let client = build_http_client(config.timeout_secs)?;
        Ok(Self {
            client,
            requests: RequestBuilder::new(config),
            api_base: config.api_base.trim_end_matches('/').to_string(),
            root_category_id: config.root_category_id,
        })
    }

    /// URL of the category tree below the configured root
    pub fn category_tree_url(&self) -> Result<Url> {
        let mut url = Url::parse(&format!("{}/main/search/category", self.api_base))?;
        url.query_pairs_mut()
            .append_pair("categoryId", &self.root_category_id.to_string());
        Ok(url)
    }

    /// URL of one listing page, most ordered products first
    pub fn listing_url(&self, portal_category_id: i64, page: u32, page_size: u32) -> Result<Url> {
        let mut url = Url::parse(&format!("{}/main/search/product", self.api_base))?;
        url.query_pairs_mut()
            .append_pair("size", &page_size.to_string())
            .append_pair("page", &page.to_string())
            .append_pair("categoryId", &portal_category_id.to_string())
            .append_pair("sortBy", "orders")
            .append_pair("order", "descending");
        Ok(url)
    }

    /// URL of a product detail
    pub fn product_url(&self, portal_id: i64) -> Result<Url> {
        Ok(Url::parse(&format!("{}/product/{}", self.api_base, portal_id))?)
    }

    /// Fetches `url` and unwraps its envelope
    ///
    /// The body is decoded whatever the status code, since the portal reports
    /// throttling through the envelope's error field. A body that does not
    /// decode is a status error on non-2xx responses and a decode error
    /// otherwise.
    fn fetch<T: DeserializeOwned>(&self, url: &Url, context: &str) -> Result<T> {
        tracing::debug!("GET {}", url);

        let response = self
            .requests
            .build(&self.client, url.as_str())
            .send()
            .map_err(|source| HarvestError::Transport {
                url: url.to_string(),
                source,
            })?;

        let status = response.status();
        let body = response.text().map_err(|source| HarvestError::Transport {
            url: url.to_string(),
            source,
        })?;

        let envelope: Envelope<T> = match serde_json::from_str(&body) {
            Ok(envelope) => envelope,
            Err(_) if !status.is_success() => {
                return Err(HarvestError::Status {
                    url: url.to_string(),
                    status: status.as_u16(),
                });
            }
            Err(source) => {
                return Err(HarvestError::Decode {
                    url: url.to_string(),
                    source,
                });
            }
        };

        if let Some(message) = envelope.error_message() {
            return Err(HarvestError::Upstream {
                context: context.to_string(),
                message: message.to_string(),
            });
        }

        envelope.payload.ok_or_else(|| HarvestError::MissingPayload {
            url: url.to_string(),
        })
    }
}

impl Upstream for PortalClient {
    fn category_tree(&self) -> Result<Vec<CategoryNode>> {
        let url = self.category_tree_url()?;
        let payload: CategoryTreePayload = self.fetch(&url, "category tree")?;
        let children = payload.into_children();
        tracing::info!("Category tree loaded: {} top-level categories", children.len());
        Ok(children)
    }

    fn listing_page(&self, portal_category_id: i64, page: u32, page_size: u32) -> Result<ListingPage> {
        let url = self.listing_url(portal_category_id, page, page_size)?;
        let context = format!("listing of category {} page {}", portal_category_id, page);
        self.fetch(&url, &context)
    }

    fn product(&self, portal_id: i64) -> Result<ProductDetail> {
        let url = self.product_url(portal_id)?;
        let payload: ProductPayload = self.fetch(&url, &format!("product {}", portal_id))?;
        Ok(payload.data)
    }
}

/// Builds the blocking HTTP client shared by all workers
pub fn build_http_client(timeout_secs: u64) -> std::result::Result<Client, reqwest::Error> {
    Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .connect_timeout(Duration::from_secs(10))
        .gzip(true)
        .brotli(true)
        .build()
}
