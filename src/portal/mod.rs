//! Remote portal access
//!
//! This module contains everything that talks to the remote catalog:
//! - `RequestBuilder`: identity-rotating request construction
//! - response envelopes and payload shapes
//! - `PortalClient`: the blocking HTTP implementation of `Upstream`

mod client;
mod request;
mod types;

pub use client::{build_http_client, PortalClient};
pub use request::{RequestBuilder, RequestIdentity, USER_AGENTS};
pub use types::{CategoryTreePayload, Envelope, ProductPayload};

use crate::catalog::{CategoryNode, ListingPage, ProductDetail};
use crate::Result;

/// Source of remote catalog data
///
/// Implementations are shared by every worker thread of a crawl, so calls
/// take `&self` and must be safe to issue concurrently.
pub trait Upstream: Sync {
    /// Fetches the children of the remote root category, with their subtrees
    fn category_tree(&self) -> Result<Vec<CategoryNode>>;

    /// Fetches one page (zero-based) of a category listing
    fn listing_page(&self, portal_category_id: i64, page: u32, page_size: u32) -> Result<ListingPage>;

    /// Fetches the full detail of a product
    fn product(&self, portal_id: i64) -> Result<ProductDetail>;
}

impl<U: Upstream + ?Sized> Upstream for &U {
    fn category_tree(&self) -> Result<Vec<CategoryNode>> {
        (**self).category_tree()
    }

    fn listing_page(&self, portal_category_id: i64, page: u32, page_size: u32) -> Result<ListingPage> {
        (**self).listing_page(portal_category_id, page, page_size)
    }

    fn product(&self, portal_id: i64) -> Result<ProductDetail> {
        (**self).product(portal_id)
    }
}
