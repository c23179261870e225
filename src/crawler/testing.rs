//! In-process portal used by the crawler tests

use crate::catalog::{CategoryNode, ListingItem, ListingPage, ProductDetail};
use crate::config::CrawlerConfig;
use crate::portal::Upstream;
use crate::storage::Database;
use crate::{HarvestError, Result};
use serde_json::json;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;

#[derive(Default)]
pub struct FakePortal {
    pub tree: Mutex<Vec<CategoryNode>>,
    pub fail_tree: bool,
    /// Listing pages per portal category id
    pub pages: HashMap<i64, Vec<Vec<ListingItem>>>,
    pub failing_categories: HashSet<i64>,
    /// Detail overrides; other products get `product(id, 1)`
    pub products: Mutex<HashMap<i64, ProductDetail>>,
    pub failing_products: HashSet<i64>,
    /// Time each product fetch takes
    pub product_latency: Duration,
    pub listing_calls: Mutex<Vec<(i64, u32)>>,
    pub product_calls: Mutex<Vec<i64>>,
}

impl FakePortal {
    pub fn listing_calls_for(&self, portal_category_id: i64) -> Vec<u32> {
        self.listing_calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(id, _)| *id == portal_category_id)
            .map(|(_, page)| *page)
            .collect()
    }
}

impl Upstream for FakePortal {
    fn category_tree(&self) -> Result<Vec<CategoryNode>> {
        if self.fail_tree {
            return Err(HarvestError::Upstream {
                context: "category tree".to_string(),
                message: "blocked".to_string(),
            });
        }
        Ok(self.tree.lock().unwrap().clone())
    }

    fn listing_page(&self, portal_category_id: i64, page: u32, _page_size: u32) -> Result<ListingPage> {
        self.listing_calls
            .lock()
            .unwrap()
            .push((portal_category_id, page));

        if self.failing_categories.contains(&portal_category_id) {
            return Err(HarvestError::Upstream {
                context: format!("listing of category {}", portal_category_id),
                message: "Too many requests".to_string(),
            });
        }

        let products = self
            .pages
            .get(&portal_category_id)
            .and_then(|pages| pages.get(page as usize))
            .cloned()
            .unwrap_or_default();

        Ok(ListingPage {
            total_products: products.len() as i64,
            products,
            adult_content: false,
        })
    }

    fn product(&self, portal_id: i64) -> Result<ProductDetail> {
        self.product_calls.lock().unwrap().push(portal_id);
        std::thread::sleep(self.product_latency);

        if self.failing_products.contains(&portal_id) {
            return Err(HarvestError::Upstream {
                context: format!("product {}", portal_id),
                message: "not found".to_string(),
            });
        }

        Ok(self
            .products
            .lock()
            .unwrap()
            .get(&portal_id)
            .cloned()
            .unwrap_or_else(|| product(portal_id, 1)))
    }
}

pub fn node(portal_id: i64, amount: i64, children: Vec<CategoryNode>) -> CategoryNode {
    CategoryNode {
        portal_id,
        title: format!("Category {}", portal_id),
        product_amount: amount,
        children,
    }
}

pub fn item(portal_id: i64) -> ListingItem {
    ListingItem {
        portal_id,
        title: format!("Product {}", portal_id),
        portal_category_id: None,
        rating: 4.0,
    }
}

/// A page of `count` items with consecutive portal ids from `first`
pub fn page(first: i64, count: i64) -> Vec<ListingItem> {
    (first..first + count).map(item).collect()
}

pub fn product(portal_id: i64, available: i64) -> ProductDetail {
    serde_json::from_value(json!({
        "id": portal_id,
        "title": format!("Product {}", portal_id),
        "description": "Plain",
        "category": {"id": 77, "title": "Leaf"},
        "seller": {"id": 5, "title": "Acme"},
        "ordersAmount": 3,
        "totalAvailableAmount": available,
        "rating": 4.5,
        "characteristics": [
            {"title": "Color", "values": [{"title": "Red", "value": "#f00"}]}
        ],
        "skuList": [
            {"availableAmount": available, "fullPrice": 10.0, "purchasePrice": 9.0,
             "characteristics": [{"charIndex": 0, "valueIndex": 0}]}
        ]
    }))
    .unwrap()
}

/// Crawler settings with no delays and small pools
pub fn test_config() -> CrawlerConfig {
    CrawlerConfig {
        listing_workers: 4,
        category_workers: 4,
        product_workers: 2,
        batch_size: 100,
        page_size: 24,
        max_page_delay_ms: 0,
        max_product_delay_ms: 0,
        session_max_age_hours: 24,
        lock_ttl_secs: 600,
    }
}

pub fn temp_database() -> (tempfile::TempDir, Database) {
    let dir = tempfile::tempdir().unwrap();
    let database = Database::open(dir.path().join("catalog.db")).unwrap();
    (dir, database)
}
