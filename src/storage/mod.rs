//! Storage module for persisting catalog data
//!
//! This module handles all database operations for the harvester, including:
//! - SQLite database initialization and schema management
//! - Category tree persistence with product count history
//! - Product stubs and their promotion to full products
//! - Characteristic, value and SKU graphs
//! - Crawl session tracking

mod schema;
mod sqlite;
mod traits;

pub use sqlite::{Database, SqliteStorage, DEFAULT_LOCK_TTL};
pub use traits::{Storage, StorageError, StorageResult};

use serde::{Deserialize, Serialize};

/// Represents a category in the database
#[derive(Debug, Clone, Serialize)]
pub struct CategoryRecord {
    pub id: i64,
    pub portal_id: i64,
    pub title: String,
    pub parent_id: Option<i64>,
    pub products_amount: i64,
    pub history: Vec<HistoryEntry>,
    pub created_at: String,
    pub updated_at: Option<String>,
}

/// One recorded change of a category's product count
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub at: String,
    pub old: i64,
    pub new: i64,
}

/// A listing item to be recorded as an unparsed product
#[derive(Debug, Clone)]
pub struct NewStub {
    pub portal_id: i64,
    pub title: String,
    pub portal_category_id: Option<i64>,
    pub category_id: i64,
    pub rating: f64,
    pub session_id: i64,
}

/// An unparsed product awaiting its detail fetch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StubRecord {
    pub id: i64,
    pub portal_id: i64,
}

/// Represents a product row, parsed or not
#[derive(Debug, Clone)]
pub struct ProductRecord {
    pub id: i64,
    pub portal_id: i64,
    pub title: String,
    pub category_id: i64,
    pub category_title: Option<String>,
    pub session_id: i64,
    pub rating: f64,
    pub description: Option<String>,
    pub seller_id: Option<i64>,
    pub seller_title: Option<String>,
    pub orders_amount: i64,
    pub reviews_amount: i64,
    pub total_available_amount: i64,
    pub fingerprint: Option<String>,
    pub parsed_at: Option<String>,
}

impl ProductRecord {
    pub fn is_parsed(&self) -> bool {
        self.parsed_at.is_some()
    }
}

/// Represents a stored SKU with its characteristic value links
#[derive(Debug, Clone)]
pub struct SkuRecord {
    pub id: i64,
    pub product_id: i64,
    pub char_value_id: Option<i64>,
    pub available_amount: i64,
    pub full_price: f64,
    pub purchase_price: f64,
    pub char_value_ids: Vec<i64>,
}

/// Result of an insert-or-find on a naturally keyed row
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    /// A new row was created
    Inserted(i64),
    /// An existing row was changed in place
    Updated(i64),
    /// The row already existed and was left alone
    Existing(i64),
}

impl UpsertOutcome {
    pub fn id(&self) -> i64 {
        match self {
            Self::Inserted(id) | Self::Updated(id) | Self::Existing(id) => *id,
        }
    }
}

/// Result of persisting a product graph
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PersistOutcome {
    /// The graph was written and the product marked parsed
    Committed,
    /// Another writer holds or has already finished the product
    Claimed,
    /// Another product committed the same fingerprint first; this row was deleted
    Duplicate,
}

/// What a crawl session processed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SessionKind {
    Listings,
    Products,
}

impl SessionKind {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Listings => "listings",
            Self::Products => "products",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "listings" => Some(Self::Listings),
            "products" => Some(Self::Products),
            _ => None,
        }
    }
}

/// Status of a crawl session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SessionStatus {
    Running,
    Completed,
    Failed,
}

impl SessionStatus {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "running" => Some(Self::Running),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

/// Represents a crawl session
#[derive(Debug, Clone, Serialize)]
pub struct SessionRecord {
    pub id: i64,
    pub kind: SessionKind,
    pub root_category_id: i64,
    pub started_at: String,
    pub finished_at: Option<String>,
    pub status: SessionStatus,
    pub items: u64,
}
