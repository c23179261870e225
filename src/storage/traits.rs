//! Storage traits and error types
//!
//! This module defines the trait interface for storage backends and
//! associated error types.

use crate::catalog::{CategoryNode, ProductDetail};
use crate::storage::{
    CategoryRecord, NewStub, PersistOutcome, ProductRecord, SessionKind, SessionRecord,
    SessionStatus, SkuRecord, StubRecord, UpsertOutcome,
};
use std::ops::Range;
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Record not found: {0}")]
    NotFound(String),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Trait for storage backend implementations
///
/// One value of an implementation is one connection; it is used from a single
/// worker thread at a time.
pub trait Storage {
    // ===== Session Management =====

    /// Records the start of a crawl session under the given id
    fn begin_session(
        &mut self,
        session_id: i64,
        kind: SessionKind,
        root_category_id: i64,
    ) -> StorageResult<()>;

    /// Marks a session finished with its final status and item count
    fn finish_session(
        &mut self,
        session_id: i64,
        status: SessionStatus,
        items: u64,
    ) -> StorageResult<()>;

    /// Gets the most recently started session
    fn get_latest_session(&self) -> StorageResult<Option<SessionRecord>>;

    // ===== Categories =====

    /// Inserts a category or refreshes its product count
    ///
    /// On a portal id conflict the row is only touched when the product count
    /// changed; the change is appended to the category history.
    fn upsert_category(
        &mut self,
        node: &CategoryNode,
        parent_id: Option<i64>,
    ) -> StorageResult<UpsertOutcome>;

    fn get_category(&self, category_id: i64) -> StorageResult<Option<CategoryRecord>>;

    fn get_category_by_portal_id(&self, portal_id: i64) -> StorageResult<Option<CategoryRecord>>;

    /// Gets the categories without a parent
    fn root_categories(&self) -> StorageResult<Vec<CategoryRecord>>;

    /// Gets the childless descendants of a category, smallest first
    ///
    /// A category without children is its own only leaf.
    fn category_leaves(&self, root_id: i64) -> StorageResult<Vec<CategoryRecord>>;

    fn count_categories(&self) -> StorageResult<u64>;

    // ===== Product Stubs =====

    /// Inserts listing stubs in one transaction
    ///
    /// Stubs already recorded for the same session are skipped. Returns the
    /// number of rows inserted.
    fn insert_stubs(&mut self, stubs: &[NewStub]) -> StorageResult<usize>;

    /// Gets the lowest and highest id of eligible unparsed stubs in a category
    ///
    /// Eligible stubs belong to a session id of at least `min_session_id`.
    fn unparsed_id_range(
        &self,
        category_id: i64,
        min_session_id: i64,
    ) -> StorageResult<Option<(i64, i64)>>;

    /// Gets eligible unparsed stubs of a category with ids in `window`
    fn unparsed_stubs_in_window(
        &self,
        category_id: i64,
        window: Range<i64>,
        min_session_id: i64,
    ) -> StorageResult<Vec<StubRecord>>;

    /// Returns true if the product row exists and has not been parsed
    fn is_unparsed(&self, product_id: i64) -> StorageResult<bool>;

    // ===== Products =====

    /// Returns true if a product other than `exclude_id` has this fingerprint
    fn fingerprint_exists(&self, fingerprint: &str, exclude_id: i64) -> StorageResult<bool>;

    fn delete_product(&mut self, product_id: i64) -> StorageResult<()>;

    /// Tries to take the exclusive write claim on a product without waiting
    ///
    /// Returns false if another writer holds a claim that has not expired.
    fn try_lock_product(&mut self, product_id: i64) -> StorageResult<bool>;

    /// Releases a claim held by this connection
    fn release_product_lock(&mut self, product_id: i64) -> StorageResult<()>;

    /// Writes the full product graph and marks the product parsed
    ///
    /// All-or-nothing. Returns `PersistOutcome::Claimed` when another writer
    /// holds the product or has already parsed it, and `PersistOutcome::Duplicate`
    /// (after deleting the row) when another product already carries `fingerprint`.
    fn persist_product(
        &mut self,
        product_id: i64,
        detail: &ProductDetail,
        fingerprint: &str,
    ) -> StorageResult<PersistOutcome>;

    fn get_product(&self, product_id: i64) -> StorageResult<Option<ProductRecord>>;

    /// Gets the SKUs of a product with their linked char value ids
    fn get_skus(&self, product_id: i64) -> StorageResult<Vec<SkuRecord>>;

    // ===== Statistics =====

    fn count_products(&self) -> StorageResult<u64>;

    fn count_parsed_products(&self) -> StorageResult<u64>;

    fn count_characteristics(&self) -> StorageResult<u64>;

    fn count_char_values(&self) -> StorageResult<u64>;

    fn count_skus(&self) -> StorageResult<u64>;
}
