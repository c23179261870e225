//! SQLite storage implementation
//!
//! This module provides a SQLite-based implementation of the Storage trait.
//! Every worker thread owns its own connection; `Database` hands them out.

use crate::catalog::{CategoryNode, ProductDetail};
use crate::storage::schema::initialize_schema;
use crate::storage::traits::{Storage, StorageError, StorageResult};
use crate::storage::{
    CategoryRecord, HistoryEntry, NewStub, PersistOutcome, ProductRecord, SessionKind,
    SessionRecord, SessionStatus, SkuRecord, StubRecord, UpsertOutcome,
};
use chrono::Utc;
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Params, Row, TransactionBehavior};
use std::collections::HashMap;
use std::ops::Range;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// How long a product claim is honored before another writer may take it over
pub const DEFAULT_LOCK_TTL: Duration = Duration::from_secs(600);

const BUSY_TIMEOUT: Duration = Duration::from_millis(5000);

const CATEGORY_COLUMNS: &str =
    "id, portal_id, title, parent_id, products_amount, history, created_at, updated_at";

const PRODUCT_COLUMNS: &str = "id, portal_id, title, category_id, category_title, session_id, \
     rating, description, seller_id, seller_title, orders_amount, reviews_amount, \
     total_available_amount, fingerprint, parsed_at";

/// Handle to the database file shared by all workers of a crawl
///
/// Cloning is cheap; each worker calls `connect` for its own connection.
#[derive(Debug, Clone)]
pub struct Database {
    path: PathBuf,
    lock_ttl: Duration,
}

impl Database {
    /// Opens or creates the database file and makes sure the schema exists
    pub fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        let path = path.as_ref().to_path_buf();
        SqliteStorage::new(&path)?;
        Ok(Self {
            path,
            lock_ttl: DEFAULT_LOCK_TTL,
        })
    }

    /// Sets the product claim TTL used by connections made from this handle
    pub fn with_lock_ttl(mut self, lock_ttl: Duration) -> Self {
        self.lock_ttl = lock_ttl;
        self
    }

    /// Opens a new connection to the database
    pub fn connect(&self) -> StorageResult<SqliteStorage> {
        let conn = open_connection(&self.path)?;
        Ok(SqliteStorage::from_connection(conn, self.lock_ttl))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// SQLite storage backend
pub struct SqliteStorage {
    conn: Connection,
    /// Identifies this connection's product claims
    owner: String,
    lock_ttl: Duration,
}

impl SqliteStorage {
    /// Creates a new SqliteStorage instance
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file
    ///
    /// # Returns
    ///
    /// * `Ok(SqliteStorage)` - Successfully opened/created database
    /// * `Err(StorageError)` - Failed to open database
    pub fn new(path: &Path) -> StorageResult<Self> {
        let conn = open_connection(path)?;

        // WAL is persistent, so it only needs setting when the file is created
        conn.execute_batch("PRAGMA journal_mode = WAL;")?;
        initialize_schema(&conn)?;

        Ok(Self::from_connection(conn, DEFAULT_LOCK_TTL))
    }

    /// Creates an in-memory database (for testing)
    #[cfg(test)]
    pub fn new_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        initialize_schema(&conn)?;
        Ok(Self::from_connection(conn, DEFAULT_LOCK_TTL))
    }

    fn from_connection(conn: Connection, lock_ttl: Duration) -> Self {
        Self {
            conn,
            owner: format!("{}-{:016x}", std::process::id(), rand::random::<u64>()),
            lock_ttl,
        }
    }

    /// Token identifying the product claims taken through this connection
    pub fn owner(&self) -> &str {
        &self.owner
    }

    fn count(&self, sql: &str) -> StorageResult<u64> {
        let count: i64 = self.conn.query_row(sql, [], |row| row.get(0))?;
        Ok(count as u64)
    }

    /// Writes the product graph inside one IMMEDIATE transaction
    ///
    /// The caller must hold the product claim.
    fn write_product_graph(
        &mut self,
        product_id: i64,
        detail: &ProductDetail,
        fingerprint: &str,
    ) -> StorageResult<PersistOutcome> {
        let now = Utc::now().to_rfc3339();
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;

        let unparsed = tx
            .query_row(
                "SELECT 1 FROM products WHERE id = ?1 AND parsed_at IS NULL",
                params![product_id],
                |_| Ok(()),
            )
            .optional()?
            .is_some();
        if !unparsed {
            tx.execute(
                "DELETE FROM product_locks WHERE product_id = ?1 AND owner = ?2",
                params![product_id, self.owner],
            )?;
            tx.commit()?;
            return Ok(PersistOutcome::Claimed);
        }

        let duplicate: bool = tx.query_row(
            "SELECT EXISTS(SELECT 1 FROM products WHERE fingerprint = ?1 AND id != ?2)",
            params![fingerprint, product_id],
            |row| row.get(0),
        )?;
        if duplicate {
            tx.execute("DELETE FROM products WHERE id = ?1", params![product_id])?;
            tx.execute(
                "DELETE FROM product_locks WHERE product_id = ?1 AND owner = ?2",
                params![product_id, self.owner],
            )?;
            tx.commit()?;
            return Ok(PersistOutcome::Duplicate);
        }

        // (characteristic position, value position) -> char_values.id
        let mut value_ids: HashMap<(usize, usize), i64> = HashMap::new();
        for (char_index, characteristic) in detail.characteristics.iter().enumerate() {
            let char_id = upsert_returning_id(
                &tx,
                "INSERT INTO characteristics (title, created_at) VALUES (?1, ?2)
                 ON CONFLICT(title) DO NOTHING RETURNING id",
                params![characteristic.title, now],
                "SELECT id FROM characteristics WHERE title = ?1",
                params![characteristic.title],
            )?
            .id();

            for (value_index, value) in characteristic.values.iter().enumerate() {
                let value_id = upsert_returning_id(
                    &tx,
                    "INSERT INTO char_values (char_id, title, value, created_at)
                     VALUES (?1, ?2, ?3, ?4)
                     ON CONFLICT(char_id, title, value) DO NOTHING RETURNING id",
                    params![char_id, value.title, value.value, now],
                    "SELECT id FROM char_values WHERE char_id = ?1 AND title = ?2 AND value = ?3",
                    params![char_id, value.title, value.value],
                )?
                .id();
                value_ids.insert((char_index, value_index), value_id);
            }
        }

        let mut dropped = 0usize;
        for sku in &detail.sku_list {
            let linked: Vec<i64> = sku
                .characteristics
                .iter()
                .filter_map(|r| r.position().and_then(|pos| value_ids.get(&pos)).copied())
                .collect();
            dropped += sku.characteristics.len() - linked.len();

            let single_value = match linked.as_slice() {
                [only] => Some(*only),
                _ => None,
            };

            tx.execute(
                "INSERT INTO skus (product_id, char_value_id, available_amount, full_price,
                                   purchase_price, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    product_id,
                    single_value,
                    sku.available_amount,
                    sku.full_price,
                    sku.purchase_price,
                    now
                ],
            )?;
            let sku_id = tx.last_insert_rowid();

            for value_id in linked {
                tx.execute(
                    "INSERT OR IGNORE INTO sku_char_values (sku_id, char_value_id) VALUES (?1, ?2)",
                    params![sku_id, value_id],
                )?;
            }
        }

        if dropped > 0 {
            tracing::debug!(
                "Product {}: dropped {} unresolvable SKU characteristic references",
                product_id,
                dropped
            );
        }

        let (seller_id, seller_title) = match &detail.seller {
            Some(seller) => (Some(seller.portal_id), Some(seller.title.as_str())),
            None => (None, None),
        };
        let category_title = detail.category.as_ref().map(|c| c.title.as_str());

        tx.execute(
            "UPDATE products SET
                seller_id = ?1,
                seller_title = ?2,
                orders_amount = ?3,
                reviews_amount = ?4,
                total_available_amount = ?5,
                category_title = ?6,
                description = ?7,
                fingerprint = ?8,
                parsed_at = ?9
             WHERE id = ?10",
            params![
                seller_id,
                seller_title,
                detail.orders_amount,
                detail.reviews_amount,
                detail.total_available_amount,
                category_title,
                detail.description,
                fingerprint,
                now,
                product_id
            ],
        )?;

        tx.execute(
            "DELETE FROM product_locks WHERE product_id = ?1 AND owner = ?2",
            params![product_id, self.owner],
        )?;

        tx.commit()?;
        Ok(PersistOutcome::Committed)
    }
}

/// Opens a connection with the per-connection settings every worker needs
fn open_connection(path: &Path) -> StorageResult<Connection> {
    let conn = Connection::open(path)?;
    conn.busy_timeout(BUSY_TIMEOUT)?;
    conn.execute_batch(
        "
        PRAGMA synchronous = NORMAL;
        PRAGMA foreign_keys = ON;
        PRAGMA temp_store = MEMORY;
    ",
    )?;
    Ok(conn)
}

/// Inserts a naturally keyed row or finds the existing one
///
/// `insert` must be an `ON CONFLICT DO NOTHING ... RETURNING id` statement;
/// when it returns nothing the row is looked up with `select`.
fn upsert_returning_id<P: Params, Q: Params>(
    conn: &Connection,
    insert: &str,
    insert_params: P,
    select: &str,
    select_params: Q,
) -> rusqlite::Result<UpsertOutcome> {
    let inserted: Option<i64> = conn
        .query_row(insert, insert_params, |row| row.get(0))
        .optional()?;
    match inserted {
        Some(id) => Ok(UpsertOutcome::Inserted(id)),
        None => conn
            .query_row(select, select_params, |row| row.get(0))
            .map(UpsertOutcome::Existing),
    }
}

fn category_from_row(row: &Row) -> rusqlite::Result<CategoryRecord> {
    let history_json: String = row.get(5)?;
    let history: Vec<HistoryEntry> = serde_json::from_str(&history_json)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(5, Type::Text, Box::new(e)))?;

    Ok(CategoryRecord {
        id: row.get(0)?,
        portal_id: row.get(1)?,
        title: row.get(2)?,
        parent_id: row.get(3)?,
        products_amount: row.get(4)?,
        history,
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
    })
}

fn product_from_row(row: &Row) -> rusqlite::Result<ProductRecord> {
    Ok(ProductRecord {
        id: row.get(0)?,
        portal_id: row.get(1)?,
        title: row.get(2)?,
        category_id: row.get(3)?,
        category_title: row.get(4)?,
        session_id: row.get(5)?,
        rating: row.get(6)?,
        description: row.get(7)?,
        seller_id: row.get(8)?,
        seller_title: row.get(9)?,
        orders_amount: row.get(10)?,
        reviews_amount: row.get(11)?,
        total_available_amount: row.get(12)?,
        fingerprint: row.get(13)?,
        parsed_at: row.get(14)?,
    })
}

fn session_from_row(row: &Row) -> rusqlite::Result<SessionRecord> {
    Ok(SessionRecord {
        id: row.get(0)?,
        kind: SessionKind::from_db_string(&row.get::<_, String>(1)?)
            .unwrap_or(SessionKind::Listings),
        root_category_id: row.get(2)?,
        started_at: row.get(3)?,
        finished_at: row.get(4)?,
        status: SessionStatus::from_db_string(&row.get::<_, String>(5)?)
            .unwrap_or(SessionStatus::Running),
        items: row.get::<_, i64>(6)? as u64,
    })
}

impl Storage for SqliteStorage {
    // ===== Session Management =====

    fn begin_session(
        &mut self,
        session_id: i64,
        kind: SessionKind,
        root_category_id: i64,
    ) -> StorageResult<()> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO crawl_sessions (id, kind, root_category_id, started_at, status)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                session_id,
                kind.to_db_string(),
                root_category_id,
                now,
                SessionStatus::Running.to_db_string()
            ],
        )?;
        Ok(())
    }

    fn finish_session(
        &mut self,
        session_id: i64,
        status: SessionStatus,
        items: u64,
    ) -> StorageResult<()> {
        let now = Utc::now().to_rfc3339();
        let updated = self.conn.execute(
            "UPDATE crawl_sessions SET status = ?1, finished_at = ?2, items = ?3 WHERE id = ?4",
            params![status.to_db_string(), now, items as i64, session_id],
        )?;
        if updated == 0 {
            return Err(StorageError::NotFound(format!("session {}", session_id)));
        }
        Ok(())
    }

    fn get_latest_session(&self) -> StorageResult<Option<SessionRecord>> {
        let session = self
            .conn
            .query_row(
                "SELECT id, kind, root_category_id, started_at, finished_at, status, items
                 FROM crawl_sessions ORDER BY id DESC LIMIT 1",
                [],
                session_from_row,
            )
            .optional()?;
        Ok(session)
    }

    // ===== Categories =====

    fn upsert_category(
        &mut self,
        node: &CategoryNode,
        parent_id: Option<i64>,
    ) -> StorageResult<UpsertOutcome> {
        let now = Utc::now().to_rfc3339();

        // The conflict branch only fires when the count moved; `updated_at`
        // stays NULL until the first such change.
        let returned: Option<(i64, bool)> = self
            .conn
            .query_row(
                "INSERT INTO categories (portal_id, title, parent_id, products_amount, history, created_at)
                 VALUES (?1, ?2, ?3, ?4, '[]', ?5)
                 ON CONFLICT(portal_id) DO UPDATE SET
                    history = json_insert(categories.history, '$[#]',
                        json_object('at', excluded.created_at,
                                    'old', categories.products_amount,
                                    'new', excluded.products_amount)),
                    products_amount = excluded.products_amount,
                    updated_at = excluded.created_at
                 WHERE categories.products_amount != excluded.products_amount
                 RETURNING id, updated_at IS NULL",
                params![node.portal_id, node.title, parent_id, node.product_amount, now],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        let outcome = match returned {
            Some((id, true)) => UpsertOutcome::Inserted(id),
            Some((id, false)) => UpsertOutcome::Updated(id),
            None => {
                let id = self.conn.query_row(
                    "SELECT id FROM categories WHERE portal_id = ?1",
                    params![node.portal_id],
                    |row| row.get(0),
                )?;
                UpsertOutcome::Existing(id)
            }
        };

        Ok(outcome)
    }

    fn get_category(&self, category_id: i64) -> StorageResult<Option<CategoryRecord>> {
        let category = self
            .conn
            .query_row(
                &format!("SELECT {} FROM categories WHERE id = ?1", CATEGORY_COLUMNS),
                params![category_id],
                category_from_row,
            )
            .optional()?;
        Ok(category)
    }

    fn get_category_by_portal_id(&self, portal_id: i64) -> StorageResult<Option<CategoryRecord>> {
        let category = self
            .conn
            .query_row(
                &format!("SELECT {} FROM categories WHERE portal_id = ?1", CATEGORY_COLUMNS),
                params![portal_id],
                category_from_row,
            )
            .optional()?;
        Ok(category)
    }

    fn root_categories(&self) -> StorageResult<Vec<CategoryRecord>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM categories WHERE parent_id IS NULL ORDER BY id",
            CATEGORY_COLUMNS
        ))?;
        let roots = stmt
            .query_map([], category_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(roots)
    }

    fn category_leaves(&self, root_id: i64) -> StorageResult<Vec<CategoryRecord>> {
        let mut stmt = self.conn.prepare(&format!(
            "WITH RECURSIVE subtree(id) AS (
                SELECT id FROM categories WHERE id = ?1
                UNION ALL
                SELECT c.id FROM categories c JOIN subtree s ON c.parent_id = s.id
             )
             SELECT {} FROM categories
             WHERE id IN (SELECT id FROM subtree)
               AND NOT EXISTS (
                   SELECT 1 FROM categories child WHERE child.parent_id = categories.id
               )
             ORDER BY products_amount ASC, id ASC",
            CATEGORY_COLUMNS
        ))?;
        let leaves = stmt
            .query_map(params![root_id], category_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(leaves)
    }

    fn count_categories(&self) -> StorageResult<u64> {
        self.count("SELECT COUNT(*) FROM categories")
    }

    // ===== Product Stubs =====

    fn insert_stubs(&mut self, stubs: &[NewStub]) -> StorageResult<usize> {
        if stubs.is_empty() {
            return Ok(0);
        }

        let now = Utc::now().to_rfc3339();
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        let mut inserted = 0;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO products (portal_id, title, portal_category_id, category_id, rating,
                                       session_id, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                 ON CONFLICT(portal_id, session_id) DO NOTHING",
            )?;
            for stub in stubs {
                inserted += stmt.execute(params![
                    stub.portal_id,
                    stub.title,
                    stub.portal_category_id,
                    stub.category_id,
                    stub.rating,
                    stub.session_id,
                    now
                ])?;
            }
        }
        tx.commit()?;

        Ok(inserted)
    }

    fn unparsed_id_range(
        &self,
        category_id: i64,
        min_session_id: i64,
    ) -> StorageResult<Option<(i64, i64)>> {
        let (min, max): (Option<i64>, Option<i64>) = self.conn.query_row(
            "SELECT MIN(id), MAX(id) FROM products
             WHERE category_id = ?1 AND parsed_at IS NULL AND session_id >= ?2",
            params![category_id, min_session_id],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        Ok(min.zip(max))
    }

    fn unparsed_stubs_in_window(
        &self,
        category_id: i64,
        window: Range<i64>,
        min_session_id: i64,
    ) -> StorageResult<Vec<StubRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, portal_id FROM products
             WHERE category_id = ?1 AND parsed_at IS NULL AND session_id >= ?2
               AND id >= ?3 AND id < ?4
             ORDER BY id",
        )?;
        let stubs = stmt
            .query_map(
                params![category_id, min_session_id, window.start, window.end],
                |row| {
                    Ok(StubRecord {
                        id: row.get(0)?,
                        portal_id: row.get(1)?,
                    })
                },
            )?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(stubs)
    }

    fn is_unparsed(&self, product_id: i64) -> StorageResult<bool> {
        let unparsed = self
            .conn
            .query_row(
                "SELECT 1 FROM products WHERE id = ?1 AND parsed_at IS NULL",
                params![product_id],
                |_| Ok(()),
            )
            .optional()?
            .is_some();
        Ok(unparsed)
    }

    // ===== Products =====

    fn fingerprint_exists(&self, fingerprint: &str, exclude_id: i64) -> StorageResult<bool> {
        let exists: bool = self.conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM products WHERE fingerprint = ?1 AND id != ?2)",
            params![fingerprint, exclude_id],
            |row| row.get(0),
        )?;
        Ok(exists)
    }

    fn delete_product(&mut self, product_id: i64) -> StorageResult<()> {
        self.conn
            .execute("DELETE FROM products WHERE id = ?1", params![product_id])?;
        Ok(())
    }

    fn try_lock_product(&mut self, product_id: i64) -> StorageResult<bool> {
        let now = Utc::now().timestamp_millis();
        let ttl = i64::try_from(self.lock_ttl.as_millis()).unwrap_or(i64::MAX);
        let stale_before = now.saturating_sub(ttl);

        let changed = self.conn.execute(
            "INSERT INTO product_locks (product_id, owner, acquired_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(product_id) DO UPDATE SET
                owner = excluded.owner,
                acquired_at = excluded.acquired_at
             WHERE product_locks.acquired_at < ?4",
            params![product_id, self.owner, now, stale_before],
        )?;
        Ok(changed == 1)
    }

    fn release_product_lock(&mut self, product_id: i64) -> StorageResult<()> {
        self.conn.execute(
            "DELETE FROM product_locks WHERE product_id = ?1 AND owner = ?2",
            params![product_id, self.owner],
        )?;
        Ok(())
    }

    fn persist_product(
        &mut self,
        product_id: i64,
        detail: &ProductDetail,
        fingerprint: &str,
    ) -> StorageResult<PersistOutcome> {
        if !self.try_lock_product(product_id)? {
            tracing::debug!("Product {} is claimed by another writer", product_id);
            return Ok(PersistOutcome::Claimed);
        }

        match self.write_product_graph(product_id, detail, fingerprint) {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                // The transaction has rolled back; the claim lives outside it
                if let Err(release_err) = self.release_product_lock(product_id) {
                    tracing::warn!(
                        "Failed to release claim on product {}: {}",
                        product_id,
                        release_err
                    );
                }
                Err(e)
            }
        }
    }

    fn get_product(&self, product_id: i64) -> StorageResult<Option<ProductRecord>> {
        let product = self
            .conn
            .query_row(
                &format!("SELECT {} FROM products WHERE id = ?1", PRODUCT_COLUMNS),
                params![product_id],
                product_from_row,
            )
            .optional()?;
        Ok(product)
    }

    fn get_skus(&self, product_id: i64) -> StorageResult<Vec<SkuRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, product_id, char_value_id, available_amount, full_price, purchase_price
             FROM skus WHERE product_id = ?1 ORDER BY id",
        )?;
        let mut skus = stmt
            .query_map(params![product_id], |row| {
                Ok(SkuRecord {
                    id: row.get(0)?,
                    product_id: row.get(1)?,
                    char_value_id: row.get(2)?,
                    available_amount: row.get(3)?,
                    full_price: row.get(4)?,
                    purchase_price: row.get(5)?,
                    char_value_ids: Vec::new(),
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut links = self.conn.prepare(
            "SELECT char_value_id FROM sku_char_values WHERE sku_id = ?1 ORDER BY char_value_id",
        )?;
        for sku in &mut skus {
            sku.char_value_ids = links
                .query_map(params![sku.id], |row| row.get(0))?
                .collect::<Result<Vec<_>, _>>()?;
        }

        Ok(skus)
    }

    // ===== Statistics =====

    fn count_products(&self) -> StorageResult<u64> {
        self.count("SELECT COUNT(*) FROM products")
    }

    fn count_parsed_products(&self) -> StorageResult<u64> {
        self.count("SELECT COUNT(*) FROM products WHERE parsed_at IS NOT NULL")
    }

    fn count_characteristics(&self) -> StorageResult<u64> {
        self.count("SELECT COUNT(*) FROM characteristics")
    }

    fn count_char_values(&self) -> StorageResult<u64> {
        self.count("SELECT COUNT(*) FROM char_values")
    }

    fn count_skus(&self) -> StorageResult<u64> {
        self.count("SELECT COUNT(*) FROM skus")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn node(portal_id: i64, amount: i64) -> CategoryNode {
        CategoryNode {
            portal_id,
            title: format!("Category {}", portal_id),
            product_amount: amount,
            children: vec![],
        }
    }

    fn stub(portal_id: i64, category_id: i64, session_id: i64) -> NewStub {
        NewStub {
            portal_id,
            title: format!("Product {}", portal_id),
            portal_category_id: None,
            category_id,
            rating: 4.5,
            session_id,
        }
    }

    fn detail(value: serde_json::Value) -> ProductDetail {
        serde_json::from_value(value).unwrap()
    }

    fn shirt_detail() -> ProductDetail {
        detail(json!({
            "id": 101,
            "title": "Shirt",
            "description": "Cotton shirt",
            "category": {"id": 77, "title": "Shirts"},
            "seller": {"id": 5, "title": "Acme"},
            "ordersAmount": 12,
            "reviewsAmount": 3,
            "totalAvailableAmount": 9,
            "rating": 4.8,
            "characteristics": [
                {"title": "Color", "values": [
                    {"title": "Red", "value": "#f00"},
                    {"title": "Blue", "value": "#00f"}
                ]},
                {"title": "Size", "values": [{"title": "M", "value": "M"}]}
            ],
            "skuList": [
                {"availableAmount": 4, "fullPrice": 10.0, "purchasePrice": 8.0,
                 "characteristics": [{"charIndex": 0, "valueIndex": 1}]},
                {"availableAmount": 5, "fullPrice": 10.0, "purchasePrice": 9.0,
                 "characteristics": [{"charIndex": 0, "valueIndex": 0},
                                     {"charIndex": 1, "valueIndex": 0}]},
                {"availableAmount": 0, "fullPrice": 11.0, "purchasePrice": 11.0,
                 "characteristics": [{"charIndex": 0, "valueIndex": 0},
                                     {"charIndex": 3, "valueIndex": 0}]}
            ]
        }))
    }

    fn seeded() -> (SqliteStorage, i64, i64) {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        let category_id = storage.upsert_category(&node(10, 5), None).unwrap().id();
        storage.insert_stubs(&[stub(101, category_id, 1)]).unwrap();
        let product_id = storage
            .unparsed_stubs_in_window(category_id, 0..i64::MAX, 0)
            .unwrap()[0]
            .id;
        (storage, category_id, product_id)
    }

    #[test]
    fn test_create_in_memory() {
        let storage = SqliteStorage::new_in_memory();
        assert!(storage.is_ok());
    }

    #[test]
    fn test_session_lifecycle() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        storage.begin_session(42, SessionKind::Listings, 7).unwrap();

        let session = storage.get_latest_session().unwrap().unwrap();
        assert_eq!(session.id, 42);
        assert_eq!(session.status, SessionStatus::Running);

        storage
            .finish_session(42, SessionStatus::Completed, 96)
            .unwrap();
        let session = storage.get_latest_session().unwrap().unwrap();
        assert_eq!(session.status, SessionStatus::Completed);
        assert_eq!(session.items, 96);
        assert!(session.finished_at.is_some());

        assert!(storage
            .finish_session(43, SessionStatus::Failed, 0)
            .is_err());
    }

    #[test]
    fn test_upsert_category_is_idempotent() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();

        let first = storage.upsert_category(&node(10, 120), None).unwrap();
        assert!(matches!(first, UpsertOutcome::Inserted(_)));

        let second = storage.upsert_category(&node(10, 120), None).unwrap();
        assert_eq!(second, UpsertOutcome::Existing(first.id()));

        let record = storage.get_category(first.id()).unwrap().unwrap();
        assert!(record.history.is_empty());
        assert!(record.updated_at.is_none());
        assert_eq!(storage.count_categories().unwrap(), 1);
    }

    #[test]
    fn test_upsert_category_records_count_history() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        let id = storage.upsert_category(&node(10, 120), None).unwrap().id();

        let outcome = storage.upsert_category(&node(10, 95), None).unwrap();
        assert_eq!(outcome, UpsertOutcome::Updated(id));

        let record = storage.get_category(id).unwrap().unwrap();
        assert_eq!(record.products_amount, 95);
        assert_eq!(record.history.len(), 1);
        assert_eq!(record.history[0].old, 120);
        assert_eq!(record.history[0].new, 95);
        assert!(record.updated_at.is_some());

        storage.upsert_category(&node(10, 130), None).unwrap();
        let record = storage.get_category(id).unwrap().unwrap();
        assert_eq!(record.history.len(), 2);
        assert_eq!(record.history[1].old, 95);
    }

    #[test]
    fn test_category_leaves_order_and_root_leaf() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        let root = storage.upsert_category(&node(1, 0), None).unwrap().id();
        let a = storage.upsert_category(&node(2, 0), Some(root)).unwrap().id();
        let b = storage.upsert_category(&node(3, 40), Some(root)).unwrap().id();
        let c = storage.upsert_category(&node(4, 10), Some(a)).unwrap().id();
        let d = storage.upsert_category(&node(5, 10), Some(a)).unwrap().id();

        let leaves: Vec<i64> = storage
            .category_leaves(root)
            .unwrap()
            .iter()
            .map(|c| c.id)
            .collect();
        assert_eq!(leaves, vec![c, d, b]);

        let own: Vec<i64> = storage
            .category_leaves(b)
            .unwrap()
            .iter()
            .map(|c| c.id)
            .collect();
        assert_eq!(own, vec![b]);

        let roots = storage.root_categories().unwrap();
        assert_eq!(roots.len(), 1);
        assert_eq!(roots[0].id, root);
        assert!(storage.category_leaves(999).unwrap().is_empty());
    }

    #[test]
    fn test_insert_stubs_skips_same_session_duplicates() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        let category = storage.upsert_category(&node(10, 5), None).unwrap().id();

        let inserted = storage
            .insert_stubs(&[stub(1, category, 100), stub(2, category, 100)])
            .unwrap();
        assert_eq!(inserted, 2);

        let inserted = storage
            .insert_stubs(&[stub(1, category, 100), stub(1, category, 200)])
            .unwrap();
        assert_eq!(inserted, 1);
        assert_eq!(storage.count_products().unwrap(), 3);
    }

    #[test]
    fn test_insert_stubs_requires_known_category() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        assert!(storage.insert_stubs(&[stub(1, 999, 1)]).is_err());
        assert_eq!(storage.count_products().unwrap(), 0);
    }

    #[test]
    fn test_unparsed_range_and_window_respect_session_age() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        let category = storage.upsert_category(&node(10, 5), None).unwrap().id();
        storage
            .insert_stubs(&[stub(1, category, 10), stub(2, category, 500), stub(3, category, 500)])
            .unwrap();

        let (min, max) = storage.unparsed_id_range(category, 100).unwrap().unwrap();
        assert_eq!(max - min, 1);

        let stubs = storage
            .unparsed_stubs_in_window(category, min..max, 100)
            .unwrap();
        assert_eq!(stubs.len(), 1);
        assert_eq!(stubs[0].portal_id, 2);

        assert!(storage.unparsed_id_range(category, 1000).unwrap().is_none());
    }

    #[test]
    fn test_fingerprint_exists_excludes_self() {
        let (mut storage, _, product_id) = seeded();
        let shirt = shirt_detail();
        storage.persist_product(product_id, &shirt, "abc").unwrap();

        assert!(!storage.fingerprint_exists("abc", product_id).unwrap());
        assert!(storage.fingerprint_exists("abc", product_id + 1).unwrap());
        assert!(!storage.fingerprint_exists("def", product_id + 1).unwrap());
    }

    #[test]
    fn test_persist_product_writes_graph() {
        let (mut storage, _, product_id) = seeded();

        let outcome = storage
            .persist_product(product_id, &shirt_detail(), "fp1")
            .unwrap();
        assert_eq!(outcome, PersistOutcome::Committed);

        let product = storage.get_product(product_id).unwrap().unwrap();
        assert!(product.is_parsed());
        assert!(!storage.is_unparsed(product_id).unwrap());
        assert_eq!(product.seller_id, Some(5));
        assert_eq!(product.seller_title.as_deref(), Some("Acme"));
        assert_eq!(product.category_title.as_deref(), Some("Shirts"));
        assert_eq!(product.orders_amount, 12);
        assert_eq!(product.total_available_amount, 9);
        assert_eq!(product.fingerprint.as_deref(), Some("fp1"));

        assert_eq!(storage.count_characteristics().unwrap(), 2);
        assert_eq!(storage.count_char_values().unwrap(), 3);

        let skus = storage.get_skus(product_id).unwrap();
        assert_eq!(skus.len(), 3);
        // one reference: direct link plus one join row
        assert!(skus[0].char_value_id.is_some());
        assert_eq!(skus[0].char_value_ids.len(), 1);
        // two references: no direct link
        assert!(skus[1].char_value_id.is_none());
        assert_eq!(skus[1].char_value_ids.len(), 2);
        // unresolvable reference dropped, the resolvable one kept
        assert_eq!(skus[2].char_value_ids.len(), 1);
        assert_eq!(skus[2].char_value_id, Some(skus[2].char_value_ids[0]));
    }

    #[test]
    fn test_persist_product_shares_characteristics() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        let category = storage.upsert_category(&node(10, 5), None).unwrap().id();
        storage
            .insert_stubs(&[stub(101, category, 1), stub(102, category, 1)])
            .unwrap();
        let ids: Vec<i64> = storage
            .unparsed_stubs_in_window(category, 0..i64::MAX, 0)
            .unwrap()
            .iter()
            .map(|s| s.id)
            .collect();

        storage.persist_product(ids[0], &shirt_detail(), "a").unwrap();
        storage.persist_product(ids[1], &shirt_detail(), "b").unwrap();

        assert_eq!(storage.count_characteristics().unwrap(), 2);
        assert_eq!(storage.count_char_values().unwrap(), 3);
        assert_eq!(storage.count_skus().unwrap(), 6);
        assert_eq!(storage.count_parsed_products().unwrap(), 2);
    }

    #[test]
    fn test_persist_drops_stub_whose_fingerprint_was_committed_first() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        let category = storage.upsert_category(&node(10, 5), None).unwrap().id();
        storage
            .insert_stubs(&[stub(101, category, 1), stub(101, category, 2)])
            .unwrap();
        let ids: Vec<i64> = storage
            .unparsed_stubs_in_window(category, 0..i64::MAX, 0)
            .unwrap()
            .iter()
            .map(|s| s.id)
            .collect();

        let first = storage.persist_product(ids[0], &shirt_detail(), "fp1").unwrap();
        assert_eq!(first, PersistOutcome::Committed);

        let second = storage.persist_product(ids[1], &shirt_detail(), "fp1").unwrap();
        assert_eq!(second, PersistOutcome::Duplicate);
        assert!(storage.get_product(ids[1]).unwrap().is_none());
        assert!(storage.try_lock_product(ids[1]).unwrap());

        let kept = storage.get_product(ids[0]).unwrap().unwrap();
        assert_eq!(kept.fingerprint.as_deref(), Some("fp1"));
        assert_eq!(storage.count_products().unwrap(), 1);
        assert_eq!(storage.count_skus().unwrap(), 3);
    }

    #[test]
    fn test_negative_sku_reference_is_dropped() {
        let (mut storage, _, product_id) = seeded();
        let detail = detail(json!({
            "id": 101,
            "title": "Shirt",
            "characteristics": [
                {"title": "Size", "values": [{"title": "M", "value": "M"}]}
            ],
            "skuList": [
                {"availableAmount": 2, "fullPrice": 10.0, "purchasePrice": 9.0,
                 "characteristics": [{"charIndex": -1, "valueIndex": 0}]},
                {"availableAmount": 3, "fullPrice": 10.0, "purchasePrice": 9.0,
                 "characteristics": [{"charIndex": 0, "valueIndex": -2},
                                     {"charIndex": 0, "valueIndex": 0}]}
            ]
        }));

        let outcome = storage.persist_product(product_id, &detail, "fp1").unwrap();
        assert_eq!(outcome, PersistOutcome::Committed);

        let skus = storage.get_skus(product_id).unwrap();
        assert_eq!(skus.len(), 2);
        assert!(skus[0].char_value_id.is_none());
        assert!(skus[0].char_value_ids.is_empty());
        assert_eq!(skus[1].char_value_ids.len(), 1);
        assert_eq!(skus[1].char_value_id, Some(skus[1].char_value_ids[0]));
    }

    #[test]
    fn test_persist_already_parsed_is_claimed() {
        let (mut storage, _, product_id) = seeded();
        storage
            .persist_product(product_id, &shirt_detail(), "fp1")
            .unwrap();

        let again = storage
            .persist_product(product_id, &shirt_detail(), "fp1")
            .unwrap();
        assert_eq!(again, PersistOutcome::Claimed);
        assert_eq!(storage.count_skus().unwrap(), 3);
    }

    #[test]
    fn test_persist_failure_rolls_back_and_releases_claim() {
        let (mut storage, _, product_id) = seeded();
        storage
            .conn
            .execute_batch(
                "CREATE TRIGGER reject_skus BEFORE INSERT ON skus
                 BEGIN SELECT RAISE(ABORT, 'rejected'); END;",
            )
            .unwrap();

        assert!(storage
            .persist_product(product_id, &shirt_detail(), "fp1")
            .is_err());
        assert!(storage.is_unparsed(product_id).unwrap());
        assert_eq!(storage.count_characteristics().unwrap(), 0);
        assert!(storage.try_lock_product(product_id).unwrap());
    }

    #[test]
    fn test_delete_product_cascades_skus() {
        let (mut storage, _, product_id) = seeded();
        storage
            .persist_product(product_id, &shirt_detail(), "fp1")
            .unwrap();

        storage.delete_product(product_id).unwrap();
        assert!(storage.get_product(product_id).unwrap().is_none());
        assert_eq!(storage.count_skus().unwrap(), 0);
    }

    #[test]
    fn test_product_lock_excludes_other_connections() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open(dir.path().join("catalog.db")).unwrap();
        let mut first = db.connect().unwrap();
        let mut second = db.connect().unwrap();
        assert_ne!(first.owner(), second.owner());

        let category = first.upsert_category(&node(10, 5), None).unwrap().id();
        first.insert_stubs(&[stub(101, category, 1)]).unwrap();
        let product_id = first.unparsed_id_range(category, 0).unwrap().unwrap().0;

        assert!(first.try_lock_product(product_id).unwrap());
        assert_eq!(
            second
                .persist_product(product_id, &shirt_detail(), "fp1")
                .unwrap(),
            PersistOutcome::Claimed
        );
        assert!(second.is_unparsed(product_id).unwrap());

        first.release_product_lock(product_id).unwrap();
        assert_eq!(
            second
                .persist_product(product_id, &shirt_detail(), "fp1")
                .unwrap(),
            PersistOutcome::Committed
        );
    }

    #[test]
    fn test_stale_product_lock_is_taken_over() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open(dir.path().join("catalog.db"))
            .unwrap()
            .with_lock_ttl(Duration::ZERO);
        let mut first = db.connect().unwrap();
        let mut second = db.connect().unwrap();

        let category = first.upsert_category(&node(10, 5), None).unwrap().id();
        first.insert_stubs(&[stub(101, category, 1)]).unwrap();
        let product_id = first.unparsed_id_range(category, 0).unwrap().unwrap().0;

        assert!(first.try_lock_product(product_id).unwrap());
        std::thread::sleep(Duration::from_millis(5));
        assert!(second.try_lock_product(product_id).unwrap());
    }
}
