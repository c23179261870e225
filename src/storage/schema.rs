//! Database schema definitions
//!
//! This module contains all SQL schema definitions for the Catalog-Harvest database.

/// SQL schema for the database
pub const SCHEMA_SQL: &str = r#"
-- Track listing and product crawl sessions
CREATE TABLE IF NOT EXISTS crawl_sessions (
    id INTEGER PRIMARY KEY,
    kind TEXT NOT NULL,
    root_category_id INTEGER NOT NULL,
    started_at TEXT NOT NULL,
    finished_at TEXT,
    status TEXT NOT NULL,
    items INTEGER NOT NULL DEFAULT 0
);

-- Category tree as an adjacency list
CREATE TABLE IF NOT EXISTS categories (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    portal_id INTEGER NOT NULL UNIQUE,
    title TEXT NOT NULL,
    parent_id INTEGER REFERENCES categories(id),
    products_amount INTEGER NOT NULL DEFAULT 0,
    history TEXT NOT NULL DEFAULT '[]',
    created_at TEXT NOT NULL,
    updated_at TEXT
);

CREATE INDEX IF NOT EXISTS idx_categories_parent ON categories(parent_id);

-- Product stubs from listings, promoted in place to full products
CREATE TABLE IF NOT EXISTS products (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    portal_id INTEGER NOT NULL,
    title TEXT NOT NULL,
    portal_category_id INTEGER,
    category_id INTEGER NOT NULL REFERENCES categories(id),
    category_title TEXT,
    session_id INTEGER NOT NULL,
    rating REAL NOT NULL DEFAULT 0,
    description TEXT,
    seller_id INTEGER,
    seller_title TEXT,
    orders_amount INTEGER NOT NULL DEFAULT 0,
    reviews_amount INTEGER NOT NULL DEFAULT 0,
    total_available_amount INTEGER NOT NULL DEFAULT 0,
    fingerprint TEXT,
    parsed_at TEXT,
    created_at TEXT NOT NULL,
    UNIQUE(portal_id, session_id)
);

CREATE INDEX IF NOT EXISTS idx_products_category_parsed ON products(category_id, parsed_at);
CREATE INDEX IF NOT EXISTS idx_products_fingerprint ON products(fingerprint);

-- Characteristics are shared across products by title
CREATE TABLE IF NOT EXISTS characteristics (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    title TEXT NOT NULL UNIQUE,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS char_values (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    char_id INTEGER NOT NULL REFERENCES characteristics(id),
    title TEXT NOT NULL,
    value TEXT NOT NULL,
    created_at TEXT NOT NULL,
    UNIQUE(char_id, title, value)
);

CREATE TABLE IF NOT EXISTS skus (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    product_id INTEGER NOT NULL REFERENCES products(id) ON DELETE CASCADE,
    char_value_id INTEGER REFERENCES char_values(id),
    available_amount INTEGER NOT NULL DEFAULT 0,
    full_price REAL NOT NULL DEFAULT 0,
    purchase_price REAL NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_skus_product ON skus(product_id);

CREATE TABLE IF NOT EXISTS sku_char_values (
    sku_id INTEGER NOT NULL REFERENCES skus(id) ON DELETE CASCADE,
    char_value_id INTEGER NOT NULL REFERENCES char_values(id),
    PRIMARY KEY (sku_id, char_value_id)
);

-- Exclusive write claims on products; acquired_at is unix milliseconds
CREATE TABLE IF NOT EXISTS product_locks (
    product_id INTEGER PRIMARY KEY,
    owner TEXT NOT NULL,
    acquired_at INTEGER NOT NULL
);
"#;

/// Initializes the database schema
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}
