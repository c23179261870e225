//! Statistics generation from the catalog database
//!
//! This module provides functionality for extracting and displaying
//! catalog statistics from the storage layer.

use crate::storage::{SessionRecord, Storage};
use crate::Result;
use serde::Serialize;

/// Catalog statistics summary
#[derive(Debug, Clone, Serialize)]
pub struct CatalogStatistics {
    /// Total number of categories
    pub categories: u64,

    /// Categories without a parent
    pub root_categories: u64,

    /// All product rows, parsed or not
    pub products: u64,

    /// Products with full detail
    pub parsed_products: u64,

    /// Stubs still awaiting detail
    pub pending_products: u64,

    pub characteristics: u64,

    pub char_values: u64,

    pub skus: u64,

    /// Most recently started crawl session
    pub latest_session: Option<SessionRecord>,
}

/// Loads statistics from storage
///
/// # Arguments
///
/// * `storage` - The storage backend to query
///
/// # Returns
///
/// * `Ok(CatalogStatistics)` - Successfully loaded statistics
/// * `Err(HarvestError)` - Failed to query statistics
pub fn load_statistics(storage: &dyn Storage) -> Result<CatalogStatistics> {
    let products = storage.count_products()?;
    let parsed_products = storage.count_parsed_products()?;

    Ok(CatalogStatistics {
        categories: storage.count_categories()?,
        root_categories: storage.root_categories()?.len() as u64,
        products,
        parsed_products,
        pending_products: products.saturating_sub(parsed_products),
        characteristics: storage.count_characteristics()?,
        char_values: storage.count_char_values()?,
        skus: storage.count_skus()?,
        latest_session: storage.get_latest_session()?,
    })
}

/// Prints statistics to stdout in a formatted manner
///
/// # Arguments
///
/// * `stats` - The statistics to display
pub fn print_statistics(stats: &CatalogStatistics) {
    println!("=== Catalog Statistics ===\n");

    println!("Categories:");
    println!("  Total: {}", stats.categories);
    println!("  Roots: {}", stats.root_categories);
    println!();

    println!("Products:");
    println!("  Total rows: {}", stats.products);
    println!("  Parsed: {}", stats.parsed_products);
    println!("  Pending: {}", stats.pending_products);
    println!();

    println!("Product Graph:");
    println!("  Characteristics: {}", stats.characteristics);
    println!("  Characteristic values: {}", stats.char_values);
    println!("  SKUs: {}", stats.skus);
    println!();

    if let Some(session) = &stats.latest_session {
        println!("Latest Session:");
        println!("  Id: {}", session.id);
        println!("  Kind: {}", session.kind.to_db_string());
        println!("  Root category: {}", session.root_category_id);
        println!("  Started: {}", session.started_at);
        if let Some(finished) = &session.finished_at {
            println!("  Finished: {}", finished);
        }
        println!("  Status: {}", session.status.to_db_string());
        println!("  Items: {}", session.items);
        println!();
    }

    let parsed_rate = if stats.products > 0 {
        (stats.parsed_products as f64 / stats.products as f64) * 100.0
    } else {
        0.0
    };

    println!(
        "Parsed Rate: {:.1}% ({} / {} products enriched)",
        parsed_rate, stats.parsed_products, stats.products
    );
}
