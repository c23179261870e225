//! Output module for catalog summaries
//!
//! This module handles:
//! - Loading catalog statistics from storage
//! - Printing statistics and crawl reports for the CLI

pub mod stats;

pub use stats::{load_statistics, print_statistics, CatalogStatistics};

use crate::crawler::{ListingReport, ProductReport, SyncReport};

/// Prints the outcome of a category sync
pub fn print_sync_report(report: &SyncReport) {
    println!("=== Category Sync ===\n");
    println!("  New categories: {}", report.inserted);
    println!("  Updated counts: {}", report.updated);
    println!("  Unchanged: {}", report.unchanged);
    println!("  Total: {}", report.total());
}

/// Prints the outcome of a listing crawl
pub fn print_listing_report(report: &ListingReport) {
    println!("=== Listing Crawl (session {}) ===\n", report.session_id);
    println!("  Categories crawled: {}", report.categories);
    println!("  Categories failed: {}", report.failed_categories);
    println!("  Pages fetched: {}", report.pages);
    println!("  New stubs: {}", report.stubs_inserted);
}

/// Prints the outcome of a product crawl
pub fn print_product_report(report: &ProductReport) {
    println!("=== Product Crawl (session {}) ===\n", report.session_id);
    println!("  Categories crawled: {}", report.categories);
    println!("  Categories failed: {}", report.failed_categories);
    println!("  Parsed: {}", report.parsed);
    println!("  Duplicates dropped: {}", report.duplicates);
    println!("  Already parsed: {}", report.already_parsed);
    println!("  Claimed elsewhere: {}", report.claimed);
    println!("  Failed: {}", report.failed);
}
