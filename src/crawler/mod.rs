//! Crawler module for the three ingestion pipelines
//!
//! This module contains the crawl logic, including:
//! - Category tree synchronization
//! - Paginated listing ingestion into product stubs
//! - Product detail crawling with fingerprint deduplication
//! - The bounded worker pool both crawlers fan out with

mod categories;
mod listings;
mod pool;
mod products;

#[cfg(test)]
mod testing;

pub use categories::{persist_tree, CategorySync, SyncReport};
pub use listings::{page_bound, ListingCrawler, ListingReport};
pub use pool::{QueueClosed, TaskQueue, WorkerPool};
pub use products::{id_windows, ItemOutcome, ProductCrawler, ProductReport};

use chrono::Utc;
use rand::Rng;
use std::time::Duration;

/// Creates a session id: the current unix time in nanoseconds
pub fn new_session_id() -> i64 {
    Utc::now().timestamp_nanos_opt().unwrap_or(i64::MAX)
}

/// Lowest session id still considered fresh for the given maximum age
pub fn session_cutoff(max_age: Duration) -> i64 {
    let age = i64::try_from(max_age.as_nanos()).unwrap_or(i64::MAX);
    new_session_id().saturating_sub(age)
}

/// Picks a uniformly random delay in `[0, max]`
pub fn jitter(max: Duration) -> Duration {
    if max.is_zero() {
        return Duration::ZERO;
    }
    let max_ms = u64::try_from(max.as_millis()).unwrap_or(u64::MAX);
    Duration::from_millis(rand::thread_rng().gen_range(0..=max_ms))
}

/// Blocks the calling worker for a random delay of at most `max`
pub fn random_pause(max: Duration) {
    let delay = jitter(max);
    if !delay.is_zero() {
        std::thread::sleep(delay);
    }
}
