//! Product crawler
//!
//! Enriches unparsed stubs with full product detail. Leaf categories are
//! spread over an outer pool; within a category the stub id space is scanned
//! in fixed windows and the stubs are handed to a small inner pool, which
//! bounds the request rate against the product endpoint.

use crate::catalog::fingerprint;
use crate::config::CrawlerConfig;
use crate::crawler::{new_session_id, random_pause, session_cutoff, WorkerPool};
use crate::portal::Upstream;
use crate::storage::{
    CategoryRecord, Database, PersistOutcome, SessionKind, SessionStatus, SqliteStorage, Storage,
    StubRecord,
};
use crate::{HarvestError, Result};
use std::ops::Range;
use std::sync::atomic::{AtomicU64, Ordering};

/// What happened to a single stub
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemOutcome {
    /// Detail fetched and the product graph committed
    Parsed,
    /// Someone finished the stub before this worker got to it
    AlreadyParsed,
    /// Content matched another product; the stub was deleted
    Duplicate,
    /// Another writer holds the product
    Claimed,
    /// Fetch or persistence failed; the stub stays unparsed
    Failed,
}

/// Summary of one `crawl_products` call
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProductReport {
    pub session_id: i64,
    pub categories: u64,
    pub failed_categories: u64,
    pub parsed: u64,
    pub duplicates: u64,
    pub already_parsed: u64,
    pub claimed: u64,
    pub failed: u64,
}

impl ProductReport {
    /// Stubs that reached a final outcome
    pub fn items(&self) -> u64 {
        self.parsed + self.duplicates + self.already_parsed + self.claimed + self.failed
    }
}

#[derive(Default)]
struct ProductCounters {
    categories: AtomicU64,
    failed_categories: AtomicU64,
    parsed: AtomicU64,
    duplicates: AtomicU64,
    already_parsed: AtomicU64,
    claimed: AtomicU64,
    failed: AtomicU64,
}

impl ProductCounters {
    fn record(&self, outcome: ItemOutcome) {
        let counter = match outcome {
            ItemOutcome::Parsed => &self.parsed,
            ItemOutcome::AlreadyParsed => &self.already_parsed,
            ItemOutcome::Duplicate => &self.duplicates,
            ItemOutcome::Claimed => &self.claimed,
            ItemOutcome::Failed => &self.failed,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn report(&self, session_id: i64) -> ProductReport {
        ProductReport {
            session_id,
            categories: self.categories.load(Ordering::Relaxed),
            failed_categories: self.failed_categories.load(Ordering::Relaxed),
            parsed: self.parsed.load(Ordering::Relaxed),
            duplicates: self.duplicates.load(Ordering::Relaxed),
            already_parsed: self.already_parsed.load(Ordering::Relaxed),
            claimed: self.claimed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }
}

/// Half-open id windows `[start, start + batch_size)` covering `min..=max`
pub fn id_windows(min: i64, max: i64, batch_size: i64) -> impl Iterator<Item = Range<i64>> {
    let batch = batch_size.max(1);
    std::iter::successors(Some(min), move |start| {
        start.checked_add(batch).filter(|next| *next <= max)
    })
    .map(move |start| start..start.saturating_add(batch))
}

/// Fetches product detail for unparsed stubs
pub struct ProductCrawler<U> {
    upstream: U,
    database: Database,
    config: CrawlerConfig,
}

impl<U: Upstream> ProductCrawler<U> {
    pub fn new(upstream: U, database: Database, config: CrawlerConfig) -> Self {
        Self {
            upstream,
            database,
            config,
        }
    }

    /// Enriches the fresh unparsed stubs of every leaf under `root_category_id`
    pub fn crawl_products(&self, root_category_id: i64) -> Result<ProductReport> {
        let mut storage = self.database.connect()?;
        if storage.get_category(root_category_id)?.is_none() {
            return Err(HarvestError::CategoryNotFound(root_category_id));
        }

        let leaves = storage.category_leaves(root_category_id)?;
        let session_id = new_session_id();
        let min_session_id = session_cutoff(self.config.session_max_age());
        storage.begin_session(session_id, SessionKind::Products, root_category_id)?;

        tracing::info!(
            "Product session {}: {} leaf categories under category {}",
            session_id,
            leaves.len(),
            root_category_id
        );

        let counters = ProductCounters::default();
        let pool = WorkerPool::new("categories", self.config.category_workers);
        let queued = pool.run_all(
            |_| Ok(self.database.connect()?),
            |worker_storage: &mut SqliteStorage, leaf: CategoryRecord| {
                match self.parse_category(worker_storage, leaf.id, min_session_id, &counters) {
                    Ok(()) => {
                        counters.categories.fetch_add(1, Ordering::Relaxed);
                    }
                    Err(e) => {
                        counters.failed_categories.fetch_add(1, Ordering::Relaxed);
                        tracing::error!(
                            "Product crawl of category {} (portal {}) aborted: {}",
                            leaf.id,
                            leaf.portal_id,
                            e
                        );
                    }
                }
            },
            leaves,
        );

        let report = counters.report(session_id);
        let status = if queued.is_ok() {
            SessionStatus::Completed
        } else {
            SessionStatus::Failed
        };
        storage.finish_session(session_id, status, report.parsed)?;
        queued?;

        tracing::info!(
            "Product session {} finished: {} parsed, {} duplicates, {} already parsed, {} claimed, {} failed",
            session_id,
            report.parsed,
            report.duplicates,
            report.already_parsed,
            report.claimed,
            report.failed
        );
        Ok(report)
    }

    /// Scans one category's eligible stubs window by window
    ///
    /// Windows are produced in increasing id order on the calling thread;
    /// the stubs of a window are processed by the inner pool in any order.
    fn parse_category(
        &self,
        storage: &mut SqliteStorage,
        category_id: i64,
        min_session_id: i64,
        counters: &ProductCounters,
    ) -> Result<()> {
        let Some((min, max)) = storage.unparsed_id_range(category_id, min_session_id)? else {
            tracing::debug!("Category {}: no unparsed stubs", category_id);
            return Ok(());
        };

        tracing::debug!(
            "Category {}: scanning stub ids {}..={}",
            category_id,
            min,
            max
        );

        let pool = WorkerPool::new(
            format!("products-{}", category_id),
            self.config.product_workers,
        );
        pool.run(
            |_| Ok(self.database.connect()?),
            |worker_storage: &mut SqliteStorage, stub: StubRecord| {
                counters.record(self.process_item(worker_storage, stub));
            },
            |queue| -> Result<()> {
                for window in id_windows(min, max, self.config.batch_size) {
                    let stubs =
                        storage.unparsed_stubs_in_window(category_id, window, min_session_id)?;
                    for stub in stubs {
                        queue.push(stub)?;
                    }
                }
                Ok(())
            },
        )
    }

    /// Fetches, deduplicates and persists one stub
    pub fn process_item(&self, storage: &mut SqliteStorage, stub: StubRecord) -> ItemOutcome {
        match storage.is_unparsed(stub.id) {
            Ok(true) => {}
            Ok(false) => return ItemOutcome::AlreadyParsed,
            Err(e) => {
                tracing::error!("Product {}: status check failed: {}", stub.id, e);
                return ItemOutcome::Failed;
            }
        }

        let outcome = match self.upstream.product(stub.portal_id) {
            Ok(detail) => self
                .store_detail(storage, stub, &detail)
                .unwrap_or_else(|e| {
                    tracing::error!(
                        "Product {} (portal {}): persistence failed: {}",
                        stub.id,
                        stub.portal_id,
                        e
                    );
                    ItemOutcome::Failed
                }),
            Err(e) => {
                tracing::warn!(
                    "Product {} (portal {}): fetch failed: {}",
                    stub.id,
                    stub.portal_id,
                    e
                );
                ItemOutcome::Failed
            }
        };

        random_pause(self.config.product_delay());
        outcome
    }

    fn store_detail(
        &self,
        storage: &mut SqliteStorage,
        stub: StubRecord,
        detail: &crate::catalog::ProductDetail,
    ) -> Result<ItemOutcome> {
        let fingerprint = fingerprint(detail);

        if storage.fingerprint_exists(&fingerprint, stub.id)? {
            tracing::debug!(
                "Product {} (portal {}) unchanged since an earlier crawl, dropping stub",
                stub.id,
                stub.portal_id
            );
            storage.delete_product(stub.id)?;
            return Ok(ItemOutcome::Duplicate);
        }

        let outcome = match storage.persist_product(stub.id, detail, &fingerprint)? {
            PersistOutcome::Committed => ItemOutcome::Parsed,
            PersistOutcome::Claimed => ItemOutcome::Claimed,
            PersistOutcome::Duplicate => {
                tracing::debug!(
                    "Product {} (portal {}) matched a product committed meanwhile, dropping stub",
                    stub.id,
                    stub.portal_id
                );
                ItemOutcome::Duplicate
            }
        };
        Ok(outcome)
    }
}
