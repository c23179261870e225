//! Listing crawler
//!
//! Pages through every leaf category under a root and records each listed
//! product as an unparsed stub tagged with the crawl's session id.

use crate::config::CrawlerConfig;
use crate::crawler::{new_session_id, random_pause, WorkerPool};
use crate::portal::Upstream;
use crate::storage::{
    CategoryRecord, Database, NewStub, SessionKind, SessionStatus, SqliteStorage, Storage,
};
use crate::{HarvestError, Result};
use std::sync::atomic::{AtomicU64, Ordering};

/// Summary of one `crawl_listings` call
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ListingReport {
    pub session_id: i64,
    pub categories: u64,
    pub failed_categories: u64,
    pub pages: u64,
    pub stubs_inserted: u64,
}

#[derive(Default)]
struct ListingCounters {
    categories: AtomicU64,
    failed_categories: AtomicU64,
    pages: AtomicU64,
    stubs_inserted: AtomicU64,
}

impl ListingCounters {
    fn report(&self, session_id: i64) -> ListingReport {
        ListingReport {
            session_id,
            categories: self.categories.load(Ordering::Relaxed),
            failed_categories: self.failed_categories.load(Ordering::Relaxed),
            pages: self.pages.load(Ordering::Relaxed),
            stubs_inserted: self.stubs_inserted.load(Ordering::Relaxed),
        }
    }
}

/// Number of pages to request for a category, or None when unbounded
///
/// The stored product count is only an estimate; a zero estimate leaves the
/// empty page as the sole terminator.
pub fn page_bound(products_amount: i64, page_size: u32) -> Option<u32> {
    if products_amount <= 0 || page_size == 0 {
        return None;
    }
    let pages = (products_amount as u64).div_ceil(page_size as u64);
    Some(u32::try_from(pages).unwrap_or(u32::MAX))
}

/// Collects product stubs from category listings
pub struct ListingCrawler<U> {
    upstream: U,
    database: Database,
    config: CrawlerConfig,
}

impl<U: Upstream> ListingCrawler<U> {
    pub fn new(upstream: U, database: Database, config: CrawlerConfig) -> Self {
        Self {
            upstream,
            database,
            config,
        }
    }

    /// Crawls the listings of every leaf category under `root_category_id`
    ///
    /// Categories are crawled concurrently, smallest first. A failing
    /// category is logged and abandoned without affecting the others.
    pub fn crawl_listings(&self, root_category_id: i64) -> Result<ListingReport> {
        let mut storage = self.database.connect()?;
        if storage.get_category(root_category_id)?.is_none() {
            return Err(HarvestError::CategoryNotFound(root_category_id));
        }

        let leaves = storage.category_leaves(root_category_id)?;
        let session_id = new_session_id();
        storage.begin_session(session_id, SessionKind::Listings, root_category_id)?;

        tracing::info!(
            "Listing session {}: {} leaf categories under category {}",
            session_id,
            leaves.len(),
            root_category_id
        );

        let counters = ListingCounters::default();
        let pool = WorkerPool::new("listings", self.config.listing_workers);
        let queued = pool.run_all(
            |_| Ok(self.database.connect()?),
            |worker_storage: &mut SqliteStorage, leaf: CategoryRecord| {
                match self.crawl_category(worker_storage, &leaf, session_id, &counters) {
                    Ok(()) => {
                        counters.categories.fetch_add(1, Ordering::Relaxed);
                    }
                    Err(e) => {
                        counters.failed_categories.fetch_add(1, Ordering::Relaxed);
                        tracing::error!(
                            "Listing crawl of category {} (portal {}) aborted: {}",
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
        storage.finish_session(session_id, status, report.stubs_inserted)?;
        queued?;

        tracing::info!(
            "Listing session {} finished: {} categories ({} failed), {} pages, {} new stubs",
            session_id,
            report.categories,
            report.failed_categories,
            report.pages,
            report.stubs_inserted
        );
        Ok(report)
    }

    /// Fetches a category's pages in order until the bound or an empty page
    fn crawl_category(
        &self,
        storage: &mut SqliteStorage,
        category: &CategoryRecord,
        session_id: i64,
        counters: &ListingCounters,
    ) -> Result<()> {
        let page_size = self.config.page_size;
        let bound = page_bound(category.products_amount, page_size);
        let mut page = 0u32;

        while bound.map_or(true, |bound| page < bound) {
            let listing = self
                .upstream
                .listing_page(category.portal_id, page, page_size)?;
            counters.pages.fetch_add(1, Ordering::Relaxed);

            if listing.products.is_empty() {
                tracing::debug!(
                    "Category {}: page {} is empty, listing complete",
                    category.id,
                    page
                );
                break;
            }

            let stubs: Vec<NewStub> = listing
                .products
                .iter()
                .map(|item| NewStub {
                    portal_id: item.portal_id,
                    title: item.title.clone(),
                    portal_category_id: item.portal_category_id,
                    category_id: category.id,
                    rating: item.rating,
                    session_id,
                })
                .collect();

            let inserted = storage.insert_stubs(&stubs)?;
            counters
                .stubs_inserted
                .fetch_add(inserted as u64, Ordering::Relaxed);
            tracing::debug!(
                "Category {}: page {} gave {} items, {} new",
                category.id,
                page,
                stubs.len(),
                inserted
            );

            random_pause(self.config.page_delay());
            page += 1;
        }

        Ok(())
    }
}
