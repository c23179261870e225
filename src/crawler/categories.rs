//! Category tree synchronization
//!
//! Fetches the remote tree once and reconciles it into the local adjacency
//! list, parents before children. The first failure aborts the sync.

use crate::catalog::CategoryNode;
use crate::portal::Upstream;
use crate::storage::{Database, Storage, UpsertOutcome};
use crate::Result;

/// Counts of what a sync did to the local tree
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub inserted: u64,
    pub updated: u64,
    pub unchanged: u64,
}

impl SyncReport {
    pub fn total(&self) -> u64 {
        self.inserted + self.updated + self.unchanged
    }

    fn record(&mut self, outcome: UpsertOutcome) {
        match outcome {
            UpsertOutcome::Inserted(_) => self.inserted += 1,
            UpsertOutcome::Updated(_) => self.updated += 1,
            UpsertOutcome::Existing(_) => self.unchanged += 1,
        }
    }
}

/// Keeps the local category tree in step with the portal
pub struct CategorySync<U> {
    upstream: U,
    database: Database,
}

impl<U: Upstream> CategorySync<U> {
    pub fn new(upstream: U, database: Database) -> Self {
        Self { upstream, database }
    }

    /// Fetches the remote tree and persists it
    pub fn sync(&self) -> Result<SyncReport> {
        let children = self.upstream.category_tree()?;
        let mut storage = self.database.connect()?;

        let mut report = SyncReport::default();
        persist_tree(&mut storage, &children, None, &mut report)?;

        tracing::info!(
            "Category sync complete: {} new, {} updated, {} unchanged",
            report.inserted,
            report.updated,
            report.unchanged
        );
        Ok(report)
    }
}

/// Persists `nodes` under `parent_id`, then each node's subtree
pub fn persist_tree<S: Storage + ?Sized>(
    storage: &mut S,
    nodes: &[CategoryNode],
    parent_id: Option<i64>,
    report: &mut SyncReport,
) -> Result<()> {
    for node in nodes {
        let outcome = storage.upsert_category(node, parent_id).map_err(|e| {
            tracing::error!(
                "Failed to persist category {} ({}): {}",
                node.portal_id,
                node.title,
                e
            );
            e
        })?;

        if let UpsertOutcome::Updated(id) = outcome {
            tracing::debug!(
                "Category {} (local {}) now has {} products",
                node.portal_id,
                id,
                node.product_amount
            );
        }
        report.record(outcome);

        persist_tree(storage, &node.children, Some(outcome.id()), report)?;
    }
    Ok(())
}
