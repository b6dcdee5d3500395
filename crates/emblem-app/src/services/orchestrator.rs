//! Sequential, resumable enrichment loop.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::constants::{ASSET_CONTENT_TYPE, ASSET_EXTENSION};
use crate::pipeline::{Catalog, CatalogRecord, Item, reserve_key};
use crate::services::checkpoint::{Checkpoint, CheckpointError, CheckpointStore};
use crate::services::classifier::Classifier;
use crate::services::fetch::ContentFetcher;
use crate::services::object_store::ObjectStore;
use crate::services::retry::{RetryController, RetryPolicy};

const DEFAULT_COURTESY_DELAY: Duration = Duration::from_millis(500);

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("item at position {position} has index {index}; items must be indexed by position")]
    OutOfOrder { position: usize, index: usize },
    #[error("failed to finalize catalog: {0}")]
    Finalize(#[source] CheckpointError),
}

/// Collaborators the orchestrator drives.
#[derive(Clone)]
pub struct PipelineDeps {
    pub fetcher: Arc<dyn ContentFetcher>,
    pub classifier: Arc<dyn Classifier>,
    /// Destination for asset bytes.
    pub sink: Arc<dyn ObjectStore>,
    pub checkpoints: CheckpointStore,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, bon::Builder)]
pub struct PipelineOptions {
    /// Pause after every successful fetch, easing pressure on the classifier quota.
    #[builder(default = DEFAULT_COURTESY_DELAY)]
    pub courtesy_delay: Duration,
    #[builder(default)]
    pub retry: RetryPolicy,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// Per-run counters. Only describes this invocation, not resumed history.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunStats {
    pub recorded: usize,
    pub resumed_skips: usize,
    pub missing_locator: usize,
    pub fetch_failures: Vec<usize>,
    pub store_failures: Vec<usize>,
    pub placeholders: usize,
    pub checkpoint_failures: usize,
}

#[derive(Debug, Clone)]
pub struct RunReport {
    pub catalog: Catalog,
    /// Where the final catalog was written or published.
    pub catalog_location: String,
    pub stats: RunStats,
}

pub struct Orchestrator {
    deps: PipelineDeps,
    options: PipelineOptions,
    retry: RetryController,
}

impl Orchestrator {
    pub fn new(deps: PipelineDeps, options: PipelineOptions) -> Self {
        Self {
            retry: RetryController::new(options.retry),
            deps,
            options,
        }
    }

    pub fn options(&self) -> &PipelineOptions {
        &self.options
    }

    pub async fn run(&self, items: &[Item]) -> Result<Catalog, PipelineError> {
        Ok(self.run_with_report(items).await?.catalog)
    }

    pub async fn run_with_report(&self, items: &[Item]) -> Result<RunReport, PipelineError> {
        validate_order(items)?;

        let Checkpoint { cursor, mut catalog } = self.deps.checkpoints.load().await;
        let mut stats = RunStats::default();
        info!(
            items = items.len(),
            cursor = ?cursor,
            records = catalog.len(),
            "starting enrichment run"
        );

        for item in items {
            if cursor.is_some_and(|done| item.index <= done) {
                stats.resumed_skips += 1;
                continue;
            }
            self.process_item(item, &mut catalog, &mut stats).await;
        }

        catalog.insert_sentinel();
        let catalog_location = self
            .deps
            .checkpoints
            .finalize(&catalog)
            .await
            .map_err(PipelineError::Finalize)?;

        info!(
            recorded = stats.recorded,
            resumed_skips = stats.resumed_skips,
            missing_locator = stats.missing_locator,
            fetch_failures = stats.fetch_failures.len(),
            store_failures = stats.store_failures.len(),
            placeholders = stats.placeholders,
            records = catalog.len(),
            location = %catalog_location,
            "enrichment run finished"
        );
        if !stats.fetch_failures.is_empty() {
            warn!(
                indices = ?stats.fetch_failures,
                "some items could not be fetched; rerun from scratch to pick them up"
            );
        }

        Ok(RunReport {
            catalog,
            catalog_location,
            stats,
        })
    }

    async fn process_item(&self, item: &Item, catalog: &mut Catalog, stats: &mut RunStats) {
        let Some(locator) = item.content_locator.as_deref() else {
            debug!(index = item.index, group = item.group_hint, "no content locator; skipping");
            stats.missing_locator += 1;
            return;
        };

        let content = match self.deps.fetcher.fetch(locator).await {
            Ok(content) => content,
            Err(err) => {
                warn!(index = item.index, group = item.group_hint, error = %err, "fetch failed; skipping");
                stats.fetch_failures.push(item.index);
                return;
            }
        };
        if !self.options.courtesy_delay.is_zero() {
            sleep(self.options.courtesy_delay).await;
        }

        let outcome = self
            .retry
            .classify(self.deps.classifier.as_ref(), &content)
            .await;
        if outcome.fallback.is_some() {
            stats.placeholders += 1;
        }

        let key = reserve_key(&outcome.result.suggested_key, catalog);
        let object_name = format!("{key}.{ASSET_EXTENSION}");
        let location = match self
            .deps
            .sink
            .put(&object_name, content, ASSET_CONTENT_TYPE)
            .await
        {
            Ok(location) => location,
            Err(err) => {
                warn!(index = item.index, key = %key, error = %err, "failed to store asset; skipping");
                stats.store_failures.push(item.index);
                return;
            }
        };

        info!(
            index = item.index,
            group = item.group_hint,
            key = %key,
            attempts = outcome.attempts,
            "recorded"
        );
        catalog.insert(CatalogRecord::new(key, location, outcome.result.description));
        stats.recorded += 1;

        if let Err(err) = self.deps.checkpoints.save(item.index, catalog).await {
            warn!(index = item.index, error = %err, "checkpoint save failed; continuing");
            stats.checkpoint_failures += 1;
        }
    }
}

fn validate_order(items: &[Item]) -> Result<(), PipelineError> {
    items
        .iter()
        .enumerate()
        .find(|(position, item)| item.index != *position)
        .map_or(Ok(()), |(position, item)| {
            Err(PipelineError::OutOfOrder {
                position,
                index: item.index,
            })
        })
}
