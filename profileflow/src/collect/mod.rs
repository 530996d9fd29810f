//! Fan-out/fan-in collection across upstream sources.
//!
//! The collector runs a batch of items under an item-level concurrency
//! bound; each item fans out to every configured source under its own
//! source-level bound, with each fetch wrapped by the retry executor.
//! Source failures are absorbed into `ok = false` results — a batch
//! always yields one value per input item, and an item whose every
//! source failed is still a record (with an empty source list), because
//! collection failure is data-quality information.

mod http;

pub use http::HttpSource;

use crate::cache::{cache_key, CacheStore};
use crate::config::CollectorConfig;
use crate::core::{EnrichedRecord, ProfileQuery, SourceId, SourceResult, WorkItem};
use crate::errors::CollectError;
use crate::merge::Merger;
use crate::metrics::CollectorMetrics;
use crate::retry::RetryExecutor;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

/// A uniform async capability over one upstream data source.
///
/// Adapters are thin shims: they know their wire format, tag their own
/// results, and surface failures as [`CollectError`]s for the executor
/// to classify. Nothing else in the crate knows what a given upstream
/// looks like.
#[async_trait]
pub trait Source: Send + Sync {
    /// The tag this adapter stamps on its results.
    fn id(&self) -> SourceId;

    /// Fetches this source's contribution for one profile.
    async fn fetch(
        &self,
        query: &ProfileQuery,
    ) -> Result<BTreeMap<String, serde_json::Value>, CollectError>;
}

/// Collects batches of work items across all configured sources.
pub struct ParallelCollector {
    sources: Vec<Arc<dyn Source>>,
    cache: Arc<dyn CacheStore>,
    merger: Merger,
    retry: RetryExecutor,
    config: CollectorConfig,
    metrics: Arc<CollectorMetrics>,
}

impl ParallelCollector {
    /// Creates a collector.
    #[must_use]
    pub fn new(
        config: CollectorConfig,
        sources: Vec<Arc<dyn Source>>,
        cache: Arc<dyn CacheStore>,
        merger: Merger,
        retry: RetryExecutor,
    ) -> Self {
        Self {
            sources,
            cache,
            merger,
            retry,
            config,
            metrics: Arc::new(CollectorMetrics::new()),
        }
    }

    /// The collector's metrics registry.
    #[must_use]
    pub fn metrics(&self) -> &Arc<CollectorMetrics> {
        &self.metrics
    }

    /// The configured source tags, in configuration order.
    #[must_use]
    pub fn source_ids(&self) -> Vec<SourceId> {
        self.sources.iter().map(|s| s.id()).collect()
    }

    /// Collects enriched records for a batch of items.
    ///
    /// Returns one result per input item, in input order. Per-item
    /// failures never abort the batch; the only per-item error is a
    /// structurally malformed item, which fails before any I/O.
    /// Cancelling the returned future abandons in-flight source calls
    /// and commits nothing for unfinished items.
    pub async fn collect_batch(
        &self,
        items: &[WorkItem],
    ) -> Vec<Result<EnrichedRecord, CollectError>> {
        let item_slots = Arc::new(Semaphore::new(self.config.max_concurrent_items.max(1)));

        futures::future::join_all(items.iter().map(|item| {
            let slots = Arc::clone(&item_slots);
            async move {
                // Semaphore only closes on explicit close, which never
                // happens here.
                let _permit = slots.acquire().await.map_err(|_| {
                    CollectError::unknown("collector semaphore closed")
                })?;
                self.collect_one(item).await
            }
        }))
        .await
    }

    async fn collect_one(&self, item: &WorkItem) -> Result<EnrichedRecord, CollectError> {
        let base = Self::base_fields(item)?;
        let key = cache_key(&item.id, &self.source_ids());

        if let Some(record) = self.cache_lookup(&key).await {
            self.metrics.cache_hits.fetch_add(1, Ordering::Relaxed);
            self.metrics.items_collected.fetch_add(1, Ordering::Relaxed);
            debug!(item_id = %item.id, "cache hit, skipping source fan-out");
            return Ok(record);
        }
        self.metrics.cache_misses.fetch_add(1, Ordering::Relaxed);

        let query = ProfileQuery::from_payload(
            item.payload_object().unwrap_or(&serde_json::Map::new()),
        );
        let results = self.fan_out(&item.id, &query).await;
        let record = self.merger.merge(base, &results);

        self.cache_store(&key, &record).await;
        self.metrics.items_collected.fetch_add(1, Ordering::Relaxed);
        Ok(record)
    }

    /// Fans out to every configured source, bounded and retried.
    ///
    /// Errors come back as `ok = false` results; nothing here unwinds
    /// the join.
    async fn fan_out(&self, item_id: &str, query: &ProfileQuery) -> Vec<SourceResult> {
        let source_slots = Arc::new(Semaphore::new(self.config.max_concurrent_sources.max(1)));

        futures::future::join_all(self.sources.iter().map(|source| {
            let slots = Arc::clone(&source_slots);
            async move {
                let Ok(_permit) = slots.acquire().await else {
                    return SourceResult::failure(
                        source.id(),
                        "source semaphore closed",
                        std::time::Duration::ZERO,
                    );
                };

                let started = Instant::now();
                let outcome = self
                    .retry
                    .execute(source.id().as_str(), || source.fetch(query))
                    .await;
                let latency = started.elapsed();

                match outcome {
                    Ok(data) => SourceResult::success(source.id(), data, latency),
                    Err(exhausted) => {
                        self.metrics.source_errors.fetch_add(1, Ordering::Relaxed);
                        warn!(
                            item_id,
                            source = %exhausted.operation,
                            attempts = exhausted.attempts,
                            error = %exhausted.last,
                            "source fetch failed, continuing without it"
                        );
                        SourceResult::failure(source.id(), exhausted.last.to_string(), latency)
                    }
                }
            }
        }))
        .await
    }

    fn base_fields(
        item: &WorkItem,
    ) -> Result<BTreeMap<String, serde_json::Value>, CollectError> {
        if item.id.trim().is_empty() {
            return Err(CollectError::malformed("work item has an empty id"));
        }
        let Some(payload) = item.payload_object() else {
            return Err(CollectError::malformed("work item payload is not an object"));
        };
        Ok(payload
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }

    async fn cache_lookup(&self, key: &str) -> Option<EnrichedRecord> {
        match self.cache.get(key).await {
            Ok(Some(value)) => match serde_json::from_value(value) {
                Ok(record) => Some(record),
                Err(e) => {
                    warn!(key, error = %e, "cached record failed to decode, treating as miss");
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                warn!(key, error = %e, "cache read failed, treating as miss");
                None
            }
        }
    }

    /// Best-effort cache write; failure is logged and swallowed.
    async fn cache_store(&self, key: &str, record: &EnrichedRecord) {
        let value = match serde_json::to_value(record) {
            Ok(value) => value,
            Err(e) => {
                warn!(key, error = %e, "record failed to encode for caching");
                self.metrics
                    .cache_write_failures
                    .fetch_add(1, Ordering::Relaxed);
                return;
            }
        };
        if let Err(e) = self.cache.set(key, value, self.config.cache_ttl()).await {
            warn!(key, error = %e, "cache write failed, returning record anyway");
            self.metrics
                .cache_write_failures
                .fetch_add(1, Ordering::Relaxed);
        }
    }
}
