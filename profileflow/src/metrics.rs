//! Atomic counter registries for the core components.
//!
//! Counters are fire-and-forget: components increment them on the hot
//! path with no coordination beyond the atomic itself. `snapshot()`
//! renders a registry as JSON for whatever exporter sits outside the
//! core; nothing here blocks or fails.

use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Counters for the retry executor.
#[derive(Debug, Default)]
pub struct RetryMetrics {
    /// Total attempts made, including first tries.
    pub attempts: AtomicU64,
    /// Operations that succeeded after at least one retry.
    pub successes_after_retry: AtomicU64,
    /// Operations that exhausted their attempt budget.
    pub exhausted: AtomicU64,
    /// Total milliseconds spent inside retried operations.
    pub total_duration_ms: AtomicU64,
}

impl RetryMetrics {
    /// Creates a fresh registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one completed operation.
    pub fn observe(&self, attempts: u32, recovered: bool, duration: Duration) {
        self.attempts.fetch_add(u64::from(attempts), Ordering::Relaxed);
        if recovered {
            self.successes_after_retry.fetch_add(1, Ordering::Relaxed);
        }
        self.total_duration_ms
            .fetch_add(duration.as_millis() as u64, Ordering::Relaxed);
    }

    /// Renders the registry as JSON.
    #[must_use]
    pub fn snapshot(&self) -> serde_json::Value {
        serde_json::json!({
            "retry_attempts_total": self.attempts.load(Ordering::Relaxed),
            "retry_success_total": self.successes_after_retry.load(Ordering::Relaxed),
            "retry_exhausted_total": self.exhausted.load(Ordering::Relaxed),
            "retry_duration_ms_total": self.total_duration_ms.load(Ordering::Relaxed),
        })
    }
}

/// Per-endpoint latency and error tallies.
#[derive(Debug, Default)]
pub struct EndpointStats {
    /// Requests issued.
    pub requests: AtomicU64,
    /// Requests that returned an error.
    pub errors: AtomicU64,
    /// Total latency across requests, in milliseconds.
    pub total_latency_ms: AtomicU64,
}

/// Counters for the pooled client and its connection pool.
#[derive(Debug, Default)]
pub struct PoolMetrics {
    /// Connections opened.
    pub created: AtomicU64,
    /// Checkouts satisfied by an idle pooled connection.
    pub reused: AtomicU64,
    /// Idle connections evicted past the keep-alive window.
    pub evicted: AtomicU64,
    /// Credential refreshes attempted on authorization failure.
    pub auth_refreshes: AtomicU64,
    /// Per-endpoint request/error/latency tallies.
    pub endpoints: DashMap<String, EndpointStats>,
}

impl PoolMetrics {
    /// Creates a fresh registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one request against an endpoint.
    pub fn observe_request(&self, endpoint: &str, latency: Duration, ok: bool) {
        let stats = self.endpoints.entry(endpoint.to_string()).or_default();
        stats.requests.fetch_add(1, Ordering::Relaxed);
        if !ok {
            stats.errors.fetch_add(1, Ordering::Relaxed);
        }
        stats
            .total_latency_ms
            .fetch_add(latency.as_millis() as u64, Ordering::Relaxed);
    }

    /// Renders the registry as JSON.
    #[must_use]
    pub fn snapshot(&self) -> serde_json::Value {
        let endpoints: serde_json::Map<String, serde_json::Value> = self
            .endpoints
            .iter()
            .map(|entry| {
                let stats = entry.value();
                (
                    entry.key().clone(),
                    serde_json::json!({
                        "requests_total": stats.requests.load(Ordering::Relaxed),
                        "errors_total": stats.errors.load(Ordering::Relaxed),
                        "latency_ms_total": stats.total_latency_ms.load(Ordering::Relaxed),
                    }),
                )
            })
            .collect();

        serde_json::json!({
            "connections_created_total": self.created.load(Ordering::Relaxed),
            "connections_reused_total": self.reused.load(Ordering::Relaxed),
            "connections_evicted_total": self.evicted.load(Ordering::Relaxed),
            "auth_refreshes_total": self.auth_refreshes.load(Ordering::Relaxed),
            "endpoints": endpoints,
        })
    }
}

/// Counters for the parallel collector.
#[derive(Debug, Default)]
pub struct CollectorMetrics {
    /// Cache lookups that hit.
    pub cache_hits: AtomicU64,
    /// Cache lookups that missed (including expired entries).
    pub cache_misses: AtomicU64,
    /// Per-source fetch failures absorbed into `ok = false` results.
    pub source_errors: AtomicU64,
    /// Items collected (cache hits included).
    pub items_collected: AtomicU64,
    /// Cache writes that failed and were swallowed.
    pub cache_write_failures: AtomicU64,
}

impl CollectorMetrics {
    /// Creates a fresh registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Renders the registry as JSON.
    #[must_use]
    pub fn snapshot(&self) -> serde_json::Value {
        serde_json::json!({
            "cache_hits_total": self.cache_hits.load(Ordering::Relaxed),
            "cache_misses_total": self.cache_misses.load(Ordering::Relaxed),
            "collection_errors_total": self.source_errors.load(Ordering::Relaxed),
            "items_collected_total": self.items_collected.load(Ordering::Relaxed),
            "cache_write_failures_total": self.cache_write_failures.load(Ordering::Relaxed),
        })
    }
}

/// Counters for the staged pipeline workers.
#[derive(Debug, Default)]
pub struct PipelineMetrics {
    /// Messages processed successfully, across stages.
    pub processed: AtomicU64,
    /// Messages diverted to the dead-letter topic.
    pub dead_lettered: AtomicU64,
    /// Empty polls (topic had nothing within the poll timeout).
    pub idle_polls: AtomicU64,
}

impl PipelineMetrics {
    /// Creates a fresh registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Renders the registry as JSON.
    #[must_use]
    pub fn snapshot(&self) -> serde_json::Value {
        serde_json::json!({
            "messages_processed_total": self.processed.load(Ordering::Relaxed),
            "messages_dead_lettered_total": self.dead_lettered.load(Ordering::Relaxed),
            "idle_polls_total": self.idle_polls.load(Ordering::Relaxed),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_metrics_observe() {
        let metrics = RetryMetrics::new();
        metrics.observe(3, true, Duration::from_millis(250));
        metrics.observe(1, false, Duration::from_millis(50));

        assert_eq!(metrics.attempts.load(Ordering::Relaxed), 4);
        assert_eq!(metrics.successes_after_retry.load(Ordering::Relaxed), 1);
        assert_eq!(metrics.total_duration_ms.load(Ordering::Relaxed), 300);
    }

    #[test]
    fn test_pool_metrics_per_endpoint() {
        let metrics = PoolMetrics::new();
        metrics.observe_request("api.example.com/search", Duration::from_millis(80), true);
        metrics.observe_request("api.example.com/search", Duration::from_millis(120), false);

        let snapshot = metrics.snapshot();
        let endpoint = &snapshot["endpoints"]["api.example.com/search"];
        assert_eq!(endpoint["requests_total"], 2);
        assert_eq!(endpoint["errors_total"], 1);
        assert_eq!(endpoint["latency_ms_total"], 200);
    }

    #[test]
    fn test_collector_snapshot_names() {
        let metrics = CollectorMetrics::new();
        metrics.cache_hits.fetch_add(2, Ordering::Relaxed);
        let snapshot = metrics.snapshot();
        assert_eq!(snapshot["cache_hits_total"], 2);
        assert_eq!(snapshot["cache_misses_total"], 0);
    }
}
