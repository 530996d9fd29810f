//! Typed configuration for the pipeline and its components.
//!
//! Everything here is a plain serde value object with builder-style
//! setters, so deployments can load one JSON document and hand each
//! component its slice. No component reads ambient global state.

use crate::merge::MergePolicy;
use crate::retry::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Topic names for each stage boundary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicConfig {
    /// Ingested, unparsed payloads.
    pub raw: String,
    /// Output of the extraction stage.
    pub extracted: String,
    /// Output of the enrichment stage.
    pub enriched: String,
    /// Terminal topic for items that passed validation.
    pub validated: String,
    /// Dead-letter topic for failed transforms.
    pub failed: String,
    /// Audit log of every transition.
    pub audit: String,
}

impl Default for TopicConfig {
    fn default() -> Self {
        Self {
            raw: "raw-profile-data".to_string(),
            extracted: "extracted-profile-data".to_string(),
            enriched: "enriched-profile-data".to_string(),
            validated: "validated-profile-data".to_string(),
            failed: "failed-processing-data".to_string(),
            audit: "pipeline-audit-logs".to_string(),
        }
    }
}

/// Consumer group ids, one per stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsumerGroupConfig {
    /// Group for the extraction stage.
    pub extraction: String,
    /// Group for the enrichment stage.
    pub enrichment: String,
    /// Group for the validation stage.
    pub validation: String,
}

impl Default for ConsumerGroupConfig {
    fn default() -> Self {
        Self {
            extraction: "profile-extraction-group".to_string(),
            enrichment: "profile-enrichment-group".to_string(),
            validation: "profile-validation-group".to_string(),
        }
    }
}

/// Concurrency and caching knobs for the parallel collector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectorConfig {
    /// Items collected concurrently within one batch.
    pub max_concurrent_items: usize,
    /// Source fetches in flight concurrently for one item.
    pub max_concurrent_sources: usize,
    /// Cache TTL for collected records, in seconds.
    pub cache_ttl_secs: u64,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            max_concurrent_items: 5,
            max_concurrent_sources: 4,
            cache_ttl_secs: 3600,
        }
    }
}

impl CollectorConfig {
    /// Cache TTL as a [`Duration`].
    #[must_use]
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    /// Sets the item-level concurrency bound.
    #[must_use]
    pub fn with_max_concurrent_items(mut self, n: usize) -> Self {
        self.max_concurrent_items = n;
        self
    }

    /// Sets the source-level concurrency bound.
    #[must_use]
    pub fn with_max_concurrent_sources(mut self, n: usize) -> Self {
        self.max_concurrent_sources = n;
        self
    }

    /// Sets the cache TTL.
    #[must_use]
    pub fn with_cache_ttl_secs(mut self, secs: u64) -> Self {
        self.cache_ttl_secs = secs;
        self
    }
}

/// Connection pool and client knobs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Connection cap across all targets.
    pub max_connections: usize,
    /// Idle window after which a connection is evicted, in milliseconds.
    pub keep_alive_ms: u64,
    /// Background sweep interval, in milliseconds.
    pub sweep_interval_ms: u64,
    /// Per-request timeout, in milliseconds.
    pub request_timeout_ms: u64,
    /// How long a caller may wait for pool capacity, in milliseconds.
    pub acquire_timeout_ms: u64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connections: 10,
            keep_alive_ms: 30_000,
            sweep_interval_ms: 60_000,
            request_timeout_ms: 30_000,
            acquire_timeout_ms: 10_000,
        }
    }
}

impl PoolConfig {
    /// Keep-alive window as a [`Duration`].
    #[must_use]
    pub fn keep_alive(&self) -> Duration {
        Duration::from_millis(self.keep_alive_ms)
    }

    /// Sweep interval as a [`Duration`].
    #[must_use]
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms)
    }

    /// Request timeout as a [`Duration`].
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Acquire timeout as a [`Duration`].
    #[must_use]
    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_millis(self.acquire_timeout_ms)
    }

    /// Sets the connection cap.
    #[must_use]
    pub fn with_max_connections(mut self, n: usize) -> Self {
        self.max_connections = n;
        self
    }

    /// Sets the keep-alive window.
    #[must_use]
    pub fn with_keep_alive_ms(mut self, ms: u64) -> Self {
        self.keep_alive_ms = ms;
        self
    }

    /// Sets the sweep interval.
    #[must_use]
    pub fn with_sweep_interval_ms(mut self, ms: u64) -> Self {
        self.sweep_interval_ms = ms;
        self
    }

    /// Sets the per-request timeout.
    #[must_use]
    pub fn with_request_timeout_ms(mut self, ms: u64) -> Self {
        self.request_timeout_ms = ms;
        self
    }
}

/// Rules the validation stage enforces.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationRules {
    /// Fields that must be present and non-empty.
    pub required_fields: Vec<String>,
    /// Fields that must parse as ISO-8601 timestamps when present.
    pub date_fields: Vec<String>,
    /// Fields that must be numeric when present.
    pub numeric_fields: Vec<String>,
}

impl Default for ValidationRules {
    fn default() -> Self {
        Self {
            required_fields: vec![
                "name".to_string(),
                "location".to_string(),
                "skills".to_string(),
            ],
            date_fields: vec![
                "start_date".to_string(),
                "end_date".to_string(),
                "birth_date".to_string(),
            ],
            numeric_fields: vec![
                "confidence_score".to_string(),
                "risk_score".to_string(),
            ],
        }
    }
}

impl ValidationRules {
    /// Replaces the required field list.
    #[must_use]
    pub fn with_required_fields(mut self, fields: Vec<String>) -> Self {
        self.required_fields = fields;
        self
    }
}

/// Poll timeout for stage consumers, in milliseconds.
fn default_poll_timeout_ms() -> u64 {
    1000
}

/// Aggregate configuration for a pipeline deployment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileflowConfig {
    /// Topic names.
    #[serde(default)]
    pub topics: TopicConfig,
    /// Consumer group ids.
    #[serde(default)]
    pub groups: ConsumerGroupConfig,
    /// Collector knobs.
    #[serde(default)]
    pub collector: CollectorConfig,
    /// Pool and client knobs.
    #[serde(default)]
    pub pool: PoolConfig,
    /// Default retry policy for source fetches.
    #[serde(default)]
    pub retry: RetryPolicy,
    /// Merge precedence.
    #[serde(default)]
    pub merge: MergePolicy,
    /// Validation stage rules.
    #[serde(default)]
    pub validation: ValidationRules,
    /// Consumer poll timeout, in milliseconds.
    #[serde(default = "default_poll_timeout_ms")]
    pub poll_timeout_ms: u64,
}

impl Default for ProfileflowConfig {
    fn default() -> Self {
        Self {
            topics: TopicConfig::default(),
            groups: ConsumerGroupConfig::default(),
            collector: CollectorConfig::default(),
            pool: PoolConfig::default(),
            retry: RetryPolicy::default(),
            merge: MergePolicy::default(),
            validation: ValidationRules::default(),
            poll_timeout_ms: default_poll_timeout_ms(),
        }
    }
}

impl ProfileflowConfig {
    /// Creates the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Consumer poll timeout as a [`Duration`].
    #[must_use]
    pub fn poll_timeout(&self) -> Duration {
        Duration::from_millis(self.poll_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_defaults_are_sane() {
        let config = ProfileflowConfig::new();
        assert_eq!(config.collector.max_concurrent_items, 5);
        assert_eq!(config.collector.cache_ttl(), Duration::from_secs(3600));
        assert_eq!(config.pool.sweep_interval(), Duration::from_secs(60));
        assert_eq!(config.topics.failed, "failed-processing-data");
    }

    #[test]
    fn test_serde_round_trip() {
        let config = ProfileflowConfig::new();
        let encoded = serde_json::to_string(&config).unwrap();
        let decoded: ProfileflowConfig = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded, config);
    }

    #[test]
    fn test_partial_document_fills_defaults() {
        let decoded: ProfileflowConfig =
            serde_json::from_str(r#"{"collector": {"max_concurrent_items": 2, "max_concurrent_sources": 4, "cache_ttl_secs": 60}}"#)
                .unwrap();
        assert_eq!(decoded.collector.max_concurrent_items, 2);
        assert_eq!(decoded.pool.max_connections, 10);
    }

    #[test]
    fn test_builders() {
        let collector = CollectorConfig::default()
            .with_max_concurrent_items(8)
            .with_cache_ttl_secs(120);
        assert_eq!(collector.max_concurrent_items, 8);
        assert_eq!(collector.cache_ttl(), Duration::from_secs(120));

        let pool = PoolConfig::default()
            .with_max_connections(2)
            .with_keep_alive_ms(1000);
        assert_eq!(pool.max_connections, 2);
        assert_eq!(pool.keep_alive(), Duration::from_secs(1));
    }
}
