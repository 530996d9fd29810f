//! # Profileflow
//!
//! A multi-stage, partial-failure-tolerant collection and enrichment
//! pipeline for profile records (a person plus their employer).
//!
//! Data flows `raw -> extraction -> enrichment -> validation` over a
//! persistent queue, with a dead-letter divert from every stage:
//!
//! - **Staged pipeline**: one consumer group per stage running an
//!   explicit poll → transform → produce → commit state machine, so
//!   at-least-once delivery is a visible invariant rather than an
//!   accident of loop structure.
//! - **Parallel collector**: bounded-concurrency fan-out across many
//!   slow, rate-limited upstream sources, with per-item caching and
//!   per-source failure absorption.
//! - **Enrichment merger**: deterministic, precedence-ordered conflict
//!   resolution with per-field provenance.
//! - **Retry executor**: bounded attempts with exponential backoff and
//!   a caller-supplied retryability classification.
//! - **Pooled client**: capped reusable connections with keep-alive
//!   eviction and single-shot credential refresh on auth failure.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use profileflow::prelude::*;
//!
//! let config = ProfileflowConfig::new();
//! let broker: Arc<dyn MessageBroker> = Arc::new(InMemoryBroker::new());
//! let collector = Arc::new(ParallelCollector::new(
//!     config.collector.clone(),
//!     sources,
//!     cache,
//!     Merger::new(config.merge.clone()),
//!     RetryExecutor::new(config.retry.clone()),
//! ));
//!
//! let pipeline = StagedPipeline::new(broker, &config, collector).await?;
//! pipeline.producer().produce_raw(&item).await?;
//! pipeline.run(shutdown).await?;
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod cache;
pub mod client;
pub mod collect;
pub mod config;
pub mod core;
pub mod errors;
pub mod merge;
pub mod metrics;
pub mod observability;
pub mod pipeline;
pub mod retry;
pub mod shutdown;
pub mod testing;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::cache::{cache_key, CacheEntry, CacheStore, InMemoryCacheStore};
    pub use crate::client::{
        ClientError, Method, PooledClient, Request, RequestOptions, Response, TokenRefresher,
        Transport,
    };
    pub use crate::collect::{HttpSource, ParallelCollector, Source};
    pub use crate::config::{
        CollectorConfig, ConsumerGroupConfig, PoolConfig, ProfileflowConfig, TopicConfig,
        ValidationRules,
    };
    pub use crate::core::{
        EnrichedRecord, FailureRecord, ProcessingStage, ProfileQuery, SourceId, SourceResult,
        WorkItem,
    };
    pub use crate::errors::{
        CollectError, PipelineError, RetryClass, RetryExhausted, StageFailure,
    };
    pub use crate::merge::{MergePolicy, Merger};
    pub use crate::pipeline::{
        AuditEvent, Consumer, EnrichmentStage, ExtractionStage, InMemoryBroker, MessageBroker,
        PipelineProducer, StagedPipeline, StageTransform, StageWorker, ValidationStage,
        WorkerTick,
    };
    pub use crate::retry::{Backoff, Jitter, RetryExecutor, RetryPolicy};
    pub use crate::shutdown::ShutdownToken;
}

#[cfg(test)]
mod tests {
    #[test]
    fn library_compiles() {
        assert!(true);
    }
}
