//! The staged message pipeline.
//!
//! `Raw -> Extracted -> Enriched -> Validated` with a `Failed` divert
//! from any stage, each boundary a broker topic, each stage a consumer
//! group running the poll → transform → produce → commit state machine.

mod broker;
mod producer;
mod stage;
mod worker;

pub use broker::{Consumer, InMemoryBroker, MessageBroker, PolledMessage, StoredMessage};
pub use producer::{AuditEvent, PipelineProducer};
pub use stage::{EnrichmentStage, ExtractionStage, StageTransform, ValidationStage};
pub use worker::{StageWorker, WorkerTick};

use crate::collect::ParallelCollector;
use crate::config::ProfileflowConfig;
use crate::errors::PipelineError;
use crate::metrics::PipelineMetrics;
use crate::shutdown::ShutdownToken;
use std::sync::Arc;

/// Wires the three stage workers over one broker and collector.
pub struct StagedPipeline {
    extraction: StageWorker,
    enrichment: StageWorker,
    validation: StageWorker,
    producer: PipelineProducer,
    metrics: Arc<PipelineMetrics>,
}

impl StagedPipeline {
    /// Subscribes all three stage workers.
    pub async fn new(
        broker: Arc<dyn MessageBroker>,
        config: &ProfileflowConfig,
        collector: Arc<ParallelCollector>,
    ) -> Result<Self, PipelineError> {
        let metrics = Arc::new(PipelineMetrics::new());
        let producer = PipelineProducer::new(Arc::clone(&broker), config.topics.clone());
        let poll_timeout = config.poll_timeout();

        let extraction = StageWorker::subscribe(
            &broker,
            Arc::new(ExtractionStage::new()),
            producer.clone(),
            &config.topics.raw,
            &config.topics.extracted,
            &config.groups.extraction,
            poll_timeout,
            Arc::clone(&metrics),
        )
        .await?;

        let enrichment = StageWorker::subscribe(
            &broker,
            Arc::new(EnrichmentStage::new(collector)),
            producer.clone(),
            &config.topics.extracted,
            &config.topics.enriched,
            &config.groups.enrichment,
            poll_timeout,
            Arc::clone(&metrics),
        )
        .await?;

        let validation = StageWorker::subscribe(
            &broker,
            Arc::new(ValidationStage::new(config.validation.clone())),
            producer.clone(),
            &config.topics.enriched,
            &config.topics.validated,
            &config.groups.validation,
            poll_timeout,
            Arc::clone(&metrics),
        )
        .await?;

        Ok(Self {
            extraction,
            enrichment,
            validation,
            producer,
            metrics,
        })
    }

    /// The producer for feeding raw items into the pipeline.
    #[must_use]
    pub fn producer(&self) -> &PipelineProducer {
        &self.producer
    }

    /// The pipeline metrics registry.
    #[must_use]
    pub fn metrics(&self) -> &Arc<PipelineMetrics> {
        &self.metrics
    }

    /// Runs one tick of every stage, extraction first.
    ///
    /// Useful for tests and single-threaded drains; production runs
    /// [`StagedPipeline::run`] instead.
    pub async fn tick_all(&mut self) -> Result<[WorkerTick; 3], PipelineError> {
        Ok([
            self.extraction.tick().await?,
            self.enrichment.tick().await?,
            self.validation.tick().await?,
        ])
    }

    /// Runs all three stage loops concurrently until shutdown.
    pub async fn run(mut self, shutdown: ShutdownToken) -> Result<(), PipelineError> {
        let (extraction, enrichment, validation) = tokio::join!(
            self.extraction.run(&shutdown),
            self.enrichment.run(&shutdown),
            self.validation.run(&shutdown),
        );
        extraction?;
        enrichment?;
        validation?;
        Ok(())
    }
}

#[cfg(test)]
mod integration_tests;
