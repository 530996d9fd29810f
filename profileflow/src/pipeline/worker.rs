//! The stage worker: an explicit poll → transform → produce → commit
//! state machine.
//!
//! Producing before committing is the at-least-once contract: a crash
//! between the two reprocesses one message harmlessly; a crash before
//! produce moves nothing. Transform failures become dead-letter records
//! and the offset is committed anyway — a poison message never blocks
//! its consumer group. Only broker failures escape the loop.

use super::broker::{Consumer, MessageBroker};
use super::producer::PipelineProducer;
use super::stage::StageTransform;
use crate::core::{FailureRecord, WorkItem};
use crate::errors::PipelineError;
use crate::metrics::PipelineMetrics;
use crate::shutdown::ShutdownToken;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// What one state-machine step did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerTick {
    /// Nothing was waiting on the input topic.
    Idle,
    /// One message was transformed and produced downstream.
    Processed,
    /// One message was diverted to the dead-letter topic.
    DeadLettered,
}

/// A consumer loop for one pipeline stage.
pub struct StageWorker {
    transform: Arc<dyn StageTransform>,
    consumer: Box<dyn Consumer>,
    producer: PipelineProducer,
    output_topic: String,
    poll_timeout: Duration,
    metrics: Arc<PipelineMetrics>,
}

impl StageWorker {
    /// Subscribes a worker to its input topic.
    pub async fn subscribe(
        broker: &Arc<dyn MessageBroker>,
        transform: Arc<dyn StageTransform>,
        producer: PipelineProducer,
        input_topic: &str,
        output_topic: &str,
        group: &str,
        poll_timeout: Duration,
        metrics: Arc<PipelineMetrics>,
    ) -> Result<Self, PipelineError> {
        let consumer = broker.subscribe(input_topic, group).await?;
        Ok(Self {
            transform,
            consumer,
            producer,
            output_topic: output_topic.to_string(),
            poll_timeout,
            metrics,
        })
    }

    /// Runs the loop until shutdown. Broker errors propagate; the
    /// process should restart and resume from committed offsets.
    pub async fn run(&mut self, shutdown: &ShutdownToken) -> Result<(), PipelineError> {
        while !shutdown.is_triggered() {
            self.tick().await?;
        }
        debug!(stage = self.transform.name(), "worker stopped");
        Ok(())
    }

    /// One state-machine step: poll, transform, produce, commit.
    pub async fn tick(&mut self) -> Result<WorkerTick, PipelineError> {
        let Some(message) = self.consumer.poll(self.poll_timeout).await? else {
            self.metrics.idle_polls.fetch_add(1, Ordering::Relaxed);
            return Ok(WorkerTick::Idle);
        };

        let item: WorkItem = match serde_json::from_slice(&message.payload) {
            Ok(item) => item,
            Err(e) => {
                // A payload that does not even decode cannot be
                // transformed; dead-letter it under the message key.
                let item_id = message.key.as_deref().unwrap_or("unknown").to_string();
                warn!(
                    stage = self.transform.name(),
                    item_id, error = %e, "undecodable message, dead-lettering"
                );
                return self
                    .divert(
                        &item_id,
                        serde_json::json!({
                            "raw": String::from_utf8_lossy(&message.payload),
                        }),
                        &format!("payload failed to decode: {e}"),
                    )
                    .await;
            }
        };

        match self.transform.apply(&item).await {
            Ok(next) => {
                self.producer.produce_item(&self.output_topic, &next).await?;
                self.producer
                    .produce_audit(
                        &format!("{}_succeeded", self.transform.name()),
                        serde_json::json!({
                            "item_id": next.id,
                            "from": item.stage,
                            "to": next.stage,
                        }),
                    )
                    .await?;
                self.consumer.commit().await?;
                self.metrics.processed.fetch_add(1, Ordering::Relaxed);
                Ok(WorkerTick::Processed)
            }
            Err(failure) => {
                warn!(
                    stage = self.transform.name(),
                    item_id = %failure.item_id,
                    reason = %failure.reason,
                    "transform failed, dead-lettering"
                );
                self.divert(&item.id, item.payload.clone(), &failure.reason)
                    .await
            }
        }
    }

    /// Produces a dead-letter record plus its audit entry, then commits.
    async fn divert(
        &mut self,
        item_id: &str,
        payload: serde_json::Value,
        error: &str,
    ) -> Result<WorkerTick, PipelineError> {
        let record = FailureRecord::new(self.transform.name(), item_id, payload, error);
        self.producer.produce_failure(&record).await?;
        self.producer
            .produce_audit(
                &format!("{}_failed", self.transform.name()),
                serde_json::json!({
                    "item_id": item_id,
                    "error": error,
                }),
            )
            .await?;
        self.consumer.commit().await?;
        self.metrics.dead_lettered.fetch_add(1, Ordering::Relaxed);
        Ok(WorkerTick::DeadLettered)
    }
}
