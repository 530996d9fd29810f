//! Typed production of work items, failures, and audit events.

use super::broker::MessageBroker;
use crate::config::TopicConfig;
use crate::core::{FailureRecord, WorkItem};
use crate::errors::PipelineError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// One audit-log message; every stage transition produces exactly one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    /// Event type, e.g. `extraction_succeeded`.
    pub event_type: String,
    /// Event-specific data.
    pub event_data: serde_json::Value,
    /// When the event was recorded.
    pub timestamp: DateTime<Utc>,
}

impl AuditEvent {
    /// Creates an audit event stamped now.
    #[must_use]
    pub fn new(event_type: impl Into<String>, event_data: serde_json::Value) -> Self {
        Self {
            event_type: event_type.into(),
            event_data,
            timestamp: Utc::now(),
        }
    }
}

/// Serializes pipeline values onto broker topics.
#[derive(Clone)]
pub struct PipelineProducer {
    broker: Arc<dyn MessageBroker>,
    topics: TopicConfig,
}

impl PipelineProducer {
    /// Creates a producer over a broker.
    #[must_use]
    pub fn new(broker: Arc<dyn MessageBroker>, topics: TopicConfig) -> Self {
        Self { broker, topics }
    }

    /// The topic configuration.
    #[must_use]
    pub fn topics(&self) -> &TopicConfig {
        &self.topics
    }

    /// Produces a work item to a topic, keyed by item id.
    pub async fn produce_item(&self, topic: &str, item: &WorkItem) -> Result<(), PipelineError> {
        let payload = serde_json::to_vec(item)?;
        self.broker.produce(topic, Some(&item.id), &payload).await
    }

    /// Produces a raw item to the ingestion topic with an audit entry.
    pub async fn produce_raw(&self, item: &WorkItem) -> Result<(), PipelineError> {
        let topic = self.topics.raw.clone();
        self.produce_item(&topic, item).await?;
        self.produce_audit(
            "raw_produced",
            serde_json::json!({ "item_id": item.id, "status": "success" }),
        )
        .await
    }

    /// Produces a failure record to the dead-letter topic.
    pub async fn produce_failure(&self, record: &FailureRecord) -> Result<(), PipelineError> {
        let payload = serde_json::to_vec(record)?;
        self.broker
            .produce(&self.topics.failed, Some(&record.item_id), &payload)
            .await
    }

    /// Produces one audit event.
    pub async fn produce_audit(
        &self,
        event_type: &str,
        event_data: serde_json::Value,
    ) -> Result<(), PipelineError> {
        let event = AuditEvent::new(event_type, event_data);
        let payload = serde_json::to_vec(&event)?;
        self.broker.produce(&self.topics.audit, None, &payload).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::broker::InMemoryBroker;
    use crate::testing::raw_work_item;

    #[tokio::test]
    async fn test_produce_raw_writes_item_and_audit() {
        let broker = Arc::new(InMemoryBroker::new());
        let topics = TopicConfig::default();
        let producer = PipelineProducer::new(
            Arc::clone(&broker) as Arc<dyn MessageBroker>,
            topics.clone(),
        );

        producer.produce_raw(&raw_work_item("p1")).await.unwrap();

        assert_eq!(broker.topic_len(&topics.raw), 1);
        assert_eq!(broker.topic_len(&topics.audit), 1);

        let audit = broker.messages(&topics.audit);
        let event: AuditEvent = serde_json::from_slice(&audit[0].payload).unwrap();
        assert_eq!(event.event_type, "raw_produced");
        assert_eq!(event.event_data["item_id"], "p1");
    }

    #[tokio::test]
    async fn test_produce_failure_keyed_by_item() {
        let broker = Arc::new(InMemoryBroker::new());
        let topics = TopicConfig::default();
        let producer = PipelineProducer::new(
            Arc::clone(&broker) as Arc<dyn MessageBroker>,
            topics.clone(),
        );

        let record = FailureRecord::new("extraction", "p1", serde_json::json!({}), "bad html");
        producer.produce_failure(&record).await.unwrap();

        let failed = broker.messages(&topics.failed);
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].key.as_deref(), Some("p1"));
    }
}
