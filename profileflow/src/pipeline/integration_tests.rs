//! End-to-end pipeline tests over the in-memory broker.

use super::*;
use crate::cache::InMemoryCacheStore;
use crate::collect::{ParallelCollector, Source};
use crate::config::ProfileflowConfig;
use crate::core::{FailureRecord, ProcessingStage, SourceId, WorkItem};
use crate::errors::{CollectError, StageFailure};
use crate::merge::{MergePolicy, Merger};
use crate::retry::{RetryExecutor, RetryPolicy};
use crate::testing::{raw_work_item, FailingSource, StaticSource};
use async_trait::async_trait;
use pretty_assertions::assert_eq;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

fn test_config() -> ProfileflowConfig {
    let mut config = ProfileflowConfig::new();
    config.poll_timeout_ms = 20;
    config.retry = RetryPolicy::new()
        .with_max_attempts(2)
        .with_base_delay_ms(1)
        .with_max_delay_ms(2);
    config
}

fn test_collector(config: &ProfileflowConfig, sources: Vec<Arc<dyn Source>>) -> Arc<ParallelCollector> {
    Arc::new(ParallelCollector::new(
        config.collector.clone(),
        sources,
        Arc::new(InMemoryCacheStore::new()),
        Merger::new(MergePolicy::default()),
        RetryExecutor::new(config.retry.clone()),
    ))
}

fn happy_sources() -> Vec<Arc<dyn Source>> {
    vec![
        Arc::new(StaticSource::with_field(
            SourceId::Hunter,
            "email_verified",
            json!(true),
        )),
        Arc::new(StaticSource::with_field(
            SourceId::PeopleDataLabs,
            "seniority",
            json!("executive"),
        )),
    ]
}

async fn drain(pipeline: &mut StagedPipeline) {
    // Enough rounds for every stage to see every message; idle ticks
    // are cheap at the test poll timeout.
    for _ in 0..6 {
        pipeline.tick_all().await.unwrap();
    }
}

#[tokio::test]
async fn test_raw_items_flow_to_validated() -> anyhow::Result<()> {
    let config = test_config();
    let broker = Arc::new(InMemoryBroker::new());
    let collector = test_collector(&config, happy_sources());

    let mut pipeline = StagedPipeline::new(
        Arc::clone(&broker) as Arc<dyn MessageBroker>,
        &config,
        collector,
    )
    .await?;

    for id in ["p1", "p2", "p3"] {
        pipeline.producer().produce_raw(&raw_work_item(id)).await?;
    }

    drain(&mut pipeline).await;

    assert_eq!(broker.topic_len(&config.topics.validated), 3);
    assert_eq!(broker.topic_len(&config.topics.failed), 0);

    let validated = broker.messages(&config.topics.validated);
    let item: WorkItem = serde_json::from_slice(&validated[0].payload)?;
    assert_eq!(item.stage, ProcessingStage::Validated);
    let payload = item.payload_object().unwrap();
    assert_eq!(payload["email_verified"], json!(true));
    assert_eq!(payload["seniority"], json!("executive"));
    assert_eq!(payload["enrichment"]["sources"], json!(["hunter", "peopledatalabs"]));
    Ok(())
}

#[tokio::test]
async fn test_enrichment_survives_a_dead_source() {
    let config = test_config();
    let broker = Arc::new(InMemoryBroker::new());
    let mut sources = happy_sources();
    sources.push(Arc::new(FailingSource::new(
        SourceId::LinkedIn,
        CollectError::transient("upstream down"),
    )));
    let collector = test_collector(&config, sources);

    let mut pipeline = StagedPipeline::new(
        Arc::clone(&broker) as Arc<dyn MessageBroker>,
        &config,
        collector,
    )
    .await
    .unwrap();

    pipeline.producer().produce_raw(&raw_work_item("p1")).await.unwrap();
    drain(&mut pipeline).await;

    assert_eq!(broker.topic_len(&config.topics.validated), 1);
    let validated = broker.messages(&config.topics.validated);
    let item: WorkItem = serde_json::from_slice(&validated[0].payload).unwrap();
    let sources = item.payload_object().unwrap()["enrichment"]["sources"]
        .as_array()
        .unwrap()
        .len();
    assert_eq!(sources, 2);
}

#[tokio::test]
async fn test_validation_failure_dead_letters_with_audit() {
    let config = test_config();
    let broker = Arc::new(InMemoryBroker::new());
    let collector = test_collector(&config, happy_sources());

    let mut pipeline = StagedPipeline::new(
        Arc::clone(&broker) as Arc<dyn MessageBroker>,
        &config,
        collector,
    )
    .await
    .unwrap();

    // No location/skills: extraction and enrichment pass, validation
    // rejects.
    let item = WorkItem::new("bad-1", json!({"full_name": "No Body", "email": "no@body.example"}));
    pipeline.producer().produce_raw(&item).await.unwrap();
    drain(&mut pipeline).await;

    assert_eq!(broker.topic_len(&config.topics.validated), 0);
    assert_eq!(broker.topic_len(&config.topics.failed), 1);

    let failed = broker.messages(&config.topics.failed);
    let record: FailureRecord = serde_json::from_slice(&failed[0].payload).unwrap();
    assert_eq!(record.stage, "validation");
    assert_eq!(record.item_id, "bad-1");
    assert!(record.error.contains("location"));

    let audits = broker.messages(&config.topics.audit);
    let failure_audits: Vec<AuditEvent> = audits
        .iter()
        .map(|m| serde_json::from_slice::<AuditEvent>(&m.payload).unwrap())
        .filter(|e| e.event_type == "validation_failed")
        .collect();
    assert_eq!(failure_audits.len(), 1);
    assert_eq!(failure_audits[0].event_data["item_id"], "bad-1");
}

/// A transform that always throws, for dead-letter accounting.
struct AlwaysFailingTransform;

#[async_trait]
impl StageTransform for AlwaysFailingTransform {
    fn name(&self) -> &'static str {
        "extraction"
    }

    fn output_stage(&self) -> ProcessingStage {
        ProcessingStage::Extracted
    }

    async fn apply(&self, item: &WorkItem) -> Result<WorkItem, StageFailure> {
        Err(StageFailure::new("extraction", &item.id, "always fails"))
    }
}

#[tokio::test]
async fn test_always_failing_transform_produces_exactly_one_dead_letter() {
    let config = test_config();
    let broker = Arc::new(InMemoryBroker::new());
    let dyn_broker: Arc<dyn MessageBroker> = Arc::clone(&broker) as Arc<dyn MessageBroker>;
    let producer = PipelineProducer::new(Arc::clone(&dyn_broker), config.topics.clone());

    let mut worker = StageWorker::subscribe(
        &dyn_broker,
        Arc::new(AlwaysFailingTransform),
        producer.clone(),
        &config.topics.raw,
        &config.topics.extracted,
        &config.groups.extraction,
        Duration::from_millis(20),
        Arc::new(crate::metrics::PipelineMetrics::new()),
    )
    .await
    .unwrap();

    producer
        .produce_item(&config.topics.raw, &raw_work_item("p1"))
        .await
        .unwrap();

    assert_eq!(worker.tick().await.unwrap(), WorkerTick::DeadLettered);
    // The offset was committed: nothing is redelivered.
    assert_eq!(worker.tick().await.unwrap(), WorkerTick::Idle);

    assert_eq!(broker.topic_len(&config.topics.failed), 1);
    assert_eq!(broker.topic_len(&config.topics.extracted), 0);

    let failure_audits = broker
        .messages(&config.topics.audit)
        .iter()
        .map(|m| serde_json::from_slice::<AuditEvent>(&m.payload).unwrap())
        .filter(|e| e.event_type == "extraction_failed")
        .count();
    assert_eq!(failure_audits, 1);
}

#[tokio::test]
async fn test_undecodable_message_is_dead_lettered_not_fatal() {
    let config = test_config();
    let broker = Arc::new(InMemoryBroker::new());
    let dyn_broker: Arc<dyn MessageBroker> = Arc::clone(&broker) as Arc<dyn MessageBroker>;
    let producer = PipelineProducer::new(Arc::clone(&dyn_broker), config.topics.clone());

    let mut worker = StageWorker::subscribe(
        &dyn_broker,
        Arc::new(ExtractionStage::new()),
        producer,
        &config.topics.raw,
        &config.topics.extracted,
        &config.groups.extraction,
        Duration::from_millis(20),
        Arc::new(crate::metrics::PipelineMetrics::new()),
    )
    .await
    .unwrap();

    broker
        .produce(&config.topics.raw, Some("junk-1"), b"{ not json")
        .await
        .unwrap();

    assert_eq!(worker.tick().await.unwrap(), WorkerTick::DeadLettered);
    assert_eq!(broker.topic_len(&config.topics.failed), 1);
    // Committed: the poison message is not redelivered.
    assert_eq!(worker.tick().await.unwrap(), WorkerTick::Idle);
}

#[tokio::test]
async fn test_crash_before_commit_reprocesses_harmlessly() {
    let config = test_config();
    let broker = Arc::new(InMemoryBroker::new());
    let dyn_broker: Arc<dyn MessageBroker> = Arc::clone(&broker) as Arc<dyn MessageBroker>;
    let producer = PipelineProducer::new(Arc::clone(&dyn_broker), config.topics.clone());

    producer
        .produce_item(&config.topics.raw, &raw_work_item("p1"))
        .await
        .unwrap();

    // First worker polls (simulated crash before produce/commit), then
    // is dropped.
    {
        let mut consumer = broker
            .subscribe(&config.topics.raw, &config.groups.extraction)
            .await
            .unwrap();
        assert!(consumer.poll(Duration::from_millis(20)).await.unwrap().is_some());
    }

    // A replacement worker sees the same message and processes it.
    let mut worker = StageWorker::subscribe(
        &dyn_broker,
        Arc::new(ExtractionStage::new()),
        producer,
        &config.topics.raw,
        &config.topics.extracted,
        &config.groups.extraction,
        Duration::from_millis(20),
        Arc::new(crate::metrics::PipelineMetrics::new()),
    )
    .await
    .unwrap();

    assert_eq!(worker.tick().await.unwrap(), WorkerTick::Processed);
    assert_eq!(broker.topic_len(&config.topics.extracted), 1);
}

#[tokio::test]
async fn test_stage_progression_is_forward_only_through_topics() {
    let config = test_config();
    let broker = Arc::new(InMemoryBroker::new());
    let collector = test_collector(&config, happy_sources());

    let mut pipeline = StagedPipeline::new(
        Arc::clone(&broker) as Arc<dyn MessageBroker>,
        &config,
        collector,
    )
    .await
    .unwrap();

    pipeline.producer().produce_raw(&raw_work_item("p1")).await.unwrap();
    drain(&mut pipeline).await;

    let stage_of = |topic: &str| -> Vec<ProcessingStage> {
        broker
            .messages(topic)
            .iter()
            .map(|m| serde_json::from_slice::<WorkItem>(&m.payload).unwrap().stage)
            .collect()
    };

    assert_eq!(stage_of(&config.topics.raw), vec![ProcessingStage::Raw]);
    assert_eq!(
        stage_of(&config.topics.extracted),
        vec![ProcessingStage::Extracted]
    );
    assert_eq!(
        stage_of(&config.topics.enriched),
        vec![ProcessingStage::Enriched]
    );
    assert_eq!(
        stage_of(&config.topics.validated),
        vec![ProcessingStage::Validated]
    );
}

#[tokio::test]
async fn test_audit_has_one_entry_per_transition() {
    let config = test_config();
    let broker = Arc::new(InMemoryBroker::new());
    let collector = test_collector(&config, happy_sources());

    let mut pipeline = StagedPipeline::new(
        Arc::clone(&broker) as Arc<dyn MessageBroker>,
        &config,
        collector,
    )
    .await
    .unwrap();

    pipeline.producer().produce_raw(&raw_work_item("p1")).await.unwrap();
    drain(&mut pipeline).await;

    let events: Vec<String> = broker
        .messages(&config.topics.audit)
        .iter()
        .map(|m| {
            serde_json::from_slice::<AuditEvent>(&m.payload)
                .unwrap()
                .event_type
        })
        .collect();

    assert_eq!(
        events,
        vec![
            "raw_produced",
            "extraction_succeeded",
            "enrichment_succeeded",
            "validation_succeeded",
        ]
    );
}

#[tokio::test]
async fn test_run_loop_stops_on_shutdown() {
    let config = test_config();
    let broker = Arc::new(InMemoryBroker::new());
    let collector = test_collector(&config, happy_sources());

    let pipeline = StagedPipeline::new(
        Arc::clone(&broker) as Arc<dyn MessageBroker>,
        &config,
        collector,
    )
    .await
    .unwrap();

    let shutdown = crate::shutdown::ShutdownToken::new();
    let trigger = shutdown.clone();
    let handle = tokio::spawn(pipeline.run(shutdown));

    tokio::time::sleep(Duration::from_millis(50)).await;
    trigger.trigger("test over");

    tokio::time::timeout(Duration::from_secs(2), handle)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
}
