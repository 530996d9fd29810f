//! Message broker contracts and the in-memory implementation.
//!
//! The real broker is an external collaborator assumed to provide
//! at-least-once delivery and per-group offsets. The contracts here are
//! the slice of it the pipeline needs: produce, subscribe per consumer
//! group, non-blocking-with-timeout poll, and manual offset commit. The
//! in-memory broker backs tests and single-process runs with the same
//! semantics, including redelivery of uncommitted messages.

use crate::errors::PipelineError;
use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Notify;

/// A message as stored on a topic.
#[derive(Debug, Clone)]
pub struct StoredMessage {
    /// Partition key; messages with the same key keep produce order.
    pub key: Option<String>,
    /// Serialized payload.
    pub payload: Vec<u8>,
}

/// A message handed to a consumer, with its offset.
#[derive(Debug, Clone)]
pub struct PolledMessage {
    /// Offset within the topic.
    pub offset: u64,
    /// Partition key.
    pub key: Option<String>,
    /// Serialized payload.
    pub payload: Vec<u8>,
}

/// One consumer within a consumer group.
#[async_trait]
pub trait Consumer: Send {
    /// Polls the next message, waiting at most `timeout`.
    ///
    /// `Ok(None)` means the topic had nothing new within the timeout —
    /// an idle tick, never an error. A polled message is redelivered to
    /// the group until [`Consumer::commit`] is called.
    async fn poll(&mut self, timeout: Duration) -> Result<Option<PolledMessage>, PipelineError>;

    /// Commits the offset of the last polled message.
    async fn commit(&mut self) -> Result<(), PipelineError>;
}

/// The broker contract used by producers and stage workers.
#[async_trait]
pub trait MessageBroker: Send + Sync {
    /// Appends a message to a topic.
    async fn produce(
        &self,
        topic: &str,
        key: Option<&str>,
        payload: &[u8],
    ) -> Result<(), PipelineError>;

    /// Creates a consumer for `topic` in `group`, starting at the
    /// group's committed offset.
    async fn subscribe(
        &self,
        topic: &str,
        group: &str,
    ) -> Result<Box<dyn Consumer>, PipelineError>;
}

#[derive(Debug, Default)]
struct TopicState {
    messages: RwLock<Vec<StoredMessage>>,
    committed: Mutex<HashMap<String, u64>>,
    notify: Notify,
}

/// In-memory broker with per-group committed offsets.
///
/// A single log per topic: per-key ordering falls out of append order.
#[derive(Debug, Default)]
pub struct InMemoryBroker {
    topics: DashMap<String, Arc<TopicState>>,
}

impl InMemoryBroker {
    /// Creates an empty broker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn topic(&self, name: &str) -> Arc<TopicState> {
        Arc::clone(
            &self
                .topics
                .entry(name.to_string())
                .or_insert_with(|| Arc::new(TopicState::default())),
        )
    }

    /// Number of messages ever produced to a topic.
    #[must_use]
    pub fn topic_len(&self, topic: &str) -> usize {
        self.topics
            .get(topic)
            .map_or(0, |state| state.messages.read().len())
    }

    /// Snapshot of a topic's messages, oldest first. Test/inspection aid.
    #[must_use]
    pub fn messages(&self, topic: &str) -> Vec<StoredMessage> {
        self.topics
            .get(topic)
            .map_or_else(Vec::new, |state| state.messages.read().clone())
    }

    /// Messages a group has not yet committed past, for depth gauges.
    #[must_use]
    pub fn group_lag(&self, topic: &str, group: &str) -> usize {
        self.topics.get(topic).map_or(0, |state| {
            let len = state.messages.read().len() as u64;
            let committed = state.committed.lock().get(group).copied().unwrap_or(0);
            (len - committed.min(len)) as usize
        })
    }
}

#[async_trait]
impl MessageBroker for InMemoryBroker {
    async fn produce(
        &self,
        topic: &str,
        key: Option<&str>,
        payload: &[u8],
    ) -> Result<(), PipelineError> {
        let state = self.topic(topic);
        state.messages.write().push(StoredMessage {
            key: key.map(str::to_string),
            payload: payload.to_vec(),
        });
        state.notify.notify_waiters();
        Ok(())
    }

    async fn subscribe(
        &self,
        topic: &str,
        group: &str,
    ) -> Result<Box<dyn Consumer>, PipelineError> {
        let state = self.topic(topic);
        let position = state.committed.lock().get(group).copied().unwrap_or(0);
        Ok(Box::new(InMemoryConsumer {
            state,
            group: group.to_string(),
            position,
            last_polled: None,
        }))
    }
}

struct InMemoryConsumer {
    state: Arc<TopicState>,
    group: String,
    position: u64,
    last_polled: Option<u64>,
}

impl InMemoryConsumer {
    fn try_next(&mut self) -> Option<PolledMessage> {
        let messages = self.state.messages.read();
        let offset = self.position;
        messages.get(offset as usize).map(|message| {
            self.position += 1;
            self.last_polled = Some(offset);
            PolledMessage {
                offset,
                key: message.key.clone(),
                payload: message.payload.clone(),
            }
        })
    }
}

#[async_trait]
impl Consumer for InMemoryConsumer {
    async fn poll(&mut self, timeout: Duration) -> Result<Option<PolledMessage>, PipelineError> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(message) = self.try_next() {
                return Ok(Some(message));
            }

            let state = Arc::clone(&self.state);
            let notified = state.notify.notified();
            // A produce may have landed between the check and the
            // registration above.
            if let Some(message) = self.try_next() {
                return Ok(Some(message));
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Ok(None);
            }
            if tokio::time::timeout(remaining, notified).await.is_err() {
                return Ok(None);
            }
        }
    }

    async fn commit(&mut self) -> Result<(), PipelineError> {
        if let Some(offset) = self.last_polled {
            self.state
                .committed
                .lock()
                .insert(self.group.clone(), offset + 1);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const POLL: Duration = Duration::from_millis(20);

    #[tokio::test]
    async fn test_produce_then_poll() {
        let broker = InMemoryBroker::new();
        broker.produce("t", Some("k"), b"one").await.unwrap();

        let mut consumer = broker.subscribe("t", "g").await.unwrap();
        let message = consumer.poll(POLL).await.unwrap().unwrap();

        assert_eq!(message.offset, 0);
        assert_eq!(message.key.as_deref(), Some("k"));
        assert_eq!(message.payload, b"one");
    }

    #[tokio::test]
    async fn test_empty_topic_polls_idle_within_timeout() {
        let broker = InMemoryBroker::new();
        let mut consumer = broker.subscribe("t", "g").await.unwrap();

        let started = Instant::now();
        let polled = consumer.poll(Duration::from_millis(30)).await.unwrap();

        assert!(polled.is_none());
        assert!(started.elapsed() >= Duration::from_millis(25));
    }

    #[tokio::test]
    async fn test_uncommitted_message_redelivered_to_group() {
        let broker = InMemoryBroker::new();
        broker.produce("t", Some("k"), b"one").await.unwrap();

        // First consumer polls but never commits (simulated crash
        // between produce and commit).
        {
            let mut consumer = broker.subscribe("t", "g").await.unwrap();
            let message = consumer.poll(POLL).await.unwrap().unwrap();
            assert_eq!(message.offset, 0);
        }

        let mut replacement = broker.subscribe("t", "g").await.unwrap();
        let message = replacement.poll(POLL).await.unwrap().unwrap();
        assert_eq!(message.offset, 0);
    }

    #[tokio::test]
    async fn test_committed_message_not_redelivered() {
        let broker = InMemoryBroker::new();
        broker.produce("t", Some("k"), b"one").await.unwrap();

        {
            let mut consumer = broker.subscribe("t", "g").await.unwrap();
            consumer.poll(POLL).await.unwrap().unwrap();
            consumer.commit().await.unwrap();
        }

        let mut replacement = broker.subscribe("t", "g").await.unwrap();
        assert!(replacement.poll(POLL).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_groups_track_offsets_independently() {
        let broker = InMemoryBroker::new();
        broker.produce("t", None, b"one").await.unwrap();

        let mut a = broker.subscribe("t", "group-a").await.unwrap();
        a.poll(POLL).await.unwrap().unwrap();
        a.commit().await.unwrap();

        let mut b = broker.subscribe("t", "group-b").await.unwrap();
        assert!(b.poll(POLL).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_per_key_ordering_preserved() {
        let broker = InMemoryBroker::new();
        for i in 0..5u8 {
            broker
                .produce("t", Some("item-1"), &[i])
                .await
                .unwrap();
        }

        let mut consumer = broker.subscribe("t", "g").await.unwrap();
        for expected in 0..5u8 {
            let message = consumer.poll(POLL).await.unwrap().unwrap();
            assert_eq!(message.payload, vec![expected]);
            consumer.commit().await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_poll_wakes_on_late_produce() {
        let broker = Arc::new(InMemoryBroker::new());
        let mut consumer = broker.subscribe("t", "g").await.unwrap();

        let producer = Arc::clone(&broker);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            producer.produce("t", None, b"late").await.unwrap();
        });

        let message = consumer
            .poll(Duration::from_millis(500))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(message.payload, b"late");
    }

    #[tokio::test]
    async fn test_group_lag() {
        let broker = InMemoryBroker::new();
        broker.produce("t", None, b"one").await.unwrap();
        broker.produce("t", None, b"two").await.unwrap();

        assert_eq!(broker.group_lag("t", "g"), 2);

        let mut consumer = broker.subscribe("t", "g").await.unwrap();
        consumer.poll(POLL).await.unwrap().unwrap();
        consumer.commit().await.unwrap();

        assert_eq!(broker.group_lag("t", "g"), 1);
    }
}
