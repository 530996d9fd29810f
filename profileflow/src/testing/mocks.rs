//! Mock sources, transports, and stores.

use crate::cache::CacheStore;
use crate::client::{Request, Response, Transport};
use crate::collect::Source;
use crate::core::{ProfileQuery, SourceId};
use crate::errors::CollectError;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

/// A source that always succeeds with fixed data.
#[derive(Debug)]
pub struct StaticSource {
    id: SourceId,
    data: BTreeMap<String, serde_json::Value>,
    delay: Option<Duration>,
    calls: AtomicU32,
    in_flight: AtomicU32,
    max_in_flight: AtomicU32,
}

impl StaticSource {
    /// Creates a source returning the given fields.
    #[must_use]
    pub fn new(id: SourceId, data: BTreeMap<String, serde_json::Value>) -> Self {
        Self {
            id,
            data,
            delay: None,
            calls: AtomicU32::new(0),
            in_flight: AtomicU32::new(0),
            max_in_flight: AtomicU32::new(0),
        }
    }

    /// Creates a source contributing a single field.
    #[must_use]
    pub fn with_field(id: SourceId, key: &str, value: serde_json::Value) -> Self {
        Self::new(id, BTreeMap::from([(key.to_string(), value)]))
    }

    /// Adds an artificial delay to every fetch.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Times `fetch` was called.
    #[must_use]
    pub fn call_count(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    /// The highest number of concurrent fetches observed.
    #[must_use]
    pub fn max_concurrency(&self) -> u32 {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Source for StaticSource {
    fn id(&self) -> SourceId {
        self.id
    }

    async fn fetch(
        &self,
        _query: &ProfileQuery,
    ) -> Result<BTreeMap<String, serde_json::Value>, CollectError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        Ok(self.data.clone())
    }
}

/// A source that always fails with the configured error.
#[derive(Debug)]
pub struct FailingSource {
    id: SourceId,
    error: CollectError,
    calls: AtomicU32,
}

impl FailingSource {
    /// Creates a failing source.
    #[must_use]
    pub fn new(id: SourceId, error: CollectError) -> Self {
        Self {
            id,
            error,
            calls: AtomicU32::new(0),
        }
    }

    /// Times `fetch` was called.
    #[must_use]
    pub fn call_count(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Source for FailingSource {
    fn id(&self) -> SourceId {
        self.id
    }

    async fn fetch(
        &self,
        _query: &ProfileQuery,
    ) -> Result<BTreeMap<String, serde_json::Value>, CollectError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(self.error.clone())
    }
}

/// A source that fails a fixed number of times, then succeeds.
#[derive(Debug)]
pub struct FlakySource {
    id: SourceId,
    failures_before_success: u32,
    data: BTreeMap<String, serde_json::Value>,
    calls: AtomicU32,
}

impl FlakySource {
    /// Creates a source that fails `failures_before_success` times.
    #[must_use]
    pub fn new(
        id: SourceId,
        failures_before_success: u32,
        data: BTreeMap<String, serde_json::Value>,
    ) -> Self {
        Self {
            id,
            failures_before_success,
            data,
            calls: AtomicU32::new(0),
        }
    }

    /// Times `fetch` was called.
    #[must_use]
    pub fn call_count(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Source for FlakySource {
    fn id(&self) -> SourceId {
        self.id
    }

    async fn fetch(
        &self,
        _query: &ProfileQuery,
    ) -> Result<BTreeMap<String, serde_json::Value>, CollectError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call < self.failures_before_success {
            Err(CollectError::transient(format!("flaky failure {call}")))
        } else {
            Ok(self.data.clone())
        }
    }
}

/// A transport that replays a script of canned outcomes, in order.
pub struct ScriptedTransport {
    script: Mutex<VecDeque<Result<Response, CollectError>>>,
    sent: Mutex<Vec<Request>>,
    delay: Option<Duration>,
}

impl ScriptedTransport {
    /// Creates a transport that returns the given outcomes in order.
    #[must_use]
    pub fn new(script: Vec<Result<Response, CollectError>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            sent: Mutex::new(Vec::new()),
            delay: None,
        }
    }

    /// Creates a transport that sleeps before every 200 response.
    #[must_use]
    pub fn slow(delay: Duration) -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            sent: Mutex::new(Vec::new()),
            delay: Some(delay),
        }
    }

    /// The requests this transport received.
    #[must_use]
    pub fn sent(&self) -> Vec<Request> {
        self.sent.lock().clone()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(&self, request: &Request) -> Result<Response, CollectError> {
        self.sent.lock().push(request.clone());

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let next = self.script.lock().pop_front();
        match next {
            Some(outcome) => outcome,
            None if self.delay.is_some() => Ok(Response {
                status: 200,
                body: serde_json::Value::Null,
            }),
            None => Err(CollectError::unknown("scripted transport exhausted")),
        }
    }
}

/// A cache store whose writes always fail.
///
/// Reads behave as an empty cache, so the collector path under test is
/// miss → collect → failed write.
#[derive(Debug, Default)]
pub struct FailingCacheStore {
    writes: AtomicU32,
}

impl FailingCacheStore {
    /// Creates the store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Times `set` was attempted.
    #[must_use]
    pub fn write_attempts(&self) -> u32 {
        self.writes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CacheStore for FailingCacheStore {
    async fn get(&self, _key: &str) -> Result<Option<serde_json::Value>, CollectError> {
        Ok(None)
    }

    async fn set(
        &self,
        _key: &str,
        _value: serde_json::Value,
        _ttl: Duration,
    ) -> Result<(), CollectError> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        Err(CollectError::unknown("cache backend unavailable"))
    }

    async fn delete(&self, _key: &str) -> Result<bool, CollectError> {
        Ok(false)
    }

    async fn exists(&self, _key: &str) -> Result<bool, CollectError> {
        Ok(false)
    }
}
