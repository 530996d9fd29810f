//! The pooled client: timeouts, status mapping, and auth recovery.

use super::pool::ConnectionPool;
use super::transport::{Method, Request, Response, Transport};
use crate::config::PoolConfig;
use crate::errors::{CollectError, PipelineError};
use crate::metrics::PoolMetrics;
use async_trait::async_trait;
use parking_lot::RwLock;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tracing::{error, info, warn};

/// Refreshes an expired credential.
///
/// Injected by the deployment; `None` means the credential could not be
/// refreshed and the request fails as an authentication error.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TokenRefresher: Send + Sync {
    /// Exchanges an expired token for a fresh one.
    async fn refresh(&self, expired: &str) -> Option<String>;
}

/// Options for a single request.
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    /// Extra headers.
    pub headers: Vec<(String, String)>,
    /// Optional JSON body.
    pub body: Option<serde_json::Value>,
}

impl RequestOptions {
    /// Creates empty options.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a header.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Sets the JSON body.
    #[must_use]
    pub fn with_body(mut self, body: serde_json::Value) -> Self {
        self.body = Some(body);
        self
    }
}

/// Errors from a pooled-client request.
///
/// Request-level failures feed the retry executor; infrastructure
/// failures (pool exhaustion) are the fatal class and are kept distinct
/// so callers cannot accidentally retry them away.
#[derive(Debug, Error)]
pub enum ClientError {
    /// A per-request failure, classified for retry.
    #[error(transparent)]
    Request(#[from] CollectError),

    /// An infrastructure failure, fatal to the caller.
    #[error(transparent)]
    Infra(PipelineError),
}

/// A client sharing one connection pool across concurrent callers.
///
/// The pool lock covers bookkeeping only; the transport call itself
/// runs outside it, concurrently up to the pool cap. Authorization
/// failures trigger exactly one credential refresh and one replay of
/// the single failing request — backoff belongs to the retry executor
/// a layer up, not here.
pub struct PooledClient {
    transport: Arc<dyn Transport>,
    pool: ConnectionPool,
    refresher: Option<Arc<dyn TokenRefresher>>,
    token: RwLock<Option<String>>,
    config: PoolConfig,
}

impl PooledClient {
    /// Creates a client over a transport.
    #[must_use]
    pub fn new(config: PoolConfig, transport: Arc<dyn Transport>) -> Self {
        let metrics = Arc::new(PoolMetrics::new());
        Self {
            transport,
            pool: ConnectionPool::new(config.clone(), metrics),
            refresher: None,
            token: RwLock::new(None),
            config,
        }
    }

    /// Sets the bearer credential attached to every request.
    #[must_use]
    pub fn with_token(self, token: impl Into<String>) -> Self {
        *self.token.write() = Some(token.into());
        self
    }

    /// Injects the credential refresh callback.
    #[must_use]
    pub fn with_refresher(mut self, refresher: Arc<dyn TokenRefresher>) -> Self {
        self.refresher = Some(refresher);
        self
    }

    /// The pool metrics registry.
    #[must_use]
    pub fn metrics(&self) -> &Arc<PoolMetrics> {
        self.pool.metrics()
    }

    /// The underlying pool.
    #[must_use]
    pub fn pool(&self) -> &ConnectionPool {
        &self.pool
    }

    /// Starts the pool's background sweep.
    pub fn start(&self) {
        self.pool.start();
    }

    /// Stops the background sweep.
    pub async fn stop(&self) {
        self.pool.stop().await;
    }

    /// Issues one request through the pool.
    ///
    /// The per-call timeout bounds each transport send. A 401 response
    /// triggers one refresh-and-replay; a second 401, or a refresher
    /// that returns nothing, surfaces as `AuthExpired`.
    pub async fn request(
        &self,
        method: Method,
        url: &str,
        options: RequestOptions,
    ) -> Result<Response, ClientError> {
        let request = self.build_request(method, url, &options);
        let target = request.target();

        let lease = self
            .pool
            .checkout(&target)
            .await
            .map_err(ClientError::Infra)?;

        let started = Instant::now();
        let outcome = self.send_with_auth_recovery(request, &options).await;
        let latency = started.elapsed();

        match &outcome {
            Ok(_) => self.pool.checkin(lease),
            Err(_) => self.pool.discard(lease),
        }
        self.metrics().observe_request(url, latency, outcome.is_ok());

        outcome.map_err(ClientError::Request)
    }

    fn build_request(&self, method: Method, url: &str, options: &RequestOptions) -> Request {
        let mut request = Request::new(method, url);
        for (name, value) in &options.headers {
            request = request.with_header(name.clone(), value.clone());
        }
        if let Some(token) = self.token.read().as_deref() {
            request = request.with_header("Authorization", format!("Bearer {token}"));
        }
        if let Some(body) = &options.body {
            request = request.with_body(body.clone());
        }
        request
    }

    async fn send_with_auth_recovery(
        &self,
        request: Request,
        options: &RequestOptions,
    ) -> Result<Response, CollectError> {
        let response = self.send_once(&request).await?;
        if !response.is_auth_failure() {
            return Self::map_status(response);
        }

        let expired = self.token.read().clone().unwrap_or_default();
        let Some(refresher) = &self.refresher else {
            warn!(url = %request.url, "authorization failed and no refresher is configured");
            return Err(CollectError::AuthExpired);
        };

        self.metrics().auth_refreshes.fetch_add(1, Ordering::Relaxed);
        let Some(fresh) = refresher.refresh(&expired).await else {
            warn!(url = %request.url, "credential refresh declined");
            return Err(CollectError::AuthExpired);
        };

        info!(url = %request.url, "credential refreshed, replaying request once");
        *self.token.write() = Some(fresh);

        let replay = self.build_request(request.method, &request.url, options);
        let response = self.send_once(&replay).await?;
        if response.is_auth_failure() {
            return Err(CollectError::AuthExpired);
        }
        Self::map_status(response)
    }

    async fn send_once(&self, request: &Request) -> Result<Response, CollectError> {
        let timeout = self.config.request_timeout();
        match tokio::time::timeout(timeout, self.transport.send(request)).await {
            Ok(result) => result.map_err(|e| {
                if let CollectError::Unknown { message } = &e {
                    error!(url = %request.url, %message, "transport failed with unclassified error");
                }
                e
            }),
            Err(_) => Err(CollectError::timeout(timeout.as_millis() as u64)),
        }
    }

    fn map_status(response: Response) -> Result<Response, CollectError> {
        match response.status {
            status if (200..300).contains(&status) => Ok(response),
            status if (500..600).contains(&status) => Err(CollectError::transient(format!(
                "upstream returned {status}"
            ))),
            status => Err(CollectError::client(
                status,
                response
                    .body
                    .get("message")
                    .and_then(serde_json::Value::as_str)
                    .unwrap_or("request rejected")
                    .to_string(),
            )),
        }
    }
}
