//! Generic HTTP-backed source adapter.
//!
//! Concrete upstream shims differ only in endpoint and field mapping;
//! this adapter is the shared shape: POST the profile query to one
//! endpoint through the pooled client, return the response object's
//! fields. Per-API mapping beyond that belongs to the deployment.

use super::Source;
use crate::client::{ClientError, Method, PooledClient, RequestOptions};
use crate::core::{ProfileQuery, SourceId};
use crate::errors::CollectError;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::error;

/// A source adapter speaking JSON-over-HTTP through the pooled client.
pub struct HttpSource {
    id: SourceId,
    client: Arc<PooledClient>,
    endpoint: String,
}

impl HttpSource {
    /// Creates an adapter for one upstream endpoint.
    #[must_use]
    pub fn new(id: SourceId, client: Arc<PooledClient>, endpoint: impl Into<String>) -> Self {
        Self {
            id,
            client,
            endpoint: endpoint.into(),
        }
    }
}

#[async_trait]
impl Source for HttpSource {
    fn id(&self) -> SourceId {
        self.id
    }

    async fn fetch(
        &self,
        query: &ProfileQuery,
    ) -> Result<BTreeMap<String, serde_json::Value>, CollectError> {
        let body = serde_json::to_value(query)
            .map_err(|e| CollectError::malformed(format!("query failed to encode: {e}")))?;

        let response = self
            .client
            .request(
                Method::Post,
                &self.endpoint,
                RequestOptions::new().with_body(body),
            )
            .await
            .map_err(|e| match e {
                ClientError::Request(request_error) => request_error,
                ClientError::Infra(infra) => {
                    // The batch contract absorbs per-source failures; an
                    // infrastructure failure is still surfaced loudly.
                    error!(source = %self.id, error = %infra, "infrastructure failure during fetch");
                    CollectError::unknown(infra.to_string())
                }
            })?;

        match response.body {
            serde_json::Value::Object(fields) => Ok(fields.into_iter().collect()),
            serde_json::Value::Null => Ok(BTreeMap::new()),
            other => Err(CollectError::unknown(format!(
                "upstream returned a non-object body: {other}"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::Response;
    use crate::config::PoolConfig;
    use crate::testing::ScriptedTransport;
    use serde_json::json;

    fn query() -> ProfileQuery {
        ProfileQuery {
            email: Some("ada@analytical.example".to_string()),
            ..ProfileQuery::default()
        }
    }

    #[tokio::test]
    async fn test_fetch_returns_response_fields() {
        let transport = Arc::new(ScriptedTransport::new(vec![Ok(Response {
            status: 200,
            body: json!({"email_verified": true, "score": 93}),
        })]));
        let client = Arc::new(PooledClient::new(PoolConfig::default(), transport.clone()));
        let source = HttpSource::new(SourceId::Hunter, client, "https://api.hunter.example/verify");

        let data = source.fetch(&query()).await.unwrap();

        assert_eq!(data["email_verified"], json!(true));
        assert_eq!(data["score"], json!(93));

        let sent = transport.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].body.as_ref().unwrap()["email"], "ada@analytical.example");
    }

    #[tokio::test]
    async fn test_fetch_maps_upstream_errors() {
        let transport = Arc::new(ScriptedTransport::new(vec![Ok(Response {
            status: 503,
            body: serde_json::Value::Null,
        })]));
        let client = Arc::new(PooledClient::new(PoolConfig::default(), transport));
        let source = HttpSource::new(SourceId::Hunter, client, "https://api.hunter.example/verify");

        let err = source.fetch(&query()).await.unwrap_err();
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_fetch_rejects_non_object_body() {
        let transport = Arc::new(ScriptedTransport::new(vec![Ok(Response {
            status: 200,
            body: json!([1, 2, 3]),
        })]));
        let client = Arc::new(PooledClient::new(PoolConfig::default(), transport));
        let source = HttpSource::new(SourceId::Hunter, client, "https://api.hunter.example/verify");

        assert!(source.fetch(&query()).await.is_err());
    }
}
