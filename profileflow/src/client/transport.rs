//! Transport abstraction for the pooled client.
//!
//! The wire is injected: the client owns pooling, timeouts, and auth
//! recovery, while a [`Transport`] only turns a [`Request`] into a
//! [`Response`]. Tests script transports; production uses the
//! `reqwest`-backed [`HttpTransport`] behind the `http` feature.

use crate::errors::CollectError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

/// HTTP-like request method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    /// Read.
    Get,
    /// Create / search.
    Post,
    /// Replace.
    Put,
    /// Remove.
    Delete,
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Get => write!(f, "GET"),
            Self::Post => write!(f, "POST"),
            Self::Put => write!(f, "PUT"),
            Self::Delete => write!(f, "DELETE"),
        }
    }
}

/// A request handed to a transport.
#[derive(Debug, Clone)]
pub struct Request {
    /// Request method.
    pub method: Method,
    /// Absolute URL.
    pub url: String,
    /// Header name/value pairs.
    pub headers: Vec<(String, String)>,
    /// Optional JSON body.
    pub body: Option<serde_json::Value>,
}

impl Request {
    /// Creates a request with no headers or body.
    #[must_use]
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: Vec::new(),
            body: None,
        }
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

    /// The host portion of the URL — the pool's target key.
    #[must_use]
    pub fn target(&self) -> String {
        host_of(&self.url)
    }
}

/// A response from a transport.
///
/// Transports return `Ok` for any status they received; interpreting
/// the status (auth recovery, retryability) is the client's job.
#[derive(Debug, Clone)]
pub struct Response {
    /// Status code.
    pub status: u16,
    /// Parsed JSON body; `Null` when the body was empty.
    pub body: serde_json::Value,
}

impl Response {
    /// Returns true for 2xx statuses.
    #[must_use]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Returns true for the authorization-failure status.
    #[must_use]
    pub fn is_auth_failure(&self) -> bool {
        self.status == 401
    }
}

/// Extracts the host from a URL, scheme and path stripped.
#[must_use]
pub fn host_of(url: &str) -> String {
    let without_scheme = url
        .split_once("://")
        .map_or(url, |(_, rest)| rest);
    without_scheme
        .split(['/', '?'])
        .next()
        .unwrap_or(without_scheme)
        .to_string()
}

/// Turns requests into responses.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Sends one request. Network-level failures are errors; any
    /// received status is a success from the transport's perspective.
    async fn send(&self, request: &Request) -> Result<Response, CollectError>;
}

/// `reqwest`-backed transport.
#[cfg(feature = "http")]
pub struct HttpTransport {
    client: reqwest::Client,
}

#[cfg(feature = "http")]
impl HttpTransport {
    /// Creates a transport over a default `reqwest` client.
    ///
    /// # Errors
    ///
    /// Returns `CollectError::Unknown` if the underlying client cannot
    /// be constructed.
    pub fn new() -> Result<Self, CollectError> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| CollectError::unknown(e.to_string()))?;
        Ok(Self { client })
    }
}

#[cfg(feature = "http")]
#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: &Request) -> Result<Response, CollectError> {
        let method = match request.method {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
            Method::Put => reqwest::Method::PUT,
            Method::Delete => reqwest::Method::DELETE,
        };

        let mut builder = self.client.request(method, &request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name, value);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                CollectError::timeout(0)
            } else {
                CollectError::unknown(e.to_string())
            }
        })?;

        let status = response.status().as_u16();
        let body = response
            .json::<serde_json::Value>()
            .await
            .unwrap_or(serde_json::Value::Null);

        Ok(Response { status, body })
    }
}
