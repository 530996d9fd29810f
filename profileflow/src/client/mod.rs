//! Pooled HTTP-style client for flaky upstream services.
//!
//! Three layers: a [`Transport`] that owns the wire, a
//! [`ConnectionPool`] that owns capacity and keep-alive bookkeeping,
//! and a [`PooledClient`] that owns timeouts, status mapping, and the
//! single-shot credential refresh on authorization failure.

mod client;
mod pool;
mod transport;

pub use client::{ClientError, PooledClient, RequestOptions, TokenRefresher};
pub use pool::{ConnectionLease, ConnectionPool, PooledConnection};
pub use transport::{host_of, Method, Request, Response, Transport};

#[cfg(feature = "http")]
pub use transport::HttpTransport;

#[cfg(test)]
pub use client::MockTokenRefresher;
