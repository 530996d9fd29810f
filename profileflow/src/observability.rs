//! Tracing subscriber setup for binaries and long-running workers.

use tracing_subscriber::{fmt, EnvFilter};

/// Installs a global subscriber honoring `RUST_LOG`.
///
/// Call once at process start; a second call is a no-op because a
/// global default may already be set.
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt().with_env_filter(filter).try_init();
}

/// Installs a JSON-formatted subscriber for log-shipping deployments.
pub fn init_json() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt().json().with_env_filter(filter).try_init();
}
