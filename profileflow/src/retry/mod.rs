//! Retry executor with bounded attempts and configurable backoff.
//!
//! Wraps any asynchronous operation whose error type implements
//! [`RetryClass`]. Retryable failures sleep the policy delay and try
//! again; permanent failures bypass backoff and propagate immediately.
//! Exhausting the attempt budget returns the last error tagged with the
//! attempt count.

use crate::errors::{RetryClass, RetryExhausted};
use crate::metrics::RetryMetrics;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// How the delay grows between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Backoff {
    /// delay = min(base * 2^(attempt-1), max)
    #[default]
    Exponential,
    /// delay = base
    Constant,
}

/// Randomization applied on top of the computed delay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Jitter {
    /// Use the computed delay as-is.
    #[default]
    None,
    /// Random in [0, delay].
    Full,
}

/// Retry policy: a pure value object, one instance per operation class.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Maximum attempts, including the first.
    pub max_attempts: u32,
    /// Base delay between attempts in milliseconds.
    pub base_delay_ms: u64,
    /// Delay cap in milliseconds.
    pub max_delay_ms: u64,
    /// Backoff growth.
    pub backoff: Backoff,
    /// Jitter applied to each delay.
    pub jitter: Jitter,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 1000,
            max_delay_ms: 60_000,
            backoff: Backoff::Exponential,
            jitter: Jitter::None,
        }
    }
}

impl RetryPolicy {
    /// Creates the default policy.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the maximum attempts.
    #[must_use]
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    /// Sets the base delay.
    #[must_use]
    pub fn with_base_delay_ms(mut self, delay: u64) -> Self {
        self.base_delay_ms = delay;
        self
    }

    /// Sets the delay cap.
    #[must_use]
    pub fn with_max_delay_ms(mut self, delay: u64) -> Self {
        self.max_delay_ms = delay;
        self
    }

    /// Sets the backoff growth.
    #[must_use]
    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    /// Sets the jitter strategy.
    #[must_use]
    pub fn with_jitter(mut self, jitter: Jitter) -> Self {
        self.jitter = jitter;
        self
    }

    /// Computes the delay before the given retry (attempt is 1-indexed).
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let base = match self.backoff {
            Backoff::Exponential => self
                .base_delay_ms
                .saturating_mul(2u64.saturating_pow(attempt.saturating_sub(1)))
                .min(self.max_delay_ms),
            Backoff::Constant => self.base_delay_ms.min(self.max_delay_ms),
        };
        let jittered = match self.jitter {
            Jitter::None => base,
            Jitter::Full => {
                if base == 0 {
                    0
                } else {
                    rand::thread_rng().gen_range(0..=base)
                }
            }
        };
        Duration::from_millis(jittered)
    }
}

/// Executes operations under a [`RetryPolicy`], recording metrics.
#[derive(Debug, Clone)]
pub struct RetryExecutor {
    policy: RetryPolicy,
    metrics: Arc<RetryMetrics>,
}

impl RetryExecutor {
    /// Creates an executor for the given policy.
    #[must_use]
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            metrics: Arc::new(RetryMetrics::new()),
        }
    }

    /// Creates an executor sharing an existing metrics registry.
    #[must_use]
    pub fn with_metrics(policy: RetryPolicy, metrics: Arc<RetryMetrics>) -> Self {
        Self { policy, metrics }
    }

    /// The policy this executor runs under.
    #[must_use]
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// The metrics registry.
    #[must_use]
    pub fn metrics(&self) -> &Arc<RetryMetrics> {
        &self.metrics
    }

    /// Runs `op`, retrying retryable failures under the policy.
    ///
    /// Returns the success value, or the last error tagged with the
    /// number of attempts made. Permanent errors are returned after the
    /// attempt that produced them, with no backoff sleep.
    pub async fn execute<T, E, F, Fut>(
        &self,
        operation: &str,
        mut op: F,
    ) -> Result<T, RetryExhausted<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: RetryClass + fmt::Display,
    {
        let started = Instant::now();
        let mut attempt = 1u32;

        loop {
            match op().await {
                Ok(value) => {
                    self.metrics.observe(attempt, attempt > 1, started.elapsed());
                    if attempt > 1 {
                        debug!(operation, attempt, "operation recovered after retry");
                    }
                    return Ok(value);
                }
                Err(error) => {
                    if !error.is_retryable() || attempt >= self.policy.max_attempts {
                        if error.is_retryable() {
                            warn!(operation, attempt, %error, "retry budget exhausted");
                            self.metrics.exhausted.fetch_add(1, Ordering::Relaxed);
                        } else {
                            debug!(operation, attempt, %error, "permanent error, not retrying");
                        }
                        self.metrics.observe(attempt, false, started.elapsed());
                        return Err(RetryExhausted {
                            operation: operation.to_string(),
                            attempts: attempt,
                            last: error,
                        });
                    }

                    let delay = self.policy.delay_for(attempt);
                    warn!(
                        operation,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        %error,
                        "operation failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }

    /// Retries `primary` under the policy, then runs `fallback` once.
    ///
    /// The fallback gets exactly one shot: its failure is final. This
    /// keeps a misbehaving fallback from doubling the backoff budget.
    pub async fn execute_with_fallback<T, E, F, Fut, G, GFut>(
        &self,
        operation: &str,
        primary: F,
        fallback: G,
    ) -> Result<T, RetryExhausted<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        G: FnOnce() -> GFut,
        GFut: Future<Output = Result<T, E>>,
        E: RetryClass + fmt::Display,
    {
        match self.execute(operation, primary).await {
            Ok(value) => Ok(value),
            Err(exhausted) => {
                warn!(
                    operation,
                    attempts = exhausted.attempts,
                    "primary failed, running fallback once"
                );
                match fallback().await {
                    Ok(value) => Ok(value),
                    Err(error) => Err(RetryExhausted {
                        operation: operation.to_string(),
                        attempts: exhausted.attempts + 1,
                        last: error,
                    }),
                }
            }
        }
    }

    /// Applies `op` to every item, retried per item, in fixed-size batches.
    ///
    /// Items within a batch run concurrently; batches run back to back,
    /// so `batch_size` bounds in-flight work. One item exhausting its
    /// retries does not abort its batch: the output carries one result
    /// per input item, in input order.
    pub async fn execute_batch<I, T, E, F, Fut>(
        &self,
        operation: &str,
        items: Vec<I>,
        batch_size: usize,
        op: F,
    ) -> Vec<Result<T, RetryExhausted<E>>>
    where
        I: Clone,
        F: Fn(I) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: RetryClass + fmt::Display,
    {
        let batch_size = batch_size.max(1);
        let mut results = Vec::with_capacity(items.len());
        let op = &op;

        for batch in items.chunks(batch_size) {
            let batch_results = futures::future::join_all(batch.iter().map(|item| {
                let item = item.clone();
                self.execute(operation, move || op(item.clone()))
            }))
            .await;
            results.extend(batch_results);
        }

        results
    }
}
