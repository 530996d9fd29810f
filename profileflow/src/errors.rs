//! Error types for the profileflow pipeline.
//!
//! The taxonomy separates three concerns: per-source collection failures
//! (`CollectError`, absorbed by the collector and never fatal to a batch),
//! stage transform failures (`StageFailure`, always routed to the
//! dead-letter topic), and infrastructure failures (`PipelineError`, fatal
//! to the worker that hits them).

use thiserror::Error;

/// An error raised while collecting data from an upstream source.
///
/// Classification drives the retry executor: `is_retryable` is the
/// predicate consulted before any backoff is scheduled.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CollectError {
    /// The per-call timeout elapsed before the upstream responded.
    #[error("request timed out after {elapsed_ms}ms")]
    Timeout {
        /// Milliseconds spent before giving up.
        elapsed_ms: u64,
    },

    /// A transient upstream failure (5xx-equivalent).
    #[error("transient upstream error: {message}")]
    Transient {
        /// Upstream-provided detail.
        message: String,
    },

    /// A client-side error (4xx-equivalent other than auth).
    #[error("client error ({status}): {message}")]
    Client {
        /// HTTP-like status code.
        status: u16,
        /// Upstream-provided detail.
        message: String,
    },

    /// Authentication expired and the single refresh attempt failed.
    ///
    /// The pooled client refreshes credentials exactly once per request;
    /// this variant only surfaces after that attempt did not recover.
    #[error("authentication expired and credential refresh failed")]
    AuthExpired,

    /// The input was malformed before any I/O was attempted.
    #[error("malformed input: {message}")]
    Malformed {
        /// What was wrong with the input.
        message: String,
    },

    /// An unclassified failure. Retryable by default, logged loudly.
    #[error("unknown error: {message}")]
    Unknown {
        /// Whatever detail was available.
        message: String,
    },
}

impl CollectError {
    /// Creates a timeout error.
    #[must_use]
    pub fn timeout(elapsed_ms: u64) -> Self {
        Self::Timeout { elapsed_ms }
    }

    /// Creates a transient upstream error.
    #[must_use]
    pub fn transient(message: impl Into<String>) -> Self {
        Self::Transient {
            message: message.into(),
        }
    }

    /// Creates a client error.
    #[must_use]
    pub fn client(status: u16, message: impl Into<String>) -> Self {
        Self::Client {
            status,
            message: message.into(),
        }
    }

    /// Creates a malformed-input error.
    #[must_use]
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::Malformed {
            message: message.into(),
        }
    }

    /// Creates an unknown error.
    #[must_use]
    pub fn unknown(message: impl Into<String>) -> Self {
        Self::Unknown {
            message: message.into(),
        }
    }

    /// Returns true if the retry executor may retry this error.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Timeout { .. } | Self::Transient { .. } | Self::Unknown { .. } => true,
            Self::Client { .. } | Self::AuthExpired | Self::Malformed { .. } => false,
        }
    }
}

/// Classifies errors for the retry executor.
///
/// Implemented by any error type an operation wants retried; the executor
/// consults it before scheduling backoff. Permanent errors bypass backoff
/// and propagate immediately.
pub trait RetryClass {
    /// Returns true if the error is worth retrying.
    fn is_retryable(&self) -> bool;
}

impl RetryClass for CollectError {
    fn is_retryable(&self) -> bool {
        CollectError::is_retryable(self)
    }
}

/// A retried operation exhausted its attempt budget.
///
/// Carries the last underlying error tagged with the attempt count.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("operation '{operation}' failed after {attempts} attempts: {last}")]
pub struct RetryExhausted<E> {
    /// The operation name supplied by the caller.
    pub operation: String,
    /// Total attempts made, including the first.
    pub attempts: u32,
    /// The final error.
    pub last: E,
}

/// A stage transform failed for one work item.
///
/// Always routed to the dead-letter topic with an audit record; never
/// retried in place and never fatal to the consumer loop.
#[derive(Debug, Clone, Error)]
#[error("stage '{stage}' failed for item '{item_id}': {reason}")]
pub struct StageFailure {
    /// The stage that failed.
    pub stage: String,
    /// The id of the item being processed.
    pub item_id: String,
    /// Why the transform failed.
    pub reason: String,
}

impl StageFailure {
    /// Creates a new stage failure.
    #[must_use]
    pub fn new(
        stage: impl Into<String>,
        item_id: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            stage: stage.into(),
            item_id: item_id.into(),
            reason: reason.into(),
        }
    }
}

/// Infrastructure failures, fatal to the worker process that hits them.
///
/// The worker should exit and let its consumer group preserve offsets;
/// a restart resumes from the last committed offset.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The message broker is unreachable or rejected an operation.
    #[error("broker unavailable: {0}")]
    BrokerUnavailable(String),

    /// The connection pool could not hand out a slot within its bounds.
    #[error("connection pool exhausted for target '{target}'")]
    PoolExhausted {
        /// The upstream host the caller wanted.
        target: String,
    },

    /// A payload could not be serialized or deserialized.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A work item was asked to move backwards or out of a terminal stage.
    #[error("invalid stage transition: {from} -> {to}")]
    InvalidTransition {
        /// Current stage.
        from: String,
        /// Requested stage.
        to: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(CollectError::timeout(500).is_retryable());
        assert!(CollectError::transient("503").is_retryable());
        assert!(CollectError::unknown("???").is_retryable());

        assert!(!CollectError::client(404, "not found").is_retryable());
        assert!(!CollectError::AuthExpired.is_retryable());
        assert!(!CollectError::malformed("no id").is_retryable());
    }

    #[test]
    fn test_retry_exhausted_display() {
        let err = RetryExhausted {
            operation: "fetch".to_string(),
            attempts: 3,
            last: CollectError::timeout(1000),
        };
        let msg = err.to_string();
        assert!(msg.contains("fetch"));
        assert!(msg.contains("3 attempts"));
    }

    #[test]
    fn test_stage_failure_display() {
        let failure = StageFailure::new("validation", "item-1", "missing field 'name'");
        assert!(failure.to_string().contains("validation"));
        assert!(failure.to_string().contains("item-1"));
    }

    #[test]
    fn test_invalid_transition_display() {
        let err = PipelineError::InvalidTransition {
            from: "validated".to_string(),
            to: "raw".to_string(),
        };
        assert!(err.to_string().contains("validated -> raw"));
    }
}
