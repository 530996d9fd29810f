//! Work items and the stage state machine.

use crate::errors::PipelineError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// The processing stage of a work item.
///
/// Items only ever move forward through `Raw -> Extracted -> Enriched ->
/// Validated`, or divert to `Failed` from any non-terminal stage. Both
/// `Validated` and `Failed` are terminal, append-only sinks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingStage {
    /// Freshly ingested, unparsed payload.
    Raw,
    /// Payload parsed into a flat profile field map.
    Extracted,
    /// Field map merged with upstream source contributions.
    Enriched,
    /// Passed required-field and format validation. Terminal.
    Validated,
    /// Diverted to the dead-letter path. Terminal.
    Failed,
}

impl ProcessingStage {
    /// Returns the next stage in the forward sequence, if any.
    #[must_use]
    pub fn next(&self) -> Option<Self> {
        match self {
            Self::Raw => Some(Self::Extracted),
            Self::Extracted => Some(Self::Enriched),
            Self::Enriched => Some(Self::Validated),
            Self::Validated | Self::Failed => None,
        }
    }

    /// Returns true if the stage is a terminal sink.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Validated | Self::Failed)
    }

    /// Returns true if a transition to `to` is legal.
    ///
    /// Forward-only: the only legal moves are to the immediate next stage
    /// or to `Failed` from any non-terminal stage.
    #[must_use]
    pub fn can_transition_to(&self, to: Self) -> bool {
        if self.is_terminal() {
            return false;
        }
        self.next() == Some(to) || to == Self::Failed
    }
}

impl fmt::Display for ProcessingStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Raw => write!(f, "raw"),
            Self::Extracted => write!(f, "extracted"),
            Self::Enriched => write!(f, "enriched"),
            Self::Validated => write!(f, "validated"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// An immutable unit of work flowing through the pipeline.
///
/// A `WorkItem` is never mutated in place: every stage transition creates
/// a new version via [`WorkItem::advance`] with a fresh `produced_at` and
/// a reset attempt counter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkItem {
    /// Stable key for the item (profile identifier or URL).
    pub id: String,
    /// Opaque payload; interpretation belongs to the current stage.
    pub payload: serde_json::Value,
    /// The stage this version of the item is in.
    pub stage: ProcessingStage,
    /// When this version was produced.
    pub produced_at: DateTime<Utc>,
    /// Retry counter for the current stage.
    pub attempt: u32,
}

impl WorkItem {
    /// Creates a new item at the `Raw` stage.
    #[must_use]
    pub fn new(id: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            id: id.into(),
            payload,
            stage: ProcessingStage::Raw,
            produced_at: Utc::now(),
            attempt: 0,
        }
    }

    /// Creates a new version of this item at `stage` with `payload`.
    ///
    /// The transition must be legal under the stage state machine; the new
    /// version gets a fresh `produced_at` and a zeroed attempt counter.
    pub fn advance(
        &self,
        stage: ProcessingStage,
        payload: serde_json::Value,
    ) -> Result<Self, PipelineError> {
        if !self.stage.can_transition_to(stage) {
            return Err(PipelineError::InvalidTransition {
                from: self.stage.to_string(),
                to: stage.to_string(),
            });
        }
        Ok(Self {
            id: self.id.clone(),
            payload,
            stage,
            produced_at: Utc::now(),
            attempt: 0,
        })
    }

    /// Returns a copy with the attempt counter incremented.
    ///
    /// Used when a stage redelivers the same version after a crash.
    #[must_use]
    pub fn with_attempt(&self, attempt: u32) -> Self {
        Self {
            attempt,
            ..self.clone()
        }
    }

    /// Returns the payload as a JSON object, if it is one.
    #[must_use]
    pub fn payload_object(&self) -> Option<&serde_json::Map<String, serde_json::Value>> {
        self.payload.as_object()
    }
}
