//! Enriched records and dead-letter failure records.

use super::source::SourceId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The merged, provenance-tracked output of all sources for one item.
///
/// Invariants:
/// - `merged_data` keys are a superset of `base_data` keys;
/// - every key in `merged_data` that is not in `base_data` is attributed
///   to exactly one source in `provenance`, and that source appears in
///   `sources`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrichedRecord {
    /// The fields the item carried before enrichment.
    pub base_data: BTreeMap<String, serde_json::Value>,
    /// Base fields plus source contributions after conflict resolution.
    pub merged_data: BTreeMap<String, serde_json::Value>,
    /// Contributing sources, in precedence order.
    pub sources: Vec<SourceId>,
    /// Which source wrote each non-base key (last writer wins).
    pub provenance: BTreeMap<String, SourceId>,
    /// When the merge happened.
    pub timestamp: DateTime<Utc>,
}

impl EnrichedRecord {
    /// Creates a record with no source contributions.
    ///
    /// This is what a collection where every source failed looks like:
    /// the base data survives, `sources` is empty, and the gap is
    /// data-quality information rather than an error.
    #[must_use]
    pub fn base_only(base_data: BTreeMap<String, serde_json::Value>) -> Self {
        Self {
            merged_data: base_data.clone(),
            base_data,
            sources: Vec::new(),
            provenance: BTreeMap::new(),
            timestamp: Utc::now(),
        }
    }

    /// Keys contributed by sources (present in merged, absent from base).
    #[must_use]
    pub fn contributed_keys(&self) -> Vec<&String> {
        self.merged_data
            .keys()
            .filter(|k| !self.base_data.contains_key(*k))
            .collect()
    }

    /// Checks the traceability invariant.
    ///
    /// Every contributed key must map to exactly one source in
    /// `provenance`, and that source must be listed in `sources`.
    #[must_use]
    pub fn traceable(&self) -> bool {
        self.contributed_keys().iter().all(|key| {
            self.provenance
                .get(*key)
                .is_some_and(|source| self.sources.contains(source))
        })
    }
}

/// The dead-letter message body for a failed stage transform.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailureRecord {
    /// The stage whose transform failed.
    pub stage: String,
    /// The id of the item that failed.
    pub item_id: String,
    /// The payload as it was when the failure happened.
    pub payload: serde_json::Value,
    /// The error message.
    pub error: String,
    /// When the failure was recorded.
    pub timestamp: DateTime<Utc>,
}

impl FailureRecord {
    /// Creates a new failure record.
    #[must_use]
    pub fn new(
        stage: impl Into<String>,
        item_id: impl Into<String>,
        payload: serde_json::Value,
        error: impl Into<String>,
    ) -> Self {
        Self {
            stage: stage.into(),
            item_id: item_id.into(),
            payload,
            error: error.into(),
            timestamp: Utc::now(),
        }
    }
}
