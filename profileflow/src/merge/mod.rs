//! Deterministic merging of per-source results into one record.
//!
//! Results are applied in a fixed, configuration-defined precedence
//! order, never arrival order: completion timing under concurrency is
//! non-deterministic, the merged record must not be.

use crate::core::{EnrichedRecord, SourceId, SourceResult};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::warn;

/// The source precedence used to resolve field conflicts.
///
/// A source later in the list overwrites earlier ones for the same key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergePolicy {
    /// Precedence order, lowest priority first.
    pub precedence: Vec<SourceId>,
}

impl Default for MergePolicy {
    fn default() -> Self {
        Self {
            precedence: SourceId::ALL.to_vec(),
        }
    }
}

impl MergePolicy {
    /// Creates a policy with an explicit precedence order.
    #[must_use]
    pub fn new(precedence: Vec<SourceId>) -> Self {
        Self { precedence }
    }

    /// Returns the rank of a source, if it is listed.
    #[must_use]
    pub fn rank(&self, source: SourceId) -> Option<usize> {
        self.precedence.iter().position(|s| *s == source)
    }
}

/// Combines partial source results into an [`EnrichedRecord`].
#[derive(Debug, Clone, Default)]
pub struct Merger {
    policy: MergePolicy,
}

impl Merger {
    /// Creates a merger with the given policy.
    #[must_use]
    pub fn new(policy: MergePolicy) -> Self {
        Self { policy }
    }

    /// Merges successful results over the base data.
    ///
    /// Failed results contribute nothing. Successful results are applied
    /// in precedence order; the last writer for a key is recorded in the
    /// record's provenance. A successful result whose source is absent
    /// from the precedence list is skipped and logged — that is a
    /// configuration bug made visible, not data to merge with undefined
    /// ordering.
    #[must_use]
    pub fn merge(
        &self,
        base: BTreeMap<String, serde_json::Value>,
        results: &[SourceResult],
    ) -> EnrichedRecord {
        let mut merged = base.clone();
        let mut sources = Vec::new();
        let mut provenance = BTreeMap::new();

        let mut successful: Vec<&SourceResult> = results.iter().filter(|r| r.ok).collect();
        successful.sort_by_key(|r| self.policy.rank(r.source));

        for result in successful {
            let Some(_) = self.policy.rank(result.source) else {
                warn!(source = %result.source, "source missing from merge precedence, skipping");
                continue;
            };

            for (key, value) in &result.data {
                merged.insert(key.clone(), value.clone());
                if !base.contains_key(key) {
                    provenance.insert(key.clone(), result.source);
                }
            }
            sources.push(result.source);
        }

        EnrichedRecord {
            base_data: base,
            merged_data: merged,
            sources,
            provenance,
            timestamp: Utc::now(),
        }
    }
}
