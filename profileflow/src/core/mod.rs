//! Core data model: work items, source results, and enriched records.

mod item;
mod record;
mod source;

pub use item::{ProcessingStage, WorkItem};
pub use record::{EnrichedRecord, FailureRecord};
pub use source::{ProfileQuery, SourceId, SourceResult};
