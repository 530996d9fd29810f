//! Test doubles and fixtures.
//!
//! Everything here is also used by the crate's own tests; it is public
//! so downstream crates can drive the pipeline without a broker or
//! live upstreams.

mod fixtures;
mod mocks;

pub use fixtures::{extracted_payload, raw_profile_payload, raw_work_item};
pub use mocks::{FailingCacheStore, FailingSource, FlakySource, ScriptedTransport, StaticSource};
