//! Shared test fixtures.

use crate::core::WorkItem;
use serde_json::json;

/// A raw scraped-profile payload, as ingestion would produce it.
#[must_use]
pub fn raw_profile_payload() -> serde_json::Value {
    json!({
        "url": "https://www.linkedin.com/in/ada-lovelace",
        "full_name": "Ada Lovelace",
        "email": "ada@analytical.example",
        "company": "Analytical Engines Ltd",
        "company_domain": "analytical.example",
        "location": "London",
        "title": "Chief Engineer",
        "skills": ["mathematics", "computing"],
    })
}

/// A payload as the extraction stage would emit it.
#[must_use]
pub fn extracted_payload() -> serde_json::Value {
    json!({
        "name": "Ada Lovelace",
        "first_name": "Ada",
        "last_name": "Lovelace",
        "email": "ada@analytical.example",
        "company": "Analytical Engines Ltd",
        "company_domain": "analytical.example",
        "linkedin_url": "https://www.linkedin.com/in/ada-lovelace",
        "location": "London",
        "title": "Chief Engineer",
        "skills": ["mathematics", "computing"],
    })
}

/// A raw work item wrapping [`raw_profile_payload`].
#[must_use]
pub fn raw_work_item(id: &str) -> WorkItem {
    WorkItem::new(id, raw_profile_payload())
}
