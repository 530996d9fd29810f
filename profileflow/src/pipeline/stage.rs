//! Stage transforms: extraction, enrichment, and validation.

use crate::collect::ParallelCollector;
use crate::config::ValidationRules;
use crate::core::{ProcessingStage, WorkItem};
use crate::errors::StageFailure;
use async_trait::async_trait;
use regex::Regex;
use serde_json::{json, Map, Value};
use std::sync::Arc;

/// The transform a stage worker applies to each polled item.
#[async_trait]
pub trait StageTransform: Send + Sync {
    /// Stage name, used in audit events and failure records.
    fn name(&self) -> &'static str;

    /// The stage produced items land in.
    fn output_stage(&self) -> ProcessingStage;

    /// Transforms one item into its next version.
    async fn apply(&self, item: &WorkItem) -> Result<WorkItem, StageFailure>;
}

/// Parses raw payloads into the flat profile field map.
///
/// Accepts JSON objects of scraped fields; an `html_content` field is
/// reduced to page title and text first (`html` feature). Name fields
/// are normalized so downstream stages can rely on `name`,
/// `first_name`, and `last_name` all being present when any is.
#[derive(Debug, Default)]
pub struct ExtractionStage;

impl ExtractionStage {
    /// Fields copied through verbatim when present.
    const PASSTHROUGH: [&'static str; 8] = [
        "email",
        "phone",
        "company",
        "company_domain",
        "linkedin_url",
        "location",
        "title",
        "skills",
    ];

    /// Creates the stage.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    fn extract(payload: &Map<String, Value>) -> Result<Map<String, Value>, String> {
        let mut extracted = Map::new();

        if let Some(html) = payload.get("html_content").and_then(Value::as_str) {
            let (title, text) = Self::reduce_html(html)?;
            if let Some(title) = title {
                extracted.insert("page_title".to_string(), json!(title));
            }
            extracted.insert("page_text".to_string(), json!(text));
        }

        for field in Self::PASSTHROUGH {
            if let Some(value) = payload.get(field) {
                extracted.insert(field.to_string(), value.clone());
            }
        }

        // `url` doubles as the LinkedIn URL for scraped profile pages.
        if !extracted.contains_key("linkedin_url") {
            if let Some(url) = payload.get("url").and_then(Value::as_str) {
                if url.contains("linkedin.com") {
                    extracted.insert("linkedin_url".to_string(), json!(url));
                }
            }
        }

        Self::normalize_names(payload, &mut extracted);

        if extracted.is_empty() {
            return Err("payload contained no recognizable profile fields".to_string());
        }
        Ok(extracted)
    }

    fn normalize_names(payload: &Map<String, Value>, extracted: &mut Map<String, Value>) {
        let full = payload
            .get("full_name")
            .or_else(|| payload.get("name"))
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty());

        if let Some(full) = full {
            extracted.insert("name".to_string(), json!(full));
            if let Some((first, last)) = full.split_once(' ') {
                extracted
                    .entry("first_name".to_string())
                    .or_insert_with(|| json!(first));
                extracted
                    .entry("last_name".to_string())
                    .or_insert_with(|| json!(last.trim()));
            }
        } else {
            let first = payload.get("first_name").and_then(Value::as_str);
            let last = payload.get("last_name").and_then(Value::as_str);
            if let (Some(first), Some(last)) = (first, last) {
                extracted.insert("name".to_string(), json!(format!("{first} {last}")));
                extracted.insert("first_name".to_string(), json!(first));
                extracted.insert("last_name".to_string(), json!(last));
            }
        }
    }

    #[cfg(feature = "html")]
    fn reduce_html(html: &str) -> Result<(Option<String>, String), String> {
        let document = scraper::Html::parse_document(html);

        let title = scraper::Selector::parse("title")
            .ok()
            .and_then(|selector| {
                document
                    .select(&selector)
                    .next()
                    .map(|el| el.text().collect::<String>().trim().to_string())
            })
            .filter(|t| !t.is_empty());

        let body = scraper::Selector::parse("body").map_err(|e| e.to_string())?;
        let text = document
            .select(&body)
            .flat_map(|el| el.text())
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .collect::<Vec<_>>()
            .join(" ");

        Ok((title, text))
    }

    #[cfg(not(feature = "html"))]
    fn reduce_html(_html: &str) -> Result<(Option<String>, String), String> {
        Err("payload carries html_content but HTML extraction is not enabled".to_string())
    }
}

#[async_trait]
impl StageTransform for ExtractionStage {
    fn name(&self) -> &'static str {
        "extraction"
    }

    fn output_stage(&self) -> ProcessingStage {
        ProcessingStage::Extracted
    }

    async fn apply(&self, item: &WorkItem) -> Result<WorkItem, StageFailure> {
        let payload = item
            .payload_object()
            .ok_or_else(|| StageFailure::new(self.name(), &item.id, "payload is not an object"))?;

        let extracted = Self::extract(payload)
            .map_err(|reason| StageFailure::new(self.name(), &item.id, reason))?;

        item.advance(ProcessingStage::Extracted, Value::Object(extracted))
            .map_err(|e| StageFailure::new(self.name(), &item.id, e.to_string()))
    }
}

/// Runs the parallel collector and embeds the merged record.
pub struct EnrichmentStage {
    collector: Arc<ParallelCollector>,
}

impl EnrichmentStage {
    /// Creates the stage over a collector.
    #[must_use]
    pub fn new(collector: Arc<ParallelCollector>) -> Self {
        Self { collector }
    }
}

#[async_trait]
impl StageTransform for EnrichmentStage {
    fn name(&self) -> &'static str {
        "enrichment"
    }

    fn output_stage(&self) -> ProcessingStage {
        ProcessingStage::Enriched
    }

    async fn apply(&self, item: &WorkItem) -> Result<WorkItem, StageFailure> {
        let mut results = self.collector.collect_batch(std::slice::from_ref(item)).await;
        let record = results
            .pop()
            .unwrap_or_else(|| Err(crate::errors::CollectError::unknown("empty batch result")))
            .map_err(|e| StageFailure::new(self.name(), &item.id, e.to_string()))?;

        let mut payload: Map<String, Value> = record
            .merged_data
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        payload.insert(
            "enrichment".to_string(),
            json!({
                "sources": record.sources,
                "provenance": record.provenance,
                "timestamp": record.timestamp,
            }),
        );

        item.advance(ProcessingStage::Enriched, Value::Object(payload))
            .map_err(|e| StageFailure::new(self.name(), &item.id, e.to_string()))
    }
}

/// Checks required fields and format rules.
///
/// All failed rules are reported together, so one dead-letter record
/// tells the whole story.
pub struct ValidationStage {
    rules: ValidationRules,
    email: Regex,
    phone: Regex,
    url: Regex,
}

impl ValidationStage {
    /// Creates the stage with the given rules.
    ///
    /// # Panics
    ///
    /// Never: the patterns are fixed and known to compile.
    #[must_use]
    #[allow(clippy::unwrap_used)]
    pub fn new(rules: ValidationRules) -> Self {
        Self {
            rules,
            email: Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$").unwrap(),
            phone: Regex::new(r"^\+?1?\d{9,15}$").unwrap(),
            url: Regex::new(r"https?://(?:[-\w.]|(?:%[\da-fA-F]{2}))+").unwrap(),
        }
    }

    fn check(&self, payload: &Map<String, Value>) -> Vec<String> {
        let mut failures = Vec::new();

        for field in &self.rules.required_fields {
            match find_field(payload, field) {
                Some(value) if has_value(value) => {}
                _ => failures.push(format!("required field missing or empty: {field}")),
            }
        }

        if let Some(email) = find_str(payload, "email") {
            if !self.email.is_match(email) {
                failures.push(format!("invalid email format: {email}"));
            }
        }
        if let Some(phone) = find_str(payload, "phone") {
            if !self.phone.is_match(phone) {
                failures.push(format!("invalid phone format: {phone}"));
            }
        }
        if let Some(url) = find_str(payload, "linkedin_url") {
            if !self.url.is_match(url) {
                failures.push(format!("invalid URL format: {url}"));
            }
        }

        for field in &self.rules.date_fields {
            if let Some(value) = find_str(payload, field) {
                if chrono::DateTime::parse_from_rfc3339(value).is_err()
                    && chrono::NaiveDate::parse_from_str(value, "%Y-%m-%d").is_err()
                {
                    failures.push(format!("invalid date format for {field}: {value}"));
                }
            }
        }

        for field in &self.rules.numeric_fields {
            if let Some(value) = find_field(payload, field) {
                if !value.is_number() {
                    failures.push(format!("invalid numeric format for {field}: {value}"));
                }
            }
        }

        failures
    }
}

#[async_trait]
impl StageTransform for ValidationStage {
    fn name(&self) -> &'static str {
        "validation"
    }

    fn output_stage(&self) -> ProcessingStage {
        ProcessingStage::Validated
    }

    async fn apply(&self, item: &WorkItem) -> Result<WorkItem, StageFailure> {
        let payload = item
            .payload_object()
            .ok_or_else(|| StageFailure::new(self.name(), &item.id, "payload is not an object"))?;

        let failures = self.check(payload);
        if !failures.is_empty() {
            return Err(StageFailure::new(self.name(), &item.id, failures.join("; ")));
        }

        item.advance(ProcessingStage::Validated, item.payload.clone())
            .map_err(|e| StageFailure::new(self.name(), &item.id, e.to_string()))
    }
}

/// Finds a field in a payload, descending into nested objects and arrays.
fn find_field<'a>(payload: &'a Map<String, Value>, field: &str) -> Option<&'a Value> {
    if let Some(value) = payload.get(field) {
        return Some(value);
    }
    for value in payload.values() {
        if let Some(found) = find_in_value(value, field) {
            return Some(found);
        }
    }
    None
}

fn find_in_value<'a>(value: &'a Value, field: &str) -> Option<&'a Value> {
    match value {
        Value::Object(map) => find_field(map, field),
        Value::Array(items) => items.iter().find_map(|item| find_in_value(item, field)),
        _ => None,
    }
}

fn find_str<'a>(payload: &'a Map<String, Value>, field: &str) -> Option<&'a str> {
    find_field(payload, field).and_then(Value::as_str)
}

fn has_value(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
        _ => true,
    }
}
