//! Source identifiers, lookup parameters, and per-source results.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// The upstream data sources the collector knows about.
///
/// Each adapter tags its own results with its id; nothing downstream ever
/// sniffs payload shapes to guess where data came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum SourceId {
    /// LinkedIn profile API.
    #[serde(rename = "linkedin")]
    LinkedIn,
    /// Hunter.io email verification and domain search.
    #[serde(rename = "hunter")]
    Hunter,
    /// RocketReach person lookup.
    #[serde(rename = "rocketreach")]
    RocketReach,
    /// People Data Labs person enrichment.
    #[serde(rename = "peopledatalabs")]
    PeopleDataLabs,
    /// LexisNexis person check.
    #[serde(rename = "lexisnexis")]
    LexisNexis,
    /// Apollo people search.
    #[serde(rename = "apollo")]
    Apollo,
    /// ZoomInfo company enrichment.
    #[serde(rename = "zoominfo")]
    ZoomInfo,
    /// Clearbit company enrichment.
    #[serde(rename = "clearbit")]
    Clearbit,
    /// BrightData scraping proxy.
    #[serde(rename = "brightdata")]
    BrightData,
}

impl SourceId {
    /// All known sources, in default precedence order (lowest first).
    pub const ALL: [Self; 9] = [
        Self::BrightData,
        Self::Clearbit,
        Self::ZoomInfo,
        Self::Apollo,
        Self::LexisNexis,
        Self::RocketReach,
        Self::Hunter,
        Self::PeopleDataLabs,
        Self::LinkedIn,
    ];

    /// The canonical string name of the source.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LinkedIn => "linkedin",
            Self::Hunter => "hunter",
            Self::RocketReach => "rocketreach",
            Self::PeopleDataLabs => "peopledatalabs",
            Self::LexisNexis => "lexisnexis",
            Self::Apollo => "apollo",
            Self::ZoomInfo => "zoominfo",
            Self::Clearbit => "clearbit",
            Self::BrightData => "brightdata",
        }
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "linkedin" => Ok(Self::LinkedIn),
            "hunter" => Ok(Self::Hunter),
            "rocketreach" => Ok(Self::RocketReach),
            "peopledatalabs" => Ok(Self::PeopleDataLabs),
            "lexisnexis" => Ok(Self::LexisNexis),
            "apollo" => Ok(Self::Apollo),
            "zoominfo" => Ok(Self::ZoomInfo),
            "clearbit" => Ok(Self::Clearbit),
            "brightdata" => Ok(Self::BrightData),
            other => Err(format!("unknown source: {other}")),
        }
    }
}

/// Typed lookup parameters handed to source adapters.
///
/// Built from an extracted payload; adapters take what they need and
/// ignore the rest.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileQuery {
    /// First name, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    /// Last name, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    /// Email address, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// Current employer name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company: Option<String>,
    /// Employer web domain.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company_domain: Option<String>,
    /// LinkedIn profile URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub linkedin_url: Option<String>,
    /// Free-form location.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    /// Job title.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

impl ProfileQuery {
    /// Builds a query from a flat payload object, picking known fields.
    #[must_use]
    pub fn from_payload(payload: &serde_json::Map<String, serde_json::Value>) -> Self {
        let field = |key: &str| {
            payload
                .get(key)
                .and_then(serde_json::Value::as_str)
                .map(str::to_string)
        };
        Self {
            first_name: field("first_name"),
            last_name: field("last_name"),
            email: field("email"),
            company: field("company"),
            company_domain: field("company_domain"),
            linkedin_url: field("linkedin_url"),
            location: field("location"),
            title: field("title"),
        }
    }

    /// Full name, when both parts are present.
    #[must_use]
    pub fn full_name(&self) -> Option<String> {
        match (&self.first_name, &self.last_name) {
            (Some(first), Some(last)) => Some(format!("{first} {last}")),
            _ => None,
        }
    }
}

/// The outcome of one source's fetch for one work item.
///
/// Ephemeral: owned by the collector for the duration of a fan-out call
/// and discarded after merge. Failures are data (`ok = false`), never
/// propagated exceptions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceResult {
    /// Which source produced this result.
    pub source: SourceId,
    /// Key/value contributions. `BTreeMap` keeps iteration deterministic.
    pub data: BTreeMap<String, serde_json::Value>,
    /// Whether the fetch succeeded.
    pub ok: bool,
    /// The failure reason when `ok` is false.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// How long the fetch took, including retries.
    pub latency: Duration,
}

impl SourceResult {
    /// Creates a successful result.
    #[must_use]
    pub fn success(
        source: SourceId,
        data: BTreeMap<String, serde_json::Value>,
        latency: Duration,
    ) -> Self {
        Self {
            source,
            data,
            ok: true,
            error: None,
            latency,
        }
    }

    /// Creates a failed result carrying the error reason.
    #[must_use]
    pub fn failure(source: SourceId, error: impl Into<String>, latency: Duration) -> Self {
        Self {
            source,
            data: BTreeMap::new(),
            ok: false,
            error: Some(error.into()),
            latency,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_source_id_round_trip() {
        for source in SourceId::ALL {
            let parsed: SourceId = source.as_str().parse().unwrap();
            assert_eq!(parsed, source);
        }
    }

    #[test]
    fn test_source_id_serde_matches_canonical_name() {
        let encoded = serde_json::to_string(&SourceId::PeopleDataLabs).unwrap();
        assert_eq!(encoded, r#""peopledatalabs""#);

        let decoded: SourceId = serde_json::from_str(r#""linkedin""#).unwrap();
        assert_eq!(decoded, SourceId::LinkedIn);
    }

    #[test]
    fn test_unknown_source_rejected() {
        assert!("facebook".parse::<SourceId>().is_err());
    }

    #[test]
    fn test_profile_query_from_payload() {
        let payload = json!({
            "first_name": "Ada",
            "last_name": "Lovelace",
            "email": "ada@analytical.example",
            "company_domain": "analytical.example",
            "ignored": 42,
        });
        let query = ProfileQuery::from_payload(payload.as_object().unwrap());

        assert_eq!(query.first_name.as_deref(), Some("Ada"));
        assert_eq!(query.full_name().as_deref(), Some("Ada Lovelace"));
        assert_eq!(query.company, None);
    }

    #[test]
    fn test_source_result_failure_has_no_data() {
        let result = SourceResult::failure(SourceId::Hunter, "503", Duration::from_millis(12));
        assert!(!result.ok);
        assert!(result.data.is_empty());
        assert_eq!(result.error.as_deref(), Some("503"));
    }
}
