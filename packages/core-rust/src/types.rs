use serde::{Deserialize, Serialize};

use crate::codec;

/// The three backend actions a gateway can dispatch.
///
/// Each action is also a circuit-breaker command: outcomes are accounted per
/// action, never across actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    /// Look up a short code and count a visit.
    Resolve,
    /// Look up a short code without counting a visit.
    Info,
    /// Create (or return the existing) short code for a long URL.
    Shorten,
}

impl Action {
    /// Every action, in a stable order.
    pub const ALL: [Action; 3] = [Action::Resolve, Action::Info, Action::Shorten];

    /// Lowercase name used in logs, metrics labels, and breaker snapshots.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Action::Resolve => "resolve",
            Action::Info => "info",
            Action::Shorten => "shorten",
        }
    }

    /// Whether the action mutates backend state on success.
    #[must_use]
    pub fn is_write(self) -> bool {
        matches!(self, Action::Shorten)
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A stored short-link mapping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShortUrlRecord {
    /// Strictly positive, assigned in creation order.
    pub id: u64,
    pub long_url: String,
    pub visit_count: u64,
}

impl ShortUrlRecord {
    /// Short code for this record's id.
    #[must_use]
    pub fn short_code(&self) -> String {
        codec::encode(self.id)
    }

    /// Absolute short link under `base`, which is expected to end in `/`.
    #[must_use]
    pub fn short_url(&self, base: &str) -> String {
        join_base(base, &self.short_code())
    }
}

/// Joins a base URL and a short code with exactly one `/` between them.
#[must_use]
pub fn join_base(base: &str, code: &str) -> String {
    if base.ends_with('/') {
        format!("{base}{code}")
    } else {
        format!("{base}/{code}")
    }
}

// ---------------------------------------------------------------------------
// Wire payloads
// ---------------------------------------------------------------------------

/// Body of a shorten request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShortenRequest {
    #[serde(rename = "URL", alias = "url")]
    pub url: String,
}

/// Body of a successful shorten response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShortenResponse {
    #[serde(rename = "shortURL")]
    pub short_url: String,
    #[serde(rename = "URL")]
    pub url: String,
}

/// Body of a resolve response when the caller asked for JSON instead of a redirect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedirectResponse {
    #[serde(rename = "URL")]
    pub url: String,
}

/// Body of an info response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InfoResponse {
    #[serde(rename = "URL")]
    pub url: String,
    #[serde(rename = "shortURL")]
    pub short_url: String,
    #[serde(rename = "visitsCount")]
    pub visits_count: u64,
}

/// Degraded response returned in place of a backend answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FallbackResponse {
    pub fallback: String,
    #[serde(rename = "upstreamError")]
    pub upstream_error: String,
}

/// Body of every error response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

impl ErrorBody {
    #[must_use]
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
        }
    }
}

/// Body of the `/healthz` response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthResponse {
    pub msg: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl HealthResponse {
    pub const HEALTHY: &'static str = "Always look at the bright side of life :)";
    pub const UNHEALTHY: &'static str = "Nope! Something went wrong :(";

    #[must_use]
    pub fn healthy() -> Self {
        Self {
            msg: Self::HEALTHY.to_string(),
            error: None,
        }
    }

    #[must_use]
    pub fn unhealthy(error: impl Into<String>) -> Self {
        Self {
            msg: Self::UNHEALTHY.to_string(),
            error: Some(error.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn action_names_are_stable() {
        let names: Vec<_> = Action::ALL.iter().map(|a| a.as_str()).collect();
        assert_eq!(names, vec!["resolve", "info", "shorten"]);
        assert_eq!(Action::Info.to_string(), "info");
    }

    #[test]
    fn only_shorten_is_a_write() {
        assert!(Action::Shorten.is_write());
        assert!(!Action::Resolve.is_write());
        assert!(!Action::Info.is_write());
    }

    #[test]
    fn record_short_url_joins_base() {
        let record = ShortUrlRecord {
            id: 62,
            long_url: "https://example.com".to_string(),
            visit_count: 0,
        };
        assert_eq!(record.short_code(), "10");
        assert_eq!(record.short_url("http://sho.rt/"), "http://sho.rt/10");
        assert_eq!(record.short_url("http://sho.rt"), "http://sho.rt/10");
    }

    #[test]
    fn shorten_request_accepts_both_field_spellings() {
        let upper: ShortenRequest = serde_json::from_value(json!({"URL": "a"})).unwrap();
        let lower: ShortenRequest = serde_json::from_value(json!({"url": "a"})).unwrap();
        assert_eq!(upper, lower);
    }

    #[test]
    fn payload_field_names() {
        let info = InfoResponse {
            url: "https://example.com".to_string(),
            short_url: "http://sho.rt/1".to_string(),
            visits_count: 3,
        };
        assert_eq!(
            serde_json::to_value(&info).unwrap(),
            json!({"URL": "https://example.com", "shortURL": "http://sho.rt/1", "visitsCount": 3})
        );

        let fallback = FallbackResponse {
            fallback: "down".to_string(),
            upstream_error: "boom".to_string(),
        };
        assert_eq!(
            serde_json::to_value(&fallback).unwrap(),
            json!({"fallback": "down", "upstreamError": "boom"})
        );
    }

    #[test]
    fn healthy_response_omits_error() {
        let value = serde_json::to_value(HealthResponse::healthy()).unwrap();
        assert_eq!(value, json!({"msg": HealthResponse::HEALTHY}));

        let value = serde_json::to_value(HealthResponse::unhealthy("db down")).unwrap();
        assert_eq!(value["error"], "db down");
    }
}
