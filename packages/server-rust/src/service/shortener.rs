//! Backend role logic: shorten, resolve, and inspect short links.
//!
//! This is what the resolver and shortener roles run locally. The gateway
//! never calls it directly; it reaches it over HTTP through the dispatch layer.

use std::sync::Arc;

use linkgate_core::{ShortUrlRecord, ShortenerError};
use reqwest::Url;

use crate::traits::ShortUrlStorage;

/// Schemes accepted for long URLs.
const ALLOWED_SCHEMES: [&str; 2] = ["http", "https"];

/// Domain service over a [`ShortUrlStorage`] engine.
#[derive(Clone)]
pub struct ShortenerService {
    storage: Arc<dyn ShortUrlStorage>,
}

impl ShortenerService {
    #[must_use]
    pub fn new(storage: Arc<dyn ShortUrlStorage>) -> Self {
        Self { storage }
    }

    /// Validates `long_url` and returns its (possibly pre-existing) record.
    ///
    /// # Errors
    ///
    /// `MalformedInput` if the URL is empty or not an absolute http(s) URL,
    /// `Storage` if the engine fails.
    pub async fn shortify(&self, long_url: &str) -> Result<ShortUrlRecord, ShortenerError> {
        let normalized = normalize_long_url(long_url)?;
        let record = self.storage.save(&normalized).await?;
        tracing::debug!(id = record.id, url = %record.long_url, "shortified");
        Ok(record)
    }

    /// Looks up a short code without counting a visit.
    ///
    /// # Errors
    ///
    /// `MalformedInput` for undecodable codes, `NotFound` for unknown ones.
    pub async fn get_info(&self, short_code: &str) -> Result<ShortUrlRecord, ShortenerError> {
        self.storage.by_id(short_code).await
    }

    /// Looks up a short code and counts one visit.
    ///
    /// # Errors
    ///
    /// Same as [`get_info`](Self::get_info).
    pub async fn resolve(&self, short_code: &str) -> Result<ShortUrlRecord, ShortenerError> {
        let mut record = self.storage.by_id(short_code).await?;
        record.visit_count = self.storage.increment_visits(record.id).await?;
        Ok(record)
    }

    /// Round-trips to the backing store.
    ///
    /// # Errors
    ///
    /// Returns the engine's reason when the store is unreachable.
    pub async fn check_health(&self) -> anyhow::Result<()> {
        self.storage.check_health().await
    }

    pub async fn is_healthy(&self) -> bool {
        self.storage.is_healthy().await
    }

    #[must_use]
    pub fn storage(&self) -> Arc<dyn ShortUrlStorage> {
        Arc::clone(&self.storage)
    }
}

/// Accepts absolute http(s) URLs; scheme-less input is read as `http://`.
fn normalize_long_url(input: &str) -> Result<String, ShortenerError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(ShortenerError::malformed(
            "Empty request, cannot shortify the emptiness",
        ));
    }

    let (candidate, parsed) = match Url::parse(trimmed) {
        Ok(url) if trimmed.contains("://") || !looks_like_host(url.scheme()) => {
            (trimmed.to_string(), url)
        }
        Err(e) if trimmed.contains("://") => return Err(ShortenerError::malformed(e.to_string())),
        // "example.com/x" is relative; "example.com:80" parses with scheme "example.com".
        _ => {
            let prefixed = format!("http://{trimmed}");
            let url = Url::parse(&prefixed).map_err(|e| ShortenerError::malformed(e.to_string()))?;
            (prefixed, url)
        }
    };

    if !ALLOWED_SCHEMES.contains(&parsed.scheme()) {
        return Err(ShortenerError::malformed(format!(
            "unsupported scheme {}",
            parsed.scheme()
        )));
    }
    match parsed.host_str() {
        Some(host) if !host.is_empty() => Ok(candidate),
        _ => Err(ShortenerError::malformed("missing host")),
    }
}

fn looks_like_host(scheme: &str) -> bool {
    scheme.contains('.') || scheme == "localhost"
}
