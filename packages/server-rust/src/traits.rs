use async_trait::async_trait;
use linkgate_core::{codec, ShortUrlRecord, ShortenerError};

/// Pluggable persistence backend for short-link records.
/// Implementations: in-memory (default, tests), `PostgreSQL` (feature `postgres`).
///
/// Engines must serialize id allocation globally and uniqueness per long URL:
/// concurrent `save` calls never hand out the same id twice and never create
/// two records for the same URL.
#[async_trait]
pub trait ShortUrlStorage: Send + Sync {
    /// Idempotent create. Returns the existing record unchanged when `long_url`
    /// is already stored; otherwise allocates `max id + 1` (starting at 1).
    async fn save(&self, long_url: &str) -> Result<ShortUrlRecord, ShortenerError>;

    /// Look up a record by numeric id.
    async fn by_numeric_id(&self, id: u64) -> Result<ShortUrlRecord, ShortenerError>;

    /// Look up a record by long URL.
    async fn by_url(&self, long_url: &str) -> Result<ShortUrlRecord, ShortenerError>;

    /// Atomically add one visit and return the new count.
    async fn increment_visits(&self, id: u64) -> Result<u64, ShortenerError>;

    /// Cheap round-trip to the backing store, reporting why it failed.
    async fn check_health(&self) -> anyhow::Result<()>;

    /// Liveness probe of the backing store.
    async fn is_healthy(&self) -> bool {
        self.check_health().await.is_ok()
    }

    /// Look up a record by short code.
    ///
    /// Undecodable codes fail with `MalformedInput`, unknown ids with `NotFound`.
    async fn by_id(&self, short_code: &str) -> Result<ShortUrlRecord, ShortenerError> {
        let id = codec::decode(short_code)?;
        self.by_numeric_id(id).await
    }
}
