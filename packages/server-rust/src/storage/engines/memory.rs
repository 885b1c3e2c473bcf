//! In-memory [`ShortUrlStorage`] implementation backed by [`DashMap`].
//!
//! Lookups by id and by URL go through two `DashMap` indexes and never take a
//! global lock. Creation is the only serialized path: a single mutex guards
//! the id counter and the check-then-insert on the URL index, so concurrent
//! `save` calls for the same URL converge on one record and calls for
//! different URLs never share an id.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use linkgate_core::{ShortUrlRecord, ShortenerError};
use parking_lot::Mutex;

use crate::traits::ShortUrlStorage;

/// One stored mapping. The visit counter is updated in place.
#[derive(Debug)]
struct Entry {
    long_url: Arc<str>,
    visits: AtomicU64,
}

impl Entry {
    fn to_record(&self, id: u64) -> ShortUrlRecord {
        ShortUrlRecord {
            id,
            long_url: self.long_url.to_string(),
            visit_count: self.visits.load(Ordering::Acquire),
        }
    }
}

/// In-memory storage for development, tests, and single-node deployments.
pub struct InMemoryStorage {
    by_id: DashMap<u64, Entry>,
    by_url: DashMap<Arc<str>, u64>,
    /// Highest id handed out so far. Held for the whole create path.
    last_id: Mutex<u64>,
}

impl InMemoryStorage {
    /// Creates a new, empty `InMemoryStorage`.
    #[must_use]
    pub fn new() -> Self {
        Self {
            by_id: DashMap::new(),
            by_url: DashMap::new(),
            last_id: Mutex::new(0),
        }
    }

    /// Number of stored records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    fn lookup(&self, id: u64) -> Option<ShortUrlRecord> {
        self.by_id.get(&id).map(|entry| entry.to_record(id))
    }
}

impl Default for InMemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ShortUrlStorage for InMemoryStorage {
    async fn save(&self, long_url: &str) -> Result<ShortUrlRecord, ShortenerError> {
        // Fast path: already stored, no lock needed.
        if let Some(id) = self.by_url.get(long_url).map(|r| *r.value()) {
            if let Some(record) = self.lookup(id) {
                return Ok(record);
            }
        }

        let mut last_id = self.last_id.lock();

        // Re-check under the lock: another caller may have created it.
        if let Some(id) = self.by_url.get(long_url).map(|r| *r.value()) {
            if let Some(record) = self.lookup(id) {
                return Ok(record);
            }
        }

        let id = last_id
            .checked_add(1)
            .ok_or_else(|| anyhow::anyhow!("short-link id space exhausted"))?;
        let key: Arc<str> = Arc::from(long_url);

        // Insert by id first so a reader that finds the URL always finds the record.
        self.by_id.insert(
            id,
            Entry {
                long_url: Arc::clone(&key),
                visits: AtomicU64::new(0),
            },
        );
        self.by_url.insert(key, id);
        *last_id = id;

        tracing::debug!(id, long_url, "created short link");

        Ok(ShortUrlRecord {
            id,
            long_url: long_url.to_string(),
            visit_count: 0,
        })
    }

    async fn by_numeric_id(&self, id: u64) -> Result<ShortUrlRecord, ShortenerError> {
        self.lookup(id).ok_or(ShortenerError::NotFound)
    }

    async fn by_url(&self, long_url: &str) -> Result<ShortUrlRecord, ShortenerError> {
        let id = self
            .by_url
            .get(long_url)
            .map(|r| *r.value())
            .ok_or(ShortenerError::NotFound)?;
        self.by_numeric_id(id).await
    }

    async fn increment_visits(&self, id: u64) -> Result<u64, ShortenerError> {
        let entry = self.by_id.get(&id).ok_or(ShortenerError::NotFound)?;
        Ok(entry.visits.fetch_add(1, Ordering::AcqRel) + 1)
    }

    async fn check_health(&self) -> anyhow::Result<()> {
        Ok(())
    }
}
