//! Moka-backed driver implementation.

use async_trait::async_trait;
use cairn_core::{CacheDriver, CacheKey, DriverResult, Raw};
use chrono::{DateTime, Utc};
use moka::future::Cache;
use smol_str::SmolStr;
use std::time::Duration;

/// One stored record: the raw payload plus its absolute expiry deadline.
///
/// The deadline is carried in the value so the cache's expiry policy can
/// derive a per-entry TTL from it (see `Expiration` in the builder).
#[derive(Clone, Debug)]
pub struct StoredEntry {
    pub(crate) payload: Raw,
    pub(crate) expires_at: Option<DateTime<Utc>>,
}

impl StoredEntry {
    pub(crate) fn new(payload: Raw, ttl: Option<Duration>) -> Self {
        let expires_at = ttl.map(|ttl| {
            Utc::now() + chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::MAX)
        });
        Self {
            payload,
            expires_at,
        }
    }

    fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|deadline| Utc::now() >= deadline)
    }
}

/// In-memory cache driver backed by [`moka`].
///
/// Typically used as the local (L1) tier. Entries expire individually at the
/// deadline derived from the TTL passed to [`CacheDriver::set`].
#[derive(Clone)]
pub struct MokaDriver {
    pub(crate) cache: Cache<CacheKey, StoredEntry>,
    pub(crate) name: SmolStr,
}

impl MokaDriver {
    /// Creates a builder.
    pub fn builder() -> crate::builder::MokaDriverBuilder {
        crate::builder::MokaDriverBuilder::new()
    }

    /// Access to the underlying moka cache, mainly for tests.
    pub fn cache(&self) -> &Cache<CacheKey, StoredEntry> {
        &self.cache
    }
}

impl std::fmt::Debug for MokaDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MokaDriver")
            .field("name", &self.name)
            .field("entry_count", &self.cache.entry_count())
            .finish()
    }
}

#[async_trait]
impl CacheDriver for MokaDriver {
    async fn get(&self, key: &CacheKey) -> DriverResult<Option<Raw>> {
        // Moka evicts lazily; filter entries whose deadline passed but which
        // have not been swept yet.
        Ok(self
            .cache
            .get(key)
            .await
            .filter(|entry| !entry.is_expired())
            .map(|entry| entry.payload))
    }

    async fn set(&self, key: &CacheKey, value: Raw, ttl: Option<Duration>) -> DriverResult<bool> {
        self.cache
            .insert(key.clone(), StoredEntry::new(value, ttl))
            .await;
        Ok(true)
    }

    async fn delete(&self, key: &CacheKey) -> DriverResult<bool> {
        Ok(self.cache.remove(key).await.is_some())
    }

    async fn clear(&self) -> DriverResult<()> {
        self.cache.invalidate_all();
        Ok(())
    }

    async fn disconnect(&self) -> DriverResult<()> {
        Ok(())
    }

    async fn has(&self, key: &CacheKey) -> DriverResult<bool> {
        Ok(self.get(key).await?.is_some())
    }

    fn name(&self) -> &str {
        &self.name
    }
}
