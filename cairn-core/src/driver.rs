//! The cache driver contract.
//!
//! A [`CacheDriver`] is one storage tier: a local in-process store (L1) or a
//! shared remote store (L2). Drivers deal exclusively in raw bytes; envelope
//! encoding and expiry semantics live above this trait. Physical expiry is
//! enforced here through the `ttl` passed to [`CacheDriver::set`].

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use smol_str::SmolStr;

use crate::error::DriverError;
use crate::item::Raw;
use crate::key::CacheKey;

/// Result alias for driver operations.
pub type DriverResult<T> = Result<T, DriverError>;

/// Contract implemented by every storage tier.
#[async_trait]
pub trait CacheDriver: Send + Sync {
    /// Reads the raw entry stored under `key`, if any.
    async fn get(&self, key: &CacheKey) -> DriverResult<Option<Raw>>;

    /// Writes `value` under `key`. `ttl` bounds the entry's physical
    /// lifetime; `None` stores without expiry. Returns whether the write was
    /// accepted.
    async fn set(&self, key: &CacheKey, value: Raw, ttl: Option<Duration>) -> DriverResult<bool>;

    /// Deletes the entry under `key`, reporting whether one existed.
    async fn delete(&self, key: &CacheKey) -> DriverResult<bool>;

    /// Removes every entry in this store.
    async fn clear(&self) -> DriverResult<()>;

    /// Releases any underlying connections. Further calls are undefined.
    async fn disconnect(&self) -> DriverResult<()>;

    /// Reads and deletes the entry under `key` in one operation.
    async fn pull(&self, key: &CacheKey) -> DriverResult<Option<Raw>> {
        let value = self.get(key).await?;
        if value.is_some() {
            self.delete(key).await?;
        }
        Ok(value)
    }

    /// Whether an entry exists under `key`.
    async fn has(&self, key: &CacheKey) -> DriverResult<bool> {
        Ok(self.get(key).await?.is_some())
    }

    /// Deletes several entries; `true` when every delete succeeded.
    async fn delete_many(&self, keys: &[CacheKey]) -> DriverResult<bool> {
        let mut all = true;
        for key in keys {
            all &= self.delete(key).await?;
        }
        Ok(all)
    }

    /// The name of this driver, for logs and event payloads.
    fn name(&self) -> &str {
        "driver"
    }
}

#[async_trait]
impl CacheDriver for Box<dyn CacheDriver> {
    async fn get(&self, key: &CacheKey) -> DriverResult<Option<Raw>> {
        (**self).get(key).await
    }

    async fn set(&self, key: &CacheKey, value: Raw, ttl: Option<Duration>) -> DriverResult<bool> {
        (**self).set(key, value, ttl).await
    }

    async fn delete(&self, key: &CacheKey) -> DriverResult<bool> {
        (**self).delete(key).await
    }

    async fn clear(&self) -> DriverResult<()> {
        (**self).clear().await
    }

    async fn disconnect(&self) -> DriverResult<()> {
        (**self).disconnect().await
    }

    async fn pull(&self, key: &CacheKey) -> DriverResult<Option<Raw>> {
        (**self).pull(key).await
    }

    async fn has(&self, key: &CacheKey) -> DriverResult<bool> {
        (**self).has(key).await
    }

    async fn delete_many(&self, keys: &[CacheKey]) -> DriverResult<bool> {
        (**self).delete_many(keys).await
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

#[async_trait]
impl CacheDriver for Arc<dyn CacheDriver> {
    async fn get(&self, key: &CacheKey) -> DriverResult<Option<Raw>> {
        (**self).get(key).await
    }

    async fn set(&self, key: &CacheKey, value: Raw, ttl: Option<Duration>) -> DriverResult<bool> {
        (**self).set(key, value, ttl).await
    }

    async fn delete(&self, key: &CacheKey) -> DriverResult<bool> {
        (**self).delete(key).await
    }

    async fn clear(&self) -> DriverResult<()> {
        (**self).clear().await
    }

    async fn disconnect(&self) -> DriverResult<()> {
        (**self).disconnect().await
    }

    async fn pull(&self, key: &CacheKey) -> DriverResult<Option<Raw>> {
        (**self).pull(key).await
    }

    async fn has(&self, key: &CacheKey) -> DriverResult<bool> {
        (**self).has(key).await
    }

    async fn delete_many(&self, keys: &[CacheKey]) -> DriverResult<bool> {
        (**self).delete_many(keys).await
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

/// A view over another driver whose keys are transparently prefixed.
///
/// Namespaces compose: wrapping a `NamespacedDriver` prefixes again on the
/// left. Note that [`clear`](CacheDriver::clear) and
/// [`disconnect`](CacheDriver::disconnect) act on the underlying store as a
/// whole; a namespace is a key view, not a partition.
pub struct NamespacedDriver {
    inner: Arc<dyn CacheDriver>,
    prefix: SmolStr,
    name: String,
}

impl NamespacedDriver {
    /// Wraps `inner`, prefixing every key with `{prefix}:`.
    pub fn new(inner: Arc<dyn CacheDriver>, prefix: impl Into<SmolStr>) -> Self {
        let prefix = prefix.into();
        let name = format!("{}[{}]", inner.name(), prefix);
        Self { inner, prefix, name }
    }

    fn scoped(&self, key: &CacheKey) -> CacheKey {
        key.namespaced(&self.prefix)
    }
}

#[async_trait]
impl CacheDriver for NamespacedDriver {
    async fn get(&self, key: &CacheKey) -> DriverResult<Option<Raw>> {
        self.inner.get(&self.scoped(key)).await
    }

    async fn set(&self, key: &CacheKey, value: Raw, ttl: Option<Duration>) -> DriverResult<bool> {
        self.inner.set(&self.scoped(key), value, ttl).await
    }

    async fn delete(&self, key: &CacheKey) -> DriverResult<bool> {
        self.inner.delete(&self.scoped(key)).await
    }

    async fn clear(&self) -> DriverResult<()> {
        self.inner.clear().await
    }

    async fn disconnect(&self) -> DriverResult<()> {
        self.inner.disconnect().await
    }

    async fn pull(&self, key: &CacheKey) -> DriverResult<Option<Raw>> {
        self.inner.pull(&self.scoped(key)).await
    }

    async fn has(&self, key: &CacheKey) -> DriverResult<bool> {
        self.inner.has(&self.scoped(key)).await
    }

    async fn delete_many(&self, keys: &[CacheKey]) -> DriverResult<bool> {
        let scoped: Vec<CacheKey> = keys.iter().map(|key| self.scoped(key)).collect();
        self.inner.delete_many(&scoped).await
    }

    fn name(&self) -> &str {
        &self.name
    }
}
