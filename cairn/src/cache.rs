//! The user-facing cache.
//!
//! [`Cache`] bundles a [`CacheStack`], a lock registry, and a spawner behind
//! one API: [`Cache::get_or_set`] runs the full get-or-compute protocol, the
//! remaining operations are thin passthroughs over the tier drivers.
//!
//! Namespacing composes at the key level (`Cache::namespace` prefixes every
//! key before it reaches the stack) rather than by wrapping drivers, so two
//! handles to the same namespace contend on the same per-key locks and
//! stampede prevention keeps working across them.

use std::future::Future;
use std::sync::Arc;

use cairn_core::{
    BoxError, CacheDriver, CacheEvent, CacheItemOptions, CacheKey, EventSink, NoopEventSink,
    Spawner,
};
use serde::Serialize;
use serde::de::DeserializeOwned;
use smol_str::SmolStr;
use tracing::warn;

use crate::error::CacheError;
use crate::handler::GetSetHandler;
use crate::lock::LockRegistry;
use crate::spawn::TaskSpawner;
use crate::stack::{CacheStack, StackConfigError};
use crate::write::CacheStackWriter;

/// A two-tier cache.
///
/// Cloning is cheap and shares tiers, locks and background tasks.
///
/// # Example
///
/// ```ignore
/// use cairn::{Cache, CacheItemOptions};
/// use cairn_moka::MokaDriver;
/// use std::sync::Arc;
///
/// let cache = Cache::builder()
///     .name("app")
///     .local(Arc::new(MokaDriver::builder().max_entries(10_000).build()))
///     .build()?;
///
/// let user = cache
///     .get_or_set("users:42", || async { load_user(42).await })
///     .await?;
/// ```
#[derive(Clone)]
pub struct Cache {
    stack: Arc<CacheStack>,
    handler: GetSetHandler,
    writer: CacheStackWriter,
    default_options: CacheItemOptions,
    prefix: Option<SmolStr>,
}

impl Cache {
    /// Creates a builder.
    pub fn builder() -> CacheBuilder {
        CacheBuilder::default()
    }

    /// The underlying stack.
    pub fn stack(&self) -> &Arc<CacheStack> {
        &self.stack
    }

    /// The options used when a call does not supply its own.
    pub fn default_options(&self) -> &CacheItemOptions {
        &self.default_options
    }

    /// A view of this cache whose keys are transparently prefixed.
    pub fn namespace(&self, prefix: &str) -> Cache {
        let prefix = match &self.prefix {
            Some(existing) => SmolStr::new(format!("{existing}:{prefix}")),
            None => SmolStr::new(prefix),
        };
        Cache {
            prefix: Some(prefix),
            ..self.clone()
        }
    }

    fn scoped(&self, key: CacheKey) -> CacheKey {
        match &self.prefix {
            Some(prefix) => key.namespaced(prefix),
            None => key,
        }
    }

    /// Returns the cached value for `key`, computing it with `factory` on a
    /// miss. Uses the cache's default options.
    pub async fn get_or_set<T, F, Fut>(
        &self,
        key: impl Into<CacheKey>,
        factory: F,
    ) -> Result<T, CacheError>
    where
        T: Serialize + DeserializeOwned + Send + Sync + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, BoxError>> + Send + 'static,
    {
        let options = self.default_options.refreshed_id();
        self.get_or_set_with(key, factory, options).await
    }

    /// [`Cache::get_or_set`] with explicit per-call options.
    pub async fn get_or_set_with<T, F, Fut>(
        &self,
        key: impl Into<CacheKey>,
        factory: F,
        options: CacheItemOptions,
    ) -> Result<T, CacheError>
    where
        T: Serialize + DeserializeOwned + Send + Sync + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, BoxError>> + Send + 'static,
    {
        let key = self.scoped(key.into());
        self.handler.handle(&key, factory, &options).await
    }

    /// Reads the fresh value for `key`, refilling the local tier on a remote
    /// hit. Stale values are not returned.
    pub async fn get<T: DeserializeOwned + Serialize>(
        &self,
        key: impl Into<CacheKey>,
    ) -> Result<Option<T>, CacheError> {
        let key = self.scoped(key.into());
        if let Some(item) = self.stack.read_local::<T>(&key).await? {
            if !item.is_logically_expired() {
                return Ok(Some(item.into_value()));
            }
        }
        if let Some(item) = self.stack.read_remote::<T>(&key).await {
            if !item.is_logically_expired() {
                self.writer.refill_local(&item).await?;
                return Ok(Some(item.into_value()));
            }
        }
        Ok(None)
    }

    /// Writes `value` under `key` with the cache's default options.
    pub async fn set<T: Serialize>(
        &self,
        key: impl Into<CacheKey>,
        value: &T,
    ) -> Result<(), CacheError> {
        let options = self.default_options.refreshed_id();
        self.set_with(key, value, options).await
    }

    /// [`Cache::set`] with explicit options.
    pub async fn set_with<T: Serialize>(
        &self,
        key: impl Into<CacheKey>,
        value: &T,
        options: CacheItemOptions,
    ) -> Result<(), CacheError> {
        let key = self.scoped(key.into());
        self.writer.set(&key, value, &options).await
    }

    /// Reads and deletes `key` in one operation, returning the fresh value
    /// when one existed.
    pub async fn pull<T: DeserializeOwned>(
        &self,
        key: impl Into<CacheKey>,
    ) -> Result<Option<T>, CacheError> {
        let key = self.scoped(key.into());
        let mut value = None;
        if let Some(item) = self.stack.read_local::<T>(&key).await? {
            if !item.is_logically_expired() {
                value = Some(item.into_value());
            }
        }
        if value.is_none() {
            if let Some(item) = self.stack.read_remote::<T>(&key).await {
                if !item.is_logically_expired() {
                    value = Some(item.into_value());
                }
            }
        }
        self.delete_scoped(&key).await?;
        Ok(value)
    }

    /// Whether any tier holds an entry for `key`.
    pub async fn has(&self, key: impl Into<CacheKey>) -> Result<bool, CacheError> {
        let key = self.scoped(key.into());
        if let Some(local) = self.stack.local() {
            if local.has(&key).await? {
                return Ok(true);
            }
        }
        if let Some(remote) = self.stack.remote() {
            match remote.has(&key).await {
                Ok(found) => return Ok(found),
                Err(error) => warn!(
                    key = %key,
                    cache = %self.stack.name(),
                    error = %error,
                    "remote tier has() failed, treating as absent"
                ),
            }
        }
        Ok(false)
    }

    /// Deletes `key` from every tier, reporting whether any held it.
    pub async fn delete(&self, key: impl Into<CacheKey>) -> Result<bool, CacheError> {
        let key = self.scoped(key.into());
        self.delete_scoped(&key).await
    }

    /// Deletes several keys from every tier; `true` when every local delete
    /// found an entry.
    pub async fn delete_many(
        &self,
        keys: impl IntoIterator<Item = impl Into<CacheKey>>,
    ) -> Result<bool, CacheError> {
        let keys: Vec<CacheKey> = keys.into_iter().map(|k| self.scoped(k.into())).collect();
        if let Some(remote) = self.stack.remote() {
            if let Err(error) = remote.delete_many(&keys).await {
                warn!(
                    cache = %self.stack.name(),
                    error = %error,
                    "remote tier delete_many failed"
                );
            }
        }
        let mut all = true;
        if let Some(local) = self.stack.local() {
            all = local.delete_many(&keys).await?;
        }
        for key in keys {
            self.stack.emit(CacheEvent::Deleted {
                key,
                store: self.stack.name().clone(),
            });
        }
        Ok(all)
    }

    /// Empties every tier.
    ///
    /// Note: on a namespaced view this clears the underlying stores as a
    /// whole; a namespace is a key view, not a partition.
    pub async fn clear(&self) -> Result<(), CacheError> {
        if let Some(remote) = self.stack.remote() {
            remote.clear().await?;
        }
        if let Some(local) = self.stack.local() {
            local.clear().await?;
        }
        Ok(())
    }

    /// Disconnects every tier.
    pub async fn disconnect(&self) -> Result<(), CacheError> {
        if let Some(remote) = self.stack.remote() {
            remote.disconnect().await?;
        }
        if let Some(local) = self.stack.local() {
            local.disconnect().await?;
        }
        Ok(())
    }

    async fn delete_scoped(&self, key: &CacheKey) -> Result<bool, CacheError> {
        let mut deleted = false;
        if let Some(remote) = self.stack.remote() {
            match remote.delete(key).await {
                Ok(found) => deleted |= found,
                Err(error) => warn!(
                    key = %key,
                    cache = %self.stack.name(),
                    error = %error,
                    "remote tier delete failed"
                ),
            }
        }
        if let Some(local) = self.stack.local() {
            deleted |= local.delete(key).await?;
        }
        if deleted {
            self.stack.emit(CacheEvent::Deleted {
                key: key.clone(),
                store: self.stack.name().clone(),
            });
        }
        Ok(deleted)
    }
}

impl std::fmt::Debug for Cache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cache")
            .field("stack", &self.stack)
            .field("prefix", &self.prefix)
            .finish()
    }
}

/// Builder for [`Cache`].
pub struct CacheBuilder {
    name: SmolStr,
    local: Option<Arc<dyn CacheDriver>>,
    remote: Option<Arc<dyn CacheDriver>>,
    sink: Arc<dyn EventSink>,
    spawner: Option<Arc<dyn Spawner>>,
    default_options: CacheItemOptions,
}

impl Default for CacheBuilder {
    fn default() -> Self {
        Self {
            name: SmolStr::new_static("cache"),
            local: None,
            remote: None,
            sink: Arc::new(NoopEventSink),
            spawner: None,
            default_options: CacheItemOptions::default(),
        }
    }
}

impl CacheBuilder {
    /// Sets the cache name, used in logs and event payloads.
    pub fn name(mut self, name: impl Into<SmolStr>) -> Self {
        self.name = name.into();
        self
    }

    /// Sets the local (L1) tier.
    pub fn local(mut self, driver: Arc<dyn CacheDriver>) -> Self {
        self.local = Some(driver);
        self
    }

    /// Sets the remote (L2) tier.
    pub fn remote(mut self, driver: Arc<dyn CacheDriver>) -> Self {
        self.remote = Some(driver);
        self
    }

    /// Sets the event sink.
    pub fn event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Sets the background-work spawner. Defaults to a [`TaskSpawner`] on
    /// the ambient tokio runtime.
    pub fn spawner(mut self, spawner: Arc<dyn Spawner>) -> Self {
        self.spawner = Some(spawner);
        self
    }

    /// Sets the options used when a call does not supply its own.
    pub fn default_options(mut self, options: CacheItemOptions) -> Self {
        self.default_options = options;
        self
    }

    /// Builds the cache. At least one tier must be configured.
    pub fn build(self) -> Result<Cache, StackConfigError> {
        let mut stack = CacheStack::builder().name(self.name).event_sink(self.sink);
        if let Some(local) = self.local {
            stack = stack.local(local);
        }
        if let Some(remote) = self.remote {
            stack = stack.remote(remote);
        }
        let stack = Arc::new(stack.build()?);

        let spawner = self
            .spawner
            .unwrap_or_else(|| Arc::new(TaskSpawner::new()) as Arc<dyn Spawner>);
        let locks = LockRegistry::new();
        let handler = GetSetHandler::new(stack.clone(), locks, spawner);
        let writer = CacheStackWriter::new(stack.clone());

        Ok(Cache {
            stack,
            handler,
            writer,
            default_options: self.default_options,
            prefix: None,
        })
    }
}
