//! The two-tier driver stack.
//!
//! A [`CacheStack`] is the named pair of storage tiers a cache operates on:
//! a fast local tier and an optional slower shared tier. Reads consult local
//! then remote; writes go remote then local (see
//! [`CacheStackWriter`](crate::write::CacheStackWriter)).
//!
//! Typed accessors decode the stored envelope. An entry that fails to decode
//! is a cache miss, not an error; a schema change or a corrupt record must
//! never take the cache down. Remote driver read failures are likewise
//! downgraded to misses; only local tier failures propagate.

use std::sync::Arc;

use cairn_core::{
    CacheDriver, CacheEvent, CacheItem, CacheKey, EventSink, ItemState, NamespacedDriver,
    NoopEventSink,
};
use serde::de::DeserializeOwned;
use smol_str::SmolStr;
use thiserror::Error;
use tracing::{debug, warn};

use crate::error::CacheError;

/// A stack was configured without any storage tier.
#[derive(Debug, Error)]
#[error("cache stack `{name}` has neither a local nor a remote tier")]
pub struct StackConfigError {
    /// Name the stack was being built with.
    pub name: SmolStr,
}

/// Ordered pair of storage tiers with a uniform typed read surface.
#[derive(Clone)]
pub struct CacheStack {
    name: SmolStr,
    local: Option<Arc<dyn CacheDriver>>,
    remote: Option<Arc<dyn CacheDriver>>,
    sink: Arc<dyn EventSink>,
}

impl CacheStack {
    /// Creates a builder.
    pub fn builder() -> CacheStackBuilder {
        CacheStackBuilder::default()
    }

    /// The stack's name, used in logs and event payloads.
    pub fn name(&self) -> &SmolStr {
        &self.name
    }

    /// The local (L1) tier, when configured.
    pub fn local(&self) -> Option<&Arc<dyn CacheDriver>> {
        self.local.as_ref()
    }

    /// The remote (L2) tier, when configured.
    pub fn remote(&self) -> Option<&Arc<dyn CacheDriver>> {
        self.remote.as_ref()
    }

    /// Whether event payloads should be produced at all.
    pub fn events_enabled(&self) -> bool {
        self.sink.enabled()
    }

    /// Emits an event through the configured sink.
    pub fn emit(&self, event: CacheEvent) {
        self.sink.emit(event);
    }

    /// Reads `key` from the local tier.
    ///
    /// Returns the decoded item, including logically expired (stale) ones;
    /// callers decide whether grace applies. Physically expired records and
    /// undecodable records are misses. Local driver failures propagate.
    pub async fn read_local<T: DeserializeOwned>(
        &self,
        key: &CacheKey,
    ) -> Result<Option<CacheItem<T>>, CacheError> {
        let Some(local) = &self.local else {
            return Ok(None);
        };
        let Some(raw) = local.get(key).await? else {
            return Ok(None);
        };
        Ok(self.decode(key, &raw, local.name()))
    }

    /// Reads `key` from the remote tier.
    ///
    /// Remote failures are logged and reported as misses; the remote tier is
    /// best-effort shared state.
    pub async fn read_remote<T: DeserializeOwned>(&self, key: &CacheKey) -> Option<CacheItem<T>> {
        let remote = self.remote.as_ref()?;
        let raw = match remote.get(key).await {
            Ok(raw) => raw?,
            Err(error) => {
                warn!(
                    key = %key,
                    cache = %self.name,
                    error = %error,
                    "remote tier read failed, treating as miss"
                );
                return None;
            }
        };
        self.decode(key, &raw, remote.name())
    }

    fn decode<T: DeserializeOwned>(
        &self,
        key: &CacheKey,
        raw: &cairn_core::Raw,
        tier: &str,
    ) -> Option<CacheItem<T>> {
        let item = match CacheItem::<T>::from_bytes(key.clone(), raw) {
            Ok(item) => item,
            Err(error) => {
                debug!(
                    key = %key,
                    cache = %self.name,
                    tier,
                    error = %error,
                    "stored entry failed to decode, treating as miss"
                );
                return None;
            }
        };
        match item.state() {
            ItemState::Fresh(item) | ItemState::Stale(item) => Some(item),
            ItemState::Expired(_) => None,
        }
    }

    /// A view of this stack whose keys are transparently prefixed.
    pub fn namespace(&self, prefix: &str) -> CacheStack {
        let scope = |driver: &Arc<dyn CacheDriver>| -> Arc<dyn CacheDriver> {
            Arc::new(NamespacedDriver::new(driver.clone(), prefix))
        };
        CacheStack {
            name: SmolStr::new(format!("{}:{}", self.name, prefix)),
            local: self.local.as_ref().map(scope),
            remote: self.remote.as_ref().map(scope),
            sink: self.sink.clone(),
        }
    }
}

impl std::fmt::Debug for CacheStack {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheStack")
            .field("name", &self.name)
            .field("local", &self.local.as_ref().map(|d| d.name().to_owned()))
            .field("remote", &self.remote.as_ref().map(|d| d.name().to_owned()))
            .finish()
    }
}

/// Builder for [`CacheStack`].
pub struct CacheStackBuilder {
    name: SmolStr,
    local: Option<Arc<dyn CacheDriver>>,
    remote: Option<Arc<dyn CacheDriver>>,
    sink: Arc<dyn EventSink>,
}

impl Default for CacheStackBuilder {
    fn default() -> Self {
        Self {
            name: SmolStr::new_static("cache"),
            local: None,
            remote: None,
            sink: Arc::new(NoopEventSink),
        }
    }
}

impl CacheStackBuilder {
    /// Sets the stack name.
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

    /// Builds the stack. At least one tier must be configured.
    pub fn build(self) -> Result<CacheStack, StackConfigError> {
        if self.local.is_none() && self.remote.is_none() {
            return Err(StackConfigError { name: self.name });
        }
        Ok(CacheStack {
            name: self.name,
            local: self.local,
            remote: self.remote,
            sink: self.sink,
        })
    }
}
