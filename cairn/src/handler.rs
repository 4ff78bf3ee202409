//! The get-or-compute orchestrator.
//!
//! [`GetSetHandler::handle`] is the protocol at the heart of the library.
//! Its stages, in order:
//!
//! 1. Optimistic local read without any lock; a fresh hit returns
//!    immediately (kicking off a background refresh if the item is inside
//!    its early-refresh window).
//! 2. Per-key lock acquisition, bounded by the applicable timeout; on
//!    timeout a stale local item may be served under grace.
//! 3. Double-checked local read under the lock, since another task may have
//!    filled the cache while we waited.
//! 4. Remote read-through: a fresh remote hit refills the local tier with
//!    the remaining TTL.
//! 5. Factory execution via [`FactoryRunner`], which owns the write-through
//!    and the lock release.
//! 6. Grace fallback on factory failure or soft timeout: the stale item is
//!    served, optionally rewritten into the local tier with an extended
//!    logical expiry so the window absorbs repeated failures.
//!
//! The lock is released exactly once on every path: stages 3 and 4 drop the
//! guard before returning, stage 5 hands it to the runner, and early returns
//! drop it by scope.

use std::future::Future;
use std::sync::Arc;

use bytes::Bytes;
use cairn_core::{
    BoxError, CacheEvent, CacheItem, CacheItemOptions, CacheKey, Spawner, SpawnerExt,
};
use chrono::Utc;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{Instrument, debug, debug_span, warn};

use crate::error::CacheError;
use crate::lock::LockRegistry;
use crate::runner::FactoryRunner;
use crate::stack::CacheStack;
use crate::write::CacheStackWriter;

/// Orchestrates the two-tier get-or-compute protocol.
#[derive(Clone)]
pub struct GetSetHandler {
    stack: Arc<CacheStack>,
    writer: CacheStackWriter,
    locks: LockRegistry,
    runner: FactoryRunner,
    spawner: Arc<dyn Spawner>,
}

impl GetSetHandler {
    /// Creates a handler over `stack`, coordinating through `locks` and
    /// detaching background work onto `spawner`.
    pub fn new(stack: Arc<CacheStack>, locks: LockRegistry, spawner: Arc<dyn Spawner>) -> Self {
        let writer = CacheStackWriter::new(stack.clone());
        let runner = FactoryRunner::new(writer.clone(), spawner.clone());
        Self {
            stack,
            writer,
            locks,
            runner,
            spawner,
        }
    }

    /// Returns the value for `key`, consulting the local tier, the remote
    /// tier and finally `factory`, under the per-key lock.
    pub async fn handle<T, F, Fut>(
        &self,
        key: &CacheKey,
        factory: F,
        options: &CacheItemOptions,
    ) -> Result<T, CacheError>
    where
        T: Serialize + DeserializeOwned + Send + Sync + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, BoxError>> + Send + 'static,
    {
        // Optimistic local read, no lock.
        let local_item = match self.stack.read_local::<T>(key).await? {
            Some(item) if !item.is_logically_expired() => {
                if item.is_early_expired() {
                    debug!(
                        key = %key,
                        cache = %self.stack.name(),
                        op_id = %options.id,
                        "inside the early-refresh window, refreshing in background"
                    );
                    self.spawn_early_refresh(key.clone(), factory, options.clone());
                }
                debug!(key = %key, cache = %self.stack.name(), op_id = %options.id, "local tier hit");
                self.emit_hit(&item, false);
                return Ok(item.into_value());
            }
            other => other,
        };

        // Lock acquisition, bounded by the applicable timeout.
        let lock = self.locks.checkout(key);
        let timeout = options.applicable_lock_timeout(local_item.is_some());
        let guard = match lock.acquire(timeout).await {
            Ok(guard) => guard,
            Err(timed_out) => {
                if options.grace_period.enabled {
                    if let Some(item) = local_item {
                        debug!(
                            key = %key,
                            cache = %self.stack.name(),
                            op_id = %options.id,
                            "lock acquisition timed out, serving stale value under grace"
                        );
                        self.emit_hit(&item, true);
                        return Ok(item.into_value());
                    }
                }
                return Err(timed_out.into());
            }
        };

        // Double-checked local read, lock held. Another task may have
        // completed the miss path while we waited.
        let local_item = match self.stack.read_local::<T>(key).await? {
            Some(item) if !item.is_logically_expired() => {
                drop(guard);
                debug!(
                    key = %key,
                    cache = %self.stack.name(),
                    op_id = %options.id,
                    "local tier hit after waiting on the lock"
                );
                self.emit_hit(&item, false);
                return Ok(item.into_value());
            }
            Some(stale) => Some(stale),
            None => local_item,
        };

        // Remote read-through, lock held.
        let remote_item = match self.stack.read_remote::<T>(key).await {
            Some(item) if !item.is_logically_expired() => {
                self.writer.refill_local(&item).await?;
                drop(guard);
                debug!(key = %key, cache = %self.stack.name(), op_id = %options.id, "remote tier hit");
                self.emit_hit(&item, false);
                return Ok(item.into_value());
            }
            other => other,
        };

        // Both tiers missed (or are stale): run the factory. The guard
        // travels into the runner, which releases it after the write.
        self.emit_miss(key);
        debug!(key = %key, cache = %self.stack.name(), op_id = %options.id, "both tiers missed, invoking factory");
        let has_fallback = local_item.is_some();
        match self.runner.run(key, factory, has_fallback, options, guard).await {
            Ok(value) => Ok(value),
            Err(error @ CacheError::FactorySoftTimeout { .. }) => match local_item {
                Some(item) => {
                    debug!(
                        key = %key,
                        cache = %self.stack.name(),
                        op_id = %options.id,
                        "factory exceeded its soft timeout, serving stale value"
                    );
                    self.apply_grace_fallback(item, options).await
                }
                None => Err(error),
            },
            Err(error) if error.is_factory_failure() => {
                match remote_item.or(local_item) {
                    Some(item) if options.grace_period.enabled => {
                        warn!(
                            key = %key,
                            cache = %self.stack.name(),
                            op_id = %options.id,
                            error = %error,
                            "factory failed, serving stale value under grace"
                        );
                        self.apply_grace_fallback(item, options).await
                    }
                    _ => Err(error),
                }
            }
            Err(error) => Err(error),
        }
    }

    /// Serves a stale item under grace, first persisting an extended logical
    /// expiry into the local tier when a fallback duration is configured, so
    /// reads in that window stop re-hitting the failing factory.
    async fn apply_grace_fallback<T: Serialize>(
        &self,
        item: CacheItem<T>,
        options: &CacheItemOptions,
    ) -> Result<T, CacheError> {
        let item = match options.grace_period.fallback_duration {
            Some(fallback) => {
                let extended =
                    item.extended_for_grace(Utc::now(), fallback, options.grace_period.duration);
                if let Err(error) = self.writer.refill_local(&extended).await {
                    warn!(
                        key = %extended.key(),
                        cache = %self.stack.name(),
                        op_id = %options.id,
                        error = %error,
                        "failed to persist grace extension"
                    );
                }
                extended
            }
            None => item,
        };
        self.emit_hit(&item, true);
        Ok(item.into_value())
    }

    /// Refreshes `key` in the background while the foreground caller is
    /// served the still-fresh value. The probe bows out when the key is
    /// locked, meaning a refresh or a full miss path is already in flight.
    /// Errors are logged, never surfaced.
    fn spawn_early_refresh<T, F, Fut>(&self, key: CacheKey, factory: F, options: CacheItemOptions)
    where
        T: Serialize + Send + Sync + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, BoxError>> + Send + 'static,
    {
        let lock = self.locks.checkout(&key);
        let writer = self.writer.clone();
        let span = debug_span!("early_refresh", key = %key, cache = %self.stack.name(), op_id = %options.id);
        self.spawner.spawn(
            "early_refresh",
            async move {
                let Some(_guard) = lock.try_acquire() else {
                    debug!("key already locked, skipping early refresh");
                    return;
                };
                let fut = factory();
                let produced = match options.timeouts.hard {
                    Some(deadline) => match tokio::time::timeout(deadline, fut).await {
                        Ok(result) => result,
                        Err(_) => {
                            warn!("early refresh factory exceeded the hard deadline");
                            return;
                        }
                    },
                    None => fut.await,
                };
                match produced {
                    Ok(value) => {
                        if let Err(error) = writer.set(&key, &value, &options).await {
                            warn!(error = %error, "early refresh write failed");
                        }
                    }
                    Err(error) => warn!(error = %error, "early refresh factory failed"),
                }
            }
            .instrument(span),
        );
    }

    fn emit_hit<T: Serialize>(&self, item: &CacheItem<T>, graced: bool) {
        if !self.stack.events_enabled() {
            return;
        }
        let value = serde_json::to_vec(item.value())
            .map(Bytes::from)
            .unwrap_or_default();
        self.stack.emit(CacheEvent::Hit {
            key: item.key().clone(),
            value,
            store: self.stack.name().clone(),
            graced,
        });
    }

    fn emit_miss(&self, key: &CacheKey) {
        if !self.stack.events_enabled() {
            return;
        }
        self.stack.emit(CacheEvent::Miss {
            key: key.clone(),
            store: self.stack.name().clone(),
        });
    }
}
