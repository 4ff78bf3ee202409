//! Write-through policy.
//!
//! All value writes funnel through [`CacheStackWriter`]: build the item,
//! serialize once, write the remote tier first, then the local tier. The
//! ordering gives readers a useful guarantee: any task that observes the
//! local write can rely on the remote write having already completed.
//!
//! A remote write failure does not abort the local write; the locally served
//! value remains authoritative for this process and the failure is logged.
//! A local write failure is fatal to the operation.

use std::sync::Arc;

use cairn_core::{CacheEvent, CacheItem, CacheItemOptions, CacheKey, DriverError, Raw};
use chrono::Utc;
use serde::Serialize;
use tracing::{trace, warn};

use crate::error::CacheError;
use crate::stack::CacheStack;

/// Serializes items and pushes them through the tiers in write-through order.
#[derive(Clone)]
pub struct CacheStackWriter {
    stack: Arc<CacheStack>,
}

impl CacheStackWriter {
    /// Creates a writer over `stack`.
    pub fn new(stack: Arc<CacheStack>) -> Self {
        Self { stack }
    }

    /// Writes `value` under `key`, deriving expiry metadata from `options`.
    pub async fn set<T: Serialize>(
        &self,
        key: &CacheKey,
        value: &T,
        options: &CacheItemOptions,
    ) -> Result<(), CacheError> {
        let item = CacheItem::from_factory(key.clone(), value, options, Utc::now());
        let raw = item.to_bytes().map_err(DriverError::internal)?;
        self.write_through(key, raw, &item).await
    }

    /// Rewrites an existing item into the local tier only, with its
    /// remaining physical TTL. Used to refill L1 from a remote hit and to
    /// persist a grace-extended item.
    pub async fn refill_local<T: Serialize>(&self, item: &CacheItem<T>) -> Result<(), CacheError> {
        let Some(local) = self.stack.local() else {
            return Ok(());
        };
        let raw = item.to_bytes().map_err(DriverError::internal)?;
        local
            .set(item.key(), raw, item.remaining_physical_ttl())
            .await?;
        trace!(
            key = %item.key(),
            cache = %self.stack.name(),
            "local tier refilled"
        );
        Ok(())
    }

    async fn write_through<T>(
        &self,
        key: &CacheKey,
        raw: Raw,
        item: &CacheItem<T>,
    ) -> Result<(), CacheError> {
        let ttl = item.remaining_physical_ttl();

        if let Some(remote) = self.stack.remote() {
            match remote.set(key, raw.clone(), ttl).await {
                Ok(_) => trace!(key = %key, cache = %self.stack.name(), "remote tier written"),
                Err(error) => warn!(
                    key = %key,
                    cache = %self.stack.name(),
                    error = %error,
                    "remote tier write failed, local value remains authoritative"
                ),
            }
        }

        if let Some(local) = self.stack.local() {
            local.set(key, raw, ttl).await?;
            trace!(key = %key, cache = %self.stack.name(), "local tier written");
        }

        self.stack.emit(CacheEvent::Written {
            key: key.clone(),
            store: self.stack.name().clone(),
        });
        Ok(())
    }
}
