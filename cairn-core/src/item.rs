//! Cached entry representation.
//!
//! A [`CacheItem`] is one record in either tier: the value plus its expiry
//! metadata. Items are immutable after construction; transforms such as
//! [`CacheItem::extended_for_grace`] produce a new item.
//!
//! Two clocks govern an item's life. *Logical* expiry is when the value stops
//! being fresh for correctness purposes; a logically expired item may still be
//! served under a grace period. *Physical* expiry is when the storage tier
//! drops the record entirely, enforced through the driver TTL. Physical never
//! precedes logical. An optional *early expiration* point inside the fresh
//! window marks when a background refresh becomes worthwhile.

use std::time::Duration;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::key::CacheKey;
use crate::options::CacheItemOptions;

/// Raw byte data type for serialized cache entries.
///
/// `Bytes` makes cloning a reference-count bump.
pub type Raw = Bytes;

/// Freshness state of a cached item, relative to `now`.
#[derive(Debug, PartialEq, Eq)]
pub enum ItemState<Item> {
    /// Not logically expired; directly servable.
    Fresh(Item),
    /// Logically expired but physically present; a grace-period candidate.
    Stale(Item),
    /// Past physical expiry; must be treated as a miss.
    Expired(Item),
}

/// One record in a cache tier.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheItem<T> {
    key: CacheKey,
    value: T,
    logical_expires_at: DateTime<Utc>,
    physical_expires_at: DateTime<Utc>,
    early_expiration_at: Option<DateTime<Utc>>,
}

/// On-disk/wire shape of a [`CacheItem`]. The key travels outside the
/// envelope (it is the storage key).
#[derive(Serialize, Deserialize)]
struct Envelope<T> {
    value: T,
    logical_expires_at: DateTime<Utc>,
    physical_expires_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    early_expiration_at: Option<DateTime<Utc>>,
}

impl<T> CacheItem<T> {
    /// Creates an item with explicit expiry metadata.
    ///
    /// The physical expiry is clamped up to the logical expiry so the
    /// `physical >= logical` invariant holds by construction. An early
    /// expiration at or past the logical expiry is discarded.
    pub fn new(
        key: CacheKey,
        value: T,
        logical_expires_at: DateTime<Utc>,
        physical_expires_at: DateTime<Utc>,
        early_expiration_at: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            key,
            value,
            logical_expires_at,
            physical_expires_at: physical_expires_at.max(logical_expires_at),
            early_expiration_at: early_expiration_at.filter(|early| *early < logical_expires_at),
        }
    }

    /// Creates an item for a freshly produced value, deriving all expiry
    /// metadata from `options` at `now`.
    pub fn from_factory(
        key: CacheKey,
        value: T,
        options: &CacheItemOptions,
        now: DateTime<Utc>,
    ) -> Self {
        Self::new(
            key,
            value,
            options.logical_expires_from(now),
            options.physical_expires_from(now),
            options.early_expiration_from(now),
        )
    }

    /// The key this item is stored under.
    pub fn key(&self) -> &CacheKey {
        &self.key
    }

    /// Borrows the cached value.
    pub fn value(&self) -> &T {
        &self.value
    }

    /// Consumes the item, returning the cached value.
    pub fn into_value(self) -> T {
        self.value
    }

    /// Logical expiry timestamp.
    pub fn logical_expires_at(&self) -> DateTime<Utc> {
        self.logical_expires_at
    }

    /// Physical expiry timestamp.
    pub fn physical_expires_at(&self) -> DateTime<Utc> {
        self.physical_expires_at
    }

    /// Early-refresh timestamp, when configured.
    pub fn early_expiration_at(&self) -> Option<DateTime<Utc>> {
        self.early_expiration_at
    }

    /// Whether the item is logically expired at `now`.
    pub fn is_logically_expired(&self) -> bool {
        Utc::now() >= self.logical_expires_at
    }

    /// Whether the item is inside its early-refresh window: past the early
    /// expiration point but not yet logically expired.
    pub fn is_early_expired(&self) -> bool {
        let now = Utc::now();
        match self.early_expiration_at {
            Some(early) => now >= early && now < self.logical_expires_at,
            None => false,
        }
    }

    /// Classifies the item against the current time.
    pub fn state(self) -> ItemState<Self> {
        let now = Utc::now();
        if now >= self.physical_expires_at {
            ItemState::Expired(self)
        } else if now >= self.logical_expires_at {
            ItemState::Stale(self)
        } else {
            ItemState::Fresh(self)
        }
    }

    /// Time left until physical expiry, or `None` when already past it.
    ///
    /// Millisecond precision with a zero floor, for use as a driver TTL.
    pub fn remaining_physical_ttl(&self) -> Option<Duration> {
        remaining(self.physical_expires_at)
    }

    /// A new item whose logical expiry is pushed `fallback` past `now`, used
    /// when serving a stale value so the grace window absorbs repeated
    /// failures. The physical expiry is bumped to keep the item alive for
    /// `grace_duration` past the new logical expiry (never shortened).
    pub fn extended_for_grace(
        self,
        now: DateTime<Utc>,
        fallback: Duration,
        grace_duration: Duration,
    ) -> Self {
        let logical = now + to_chrono(fallback);
        let physical = (logical + to_chrono(grace_duration)).max(self.physical_expires_at);
        Self::new(self.key, self.value, logical, physical, None)
    }
}

impl<T: Serialize> CacheItem<T> {
    /// Serializes the item into its storage envelope.
    pub fn to_bytes(&self) -> Result<Raw, serde_json::Error> {
        let envelope = Envelope {
            value: &self.value,
            logical_expires_at: self.logical_expires_at,
            physical_expires_at: self.physical_expires_at,
            early_expiration_at: self.early_expiration_at,
        };
        serde_json::to_vec(&envelope).map(Bytes::from)
    }
}

impl<T: DeserializeOwned> CacheItem<T> {
    /// Decodes an item from its storage envelope.
    pub fn from_bytes(key: CacheKey, raw: &Raw) -> Result<Self, serde_json::Error> {
        let envelope: Envelope<T> = serde_json::from_slice(raw)?;
        Ok(Self::new(
            key,
            envelope.value,
            envelope.logical_expires_at,
            envelope.physical_expires_at,
            envelope.early_expiration_at,
        ))
    }
}

fn remaining(deadline: DateTime<Utc>) -> Option<Duration> {
    let millis = (deadline - Utc::now()).num_milliseconds();
    if millis <= 0 {
        None
    } else {
        Some(Duration::from_millis(millis as u64))
    }
}

fn to_chrono(duration: Duration) -> chrono::Duration {
    chrono::Duration::from_std(duration).unwrap_or(chrono::Duration::MAX)
}
