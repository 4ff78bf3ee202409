//! Builder for configuring [`MokaDriver`].

use std::time::{Duration, Instant};

use cairn_core::CacheKey;
use chrono::Utc;
use moka::Expiry;
use moka::future::CacheBuilder;
use smol_str::SmolStr;

use crate::driver::{MokaDriver, StoredEntry};

/// Expiration policy deriving per-entry TTLs from [`StoredEntry`] deadlines.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
struct Expiration;

impl Expiry<CacheKey, StoredEntry> for Expiration {
    fn expire_after_create(
        &self,
        _key: &CacheKey,
        value: &StoredEntry,
        _created_at: Instant,
    ) -> Option<Duration> {
        Self::calculate_ttl(value)
    }

    fn expire_after_update(
        &self,
        _key: &CacheKey,
        value: &StoredEntry,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        // Always use the NEW entry's deadline. The default implementation
        // returns `duration_until_expiry`, which would keep the OLD deadline
        // and expire refreshed entries prematurely.
        Self::calculate_ttl(value)
    }
}

impl Expiration {
    fn calculate_ttl(value: &StoredEntry) -> Option<Duration> {
        value.expires_at.map(|deadline| {
            let delta = deadline - Utc::now();
            // Millisecond precision, zero floor for already-passed deadlines.
            let millis = delta.num_milliseconds();
            if millis <= 0 {
                Duration::ZERO
            } else {
                Duration::from_millis(millis as u64)
            }
        })
    }
}

/// Builder for [`MokaDriver`].
///
/// ```
/// use cairn_moka::MokaDriver;
///
/// let driver = MokaDriver::builder().max_entries(10_000).name("l1").build();
/// ```
pub struct MokaDriverBuilder {
    max_entries: u64,
    name: SmolStr,
}

impl MokaDriverBuilder {
    /// Creates a builder with the default capacity of 10 000 entries.
    pub fn new() -> Self {
        Self {
            max_entries: 10_000,
            name: SmolStr::new_static("moka"),
        }
    }

    /// Sets the maximum number of entries; least recently used entries are
    /// evicted beyond it.
    pub fn max_entries(mut self, max_entries: u64) -> Self {
        self.max_entries = max_entries;
        self
    }

    /// Sets the driver name used in logs and event payloads.
    pub fn name(mut self, name: impl Into<SmolStr>) -> Self {
        self.name = name.into();
        self
    }

    /// Builds the driver.
    pub fn build(self) -> MokaDriver {
        let cache = CacheBuilder::new(self.max_entries)
            .expire_after(Expiration)
            .build();
        MokaDriver {
            cache,
            name: self.name,
        }
    }
}

impl Default for MokaDriverBuilder {
    fn default() -> Self {
        Self::new()
    }
}
