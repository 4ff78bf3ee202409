//! Per-call cache options.
//!
//! [`CacheItemOptions`] is the immutable bundle of knobs resolved for a single
//! get-or-compute call: lifetimes, factory deadlines, the grace window and the
//! early-refresh point. All durations are wall-clock spans; derivations into
//! absolute timestamps happen against a caller-supplied `now` so that a single
//! options value produces consistent expiry metadata for one write.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

/// Grace window configuration.
///
/// While grace is enabled, a logically expired item is kept in the tiers for
/// `duration` past its logical expiry and may be served when the factory
/// fails, times out softly, or the per-key lock cannot be acquired in time.
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct GracePeriod {
    /// Whether stale values may be served at all.
    #[serde(default)]
    pub enabled: bool,
    /// How long past logical expiry an item stays physically alive (e.g. "6h").
    #[serde(default = "GracePeriod::default_duration", with = "humantime_serde")]
    pub duration: Duration,
    /// Logical-expiry extension applied when a stale value is served, so the
    /// window absorbs repeated factory failures (e.g. "10s").
    #[serde(default, with = "humantime_serde::option")]
    pub fallback_duration: Option<Duration>,
}

impl GracePeriod {
    const DEFAULT_DURATION: Duration = Duration::from_secs(6 * 60 * 60);

    fn default_duration() -> Duration {
        Self::DEFAULT_DURATION
    }

    /// A disabled grace period.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            duration: Self::DEFAULT_DURATION,
            fallback_duration: None,
        }
    }

    /// An enabled grace period keeping items alive for `duration` past
    /// logical expiry.
    pub fn enabled(duration: Duration) -> Self {
        Self {
            enabled: true,
            duration,
            fallback_duration: None,
        }
    }

    /// Sets the fallback extension applied on graced returns.
    pub fn with_fallback(mut self, fallback: Duration) -> Self {
        self.fallback_duration = Some(fallback);
        self
    }
}

impl Default for GracePeriod {
    fn default() -> Self {
        Self::disabled()
    }
}

/// Factory execution deadlines.
///
/// `soft` bounds how long a caller waits when a stale fallback exists; the
/// factory keeps running past it. `hard` terminates the factory outright.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, Eq, PartialEq)]
pub struct FactoryTimeouts {
    /// Degrade-to-stale deadline. Only meaningful when a fallback value
    /// exists and grace is enabled.
    #[serde(default, with = "humantime_serde::option")]
    pub soft: Option<Duration>,
    /// Abort deadline. The factory is cancelled best-effort when it fires.
    #[serde(default, with = "humantime_serde::option")]
    pub hard: Option<Duration>,
}

static OP_COUNTER: AtomicU64 = AtomicU64::new(0);

fn next_op_id() -> SmolStr {
    let id = OP_COUNTER.fetch_add(1, Ordering::Relaxed);
    SmolStr::new(format!("op-{id}"))
}

/// Resolved options for a single cache operation.
///
/// Construct via [`CacheItemOptions::builder`]. Every build gets a fresh
/// operation id used in logs to correlate the stages of one call.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CacheItemOptions {
    /// Operation id for telemetry.
    #[serde(skip, default = "next_op_id")]
    pub id: SmolStr,
    /// Logical lifetime of a freshly written value.
    #[serde(with = "humantime_serde")]
    pub ttl: Duration,
    /// Fraction of `ttl` (exclusive 0..1) after which a background refresh
    /// becomes eligible.
    #[serde(default)]
    pub early_expiration_percentage: Option<f64>,
    /// Stale-serving policy.
    #[serde(default)]
    pub grace_period: GracePeriod,
    /// Factory deadlines.
    #[serde(default)]
    pub timeouts: FactoryTimeouts,
    /// Explicit upper bound for per-key lock acquisition.
    #[serde(default, with = "humantime_serde::option")]
    pub lock_timeout: Option<Duration>,
}

impl CacheItemOptions {
    /// Creates a builder with the default options.
    pub fn builder() -> CacheItemOptionsBuilder {
        CacheItemOptionsBuilder::default()
    }

    /// A copy of these options carrying a fresh operation id.
    ///
    /// Used when one stored options value serves many calls (e.g. a cache's
    /// defaults) so each call still logs under its own id.
    pub fn refreshed_id(&self) -> Self {
        Self {
            id: next_op_id(),
            ..self.clone()
        }
    }

    /// The wait bound for acquiring the per-key lock.
    ///
    /// An explicit `lock_timeout` always wins. Otherwise, when a stale
    /// fallback exists and grace is enabled, the soft timeout bounds the wait
    /// (no point waiting longer than we would wait for the factory itself
    /// before degrading to stale). Otherwise the hard timeout applies, or the
    /// wait is unbounded.
    pub fn applicable_lock_timeout(&self, has_fallback: bool) -> Option<Duration> {
        if let Some(explicit) = self.lock_timeout {
            return Some(explicit);
        }
        if has_fallback && self.grace_period.enabled {
            self.timeouts.soft.or(self.timeouts.hard)
        } else {
            self.timeouts.hard
        }
    }

    /// Whether the soft timeout can fire for this call.
    pub fn soft_timeout_applies(&self, has_fallback: bool) -> bool {
        self.timeouts.soft.is_some() && has_fallback && self.grace_period.enabled
    }

    /// Logical expiry for a value created at `now`.
    pub fn logical_expires_from(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now + to_chrono(self.ttl)
    }

    /// Physical expiry for a value created at `now`.
    ///
    /// With grace enabled the item outlives its logical expiry by the grace
    /// duration; otherwise both expiries coincide.
    pub fn physical_expires_from(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let logical = self.logical_expires_from(now);
        if self.grace_period.enabled {
            logical + to_chrono(self.grace_period.duration)
        } else {
            logical
        }
    }

    /// Early-refresh point for a value created at `now`, when configured.
    ///
    /// Percentages outside the exclusive (0, 1) range disable early refresh.
    pub fn early_expiration_from(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let p = self.early_expiration_percentage?;
        if !(p > 0.0 && p < 1.0) {
            return None;
        }
        Some(now + to_chrono(self.ttl.mul_f64(p)))
    }
}

impl Default for CacheItemOptions {
    fn default() -> Self {
        CacheItemOptionsBuilder::default().build()
    }
}

fn to_chrono(duration: Duration) -> chrono::Duration {
    chrono::Duration::from_std(duration).unwrap_or(chrono::Duration::MAX)
}

/// Builder for [`CacheItemOptions`].
#[derive(Debug, Clone)]
pub struct CacheItemOptionsBuilder {
    ttl: Duration,
    early_expiration_percentage: Option<f64>,
    grace_period: GracePeriod,
    timeouts: FactoryTimeouts,
    lock_timeout: Option<Duration>,
}

impl Default for CacheItemOptionsBuilder {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(30),
            early_expiration_percentage: None,
            grace_period: GracePeriod::disabled(),
            timeouts: FactoryTimeouts::default(),
            lock_timeout: None,
        }
    }
}

impl CacheItemOptionsBuilder {
    /// Sets the logical TTL.
    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Sets the early-refresh percentage (exclusive 0..1).
    pub fn early_expiration_percentage(mut self, percentage: f64) -> Self {
        self.early_expiration_percentage = Some(percentage);
        self
    }

    /// Sets the grace period.
    pub fn grace_period(mut self, grace: GracePeriod) -> Self {
        self.grace_period = grace;
        self
    }

    /// Sets the soft factory timeout.
    pub fn soft_timeout(mut self, timeout: Duration) -> Self {
        self.timeouts.soft = Some(timeout);
        self
    }

    /// Sets the hard factory timeout.
    pub fn hard_timeout(mut self, timeout: Duration) -> Self {
        self.timeouts.hard = Some(timeout);
        self
    }

    /// Sets an explicit lock acquisition timeout.
    pub fn lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = Some(timeout);
        self
    }

    /// Builds the options with a fresh operation id.
    pub fn build(self) -> CacheItemOptions {
        CacheItemOptions {
            id: next_op_id(),
            ttl: self.ttl,
            early_expiration_percentage: self.early_expiration_percentage,
            grace_period: self.grace_period,
            timeouts: self.timeouts,
            lock_timeout: self.lock_timeout,
        }
    }
}
