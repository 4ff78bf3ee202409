//! Error types for cache operations.
//!
//! [`CacheError`] is the closed set of failure kinds the get-or-compute
//! protocol distinguishes; the recovery branches in the handler match on it
//! exhaustively. Errors that qualify for graced recovery never reach the
//! caller; a stale value and a `cache.hit { graced: true }` event do.

use cairn_core::{BoxError, CacheKey, DriverError};
use thiserror::Error;

use crate::lock::LockTimeout;

/// Error type for cache operations.
#[derive(Debug, Error)]
pub enum CacheError {
    /// The per-key lock could not be acquired within its configured window.
    ///
    /// Recoverable: a stale local item under an enabled grace period is
    /// served instead.
    #[error(transparent)]
    LockTimeout(#[from] LockTimeout),

    /// The factory exceeded its soft deadline while a fallback value exists.
    ///
    /// The factory keeps running in the background; the caller serves the
    /// stale value.
    #[error("factory for key `{key}` exceeded its soft timeout")]
    FactorySoftTimeout {
        /// Key the factory was computing.
        key: CacheKey,
    },

    /// The factory exceeded its hard deadline and was cancelled best-effort.
    #[error("factory for key `{key}` exceeded its hard timeout")]
    FactoryHardTimeout {
        /// Key the factory was computing.
        key: CacheKey,
    },

    /// The factory itself failed.
    #[error("factory for key `{key}` failed")]
    Factory {
        /// Key the factory was computing.
        key: CacheKey,
        /// The factory's error.
        #[source]
        source: BoxError,
    },

    /// A storage tier failed.
    ///
    /// Only local-tier failures and local write failures surface here;
    /// remote read errors are downgraded to misses and remote write errors
    /// to warnings.
    #[error(transparent)]
    Driver(#[from] DriverError),
}

impl CacheError {
    /// Whether this error came out of factory execution (as opposed to
    /// locking or storage), making a stale item a candidate replacement.
    pub fn is_factory_failure(&self) -> bool {
        matches!(
            self,
            Self::FactorySoftTimeout { .. }
                | Self::FactoryHardTimeout { .. }
                | Self::Factory { .. }
        )
    }
}
