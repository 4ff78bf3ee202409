//! Error types for driver operations.

use thiserror::Error;

/// Boxed error source coming out of a concrete driver.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Error type for cache driver operations.
///
/// Distinguishes local state/computation failures from network interaction
/// failures so tier policy can treat them differently (remote connection
/// errors are routinely downgraded to misses or warnings).
#[derive(Debug, Error)]
pub enum DriverError {
    /// Internal driver error, state or computation failure.
    #[error(transparent)]
    Internal(BoxError),

    /// Network interaction error while talking to a remote store.
    #[error(transparent)]
    Connection(BoxError),
}

impl DriverError {
    /// Wraps an error as an internal driver failure.
    pub fn internal(source: impl Into<BoxError>) -> Self {
        Self::Internal(source.into())
    }

    /// Wraps an error as a connection failure.
    pub fn connection(source: impl Into<BoxError>) -> Self {
        Self::Connection(source.into())
    }
}
