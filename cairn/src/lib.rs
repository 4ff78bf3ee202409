#![warn(missing_docs)]
//! # cairn
//!
//! A two-tier caching library: a fast local tier (L1) in front of a slower
//! shared tier (L2), with a get-or-compute core that prevents stampedes,
//! refreshes entries early in the background, and serves stale values under
//! a configurable grace period when the value factory fails or times out.
//!
//! ```ignore
//! use cairn::{Cache, CacheItemOptions, GracePeriod};
//! use cairn_moka::MokaDriver;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! let cache = Cache::builder()
//!     .name("app")
//!     .local(Arc::new(MokaDriver::builder().max_entries(10_000).build()))
//!     .default_options(
//!         CacheItemOptions::builder()
//!             .ttl(Duration::from_secs(60))
//!             .grace_period(GracePeriod::enabled(Duration::from_secs(600)))
//!             .build(),
//!     )
//!     .build()?;
//!
//! let value = cache.get_or_set("answer", || async { Ok(42u32) }).await?;
//! ```

/// The user-facing cache and its builder.
pub mod cache;

/// Error types for cache operations.
///
/// [`CacheError`] is the closed set of failure kinds the get-or-compute
/// protocol distinguishes: lock timeouts, soft/hard factory timeouts,
/// factory failures and driver failures.
pub mod error;

/// The get-or-compute orchestrator.
pub mod handler;

/// Per-key mutual exclusion with refcounted mutex lifecycle.
pub mod lock;

/// Factory execution with soft/hard deadlines and write-through.
pub mod runner;

/// Tokio-backed background task execution.
pub mod spawn;

/// The two-tier driver stack with typed reads.
pub mod stack;

/// Write-through policy (remote tier first, then local).
pub mod write;

pub use cache::{Cache, CacheBuilder};
pub use error::CacheError;
pub use handler::GetSetHandler;
pub use lock::{KeyGuard, KeyLock, LockRegistry, LockTimeout};
pub use runner::FactoryRunner;
pub use spawn::TaskSpawner;
pub use stack::{CacheStack, CacheStackBuilder, StackConfigError};
pub use write::CacheStackWriter;

pub use cairn_core::{
    BoxError, CacheDriver, CacheEvent, CacheItem, CacheItemOptions, CacheKey, DriverError,
    EventSink, GracePeriod, ItemState, NoopEventSink, Raw, Spawner, SpawnerExt,
};

/// The `cairn` prelude.
///
/// ```rust
/// use cairn::prelude::*;
/// ```
pub mod prelude {
    pub use crate::{Cache, CacheError, CacheItemOptions, CacheKey, GracePeriod};
}
