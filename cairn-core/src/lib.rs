#![warn(missing_docs)]
//! # cairn-core
//!
//! Core types and traits for the `cairn` two-tier caching library.
//!
//! This crate defines the vocabulary shared by the orchestration crate
//! (`cairn`) and the driver crates (`cairn-moka`, ...):
//!
//! - **Represent** cached entries with logical/physical expiry ([`CacheItem`])
//! - **Resolve** per-call behavior ([`CacheItemOptions`])
//! - **Store** raw entries in a tier ([`CacheDriver`])
//! - **Observe** cache activity ([`CacheEvent`], [`EventSink`])
//! - **Detach** background work ([`Spawner`])

pub mod driver;
pub mod error;
pub mod event;
pub mod item;
pub mod key;
pub mod options;
pub mod spawner;

pub use driver::{CacheDriver, DriverResult, NamespacedDriver};
pub use error::{BoxError, DriverError};
pub use event::{CacheEvent, EventSink, NoopEventSink};
pub use item::{CacheItem, ItemState, Raw};
pub use key::CacheKey;
pub use options::{CacheItemOptions, CacheItemOptionsBuilder, FactoryTimeouts, GracePeriod};
pub use spawner::{BoxedTask, DisabledSpawner, Spawner, SpawnerExt};
