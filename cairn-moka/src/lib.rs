#![warn(missing_docs)]
//! # cairn-moka
//!
//! In-memory [`CacheDriver`](cairn_core::CacheDriver) for the `cairn`
//! caching library, backed by [`moka`]. Typically the local (L1) tier.
//!
//! ```
//! use cairn_moka::MokaDriver;
//!
//! let driver = MokaDriver::builder().max_entries(50_000).build();
//! ```

mod builder;
mod driver;

pub use builder::MokaDriverBuilder;
pub use driver::{MokaDriver, StoredEntry};
