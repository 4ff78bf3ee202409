//! Spawner trait for background task execution.
//!
//! The get-or-compute protocol produces detached units of work (early
//! refreshes, post-soft-timeout factory continuations). The [`Spawner`]
//! trait is the single seam through which the host chooses the concurrency
//! substrate; the `cairn` crate ships a tokio-backed implementation.

use std::future::Future;
use std::pin::Pin;

use smol_str::SmolStr;

/// A boxed unit of background work.
pub type BoxedTask = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// Trait for spawning background tasks.
///
/// `kind` labels the task type (e.g. "early_refresh", "factory") for
/// tracing. Spawned tasks must never propagate errors to foreground callers.
pub trait Spawner: Send + Sync {
    /// Spawns a boxed future to run in the background.
    fn spawn_boxed(&self, kind: SmolStr, task: BoxedTask);
}

/// Extension methods for [`Spawner`].
pub trait SpawnerExt: Spawner {
    /// Spawns a future, boxing it.
    fn spawn<F>(&self, kind: impl Into<SmolStr>, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.spawn_boxed(kind.into(), Box::pin(task));
    }
}

impl<S: Spawner + ?Sized> SpawnerExt for S {}

/// Spawner that drops every task.
///
/// Suppresses all spawned work. Note that factory execution itself runs as a
/// spawned unit (so it can outlive a soft-timeout caller), so a cache built
/// on this spawner can serve reads and writes but every factory invocation
/// fails. Intended for passthrough-only setups and tests that must not
/// spawn.
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledSpawner;

impl Spawner for DisabledSpawner {
    fn spawn_boxed(&self, _kind: SmolStr, _task: BoxedTask) {}
}
