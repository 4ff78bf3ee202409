//! Factory execution under the per-key lock.
//!
//! [`FactoryRunner::run`] owns the trickiest ordering in the library: the
//! factory, its write-through, and the lock release all happen inside one
//! spawned unit of work, while the caller merely awaits a channel. That way
//! the soft deadline can detach the caller without interrupting the factory,
//! the hard deadline can cancel the factory by dropping its future, and the
//! lock is released exactly once on every path, including the ones where
//! nobody is listening anymore.
//!
//! The write happens before the channel send and before the lock release, so
//! the next waiter on the key reads the fresh value through L1/L2 instead of
//! re-running the factory.

use std::future::Future;
use std::sync::Arc;

use cairn_core::{BoxError, CacheItemOptions, CacheKey, Spawner, SpawnerExt};
use serde::Serialize;
use tokio::sync::oneshot;
use tracing::{Instrument, debug, debug_span, warn};

use crate::error::CacheError;
use crate::lock::KeyGuard;
use crate::write::CacheStackWriter;

/// Runs value factories with soft/hard deadlines and write-through.
#[derive(Clone)]
pub struct FactoryRunner {
    writer: CacheStackWriter,
    spawner: Arc<dyn Spawner>,
}

impl FactoryRunner {
    /// Creates a runner writing through `writer` and detaching work onto
    /// `spawner`.
    pub fn new(writer: CacheStackWriter, spawner: Arc<dyn Spawner>) -> Self {
        Self { writer, spawner }
    }

    /// Executes `factory` for `key` while the caller holds `guard`.
    ///
    /// On completion the value is written through the stack and the guard is
    /// dropped, in that order. The hard deadline cancels the factory
    /// (best-effort, by dropping its future). The soft deadline, armed only
    /// when `has_fallback` and grace permit serving stale, returns
    /// [`CacheError::FactorySoftTimeout`] immediately while the factory runs
    /// on in the background, still bounded by the hard deadline.
    pub async fn run<T, F, Fut>(
        &self,
        key: &CacheKey,
        factory: F,
        has_fallback: bool,
        options: &CacheItemOptions,
        guard: KeyGuard,
    ) -> Result<T, CacheError>
    where
        T: Serialize + Send + Sync + 'static,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, BoxError>> + Send + 'static,
    {
        let soft_window = if options.soft_timeout_applies(has_fallback) {
            options.timeouts.soft
        } else {
            None
        };

        let (tx, rx) = oneshot::channel::<Result<T, CacheError>>();
        let span = debug_span!("factory", key = %key, cache_op = %options.id);
        let task = {
            let key = key.clone();
            let options = options.clone();
            let writer = self.writer.clone();
            let hard = options.timeouts.hard;
            let fut = factory();
            async move {
                let produced: Result<T, CacheError> = match hard {
                    Some(deadline) => match tokio::time::timeout(deadline, fut).await {
                        Ok(result) => result.map_err(|source| CacheError::Factory {
                            key: key.clone(),
                            source,
                        }),
                        Err(_) => Err(CacheError::FactoryHardTimeout { key: key.clone() }),
                    },
                    None => fut.await.map_err(|source| CacheError::Factory {
                        key: key.clone(),
                        source,
                    }),
                };

                let delivered = match produced {
                    Ok(value) => writer.set(&key, &value, &options).await.map(|()| value),
                    Err(error) => Err(error),
                };

                // The in-band write (or failure) is settled; the next waiter
                // may proceed and will read through the tiers.
                drop(guard);

                if let Err(undelivered) = tx.send(delivered) {
                    // The caller detached at its soft deadline.
                    match undelivered {
                        Ok(_) => debug!("factory completed after the caller detached"),
                        Err(error) => {
                            warn!(error = %error, "factory failed after the caller detached");
                        }
                    }
                }
            }
            .instrument(span)
        };
        self.spawner.spawn("factory", task);

        match soft_window {
            Some(window) => match tokio::time::timeout(window, rx).await {
                Ok(received) => settle(received, key),
                Err(_) => Err(CacheError::FactorySoftTimeout { key: key.clone() }),
            },
            None => settle(rx.await, key),
        }
    }
}

fn settle<T>(
    received: Result<Result<T, CacheError>, oneshot::error::RecvError>,
    key: &CacheKey,
) -> Result<T, CacheError> {
    match received {
        Ok(result) => result,
        // The task was dropped without sending (e.g. runtime shutdown or an
        // aborted spawner); surface it as a factory failure.
        Err(_) => Err(CacheError::Factory {
            key: key.clone(),
            source: "factory task dropped before completing".into(),
        }),
    }
}
