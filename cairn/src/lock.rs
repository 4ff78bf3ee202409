//! Per-key mutual exclusion.
//!
//! [`LockRegistry`] maps keys to reference-counted mutexes so that at most
//! one factory runs per key per process. The registry itself is guarded by a
//! short synchronous critical section around lookup, insert and remove,
//! never held across an `.await`, so create-vs-destroy races can neither
//! leak an entry nor hand two tasks different mutexes for the same key.
//!
//! Lifecycle is RAII throughout: checking out a [`KeyLock`] increments the
//! key's refcount, dropping it (or the [`KeyGuard`] that subsumes it)
//! decrements and removes the entry at zero. Release is therefore idempotent
//! and happens exactly once on every path, including timeouts and panics.

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use cairn_core::CacheKey;
use thiserror::Error;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Failure to acquire a per-key lock within its configured window.
#[derive(Debug, Error)]
#[error("timed out acquiring the lock for key `{key}`")]
pub struct LockTimeout {
    /// Key whose lock could not be acquired.
    pub key: CacheKey,
}

#[derive(Debug)]
struct Slot {
    mutex: Arc<Mutex<()>>,
    refs: usize,
}

#[derive(Default, Debug)]
struct Registry {
    slots: StdMutex<HashMap<CacheKey, Slot>>,
}

impl Registry {
    fn release(&self, key: &CacheKey) {
        let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(slot) = slots.get_mut(key) {
            slot.refs -= 1;
            if slot.refs == 0 {
                slots.remove(key);
            }
        }
    }
}

/// Process-local registry of per-key mutexes.
///
/// Cloning shares the registry.
#[derive(Clone, Default)]
pub struct LockRegistry {
    inner: Arc<Registry>,
}

impl LockRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the existing mutex for `key` or installs a fresh one,
    /// incrementing the key's refcount. The returned handle must be used (or
    /// dropped) to balance the count.
    pub fn checkout(&self, key: &CacheKey) -> KeyLock {
        let mutex = {
            let mut slots = self.inner.slots.lock().unwrap_or_else(|e| e.into_inner());
            let slot = slots.entry(key.clone()).or_insert_with(|| Slot {
                mutex: Arc::new(Mutex::new(())),
                refs: 0,
            });
            slot.refs += 1;
            slot.mutex.clone()
        };
        KeyLock {
            registry: self.inner.clone(),
            key: key.clone(),
            mutex,
        }
    }

    /// Number of keys currently tracked.
    pub fn len(&self) -> usize {
        self.inner
            .slots
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }

    /// Whether no keys are tracked.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A checked-out reference to one key's mutex.
///
/// Dropping without acquiring releases the refcount.
#[derive(Debug)]
pub struct KeyLock {
    registry: Arc<Registry>,
    key: CacheKey,
    mutex: Arc<Mutex<()>>,
}

impl KeyLock {
    /// Acquires the mutex, waiting at most `timeout` when one is given.
    ///
    /// The underlying mutex is FIFO-fair: waiters acquire in arrival order.
    pub async fn acquire(self, timeout: Option<Duration>) -> Result<KeyGuard, LockTimeout> {
        let mutex = self.mutex.clone();
        let guard = match timeout {
            Some(window) => match tokio::time::timeout(window, mutex.lock_owned()).await {
                Ok(guard) => guard,
                Err(_) => {
                    let key = self.key.clone();
                    // `self` drops here, balancing the refcount.
                    return Err(LockTimeout { key });
                }
            },
            None => mutex.lock_owned().await,
        };
        Ok(KeyGuard {
            _guard: guard,
            _slot: self,
        })
    }

    /// Acquires the mutex only if it is free right now.
    ///
    /// Returns `None` (releasing the checkout) when another holder is
    /// active. This is the early-refresh probe.
    pub fn try_acquire(self) -> Option<KeyGuard> {
        match self.mutex.clone().try_lock_owned() {
            Ok(guard) => Some(KeyGuard {
                _guard: guard,
                _slot: self,
            }),
            Err(_) => None,
        }
    }

    /// The key this lock guards.
    pub fn key(&self) -> &CacheKey {
        &self.key
    }
}

impl Drop for KeyLock {
    fn drop(&mut self) {
        self.registry.release(&self.key);
    }
}

/// An acquired per-key lock.
///
/// Dropping releases the mutex first, then the registry refcount (fields
/// drop in declaration order).
#[derive(Debug)]
pub struct KeyGuard {
    _guard: OwnedMutexGuard<()>,
    _slot: KeyLock,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn key(name: &str) -> CacheKey {
        CacheKey::new(name)
    }

    #[tokio::test]
    async fn registry_entry_removed_after_last_release() {
        let registry = LockRegistry::new();
        let guard = registry.checkout(&key("a")).acquire(None).await.unwrap();
        assert_eq!(registry.len(), 1);
        drop(guard);
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn same_key_resolves_to_same_mutex() {
        let registry = LockRegistry::new();
        let guard = registry.checkout(&key("a")).acquire(None).await.unwrap();
        // A second checkout of the same key must contend, not acquire.
        assert!(registry.checkout(&key("a")).try_acquire().is_none());
        drop(guard);
        assert!(registry.checkout(&key("a")).try_acquire().is_some());
    }

    #[tokio::test]
    async fn distinct_keys_do_not_contend() {
        let registry = LockRegistry::new();
        let _a = registry.checkout(&key("a")).acquire(None).await.unwrap();
        assert!(registry.checkout(&key("b")).try_acquire().is_some());
    }

    #[tokio::test]
    async fn acquire_times_out_while_held() {
        let registry = LockRegistry::new();
        let _held = registry.checkout(&key("a")).acquire(None).await.unwrap();
        let err = registry
            .checkout(&key("a"))
            .acquire(Some(Duration::from_millis(20)))
            .await
            .unwrap_err();
        assert_eq!(err.key.as_str(), "a");
        // The timed-out waiter released its checkout; only the holder remains.
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn mutual_exclusion_under_contention() {
        let registry = LockRegistry::new();
        let concurrent = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let mut tasks = Vec::new();
        for _ in 0..16 {
            let registry = registry.clone();
            let concurrent = concurrent.clone();
            let peak = peak.clone();
            tasks.push(tokio::spawn(async move {
                let _guard = registry.checkout(&key("hot")).acquire(None).await.unwrap();
                let now = concurrent.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(2)).await;
                concurrent.fetch_sub(1, Ordering::SeqCst);
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        assert_eq!(peak.load(Ordering::SeqCst), 1);
        assert!(registry.is_empty());
    }
}
