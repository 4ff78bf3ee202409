//! Tokio-backed background task execution.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use cairn_core::{BoxedTask, Spawner};
use dashmap::DashMap;
use smol_str::SmolStr;
use tokio::task::JoinHandle;
use tracing::{Instrument, info_span};

#[derive(Debug, Default)]
struct TaskSpawnerInner {
    tasks: DashMap<u64, JoinHandle<()>>,
    task_counter: AtomicU64,
}

/// [`Spawner`] implementation on the tokio runtime.
///
/// Live tasks are tracked so tests and shutdown paths can wait for
/// background work (early refreshes, detached factory continuations) to
/// settle.
#[derive(Clone, Debug, Default)]
pub struct TaskSpawner {
    inner: Arc<TaskSpawnerInner>,
}

impl TaskSpawner {
    /// Creates a new spawner.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of tasks that have not finished yet.
    pub fn active_task_count(&self) -> usize {
        self.inner.tasks.iter().filter(|e| !e.is_finished()).count()
    }

    /// Drops handles of finished tasks.
    pub fn cleanup_finished(&self) {
        self.inner.tasks.retain(|_, handle| !handle.is_finished());
    }

    /// Aborts every tracked task.
    pub fn cancel_all(&self) {
        for entry in self.inner.tasks.iter() {
            entry.abort();
        }
    }

    /// Waits for all currently tracked tasks to complete.
    pub async fn wait_all(&self) {
        loop {
            self.cleanup_finished();
            if self.inner.tasks.is_empty() {
                break;
            }
            tokio::task::yield_now().await;
        }
    }

    /// Waits for all tasks, up to `timeout`. Returns whether everything
    /// completed in time.
    pub async fn wait_all_timeout(&self, timeout: Duration) -> bool {
        tokio::time::timeout(timeout, self.wait_all()).await.is_ok()
    }
}

impl Spawner for TaskSpawner {
    fn spawn_boxed(&self, kind: SmolStr, task: BoxedTask) {
        let id = self.inner.task_counter.fetch_add(1, Ordering::Relaxed);
        let inner = self.inner.clone();
        let span = info_span!("background_task", kind = %kind, id);
        let handle = tokio::spawn(
            async move {
                task.await;
                inner.tasks.remove(&id);
            }
            .instrument(span),
        );
        self.inner.tasks.insert(id, handle);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cairn_core::SpawnerExt;
    use std::sync::atomic::AtomicBool;

    #[tokio::test]
    async fn wait_all_observes_completion() {
        let spawner = TaskSpawner::new();
        let done = Arc::new(AtomicBool::new(false));
        let flag = done.clone();
        spawner.spawn("test", async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            flag.store(true, Ordering::SeqCst);
        });
        assert!(spawner.wait_all_timeout(Duration::from_secs(1)).await);
        assert!(done.load(Ordering::SeqCst));
    }
}
