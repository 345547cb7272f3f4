use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::{Notify, oneshot};
use tracing::debug;

/// Tracks outstanding crawl tasks and tells the aggregator when none remain.
///
/// Completion is counted per task, not per subtree: a task that has spawned
/// children may finish long before they do.
#[derive(Debug, Default)]
pub struct ShutdownCoordinator {
    outstanding: AtomicUsize,
    idle: Notify,
}

/// Registration of one outstanding task. Dropping it, on return or during a
/// panic unwind, marks the task complete.
#[derive(Debug)]
pub struct TaskGuard {
    coordinator: Arc<ShutdownCoordinator>,
}

impl ShutdownCoordinator {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Must be called before the task is spawned, by whoever spawns it.
    pub fn register(self: &Arc<Self>) -> TaskGuard {
        self.outstanding.fetch_add(1, Ordering::AcqRel);
        TaskGuard {
            coordinator: self.clone(),
        }
    }

    pub fn outstanding(&self) -> usize {
        self.outstanding.load(Ordering::Acquire)
    }

    /// Resolves once no registered task remains.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.idle.notified();
            if self.outstanding() == 0 {
                return;
            }
            notified.await;
        }
    }

    /// Waits for quiescence, then fires `stop`. Taking the sender by value
    /// means the stop signal can only be issued once.
    pub async fn quiesce(&self, stop: oneshot::Sender<()>) {
        self.wait_idle().await;
        debug!("All crawl tasks complete, stopping aggregator");
        // A dropped receiver means the aggregator is already gone.
        let _ = stop.send(());
    }
}

impl Drop for TaskGuard {
    fn drop(&mut self) {
        if self.coordinator.outstanding.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.coordinator.idle.notify_waiters();
        }
    }
}
