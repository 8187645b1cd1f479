//! crates/study_tracker_core/src/tasks.rs
//!
//! Named background tasks. Starting a task under a name that is already
//! running cancels the old one first, so re-rendering a page never stacks
//! duplicate timers.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use futures::future::BoxFuture;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::ports::PortResult;

pub const ACTIVITY_HEARTBEAT: &str = "activity-heartbeat";
pub const ADMIN_LIVE_STATS: &str = "admin-live-stats";

/// A repeatable unit of work run on every tick of a periodic task.
pub type TickJob = Arc<dyn Fn() -> BoxFuture<'static, PortResult<()>> + Send + Sync>;

struct RunningTask {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

#[derive(Default)]
pub struct TaskRegistry {
    running: Mutex<HashMap<String, RunningTask>>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, RunningTask>> {
        self.running
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Spawns `make(token)` under `name`, cancelling any task already running
    /// under that name. The future should return once `token` is cancelled.
    pub fn start<F, Fut>(&self, name: &str, make: F)
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(make(cancel.clone()));
        let previous = self
            .lock()
            .insert(name.to_string(), RunningTask { cancel, handle });
        if let Some(previous) = previous {
            debug!(task = name, "replacing running task");
            previous.cancel.cancel();
        }
        debug!(task = name, "task started");
    }

    /// Runs `job` every `period` until cancelled. With `immediate`, the first
    /// run happens right away instead of after one period. A failing tick is
    /// logged and the schedule carries on.
    pub fn start_periodic(&self, name: &str, period: Duration, immediate: bool, job: TickJob) {
        let task_name = name.to_string();
        self.start(name, move |cancel| async move {
            let mut interval = tokio::time::interval(period);
            if !immediate {
                interval.tick().await; // consume the immediate first tick
            }
            loop {
                tokio::select! {
                    biased;
                    () = cancel.cancelled() => break,
                    _ = interval.tick() => {
                        if let Err(e) = job().await {
                            warn!(task = %task_name, error = %e, "periodic task tick failed");
                        }
                    }
                }
            }
            debug!(task = %task_name, "periodic task stopped");
        });
    }

    pub fn cancel(&self, name: &str) {
        if let Some(task) = self.lock().remove(name) {
            task.cancel.cancel();
            debug!(task = name, "task cancelled");
        }
    }

    pub fn cancel_all(&self) {
        for (name, task) in self.lock().drain() {
            task.cancel.cancel();
            debug!(task = %name, "task cancelled");
        }
    }

    pub fn is_running(&self, name: &str) -> bool {
        self.lock()
            .get(name)
            .is_some_and(|task| !task.cancel.is_cancelled() && !task.handle.is_finished())
    }

    pub fn running_count(&self) -> usize {
        self.lock()
            .values()
            .filter(|task| !task.handle.is_finished())
            .count()
    }
}

impl Drop for TaskRegistry {
    fn drop(&mut self) {
        self.cancel_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::PortError;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting_job(counter: Arc<AtomicUsize>, fail: bool) -> TickJob {
        Arc::new(move || {
            let counter = counter.clone();
            Box::pin(async move {
                counter.fetch_add(1, Ordering::SeqCst);
                if fail {
                    Err(PortError::Unexpected("tick failed".into()))
                } else {
                    Ok(())
                }
            })
        })
    }

    #[tokio::test(start_paused = true)]
    async fn restarting_a_name_keeps_a_single_timer() {
        let registry = TaskRegistry::new();
        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));

        registry.start_periodic("beat", Duration::from_secs(10), true, counting_job(first.clone(), false));
        tokio::time::sleep(Duration::from_millis(1)).await;
        registry.start_periodic("beat", Duration::from_secs(10), true, counting_job(second.clone(), false));
        tokio::time::sleep(Duration::from_secs(35)).await;

        assert_eq!(first.load(Ordering::SeqCst), 1);
        assert_eq!(second.load(Ordering::SeqCst), 4);
        assert_eq!(registry.running_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn failing_ticks_do_not_stop_the_schedule() {
        let registry = TaskRegistry::new();
        let ticks = Arc::new(AtomicUsize::new(0));
        registry.start_periodic("beat", Duration::from_secs(1), false, counting_job(ticks.clone(), true));

        tokio::time::sleep(Duration::from_millis(3_500)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_stops_the_task() {
        let registry = TaskRegistry::new();
        let ticks = Arc::new(AtomicUsize::new(0));
        registry.start_periodic("beat", Duration::from_secs(1), true, counting_job(ticks.clone(), false));
        tokio::time::sleep(Duration::from_millis(1_500)).await;
        registry.cancel("beat");
        assert!(!registry.is_running("beat"));

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), 2);
    }
}
