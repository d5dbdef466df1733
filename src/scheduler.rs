//! Repeating and delayed background tasks with cancellable handles.
//!
//! Every periodic responsibility of the monitor (health polling, escalation
//! sweeps, expiry sweeps, history cleanup) runs as its own tokio task created
//! here. All timing goes through `tokio::time`, so paused-time tests drive the
//! scheduler deterministically.

use log::{debug, info};
use parking_lot::Mutex;
use std::future::Future;
use std::time::Duration;
use tokio::task::AbortHandle;
use tokio::time::{MissedTickBehavior, interval, sleep};

/// Handle to a scheduled task
#[derive(Debug, Clone)]
pub struct TaskHandle {
    name: String,
    abort: AbortHandle,
}

impl TaskHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Stop the task. A delayed task that has not fired yet never fires.
    pub fn cancel(&self) {
        self.abort.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.abort.is_finished()
    }
}

/// Owner of every task spawned on behalf of a monitor instance
#[derive(Debug, Default)]
pub struct Scheduler {
    tasks: Mutex<Vec<TaskHandle>>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `task` immediately and then once per `period`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn every<F, Fut>(&self, name: impl Into<String>, period: Duration, task: F) -> TaskHandle
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let name = name.into();
        let period = period.max(Duration::from_millis(1));
        let task_name = name.clone();

        let join = tokio::spawn(async move {
            let mut timer = interval(period);
            timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                timer.tick().await;
                debug!("Running periodic task {}", task_name);
                task().await;
            }
        });

        self.track(name, join.abort_handle())
    }

    /// Run `task` once after `delay`.
    pub fn after<F, Fut>(&self, name: impl Into<String>, delay: Duration, task: F) -> TaskHandle
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let name = name.into();
        let join = tokio::spawn(async move {
            sleep(delay).await;
            task().await;
        });

        self.track(name, join.abort_handle())
    }

    /// Number of tasks that are still scheduled or running
    pub fn active_tasks(&self) -> usize {
        let tasks = self.tasks.lock();
        tasks.iter().filter(|t| !t.is_finished()).count()
    }

    /// Cancel every task spawned through this scheduler
    pub fn shutdown(&self) {
        let mut tasks = self.tasks.lock();
        for task in tasks.drain(..) {
            task.cancel();
        }
        info!("Scheduler shut down");
    }

    fn track(&self, name: String, abort: AbortHandle) -> TaskHandle {
        let handle = TaskHandle { name, abort };
        let mut tasks = self.tasks.lock();
        tasks.retain(|t| !t.is_finished());
        tasks.push(handle.clone());
        handle
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        for task in self.tasks.get_mut().drain(..) {
            task.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test(start_paused = true)]
    async fn test_every_fires_immediately_then_repeats() {
        let scheduler = Scheduler::new();
        let count = Arc::new(AtomicUsize::new(0));
        let counter = count.clone();
        scheduler.every("tick", Duration::from_secs(10), move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        });

        tokio::time::sleep(Duration::from_millis(1)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);

        tokio::time::sleep(Duration::from_secs(25)).await;
        assert_eq!(count.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_delayed_task_never_fires() {
        let scheduler = Scheduler::new();
        let fired = Arc::new(AtomicUsize::new(0));
        let flag = fired.clone();
        let handle = scheduler.after("once", Duration::from_secs(30), move || async move {
            flag.fetch_add(1, Ordering::SeqCst);
        });

        tokio::time::sleep(Duration::from_secs(10)).await;
        handle.cancel();
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_stops_periodic_tasks() {
        let scheduler = Scheduler::new();
        let count = Arc::new(AtomicUsize::new(0));
        let counter = count.clone();
        scheduler.every("tick", Duration::from_secs(1), move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        });
        tokio::time::sleep(Duration::from_millis(1500)).await;
        scheduler.shutdown();
        let seen = count.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(count.load(Ordering::SeqCst), seen);
        assert_eq!(scheduler.active_tasks(), 0);
    }
}
