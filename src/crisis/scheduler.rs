// Background work for the guard: fire-and-forget alerts and per-field
// debounce timers. Both are tracked so a page teardown can cancel them.

use dashmap::DashMap;
use once_cell::sync::OnceCell;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::{Handle, Runtime};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

/// Runtime owned by a scheduler that was used outside any tokio context
struct BackgroundRuntime(Option<Runtime>);

impl Drop for BackgroundRuntime {
    fn drop(&mut self) {
        // shutdown_background is the only teardown allowed from async code
        if let Some(runtime) = self.0.take() {
            runtime.shutdown_background();
        }
    }
}

/// Spawns tracked, cancellable tasks.
///
/// Tasks go to the runtime set with `on_runtime`, else the caller's ambient
/// runtime, else a single-worker runtime the scheduler starts on first use.
#[derive(Clone, Default)]
pub struct TaskScheduler {
    tracker: TaskTracker,
    token: CancellationToken,
    runtime: Option<Handle>,
    background: Arc<OnceCell<BackgroundRuntime>>,
}

impl TaskScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawn every task on `handle`
    pub fn on_runtime(mut self, handle: Handle) -> Self {
        self.runtime = Some(handle);
        self
    }

    fn handle(&self) -> std::io::Result<Handle> {
        if let Some(handle) = &self.runtime {
            return Ok(handle.clone());
        }
        if let Ok(handle) = Handle::try_current() {
            return Ok(handle);
        }

        let background = self.background.get_or_try_init(|| {
            tracing::debug!("No ambient runtime, starting a background runtime");
            tokio::runtime::Builder::new_multi_thread()
                .worker_threads(1)
                .thread_name("crisis-guard-bg")
                .enable_all()
                .build()
                .map(|runtime| BackgroundRuntime(Some(runtime)))
        })?;
        match &background.0 {
            Some(runtime) => Ok(runtime.handle().clone()),
            None => Err(std::io::Error::new(
                std::io::ErrorKind::Other,
                "background runtime already shut down",
            )),
        }
    }

    /// Run `task` in the background. It is dropped at its next await
    /// point once the scheduler shuts down.
    pub fn spawn<F>(&self, name: &'static str, task: F) -> Option<JoinHandle<()>>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        if self.token.is_cancelled() {
            tracing::debug!(task = name, "Scheduler shut down, task not started");
            return None;
        }

        let handle = match self.handle() {
            Ok(handle) => handle,
            Err(e) => {
                tracing::error!(task = name, "No runtime could be started, task dropped: {}", e);
                return None;
            }
        };

        let token = self.token.clone();
        let wrapped = async move {
            tokio::select! {
                _ = token.cancelled() => {
                    tracing::debug!(task = name, "Task cancelled");
                }
                _ = task => {}
            }
        };

        Some(self.tracker.spawn_on(wrapped, &handle))
    }

    /// Number of tasks still running
    pub fn in_flight(&self) -> usize {
        self.tracker.len()
    }

    /// Wait until every task spawned so far has finished
    pub async fn flush(&self) {
        self.tracker.close();
        self.tracker.wait().await;
        self.tracker.reopen();
    }

    /// Cancel outstanding tasks and refuse new ones
    pub async fn shutdown(&self) {
        self.token.cancel();
        self.tracker.close();
        self.tracker.wait().await;
    }

    pub fn is_shut_down(&self) -> bool {
        self.token.is_cancelled()
    }
}

/// Independent delayed task per field.
///
/// Scheduling for a field aborts only that field's pending task.
pub struct Debouncer {
    delay: Duration,
    timers: DashMap<String, JoinHandle<()>>,
}

impl Debouncer {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            timers: DashMap::new(),
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// (Re)start the timer for `field`; `task` runs after the quiet period
    pub fn schedule<F>(&self, scheduler: &TaskScheduler, field: &str, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let delay = self.delay;
        let delayed = async move {
            tokio::time::sleep(delay).await;
            task.await;
        };

        // Holding the entry keeps a concurrent schedule for the same field out
        match self.timers.entry(field.to_string()) {
            dashmap::mapref::entry::Entry::Occupied(mut entry) => {
                entry.get().abort();
                if let Some(handle) = scheduler.spawn("debounce", delayed) {
                    entry.insert(handle);
                } else {
                    entry.remove();
                }
            }
            dashmap::mapref::entry::Entry::Vacant(entry) => {
                if let Some(handle) = scheduler.spawn("debounce", delayed) {
                    entry.insert(handle);
                }
            }
        }
    }

    /// Abort the pending timer for `field`. Returns true if one was pending.
    pub fn cancel(&self, field: &str) -> bool {
        match self.timers.remove(field) {
            Some((_, handle)) => {
                let pending = !handle.is_finished();
                handle.abort();
                pending
            }
            None => false,
        }
    }

    pub fn cancel_all(&self) {
        for entry in self.timers.iter() {
            entry.value().abort();
        }
        self.timers.clear();
    }

    /// Fields whose timer has not fired yet
    pub fn pending(&self) -> usize {
        self.timers.iter().filter(|e| !e.value().is_finished()).count()
    }
}

impl Drop for Debouncer {
    fn drop(&mut self) {
        for entry in self.timers.iter() {
            entry.value().abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_spawn_and_flush() {
        let scheduler = TaskScheduler::new();
        let counter = Arc::new(AtomicUsize::new(0));

        for _ in 0..3 {
            let counter = counter.clone();
            scheduler.spawn("count", async move {
                counter.fetch_add(1, Ordering::SeqCst);
            });
        }

        scheduler.flush().await;
        assert_eq!(counter.load(Ordering::SeqCst), 3);
        assert_eq!(scheduler.in_flight(), 0);

        // Still usable after a flush
        let c = counter.clone();
        scheduler.spawn("count", async move {
            c.fetch_add(1, Ordering::SeqCst);
        });
        scheduler.flush().await;
        assert_eq!(counter.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn test_spawn_without_runtime_still_runs() {
        let scheduler = TaskScheduler::new();
        let counter = Arc::new(AtomicUsize::new(0));

        let c = counter.clone();
        assert!(scheduler
            .spawn("orphan", async move {
                c.fetch_add(1, Ordering::SeqCst);
            })
            .is_some());

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        runtime.block_on(scheduler.flush());
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_spawn_on_configured_runtime() {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let scheduler = TaskScheduler::new().on_runtime(runtime.handle().clone());
        let counter = Arc::new(AtomicUsize::new(0));

        let c = counter.clone();
        scheduler.spawn("count", async move {
            c.fetch_add(1, Ordering::SeqCst);
        });

        runtime.block_on(scheduler.flush());
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert!(scheduler.background.get().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_cancels_pending() {
        let scheduler = TaskScheduler::new();
        let fired = Arc::new(AtomicUsize::new(0));

        let f = fired.clone();
        scheduler.spawn("slow", async move {
            tokio::time::sleep(Duration::from_secs(30)).await;
            f.fetch_add(1, Ordering::SeqCst);
        });

        scheduler.shutdown().await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
        assert!(scheduler.is_shut_down());
        assert!(scheduler.spawn("late", async {}).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_debounce_restarts_per_field() {
        let scheduler = TaskScheduler::new();
        let debouncer = Debouncer::new(Duration::from_secs(1));
        let fired = Arc::new(AtomicUsize::new(0));

        for _ in 0..3 {
            let f = fired.clone();
            debouncer.schedule(&scheduler, "journal", async move {
                f.fetch_add(1, Ordering::SeqCst);
            });
            tokio::time::sleep(Duration::from_millis(400)).await;
        }
        assert_eq!(fired.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_millis(700)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_field() {
        let scheduler = TaskScheduler::new();
        let debouncer = Debouncer::new(Duration::from_secs(1));
        let fired = Arc::new(AtomicUsize::new(0));

        let f = fired.clone();
        debouncer.schedule(&scheduler, "notes", async move {
            f.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(debouncer.pending(), 1);
        assert!(debouncer.cancel("notes"));
        assert!(!debouncer.cancel("notes"));

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }
}
