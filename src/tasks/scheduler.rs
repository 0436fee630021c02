//! Shared Scheduler
//!
//! One periodic-task runner shared by every region, so shrinking does not cost
//! a thread per region. The scheduler is an injected service: regions acquire
//! it while they use it and the last release stops it.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::error::{CacheError, Result};

/// Smallest period accepted; a zero period would spin.
const MIN_INTERVAL: Duration = Duration::from_millis(1);

// == Periodic Task ==
/// Work executed on a fixed period by the [`SharedScheduler`].
#[async_trait]
pub trait PeriodicTask: Send + Sync + 'static {
    /// Name used in log events.
    fn name(&self) -> String;

    async fn run(&self) -> Result<()>;
}

#[derive(Default)]
struct SchedulerState {
    /// Present while the scheduler is live
    runtime: Option<Handle>,
    /// Regions currently holding the scheduler
    users: usize,
    tasks: HashMap<u64, JoinHandle<()>>,
    next_id: u64,
}

impl SchedulerState {
    fn stop_all(&mut self) -> usize {
        let stopped = self.tasks.len();
        for (_, handle) in self.tasks.drain() {
            handle.abort();
        }
        self.runtime = None;
        self.users = 0;
        stopped
    }
}

// == Shared Scheduler ==
/// Cloneable handle to the process-level periodic runner.
///
/// The runner starts lazily on first use and is bound to the tokio runtime
/// that first used it. Its tasks never keep the process alive: they are
/// dropped with the runtime.
#[derive(Clone, Default)]
pub struct SharedScheduler {
    state: Arc<Mutex<SchedulerState>>,
}

impl SharedScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, SchedulerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn ensure_started(state: &mut SchedulerState) -> Result<Handle> {
        if let Some(handle) = &state.runtime {
            return Ok(handle.clone());
        }
        let handle = Handle::try_current().map_err(|e| {
            CacheError::Scheduler(format!("no async runtime available: {}", e))
        })?;
        info!("Shared scheduler started");
        state.runtime = Some(handle.clone());
        Ok(handle)
    }

    // == Acquire / Release ==
    /// Registers one more user, starting the scheduler if needed.
    pub fn acquire(&self) -> Result<()> {
        let mut state = self.lock();
        Self::ensure_started(&mut state)?;
        state.users += 1;
        debug!(users = state.users, "Scheduler acquired");
        Ok(())
    }

    /// Drops one user. The last release stops every remaining task.
    pub fn release(&self) {
        let mut state = self.lock();
        state.users = state.users.saturating_sub(1);
        debug!(users = state.users, "Scheduler released");
        if state.users == 0 && state.runtime.is_some() {
            let stopped = state.stop_all();
            info!(stopped, "Shared scheduler stopped after last release");
        }
    }

    // == Execute Periodically ==
    /// Runs `task` every `interval`, first run one interval from now.
    ///
    /// Each run is spawned as its own task and awaited before the next tick is
    /// taken, so runs of one task never overlap and a failing or panicking run
    /// is logged without ending the schedule. A run that overruns delays the
    /// next one instead of producing a burst.
    pub fn execute_periodically(
        &self,
        interval: Duration,
        task: Arc<dyn PeriodicTask>,
    ) -> Result<ScheduledTask> {
        let interval = interval.max(MIN_INTERVAL);
        let mut state = self.lock();
        let runtime = Self::ensure_started(&mut state)?;

        let id = state.next_id;
        state.next_id += 1;
        let name = task.name();

        let handle = runtime.spawn(run_periodically(interval, task));
        state.tasks.insert(id, handle);
        debug!(task = %name, ?interval, "Periodic task registered");

        Ok(ScheduledTask {
            id,
            name,
            scheduler: self.clone(),
        })
    }

    fn cancel(&self, id: u64) -> bool {
        match self.lock().tasks.remove(&id) {
            Some(handle) => {
                handle.abort();
                true
            }
            None => false,
        }
    }

    // == Shutdown ==
    /// Stops every task of every user.
    ///
    /// Only the owner of the scheduler should call this at teardown; regions
    /// give their share back with [`release`](Self::release).
    pub fn shutdown(&self) {
        let mut state = self.lock();
        if state.runtime.is_some() {
            let stopped = state.stop_all();
            warn!(stopped, "Shared scheduler shut down; all periodic tasks stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.lock().runtime.is_some()
    }

    pub fn users(&self) -> usize {
        self.lock().users
    }

    pub fn task_count(&self) -> usize {
        self.lock().tasks.len()
    }
}

async fn run_periodically(interval: Duration, task: Arc<dyn PeriodicTask>) {
    let name = task.name();
    let mut ticker = interval_at(Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;

        let run = Arc::clone(&task);
        let mut in_flight = RunGuard(tokio::spawn(async move { run.run().await }));
        match (&mut in_flight.0).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!(task = %name, error = %e, "Scheduled run failed"),
            Err(e) if e.is_panic() => error!(task = %name, "Scheduled run panicked"),
            Err(_) => {
                debug!(task = %name, "Scheduled run cancelled, stopping schedule");
                break;
            }
        }
    }
}

/// Aborts the in-flight run when the schedule loop itself is aborted.
struct RunGuard(JoinHandle<Result<()>>);

impl Drop for RunGuard {
    fn drop(&mut self) {
        self.0.abort();
    }
}

// == Scheduled Task Handle ==
/// Registration of one periodic task.
#[derive(Clone)]
pub struct ScheduledTask {
    id: u64,
    name: String,
    scheduler: SharedScheduler,
}

impl ScheduledTask {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Stops this task only. Returns false if it was already stopped.
    pub fn cancel(&self) -> bool {
        self.scheduler.cancel(self.id)
    }

    pub fn is_active(&self) -> bool {
        self.scheduler.lock().tasks.contains_key(&self.id)
    }
}

impl std::fmt::Debug for ScheduledTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScheduledTask")
            .field("id", &self.id)
            .field("name", &self.name)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counter {
        runs: AtomicUsize,
    }

    #[async_trait]
    impl PeriodicTask for Counter {
        fn name(&self) -> String {
            "counter".to_string()
        }

        async fn run(&self) -> Result<()> {
            self.runs.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct Slow {
        active: AtomicUsize,
        max_active: AtomicUsize,
        runs: AtomicUsize,
    }

    #[async_trait]
    impl PeriodicTask for Slow {
        fn name(&self) -> String {
            "slow".to_string()
        }

        async fn run(&self) -> Result<()> {
            let now_active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_active.fetch_max(now_active, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(250)).await;
            self.active.fetch_sub(1, Ordering::SeqCst);
            self.runs.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct Flaky {
        runs: AtomicUsize,
    }

    #[async_trait]
    impl PeriodicTask for Flaky {
        fn name(&self) -> String {
            "flaky".to_string()
        }

        async fn run(&self) -> Result<()> {
            let run = self.runs.fetch_add(1, Ordering::SeqCst);
            match run {
                0 => panic!("first run blows up"),
                1 => Err(CacheError::Internal("second run fails".into())),
                _ => Ok(()),
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_task_runs_periodically() {
        let scheduler = SharedScheduler::new();
        let counter = Arc::new(Counter {
            runs: AtomicUsize::new(0),
        });

        let task = scheduler
            .execute_periodically(Duration::from_millis(100), counter.clone())
            .unwrap();

        tokio::time::sleep(Duration::from_millis(350)).await;
        assert_eq!(counter.runs.load(Ordering::SeqCst), 3);

        assert!(task.cancel());
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(counter.runs.load(Ordering::SeqCst), 3);
        assert!(!task.is_active());
    }

    #[tokio::test(start_paused = true)]
    async fn test_runs_never_overlap() {
        let scheduler = SharedScheduler::new();
        let slow = Arc::new(Slow {
            active: AtomicUsize::new(0),
            max_active: AtomicUsize::new(0),
            runs: AtomicUsize::new(0),
        });

        scheduler
            .execute_periodically(Duration::from_millis(100), slow.clone())
            .unwrap();

        tokio::time::sleep(Duration::from_millis(2000)).await;
        assert_eq!(slow.max_active.load(Ordering::SeqCst), 1);
        assert!(slow.runs.load(Ordering::SeqCst) >= 2);
        scheduler.shutdown();
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_stops_in_flight_run() {
        let scheduler = SharedScheduler::new();
        let slow = Arc::new(Slow {
            active: AtomicUsize::new(0),
            max_active: AtomicUsize::new(0),
            runs: AtomicUsize::new(0),
        });

        let task = scheduler
            .execute_periodically(Duration::from_millis(100), slow.clone())
            .unwrap();

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(slow.active.load(Ordering::SeqCst), 1);

        assert!(task.cancel());
        tokio::time::sleep(Duration::from_millis(1000)).await;
        assert_eq!(slow.runs.load(Ordering::SeqCst), 0);
        assert_eq!(slow.max_active.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failures_do_not_stop_schedule() {
        let scheduler = SharedScheduler::new();
        let flaky = Arc::new(Flaky {
            runs: AtomicUsize::new(0),
        });

        let task = scheduler
            .execute_periodically(Duration::from_millis(100), flaky.clone())
            .unwrap();

        tokio::time::sleep(Duration::from_millis(450)).await;
        assert!(flaky.runs.load(Ordering::SeqCst) >= 4);
        assert!(task.is_active());
    }

    #[tokio::test(start_paused = true)]
    async fn test_last_release_stops_scheduler() {
        let scheduler = SharedScheduler::new();
        let counter = Arc::new(Counter {
            runs: AtomicUsize::new(0),
        });

        scheduler.acquire().unwrap();
        scheduler.acquire().unwrap();
        scheduler
            .execute_periodically(Duration::from_millis(100), counter.clone())
            .unwrap();

        scheduler.release();
        assert!(scheduler.is_running());
        assert_eq!(scheduler.task_count(), 1);

        scheduler.release();
        assert!(!scheduler.is_running());
        assert_eq!(scheduler.task_count(), 0);

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(counter.runs.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_stops_all_users() {
        let scheduler = SharedScheduler::new();
        let a = Arc::new(Counter {
            runs: AtomicUsize::new(0),
        });
        let b = Arc::new(Counter {
            runs: AtomicUsize::new(0),
        });

        scheduler.acquire().unwrap();
        scheduler.acquire().unwrap();
        let ta = scheduler
            .execute_periodically(Duration::from_millis(100), a.clone())
            .unwrap();
        let tb = scheduler
            .execute_periodically(Duration::from_millis(100), b.clone())
            .unwrap();

        scheduler.shutdown();
        assert!(!ta.is_active());
        assert!(!tb.is_active());
        assert_eq!(scheduler.users(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_first_use_starts_once() {
        let scheduler = SharedScheduler::new();

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let scheduler = scheduler.clone();
                tokio::spawn(async move { scheduler.acquire() })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert!(scheduler.is_running());
        assert_eq!(scheduler.users(), 16);
    }

    #[test]
    fn test_acquire_outside_runtime_fails() {
        let scheduler = SharedScheduler::new();
        assert!(matches!(scheduler.acquire(), Err(CacheError::Scheduler(_))));
        assert!(!scheduler.is_running());
    }
}
