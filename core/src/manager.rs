use crate::clock::{SystemClock, TimerClock};
use crate::task::{TaskStatus, TimerTask};
use std::fmt::{Debug, Formatter};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::{Mutex, Notify};
use tokio::task::JoinHandle;
use typed_builder::TypedBuilder;
use uuid::Uuid;

/// Sleep bound while the next firing is near (or no firing is known): newly
/// added tasks and wall-clock jumps are picked up within this horizon
pub const SHORT_CHECK: Duration = Duration::from_secs(10);

/// Hard upper bound on a single sleep, even when the next firing is far away.
/// Forces a periodic re-read of the wall clock
pub const LONG_CHECK: Duration = Duration::from_secs(60);

/// Sleep class a dispatch pass ends with
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TimerCheck {
    /// A task fired during the pass, re-check right away
    Immediate,
    /// The next firing is within [`SHORT_CHECK`], or no firing is known yet
    Short,
    /// Nothing due within the short horizon, sleep up to [`LONG_CHECK`]
    Long,
}

/// This is the builder configs to use for building a [`TimerManager`] instance.
/// By itself it should not be used, and it resides in [`TimerManager::builder`]
#[derive(TypedBuilder)]
#[builder(build_method(into = TimerManager))]
pub struct TimerManagerConfig {
    /// The [`TimerClock`] the worker reads time from and idles on
    ///
    /// # Default Value
    /// Every manager uses as default value [`SystemClock`]. For unit tests and
    /// simulations, [`crate::clock::VirtualClock`] should be preferred as it
    /// allows explicit advancing of time
    #[builder(
        default = Arc::new(SystemClock),
        setter(transform = |clock: impl TimerClock + 'static| Arc::new(clock) as Arc<dyn TimerClock>),
    )]
    clock: Arc<dyn TimerClock>,
}

impl From<TimerManagerConfig> for TimerManager {
    fn from(config: TimerManagerConfig) -> Self {
        TimerManager {
            clock: config.clock,
            tasks: Arc::new(Mutex::new(Vec::new())),
            notifier: Arc::new(Notify::new()),
            stopping: Arc::new(AtomicBool::new(false)),
            process: Mutex::new(None),
        }
    }
}

/// [`TimerManager`] owns the scheduling loop of the timer core. One background
/// worker serves all registered tasks; each iteration consists of, in a nutshell:
///
/// 1. Reading the current epoch second from the [`TimerClock`].
/// 2. Dispatching every task whose firing instant is due. A task missed for any
///    stretch of time (suspend, clock jump) fires once, not once per missed slot,
///    and is expected to have rescheduled itself when its side effect returns.
/// 3. Classifying the next sleep ([`TimerCheck`]) and idling on the clock, capped
///    so the worker periodically re-syncs with the wall clock no matter what.
///
/// Task callbacks execute on this worker, serialized; a blocking side effect
/// delays every other task, which is the documented contract. Registration is by
/// shared reference: the manager never owns task lifetime, dropping the last
/// user-side ``Arc`` after [`TimerManager::remove_task`] is the owner's business
///
/// # Constructor(s)
/// If one wishes to construct their own [`TimerManager`], they may do so via
/// [`TimerManager::builder`]
///
/// # Trait Implementation(s)
/// The [`TimerManager`] implements the [`Debug`] trait which shows the clock and
/// whether the worker currently runs
///
/// # Example
/// ```ignore
/// let manager = TimerManager::builder().build();
/// manager.add_task(task.clone()).await;
/// manager.start_manager().await;
/// // ...
/// manager.stop_manager().await; // next_exec values survive, start resumes them
/// ```
///
/// # See Also
/// - [`TimerTask`]
/// - [`TimerClock`]
pub struct TimerManager {
    clock: Arc<dyn TimerClock>,
    tasks: Arc<Mutex<Vec<Arc<dyn TimerTask>>>>,
    notifier: Arc<Notify>,
    stopping: Arc<AtomicBool>,
    process: Mutex<Option<JoinHandle<()>>>,
}

impl Debug for TimerManager {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimerManager")
            .field("clock", &self.clock)
            .finish()
    }
}

impl TimerManager {
    /// Constructs a manager builder, refer to [`TimerManagerConfig`] for the
    /// available parameters
    pub fn builder() -> TimerManagerConfigBuilder {
        TimerManagerConfig::builder()
    }

    /// Registers `task` with the manager and wakes the worker so the sleep
    /// horizon is recomputed. Inserting the same task twice is a no-op
    pub async fn add_task(&self, task: Arc<dyn TimerTask>) {
        {
            let mut tasks = self.tasks.lock().await;
            if tasks.iter().any(|t| t.id() == task.id()) {
                return;
            }
            tasks.push(task);
        }
        self.notifier.notify_one();
    }

    /// Deregisters the task with `task_id` and wakes the worker. Removing an
    /// absent task is silent; removing the task that is currently firing takes
    /// effect once its side effect returns (the dispatch pass iterates over a
    /// snapshot)
    pub async fn remove_task(&self, task_id: Uuid) {
        self.tasks.lock().await.retain(|t| t.id() != task_id);
        self.notifier.notify_one();
    }

    /// Runs one dispatch pass against `now` and reports the resulting sleep
    /// class. The worker calls this in its loop; it is public so embedders with
    /// their own loop (and tests) can drive passes manually
    pub async fn check_task_list(&self, now: i64) -> TimerCheck {
        Self::run_pass(&self.tasks, now).await.0
    }

    /// Status snapshot of every registered task, in registration order
    pub async fn status(&self) -> Vec<TaskStatus> {
        self.tasks.lock().await.iter().map(|t| t.status()).collect()
    }

    /// Starts the worker, if it has already started this method does nothing.
    /// Tasks keep whatever firing instants they carry, so starting after
    /// [`TimerManager::stop_manager`] resumes where the manager left off
    pub async fn start_manager(&self) {
        let mut process = self.process.lock().await;
        if process.is_some() {
            return;
        }
        self.stopping.store(false, Ordering::Release);
        let clock = self.clock.clone();
        let tasks = self.tasks.clone();
        let notifier = self.notifier.clone();
        let stopping = self.stopping.clone();
        *process = Some(tokio::spawn(async move {
            loop {
                if stopping.load(Ordering::Acquire) {
                    break;
                }
                let now = clock.epoch_secs().await;
                let (check, horizon) = Self::run_pass(&tasks, now).await;
                let sleep = match check {
                    TimerCheck::Immediate => {
                        tokio::task::yield_now().await;
                        continue;
                    }
                    TimerCheck::Short => Self::bounded_sleep(horizon, now, SHORT_CHECK),
                    TimerCheck::Long => Self::bounded_sleep(horizon, now, LONG_CHECK),
                };
                tokio::select! {
                    _ = clock.idle(sleep) => {}
                    _ = notifier.notified() => {}
                }
            }
        }));
    }

    /// Signals the worker to stop and waits for it to wind down. The pass in
    /// flight completes first (callbacks are never cut short) and every task
    /// keeps its firing instant. Must not be called from inside a task's side
    /// effect, that would wait on the very worker running it
    pub async fn stop_manager(&self) {
        let handle = self.process.lock().await.take();
        let Some(handle) = handle else {
            return;
        };
        self.stopping.store(true, Ordering::Release);
        self.notifier.notify_one();
        let _ = handle.await;
    }

    /// Checks if the worker currently runs
    pub async fn has_started(&self) -> bool {
        self.process.lock().await.is_some()
    }

    /// One dispatch pass: fire everything due, then compute the earliest future
    /// firing over the *live* list, so tasks removed or deactivated by the pass
    /// no longer count
    async fn run_pass(
        tasks: &Mutex<Vec<Arc<dyn TimerTask>>>,
        now: i64,
    ) -> (TimerCheck, Option<i64>) {
        // snapshot, so side effects may add and remove tasks re-entrantly
        let snapshot = tasks.lock().await.clone();
        let mut fired = false;
        for task in &snapshot {
            if task.next_exec_time().is_some_and(|next| next <= now) {
                task.on_fire(now).await;
                fired = true;
            }
        }
        let horizon = tasks
            .lock()
            .await
            .iter()
            .filter_map(|t| t.next_exec_time())
            .filter(|&next| next > now)
            .min();
        let check = if fired {
            TimerCheck::Immediate
        } else if horizon.is_none_or(|next| next - now <= SHORT_CHECK.as_secs() as i64) {
            TimerCheck::Short
        } else {
            TimerCheck::Long
        };
        (check, horizon)
    }

    /// Sleep until `horizon` but never longer than `cap`
    fn bounded_sleep(horizon: Option<i64>, now: i64, cap: Duration) -> Duration {
        horizon
            .map(|next| Duration::from_secs(next.saturating_sub(now).max(1) as u64))
            .unwrap_or(cap)
            .min(cap)
    }
}
