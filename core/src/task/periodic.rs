use crate::errors::TimerErrors;
use crate::task::{TaskStatus, TimerAction, TimerTask, find_next};
use crate::timespec::TimeSpec;
use crate::utils::local_from_epoch;
use crate::variables::ChangeListener;
use async_trait::async_trait;
use chrono::Local;
use std::sync::{Arc, Mutex, Weak};
use tracing::{error, warn};
use typed_builder::TypedBuilder;
use uuid::Uuid;

#[derive(Default)]
struct PeriodicState {
    /// Flip-flop of the task: false while waiting for `at`, true while holding
    value: bool,
    /// Release instant while holding, 0 otherwise
    after: i64,
    next_exec: Option<i64>,
    /// Set once the resolver reported the constraints as impossible, the task
    /// never reschedules again (and never logs the condition twice)
    dead: bool,
}

/// [`PeriodicTaskConfig`] is simply used as a builder to construct
/// [`PeriodicTask`], it isn't meant to be used by itself, you may refer to
/// [`PeriodicTask::builder`]
#[derive(TypedBuilder)]
#[builder(build_method(into = PeriodicTask))]
pub struct PeriodicTaskConfig {
    /// When the task engages. This is the only mandatory specification
    #[builder(setter(transform = |s: impl TimeSpec + 'static| Arc::new(s) as Arc<dyn TimeSpec>))]
    at: Arc<dyn TimeSpec>,

    /// When a hold releases. Supplying this turns the task into a pulse whose
    /// release comes from the next match of this specification after the firing
    /// instant (instead of a fixed `during` length)
    #[builder(default, setter(transform = |s: impl TimeSpec + 'static| Some(Arc::new(s) as Arc<dyn TimeSpec>)))]
    until: Option<Arc<dyn TimeSpec>>,

    /// Hold length in seconds. Zero (the default) and no `until` make the task a
    /// plain trigger without hold interval
    #[builder(default = 0)]
    during: u32,

    /// The domain side effect to run on engage and release
    #[builder(setter(transform = |a: impl TimerAction + 'static| Arc::new(a) as Arc<dyn TimerAction>))]
    action: Arc<dyn TimerAction>,

    /// Shown in log lines, ideally unique; defaults to a generated UUID string
    #[builder(default = Uuid::new_v4().to_string())]
    debug_label: String,
}

impl From<PeriodicTaskConfig> for PeriodicTask {
    fn from(config: PeriodicTaskConfig) -> Self {
        PeriodicTask {
            id: Uuid::new_v4(),
            at: config.at,
            until: config.until,
            during: config.during,
            action: config.action,
            debug_label: config.debug_label,
            state: Mutex::new(PeriodicState::default()),
        }
    }
}

/// [`PeriodicTask`] is the recurring implementation of [`TimerTask`]. It engages
/// at every match of its `at` specification and models three shapes:
///
/// - **Plain trigger** (no `during`, no `until`): the side effect runs with the
///   on value and the task immediately waits for the next match
/// - **Pulse with hold time** (`during` > 0): the side effect runs with on, the
///   task holds for `during` seconds and then runs the effect with off
/// - **Pulse with release spec** (`until` set): as above, except the release
///   instant is the next match of `until` after the firing instant
///
/// A freshly built task is inactive, call [`TimerTask::reschedule`] once (or let
/// the configuration importer do it) to arm it. Tasks whose specifications read
/// live variables additionally want [`PeriodicTask::track_variables`] so updates
/// re-arm them on the spot
///
/// # Constructor(s)
/// When constructing a [`PeriodicTask`], one uses [`PeriodicTask::builder`]
///
/// # Examples
/// ```ignore
/// // On at 08:00, off again at 09:00, every day
/// let task = Arc::new(PeriodicTask::builder()
///     .at(FixedTimeSpec::builder().minute(0).hour(8).build())
///     .during(3600)
///     .action(my_switch)
///     .build());
/// task.reschedule(Local::now().timestamp());
/// ```
///
/// # See Also
/// - [`TimerTask`]
/// - [`crate::task::FixedTimeTask`]
pub struct PeriodicTask {
    id: Uuid,
    at: Arc<dyn TimeSpec>,
    until: Option<Arc<dyn TimeSpec>>,
    during: u32,
    action: Arc<dyn TimerAction>,
    debug_label: String,
    state: Mutex<PeriodicState>,
}

impl std::fmt::Debug for PeriodicTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PeriodicTask")
            .field("id", &self.id)
            .field("during", &self.during)
            .field("debug_label", &self.debug_label)
            .finish()
    }
}

impl PeriodicTask {
    /// Constructs a [`PeriodicTask`] builder, refer to [`PeriodicTaskConfig`] for
    /// the available parameters
    pub fn builder() -> PeriodicTaskConfigBuilder {
        PeriodicTaskConfig::builder()
    }

    pub fn debug_label(&self) -> &str {
        &self.debug_label
    }

    /// The current flip-flop value, true while the task is holding
    pub fn value(&self) -> bool {
        self.lock_state().value
    }

    /// Registers this task as a change listener with every live variable its
    /// specifications consume. The registration is weak, dropping the task is
    /// enough to unhook it
    pub fn track_variables(self: &Arc<Self>) {
        let listener = Arc::downgrade(self) as Weak<dyn ChangeListener>;
        self.at.subscribe(listener.clone());
        if let Some(until) = &self.until {
            until.subscribe(listener);
        }
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, PeriodicState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Recomputes the next `at` match strictly after `from` into `state`,
    /// translating resolver failures into deactivation
    fn compute_next(&self, state: &mut PeriodicState, from: i64) {
        match find_next(from, self.at.as_ref(), &self.debug_label) {
            Ok(instant) => state.next_exec = Some(instant),
            Err(err @ TimerErrors::ImpossibleSchedule(_)) => {
                error!(task = %self.debug_label, %err, "task deactivated permanently");
                state.dead = true;
                state.next_exec = None;
            }
            Err(err) => {
                warn!(task = %self.debug_label, %err, "task deactivated");
                state.next_exec = None;
            }
        }
    }

    /// Recomputes the release instant from `until` strictly after `from`
    fn compute_release(&self, state: &mut PeriodicState, until: &Arc<dyn TimeSpec>, from: i64) {
        match find_next(from, until.as_ref(), &self.debug_label) {
            Ok(instant) => {
                state.after = instant;
                state.next_exec = Some(instant);
            }
            Err(err) => {
                warn!(task = %self.debug_label, %err, "release instant not computable, task deactivated");
                state.after = 0;
                state.next_exec = None;
            }
        }
    }
}

#[async_trait]
impl TimerTask for PeriodicTask {
    fn id(&self) -> Uuid {
        self.id
    }

    fn next_exec_time(&self) -> Option<i64> {
        self.lock_state().next_exec
    }

    async fn on_fire(&self, time: i64) {
        let engaged;
        {
            let mut state = self.lock_state();
            engaged = !state.value;
            if engaged {
                if let Some(until) = &self.until {
                    state.value = true;
                    self.compute_release(&mut state, until, time);
                } else if self.during > 0 {
                    state.value = true;
                    state.after = time + self.during as i64;
                    state.next_exec = Some(state.after);
                } else {
                    // plain trigger, stays idle and waits for the next match
                    let from = time.max(state.after);
                    self.compute_next(&mut state, from);
                }
            } else {
                state.value = false;
                let release = state.after;
                state.after = 0;
                // the next engagement comes strictly after the release
                let from = time.max(release);
                self.compute_next(&mut state, from);
            }
        }
        if let Err(err) = self.action.execute(engaged).await {
            warn!(task = %self.debug_label, %err, "timer action failed");
        }
    }

    fn reschedule(&self, from: i64) {
        let mut state = self.lock_state();
        if state.dead {
            return;
        }
        if state.value {
            // while holding, the release instant governs the next firing
            if let Some(until) = &self.until {
                self.compute_release(&mut state, until, from);
            } else {
                state.next_exec = Some(state.after);
            }
        } else {
            self.compute_next(&mut state, from);
        }
    }

    fn status(&self) -> TaskStatus {
        let state = self.lock_state();
        TaskStatus {
            id: self.id,
            next_exec: state.next_exec.and_then(local_from_epoch),
            value: state.value,
        }
    }
}

impl ChangeListener for PeriodicTask {
    fn on_change(&self, _variable: &str) {
        self.reschedule(Local::now().timestamp());
    }
}
