use crate::task::{TaskStatus, TimerAction, TimerTask};
use crate::utils::local_from_epoch;
use async_trait::async_trait;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use tracing::{debug, warn};
use typed_builder::TypedBuilder;
use uuid::Uuid;

/// [`FixedTimeTaskConfig`] is simply used as a builder to construct
/// [`FixedTimeTask`], it isn't meant to be used by itself, you may refer to
/// [`FixedTimeTask::builder`]
#[derive(TypedBuilder)]
#[builder(build_method(into = FixedTimeTask))]
pub struct FixedTimeTaskConfig {
    /// The absolute firing instant as an epoch second
    exec_time: i64,

    /// The domain side effect to run at the firing instant
    #[builder(setter(transform = |a: impl TimerAction + 'static| Arc::new(a) as Arc<dyn TimerAction>))]
    action: Arc<dyn TimerAction>,

    /// Shown in log lines, ideally unique; defaults to a generated UUID string
    #[builder(default = Uuid::new_v4().to_string())]
    debug_label: String,
}

impl From<FixedTimeTaskConfig> for FixedTimeTask {
    fn from(config: FixedTimeTaskConfig) -> Self {
        FixedTimeTask {
            id: Uuid::new_v4(),
            exec_time: AtomicI64::new(config.exec_time),
            action: config.action,
            debug_label: config.debug_label,
        }
    }
}

/// [`FixedTimeTask`] is the single-shot implementation of [`TimerTask`]: it
/// fires exactly once at an absolute instant and is spent afterwards. A task
/// whose instant already lies in the past deactivates on the first reschedule
/// without firing
///
/// # Constructor(s)
/// When constructing a [`FixedTimeTask`], one uses [`FixedTimeTask::builder`]
///
/// # See Also
/// - [`TimerTask`]
/// - [`crate::task::PeriodicTask`]
pub struct FixedTimeTask {
    id: Uuid,
    /// 0 once spent or expired
    exec_time: AtomicI64,
    action: Arc<dyn TimerAction>,
    debug_label: String,
}

impl std::fmt::Debug for FixedTimeTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FixedTimeTask")
            .field("id", &self.id)
            .field("exec_time", &self.exec_time.load(Ordering::Acquire))
            .field("debug_label", &self.debug_label)
            .finish()
    }
}

impl FixedTimeTask {
    /// Constructs a [`FixedTimeTask`] builder, refer to [`FixedTimeTaskConfig`]
    /// for the available parameters
    pub fn builder() -> FixedTimeTaskConfigBuilder {
        FixedTimeTaskConfig::builder()
    }

    pub fn debug_label(&self) -> &str {
        &self.debug_label
    }
}

#[async_trait]
impl TimerTask for FixedTimeTask {
    fn id(&self) -> Uuid {
        self.id
    }

    fn next_exec_time(&self) -> Option<i64> {
        match self.exec_time.load(Ordering::Acquire) {
            0 => None,
            instant => Some(instant),
        }
    }

    async fn on_fire(&self, _time: i64) {
        self.exec_time.store(0, Ordering::Release);
        if let Err(err) = self.action.execute(true).await {
            warn!(task = %self.debug_label, %err, "timer action failed");
        }
    }

    fn reschedule(&self, from: i64) {
        let instant = self.exec_time.load(Ordering::Acquire);
        if instant != 0 && instant <= from {
            self.exec_time.store(0, Ordering::Release);
            debug!(task = %self.debug_label, "single-shot instant already passed, task deactivated");
        }
    }

    fn status(&self) -> TaskStatus {
        TaskStatus {
            id: self.id,
            next_exec: self.next_exec_time().and_then(local_from_epoch),
            value: false,
        }
    }
}
