pub mod fixed_time;

pub mod periodic;

pub use fixed_time::FixedTimeTask;
pub use periodic::PeriodicTask;

use crate::datetime::{CalendarTime, DateField, Resolution};
use crate::errors::TimerErrors;
use crate::timespec::TimeSpec;
use crate::utils::{fold_local, local_from_epoch};
use async_trait::async_trait;
use chrono::{DateTime, Local, NaiveDate};
use std::fmt;
use std::ops::Deref;
use uuid::Uuid;

/// How many days ahead a task searches for its next firing before giving up.
/// Covers a full year including a leap day, so "every 29th of February" stays
/// schedulable from any reference
pub(crate) const LOOKAHEAD_DAYS: u32 = 366;

/// [`TimerAction`] is the domain side effect a timer task runs when it fires.
/// The timer core knows nothing about what the effect does, it only relays the
/// task's on/off value and expects the effect to stay non-blocking on the scale
/// of the scheduling horizon: a slow effect delays every other task, which is
/// the documented contract of the single-worker model
///
/// # Required Method(s)
/// One method, [`TimerAction::execute`], invoked with ``true`` when the task
/// engages and ``false`` when a pulse releases. A returned error is logged and
/// scheduling continues
///
/// # Trait Implementation(s)
/// This trait is also implemented for any type implementing ``Deref`` where the
/// target is itself an implementation of [`TimerAction`]
#[async_trait]
pub trait TimerAction: Send + Sync {
    async fn execute(&self, engaged: bool) -> Result<(), TimerErrors>;
}

#[async_trait]
impl<T> TimerAction for T
where
    T: Deref + Send + Sync,
    T::Target: TimerAction + 'static,
{
    async fn execute(&self, engaged: bool) -> Result<(), TimerErrors> {
        self.deref().execute(engaged).await
    }
}

/// Point-in-time snapshot of a task, as exported by the status document
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TaskStatus {
    pub id: Uuid,
    /// The next firing as a local instant, ``None`` while the task is inactive
    pub next_exec: Option<DateTime<Local>>,
    /// The on/off value of the task's flip-flop (always off for single-shot tasks)
    pub value: bool,
}

/// [`TimerTask`] is the rescheduling unit of the timer core: it knows when it
/// fires next, runs its side effect when the manager dispatches it and computes
/// its own following instant afterwards
///
/// # Required Method(s)
/// When implementing [`TimerTask`], one has to supply implementations for:
/// - [`TimerTask::id`] A stable identity, used for (de)registration
/// - [`TimerTask::next_exec_time`] The next firing as an epoch second, ``None``
///   while inactive
/// - [`TimerTask::on_fire`] Runs the side effect and advances the task's state
///   machine; the task is expected to have rescheduled itself when this returns
/// - [`TimerTask::reschedule`] Recomputes the next firing strictly after `from`
/// - [`TimerTask::status`] A snapshot for the status document
///
/// # Trait Implementation(s)
/// Two implementations exist: [`PeriodicTask`] (recurring, with optional hold
/// interval) and [`FixedTimeTask`] (single shot at an absolute instant)
///
/// # Object Safety
/// Object safe, the manager stores ``Arc<dyn TimerTask>``
#[async_trait]
pub trait TimerTask: Send + Sync + fmt::Debug {
    fn id(&self) -> Uuid;

    fn next_exec_time(&self) -> Option<i64>;

    async fn on_fire(&self, time: i64);

    fn reschedule(&self, from: i64);

    fn status(&self) -> TaskStatus;
}

/// End of `date` at minute granularity: a resolution referenced here can only
/// produce instants from the following day onward, midnight included
pub(crate) fn end_of_day(date: NaiveDate) -> Option<DateTime<Local>> {
    Some(fold_local(date.and_hms_opt(23, 59, 0)?))
}

/// Searches the next firing instant of `spec` strictly after the epoch second
/// `from`. Walks day by day: a candidate rejected by the exception policy (or
/// dragged at-or-before `from` by the offset) restarts the search from the end of
/// its day, an unresolved reference from the end of the reference day. Pure; the
/// caller decides how to log and deactivate
pub(crate) fn find_next(
    from: i64,
    spec: &dyn TimeSpec,
    label: &str,
) -> Result<i64, TimerErrors> {
    let mut reference = local_from_epoch(from)
        .ok_or_else(|| TimerErrors::ImpossibleSchedule(label.to_owned()))?;
    for _ in 0..LOOKAHEAD_DAYS {
        let current = CalendarTime::reference(&reference);
        let day = spec.day_constraints(&reference);
        let time = spec.time_constraints(&day);
        let mut candidate = CalendarTime::constrained(
            &reference,
            day.year,
            day.month,
            day.day,
            time.hour,
            time.minute,
            day.weekdays,
        );
        match candidate.try_resolve(&current, DateField::Year, DateField::Minute) {
            Resolution::Resolved => {
                let Some(local) = candidate.to_local() else {
                    return Err(TimerErrors::ImpossibleSchedule(label.to_owned()));
                };
                let date = local.date_naive();
                if !spec.date_is_acceptable(date) {
                    reference = end_of_day(date)
                        .ok_or_else(|| TimerErrors::ImpossibleSchedule(label.to_owned()))?;
                    continue;
                }
                let instant = local.timestamp() + spec.offset_seconds();
                if instant <= from {
                    // the offset dragged the candidate behind the reference,
                    // search on from the unshifted instant
                    reference = local;
                    continue;
                }
                return Ok(instant);
            }
            Resolution::Unresolved => {
                let date = reference.date_naive();
                let day_end = end_of_day(date)
                    .ok_or_else(|| TimerErrors::ImpossibleSchedule(label.to_owned()))?;
                reference = if reference < day_end {
                    day_end
                } else {
                    // the day was already exhausted, move on to the next one
                    date.succ_opt()
                        .and_then(end_of_day)
                        .ok_or_else(|| TimerErrors::ImpossibleSchedule(label.to_owned()))?
                };
            }
            Resolution::Impossible => {
                return Err(TimerErrors::ImpossibleSchedule(label.to_owned()));
            }
        }
    }
    Err(TimerErrors::UnresolvableSchedule(
        label.to_owned(),
        LOOKAHEAD_DAYS,
    ))
}
