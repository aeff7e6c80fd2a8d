use async_trait::async_trait;
use chrono::{Local, TimeZone, Timelike};
use domotimer::errors::TimerErrors;
use domotimer::exceptions::{DaySpec, ExceptionDays};
use domotimer::task::{PeriodicTask, TimerAction, TimerTask};
use domotimer::timespec::{ExceptionPolicy, FixedTimeSpec, VariableTimeSpec};
use domotimer::variables::InMemoryVariableSource;
use pretty_assertions::assert_eq;
use std::sync::{Arc, Mutex};

/// Records every (engaged) value the task hands to its side effect
#[derive(Default)]
struct RecordingAction {
    events: Mutex<Vec<bool>>,
}

impl RecordingAction {
    fn events(&self) -> Vec<bool> {
        self.events.lock().unwrap().clone()
    }
}

#[async_trait]
impl TimerAction for RecordingAction {
    async fn execute(&self, engaged: bool) -> Result<(), TimerErrors> {
        self.events.lock().unwrap().push(engaged);
        Ok(())
    }
}

fn epoch(year: i32, month: u32, day: u32, hour: u32, minute: u32) -> i64 {
    Local
        .with_ymd_and_hms(year, month, day, hour, minute, 0)
        .single()
        .unwrap()
        .timestamp()
}

#[tokio::test]
async fn plain_trigger_advances_day_by_day() {
    let action = Arc::new(RecordingAction::default());
    let task = PeriodicTask::builder()
        .at(FixedTimeSpec::builder().minute(0).hour(12).build())
        .action(action.clone())
        .build();

    task.reschedule(epoch(2024, 6, 10, 11, 59));
    let first = epoch(2024, 6, 10, 12, 0);
    assert_eq!(task.next_exec_time(), Some(first));

    task.on_fire(first).await;
    assert_eq!(action.events(), vec![true]);
    assert_eq!(task.next_exec_time(), Some(epoch(2024, 6, 11, 12, 0)));
    assert!(!task.value());
}

#[tokio::test]
async fn pulse_with_hold_time_releases_and_rearms() {
    let action = Arc::new(RecordingAction::default());
    let task = PeriodicTask::builder()
        .at(FixedTimeSpec::builder().minute(0).hour(8).build())
        .during(3600)
        .action(action.clone())
        .build();

    task.reschedule(epoch(2024, 6, 10, 7, 0));
    let fire = epoch(2024, 6, 10, 8, 0);
    assert_eq!(task.next_exec_time(), Some(fire));

    task.on_fire(fire).await;
    assert!(task.value(), "task should be holding");
    assert_eq!(task.next_exec_time(), Some(fire + 3600));

    task.on_fire(fire + 3600).await;
    assert!(!task.value(), "hold released");
    assert_eq!(action.events(), vec![true, false]);
    assert_eq!(task.next_exec_time(), Some(epoch(2024, 6, 11, 8, 0)));
}

#[tokio::test]
async fn pulse_with_until_releases_at_its_match() {
    let action = Arc::new(RecordingAction::default());
    let task = PeriodicTask::builder()
        .at(FixedTimeSpec::builder().minute(0).hour(8).build())
        .until(FixedTimeSpec::builder().minute(0).hour(17).build())
        .action(action.clone())
        .build();

    task.reschedule(epoch(2024, 6, 10, 7, 30));
    let fire = epoch(2024, 6, 10, 8, 0);
    task.on_fire(fire).await;
    assert!(task.value());
    assert_eq!(task.next_exec_time(), Some(epoch(2024, 6, 10, 17, 0)));

    task.on_fire(epoch(2024, 6, 10, 17, 0)).await;
    assert!(!task.value());
    assert_eq!(action.events(), vec![true, false]);
    assert_eq!(task.next_exec_time(), Some(epoch(2024, 6, 11, 8, 0)));
}

#[tokio::test]
async fn exception_day_is_skipped_with_policy_no() {
    let registry = Arc::new(ExceptionDays::new());
    registry.add_day(DaySpec::new(Some(25), Some(12), None));
    let task = PeriodicTask::builder()
        .at(FixedTimeSpec::builder()
            .minute(0)
            .hour(0)
            .exception(ExceptionPolicy::No)
            .exceptions(registry)
            .build())
        .action(RecordingAction::default())
        .build();

    task.reschedule(epoch(2024, 12, 24, 23, 0));
    assert_eq!(task.next_exec_time(), Some(epoch(2024, 12, 26, 0, 0)));
}

#[tokio::test]
async fn exception_policy_yes_waits_for_an_exception_day() {
    let registry = Arc::new(ExceptionDays::new());
    registry.add_day(DaySpec::new(Some(25), Some(12), None));
    let task = PeriodicTask::builder()
        .at(FixedTimeSpec::builder()
            .minute(0)
            .hour(0)
            .exception(ExceptionPolicy::Yes)
            .exceptions(registry)
            .build())
        .action(RecordingAction::default())
        .build();

    task.reschedule(epoch(2024, 12, 20, 12, 0));
    assert_eq!(task.next_exec_time(), Some(epoch(2024, 12, 25, 0, 0)));
}

#[tokio::test]
async fn negative_offset_shifts_and_never_moves_backwards() {
    let action = Arc::new(RecordingAction::default());
    let task = PeriodicTask::builder()
        .at(FixedTimeSpec::builder().minute(0).hour(12).offset(-900).build())
        .action(action)
        .build();

    // plenty of room: quarter to noon
    task.reschedule(epoch(2024, 6, 10, 9, 0));
    assert_eq!(task.next_exec_time(), Some(epoch(2024, 6, 10, 11, 45)));

    // the shifted instant already passed, the next match is tomorrow's
    task.reschedule(epoch(2024, 6, 10, 11, 50));
    assert_eq!(task.next_exec_time(), Some(epoch(2024, 6, 11, 11, 45)));
}

#[tokio::test]
async fn impossible_spec_deactivates_permanently() {
    let task = PeriodicTask::builder()
        .at(FixedTimeSpec::builder().day(31).month(2).build())
        .action(RecordingAction::default())
        .build();

    task.reschedule(epoch(2024, 6, 10, 0, 0));
    assert_eq!(task.next_exec_time(), None);
    // a later reschedule attempt changes nothing, the task is dead
    task.reschedule(epoch(2024, 6, 11, 0, 0));
    assert_eq!(task.next_exec_time(), None);
}

#[tokio::test]
async fn reschedule_is_deterministic_for_identical_references() {
    let task = PeriodicTask::builder()
        .at(FixedTimeSpec::builder().minute(30).hour(8).build())
        .action(RecordingAction::default())
        .build();
    let from = epoch(2024, 6, 10, 9, 0);
    task.reschedule(from);
    let first = task.next_exec_time();
    task.reschedule(from);
    assert_eq!(task.next_exec_time(), first);
}

#[tokio::test]
async fn firing_sequence_makes_strict_progress() {
    let task = PeriodicTask::builder()
        .at(FixedTimeSpec::builder().minute(30).hour(8).build())
        .action(RecordingAction::default())
        .build();
    task.reschedule(epoch(2024, 6, 10, 0, 0));
    let mut previous = 0i64;
    for _ in 0..10 {
        let next = task.next_exec_time().expect("task must stay active");
        assert!(next > previous, "{next} must come after {previous}");
        task.on_fire(next).await;
        previous = next;
    }
}

#[tokio::test]
async fn late_dispatch_collapses_missed_firings() {
    let action = Arc::new(RecordingAction::default());
    let task = PeriodicTask::builder()
        .at(FixedTimeSpec::builder().minute(0).hour(12).build())
        .action(action.clone())
        .build();
    task.reschedule(epoch(2024, 6, 10, 11, 0));

    // dispatched three days too late: one firing, rescheduled strictly ahead
    let late_now = epoch(2024, 6, 13, 9, 30);
    task.on_fire(late_now).await;
    assert_eq!(action.events(), vec![true]);
    assert_eq!(task.next_exec_time(), Some(epoch(2024, 6, 13, 12, 0)));
}

#[tokio::test]
async fn daily_task_fires_once_per_calendar_day() {
    // spans late March and covers a DST transition wherever the host calendar
    // has one; day advancement must go through the calendar, never "+86400"
    let task = PeriodicTask::builder()
        .at(FixedTimeSpec::builder().minute(30).hour(0).build())
        .action(RecordingAction::default())
        .build();
    task.reschedule(epoch(2024, 3, 20, 1, 0));
    let mut previous_date = None;
    for _ in 0..40 {
        let next = task.next_exec_time().expect("task must stay active");
        let local = Local.timestamp_opt(next, 0).single().unwrap();
        if let Some(previous) = previous_date {
            assert_eq!(local.date_naive(), previous + chrono::Duration::days(1));
        }
        previous_date = Some(local.date_naive());
        task.on_fire(next).await;
    }
}

#[tokio::test]
async fn variable_change_reschedules_through_weak_listener() {
    let source = Arc::new(InMemoryVariableSource::new());
    source.set_time("sunset_time", 20, 0);
    let task = Arc::new(
        PeriodicTask::builder()
            .at(VariableTimeSpec::builder()
                .source(source.clone())
                .time_var("sunset_time".to_owned())
                .build())
            .action(RecordingAction::default())
            .build(),
    );
    task.track_variables();
    task.reschedule(Local::now().timestamp());
    let armed_for = |task: &Arc<PeriodicTask>| {
        task.status()
            .next_exec
            .map(|dt| (dt.hour(), dt.minute()))
            .expect("task must be active")
    };
    assert_eq!(armed_for(&task), (20, 0));

    // the subscription fires synchronously and re-arms the task
    source.set_time("sunset_time", 21, 30);
    assert_eq!(armed_for(&task), (21, 30));

    // dropping the task unhooks it, further updates must not panic
    drop(task);
    source.set_time("sunset_time", 22, 0);
}
