use thiserror::Error;

#[allow(unused_imports)]
use crate::timespec::TimeSpec;

#[allow(unused_imports)]
use crate::exceptions::DaySpec;

/// [`TimerErrors`] is the main enum that contains all the errors which can be thrown by
/// the timer core, it uses under the hood [`thiserror`] to make it as smooth sailing to
/// add more errors in the future as possible. None of these errors ever escapes the
/// manager's worker, they either surface at configuration time or deactivate the
/// offending task
#[derive(Error, Debug)]
pub enum TimerErrors {
    /// This error is meant to happen at configuration time, when a [`TimeSpec`] pins a
    /// combination of calendar fields that can never occur (for example day 30 inside
    /// a fixed February). The offending task is never registered
    #[error("Time specification is invalid: {0}")]
    InvalidTimeSpec(String),

    /// This error is meant to happen at configuration time, when an exception day
    /// entry ([`DaySpec`]) carries an out-of-range component
    #[error("Day specification is invalid: day={0:?} month={1:?} year={2:?}")]
    InvalidDaySpec(Option<u32>, Option<u32>, Option<i32>),

    /// This error is meant to happen when the resolver exhausted its day lookahead
    /// without finding a firing instant, the task owning the specification goes
    /// inactive until something reschedules it again
    #[error("No firing instant found for `{0}` within {1} day(s) of lookahead")]
    UnresolvableSchedule(String, u32),

    /// This error is meant to happen when firing constraints can never be satisfied
    /// no matter how far the search advances, the task owning the specification goes
    /// permanently inactive
    #[error("Firing constraints of `{0}` can never be satisfied")]
    ImpossibleSchedule(String),

    /// This error is meant to happen when a task's side effect reports failure,
    /// it is logged and scheduling continues as if the side effect had succeeded
    #[error("Timer action of task `{0}` failed: {1}")]
    ActionFailure(String, String),

    /// This error is meant to happen when the XML configuration cannot be parsed
    /// or holds values outside their documented ranges
    #[error("Configuration is malformed: {0}")]
    ConfigParse(String),
}

impl From<quick_xml::Error> for TimerErrors {
    fn from(err: quick_xml::Error) -> Self {
        TimerErrors::ConfigParse(err.to_string())
    }
}

impl From<quick_xml::events::attributes::AttrError> for TimerErrors {
    fn from(err: quick_xml::events::attributes::AttrError) -> Self {
        TimerErrors::ConfigParse(err.to_string())
    }
}
