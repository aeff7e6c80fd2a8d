pub mod fixed;

pub mod variable;

pub use fixed::FixedTimeSpec;
pub use variable::VariableTimeSpec;

use crate::datetime::WeekdaySet;
use crate::errors::TimerErrors;
use crate::exceptions::ExceptionDays;
use crate::variables::ChangeListener;
use chrono::{DateTime, Local, NaiveDate};
use std::ops::Deref;
use std::sync::{Arc, Weak};

/// How a time specification relates to the exception day registry it was
/// configured against
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ExceptionPolicy {
    /// Fire only on dates registered as exception days
    Yes,
    /// Never fire on a date registered as an exception day
    No,
    /// Ignore the registry entirely
    #[default]
    DontCare,
}

/// Date-level constraints extracted from a [`TimeSpec`]: ``None`` components and
/// the empty weekday set are wildcards the resolver is free to fill in
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DayConstraints {
    pub day: Option<u32>,
    pub month: Option<u32>,
    pub year: Option<i32>,
    pub weekdays: WeekdaySet,
}

/// Time-of-day constraints extracted from a [`TimeSpec`], same wildcard convention
/// as [`DayConstraints`]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TimeConstraints {
    pub minute: Option<u32>,
    pub hour: Option<u32>,
}

/// The [`TimeSpec`] trait is the user-facing description of *when* something
/// should fire: which calendar fields are pinned, which weekdays are acceptable,
/// how the specification relates to exception days and by how many seconds the
/// resolved instant is shifted. Tasks turn it into resolver input on every
/// reschedule
///
/// # Required Method(s)
/// If one wants to implement this trait, they must provide implementations for
/// [`TimeSpec::day_constraints`], [`TimeSpec::time_constraints`],
/// [`TimeSpec::offset_seconds`], [`TimeSpec::exception_policy`],
/// [`TimeSpec::exceptions`] and [`TimeSpec::check_is_valid`]; specifications
/// reading live variables additionally override [`TimeSpec::variables`] and
/// [`TimeSpec::subscribe`]
///
/// # Trait Implementation(s)
/// Two noteworthy implementations exist:
/// - [`FixedTimeSpec`] pins literal field values, any of which may be wildcard
/// - [`VariableTimeSpec`] sources its date and/or time of day from live variables
///   (sunset-like values), falling back to wildcards while a variable is unset
///
/// This trait is also implemented for any type implementing ``Deref`` where the
/// target is itself an implementation of [`TimeSpec`], making it relatively easy
/// to store both owned and non-owned values
///
/// # Object Safety
/// This trait is object safe, tasks store their specifications as
/// ``Arc<dyn TimeSpec>``
pub trait TimeSpec: Send + Sync {
    /// The date-level constraints as of `current`. Implementations reading live
    /// variables evaluate them here, which is why the reference instant is passed
    /// in: an unset variable degrades to wildcards rather than to an error
    fn day_constraints(&self, current: &DateTime<Local>) -> DayConstraints;

    /// The time-of-day constraints for the date the resolver is about to try.
    /// `day` carries the already-extracted date constraints so implementations may
    /// choose the time per target date (sunrise on the 21st of June differs from
    /// sunrise on the 21st of December)
    fn time_constraints(&self, day: &DayConstraints) -> TimeConstraints;

    /// Signed shift in seconds applied after resolution ("15 minutes before
    /// sunset" is a sunset-sourced spec with an offset of −900)
    fn offset_seconds(&self) -> i64;

    fn exception_policy(&self) -> ExceptionPolicy;

    /// The exception day registry this specification was configured against
    fn exceptions(&self) -> &Arc<ExceptionDays>;

    /// Validates the literal parts of the specification. Pure and cheap, called at
    /// configuration time; a specification that fails here never reaches a task
    fn check_is_valid(&self) -> Result<(), TimerErrors>;

    /// Names of the live variables this specification consumes, used for
    /// subscription wiring and diagnostics. Purely literal specifications
    /// consume none, hence the default
    fn variables(&self) -> Vec<String> {
        Vec::new()
    }

    /// Registers `listener` with every live variable this specification consumes.
    /// Purely literal specifications have nothing to register, hence the default
    /// no-op
    fn subscribe(&self, listener: Weak<dyn ChangeListener>) {
        let _ = listener;
    }

    /// Whether a resolved candidate on `date` is acceptable under the exception
    /// policy
    fn date_is_acceptable(&self, date: NaiveDate) -> bool {
        match self.exception_policy() {
            ExceptionPolicy::DontCare => true,
            ExceptionPolicy::Yes => self.exceptions().is_exception(date),
            ExceptionPolicy::No => !self.exceptions().is_exception(date),
        }
    }
}

impl<T> TimeSpec for T
where
    T: Deref + Send + Sync,
    T::Target: TimeSpec,
{
    fn day_constraints(&self, current: &DateTime<Local>) -> DayConstraints {
        self.deref().day_constraints(current)
    }

    fn time_constraints(&self, day: &DayConstraints) -> TimeConstraints {
        self.deref().time_constraints(day)
    }

    fn offset_seconds(&self) -> i64 {
        self.deref().offset_seconds()
    }

    fn exception_policy(&self) -> ExceptionPolicy {
        self.deref().exception_policy()
    }

    fn exceptions(&self) -> &Arc<ExceptionDays> {
        self.deref().exceptions()
    }

    fn check_is_valid(&self) -> Result<(), TimerErrors> {
        self.deref().check_is_valid()
    }

    fn variables(&self) -> Vec<String> {
        self.deref().variables()
    }

    fn subscribe(&self, listener: Weak<dyn ChangeListener>) {
        self.deref().subscribe(listener)
    }
}
