use crate::datetime::{WeekdaySet, days_in_month, longest_month};
use crate::errors::TimerErrors;
use crate::exceptions::{ExceptionDays, SHARED_EXCEPTION_DAYS};
use crate::timespec::{DayConstraints, ExceptionPolicy, TimeConstraints, TimeSpec};
use chrono::{DateTime, Local};
use std::sync::Arc;
use typed_builder::TypedBuilder;

/// [`FixedTimeSpec`] is an implementation of the [`TimeSpec`] trait where every
/// constraint is a literal: pinned field values (any of which may be left
/// wildcard), a weekday mask, an exception policy and a post-resolution offset.
/// ``minute=30, hour=8, weekdays=Mon..Fri`` is the classic "workday alarm" shape
///
/// # Constructor(s)
/// When constructing a [`FixedTimeSpec`], one uses [`FixedTimeSpec::builder`];
/// every parameter is optional and defaults to wildcard (respectively
/// [`ExceptionPolicy::DontCare`], zero offset and the shared exception registry)
///
/// # Examples
/// ```ignore
/// // Every weekday at 08:30, but never on a registered holiday
/// let spec = FixedTimeSpec::builder()
///     .minute(30)
///     .hour(8)
///     .weekdays(WeekdaySet::MON.with(WeekdaySet::TUE).with(WeekdaySet::WED)
///         .with(WeekdaySet::THU).with(WeekdaySet::FRI))
///     .exception(ExceptionPolicy::No)
///     .build();
/// ```
///
/// # See Also
/// - [`TimeSpec`]
/// - [`crate::timespec::VariableTimeSpec`]
#[derive(TypedBuilder, Clone)]
pub struct FixedTimeSpec {
    #[builder(default, setter(strip_option(fallback = minute_opt)))]
    minute: Option<u32>,

    #[builder(default, setter(strip_option(fallback = hour_opt)))]
    hour: Option<u32>,

    #[builder(default, setter(strip_option(fallback = day_opt)))]
    day: Option<u32>,

    #[builder(default, setter(strip_option(fallback = month_opt)))]
    month: Option<u32>,

    #[builder(default, setter(strip_option(fallback = year_opt)))]
    year: Option<i32>,

    #[builder(default = WeekdaySet::ANY)]
    weekdays: WeekdaySet,

    #[builder(default)]
    exception: ExceptionPolicy,

    /// Signed shift in seconds applied after resolution
    #[builder(default = 0)]
    offset: i64,

    #[builder(default = SHARED_EXCEPTION_DAYS.clone())]
    exceptions: Arc<ExceptionDays>,
}

impl TimeSpec for FixedTimeSpec {
    fn day_constraints(&self, _current: &DateTime<Local>) -> DayConstraints {
        DayConstraints {
            day: self.day,
            month: self.month,
            year: self.year,
            weekdays: self.weekdays,
        }
    }

    fn time_constraints(&self, _day: &DayConstraints) -> TimeConstraints {
        TimeConstraints {
            minute: self.minute,
            hour: self.hour,
        }
    }

    fn offset_seconds(&self) -> i64 {
        self.offset
    }

    fn exception_policy(&self) -> ExceptionPolicy {
        self.exception
    }

    fn exceptions(&self) -> &Arc<ExceptionDays> {
        &self.exceptions
    }

    fn check_is_valid(&self) -> Result<(), TimerErrors> {
        if self.minute.is_some_and(|m| m > 59) {
            return Err(TimerErrors::InvalidTimeSpec(format!(
                "minute {} out of range",
                self.minute.unwrap_or_default()
            )));
        }
        if self.hour.is_some_and(|h| h > 23) {
            return Err(TimerErrors::InvalidTimeSpec(format!(
                "hour {} out of range",
                self.hour.unwrap_or_default()
            )));
        }
        if self.month.is_some_and(|m| !(1..=12).contains(&m)) {
            return Err(TimerErrors::InvalidTimeSpec(format!(
                "month {} out of range",
                self.month.unwrap_or_default()
            )));
        }
        if self.year.is_some_and(|y| !(1970..=9999).contains(&y)) {
            return Err(TimerErrors::InvalidTimeSpec(format!(
                "year {} out of range",
                self.year.unwrap_or_default()
            )));
        }
        if let Some(day) = self.day {
            if !(1..=31).contains(&day) {
                return Err(TimerErrors::InvalidTimeSpec(format!(
                    "day {day} out of range"
                )));
            }
            // the pinned day must exist in at least one acceptable month
            match (self.month, self.year) {
                (Some(month), Some(year)) => {
                    if day as i32 > days_in_month(year, month as i32) {
                        return Err(TimerErrors::InvalidTimeSpec(format!(
                            "day {day} does not exist in {year:04}-{month:02}"
                        )));
                    }
                }
                (Some(month), None) => {
                    if day as i32 > longest_month(month as i32) {
                        return Err(TimerErrors::InvalidTimeSpec(format!(
                            "day {day} does not exist in month {month}"
                        )));
                    }
                }
                _ => {}
            }
        }
        Ok(())
    }
}
