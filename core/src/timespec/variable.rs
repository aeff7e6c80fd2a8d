use crate::datetime::WeekdaySet;
use crate::errors::TimerErrors;
use crate::exceptions::{ExceptionDays, SHARED_EXCEPTION_DAYS};
use crate::timespec::{DayConstraints, ExceptionPolicy, TimeConstraints, TimeSpec};
use crate::variables::{ChangeListener, VariableSource};
use chrono::{DateTime, Local};
use std::sync::{Arc, Weak};
use typed_builder::TypedBuilder;

/// [`VariableTimeSpec`] is an implementation of the [`TimeSpec`] trait where the
/// time of day and/or the date are sourced from live variables of the controller's
/// object model (sunset times, "today" markers and the like). Components without a
/// bound variable fall back to the literal fields; a bound variable that is
/// currently unset contributes wildcards, so the task keeps firing on a degraded
/// schedule instead of stalling
///
/// Tasks consuming such a specification register themselves through
/// [`TimeSpec::subscribe`] and are rescheduled the moment a bound variable changes
///
/// # Constructor(s)
/// When constructing a [`VariableTimeSpec`], one uses [`VariableTimeSpec::builder`]
/// and must at least supply the [`VariableSource`]; ``time_var`` and ``date_var``
/// name the bound variables, everything else mirrors
/// [`crate::timespec::FixedTimeSpec`]
///
/// # Examples
/// ```ignore
/// // Fifteen minutes before sunset, every day
/// let spec = VariableTimeSpec::builder()
///     .source(source)
///     .time_var("sunset_time".to_owned())
///     .offset(-900)
///     .build();
/// ```
///
/// # See Also
/// - [`TimeSpec`]
/// - [`VariableSource`]
#[derive(TypedBuilder)]
pub struct VariableTimeSpec {
    #[builder(setter(transform = |s: impl VariableSource + 'static| Arc::new(s) as Arc<dyn VariableSource>))]
    source: Arc<dyn VariableSource>,

    #[builder(default, setter(strip_option(fallback = time_var_opt)))]
    time_var: Option<String>,

    #[builder(default, setter(strip_option(fallback = date_var_opt)))]
    date_var: Option<String>,

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

impl TimeSpec for VariableTimeSpec {
    fn day_constraints(&self, _current: &DateTime<Local>) -> DayConstraints {
        let Some(var) = &self.date_var else {
            return DayConstraints {
                day: self.day,
                month: self.month,
                year: self.year,
                weekdays: self.weekdays,
            };
        };
        match self.source.read_date(var) {
            Some((day, month, year)) => DayConstraints {
                day: Some(day),
                month: Some(month),
                year: Some(year),
                weekdays: self.weekdays,
            },
            // unset variable: the whole date degrades to wildcards
            None => DayConstraints {
                weekdays: self.weekdays,
                ..DayConstraints::default()
            },
        }
    }

    fn time_constraints(&self, _day: &DayConstraints) -> TimeConstraints {
        let Some(var) = &self.time_var else {
            return TimeConstraints {
                minute: self.minute,
                hour: self.hour,
            };
        };
        match self.source.read_time(var) {
            Some((hour, minute)) => TimeConstraints {
                minute: Some(minute),
                hour: Some(hour),
            },
            None => TimeConstraints::default(),
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
        // only the literal fallbacks can be wrong at configuration time, variables
        // are validated by the subsystem that owns them
        if self.minute.is_some_and(|m| m > 59) || self.hour.is_some_and(|h| h > 23) {
            return Err(TimerErrors::InvalidTimeSpec(
                "time-of-day fallback out of range".to_owned(),
            ));
        }
        if self.month.is_some_and(|m| !(1..=12).contains(&m))
            || self.day.is_some_and(|d| !(1..=31).contains(&d))
            || self.year.is_some_and(|y| !(1970..=9999).contains(&y))
        {
            return Err(TimerErrors::InvalidTimeSpec(
                "date fallback out of range".to_owned(),
            ));
        }
        Ok(())
    }

    fn variables(&self) -> Vec<String> {
        self.time_var
            .iter()
            .chain(self.date_var.iter())
            .cloned()
            .collect()
    }

    fn subscribe(&self, listener: Weak<dyn ChangeListener>) {
        if let Some(var) = &self.time_var {
            self.source.subscribe(var, listener.clone());
        }
        if let Some(var) = &self.date_var {
            self.source.subscribe(var, listener);
        }
    }
}
