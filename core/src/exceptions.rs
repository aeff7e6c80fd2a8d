use crate::errors::TimerErrors;
use chrono::{Datelike, NaiveDate};
use once_cell::sync::Lazy;
use std::sync::{Arc, RwLock};

/// The default, process-wide exception day registry. Convenient for simple setups
/// where every time specification shares one holiday calendar; tests and larger
/// deployments construct and inject their own [`ExceptionDays`] instead
pub static SHARED_EXCEPTION_DAYS: Lazy<Arc<ExceptionDays>> =
    Lazy::new(|| Arc::new(ExceptionDays::new()));

/// [`DaySpec`] is a literal calendar date where every component may be left out,
/// a missing component matches any value. ``day=25, month=12`` matches every
/// Christmas day, ``day=1, month=1, year=2026`` matches exactly one date
///
/// # Trait Implementation(s)
/// [`DaySpec`] implements [`Clone`], [`Copy`], [`Debug`], [`Default`] (the
/// match-everything entry), [`PartialEq`] and [`Eq`]
///
/// # See Also
/// - [`ExceptionDays`]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DaySpec {
    pub day: Option<u32>,
    pub month: Option<u32>,
    pub year: Option<i32>,
}

impl DaySpec {
    /// Creates / Constructs a new [`DaySpec`] instance out of its (optional) components
    pub fn new(day: Option<u32>, month: Option<u32>, year: Option<i32>) -> Self {
        DaySpec { day, month, year }
    }

    /// Validates the literal components against their calendar ranges, this is pure
    /// and meant to run at configuration time
    ///
    /// # Returns
    /// ``Ok(())`` when every present component is in range, otherwise
    /// [`TimerErrors::InvalidDaySpec`]
    pub fn check_is_valid(&self) -> Result<(), TimerErrors> {
        let day_ok = self.day.is_none_or(|d| (1..=31).contains(&d));
        let month_ok = self.month.is_none_or(|m| (1..=12).contains(&m));
        let year_ok = self.year.is_none_or(|y| (1970..=9999).contains(&y));
        if day_ok && month_ok && year_ok {
            Ok(())
        } else {
            Err(TimerErrors::InvalidDaySpec(self.day, self.month, self.year))
        }
    }

    /// Whether `date` is covered by this entry, missing components match anything
    pub fn matches(&self, date: NaiveDate) -> bool {
        self.day.is_none_or(|d| d == date.day())
            && self.month.is_none_or(|m| m == date.month())
            && self.year.is_none_or(|y| y == date.year())
    }
}

/// [`ExceptionDays`] is a registry of calendar dates flagged as exceptions
/// (holidays and the like). Time specifications carry an ``Arc`` to the registry
/// they were configured against and consult it through their exception policy,
/// so a date can be required to be (or forbidden from being) an exception day
///
/// Mutation is serialized internally, a configuration reload may run while the
/// manager loop is live
///
/// # Constructor(s)
/// [`ExceptionDays::new`] builds an empty registry; [`SHARED_EXCEPTION_DAYS`] is
/// the default shared instance
///
/// # See Also
/// - [`DaySpec`]
/// - [`SHARED_EXCEPTION_DAYS`]
#[derive(Debug, Default)]
pub struct ExceptionDays {
    days: RwLock<Vec<DaySpec>>,
}

impl ExceptionDays {
    /// Creates / Constructs a new, empty [`ExceptionDays`] registry
    pub fn new() -> Self {
        ExceptionDays {
            days: RwLock::new(Vec::new()),
        }
    }

    /// Adds `day` to the registry, inserting the same entry twice is a no-op
    pub fn add_day(&self, day: DaySpec) {
        let mut days = self.days.write().unwrap_or_else(|e| e.into_inner());
        if !days.contains(&day) {
            days.push(day);
        }
    }

    /// Removes `day` from the registry, removing an absent entry is silent
    pub fn remove_day(&self, day: &DaySpec) {
        self.days
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .retain(|d| d != day);
    }

    /// Drops every entry
    pub fn clear(&self) {
        self.days.write().unwrap_or_else(|e| e.into_inner()).clear();
    }

    /// Replaces the whole registry in one step, used by configuration reloads
    pub fn replace(&self, entries: Vec<DaySpec>) {
        *self.days.write().unwrap_or_else(|e| e.into_inner()) = entries;
    }

    /// Whether `date` is covered by at least one registered entry
    pub fn is_exception(&self, date: NaiveDate) -> bool {
        self.days
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .any(|d| d.matches(date))
    }

    /// A copy of the current entries, used by the status/config exporters
    pub fn snapshot(&self) -> Vec<DaySpec> {
        self.days.read().unwrap_or_else(|e| e.into_inner()).clone()
    }
}
