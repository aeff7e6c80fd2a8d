use crate::errors::TimerErrors;
use crate::utils::fold_local;
use chrono::{DateTime, Datelike, Local, NaiveDate, Timelike, Weekday};
use std::fmt::{Debug, Formatter};

const YEAR: usize = 0;
const MONTH: usize = 1;
const DAY: usize = 2;
const HOUR: usize = 3;
const MINUTE: usize = 4;
const FIELD_COUNT: usize = 5;

/// Reset values per field, used when a coarser field advanced past the reference
const FIELD_MIN: [i32; FIELD_COUNT] = [1970, 1, 1, 0, 0];

/// Upper bound on projection / increment rounds before giving up. Generous enough
/// for any satisfiable constraint set (a free year walks at most a handful of years
/// to the next leap day) while keeping the resolver total
const RESOLVE_STEP_LIMIT: usize = 1024;

/// How many consecutive days the weekday-aware path scans before giving up.
/// Callers retry from a later reference, so a fixed month that rolled over into
/// the next year is still found eventually
const WEEKDAY_SCAN_LIMIT: usize = 7;

/// [`WeekdaySet`] is a 7-bit mask over the days of the week (Monday through Sunday),
/// used to constrain which dates a resolved [`CalendarTime`] may land on. The empty
/// mask is special and means "any day of the week"
///
/// # Constructor(s)
/// When constructing a [`WeekdaySet`], one can start from the [`WeekdaySet::ANY`]
/// constant and [`WeekdaySet::with`] the individual day constants, use
/// [`WeekdaySet::from_bits`] for a raw mask or [`WeekdaySet::from_names`] for the
/// comma-separated configuration form (``"Mon,Tue,Fri"``)
///
/// # See Also
/// - [`CalendarTime`]
#[derive(Clone, Copy, PartialEq, Eq, Default)]
pub struct WeekdaySet(u8);

impl WeekdaySet {
    pub const MON: WeekdaySet = WeekdaySet(0x01);
    pub const TUE: WeekdaySet = WeekdaySet(0x02);
    pub const WED: WeekdaySet = WeekdaySet(0x04);
    pub const THU: WeekdaySet = WeekdaySet(0x08);
    pub const FRI: WeekdaySet = WeekdaySet(0x10);
    pub const SAT: WeekdaySet = WeekdaySet(0x20);
    pub const SUN: WeekdaySet = WeekdaySet(0x40);

    /// The empty mask, matching every day of the week
    pub const ANY: WeekdaySet = WeekdaySet(0);

    const NAMES: [(&'static str, u8); 7] = [
        ("Mon", 0x01),
        ("Tue", 0x02),
        ("Wed", 0x04),
        ("Thu", 0x08),
        ("Fri", 0x10),
        ("Sat", 0x20),
        ("Sun", 0x40),
    ];

    /// Builds a [`WeekdaySet`] from a raw 7-bit mask, bits above the seventh are discarded
    pub fn from_bits(bits: u8) -> Self {
        WeekdaySet(bits & 0x7f)
    }

    /// Parses the comma-separated configuration form, e.g. ``"Mon,Tue,Fri"``. The
    /// empty string yields [`WeekdaySet::ANY`]
    ///
    /// # Returns
    /// The parsed set, or [`TimerErrors::ConfigParse`] when a day name is not one of
    /// ``Mon``..``Sun``
    pub fn from_names(names: &str) -> Result<Self, TimerErrors> {
        let mut bits = 0u8;
        for name in names.split(',').map(str::trim).filter(|n| !n.is_empty()) {
            let bit = Self::NAMES
                .iter()
                .find(|(n, _)| n.eq_ignore_ascii_case(name))
                .map(|(_, b)| *b)
                .ok_or_else(|| {
                    TimerErrors::ConfigParse(format!("unknown weekday name `{name}`"))
                })?;
            bits |= bit;
        }
        Ok(WeekdaySet(bits))
    }

    /// Returns the comma-separated configuration form of this set, empty for [`WeekdaySet::ANY`]
    pub fn names(&self) -> String {
        Self::NAMES
            .iter()
            .filter(|(_, b)| self.0 & b != 0)
            .map(|(n, _)| *n)
            .collect::<Vec<_>>()
            .join(",")
    }

    pub fn bits(&self) -> u8 {
        self.0
    }

    /// True when this set poses no weekday constraint at all
    pub fn is_any(&self) -> bool {
        self.0 == 0
    }

    /// Adds the days of `other` to this set
    pub fn with(self, other: WeekdaySet) -> Self {
        WeekdaySet(self.0 | other.0)
    }

    /// Checks whether `weekday` is acceptable under this set. The empty set accepts
    /// every weekday
    pub fn contains(&self, weekday: Weekday) -> bool {
        self.is_any() || self.0 & (1 << weekday.num_days_from_monday()) != 0
    }
}

impl Debug for WeekdaySet {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if self.is_any() {
            write!(f, "WeekdaySet(any)")
        } else {
            write!(f, "WeekdaySet({})", self.names())
        }
    }
}

/// The five calendar fields a [`CalendarTime`] is made of, ordered from the
/// coarsest ([`DateField::Year`]) to the finest ([`DateField::Minute`]). Seconds
/// do not appear, firing instants always land on whole minutes
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum DateField {
    Year = 0,
    Month = 1,
    Day = 2,
    Hour = 3,
    Minute = 4,
}

impl DateField {
    fn index(self) -> usize {
        self as usize
    }
}

/// Outcome of [`CalendarTime::try_resolve`]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Resolution {
    /// All constraints hold and the instant is strictly after the reference,
    /// the receiver now carries the answer
    Resolved,
    /// Not resolvable within the allowed field window, the caller should restart
    /// the search from a later reference
    Unresolved,
    /// The constraints can never be satisfied, no matter how far the search goes
    Impossible,
}

/// Outcome of one projection round onto the actual calendar
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Projection {
    /// Every field already lay in its valid range
    Untouched,
    /// A coarser free field was advanced to repair an out-of-range finer one,
    /// the caller must re-project
    Adjusted,
    /// No free coarser field is available inside the window
    OutOfScope,
    /// The pinned fields name a date that exists in no year
    Impossible,
}

/// [`CalendarTime`] is a mutable broken-down local time in which every field is
/// either *fixed* (pinned by the user's specification, must be preserved) or *free*
/// (a working value the resolver may rewrite). An optional [`WeekdaySet`] further
/// constrains the day of week
///
/// The central operation is [`CalendarTime::try_resolve`], which advances the free
/// fields until all constraints hold and the represented instant is strictly after
/// a reference instant. Instances are cheap, live for a single resolution and are
/// never shared
///
/// # Constructor(s)
/// [`CalendarTime::reference`] snapshots a local instant with every field fixed
/// (this is the `current` side of a resolution), while [`CalendarTime::constrained`]
/// seeds free fields from a reference and pins the `Some` fields of a specification
///
/// # Trait Implementation(s)
/// [`CalendarTime`] implements [`Clone`], [`Debug`] and the full ordering traits;
/// ordering is lexicographic over (year, month, day, hour, minute) and ignores the
/// fixed/free markers
#[derive(Clone)]
pub struct CalendarTime {
    fields: [i32; FIELD_COUNT],
    free: u8,
    weekdays: WeekdaySet,
}

impl Debug for CalendarTime {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{:04}-{:02}-{:02} {:02}:{:02}",
            self.fields[YEAR], self.fields[MONTH], self.fields[DAY], self.fields[HOUR],
            self.fields[MINUTE]
        )?;
        let free = (0..FIELD_COUNT)
            .filter(|i| self.free & (1 << i) != 0)
            .map(|i| ["year", "month", "day", "hour", "minute"][i])
            .collect::<Vec<_>>();
        if !free.is_empty() {
            write!(f, " (free: {})", free.join(","))?;
        }
        if !self.weekdays.is_any() {
            write!(f, " ({:?})", self.weekdays)?;
        }
        Ok(())
    }
}

impl PartialEq for CalendarTime {
    fn eq(&self, other: &Self) -> bool {
        self.fields == other.fields
    }
}

impl Eq for CalendarTime {}

impl PartialOrd for CalendarTime {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for CalendarTime {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.fields.cmp(&other.fields)
    }
}

/// Number of days in the given month of the given year
pub(crate) fn days_in_month(year: i32, month: i32) -> i32 {
    let (next_year, next_month) = if month == 12 {
        (year + 1, 1)
    } else {
        (year, month + 1)
    };
    match NaiveDate::from_ymd_opt(next_year, next_month as u32, 1) {
        Some(first) => (first - chrono::Duration::days(1)).day() as i32,
        None => 31,
    }
}

/// The largest day count the given month reaches in any year (February caps at 29)
pub(crate) fn longest_month(month: i32) -> i32 {
    const LONGEST: [i32; 12] = [31, 29, 31, 30, 31, 30, 31, 31, 30, 31, 30, 31];
    LONGEST
        .get((month - 1).max(0) as usize)
        .copied()
        .unwrap_or(31)
}

impl CalendarTime {
    /// Snapshots `at` with every field fixed and seconds truncated. This is the
    /// reference side of [`CalendarTime::try_resolve`]
    pub fn reference(at: &DateTime<Local>) -> Self {
        CalendarTime {
            fields: [
                at.year(),
                at.month() as i32,
                at.day() as i32,
                at.hour() as i32,
                at.minute() as i32,
            ],
            free: 0,
            weekdays: WeekdaySet::ANY,
        }
    }

    /// Builds the constraint side of a resolution: `Some` pins the field to that
    /// value, `None` leaves it free with a working value seeded from `reference`
    ///
    /// # See Also
    /// - [`CalendarTime::try_resolve`]
    #[allow(clippy::too_many_arguments)]
    pub fn constrained(
        reference: &DateTime<Local>,
        year: Option<i32>,
        month: Option<u32>,
        day: Option<u32>,
        hour: Option<u32>,
        minute: Option<u32>,
        weekdays: WeekdaySet,
    ) -> Self {
        let mut out = Self::reference(reference);
        out.free = (1 << FIELD_COUNT) - 1;
        out.weekdays = weekdays;
        if let Some(v) = year {
            out.pin(YEAR, v);
        }
        if let Some(v) = month {
            out.pin(MONTH, v as i32);
        }
        if let Some(v) = day {
            out.pin(DAY, v as i32);
        }
        if let Some(v) = hour {
            out.pin(HOUR, v as i32);
        }
        if let Some(v) = minute {
            out.pin(MINUTE, v as i32);
        }
        out
    }

    pub fn year(&self) -> i32 {
        self.fields[YEAR]
    }

    pub fn month(&self) -> u32 {
        self.fields[MONTH] as u32
    }

    pub fn day(&self) -> u32 {
        self.fields[DAY] as u32
    }

    pub fn hour(&self) -> u32 {
        self.fields[HOUR] as u32
    }

    pub fn minute(&self) -> u32 {
        self.fields[MINUTE] as u32
    }

    pub fn weekdays(&self) -> WeekdaySet {
        self.weekdays
    }

    /// Whether `field` was pinned by the specification (as opposed to being a free
    /// working value)
    pub fn is_field_fixed(&self, field: DateField) -> bool {
        self.free & (1 << field.index()) == 0
    }

    fn pin(&mut self, idx: usize, value: i32) {
        self.fields[idx] = value;
        self.free &= !(1 << idx);
    }

    fn is_free(&self, idx: usize) -> bool {
        self.free & (1 << idx) != 0
    }

    fn eligible(&self, idx: usize, from: DateField, to: DateField) -> bool {
        self.is_free(idx) && idx >= from.index() && idx <= to.index()
    }

    /// Valid range of field `idx` given the (already in-range) coarser fields
    fn range_of(&self, idx: usize) -> (i32, i32) {
        match idx {
            YEAR => (1970, 9999),
            MONTH => (1, 12),
            DAY => (1, days_in_month(self.fields[YEAR], self.fields[MONTH])),
            HOUR => (0, 23),
            _ => (0, 59),
        }
    }

    /// The calendar date this value currently names, when it names one at all
    pub fn date(&self) -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(self.fields[YEAR], self.month(), self.day())
    }

    /// Folds the resolved value into a concrete local instant. DST gaps map to the
    /// first valid instant after them, ambiguous repetitions to the earlier offset
    pub fn to_local(&self) -> Option<DateTime<Local>> {
        let naive = self.date()?.and_hms_opt(self.hour(), self.minute(), 0)?;
        Some(fold_local(naive))
    }

    /// The resolved value as an epoch second, via the host's local calendar
    pub fn epoch_secs(&self) -> Option<i64> {
        self.to_local().map(|dt| dt.timestamp())
    }

    /// Whether the currently named date satisfies the weekday constraint
    pub fn matches_weekdays(&self) -> bool {
        if self.weekdays.is_any() {
            return true;
        }
        self.date()
            .map(|d| self.weekdays.contains(d.weekday()))
            .unwrap_or(false)
    }

    /// Attempts to ensure all constraints are met, adjusting free fields so the
    /// represented instant comes strictly after `current`. Fixed fields are never
    /// rewritten; `[from..to]` bounds which free fields may be advanced (the usual
    /// call is `(Year, Minute)`)
    ///
    /// # Returns
    /// [`Resolution::Resolved`] on success (the receiver holds the answer),
    /// [`Resolution::Unresolved`] when nothing inside the window works (the caller
    /// should restart from a later reference), [`Resolution::Impossible`] when the
    /// pinned fields can never name an existing date
    pub fn try_resolve(
        &mut self,
        current: &CalendarTime,
        from: DateField,
        to: DateField,
    ) -> Resolution {
        if self.weekdays.is_any() {
            return self.resolve_without_weekdays(current, from, to);
        }
        match self.resolve_without_weekdays(current, from, to) {
            Resolution::Resolved => {}
            other => return other,
        }
        let mut scanned = 0;
        while !self.matches_weekdays() {
            scanned += 1;
            if scanned > WEEKDAY_SCAN_LIMIT || !self.advance_one_day() {
                return Resolution::Unresolved;
            }
            // the date moved strictly forward, so finer free fields restart at their minima
            self.reset_finer_free_to_min(DAY);
        }
        Resolution::Resolved
    }

    fn resolve_without_weekdays(
        &mut self,
        current: &CalendarTime,
        from: DateField,
        to: DateField,
    ) -> Resolution {
        for _ in 0..RESOLVE_STEP_LIMIT {
            match self.project_on_calendar(from, to) {
                Projection::Impossible => return Resolution::Impossible,
                Projection::OutOfScope => return Resolution::Unresolved,
                Projection::Adjusted => continue,
                Projection::Untouched => {}
            }
            if self.fields > current.fields {
                return Resolution::Resolved;
            }
            // first field where the candidate falls behind the reference; on full
            // equality the minute itself must move to restore strictness
            let pivot = (0..FIELD_COUNT)
                .find(|&i| self.fields[i] != current.fields[i])
                .unwrap_or(MINUTE);
            let Some(idx) = (0..=pivot).rev().find(|&i| self.eligible(i, from, to)) else {
                return Resolution::Unresolved;
            };
            self.fields[idx] += 1;
            if self.fields[..=idx] > current.fields[..=idx] {
                self.reset_finer_free_to_min(idx);
            } else {
                // still level with the reference, resume the search from its values
                for finer in idx + 1..FIELD_COUNT {
                    if self.is_free(finer) {
                        self.fields[finer] = current.fields[finer];
                    }
                }
            }
        }
        Resolution::Unresolved
    }

    /// One projection round: walks the fields coarse to fine and repairs the first
    /// out-of-range one by advancing the closest coarser free field
    fn project_on_calendar(&mut self, from: DateField, to: DateField) -> Projection {
        for idx in 0..FIELD_COUNT {
            let (lo, hi) = self.range_of(idx);
            let value = self.fields[idx];
            if value >= lo && value <= hi {
                continue;
            }
            if self.projection_is_impossible(idx) {
                return Projection::Impossible;
            }
            if !self.raise_coarser_free(idx, from, to) {
                return Projection::OutOfScope;
            }
            return Projection::Adjusted;
        }
        Projection::Untouched
    }

    /// Whether the out-of-range field `idx` can never be repaired by advancing
    /// coarser fields. Only pinned fields can be terminally wrong; a free one is
    /// always rewritable
    fn projection_is_impossible(&self, idx: usize) -> bool {
        if self.is_free(idx) {
            return false;
        }
        let value = self.fields[idx];
        match idx {
            YEAR => value < 1970 || value > 9999,
            MONTH => !(1..=12).contains(&value),
            DAY => {
                if value < 1 {
                    return true;
                }
                if self.is_free(MONTH) {
                    // some month of some year takes any day up to 31
                    return value > 31;
                }
                if value > longest_month(self.fields[MONTH]) {
                    return true;
                }
                // a pinned year removes the leap-day escape hatch
                !self.is_free(YEAR)
                    && value > days_in_month(self.fields[YEAR], self.fields[MONTH])
            }
            HOUR => !(0..=23).contains(&value),
            _ => !(0..=59).contains(&value),
        }
    }

    fn raise_coarser_free(&mut self, than: usize, from: DateField, to: DateField) -> bool {
        let Some(idx) = (0..than).rev().find(|&i| self.eligible(i, from, to)) else {
            return false;
        };
        self.fields[idx] += 1;
        self.reset_finer_free_to_min(idx);
        true
    }

    fn reset_finer_free_to_min(&mut self, than: usize) {
        for idx in than + 1..FIELD_COUNT {
            if self.is_free(idx) {
                self.fields[idx] = FIELD_MIN[idx];
            }
        }
    }

    /// Moves to the next real calendar day, carrying through month and year while
    /// honouring their fixed markers. The day advances even when pinned, the
    /// weekday constraint takes precedence over it
    fn advance_one_day(&mut self) -> bool {
        if self.fields[DAY] < days_in_month(self.fields[YEAR], self.fields[MONTH]) {
            self.fields[DAY] += 1;
            return true;
        }
        if self.is_free(MONTH) && self.fields[MONTH] < 12 {
            self.fields[MONTH] += 1;
            self.fields[DAY] = 1;
            return true;
        }
        if self.is_free(YEAR) && self.fields[YEAR] < 9999 {
            self.fields[YEAR] += 1;
            if self.is_free(MONTH) {
                self.fields[MONTH] = 1;
            }
            self.fields[DAY] = 1;
            return true;
        }
        false
    }
}
