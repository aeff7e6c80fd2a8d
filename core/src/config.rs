//! XML edge adapter: imports `<timer>` and `<exceptiondays>` elements into core
//! values and exports the status document. No XML type leaks past this module,
//! the core only ever sees the built specifications and tasks.
//!
//! Attribute conventions: a missing or empty attribute is a wildcard, `wdays` is
//! a comma-separated subset of `Mon..Sun`, `exception` is one of
//! `yes`/`no`/`dontcare` (default `dontcare`), `mon` is 1–12 and `year` is the
//! full year.

use crate::datetime::WeekdaySet;
use crate::errors::TimerErrors;
use crate::exceptions::{DaySpec, ExceptionDays};
use crate::task::{FixedTimeTask, PeriodicTask, TaskStatus, TimerAction, TimerTask, find_next};
use crate::timespec::{ExceptionPolicy, FixedTimeSpec, TimeSpec, VariableTimeSpec};
use crate::variables::VariableSource;
use quick_xml::Reader;
use quick_xml::events::{BytesEnd, BytesStart, Event};
use quick_xml::writer::Writer;
use std::sync::Arc;

/// A parsed `<at>`/`<until>` element: literal fields, weekday mask, exception
/// policy, offset and the optional variable bindings. Turned into a live
/// [`TimeSpec`] by [`SpecDefinition::build_spec`]
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SpecDefinition {
    pub minute: Option<u32>,
    pub hour: Option<u32>,
    pub day: Option<u32>,
    pub month: Option<u32>,
    pub year: Option<i32>,
    pub weekdays: WeekdaySet,
    pub exception: ExceptionPolicy,
    pub offset: i64,
    pub time_var: Option<String>,
    pub date_var: Option<String>,
}

/// A parsed `<timer>` element, still pure data. [`TimerDefinition::build_task`]
/// turns it into a ready-to-register task
#[derive(Clone, Debug, PartialEq)]
pub enum TimerDefinition {
    Periodic {
        at: SpecDefinition,
        until: Option<SpecDefinition>,
        during: u32,
    },
    Fixed {
        at: SpecDefinition,
    },
}

impl SpecDefinition {
    fn wants_variables(&self) -> bool {
        self.time_var.is_some() || self.date_var.is_some()
    }

    /// Builds the live, validated specification. Definitions with variable
    /// bindings need a [`VariableSource`]
    pub fn build_spec(
        &self,
        exceptions: &Arc<ExceptionDays>,
        source: Option<&Arc<dyn VariableSource>>,
    ) -> Result<Arc<dyn TimeSpec>, TimerErrors> {
        let spec: Arc<dyn TimeSpec> = if self.wants_variables() {
            let Some(source) = source else {
                return Err(TimerErrors::ConfigParse(
                    "specification binds variables but no variable source was supplied".to_owned(),
                ));
            };
            Arc::new(
                VariableTimeSpec::builder()
                    .source(source.clone())
                    .time_var_opt(self.time_var.clone())
                    .date_var_opt(self.date_var.clone())
                    .minute_opt(self.minute)
                    .hour_opt(self.hour)
                    .day_opt(self.day)
                    .month_opt(self.month)
                    .year_opt(self.year)
                    .weekdays(self.weekdays)
                    .exception(self.exception)
                    .offset(self.offset)
                    .exceptions(exceptions.clone())
                    .build(),
            )
        } else {
            Arc::new(
                FixedTimeSpec::builder()
                    .minute_opt(self.minute)
                    .hour_opt(self.hour)
                    .day_opt(self.day)
                    .month_opt(self.month)
                    .year_opt(self.year)
                    .weekdays(self.weekdays)
                    .exception(self.exception)
                    .offset(self.offset)
                    .exceptions(exceptions.clone())
                    .build(),
            )
        };
        spec.check_is_valid()?;
        Ok(spec)
    }
}

impl TimerDefinition {
    /// Builds the live task, armed relative to the epoch second `now`. Periodic
    /// tasks get an initial [`crate::task::TimerTask::reschedule`] and, when
    /// their specifications bind variables, register themselves for change
    /// notifications. A definition that fails validation builds no task at all
    pub fn build_task(
        &self,
        now: i64,
        action: Arc<dyn TimerAction>,
        source: Option<&Arc<dyn VariableSource>>,
        exceptions: &Arc<ExceptionDays>,
    ) -> Result<Arc<dyn TimerTask>, TimerErrors> {
        match self {
            TimerDefinition::Periodic { at, until, during } => {
                let at = at.build_spec(exceptions, source)?;
                let until = until
                    .as_ref()
                    .map(|u| u.build_spec(exceptions, source))
                    .transpose()?;
                let task = match until {
                    Some(until) => Arc::new(
                        PeriodicTask::builder()
                            .at(at)
                            .until(until)
                            .during(*during)
                            .action(action)
                            .build(),
                    ),
                    None => Arc::new(
                        PeriodicTask::builder()
                            .at(at)
                            .during(*during)
                            .action(action)
                            .build(),
                    ),
                };
                task.track_variables();
                task.reschedule(now);
                Ok(task)
            }
            TimerDefinition::Fixed { at } => {
                let at = at.build_spec(exceptions, source)?;
                let instant = find_next(now, at.as_ref(), "fixed timer")?;
                Ok(Arc::new(
                    FixedTimeTask::builder()
                        .exec_time(instant)
                        .action(action)
                        .build(),
                ))
            }
        }
    }
}

/// Which spec element of the surrounding `<timer>` is currently open
#[derive(Clone, Copy, PartialEq, Eq)]
enum SpecSlot {
    At,
    Until,
}

/// Which text-content element is currently open
#[derive(Clone, Copy, PartialEq, Eq)]
enum TextSlot {
    During,
    Offset,
}

#[derive(Default)]
struct TimerBuild {
    fixed: bool,
    at: Option<SpecDefinition>,
    until: Option<SpecDefinition>,
    during: u32,
}

fn parse_error(msg: impl Into<String>) -> TimerErrors {
    TimerErrors::ConfigParse(msg.into())
}

fn attr_number<T: std::str::FromStr>(name: &str, value: &str) -> Result<Option<T>, TimerErrors> {
    let value = value.trim();
    if value.is_empty() {
        return Ok(None);
    }
    value
        .parse::<T>()
        .map(Some)
        .map_err(|_| parse_error(format!("attribute `{name}` holds non-numeric `{value}`")))
}

fn parse_exception_policy(value: &str) -> Result<ExceptionPolicy, TimerErrors> {
    match value.trim().to_ascii_lowercase().as_str() {
        "" | "dontcare" => Ok(ExceptionPolicy::DontCare),
        "yes" => Ok(ExceptionPolicy::Yes),
        "no" => Ok(ExceptionPolicy::No),
        other => Err(parse_error(format!("unknown exception policy `{other}`"))),
    }
}

/// Folds one `<at>`/`<until>` attribute list into a [`SpecDefinition`]
fn parse_spec_element(element: &BytesStart<'_>) -> Result<SpecDefinition, TimerErrors> {
    let mut spec = SpecDefinition::default();
    for attr in element.attributes() {
        let attr = attr?;
        let value = attr.unescape_value()?;
        match attr.key.as_ref() {
            b"min" => spec.minute = attr_number("min", &value)?,
            b"hour" => spec.hour = attr_number("hour", &value)?,
            b"mday" => spec.day = attr_number("mday", &value)?,
            b"mon" => spec.month = attr_number("mon", &value)?,
            b"year" => spec.year = attr_number("year", &value)?,
            b"wdays" => spec.weekdays = WeekdaySet::from_names(&value)?,
            b"exception" => spec.exception = parse_exception_policy(&value)?,
            b"offset" => spec.offset = attr_number("offset", &value)?.unwrap_or(0),
            other => {
                return Err(parse_error(format!(
                    "unknown attribute `{}`",
                    String::from_utf8_lossy(other)
                )));
            }
        }
    }
    Ok(spec)
}

fn parse_var_element(element: &BytesStart<'_>) -> Result<Option<String>, TimerErrors> {
    for attr in element.attributes() {
        let attr = attr?;
        if attr.key.as_ref() == b"var" {
            let value = attr.unescape_value()?.trim().to_owned();
            return Ok((!value.is_empty()).then_some(value));
        }
    }
    Ok(None)
}

/// Parses every `<timer>` element found in `xml` into pure definitions. The
/// representative document shape is the one from the controller configuration:
///
/// ```xml
/// <timer type="periodic">
///   <at min="30" hour="8" wdays="Mon,Tue,Wed,Thu,Fri" exception="No"/>
///   <until min="0" hour="17"/>
///   <during>0</during>
/// </timer>
/// ```
pub fn import_timers(xml: &str) -> Result<Vec<TimerDefinition>, TimerErrors> {
    let mut reader = Reader::from_str(xml);
    let mut out = Vec::new();
    let mut timer: Option<TimerBuild> = None;
    let mut open_spec: Option<(SpecSlot, SpecDefinition)> = None;
    let mut open_text: Option<TextSlot> = None;
    loop {
        let event = reader.read_event()?;
        match &event {
            Event::Start(e) | Event::Empty(e) => {
                let empty = matches!(&event, Event::Empty(_));
                match e.name().as_ref() {
                    b"timer" => {
                        let mut build = TimerBuild::default();
                        for attr in e.attributes() {
                            let attr = attr?;
                            if attr.key.as_ref() == b"type" {
                                build.fixed = match attr.unescape_value()?.as_ref() {
                                    "fixed" => true,
                                    "periodic" | "variable" => false,
                                    other => {
                                        return Err(parse_error(format!(
                                            "unknown timer type `{other}`"
                                        )));
                                    }
                                };
                            }
                        }
                        timer = Some(build);
                    }
                    b"at" | b"until" if timer.is_some() => {
                        let slot = if e.name().as_ref() == b"at" {
                            SpecSlot::At
                        } else {
                            SpecSlot::Until
                        };
                        let spec = parse_spec_element(e)?;
                        if empty {
                            assign_spec(timer.as_mut(), slot, spec);
                        } else {
                            open_spec = Some((slot, spec));
                        }
                    }
                    b"time" => {
                        if let Some((_, spec)) = open_spec.as_mut() {
                            spec.time_var = parse_var_element(e)?;
                        }
                    }
                    b"date" => {
                        if let Some((_, spec)) = open_spec.as_mut() {
                            spec.date_var = parse_var_element(e)?;
                        }
                    }
                    b"during" if !empty => open_text = Some(TextSlot::During),
                    b"offset" if !empty => open_text = Some(TextSlot::Offset),
                    _ => {}
                }
            }
            Event::Text(t) => {
                let text = t.unescape()?;
                let text = text.trim();
                if text.is_empty() {
                    continue;
                }
                match open_text {
                    Some(TextSlot::During) => {
                        let during = attr_number::<u32>("during", text)?.unwrap_or(0);
                        if let Some(build) = timer.as_mut() {
                            build.during = during;
                        }
                    }
                    Some(TextSlot::Offset) => {
                        let offset = attr_number::<i64>("offset", text)?.unwrap_or(0);
                        if let Some((_, spec)) = open_spec.as_mut() {
                            spec.offset = offset;
                        }
                    }
                    None => {}
                }
            }
            Event::End(e) => match e.name().as_ref() {
                b"timer" => {
                    let build = timer
                        .take()
                        .ok_or_else(|| parse_error("stray </timer>"))?;
                    out.push(finish_timer(build)?);
                }
                b"at" | b"until" => {
                    if let Some((slot, spec)) = open_spec.take() {
                        assign_spec(timer.as_mut(), slot, spec);
                    }
                }
                b"during" | b"offset" => open_text = None,
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
    }
    if let Some(build) = timer.take() {
        out.push(finish_timer(build)?);
    }
    Ok(out)
}

fn assign_spec(timer: Option<&mut TimerBuild>, slot: SpecSlot, spec: SpecDefinition) {
    if let Some(build) = timer {
        match slot {
            SpecSlot::At => build.at = Some(spec),
            SpecSlot::Until => build.until = Some(spec),
        }
    }
}

fn finish_timer(build: TimerBuild) -> Result<TimerDefinition, TimerErrors> {
    let at = build
        .at
        .ok_or_else(|| parse_error("<timer> without an <at> element"))?;
    if build.fixed {
        Ok(TimerDefinition::Fixed { at })
    } else {
        Ok(TimerDefinition::Periodic {
            at,
            until: build.until,
            during: build.during,
        })
    }
}

/// Parses an `<exceptiondays>` document into validated entries:
///
/// ```xml
/// <exceptiondays>
///   <day mday="25" mon="12"/>
///   <day mday="1" mon="1" year="2026"/>
/// </exceptiondays>
/// ```
pub fn import_exception_days(xml: &str) -> Result<Vec<DaySpec>, TimerErrors> {
    let mut reader = Reader::from_str(xml);
    let mut out = Vec::new();
    loop {
        match reader.read_event()? {
            Event::Start(e) | Event::Empty(e) if e.name().as_ref() == b"day" => {
                let mut day = DaySpec::default();
                for attr in e.attributes() {
                    let attr = attr?;
                    let value = attr.unescape_value()?;
                    match attr.key.as_ref() {
                        b"mday" => day.day = attr_number("mday", &value)?,
                        b"mon" => day.month = attr_number("mon", &value)?,
                        b"year" => day.year = attr_number("year", &value)?,
                        other => {
                            return Err(parse_error(format!(
                                "unknown attribute `{}`",
                                String::from_utf8_lossy(other)
                            )));
                        }
                    }
                }
                day.check_is_valid().map_err(|e| parse_error(e.to_string()))?;
                out.push(day);
            }
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(out)
}

/// Parses `xml` and replaces the contents of `registry` with it in one step.
/// On error the registry is left untouched
pub fn load_exception_days(xml: &str, registry: &ExceptionDays) -> Result<usize, TimerErrors> {
    let entries = import_exception_days(xml)?;
    let count = entries.len();
    registry.replace(entries);
    Ok(count)
}

/// Serializes the exception day registry back into its configuration form
pub fn export_exception_days(registry: &ExceptionDays) -> Result<String, TimerErrors> {
    let mut writer = Writer::new(Vec::new());
    writer
        .write_event(Event::Start(BytesStart::new("exceptiondays")))
        .map_err(|e| parse_error(e.to_string()))?;
    for day in registry.snapshot() {
        let mut element = BytesStart::new("day");
        if let Some(d) = day.day {
            element.push_attribute(("mday", d.to_string().as_str()));
        }
        if let Some(m) = day.month {
            element.push_attribute(("mon", m.to_string().as_str()));
        }
        if let Some(y) = day.year {
            element.push_attribute(("year", y.to_string().as_str()));
        }
        writer
            .write_event(Event::Empty(element))
            .map_err(|e| parse_error(e.to_string()))?;
    }
    writer
        .write_event(Event::End(BytesEnd::new("exceptiondays")))
        .map_err(|e| parse_error(e.to_string()))?;
    String::from_utf8(writer.into_inner()).map_err(|e| parse_error(e.to_string()))
}

/// Serializes task statuses into the status document: one `<task>` per entry
/// with its next firing as an ISO-8601 local timestamp (empty while inactive)
/// and its current on/off value
pub fn status_xml(statuses: &[TaskStatus]) -> Result<String, TimerErrors> {
    let mut writer = Writer::new(Vec::new());
    writer
        .write_event(Event::Start(BytesStart::new("status")))
        .map_err(|e| parse_error(e.to_string()))?;
    for status in statuses {
        let mut element = BytesStart::new("task");
        element.push_attribute(("id", status.id.to_string().as_str()));
        let next = status
            .next_exec
            .map(|dt| dt.to_rfc3339())
            .unwrap_or_default();
        element.push_attribute(("next", next.as_str()));
        element.push_attribute(("value", if status.value { "on" } else { "off" }));
        writer
            .write_event(Event::Empty(element))
            .map_err(|e| parse_error(e.to_string()))?;
    }
    writer
        .write_event(Event::End(BytesEnd::new("status")))
        .map_err(|e| parse_error(e.to_string()))?;
    String::from_utf8(writer.into_inner()).map_err(|e| parse_error(e.to_string()))
}
