use dashmap::DashMap;
use std::sync::Weak;

#[allow(unused_imports)]
use crate::timespec::VariableTimeSpec;

/// [`ChangeListener`] is the capability through which the variable subsystem tells
/// an interested party that a variable it consumes was updated. Timer tasks whose
/// specifications read live variables implement it so a sunset update reschedules
/// them immediately
///
/// # Required Method(s)
/// One method, [`ChangeListener::on_change`], invoked with the name of the
/// variable that changed
pub trait ChangeListener: Send + Sync {
    fn on_change(&self, variable: &str);
}

/// [`VariableSource`] is the seam to the controller's object/variable model. The
/// timer core only ever reads current values and registers for change
/// notifications, it neither owns nor mutates variables
///
/// # Required Method(s)
/// When implementing [`VariableSource`], one has to supply implementations for:
/// - [`VariableSource::read_time`] The current ``(hour, minute)`` of a time
///   variable, ``None`` when the variable is unset (the consumer treats both
///   fields as wildcards)
/// - [`VariableSource::read_date`] The current ``(day, month, year)`` of a date
///   variable, ``None`` when unset
/// - [`VariableSource::subscribe`] Registers a listener for a variable. The
///   registration is weak: the subsystem relates to listeners, it never owns
///   them, and a dropped task silently falls off the notify list
///
/// # Trait Implementation(s)
/// [`InMemoryVariableSource`] is the in-process implementation used by tests and
/// demos; production deployments adapt their own object model
///
/// # See Also
/// - [`VariableTimeSpec`]
/// - [`InMemoryVariableSource`]
pub trait VariableSource: Send + Sync {
    fn read_time(&self, variable: &str) -> Option<(u32, u32)>;

    fn read_date(&self, variable: &str) -> Option<(u32, u32, i32)>;

    fn subscribe(&self, variable: &str, listener: Weak<dyn ChangeListener>);
}

impl<T> VariableSource for T
where
    T: std::ops::Deref + Send + Sync,
    T::Target: VariableSource,
{
    fn read_time(&self, variable: &str) -> Option<(u32, u32)> {
        self.deref().read_time(variable)
    }

    fn read_date(&self, variable: &str) -> Option<(u32, u32, i32)> {
        self.deref().read_date(variable)
    }

    fn subscribe(&self, variable: &str, listener: Weak<dyn ChangeListener>) {
        self.deref().subscribe(variable, listener)
    }
}

/// [`InMemoryVariableSource`] is a [`VariableSource`] holding its variables in
/// process memory. Setting or clearing a value notifies the live subscribers of
/// that variable; subscribers that were dropped in the meantime are pruned on the
/// way
///
/// # Constructor(s)
/// [`InMemoryVariableSource::new`] (or [`Default`]) builds an empty source
///
/// # See Also
/// - [`VariableSource`]
#[derive(Default)]
pub struct InMemoryVariableSource {
    times: DashMap<String, (u32, u32)>,
    dates: DashMap<String, (u32, u32, i32)>,
    listeners: DashMap<String, Vec<Weak<dyn ChangeListener>>>,
}

impl InMemoryVariableSource {
    /// Creates / Constructs a new, empty [`InMemoryVariableSource`] instance
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a time variable to ``(hour, minute)`` and notifies its subscribers
    pub fn set_time(&self, variable: &str, hour: u32, minute: u32) {
        self.times.insert(variable.to_owned(), (hour, minute));
        self.notify(variable);
    }

    /// Clears a time variable (subsequent reads see it unset) and notifies
    pub fn clear_time(&self, variable: &str) {
        self.times.remove(variable);
        self.notify(variable);
    }

    /// Sets a date variable to ``(day, month, year)`` and notifies its subscribers
    pub fn set_date(&self, variable: &str, day: u32, month: u32, year: i32) {
        self.dates.insert(variable.to_owned(), (day, month, year));
        self.notify(variable);
    }

    /// Clears a date variable (subsequent reads see it unset) and notifies
    pub fn clear_date(&self, variable: &str) {
        self.dates.remove(variable);
        self.notify(variable);
    }

    fn notify(&self, variable: &str) {
        let Some(mut entry) = self.listeners.get_mut(variable) else {
            return;
        };
        entry.retain(|listener| listener.strong_count() > 0);
        let live = entry.iter().filter_map(Weak::upgrade).collect::<Vec<_>>();
        drop(entry);
        for listener in live {
            listener.on_change(variable);
        }
    }
}

impl VariableSource for InMemoryVariableSource {
    fn read_time(&self, variable: &str) -> Option<(u32, u32)> {
        self.times.get(variable).map(|v| *v)
    }

    fn read_date(&self, variable: &str) -> Option<(u32, u32, i32)> {
        self.dates.get(variable).map(|v| *v)
    }

    fn subscribe(&self, variable: &str, listener: Weak<dyn ChangeListener>) {
        self.listeners
            .entry(variable.to_owned())
            .or_default()
            .push(listener);
    }
}
