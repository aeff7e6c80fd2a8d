pub mod system_clock;

pub mod virtual_clock;

pub use system_clock::SystemClock;
pub use virtual_clock::VirtualClock;

use async_trait::async_trait;
use std::fmt::Debug;
use std::ops::Deref;
use std::time::Duration;

#[allow(unused_imports)]
use crate::manager::TimerManager;

/// [`TimerClock`] is the manager's view of wall-clock time: reading the current
/// epoch second and idling for a bounded duration. The trait exists so the whole
/// scheduling loop can be driven deterministically in tests. The timer core works
/// at second granularity, sub-second precision is out of scope
///
/// Idling is best effort: a wake may come early (the manager re-reads the clock
/// on every pass and tolerates both directions of wall-clock jumps), which is
/// why [`TimerClock::idle`] takes a duration rather than a deadline
///
/// # Required Method(s)
/// When implementing the [`TimerClock`], one must provide implementations for two
/// methods, those being [`TimerClock::epoch_secs`] and [`TimerClock::idle`]
///
/// # Trait Implementation(s)
/// Specifically, there are 2 noteworthy implementations to list, those being:
///
/// - [`SystemClock`] the default go-to clock, backed by the operating system and
///   tokio's timer
/// - [`VirtualClock`] used to simulate time for unit tests and simulations; it
///   only moves when explicitly advanced and additionally implements the
///   [`AdvanceableTimerClock`] extension trait
///
/// # See Also
/// - [`SystemClock`]
/// - [`VirtualClock`]
/// - [`AdvanceableTimerClock`]
/// - [`TimerManager`]
#[async_trait]
pub trait TimerClock: Debug + Send + Sync {
    /// The current time of the clock as a second count since the UNIX epoch
    async fn epoch_secs(&self) -> i64;

    /// Idles for (at most) `duration` from now. Returning early is allowed,
    /// sleeping past the duration is not
    async fn idle(&self, duration: Duration);
}

#[async_trait]
impl<T> TimerClock for T
where
    T: Deref + Send + Sync + Debug,
    T::Target: TimerClock,
{
    async fn epoch_secs(&self) -> i64 {
        self.deref().epoch_secs().await
    }

    async fn idle(&self, duration: Duration) {
        self.deref().idle(duration).await
    }
}

/// [`AdvanceableTimerClock`] is an optional extension to [`TimerClock`] which, as
/// the name suggests, allows for arbitrary advancement of time. The system clock
/// cannot support this by nature, which is why it is a separate trait
///
/// Advancing backwards is allowed: it is how tests model the wall-clock jumps
/// the manager has to tolerate
///
/// # Required Method(s)
/// One method, [`AdvanceableTimerClock::advance_to`], which jumps the clock to an
/// absolute epoch second; [`AdvanceableTimerClock::advance`] is provided on top
///
/// # See Also
/// - [`VirtualClock`]
/// - [`TimerClock`]
#[async_trait]
pub trait AdvanceableTimerClock: TimerClock {
    /// Jumps the clock to the absolute epoch second `to`, waking anything idling
    /// on it
    async fn advance_to(&self, to: i64);

    /// Moves the clock forward by `duration` (rounded down to whole seconds)
    async fn advance(&self, duration: Duration) {
        let target = self.epoch_secs().await + duration.as_secs() as i64;
        self.advance_to(target).await;
    }
}
