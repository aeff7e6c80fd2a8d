use crate::clock::{AdvanceableTimerClock, TimerClock};
use crate::utils::local_from_epoch;
use async_trait::async_trait;
use std::fmt::{Debug, Formatter};
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;
use tokio::sync::Notify;

/// [`VirtualClock`] is an implementation of the [`TimerClock`] trait, it acts as
/// a mock clock, allowing to simulate time without the waiting around. This is
/// what the end-to-end tests of the manager loop are driven with
///
/// Unlike [`crate::clock::SystemClock`], this clock doesn't move forward on its
/// own, it needs explicit calls to the advance methods ([`VirtualClock`]
/// implements the [`AdvanceableTimerClock`] extension trait), which makes it
/// predictable at any point throughout the program. Advancing wakes every idler,
/// and advancing *backwards* is allowed so tests can model wall-clock jumps
///
/// # Constructor(s)
/// When constructing a [`VirtualClock`], one can use a variety of constructor
/// methods, those being:
/// - [`VirtualClock::at`] For creating one at a given epoch second
/// - [`VirtualClock::from_epoch`] For creating one at the UNIX epoch itself
///
/// # Example
/// ```ignore
/// let clock = VirtualClock::at(1_700_000_000);
/// assert_eq!(clock.epoch_secs().await, 1_700_000_000);
/// clock.advance(Duration::from_secs(60)).await;
/// assert_eq!(clock.epoch_secs().await, 1_700_000_060);
/// ```
///
/// # See Also
/// - [`crate::clock::SystemClock`]
/// - [`AdvanceableTimerClock`]
/// - [`TimerClock`]
pub struct VirtualClock {
    current_secs: AtomicI64,
    notify: Notify,
}

impl Debug for VirtualClock {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let secs = self.current_secs.load(Ordering::Relaxed);
        f.debug_struct("VirtualClock")
            .field("current_time", &local_from_epoch(secs))
            .finish()
    }
}

impl VirtualClock {
    /// Creates / Constructs a new [`VirtualClock`] instance frozen at the given
    /// epoch second
    pub fn at(epoch_secs: i64) -> Self {
        VirtualClock {
            current_secs: AtomicI64::new(epoch_secs),
            notify: Notify::new(),
        }
    }

    /// Creates / Constructs a new [`VirtualClock`] instance frozen at the UNIX
    /// epoch
    pub fn from_epoch() -> Self {
        Self::at(0)
    }
}

#[async_trait]
impl TimerClock for VirtualClock {
    async fn epoch_secs(&self) -> i64 {
        self.current_secs.load(Ordering::Relaxed)
    }

    async fn idle(&self, duration: Duration) {
        let target = self
            .current_secs
            .load(Ordering::Relaxed)
            .saturating_add(duration.as_secs() as i64);
        loop {
            // register before checking, otherwise an advance can slip between the
            // check and the wait and the wake-up is lost
            let notified = self.notify.notified();
            if self.current_secs.load(Ordering::Relaxed) >= target {
                return;
            }
            notified.await;
        }
    }
}

#[async_trait]
impl AdvanceableTimerClock for VirtualClock {
    async fn advance_to(&self, to: i64) {
        self.current_secs.store(to, Ordering::Relaxed);
        self.notify.notify_waiters();
    }
}
