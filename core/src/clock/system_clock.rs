use crate::clock::TimerClock;
use async_trait::async_trait;
use std::fmt::Debug;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

#[allow(unused_imports)]
use crate::clock::VirtualClock;

/// [`SystemClock`] is an implementation of the [`TimerClock`] trait, it is the
/// default option for scheduling. Unlike [`VirtualClock`], it moves forward no
/// matter what and cannot be advanced at any arbitrary point (due to its design)
///
/// # See Also
/// - [`VirtualClock`]
/// - [`TimerClock`]
pub struct SystemClock;

impl Debug for SystemClock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("SystemClock")
            .field(&SystemTime::now())
            .finish()
    }
}

#[async_trait]
impl TimerClock for SystemClock {
    async fn epoch_secs(&self) -> i64 {
        match SystemTime::now().duration_since(UNIX_EPOCH) {
            Ok(since) => since.as_secs() as i64,
            // a host clock before the epoch still has to produce something sane
            Err(before) => -(before.duration().as_secs() as i64),
        }
    }

    async fn idle(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}
