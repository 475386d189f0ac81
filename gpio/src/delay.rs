//! Hold primitives used for every protocol and pacing delay.
//!
//! Components never count loop iterations themselves. They ask a [Delay] to hold for a
//! [Duration], so timing intent stays readable and independent of the host clock.

use std::fmt::Debug;
use std::hint::spin_loop;
use std::thread::sleep;
use std::time::{Duration, Instant};

pub trait Delay: Debug {
    /// Blocks the caller for at least `duration`.
    fn hold(&self, duration: Duration);
}

/// Holds by putting the thread to sleep.
///
/// The scheduler may oversleep by tens of microseconds, which is fine for the
/// display: every delay is already a worst-case over-approximation.
#[derive(Copy, Clone, Debug, Default)]
pub struct SleepDelay;

impl Delay for SleepDelay {
    fn hold(&self, duration: Duration) {
        if !duration.is_zero() {
            sleep(duration);
        }
    }
}

/// Holds by busy-waiting against the monotonic clock.
///
/// Tighter than [SleepDelay] for microsecond holds, at the cost of a busy core.
#[derive(Copy, Clone, Debug, Default)]
pub struct SpinDelay;

impl Delay for SpinDelay {
    fn hold(&self, duration: Duration) {
        let start = Instant::now();
        while start.elapsed() < duration {
            spin_loop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spin_holds_at_least_requested() {
        let start = Instant::now();
        SpinDelay.hold(Duration::from_micros(200));
        assert!(start.elapsed() >= Duration::from_micros(200));
    }

    #[test]
    fn sleep_holds_at_least_requested() {
        let start = Instant::now();
        SleepDelay.hold(Duration::from_millis(1));
        assert!(start.elapsed() >= Duration::from_millis(1));
    }
}
