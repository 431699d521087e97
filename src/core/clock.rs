use std::thread;
use std::time::{Duration, Instant};

/// Time source for macro timing and cache expiry.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;

    /// Suspend the calling worker. Never called on the dispatch thread.
    fn sleep(&self, duration: Duration);
}

/// Wall clock backed by `thread::sleep`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep(&self, duration: Duration) {
        if !duration.is_zero() {
            thread::sleep(duration);
        }
    }
}

/// Delay for a specified number of milliseconds
pub fn delay_ms(ms: u64) {
    SystemClock.sleep(Duration::from_millis(ms));
}

#[cfg(test)]
pub(crate) use manual::ManualClock;
