//! Fixed-cadence tick scheduler.
//!
//! Deadlines sit on an absolute grid (`start + k * interval`), so sleep
//! jitter never accumulates into drift. If a tick finishes after one or more
//! later deadlines have already passed, those boundaries are skipped rather
//! than replayed in a burst; the next deadline is the first grid point still
//! in the future.

use std::time::Duration;

use tokio::time::Instant;

#[derive(Debug, Clone)]
pub struct TickScheduler {
    interval: Duration,
    next: Instant,
}

impl TickScheduler {
    /// The first tick is due one interval after `start`.
    pub fn new(interval: Duration, start: Instant) -> Self {
        Self {
            interval,
            next: start + interval,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// When the next tick should run.
    pub fn deadline(&self) -> Instant {
        self.next
    }

    /// Moves to the next grid point after a tick has run. Returns how many
    /// grid points were skipped because `now` was already strictly past
    /// them; a grid point equal to `now` is due, not missed.
    pub fn advance(&mut self, now: Instant) -> u64 {
        self.next += self.interval;
        if now <= self.next || self.interval.is_zero() {
            return 0;
        }
        let behind = now.duration_since(self.next).as_nanos();
        let interval = self.interval.as_nanos();
        let skipped = behind.div_ceil(interval) as u64;
        self.next += self.interval * u32::try_from(skipped).unwrap_or(u32::MAX);
        skipped
    }
}
