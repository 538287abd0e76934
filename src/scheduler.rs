//! Fixed-timestep tick scheduler.
//!
//! The host reports a monotonically increasing clock; the scheduler turns the
//! elapsed time into a whole number of due ticks and keeps the remainder.

use std::time::Duration;

#[derive(Debug, Clone)]
pub struct TickScheduler {
    interval: Duration,
    accumulator: Duration,
    last: Option<Duration>,
    running: bool,
}

impl TickScheduler {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval: interval.max(Duration::from_millis(1)),
            accumulator: Duration::ZERO,
            last: None,
            running: true,
        }
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Time banked towards the next tick.
    pub fn accumulated(&self) -> Duration {
        self.accumulator
    }

    /// Feeds the host clock and returns how many ticks are due.
    ///
    /// The first call after construction or [`TickScheduler::resume`] only
    /// records the baseline. After a stall every missed tick is returned.
    pub fn advance(&mut self, now: Duration) -> u32 {
        if !self.running {
            return 0;
        }
        let Some(last) = self.last.replace(now) else {
            return 0;
        };
        self.accumulator += now.saturating_sub(last);

        let mut due = 0;
        while self.accumulator >= self.interval {
            self.accumulator -= self.interval;
            due += 1;
        }
        due
    }

    pub fn pause(&mut self) {
        self.running = false;
    }

    /// Restarts the clock; time spent paused is never replayed.
    pub fn resume(&mut self) {
        if !self.running {
            self.running = true;
            self.last = None;
        }
    }
}
