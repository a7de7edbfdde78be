//! # Interval Timer
//!
//! Deadline timer driven by a [`quanta::Clock`]. Nothing fires
//! asynchronously: the control loop asks how long it may block
//! ([`IntervalTimer::remaining`]) and then consumes expiries one at a
//! time ([`IntervalTimer::take_expired`]).
//!
//! A recurring timer advances its deadline by exactly one period per
//! consumed expiry, so ticks that were missed while the loop was busy are
//! each serviced individually rather than merged.

use std::time::Duration;

use quanta::{Clock, Instant};

pub struct IntervalTimer {
    clock: Clock,
    deadline: Option<Instant>,
    period: Option<Duration>,
}

impl IntervalTimer {
    pub fn new() -> Self {
        Self::with_clock(Clock::new())
    }

    /// Use a specific clock (e.g. `Clock::mock()` in tests).
    pub fn with_clock(clock: Clock) -> Self {
        IntervalTimer {
            clock,
            deadline: None,
            period: None,
        }
    }

    /// Program the timer: first expiry after `initial_delay`, then every
    /// `period` (one-shot if `None`). Replaces any previous schedule.
    pub fn arm(&mut self, initial_delay: Duration, period: Option<Duration>) {
        self.deadline = Some(self.clock.now() + initial_delay);
        self.period = period.filter(|p| !p.is_zero());
    }

    pub fn disarm(&mut self) {
        self.deadline = None;
        self.period = None;
    }

    pub fn is_armed(&self) -> bool {
        self.deadline.is_some()
    }

    pub fn period(&self) -> Option<Duration> {
        self.period
    }

    /// Time left until the next expiry. `None` when disarmed,
    /// `Some(Duration::ZERO)` when an expiry is pending.
    pub fn remaining(&self) -> Option<Duration> {
        let deadline = self.deadline?;
        Some(deadline.saturating_duration_since(self.clock.now()))
    }

    /// Consume one pending expiry. Returns `false` if none is due.
    pub fn take_expired(&mut self) -> bool {
        let Some(deadline) = self.deadline else {
            return false;
        };
        if self.clock.now() < deadline {
            return false;
        }
        self.deadline = self.period.map(|p| deadline + p);
        true
    }
}

impl Default for IntervalTimer {
    fn default() -> Self {
        Self::new()
    }
}
