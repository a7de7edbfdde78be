//! # Interval Controller
//!
//! Owns the current emission interval and the timer that paces emission.
//! Rescaling multiplies the interval by a [`Factor`], enforces the hard
//! rate bounds, and re-arms the timer at the new interval.
//!
//! When the input is a regular file there is no live arrival rate to
//! follow, so the interval given on the command line is authoritative and
//! rescaling does nothing.

use std::fmt;
use std::time::Duration;

use crate::error::PacerError;
use crate::interval::{Factor, Interval};
use crate::source::SourceKind;
use crate::timer::IntervalTimer;

/// Why a rescale was requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RescaleCause {
    /// A tick found the queue empty.
    Underrun,
    /// Drift rose above the threshold.
    InputAhead,
    /// Drift fell below the negated threshold.
    OutputAhead,
}

impl RescaleCause {
    pub fn as_str(self) -> &'static str {
        match self {
            RescaleCause::Underrun => "underrun",
            RescaleCause::InputAhead => "input_ahead",
            RescaleCause::OutputAhead => "output_ahead",
        }
    }
}

impl fmt::Display for RescaleCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub struct IntervalController {
    interval: Interval,
    timer: IntervalTimer,
    source: SourceKind,
    rescales: u64,
}

impl IntervalController {
    pub fn new(interval: Interval, source: SourceKind, timer: IntervalTimer) -> Self {
        IntervalController {
            interval,
            timer,
            source,
            rescales: 0,
        }
    }

    pub fn interval(&self) -> Interval {
        self.interval
    }

    /// Replace the interval without bounds checks or re-arming. Used once
    /// the startup estimate is known.
    pub fn set_interval(&mut self, interval: Interval) {
        self.interval = interval;
    }

    pub fn source(&self) -> SourceKind {
        self.source
    }

    /// Number of rescales that actually changed the interval.
    pub fn rescales(&self) -> u64 {
        self.rescales
    }

    pub fn timer(&self) -> &IntervalTimer {
        &self.timer
    }

    pub fn timer_mut(&mut self) -> &mut IntervalTimer {
        &mut self.timer
    }

    /// (Re)program the timer with an explicit delay and period.
    pub fn arm(&mut self, initial_delay: Duration, period: Option<Duration>) {
        self.timer.arm(initial_delay, period);
    }

    pub fn disarm(&mut self) {
        self.timer.disarm();
    }

    /// Arm the recurring emission timer at the current interval.
    pub fn start(&mut self) {
        let d = self.interval.as_duration();
        self.timer.arm(d, Some(d));
    }

    /// Multiply the interval by `factor`. `drift` is the drift counter at
    /// the time of the request and is only reported.
    ///
    /// Regular sources are left untouched. Otherwise the scaled interval
    /// must stay within `[MIN_INTERVAL_US, MAX_INTERVAL_US]`; on success the
    /// timer is re-armed with the new value as both delay and period.
    pub fn rescale(
        &mut self,
        factor: Factor,
        cause: RescaleCause,
        drift: i64,
    ) -> Result<Interval, PacerError> {
        if self.source.is_regular() {
            return Ok(self.interval);
        }
        let next = Interval::bounded(factor.apply(self.interval))?;
        tracing::debug!(
            from_us = self.interval.as_micros(),
            to_us = next.as_micros(),
            %factor,
            reason = cause.as_str(),
            drift,
            "interval rescaled"
        );
        self.interval = next;
        self.rescales += 1;
        self.start();
        Ok(next)
    }
}
