//! # Rate Estimator
//!
//! Runs once at startup when no interval was given and the input is live.
//! One byte is read untimed to absorb upstream startup latency, then every
//! byte arriving within a fixed window (one second by default) is counted.
//! The emission interval is the window length divided by that count.
//!
//! All sampled bytes are kept in the queue; estimation never discards data.

use std::time::Duration;

use crate::controller::IntervalController;
use crate::error::PacerError;
use crate::input::{ByteInput, Next};
use crate::interval::{Interval, MAX_INTERVAL_US};
use crate::queue::ByteQueue;

pub struct RateEstimator {
    window_us: u64,
}

/// Outcome of a sampling window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Estimate {
    pub interval: Interval,
    /// Bytes counted inside the window (excludes the untimed first byte).
    pub sampled: u64,
    /// Bytes pushed onto the queue, including the untimed first byte.
    pub buffered: u64,
}

impl RateEstimator {
    pub fn new(window_us: u64) -> Self {
        RateEstimator {
            window_us: window_us.max(1),
        }
    }

    pub fn window(&self) -> Duration {
        Duration::from_micros(self.window_us)
    }

    /// Sample the input and derive an initial interval. The window is a
    /// one-shot arm of the controller's timer, disarmed again on return.
    pub fn estimate(
        &self,
        input: &mut ByteInput,
        queue: &mut ByteQueue,
        controller: &mut IntervalController,
    ) -> Result<Estimate, PacerError> {
        let mut buffered = 0u64;
        if let Next::Byte(b) = input.recv()? {
            queue.push(b);
            buffered += 1;
        }

        controller.arm(self.window(), None);
        let mut sampled = 0u64;
        let mut expired = false;
        loop {
            if controller.timer_mut().take_expired() {
                expired = true;
                break;
            }
            let wait = controller.timer().remaining().unwrap_or(Duration::ZERO);
            match input.recv_timeout(wait)? {
                Next::Byte(b) => {
                    queue.push(b);
                    sampled += 1;
                }
                Next::Timeout => {}
                Next::Eof => break,
            }
        }
        controller.disarm();
        buffered += sampled;

        if !expired || sampled < 1 {
            tracing::warn!(sampled, expired, "sampling window too short");
            return Err(PacerError::NotEnoughInput);
        }
        let interval = interval_for_rate(sampled, self.window_us)?;
        tracing::info!(
            sampled,
            window_us = self.window_us,
            interval_us = interval.as_micros(),
            "input rate estimated"
        );
        Ok(Estimate {
            interval,
            sampled,
            buffered,
        })
    }
}

/// Interval that emits `bytes` bytes per `window_us`, rounded down.
///
/// Fails if the rate needs a sub-microsecond interval, or if the interval
/// would exceed [`MAX_INTERVAL_US`].
pub fn interval_for_rate(bytes: u64, window_us: u64) -> Result<Interval, PacerError> {
    if bytes == 0 {
        return Err(PacerError::NotEnoughInput);
    }
    if bytes >= window_us {
        return Err(PacerError::InputRateTooHigh { bytes });
    }
    let us = window_us / bytes;
    if us > MAX_INTERVAL_US as u64 {
        return Err(PacerError::MinRateNotMet { interval_us: us });
    }
    // bytes < window_us, so us >= 1.
    Interval::from_micros(us as u32).ok_or(PacerError::InputRateTooHigh { bytes })
}
