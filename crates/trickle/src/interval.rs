//! # Emission Interval
//!
//! Microseconds between consecutive output bytes, plus the exact rescale
//! factors the controller multiplies it by.
//!
//! Factors are stored in basis points so rescaling is integer arithmetic
//! with a fixed rounding rule: factors above 1.0 round up, factors below
//! 1.0 round down. Every rescale therefore moves the interval by at least
//! one microsecond in the requested direction.

use std::fmt;
use std::time::Duration;

use crate::error::PacerError;

/// Shortest interval adaptive rescaling may produce (100 KB/s).
pub const MIN_INTERVAL_US: u32 = 10;
/// Longest interval adaptive rescaling may produce (just over 1 B/s).
pub const MAX_INTERVAL_US: u32 = 999_999;

const BASIS: u64 = 10_000;

// ─── Interval ───────────────────────────────────────────────────────────────

/// Microseconds per emitted byte. Never zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Interval(u32);

impl Interval {
    /// Slowest interval adaptive rescaling allows.
    pub const MAX: Interval = Interval(MAX_INTERVAL_US);

    /// Wrap a raw microsecond value. Returns `None` for zero.
    pub fn from_micros(us: u32) -> Option<Self> {
        (us > 0).then_some(Interval(us))
    }

    /// Parse a command-line interval: a decimal integer in `1..=999_999`.
    pub fn parse_arg(arg: &str) -> Result<Self, PacerError> {
        let invalid = || PacerError::InvalidInterval {
            arg: arg.to_string(),
        };
        let value: i64 = arg.trim().parse().map_err(|_| invalid())?;
        if value <= 0 || value > MAX_INTERVAL_US as i64 {
            return Err(invalid());
        }
        Ok(Interval(value as u32))
    }

    /// Enforce the adaptive bounds `[MIN_INTERVAL_US, MAX_INTERVAL_US]`
    /// on a raw candidate value.
    pub fn bounded(us: u64) -> Result<Self, PacerError> {
        if us < MIN_INTERVAL_US as u64 {
            return Err(PacerError::MaxRateExceeded { interval_us: us });
        }
        if us > MAX_INTERVAL_US as u64 {
            return Err(PacerError::MinRateNotMet { interval_us: us });
        }
        Ok(Interval(us as u32))
    }

    pub fn as_micros(self) -> u32 {
        self.0
    }

    pub fn as_duration(self) -> Duration {
        Duration::from_micros(self.0 as u64)
    }

    /// Number of bytes this interval emits over `window_us`, plus one.
    /// Used to size the startup cushion.
    pub fn bytes_per_window(self, window_us: u64) -> u64 {
        window_us / self.0 as u64 + 1
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}µs", self.0)
    }
}

// ─── Factor ─────────────────────────────────────────────────────────────────

/// Exact rescale multiplier, in basis points (1.05 == 10_500).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Factor(u32);

impl Factor {
    /// Widen the interval by 5% (emit slower).
    pub const SLOW_DOWN: Factor = Factor(10_500);
    /// Narrow the interval by 5% (emit faster).
    pub const SPEED_UP: Factor = Factor(9_500);

    /// Convert a ratio such as `1.05` into basis points. Returns `None` for
    /// non-finite, non-positive, or absurdly large ratios.
    pub fn from_ratio(ratio: f64) -> Option<Self> {
        if !ratio.is_finite() || ratio <= 0.0 || ratio > 100.0 {
            return None;
        }
        let bp = (ratio * BASIS as f64).round() as u32;
        (bp > 0).then_some(Factor(bp))
    }

    pub fn basis_points(self) -> u32 {
        self.0
    }

    pub fn ratio(self) -> f64 {
        self.0 as f64 / BASIS as f64
    }

    pub fn widens(self) -> bool {
        self.0 as u64 > BASIS
    }

    pub fn narrows(self) -> bool {
        (self.0 as u64) < BASIS
    }

    /// Multiply `interval` by this factor. Widening factors round up,
    /// narrowing factors round down.
    pub fn apply(self, interval: Interval) -> u64 {
        let product = interval.0 as u64 * self.0 as u64;
        if self.widens() {
            product.div_ceil(BASIS)
        } else {
            product / BASIS
        }
    }
}

impl fmt::Display for Factor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "×{:.4}", self.ratio())
    }
}
