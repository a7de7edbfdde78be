//! Error taxonomy. Every variant is terminal for the process.

use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PacerError {
    // ── Configuration ──────────────────────────────────────────────
    #[error(
        "Invalid argument {arg:?}.  If given, the first argument must be an integer greater than 0\n\
         and less than 1e6 which specifies the number of microseconds\n\
         between bytes of output."
    )]
    InvalidInterval { arg: String },
    #[error("Interval must be given if reading from a regular file")]
    IntervalRequired,
    #[error("invalid configuration: {0}")]
    Config(String),

    // ── Estimation ─────────────────────────────────────────────────
    #[error("not enough input to estimate data rate")]
    NotEnoughInput,
    #[error("input data rate is too high ({bytes} bytes in the sampling window)")]
    InputRateTooHigh { bytes: u64 },

    // ── Rate bounds ────────────────────────────────────────────────
    #[error("maximum output rate exceeded (interval would be {interval_us}µs)")]
    MaxRateExceeded { interval_us: u64 },
    #[error("minimum output rate not met (interval would be {interval_us}µs)")]
    MinRateNotMet { interval_us: u64 },

    // ── Resources ──────────────────────────────────────────────────
    #[error("stdin: {0}")]
    SourceKind(#[source] io::Error),
    #[error("failed to start input reader: {0}")]
    ReaderSpawn(#[source] io::Error),
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl PacerError {
    /// True for failures of the adaptive rate bounds.
    pub fn is_rate_bound(&self) -> bool {
        matches!(
            self,
            PacerError::MaxRateExceeded { .. } | PacerError::MinRateNotMet { .. }
        )
    }
}
