//! Pacing tunables.
//!
//! [`PacerConfigInput`] mirrors the optional TOML file with every key
//! optional; [`PacerConfigInput::resolve`] validates it and fills defaults.

use std::path::Path;

use serde::Deserialize;

use crate::error::PacerError;
use crate::interval::Factor;

pub const DEFAULT_DRIFT_THRESHOLD: u64 = 1024;
pub const DEFAULT_WINDOW_US: u64 = 1_000_000;
pub const DEFAULT_READ_CHUNK: usize = 4096;

/// Raw, partially specified configuration as read from TOML.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PacerConfigInput {
    pub drift_threshold: Option<u64>,
    pub speed_up_factor: Option<f64>,
    pub slow_down_factor: Option<f64>,
    pub estimation_window_us: Option<u64>,
    pub prefill_window_us: Option<u64>,
    pub read_chunk_size: Option<usize>,
}

/// Validated tunables for a run.
#[derive(Debug, Clone, PartialEq)]
pub struct PacerConfig {
    /// Drift magnitude (bytes) that triggers a rescale.
    pub drift_threshold: u64,
    /// Applied when input outpaces output.
    pub speed_up: Factor,
    /// Applied on underrun or when output outpaces input.
    pub slow_down: Factor,
    /// Rate estimation sampling window.
    pub estimation_window_us: u64,
    /// Cushion built before streaming when the interval is explicit.
    pub prefill_window_us: u64,
    pub read_chunk_size: usize,
}

impl Default for PacerConfig {
    fn default() -> Self {
        Self {
            drift_threshold: DEFAULT_DRIFT_THRESHOLD,
            speed_up: Factor::SPEED_UP,
            slow_down: Factor::SLOW_DOWN,
            estimation_window_us: DEFAULT_WINDOW_US,
            prefill_window_us: DEFAULT_WINDOW_US,
            read_chunk_size: DEFAULT_READ_CHUNK,
        }
    }
}

impl PacerConfigInput {
    pub fn resolve(self) -> Result<PacerConfig, PacerError> {
        let defaults = PacerConfig::default();

        let drift_threshold = self.drift_threshold.unwrap_or(defaults.drift_threshold);
        if drift_threshold == 0 {
            return Err(PacerError::Config("drift_threshold must be at least 1".into()));
        }

        let speed_up = match self.speed_up_factor {
            None => defaults.speed_up,
            Some(r) => Factor::from_ratio(r)
                .filter(|f| f.narrows())
                .ok_or_else(|| {
                    PacerError::Config(format!("speed_up_factor must be in (0, 1), got {r}"))
                })?,
        };
        let slow_down = match self.slow_down_factor {
            None => defaults.slow_down,
            Some(r) => Factor::from_ratio(r)
                .filter(|f| f.widens() && f.ratio() <= 2.0)
                .ok_or_else(|| {
                    PacerError::Config(format!("slow_down_factor must be in (1, 2], got {r}"))
                })?,
        };

        let estimation_window_us = self
            .estimation_window_us
            .unwrap_or(defaults.estimation_window_us);
        let prefill_window_us = self.prefill_window_us.unwrap_or(defaults.prefill_window_us);
        if estimation_window_us == 0 {
            return Err(PacerError::Config("estimation_window_us must be positive".into()));
        }

        Ok(PacerConfig {
            drift_threshold,
            speed_up,
            slow_down,
            estimation_window_us,
            prefill_window_us,
            read_chunk_size: self.read_chunk_size.unwrap_or(defaults.read_chunk_size).max(1),
        })
    }
}

impl PacerConfig {
    pub fn from_toml_str(input: &str) -> Result<Self, PacerError> {
        if input.trim().is_empty() {
            return Ok(PacerConfig::default());
        }
        let parsed: PacerConfigInput = toml::from_str(input)
            .map_err(|e| PacerError::Config(format!("invalid config TOML: {e}")))?;
        parsed.resolve()
    }

    pub fn from_file(path: &Path) -> Result<Self, PacerError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| PacerError::Config(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&text)
    }
}
