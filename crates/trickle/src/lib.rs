//! # trickle
//!
//! Byte stream rate matcher. Accepts a byte stream arriving at an unknown
//! or bursty cadence and re-emits the same bytes, in order, one byte per
//! timer tick. The tick interval is either supplied explicitly or estimated
//! from a one-second sample of the input, then continuously re-tuned from
//! the drift between bytes received and bytes emitted.
//!
//! ## Crate structure
//!
//! - [`queue`]: Growable FIFO of bytes awaiting emission
//! - [`interval`]: Emission interval and exact rescale factors
//! - [`timer`]: Deadline-based recurring / one-shot timer
//! - [`controller`]: Interval ownership, rescale policy, rate bounds
//! - [`estimator`]: Startup input rate estimation
//! - [`scheduler`]: Main control loop and phase state machine
//! - [`input`]: Reader thread and byte-at-a-time input
//! - [`source`]: Regular file vs live stream detection
//! - [`config`]: Tunables, TOML loading
//! - [`error`]: Error taxonomy

pub mod config;
pub mod controller;
pub mod error;
pub mod estimator;
pub mod input;
pub mod interval;
pub mod queue;
pub mod scheduler;
pub mod source;
pub mod timer;

pub use config::PacerConfig;
pub use error::PacerError;
pub use interval::{Factor, Interval};
pub use scheduler::{StreamScheduler, StreamStats};
pub use source::SourceKind;
