//! # trickle
//!
//! Re-emit standard input on standard output one byte at a time at a
//! steady rate.
//!
//! ## Usage
//!
//! ```bash
//! # 100 bytes/sec from a file (interval is mandatory for regular files)
//! trickle 10000 < capture.bin
//!
//! # Match the rate of a live producer, estimated over the first second
//! producer | trickle | consumer
//!
//! # Tighter drift threshold, debug logging of every rescale
//! producer | trickle --threshold 256 --log-level debug | consumer
//! ```

use std::io::IsTerminal;
use std::path::PathBuf;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use trickle::input::spawn_reader;
use trickle::{Interval, PacerConfig, SourceKind, StreamScheduler};

/// Byte stream rate matcher.
#[derive(Parser, Debug)]
#[command(name = "trickle", version, about = "Re-emit stdin on stdout at a steady byte rate")]
struct Cli {
    /// Microseconds between output bytes (1..=999999). Estimated from the
    /// input when omitted; required when stdin is a regular file.
    #[arg(allow_negative_numbers = true)]
    interval: Option<String>,

    /// TOML file with pacing tunables.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Drift (bytes) that triggers a rate adjustment. Overrides the config file.
    #[arg(long)]
    threshold: Option<u64>,

    /// Log filter, written to stderr (e.g. "info", "trickle=debug").
    #[arg(long, default_value = "warn")]
    log_level: String,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // ── Logging ─────────────────────────────────────────────────
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_new(&cli.log_level).unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .with_ansi(std::io::stderr().is_terminal())
        .with_target(true)
        .compact()
        .init();

    // ── Configuration ───────────────────────────────────────────
    let mut config = match &cli.config {
        Some(path) => PacerConfig::from_file(path)?,
        None => PacerConfig::default(),
    };
    if let Some(threshold) = cli.threshold {
        if threshold == 0 {
            anyhow::bail!("--threshold must be at least 1");
        }
        config.drift_threshold = threshold;
    }

    let interval = cli.interval.as_deref().map(Interval::parse_arg).transpose()?;
    let source = SourceKind::stdin()?;
    if interval.is_none() && source.is_regular() {
        return Err(trickle::PacerError::IntervalRequired.into());
    }

    tracing::info!(
        interval_us = ?interval.map(Interval::as_micros),
        %source,
        drift_threshold = config.drift_threshold,
        mode = if interval.is_some() { "fixed" } else { "estimate" },
        "trickle starting"
    );

    // ── Run ─────────────────────────────────────────────────────
    let mut input = spawn_reader(std::io::stdin(), config.read_chunk_size)?;
    let stdout = std::io::stdout();
    let mut scheduler = StreamScheduler::new(source, config, stdout.lock());
    // anyhow reports the error itself; only the context is logged here.
    if let Err(e) = scheduler.run(&mut input, interval) {
        tracing::debug!(
            phase = ?scheduler.phase(),
            rate_bound = e.is_rate_bound(),
            bytes_out = scheduler.stats().bytes_out,
            "run aborted"
        );
        return Err(e.into());
    }
    Ok(())
}
