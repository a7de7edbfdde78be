//! # Stream Scheduler
//!
//! The control loop. Owns the byte queue, the interval controller and the
//! drift counter, and walks a run through its phases:
//!
//! ```text
//!   interval given?
//!     ├─ yes ──▶ PREFILL ──┐
//!     └─ no  ──▶ ESTIMATING┴─▶ STEADY ──(input EOF)──▶ DRAINING ──(queue empty)──▶ DONE
//! ```
//!
//! In STEADY each iteration first services a due timer tick, then waits for
//! input no longer than the time left until the next tick. A tick pops one
//! byte and emits it; an empty queue on a tick is an underrun and slows
//! emission down. Drift (bytes in minus bytes out since the last drift
//! rescale) beyond the threshold speeds emission up or slows it down.

use std::io::Write;
use std::time::Duration;

use crate::config::PacerConfig;
use crate::controller::{IntervalController, RescaleCause};
use crate::error::PacerError;
use crate::estimator::RateEstimator;
use crate::input::{ByteInput, Next};
use crate::interval::Interval;
use crate::queue::{ByteQueue, Pop};
use crate::source::SourceKind;
use crate::timer::IntervalTimer;

// ─── Phase ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Created, nothing read yet.
    Idle,
    /// Sampling input to derive the interval.
    Estimating,
    /// Buffering about one window of input before the first tick.
    Prefill,
    /// Interleaving input with paced emission.
    Steady,
    /// Input finished; emitting what is left.
    Draining,
    Done,
}

// ─── Drift ──────────────────────────────────────────────────────────────────

/// Bytes received minus bytes emitted since the last drift rescale.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DriftCounter(i64);

impl DriftCounter {
    pub fn received(&mut self) {
        self.0 += 1;
    }

    pub fn emitted(&mut self) {
        self.0 -= 1;
    }

    pub fn reset(&mut self) {
        self.0 = 0;
    }

    pub fn value(self) -> i64 {
        self.0
    }
}

// ─── Tick / Stats ───────────────────────────────────────────────────────────

/// What a single timer tick did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    Emitted(u8),
    /// Queue was empty while input is still open.
    Underrun,
    /// Queue was empty after input ended; the run is complete.
    Drained,
}

/// End-of-run summary.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct StreamStats {
    pub bytes_in: u64,
    pub bytes_out: u64,
    pub underruns: u64,
    pub rescales: u64,
    pub peak_queue: usize,
    pub final_interval_us: u32,
}

// ─── Scheduler ──────────────────────────────────────────────────────────────

pub struct StreamScheduler<W: Write> {
    queue: ByteQueue,
    controller: IntervalController,
    drift: DriftCounter,
    phase: Phase,
    config: PacerConfig,
    out: W,
    bytes_in: u64,
    bytes_out: u64,
    underruns: u64,
}

impl<W: Write> StreamScheduler<W> {
    pub fn new(source: SourceKind, config: PacerConfig, out: W) -> Self {
        Self::with_timer(source, config, IntervalTimer::new(), out)
    }

    pub fn with_timer(
        source: SourceKind,
        config: PacerConfig,
        timer: IntervalTimer,
        out: W,
    ) -> Self {
        StreamScheduler {
            queue: ByteQueue::new(),
            controller: IntervalController::new(Interval::MAX, source, timer),
            drift: DriftCounter::default(),
            phase: Phase::Idle,
            config,
            out,
            bytes_in: 0,
            bytes_out: 0,
            underruns: 0,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn interval(&self) -> Interval {
        self.controller.interval()
    }

    pub fn drift(&self) -> DriftCounter {
        self.drift
    }

    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    pub fn output(&self) -> &W {
        &self.out
    }

    pub fn into_output(self) -> W {
        self.out
    }

    pub fn stats(&self) -> StreamStats {
        StreamStats {
            bytes_in: self.bytes_in,
            bytes_out: self.bytes_out,
            underruns: self.underruns,
            rescales: self.controller.rescales(),
            peak_queue: self.queue.peak(),
            final_interval_us: self.controller.interval().as_micros(),
        }
    }

    /// Run to completion: establish the interval, stream until input ends,
    /// then drain the queue.
    ///
    /// With `interval == None` the source must be live and the interval is
    /// estimated from the input.
    pub fn run(
        &mut self,
        input: &mut ByteInput,
        interval: Option<Interval>,
    ) -> Result<StreamStats, PacerError> {
        let source = self.controller.source();
        match interval {
            Some(interval) => self.prefill(input, interval)?,
            None if source.is_regular() => return Err(PacerError::IntervalRequired),
            None => {
                self.estimate(input)?;
            }
        }

        tracing::info!(
            interval_us = self.interval().as_micros(),
            %source,
            buffered = self.queue.len(),
            "streaming"
        );
        self.stream(input)?;
        self.drain()?;

        let stats = self.stats();
        tracing::info!(
            bytes_in = stats.bytes_in,
            bytes_out = stats.bytes_out,
            underruns = stats.underruns,
            rescales = stats.rescales,
            peak_queue = stats.peak_queue,
            final_interval_us = stats.final_interval_us,
            "stream complete"
        );
        Ok(stats)
    }

    /// Derive the interval from a sample of live input.
    pub fn estimate(&mut self, input: &mut ByteInput) -> Result<Interval, PacerError> {
        self.phase = Phase::Estimating;
        let estimator = RateEstimator::new(self.config.estimation_window_us);
        let est = estimator.estimate(input, &mut self.queue, &mut self.controller)?;
        self.bytes_in += est.buffered;
        self.controller.set_interval(est.interval);
        Ok(est.interval)
    }

    /// Adopt an explicit interval and buffer one window's worth of input
    /// (fewer if input ends first).
    pub fn prefill(&mut self, input: &mut ByteInput, interval: Interval) -> Result<(), PacerError> {
        self.phase = Phase::Prefill;
        self.controller.set_interval(interval);
        let want = interval.bytes_per_window(self.config.prefill_window_us);
        let mut got = 0u64;
        while got < want {
            match input.recv()? {
                Next::Byte(b) => {
                    self.queue.push(b);
                    got += 1;
                }
                Next::Timeout => {}
                Next::Eof => break,
            }
        }
        self.bytes_in += got;
        tracing::debug!(want, got, "prefill complete");
        Ok(())
    }

    /// Steady state: paced emission interleaved with input until EOF.
    ///
    /// Arms the recurring timer at the current interval unless it is
    /// already running.
    pub fn stream(&mut self, input: &mut ByteInput) -> Result<(), PacerError> {
        self.phase = Phase::Steady;
        self.drift.reset();
        if !self.controller.timer().is_armed() {
            self.controller.start();
        }
        loop {
            // A due tick is always serviced before reading more input.
            if self.controller.timer_mut().take_expired() {
                self.on_tick()?;
                continue;
            }
            let wait = self.controller.timer().remaining().unwrap_or(Duration::ZERO);
            match input.recv_timeout(wait)? {
                Next::Byte(b) => self.on_byte(b),
                Next::Timeout => {}
                Next::Eof => return Ok(()),
            }
        }
    }

    /// Emit what is queued, one byte per tick at the current interval,
    /// until a tick finds the queue empty.
    pub fn drain(&mut self) -> Result<(), PacerError> {
        self.phase = Phase::Draining;
        tracing::debug!(pending = self.queue.len(), "input finished, draining");
        if !self.controller.timer().is_armed() {
            self.controller.start();
        }
        loop {
            match self.controller.timer().remaining() {
                Some(wait) if !wait.is_zero() => std::thread::sleep(wait),
                Some(_) => {}
                None => self.controller.start(),
            }
            if !self.controller.timer_mut().take_expired() {
                continue;
            }
            if self.on_drain_tick()? == TickOutcome::Drained {
                return Ok(());
            }
        }
    }

    /// A byte arrived from the input.
    pub fn on_byte(&mut self, byte: u8) {
        self.queue.push(byte);
        self.drift.received();
        self.bytes_in += 1;
    }

    /// A steady-state tick: emit or handle underrun, then check drift.
    pub fn on_tick(&mut self) -> Result<TickOutcome, PacerError> {
        let outcome = match self.queue.pop() {
            Pop::Byte(b) => {
                self.emit(b)?;
                TickOutcome::Emitted(b)
            }
            Pop::Empty => {
                self.underruns += 1;
                tracing::trace!(interval_us = self.interval().as_micros(), "underrun");
                self.controller.rescale(
                    self.config.slow_down,
                    RescaleCause::Underrun,
                    self.drift.value(),
                )?;
                TickOutcome::Underrun
            }
        };
        self.drift.emitted();
        self.check_drift()?;
        Ok(outcome)
    }

    /// A tick after input ended. No rescaling happens while draining.
    pub fn on_drain_tick(&mut self) -> Result<TickOutcome, PacerError> {
        match self.queue.pop() {
            Pop::Byte(b) => {
                self.emit(b)?;
                Ok(TickOutcome::Emitted(b))
            }
            Pop::Empty => {
                self.controller.disarm();
                self.phase = Phase::Done;
                Ok(TickOutcome::Drained)
            }
        }
    }

    fn check_drift(&mut self) -> Result<(), PacerError> {
        let drift = self.drift.value();
        let threshold = self.config.drift_threshold as i64;
        if drift > threshold {
            self.controller
                .rescale(self.config.speed_up, RescaleCause::InputAhead, drift)?;
            self.drift.reset();
        } else if drift < -threshold {
            self.controller
                .rescale(self.config.slow_down, RescaleCause::OutputAhead, drift)?;
            self.drift.reset();
        }
        Ok(())
    }

    fn emit(&mut self, byte: u8) -> Result<(), PacerError> {
        self.out.write_all(&[byte])?;
        self.out.flush()?;
        self.bytes_out += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::Chunk;
    use crossbeam_channel::bounded;
    use quanta::{Clock, Mock};
    use std::sync::Arc;
    use std::thread;

    fn config(threshold: u64) -> PacerConfig {
        PacerConfig {
            drift_threshold: threshold,
            ..PacerConfig::default()
        }
    }

    /// Scheduler on a mock clock with its timer armed at `us`.
    fn armed(
        us: u32,
        source: SourceKind,
        threshold: u64,
    ) -> (StreamScheduler<Vec<u8>>, Arc<Mock>) {
        let (clock, mock) = Clock::mock();
        let mut s = StreamScheduler::with_timer(
            source,
            config(threshold),
            IntervalTimer::with_clock(clock),
            Vec::new(),
        );
        s.controller.set_interval(Interval::from_micros(us).unwrap());
        s.controller.start();
        (s, mock)
    }

    /// Scheduler on a mock clock, already in steady state at `us`.
    fn steady(us: u32, source: SourceKind, threshold: u64) -> StreamScheduler<Vec<u8>> {
        let (mut s, _mock) = armed(us, source, threshold);
        s.phase = Phase::Steady;
        s
    }

    fn closed_input(data: &[u8]) -> ByteInput {
        let (tx, rx) = bounded(2);
        if !data.is_empty() {
            tx.send(Chunk::Data(bytes::Bytes::copy_from_slice(data))).unwrap();
        }
        tx.send(Chunk::Eof).unwrap();
        ByteInput::new(rx)
    }

    // ─── Tick handling ──────────────────────────────────────────────────

    #[test]
    fn ticks_emit_in_arrival_order() {
        let mut s = steady(1000, SourceKind::Live, 1024);
        for &b in b"hello" {
            s.on_byte(b);
        }
        for &b in b"hello" {
            assert_eq!(s.on_tick().unwrap(), TickOutcome::Emitted(b));
        }
        assert_eq!(s.output(), b"hello");
        assert_eq!(s.drift().value(), 0);
    }

    #[test]
    fn underrun_slows_down_by_five_percent() {
        let mut s = steady(1000, SourceKind::Live, 1024);
        assert_eq!(s.on_tick().unwrap(), TickOutcome::Underrun);
        assert_eq!(s.interval().as_micros(), 1050);
        assert_eq!(s.drift().value(), -1);
        assert_eq!(s.stats().underruns, 1);

        assert_eq!(s.on_tick().unwrap(), TickOutcome::Underrun);
        // ceil(1050 * 1.05) = ceil(1102.5)
        assert_eq!(s.interval().as_micros(), 1103);
    }

    #[test]
    fn positive_drift_speeds_up_and_resets() {
        let mut s = steady(1000, SourceKind::Live, 4);
        for b in 0..10 {
            s.on_byte(b);
        }
        // Drift is checked only after a tick.
        assert_eq!(s.interval().as_micros(), 1000);
        assert_eq!(s.on_tick().unwrap(), TickOutcome::Emitted(0));
        assert_eq!(s.interval().as_micros(), 950);
        assert_eq!(s.drift().value(), 0);
    }

    #[test]
    fn negative_drift_slows_down_and_resets() {
        let mut s = steady(1000, SourceKind::Live, 2);
        s.on_byte(1);
        s.on_byte(2);
        // Two emissions, then one underrun per tick. After the third tick
        // drift is -1, after the fifth it is -3 < -2.
        s.on_tick().unwrap();
        s.on_tick().unwrap();
        let mut expected = 1000u64;
        for _ in 0..3 {
            assert_eq!(s.on_tick().unwrap(), TickOutcome::Underrun);
            expected = (expected * 105).div_ceil(100);
        }
        // The final tick also tripped the drift threshold: one more slow-down.
        expected = (expected * 105).div_ceil(100);
        assert_eq!(s.interval().as_micros() as u64, expected);
        assert_eq!(s.drift().value(), 0);
        assert_eq!(s.stats().rescales, 4);
    }

    #[test]
    fn regular_source_keeps_interval() {
        let mut s = steady(500, SourceKind::Regular, 2);
        for _ in 0..10 {
            s.on_tick().unwrap();
        }
        for b in 0..20 {
            s.on_byte(b);
        }
        s.on_tick().unwrap();
        assert_eq!(s.interval().as_micros(), 500);
        assert_eq!(s.stats().rescales, 0);
    }

    #[test]
    fn speed_up_past_minimum_stops_output() {
        let mut s = steady(10, SourceKind::Live, 1);
        for &b in b"abc" {
            s.on_byte(b);
        }
        let err = s.on_tick().unwrap_err();
        assert!(matches!(err, PacerError::MaxRateExceeded { interval_us: 9 }));
        // The tick's byte went out before the drift check; nothing after.
        assert_eq!(s.output(), b"a");
    }

    #[test]
    fn slow_down_past_maximum_is_fatal() {
        let mut s = steady(999_999, SourceKind::Live, 1024);
        let err = s.on_tick().unwrap_err();
        assert!(matches!(err, PacerError::MinRateNotMet { .. }));
        assert!(s.output().is_empty());
    }

    // ─── Steady loop ────────────────────────────────────────────────────

    #[test]
    fn due_ticks_are_serviced_before_queued_input() {
        // Regular source: underruns do not re-arm, so all three overdue
        // ticks stay pending.
        let (mut s, mock) = armed(1000, SourceKind::Regular, 1024);
        mock.increment(Duration::from_micros(3 * 1000));
        let mut input = closed_input(b"abc");

        s.stream(&mut input).unwrap();

        // Three underruns happened before any byte reached the queue.
        let stats = s.stats();
        assert_eq!(stats.underruns, 3);
        assert_eq!(stats.bytes_in, 3);
        assert!(s.output().is_empty());
        assert_eq!(s.queued(), 3);
        assert_eq!(s.drift().value(), 0);

        for &b in b"abc" {
            assert_eq!(s.on_drain_tick().unwrap(), TickOutcome::Emitted(b));
        }
        assert_eq!(s.on_drain_tick().unwrap(), TickOutcome::Drained);
        assert_eq!(s.output(), b"abc");
    }

    #[test]
    fn underrun_rearm_drops_stale_deadline() {
        let (mut s, mock) = armed(1000, SourceKind::Live, 1024);
        mock.increment(Duration::from_micros(3 * 1000));
        let mut input = closed_input(b"abc");

        s.stream(&mut input).unwrap();

        // The first underrun re-arms from "now"; the rest of the backlog is gone.
        assert_eq!(s.stats().underruns, 1);
        assert_eq!(s.interval().as_micros(), 1050);
        assert_eq!(s.queued(), 3);
    }

    #[test]
    fn loop_speeds_up_when_input_runs_ahead() {
        let (mut s, mock) = armed(1000, SourceKind::Live, 4);
        let (tx, rx) = bounded(4);
        tx.send(Chunk::Data(bytes::Bytes::from((0..10u8).collect::<Vec<_>>())))
            .unwrap();
        let mut input = ByteInput::new(rx);

        // Let the loop swallow all ten bytes, then make one tick due, then
        // end the input.
        let feeder = thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            mock.increment(Duration::from_micros(1000));
            thread::sleep(Duration::from_millis(50));
            tx.send(Chunk::Eof).unwrap();
        });
        s.stream(&mut input).unwrap();
        feeder.join().unwrap();

        assert_eq!(s.output(), &[0u8]);
        assert_eq!(s.interval().as_micros(), 950);
        assert_eq!(s.drift().value(), 0);
        assert_eq!(s.stats().rescales, 1);
        assert_eq!(s.queued(), 9);
    }

    #[test]
    fn loop_slows_down_when_output_runs_ahead() {
        // Two overdue ticks on an empty queue with threshold 1: the second
        // underrun leaves drift at -2 and adds a drift slow-down.
        let (mut s, mock) = armed(1000, SourceKind::Live, 1);
        let (tx, rx) = bounded(4);
        let mut input = ByteInput::new(rx);
        let feeder = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            mock.increment(Duration::from_micros(1000));
            thread::sleep(Duration::from_millis(50));
            mock.increment(Duration::from_micros(1050));
            thread::sleep(Duration::from_millis(50));
            tx.send(Chunk::Eof).unwrap();
        });
        s.stream(&mut input).unwrap();
        feeder.join().unwrap();

        // 1000 -> 1050 (underrun) -> 1103 (underrun) -> 1159 (drift)
        assert_eq!(s.stats().underruns, 2);
        assert_eq!(s.stats().rescales, 3);
        assert_eq!(s.interval().as_micros(), 1159);
        assert_eq!(s.drift().value(), 0);
    }

    // ─── Drain ──────────────────────────────────────────────────────────

    #[test]
    fn drain_tick_emits_then_finishes() {
        let mut s = steady(1000, SourceKind::Live, 1024);
        s.on_byte(b'x');
        s.on_byte(b'y');
        assert_eq!(s.on_drain_tick().unwrap(), TickOutcome::Emitted(b'x'));
        assert_eq!(s.on_drain_tick().unwrap(), TickOutcome::Emitted(b'y'));
        assert_eq!(s.on_drain_tick().unwrap(), TickOutcome::Drained);
        assert_eq!(s.phase(), Phase::Done);
        // Draining never rescales.
        assert_eq!(s.interval().as_micros(), 1000);
    }

    #[test]
    fn drain_emits_exactly_what_was_queued() {
        let mut s = StreamScheduler::new(SourceKind::Live, config(1024), Vec::new());
        s.controller.set_interval(Interval::from_micros(10).unwrap());
        for b in 0..200u8 {
            s.on_byte(b);
        }
        s.drain().unwrap();
        assert_eq!(s.phase(), Phase::Done);
        assert_eq!(s.output().len(), 200);
        assert_eq!(s.output(), &(0..200u8).collect::<Vec<_>>());
        assert_eq!(s.queued(), 0);
    }

    // ─── Startup ────────────────────────────────────────────────────────

    #[test]
    fn prefill_reads_one_window() {
        let mut s = StreamScheduler::new(SourceKind::Regular, config(1024), Vec::new());
        let mut input = closed_input(&[0u8; 500]);
        // 1_000_000 / 10_000 + 1
        s.prefill(&mut input, Interval::from_micros(10_000).unwrap()).unwrap();
        assert_eq!(s.queued(), 101);
        assert_eq!(s.phase(), Phase::Prefill);
        assert_eq!(s.drift().value(), 0, "prefill does not count as drift");
    }

    #[test]
    fn prefill_stops_at_eof() {
        let mut s = StreamScheduler::new(SourceKind::Regular, config(1024), Vec::new());
        let mut input = closed_input(b"short");
        s.prefill(&mut input, Interval::from_micros(10).unwrap()).unwrap();
        assert_eq!(s.queued(), 5);
    }

    #[test]
    fn regular_source_requires_interval() {
        let mut s = StreamScheduler::new(SourceKind::Regular, config(1024), Vec::new());
        let mut input = closed_input(b"data");
        let err = s.run(&mut input, None).unwrap_err();
        assert!(matches!(err, PacerError::IntervalRequired));
        assert!(s.output().is_empty());
    }

    #[test]
    fn run_with_explicit_interval_copies_input() {
        let data: Vec<u8> = (0..300u32).map(|i| (i * 7) as u8).collect();
        let mut s = StreamScheduler::new(SourceKind::Regular, config(1024), Vec::new());
        let mut input = closed_input(&data);
        let stats = s.run(&mut input, Some(Interval::from_micros(10).unwrap())).unwrap();
        assert_eq!(s.phase(), Phase::Done);
        assert_eq!(stats.bytes_in, 300);
        assert_eq!(stats.bytes_out, 300);
        assert_eq!(stats.final_interval_us, 10);
        assert_eq!(s.into_output(), data);
    }
}
