//! # Byte Input
//!
//! Blocking reads of the input happen on a dedicated reader thread, which
//! forwards chunks over a bounded channel. The control loop consumes them
//! one byte at a time through [`ByteInput`], waiting at most until the next
//! timer deadline so pending ticks are never starved by a slow producer.

use std::io::{ErrorKind, Read};
use std::thread;
use std::time::Duration;

use bytes::{Buf, Bytes};
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};

use crate::error::PacerError;

/// Chunks the reader may run ahead of the control loop.
const CHANNEL_DEPTH: usize = 64;

/// Messages from the reader thread.
#[derive(Debug)]
pub enum Chunk {
    Data(Bytes),
    Eof,
    Failed(std::io::Error),
}

/// One step of byte-at-a-time input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Next {
    Byte(u8),
    Eof,
    /// No byte arrived before the timeout.
    Timeout,
}

/// Spawn a thread that reads `reader` to completion in `chunk_size` pieces.
pub fn spawn_reader<R>(mut reader: R, chunk_size: usize) -> Result<ByteInput, PacerError>
where
    R: Read + Send + 'static,
{
    let (tx, rx) = bounded(CHANNEL_DEPTH);
    let chunk_size = chunk_size.max(1);
    thread::Builder::new()
        .name("trickle-reader".into())
        .spawn(move || read_loop(&mut reader, chunk_size, &tx))
        .map_err(PacerError::ReaderSpawn)?;
    Ok(ByteInput::new(rx))
}

fn read_loop<R: Read>(reader: &mut R, chunk_size: usize, tx: &Sender<Chunk>) {
    let mut buf = vec![0u8; chunk_size];
    loop {
        match reader.read(&mut buf) {
            Ok(0) => {
                let _ = tx.send(Chunk::Eof);
                return;
            }
            Ok(n) => {
                if tx.send(Chunk::Data(Bytes::copy_from_slice(&buf[..n]))).is_err() {
                    // Control loop is gone.
                    return;
                }
            }
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => {
                let _ = tx.send(Chunk::Failed(e));
                return;
            }
        }
    }
}

/// Byte-at-a-time view over the reader thread's chunks.
pub struct ByteInput {
    rx: Receiver<Chunk>,
    pending: Bytes,
    finished: bool,
}

impl ByteInput {
    pub fn new(rx: Receiver<Chunk>) -> Self {
        ByteInput {
            rx,
            pending: Bytes::new(),
            finished: false,
        }
    }

    /// Block until the next byte or end of input.
    pub fn recv(&mut self) -> Result<Next, PacerError> {
        if let Some(b) = self.take_pending() {
            return Ok(Next::Byte(b));
        }
        if self.finished {
            return Ok(Next::Eof);
        }
        let chunk = self.rx.recv().unwrap_or(Chunk::Eof);
        self.accept(chunk)
    }

    /// Wait at most `timeout` for the next byte.
    pub fn recv_timeout(&mut self, timeout: Duration) -> Result<Next, PacerError> {
        if let Some(b) = self.take_pending() {
            return Ok(Next::Byte(b));
        }
        if self.finished {
            return Ok(Next::Eof);
        }
        match self.rx.recv_timeout(timeout) {
            Ok(chunk) => self.accept(chunk),
            Err(RecvTimeoutError::Timeout) => Ok(Next::Timeout),
            Err(RecvTimeoutError::Disconnected) => self.accept(Chunk::Eof),
        }
    }

    fn take_pending(&mut self) -> Option<u8> {
        if self.pending.has_remaining() {
            Some(self.pending.get_u8())
        } else {
            None
        }
    }

    fn accept(&mut self, chunk: Chunk) -> Result<Next, PacerError> {
        match chunk {
            Chunk::Data(data) => {
                self.pending = data;
                match self.take_pending() {
                    Some(b) => Ok(Next::Byte(b)),
                    // Empty chunks are never sent, but treat one as "nothing yet".
                    None => Ok(Next::Timeout),
                }
            }
            Chunk::Eof => {
                self.finished = true;
                Ok(Next::Eof)
            }
            Chunk::Failed(e) => {
                self.finished = true;
                Err(PacerError::Io(e))
            }
        }
    }
}
