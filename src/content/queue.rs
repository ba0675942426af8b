//! Ordered buffer of pending content chunks for one request.
//!
//! The queue is a purely sequential data structure: it performs no locking
//! and no notification itself. The intake engine wraps it, together with the
//! readiness state machines, in a single lock so that every push/read/state
//! transition is atomic end-to-end.

use std::collections::VecDeque;

use bytes::{Buf, Bytes};
use tracing::trace;

use crate::content::Chunk;
use crate::error::IntakeError;
use crate::utils::ensure;

/// Terminal state of the content stream.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub enum Terminal {
    /// The stream is still open: more content may arrive.
    #[default]
    NotReached,
    /// The stream ended normally.
    Eof,
    /// The stream ended abnormally, before all expected bytes arrived.
    EarlyEof,
}

impl Terminal {
    /// Returns true once either end-of-stream sentinel has been recorded
    #[inline]
    pub fn is_reached(&self) -> bool {
        !matches!(self, Terminal::NotReached)
    }
}

/// Outcome of a successful non-blocking read.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ReadOutcome {
    /// The next body byte, in push order.
    Byte(u8),
    /// All content has been consumed and the stream ended normally.
    EndOfStream,
}

/// Ordered buffer of pending content for one request.
///
/// Bytes come out in exactly the order they were pushed. Once a terminal
/// sentinel is recorded no further content is accepted, and reads after the
/// pending data drains yield the terminal signal without ever blocking.
/// Data queued ahead of an early EOF stays readable; the truncation error
/// surfaces only once the queued bytes are gone.
#[derive(Debug, Default)]
pub struct ContentQueue {
    pending: VecDeque<Bytes>,
    terminal: Terminal,
}

impl ContentQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a data chunk or records a terminal sentinel.
    ///
    /// Empty data chunks are discarded: they carry no readiness. Pushing
    /// anything after a terminal sentinel is a producer bug and fails fast
    /// with [`IntakeError::ProducerAfterTerminal`].
    pub fn push(&mut self, chunk: Chunk) -> Result<(), IntakeError> {
        ensure!(!self.terminal.is_reached(), IntakeError::ProducerAfterTerminal);

        match chunk {
            Chunk::Data(bytes) if bytes.is_empty() => {
                trace!("discarding empty content chunk");
            }
            Chunk::Data(bytes) => self.pending.push_back(bytes),
            Chunk::Eof => self.terminal = Terminal::Eof,
            Chunk::EarlyEof => self.terminal = Terminal::EarlyEof,
        }
        Ok(())
    }

    /// Non-blocking read of the next byte.
    ///
    /// Fully consumed chunks are discarded as the head drains. When the
    /// queue is empty the terminal state decides the outcome: a normal EOF
    /// yields [`ReadOutcome::EndOfStream`], an early EOF fails with
    /// [`IntakeError::StreamTruncated`], and an open stream fails with
    /// [`IntakeError::NotReady`] because the caller must confirm readiness
    /// before reading.
    pub fn try_read(&mut self) -> Result<ReadOutcome, IntakeError> {
        if let Some(head) = self.pending.front_mut() {
            let byte = head.get_u8();
            if head.is_empty() {
                self.pending.pop_front();
            }
            return Ok(ReadOutcome::Byte(byte));
        }

        match self.terminal {
            Terminal::Eof => Ok(ReadOutcome::EndOfStream),
            Terminal::EarlyEof => Err(IntakeError::StreamTruncated),
            Terminal::NotReached => Err(IntakeError::NotReady),
        }
    }

    /// Returns true iff a `try_read` would succeed without blocking: there
    /// is pending data or the terminal state has been reached.
    #[inline]
    pub fn is_ready(&self) -> bool {
        !self.pending.is_empty() || self.terminal.is_reached()
    }

    /// Returns true if un-consumed data bytes remain queued
    #[inline]
    pub fn has_data(&self) -> bool {
        !self.pending.is_empty()
    }

    #[inline]
    pub fn terminal(&self) -> Terminal {
        self.terminal
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain(queue: &mut ContentQueue) -> Vec<u8> {
        let mut out = Vec::new();
        while let Ok(ReadOutcome::Byte(b)) = queue.try_read() {
            out.push(b);
        }
        out
    }

    #[test]
    fn bytes_come_out_in_push_order() {
        let mut queue = ContentQueue::new();
        queue.push(Chunk::from(&b"He"[..])).unwrap();
        queue.push(Chunk::from(&b"llo"[..])).unwrap();
        queue.push(Chunk::Eof).unwrap();

        assert_eq!(drain(&mut queue), b"Hello");
        assert!(matches!(queue.try_read(), Ok(ReadOutcome::EndOfStream)));
        // terminal reads are repeatable and never block
        assert!(matches!(queue.try_read(), Ok(ReadOutcome::EndOfStream)));
    }

    #[test]
    fn read_on_open_empty_queue_is_a_misuse() {
        let mut queue = ContentQueue::new();
        assert!(!queue.is_ready());
        assert!(matches!(queue.try_read(), Err(IntakeError::NotReady)));
    }

    #[test]
    fn early_eof_surfaces_after_queued_data_drains() {
        let mut queue = ContentQueue::new();
        queue.push(Chunk::from(&b"ab"[..])).unwrap();
        queue.push(Chunk::EarlyEof).unwrap();

        assert_eq!(drain(&mut queue), b"ab");
        assert!(matches!(queue.try_read(), Err(IntakeError::StreamTruncated)));
    }

    #[test]
    fn push_after_terminal_fails_fast() {
        let mut queue = ContentQueue::new();
        queue.push(Chunk::Eof).unwrap();

        assert!(matches!(queue.push(Chunk::from(&b"x"[..])), Err(IntakeError::ProducerAfterTerminal)));
        assert!(matches!(queue.push(Chunk::Eof), Err(IntakeError::ProducerAfterTerminal)));
        assert!(matches!(queue.push(Chunk::EarlyEof), Err(IntakeError::ProducerAfterTerminal)));
    }

    #[test]
    fn empty_chunks_are_discarded() {
        let mut queue = ContentQueue::new();
        queue.push(Chunk::Data(Bytes::new())).unwrap();
        assert!(!queue.is_ready());
        assert!(!queue.has_data());
    }

    #[test]
    fn terminal_alone_is_ready() {
        let mut queue = ContentQueue::new();
        queue.push(Chunk::Eof).unwrap();
        assert!(queue.is_ready());
        assert!(!queue.has_data());
        assert_eq!(queue.terminal(), Terminal::Eof);
    }
}
