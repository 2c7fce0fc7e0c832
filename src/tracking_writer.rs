#![forbid(unsafe_code)]

use std::collections::VecDeque;
use std::io::{self, Write};

use anyhow::{ensure, Result};
use byteorder::WriteBytesExt;

use crate::error::DecodeError;

////////////////////////////////////////////////////////////////////////////////

/// Maximum back-reference distance the format can encode.
const HISTORY_SIZE: usize = 32768;

struct RingBuffer(VecDeque<u8>);

impl RingBuffer {
    fn write_slice(&mut self, buf: &[u8]) {
        for byte in buf {
            if self.0.len() >= HISTORY_SIZE {
                self.0.pop_back();
            }
            self.0.push_front(*byte);
        }
    }
}

/// A writer that remembers the last 32 KiB it forwarded so back-references
/// can be resolved against it.
pub struct TrackingWriter<T> {
    inner: T,
    byte_count: usize,
    history: RingBuffer,
}

impl<T: Write> Write for TrackingWriter<T> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let written = self.inner.write(buf)?;
        self.history.write_slice(&buf[..written]);
        self.byte_count += written;
        Ok(written)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

impl<T: Write> TrackingWriter<T> {
    pub fn new(inner: T) -> Self {
        Self {
            inner,
            byte_count: 0,
            history: RingBuffer(VecDeque::new()),
        }
    }

    /// Appends `len` bytes starting `dist` bytes before the current end of
    /// the output, one byte at a time: when `dist < len` the bytes appended
    /// by this very call become sources for the bytes that follow them.
    pub fn write_previous(&mut self, dist: usize, len: usize) -> Result<()> {
        ensure!(dist > 0, "back-reference distance must be at least 1");
        ensure!(
            dist <= self.byte_count,
            DecodeError::InvalidDistance {
                distance: dist,
                produced: self.byte_count,
            }
        );
        ensure!(
            dist <= HISTORY_SIZE,
            "back-reference farther than the history window"
        );
        for _ in 0..len {
            self.write_u8(self.history.0[dist - 1])?;
        }
        Ok(())
    }

    pub fn byte_count(&self) -> usize {
        self.byte_count
    }
}

////////////////////////////////////////////////////////////////////////////////
