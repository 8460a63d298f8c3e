//! Byte transports the link session runs over.

use std::collections::VecDeque;
use std::io::{self, Read, Write};

/// A blocking, half-duplex byte pipe to the ANT dongle.
///
/// Reads may return fewer bytes than requested, zero bytes, or a timeout
/// error; the link session treats all of these as "nothing yet".
pub trait Transport {
    /// Read up to `buf.len()` bytes.
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Write a complete frame.
    fn write_all(&mut self, data: &[u8]) -> io::Result<()>;
}

impl<T: Read + Write> Transport for T {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        Read::read(self, buf)
    }

    fn write_all(&mut self, data: &[u8]) -> io::Result<()> {
        Write::write_all(self, data)?;
        self.flush()
    }
}

/// An in-memory transport that replays queued read chunks and records writes.
///
/// Each queued chunk is returned by one read call (split if the caller's
/// buffer is smaller). When the queue is empty reads time out.
#[derive(Debug, Default, Clone)]
pub struct ScriptedTransport {
    inbound: VecDeque<Vec<u8>>,
    written: Vec<Vec<u8>>,
    reads: usize,
    failing_writes: usize,
}

impl ScriptedTransport {
    /// Create an empty transport.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue one chunk to be returned by a future read.
    pub fn queue(&mut self, chunk: impl Into<Vec<u8>>) -> &mut Self {
        self.inbound.push_back(chunk.into());
        self
    }

    /// Make the next `count` writes fail with `BrokenPipe`.
    pub fn fail_next_writes(&mut self, count: usize) -> &mut Self {
        self.failing_writes = count;
        self
    }

    /// Everything written so far, one entry per write call.
    pub fn written(&self) -> &[Vec<u8>] {
        &self.written
    }

    /// Read calls made so far, including ones that timed out.
    pub fn reads(&self) -> usize {
        self.reads
    }

    /// Chunks not yet read.
    pub fn pending(&self) -> usize {
        self.inbound.len()
    }
}

impl Read for ScriptedTransport {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.reads += 1;
        let Some(mut chunk) = self.inbound.pop_front() else {
            return Err(io::Error::new(io::ErrorKind::TimedOut, "no queued data"));
        };
        let n = chunk.len().min(buf.len());
        buf[..n].copy_from_slice(&chunk[..n]);
        if n < chunk.len() {
            self.inbound.push_front(chunk.split_off(n));
        }
        Ok(n)
    }
}

impl Write for ScriptedTransport {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.failing_writes > 0 {
            self.failing_writes -= 1;
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "scripted write failure"));
        }
        self.written.push(buf.to_vec());
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
