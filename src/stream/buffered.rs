//! Block-buffered stream with bounded pushback.
//!
//! The stream owns one contiguous buffer laid out as
//!
//! ```text
//! [ pushback region (P bytes) | active window (block_size bytes) ]
//! ```
//!
//! Reads refill the whole active window with a single raw read; before each
//! refill the last `P` consumed bytes are copied in front of the window so the
//! cursor can step back across the block boundary for `unget_byte`. Writes
//! fill the window and hand it to the OS one block at a time.
//!
//! In the common case `read_byte` and `write_byte` are an index, a compare
//! and an increment, with no syscall.

use super::child::{ChildHandle, ExitInfo};
use super::{Descriptor, Mode};
use crate::config::StreamConfig;
use crate::error::{Result, StreamError};
use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::{self, Read, Write};
use std::os::fd::AsFd;
use std::path::Path;
use tracing::{debug, warn};

/// A read-only or write-only byte stream over an owned descriptor.
pub struct BufferedStream<D: Descriptor = File> {
    descriptor: Option<D>,
    buffer: Vec<u8>,
    /// Size of the pushback region; the active window starts here.
    pushback: usize,
    block_size: usize,
    /// Position in the active window. Negative values index the pushback region.
    cursor: isize,
    /// Valid bytes in the window (read) or bytes awaiting flush (write).
    available: usize,
    /// Bytes pushed back and not yet re-read.
    pending_ungets: usize,
    eof: bool,
    mode: Mode,
    retry_short_writes: bool,
    child: Option<Box<dyn ChildHandle>>,
}

impl BufferedStream<File> {
    /// Open a file by name.
    ///
    /// `Mode::Write` creates or truncates, `Mode::Append` creates or appends.
    /// New files get mode 0666 masked by the umask.
    pub fn open_path<P: AsRef<Path>>(path: P, mode: Mode, config: &StreamConfig) -> Result<Self> {
        let path = path.as_ref();
        let mut options = OpenOptions::new();
        match mode {
            Mode::Read => options.read(true),
            Mode::Write => options.write(true).create(true).truncate(true),
            Mode::Append => options.append(true).create(true),
        };
        let file = options
            .open(path)
            .map_err(|e| StreamError::descriptor(format!("opening {}", path.display()), e))?;
        Self::from_descriptor(file, mode, config)
    }

    /// Read from a duplicate of standard input.
    pub fn stdin(config: &StreamConfig) -> Result<Self> {
        let fd = io::stdin()
            .as_fd()
            .try_clone_to_owned()
            .map_err(|e| StreamError::descriptor("duplicating standard input", e))?;
        Self::from_descriptor(File::from(fd), Mode::Read, config)
    }

    /// Write to a duplicate of standard output.
    pub fn stdout(config: &StreamConfig) -> Result<Self> {
        let fd = io::stdout()
            .as_fd()
            .try_clone_to_owned()
            .map_err(|e| StreamError::descriptor("duplicating standard output", e))?;
        Self::from_descriptor(File::from(fd), Mode::Write, config)
    }
}

impl<D: Descriptor> BufferedStream<D> {
    /// Wrap an already open descriptor.
    ///
    /// The block size is queried once here and fixed for the stream's lifetime.
    pub fn from_descriptor(descriptor: D, mode: Mode, config: &StreamConfig) -> Result<Self> {
        config.validate()?;
        let preferred = descriptor
            .preferred_block_size()
            .map_err(|e| StreamError::descriptor("querying preferred block size", e))?;
        let block_size = config.resolve_block_size(preferred);
        if preferred == 0 && config.block_size.is_none() {
            debug!(block_size, "descriptor reports no block size, using fallback");
        }

        let pushback = config.pushback_capacity;
        let size = pushback
            .checked_add(block_size)
            .ok_or(StreamError::Allocation { size: usize::MAX })?;
        let mut buffer = Vec::new();
        buffer
            .try_reserve_exact(size)
            .map_err(|_| StreamError::Allocation { size })?;
        buffer.resize(size, 0);

        debug!(%mode, block_size, pushback, "opened stream");
        Ok(Self {
            descriptor: Some(descriptor),
            buffer,
            pushback,
            block_size,
            cursor: 0,
            available: 0,
            pending_ungets: 0,
            eof: false,
            mode,
            retry_short_writes: config.retry_short_writes,
            child: None,
        })
    }

    #[inline]
    pub fn mode(&self) -> Mode {
        self.mode
    }

    #[inline]
    pub fn block_size(&self) -> usize {
        self.block_size
    }

    #[inline]
    pub fn pushback_capacity(&self) -> usize {
        self.pushback
    }

    /// True once a refill has returned zero bytes.
    #[inline]
    pub fn at_eof(&self) -> bool {
        self.eof
    }

    #[inline]
    pub fn has_child(&self) -> bool {
        self.child.is_some()
    }

    /// Process id of the attached child, if any.
    pub fn child_id(&self) -> Option<u32> {
        self.child.as_ref().map(|child| child.id())
    }

    /// Whether the underlying descriptor is a pipe or FIFO.
    pub fn is_pipe(&self) -> Result<bool> {
        let descriptor = self.descriptor.as_ref().ok_or_else(closed)?;
        descriptor
            .is_pipe()
            .map_err(|e| StreamError::descriptor("inspecting descriptor type", e))
    }

    pub(crate) fn attach_child(&mut self, child: Box<dyn ChildHandle>) {
        self.child = Some(child);
    }

    /// Read the next byte, or `None` at end of stream.
    ///
    /// Once a refill returns zero bytes every later call returns `None`
    /// without touching the descriptor, except for bytes pushed back since.
    #[inline]
    pub fn read_byte(&mut self) -> Result<Option<u8>> {
        self.require_read()?;
        if self.cursor < self.available as isize {
            let byte = self.buffer[(self.pushback as isize + self.cursor) as usize];
            self.cursor += 1;
            self.pending_ungets = self.pending_ungets.saturating_sub(1);
            return Ok(Some(byte));
        }
        self.refill()
    }

    #[cold]
    fn refill(&mut self) -> Result<Option<u8>> {
        if self.eof {
            return Ok(None);
        }

        // Keep the most recent consumed bytes in front of the window.
        let p = self.pushback;
        if p > 0 {
            self.buffer.copy_within(self.available..self.available + p, 0);
        }
        self.cursor = 0;
        self.available = 0;
        self.pending_ungets = 0;

        let descriptor = self.descriptor.as_mut().ok_or_else(closed)?;
        let window = &mut self.buffer[p..p + self.block_size];
        let n = loop {
            match descriptor.read(window) {
                Ok(n) => break n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(StreamError::Io(e)),
            }
        };

        if n == 0 {
            self.eof = true;
            return Ok(None);
        }
        self.available = n;
        self.cursor = 1;
        Ok(Some(self.buffer[p]))
    }

    /// Push `byte` back so the next `read_byte` returns it.
    ///
    /// Up to `pushback_capacity` bytes may be outstanding at once; the excess
    /// call fails and leaves the earlier pushed-back bytes in place.
    pub fn unget_byte(&mut self, byte: u8) -> Result<()> {
        self.require_read()?;
        if self.pending_ungets >= self.pushback {
            return Err(StreamError::PushbackExceeded {
                capacity: self.pushback,
            });
        }
        self.cursor -= 1;
        self.pending_ungets += 1;
        self.buffer[(self.pushback as isize + self.cursor) as usize] = byte;
        Ok(())
    }

    /// Bytes already in the window and not yet consumed.
    #[inline]
    pub(crate) fn buffered(&self) -> &[u8] {
        let start = (self.pushback as isize + self.cursor) as usize;
        &self.buffer[start..self.pushback + self.available]
    }

    /// Mark `n` bytes from [`buffered`](Self::buffered) as read.
    #[inline]
    pub(crate) fn consume(&mut self, n: usize) {
        self.cursor += n as isize;
        self.pending_ungets = self.pending_ungets.saturating_sub(n);
    }

    /// Append one byte, writing out the window first if it is full.
    #[inline]
    pub fn write_byte(&mut self, byte: u8) -> Result<()> {
        self.require_write()?;
        if self.available == self.block_size {
            self.flush_window()?;
        }
        self.buffer[self.pushback + self.available] = byte;
        self.available += 1;
        Ok(())
    }

    /// Append a byte slice, one window-sized copy at a time.
    ///
    /// If a block flush fails partway, the bytes copied before the failure
    /// stay buffered. Use [`io::Write::write`] to learn how many were taken.
    pub fn write_bytes(&mut self, mut bytes: &[u8]) -> Result<()> {
        self.require_write()?;
        while !bytes.is_empty() {
            let n = self.append_to_window(bytes)?;
            bytes = &bytes[n..];
        }
        Ok(())
    }

    /// Copy as much of `bytes` as fits into the window, flushing first if it
    /// is full. Either the flush fails and nothing is copied, or at least one
    /// byte is taken.
    fn append_to_window(&mut self, bytes: &[u8]) -> Result<usize> {
        if self.available == self.block_size {
            self.flush_window()?;
        }
        let start = self.pushback + self.available;
        let n = bytes.len().min(self.block_size - self.available);
        self.buffer[start..start + n].copy_from_slice(&bytes[..n]);
        self.available += n;
        Ok(n)
    }

    /// Write out a partially filled window now.
    pub fn flush(&mut self) -> Result<()> {
        self.require_write()?;
        self.flush_window()?;
        if let Some(descriptor) = self.descriptor.as_mut() {
            descriptor.flush()?;
        }
        Ok(())
    }

    /// Hand the window to the OS in a single write.
    ///
    /// A short write is reported as `ShortWrite` unless the stream was
    /// configured to retry. The unwritten tail stays buffered either way.
    fn flush_window(&mut self) -> Result<()> {
        if self.available == 0 {
            return Ok(());
        }
        let p = self.pushback;
        let descriptor = self.descriptor.as_mut().ok_or_else(closed)?;
        let pending = &self.buffer[p..p + self.available];

        if self.retry_short_writes {
            descriptor.write_all(pending)?;
            self.available = 0;
            return Ok(());
        }

        let written = loop {
            match descriptor.write(pending) {
                Ok(n) => break n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(StreamError::Io(e)),
            }
        };
        let expected = self.available;
        if written < expected {
            self.buffer.copy_within(p + written..p + expected, p);
            self.available = expected - written;
            return Err(StreamError::ShortWrite { expected, written });
        }
        self.available = 0;
        Ok(())
    }

    /// Flush pending output, close the descriptor and reap any attached child.
    ///
    /// The descriptor is closed before waiting so a child reading our output
    /// sees end of input. Plain streams report a clean exit.
    pub fn close(mut self) -> Result<ExitInfo> {
        let flushed = if self.mode.is_write() {
            self.flush_window()
        } else {
            Ok(())
        };
        let closed = match self.descriptor.take() {
            Some(descriptor) => descriptor.close().map_err(StreamError::Io),
            None => Ok(()),
        };
        let status = match self.child.take() {
            Some(mut child) => {
                let pid = child.id();
                let status = child.wait()?;
                debug!(pid, %status, "reaped child");
                if !status.is_success() {
                    warn!(pid, %status, "child process exited unsuccessfully");
                }
                status
            }
            None => ExitInfo::success(),
        };
        flushed?;
        closed?;
        debug!(mode = %self.mode, "closed stream");
        Ok(status)
    }

    /// Like [`close`](Self::close), but only for streams with an attached child.
    pub fn close_child(self) -> Result<ExitInfo> {
        if !self.has_child() {
            return Err(StreamError::NotAChildStream);
        }
        self.close()
    }

    #[inline]
    fn require_read(&self) -> Result<()> {
        if self.mode.is_write() {
            return Err(StreamError::WrongMode {
                expected: Mode::Read,
                found: self.mode,
            });
        }
        Ok(())
    }

    #[inline]
    fn require_write(&self) -> Result<()> {
        if !self.mode.is_write() {
            return Err(StreamError::WrongMode {
                expected: Mode::Write,
                found: self.mode,
            });
        }
        Ok(())
    }
}

fn closed() -> io::Error {
    io::Error::new(io::ErrorKind::NotConnected, "stream is closed")
}

impl<D: Descriptor> Drop for BufferedStream<D> {
    fn drop(&mut self) {
        if self.descriptor.is_none() {
            return;
        }
        warn!(mode = %self.mode, child = ?self.child_id(), "stream dropped without close");
        if self.mode.is_write() {
            if let Err(e) = self.flush_window() {
                warn!(error = %e, lost = self.available, "flush on drop failed, output lost");
            }
        }
        if let Some(descriptor) = self.descriptor.take() {
            if let Err(e) = descriptor.close() {
                warn!(error = %e, "close on drop failed");
            }
        }
        if let Some(mut child) = self.child.take() {
            let pid = child.id();
            match child.wait() {
                Ok(status) if status.is_success() => debug!(pid, %status, "reaped child on drop"),
                Ok(status) => warn!(pid, %status, "child process exited unsuccessfully"),
                Err(e) => warn!(pid, error = %e, "could not reap child on drop"),
            }
        }
    }
}

impl<D: Descriptor> fmt::Debug for BufferedStream<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BufferedStream")
            .field("mode", &self.mode)
            .field("block_size", &self.block_size)
            .field("pushback", &self.pushback)
            .field("cursor", &self.cursor)
            .field("available", &self.available)
            .field("eof", &self.eof)
            .field("child", &self.child_id())
            .finish()
    }
}

impl<D: Descriptor> Read for BufferedStream<D> {
    fn read(&mut self, out: &mut [u8]) -> io::Result<usize> {
        if out.is_empty() {
            return Ok(0);
        }
        let Some(first) = self.read_byte()? else {
            return Ok(0);
        };
        out[0] = first;
        let buffered = self.buffered();
        let n = buffered.len().min(out.len() - 1);
        out[1..1 + n].copy_from_slice(&buffered[..n]);
        self.consume(n);
        Ok(1 + n)
    }
}

impl<D: Descriptor> Write for BufferedStream<D> {
    /// Takes at most one window per call, so an error always means none of
    /// `buf` was buffered.
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.require_write()?;
        if buf.is_empty() {
            return Ok(0);
        }
        Ok(self.append_to_window(buf)?)
    }

    fn flush(&mut self) -> io::Result<()> {
        BufferedStream::flush(self).map_err(io::Error::from)
    }
}
