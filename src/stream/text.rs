//! Line input and formatted output on top of byte get/put.

use super::buffers::DEFAULT_LINE_BUFFER;
use super::{BufferedStream, Descriptor};
use crate::error::{Result, StreamError};
use memchr::memchr;
use std::fmt;

/// What ended a growable line read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineEnding {
    Newline,
    EndOfStream,
}

impl<D: Descriptor> BufferedStream<D> {
    /// Read a line of at most `max_len - 1` bytes, without the newline.
    ///
    /// Returns `None` only when end of stream is hit before any byte is read,
    /// so a trailing newline does not produce an extra empty line. A line
    /// longer than the limit is returned in pieces.
    pub fn read_line(&mut self, max_len: usize) -> Result<Option<Vec<u8>>> {
        let mut line = Vec::new();
        Ok(self.read_line_into(&mut line, max_len)?.map(|_| line))
    }

    /// [`read_line`](Self::read_line) into a caller-owned buffer.
    ///
    /// The buffer is cleared first; the returned count is its new length.
    /// `max_len` below 2 is rejected with `LineLimitTooSmall`, since such a
    /// read could never make progress.
    pub fn read_line_into(&mut self, line: &mut Vec<u8>, max_len: usize) -> Result<Option<usize>> {
        if max_len < 2 {
            return Err(StreamError::LineLimitTooSmall { max_len });
        }
        line.clear();
        let limit = max_len - 1;
        while line.len() < limit {
            match self.read_byte()? {
                Some(b'\n') => return Ok(Some(line.len())),
                Some(byte) => line.push(byte),
                None if line.is_empty() => return Ok(None),
                None => break,
            }
        }
        Ok(Some(line.len()))
    }

    /// Read a whole line of any length into `line`, without the newline.
    ///
    /// The buffer is cleared first and its capacity doubled whenever the line
    /// outgrows it. `EndOfStream` with an empty buffer means there was
    /// nothing left to read.
    pub fn read_line_growable(&mut self, line: &mut Vec<u8>) -> Result<LineEnding> {
        line.clear();
        if line.capacity() == 0 {
            line.reserve_exact(DEFAULT_LINE_BUFFER);
        }
        loop {
            let byte = match self.read_byte()? {
                Some(b'\n') => return Ok(LineEnding::Newline),
                Some(byte) => byte,
                None => return Ok(LineEnding::EndOfStream),
            };
            push_doubling(line, &[byte]);

            // Take the rest of the window in one scan.
            let buffered = self.buffered();
            match memchr(b'\n', buffered) {
                Some(pos) => {
                    push_doubling(line, &buffered[..pos]);
                    self.consume(pos + 1);
                    return Ok(LineEnding::Newline);
                }
                None => {
                    let n = buffered.len();
                    push_doubling(line, buffered);
                    self.consume(n);
                }
            }
        }
    }

    /// Iterate over lines of any length.
    pub fn lines(&mut self) -> Lines<'_, D> {
        Lines {
            stream: self,
            done: false,
        }
    }

    /// Write a string.
    pub fn write_string(&mut self, s: &str) -> Result<()> {
        self.write_bytes(s.as_bytes())
    }

    /// Render `args` and write the result, returning the number of bytes.
    ///
    /// Use as `stream.write_formatted(format_args!("{}\t{}\n", a, b))`.
    pub fn write_formatted(&mut self, args: fmt::Arguments<'_>) -> Result<usize> {
        let rendered = fmt::format(args);
        self.write_bytes(rendered.as_bytes())?;
        Ok(rendered.len())
    }
}

/// Grow `line` by doubling its capacity until `bytes` fits, then append.
#[inline]
fn push_doubling(line: &mut Vec<u8>, bytes: &[u8]) {
    while line.capacity() - line.len() < bytes.len() {
        let grow = line.capacity().max(DEFAULT_LINE_BUFFER);
        line.reserve_exact(grow);
    }
    line.extend_from_slice(bytes);
}

/// Iterator returned by [`BufferedStream::lines`].
pub struct Lines<'a, D: Descriptor> {
    stream: &'a mut BufferedStream<D>,
    done: bool,
}

impl<D: Descriptor> Iterator for Lines<'_, D> {
    type Item = Result<Vec<u8>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let mut line = Vec::new();
        match self.stream.read_line_growable(&mut line) {
            Ok(LineEnding::Newline) => Some(Ok(line)),
            Ok(LineEnding::EndOfStream) => {
                self.done = true;
                (!line.is_empty()).then_some(Ok(line))
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}
