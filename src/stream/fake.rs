//! Scripted descriptors and children for exercising I/O edge cases without
//! touching the OS.

use super::{ChildHandle, Descriptor, ExitInfo};
use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::rc::Rc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Replays a fixed sequence of read results and records writes.
pub(crate) struct ScriptedDescriptor {
    reads: VecDeque<io::Result<Vec<u8>>>,
    write_limit: Option<usize>,
    block_size: usize,
    pub written: Rc<RefCell<Vec<u8>>>,
    pub read_calls: Rc<Cell<usize>>,
    pub write_calls: Rc<Cell<usize>>,
}

impl ScriptedDescriptor {
    pub fn new(block_size: usize) -> Self {
        Self {
            reads: VecDeque::new(),
            write_limit: None,
            block_size,
            written: Rc::new(RefCell::new(Vec::new())),
            read_calls: Rc::new(Cell::new(0)),
            write_calls: Rc::new(Cell::new(0)),
        }
    }

    /// Queue one raw read returning exactly `chunk` (or less if the window is smaller).
    pub fn then_read(mut self, chunk: &[u8]) -> Self {
        self.reads.push_back(Ok(chunk.to_vec()));
        self
    }

    /// Queue one raw read that fails.
    pub fn then_fail(mut self, kind: io::ErrorKind) -> Self {
        self.reads
            .push_back(Err(io::Error::new(kind, "scripted failure")));
        self
    }

    /// Accept at most `limit` bytes per write call.
    pub fn with_write_limit(mut self, limit: usize) -> Self {
        self.write_limit = Some(limit);
        self
    }
}

impl Read for ScriptedDescriptor {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.read_calls.set(self.read_calls.get() + 1);
        match self.reads.pop_front() {
            None => Ok(0),
            Some(Err(e)) => Err(e),
            Some(Ok(chunk)) => {
                let n = chunk.len().min(buf.len());
                buf[..n].copy_from_slice(&chunk[..n]);
                if n < chunk.len() {
                    self.reads.push_front(Ok(chunk[n..].to_vec()));
                }
                Ok(n)
            }
        }
    }
}

impl Write for ScriptedDescriptor {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.write_calls.set(self.write_calls.get() + 1);
        let n = self.write_limit.map_or(buf.len(), |limit| limit.min(buf.len()));
        self.written.borrow_mut().extend_from_slice(&buf[..n]);
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Descriptor for ScriptedDescriptor {
    fn preferred_block_size(&self) -> io::Result<usize> {
        Ok(self.block_size)
    }

    fn is_pipe(&self) -> io::Result<bool> {
        Ok(false)
    }
}

/// Descriptor whose metadata lookup fails, like a stale fd.
pub(crate) struct BadDescriptor;

impl Read for BadDescriptor {
    fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
        Err(io::Error::from_raw_os_error(libc::EBADF))
    }
}

impl Write for BadDescriptor {
    fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
        Err(io::Error::from_raw_os_error(libc::EBADF))
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Descriptor for BadDescriptor {
    fn preferred_block_size(&self) -> io::Result<usize> {
        Err(io::Error::from_raw_os_error(libc::EBADF))
    }

    fn is_pipe(&self) -> io::Result<bool> {
        Err(io::Error::from_raw_os_error(libc::EBADF))
    }
}

/// Child that exits with a fixed code and counts how often it was waited on.
#[derive(Debug, Default)]
pub(crate) struct RecordingChild {
    pub exit_code: i32,
    pub waits: Arc<AtomicUsize>,
}

impl RecordingChild {
    pub fn exiting_with(exit_code: i32) -> Self {
        Self {
            exit_code,
            waits: Arc::new(AtomicUsize::new(0)),
        }
    }
}

impl ChildHandle for RecordingChild {
    fn id(&self) -> u32 {
        4242
    }

    fn wait(&mut self) -> io::Result<ExitInfo> {
        self.waits.fetch_add(1, Ordering::SeqCst);
        Ok(ExitInfo::from_code(self.exit_code))
    }
}
