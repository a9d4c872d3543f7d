//! Block-buffered byte streams.
//!
//! This module provides the engine behind every open file:
//! - [`BufferedStream`]: block-sized refills and flushes with a bounded
//!   pushback region in front of the active window
//! - Line and formatted-output helpers layered on byte get/put
//! - Child-process streams that read a command's stdout or feed its stdin
//!
//! A stream is owned by a single caller; nothing here spawns threads or
//! synchronizes.

pub mod buffered;
pub mod buffers;
pub mod child;
pub mod descriptor;
pub mod text;

#[cfg(test)]
pub(crate) mod fake;

use std::fmt;

pub use buffered::BufferedStream;
pub use child::{ChildHandle, ExitInfo, PipeSpawner, ShellSpawner};
pub use descriptor::Descriptor;
pub use text::{LineEnding, Lines};

/// How a stream was opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mode {
    /// Read only.
    Read,
    /// Write only, truncating an existing file.
    Write,
    /// Write only, appending to an existing file.
    Append,
}

impl Mode {
    #[inline]
    pub fn is_write(self) -> bool {
        !matches!(self, Mode::Read)
    }

    /// Which end of a pipe a child-backed stream holds.
    #[inline]
    pub fn direction(self) -> Direction {
        match self {
            Mode::Read => Direction::Read,
            Mode::Write | Mode::Append => Direction::Write,
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Read => write!(f, "read"),
            Mode::Write => write!(f, "write"),
            Mode::Append => write!(f, "append"),
        }
    }
}

/// Data flow between the parent and a spawned child.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Parent reads the child's standard output.
    Read,
    /// Parent writes the child's standard input.
    Write,
}
