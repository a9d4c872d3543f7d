//! Error type shared by every stream operation.

use crate::stream::{ExitInfo, Mode};
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while opening, using or closing a stream.
#[derive(Error, Debug)]
pub enum StreamError {
    #[error("Could not allocate a {size}-byte stream buffer")]
    Allocation { size: usize },

    #[error("Descriptor error ({context}): {source}")]
    Descriptor {
        context: String,
        #[source]
        source: io::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A raw write transferred fewer bytes than requested. Not retried.
    #[error("Short write: {written} of {expected} bytes transferred")]
    ShortWrite { expected: usize, written: usize },

    #[error("Pushback capacity of {capacity} bytes exceeded")]
    PushbackExceeded { capacity: usize },

    /// A bounded line read needs room for at least one byte.
    #[error("Line limit of {max_len} leaves no room for data (minimum is 2)")]
    LineLimitTooSmall { max_len: usize },

    #[error("No filename extension on {}", .0.display())]
    NoExtension(PathBuf),

    #[error("Unrecognized compression extension: '{0}'")]
    UnrecognizedExtension(String),

    #[error("Stream has no attached child process")]
    NotAChildStream,

    #[error("Could not spawn child process for '{command}': {source}")]
    ChildSpawn {
        command: String,
        #[source]
        source: io::Error,
    },

    #[error("Child process failed: {0}")]
    ChildFailed(ExitInfo),

    #[error("Command is {len} characters, limit is {max}")]
    CommandTooLong { len: usize, max: usize },

    #[error("Stream is open for {found}, operation requires {expected}")]
    WrongMode { expected: Mode, found: Mode },

    #[error("Invalid stream configuration: {0}")]
    InvalidConfig(String),
}

impl StreamError {
    /// Wrap an open/stat failure with a description of what was being done.
    pub(crate) fn descriptor(context: impl Into<String>, source: io::Error) -> Self {
        StreamError::Descriptor {
            context: context.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, StreamError>;

impl From<StreamError> for io::Error {
    fn from(err: StreamError) -> Self {
        match err {
            StreamError::Io(e) => e,
            StreamError::ShortWrite { .. } => io::Error::new(io::ErrorKind::WriteZero, err),
            other => io::Error::other(other),
        }
    }
}
