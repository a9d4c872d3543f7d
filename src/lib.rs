//! fastfile: block-buffered byte streams with pushback
//!
//! This library provides a small, fast I/O engine for line- and
//! byte-oriented parsers.
//!
//! # Features
//!
//! - **Block-sized I/O**: one syscall per filesystem block, no per-byte overhead
//! - **Bounded pushback**: `unget_byte` works across block boundaries
//! - **Child processes**: stream a shell command's output or feed its input
//! - **Transparent compression**: `.gz`, `.bz2` and `.xz` go through the
//!   system compressors
//!
//! # Example
//!
//! ```rust,no_run
//! use fastfile::{codec, Mode};
//!
//! let mut input = codec::open("peaks.bed.gz", Mode::Read).unwrap();
//! let mut output = codec::open("peaks.txt", Mode::Write).unwrap();
//!
//! while let Some(line) = input.read_line(4096).unwrap() {
//!     output.write_bytes(&line).unwrap();
//!     output.write_byte(b'\n').unwrap();
//! }
//!
//! codec::close(input).unwrap();
//! codec::close(output).unwrap();
//! ```

pub mod codec;
pub mod config;
pub mod error;
pub mod stream;

// Re-export commonly used types
pub use codec::{Codec, CodecDispatcher};
pub use config::StreamConfig;
pub use error::{Result, StreamError};
pub use stream::{BufferedStream, ExitInfo, LineEnding, Mode};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::codec::{self, Codec, CodecDispatcher};
    pub use crate::config::StreamConfig;
    pub use crate::error::{Result, StreamError};
    pub use crate::stream::{BufferedStream, Descriptor, ExitInfo, LineEnding, Mode};
}
