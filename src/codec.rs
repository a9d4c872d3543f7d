//! Opening files through external compressors.
//!
//! [`CodecDispatcher`] looks at a filename's extension and either opens the
//! file directly or starts the matching archiver in streaming mode:
//!
//! | extension | read          | write / append        |
//! |-----------|---------------|-----------------------|
//! | `.gz`     | `zcat` (`gzcat` on macOS) | `gzip -c`  |
//! | `.bz2`    | `bzcat`       | `bzip2 -c`            |
//! | `.xz`     | `xzcat`       | `xz -c`               |
//!
//! Every other extension opens the file directly. A name with no extension
//! at all is rejected; open those with [`BufferedStream::open_path`].

use crate::config::StreamConfig;
use crate::error::{Result, StreamError};
use crate::stream::{BufferedStream, Descriptor, ExitInfo, Mode, PipeSpawner, ShellSpawner};
use std::fmt;
use std::fs::File;
use std::io;
use std::path::Path;
use std::str::FromStr;
use tracing::debug;

/// A compression format handled by an external program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Codec {
    Gzip,
    Bzip2,
    Xz,
}

impl Codec {
    pub const ALL: [Codec; 3] = [Codec::Gzip, Codec::Bzip2, Codec::Xz];

    /// Filename extension, without the dot.
    pub fn extension(self) -> &'static str {
        match self {
            Codec::Gzip => "gz",
            Codec::Bzip2 => "bz2",
            Codec::Xz => "xz",
        }
    }

    pub fn from_extension(extension: &str) -> Option<Codec> {
        Self::ALL
            .into_iter()
            .find(|codec| codec.extension() == extension)
    }

    /// The codec implied by `path`, or `None` for a file opened directly.
    pub fn from_path(path: &Path) -> Result<Option<Codec>> {
        let extension = path
            .extension()
            .ok_or_else(|| StreamError::NoExtension(path.to_path_buf()))?;
        Ok(extension.to_str().and_then(Codec::from_extension))
    }

    /// Decompress-to-stdout program.
    pub fn reader_program(self) -> &'static str {
        match self {
            // Big Sur's zcat only handles .Z files.
            Codec::Gzip if cfg!(target_os = "macos") => "gzcat",
            Codec::Gzip => "zcat",
            Codec::Bzip2 => "bzcat",
            Codec::Xz => "xzcat",
        }
    }

    /// Compress-stdin-to-stdout program.
    pub fn writer_program(self) -> &'static str {
        match self {
            Codec::Gzip => "gzip -c",
            Codec::Bzip2 => "bzip2 -c",
            Codec::Xz => "xz -c",
        }
    }

    /// Shell command streaming `path` through this codec.
    ///
    /// Fails with `CommandTooLong` rather than truncating when the command
    /// would exceed `max_len` characters.
    pub fn command(self, path: &Path, mode: Mode, max_len: usize) -> Result<String> {
        let name = path.to_str().ok_or_else(|| {
            StreamError::descriptor(
                format!("building {} command", self),
                io::Error::new(io::ErrorKind::InvalidInput, "path is not valid UTF-8"),
            )
        })?;
        let quoted = shell_quote(name);
        let command = match mode {
            Mode::Read => format!("{} {}", self.reader_program(), quoted),
            Mode::Write => format!("{} > {}", self.writer_program(), quoted),
            Mode::Append => format!("{} >> {}", self.writer_program(), quoted),
        };
        if command.len() > max_len {
            return Err(StreamError::CommandTooLong {
                len: command.len(),
                max: max_len,
            });
        }
        Ok(command)
    }
}

impl fmt::Display for Codec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for Codec {
    type Err = StreamError;

    /// Accepts an extension with or without the dot, or the format name.
    fn from_str(s: &str) -> Result<Self> {
        match s.trim_start_matches('.').to_ascii_lowercase().as_str() {
            "gz" | "gzip" => Ok(Codec::Gzip),
            "bz2" | "bzip2" => Ok(Codec::Bzip2),
            "xz" => Ok(Codec::Xz),
            _ => Err(StreamError::UnrecognizedExtension(s.to_string())),
        }
    }
}

/// Wrap `s` in single quotes for `/bin/sh`.
fn shell_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', r"'\''"))
}

/// Opens files directly or through a codec pipeline, and closes them the
/// matching way.
#[derive(Debug)]
pub struct CodecDispatcher {
    config: StreamConfig,
    spawner: Box<dyn PipeSpawner>,
}

impl Default for CodecDispatcher {
    fn default() -> Self {
        Self::new(StreamConfig::default())
    }
}

impl CodecDispatcher {
    pub fn new(config: StreamConfig) -> Self {
        Self::with_spawner(config, Box::new(ShellSpawner::new()))
    }

    pub fn with_spawner(config: StreamConfig, spawner: Box<dyn PipeSpawner>) -> Self {
        Self { config, spawner }
    }

    pub fn config(&self) -> &StreamConfig {
        &self.config
    }

    /// Open `path`, decompressing on read or compressing on write when its
    /// extension names a codec.
    pub fn open<P: AsRef<Path>>(&self, path: P, mode: Mode) -> Result<BufferedStream<File>> {
        let path = path.as_ref();
        match Codec::from_path(path)? {
            Some(codec) => {
                let command = codec.command(path, mode, self.config.max_command_len)?;
                debug!(%codec, %mode, command, "opening through codec");
                BufferedStream::spawn_with(self.spawner.as_ref(), &command, mode, &self.config)
            }
            None => {
                debug!(path = %path.display(), %mode, "opening directly");
                BufferedStream::open_path(path, mode, &self.config)
            }
        }
    }

    /// Close a stream opened by [`open`](Self::open).
    pub fn close<D: Descriptor>(&self, stream: BufferedStream<D>) -> Result<ExitInfo> {
        close(stream)
    }
}

/// Open `path` with the default configuration. See [`CodecDispatcher::open`].
pub fn open<P: AsRef<Path>>(path: P, mode: Mode) -> Result<BufferedStream<File>> {
    CodecDispatcher::default().open(path, mode)
}

/// Close any stream, waiting for its child if one is attached.
///
/// The attached child, not the descriptor type, decides the path: a FIFO or
/// an inherited pipe opened directly has no child to reap.
pub fn close<D: Descriptor>(stream: BufferedStream<D>) -> Result<ExitInfo> {
    debug!(pipe = stream.is_pipe().unwrap_or(false), child = ?stream.child_id(), "closing");
    if stream.has_child() {
        stream.close_child()
    } else {
        stream.close()
    }
}
