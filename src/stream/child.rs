//! Streams backed by a child process.
//!
//! A read-mode stream holds the read end of a pipe connected to a shell
//! command's standard output; a write-mode stream holds the write end of a
//! pipe feeding its standard input. Process creation sits behind
//! [`PipeSpawner`] so the stream itself never forks.
//!
//! Closing is always flush, then close the pipe, then wait. Waiting first
//! would deadlock against a child still blocked on the undrained pipe.

use super::{BufferedStream, Direction, Mode};
use crate::config::StreamConfig;
use crate::error::{Result, StreamError};
use std::fmt;
use std::fs::File;
use std::io;
use std::ops::RangeInclusive;
use std::os::fd::OwnedFd;
use std::os::unix::process::{CommandExt, ExitStatusExt};
use std::path::PathBuf;
use std::process::{Child, Command, ExitStatus, Stdio};
use tracing::debug;

/// Exit codes a POSIX shell reserves for "found but not executable" (126)
/// and "not found" (127).
pub const EXEC_FAILED_CODES: RangeInclusive<i32> = 126..=127;

/// How a child process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitInfo {
    /// Exit code, if the process exited normally.
    pub code: Option<i32>,
    /// Terminating signal, if the process was killed.
    pub signal: Option<i32>,
    /// The shell could not exec the requested program.
    pub exec_failed: bool,
}

impl ExitInfo {
    /// Normal exit with code 0.
    pub fn success() -> Self {
        Self::from_code(0)
    }

    pub fn from_code(code: i32) -> Self {
        Self {
            code: Some(code),
            signal: None,
            exec_failed: EXEC_FAILED_CODES.contains(&code),
        }
    }

    pub fn from_signal(signal: i32) -> Self {
        Self {
            code: None,
            signal: Some(signal),
            exec_failed: false,
        }
    }

    #[inline]
    pub fn is_success(&self) -> bool {
        self.code == Some(0)
    }

    /// The classic `wait(2)` status word: signal number in the low 7 bits,
    /// exit code in bits 8..16.
    pub fn wait_status(&self) -> i32 {
        match (self.signal, self.code) {
            (Some(signal), _) => signal & 0x7f,
            (None, Some(code)) => (code & 0xff) << 8,
            (None, None) => 0,
        }
    }
}

impl From<ExitStatus> for ExitInfo {
    fn from(status: ExitStatus) -> Self {
        match (status.code(), status.signal()) {
            (Some(code), _) => Self::from_code(code),
            (None, Some(signal)) => Self::from_signal(signal),
            (None, None) => Self {
                code: None,
                signal: None,
                exec_failed: false,
            },
        }
    }
}

impl fmt::Display for ExitInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.signal, self.code) {
            (Some(signal), _) => write!(f, "killed by signal {}", signal),
            (None, Some(code)) if self.exec_failed => {
                write!(f, "command could not be executed (exit code {})", code)
            }
            (None, Some(code)) => write!(f, "exit code {}", code),
            (None, None) => write!(f, "unknown status"),
        }
    }
}

/// A running child process that a stream is responsible for reaping.
pub trait ChildHandle: fmt::Debug + Send {
    fn id(&self) -> u32;

    /// Block until the child terminates.
    fn wait(&mut self) -> io::Result<ExitInfo>;
}

impl ChildHandle for Child {
    fn id(&self) -> u32 {
        Child::id(self)
    }

    fn wait(&mut self) -> io::Result<ExitInfo> {
        Child::wait(self).map(ExitInfo::from)
    }
}

/// Starts a command with one end of a pipe connected to it.
pub trait PipeSpawner: fmt::Debug + Send + Sync {
    /// Run `command`, returning the parent's end of the pipe and the child.
    fn spawn_pipe(&self, command: &str, direction: Direction)
        -> Result<(File, Box<dyn ChildHandle>)>;
}

/// Runs commands through `/bin/sh -c`.
#[derive(Debug, Clone)]
pub struct ShellSpawner {
    shell: PathBuf,
}

impl Default for ShellSpawner {
    fn default() -> Self {
        Self::new()
    }
}

impl ShellSpawner {
    pub fn new() -> Self {
        Self {
            shell: PathBuf::from("/bin/sh"),
        }
    }

    /// Use a different POSIX shell.
    pub fn with_shell(shell: impl Into<PathBuf>) -> Self {
        Self {
            shell: shell.into(),
        }
    }
}

impl PipeSpawner for ShellSpawner {
    fn spawn_pipe(
        &self,
        command: &str,
        direction: Direction,
    ) -> Result<(File, Box<dyn ChildHandle>)> {
        let mut cmd = Command::new(&self.shell);
        cmd.arg("-c").arg(command);
        match direction {
            Direction::Read => cmd.stdout(Stdio::piped()),
            Direction::Write => cmd.stdin(Stdio::piped()),
        };
        // SAFETY: signal(2) is async-signal-safe, and nothing else runs
        // between fork and exec.
        unsafe {
            cmd.pre_exec(|| {
                libc::signal(libc::SIGINT, libc::SIG_DFL);
                Ok(())
            });
        }

        let mut child = cmd.spawn().map_err(|source| StreamError::ChildSpawn {
            command: command.to_string(),
            source,
        })?;

        let pipe: Option<OwnedFd> = match direction {
            Direction::Read => child.stdout.take().map(OwnedFd::from),
            Direction::Write => child.stdin.take().map(OwnedFd::from),
        };
        let Some(pipe) = pipe else {
            let _ = child.kill();
            let _ = child.wait();
            return Err(StreamError::ChildSpawn {
                command: command.to_string(),
                source: io::Error::other("child pipe was not captured"),
            });
        };

        debug!(pid = child.id(), command, ?direction, "spawned child");
        Ok((File::from(pipe), Box::new(child)))
    }
}

impl BufferedStream<File> {
    /// Run `command` under `/bin/sh` and stream its output (read mode) or
    /// input (write or append mode).
    pub fn spawn(command: &str, mode: Mode, config: &StreamConfig) -> Result<Self> {
        Self::spawn_with(&ShellSpawner::new(), command, mode, config)
    }

    /// Like [`spawn`](Self::spawn), with a caller-supplied spawner.
    pub fn spawn_with(
        spawner: &dyn PipeSpawner,
        command: &str,
        mode: Mode,
        config: &StreamConfig,
    ) -> Result<Self> {
        let (pipe, mut child) = spawner.spawn_pipe(command, mode.direction())?;
        match BufferedStream::from_descriptor(pipe, mode, config) {
            Ok(mut stream) => {
                stream.attach_child(child);
                Ok(stream)
            }
            Err(e) => {
                // The pipe is already closed; don't leave a zombie behind.
                let _ = child.wait();
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_info_codes() {
        let ok = ExitInfo::success();
        assert!(ok.is_success());
        assert_eq!(ok.wait_status(), 0);

        let failed = ExitInfo::from_code(3);
        assert!(!failed.is_success());
        assert!(!failed.exec_failed);
        assert_eq!(failed.wait_status(), 3 << 8);
        assert_eq!(failed.to_string(), "exit code 3");

        let missing = ExitInfo::from_code(127);
        assert!(missing.exec_failed);
        assert_eq!(
            missing.to_string(),
            "command could not be executed (exit code 127)"
        );

        let killed = ExitInfo::from_signal(libc::SIGTERM);
        assert!(!killed.is_success());
        assert_eq!(killed.wait_status(), libc::SIGTERM);
        assert_eq!(killed.to_string(), format!("killed by signal {}", libc::SIGTERM));
    }

    #[test]
    fn test_exit_info_from_raw_status() {
        assert_eq!(ExitInfo::from(ExitStatus::from_raw(0)), ExitInfo::success());
        assert_eq!(ExitInfo::from(ExitStatus::from_raw(2 << 8)).code, Some(2));
        assert_eq!(
            ExitInfo::from(ExitStatus::from_raw(libc::SIGKILL)).signal,
            Some(libc::SIGKILL)
        );
    }

    #[test]
    fn test_spawn_read_hello() {
        let mut stream =
            BufferedStream::spawn("printf 'hello\\n'", Mode::Read, &StreamConfig::new()).unwrap();
        assert!(stream.has_child());
        assert!(stream.child_id().is_some());
        assert!(stream.is_pipe().unwrap());

        assert_eq!(stream.read_line(1024).unwrap(), Some(b"hello".to_vec()));
        assert_eq!(stream.read_line(1024).unwrap(), None);

        let status = stream.close_child().unwrap();
        assert!(status.is_success());
        assert_eq!(status.code, Some(0));
    }

    #[test]
    fn test_spawn_reports_exit_code() {
        let mut stream =
            BufferedStream::spawn("echo partial; exit 3", Mode::Read, &StreamConfig::new())
                .unwrap();
        assert_eq!(stream.read_line(1024).unwrap(), Some(b"partial".to_vec()));
        let status = stream.close_child().unwrap();
        assert_eq!(status.code, Some(3));
        assert!(!status.exec_failed);
    }

    #[test]
    fn test_spawn_missing_program() {
        let mut stream = BufferedStream::spawn(
            "definitely-not-a-real-program-4f1c 2>/dev/null",
            Mode::Read,
            &StreamConfig::new(),
        )
        .unwrap();
        assert_eq!(stream.read_byte().unwrap(), None);
        let status = stream.close_child().unwrap();
        assert_eq!(status.code, Some(127));
        assert!(status.exec_failed);
    }

    #[test]
    fn test_spawn_missing_shell() {
        let spawner = ShellSpawner::with_shell("/nonexistent/sh");
        let result =
            BufferedStream::spawn_with(&spawner, "true", Mode::Read, &StreamConfig::new());
        assert!(matches!(result, Err(StreamError::ChildSpawn { .. })));
    }

    #[test]
    fn test_spawn_write_feeds_stdin() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("out.txt");
        let command = format!("cat > '{}'", target.display());

        let mut stream = BufferedStream::spawn(&command, Mode::Write, &StreamConfig::new()).unwrap();
        // More than one pipe buffer's worth, so the child must drain while we write.
        let line = b"0123456789abcdef0123456789abcdef0123456789abcdef0123456789abcde\n";
        for _ in 0..4096 {
            stream.write_bytes(line).unwrap();
        }
        let status = stream.close_child().unwrap();
        assert!(status.is_success());

        let written = std::fs::read(&target).unwrap();
        assert_eq!(written.len(), line.len() * 4096);
        assert!(written.chunks(line.len()).all(|chunk| chunk == line));
    }

    #[test]
    fn test_drop_without_close_finishes_child() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("dropped.txt");
        let command = format!("cat > '{}'", target.display());

        let mut stream = BufferedStream::spawn(&command, Mode::Write, &StreamConfig::new()).unwrap();
        stream.write_bytes(b"flushed on drop\n").unwrap();
        drop(stream);

        // The child has been waited on, so its output file is complete.
        assert_eq!(std::fs::read(&target).unwrap(), b"flushed on drop\n");
    }
}
