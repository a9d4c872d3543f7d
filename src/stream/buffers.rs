//! Buffer size constants for streams.
//!
//! Most of these are defaults behind [`StreamConfig`](crate::config::StreamConfig);
//! only the line buffer size is used by the engine directly.

/// Default pushback region (64 bytes).
/// Enough lookahead for field tokenizers and record sniffers.
pub const DEFAULT_PUSHBACK_CAPACITY: usize = 64;

/// Block size used when a descriptor reports no preferred size (4 KB).
pub const DEFAULT_FALLBACK_BLOCK_SIZE: usize = 4096;

/// Longest shell command built for a codec pipeline (4 KB).
pub const DEFAULT_MAX_COMMAND_LEN: usize = 4096;

/// Initial capacity for growable line reads (1 KB).
/// Doubled whenever a line outgrows it.
pub const DEFAULT_LINE_BUFFER: usize = 1024;
