//! Stream configuration.
//!
//! Every size the engine depends on is carried by [`StreamConfig`] and handed
//! to the constructors, so tests can shrink blocks to a handful of bytes and
//! callers can enlarge the pushback region for deeper lookahead.

use crate::error::{Result, StreamError};
use crate::stream::buffers::{
    DEFAULT_FALLBACK_BLOCK_SIZE, DEFAULT_MAX_COMMAND_LEN, DEFAULT_PUSHBACK_CAPACITY,
};

/// Sizes and policies applied to a stream when it is opened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamConfig {
    /// Number of bytes that can be pushed back with `unget_byte`.
    pub pushback_capacity: usize,
    /// Fixed block size. When `None` the descriptor's preferred I/O size is used.
    pub block_size: Option<usize>,
    /// Block size used when the descriptor reports a preferred size of zero.
    pub fallback_block_size: usize,
    /// Longest shell command the codec dispatcher will build.
    pub max_command_len: usize,
    /// Loop on partial writes instead of reporting them as errors.
    pub retry_short_writes: bool,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl StreamConfig {
    pub fn new() -> Self {
        Self {
            pushback_capacity: DEFAULT_PUSHBACK_CAPACITY,
            block_size: None,
            fallback_block_size: DEFAULT_FALLBACK_BLOCK_SIZE,
            max_command_len: DEFAULT_MAX_COMMAND_LEN,
            retry_short_writes: false,
        }
    }

    pub fn with_pushback_capacity(mut self, capacity: usize) -> Self {
        self.pushback_capacity = capacity;
        self
    }

    /// Force a block size instead of asking the filesystem.
    pub fn with_block_size(mut self, block_size: usize) -> Self {
        self.block_size = Some(block_size);
        self
    }

    pub fn with_fallback_block_size(mut self, block_size: usize) -> Self {
        self.fallback_block_size = block_size;
        self
    }

    pub fn with_max_command_len(mut self, max: usize) -> Self {
        self.max_command_len = max;
        self
    }

    pub fn with_retry_short_writes(mut self, retry: bool) -> Self {
        self.retry_short_writes = retry;
        self
    }

    /// Reject sizes the engine cannot work with.
    pub fn validate(&self) -> Result<()> {
        if self.block_size == Some(0) {
            return Err(StreamError::InvalidConfig(
                "block size must be greater than zero".to_string(),
            ));
        }
        if self.fallback_block_size == 0 {
            return Err(StreamError::InvalidConfig(
                "fallback block size must be greater than zero".to_string(),
            ));
        }
        if self.max_command_len == 0 {
            return Err(StreamError::InvalidConfig(
                "maximum command length must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Pick the block size for a descriptor reporting `preferred` bytes.
    #[inline]
    pub fn resolve_block_size(&self, preferred: usize) -> usize {
        match self.block_size {
            Some(size) => size,
            None if preferred == 0 => self.fallback_block_size,
            None => preferred,
        }
    }
}
