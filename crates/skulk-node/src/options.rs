//! Configuration for the storage node database.

use std::time::Duration;

use crate::error::{NodeError, Result};
use crate::time::{duration_nanos, Range, Timestamp};

/// Default block size: 2 hours.
pub const DEFAULT_BLOCK_SIZE: Duration = Duration::from_secs(2 * 60 * 60);

/// Default retention period: 2 days.
pub const DEFAULT_RETENTION_PERIOD: Duration = Duration::from_secs(2 * 24 * 60 * 60);

/// Default window after "now" in which writes are still accepted: 10 minutes.
pub const DEFAULT_BUFFER_FUTURE: Duration = Duration::from_secs(10 * 60);

/// Default window before "now" in which writes are still accepted: 10 minutes.
pub const DEFAULT_BUFFER_PAST: Duration = Duration::from_secs(10 * 60);

/// Default number of failed flush attempts before a block is abandoned.
pub const DEFAULT_MAX_FLUSH_RETRIES: u32 = 3;

/// Default number of shards flushed in parallel.
pub const DEFAULT_FLUSH_CONCURRENCY: usize = 4;

/// Configuration for a [`Database`](crate::database::Database).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseOptions {
    /// Duration of each block.
    ///
    /// Block starts are aligned to multiples of this duration since the
    /// epoch. Default: 2 hours.
    pub block_size: Duration,

    /// How long blocks remain flush candidates.
    ///
    /// Blocks starting before `now - retention_period` are never scheduled.
    /// Default: 2 days.
    pub retention_period: Duration,

    /// How far ahead of "now" writes are accepted. Default: 10 minutes.
    pub buffer_future: Duration,

    /// How far behind "now" writes are accepted.
    ///
    /// A block is not flushed until this window has moved past its end.
    /// Default: 10 minutes.
    pub buffer_past: Duration,

    /// Failed attempts after which a block is no longer retried. Default: 3.
    pub max_flush_retries: u32,

    /// Number of threads used to flush shards in parallel.
    ///
    /// A value of 1 flushes shards sequentially on the calling thread.
    /// Default: 4.
    pub flush_concurrency: usize,
}

impl Default for DatabaseOptions {
    fn default() -> Self {
        Self {
            block_size: DEFAULT_BLOCK_SIZE,
            retention_period: DEFAULT_RETENTION_PERIOD,
            buffer_future: DEFAULT_BUFFER_FUTURE,
            buffer_past: DEFAULT_BUFFER_PAST,
            max_flush_retries: DEFAULT_MAX_FLUSH_RETRIES,
            flush_concurrency: DEFAULT_FLUSH_CONCURRENCY,
        }
    }
}

impl DatabaseOptions {
    /// Sets the block size.
    pub fn with_block_size(mut self, block_size: Duration) -> Self {
        self.block_size = block_size;
        self
    }

    /// Sets the retention period.
    pub fn with_retention_period(mut self, retention_period: Duration) -> Self {
        self.retention_period = retention_period;
        self
    }

    /// Sets the future write buffer.
    pub fn with_buffer_future(mut self, buffer_future: Duration) -> Self {
        self.buffer_future = buffer_future;
        self
    }

    /// Sets the past write buffer.
    pub fn with_buffer_past(mut self, buffer_past: Duration) -> Self {
        self.buffer_past = buffer_past;
        self
    }

    /// Sets the maximum number of flush attempts per block.
    pub fn with_max_flush_retries(mut self, max_flush_retries: u32) -> Self {
        self.max_flush_retries = max_flush_retries;
        self
    }

    /// Sets the number of shards flushed in parallel.
    pub fn with_flush_concurrency(mut self, flush_concurrency: usize) -> Self {
        self.flush_concurrency = flush_concurrency;
        self
    }

    /// Returns the block size in nanoseconds.
    pub fn block_size_nanos(&self) -> i64 {
        duration_nanos(self.block_size)
    }

    /// Returns the window of timestamps that still accept writes at `now`.
    pub fn write_window(&self, now: Timestamp) -> Range {
        Range::new(
            now.saturating_sub(duration_nanos(self.buffer_past)),
            now.saturating_add(duration_nanos(self.buffer_future)),
        )
    }

    /// Checks that the options describe a usable configuration.
    ///
    /// # Errors
    ///
    /// Returns [`NodeError::InvalidOptions`] if the block size is zero, the
    /// retention period is shorter than one block, either buffer is at
    /// least one block long, or the flush concurrency is zero.
    pub fn validate(&self) -> Result<()> {
        if self.block_size.is_zero() {
            return Err(NodeError::InvalidOptions(
                "block size must be non-zero".to_string(),
            ));
        }
        if self.retention_period < self.block_size {
            return Err(NodeError::InvalidOptions(format!(
                "retention period {:?} is shorter than block size {:?}",
                self.retention_period, self.block_size
            )));
        }
        if self.buffer_past >= self.block_size || self.buffer_future >= self.block_size {
            return Err(NodeError::InvalidOptions(format!(
                "buffers ({:?} past, {:?} future) must be shorter than block size {:?}",
                self.buffer_past, self.buffer_future, self.block_size
            )));
        }
        if self.flush_concurrency == 0 {
            return Err(NodeError::InvalidOptions(
                "flush concurrency must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::from_secs;

    #[test]
    fn test_defaults_are_valid() {
        let options = DatabaseOptions::default();
        assert!(options.validate().is_ok());
        assert_eq!(options.block_size_nanos(), from_secs(7200));
        assert_eq!(options.max_flush_retries, 3);
    }

    #[test]
    fn test_builders() {
        let options = DatabaseOptions::default()
            .with_block_size(Duration::from_secs(3600))
            .with_retention_period(Duration::from_secs(86_400))
            .with_buffer_future(Duration::from_secs(60))
            .with_buffer_past(Duration::from_secs(120))
            .with_max_flush_retries(5)
            .with_flush_concurrency(1);
        assert_eq!(options.block_size, Duration::from_secs(3600));
        assert_eq!(options.retention_period, Duration::from_secs(86_400));
        assert_eq!(options.buffer_future, Duration::from_secs(60));
        assert_eq!(options.buffer_past, Duration::from_secs(120));
        assert_eq!(options.max_flush_retries, 5);
        assert_eq!(options.flush_concurrency, 1);
        assert!(options.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let cases = [
            DatabaseOptions::default().with_block_size(Duration::ZERO),
            DatabaseOptions::default().with_retention_period(Duration::from_secs(60)),
            DatabaseOptions::default().with_buffer_past(DEFAULT_BLOCK_SIZE),
            DatabaseOptions::default().with_buffer_future(DEFAULT_BLOCK_SIZE * 2),
            DatabaseOptions::default().with_flush_concurrency(0),
        ];
        for options in cases {
            assert!(matches!(
                options.validate(),
                Err(NodeError::InvalidOptions(_))
            ));
        }
    }

    #[test]
    fn test_write_window() {
        let options = DatabaseOptions::default();
        let window = options.write_window(from_secs(10_000));
        assert_eq!(window, Range::new(from_secs(9_400), from_secs(10_600)));
    }
}
