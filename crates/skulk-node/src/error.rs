//! Error and Result types for Skulk storage node operations.

use crate::time::Timestamp;
use thiserror::Error;

/// A convenience `Result` type for storage node operations.
pub type Result<T> = std::result::Result<T, NodeError>;

/// The error type for storage node operations.
#[derive(Debug, Error)]
pub enum NodeError {
    /// Database options failed validation.
    #[error("Invalid options: {0}")]
    InvalidOptions(String),

    /// A shard failed to persist a block to disk.
    #[error("Flush failed for shard {shard} at block {block_start}: {reason}")]
    ShardFlush {
        /// Shard number reporting the failure.
        shard: u32,
        /// Start timestamp of the block being flushed.
        block_start: Timestamp,
        /// Description of the underlying failure.
        reason: String,
    },

    /// A shard failed to bootstrap.
    #[error("Bootstrap failed for shard {shard}: {reason}")]
    ShardBootstrap {
        /// Shard number reporting the failure.
        shard: u32,
        /// Description of the underlying failure.
        reason: String,
    },

    /// Bootstrap was requested while another bootstrap is running.
    #[error("Database is already bootstrapping")]
    BootstrapInProgress,

    /// The database was created without any shards.
    #[error("No shards configured")]
    NoShardsConfigured,

    /// Failed to build the shard flush thread pool.
    #[error("Failed to build flush thread pool: {0}")]
    ThreadPoolBuild(#[from] rayon::ThreadPoolBuildError),
}
