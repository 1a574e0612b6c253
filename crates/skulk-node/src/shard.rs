//! Shard capability consumed by the flush coordinator.

use crate::error::Result;
use crate::time::Timestamp;

/// A horizontal partition of the keyspace that can persist its blocks.
///
/// Implementations own the on-disk block format. The coordinator calls
/// [`flush_to_disk`](DatabaseShard::flush_to_disk) at most once per block
/// per flush cycle, from any thread, and never again for a block after it
/// has succeeded on every shard.
pub trait DatabaseShard: Send + Sync {
    /// Returns the shard number.
    fn shard_num(&self) -> u32;

    /// Persists the block starting at `block_start` to durable storage.
    fn flush_to_disk(&self, block_start: Timestamp) -> Result<()>;

    /// Loads the shard's initial data before flushing may begin.
    fn bootstrap(&self) -> Result<()> {
        Ok(())
    }
}
