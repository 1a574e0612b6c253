//! Storage node database: shards, bootstrap state, and the flush entry points.
//!
//! The [`Database`] owns the shard set and drives block flushes on behalf of
//! an external periodic driver:
//!
//! ```rust,ignore
//! use alopex_skulk_node::{Database, DatabaseOptions};
//!
//! let db = Database::new(shards, DatabaseOptions::default())?;
//! db.bootstrap()?;
//!
//! // Called once per tick by the node's scheduler.
//! db.tick();
//! ```

use std::sync::{Arc, RwLock};

use tracing::{debug, error};

use crate::error::{NodeError, Result};
use crate::lifecycle::flush::{FlushCycleStatus, FlushManager, FlushStats};
use crate::lifecycle::flush_state::FlushState;
use crate::lifecycle::retention::RetentionPolicy;
use crate::options::DatabaseOptions;
use crate::shard::DatabaseShard;
use crate::time::{Clock, Ranges, SystemClock, Timestamp};

/// Bootstrap progress of the database.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootstrapState {
    /// Bootstrap has not run or failed.
    NotBootstrapped,
    /// Shards are loading their initial data.
    Bootstrapping,
    /// All shards are loaded; flushing may begin.
    Bootstrapped,
}

/// A set of shards whose blocks are periodically flushed to disk.
pub struct Database {
    shards: Vec<Arc<dyn DatabaseShard>>,
    options: DatabaseOptions,
    clock: Arc<dyn Clock>,
    bootstrap_state: RwLock<BootstrapState>,
    flush: FlushManager,
}

impl Database {
    /// Creates a database over `shards`.
    ///
    /// # Errors
    ///
    /// Returns an error if no shards are given, the options are invalid, or
    /// the flush thread pool cannot be built.
    pub fn new(shards: Vec<Arc<dyn DatabaseShard>>, options: DatabaseOptions) -> Result<Self> {
        if shards.is_empty() {
            return Err(NodeError::NoShardsConfigured);
        }
        let flush = FlushManager::new(options.clone())?;

        Ok(Self {
            shards,
            options,
            clock: Arc::new(SystemClock),
            bootstrap_state: RwLock::new(BootstrapState::NotBootstrapped),
            flush,
        })
    }

    /// Replaces the wall clock used by [`tick`](Database::tick).
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Replaces the retention policy derived from the options.
    pub fn with_retention_policy(mut self, policy: Arc<dyn RetentionPolicy>) -> Self {
        self.flush = self.flush.with_retention_policy(policy);
        self
    }

    /// Returns the options.
    pub fn options(&self) -> &DatabaseOptions {
        &self.options
    }

    /// Returns the number of shards.
    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }

    /// Returns the bootstrap state.
    pub fn bootstrap_state(&self) -> BootstrapState {
        *self
            .bootstrap_state
            .read()
            .unwrap_or_else(|err| err.into_inner())
    }

    /// Returns true once every shard has bootstrapped.
    pub fn is_bootstrapped(&self) -> bool {
        self.bootstrap_state() == BootstrapState::Bootstrapped
    }

    fn set_bootstrap_state(&self, state: BootstrapState) {
        *self
            .bootstrap_state
            .write()
            .unwrap_or_else(|err| err.into_inner()) = state;
    }

    /// Bootstraps every shard, enabling flushes on success.
    ///
    /// Bootstrapping an already bootstrapped database does nothing.
    ///
    /// # Errors
    ///
    /// Returns [`NodeError::BootstrapInProgress`] if another bootstrap is
    /// running, or [`NodeError::ShardBootstrap`] if a shard fails, in which
    /// case the database returns to [`BootstrapState::NotBootstrapped`].
    pub fn bootstrap(&self) -> Result<()> {
        {
            let mut state = self
                .bootstrap_state
                .write()
                .unwrap_or_else(|err| err.into_inner());
            match *state {
                BootstrapState::Bootstrapped => return Ok(()),
                BootstrapState::Bootstrapping => return Err(NodeError::BootstrapInProgress),
                BootstrapState::NotBootstrapped => *state = BootstrapState::Bootstrapping,
            }
        }

        let result = self.shards.iter().try_for_each(|shard| {
            shard.bootstrap().map_err(|err| NodeError::ShardBootstrap {
                shard: shard.shard_num(),
                reason: err.to_string(),
            })
        });

        match &result {
            Ok(()) => {
                self.set_bootstrap_state(BootstrapState::Bootstrapped);
                debug!("Bootstrapped {} shards", self.shards.len());
            }
            Err(err) => {
                self.set_bootstrap_state(BootstrapState::NotBootstrapped);
                error!("Bootstrap failed: {:?}", err);
            }
        }
        result
    }

    /// Returns true if a flush cycle may start: the database is bootstrapped
    /// and no cycle is running.
    pub fn need_disk_flush(&self, _now: Timestamp) -> bool {
        self.is_bootstrapped() && self.flush.status() == FlushCycleStatus::Idle
    }

    /// Returns the most recent block start safe to flush at `tick`.
    pub fn first_block_start(&self, tick: Timestamp) -> Timestamp {
        self.flush.first_block_start(tick)
    }

    /// Returns and reserves the blocks to flush at `tick`, most recent first.
    pub fn times_to_flush(&self, tick: Timestamp) -> Vec<Timestamp> {
        self.flush.times_to_flush(tick)
    }

    /// Flushes `block_start` on every shard; true if all succeeded.
    pub fn flush_to_disk_with_time(&self, block_start: Timestamp) -> bool {
        self.flush.flush_block(&self.shards, block_start)
    }

    /// Runs a flush cycle for `tick`.
    ///
    /// Unless `forced`, nothing happens before bootstrap completes or while
    /// another cycle is running. Shard failures are recorded per block and
    /// retried on later ticks up to the configured limit.
    pub fn flush_to_disk(&self, tick: Timestamp, forced: bool) {
        if !forced && !self.is_bootstrapped() {
            self.flush.stats().record_skip();
            debug!("Skipping flush at {}: database not bootstrapped", tick);
            return;
        }
        self.flush.run(&self.shards, tick, forced);
    }

    /// Runs an unforced flush cycle at the clock's current time.
    pub fn tick(&self) {
        self.flush_to_disk(self.clock.now(), false);
    }

    /// Returns true if the block starting at `block_start` can still receive
    /// writes at `now`.
    pub fn is_block_mutable(&self, block_start: Timestamp, now: Timestamp) -> bool {
        let window = self.options.write_window(now);
        let block_end = block_start.saturating_add(self.options.block_size_nanos());
        block_start <= window.end && block_end > window.start
    }

    /// Returns the current flush cycle status.
    pub fn flush_status(&self) -> FlushCycleStatus {
        self.flush.status()
    }

    /// Returns the recorded flush state of a block.
    pub fn flush_state(&self, block_start: Timestamp) -> Option<FlushState> {
        self.flush.flush_state(block_start)
    }

    /// Returns blocks that exhausted their flush retries.
    pub fn exhausted_blocks(&self) -> Vec<Timestamp> {
        self.flush.exhausted_blocks()
    }

    /// Returns the time covered by successfully flushed blocks.
    pub fn flushed_ranges(&self) -> Ranges {
        self.flush.flushed_ranges()
    }

    /// Returns retained, flushable time at `tick` that is not yet flushed.
    pub fn unflushed_ranges(&self, tick: Timestamp) -> Ranges {
        self.flush.unflushed_ranges(tick)
    }

    /// Returns the flush counters.
    pub fn flush_stats(&self) -> &FlushStats {
        self.flush.stats()
    }
}
