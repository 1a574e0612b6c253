//! Block flush coordination across shards.
//!
//! The [`FlushManager`] decides, on every tick, which block starts must be
//! persisted, reserves them, fans each block out to every shard, and records
//! the outcome.
//!
//! # Scheduling
//!
//! ```text
//! tick ──► single-flight gate ──► select + reserve candidates ──┐
//!                                  (most recent block first)    │
//!          ┌────────────────────────────────────────────────────┘
//!          ▼
//!   for each block:  shard 0 ┐
//!                    shard 1 ├─ in parallel, joined ──► Success | Failed(+1)
//!                    shard N ┘
//!          │
//!          ▼
//!   status back to Idle
//! ```
//!
//! A block is a candidate when it lies between the retention cutoff and the
//! most recent block whose write window has closed, and it is neither
//! reserved, already flushed, nor out of retries.
//!
//! # Locking
//!
//! The flush state table, cycle status, and flushed coverage share a single
//! mutex. It is held while candidates are selected and reserved and while a
//! block's outcome is recorded, never during shard I/O.
//!
//! A shard panic unwinds through the cycle. Blocks the cycle reserved but
//! had not yet recorded are then marked failed, so they are retried on a
//! later tick or reported once exhausted.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use tracing::{debug, error, warn};

use crate::error::{NodeError, Result};
use crate::lifecycle::flush_state::{FlushState, FlushStateTable};
use crate::lifecycle::retention::{DefaultRetentionPolicy, RetentionPolicy};
use crate::options::DatabaseOptions;
use crate::shard::DatabaseShard;
use crate::time::{align_timestamp, Range, Ranges, Timestamp};

/// Database-wide flush cycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushCycleStatus {
    /// No flush cycle is running.
    Idle,
    /// A flush cycle is running.
    InProgress,
}

/// Counters describing flush activity.
#[derive(Debug, Default)]
pub struct FlushStats {
    /// Flush cycles that ran.
    pub cycles_run: AtomicU64,
    /// Ticks skipped because the database was busy or not bootstrapped.
    pub cycles_skipped: AtomicU64,
    /// Blocks persisted by every shard.
    pub blocks_flushed: AtomicU64,
    /// Block attempts where at least one shard failed.
    pub block_failures: AtomicU64,
    /// Individual shard flush failures.
    pub shard_failures: AtomicU64,
    /// Blocks that ran out of retries.
    pub blocks_exhausted: AtomicU64,
}

impl FlushStats {
    /// Gets the number of flush cycles run.
    pub fn cycles_run(&self) -> u64 {
        self.cycles_run.load(Ordering::Relaxed)
    }

    /// Gets the number of skipped ticks.
    pub fn cycles_skipped(&self) -> u64 {
        self.cycles_skipped.load(Ordering::Relaxed)
    }

    /// Gets the number of successfully flushed blocks.
    pub fn blocks_flushed(&self) -> u64 {
        self.blocks_flushed.load(Ordering::Relaxed)
    }

    /// Gets the number of failed block attempts.
    pub fn block_failures(&self) -> u64 {
        self.block_failures.load(Ordering::Relaxed)
    }

    /// Gets the number of failed shard flushes.
    pub fn shard_failures(&self) -> u64 {
        self.shard_failures.load(Ordering::Relaxed)
    }

    /// Gets the number of blocks that ran out of retries.
    pub fn blocks_exhausted(&self) -> u64 {
        self.blocks_exhausted.load(Ordering::Relaxed)
    }

    /// Records a skipped tick.
    pub fn record_skip(&self) {
        self.cycles_skipped.fetch_add(1, Ordering::Relaxed);
    }
}

#[derive(Debug, Default)]
struct FlushBook {
    active_cycles: usize,
    states: FlushStateTable,
    flushed: Ranges,
}

/// Schedules and records block flushes for a set of shards.
pub struct FlushManager {
    options: DatabaseOptions,
    retention: Arc<dyn RetentionPolicy>,
    book: Mutex<FlushBook>,
    stats: FlushStats,
    thread_pool: Option<Arc<ThreadPool>>,
}

impl FlushManager {
    /// Creates a flush manager for the given options.
    ///
    /// # Errors
    ///
    /// Returns an error if the options are invalid or the flush thread pool
    /// cannot be built.
    pub fn new(options: DatabaseOptions) -> Result<Self> {
        options.validate()?;

        let thread_pool = if options.flush_concurrency > 1 {
            let pool = ThreadPoolBuilder::new()
                .num_threads(options.flush_concurrency)
                .thread_name(|index| format!("skulk-flush-{}", index))
                .build()?;
            Some(Arc::new(pool))
        } else {
            None
        };

        Ok(Self {
            retention: Arc::new(DefaultRetentionPolicy::new(options.retention_period)),
            options,
            book: Mutex::new(FlushBook::default()),
            stats: FlushStats::default(),
            thread_pool,
        })
    }

    /// Replaces the retention policy derived from the options.
    pub fn with_retention_policy(mut self, policy: Arc<dyn RetentionPolicy>) -> Self {
        self.retention = policy;
        self
    }

    /// Returns the options.
    pub fn options(&self) -> &DatabaseOptions {
        &self.options
    }

    /// Returns the flush counters.
    pub fn stats(&self) -> &FlushStats {
        &self.stats
    }

    fn book(&self) -> MutexGuard<'_, FlushBook> {
        self.book.lock().unwrap_or_else(|err| err.into_inner())
    }

    /// Returns the current cycle status.
    pub fn status(&self) -> FlushCycleStatus {
        if self.book().active_cycles == 0 {
            FlushCycleStatus::Idle
        } else {
            FlushCycleStatus::InProgress
        }
    }

    /// Returns the recorded state of a block, if it was ever scheduled.
    pub fn flush_state(&self, block_start: Timestamp) -> Option<FlushState> {
        self.book().states.get(block_start)
    }

    /// Returns block starts that will no longer be retried.
    pub fn exhausted_blocks(&self) -> Vec<Timestamp> {
        self.book().states.exhausted(self.options.max_flush_retries)
    }

    /// Returns the time covered by successfully flushed blocks.
    pub fn flushed_ranges(&self) -> Ranges {
        self.book().flushed.clone()
    }

    #[cfg(test)]
    pub(crate) fn set_flush_state(&self, block_start: Timestamp, state: FlushState) {
        self.book().states.set(block_start, state);
    }

    #[cfg(test)]
    pub(crate) fn begin_cycle_for_test(&self) {
        self.book().active_cycles += 1;
    }

    /// Returns the start of the most recent block whose write window has
    /// closed at `tick`, clamped to the epoch.
    ///
    /// This is the first block considered by a flush cycle; older blocks
    /// follow in descending order.
    pub fn first_block_start(&self, tick: Timestamp) -> Timestamp {
        align_timestamp(self.latest_flushable(tick), self.options.block_size_nanos()).max(0)
    }

    fn latest_flushable(&self, tick: Timestamp) -> Timestamp {
        self.options
            .write_window(tick)
            .start
            .saturating_sub(self.options.block_size_nanos())
    }

    /// Returns the eligible block starts at `tick`, most recent first, and
    /// reserves each of them.
    pub fn times_to_flush(&self, tick: Timestamp) -> Vec<Timestamp> {
        let mut book = self.book();
        self.reserve_candidates(&mut book.states, tick)
    }

    fn reserve_candidates(&self, states: &mut FlushStateTable, tick: Timestamp) -> Vec<Timestamp> {
        // Before the first block has closed nothing is flushable, even
        // though the aligned start clamps to the epoch.
        if self.latest_flushable(tick) < 0 {
            return Vec::new();
        }

        let block_size = self.options.block_size_nanos();
        let max_retries = self.options.max_flush_retries;

        let mut times = Vec::new();
        let mut block_start = self.first_block_start(tick);
        while block_start >= 0 && !self.retention.is_expired(block_start, tick) {
            if states.is_eligible(block_start, max_retries) {
                states.reserve(block_start);
                times.push(block_start);
            }
            block_start -= block_size;
        }
        times
    }

    /// Returns the flushable, retained time at `tick` not yet covered by a
    /// successful flush.
    pub fn unflushed_ranges(&self, tick: Timestamp) -> Ranges {
        if self.latest_flushable(tick) < 0 {
            return Ranges::new();
        }

        let block_size = self.options.block_size_nanos();
        let earliest = self.retention.earliest_retained(tick);
        let mut window_start = align_timestamp(earliest, block_size);
        if window_start < earliest {
            window_start += block_size;
        }
        let window_end = self.first_block_start(tick).saturating_add(block_size);
        if window_start >= window_end {
            return Ranges::new();
        }

        let flushed = self.flushed_ranges();
        Ranges::new()
            .add_range(Range::new(window_start, window_end))
            .remove_ranges(&flushed)
    }

    /// Flushes `block_start` on every shard and returns true if all succeeded.
    ///
    /// Every shard is attempted regardless of failures on the others.
    pub fn flush_block(&self, shards: &[Arc<dyn DatabaseShard>], block_start: Timestamp) -> bool {
        let flush_shard = |shard: &Arc<dyn DatabaseShard>| {
            shard
                .flush_to_disk(block_start)
                .map_err(|err| (shard.shard_num(), err))
        };

        let results: Vec<std::result::Result<(), (u32, NodeError)>> = match &self.thread_pool {
            Some(pool) => pool.install(|| shards.par_iter().map(flush_shard).collect()),
            None => shards.iter().map(flush_shard).collect(),
        };

        let mut succeeded = true;
        for result in results {
            if let Err((shard, err)) = result {
                succeeded = false;
                self.stats.shard_failures.fetch_add(1, Ordering::Relaxed);
                warn!(
                    "Flush failed for shard {} at block {}: {:?}",
                    shard, block_start, err
                );
            }
        }
        succeeded
    }

    /// Runs one flush cycle at `tick`.
    ///
    /// Unless `forced`, the cycle is skipped when another cycle is running.
    /// Shard failures are recorded in the flush state table and never
    /// returned. If a shard panics, every block the cycle reserved but did
    /// not record is marked failed before the panic resumes.
    pub fn run(&self, shards: &[Arc<dyn DatabaseShard>], tick: Timestamp, forced: bool) {
        let times = {
            let mut book = self.book();
            if !forced && book.active_cycles > 0 {
                drop(book);
                self.stats.record_skip();
                debug!("Skipping flush at {}: a flush cycle is in progress", tick);
                return;
            }
            book.active_cycles += 1;
            self.reserve_candidates(&mut book.states, tick)
        };
        let mut cycle = CycleGuard {
            manager: self,
            pending: times.into(),
        };

        self.stats.cycles_run.fetch_add(1, Ordering::Relaxed);
        debug!(
            "Flush cycle at {} scheduled {} blocks across {} shards",
            tick,
            cycle.pending.len(),
            shards.len()
        );

        // A block leaves `pending` only once its outcome is recorded.
        while let Some(&block_start) = cycle.pending.front() {
            let succeeded = self.flush_block(shards, block_start);
            self.record_outcome(block_start, succeeded);
            cycle.pending.pop_front();
        }
    }

    fn record_outcome(&self, block_start: Timestamp, succeeded: bool) {
        let mut book = self.book();

        if succeeded {
            book.states.mark_success(block_start);
            let block = Range::new(
                block_start,
                block_start.saturating_add(self.options.block_size_nanos()),
            );
            let flushed = book.flushed.add_range(block);
            book.flushed = flushed;
            self.stats.blocks_flushed.fetch_add(1, Ordering::Relaxed);
            debug!("Flushed block {}", block_start);
            return;
        }

        self.record_failure(&mut book, block_start);
    }

    fn record_failure(&self, book: &mut FlushBook, block_start: Timestamp) {
        let max_retries = self.options.max_flush_retries;
        let state = book.states.mark_failed(block_start);
        self.stats.block_failures.fetch_add(1, Ordering::Relaxed);
        if state.is_exhausted(max_retries) {
            self.stats.blocks_exhausted.fetch_add(1, Ordering::Relaxed);
            error!(
                "Block {} failed {} flush attempts and will not be retried",
                block_start, state.num_failures
            );
        } else {
            debug!(
                "Block {} failed flush attempt {} of {}",
                block_start, state.num_failures, max_retries
            );
        }
    }
}

/// Marks a running cycle and owns its unrecorded reservations.
///
/// On drop the manager returns to idle. Reservations still pending at that
/// point belong to an aborted cycle and are recorded as failed attempts.
struct CycleGuard<'a> {
    manager: &'a FlushManager,
    pending: VecDeque<Timestamp>,
}

impl Drop for CycleGuard<'_> {
    fn drop(&mut self) {
        let mut book = self.manager.book();
        if !self.pending.is_empty() {
            error!(
                "Flush cycle aborted with {} reserved blocks unrecorded",
                self.pending.len()
            );
            for block_start in self.pending.drain(..) {
                self.manager.record_failure(&mut book, block_start);
            }
        }
        book.active_cycles = book.active_cycles.saturating_sub(1);
    }
}
