//! Skulk Node - block flush lifecycle for the Alopex Skulk storage node
//!
//! A storage node buffers writes per shard in time-aligned blocks. Once a
//! block can no longer receive writes it is flushed to disk on every shard.
//! This crate decides which blocks to flush on each tick and tracks their
//! outcome.
//!
//! # Components
//!
//! - [`Database`]: Shard set, bootstrap state, and flush entry points
//! - [`FlushManager`]: Flush scheduling, fan-out, and per-block bookkeeping
//! - [`Ranges`]: Persistent set of disjoint time ranges
//!
//! # Example
//!
//! ```rust,ignore
//! use alopex_skulk_node::{Database, DatabaseOptions};
//! use std::time::Duration;
//!
//! let options = DatabaseOptions::default()
//!     .with_block_size(Duration::from_secs(2 * 3600))
//!     .with_flush_concurrency(8);
//! let db = Database::new(shards, options)?;
//! db.bootstrap()?;
//!
//! // Called periodically; overlapping ticks are skipped.
//! db.tick();
//! ```

#![deny(missing_docs)]

pub mod database;
pub mod error;
pub mod lifecycle;
pub mod options;
pub mod shard;
pub mod time;

pub use database::{BootstrapState, Database};
pub use error::{NodeError, Result};
pub use lifecycle::{FlushCycleStatus, FlushManager, FlushState, FlushStats, FlushStatus};
pub use options::DatabaseOptions;
pub use shard::DatabaseShard;
pub use time::{Clock, ManualClock, Range, Ranges, SystemClock, Timestamp};
