//! Time primitives: timestamps, closed ranges, block alignment, and clocks.
//!
//! All timestamps are nanoseconds since the Unix epoch, matching the rest of
//! the Skulk storage engine.

pub mod ranges;

pub use ranges::{RangeIter, Ranges};

use std::fmt;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Timestamp in nanoseconds since the Unix epoch.
pub type Timestamp = i64;

/// Nanoseconds per second.
pub const NANOS_PER_SECOND: i64 = 1_000_000_000;

/// A closed time interval `[start, end]`.
///
/// A range with `start == end` is legal but inert: adding it to or removing
/// it from a [`Ranges`] set changes nothing. Ranges with `start > end` are
/// treated the same way.
///
/// # Examples
/// ```rust,ignore
/// use alopex_skulk_node::time::Range;
///
/// let range = Range::new(0, 10);
/// assert!(range.contains(&Range::new(2, 5)));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Range {
    /// Start timestamp (inclusive).
    pub start: Timestamp,
    /// End timestamp (inclusive).
    pub end: Timestamp,
}

impl Range {
    /// Creates a new range.
    pub fn new(start: Timestamp, end: Timestamp) -> Self {
        Self { start, end }
    }

    /// Returns true if the range covers no time.
    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }

    /// Returns true if `other` lies entirely within this range.
    pub fn contains(&self, other: &Range) -> bool {
        self.start <= other.start && other.end <= self.end
    }

    /// Returns true if the two ranges overlap or touch at a boundary.
    pub fn overlaps(&self, other: &Range) -> bool {
        self.start <= other.end && other.start <= self.end
    }

    /// Returns the length of the range in nanoseconds.
    pub fn duration_nanos(&self) -> i64 {
        self.end.saturating_sub(self.start).max(0)
    }
}

impl fmt::Display for Range {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.start, self.end)
    }
}

/// Converts a duration to nanoseconds, saturating at `i64::MAX`.
pub fn duration_nanos(duration: Duration) -> i64 {
    i64::try_from(duration.as_nanos()).unwrap_or(i64::MAX)
}

/// Converts whole seconds since the epoch to a timestamp.
pub fn from_secs(secs: i64) -> Timestamp {
    secs.saturating_mul(NANOS_PER_SECOND)
}

/// Aligns a timestamp down to a multiple of `duration_nanos`.
///
/// Uses floor division so timestamps before the epoch align downwards too.
/// Results below `i64::MIN` saturate.
pub fn align_timestamp(timestamp: Timestamp, duration_nanos: i64) -> Timestamp {
    let (quotient, _) = div_floor(timestamp, duration_nanos);
    quotient.saturating_mul(duration_nanos)
}

fn div_floor(value: i64, divisor: i64) -> (i64, i64) {
    let mut quotient = value / divisor;
    let mut remainder = value % divisor;
    if remainder < 0 {
        quotient -= 1;
        remainder += divisor;
    }
    (quotient, remainder)
}

/// Source of the current time.
pub trait Clock: Send + Sync {
    /// Returns the current timestamp.
    fn now(&self) -> Timestamp;
}

/// Wall clock backed by [`SystemTime`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        // Clocks set before the epoch report the epoch.
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(duration_nanos)
            .unwrap_or(0)
    }
}

/// Manually driven clock for deterministic scheduling.
///
/// # Examples
/// ```rust,ignore
/// use alopex_skulk_node::time::{Clock, ManualClock};
///
/// let clock = ManualClock::new(0);
/// clock.advance(std::time::Duration::from_secs(60));
/// assert_eq!(clock.now(), 60_000_000_000);
/// ```
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicI64,
}

impl ManualClock {
    /// Creates a clock reading `now`.
    pub fn new(now: Timestamp) -> Self {
        Self {
            now: AtomicI64::new(now),
        }
    }

    /// Sets the current time.
    pub fn set(&self, now: Timestamp) {
        self.now.store(now, Ordering::SeqCst);
    }

    /// Moves the clock forward by `by`.
    pub fn advance(&self, by: Duration) {
        self.now.fetch_add(duration_nanos(by), Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        self.now.load(Ordering::SeqCst)
    }
}
