//! Retention policy bounding which blocks are still flush candidates.

use crate::time::{duration_nanos, Timestamp};
use std::time::Duration;

/// Retention policy for deciding which blocks have aged out.
pub trait RetentionPolicy: Send + Sync {
    /// Returns the retention duration.
    fn retention_duration(&self) -> Duration;

    /// Returns the oldest timestamp still retained at `now`.
    ///
    /// Never earlier than the epoch.
    fn earliest_retained(&self, now: Timestamp) -> Timestamp {
        now.saturating_sub(duration_nanos(self.retention_duration()))
            .max(0)
    }

    /// Returns true if the block starting at `block_start` has aged out at `now`.
    fn is_expired(&self, block_start: Timestamp, now: Timestamp) -> bool {
        block_start < self.earliest_retained(now)
    }
}

/// Retention policy with a fixed duration (2 days unless overridden).
#[derive(Debug, Clone)]
pub struct DefaultRetentionPolicy {
    retention: Duration,
}

impl Default for DefaultRetentionPolicy {
    fn default() -> Self {
        Self {
            retention: crate::options::DEFAULT_RETENTION_PERIOD,
        }
    }
}

impl DefaultRetentionPolicy {
    /// Creates a retention policy with a custom duration.
    pub fn new(retention: Duration) -> Self {
        Self { retention }
    }
}

impl RetentionPolicy for DefaultRetentionPolicy {
    fn retention_duration(&self) -> Duration {
        self.retention
    }
}
