//! Per-block flush bookkeeping.

use std::collections::BTreeMap;

use crate::time::Timestamp;

/// Flush status of a single block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FlushStatus {
    /// The block has never been attempted.
    #[default]
    NotStarted,
    /// The block is reserved by a running flush cycle.
    InProgress,
    /// Every shard persisted the block.
    Success,
    /// At least one shard failed to persist the block.
    Failed,
}

/// Flush status and failure count of a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FlushState {
    /// Current status.
    pub status: FlushStatus,
    /// Number of failed flush attempts so far.
    pub num_failures: u32,
}

impl FlushState {
    /// Creates a new flush state.
    pub fn new(status: FlushStatus, num_failures: u32) -> Self {
        Self {
            status,
            num_failures,
        }
    }

    /// Returns true if the block has failed `max_retries` times or more.
    pub fn is_exhausted(&self, max_retries: u32) -> bool {
        self.status == FlushStatus::Failed && self.num_failures >= max_retries
    }

    /// Returns true if a new flush attempt may be scheduled for the block.
    pub fn is_eligible(&self, max_retries: u32) -> bool {
        match self.status {
            FlushStatus::NotStarted => true,
            FlushStatus::InProgress | FlushStatus::Success => false,
            FlushStatus::Failed => self.num_failures < max_retries,
        }
    }
}

/// Flush states keyed by block start.
///
/// Entries are never removed; a block's history lives as long as the
/// process so retry decisions and audits can consult it.
#[derive(Debug, Clone, Default)]
pub struct FlushStateTable {
    states: BTreeMap<Timestamp, FlushState>,
}

impl FlushStateTable {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the state recorded for `block_start`, if any.
    pub fn get(&self, block_start: Timestamp) -> Option<FlushState> {
        self.states.get(&block_start).copied()
    }

    /// Records `state` for `block_start`.
    pub fn set(&mut self, block_start: Timestamp, state: FlushState) {
        self.states.insert(block_start, state);
    }

    /// Returns true if `block_start` may be scheduled for a flush attempt.
    pub fn is_eligible(&self, block_start: Timestamp, max_retries: u32) -> bool {
        self.get(block_start)
            .map_or(true, |state| state.is_eligible(max_retries))
    }

    /// Marks `block_start` as in progress, keeping its failure count.
    pub fn reserve(&mut self, block_start: Timestamp) {
        let state = self.states.entry(block_start).or_default();
        state.status = FlushStatus::InProgress;
    }

    /// Marks `block_start` as successfully flushed, keeping its failure count.
    pub fn mark_success(&mut self, block_start: Timestamp) -> FlushState {
        let state = self.states.entry(block_start).or_default();
        state.status = FlushStatus::Success;
        *state
    }

    /// Marks `block_start` as failed and increments its failure count.
    pub fn mark_failed(&mut self, block_start: Timestamp) -> FlushState {
        let state = self.states.entry(block_start).or_default();
        state.status = FlushStatus::Failed;
        state.num_failures = state.num_failures.saturating_add(1);
        *state
    }

    /// Returns block starts that will no longer be retried, in ascending order.
    pub fn exhausted(&self, max_retries: u32) -> Vec<Timestamp> {
        self.states
            .iter()
            .filter(|(_, state)| state.is_exhausted(max_retries))
            .map(|(&block_start, _)| block_start)
            .collect()
    }

    /// Iterates over all recorded states in ascending block order.
    pub fn iter(&self) -> impl Iterator<Item = (Timestamp, FlushState)> + '_ {
        self.states.iter().map(|(&block_start, &state)| (block_start, state))
    }

    /// Returns the number of blocks with a recorded state.
    pub fn len(&self) -> usize {
        self.states.len()
    }

    /// Returns true if no block has been recorded.
    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_eligibility() {
        assert!(FlushState::default().is_eligible(3));
        assert!(!FlushState::new(FlushStatus::InProgress, 0).is_eligible(3));
        assert!(!FlushState::new(FlushStatus::Success, 1).is_eligible(3));
        assert!(FlushState::new(FlushStatus::Failed, 2).is_eligible(3));
        assert!(!FlushState::new(FlushStatus::Failed, 3).is_eligible(3));
        assert!(!FlushState::new(FlushStatus::Failed, 1).is_eligible(0));
    }

    #[test]
    fn test_reserve_keeps_failures() {
        let mut table = FlushStateTable::new();
        table.set(100, FlushState::new(FlushStatus::Failed, 2));
        table.reserve(100);
        table.reserve(200);
        assert_eq!(
            table.get(100),
            Some(FlushState::new(FlushStatus::InProgress, 2))
        );
        assert_eq!(
            table.get(200),
            Some(FlushState::new(FlushStatus::InProgress, 0))
        );
    }

    #[test]
    fn test_mark_success_and_failed() {
        let mut table = FlushStateTable::new();
        table.reserve(100);
        assert_eq!(
            table.mark_failed(100),
            FlushState::new(FlushStatus::Failed, 1)
        );
        table.reserve(100);
        assert_eq!(
            table.mark_failed(100),
            FlushState::new(FlushStatus::Failed, 2)
        );
        table.reserve(100);
        assert_eq!(
            table.mark_success(100),
            FlushState::new(FlushStatus::Success, 2)
        );
    }

    #[test]
    fn test_exhausted_blocks() {
        let mut table = FlushStateTable::new();
        table.set(300, FlushState::new(FlushStatus::Failed, 3));
        table.set(100, FlushState::new(FlushStatus::Failed, 4));
        table.set(200, FlushState::new(FlushStatus::Failed, 2));
        table.set(400, FlushState::new(FlushStatus::Success, 5));
        assert_eq!(table.exhausted(3), vec![100, 300]);
        assert!(!table.is_eligible(100, 3));
        assert!(table.is_eligible(200, 3));
        assert!(table.is_eligible(500, 3));
        assert_eq!(table.len(), 4);
        assert!(!table.is_empty());
    }
}
