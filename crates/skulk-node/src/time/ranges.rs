//! Ordered set of closed time ranges with merge-on-touch insertion.
//!
//! [`Ranges`] tracks which stretches of wall-clock time are covered, e.g.
//! the blocks a shard has durably flushed. Stored ranges are sorted by start
//! and never overlap or touch: for adjacent ranges `a` and `b`,
//! `a.end < b.start`.
//!
//! The set is a persistent value. Every mutating operation returns a new
//! set and leaves the receiver untouched, so a caller holding an older value
//! keeps seeing exactly what it saw before. Storage is shared until a write
//! happens, at which point the writer takes a private copy.
//!
//! # Example
//!
//! ```rust,ignore
//! use alopex_skulk_node::time::{Range, Ranges};
//!
//! let covered = Ranges::new()
//!     .add_range(Range::new(0, 10))
//!     .add_range(Range::new(10, 20));
//! assert_eq!(covered.len(), 1);
//!
//! let gaps = covered.remove_range(Range::new(5, 7));
//! assert_eq!(gaps.len(), 2);
//! assert_eq!(covered.len(), 1);
//! ```

use std::fmt;
use std::iter::FromIterator;
use std::sync::Arc;

use super::Range;

/// Sorted, coalesced set of closed time ranges.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Ranges {
    sorted: Arc<Vec<Range>>,
}

impl Ranges {
    /// Creates an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if the set holds no ranges.
    pub fn is_empty(&self) -> bool {
        self.sorted.is_empty()
    }

    /// Returns the number of disjoint ranges in the set.
    pub fn len(&self) -> usize {
        self.sorted.len()
    }

    /// Returns true if `range` lies entirely within a single stored range.
    ///
    /// Boundaries are inclusive, so a zero-length query at a covered
    /// instant is contained.
    pub fn contains(&self, range: &Range) -> bool {
        let idx = self.sorted.partition_point(|r| r.start <= range.start);
        idx.checked_sub(1)
            .and_then(|i| self.sorted.get(i))
            .map_or(false, |r| range.end <= r.end)
    }

    /// Returns a new set with `range` added.
    ///
    /// Every stored range that overlaps or touches `range` is merged with it
    /// into a single range.
    pub fn add_range(&self, range: Range) -> Ranges {
        let mut next = self.clone();
        next.insert(range);
        next
    }

    /// Returns a new set with every range of `other` added.
    pub fn add_ranges(&self, other: &Ranges) -> Ranges {
        let mut next = self.clone();
        for range in other.sorted.iter() {
            next.insert(*range);
        }
        next
    }

    /// Returns a new set with `range` subtracted.
    ///
    /// Stored ranges fully covered by `range` are dropped, partially
    /// covered ones are trimmed, and a stored range strictly enclosing
    /// `range` is split in two.
    pub fn remove_range(&self, range: Range) -> Ranges {
        let mut next = self.clone();
        next.subtract(range);
        next
    }

    /// Returns a new set with every range of `other` subtracted.
    pub fn remove_ranges(&self, other: &Ranges) -> Ranges {
        let mut next = self.clone();
        for range in other.sorted.iter() {
            next.subtract(*range);
        }
        next
    }

    /// Returns an iterator over the stored ranges in ascending order.
    ///
    /// The iterator owns a snapshot of the set; later operations on the set
    /// do not affect it.
    pub fn iter(&self) -> RangeIter {
        RangeIter {
            sorted: Arc::clone(&self.sorted),
            pos: 0,
        }
    }

    fn insert(&mut self, range: Range) {
        if range.is_empty() {
            return;
        }

        // Stored ranges in lo..hi overlap or touch `range`.
        let lo = self.sorted.partition_point(|r| r.end < range.start);
        let hi = self.sorted.partition_point(|r| r.start <= range.end);

        let mut merged = range;
        if lo < hi {
            merged.start = merged.start.min(self.sorted[lo].start);
            merged.end = merged.end.max(self.sorted[hi - 1].end);
        }

        Arc::make_mut(&mut self.sorted).splice(lo..hi, std::iter::once(merged));
    }

    fn subtract(&mut self, range: Range) {
        if range.is_empty() {
            return;
        }

        // Stored ranges in lo..hi share more than a boundary with `range`.
        let lo = self.sorted.partition_point(|r| r.end <= range.start);
        let hi = self.sorted.partition_point(|r| r.start < range.end);
        if lo >= hi {
            return;
        }

        let mut remainder = Vec::with_capacity(2);
        for existing in &self.sorted[lo..hi] {
            if existing.start < range.start {
                remainder.push(Range::new(existing.start, range.start));
            }
            if range.end < existing.end {
                remainder.push(Range::new(range.end, existing.end));
            }
        }

        Arc::make_mut(&mut self.sorted).splice(lo..hi, remainder);
    }
}

impl fmt::Debug for Ranges {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.sorted.iter()).finish()
    }
}

impl FromIterator<Range> for Ranges {
    fn from_iter<I: IntoIterator<Item = Range>>(iter: I) -> Self {
        let mut ranges = Ranges::new();
        for range in iter {
            ranges.insert(range);
        }
        ranges
    }
}

impl<'a> IntoIterator for &'a Ranges {
    type Item = Range;
    type IntoIter = RangeIter;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Iterator over a snapshot of a [`Ranges`] set.
#[derive(Debug, Clone)]
pub struct RangeIter {
    sorted: Arc<Vec<Range>>,
    pos: usize,
}

impl Iterator for RangeIter {
    type Item = Range;

    fn next(&mut self) -> Option<Range> {
        let range = self.sorted.get(self.pos).copied()?;
        self.pos += 1;
        Some(range)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.sorted.len().saturating_sub(self.pos);
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for RangeIter {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::{from_secs, Timestamp};

    const BASE_SECS: i64 = 1_000_000;

    fn at(offset_secs: i64) -> Timestamp {
        from_secs(BASE_SECS + offset_secs)
    }

    fn span(start: i64, end: i64) -> Range {
        Range::new(at(start), at(end))
    }

    fn collect(ranges: &Ranges) -> Vec<Range> {
        ranges.iter().collect()
    }

    fn ranges_to_add() -> Vec<Range> {
        vec![
            span(0, 1),
            span(10, 15),
            span(-3, -1),
            span(-8, -5),
            span(-1, 0),
            span(1, 8),
            span(-10, 12),
        ]
    }

    fn ranges_to_remove() -> Vec<Range> {
        vec![span(-5, -3), span(-6, 8), span(12, 13), span(10, 12)]
    }

    fn populated(ranges: &[Range]) -> Ranges {
        ranges
            .iter()
            .fold(Ranges::new(), |acc, range| acc.add_range(*range))
    }

    #[test]
    fn test_is_empty() {
        assert!(Ranges::new().is_empty());
        assert!(Ranges::default().is_empty());
        assert!(!Ranges::new().add_range(span(0, 1)).is_empty());
    }

    #[test]
    fn test_clone_diverges() {
        let to_add = ranges_to_add();
        let original = populated(&to_add[..4]);
        let expected = vec![to_add[3], to_add[2], to_add[0], to_add[1]];
        assert_eq!(collect(&original), expected);

        let cloned = original.clone();
        let trimmed = original.remove_range(to_add[0]);
        assert_eq!(collect(&cloned), expected);
        assert_eq!(collect(&trimmed), vec![to_add[3], to_add[2], to_add[1]]);
    }

    #[test]
    fn test_add_range_merges_touching() {
        let to_add = ranges_to_add();
        let expected = vec![
            vec![to_add[0]],
            vec![to_add[0], to_add[1]],
            vec![to_add[2], to_add[0], to_add[1]],
            vec![to_add[3], to_add[2], to_add[0], to_add[1]],
            vec![to_add[3], span(-3, 1), to_add[1]],
            vec![to_add[3], span(-3, 8), to_add[1]],
            vec![span(-10, 15)],
        ];

        let empty = Ranges::new();
        let mut ranges = empty.add_range(Range::default());
        assert!(ranges.is_empty());

        for (range, expected) in to_add.iter().zip(expected) {
            ranges = ranges.add_range(*range);
            assert_eq!(collect(&ranges), expected);
        }
        assert!(empty.is_empty());
    }

    #[test]
    fn test_add_ranges() {
        let to_add = ranges_to_add();
        let ranges = populated(&to_add[..4]).add_ranges(&Ranges::new());
        let expected = vec![to_add[3], to_add[2], to_add[0], to_add[1]];
        assert_eq!(collect(&ranges), expected);

        let other = populated(&to_add[4..]);
        let merged = ranges.add_ranges(&other);
        assert_eq!(collect(&merged), vec![span(-10, 15)]);
        assert_eq!(collect(&ranges), expected);
    }

    #[test]
    fn test_remove_range_trims_and_splits() {
        let start = populated(&ranges_to_add()[..4]);
        let expected = vec![
            vec![span(-8, -5), span(-3, -1), span(0, 1), span(10, 15)],
            vec![span(-8, -6), span(10, 15)],
            vec![span(-8, -6), span(10, 12), span(13, 15)],
            vec![span(-8, -6), span(13, 15)],
        ];

        let mut ranges = start.clone();
        for (range, expected) in ranges_to_remove().iter().zip(expected.iter()) {
            ranges = ranges.remove_range(*range);
            assert_eq!(&collect(&ranges), expected);
        }

        ranges = ranges.remove_range(Range::default());
        assert_eq!(collect(&ranges), expected[3]);

        ranges = ranges.remove_range(span(-10, 15));
        assert!(ranges.is_empty());
        assert_eq!(collect(&start), expected[0]);
    }

    #[test]
    fn test_remove_ranges() {
        let ranges = populated(&ranges_to_add()[..4]).remove_ranges(&Ranges::new());
        let expected = vec![span(-8, -5), span(-3, -1), span(0, 1), span(10, 15)];
        assert_eq!(collect(&ranges), expected);

        let to_remove = populated(&ranges_to_remove());
        let trimmed = ranges.remove_ranges(&to_remove);
        assert_eq!(collect(&trimmed), vec![span(-8, -6), span(13, 15)]);
        assert_eq!(collect(&ranges), expected);
    }

    #[test]
    fn test_remove_touching_boundary_is_noop() {
        let ranges = Ranges::new().add_range(span(0, 10));
        assert_eq!(collect(&ranges.remove_range(span(10, 20))), vec![span(0, 10)]);
        assert_eq!(collect(&ranges.remove_range(span(-5, 0))), vec![span(0, 10)]);
    }

    #[test]
    fn test_contains() {
        let ranges = populated(&ranges_to_add()[..4]);
        assert!(ranges.contains(&span(0, 0)));
        assert!(ranges.contains(&span(0, 1)));
        assert!(ranges.contains(&span(-7, -5)));
        assert!(!ranges.contains(&span(-7, -4)));
        assert!(!ranges.contains(&span(-3, 1)));
        assert!(!ranges.contains(&span(9, 15)));
        assert!(!ranges.contains(&span(-20, -20)));
        assert!(!Ranges::new().contains(&span(0, 0)));
    }

    #[test]
    fn test_nanosecond_boundaries() {
        let stored = span(0, 1);
        let ranges = Ranges::new().add_range(stored);
        assert!(ranges.contains(&stored));
        assert!(!ranges.contains(&Range::new(stored.start, stored.end + 1)));
        assert!(!ranges.contains(&Range::new(stored.start - 1, stored.end)));
        assert!(ranges.contains(&Range::new(stored.end, stored.end)));
        assert!(!ranges.contains(&Range::new(stored.end + 1, stored.end + 1)));

        // A one-nanosecond gap keeps ranges apart.
        let gapped = Ranges::new()
            .add_range(Range::new(0, 10))
            .add_range(Range::new(11, 20));
        assert_eq!(
            collect(&gapped),
            vec![Range::new(0, 10), Range::new(11, 20)]
        );
        assert!(!gapped.contains(&Range::new(10, 11)));

        let bridged = gapped.add_range(Range::new(10, 11));
        assert_eq!(collect(&bridged), vec![Range::new(0, 20)]);
    }

    #[test]
    fn test_iter_is_restartable_snapshot() {
        let to_add = ranges_to_add();
        let ranges = populated(&to_add[..4]);
        let expected = vec![span(-8, -5), span(-3, -1), span(0, 1), span(10, 15)];

        let iter = ranges.iter();
        assert_eq!(iter.len(), 4);
        assert_eq!(iter.collect::<Vec<_>>(), expected);
        assert_eq!(ranges.iter().collect::<Vec<_>>(), expected);

        let snapshot = ranges.iter();
        let removed = ranges.remove_range(to_add[2]);
        assert_eq!(snapshot.collect::<Vec<_>>(), expected);
        assert_eq!(
            (&removed).into_iter().collect::<Vec<_>>(),
            vec![span(-8, -5), span(0, 1), span(10, 15)]
        );
    }

    #[test]
    fn test_from_iterator_coalesces() {
        let ranges: Ranges = vec![span(5, 6), span(0, 2), span(2, 4)].into_iter().collect();
        assert_eq!(collect(&ranges), vec![span(0, 4), span(5, 6)]);
    }
}
