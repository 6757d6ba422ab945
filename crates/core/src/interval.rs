//! Watched intervals and their consolidation.
//!
//! A viewer's coverage of a video is kept as a sorted list of disjoint
//! closed intervals. Every mutation goes through [`consolidate`] so the
//! stored form is always maximal: no two intervals overlap or touch.

use serde::{Deserialize, Serialize};

use crate::error::{ensure_finite, Result, TrackerError};

/// A closed range `[start, end]` of a video, in seconds.
///
/// Serialized as a two-element array. Deserialization rejects
/// non-finite, negative or inverted bounds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "[f64; 2]", into = "[f64; 2]")]
pub struct WatchedInterval {
    start: f64,
    end: f64,
}

impl WatchedInterval {
    /// Create a validated interval.
    pub fn new(start: f64, end: f64) -> Result<Self> {
        let start = ensure_finite(start, "interval start")?;
        let end = ensure_finite(end, "interval end")?;
        if start < 0.0 || start > end {
            return Err(TrackerError::MalformedInterval { start, end });
        }
        Ok(Self { start, end })
    }

    /// Interval spanning two positions in either order.
    pub fn spanning(a: f64, b: f64) -> Result<Self> {
        Self::new(a.min(b), a.max(b))
    }

    /// Start of the interval.
    pub fn start(&self) -> f64 {
        self.start
    }

    /// End of the interval.
    pub fn end(&self) -> f64 {
        self.end
    }

    /// Length in seconds.
    pub fn len(&self) -> f64 {
        self.end - self.start
    }

    /// True for a zero-length interval.
    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }

    /// Whether `t` falls inside the interval (bounds included).
    pub fn contains(&self, t: f64) -> bool {
        self.start <= t && t <= self.end
    }

    /// Restrict the interval to `[0, limit]`.
    fn clamped(self, limit: f64) -> Self {
        Self {
            start: self.start.min(limit),
            end: self.end.min(limit),
        }
    }
}

impl TryFrom<[f64; 2]> for WatchedInterval {
    type Error = TrackerError;

    fn try_from([start, end]: [f64; 2]) -> Result<Self> {
        Self::new(start, end)
    }
}

impl From<WatchedInterval> for [f64; 2] {
    fn from(interval: WatchedInterval) -> Self {
        [interval.start, interval.end]
    }
}

/// Merge arbitrary intervals into a sorted, disjoint list.
///
/// Sorts by start then end, then folds each interval into the current one
/// when `next.start <= current.end`. Idempotent.
pub fn consolidate(mut intervals: Vec<WatchedInterval>) -> Vec<WatchedInterval> {
    intervals.sort_by(|a, b| a.start.total_cmp(&b.start).then(a.end.total_cmp(&b.end)));

    let mut merged: Vec<WatchedInterval> = Vec::with_capacity(intervals.len());
    for next in intervals {
        match merged.last_mut() {
            Some(current) if next.start <= current.end => {
                current.end = current.end.max(next.end);
            }
            _ => merged.push(next),
        }
    }
    merged
}

/// Consolidated set of watched intervals.
///
/// Stored data is validated and re-consolidated on load, so a session read
/// back from any store satisfies the disjointness invariant.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "Vec<WatchedInterval>", into = "Vec<WatchedInterval>")]
pub struct IntervalSet {
    intervals: Vec<WatchedInterval>,
}

impl IntervalSet {
    /// An empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an interval and restore the invariant.
    pub fn insert(&mut self, interval: WatchedInterval) {
        let mut all = std::mem::take(&mut self.intervals);
        all.push(interval);
        self.intervals = consolidate(all);
    }

    /// Extend the interval holding `anchor` so that it reaches `to`.
    ///
    /// Returns false when no interval holds `anchor`.
    pub fn extend_from(&mut self, anchor: f64, to: f64) -> bool {
        let Some(idx) = self.position_of(anchor) else {
            return false;
        };
        let interval = &mut self.intervals[idx];
        interval.end = interval.end.max(to);
        let all = std::mem::take(&mut self.intervals);
        self.intervals = consolidate(all);
        true
    }

    /// The interval holding `t`, if any.
    pub fn containing(&self, t: f64) -> Option<&WatchedInterval> {
        self.position_of(t).map(|idx| &self.intervals[idx])
    }

    fn position_of(&self, t: f64) -> Option<usize> {
        // Sorted and disjoint: the candidate is the last interval starting at or before t.
        let idx = self.intervals.partition_point(|i| i.start <= t);
        idx.checked_sub(1).filter(|&i| self.intervals[i].contains(t))
    }

    /// Clip every interval to `[0, limit]`, dropping what falls outside.
    pub fn clamp_to(&mut self, limit: f64) {
        let all: Vec<_> = std::mem::take(&mut self.intervals)
            .into_iter()
            .filter(|i| i.start <= limit)
            .map(|i| i.clamped(limit))
            .collect();
        self.intervals = consolidate(all);
    }

    /// Sum of interval lengths: unique seconds watched.
    pub fn total(&self) -> f64 {
        self.intervals.iter().map(WatchedInterval::len).sum()
    }

    /// Number of disjoint intervals.
    pub fn len(&self) -> usize {
        self.intervals.len()
    }

    /// True when nothing has been recorded.
    pub fn is_empty(&self) -> bool {
        self.intervals.is_empty()
    }

    /// Iterate in ascending order.
    pub fn iter(&self) -> std::slice::Iter<'_, WatchedInterval> {
        self.intervals.iter()
    }

    /// Borrow as a slice.
    pub fn as_slice(&self) -> &[WatchedInterval] {
        &self.intervals
    }
}

impl From<Vec<WatchedInterval>> for IntervalSet {
    fn from(intervals: Vec<WatchedInterval>) -> Self {
        Self {
            intervals: consolidate(intervals),
        }
    }
}

impl From<IntervalSet> for Vec<WatchedInterval> {
    fn from(set: IntervalSet) -> Self {
        set.intervals
    }
}

impl<'a> IntoIterator for &'a IntervalSet {
    type Item = &'a WatchedInterval;
    type IntoIter = std::slice::Iter<'a, WatchedInterval>;

    fn into_iter(self) -> Self::IntoIter {
        self.intervals.iter()
    }
}
