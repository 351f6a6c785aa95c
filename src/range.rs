use std::ops::Range;

use crate::model::Sample;

/// Closed time interval `[start, end]` in seconds since the Unix epoch.
///
/// An inverted interval (`start > end`) is valid and matches nothing, as does
/// an interval with a NaN bound.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeRange {
    pub start: f64,
    pub end: f64,
}

impl TimeRange {
    pub fn new(start: f64, end: f64) -> Self {
        Self { start, end }
    }

    /// True when no timestamp can fall inside: inverted, or a NaN bound.
    pub fn is_empty(&self) -> bool {
        !(self.start <= self.end)
    }

    pub fn contains(&self, timestamp: f64) -> bool {
        self.start <= timestamp && timestamp <= self.end
    }

    /// Index range of the samples inside the interval.
    ///
    /// `samples` must be ordered by non-decreasing timestamp. Two binary
    /// searches locate the leftmost sample with `timestamp >= start` and the
    /// leftmost one with `timestamp > end`, so the cost is O(log n).
    pub fn bounds(&self, samples: &[Sample]) -> Range<usize> {
        if self.is_empty() {
            return 0..0;
        }
        let lo = samples.partition_point(|s| s.timestamp < self.start);
        let hi = samples.partition_point(|s| s.timestamp <= self.end);
        // An inverted interval puts `hi` at or before `lo`.
        lo..hi.max(lo)
    }

    pub fn slice<'a>(&self, samples: &'a [Sample]) -> &'a [Sample] {
        &samples[self.bounds(samples)]
    }
}
