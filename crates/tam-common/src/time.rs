//! Time ranges expressed in epoch seconds.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

pub const SECONDS_PER_DAY: i64 = 86_400;

/// An inclusive time range in seconds since the Unix epoch.
///
/// `start == end` denotes a single instant and is a valid range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: i64,
    pub end: i64,
}

impl TimeRange {
    pub fn new(start: i64, end: i64) -> Self {
        Self { start, end }
    }

    /// The `len` seconds leading up to and including `end`.
    pub fn trailing(end: i64, len: i64) -> Self {
        Self {
            start: end.saturating_sub(len),
            end,
        }
    }

    pub fn start_datetime(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_opt(self.start, 0).single()
    }

    pub fn end_datetime(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_opt(self.end, 0).single()
    }

    /// Width of the range in seconds (0 for an instant).
    pub fn span(&self) -> i64 {
        self.end - self.start
    }

    pub fn contains(&self, t: i64) -> bool {
        t >= self.start && t <= self.end
    }

    pub fn intersects(&self, other: &TimeRange) -> bool {
        self.start <= other.end && other.start <= self.end
    }

    pub fn validate(&self) -> Result<(), TimeRangeError> {
        if self.start > self.end {
            return Err(TimeRangeError::Inverted {
                start: self.start,
                end: self.end,
            });
        }
        Ok(())
    }

    /// Shift the whole range `len` seconds into the past.
    pub fn shifted_back(&self, len: i64) -> Self {
        Self {
            start: self.start.saturating_sub(len),
            end: self.end.saturating_sub(len),
        }
    }

    /// Split into at most `parts` disjoint, contiguous sub-ranges.
    ///
    /// Boundaries are evenly spaced integers between `start` and `end`; each
    /// part ends one second before the next begins and the last part keeps
    /// `end`. Parts that would be empty are dropped, so short ranges yield
    /// fewer than `parts` entries.
    pub fn split(&self, parts: usize) -> Vec<TimeRange> {
        if parts == 0 || self.start > self.end {
            return Vec::new();
        }

        let width = (self.end - self.start) as i128;
        let boundary = |i: usize| -> i64 { self.start + (width * i as i128 / parts as i128) as i64 };

        (0..parts)
            .filter_map(|i| {
                let start = boundary(i);
                let end = if i + 1 == parts {
                    self.end
                } else {
                    boundary(i + 1) - 1
                };
                (start <= end).then(|| TimeRange::new(start, end))
            })
            .collect()
    }

    /// Walk the range in sequential windows of `len` seconds.
    ///
    /// Each window is `[t, min(t + len, end)]` and the next starts one second
    /// after the previous one ends.
    pub fn windows(&self, len: i64) -> Vec<TimeRange> {
        let len = len.max(0);
        let mut out = Vec::new();
        let mut t = self.start;
        while t <= self.end {
            let window_end = t.saturating_add(len).min(self.end);
            out.push(TimeRange::new(t, window_end));
            if window_end == self.end {
                break;
            }
            t = window_end + 1;
        }
        out
    }
}

impl std::fmt::Display for TimeRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (self.start_datetime(), self.end_datetime()) {
            (Some(start), Some(end)) => write!(f, "{}/{}", start.to_rfc3339(), end.to_rfc3339()),
            _ => write!(f, "{}/{}", self.start, self.end),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TimeRangeError {
    #[error("Inverted time range: start {start} > end {end}")]
    Inverted { start: i64, end: i64 },
}
