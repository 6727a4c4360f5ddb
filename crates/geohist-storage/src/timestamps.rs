//! Query timestamp series.

use geohist_entity::Timestamp;

use crate::{StorageError, StorageResult};

/// Evenly spaced query timestamps from `start` up to and including `end`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TimestampSeries {
    start: Timestamp,
    end: Timestamp,
    step_secs: u64,
}

impl TimestampSeries {
    pub fn new(start: Timestamp, end: Timestamp, step_secs: u64) -> StorageResult<Self> {
        if step_secs == 0 {
            return Err(StorageError::InvalidSeries("step must be positive"));
        }
        if start > end {
            return Err(StorageError::InvalidSeries("start is after end"));
        }
        if (end.as_secs() - start.as_secs()) / step_secs == u64::MAX {
            return Err(StorageError::InvalidSeries("too many timestamps"));
        }
        Ok(Self {
            start,
            end,
            step_secs,
        })
    }

    /// A single timestamp.
    #[must_use]
    pub const fn snapshot(at: Timestamp) -> Self {
        Self {
            start: at,
            end: at,
            step_secs: 1,
        }
    }

    #[must_use]
    pub const fn start(&self) -> Timestamp {
        self.start
    }

    #[must_use]
    pub const fn end(&self) -> Timestamp {
        self.end
    }

    #[must_use]
    pub const fn len(&self) -> u64 {
        (self.end.as_secs() - self.start.as_secs()) / self.step_secs + 1
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        false
    }

    pub fn iter(&self) -> impl Iterator<Item = Timestamp> {
        let (start, step) = (self.start.as_secs(), self.step_secs);
        (0..self.len()).map(move |i| Timestamp::from_secs(start + i * step))
    }

    #[must_use]
    pub fn to_vec(&self) -> Vec<Timestamp> {
        self.iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts(secs: u64) -> Timestamp {
        Timestamp::from_secs(secs)
    }

    #[test]
    fn test_series_includes_end_on_step() {
        let series = TimestampSeries::new(ts(100), ts(400), 100).unwrap();
        assert_eq!(series.to_vec(), vec![ts(100), ts(200), ts(300), ts(400)]);
        assert_eq!(series.len(), 4);
    }

    #[test]
    fn test_series_stops_before_end_off_step() {
        let series = TimestampSeries::new(ts(0), ts(250), 100).unwrap();
        assert_eq!(series.to_vec(), vec![ts(0), ts(100), ts(200)]);
    }

    #[test]
    fn test_snapshot() {
        assert_eq!(TimestampSeries::snapshot(ts(7)).to_vec(), vec![ts(7)]);
    }

    #[test]
    fn test_invalid_series() {
        assert!(TimestampSeries::new(ts(0), ts(10), 0).is_err());
        assert!(TimestampSeries::new(ts(10), ts(0), 1).is_err());
        assert!(TimestampSeries::new(ts(0), ts(u64::MAX), 1).is_err());
    }

    #[test]
    fn test_series_near_u64_max() {
        let series = TimestampSeries::new(ts(u64::MAX - 2), ts(u64::MAX), 1).unwrap();
        assert_eq!(series.len(), 3);
        assert_eq!(series.iter().last(), Some(ts(u64::MAX)));
    }
}
