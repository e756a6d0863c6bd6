//! Tracking of the observed total balance
//!
//! The monitor feeds every sampled sum into an [`InvariantTracker`]. Only a
//! sum that differs from the previous sample yields an [`InvariantChange`];
//! the ordered list of changes is the monitor's audit trail.

use chrono::{DateTime, Utc};
use serde::Serialize;

/// A sampled total that differed from the sample before it
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InvariantChange {
    /// Position of this change in the monitor's audit trail, starting at 1
    pub sequence: u64,
    pub previous: i64,
    pub current: i64,
    pub observed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Observation {
    /// First sample of the run
    Baseline(i64),
    Unchanged,
    Changed(InvariantChange),
}

#[derive(Debug, Default)]
pub struct InvariantTracker {
    last: Option<i64>,
    changes: u64,
}

impl InvariantTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observe(&mut self, sum: i64) -> Observation {
        match self.last.replace(sum) {
            None => Observation::Baseline(sum),
            Some(previous) if previous == sum => Observation::Unchanged,
            Some(previous) => {
                self.changes += 1;
                Observation::Changed(InvariantChange {
                    sequence: self.changes,
                    previous,
                    current: sum,
                    observed_at: Utc::now(),
                })
            }
        }
    }

    pub fn last(&self) -> Option<i64> {
        self.last
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn changes(samples: &[i64]) -> Vec<InvariantChange> {
        let mut tracker = InvariantTracker::new();
        samples
            .iter()
            .filter_map(|sum| match tracker.observe(*sum) {
                Observation::Changed(change) => Some(change),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_first_sample_is_baseline() {
        let mut tracker = InvariantTracker::new();
        assert_eq!(tracker.observe(100), Observation::Baseline(100));
        assert_eq!(tracker.observe(100), Observation::Unchanged);
        assert_eq!(tracker.last(), Some(100));
    }

    #[test]
    fn test_only_changes_are_reported_in_order() {
        let changes = changes(&[100, 100, 100, 99, 99, 100]);
        let values: Vec<(i64, i64)> = changes
            .iter()
            .map(|change| (change.previous, change.current))
            .collect();
        assert_eq!(values, vec![(100, 99), (99, 100)]);
        assert_eq!(changes[0].sequence, 1);
        assert_eq!(changes[1].sequence, 2);
        assert!(changes[0].observed_at <= changes[1].observed_at);
    }

    #[test]
    fn test_constant_samples_report_nothing() {
        assert!(changes(&[5, 5, 5, 5]).is_empty());
    }
}
