//! Status - キュー全体の件数スナップショット

use serde::{Deserialize, Serialize};

/// Size of each ordering set.
///
/// Each count is read separately, so under load the numbers are only
/// roughly consistent with one another.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStats {
    pub pending: usize,
    pub processing: usize,
    pub completed: usize,
    pub failed: usize,
    pub delayed: usize,
}

impl QueueStats {
    /// Jobs not yet settled: waiting, scheduled or running.
    pub fn outstanding(&self) -> usize {
        self.pending + self.delayed + self.processing
    }

    pub fn total(&self) -> usize {
        self.outstanding() + self.completed + self.failed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn totals() {
        let stats = QueueStats {
            pending: 1,
            processing: 2,
            completed: 3,
            failed: 4,
            delayed: 5,
        };
        assert_eq!(stats.outstanding(), 8);
        assert_eq!(stats.total(), 15);
        assert_eq!(QueueStats::default().total(), 0);
    }
}
