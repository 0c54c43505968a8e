//! Job status state machine.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Job status.
///
/// State transitions:
/// - Pending -> Processing -> Completed
/// - Pending -> Processing -> Pending (retry scheduled, loop until max_attempts)
/// - Pending -> Processing -> Failed (max_attempts reached or no handler)
///
/// A delayed job is still `Pending`; only the ordering set that holds its id
/// differs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Waiting in the pending or delayed set.
    Pending,

    /// Claimed by a worker, handler running.
    Processing,

    /// Handler succeeded.
    Completed,

    /// Failed permanently.
    Failed,
}

impl JobStatus {
    /// Is this a terminal state (no further transitions)?
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(JobStatus::Pending, false)]
    #[case(JobStatus::Processing, false)]
    #[case(JobStatus::Completed, true)]
    #[case(JobStatus::Failed, true)]
    fn terminal_states(#[case] status: JobStatus, #[case] terminal: bool) {
        assert_eq!(status.is_terminal(), terminal);
    }

    #[test]
    fn serializes_lowercase() {
        let json = serde_json::to_string(&JobStatus::Processing).unwrap();
        assert_eq!(json, "\"processing\"");
        assert_eq!(JobStatus::Failed.to_string(), "failed");
    }
}
