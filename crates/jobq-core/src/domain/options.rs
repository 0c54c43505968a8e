//! Per-job scheduling options accepted by `JobQueue::add`.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::millis;
use crate::queue::BackoffPolicy;

/// Options for a single job.
///
/// Anything left as `None` falls back to the queue's `QueueConfig`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct JobOptions {
    /// Earliest start is `now + delay`. A set delay routes the job through the
    /// delayed set even when it is zero.
    #[serde(rename = "delay_ms", with = "millis::option")]
    pub delay: Option<Duration>,

    /// Higher runs sooner. Each unit is worth `priority_weight_ms` of queue jump.
    pub priority: i64,

    pub max_attempts: Option<u32>,

    /// Overrides the queue's default backoff for this job's retries.
    pub backoff: Option<BackoffPolicy>,
}

impl JobOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn with_priority(mut self, priority: i64) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = Some(max_attempts);
        self
    }

    pub fn with_backoff(mut self, backoff: BackoffPolicy) -> Self {
        self.backoff = Some(backoff);
        self
    }
}
