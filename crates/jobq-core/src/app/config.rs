//! QueueConfig - キューの設定
//!
//! Every field has a default, so a config file only needs the keys it
//! changes:
//!
//! ```json
//! { "concurrency": 10, "poll_interval_ms": 50, "promotion": "priority" }
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::domain::millis;
use crate::error::QueueError;
use crate::queue::BackoffPolicy;
use crate::queue::score::DEFAULT_PRIORITY_WEIGHT_MS;

/// Score given to a delayed job when it is promoted into the pending set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PromotionScore {
    /// `now`. Promoted jobs lose their priority relative to each other and
    /// to jobs added without a delay.
    #[default]
    Now,

    /// `now - priority * priority_weight_ms`, keeping relative priority.
    Priority,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Maximum number of handlers running at once.
    pub concurrency: usize,

    /// Sleep between dispatch loop iterations.
    #[serde(rename = "poll_interval_ms", with = "millis")]
    pub poll_interval: Duration,

    /// Sleep after a failed dispatch loop iteration.
    #[serde(rename = "error_backoff_ms", with = "millis")]
    pub error_backoff: Duration,

    /// Lifetime of a job record in the store.
    #[serde(rename = "job_ttl_ms", with = "millis")]
    pub job_ttl: Duration,

    pub priority_weight_ms: i64,
    pub default_max_attempts: u32,
    pub default_backoff: BackoffPolicy,
    pub promotion: PromotionScore,

    /// Prefix for every store key this queue touches.
    pub key_prefix: String,

    /// Put ids left in the processing set by a previous process back into
    /// pending when the queue starts.
    pub recover_on_start: bool,
}

impl QueueConfig {
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn with_error_backoff(mut self, error_backoff: Duration) -> Self {
        self.error_backoff = error_backoff;
        self
    }

    pub fn with_job_ttl(mut self, job_ttl: Duration) -> Self {
        self.job_ttl = job_ttl;
        self
    }

    pub fn with_priority_weight_ms(mut self, weight: i64) -> Self {
        self.priority_weight_ms = weight;
        self
    }

    pub fn with_default_max_attempts(mut self, max_attempts: u32) -> Self {
        self.default_max_attempts = max_attempts;
        self
    }

    pub fn with_default_backoff(mut self, backoff: BackoffPolicy) -> Self {
        self.default_backoff = backoff;
        self
    }

    pub fn with_promotion(mut self, promotion: PromotionScore) -> Self {
        self.promotion = promotion;
        self
    }

    pub fn with_key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = prefix.into();
        self
    }

    pub fn with_recover_on_start(mut self, recover: bool) -> Self {
        self.recover_on_start = recover;
        self
    }

    /// Fail fast on settings the engine cannot run with.
    pub fn validate(&self) -> Result<(), QueueError> {
        if self.concurrency == 0 {
            return Err(QueueError::InvalidConfig("concurrency must be at least 1".into()));
        }
        if self.default_max_attempts == 0 {
            return Err(QueueError::InvalidConfig(
                "default_max_attempts must be at least 1".into(),
            ));
        }
        if self.poll_interval.is_zero() {
            return Err(QueueError::InvalidConfig("poll_interval must be non-zero".into()));
        }
        if self.job_ttl.is_zero() {
            return Err(QueueError::InvalidConfig("job_ttl must be non-zero".into()));
        }
        if self.priority_weight_ms < 0 {
            return Err(QueueError::InvalidConfig(
                "priority_weight_ms must not be negative".into(),
            ));
        }
        if self.key_prefix.is_empty() {
            return Err(QueueError::InvalidConfig("key_prefix must not be empty".into()));
        }
        Ok(())
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            concurrency: 5,
            poll_interval: Duration::from_millis(100),
            error_backoff: Duration::from_secs(1),
            job_ttl: Duration::from_secs(24 * 60 * 60),
            priority_weight_ms: DEFAULT_PRIORITY_WEIGHT_MS,
            default_max_attempts: 3,
            default_backoff: BackoffPolicy::default(),
            promotion: PromotionScore::Now,
            key_prefix: "queue".to_string(),
            recover_on_start: true,
        }
    }
}
