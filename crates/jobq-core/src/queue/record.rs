//! Job record: the durable unit of state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{BackoffPolicy, JobStatus};
use crate::domain::JobId;

/// A job as persisted in the store.
///
/// Design:
/// - This is the "single source of truth" for job state.
/// - Ordering sets (pending/delayed/processing/...) hold the id only.
/// - All status transitions happen through the methods below.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job<T = serde_json::Value> {
    pub id: JobId,

    /// Handler lookup key.
    #[serde(rename = "type")]
    pub job_type: String,

    /// Opaque payload, never inspected by the queue.
    pub data: T,

    pub status: JobStatus,

    /// Handler invocations so far, including the current one while Processing.
    pub attempts: u32,
    pub max_attempts: u32,

    pub priority: i64,

    /// Per-job override of the queue's backoff policy.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backoff: Option<BackoffPolicy>,

    pub created_at: DateTime<Utc>,

    /// Overwritten on every attempt.
    pub processed_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub failed_at: Option<DateTime<Utc>>,

    /// Last error message (if any).
    pub error: Option<String>,

    /// Handler return value, set on completion.
    pub result: Option<serde_json::Value>,
}

impl<T> Job<T> {
    pub fn new(
        id: JobId,
        job_type: impl Into<String>,
        data: T,
        max_attempts: u32,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            job_type: job_type.into(),
            data,
            status: JobStatus::Pending,
            attempts: 0,
            max_attempts,
            priority: 0,
            backoff: None,
            created_at: now,
            processed_at: None,
            completed_at: None,
            failed_at: None,
            error: None,
            result: None,
        }
    }

    pub fn with_priority(mut self, priority: i64) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_backoff(mut self, backoff: Option<BackoffPolicy>) -> Self {
        self.backoff = backoff;
        self
    }

    /// Mark as processing (increment attempts).
    pub fn start_attempt(&mut self, now: DateTime<Utc>) {
        self.status = JobStatus::Processing;
        self.processed_at = Some(now);
        self.attempts += 1;
    }

    pub fn mark_completed(&mut self, result: serde_json::Value, now: DateTime<Utc>) {
        self.status = JobStatus::Completed;
        self.completed_at = Some(now);
        self.result = Some(result);
    }

    /// Mark as failed permanently.
    pub fn mark_failed(&mut self, error: String, now: DateTime<Utc>) {
        self.status = JobStatus::Failed;
        self.failed_at = Some(now);
        self.error = Some(error);
    }

    /// Back to pending; the caller decides where the id goes next.
    pub fn schedule_retry(&mut self, error: String) {
        self.status = JobStatus::Pending;
        self.error = Some(error);
    }

    /// Put an interrupted job back in line without recording an error.
    pub fn requeue(&mut self) {
        self.status = JobStatus::Pending;
    }

    pub fn retries_exhausted(&self) -> bool {
        self.attempts >= self.max_attempts
    }

    /// The job's own policy, or `default` when it has none.
    pub fn backoff_policy(&self, default: BackoffPolicy) -> BackoffPolicy {
        self.backoff.unwrap_or(default)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::time::Duration;
    use ulid::Ulid;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap()
    }

    fn job() -> Job {
        Job::new(
            JobId::from_ulid(Ulid::new()),
            "email.send",
            serde_json::json!({ "to": "a@example.com" }),
            3,
            t0(),
        )
    }

    #[test]
    fn new_job_starts_pending() {
        let job = job();
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.attempts, 0);
        assert!(job.error.is_none());
        assert!(job.result.is_none());
        assert!(job.processed_at.is_none());
    }

    #[test]
    fn start_attempt_increments_and_overwrites_processed_at() {
        let mut job = job();
        job.start_attempt(t0());
        assert_eq!(job.attempts, 1);
        assert_eq!(job.status, JobStatus::Processing);

        let later = t0() + chrono::Duration::seconds(5);
        job.schedule_retry("boom".into());
        job.start_attempt(later);
        assert_eq!(job.attempts, 2);
        assert_eq!(job.processed_at, Some(later));
        assert_eq!(job.error.as_deref(), Some("boom"));
    }

    #[test]
    fn completion_records_result() {
        let mut job = job();
        job.start_attempt(t0());
        job.mark_completed(serde_json::json!("ok"), t0());
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.result, Some(serde_json::json!("ok")));
        assert_eq!(job.completed_at, Some(t0()));
    }

    #[test]
    fn retries_exhausted_at_max() {
        let mut job = job();
        for _ in 0..2 {
            job.start_attempt(t0());
            assert!(!job.retries_exhausted());
        }
        job.start_attempt(t0());
        assert!(job.retries_exhausted());

        job.mark_failed("x".into(), t0());
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.failed_at, Some(t0()));
    }

    #[test]
    fn backoff_policy_prefers_job_override() {
        let default = BackoffPolicy::default();
        let own = BackoffPolicy::fixed(Duration::from_millis(10));

        assert_eq!(job().backoff_policy(default), default);
        assert_eq!(job().with_backoff(Some(own)).backoff_policy(default), own);
    }

    #[test]
    fn record_serializes_type_field() {
        let json = serde_json::to_value(job()).unwrap();
        assert_eq!(json["type"], "email.send");
        assert_eq!(json["status"], "pending");

        let back: Job = serde_json::from_value(json).unwrap();
        assert_eq!(back.job_type, "email.send");
    }
}
