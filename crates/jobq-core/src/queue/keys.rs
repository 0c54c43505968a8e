//! Store key layout.

use crate::domain::JobId;

/// Names of the ordering sets and record keys for one queue.
///
/// With the default prefix `queue`:
/// - `queue:pending`, `queue:delayed` (sorted sets)
/// - `queue:processing` (plain set)
/// - `queue:completed`, `queue:failed` (sorted sets scored by transition time)
/// - `queue:job:<id>` (record, stored with TTL)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueKeys {
    pending: String,
    delayed: String,
    processing: String,
    completed: String,
    failed: String,
    job_prefix: String,
}

impl QueueKeys {
    pub fn new(prefix: &str) -> Self {
        Self {
            pending: format!("{prefix}:pending"),
            delayed: format!("{prefix}:delayed"),
            processing: format!("{prefix}:processing"),
            completed: format!("{prefix}:completed"),
            failed: format!("{prefix}:failed"),
            job_prefix: format!("{prefix}:job:"),
        }
    }

    pub fn pending(&self) -> &str {
        &self.pending
    }

    pub fn delayed(&self) -> &str {
        &self.delayed
    }

    pub fn processing(&self) -> &str {
        &self.processing
    }

    pub fn completed(&self) -> &str {
        &self.completed
    }

    pub fn failed(&self) -> &str {
        &self.failed
    }

    pub fn job(&self, id: JobId) -> String {
        format!("{}{id}", self.job_prefix)
    }
}

impl Default for QueueKeys {
    fn default() -> Self {
        Self::new("queue")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ulid::Ulid;

    #[test]
    fn keys_share_prefix() {
        let keys = QueueKeys::new("mail");
        assert_eq!(keys.pending(), "mail:pending");
        assert_eq!(keys.delayed(), "mail:delayed");
        assert_eq!(keys.processing(), "mail:processing");
        assert_eq!(keys.completed(), "mail:completed");
        assert_eq!(keys.failed(), "mail:failed");

        let id = JobId::from_ulid(Ulid::new());
        assert_eq!(keys.job(id), format!("mail:job:{id}"));
    }
}
