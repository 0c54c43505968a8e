//! Job identifiers.
//!
//! ULID を包んだ newtype。先頭が timestamp なので作成順に並ぶ。
//!
//! The store only sees the `Display` form (`job-<ulid>`), which is used both
//! as the record key suffix and as the member name in the ordering sets.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use ulid::Ulid;

const PREFIX: &str = "job-";

/// Identifier of a job. Generated once at creation and never reused.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct JobId(Ulid);

impl JobId {
    pub fn from_ulid(ulid: Ulid) -> Self {
        Self(ulid)
    }

    pub fn as_ulid(&self) -> Ulid {
        self.0
    }
}

impl From<Ulid> for JobId {
    fn from(ulid: Ulid) -> Self {
        Self::from_ulid(ulid)
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{PREFIX}{}", self.0)
    }
}

/// Returned when a store member cannot be read back as a [`JobId`].
#[derive(Debug, thiserror::Error)]
#[error("invalid job id: {0}")]
pub struct ParseJobIdError(String);

impl FromStr for JobId {
    type Err = ParseJobIdError;

    /// Accepts both `job-<ulid>` and a bare ULID.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = s.strip_prefix(PREFIX).unwrap_or(s);
        Ulid::from_string(raw)
            .map(JobId)
            .map_err(|_| ParseJobIdError(s.to_string()))
    }
}
