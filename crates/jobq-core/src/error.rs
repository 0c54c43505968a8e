use thiserror::Error;

use crate::domain::ParseJobIdError;
use crate::ports::StoreError;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("job record serialization: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    InvalidJobId(#[from] ParseJobIdError),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("invalid job options: {0}")]
    InvalidOptions(String),

    #[error("missing handlers for job types: {0:?}")]
    MissingHandlers(Vec<String>),
}
