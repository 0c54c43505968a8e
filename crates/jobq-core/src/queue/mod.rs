//! Queue model: job record, status machine, score and backoff functions.

mod keys;
mod record;
mod retry;
pub mod score;
mod state;

pub use keys::QueueKeys;
pub use record::Job;
pub use retry::BackoffPolicy;
pub use score::Score;
pub use state::JobStatus;
