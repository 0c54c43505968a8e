//! Domain model: identifiers and per-job options.

pub mod ids;
pub mod millis;
pub mod options;

pub use ids::{JobId, ParseJobIdError};
pub use options::JobOptions;
