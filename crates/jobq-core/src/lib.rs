//! jobq-core
//!
//! Background job queue: priority and delay ordering, a bounded worker pool,
//! and retries with backoff, on top of a pluggable key/value store.
//!
//! # モジュール構成
//! - **domain**: ids, job options, serde helpers
//! - **queue**: job record, status, score / backoff の純粋関数, store keys
//! - **ports**: 抽象化レイヤー（Store, Clock, IdGenerator）
//! - **registry**: job type → handler
//! - **app**: エンジン本体（builder, engine, dispatch loop, processor）
//! - **impls**: 実装（InMemoryStore）

pub mod app;
pub mod domain;
pub mod error;
pub mod impls;
pub mod ports;
pub mod queue;
pub mod registry;

pub use app::{JobQueue, JobQueueBuilder, Payload, PromotionScore, QueueConfig, QueueStats};
pub use domain::{JobId, JobOptions};
pub use error::QueueError;
pub use impls::InMemoryStore;
pub use ports::{Clock, IdGenerator, Store, StoreError, SystemClock};
pub use queue::{BackoffPolicy, Job, JobStatus};
pub use registry::{HandlerError, HandlerResult, JobHandler, handler_fn};
