//! Store port - 永続化のための key/value + sorted set プリミティブ
//!
//! The queue never talks to a concrete database. Everything it needs from
//! durable storage is one of the primitives below; a Redis-style server maps
//! onto them one to one (`SET EX`, `GET`, `ZADD`, `ZPOPMIN`, `ZRANGEBYSCORE`,
//! `ZREM`, `SADD`, `SREM`, `SMEMBERS`, `SCARD`, `ZCARD`).
//!
//! # 設計原則
//! - Store が正本（source of truth）
//! - `sorted_set_pop_min` は 1 回のアトミック操作（peek + delete ではない）

use std::time::Duration;

use async_trait::async_trait;

use crate::queue::Score;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("store operation failed: {0}")]
    Backend(String),
}

/// Durable key/value and ordering primitives consumed by the queue.
#[async_trait]
pub trait Store: Send + Sync {
    /// Upsert `value` under `key`, expiring after `ttl`.
    async fn put(&self, key: &str, value: String, ttl: Duration) -> Result<(), StoreError>;

    /// `None` when the key is absent or expired.
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Insert `member`, or move it to `score` if already present.
    async fn sorted_set_add(&self, set: &str, score: Score, member: &str)
    -> Result<(), StoreError>;

    /// Remove and return the lowest-scored member atomically.
    async fn sorted_set_pop_min(&self, set: &str) -> Result<Option<(String, Score)>, StoreError>;

    /// Members with `min <= score <= max`, ascending.
    async fn sorted_set_range_by_score(
        &self,
        set: &str,
        min: Score,
        max: Score,
    ) -> Result<Vec<String>, StoreError>;

    /// `true` if the member was present.
    async fn sorted_set_remove(&self, set: &str, member: &str) -> Result<bool, StoreError>;

    async fn sorted_set_cardinality(&self, set: &str) -> Result<usize, StoreError>;

    async fn set_add(&self, set: &str, member: &str) -> Result<(), StoreError>;

    /// `true` if the member was present.
    async fn set_remove(&self, set: &str, member: &str) -> Result<bool, StoreError>;

    async fn set_members(&self, set: &str) -> Result<Vec<String>, StoreError>;

    async fn set_cardinality(&self, set: &str) -> Result<usize, StoreError>;
}
