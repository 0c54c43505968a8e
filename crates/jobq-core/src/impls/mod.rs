//! Impls - ports の実装
//!
//! # 含まれる実装
//! - **InMemoryStore**: 単一プロセス用の Store（TTL・sorted set・set）
//!
//! 外部 KV（Redis など）向けの実装は別クレートに置く想定です。

pub mod inmem_store;

pub use self::inmem_store::InMemoryStore;
