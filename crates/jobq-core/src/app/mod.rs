//! App - アプリケーション層
//!
//! ports を組み合わせてキューエンジンを組み立てます。
//!
//! # 主要コンポーネント
//! - **JobQueueBuilder**: 構築とワイヤリング（fail-fast 検証つき）
//! - **JobQueue**: add / get / stats / start / stop の表面
//! - **dispatch_loop**: delayed の昇格と pending からの取り出し
//! - **processor**: 1 job の実行と状態遷移

pub mod builder;
pub mod config;
mod dispatch_loop;
pub mod engine;
mod processor;
pub mod status;

pub use self::builder::JobQueueBuilder;
pub use self::config::{PromotionScore, QueueConfig};
pub use self::engine::{JobQueue, Payload};
pub use self::status::QueueStats;
