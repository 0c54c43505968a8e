//! Ports - 抽象化レイヤー
//!
//! 各 trait は外部システム（Redis など）や環境（時刻、乱数）への
//! インターフェースを提供し、実装の詳細を隠蔽します。

pub mod clock;
pub mod id_generator;
pub mod store;

pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::id_generator::{IdGenerator, UlidGenerator};
pub use self::store::{Store, StoreError};
