//! IdGenerator port - job id の採番
//!
//! # 実装
//! - **UlidGenerator**: Clock の時刻 + 乱数 80 bit

use crate::domain::JobId;
use crate::ports::Clock;
use ulid::Ulid;

/// Hands out job ids. Must never return the same id twice.
pub trait IdGenerator: Send + Sync {
    fn generate_job_id(&self) -> JobId;
}

/// ULID generator whose timestamp part comes from a [`Clock`].
///
/// Ids therefore sort by creation time on the queue's own clock. Under a
/// `FixedClock` only the random part differs.
pub struct UlidGenerator<C> {
    clock: C,
}

impl<C: Clock> UlidGenerator<C> {
    pub fn new(clock: C) -> Self {
        Self { clock }
    }
}

impl<C: Clock> IdGenerator for UlidGenerator<C> {
    fn generate_job_id(&self) -> JobId {
        // ULID は epoch 以前を表せない
        let timestamp_ms = u64::try_from(self.clock.now_millis()).unwrap_or(0);
        JobId::from(Ulid::from_parts(timestamp_ms, rand::random()))
    }
}
