//! Dispatch loop - 昇格と取り出し
//!
//! # フロー（1 iteration）
//! 1. delayed のうち score ≤ now のものを pending へ昇格
//! 2. 空きスロットがある限り pending から pop-min して job task を spawn
//! 3. poll_interval だけ眠る（エラー時は error_backoff）
//!
//! loop 自身はエラーで終了しない。止めるのは shutdown 信号だけ。
//!
//! 昇格は range 取得 + member ごとの add / remove で、store 上の 1 操作ではない。
//! 同じ key prefix の delayed を動かす loop が 1 本だけであることが前提
//! （単一 consumer）。

use std::sync::Arc;

use tokio::sync::watch;
use tracing::{Instrument, debug, error, info, info_span, warn};

use super::config::PromotionScore;
use super::engine::{Inner, Payload};
use super::processor::{self, Claim};
use crate::domain::JobId;
use crate::error::QueueError;
use crate::queue::Score;
use crate::queue::score::score;

pub(crate) async fn run<T: Payload>(inner: Arc<Inner<T>>, mut shutdown_rx: watch::Receiver<bool>) {
    info!(
        concurrency = inner.config.concurrency,
        prefix = %inner.config.key_prefix,
        "dispatch loop started"
    );

    loop {
        if *shutdown_rx.borrow() {
            break;
        }

        let pause = match tick(&inner).await {
            Ok(()) => inner.config.poll_interval,
            Err(err) => {
                error!(error = %err, "dispatch iteration failed; backing off");
                inner.config.error_backoff
            }
        };

        // 眠っている間に stop() が来たらすぐ起きる
        tokio::select! {
            _ = shutdown_rx.changed() => {}
            _ = tokio::time::sleep(pause) => {}
        }
    }

    info!("dispatch loop stopped");
}

async fn tick<T: Payload>(inner: &Arc<Inner<T>>) -> Result<(), QueueError> {
    promote_due(inner).await?;
    fill_slots(inner).await
}

/// Move every due id from delayed to pending.
///
/// The id is added to pending before it is removed from delayed, so a
/// failure in between leaves it in both sets rather than in neither.
/// The move is not atomic; a second loop on the same sets could promote the
/// same member twice.
async fn promote_due<T: Payload>(inner: &Inner<T>) -> Result<usize, QueueError> {
    let now_ms = inner.clock.now_millis();
    let due = inner
        .store
        .sorted_set_range_by_score(inner.keys.delayed(), Score::MIN, now_ms)
        .await?;

    for member in &due {
        let promoted = match inner.config.promotion {
            PromotionScore::Now => now_ms,
            PromotionScore::Priority => {
                let priority = match member.parse::<JobId>() {
                    Ok(id) => inner.load(id).await?.map_or(0, |job| job.priority),
                    Err(_) => 0,
                };
                score(now_ms, None, priority, inner.config.priority_weight_ms)
            }
        };
        inner
            .store
            .sorted_set_add(inner.keys.pending(), promoted, member)
            .await?;
        inner
            .store
            .sorted_set_remove(inner.keys.delayed(), member)
            .await?;
    }

    if !due.is_empty() {
        debug!(count = due.len(), "promoted delayed jobs");
    }
    Ok(due.len())
}

/// Claim pending ids until the pool is full or pending is empty.
async fn fill_slots<T: Payload>(inner: &Arc<Inner<T>>) -> Result<(), QueueError> {
    loop {
        let Ok(permit) = Arc::clone(&inner.workers).try_acquire_owned() else {
            return Ok(());
        };
        let Some((member, claimed_score)) =
            inner.store.sorted_set_pop_min(inner.keys.pending()).await?
        else {
            return Ok(());
        };

        let id = match member.parse::<JobId>() {
            Ok(id) => id,
            Err(err) => {
                warn!(member = %member, error = %err, "dropping unreadable pending entry");
                continue;
            }
        };

        if !inner.mark_active(id) {
            // まだ前の実行を片付けている最中。戻して次の tick で拾う
            inner
                .store
                .sorted_set_add(inner.keys.pending(), claimed_score, &member)
                .await?;
            debug!(job_id = %id, "job still active here; put back");
            return Ok(());
        }

        let claim = Claim::new(Arc::clone(inner), id, claimed_score, permit);
        let span = info_span!("job", job_id = %id);
        tokio::spawn(processor::process(claim).instrument(span));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::config::QueueConfig;
    use crate::domain::JobOptions;
    use crate::app::engine::JobQueue;
    use crate::impls::InMemoryStore;
    use crate::ports::{Clock, FixedClock, Store};
    use chrono::{TimeZone, Utc};
    use serde_json::{Value, json};
    use std::time::Duration;

    fn fixture(promotion: PromotionScore) -> (JobQueue<Value>, Arc<InMemoryStore>, Arc<FixedClock>) {
        let clock = Arc::new(FixedClock::new(
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
        ));
        let store = Arc::new(InMemoryStore::with_clock(clock.clone()));
        let queue = JobQueue::builder(store.clone())
            .config(QueueConfig::default().with_promotion(promotion))
            .clock(clock.clone())
            .build()
            .unwrap();
        (queue, store, clock)
    }

    #[tokio::test]
    async fn promotes_only_due_entries() {
        let (queue, store, clock) = fixture(PromotionScore::Now);
        let soon = queue
            .add("t", json!({}), JobOptions::new().with_delay(Duration::from_millis(100)))
            .await
            .unwrap();
        queue
            .add("t", json!({}), JobOptions::new().with_delay(Duration::from_secs(60)))
            .await
            .unwrap();

        assert_eq!(promote_due(&queue.inner).await.unwrap(), 0);

        clock.advance(chrono::Duration::milliseconds(100));
        assert_eq!(promote_due(&queue.inner).await.unwrap(), 1);

        assert_eq!(store.sorted_set_cardinality("queue:delayed").await.unwrap(), 1);
        let (member, promoted) = store.sorted_set_pop_min("queue:pending").await.unwrap().unwrap();
        assert_eq!(member, soon.id.to_string());
        assert_eq!(promoted, clock.now_millis());
    }

    #[tokio::test]
    async fn priority_does_not_shorten_the_delay() {
        let (queue, store, clock) = fixture(PromotionScore::Priority);
        queue
            .add(
                "t",
                json!({}),
                JobOptions::new()
                    .with_delay(Duration::from_millis(500))
                    .with_priority(1),
            )
            .await
            .unwrap();

        clock.advance(chrono::Duration::milliseconds(499));
        assert_eq!(promote_due(&queue.inner).await.unwrap(), 0);
        assert_eq!(store.sorted_set_cardinality("queue:pending").await.unwrap(), 0);

        clock.advance(chrono::Duration::milliseconds(1));
        assert_eq!(promote_due(&queue.inner).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn priority_promotion_keeps_priority_offset() {
        let (queue, store, clock) = fixture(PromotionScore::Priority);
        queue
            .add(
                "t",
                json!({}),
                JobOptions::new()
                    .with_delay(Duration::from_millis(10))
                    .with_priority(2),
            )
            .await
            .unwrap();

        clock.advance(chrono::Duration::milliseconds(10));
        promote_due(&queue.inner).await.unwrap();

        let (_, promoted) = store.sorted_set_pop_min("queue:pending").await.unwrap().unwrap();
        assert_eq!(promoted, clock.now_millis() - 2_000);
    }

    #[tokio::test]
    async fn tick_surfaces_store_errors() {
        let (queue, store, _clock) = fixture(PromotionScore::Now);
        store.set_unavailable(true);
        assert!(matches!(tick(&queue.inner).await, Err(QueueError::Store(_))));
    }
}
