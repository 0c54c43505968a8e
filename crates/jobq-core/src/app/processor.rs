//! Processor - 1 つの job を最後まで面倒を見る
//!
//! # フロー
//! 1. record を読む（無い / 終端状態ならスキップ）
//! 2. handler を引く（無ければ即 failed、retry しない）
//! 3. attempts を進めて processing に入れる
//! 4. handler 実行 → completed / retry / failed
//!
//! handler 実行前に store が落ちたら id を pending に戻す。実行後なら id は
//! processing に残り、次回 start() で回収される。
//! `Claim` を drop した時点でスロットと active id が解放される。

use std::any::Any;
use std::sync::Arc;

use tokio::sync::OwnedSemaphorePermit;
use tracing::{Instrument, debug, error, info, warn};

use super::engine::{Inner, Payload};
use crate::domain::JobId;
use crate::error::QueueError;
use crate::queue::{Job, Score};
use crate::queue::score::due_at;
use crate::registry::JobHandler;

/// A claimed job id plus the worker slot it occupies.
pub(crate) struct Claim<T: Payload> {
    inner: Arc<Inner<T>>,
    id: JobId,
    /// Pending score the id was popped at; used to put it back.
    score: Score,
    _permit: OwnedSemaphorePermit,
}

impl<T: Payload> Claim<T> {
    pub(crate) fn new(
        inner: Arc<Inner<T>>,
        id: JobId,
        score: Score,
        permit: OwnedSemaphorePermit,
    ) -> Self {
        Self {
            inner,
            id,
            score,
            _permit: permit,
        }
    }
}

impl<T: Payload> Drop for Claim<T> {
    fn drop(&mut self) {
        self.inner.release(self.id);
    }
}

/// A job whose attempt has been recorded and whose id sits in processing.
struct Started<T: Payload> {
    job: Job<T>,
    handler: Arc<dyn JobHandler<T>>,
    member: String,
}

pub(crate) async fn process<T: Payload>(claim: Claim<T>) {
    let inner = &claim.inner;

    let started = match begin(inner, claim.id).await {
        Ok(Some(started)) => started,
        Ok(None) => return,
        Err(err) => {
            // pop 済みなのでどの set にも居ない。pending に戻して次の tick で拾う
            warn!(error = %err, "store error before the handler ran; putting the job back");
            let member = claim.id.to_string();
            if let Err(err) = inner
                .store
                .sorted_set_add(inner.keys.pending(), claim.score, &member)
                .await
            {
                error!(error = %err, "could not put the job back into pending");
            }
            return;
        }
    };

    if let Err(err) = finish(inner, started).await {
        // id は processing に残っているので、次回 start() の recover_orphans が拾う
        error!(error = %err, "store error after the handler ran");
    }
}

/// Load the record and record the attempt.
///
/// Returns `None` when there is nothing to run: the record is gone, already
/// settled, or has no handler (in which case it is failed here).
async fn begin<T: Payload>(inner: &Inner<T>, id: JobId) -> Result<Option<Started<T>>, QueueError> {
    let Some(mut job) = inner.load(id).await? else {
        debug!("job record missing; skipped");
        return Ok(None);
    };
    if job.status.is_terminal() {
        debug!(status = %job.status, "job already settled; skipped");
        return Ok(None);
    }

    let member = id.to_string();

    let Some(handler) = inner.registry.lookup(&job.job_type) else {
        let now = inner.clock.now();
        job.start_attempt(now);
        job.mark_failed(
            format!("No handler registered for job type: {}", job.job_type),
            now,
        );
        inner.save(&job).await?;
        inner
            .store
            .sorted_set_add(inner.keys.failed(), now.timestamp_millis(), &member)
            .await?;
        error!(job_type = %job.job_type, "no handler registered; job failed");
        return Ok(None);
    };

    job.start_attempt(inner.clock.now());
    inner.save(&job).await?;
    inner.store.set_add(inner.keys.processing(), &member).await?;
    info!(
        job_type = %job.job_type,
        attempt = job.attempts,
        max_attempts = job.max_attempts,
        "job started"
    );

    Ok(Some(Started {
        job,
        handler,
        member,
    }))
}

/// Run the handler and settle the record.
///
/// Every branch writes the id's next set before dropping it from processing.
async fn finish<T: Payload>(inner: &Inner<T>, started: Started<T>) -> Result<(), QueueError> {
    let Started {
        mut job,
        handler,
        member,
    } = started;

    let outcome = invoke(handler, job.clone()).await;
    let now = inner.clock.now();
    let now_ms = now.timestamp_millis();

    match outcome {
        Ok(result) => {
            job.mark_completed(result, now);
            inner.save(&job).await?;
            inner
                .store
                .sorted_set_add(inner.keys.completed(), now_ms, &member)
                .await?;
            inner.store.set_remove(inner.keys.processing(), &member).await?;
            info!(attempt = job.attempts, "job completed");
        }
        Err(message) if job.retries_exhausted() => {
            job.mark_failed(message, now);
            inner.save(&job).await?;
            inner
                .store
                .sorted_set_add(inner.keys.failed(), now_ms, &member)
                .await?;
            inner.store.set_remove(inner.keys.processing(), &member).await?;
            error!(
                attempt = job.attempts,
                error = job.error.as_deref().unwrap_or_default(),
                "job failed permanently"
            );
        }
        Err(message) => {
            let delay = job
                .backoff_policy(inner.config.default_backoff)
                .delay_for(job.attempts);
            job.schedule_retry(message);
            inner.save(&job).await?;
            if delay.is_zero() {
                inner
                    .store
                    .sorted_set_add(inner.keys.pending(), now_ms, &member)
                    .await?;
            } else {
                inner
                    .store
                    .sorted_set_add(inner.keys.delayed(), due_at(now_ms, delay), &member)
                    .await?;
            }
            inner.store.set_remove(inner.keys.processing(), &member).await?;
            warn!(
                attempt = job.attempts,
                retry_in_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                error = job.error.as_deref().unwrap_or_default(),
                "job failed; retry scheduled"
            );
        }
    }
    Ok(())
}

/// Run the handler on its own task so a panic becomes an ordinary failure.
async fn invoke<T: Payload>(
    handler: Arc<dyn JobHandler<T>>,
    job: Job<T>,
) -> Result<serde_json::Value, String> {
    let task = tokio::spawn(
        async move { handler.handle(&job).await.map_err(|err| err.to_string()) }
            .in_current_span(),
    );
    match task.await {
        Ok(outcome) => outcome,
        Err(err) if err.is_panic() => Err(panic_message(err.into_panic())),
        Err(err) => Err(err.to_string()),
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        format!("handler panicked: {msg}")
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        format!("handler panicked: {msg}")
    } else {
        "handler panicked".to_string()
    }
}
