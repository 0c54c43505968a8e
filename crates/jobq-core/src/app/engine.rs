//! JobQueue - the engine the host application owns.
//!
//! # フロー
//! 1. `add()` で record を保存し、pending / delayed に id を積む
//! 2. `start()` で dispatch loop を起動
//! 3. loop が delayed → pending に昇格し、空きスロットの数だけ pop して実行
//! 4. 実行結果で record を更新（completed / retry / failed）

use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};

use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::sync::{Semaphore, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::builder::JobQueueBuilder;
use super::config::QueueConfig;
use super::dispatch_loop;
use super::status::QueueStats;
use crate::domain::{JobId, JobOptions};
use crate::error::QueueError;
use crate::ports::{Clock, IdGenerator, Store};
use crate::queue::score::{due_at, score};
use crate::queue::{Job, JobStatus, QueueKeys};
use crate::registry::{HandlerRegistry, JobHandler};

/// Bounds every job payload type must meet.
pub trait Payload: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {}

impl<T> Payload for T where T: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {}

/// Background job queue.
///
/// Cheap to clone; all clones drive the same engine.
///
/// # 使用例
/// ```ignore
/// let queue: JobQueue = JobQueue::new(Arc::new(InMemoryStore::new()), QueueConfig::default())?;
/// queue.register("noop", handler_fn(|_job| async { HandlerResult::Ok(json!("ok")) }));
/// queue.start().await?;
/// let job = queue.add("noop", json!({}), JobOptions::new()).await?;
/// ```
pub struct JobQueue<T = serde_json::Value> {
    pub(crate) inner: Arc<Inner<T>>,
}

impl<T> Clone for JobQueue<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

/// State shared by the public handle, the dispatch loop and job tasks.
pub(crate) struct Inner<T> {
    pub(crate) store: Arc<dyn Store>,
    pub(crate) registry: HandlerRegistry<T>,
    pub(crate) config: QueueConfig,
    pub(crate) keys: QueueKeys,
    pub(crate) clock: Arc<dyn Clock>,
    ids: Arc<dyn IdGenerator>,

    /// Worker slots. One permit per running job.
    pub(crate) workers: Arc<Semaphore>,

    /// Ids claimed by this process and not yet settled.
    active: Mutex<HashSet<JobId>>,

    shutdown_tx: watch::Sender<bool>,
    dispatch: tokio::sync::Mutex<Option<JoinHandle<()>>>,
}

impl<T: Payload> JobQueue<T> {
    pub fn new(store: Arc<dyn Store>, config: QueueConfig) -> Result<Self, QueueError> {
        JobQueueBuilder::new(store).config(config).build()
    }

    pub fn builder(store: Arc<dyn Store>) -> JobQueueBuilder<T> {
        JobQueueBuilder::new(store)
    }

    pub(crate) fn from_parts(
        store: Arc<dyn Store>,
        registry: HandlerRegistry<T>,
        config: QueueConfig,
        clock: Arc<dyn Clock>,
        ids: Arc<dyn IdGenerator>,
    ) -> Self {
        let (shutdown_tx, _) = watch::channel(true);
        let inner = Inner {
            store,
            registry,
            keys: QueueKeys::new(&config.key_prefix),
            workers: Arc::new(Semaphore::new(config.concurrency)),
            config,
            clock,
            ids,
            active: Mutex::new(HashSet::new()),
            shutdown_tx,
            dispatch: tokio::sync::Mutex::new(None),
        };
        Self {
            inner: Arc::new(inner),
        }
    }

    pub fn config(&self) -> &QueueConfig {
        &self.inner.config
    }

    /// Register the handler for `job_type`. A later registration for the same
    /// type replaces this one.
    pub fn register<H>(&self, job_type: impl Into<String>, handler: H)
    where
        H: JobHandler<T> + 'static,
    {
        self.inner.registry.register(job_type, Arc::new(handler));
    }

    pub fn registered_types(&self) -> Vec<String> {
        self.inner.registry.registered_types()
    }

    /// Create and enqueue a job. Returns as soon as the job is stored; the
    /// handler runs later on the dispatch loop.
    ///
    /// A store failure is returned to the caller and the job does not exist.
    pub async fn add(
        &self,
        job_type: impl Into<String>,
        data: T,
        options: JobOptions,
    ) -> Result<Job<T>, QueueError> {
        let inner = &self.inner;
        let max_attempts = options
            .max_attempts
            .unwrap_or(inner.config.default_max_attempts);
        if max_attempts == 0 {
            return Err(QueueError::InvalidOptions(
                "max_attempts must be at least 1".into(),
            ));
        }

        let now = inner.clock.now();
        let job = Job::new(inner.ids.generate_job_id(), job_type, data, max_attempts, now)
            .with_priority(options.priority)
            .with_backoff(options.backoff);
        inner.save(&job).await?;

        // delayed の score は実行可能になる時刻そのもの。priority は PromotionScore::Priority の昇格時にだけ効く
        let now_ms = now.timestamp_millis();
        let (set, job_score) = match options.delay {
            Some(delay) => (inner.keys.delayed(), due_at(now_ms, delay)),
            None => (
                inner.keys.pending(),
                score(now_ms, None, options.priority, inner.config.priority_weight_ms),
            ),
        };
        inner
            .store
            .sorted_set_add(set, job_score, &job.id.to_string())
            .await?;

        debug!(
            job_id = %job.id,
            job_type = %job.job_type,
            score = job_score,
            delayed = options.delay.is_some(),
            "job added"
        );
        Ok(job)
    }

    pub async fn get_job(&self, id: JobId) -> Result<Option<Job<T>>, QueueError> {
        self.inner.load(id).await
    }

    pub async fn get_status(&self, id: JobId) -> Result<Option<JobStatus>, QueueError> {
        Ok(self.inner.load(id).await?.map(|job| job.status))
    }

    /// Size of each ordering set, each read on its own.
    pub async fn get_stats(&self) -> Result<QueueStats, QueueError> {
        let store = &self.inner.store;
        let keys = &self.inner.keys;
        Ok(QueueStats {
            pending: store.sorted_set_cardinality(keys.pending()).await?,
            processing: store.set_cardinality(keys.processing()).await?,
            completed: store.sorted_set_cardinality(keys.completed()).await?,
            failed: store.sorted_set_cardinality(keys.failed()).await?,
            delayed: store.sorted_set_cardinality(keys.delayed()).await?,
        })
    }

    /// Start the dispatch loop. Calling it while the loop runs is a no-op.
    ///
    /// With `recover_on_start`, ids a previous process left in the
    /// processing set are put back in line first.
    pub async fn start(&self) -> Result<(), QueueError> {
        let mut dispatch = self.inner.dispatch.lock().await;

        if let Some(handle) = dispatch.take() {
            if !*self.inner.shutdown_tx.borrow() && !handle.is_finished() {
                *dispatch = Some(handle);
                return Ok(());
            }
            // 停止要求済みの loop は終わるまで待つ（二重起動しない）
            let _ = handle.await;
        }

        if self.inner.config.recover_on_start {
            let recovered = self.inner.recover_orphans().await?;
            if recovered > 0 {
                info!(recovered, "requeued jobs left in processing");
            }
        }

        self.inner.shutdown_tx.send_replace(false);
        let shutdown_rx = self.inner.shutdown_tx.subscribe();
        let inner = Arc::clone(&self.inner);
        *dispatch = Some(tokio::spawn(dispatch_loop::run(inner, shutdown_rx)));
        Ok(())
    }

    /// Stop claiming new jobs. Handlers already running are not interrupted.
    pub fn stop(&self) {
        self.inner.shutdown_tx.send_replace(true);
    }

    /// `stop()`, then wait for the dispatch loop and every in-flight job.
    pub async fn shutdown(&self) {
        self.stop();
        if let Some(handle) = self.inner.dispatch.lock().await.take() {
            let _ = handle.await;
        }

        let all = u32::try_from(self.inner.config.concurrency).unwrap_or(u32::MAX);
        if let Ok(permits) = self.inner.workers.acquire_many(all).await {
            drop(permits);
        }
        info!("queue shut down");
    }

    pub async fn is_running(&self) -> bool {
        let dispatch = self.inner.dispatch.lock().await;
        !*self.inner.shutdown_tx.borrow() && dispatch.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Ids this process is currently working on.
    pub fn active_jobs(&self) -> Vec<JobId> {
        let mut ids: Vec<JobId> = self.inner.active_set().iter().copied().collect();
        ids.sort();
        ids
    }
}

impl<T: Payload> Inner<T> {
    pub(crate) async fn save(&self, job: &Job<T>) -> Result<(), QueueError> {
        let value = serde_json::to_string(job)?;
        self.store
            .put(&self.keys.job(job.id), value, self.config.job_ttl)
            .await?;
        Ok(())
    }

    pub(crate) async fn load(&self, id: JobId) -> Result<Option<Job<T>>, QueueError> {
        match self.store.get(&self.keys.job(id)).await? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    fn active_set(&self) -> std::sync::MutexGuard<'_, HashSet<JobId>> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// `false` if the id is already claimed in this process.
    pub(crate) fn mark_active(&self, id: JobId) -> bool {
        self.active_set().insert(id)
    }

    pub(crate) fn release(&self, id: JobId) {
        self.active_set().remove(&id);
    }

    fn is_active(&self, id: JobId) -> bool {
        self.active_set().contains(&id)
    }

    /// Requeue ids stuck in the processing set with no worker behind them.
    ///
    /// Jobs already out of attempts are failed instead, so `attempts` never
    /// passes `max_attempts`.
    async fn recover_orphans(&self) -> Result<usize, QueueError> {
        let processing = self.keys.processing();
        let mut recovered = 0;

        for member in self.store.set_members(processing).await? {
            let Ok(id) = member.parse::<JobId>() else {
                warn!(member = %member, "dropping unreadable processing entry");
                self.store.set_remove(processing, &member).await?;
                continue;
            };
            if self.is_active(id) {
                continue;
            }

            match self.load(id).await? {
                Some(mut job) if !job.status.is_terminal() => {
                    let now = self.clock.now();
                    if job.retries_exhausted() {
                        job.mark_failed("interrupted while processing".to_string(), now);
                        self.save(&job).await?;
                        self.store
                            .sorted_set_add(self.keys.failed(), now.timestamp_millis(), &member)
                            .await?;
                        warn!(job_id = %id, attempts = job.attempts, "orphaned job out of attempts; failed");
                    } else {
                        job.requeue();
                        self.save(&job).await?;
                        self.store
                            .sorted_set_add(self.keys.pending(), now.timestamp_millis(), &member)
                            .await?;
                        recovered += 1;
                        warn!(job_id = %id, attempts = job.attempts, "orphaned job requeued");
                    }
                }
                _ => {}
            }
            self.store.set_remove(processing, &member).await?;
        }
        Ok(recovered)
    }
}
