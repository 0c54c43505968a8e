//! JobQueueBuilder - キューの構築とワイヤリング
//!
//! # Fail-fast 設計
//! - expect_types() で必須の job type を宣言
//! - build() 時に「期待集合 ⊆ 登録済み集合」と設定値をチェック

use std::marker::PhantomData;
use std::sync::Arc;

use super::config::QueueConfig;
use super::engine::{JobQueue, Payload};
use crate::error::QueueError;
use crate::ports::{Clock, IdGenerator, Store, SystemClock, UlidGenerator};
use crate::registry::{HandlerRegistry, JobHandler};

/// Builds a [`JobQueue`].
///
/// # 使用例
/// ```ignore
/// let queue = JobQueue::<Value>::builder(store)
///     .config(QueueConfig::default().with_concurrency(10))
///     .register("email.send", SendEmail)
///     .expect_types(&["email.send"])
///     .build()?;
/// ```
pub struct JobQueueBuilder<T> {
    store: Arc<dyn Store>,
    config: QueueConfig,
    clock: Option<Arc<dyn Clock>>,
    ids: Option<Arc<dyn IdGenerator>>,
    registry: HandlerRegistry<T>,
    expected_types: Vec<String>,
    _payload: PhantomData<fn() -> T>,
}

impl<T: Payload> JobQueueBuilder<T> {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self {
            store,
            config: QueueConfig::default(),
            clock: None,
            ids: None,
            registry: HandlerRegistry::new(),
            expected_types: Vec::new(),
            _payload: PhantomData,
        }
    }

    pub fn config(mut self, config: QueueConfig) -> Self {
        self.config = config;
        self
    }

    /// Defaults to [`SystemClock`].
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Defaults to a [`UlidGenerator`] on the queue's clock.
    pub fn id_generator(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.ids = Some(ids);
        self
    }

    pub fn register<H>(self, job_type: impl Into<String>, handler: H) -> Self
    where
        H: JobHandler<T> + 'static,
    {
        self.registry.register(job_type, Arc::new(handler));
        self
    }

    /// Job types that must have a handler by the time `build()` runs.
    pub fn expect_types(mut self, job_types: &[&str]) -> Self {
        self.expected_types = job_types.iter().map(|t| t.to_string()).collect();
        self
    }

    /// # 検証
    /// - `QueueConfig::validate()`
    /// - expect_types() の job type が全て登録済みか
    pub fn build(self) -> Result<JobQueue<T>, QueueError> {
        self.config.validate()?;

        let registered = self.registry.registered_types();
        let missing: Vec<String> = self
            .expected_types
            .iter()
            .filter(|t| !registered.contains(t))
            .cloned()
            .collect();
        if !missing.is_empty() {
            return Err(QueueError::MissingHandlers(missing));
        }

        let clock = self
            .clock
            .unwrap_or_else(|| Arc::new(SystemClock) as Arc<dyn Clock>);
        let ids = self
            .ids
            .unwrap_or_else(|| Arc::new(UlidGenerator::new(Arc::clone(&clock))) as Arc<dyn IdGenerator>);

        Ok(JobQueue::from_parts(
            self.store,
            self.registry,
            self.config,
            clock,
            ids,
        ))
    }
}
