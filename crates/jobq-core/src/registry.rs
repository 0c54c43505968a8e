use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;

use crate::queue::Job;

/// Error returned by a handler. Its `Display` text becomes `Job::error`.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// What a handler produces on success; stored as `Job::result`.
pub type HandlerResult = Result<serde_json::Value, HandlerError>;

/// A handler for one job type.
///
/// Takes the whole record so the handler can look at `attempts`, `data`, etc.
#[async_trait]
pub trait JobHandler<T = serde_json::Value>: Send + Sync {
    async fn handle(&self, job: &Job<T>) -> HandlerResult;
}

/// Adapter that lets a plain async closure act as a [`JobHandler`].
///
/// ```ignore
/// queue.register("noop", handler_fn(|_job| async { HandlerResult::Ok(json!("ok")) }));
/// ```
pub struct HandlerFn<F> {
    f: F,
}

pub fn handler_fn<T, F, Fut>(f: F) -> HandlerFn<F>
where
    F: Fn(Job<T>) -> Fut + Send + Sync,
    Fut: Future<Output = HandlerResult> + Send,
{
    HandlerFn { f }
}

#[async_trait]
impl<T, F, Fut> JobHandler<T> for HandlerFn<F>
where
    T: Clone + Send + Sync + 'static,
    F: Fn(Job<T>) -> Fut + Send + Sync,
    Fut: Future<Output = HandlerResult> + Send,
{
    async fn handle(&self, job: &Job<T>) -> HandlerResult {
        (self.f)(job.clone()).await
    }
}

/// Registry of handlers (job_type -> handler).
///
/// Design:
/// - One handler per type; registering again replaces it (last writer wins).
/// - Registration is allowed while the queue is running, so the map sits
///   behind a lock. Lookups clone the `Arc` and release the lock before the
///   handler runs.
pub struct HandlerRegistry<T> {
    handlers: RwLock<HashMap<String, Arc<dyn JobHandler<T>>>>,
}

impl<T> HandlerRegistry<T> {
    pub fn new() -> Self {
        Self {
            handlers: RwLock::new(HashMap::new()),
        }
    }

    /// Register a handler for a job type, replacing any previous one.
    pub fn register(&self, job_type: impl Into<String>, handler: Arc<dyn JobHandler<T>>) {
        self.handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(job_type.into(), handler);
    }

    pub fn lookup(&self, job_type: &str) -> Option<Arc<dyn JobHandler<T>>> {
        self.handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(job_type)
            .cloned()
    }

    /// Registered type names, sorted.
    pub fn registered_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self
            .handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        types.sort();
        types
    }

    pub fn len(&self) -> usize {
        self.handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T> Default for HandlerRegistry<T> {
    fn default() -> Self {
        Self::new()
    }
}
