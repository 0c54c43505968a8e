use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use anyhow::Context;
use async_trait::async_trait;
use clap::Parser;
use serde::Deserialize;
use serde_json::json;
use tokio::time::{Duration, sleep};
use tracing::{info, warn};

use jobq_core::{
    BackoffPolicy, HandlerResult, InMemoryStore, Job, JobHandler, JobOptions, JobQueue,
    QueueConfig, QueueStats, handler_fn,
};

/// Demo driver for the job queue: enqueues a mix of jobs against an
/// in-memory store and reports progress until they all settle.
#[derive(Parser, Debug)]
#[command(name = "jobq", version, about)]
struct Cli {
    /// Queue config as JSON; missing keys keep their defaults
    #[arg(long)]
    config: Option<PathBuf>,

    /// Overrides `concurrency` from the config
    #[arg(short, long)]
    concurrency: Option<usize>,

    /// Number of "hello" jobs to enqueue
    #[arg(short = 'n', long, default_value_t = 10)]
    jobs: u32,

    /// Failures each "hello" handler call burns through before succeeding
    #[arg(long, default_value_t = 2)]
    flaky: u32,

    /// Used when RUST_LOG is not set
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[derive(Debug, Deserialize)]
struct HelloPayload {
    name: String,
}

/// Fails the first `remaining_failures` calls, then greets.
struct HelloHandler {
    remaining_failures: AtomicU32,
}

impl HelloHandler {
    fn new(n: u32) -> Self {
        Self {
            remaining_failures: AtomicU32::new(n),
        }
    }
}

#[async_trait]
impl JobHandler for HelloHandler {
    async fn handle(&self, job: &Job) -> HandlerResult {
        let payload: HelloPayload = serde_json::from_value(job.data.clone())?;

        let left = self.remaining_failures.load(Ordering::Relaxed);
        if left > 0 {
            self.remaining_failures.fetch_sub(1, Ordering::Relaxed);
            return Err(format!("intentional failure (left={left})").into());
        }

        info!(name = %payload.name, attempt = job.attempts, "hello");
        Ok(json!({ "greeted": payload.name }))
    }
}

fn setup_tracing(default_level: &str) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_level(true)
        .compact()
        .init();
}

fn load_config(cli: &Cli) -> anyhow::Result<QueueConfig> {
    let mut config = match &cli.config {
        Some(path) => {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("reading {}", path.display()))?;
            serde_json::from_str(&raw).with_context(|| format!("parsing {}", path.display()))?
        }
        None => QueueConfig::default()
            .with_default_backoff(BackoffPolicy::exponential(Duration::from_millis(200))),
    };
    if let Some(concurrency) = cli.concurrency {
        config = config.with_concurrency(concurrency);
    }
    Ok(config)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    setup_tracing(&cli.log_level);

    // (A) Store と Queue を用意
    let config = load_config(&cli)?;
    let queue: JobQueue = JobQueue::builder(Arc::new(InMemoryStore::new()))
        .config(config)
        .register("hello", HelloHandler::new(cli.flaky))
        .register(
            "always_fails",
            handler_fn(|_job: Job| async { HandlerResult::Err("this job never works".into()) }),
        )
        .expect_types(&["hello", "always_fails"])
        .build()?;

    // (B) dispatch loop を起動
    queue.start().await?;

    // (C) ジョブ投入：通常・優先度つき・遅延・失敗し続ける・handler 無し
    for i in 0..cli.jobs {
        let priority = if i % 3 == 0 { 5 } else { 0 };
        queue
            .add(
                "hello",
                json!({ "name": format!("job-{i}") }),
                JobOptions::new().with_priority(priority),
            )
            .await?;
    }
    queue
        .add(
            "hello",
            json!({ "name": "later" }),
            JobOptions::new().with_delay(Duration::from_millis(500)),
        )
        .await?;
    queue
        .add(
            "always_fails",
            json!({}),
            JobOptions::new().with_max_attempts(2),
        )
        .await?;
    queue.add("mystery", json!({}), JobOptions::new()).await?;

    // (D) 全件が completed / failed に落ち着くまで待つ（Ctrl-C で中断）
    let settled = tokio::select! {
        stats = wait_until_settled(&queue) => Some(stats?),
        _ = tokio::signal::ctrl_c() => {
            warn!("interrupted");
            None
        }
    };
    if let Some(stats) = settled {
        info!(
            completed = stats.completed,
            failed = stats.failed,
            "all jobs settled"
        );
    }

    // (E) in-flight の job を待ってから終了
    queue.shutdown().await;
    Ok(())
}

async fn wait_until_settled(queue: &JobQueue) -> anyhow::Result<QueueStats> {
    let mut last = QueueStats::default();
    loop {
        let stats = queue.get_stats().await?;
        if stats != last {
            info!(
                pending = stats.pending,
                delayed = stats.delayed,
                processing = stats.processing,
                completed = stats.completed,
                failed = stats.failed,
                "stats"
            );
            last = stats;
        }
        if stats.outstanding() == 0 && queue.active_jobs().is_empty() {
            return Ok(stats);
        }
        sleep(Duration::from_millis(100)).await;
    }
}
