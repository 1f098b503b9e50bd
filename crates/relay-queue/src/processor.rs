//! Single-worker job processor
//!
//! One job at a time, end to end: fetch, then either the rate-limit branch or
//! transform and deliver. Every step reports an explicit outcome; nothing a
//! single job does can stop the loop.

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::backend::QueueBackend;
use crate::delivery::{CallbackClient, CallbackPayload, DeliveryOutcome};
use crate::fetch::{FetchOutcome, FetchedResponse, SourceClient};
use crate::job::{BackoffStrategy, FetchJob, MAX_RATE_LIMIT_RETRIES};
use crate::stats::ProcessorStats;
use crate::transform;

/// Pause after a queue backend error before polling again
const BACKEND_ERROR_PAUSE: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy)]
pub struct ProcessorConfig {
    /// How long one dequeue waits for work before the loop comes around
    pub idle_wait: Duration,
    pub fetch_timeout: Duration,
    pub delivery_timeout: Duration,
    /// Pause applied after requeueing a rate-limited job
    pub rate_limit_backoff: BackoffStrategy,
    /// Self-throttle after every job that did not hit a rate limit
    pub inter_job_delay: Duration,
    /// A job is dropped once its retry count reaches this value
    pub max_rate_limit_retries: u32,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            idle_wait: Duration::from_millis(100),
            fetch_timeout: Duration::from_secs(10),
            delivery_timeout: Duration::from_secs(5),
            rate_limit_backoff: BackoffStrategy::default(),
            inter_job_delay: Duration::from_secs(3),
            max_rate_limit_retries: MAX_RATE_LIMIT_RETRIES,
        }
    }
}

impl ProcessorConfig {
    /// Create from environment variables, keeping defaults for anything
    /// absent or unparsable
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            fetch_timeout: env_secs("RELAY_FETCH_TIMEOUT_SECS").unwrap_or(defaults.fetch_timeout),
            delivery_timeout: env_secs("RELAY_DELIVERY_TIMEOUT_SECS")
                .unwrap_or(defaults.delivery_timeout),
            rate_limit_backoff: env_secs("RELAY_RATE_LIMIT_BACKOFF_SECS")
                .map(BackoffStrategy::Constant)
                .unwrap_or(defaults.rate_limit_backoff),
            inter_job_delay: env_secs("RELAY_INTER_JOB_DELAY_SECS")
                .unwrap_or(defaults.inter_job_delay),
            max_rate_limit_retries: std::env::var("RELAY_MAX_RATE_LIMIT_RETRIES")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.max_rate_limit_retries),
            ..defaults
        }
    }
}

fn env_secs(name: &str) -> Option<Duration> {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .map(Duration::from_secs)
}

/// Result of one processing pass over a job
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    /// Upstream answered 429; the job went to the back of the queue
    Requeued { retry_count: u32 },
    /// Upstream answered 429 and the retry ceiling was reached; job dropped
    RateLimitExhausted { retry_count: u32 },
    /// Network, timeout or request construction failure; job dropped
    FetchFailed(String),
    /// Fetched, formatted and (if configured) delivered
    Completed {
        status: u16,
        posts: String,
        delivery: DeliveryOutcome,
    },
}

impl JobOutcome {
    /// How long the processor sleeps before taking the next job.
    ///
    /// Both rate-limit outcomes bypass the inter-job delay: a requeue waits
    /// out the backoff instead, and a dropped job moves straight on.
    pub fn pause(&self, config: &ProcessorConfig) -> Duration {
        match self {
            Self::Requeued { retry_count } => config.rate_limit_backoff.delay(*retry_count),
            Self::RateLimitExhausted { .. } => Duration::ZERO,
            Self::FetchFailed(_) | Self::Completed { .. } => config.inter_job_delay,
        }
    }
}

pub struct Processor<B: QueueBackend + ?Sized> {
    backend: Arc<B>,
    source: SourceClient,
    callback: CallbackClient,
    config: ProcessorConfig,
    stats: Arc<ProcessorStats>,
}

impl<B: QueueBackend + 'static> Processor<B> {
    pub fn new(backend: B, config: ProcessorConfig) -> Self {
        Self::new_with_arc(Arc::new(backend), config)
    }
}

impl<B: QueueBackend + ?Sized + 'static> Processor<B> {
    /// Create a processor over an existing Arc backend (supports dyn dispatch)
    pub fn new_with_arc(backend: Arc<B>, config: ProcessorConfig) -> Self {
        let client = reqwest::Client::new();
        Self {
            backend,
            source: SourceClient::new(client.clone()),
            callback: CallbackClient::new(client),
            config,
            stats: Arc::new(ProcessorStats::new()),
        }
    }

    pub fn backend(&self) -> Arc<B> {
        self.backend.clone()
    }

    pub fn stats(&self) -> Arc<ProcessorStats> {
        self.stats.clone()
    }

    /// Drain the queue forever, one job at a time.
    pub async fn run(&self) {
        info!(
            max_rate_limit_retries = self.config.max_rate_limit_retries,
            inter_job_delay_ms = self.config.inter_job_delay.as_millis() as u64,
            "Job processor started"
        );

        loop {
            self.tick().await;
        }
    }

    /// One loop iteration: wait for a job, process it, then pause.
    /// Returns `None` when no job arrived within `idle_wait`.
    pub async fn tick(&self) -> Option<JobOutcome> {
        match self.backend.dequeue(self.config.idle_wait).await {
            Ok(Some(job)) => {
                let outcome = self.process(job).await;
                tokio::time::sleep(outcome.pause(&self.config)).await;
                Some(outcome)
            }
            Ok(None) => None,
            Err(e) => {
                error!(error = %e, "Queue error");
                tokio::time::sleep(BACKEND_ERROR_PAUSE).await;
                None
            }
        }
    }

    /// Run a single job through fetch, transform and delivery.
    ///
    /// Does not sleep; pacing is applied by [`Processor::tick`].
    pub async fn process(&self, job: FetchJob) -> JobOutcome {
        info!(
            job_id = %job.id,
            source = job.source_url.as_deref().unwrap_or("<none>"),
            retry_count = job.retry_count,
            "Processing job"
        );

        let fetched = self.source.fetch(&job, self.config.fetch_timeout).await;
        let outcome = match fetched {
            Ok(FetchOutcome::RateLimited) => self.handle_rate_limit(job).await,
            Ok(FetchOutcome::Fetched(response)) => self.complete(&job, response).await,
            Err(e) => {
                error!(job_id = %job.id, error = %e, "Fetch failed, dropping job");
                JobOutcome::FetchFailed(e.to_string())
            }
        };

        self.stats.record(&outcome);
        outcome
    }

    async fn handle_rate_limit(&self, mut job: FetchJob) -> JobOutcome {
        let job_id = job.id;
        let retry_count = job.record_rate_limit();

        if retry_count >= self.config.max_rate_limit_retries {
            warn!(
                job_id = %job_id,
                retry_count = retry_count,
                "Rate limit retries exhausted, dropping job"
            );
            return JobOutcome::RateLimitExhausted { retry_count };
        }

        match self.backend.enqueue(job).await {
            Ok(queue_size) => {
                warn!(
                    job_id = %job_id,
                    retry_count = retry_count,
                    queue_size = queue_size,
                    "Rate limited, requeueing job"
                );
                JobOutcome::Requeued { retry_count }
            }
            Err(e) => {
                error!(job_id = %job_id, error = %e, "Failed to requeue rate-limited job");
                JobOutcome::FetchFailed(format!("Requeue failed: {}", e))
            }
        }
    }

    async fn complete(&self, job: &FetchJob, response: FetchedResponse) -> JobOutcome {
        let status = response.status.as_u16();
        let posts = transform::format_posts(&response.body);

        let delivery = match job.callback_url.as_deref() {
            None => {
                debug!(job_id = %job.id, "No callback configured, skipping delivery");
                DeliveryOutcome::Skipped
            }
            Some(url) => {
                let payload = CallbackPayload::for_job(job, status, posts.clone());
                match self
                    .callback
                    .deliver(url, &payload, self.config.delivery_timeout)
                    .await
                {
                    Ok(callback_status) => {
                        info!(
                            job_id = %job.id,
                            callback_status = callback_status,
                            "Callback delivered"
                        );
                        DeliveryOutcome::Delivered(callback_status)
                    }
                    Err(e) => {
                        warn!(job_id = %job.id, error = %e, "Callback delivery failed");
                        DeliveryOutcome::Failed(e.to_string())
                    }
                }
            }
        };

        info!(job_id = %job.id, status = status, "Job completed");
        JobOutcome::Completed {
            status,
            posts,
            delivery,
        }
    }
}
