//! In-memory FIFO queue with notify-on-push

use async_trait::async_trait;
use std::collections::VecDeque;
use std::time::Duration;
use tokio::sync::{Mutex, Notify};
use tokio::time::Instant;

use crate::backend::{QueueBackend, QueueError};
use crate::job::FetchJob;

/// Unbounded FIFO. Lives for the process lifetime and is never closed;
/// queued jobs do not survive a restart.
#[derive(Debug, Default)]
pub struct MemoryQueue {
    jobs: Mutex<VecDeque<FetchJob>>,
    available: Notify,
}

impl MemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl QueueBackend for MemoryQueue {
    async fn enqueue(&self, job: FetchJob) -> Result<usize, QueueError> {
        let len = {
            let mut jobs = self.jobs.lock().await;
            jobs.push_back(job);
            jobs.len()
        };

        // Stores a permit when the consumer is not currently waiting
        self.available.notify_one();
        Ok(len)
    }

    async fn dequeue(&self, wait: Duration) -> Result<Option<FetchJob>, QueueError> {
        let deadline = Instant::now() + wait;

        loop {
            // Register interest before checking, so a push between the
            // check and the wait is not missed.
            let notified = self.available.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(job) = self.jobs.lock().await.pop_front() {
                return Ok(Some(job));
            }

            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return Ok(None);
            }
        }
    }

    async fn len(&self) -> usize {
        self.jobs.lock().await.len()
    }
}
