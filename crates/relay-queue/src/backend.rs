//! Queue Backend Trait

use crate::job::FetchJob;
use async_trait::async_trait;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("Backend error: {0}")]
    Backend(String),
}

/// FIFO hand-off point between the admission handler and the processor.
///
/// Implementations are internally synchronized: callers never lock.
#[async_trait]
pub trait QueueBackend: Send + Sync {
    /// Push a job to the back of the queue.
    /// Returns the queue length observed immediately after the push.
    async fn enqueue(&self, job: FetchJob) -> Result<usize, QueueError>;

    /// Pop the front job, waiting up to `wait` for one to arrive.
    async fn dequeue(&self, wait: Duration) -> Result<Option<FetchJob>, QueueError>;

    /// Current number of queued jobs
    async fn len(&self) -> usize;

    async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
