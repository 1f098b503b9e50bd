//! Application State
//!
//! Handles to the shared queue and the processor counters.

use std::sync::Arc;

use relay_queue::{ProcessorStats, QueueBackend};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    queue: Arc<dyn QueueBackend>,
    stats: Arc<ProcessorStats>,
}

impl AppState {
    pub fn new(queue: Arc<dyn QueueBackend>, stats: Arc<ProcessorStats>) -> Self {
        Self { queue, stats }
    }

    /// Get the job queue (cloned Arc for sharing)
    pub fn queue(&self) -> Arc<dyn QueueBackend> {
        self.queue.clone()
    }

    /// Get processor counters (cloned Arc for sharing)
    pub fn stats(&self) -> Arc<ProcessorStats> {
        self.stats.clone()
    }
}
