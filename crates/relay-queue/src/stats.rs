//! Processor counters

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

use crate::delivery::DeliveryOutcome;
use crate::processor::JobOutcome;

#[derive(Debug, Default)]
pub struct ProcessorStats {
    /// Jobs taken off the queue (each requeued pass counts again)
    pub processed: AtomicU64,
    /// Jobs that reached the delivery step
    pub completed: AtomicU64,
    pub requeued: AtomicU64,
    pub rate_limit_exhausted: AtomicU64,
    pub fetch_failures: AtomicU64,
    pub delivery_failures: AtomicU64,
}

impl ProcessorStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the outcome of one processing pass
    pub fn record(&self, outcome: &JobOutcome) {
        self.processed.fetch_add(1, Ordering::Relaxed);
        match outcome {
            JobOutcome::Requeued { .. } => {
                self.requeued.fetch_add(1, Ordering::Relaxed);
            }
            JobOutcome::RateLimitExhausted { .. } => {
                self.rate_limit_exhausted.fetch_add(1, Ordering::Relaxed);
            }
            JobOutcome::FetchFailed(_) => {
                self.fetch_failures.fetch_add(1, Ordering::Relaxed);
            }
            JobOutcome::Completed { delivery, .. } => {
                self.completed.fetch_add(1, Ordering::Relaxed);
                if matches!(delivery, DeliveryOutcome::Failed(_)) {
                    self.delivery_failures.fetch_add(1, Ordering::Relaxed);
                }
            }
        }
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            processed: self.processed.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
            requeued: self.requeued.load(Ordering::Relaxed),
            rate_limit_exhausted: self.rate_limit_exhausted.load(Ordering::Relaxed),
            fetch_failures: self.fetch_failures.load(Ordering::Relaxed),
            delivery_failures: self.delivery_failures.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub processed: u64,
    pub completed: u64,
    pub requeued: u64,
    pub rate_limit_exhausted: u64,
    pub fetch_failures: u64,
    pub delivery_failures: u64,
}
