//! # Relay Queue
//!
//! Single-worker job queue that fetches from a source endpoint, formats the
//! records it finds and relays them to a callback.
//!
//! Features:
//! - In-memory FIFO backend behind the `QueueBackend` trait
//! - One processor task, one job in flight at a time
//! - Bounded requeue-with-delay on HTTP 429
//! - Per-step outcomes: fetch, transform and delivery failures never stop the loop

pub mod backend;
pub mod delivery;
pub mod fetch;
pub mod job;
pub mod memory;
pub mod processor;
pub mod stats;
pub mod transform;

pub use backend::{QueueBackend, QueueError};
pub use delivery::{CallbackPayload, DeliveryOutcome};
pub use job::{BackoffStrategy, FetchJob, JobId, MAX_RATE_LIMIT_RETRIES};
pub use memory::MemoryQueue;
pub use processor::{JobOutcome, Processor, ProcessorConfig};
pub use stats::{ProcessorStats, StatsSnapshot};
