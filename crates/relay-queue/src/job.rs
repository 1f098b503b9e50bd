//! Job definitions

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;
use uuid::Uuid;

/// Job Identifier
pub type JobId = Uuid;

/// Number of rate-limit responses a job may absorb before it is dropped.
pub const MAX_RATE_LIMIT_RETRIES: u32 = 3;

/// A queued unit of work: where to fetch from and where to relay the result.
///
/// A job is owned by exactly one component at a time (admission handler,
/// queue, then processor) and is moved between them, never shared.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FetchJob {
    pub id: JobId,
    /// Endpoint to GET. Not validated at admission.
    pub source_url: Option<String>,
    /// Forwarded verbatim on fetch.
    #[serde(default)]
    pub request_headers: HashMap<String, String>,
    /// Delivery is skipped when absent.
    pub callback_url: Option<String>,
    /// Opaque metadata, echoed to the callback exactly as submitted.
    pub company_name: Option<Value>,
    pub org_id: Option<Value>,
    pub urn: Option<Value>,
    /// Rate-limit retries already consumed.
    #[serde(default)]
    pub retry_count: u32,
    pub enqueued_at: DateTime<Utc>,
}

impl FetchJob {
    pub fn new(source_url: Option<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            source_url,
            request_headers: HashMap::new(),
            callback_url: None,
            company_name: None,
            org_id: None,
            urn: None,
            retry_count: 0,
            enqueued_at: Utc::now(),
        }
    }

    pub fn with_headers(mut self, headers: HashMap<String, String>) -> Self {
        self.request_headers = headers;
        self
    }

    pub fn with_callback(mut self, callback_url: Option<String>) -> Self {
        self.callback_url = callback_url;
        self
    }

    pub fn with_company_name(mut self, company_name: Option<Value>) -> Self {
        self.company_name = company_name;
        self
    }

    pub fn with_org_id(mut self, org_id: Option<Value>) -> Self {
        self.org_id = org_id;
        self
    }

    pub fn with_urn(mut self, urn: Option<Value>) -> Self {
        self.urn = urn;
        self
    }

    /// Count one rate-limit response against this job and return the new total.
    pub fn record_rate_limit(&mut self) -> u32 {
        self.retry_count += 1;
        self.retry_count
    }
}

/// Delay strategy applied after a rate-limited fetch
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BackoffStrategy {
    Constant(Duration),
    Exponential { initial: Duration, multiplier: f64 },
}

impl BackoffStrategy {
    /// Delay before the processor continues after the given attempt (1-based).
    pub fn delay(&self, attempt: u32) -> Duration {
        match self {
            Self::Constant(delay) => *delay,
            Self::Exponential {
                initial,
                multiplier,
            } => {
                let exponent = attempt.saturating_sub(1) as i32;
                initial.mul_f64(multiplier.powi(exponent))
            }
        }
    }
}

impl Default for BackoffStrategy {
    fn default() -> Self {
        Self::Constant(Duration::from_secs(5))
    }
}
