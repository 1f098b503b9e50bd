//! Best-effort delivery of formatted results to a job's callback

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

use crate::job::FetchJob;

#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error("Callback request failed: {0}")]
    Request(#[from] reqwest::Error),
}

/// JSON body posted to the callback
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallbackPayload {
    /// Status code of the source fetch
    pub status: u16,
    pub company_name: Option<Value>,
    pub org_id: Option<Value>,
    pub urn: Option<Value>,
    pub posts: String,
}

impl CallbackPayload {
    pub fn for_job(job: &FetchJob, status: u16, posts: String) -> Self {
        Self {
            status,
            company_name: job.company_name.clone(),
            org_id: job.org_id.clone(),
            urn: job.urn.clone(),
            posts,
        }
    }
}

/// What happened to the delivery step of a completed job
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// Job had no callback URL
    Skipped,
    /// Callback answered with this status (not inspected further)
    Delivered(u16),
    Failed(String),
}

#[derive(Debug, Clone, Default)]
pub struct CallbackClient {
    client: reqwest::Client,
}

impl CallbackClient {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    /// POST the payload and return the callback's status code.
    pub async fn deliver(
        &self,
        url: &str,
        payload: &CallbackPayload,
        timeout: Duration,
    ) -> Result<u16, DeliveryError> {
        let response = self
            .client
            .post(url)
            .json(payload)
            .timeout(timeout)
            .send()
            .await?;

        Ok(response.status().as_u16())
    }
}
