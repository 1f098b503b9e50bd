//! Outbound fetch from a job's source endpoint

use bytes::Bytes;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::StatusCode;
use std::collections::HashMap;
use std::time::Duration;

use crate::job::FetchJob;

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("Job has no source URL")]
    MissingSource,
    #[error("Invalid request header: {0}")]
    InvalidHeader(String),
    #[error("Request failed: {0}")]
    Request(#[source] reqwest::Error),
    #[error("Failed to read response body: {0}")]
    Body(#[source] reqwest::Error),
}

/// Raw response kept for the transform and delivery steps
#[derive(Debug, Clone)]
pub struct FetchedResponse {
    pub status: StatusCode,
    pub body: Bytes,
}

#[derive(Debug)]
pub enum FetchOutcome {
    /// Upstream answered 429
    RateLimited,
    /// Any other status, including non-2xx
    Fetched(FetchedResponse),
}

#[derive(Debug, Clone, Default)]
pub struct SourceClient {
    client: reqwest::Client,
}

impl SourceClient {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    /// GET the job's source URL with its headers, bounded by `timeout`.
    pub async fn fetch(
        &self,
        job: &FetchJob,
        timeout: Duration,
    ) -> Result<FetchOutcome, FetchError> {
        let url = job.source_url.as_deref().ok_or(FetchError::MissingSource)?;
        let headers = header_map(&job.request_headers)?;

        let response = self
            .client
            .get(url)
            .headers(headers)
            .timeout(timeout)
            .send()
            .await
            .map_err(FetchError::Request)?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Ok(FetchOutcome::RateLimited);
        }

        let body = response.bytes().await.map_err(FetchError::Body)?;
        Ok(FetchOutcome::Fetched(FetchedResponse { status, body }))
    }
}

fn header_map(headers: &HashMap<String, String>) -> Result<HeaderMap, FetchError> {
    let mut map = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers {
        let header_name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| FetchError::InvalidHeader(format!("{}: {}", name, e)))?;
        let header_value = HeaderValue::from_str(value)
            .map_err(|e| FetchError::InvalidHeader(format!("{}: {}", name, e)))?;
        map.insert(header_name, header_value);
    }
    Ok(map)
}
