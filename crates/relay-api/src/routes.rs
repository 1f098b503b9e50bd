//! API routes: job admission and health

use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use relay_queue::{FetchJob, StatsSnapshot};

/// Job submission body. Unknown fields are ignored.
///
/// Nothing beyond the top-level object shape is validated: metadata is kept
/// as raw JSON and echoed to the callback unchanged.
#[derive(Debug, Deserialize)]
pub struct SubmitJobRequest {
    pub target_api: Option<Value>,
    pub headers: Option<Map<String, Value>>,
    pub callback_webhook: Option<Value>,
    pub company_name: Option<Value>,
    pub org_id: Option<Value>,
    pub urn: Option<Value>,
}

impl SubmitJobRequest {
    /// Parse a raw body. Anything that is not a JSON object is rejected.
    pub fn from_body(body: &[u8]) -> ApiResult<Self> {
        let value: Value = serde_json::from_slice(body)?;
        if !value.is_object() {
            return Err(ApiError::BadRequest(
                "Request body must be a JSON object".to_string(),
            ));
        }
        Ok(serde_json::from_value(value)?)
    }

    /// Build the internal job record.
    ///
    /// The URN comes from the top-level field when it is present and not
    /// blank, otherwise from `headers.urn`.
    pub fn into_job(self) -> ApiResult<FetchJob> {
        let (headers, header_urn) = match self.headers {
            Some(headers) => {
                let urn = headers.get("urn").cloned();
                (header_values(headers)?, urn)
            }
            None => (HashMap::new(), None),
        };

        let urn = self
            .urn
            .filter(|urn| !is_blank(urn))
            .or(header_urn)
            .filter(|urn| !urn.is_null());

        Ok(FetchJob::new(self.target_api.and_then(url_text))
            .with_headers(headers)
            .with_callback(self.callback_webhook.and_then(url_text))
            .with_company_name(self.company_name)
            .with_org_id(self.org_id)
            .with_urn(urn))
    }
}

/// URLs are used as text; a non-string value is kept in its JSON form and
/// fails later, when it is requested.
fn url_text(value: Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s),
        other => Some(other.to_string()),
    }
}

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::String(s) => s.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(fields) => fields.is_empty(),
    }
}

/// Scalars become header text; nulls are skipped.
fn header_values(headers: Map<String, Value>) -> ApiResult<HashMap<String, String>> {
    let mut values = HashMap::with_capacity(headers.len());
    for (name, value) in headers {
        let text = match value {
            Value::Null => continue,
            Value::String(s) => s,
            Value::Bool(b) => b.to_string(),
            Value::Number(n) => n.to_string(),
            Value::Array(_) | Value::Object(_) => {
                return Err(ApiError::BadRequest(format!(
                    "Header '{}' must be a string, number or boolean",
                    name
                )))
            }
        };
        values.insert(name, text);
    }
    Ok(values)
}

#[derive(Debug, Serialize, Deserialize)]
pub struct QueuedResponse {
    pub status: String,
    pub queue_size: usize,
}

/// Accept a job and enqueue it.
///
/// The body is read raw so that every malformed submission, whatever its
/// content type, is answered with the same `{"error": ...}` shape.
pub async fn submit_job(
    State(state): State<AppState>,
    body: Bytes,
) -> ApiResult<(StatusCode, Json<QueuedResponse>)> {
    let job = SubmitJobRequest::from_body(&body)?.into_job()?;
    let job_id = job.id;

    let queue_size = state.queue().enqueue(job).await?;

    tracing::info!(job_id = %job_id, queue_size = queue_size, "Job queued");

    Ok((
        StatusCode::ACCEPTED,
        Json(QueuedResponse {
            status: "queued".to_string(),
            queue_size,
        }),
    ))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub queue_size: usize,
}

/// Basic health check handler (lightweight)
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        queue_size: state.queue().len().await,
    })
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DetailedHealthResponse {
    pub status: String,
    pub version: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub queue_size: usize,
    pub processor: StatsSnapshot,
}

/// Health check with processor counters
pub async fn health_detailed(State(state): State<AppState>) -> Json<DetailedHealthResponse> {
    Json(DetailedHealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: chrono::Utc::now(),
        queue_size: state.queue().len().await,
        processor: state.stats().snapshot(),
    })
}

pub fn api_router(state: AppState) -> Router {
    Router::new()
        .route("/process", post(submit_job))
        .route("/health", get(health))
        .route("/health/detailed", get(health_detailed))
        .with_state(state)
}
