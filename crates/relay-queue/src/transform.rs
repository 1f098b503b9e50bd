//! Formatting of fetched records into the relayed text block
//!
//! The upstream payload is loosely typed. Extraction reports what went wrong
//! through [`TransformError`]; [`format_posts`] turns every outcome into a
//! string so the job itself never fails here.

use serde_json::{Map, Value};
use tracing::{error, warn};

pub const NO_POSTS: &str = "{ No posts found in list }";
pub const UNEXPECTED_FORMAT: &str = "{ Unexpected data format }";
pub const PARSE_ERROR: &str = "{ Error parsing posts }";

const DATA_KEY: &str = "data";
const MISSING_CREATED_AT: &str = "N/A";

#[derive(Debug, thiserror::Error)]
pub enum TransformError {
    #[error("Body is not valid JSON: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("Expected a JSON object at the top level, got {0}")]
    NotAnObject(&'static str),
    #[error("Expected list for 'data', got {0}")]
    UnexpectedFormat(&'static str),
    #[error("Record {index} is malformed: {reason}")]
    InvalidRecord { index: usize, reason: String },
}

/// One record, with every field already rendered as text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Post {
    pub created_at: String,
    pub reactions: String,
    pub text: String,
}

impl Post {
    fn from_record(index: usize, record: &Value) -> Result<Self, TransformError> {
        let record = record.as_object().ok_or_else(|| TransformError::InvalidRecord {
            index,
            reason: format!("expected object, got {}", kind(record)),
        })?;

        let created_at = field_text(record, "created_at")
            .unwrap_or_else(|| MISSING_CREATED_AT.to_string());
        let text = field_text(record, "text").unwrap_or_default();

        let reactions = match record.get("activity") {
            None => None,
            Some(Value::Object(activity)) => field_text(activity, "num_likes"),
            Some(other) => {
                return Err(TransformError::InvalidRecord {
                    index,
                    reason: format!("'activity' must be an object, got {}", kind(other)),
                })
            }
        }
        .unwrap_or_else(|| "0".to_string());

        Ok(Self {
            created_at,
            reactions,
            text,
        })
    }

    pub fn line(&self) -> String {
        format!(
            "[created_at={}][reactions={}][text={}]",
            self.created_at, self.reactions, self.text
        )
    }
}

/// Decode the body and pull the records out of its `data` list.
///
/// A missing `data` key counts as an empty list; an explicit `null` does not.
pub fn extract_posts(body: &[u8]) -> Result<Vec<Post>, TransformError> {
    let payload: Value = serde_json::from_slice(body)?;
    let payload = payload
        .as_object()
        .ok_or_else(|| TransformError::NotAnObject(kind(&payload)))?;

    match payload.get(DATA_KEY) {
        None => Ok(Vec::new()),
        Some(Value::Array(records)) => records
            .iter()
            .enumerate()
            .map(|(index, record)| Post::from_record(index, record))
            .collect(),
        Some(other) => Err(TransformError::UnexpectedFormat(kind(other))),
    }
}

pub fn render_posts(posts: &[Post]) -> String {
    if posts.is_empty() {
        return NO_POSTS.to_string();
    }

    let lines: Vec<String> = posts.iter().map(Post::line).collect();
    format!("{{\n{}\n}}", lines.join("\n"))
}

/// Never fails: malformed payloads yield one of the placeholder strings.
pub fn format_posts(body: &[u8]) -> String {
    match extract_posts(body) {
        Ok(posts) => render_posts(&posts),
        Err(e @ TransformError::UnexpectedFormat(_)) => {
            warn!(error = %e, "Unexpected data format in source payload");
            UNEXPECTED_FORMAT.to_string()
        }
        Err(e) => {
            error!(error = %e, "Error parsing posts");
            PARSE_ERROR.to_string()
        }
    }
}

/// Strings verbatim, other scalars in JSON form; absent keys yield `None`.
fn field_text(object: &Map<String, Value>, key: &str) -> Option<String> {
    object.get(key).map(|value| match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    })
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
