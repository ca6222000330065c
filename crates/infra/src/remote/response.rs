//! Content-type driven response body decoding
//!
//! JSON bodies parse to a value, text and XML come back as raw strings
//! (with whitespace-only bodies treated as absent), binary types come back
//! as bytes, and anything else is absent.

use reqwest::Response;
use serde_json::Value;
use taxbridge_domain::{Result, TaxBridgeError};

/// Decoded response body.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseBody {
    Json(Value),
    Text(String),
    Bytes(Vec<u8>),
    Empty,
}

impl ResponseBody {
    /// The parsed JSON value, when the body was JSON.
    pub fn as_json(&self) -> Option<&Value> {
        match self {
            Self::Json(value) => Some(value),
            _ => None,
        }
    }

    /// String field of a JSON body, e.g. the remote id.
    pub fn json_str(&self, field: &str) -> Option<&str> {
        self.as_json().and_then(|value| value.get(field)).and_then(Value::as_str)
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }

    /// Rendering persisted into the request log's output column.
    pub fn to_output_string(&self) -> Option<String> {
        match self {
            Self::Json(value) => Some(value.to_string()),
            Self::Text(text) => Some(text.clone()),
            Self::Bytes(bytes) => Some(format!("<{} binary bytes>", bytes.len())),
            Self::Empty => None,
        }
    }
}

/// Decode a response body according to its `Content-Type` header.
///
/// # Errors
/// Returns `TaxBridgeError::Transport` when the body cannot be read or a
/// JSON body fails to parse.
pub async fn decode_body(response: Response) -> Result<ResponseBody> {
    let content_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("")
        .to_ascii_lowercase();

    if content_type.contains("application/json") {
        let value: Value = response
            .json()
            .await
            .map_err(|err| TaxBridgeError::Transport(format!("failed to parse JSON body: {err}")))?;
        return Ok(ResponseBody::Json(value));
    }

    if content_type.contains("text/plain")
        || content_type.contains("text/html")
        || content_type.contains("application/xml")
        || content_type.contains("text/xml")
    {
        let text = response
            .text()
            .await
            .map_err(|err| TaxBridgeError::Transport(format!("failed to read text body: {err}")))?;
        if text.trim().is_empty() {
            return Ok(ResponseBody::Empty);
        }
        return Ok(ResponseBody::Text(text));
    }

    if content_type.contains("application/octet-stream")
        || content_type.contains("application/pdf")
        || content_type.contains("application/zip")
    {
        let bytes = response
            .bytes()
            .await
            .map_err(|err| TaxBridgeError::Transport(format!("failed to read binary body: {err}")))?;
        return Ok(ResponseBody::Bytes(bytes.to_vec()));
    }

    Ok(ResponseBody::Empty)
}
