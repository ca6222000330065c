//! Durable request log model
//!
//! One row per remote call attempt. Created in `Pending` state before the
//! call goes out and resolved to `Completed` or `Failed` exactly once per
//! leg. Accumulated output and error text is append-mostly: new content is
//! appended with a separator, skipped when it is already contained, and
//! capped so a retry storm cannot grow a row without bound.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::constants::REQUEST_LOG_TEXT_CAP;

/// HTTP method accepted by the transport layer.
///
/// The remote API only ever uses these four; anything else is a
/// programming error, so the type is closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HttpMethod {
    Get,
    Post,
    Patch,
    Put,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Patch => "PATCH",
            Self::Put => "PUT",
        }
    }

    /// Methods that carry an entity id popped from the body and appended
    /// to the URL path.
    pub fn takes_path_id(&self) -> bool {
        matches!(self, Self::Patch | Self::Put)
    }
}

impl std::fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle status of a logged remote call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RequestStatus {
    Pending,
    Completed,
    Failed,
}

impl RequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "Pending",
            Self::Completed => "Completed",
            Self::Failed => "Failed",
        }
    }
}

/// One persisted remote call attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestLog {
    pub id: String,
    /// Human-readable description of the operation, e.g. the route key name.
    pub service: String,
    pub url: String,
    pub method: HttpMethod,
    /// Serialized request payload, if any.
    pub request_data: Option<String>,
    pub status: RequestStatus,
    pub output: Option<String>,
    pub error: Option<String>,
    /// Extra annotations, e.g. "Page 2 of 7" on paginated fetches.
    pub description: Option<String>,
    pub reference_doctype: Option<String>,
    pub reference_name: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl RequestLog {
    /// Create a new pending log entry.
    pub fn new(
        id: impl Into<String>,
        service: impl Into<String>,
        url: impl Into<String>,
        method: HttpMethod,
        request_data: Option<String>,
    ) -> Self {
        Self {
            id: id.into(),
            service: service.into(),
            url: url.into(),
            method,
            request_data,
            status: RequestStatus::Pending,
            output: None,
            error: None,
            description: None,
            reference_doctype: None,
            reference_name: None,
            created_at: Utc::now(),
        }
    }

    /// Attach the originating business document.
    #[must_use]
    pub fn with_reference(mut self, doctype: impl Into<String>, name: impl Into<String>) -> Self {
        self.reference_doctype = Some(doctype.into());
        self.reference_name = Some(name.into());
        self
    }

    /// Append error text. Duplicated content is skipped, the result is
    /// capped at [`REQUEST_LOG_TEXT_CAP`] characters.
    pub fn append_error(&mut self, error: &str) {
        self.error = append_capped(self.error.take(), error, "\n");
    }

    /// Append output text with the same cap/dedupe semantics as errors.
    pub fn append_output(&mut self, output: &str) {
        self.output = append_capped(self.output.take(), output, "\n");
    }

    /// Append a description annotation, joined with ` - `.
    pub fn append_description(&mut self, description: &str) {
        self.description = append_capped(self.description.take(), description, " - ");
    }
}

/// Append `addition` to `current` with `separator`, skipping content that
/// is already present as a substring and truncating at the cap.
fn append_capped(current: Option<String>, addition: &str, separator: &str) -> Option<String> {
    if addition.is_empty() {
        return current;
    }

    let merged = match current {
        None => addition.to_string(),
        Some(existing) if existing.is_empty() => addition.to_string(),
        Some(existing) => {
            if existing.contains(addition) {
                return Some(existing);
            }
            format!("{existing}{separator}{addition}")
        }
    };

    Some(truncate_chars(&merged, REQUEST_LOG_TEXT_CAP))
}

fn truncate_chars(text: &str, cap: usize) -> String {
    if text.chars().count() <= cap {
        return text.to_string();
    }
    text.chars().take(cap).collect()
}
