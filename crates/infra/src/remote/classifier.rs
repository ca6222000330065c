//! Response classification
//!
//! Success iff the HTTP status is 200 or 201. Failure bodies may be a bare
//! string, a list (first element wins) or an object (stringified); the
//! extracted message feeds the request log and the error router.

use serde_json::Value;

use super::response::ResponseBody;

/// Success statuses accepted from the fiscal service.
pub fn is_success(status: u16) -> bool {
    status == 200 || status == 201
}

/// Extract a human-readable error message from a failure body.
pub fn extract_error_message(body: &ResponseBody) -> String {
    match body {
        ResponseBody::Json(Value::String(message)) => message.clone(),
        ResponseBody::Json(Value::Array(items)) => match items.first() {
            Some(Value::String(message)) => message.clone(),
            Some(other) => other.to_string(),
            None => "empty error list".to_string(),
        },
        ResponseBody::Json(other) => other.to_string(),
        ResponseBody::Text(text) => text.clone(),
        ResponseBody::Bytes(bytes) => format!("<{} binary bytes>", bytes.len()),
        ResponseBody::Empty => "empty response".to_string(),
    }
}

/// Pagination annotation for the request log: "Page X of Y" when the
/// success body reports more than one page.
pub fn pagination_description(body: &ResponseBody) -> Option<String> {
    let value = body.as_json()?;
    let total_pages = page_number(value.get("total_pages")?)?;
    if total_pages <= 1 {
        return None;
    }
    let current_page = page_number(value.get("current_page")?)?;
    Some(format!("Page {current_page} of {total_pages}"))
}

fn page_number(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}
