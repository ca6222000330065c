//! Transport layer
//!
//! Executes one remote call end to end: creates the pending request log,
//! dispatches by HTTP method, decodes the body by content type, updates
//! the route's last-request timestamp, classifies the outcome, and
//! resolves the log exactly once per leg. A 401 on the first leg triggers
//! exactly one token refresh followed by one re-send; a second 401 is
//! surfaced as a failure.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use reqwest::Method;
use serde_json::Value;
use taxbridge_core::ports::RequestLogStore;
use taxbridge_core::routes::RouteKey;
use taxbridge_domain::constants::STALE_PASSWORD_MARKER;
use taxbridge_domain::{HttpMethod, IntegrationSettings, RequestLog};
use tokio::sync::RwLock;
use tracing::{debug, error, instrument, warn};
use uuid::Uuid;

use crate::http::HttpClient;

use super::auth::TokenManager;
use super::classifier::{extract_error_message, is_success, pagination_description};
use super::errors::RemoteError;
use super::request::RemoteCall;
use super::response::{decode_body, ResponseBody};

/// Transport executing calls against the fiscal service.
pub struct Transport {
    http: HttpClient,
    request_log: Arc<dyn RequestLogStore>,
    auth: Arc<TokenManager>,
    last_request: RwLock<HashMap<RouteKey, DateTime<Utc>>>,
}

impl Transport {
    pub fn new(
        http: HttpClient,
        request_log: Arc<dyn RequestLogStore>,
        auth: Arc<TokenManager>,
    ) -> Self {
        Self { http, request_log, auth, last_request: RwLock::new(HashMap::new()) }
    }

    /// When the given route was last called, used by external scheduling
    /// heuristics.
    pub async fn last_request_at(&self, route: RouteKey) -> Option<DateTime<Utc>> {
        self.last_request.read().await.get(&route).copied()
    }

    /// Execute one remote call.
    ///
    /// # Errors
    /// Returns a [`RemoteError`] describing the failure; the request log
    /// has already been marked `Failed` with the extracted message.
    #[instrument(skip(self, settings, call), fields(route = %call.route, url = %call.url))]
    pub async fn execute(
        &self,
        settings: &IntegrationSettings,
        call: &RemoteCall,
    ) -> Result<ResponseBody, RemoteError> {
        let log = self.create_log(call).await?;

        let mut token = match self.auth.ensure_token(settings).await {
            Ok(token) => token,
            Err(err) => {
                let message = err.to_string();
                self.mark_failed(&log.id, &message).await;
                return Err(RemoteError::Auth(message));
            }
        };

        let mut retrying = false;
        loop {
            let response = match self.send_once(settings, call, &token).await {
                Ok(response) => response,
                Err(err) => {
                    let message = err.to_string();
                    self.mark_failed(&log.id, &message).await;
                    return Err(err);
                }
            };

            let status = response.status().as_u16();
            let body = match decode_body(response).await {
                Ok(body) => body,
                Err(err) => {
                    let message = err.to_string();
                    self.mark_failed(&log.id, &message).await;
                    return Err(RemoteError::Network(message));
                }
            };

            self.last_request.write().await.insert(call.route, Utc::now());

            if is_success(status) {
                let description = pagination_description(&body);
                if let Err(err) = self
                    .request_log
                    .complete(&log.id, body.to_output_string().as_deref(), description.as_deref())
                    .await
                {
                    warn!(log_id = %log.id, error = %err, "failed to complete request log");
                }
                debug!(status, route = %call.route, "remote call succeeded");
                return Ok(body);
            }

            let message = extract_error_message(&body);

            if message.contains(STALE_PASSWORD_MARKER) {
                warn!(route = %call.route, "stale auth password detected, rotating");
                if let Err(err) = self.auth.reset_password(settings).await {
                    error!(error = %err, "password rotation failed");
                }
            }

            self.mark_failed(&log.id, &message).await;

            if status == 401 && !retrying {
                debug!(route = %call.route, "401 received, refreshing token and retrying once");
                token = self
                    .auth
                    .refresh(settings)
                    .await
                    .map_err(|err| RemoteError::Auth(err.to_string()))?
                    .access_token;
                retrying = true;
                continue;
            }

            return Err(RemoteError::from_status(status, message));
        }
    }

    async fn create_log(&self, call: &RemoteCall) -> Result<RequestLog, RemoteError> {
        let mut log = RequestLog::new(
            Uuid::new_v4().to_string(),
            call.description.clone(),
            call.url.clone(),
            call.method,
            Some(call.payload.to_string()),
        );
        if let (Some(doctype), Some(name)) = (call.reference_doctype, call.reference_name.as_ref())
        {
            log = log.with_reference(doctype.as_str(), name.clone());
        }

        self.request_log
            .create(&log)
            .await
            .map_err(|err| RemoteError::Server(format!("failed to create request log: {err}")))?;
        Ok(log)
    }

    async fn mark_failed(&self, log_id: &str, message: &str) {
        if let Err(err) = self.request_log.fail(log_id, message).await {
            warn!(log_id = %log_id, error = %err, "failed to mark request log failed");
        }
    }

    /// Send one leg of the call with the given bearer token.
    async fn send_once(
        &self,
        settings: &IntegrationSettings,
        call: &RemoteCall,
        token: &str,
    ) -> Result<reqwest::Response, RemoteError> {
        let (url, body) = call.prepare_for_send();

        let method = match call.method {
            HttpMethod::Get => Method::GET,
            HttpMethod::Post => Method::POST,
            HttpMethod::Patch => Method::PATCH,
            HttpMethod::Put => Method::PUT,
        };

        let mut builder = self
            .http
            .request(method, &url)
            .header("Authorization", format!("Bearer {token}"))
            .header("Accept", "application/json");

        if let Some(workstation) = settings.workstation_id.as_deref() {
            builder = builder.header("X-Workstation", workstation);
        }

        builder = match call.method {
            HttpMethod::Get => builder.query(&query_pairs(&body)),
            _ => builder.header("Content-Type", "application/json").json(&body),
        };

        let send = self.http.send(builder);
        match tokio::time::timeout(call.timeout, send).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(err)) => Err(RemoteError::Network(err.to_string())),
            Err(_) => Err(RemoteError::Timeout(call.timeout)),
        }
    }
}

/// Flatten a JSON object into query parameters; non-scalar values are
/// skipped.
fn query_pairs(payload: &Value) -> Vec<(String, String)> {
    payload
        .as_object()
        .map(|map| {
            map.iter()
                .filter_map(|(key, value)| match value {
                    Value::String(s) => Some((key.clone(), s.clone())),
                    Value::Number(n) => Some((key.clone(), n.to_string())),
                    Value::Bool(b) => Some((key.clone(), b.to_string())),
                    _ => None,
                })
                .collect()
        })
        .unwrap_or_default()
}
