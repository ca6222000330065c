//! Remote call value object
//!
//! Resolves a route key and payload into the concrete URL, method and
//! timeout of one HTTP call. PATCH and PUT calls pop the `id` field from
//! the body and append it to the URL path when it is not already there.

use std::time::Duration;

use serde_json::Value;
use taxbridge_domain::constants::{BULK_REQUEST_TIMEOUT, DEFAULT_REQUEST_TIMEOUT};
use taxbridge_domain::{Doctype, HttpMethod, IntegrationSettings, Result};
use taxbridge_core::routes::{resolve_path, RouteKey};

/// One fully resolved remote call.
#[derive(Debug, Clone)]
pub struct RemoteCall {
    pub route: RouteKey,
    pub url: String,
    pub method: HttpMethod,
    pub payload: Value,
    pub description: String,
    pub reference_doctype: Option<Doctype>,
    pub reference_name: Option<String>,
    pub timeout: Duration,
}

impl RemoteCall {
    /// Build a call from a route key and payload.
    ///
    /// A POST route whose payload already carries an `id` becomes a PATCH:
    /// re-submitting an entity that exists remotely must update it, never
    /// create a duplicate.
    ///
    /// # Errors
    /// Returns an error when the path template has unresolved placeholders.
    pub fn build(
        settings: &IntegrationSettings,
        route: RouteKey,
        payload: Value,
    ) -> Result<Self> {
        let mut method = route.method();
        if method == HttpMethod::Post && payload.get("id").is_some() {
            method = HttpMethod::Patch;
        }

        let path = resolve_path(route.path(), &payload)?;
        let base = settings.server_url.trim_end_matches('/');
        let url = format!("{base}/{path}");

        let timeout = if route.is_bulk() { BULK_REQUEST_TIMEOUT } else { DEFAULT_REQUEST_TIMEOUT };

        Ok(Self {
            route,
            url,
            method,
            payload,
            description: route.description().to_string(),
            reference_doctype: None,
            reference_name: None,
            timeout,
        })
    }

    /// Attach the originating business document for request logging.
    #[must_use]
    pub fn with_reference(mut self, doctype: Doctype, name: impl Into<String>) -> Self {
        self.reference_doctype = Some(doctype);
        self.reference_name = Some(name.into());
        self
    }

    /// Pop the `id` field for PATCH/PUT and append it to the URL as
    /// `/{id}/` when the URL is not already suffixed with it. Returns the
    /// final URL and the body to send.
    pub fn prepare_for_send(&self) -> (String, Value) {
        if !self.method.takes_path_id() {
            return (self.url.clone(), self.payload.clone());
        }

        let mut body = self.payload.clone();
        let popped = body
            .as_object_mut()
            .and_then(|map| map.remove("id"))
            .and_then(|id| match id {
                Value::String(s) => Some(s),
                Value::Number(n) => Some(n.to_string()),
                _ => None,
            });

        match popped {
            Some(id) if !self.url.contains(&format!("/{id}/")) => {
                let url = format!("{}/{id}/", self.url.trim_end_matches('/'));
                (url, body)
            }
            _ => (self.url.clone(), body),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> IntegrationSettings {
        IntegrationSettings {
            name: "settings-a".into(),
            server_url: "https://api.fiscal.test/v1/".into(),
            ..Default::default()
        }
    }

    #[test]
    fn build_joins_base_and_path() {
        let call = RemoteCall::build(
            &settings(),
            RouteKey::ItemSave,
            serde_json::json!({"code": "ITM-1"}),
        )
        .unwrap();
        assert_eq!(call.url, "https://api.fiscal.test/v1/products/");
        assert_eq!(call.method, HttpMethod::Post);
    }

    #[test]
    fn post_with_id_becomes_patch() {
        let call = RemoteCall::build(
            &settings(),
            RouteKey::ItemSave,
            serde_json::json!({"code": "ITM-1", "id": "prod-9"}),
        )
        .unwrap();
        assert_eq!(call.method, HttpMethod::Patch);
    }

    #[test]
    fn patch_pops_id_into_url() {
        let call = RemoteCall::build(
            &settings(),
            RouteKey::ItemSave,
            serde_json::json!({"code": "ITM-1", "id": "42"}),
        )
        .unwrap();

        let (url, body) = call.prepare_for_send();
        assert_eq!(url, "https://api.fiscal.test/v1/products/42/");
        assert!(body.get("id").is_none());
        assert_eq!(body.get("code").and_then(|v| v.as_str()), Some("ITM-1"));
    }

    #[test]
    fn patch_does_not_double_append_id() {
        let mut call = RemoteCall::build(
            &settings(),
            RouteKey::ItemSave,
            serde_json::json!({"id": "42"}),
        )
        .unwrap();
        call.url = "https://api.fiscal.test/v1/products/42/".into();

        let (url, _body) = call.prepare_for_send();
        assert_eq!(url, "https://api.fiscal.test/v1/products/42/");
    }

    #[test]
    fn numeric_id_is_accepted() {
        let call = RemoteCall::build(
            &settings(),
            RouteKey::ItemSave,
            serde_json::json!({"id": 42}),
        )
        .unwrap();
        let (url, body) = call.prepare_for_send();
        assert!(url.ends_with("/42/"));
        assert!(body.get("id").is_none());
    }

    #[test]
    fn get_calls_do_not_touch_the_body() {
        let call = RemoteCall::build(
            &settings(),
            RouteKey::ItemSearch,
            serde_json::json!({"id": "42"}),
        )
        .unwrap();
        let (url, body) = call.prepare_for_send();
        assert_eq!(url, "https://api.fiscal.test/v1/products/");
        assert!(body.get("id").is_some());
    }

    #[test]
    fn bulk_routes_use_long_timeout() {
        let call = RemoteCall::build(
            &settings(),
            RouteKey::ItemClassificationSearch,
            serde_json::json!({}),
        )
        .unwrap();
        assert_eq!(call.timeout, BULK_REQUEST_TIMEOUT);

        let simple =
            RemoteCall::build(&settings(), RouteKey::ItemSave, serde_json::json!({"x": 1}))
                .unwrap();
        assert_eq!(simple.timeout, DEFAULT_REQUEST_TIMEOUT);
    }

    #[test]
    fn transition_route_resolves_placeholder() {
        let call = RemoteCall::build(
            &settings(),
            RouteKey::SalesTransition,
            serde_json::json!({"invoice_id": "abc", "document_name": "SINV-1"}),
        )
        .unwrap();
        assert_eq!(call.url, "https://api.fiscal.test/v1/sales-invoices/abc/transition/");
        assert_eq!(call.method, HttpMethod::Patch);
    }
}
