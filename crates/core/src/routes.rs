//! Route table for the fiscal service API
//!
//! A closed enum of every operation template the integration calls.
//! Each key carries its HTTP method, path template and human-readable
//! description; the handler registry in the infra layer binds success and
//! error callbacks per key.

use std::collections::HashMap;

use taxbridge_domain::{HttpMethod, Result, TaxBridgeError};

/// Logical name identifying one remote API operation template.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RouteKey {
    // Sales invoice chain
    SalesInvoiceSave,
    SalesLineSave,
    SalesTransition,
    SalesSign,
    SalesDetails,
    // Credit note chain
    CreditNoteSave,
    CreditNoteLineSave,
    CreditNoteTransition,
    CreditNoteSign,
    /// One-shot reversal carrying remote-observed totals, issued during
    /// reconciliation.
    ReturnSave,
    // Master data
    ItemSave,
    ItemSearch,
    PartnerSave,
    // Purchases and stock
    PurchaseSave,
    StockMasterSave,
    StockAdjustmentSave,
    StockAdjustmentTransition,
    // Reference data
    NoticeSearch,
    ItemClassificationSearch,
}

impl RouteKey {
    pub fn method(&self) -> HttpMethod {
        match self {
            Self::SalesInvoiceSave
            | Self::CreditNoteSave
            | Self::SalesSign
            | Self::CreditNoteSign
            | Self::ItemSave
            | Self::PartnerSave
            | Self::PurchaseSave
            | Self::StockMasterSave
            | Self::StockAdjustmentSave
            | Self::ReturnSave => HttpMethod::Post,
            Self::SalesLineSave | Self::CreditNoteLineSave => HttpMethod::Post,
            Self::SalesTransition
            | Self::CreditNoteTransition
            | Self::StockAdjustmentTransition => HttpMethod::Patch,
            Self::SalesDetails
            | Self::ItemSearch
            | Self::NoticeSearch
            | Self::ItemClassificationSearch => HttpMethod::Get,
        }
    }

    /// Path template relative to the API base URL. `{field}` placeholders
    /// are substituted from the payload before dispatch.
    pub fn path(&self) -> &'static str {
        match self {
            Self::SalesInvoiceSave => "sales-invoices/",
            Self::SalesLineSave => "sales-invoice-lines/",
            Self::SalesTransition => "sales-invoices/{invoice_id}/transition/",
            Self::SalesSign => "sales-invoices/{invoice_id}/sign/",
            Self::SalesDetails => "sales-invoices/{invoice_id}/",
            Self::CreditNoteSave => "credit-notes/",
            Self::CreditNoteLineSave => "credit-note-lines/",
            Self::CreditNoteTransition => "credit-notes/{invoice_id}/transition/",
            Self::CreditNoteSign => "credit-notes/{invoice_id}/sign/",
            Self::ReturnSave => "sales-returns/",
            Self::ItemSave => "products/",
            Self::ItemSearch => "products/",
            Self::PartnerSave => "business-partners/",
            Self::PurchaseSave => "purchase-invoices/",
            Self::StockMasterSave => "stock-masters/",
            Self::StockAdjustmentSave => "stock-adjustments/",
            Self::StockAdjustmentTransition => "stock-adjustments/transition/",
            Self::NoticeSearch => "notices/",
            Self::ItemClassificationSearch => "item-classifications/",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::SalesInvoiceSave => "Save sales invoice",
            Self::SalesLineSave => "Save sales invoice line",
            Self::SalesTransition => "Transition sales invoice",
            Self::SalesSign => "Sign sales invoice",
            Self::SalesDetails => "Fetch sales invoice details",
            Self::CreditNoteSave => "Save credit note",
            Self::CreditNoteLineSave => "Save credit note line",
            Self::CreditNoteTransition => "Transition credit note",
            Self::CreditNoteSign => "Sign credit note",
            Self::ReturnSave => "Save sales return",
            Self::ItemSave => "Register item",
            Self::ItemSearch => "Search items",
            Self::PartnerSave => "Register business partner",
            Self::PurchaseSave => "Save purchase invoice",
            Self::StockMasterSave => "Save stock master",
            Self::StockAdjustmentSave => "Save stock adjustment",
            Self::StockAdjustmentTransition => "Transition stock adjustment",
            Self::NoticeSearch => "Fetch notices",
            Self::ItemClassificationSearch => "Fetch item classifications",
        }
    }

    /// Bulk code-list fetches run with the long timeout.
    pub fn is_bulk(&self) -> bool {
        matches!(self, Self::ItemClassificationSearch | Self::NoticeSearch)
    }

    /// Line-save route for the given document flavour.
    pub fn line_save(is_return: bool) -> Self {
        if is_return {
            Self::CreditNoteLineSave
        } else {
            Self::SalesLineSave
        }
    }

    /// Transition route for the given document flavour.
    pub fn transition(is_return: bool) -> Self {
        if is_return {
            Self::CreditNoteTransition
        } else {
            Self::SalesTransition
        }
    }

    /// Sign route for the given document flavour.
    pub fn sign(is_return: bool) -> Self {
        if is_return {
            Self::CreditNoteSign
        } else {
            Self::SalesSign
        }
    }
}

impl std::fmt::Display for RouteKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}

/// Substitute `{field}` placeholders in a path template from the payload.
///
/// # Errors
/// Returns `TaxBridgeError::InvalidInput` when a placeholder has no
/// matching payload field.
pub fn resolve_path(template: &str, payload: &serde_json::Value) -> Result<String> {
    let fields: HashMap<String, String> = payload
        .as_object()
        .map(|map| {
            map.iter()
                .filter_map(|(key, value)| match value {
                    serde_json::Value::String(s) => Some((key.clone(), s.clone())),
                    serde_json::Value::Number(n) => Some((key.clone(), n.to_string())),
                    _ => None,
                })
                .collect()
        })
        .unwrap_or_default();

    let mut resolved = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find('{') {
        let Some(end_offset) = rest[start..].find('}') else {
            return Err(TaxBridgeError::InvalidInput(format!(
                "unterminated placeholder in route template '{template}'"
            )));
        };
        let end = start + end_offset;
        let name = &rest[start + 1..end];
        let value = fields.get(name).ok_or_else(|| {
            TaxBridgeError::InvalidInput(format!(
                "missing required placeholder '{name}' in request data"
            ))
        })?;
        resolved.push_str(&rest[..start]);
        resolved.push_str(value);
        rest = &rest[end + 1..];
    }
    resolved.push_str(rest);

    Ok(resolved)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transition_routes_are_patch() {
        assert_eq!(RouteKey::SalesTransition.method(), HttpMethod::Patch);
        assert_eq!(RouteKey::CreditNoteTransition.method(), HttpMethod::Patch);
    }

    #[test]
    fn return_flavour_selects_credit_note_routes() {
        assert_eq!(RouteKey::line_save(true), RouteKey::CreditNoteLineSave);
        assert_eq!(RouteKey::line_save(false), RouteKey::SalesLineSave);
        assert_eq!(RouteKey::sign(true), RouteKey::CreditNoteSign);
        assert_eq!(RouteKey::transition(false), RouteKey::SalesTransition);
    }

    #[test]
    fn resolve_path_substitutes_placeholders() {
        let payload = serde_json::json!({"invoice_id": "abc-123", "document_name": "SINV-1"});
        let path = resolve_path(RouteKey::SalesTransition.path(), &payload).unwrap();
        assert_eq!(path, "sales-invoices/abc-123/transition/");
    }

    #[test]
    fn resolve_path_accepts_numeric_fields() {
        let payload = serde_json::json!({"invoice_id": 42});
        let path = resolve_path("sales-invoices/{invoice_id}/", &payload).unwrap();
        assert_eq!(path, "sales-invoices/42/");
    }

    #[test]
    fn resolve_path_fails_on_missing_placeholder() {
        let payload = serde_json::json!({"document_name": "SINV-1"});
        let err = resolve_path(RouteKey::SalesTransition.path(), &payload).unwrap_err();
        assert!(err.to_string().contains("invoice_id"));
    }

    #[test]
    fn plain_paths_resolve_unchanged() {
        let payload = serde_json::json!({});
        assert_eq!(resolve_path("products/", &payload).unwrap(), "products/");
    }
}
