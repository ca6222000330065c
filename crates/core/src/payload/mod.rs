//! Payload builders
//!
//! Pure functions mapping ERP documents into the exact shapes the fiscal
//! service expects. No I/O and no mutation beyond the prior
//! tax-calculation pass; every builder returns
//! `TaxBridgeError::Config` when a line is missing its required remote
//! tax code, which is a hard precondition and never retried.
//!
//! Monetary figures are rounded to 4 decimals on lines and 2 decimals on
//! aggregates. Quantities are always submitted as absolute values;
//! return semantics are carried at the document-type level.

mod invoice;
mod item;
mod partner;
mod purchase;
mod stock;

pub use invoice::{
    build_credit_note_payload, build_invoice_payload, build_line_payload, build_return_payload,
    CreditNotePayload, InvoicePayload, LinePayload, ReturnLinePayload, ReturnPayload,
    SaleLinePayload,
};
pub use item::{build_item_payload, ItemPayload};
pub use partner::{build_partner_payload, PartnerPayload};
pub use purchase::{build_purchase_payload, PurchaseLinePayload, PurchasePayload};
pub use stock::{build_stock_adjustment_payload, StockAdjustmentPayload, StockLinePayload};

/// Round to 4 decimal places (line amounts).
pub(crate) fn round4(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}

/// Round to 2 decimal places (aggregate amounts).
pub(crate) fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
