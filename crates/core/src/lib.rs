//! # TaxBridge Core
//!
//! Pure business logic layer - no infrastructure dependencies.
//!
//! This crate contains:
//! - Tax allocation strategies and taxation-code classification
//! - Payload builders for every submitted document shape
//! - The reconciliation engine comparing remote snapshots to local payloads
//! - The submission workflow state machine
//! - Port/adapter interfaces (traits)
//!
//! ## Architecture Principles
//! - Only depends on `taxbridge-domain`
//! - No database or HTTP code
//! - All external dependencies via traits
//! - Pure, testable business logic

pub mod payload;
pub mod ports;
pub mod reconcile;
pub mod routes;
pub mod tax;
pub mod workflow;

// Re-export specific items to avoid ambiguity
pub use payload::{
    build_credit_note_payload, build_invoice_payload, build_item_payload, build_line_payload,
    build_partner_payload, build_purchase_payload, build_return_payload,
    build_stock_adjustment_payload, CreditNotePayload, InvoicePayload, ItemPayload, LinePayload,
    PartnerPayload, PurchasePayload, ReturnPayload, SaleLinePayload, StockAdjustmentPayload,
};
pub use ports::{
    DocumentStore, EventPublisher, JobKind, JobQueue, JobSpec, QrRenderer, RequestLogStore,
    SettingsStore,
};
pub use reconcile::{
    reconcile, LocalLine, ReconcileVerdict, RemoteInvoiceSnapshot, RemoteLine, RemoteScuData,
};
pub use routes::{resolve_path, RouteKey};
pub use tax::calculate_tax;
pub use workflow::{derive_phase, next_step, SubmissionStep};
