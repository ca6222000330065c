//! # TaxBridge Domain
//!
//! Shared domain types for the ERP to fiscal-service integration.
//!
//! This crate contains:
//! - The `TaxBridgeError` error type and `Result` alias
//! - Business document types (invoices, items, partners, stock)
//! - The durable request log model
//! - Integration settings and auth token types
//!
//! ## Architecture Principles
//! - No infrastructure dependencies (no HTTP, no database)
//! - Serializable types only
//! - All invariants that can be enforced in data live here

pub mod constants;
pub mod errors;
pub mod types;

pub use errors::{Result, TaxBridgeError};
pub use types::{
    DocumentTaxRow, Doctype, HttpMethod, IntegrationSettings, InvoiceLine, InvoiceStatus, Item,
    Partner, PartnerKind, PurchaseInvoice, RequestLog, RequestStatus, SalesInvoice, ScuData,
    StockAdjustment, StockLine, SubmissionPhase, SubmissionState, TaxTemplate, TaxationCode,
    TokenSet,
};
