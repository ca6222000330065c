//! Domain types for the integration

mod document;
mod request_log;
mod settings;
mod submission;

pub use document::{
    DocumentTaxRow, Doctype, InvoiceLine, InvoiceStatus, Item, Partner, PartnerKind,
    PurchaseInvoice, SalesInvoice, StockAdjustment, StockLine, TaxTemplate, TaxationCode,
};
pub use request_log::{HttpMethod, RequestLog, RequestStatus};
pub use settings::{IntegrationSettings, TokenSet};
pub use submission::{ScuData, SubmissionPhase, SubmissionState};
