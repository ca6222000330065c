//! Business document types mutated by the integration
//!
//! These mirror the ERP-side documents the pipeline reads and writes. The
//! ERP's own storage is out of scope; the shapes here carry exactly the
//! fields the payload builders, orchestrator and reconciler need.

use serde::{Deserialize, Serialize};

use crate::types::submission::SubmissionState;

/// Document types known to the integration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Doctype {
    SalesInvoice,
    PurchaseInvoice,
    StockAdjustment,
    Item,
    Customer,
    Supplier,
}

impl Doctype {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SalesInvoice => "Sales Invoice",
            Self::PurchaseInvoice => "Purchase Invoice",
            Self::StockAdjustment => "Stock Adjustment",
            Self::Item => "Item",
            Self::Customer => "Customer",
            Self::Supplier => "Supplier",
        }
    }
}

impl std::fmt::Display for Doctype {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Remote taxation type code attached to every submitted line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaxationCode {
    A,
    B,
    C,
    D,
    E,
}

impl TaxationCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::A => "A",
            Self::B => "B",
            Self::C => "C",
            Self::D => "D",
            Self::E => "E",
        }
    }
}

/// Item-level tax template: the summed rate of the template plus the
/// taxation code declared on it, if any.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaxTemplate {
    pub rate: f64,
    pub taxation_code: Option<TaxationCode>,
}

/// Document-level tax charge row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentTaxRow {
    pub description: String,
    pub tax_amount: f64,
}

/// One invoice line. Quantities may be negative on returns; builders
/// normalize to absolute values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvoiceLine {
    /// Line document name, used as the reference for per-line remote calls.
    pub name: String,
    pub item_code: String,
    pub item_name: String,
    pub qty: f64,
    pub base_net_rate: f64,
    pub base_net_amount: f64,
    pub base_amount: f64,
    pub item_tax_template: Option<TaxTemplate>,
    /// Allocated tax amount, filled by the tax-calculation pass.
    pub tax_amount: f64,
    /// Back-computed tax rate, filled by the tax-calculation pass.
    pub tax_rate: f64,
    pub taxation_code: Option<TaxationCode>,
    /// Remote line id once the line has been saved on the fiscal service.
    pub remote_id: Option<String>,
}

impl InvoiceLine {
    #[must_use]
    pub fn abs_qty(&self) -> f64 {
        self.qty.abs()
    }
}

/// ERP-side status of a sales invoice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InvoiceStatus {
    Draft,
    Submitted,
    Paid,
    CreditNoteIssued,
    Cancelled,
}

/// A sales (or POS) invoice as seen by the integration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SalesInvoice {
    pub name: String,
    pub company: String,
    pub customer: String,
    pub customer_name: String,
    /// Currency conversion rate into the base currency; 1.0 when already
    /// in base currency.
    pub conversion_rate: f64,
    pub is_return: bool,
    /// Name of the original invoice when this document is a return.
    pub return_against: Option<String>,
    pub base_grand_total: f64,
    pub items: Vec<InvoiceLine>,
    pub taxes: Vec<DocumentTaxRow>,
    pub status: InvoiceStatus,
    pub prevent_submission: bool,
    pub submission: SubmissionState,
}

impl SalesInvoice {
    /// Reference number used on submission: the plain document name, or
    /// `{name}-REV{n}` once corrective revisions exist.
    #[must_use]
    pub fn reference_number(&self) -> String {
        if self.submission.revision_count > 0 {
            format!("{}-REV{}", self.name, self.submission.revision_count)
        } else {
            self.name.clone()
        }
    }
}

/// An ERP item master record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Item {
    pub item_code: String,
    pub item_name: String,
    pub description: String,
    pub disabled: bool,
    pub prevent_registration: bool,
    pub is_sales_item: bool,
    pub is_purchase_item: bool,
    pub is_stock_item: bool,
    pub selling_price: f64,
    pub purchasing_price: f64,
    pub classification_code: Option<String>,
    pub packaging_unit_code: Option<String>,
    pub quantity_unit_code: Option<String>,
    pub country_of_origin_code: Option<String>,
    pub product_type: Option<String>,
    pub item_type: Option<String>,
    /// Required remote tax code. Missing on a submitted line is a fatal
    /// configuration error.
    pub taxation_code: Option<TaxationCode>,
    pub remote_id: Option<String>,
}

/// Customer or supplier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PartnerKind {
    Customer,
    Supplier,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Partner {
    pub name: String,
    pub partner_name: String,
    pub kind: PartnerKind,
    /// "Company" | "Individual" | "Partnership" in the ERP; mapped to the
    /// remote partner type on submission.
    pub partner_type: String,
    pub tax_pin: Option<String>,
    pub phone_number: Option<String>,
    pub currency: String,
    pub disabled: bool,
    pub prevent_registration: bool,
    pub remote_id: Option<String>,
}

/// Purchase invoice submitted to the fiscal service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PurchaseInvoice {
    pub name: String,
    pub supplier_name: String,
    pub tax_id: Option<String>,
    pub is_return: bool,
    pub items: Vec<InvoiceLine>,
    pub taxes: Vec<DocumentTaxRow>,
    pub submitted: bool,
    pub submission_attempts: u32,
}

/// One stock adjustment line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockLine {
    pub item_code: String,
    pub qty: f64,
}

/// Stock adjustment document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StockAdjustment {
    pub name: String,
    pub items: Vec<StockLine>,
    pub submitted: bool,
    pub submission_attempts: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::submission::SubmissionState;

    fn sample_invoice() -> SalesInvoice {
        SalesInvoice {
            name: "SINV-0001".into(),
            company: "Acme Ltd".into(),
            customer: "CUST-001".into(),
            customer_name: "First Customer".into(),
            conversion_rate: 1.0,
            is_return: false,
            return_against: None,
            base_grand_total: 116.0,
            items: vec![],
            taxes: vec![],
            status: InvoiceStatus::Submitted,
            prevent_submission: false,
            submission: SubmissionState::default(),
        }
    }

    #[test]
    fn reference_number_is_plain_name_without_revisions() {
        let invoice = sample_invoice();
        assert_eq!(invoice.reference_number(), "SINV-0001");
    }

    #[test]
    fn reference_number_carries_revision_suffix() {
        let mut invoice = sample_invoice();
        invoice.submission.revision_count = 2;
        assert_eq!(invoice.reference_number(), "SINV-0001-REV2");
    }

    #[test]
    fn abs_qty_normalizes_return_quantities() {
        let line = InvoiceLine {
            name: "SINV-0001-1".into(),
            item_code: "ITM-1".into(),
            item_name: "Widget".into(),
            qty: -3.0,
            base_net_rate: 100.0,
            base_net_amount: -300.0,
            base_amount: -348.0,
            item_tax_template: None,
            tax_amount: 0.0,
            tax_rate: 0.0,
            taxation_code: None,
            remote_id: None,
        };
        assert_eq!(line.abs_qty(), 3.0);
    }
}
