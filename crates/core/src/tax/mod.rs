//! Tax allocation and taxation-code classification
//!
//! Two mutually exclusive allocation strategies feed the payload builders:
//!
//! - **Item-level**: used whenever any line carries an item tax template.
//!   Each line's tax is its net amount times its own template rate.
//! - **Document-level**: used otherwise, when document tax rows exist.
//!   The document's total tax is distributed proportionally by each
//!   line's share of the total net amount.
//!
//! The per-line rate is then back-computed from the allocated tax so the
//! taxation code classification sees the effective rate regardless of
//! strategy.

use taxbridge_domain::constants::{TAX_CODE_B_THRESHOLD, TAX_CODE_E_THRESHOLD};
use taxbridge_domain::{SalesInvoice, TaxationCode};

/// Run the tax-calculation pass over the invoice lines in place.
///
/// Selects the allocation strategy, fills `tax_amount` / `tax_rate` on
/// every line, then resolves each line's taxation code.
pub fn calculate_tax(invoice: &mut SalesInvoice) {
    let has_item_level_tax = invoice.items.iter().any(|item| item.item_tax_template.is_some());

    if has_item_level_tax {
        allocate_item_level(invoice);
    } else if !invoice.taxes.is_empty() {
        allocate_document_level(invoice);
    }

    set_taxation_codes(invoice);
}

/// Item-level strategy: each line taxed by its own template rate.
fn allocate_item_level(invoice: &mut SalesInvoice) {
    for item in &mut invoice.items {
        let rate = item.item_tax_template.as_ref().map(|t| t.rate).unwrap_or(0.0);
        item.tax_amount = if rate != 0.0 { item.base_net_amount * rate / 100.0 } else { 0.0 };
        item.tax_rate = rate;
    }
}

/// Document-level strategy: distribute total tax by net-amount share.
fn allocate_document_level(invoice: &mut SalesInvoice) {
    let total_net: f64 = invoice.items.iter().map(|item| item.base_net_amount).sum();
    if total_net == 0.0 {
        return;
    }

    let total_tax: f64 = invoice.taxes.iter().map(|tax| tax.tax_amount).sum();

    for item in &mut invoice.items {
        let ratio = item.base_net_amount / total_net;
        item.tax_amount = total_tax * ratio;
        item.tax_rate = if item.base_net_amount > 0.0 {
            item.tax_amount / item.base_net_amount * 100.0
        } else {
            0.0
        };
    }
}

/// Resolve the taxation code for every line.
///
/// Priority: code declared on the item tax template, then classification
/// by back-computed rate, then the fallback default.
fn set_taxation_codes(invoice: &mut SalesInvoice) {
    for item in &mut invoice.items {
        let from_template =
            item.item_tax_template.as_ref().and_then(|template| template.taxation_code);

        item.taxation_code = from_template
            .or_else(|| classify_rate(item.tax_rate))
            .or(Some(TaxationCode::A));
    }
}

/// Classify a tax rate into a taxation code.
///
/// Thresholds: rounded rate >= 16 -> B, >= 8 -> E, exactly zero -> A.
/// Rates in between have no rate-derived code.
pub fn classify_rate(rate: f64) -> Option<TaxationCode> {
    let rounded = rate.round();
    if rounded >= TAX_CODE_B_THRESHOLD {
        Some(TaxationCode::B)
    } else if rounded >= TAX_CODE_E_THRESHOLD {
        Some(TaxationCode::E)
    } else if rate == 0.0 {
        Some(TaxationCode::A)
    } else {
        None
    }
}
