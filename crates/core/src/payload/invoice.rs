//! Sales invoice, credit note and return payload builders

use serde::Serialize;
use taxbridge_domain::{InvoiceLine, Result, SalesInvoice, TaxBridgeError};

use crate::reconcile::RemoteInvoiceSnapshot;

use super::{round2, round4};

/// Sales type for ordinary submissions.
const SALES_TYPE_NORMAL: &str = "N";
/// Payment type codes: 01 cash, 02 credit.
const PAYMENT_TYPE_CREDIT: &str = "02";
const PAYMENT_TYPE_CASH: &str = "01";
/// Invoice status code sent on submission.
const INVOICE_STATUS_CONFIRMED: &str = "02";
/// Refund reason code for automatic returns.
const REFUND_REASON_OTHER: &str = "13";
/// Credit note reason code.
const CREDIT_NOTE_REASON: &str = "06";

/// Header payload for a sales invoice save.
#[derive(Debug, Clone, Serialize)]
pub struct InvoicePayload {
    pub document_name: String,
    pub reference_number: String,
    pub customer_name: String,
    pub sales_type: String,
    pub payment_type: String,
    pub invoice_status: String,
    pub total_gross_amount: f64,
    pub lines: Vec<SaleLinePayload>,
}

/// One line inside the header payload.
#[derive(Debug, Clone, Serialize)]
pub struct SaleLinePayload {
    pub item_code: String,
    pub taxation_code: String,
    /// Tax-inclusive unit price.
    pub unit_price: f64,
    pub quantity: f64,
    pub package_quantity: f64,
    pub discount_rate: f64,
    pub discount_amount: f64,
}

/// Header payload for a credit note save.
#[derive(Debug, Clone, Serialize)]
pub struct CreditNotePayload {
    pub document_name: String,
    /// Reference number of the successfully submitted original invoice.
    pub original_invoice: String,
    pub sales_type: String,
    pub payment_type: String,
    pub invoice_status: String,
    pub credit_note_reason: String,
    pub total_gross_amount: f64,
    pub lines: Vec<SaleLinePayload>,
}

/// Per-line payload for the individual line-save step of the
/// orchestrator. Carries the remote id when the line was already saved,
/// which turns the save into a PATCH.
#[derive(Debug, Clone, Serialize)]
pub struct LinePayload {
    pub product: String,
    pub quantity: f64,
    pub new_price: f64,
    pub amount: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sales_invoice: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub credit_note: Option<String>,
    pub document_name: String,
    pub allow_discount: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

/// Reversal payload issued when reconciliation finds a mismatch, or when
/// an ERP return document is submitted.
#[derive(Debug, Clone, Serialize)]
pub struct ReturnPayload {
    pub document_name: String,
    pub invoice_reference: String,
    pub refund_reason: String,
    pub amount: f64,
    pub items: Vec<ReturnLinePayload>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReturnLinePayload {
    pub item_name: String,
    pub quantity: f64,
    pub amount: f64,
}

/// Tax-inclusive unit price for a line: net rate plus the allocated tax
/// spread back over the quantity.
fn inclusive_unit_price(line: &InvoiceLine, conversion_rate: f64) -> f64 {
    let qty = line.abs_qty();
    let converted_tax =
        if line.tax_amount != 0.0 { round4(line.tax_amount * conversion_rate) } else { 0.0 };
    let per_unit_tax = if qty != 0.0 { converted_tax / qty } else { 0.0 };
    round4(line.base_net_rate + per_unit_tax)
}

fn require_taxation_code(line: &InvoiceLine) -> Result<String> {
    line.taxation_code.map(|code| code.as_str().to_string()).ok_or_else(|| {
        TaxBridgeError::Config(format!(
            "Item {} does not have a valid remote tax code; update the item before submitting",
            line.item_code
        ))
    })
}

fn build_sale_lines(invoice: &SalesInvoice) -> Result<Vec<SaleLinePayload>> {
    invoice
        .items
        .iter()
        .map(|line| {
            let taxation_code = require_taxation_code(line)?;
            let qty = line.abs_qty();
            Ok(SaleLinePayload {
                item_code: line.item_code.clone(),
                taxation_code,
                unit_price: inclusive_unit_price(line, 1.0),
                quantity: qty,
                package_quantity: qty,
                discount_rate: 0.0,
                discount_amount: 0.0,
            })
        })
        .collect()
}

/// Build the header payload for an ordinary sales invoice.
///
/// # Errors
/// Returns `TaxBridgeError::Config` if any line lacks a remote tax code.
pub fn build_invoice_payload(invoice: &SalesInvoice) -> Result<InvoicePayload> {
    Ok(InvoicePayload {
        document_name: invoice.name.clone(),
        reference_number: invoice.reference_number(),
        customer_name: invoice.customer_name.clone(),
        sales_type: SALES_TYPE_NORMAL.to_string(),
        payment_type: PAYMENT_TYPE_CREDIT.to_string(),
        invoice_status: INVOICE_STATUS_CONFIRMED.to_string(),
        total_gross_amount: round2(invoice.base_grand_total.abs()),
        lines: build_sale_lines(invoice)?,
    })
}

/// Build the header payload for a credit note.
///
/// `original_reference` is the reference number the original invoice was
/// submitted under (including any `-REV{n}` suffix).
///
/// # Errors
/// Returns `TaxBridgeError::Config` if any line lacks a remote tax code.
pub fn build_credit_note_payload(
    invoice: &SalesInvoice,
    original_reference: &str,
) -> Result<CreditNotePayload> {
    Ok(CreditNotePayload {
        document_name: invoice.name.clone(),
        original_invoice: original_reference.to_string(),
        sales_type: SALES_TYPE_NORMAL.to_string(),
        payment_type: PAYMENT_TYPE_CASH.to_string(),
        invoice_status: INVOICE_STATUS_CONFIRMED.to_string(),
        credit_note_reason: CREDIT_NOTE_REASON.to_string(),
        total_gross_amount: round2(invoice.base_grand_total.abs()),
        lines: build_sale_lines(invoice)?,
    })
}

/// Build the per-line payload for the line-save step.
///
/// `remote_item_id` is the fiscal-service id of the line's item;
/// `invoice_remote_id` links the line to the saved header.
pub fn build_line_payload(
    invoice: &SalesInvoice,
    line: &InvoiceLine,
    remote_item_id: &str,
    invoice_remote_id: &str,
) -> LinePayload {
    let conversion_rate = if invoice.conversion_rate != 0.0 { invoice.conversion_rate } else { 1.0 };
    let qty = line.abs_qty();
    let converted_tax =
        if line.tax_amount != 0.0 { round4(line.tax_amount * conversion_rate) } else { 0.0 };

    LinePayload {
        product: remote_item_id.to_string(),
        quantity: round4(qty),
        new_price: inclusive_unit_price(line, conversion_rate),
        amount: round4(line.base_amount.abs() + converted_tax),
        sales_invoice: (!invoice.is_return).then(|| invoice_remote_id.to_string()),
        credit_note: invoice.is_return.then(|| invoice_remote_id.to_string()),
        document_name: line.name.clone(),
        allow_discount: false,
        id: line.remote_id.clone(),
    }
}

/// Build a reversal payload.
///
/// Full returns (return total within 0.01 of the original total) reuse the
/// authoritative remote lines and the remote-observed gross amount, so the
/// reversal mirrors exactly what the fiscal service recorded. Partial
/// returns use the ERP return document's own lines.
pub fn build_return_payload(
    invoice: &SalesInvoice,
    original: &SalesInvoice,
    remote: &RemoteInvoiceSnapshot,
) -> ReturnPayload {
    let original_total = original.base_grand_total.abs();
    let return_total = invoice.base_grand_total.abs();
    let is_full_return = (original_total - return_total).abs() < 0.01;

    let amount = if is_full_return && remote.total_gross_amount.is_some() {
        remote.total_gross_amount.unwrap_or(return_total)
    } else {
        return_total
    };

    let items = if is_full_return {
        remote
            .lines
            .iter()
            .map(|line| ReturnLinePayload {
                item_name: line.product_name.clone(),
                quantity: line.quantity.abs(),
                amount: round4(line.price_inclusive_tax.abs()),
            })
            .collect()
    } else {
        invoice
            .items
            .iter()
            .map(|line| ReturnLinePayload {
                item_name: line.item_code.clone(),
                quantity: line.abs_qty(),
                amount: round4(line.base_amount.abs() + line.tax_amount),
            })
            .collect()
    };

    ReturnPayload {
        document_name: invoice.name.clone(),
        invoice_reference: original.reference_number(),
        refund_reason: REFUND_REASON_OTHER.to_string(),
        amount,
        items,
    }
}

#[cfg(test)]
mod tests {
    use taxbridge_domain::{
        InvoiceStatus, SubmissionState, TaxationCode,
    };

    use crate::reconcile::RemoteLine;

    use super::*;

    fn coded_line(code: &str, qty: f64, net_rate: f64, tax_amount: f64) -> InvoiceLine {
        InvoiceLine {
            name: format!("SINV-7-{code}"),
            item_code: code.to_string(),
            item_name: code.to_string(),
            qty,
            base_net_rate: net_rate,
            base_net_amount: qty * net_rate,
            base_amount: qty * net_rate,
            item_tax_template: None,
            tax_amount,
            tax_rate: 16.0,
            taxation_code: Some(TaxationCode::B),
            remote_id: None,
        }
    }

    fn sample_invoice(items: Vec<InvoiceLine>) -> SalesInvoice {
        let total: f64 = items.iter().map(|l| l.base_amount + l.tax_amount).sum();
        SalesInvoice {
            name: "SINV-7".into(),
            company: "Acme Ltd".into(),
            customer: "CUST-9".into(),
            customer_name: "Customer Nine".into(),
            conversion_rate: 1.0,
            is_return: false,
            return_against: None,
            base_grand_total: total,
            items,
            taxes: vec![],
            status: InvoiceStatus::Submitted,
            prevent_submission: false,
            submission: SubmissionState::default(),
        }
    }

    #[test]
    fn invoice_payload_rounds_line_prices_to_four_decimals() {
        let line = coded_line("ITM-1", 3.0, 33.3333, 16.0);
        let payload = build_invoice_payload(&sample_invoice(vec![line])).unwrap();

        // 33.3333 + 16/3 = 38.666633..., rounded to 4 decimals.
        assert_eq!(payload.lines[0].unit_price, 38.6666);
        assert_eq!(payload.lines[0].quantity, 3.0);
    }

    #[test]
    fn invoice_payload_rounds_total_to_two_decimals() {
        let line = coded_line("ITM-1", 1.0, 99.999, 0.001_4);
        let payload = build_invoice_payload(&sample_invoice(vec![line])).unwrap();
        assert_eq!(payload.total_gross_amount, 100.0);
    }

    #[test]
    fn missing_tax_code_is_a_config_error() {
        let mut line = coded_line("ITM-1", 1.0, 100.0, 16.0);
        line.taxation_code = None;
        let err = build_invoice_payload(&sample_invoice(vec![line])).unwrap_err();
        assert!(matches!(err, TaxBridgeError::Config(_)));
        assert!(err.to_string().contains("ITM-1"));
    }

    #[test]
    fn return_quantities_are_submitted_as_positive() {
        let mut line = coded_line("ITM-1", -2.0, 50.0, 0.0);
        line.base_net_amount = -100.0;
        line.base_amount = -100.0;
        let mut invoice = sample_invoice(vec![line]);
        invoice.is_return = true;

        let payload = build_credit_note_payload(&invoice, "SINV-1").unwrap();
        assert_eq!(payload.lines[0].quantity, 2.0);
        assert!(payload.total_gross_amount >= 0.0);
    }

    #[test]
    fn line_payload_switches_invoice_field_for_returns() {
        let line = coded_line("ITM-1", 2.0, 50.0, 16.0);
        let mut invoice = sample_invoice(vec![line.clone()]);

        let normal = build_line_payload(&invoice, &line, "prod-1", "inv-remote-1");
        assert_eq!(normal.sales_invoice.as_deref(), Some("inv-remote-1"));
        assert!(normal.credit_note.is_none());

        invoice.is_return = true;
        let credit = build_line_payload(&invoice, &line, "prod-1", "crn-remote-1");
        assert!(credit.sales_invoice.is_none());
        assert_eq!(credit.credit_note.as_deref(), Some("crn-remote-1"));
    }

    #[test]
    fn line_payload_carries_remote_id_for_idempotent_resave() {
        let mut line = coded_line("ITM-1", 2.0, 50.0, 0.0);
        line.remote_id = Some("line-remote-5".into());
        let invoice = sample_invoice(vec![line.clone()]);

        let payload = build_line_payload(&invoice, &line, "prod-1", "inv-remote-1");
        assert_eq!(payload.id.as_deref(), Some("line-remote-5"));
    }

    #[test]
    fn line_payload_applies_conversion_rate_to_tax() {
        let line = coded_line("ITM-1", 2.0, 50.0, 10.0);
        let mut invoice = sample_invoice(vec![line.clone()]);
        invoice.conversion_rate = 2.0;

        let payload = build_line_payload(&invoice, &line, "prod-1", "inv-remote-1");
        // converted tax 20.0 over qty 2 adds 10.0 per unit
        assert_eq!(payload.new_price, 60.0);
        assert_eq!(payload.amount, 120.0);
    }

    fn remote_snapshot(total: f64, lines: Vec<RemoteLine>) -> RemoteInvoiceSnapshot {
        RemoteInvoiceSnapshot {
            id: Some("inv-remote-1".into()),
            reference_number: Some("SINV-7".into()),
            total_gross_amount: Some(total),
            credit_note_total: None,
            is_credit_note: false,
            lines,
            scu: None,
        }
    }

    #[test]
    fn full_return_uses_remote_lines_and_total() {
        let line = coded_line("ITM-1", 2.0, 50.0, 16.0);
        let original = sample_invoice(vec![line.clone()]);

        let mut return_doc = original.clone();
        return_doc.name = "SINV-7-RET".into();
        return_doc.is_return = true;
        return_doc.return_against = Some(original.name.clone());

        let remote = remote_snapshot(
            116.0,
            vec![RemoteLine {
                product_name: "Widget".into(),
                quantity: 2.0,
                price_inclusive_tax: 58.0,
            }],
        );

        let payload = build_return_payload(&return_doc, &original, &remote);
        assert_eq!(payload.amount, 116.0);
        assert_eq!(payload.items.len(), 1);
        assert_eq!(payload.items[0].item_name, "Widget");
        assert_eq!(payload.items[0].amount, 58.0);
    }

    #[test]
    fn partial_return_uses_local_lines() {
        let line = coded_line("ITM-1", 2.0, 50.0, 16.0);
        let original = sample_invoice(vec![line]);

        let partial_line = coded_line("ITM-1", -1.0, 50.0, 8.0);
        let mut return_doc = sample_invoice(vec![partial_line]);
        return_doc.name = "SINV-7-RET".into();
        return_doc.is_return = true;
        return_doc.base_grand_total = -58.0;

        let remote = remote_snapshot(116.0, vec![]);

        let payload = build_return_payload(&return_doc, &original, &remote);
        assert_eq!(payload.amount, 58.0);
        assert_eq!(payload.items[0].item_name, "ITM-1");
        assert_eq!(payload.items[0].quantity, 1.0);
    }
}
