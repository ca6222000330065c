//! Purchase invoice payload builder

use serde::Serialize;
use taxbridge_domain::{PurchaseInvoice, Result, TaxBridgeError};

use super::round4;

const PURCHASE_TYPE_NORMAL: &str = "N";
const PURCHASE_STATUS_CONFIRMED: &str = "02";
const PAYMENT_TYPE_CREDIT: &str = "02";

/// Payload for a purchase invoice submission.
#[derive(Debug, Clone, Serialize)]
pub struct PurchasePayload {
    pub document_name: String,
    pub supplier_name: String,
    pub supplier_tax_pin: String,
    pub purchase_type: String,
    pub purchase_status: String,
    pub payment_type: String,
    pub lines: Vec<PurchaseLinePayload>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PurchaseLinePayload {
    pub item_code: String,
    pub taxation_code: String,
    pub quantity: f64,
    pub package_quantity: f64,
    pub unit_price: f64,
    pub discount_rate: f64,
    pub discount_amount: f64,
}

/// Build the payload for a purchase invoice.
///
/// # Errors
/// Returns `TaxBridgeError::Config` if any line lacks a remote tax code.
pub fn build_purchase_payload(invoice: &PurchaseInvoice) -> Result<PurchasePayload> {
    let lines = invoice
        .items
        .iter()
        .map(|line| {
            let taxation_code = line.taxation_code.map(|c| c.as_str().to_string()).ok_or_else(|| {
                TaxBridgeError::Config(format!(
                    "Item {} does not have a valid remote tax code; update the item before submitting",
                    line.item_code
                ))
            })?;
            let qty = line.abs_qty();
            Ok(PurchaseLinePayload {
                item_code: line.item_code.clone(),
                taxation_code,
                quantity: qty,
                package_quantity: qty,
                unit_price: round4(line.base_net_rate),
                discount_rate: 0.0,
                discount_amount: 0.0,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(PurchasePayload {
        document_name: invoice.name.clone(),
        supplier_name: invoice.supplier_name.clone(),
        supplier_tax_pin: invoice.tax_id.clone().unwrap_or_default(),
        purchase_type: PURCHASE_TYPE_NORMAL.to_string(),
        purchase_status: PURCHASE_STATUS_CONFIRMED.to_string(),
        payment_type: PAYMENT_TYPE_CREDIT.to_string(),
        lines,
    })
}
