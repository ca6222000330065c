//! Customer/supplier registration payload builder

use serde::Serialize;
use taxbridge_domain::{Partner, PartnerKind};

/// Registration payload for a business partner.
#[derive(Debug, Clone, Serialize)]
pub struct PartnerPayload {
    pub document_name: String,
    pub partner_name: String,
    pub is_customer: bool,
    pub is_supplier: bool,
    pub partner_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub customer_tax_pin: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone_number: Option<String>,
    pub currency: String,
    pub country: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

/// Map the ERP partner type onto the remote vocabulary.
fn map_partner_type(erp_type: &str) -> String {
    match erp_type {
        "Company" | "Partnership" => "CORPORATE".to_string(),
        "Individual" => "INDIVIDUAL".to_string(),
        other => other.to_string(),
    }
}

/// Normalize a phone number to the +254 international form, keeping the
/// last nine digits. Numbers too short to normalize are dropped.
fn normalize_phone(raw: &str) -> Option<String> {
    let compact: String = raw.chars().filter(|c| !c.is_whitespace()).collect();
    if compact.len() >= 9 {
        let tail: String = compact.chars().rev().take(9).collect::<Vec<_>>().into_iter().rev().collect();
        Some(format!("+254{tail}"))
    } else {
        None
    }
}

/// Build the registration payload for a customer or supplier.
pub fn build_partner_payload(partner: &Partner) -> PartnerPayload {
    let is_customer = partner.kind == PartnerKind::Customer;

    PartnerPayload {
        document_name: partner.name.clone(),
        partner_name: partner.partner_name.clone(),
        is_customer,
        is_supplier: !is_customer,
        partner_type: map_partner_type(&partner.partner_type),
        customer_tax_pin: partner.tax_pin.clone(),
        phone_number: partner.phone_number.as_deref().and_then(normalize_phone),
        currency: if partner.currency.is_empty() { "KES".to_string() } else { partner.currency.clone() },
        country: "KEN".to_string(),
        id: partner.remote_id.clone(),
    }
}
