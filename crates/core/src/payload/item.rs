//! Item registration payload builder

use serde::Serialize;
use taxbridge_domain::{Item, Result, TaxBridgeError};

use super::round2;

/// Registration payload for an item master record.
#[derive(Debug, Clone, Serialize)]
pub struct ItemPayload {
    pub document_name: String,
    pub code: String,
    pub preferred_name: String,
    pub description: String,
    pub can_be_sold: bool,
    pub can_be_purchased: bool,
    pub item_classification: String,
    pub packaging_unit: String,
    pub quantity_unit: String,
    pub country_of_origin: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub product_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub item_type: Option<String>,
    pub selling_price: f64,
    pub purchasing_price: f64,
    pub sale_taxes: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

/// Build the registration payload for an item.
///
/// Registration requires the full set of remote codes on the item master;
/// anything missing is a configuration error the user must fix before the
/// item (or any invoice containing it) can be submitted.
///
/// # Errors
/// Returns `TaxBridgeError::Config` listing every missing required field.
pub fn build_item_payload(item: &Item) -> Result<ItemPayload> {
    let mut missing: Vec<&str> = Vec::new();

    let classification = required(&item.classification_code, "item classification", &mut missing);
    let packaging = required(&item.packaging_unit_code, "packaging unit", &mut missing);
    let quantity_unit = required(&item.quantity_unit_code, "unit of quantity", &mut missing);
    let country = required(&item.country_of_origin_code, "country of origin", &mut missing);
    let taxation_code = match item.taxation_code {
        Some(code) => code.as_str().to_string(),
        None => {
            missing.push("remote tax code");
            String::new()
        }
    };

    if !missing.is_empty() {
        return Err(TaxBridgeError::Config(format!(
            "Item {} is missing required registration fields: {}",
            item.item_code,
            missing.join(", ")
        )));
    }

    Ok(ItemPayload {
        document_name: item.item_code.clone(),
        code: item.item_code.clone(),
        preferred_name: item.item_name.clone(),
        description: item.description.clone(),
        can_be_sold: item.is_sales_item,
        can_be_purchased: item.is_purchase_item,
        item_classification: classification,
        packaging_unit: packaging,
        quantity_unit,
        country_of_origin: country,
        product_type: item.product_type.clone(),
        item_type: item.item_type.clone(),
        selling_price: round2(item.selling_price.max(1.0)),
        purchasing_price: round2(item.purchasing_price),
        sale_taxes: vec![taxation_code],
        id: item.remote_id.clone(),
    })
}

fn required(field: &Option<String>, label: &'static str, missing: &mut Vec<&'static str>) -> String {
    match field {
        Some(value) if !value.is_empty() => value.clone(),
        _ => {
            missing.push(label);
            String::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use taxbridge_domain::TaxationCode;

    use super::*;

    fn registered_item() -> Item {
        Item {
            item_code: "ITM-100".into(),
            item_name: "Bottled Water".into(),
            description: "500ml bottled water".into(),
            disabled: false,
            prevent_registration: false,
            is_sales_item: true,
            is_purchase_item: false,
            is_stock_item: true,
            selling_price: 49.999,
            purchasing_price: 30.0,
            classification_code: Some("5020230602".into()),
            packaging_unit_code: Some("BT".into()),
            quantity_unit_code: Some("U".into()),
            country_of_origin_code: Some("KE".into()),
            product_type: Some("2".into()),
            item_type: None,
            taxation_code: Some(TaxationCode::B),
            remote_id: None,
        }
    }

    #[test]
    fn builds_payload_with_rounded_prices() {
        let payload = build_item_payload(&registered_item()).unwrap();
        assert_eq!(payload.selling_price, 50.0);
        assert_eq!(payload.sale_taxes, vec!["B".to_string()]);
        assert!(payload.id.is_none());
    }

    #[test]
    fn zero_selling_price_defaults_to_one() {
        let mut item = registered_item();
        item.selling_price = 0.0;
        let payload = build_item_payload(&item).unwrap();
        assert_eq!(payload.selling_price, 1.0);
    }

    #[test]
    fn known_item_carries_remote_id() {
        let mut item = registered_item();
        item.remote_id = Some("prod-77".into());
        let payload = build_item_payload(&item).unwrap();
        assert_eq!(payload.id.as_deref(), Some("prod-77"));
    }

    #[test]
    fn missing_fields_are_listed_in_the_error() {
        let mut item = registered_item();
        item.classification_code = None;
        item.taxation_code = None;

        let err = build_item_payload(&item).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("item classification"));
        assert!(message.contains("remote tax code"));
        assert!(matches!(err, TaxBridgeError::Config(_)));
    }
}
