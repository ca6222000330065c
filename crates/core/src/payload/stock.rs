//! Stock adjustment payload builder

use serde::Serialize;
use taxbridge_domain::StockAdjustment;

/// Store release type for reconciliation-driven adjustments.
const STORE_RELEASE_TYPE_ADJUSTMENT: &str = "06";

/// Payload for a stock adjustment submission.
#[derive(Debug, Clone, Serialize)]
pub struct StockAdjustmentPayload {
    pub document_name: String,
    pub store_release_type: String,
    pub lines: Vec<StockLinePayload>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StockLinePayload {
    pub item_code: String,
    pub quantity: f64,
    pub package_quantity: f64,
}

/// Build the payload for a stock adjustment. Quantities are normalized to
/// absolute values; the adjustment direction is implied by the release
/// type on the remote side.
pub fn build_stock_adjustment_payload(adjustment: &StockAdjustment) -> StockAdjustmentPayload {
    StockAdjustmentPayload {
        document_name: adjustment.name.clone(),
        store_release_type: STORE_RELEASE_TYPE_ADJUSTMENT.to_string(),
        lines: adjustment
            .items
            .iter()
            .map(|line| StockLinePayload {
                item_code: line.item_code.clone(),
                quantity: line.qty.abs(),
                package_quantity: line.qty.abs(),
            })
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use taxbridge_domain::StockLine;

    use super::*;

    #[test]
    fn quantities_are_absolute() {
        let adjustment = StockAdjustment {
            name: "STK-1".into(),
            items: vec![
                StockLine { item_code: "ITM-1".into(), qty: -5.0 },
                StockLine { item_code: "ITM-2".into(), qty: 3.0 },
            ],
            submitted: false,
            submission_attempts: 0,
        };

        let payload = build_stock_adjustment_payload(&adjustment);
        assert_eq!(payload.store_release_type, "06");
        assert_eq!(payload.lines[0].quantity, 5.0);
        assert_eq!(payload.lines[1].quantity, 3.0);
    }
}
