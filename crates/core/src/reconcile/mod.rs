//! Reconciliation engine
//!
//! Compares the authoritative remote invoice snapshot against the locally
//! submitted payload. The comparison is deliberately tolerant: quantities
//! and aggregate amounts are rounded to the nearest whole unit, prices to
//! two decimals, and line order is ignored. The two tolerances are
//! intentionally distinct from the 4-decimal rounding used when building
//! payloads; both code paths are preserved as found.
//!
//! A mismatch is not an error. The caller reacts by issuing an automatic
//! reversing credit note, bounded by the configured revision ceiling.

use serde::Deserialize;
use tracing::debug;

/// One local line in reconciliation form.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LocalLine {
    pub quantity: f64,
    /// Tax-inclusive unit price.
    pub unit_price: f64,
}

/// One line of the remote snapshot.
#[derive(Debug, Clone, Deserialize)]
pub struct RemoteLine {
    #[serde(default)]
    pub product_name: String,
    #[serde(default)]
    pub quantity: f64,
    #[serde(default)]
    pub price_inclusive_tax: f64,
}

/// SCU block inside the remote snapshot.
#[derive(Debug, Clone, Deserialize)]
pub struct RemoteScuData {
    #[serde(default)]
    pub scu_receipt_number: Option<String>,
    #[serde(default)]
    pub scu_receipt_signature: Option<String>,
    #[serde(default)]
    pub scu_internal_data: Option<String>,
    #[serde(default)]
    pub qr_code_url: Option<String>,
    #[serde(default)]
    pub scu_id: Option<String>,
    #[serde(default)]
    pub scu_mrc_number: Option<String>,
    #[serde(default)]
    pub scu_invoice_number: Option<String>,
    #[serde(default)]
    pub scu_receipt_timestamp: Option<String>,
}

/// Authoritative remote state of a submitted invoice or credit note.
#[derive(Debug, Clone, Deserialize)]
pub struct RemoteInvoiceSnapshot {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub reference_number: Option<String>,
    #[serde(default)]
    pub total_gross_amount: Option<f64>,
    #[serde(default, rename = "crn_total_amount")]
    pub credit_note_total: Option<f64>,
    #[serde(
        default,
        rename = "sales_invoice_lines",
        alias = "sales_credit_note_lines"
    )]
    pub lines: Vec<RemoteLine>,
    #[serde(default)]
    pub is_credit_note: bool,
    #[serde(default, rename = "scu_data")]
    pub scu: Option<RemoteScuData>,
}

impl RemoteInvoiceSnapshot {
    /// The snapshot total: the credit-note total for credit notes, the
    /// gross amount otherwise.
    #[must_use]
    pub fn total(&self) -> f64 {
        if self.is_credit_note {
            self.credit_note_total.or(self.total_gross_amount).unwrap_or(0.0)
        } else {
            self.total_gross_amount.unwrap_or(0.0)
        }
    }
}

/// Outcome of a reconciliation pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileVerdict {
    Match,
    Mismatch { reason: String },
}

impl ReconcileVerdict {
    pub fn is_match(&self) -> bool {
        matches!(self, Self::Match)
    }
}

/// Normalized comparison triple: (qty to whole units, price to 2 decimals,
/// qty*price to 2 decimals).
fn normalize(quantity: f64, unit_price: f64) -> (i64, i64, i64) {
    let qty = quantity.round();
    let price = (unit_price * 100.0).round() / 100.0;
    let total = (qty * price * 100.0).round();
    (qty as i64, (price * 100.0).round() as i64, total as i64)
}

/// Compare the local payload lines and total against the remote snapshot.
///
/// Line counts must match exactly. The aggregate amounts must agree after
/// rounding to the nearest whole unit. Every normalized local triple must
/// find an unused remote triple; matching is order-independent via removal
/// from a working pool.
pub fn reconcile(
    local_lines: &[LocalLine],
    local_total: f64,
    remote: &RemoteInvoiceSnapshot,
) -> ReconcileVerdict {
    if local_lines.len() != remote.lines.len() {
        return ReconcileVerdict::Mismatch {
            reason: format!(
                "line count differs: local {} vs remote {}",
                local_lines.len(),
                remote.lines.len()
            ),
        };
    }

    let remote_total = remote.total();
    if local_total.round() != remote_total.round() {
        return ReconcileVerdict::Mismatch {
            reason: format!(
                "total differs: local {local_total} vs remote {remote_total}"
            ),
        };
    }

    let mut pool: Vec<(i64, i64, i64)> = remote
        .lines
        .iter()
        .map(|line| normalize(line.quantity, line.price_inclusive_tax))
        .collect();

    for line in local_lines {
        let triple = normalize(line.quantity, line.unit_price);
        match pool.iter().position(|candidate| *candidate == triple) {
            Some(index) => {
                pool.swap_remove(index);
            }
            None => {
                debug!(?triple, "no unused remote line matches local line");
                return ReconcileVerdict::Mismatch {
                    reason: format!(
                        "no remote line matches qty {} at price {}",
                        line.quantity, line.unit_price
                    ),
                };
            }
        }
    }

    ReconcileVerdict::Match
}
