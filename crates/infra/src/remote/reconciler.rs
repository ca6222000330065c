//! Reconciliation applier
//!
//! Takes the finalized remote record fetched at the end of the submission
//! chain and reconciles it against the local document. A match persists
//! the remote-issued compliance identifiers and notifies the UI. A
//! mismatch issues an automatic reversing credit note carrying the
//! remote-observed totals, bounded by the configured revision ceiling;
//! past the ceiling the document is left for manual review.

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use serde_json::Value;
use taxbridge_core::payload::{ReturnLinePayload, ReturnPayload};
use taxbridge_core::ports::{DocumentStore, EventPublisher, JobKind, JobQueue, JobSpec};
use taxbridge_core::reconcile::{
    reconcile, LocalLine, ReconcileVerdict, RemoteInvoiceSnapshot, RemoteScuData,
};
use taxbridge_core::{build_credit_note_payload, build_invoice_payload, calculate_tax};
use taxbridge_domain::{
    Doctype, InvoiceStatus, Result, SalesInvoice, ScuData, TaxBridgeError,
};
use tracing::{debug, info, instrument, warn};

use super::handlers::HandlerContext;
use super::response::ResponseBody;

/// Refund reason code carried by automatic reversals.
const AUTO_REFUND_REASON: &str = "13";

pub struct Reconciler {
    docs: Arc<dyn DocumentStore>,
    jobs: Arc<dyn JobQueue>,
    events: Arc<dyn EventPublisher>,
}

impl Reconciler {
    pub fn new(
        docs: Arc<dyn DocumentStore>,
        jobs: Arc<dyn JobQueue>,
        events: Arc<dyn EventPublisher>,
    ) -> Self {
        Self { docs, jobs, events }
    }

    /// Reconcile the fetched remote record against the local invoice.
    ///
    /// Records without SCU data are ignored: the remote side has not
    /// finalized yet and a later sweep will fetch again.
    #[instrument(skip(self, response, ctx), fields(document = ?ctx.document_name))]
    pub async fn apply(&self, response: &ResponseBody, ctx: &HandlerContext) -> Result<()> {
        let name = ctx
            .document_name
            .as_deref()
            .ok_or_else(|| TaxBridgeError::Internal("reconciliation without a document".into()))?;

        let Some(snapshot) = parse_snapshot(response) else {
            debug!(invoice = name, "remote record not parseable yet, skipping");
            return Ok(());
        };
        if snapshot.scu.is_none() {
            debug!(invoice = name, "remote record carries no SCU data yet");
            return Ok(());
        }

        let invoice = self.docs.get_sales_invoice(name).await?;
        let (local_lines, local_total) = local_view(&invoice)?;

        match reconcile(&local_lines, local_total, &snapshot) {
            ReconcileVerdict::Match => self.apply_match(&invoice, &snapshot).await,
            ReconcileVerdict::Mismatch { reason } => {
                self.apply_mismatch(ctx, &invoice, &snapshot, &reason).await
            }
        }
    }

    async fn apply_match(
        &self,
        invoice: &SalesInvoice,
        snapshot: &RemoteInvoiceSnapshot,
    ) -> Result<()> {
        if let Some(id) = snapshot.id.as_deref() {
            self.docs.set_invoice_remote_id(&invoice.name, id).await?;
        }

        let scu = snapshot
            .scu
            .as_ref()
            .map(map_scu_fields)
            .ok_or_else(|| TaxBridgeError::Internal("match without SCU data".into()))?;
        self.docs.set_invoice_scu_data(&invoice.name, &scu).await?;

        info!(invoice = %invoice.name, "reconciliation matched, compliance data persisted");
        self.events.publish_refresh(Doctype::SalesInvoice.as_str(), &invoice.name).await;
        Ok(())
    }

    async fn apply_mismatch(
        &self,
        ctx: &HandlerContext,
        invoice: &SalesInvoice,
        snapshot: &RemoteInvoiceSnapshot,
        reason: &str,
    ) -> Result<()> {
        if invoice.status == InvoiceStatus::CreditNoteIssued {
            debug!(invoice = %invoice.name, "credit note already issued, leaving as-is");
            return Ok(());
        }

        let revision_count = invoice.submission.revision_count + 1;
        let ceiling = ctx.settings.max_allowed_revisions;
        if ceiling > 0 && revision_count > ceiling {
            warn!(
                invoice = %invoice.name,
                revision_count,
                ceiling,
                reason,
                "revision ceiling reached, leaving document for manual review"
            );
            return Ok(());
        }

        warn!(invoice = %invoice.name, revision_count, reason, "reconciliation mismatch, issuing reversal");
        self.docs.set_invoice_revision_count(&invoice.name, revision_count).await?;

        if !invoice.is_return {
            let reversal = remote_reversal_payload(invoice, snapshot);
            let payload_json = serde_json::to_string(&reversal).map_err(|err| {
                TaxBridgeError::Internal(format!("failed to serialize reversal payload: {err}"))
            })?;
            self.jobs
                .enqueue(
                    JobSpec::new(
                        JobKind::IssueCreditNote {
                            invoice: invoice.name.clone(),
                            payload_json,
                        },
                        ctx.settings.name.clone(),
                    )
                    .at_front(),
                )
                .await?;
        }

        // Original-side bookkeeping runs again once the reversal lands.
        self.jobs
            .enqueue(JobSpec::new(
                JobKind::SubmitInvoice { invoice: invoice.name.clone() },
                ctx.settings.name.clone(),
            ))
            .await
    }
}

/// Extract the snapshot from the details body; list responses use the
/// first result.
fn parse_snapshot(response: &ResponseBody) -> Option<RemoteInvoiceSnapshot> {
    let value = response.as_json()?;
    let record: &Value = match value.get("results").and_then(Value::as_array) {
        Some(results) => results.first()?,
        None => value,
    };
    serde_json::from_value(record.clone()).ok()
}

/// Local payload view used for matching: tax-inclusive unit prices and
/// the submitted total.
fn local_view(invoice: &SalesInvoice) -> Result<(Vec<LocalLine>, f64)> {
    let mut calculated = invoice.clone();
    calculate_tax(&mut calculated);

    if calculated.is_return {
        let payload = build_credit_note_payload(&calculated, &calculated.reference_number())?;
        let lines = payload
            .lines
            .iter()
            .map(|line| LocalLine { quantity: line.quantity, unit_price: line.unit_price })
            .collect();
        Ok((lines, payload.total_gross_amount))
    } else {
        let payload = build_invoice_payload(&calculated)?;
        let lines = payload
            .lines
            .iter()
            .map(|line| LocalLine { quantity: line.quantity, unit_price: line.unit_price })
            .collect();
        Ok((lines, payload.total_gross_amount))
    }
}

/// Reversal payload mirroring exactly what the remote recorded.
fn remote_reversal_payload(
    invoice: &SalesInvoice,
    snapshot: &RemoteInvoiceSnapshot,
) -> ReturnPayload {
    ReturnPayload {
        document_name: invoice.name.clone(),
        invoice_reference: snapshot
            .reference_number
            .clone()
            .unwrap_or_else(|| invoice.reference_number()),
        refund_reason: AUTO_REFUND_REASON.to_string(),
        amount: snapshot.total(),
        items: snapshot
            .lines
            .iter()
            .map(|line| ReturnLinePayload {
                item_name: line.product_name.clone(),
                quantity: line.quantity.abs(),
                amount: line.price_inclusive_tax.abs(),
            })
            .collect(),
    }
}

/// Map the remote SCU block onto the persisted compliance fields.
fn map_scu_fields(scu: &RemoteScuData) -> ScuData {
    ScuData {
        receipt_number: scu.scu_receipt_number.clone(),
        receipt_signature: scu.scu_receipt_signature.clone(),
        internal_data: scu.scu_internal_data.clone(),
        qr_code_url: scu.qr_code_url.clone(),
        scu_id: scu.scu_id.clone(),
        mrc_number: scu.scu_mrc_number.clone(),
        invoice_number: scu.scu_invoice_number.clone(),
        receipt_timestamp: scu.scu_receipt_timestamp.as_deref().and_then(parse_timestamp),
    }
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}
