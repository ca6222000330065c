//! Sequential sales transaction orchestrator
//!
//! Drives the `Draft → LinesSaved → Transitioned → Signed → Finalized`
//! chain. Every step performs exactly one kind of remote operation and
//! hands off to the next step through the background job queue; the chain
//! is causally ordered per document but never blocks on a job result.
//!
//! Idempotency: remote-id assignment is the de-facto lock. Lines that
//! already carry a remote id are PATCHed, never re-POSTed, and a step that
//! observes a state it did not expect treats its own action as a no-op.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use taxbridge_core::payload::{
    build_credit_note_payload, build_invoice_payload, build_item_payload, build_line_payload,
    build_partner_payload, build_purchase_payload, build_stock_adjustment_payload,
};
use taxbridge_core::ports::{DocumentStore, JobKind, JobQueue, JobSpec, SettingsStore};
use taxbridge_core::routes::RouteKey;
use taxbridge_core::workflow::{derive_phase, next_step, SubmissionStep};
use taxbridge_core::calculate_tax;
use taxbridge_domain::{
    Doctype, IntegrationSettings, InvoiceStatus, Result, SalesInvoice, TaxBridgeError,
};
use tracing::{debug, info, instrument, warn};

use crate::jobs::JobExecutor;

use super::handlers::{FiscalApi, RequestReference};

pub struct SalesOrchestrator {
    api: Arc<FiscalApi>,
    docs: Arc<dyn DocumentStore>,
    jobs: Arc<dyn JobQueue>,
}

impl SalesOrchestrator {
    pub fn new(
        api: Arc<FiscalApi>,
        docs: Arc<dyn DocumentStore>,
        jobs: Arc<dyn JobQueue>,
    ) -> Self {
        Self { api, docs, jobs }
    }

    /// Entry point: save the invoice (or credit note) header remotely.
    ///
    /// # Errors
    /// - `TaxBridgeError::Config` when an item is not registered or lacks
    ///   its remote tax code (registration is enqueued as compensation)
    /// - `TaxBridgeError::InvalidInput` when a return's original was never
    ///   submitted
    #[instrument(skip(self, settings), fields(invoice = %invoice_name))]
    pub async fn submit(&self, settings: &IntegrationSettings, invoice_name: &str) -> Result<()> {
        let mut invoice = self.docs.get_sales_invoice(invoice_name).await?;

        if invoice.prevent_submission || invoice.status == InvoiceStatus::CreditNoteIssued {
            debug!(invoice = invoice_name, "submission prevented, skipping");
            return Ok(());
        }
        if invoice.submission.remote_id.is_some() {
            // Another job won the race; continue from where it left off.
            debug!(invoice = invoice_name, "remote id already assigned, resuming instead");
            return self.resume(settings, invoice_name).await;
        }

        self.ensure_items_registered(settings, &invoice).await?;
        calculate_tax(&mut invoice);

        if invoice.is_return {
            let original_name = invoice.return_against.clone().ok_or_else(|| {
                TaxBridgeError::InvalidInput(format!(
                    "return {invoice_name} names no original invoice"
                ))
            })?;
            let original = self.docs.get_sales_invoice(&original_name).await?;
            if !original.submission.submitted {
                return Err(TaxBridgeError::InvalidInput(format!(
                    "return against invoice {original_name} which was not successfully submitted"
                )));
            }

            let payload = build_credit_note_payload(&invoice, &original.reference_number())?;
            self.api
                .process_request(
                    settings,
                    RouteKey::CreditNoteSave,
                    to_value(&payload)?,
                    RequestReference::document(Doctype::SalesInvoice, invoice_name),
                )
                .await?;
        } else {
            let payload = build_invoice_payload(&invoice)?;
            self.api
                .process_request(
                    settings,
                    RouteKey::SalesInvoiceSave,
                    to_value(&payload)?,
                    RequestReference::document(Doctype::SalesInvoice, invoice_name),
                )
                .await?;
        }

        Ok(())
    }

    /// Save every line individually: POST when new, PATCH when the line
    /// already carries a remote id. Hands off to the transition step.
    #[instrument(skip(self, settings), fields(invoice = %invoice_name))]
    pub async fn save_lines(
        &self,
        settings: &IntegrationSettings,
        invoice_name: &str,
    ) -> Result<()> {
        let mut invoice = self.docs.get_sales_invoice(invoice_name).await?;
        let Some(remote_id) = invoice.submission.remote_id.clone() else {
            warn!(invoice = invoice_name, "line save before header save, skipping");
            return Ok(());
        };

        calculate_tax(&mut invoice);
        let route = RouteKey::line_save(invoice.is_return);

        for line in &invoice.items {
            let item = self.docs.get_item(&line.item_code).await?;
            let remote_item_id = item.remote_id.ok_or_else(|| {
                TaxBridgeError::Config(format!(
                    "item {} is not registered remotely; line cannot be saved",
                    line.item_code
                ))
            })?;

            let payload = build_line_payload(&invoice, line, &remote_item_id, &remote_id);
            self.api
                .process_request(
                    settings,
                    route,
                    to_value(&payload)?,
                    RequestReference::child(Doctype::SalesInvoice, line.name.clone(), invoice_name),
                )
                .await?;
        }

        self.jobs
            .enqueue(JobSpec::new(
                JobKind::TransitionInvoice { invoice: invoice_name.to_string() },
                settings.name.clone(),
            ))
            .await
    }

    /// Transition the saved remote invoice.
    #[instrument(skip(self, settings), fields(invoice = %invoice_name))]
    pub async fn transition(
        &self,
        settings: &IntegrationSettings,
        invoice_name: &str,
    ) -> Result<()> {
        let Some((invoice, remote_id)) = self.invoice_with_remote_id(invoice_name).await? else {
            return Ok(());
        };

        let payload = serde_json::json!({
            "invoice_id": remote_id,
            "document_name": invoice_name,
        });
        self.api
            .process_request(
                settings,
                RouteKey::transition(invoice.is_return),
                payload,
                RequestReference::document(Doctype::SalesInvoice, invoice_name),
            )
            .await?;
        Ok(())
    }

    /// Request the cryptographic signature.
    #[instrument(skip(self, settings), fields(invoice = %invoice_name))]
    pub async fn sign(&self, settings: &IntegrationSettings, invoice_name: &str) -> Result<()> {
        let Some((invoice, remote_id)) = self.invoice_with_remote_id(invoice_name).await? else {
            return Ok(());
        };

        let payload = serde_json::json!({
            "invoice_id": remote_id,
            "document_name": invoice_name,
        });
        self.api
            .process_request(
                settings,
                RouteKey::sign(invoice.is_return),
                payload,
                RequestReference::document(Doctype::SalesInvoice, invoice_name),
            )
            .await?;
        Ok(())
    }

    /// Fetch the finalized remote record; its handler reconciles.
    #[instrument(skip(self, settings), fields(invoice = %invoice_name))]
    pub async fn fetch_details(
        &self,
        settings: &IntegrationSettings,
        invoice_name: &str,
    ) -> Result<()> {
        let Some((_invoice, remote_id)) = self.invoice_with_remote_id(invoice_name).await? else {
            return Ok(());
        };

        let payload = serde_json::json!({
            "invoice_id": remote_id,
            "document_name": invoice_name,
        });
        self.api
            .process_request(
                settings,
                RouteKey::SalesDetails,
                payload,
                RequestReference::document(Doctype::SalesInvoice, invoice_name),
            )
            .await?;
        Ok(())
    }

    /// Submit an automatic reversal prepared by the reconciler.
    #[instrument(skip(self, settings, payload_json), fields(invoice = %invoice_name))]
    pub async fn issue_credit_note(
        &self,
        settings: &IntegrationSettings,
        invoice_name: &str,
        payload_json: &str,
    ) -> Result<()> {
        let payload: Value = serde_json::from_str(payload_json).map_err(|err| {
            TaxBridgeError::Internal(format!("invalid reversal payload: {err}"))
        })?;
        self.api
            .process_request(
                settings,
                RouteKey::ReturnSave,
                payload,
                RequestReference::document(Doctype::SalesInvoice, invoice_name),
            )
            .await?;
        Ok(())
    }

    /// Register an item master record remotely.
    #[instrument(skip(self, settings), fields(item = %item_code))]
    pub async fn register_item(
        &self,
        settings: &IntegrationSettings,
        item_code: &str,
    ) -> Result<()> {
        let item = self.docs.get_item(item_code).await?;
        if item.disabled || item.prevent_registration {
            debug!(item = item_code, "item excluded from registration");
            return Ok(());
        }

        let payload = build_item_payload(&item)?;
        self.api
            .process_request(
                settings,
                RouteKey::ItemSave,
                to_value(&payload)?,
                RequestReference::document(Doctype::Item, item_code),
            )
            .await?;
        Ok(())
    }

    /// Register a customer or supplier remotely.
    #[instrument(skip(self, settings), fields(partner = %partner_name))]
    pub async fn register_partner(
        &self,
        settings: &IntegrationSettings,
        partner_name: &str,
    ) -> Result<()> {
        let partner = self.docs.get_partner(partner_name).await?;
        if partner.disabled || partner.prevent_registration {
            debug!(partner = partner_name, "partner excluded from registration");
            return Ok(());
        }

        let doctype = match partner.kind {
            taxbridge_domain::PartnerKind::Customer => Doctype::Customer,
            taxbridge_domain::PartnerKind::Supplier => Doctype::Supplier,
        };
        let payload = build_partner_payload(&partner);
        self.api
            .process_request(
                settings,
                RouteKey::PartnerSave,
                to_value(&payload)?,
                RequestReference::document(doctype, partner_name),
            )
            .await?;
        Ok(())
    }

    /// Push an item's current stock level after registration.
    #[instrument(skip(self, settings), fields(item = %item_code))]
    pub async fn submit_item_inventory(
        &self,
        settings: &IntegrationSettings,
        item_code: &str,
    ) -> Result<()> {
        let item = self.docs.get_item(item_code).await?;
        let Some(remote_id) = item.remote_id else {
            warn!(item = item_code, "inventory push before registration, skipping");
            return Ok(());
        };

        let quantity = self.docs.stock_balance(item_code).await?;
        let payload = serde_json::json!({
            "document_name": item_code,
            "product": remote_id,
            "quantity": quantity,
        });
        self.api
            .process_request(
                settings,
                RouteKey::StockMasterSave,
                payload,
                RequestReference::document(Doctype::Item, item_code),
            )
            .await?;
        Ok(())
    }

    /// Submit a purchase invoice.
    #[instrument(skip(self, settings), fields(invoice = %invoice_name))]
    pub async fn submit_purchase(
        &self,
        settings: &IntegrationSettings,
        invoice_name: &str,
    ) -> Result<()> {
        let purchase = self.docs.get_purchase_invoice(invoice_name).await?;
        if purchase.submitted {
            debug!(invoice = invoice_name, "purchase already submitted");
            return Ok(());
        }

        let payload = build_purchase_payload(&purchase)?;
        self.api
            .process_request(
                settings,
                RouteKey::PurchaseSave,
                to_value(&payload)?,
                RequestReference::document(Doctype::PurchaseInvoice, invoice_name),
            )
            .await?;
        Ok(())
    }

    /// Submit a stock adjustment.
    #[instrument(skip(self, settings), fields(adjustment = %adjustment_name))]
    pub async fn submit_stock_adjustment(
        &self,
        settings: &IntegrationSettings,
        adjustment_name: &str,
    ) -> Result<()> {
        let adjustment = self.docs.get_stock_adjustment(adjustment_name).await?;
        if adjustment.submitted {
            debug!(adjustment = adjustment_name, "stock adjustment already submitted");
            return Ok(());
        }

        let payload = build_stock_adjustment_payload(&adjustment);
        self.api
            .process_request(
                settings,
                RouteKey::StockAdjustmentSave,
                to_value(&payload)?,
                RequestReference::document(Doctype::StockAdjustment, adjustment_name),
            )
            .await?;
        Ok(())
    }

    /// Re-enter the workflow at the step derived from persisted state.
    /// Used by the periodic sweep and by racing jobs.
    #[instrument(skip(self, settings), fields(invoice = %invoice_name))]
    pub async fn resume(&self, settings: &IntegrationSettings, invoice_name: &str) -> Result<()> {
        let invoice = self.docs.get_sales_invoice(invoice_name).await?;
        let Some(kind) = resume_job(&invoice) else {
            debug!(invoice = invoice_name, "nothing to resume");
            return Ok(());
        };

        info!(invoice = invoice_name, job = ?kind, "resuming submission workflow");
        self.jobs.enqueue(JobSpec::new(kind, settings.name.clone())).await
    }

    async fn invoice_with_remote_id(
        &self,
        invoice_name: &str,
    ) -> Result<Option<(SalesInvoice, String)>> {
        let invoice = self.docs.get_sales_invoice(invoice_name).await?;
        match invoice.submission.remote_id.clone() {
            Some(remote_id) => Ok(Some((invoice, remote_id))),
            None => {
                warn!(invoice = invoice_name, "step reached without remote id, skipping");
                Ok(None)
            }
        }
    }

    /// Every line's item must be registered remotely before submission;
    /// registration is enqueued for any that are not.
    async fn ensure_items_registered(
        &self,
        settings: &IntegrationSettings,
        invoice: &SalesInvoice,
    ) -> Result<()> {
        let mut unregistered: Vec<String> = Vec::new();
        for line in &invoice.items {
            let item = self.docs.get_item(&line.item_code).await?;
            if item.remote_id.is_none() {
                unregistered.push(line.item_code.clone());
            }
        }

        if unregistered.is_empty() {
            return Ok(());
        }

        for item_code in &unregistered {
            self.jobs
                .enqueue(JobSpec::new(
                    JobKind::RegisterItem { item_code: item_code.clone() },
                    settings.name.clone(),
                ))
                .await?;
        }

        Err(TaxBridgeError::Config(format!(
            "invoice {} contains unregistered items: {}; registration has been queued",
            invoice.name,
            unregistered.join(", ")
        )))
    }
}

/// The job that resumes an invoice from its persisted state, if any.
#[must_use]
pub fn resume_job(invoice: &SalesInvoice) -> Option<JobKind> {
    let phase = derive_phase(invoice);
    let step = next_step(phase)?;
    let name = invoice.name.clone();
    let kind = match step {
        SubmissionStep::SaveLines => {
            if invoice.submission.remote_id.is_none() {
                JobKind::SubmitInvoice { invoice: name }
            } else {
                JobKind::SaveInvoiceLines { invoice: name }
            }
        }
        SubmissionStep::Transition => JobKind::TransitionInvoice { invoice: name },
        SubmissionStep::Sign => JobKind::SignInvoice { invoice: name },
        SubmissionStep::FetchDetails => JobKind::FetchInvoiceDetails { invoice: name },
    };
    Some(kind)
}

fn to_value<T: serde::Serialize>(payload: &T) -> Result<Value> {
    serde_json::to_value(payload)
        .map_err(|err| TaxBridgeError::Internal(format!("failed to serialize payload: {err}")))
}

/// Executes queued jobs by dispatching them to the orchestrator.
pub struct PipelineExecutor {
    orchestrator: Arc<SalesOrchestrator>,
    settings_store: Arc<dyn SettingsStore>,
}

impl PipelineExecutor {
    pub fn new(
        orchestrator: Arc<SalesOrchestrator>,
        settings_store: Arc<dyn SettingsStore>,
    ) -> Self {
        Self { orchestrator, settings_store }
    }
}

#[async_trait]
impl JobExecutor for PipelineExecutor {
    async fn execute(&self, spec: &JobSpec) -> Result<()> {
        let settings = self.settings_store.load(&spec.settings_name).await?;

        match &spec.kind {
            JobKind::SubmitInvoice { invoice } => {
                self.orchestrator.submit(&settings, invoice).await
            }
            JobKind::SaveInvoiceLines { invoice } => {
                self.orchestrator.save_lines(&settings, invoice).await
            }
            JobKind::TransitionInvoice { invoice } => {
                self.orchestrator.transition(&settings, invoice).await
            }
            JobKind::SignInvoice { invoice } => self.orchestrator.sign(&settings, invoice).await,
            JobKind::FetchInvoiceDetails { invoice } => {
                self.orchestrator.fetch_details(&settings, invoice).await
            }
            JobKind::RegisterItem { item_code } => {
                self.orchestrator.register_item(&settings, item_code).await
            }
            JobKind::RegisterPartner { partner } => {
                self.orchestrator.register_partner(&settings, partner).await
            }
            JobKind::SubmitItemInventory { item_code } => {
                self.orchestrator.submit_item_inventory(&settings, item_code).await
            }
            JobKind::SubmitPurchaseInvoice { invoice } => {
                self.orchestrator.submit_purchase(&settings, invoice).await
            }
            JobKind::SubmitStockAdjustment { adjustment } => {
                self.orchestrator.submit_stock_adjustment(&settings, adjustment).await
            }
            JobKind::IssueCreditNote { invoice, payload_json } => {
                self.orchestrator.issue_credit_note(&settings, invoice, payload_json).await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use taxbridge_domain::{InvoiceLine, SubmissionState, TaxationCode};

    use super::*;

    fn line(name: &str, item: &str, remote_id: Option<&str>) -> InvoiceLine {
        InvoiceLine {
            name: name.into(),
            item_code: item.into(),
            item_name: item.into(),
            qty: 2.0,
            base_net_rate: 50.0,
            base_net_amount: 100.0,
            base_amount: 100.0,
            item_tax_template: None,
            tax_amount: 16.0,
            tax_rate: 16.0,
            taxation_code: Some(TaxationCode::B),
            remote_id: remote_id.map(String::from),
        }
    }

    fn invoice(submission: SubmissionState, lines: Vec<InvoiceLine>) -> SalesInvoice {
        SalesInvoice {
            name: "SINV-1".into(),
            company: "Acme Ltd".into(),
            customer: "CUST-1".into(),
            customer_name: "Customer".into(),
            conversion_rate: 1.0,
            is_return: false,
            return_against: None,
            base_grand_total: 116.0,
            items: lines,
            taxes: vec![],
            status: InvoiceStatus::Submitted,
            prevent_submission: false,
            submission,
        }
    }

    #[test]
    fn resume_job_maps_every_phase() {
        let draft = invoice(SubmissionState::default(), vec![line("L1", "ITM-1", None)]);
        assert_eq!(
            resume_job(&draft),
            Some(JobKind::SubmitInvoice { invoice: "SINV-1".into() })
        );

        let header_saved = invoice(
            SubmissionState { remote_id: Some("inv-1".into()), ..Default::default() },
            vec![line("L1", "ITM-1", None)],
        );
        assert_eq!(
            resume_job(&header_saved),
            Some(JobKind::SaveInvoiceLines { invoice: "SINV-1".into() })
        );

        let lines_saved = invoice(
            SubmissionState { remote_id: Some("inv-1".into()), ..Default::default() },
            vec![line("L1", "ITM-1", Some("line-1"))],
        );
        assert_eq!(
            resume_job(&lines_saved),
            Some(JobKind::TransitionInvoice { invoice: "SINV-1".into() })
        );

        let transitioned = invoice(
            SubmissionState {
                remote_id: Some("inv-1".into()),
                transitioned: true,
                ..Default::default()
            },
            vec![line("L1", "ITM-1", Some("line-1"))],
        );
        assert_eq!(
            resume_job(&transitioned),
            Some(JobKind::SignInvoice { invoice: "SINV-1".into() })
        );

        let signed = invoice(
            SubmissionState {
                remote_id: Some("inv-1".into()),
                transitioned: true,
                signed: true,
                submitted: true,
                ..Default::default()
            },
            vec![line("L1", "ITM-1", Some("line-1"))],
        );
        assert_eq!(
            resume_job(&signed),
            Some(JobKind::FetchInvoiceDetails { invoice: "SINV-1".into() })
        );

        let finalized = invoice(
            SubmissionState {
                remote_id: Some("inv-1".into()),
                transitioned: true,
                signed: true,
                submitted: true,
                scu: Some(taxbridge_domain::ScuData::default()),
                ..Default::default()
            },
            vec![line("L1", "ITM-1", Some("line-1"))],
        );
        assert_eq!(resume_job(&finalized), None);
    }
}
