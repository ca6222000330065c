//! Response handler registry and concrete handlers
//!
//! Each route key binds exactly one success handler and at most one error
//! handler. The registry is built once at startup; dispatch is a closed
//! enum lookup, not a stringly-typed table. Handlers persist remote state
//! onto documents and enqueue the next workflow step; they never call the
//! transport themselves.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use taxbridge_core::ports::{DocumentStore, EventPublisher, JobKind, JobQueue, JobSpec};
use taxbridge_core::routes::RouteKey;
use taxbridge_domain::{Doctype, IntegrationSettings, Result, TaxBridgeError};
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use super::reconciler::Reconciler;
use super::request::RemoteCall;
use super::response::ResponseBody;
use super::transport::Transport;

/// Context passed to every handler invocation.
#[derive(Debug, Clone)]
pub struct HandlerContext {
    pub settings: IntegrationSettings,
    pub doctype: Option<Doctype>,
    pub document_name: Option<String>,
    /// Owning document when the call targets a child row (e.g. the invoice
    /// an invoice line belongs to).
    pub parent_name: Option<String>,
    /// The payload the call was made with.
    pub payload: Value,
}

impl HandlerContext {
    fn document_name(&self) -> Result<&str> {
        self.document_name
            .as_deref()
            .ok_or_else(|| TaxBridgeError::Internal("handler invoked without a document".into()))
    }
}

/// Reference to the originating business document of a call.
#[derive(Debug, Clone, Default)]
pub struct RequestReference {
    pub doctype: Option<Doctype>,
    pub document_name: Option<String>,
    pub parent_name: Option<String>,
}

impl RequestReference {
    #[must_use]
    pub fn document(doctype: Doctype, name: impl Into<String>) -> Self {
        Self { doctype: Some(doctype), document_name: Some(name.into()), parent_name: None }
    }

    #[must_use]
    pub fn child(doctype: Doctype, name: impl Into<String>, parent: impl Into<String>) -> Self {
        Self {
            doctype: Some(doctype),
            document_name: Some(name.into()),
            parent_name: Some(parent.into()),
        }
    }
}

/// One response callback. Success handlers receive the decoded body;
/// error handlers receive the extracted message wrapped as a text body.
#[async_trait]
pub trait ResponseHandler: Send + Sync {
    async fn handle(&self, response: &ResponseBody, ctx: &HandlerContext) -> Result<()>;
}

/// Shared dependencies of the standard handler set.
#[derive(Clone)]
pub struct HandlerDeps {
    pub docs: Arc<dyn DocumentStore>,
    pub jobs: Arc<dyn JobQueue>,
    pub events: Arc<dyn EventPublisher>,
}

/// Route-keyed bindings of success and error handlers.
pub struct HandlerRegistry {
    success: HashMap<RouteKey, Arc<dyn ResponseHandler>>,
    error: HashMap<RouteKey, Arc<dyn ResponseHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self { success: HashMap::new(), error: HashMap::new() }
    }

    /// Bind a success handler (and optionally an error handler) to a route.
    pub fn bind(
        &mut self,
        route: RouteKey,
        success: Arc<dyn ResponseHandler>,
        error: Option<Arc<dyn ResponseHandler>>,
    ) {
        self.success.insert(route, success);
        if let Some(error) = error {
            self.error.insert(route, error);
        }
    }

    pub fn success_handler(&self, route: RouteKey) -> Option<Arc<dyn ResponseHandler>> {
        self.success.get(&route).cloned()
    }

    pub fn error_handler(&self, route: RouteKey) -> Option<Arc<dyn ResponseHandler>> {
        self.error.get(&route).cloned()
    }

    /// The full production binding table.
    pub fn standard(deps: HandlerDeps, reconciler: Arc<Reconciler>) -> Self {
        let mut registry = Self::new();

        let invoice_save = Arc::new(InvoiceSaveHandler { deps: deps.clone() });
        let sales_error = Arc::new(SalesErrorHandler { deps: deps.clone() });
        registry.bind(
            RouteKey::SalesInvoiceSave,
            invoice_save.clone(),
            Some(sales_error.clone()),
        );
        registry.bind(RouteKey::CreditNoteSave, invoice_save, Some(sales_error));

        let line_save = Arc::new(LineSaveHandler { deps: deps.clone() });
        registry.bind(RouteKey::SalesLineSave, line_save.clone(), None);
        registry.bind(RouteKey::CreditNoteLineSave, line_save, None);

        let transition = Arc::new(TransitionHandler { deps: deps.clone() });
        registry.bind(RouteKey::SalesTransition, transition.clone(), None);
        registry.bind(RouteKey::CreditNoteTransition, transition, None);

        let sign = Arc::new(SignHandler { deps: deps.clone() });
        registry.bind(RouteKey::SalesSign, sign.clone(), None);
        registry.bind(RouteKey::CreditNoteSign, sign, None);

        registry.bind(RouteKey::SalesDetails, Arc::new(DetailsHandler { reconciler }), None);
        registry.bind(RouteKey::ReturnSave, Arc::new(ReturnSaveHandler { deps: deps.clone() }), None);

        registry.bind(RouteKey::ItemSave, Arc::new(ItemRegistrationHandler { deps: deps.clone() }), None);
        registry.bind(
            RouteKey::PartnerSave,
            Arc::new(PartnerRegistrationHandler { deps: deps.clone() }),
            None,
        );
        registry.bind(RouteKey::PurchaseSave, Arc::new(PurchaseHandler { deps: deps.clone() }), None);
        registry.bind(
            RouteKey::StockAdjustmentSave,
            Arc::new(StockAdjustmentHandler { deps: deps.clone() }),
            None,
        );
        registry.bind(RouteKey::StockMasterSave, Arc::new(NoopHandler), None);
        registry.bind(RouteKey::StockAdjustmentTransition, Arc::new(NoopHandler), None);

        registry
    }
}

impl Default for HandlerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Client tying the transport to the handler registry.
///
/// `process_request` is the single entry point every pipeline step goes
/// through: build the call, execute it, and dispatch the outcome to the
/// bound handlers.
pub struct FiscalApi {
    transport: Arc<Transport>,
    registry: Arc<HandlerRegistry>,
}

impl FiscalApi {
    pub fn new(transport: Arc<Transport>, registry: Arc<HandlerRegistry>) -> Self {
        Self { transport, registry }
    }

    /// Execute a remote operation and run its bound callbacks.
    ///
    /// # Errors
    /// Returns `TaxBridgeError::Config` when the route has no success
    /// handler bound, or the converted transport error on failure. The
    /// error handler (when bound) has already run by the time the error is
    /// returned.
    #[instrument(skip(self, settings, payload, reference), fields(route = %route))]
    pub async fn process_request(
        &self,
        settings: &IntegrationSettings,
        route: RouteKey,
        payload: Value,
        reference: RequestReference,
    ) -> Result<ResponseBody> {
        let success_handler = self.registry.success_handler(route).ok_or_else(|| {
            TaxBridgeError::Config(format!("no success handler bound for route {route}"))
        })?;

        let mut call = RemoteCall::build(settings, route, payload.clone())?;
        if let (Some(doctype), Some(name)) = (reference.doctype, reference.document_name.as_ref())
        {
            call = call.with_reference(doctype, name.clone());
        }

        let ctx = HandlerContext {
            settings: settings.clone(),
            doctype: reference.doctype,
            document_name: reference.document_name.clone(),
            parent_name: reference.parent_name.clone(),
            payload,
        };

        match self.transport.execute(settings, &call).await {
            Ok(body) => {
                success_handler.handle(&body, &ctx).await?;
                Ok(body)
            }
            Err(remote_err) => {
                // Generic error notifier: the request log is already marked
                // failed; surface the context for the error log.
                error!(
                    route = %route,
                    doctype = ?reference.doctype,
                    document = ?reference.document_name,
                    error = %remote_err,
                    "remote call failed"
                );

                if let Some(error_handler) = self.registry.error_handler(route) {
                    let failure_body = ResponseBody::Text(remote_err.to_string());
                    if let Err(handler_err) = error_handler.handle(&failure_body, &ctx).await {
                        warn!(error = %handler_err, "error handler failed");
                    }
                }

                Err(TaxBridgeError::from(remote_err))
            }
        }
    }
}

fn remote_id(response: &ResponseBody) -> Result<String> {
    response
        .json_str("id")
        .map(str::to_string)
        .ok_or_else(|| TaxBridgeError::Transport("response body carries no remote id".into()))
}

/* -------------------------------------------------------------------------- */
/* Concrete handlers */
/* -------------------------------------------------------------------------- */

/// Invoice/credit-note header saved: persist the remote id and hand off to
/// the line-save step.
struct InvoiceSaveHandler {
    deps: HandlerDeps,
}

#[async_trait]
impl ResponseHandler for InvoiceSaveHandler {
    async fn handle(&self, response: &ResponseBody, ctx: &HandlerContext) -> Result<()> {
        let name = ctx.document_name()?;
        let id = remote_id(response)?;
        self.deps.docs.set_invoice_remote_id(name, &id).await?;
        debug!(invoice = name, remote_id = %id, "invoice header saved remotely");

        self.deps
            .jobs
            .enqueue(JobSpec::new(
                JobKind::SaveInvoiceLines { invoice: name.to_string() },
                ctx.settings.name.clone(),
            ))
            .await
    }
}

/// One line saved: persist the line's remote id.
struct LineSaveHandler {
    deps: HandlerDeps,
}

#[async_trait]
impl ResponseHandler for LineSaveHandler {
    async fn handle(&self, response: &ResponseBody, ctx: &HandlerContext) -> Result<()> {
        let line = ctx.document_name()?;
        let invoice = ctx
            .parent_name
            .as_deref()
            .ok_or_else(|| TaxBridgeError::Internal("line save without parent invoice".into()))?;
        let id = remote_id(response)?;
        self.deps.docs.set_line_remote_id(invoice, line, &id).await
    }
}

/// Transition succeeded: flag it and enqueue the sign step.
struct TransitionHandler {
    deps: HandlerDeps,
}

#[async_trait]
impl ResponseHandler for TransitionHandler {
    async fn handle(&self, _response: &ResponseBody, ctx: &HandlerContext) -> Result<()> {
        let name = ctx.document_name()?;
        self.deps.docs.set_invoice_transitioned(name).await?;
        self.deps
            .jobs
            .enqueue(JobSpec::new(
                JobKind::SignInvoice { invoice: name.to_string() },
                ctx.settings.name.clone(),
            ))
            .await
    }
}

/// Sign succeeded: the invoice is now submitted; fetch the finalized
/// record next.
struct SignHandler {
    deps: HandlerDeps,
}

#[async_trait]
impl ResponseHandler for SignHandler {
    async fn handle(&self, _response: &ResponseBody, ctx: &HandlerContext) -> Result<()> {
        let name = ctx.document_name()?;
        self.deps.docs.set_invoice_signed(name).await?;
        info!(invoice = name, "invoice signed remotely");
        self.deps
            .jobs
            .enqueue(JobSpec::new(
                JobKind::FetchInvoiceDetails { invoice: name.to_string() },
                ctx.settings.name.clone(),
            ))
            .await
    }
}

/// Finalized record fetched: reconcile it against the local document.
struct DetailsHandler {
    reconciler: Arc<Reconciler>,
}

#[async_trait]
impl ResponseHandler for DetailsHandler {
    async fn handle(&self, response: &ResponseBody, ctx: &HandlerContext) -> Result<()> {
        self.reconciler.apply(response, ctx).await
    }
}

/// Automatic reversal saved: keep the submitted flag and re-check the
/// remote record.
struct ReturnSaveHandler {
    deps: HandlerDeps,
}

#[async_trait]
impl ResponseHandler for ReturnSaveHandler {
    async fn handle(&self, _response: &ResponseBody, ctx: &HandlerContext) -> Result<()> {
        let name = ctx.document_name()?;
        self.deps.docs.set_invoice_signed(name).await?;
        self.deps
            .jobs
            .enqueue(JobSpec::new(
                JobKind::FetchInvoiceDetails { invoice: name.to_string() },
                ctx.settings.name.clone(),
            ))
            .await
    }
}

/// Item registered: persist the remote id; stock items also push their
/// current inventory level.
struct ItemRegistrationHandler {
    deps: HandlerDeps,
}

#[async_trait]
impl ResponseHandler for ItemRegistrationHandler {
    async fn handle(&self, response: &ResponseBody, ctx: &HandlerContext) -> Result<()> {
        let item_code = ctx.document_name()?;
        let id = remote_id(response)?;
        self.deps.docs.set_item_remote_id(item_code, &id).await?;

        let item = self.deps.docs.get_item(item_code).await?;
        if item.is_stock_item {
            self.deps
                .jobs
                .enqueue(JobSpec::new(
                    JobKind::SubmitItemInventory { item_code: item_code.to_string() },
                    ctx.settings.name.clone(),
                ))
                .await?;
        }
        Ok(())
    }
}

struct PartnerRegistrationHandler {
    deps: HandlerDeps,
}

#[async_trait]
impl ResponseHandler for PartnerRegistrationHandler {
    async fn handle(&self, response: &ResponseBody, ctx: &HandlerContext) -> Result<()> {
        let name = ctx.document_name()?;
        let id = remote_id(response)?;
        self.deps.docs.set_partner_remote_id(name, &id).await
    }
}

struct PurchaseHandler {
    deps: HandlerDeps,
}

#[async_trait]
impl ResponseHandler for PurchaseHandler {
    async fn handle(&self, _response: &ResponseBody, ctx: &HandlerContext) -> Result<()> {
        self.deps.docs.set_purchase_submitted(ctx.document_name()?).await
    }
}

struct StockAdjustmentHandler {
    deps: HandlerDeps,
}

#[async_trait]
impl ResponseHandler for StockAdjustmentHandler {
    async fn handle(&self, _response: &ResponseBody, ctx: &HandlerContext) -> Result<()> {
        self.deps.docs.set_stock_adjustment_submitted(ctx.document_name()?).await
    }
}

/// Success acknowledged, nothing to persist.
struct NoopHandler;

#[async_trait]
impl ResponseHandler for NoopHandler {
    async fn handle(&self, _response: &ResponseBody, _ctx: &HandlerContext) -> Result<()> {
        Ok(())
    }
}

/// Duplicate-entity marker emitted when the remote finds two products for
/// one lookup.
const DUPLICATE_PRODUCT_MARKER: &str = "returned more than one Product";
/// Duplicate-entity marker for business partners.
const DUPLICATE_PARTNER_MARKER: &str = "returned more than one BusinessPartner";

/// Error router for sales submissions: duplicate-entity failures trigger a
/// compensating re-registration followed by a delayed retry of the whole
/// submission under a unique job name.
struct SalesErrorHandler {
    deps: HandlerDeps,
}

#[async_trait]
impl ResponseHandler for SalesErrorHandler {
    async fn handle(&self, response: &ResponseBody, ctx: &HandlerContext) -> Result<()> {
        let message = match response {
            ResponseBody::Text(text) => text.clone(),
            ResponseBody::Json(value) => value.to_string(),
            _ => return Ok(()),
        };
        let name = ctx.document_name()?;
        let invoice = self.deps.docs.get_sales_invoice(name).await?;

        if message.contains(DUPLICATE_PRODUCT_MARKER) {
            warn!(invoice = name, "duplicate product reported, re-registering items");
            for line in &invoice.items {
                self.deps
                    .jobs
                    .enqueue(JobSpec::new(
                        JobKind::RegisterItem { item_code: line.item_code.clone() },
                        ctx.settings.name.clone(),
                    ))
                    .await?;
            }
            self.enqueue_retry(&ctx.settings, name).await?;
        } else if message.contains(DUPLICATE_PARTNER_MARKER) {
            warn!(invoice = name, "duplicate partner reported, re-registering customer");
            self.deps
                .jobs
                .enqueue(JobSpec::new(
                    JobKind::RegisterPartner { partner: invoice.customer.clone() },
                    ctx.settings.name.clone(),
                ))
                .await?;
            self.enqueue_retry(&ctx.settings, name).await?;
        }

        Ok(())
    }
}

impl SalesErrorHandler {
    async fn enqueue_retry(&self, settings: &IntegrationSettings, invoice: &str) -> Result<()> {
        let job_name = format!("retry_invoice_{invoice}_{}", Uuid::new_v4());
        self.deps
            .jobs
            .enqueue(
                JobSpec::new(
                    JobKind::SubmitInvoice { invoice: invoice.to_string() },
                    settings.name.clone(),
                )
                .with_job_name(job_name)
                .with_delay(settings.duplicate_retry_delay()),
            )
            .await
    }
}
