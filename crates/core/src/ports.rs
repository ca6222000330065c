//! Port interfaces for the integration pipeline
//!
//! All external collaborators the core logic needs, expressed as traits.
//! The ERP's document storage, the durable request log, the background job
//! queue and the settings record are infrastructure concerns implemented
//! by adapters in `taxbridge-infra` (or by mocks in tests).

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use taxbridge_domain::{
    IntegrationSettings, Item, Partner, PurchaseInvoice, RequestLog, Result, SalesInvoice,
    ScuData, StockAdjustment, TokenSet,
};

/// Access to the ERP's business documents.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn get_sales_invoice(&self, name: &str) -> Result<SalesInvoice>;

    /// Persist the remote invoice id assigned by the fiscal service.
    async fn set_invoice_remote_id(&self, name: &str, remote_id: &str) -> Result<()>;

    /// Persist the remote id of one invoice line.
    async fn set_line_remote_id(&self, invoice: &str, line: &str, remote_id: &str) -> Result<()>;

    async fn set_invoice_transitioned(&self, name: &str) -> Result<()>;

    /// Mark the invoice signed and submitted.
    async fn set_invoice_signed(&self, name: &str) -> Result<()>;

    /// Persist the remote-issued compliance identifiers.
    async fn set_invoice_scu_data(&self, name: &str, scu: &ScuData) -> Result<()>;

    async fn set_invoice_revision_count(&self, name: &str, count: u32) -> Result<()>;

    /// Increment and return the submission attempt counter.
    async fn bump_submission_attempts(&self, name: &str) -> Result<u32>;

    /// Submitted-but-unfinished invoices created since `since`, for the
    /// periodic sweep.
    async fn list_unfinished_sales_invoices(
        &self,
        since: DateTime<Utc>,
    ) -> Result<Vec<SalesInvoice>>;

    async fn get_item(&self, item_code: &str) -> Result<Item>;
    async fn set_item_remote_id(&self, item_code: &str, remote_id: &str) -> Result<()>;

    /// Current total stock balance of an item across all warehouses.
    async fn stock_balance(&self, item_code: &str) -> Result<f64>;

    async fn get_partner(&self, name: &str) -> Result<Partner>;
    async fn set_partner_remote_id(&self, name: &str, remote_id: &str) -> Result<()>;

    async fn get_purchase_invoice(&self, name: &str) -> Result<PurchaseInvoice>;
    async fn set_purchase_submitted(&self, name: &str) -> Result<()>;

    async fn get_stock_adjustment(&self, name: &str) -> Result<StockAdjustment>;
    async fn set_stock_adjustment_submitted(&self, name: &str) -> Result<()>;
}

/// Durable request log access.
#[async_trait]
pub trait RequestLogStore: Send + Sync {
    async fn create(&self, log: &RequestLog) -> Result<()>;

    /// Mark completed; `output` and `description` are appended with the
    /// cap/dedupe semantics of [`RequestLog`].
    async fn complete(&self, id: &str, output: Option<&str>, description: Option<&str>)
        -> Result<()>;

    /// Mark failed, appending `error`.
    async fn fail(&self, id: &str, error: &str) -> Result<()>;

    async fn get(&self, id: &str) -> Result<RequestLog>;
}

/// One unit of deferred work, identified by kind and document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobKind {
    SubmitInvoice { invoice: String },
    SaveInvoiceLines { invoice: String },
    TransitionInvoice { invoice: String },
    SignInvoice { invoice: String },
    FetchInvoiceDetails { invoice: String },
    RegisterItem { item_code: String },
    RegisterPartner { partner: String },
    /// Push an item's current stock level after registration.
    SubmitItemInventory { item_code: String },
    SubmitPurchaseInvoice { invoice: String },
    SubmitStockAdjustment { adjustment: String },
    /// Submit an automatic reversing credit note built during
    /// reconciliation. Carries the serialized payload because the
    /// remote-observed totals it is built from are not re-derivable from
    /// the local document.
    IssueCreditNote { invoice: String, payload_json: String },
}

impl JobKind {
    /// Default unique job name, used to avoid duplicate concurrent
    /// execution of the same logical job.
    #[must_use]
    pub fn default_name(&self) -> String {
        match self {
            Self::SubmitInvoice { invoice } => format!("submit_invoice_{invoice}"),
            Self::SaveInvoiceLines { invoice } => format!("save_invoice_lines_{invoice}"),
            Self::TransitionInvoice { invoice } => format!("transition_invoice_{invoice}"),
            Self::SignInvoice { invoice } => format!("sign_invoice_{invoice}"),
            Self::FetchInvoiceDetails { invoice } => format!("fetch_invoice_details_{invoice}"),
            Self::RegisterItem { item_code } => format!("register_item_{item_code}"),
            Self::RegisterPartner { partner } => format!("register_partner_{partner}"),
            Self::SubmitItemInventory { item_code } => format!("submit_inventory_{item_code}"),
            Self::SubmitPurchaseInvoice { invoice } => format!("submit_purchase_{invoice}"),
            Self::SubmitStockAdjustment { adjustment } => {
                format!("submit_stock_adjustment_{adjustment}")
            }
            Self::IssueCreditNote { invoice, .. } => format!("issue_credit_note_{invoice}"),
        }
    }
}

/// Enqueue request for the background job queue.
#[derive(Debug, Clone)]
pub struct JobSpec {
    pub kind: JobKind,
    /// Settings record the job runs under.
    pub settings_name: String,
    /// Unique name; a job with the same name already queued or running is
    /// not enqueued twice.
    pub job_name: String,
    pub delay: Option<Duration>,
    pub at_front: bool,
    pub timeout: Option<Duration>,
}

impl JobSpec {
    #[must_use]
    pub fn new(kind: JobKind, settings_name: impl Into<String>) -> Self {
        let job_name = kind.default_name();
        Self { kind, settings_name: settings_name.into(), job_name, delay: None, at_front: false, timeout: None }
    }

    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    #[must_use]
    pub fn with_job_name(mut self, job_name: impl Into<String>) -> Self {
        self.job_name = job_name.into();
        self
    }

    #[must_use]
    pub fn at_front(mut self) -> Self {
        self.at_front = true;
        self
    }
}

/// Fire-and-forget background job queue. The core never blocks on a job's
/// result; downstream steps are themselves enqueued as separate jobs.
#[async_trait]
pub trait JobQueue: Send + Sync {
    async fn enqueue(&self, spec: JobSpec) -> Result<()>;
}

/// Settings record access, including auth-state mutation.
#[async_trait]
pub trait SettingsStore: Send + Sync {
    async fn load(&self, name: &str) -> Result<IntegrationSettings>;

    async fn load_tokens(&self, name: &str) -> Result<Option<TokenSet>>;

    async fn store_tokens(&self, name: &str, tokens: &TokenSet) -> Result<()>;

    /// Persist a newly generated auth password.
    async fn store_password(&self, name: &str, password: &str) -> Result<()>;
}

/// Realtime UI notification channel.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Ask the UI to refresh the given document.
    async fn publish_refresh(&self, doctype: &str, name: &str);
}

/// QR-code image generation, treated as a pure function. Rendering is out
/// of scope for the core; only the URL is persisted by default.
pub trait QrRenderer: Send + Sync {
    fn render(&self, url: &str) -> Result<Vec<u8>>;
}
