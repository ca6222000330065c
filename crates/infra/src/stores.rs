//! In-memory port implementations
//!
//! The ERP's document storage and settings records are out of scope for
//! this crate, so the default adapters keep everything in process memory
//! behind the same port traits the real ERP bindings implement. They are
//! also the fixtures every test in this workspace builds on.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use taxbridge_core::ports::{
    DocumentStore, EventPublisher, RequestLogStore, SettingsStore,
};
use taxbridge_domain::{
    IntegrationSettings, Item, Partner, PurchaseInvoice, RequestLog, RequestStatus, Result,
    SalesInvoice, ScuData, StockAdjustment, TaxBridgeError, TokenSet,
};
use tokio::sync::{Mutex, RwLock};

/* -------------------------------------------------------------------------- */
/* Request log */
/* -------------------------------------------------------------------------- */

/// In-memory request log store. The durable SQLite implementation lives
/// in [`crate::database`].
#[derive(Default)]
pub struct InMemoryRequestLogStore {
    logs: RwLock<HashMap<String, RequestLog>>,
    order: Mutex<Vec<String>>,
}

impl InMemoryRequestLogStore {
    /// Most recently created log entry.
    pub async fn latest(&self) -> Option<RequestLog> {
        let order = self.order.lock().await;
        let id = order.last()?;
        self.logs.read().await.get(id).cloned()
    }

    pub async fn completed_count(&self) -> usize {
        self.logs.read().await.values().filter(|l| l.status == RequestStatus::Completed).count()
    }

    pub async fn failed_count(&self) -> usize {
        self.logs.read().await.values().filter(|l| l.status == RequestStatus::Failed).count()
    }
}

#[async_trait]
impl RequestLogStore for InMemoryRequestLogStore {
    async fn create(&self, log: &RequestLog) -> Result<()> {
        self.logs.write().await.insert(log.id.clone(), log.clone());
        self.order.lock().await.push(log.id.clone());
        Ok(())
    }

    async fn complete(
        &self,
        id: &str,
        output: Option<&str>,
        description: Option<&str>,
    ) -> Result<()> {
        let mut logs = self.logs.write().await;
        let log = logs
            .get_mut(id)
            .ok_or_else(|| TaxBridgeError::NotFound(format!("request log {id}")))?;
        log.status = RequestStatus::Completed;
        if let Some(output) = output {
            log.append_output(output);
        }
        if let Some(description) = description {
            log.append_description(description);
        }
        Ok(())
    }

    async fn fail(&self, id: &str, error: &str) -> Result<()> {
        let mut logs = self.logs.write().await;
        let log = logs
            .get_mut(id)
            .ok_or_else(|| TaxBridgeError::NotFound(format!("request log {id}")))?;
        log.status = RequestStatus::Failed;
        log.append_error(error);
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<RequestLog> {
        self.logs
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| TaxBridgeError::NotFound(format!("request log {id}")))
    }
}

/* -------------------------------------------------------------------------- */
/* Settings */
/* -------------------------------------------------------------------------- */

/// In-memory settings store with token and password mutation.
#[derive(Default)]
pub struct InMemorySettingsStore {
    settings: RwLock<HashMap<String, IntegrationSettings>>,
    tokens: RwLock<HashMap<String, TokenSet>>,
}

impl InMemorySettingsStore {
    pub async fn insert(&self, settings: IntegrationSettings) {
        self.settings.write().await.insert(settings.name.clone(), settings);
    }
}

#[async_trait]
impl SettingsStore for InMemorySettingsStore {
    async fn load(&self, name: &str) -> Result<IntegrationSettings> {
        self.settings
            .read()
            .await
            .get(name)
            .cloned()
            .ok_or_else(|| TaxBridgeError::NotFound(format!("integration settings {name}")))
    }

    async fn load_tokens(&self, name: &str) -> Result<Option<TokenSet>> {
        Ok(self.tokens.read().await.get(name).cloned())
    }

    async fn store_tokens(&self, name: &str, tokens: &TokenSet) -> Result<()> {
        self.tokens.write().await.insert(name.to_string(), tokens.clone());
        Ok(())
    }

    async fn store_password(&self, name: &str, password: &str) -> Result<()> {
        let mut settings = self.settings.write().await;
        let record = settings
            .get_mut(name)
            .ok_or_else(|| TaxBridgeError::NotFound(format!("integration settings {name}")))?;
        record.password = password.to_string();
        Ok(())
    }
}

/* -------------------------------------------------------------------------- */
/* Documents */
/* -------------------------------------------------------------------------- */

/// In-memory document store standing in for the ERP's ORM.
#[derive(Default)]
pub struct InMemoryDocumentStore {
    invoices: RwLock<HashMap<String, SalesInvoice>>,
    items: RwLock<HashMap<String, Item>>,
    partners: RwLock<HashMap<String, Partner>>,
    purchases: RwLock<HashMap<String, PurchaseInvoice>>,
    adjustments: RwLock<HashMap<String, StockAdjustment>>,
    stock_balances: RwLock<HashMap<String, f64>>,
}

impl InMemoryDocumentStore {
    pub async fn insert_invoice(&self, invoice: SalesInvoice) {
        self.invoices.write().await.insert(invoice.name.clone(), invoice);
    }

    pub async fn insert_item(&self, item: Item) {
        self.items.write().await.insert(item.item_code.clone(), item);
    }

    pub async fn insert_partner(&self, partner: Partner) {
        self.partners.write().await.insert(partner.name.clone(), partner);
    }

    pub async fn insert_purchase(&self, invoice: PurchaseInvoice) {
        self.purchases.write().await.insert(invoice.name.clone(), invoice);
    }

    pub async fn insert_adjustment(&self, adjustment: StockAdjustment) {
        self.adjustments.write().await.insert(adjustment.name.clone(), adjustment);
    }

    pub async fn set_stock_balance(&self, item_code: &str, balance: f64) {
        self.stock_balances.write().await.insert(item_code.to_string(), balance);
    }

    async fn with_invoice<F>(&self, name: &str, mutate: F) -> Result<()>
    where
        F: FnOnce(&mut SalesInvoice),
    {
        let mut invoices = self.invoices.write().await;
        let invoice = invoices
            .get_mut(name)
            .ok_or_else(|| TaxBridgeError::NotFound(format!("sales invoice {name}")))?;
        mutate(invoice);
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn get_sales_invoice(&self, name: &str) -> Result<SalesInvoice> {
        self.invoices
            .read()
            .await
            .get(name)
            .cloned()
            .ok_or_else(|| TaxBridgeError::NotFound(format!("sales invoice {name}")))
    }

    async fn set_invoice_remote_id(&self, name: &str, remote_id: &str) -> Result<()> {
        let remote_id = remote_id.to_string();
        self.with_invoice(name, |invoice| invoice.submission.remote_id = Some(remote_id)).await
    }

    async fn set_line_remote_id(&self, invoice: &str, line: &str, remote_id: &str) -> Result<()> {
        let remote_id = remote_id.to_string();
        let line = line.to_string();
        self.with_invoice(invoice, move |doc| {
            if let Some(target) = doc.items.iter_mut().find(|item| item.name == line) {
                target.remote_id = Some(remote_id);
            }
        })
        .await
    }

    async fn set_invoice_transitioned(&self, name: &str) -> Result<()> {
        self.with_invoice(name, |invoice| invoice.submission.transitioned = true).await
    }

    async fn set_invoice_signed(&self, name: &str) -> Result<()> {
        self.with_invoice(name, |invoice| {
            invoice.submission.signed = true;
            invoice.submission.submitted = true;
        })
        .await
    }

    async fn set_invoice_scu_data(&self, name: &str, scu: &ScuData) -> Result<()> {
        let scu = scu.clone();
        self.with_invoice(name, move |invoice| invoice.submission.scu = Some(scu)).await
    }

    async fn set_invoice_revision_count(&self, name: &str, count: u32) -> Result<()> {
        self.with_invoice(name, move |invoice| invoice.submission.revision_count = count).await
    }

    async fn bump_submission_attempts(&self, name: &str) -> Result<u32> {
        let mut invoices = self.invoices.write().await;
        let invoice = invoices
            .get_mut(name)
            .ok_or_else(|| TaxBridgeError::NotFound(format!("sales invoice {name}")))?;
        invoice.submission.submission_attempts += 1;
        Ok(invoice.submission.submission_attempts)
    }

    async fn list_unfinished_sales_invoices(
        &self,
        since: DateTime<Utc>,
    ) -> Result<Vec<SalesInvoice>> {
        // Creation timestamps are not modelled here; `since` filters on the
        // ERP side in the real adapter.
        let _ = since;
        Ok(self
            .invoices
            .read()
            .await
            .values()
            .filter(|invoice| invoice.submission.scu.is_none() && !invoice.prevent_submission)
            .cloned()
            .collect())
    }

    async fn get_item(&self, item_code: &str) -> Result<Item> {
        self.items
            .read()
            .await
            .get(item_code)
            .cloned()
            .ok_or_else(|| TaxBridgeError::NotFound(format!("item {item_code}")))
    }

    async fn set_item_remote_id(&self, item_code: &str, remote_id: &str) -> Result<()> {
        let mut items = self.items.write().await;
        let item = items
            .get_mut(item_code)
            .ok_or_else(|| TaxBridgeError::NotFound(format!("item {item_code}")))?;
        item.remote_id = Some(remote_id.to_string());
        Ok(())
    }

    async fn stock_balance(&self, item_code: &str) -> Result<f64> {
        Ok(self.stock_balances.read().await.get(item_code).copied().unwrap_or(0.0))
    }

    async fn get_partner(&self, name: &str) -> Result<Partner> {
        self.partners
            .read()
            .await
            .get(name)
            .cloned()
            .ok_or_else(|| TaxBridgeError::NotFound(format!("partner {name}")))
    }

    async fn set_partner_remote_id(&self, name: &str, remote_id: &str) -> Result<()> {
        let mut partners = self.partners.write().await;
        let partner = partners
            .get_mut(name)
            .ok_or_else(|| TaxBridgeError::NotFound(format!("partner {name}")))?;
        partner.remote_id = Some(remote_id.to_string());
        Ok(())
    }

    async fn get_purchase_invoice(&self, name: &str) -> Result<PurchaseInvoice> {
        self.purchases
            .read()
            .await
            .get(name)
            .cloned()
            .ok_or_else(|| TaxBridgeError::NotFound(format!("purchase invoice {name}")))
    }

    async fn set_purchase_submitted(&self, name: &str) -> Result<()> {
        let mut purchases = self.purchases.write().await;
        let purchase = purchases
            .get_mut(name)
            .ok_or_else(|| TaxBridgeError::NotFound(format!("purchase invoice {name}")))?;
        purchase.submitted = true;
        Ok(())
    }

    async fn get_stock_adjustment(&self, name: &str) -> Result<StockAdjustment> {
        self.adjustments
            .read()
            .await
            .get(name)
            .cloned()
            .ok_or_else(|| TaxBridgeError::NotFound(format!("stock adjustment {name}")))
    }

    async fn set_stock_adjustment_submitted(&self, name: &str) -> Result<()> {
        let mut adjustments = self.adjustments.write().await;
        let adjustment = adjustments
            .get_mut(name)
            .ok_or_else(|| TaxBridgeError::NotFound(format!("stock adjustment {name}")))?;
        adjustment.submitted = true;
        Ok(())
    }
}

/* -------------------------------------------------------------------------- */
/* Events */
/* -------------------------------------------------------------------------- */

/// Event publisher that records published refreshes; doubles as the
/// default no-op adapter when the UI channel is absent.
#[derive(Default)]
pub struct RecordingEventPublisher {
    events: Mutex<Vec<(String, String)>>,
}

impl RecordingEventPublisher {
    pub async fn published(&self) -> Vec<(String, String)> {
        self.events.lock().await.clone()
    }
}

#[async_trait]
impl EventPublisher for RecordingEventPublisher {
    async fn publish_refresh(&self, doctype: &str, name: &str) {
        self.events.lock().await.push((doctype.to_string(), name.to_string()));
    }
}

/// Convenience alias used where no UI is attached.
pub type NoopEventPublisher = RecordingEventPublisher;
