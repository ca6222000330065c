//! End-to-end submission flow tests
//!
//! Wires the full pipeline (stores, auth, transport, handler registry,
//! orchestrator, job queue and worker) against a mock fiscal service and
//! drives invoices from draft to finalized, including the
//! mismatch-triggered automatic reversal.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use taxbridge_core::ports::{DocumentStore, SettingsStore};
use taxbridge_domain::{
    DocumentTaxRow, IntegrationSettings, InvoiceLine, InvoiceStatus, Item, SalesInvoice,
    SubmissionState, TaxationCode, TokenSet,
};
use taxbridge_infra::http::HttpClient;
use taxbridge_infra::jobs::{InProcessJobQueue, JobWorker, JobWorkerConfig};
use taxbridge_infra::observability::PerformanceMetrics;
use taxbridge_infra::remote::{
    FiscalApi, HandlerDeps, HandlerRegistry, PipelineExecutor, Reconciler, SalesOrchestrator,
    TokenManager, Transport,
};
use taxbridge_infra::stores::{
    InMemoryDocumentStore, InMemoryRequestLogStore, InMemorySettingsStore,
    RecordingEventPublisher,
};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

struct Pipeline {
    docs: Arc<InMemoryDocumentStore>,
    orchestrator: Arc<SalesOrchestrator>,
    worker: JobWorker,
    settings: IntegrationSettings,
    events: Arc<RecordingEventPublisher>,
}

fn init_tracing() {
    static INIT: std::sync::Once = std::sync::Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .try_init();
    });
}

async fn build_pipeline(server: &MockServer) -> Pipeline {
    init_tracing();
    let docs = Arc::new(InMemoryDocumentStore::default());
    let logs = Arc::new(InMemoryRequestLogStore::default());
    let settings_store = Arc::new(InMemorySettingsStore::default());
    let events = Arc::new(RecordingEventPublisher::default());
    let queue = InProcessJobQueue::new();
    let metrics = Arc::new(PerformanceMetrics::new());

    let settings = IntegrationSettings {
        name: "settings-a".into(),
        company: "Acme Ltd".into(),
        server_url: server.uri(),
        auth_server_url: server.uri(),
        username: "integration@acme.test".into(),
        password: "secret".into(),
        client_id: "client".into(),
        client_secret: "client-secret".into(),
        sales_auto_submission_enabled: true,
        max_allowed_revisions: 3,
        ..Default::default()
    };
    settings_store.insert(settings.clone()).await;
    settings_store
        .store_tokens("settings-a", &TokenSet::new("test-token".into(), None, 3_600))
        .await
        .unwrap();

    let http = HttpClient::builder().max_attempts(1).build().unwrap();
    let auth = Arc::new(TokenManager::new(http.clone(), settings_store.clone(), logs.clone()));
    let transport = Arc::new(Transport::new(http, logs.clone(), auth));

    let deps = HandlerDeps {
        docs: docs.clone(),
        jobs: Arc::new(queue.clone()),
        events: events.clone(),
    };
    let reconciler = Arc::new(Reconciler::new(docs.clone(), Arc::new(queue.clone()), events.clone()));
    let registry = Arc::new(HandlerRegistry::standard(deps, reconciler));
    let api = Arc::new(FiscalApi::new(transport, registry));

    let orchestrator =
        Arc::new(SalesOrchestrator::new(api, docs.clone(), Arc::new(queue.clone())));
    let executor = Arc::new(PipelineExecutor::new(orchestrator.clone(), settings_store.clone()));
    let mut worker =
        JobWorker::new(queue.clone(), executor, JobWorkerConfig::default(), metrics);
    worker.start().unwrap();

    Pipeline { docs, orchestrator, worker, settings, events }
}

fn registered_item(code: &str) -> Item {
    Item {
        item_code: code.into(),
        item_name: code.into(),
        description: format!("{code} description"),
        disabled: false,
        prevent_registration: false,
        is_sales_item: true,
        is_purchase_item: false,
        is_stock_item: false,
        selling_price: 58.0,
        purchasing_price: 40.0,
        classification_code: Some("5020230602".into()),
        packaging_unit_code: Some("BT".into()),
        quantity_unit_code: Some("U".into()),
        country_of_origin_code: Some("KE".into()),
        product_type: None,
        item_type: None,
        taxation_code: Some(TaxationCode::B),
        remote_id: Some(format!("prod-{code}")),
    }
}

fn draft_invoice() -> SalesInvoice {
    SalesInvoice {
        name: "SINV-1".into(),
        company: "Acme Ltd".into(),
        customer: "CUST-1".into(),
        customer_name: "First Customer".into(),
        conversion_rate: 1.0,
        is_return: false,
        return_against: None,
        base_grand_total: 116.0,
        items: vec![InvoiceLine {
            name: "SINV-1-1".into(),
            item_code: "ITM-1".into(),
            item_name: "ITM-1".into(),
            qty: 2.0,
            base_net_rate: 50.0,
            base_net_amount: 100.0,
            base_amount: 100.0,
            item_tax_template: None,
            tax_amount: 0.0,
            tax_rate: 0.0,
            taxation_code: None,
            remote_id: None,
        }],
        taxes: vec![DocumentTaxRow { description: "VAT 16%".into(), tax_amount: 16.0 }],
        status: InvoiceStatus::Submitted,
        prevent_submission: false,
        submission: SubmissionState::default(),
    }
}

fn details_json(total: f64) -> serde_json::Value {
    serde_json::json!({
        "id": "inv-remote-1",
        "reference_number": "SINV-1",
        "total_gross_amount": total,
        "sales_invoice_lines": [
            {"product_name": "ITM-1", "quantity": 2.0, "price_inclusive_tax": total / 2.0}
        ],
        "scu_data": {
            "scu_receipt_number": "42",
            "scu_receipt_signature": "SIGNATURE",
            "scu_internal_data": "INTERNAL",
            "qr_code_url": "https://verify.example/42",
            "scu_id": "SCU-9",
            "scu_mrc_number": "MRC-1",
            "scu_invoice_number": "ETR-0001",
            "scu_receipt_timestamp": "2026-08-06T09:30:00+03:00"
        }
    })
}

async fn mount_chain(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/sales-invoices/"))
        .respond_with(
            ResponseTemplate::new(201).set_body_json(serde_json::json!({"id": "inv-remote-1"})),
        )
        .mount(server)
        .await;
    Mock::given(method("POST"))
        .and(path("/sales-invoice-lines/"))
        .respond_with(
            ResponseTemplate::new(201).set_body_json(serde_json::json!({"id": "line-remote-1"})),
        )
        .mount(server)
        .await;
    Mock::given(method("PATCH"))
        .and(path("/sales-invoices/inv-remote-1/transition/"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!({"id": "inv-remote-1"})),
        )
        .mount(server)
        .await;
    Mock::given(method("POST"))
        .and(path("/sales-invoices/inv-remote-1/sign/"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!({"status": "signed"})),
        )
        .mount(server)
        .await;
}

#[tokio::test(flavor = "multi_thread")]
async fn invoice_runs_the_full_chain_to_finalized() {
    let server = MockServer::start().await;
    mount_chain(&server).await;
    Mock::given(method("GET"))
        .and(path("/sales-invoices/inv-remote-1/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(details_json(116.0)))
        .mount(&server)
        .await;

    let mut pipeline = build_pipeline(&server).await;
    pipeline.docs.insert_item(registered_item("ITM-1")).await;
    pipeline.docs.insert_invoice(draft_invoice()).await;

    pipeline.orchestrator.submit(&pipeline.settings, "SINV-1").await.unwrap();

    // Poll until the background chain reaches the terminal state.
    let docs = pipeline.docs.clone();
    let deadline = std::time::Instant::now() + Duration::from_secs(5);
    loop {
        let invoice = docs.get_sales_invoice("SINV-1").await.unwrap();
        if invoice.submission.scu.is_some() {
            break;
        }
        assert!(std::time::Instant::now() < deadline, "chain did not finalize in time");
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    let invoice = pipeline.docs.get_sales_invoice("SINV-1").await.unwrap();
    assert_eq!(invoice.submission.remote_id.as_deref(), Some("inv-remote-1"));
    assert_eq!(invoice.items[0].remote_id.as_deref(), Some("line-remote-1"));
    assert!(invoice.submission.transitioned);
    assert!(invoice.submission.signed);
    assert!(invoice.submission.submitted);
    assert_eq!(invoice.submission.revision_count, 0);

    let scu = invoice.submission.scu.unwrap();
    assert_eq!(scu.receipt_number.as_deref(), Some("42"));
    assert_eq!(scu.receipt_signature.as_deref(), Some("SIGNATURE"));
    assert_eq!(scu.qr_code_url.as_deref(), Some("https://verify.example/42"));
    assert_eq!(scu.invoice_number.as_deref(), Some("ETR-0001"));

    // The match published a UI refresh for the document.
    let events = pipeline.events.published().await;
    assert!(events.contains(&("Sales Invoice".to_string(), "SINV-1".to_string())));

    pipeline.worker.stop().await.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn mismatched_remote_total_triggers_automatic_reversal() {
    let server = MockServer::start().await;
    mount_chain(&server).await;

    // First details fetch reports a total ~3% off; after the reversal the
    // remote agrees with the local payload.
    let fetches = Arc::new(AtomicUsize::new(0));
    let fetches_clone = fetches.clone();
    Mock::given(method("GET"))
        .and(path("/sales-invoices/inv-remote-1/"))
        .respond_with(move |_req: &Request| {
            let n = fetches_clone.fetch_add(1, Ordering::SeqCst);
            let total = if n == 0 { 119.5 } else { 116.0 };
            ResponseTemplate::new(200).set_body_json(details_json(total))
        })
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/sales-returns/"))
        .respond_with(
            ResponseTemplate::new(201).set_body_json(serde_json::json!({"id": "crn-remote-1"})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let mut pipeline = build_pipeline(&server).await;
    pipeline.docs.insert_item(registered_item("ITM-1")).await;
    pipeline.docs.insert_invoice(draft_invoice()).await;

    pipeline.orchestrator.submit(&pipeline.settings, "SINV-1").await.unwrap();

    let docs = pipeline.docs.clone();
    let deadline = std::time::Instant::now() + Duration::from_secs(5);
    loop {
        let invoice = docs.get_sales_invoice("SINV-1").await.unwrap();
        if invoice.submission.scu.is_some() && invoice.submission.revision_count == 1 {
            break;
        }
        assert!(std::time::Instant::now() < deadline, "reversal flow did not settle in time");
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    let invoice = pipeline.docs.get_sales_invoice("SINV-1").await.unwrap();
    assert_eq!(invoice.submission.revision_count, 1);
    assert!(invoice.submission.scu.is_some());
    assert!(fetches.load(Ordering::SeqCst) >= 2);

    // Exactly one reversal was submitted.
    server.verify().await;

    pipeline.worker.stop().await.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn unregistered_item_aborts_submission_and_queues_registration() {
    let server = MockServer::start().await;
    let mut pipeline = build_pipeline(&server).await;

    let mut item = registered_item("ITM-1");
    item.remote_id = None;
    pipeline.docs.insert_item(item).await;
    pipeline.docs.insert_invoice(draft_invoice()).await;

    let err = pipeline
        .orchestrator
        .submit(&pipeline.settings, "SINV-1")
        .await
        .expect_err("unregistered item must abort");
    assert!(err.to_string().contains("ITM-1"));
    assert!(matches!(err, taxbridge_domain::TaxBridgeError::Config(_)));

    // The compensating registration job was queued (and the worker will
    // pick it up); the invoice itself is untouched.
    let invoice = pipeline.docs.get_sales_invoice("SINV-1").await.unwrap();
    assert!(invoice.submission.remote_id.is_none());

    pipeline.worker.stop().await.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn return_requires_submitted_original() {
    let server = MockServer::start().await;
    let mut pipeline = build_pipeline(&server).await;
    pipeline.docs.insert_item(registered_item("ITM-1")).await;

    let original = draft_invoice();
    pipeline.docs.insert_invoice(original).await;

    let mut return_doc = draft_invoice();
    return_doc.name = "SINV-1-RET".into();
    return_doc.is_return = true;
    return_doc.return_against = Some("SINV-1".into());
    pipeline.docs.insert_invoice(return_doc).await;

    let err = pipeline
        .orchestrator
        .submit(&pipeline.settings, "SINV-1-RET")
        .await
        .expect_err("return against unsubmitted original must fail");
    assert!(err.to_string().contains("not successfully submitted"));

    pipeline.worker.stop().await.unwrap();
}
