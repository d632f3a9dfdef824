//! Shared test harness: a mock Provider served from a local listener and a
//! fully wired engine pointed at it.

#![allow(dead_code)]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use axum::extract::{Path, Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};

use payouts_rs::cache::TtlCache;
use payouts_rs::config::{ConfigRegistry, ProviderConfig};
use payouts_rs::erp::{
    Document, DocumentStore, InMemoryLog, InMemorySecrets, InMemoryStore, IntegrationLog,
    SecretStore,
};
use payouts_rs::fees::FeeJournal;
use payouts_rs::models::fields;
use payouts_rs::orchestrator::PayoutOrchestrator;
use payouts_rs::razorpayx::RazorpayXClient;
use payouts_rs::sync::BankTransactionSync;
use payouts_rs::webhook::WebhookEngine;

pub const ACCOUNT_ID: &str = "Hr7d1kWnVB2Mgx";
pub const WEBHOOK_SECRET: &str = "whsec_test_0001";
pub const BANK_ACCOUNT: &str = "RazorpayX - HDFC";

#[derive(Default)]
pub struct ProviderState {
    pub transactions: Mutex<Vec<Value>>,
    pub list_calls: AtomicUsize,
    pub last_payout_body: Mutex<Option<Value>>,
    pub last_idempotency: Mutex<Option<String>>,
    pub payout_status: Mutex<HashMap<String, String>>,
    pub link_status: Mutex<HashMap<String, String>>,
    pub cancel_calls: AtomicUsize,
}

pub struct MockProvider {
    pub addr: SocketAddr,
    pub state: Arc<ProviderState>,
}

impl MockProvider {
    pub async fn start() -> Self {
        let state = Arc::new(ProviderState::default());
        let app = Router::new()
            .route("/transactions", get(list_transactions))
            .route("/payouts", post(create_payout))
            .route("/payouts/{id}", get(fetch_payout))
            .route("/payouts/{id}/cancel", post(cancel_payout))
            .route("/payout-links", post(create_link))
            .route("/payout-links/{id}", get(fetch_link))
            .route("/payout-links/{id}/cancel", post(cancel_link))
            .with_state(Arc::clone(&state));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        MockProvider { addr, state }
    }

    pub fn base_path(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn seed_transactions(&self, count: usize) {
        let items: Vec<Value> = (0..count)
            .map(|i| {
                json!({
                    "id": format!("txn_{i:05}"),
                    "account_number": "2323230041626905",
                    "amount": 10_000,
                    "debit": 10_000,
                    "credit": 0,
                    "balance": 1_000_000 - (i as i64) * 10_000,
                    "created_at": 1_756_400_000,
                    "currency": "INR",
                    "source": {
                        "id": format!("pout_{i:05}"),
                        "entity": "payout",
                        "utr": format!("UTR{i:05}"),
                        "mode": "NEFT"
                    }
                })
            })
            .collect();
        *self.state.transactions.lock().unwrap() = items;
    }
}

async fn list_transactions(
    State(state): State<Arc<ProviderState>>,
    Query(query): Query<HashMap<String, String>>,
) -> Json<Value> {
    state.list_calls.fetch_add(1, Ordering::SeqCst);
    let skip: usize = query.get("skip").and_then(|v| v.parse().ok()).unwrap_or(0);
    let count: usize = query
        .get("count")
        .and_then(|v| v.parse().ok())
        .unwrap_or(100);
    let items = state.transactions.lock().unwrap();
    let page: Vec<Value> = items.iter().skip(skip).take(count).cloned().collect();
    Json(json!({ "entity": "collection", "count": page.len(), "items": page }))
}

async fn create_payout(
    State(state): State<Arc<ProviderState>>,
    headers: axum::http::HeaderMap,
    Json(body): Json<Value>,
) -> Json<Value> {
    *state.last_idempotency.lock().unwrap() = headers
        .get("X-Payout-Idempotency")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    *state.last_payout_body.lock().unwrap() = Some(body.clone());
    state
        .payout_status
        .lock()
        .unwrap()
        .insert("pout_mock_0001".to_string(), "queued".to_string());
    Json(json!({
        "id": "pout_mock_0001",
        "entity": "payout",
        "status": "queued",
        "amount": body.get("amount").cloned().unwrap_or(Value::from(0)),
        "mode": body.get("mode").cloned().unwrap_or(Value::Null),
        "reference_id": body.get("reference_id").cloned().unwrap_or(Value::Null),
        "notes": body.get("notes").cloned().unwrap_or(json!({})),
    }))
}

async fn fetch_payout(
    State(state): State<Arc<ProviderState>>,
    Path(id): Path<String>,
) -> Json<Value> {
    let status = state
        .payout_status
        .lock()
        .unwrap()
        .get(&id)
        .cloned()
        .unwrap_or_else(|| "queued".to_string());
    Json(json!({ "id": id, "entity": "payout", "status": status }))
}

async fn cancel_payout(
    State(state): State<Arc<ProviderState>>,
    Path(id): Path<String>,
) -> Json<Value> {
    state.cancel_calls.fetch_add(1, Ordering::SeqCst);
    state
        .payout_status
        .lock()
        .unwrap()
        .insert(id.clone(), "cancelled".to_string());
    Json(json!({ "id": id, "entity": "payout", "status": "cancelled" }))
}

async fn create_link(
    State(state): State<Arc<ProviderState>>,
    Json(body): Json<Value>,
) -> Json<Value> {
    state
        .link_status
        .lock()
        .unwrap()
        .insert("poutlk_mock_0001".to_string(), "issued".to_string());
    Json(json!({
        "id": "poutlk_mock_0001",
        "entity": "payout_link",
        "status": "issued",
        "amount": body.get("amount").cloned().unwrap_or(Value::from(0)),
    }))
}

async fn fetch_link(
    State(state): State<Arc<ProviderState>>,
    Path(id): Path<String>,
) -> Json<Value> {
    let status = state
        .link_status
        .lock()
        .unwrap()
        .get(&id)
        .cloned()
        .unwrap_or_else(|| "issued".to_string());
    Json(json!({ "id": id, "entity": "payout_link", "status": status }))
}

async fn cancel_link(
    State(state): State<Arc<ProviderState>>,
    Path(id): Path<String>,
) -> Json<Value> {
    state.cancel_calls.fetch_add(1, Ordering::SeqCst);
    state
        .link_status
        .lock()
        .unwrap()
        .insert(id.clone(), "cancelled".to_string());
    Json(json!({ "id": id, "entity": "payout_link", "status": "cancelled" }))
}

/// Everything the tests need, wired against one mock Provider.
pub struct TestEnv {
    pub provider: MockProvider,
    pub store: Arc<InMemoryStore>,
    pub log: Arc<InMemoryLog>,
    pub cache: Arc<TtlCache>,
    pub client: RazorpayXClient,
    pub orchestrator: PayoutOrchestrator,
    pub webhooks: WebhookEngine,
    pub sync: Arc<BankTransactionSync>,
}

pub async fn test_env() -> TestEnv {
    let provider = MockProvider::start().await;
    let config = Arc::new(ProviderConfig {
        name: "Test Account".to_string(),
        key_id: "rzp_test_key".to_string(),
        key_secret: "rzp_test_secret".to_string(),
        account_id: ACCOUNT_ID.to_string(),
        account_number: "2323230041626905".to_string(),
        bank_account: BANK_ACCOUNT.to_string(),
        base_path: provider.base_path(),
        disabled: false,
    });

    let store = Arc::new(InMemoryStore::new());
    let log = Arc::new(InMemoryLog::new());
    let cache = Arc::new(TtlCache::new());
    let secrets = Arc::new(InMemorySecrets::new());
    secrets.set("Test Account", WEBHOOK_SECRET);

    let doc_store = Arc::clone(&store) as Arc<dyn DocumentStore>;
    let client = RazorpayXClient::new(
        Arc::clone(&config),
        Arc::clone(&log) as Arc<dyn IntegrationLog>,
    )
    .unwrap();

    let orchestrator =
        PayoutOrchestrator::new(Arc::clone(&doc_store), Arc::clone(&cache), client.clone());
    let sync = Arc::new(BankTransactionSync::new(
        Arc::clone(&doc_store),
        client.clone(),
    ));
    let fees = FeeJournal::new(Arc::clone(&doc_store), "Bank Charges - T", BANK_ACCOUNT);
    let registry = ConfigRegistry::new([(*config).clone()]);
    let webhooks = WebhookEngine::new(
        Arc::clone(&doc_store),
        Arc::clone(&cache),
        Arc::clone(&log) as Arc<dyn IntegrationLog>,
        Arc::clone(&secrets) as Arc<dyn SecretStore>,
        registry,
        HashMap::from([(ACCOUNT_ID.to_string(), client.clone())]),
        fees,
        Arc::clone(&sync),
    );

    TestEnv {
        provider,
        store,
        log,
        cache,
        client,
        orchestrator,
        webhooks,
        sync,
    }
}

/// A submitted payment document ready for a UPI payout.
pub fn upi_payment_entry(name: &str, amount: f64) -> Document {
    let mut doc = Document::new("Payment Entry", name)
        .with_field(fields::PAYMENT_TYPE, "Pay")
        .with_field(fields::MAKE_ONLINE_PAYMENT, true)
        .with_field(fields::TRANSFER_METHOD, "UPI")
        .with_field(fields::PAID_AMOUNT, amount)
        .with_field(fields::PARTY_TYPE, "Supplier")
        .with_field(fields::PARTY, "SUP-0001")
        .with_field(fields::PARTY_NAME, "Acme Traders")
        .with_field(fields::PARTY_UPI_ADDRESS, "acme@okhdfc")
        .with_field(
            fields::REMARKS,
            format!("Payment of INR {amount} against {name}"),
        )
        .with_field(fields::PAYOUT_STATUS, "Not Initiated");
    doc.docstatus = 1;
    doc
}

/// A signed webhook body for the test account.
pub fn signed_webhook(event: &str, payload_key: &str, entity: Value) -> (Vec<u8>, String) {
    let body = json!({
        "event": event,
        "account_id": format!("acc_{ACCOUNT_ID}"),
        "payload": { payload_key: { "entity": entity } }
    });
    let raw = serde_json::to_vec(&body).unwrap();
    let signature = payouts_rs::webhook::sign_body(&raw, WEBHOOK_SECRET);
    (raw, signature)
}
