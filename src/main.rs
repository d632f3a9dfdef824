use std::collections::HashMap;
use std::sync::Arc;

use axum::http::Method;
use tower_http::cors::{Any, CorsLayer};
use tracing_subscriber::EnvFilter;

use payouts_rs::cache::TtlCache;
use payouts_rs::config::{ConfigRegistry, ProviderConfig};
use payouts_rs::erp::{InMemoryLog, InMemorySecrets, InMemoryStore};
use payouts_rs::fees::FeeJournal;
use payouts_rs::handlers::{self, AppState};
use payouts_rs::orchestrator::PayoutOrchestrator;
use payouts_rs::razorpayx::RazorpayXClient;
use payouts_rs::sync::BankTransactionSync;
use payouts_rs::webhook::WebhookEngine;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = ProviderConfig::from_env()?;
    let store = Arc::new(InMemoryStore::new());
    let secrets = Arc::new(InMemorySecrets::new());
    let log = Arc::new(InMemoryLog::new());
    let cache = Arc::new(TtlCache::new());

    if let Ok(secret) = std::env::var("RAZORPAYX_WEBHOOK_SECRET") {
        secrets.set(config.name.clone(), secret);
    }

    let registry = ConfigRegistry::new([config.clone()]);
    let config = Arc::new(config);
    let client = RazorpayXClient::new(
        Arc::clone(&config),
        Arc::clone(&log) as Arc<dyn payouts_rs::erp::IntegrationLog>,
    )?;

    let doc_store = Arc::clone(&store) as Arc<dyn payouts_rs::erp::DocumentStore>;
    let orchestrator = Arc::new(PayoutOrchestrator::new(
        Arc::clone(&doc_store),
        Arc::clone(&cache),
        client.clone(),
    ));
    let sync = Arc::new(BankTransactionSync::new(
        Arc::clone(&doc_store),
        client.clone(),
    ));
    let fees = FeeJournal::new(
        Arc::clone(&doc_store),
        std::env::var("PAYOUT_FEE_ACCOUNT").unwrap_or_else(|_| "Bank Charges".to_string()),
        config.bank_account.clone(),
    );
    let webhooks = Arc::new(WebhookEngine::new(
        Arc::clone(&doc_store),
        Arc::clone(&cache),
        Arc::clone(&log) as Arc<dyn payouts_rs::erp::IntegrationLog>,
        Arc::clone(&secrets) as Arc<dyn payouts_rs::erp::SecretStore>,
        registry,
        HashMap::from([(config.account_id.clone(), client)]),
        fees,
        Arc::clone(&sync),
    ));

    let app = handlers::router(AppState {
        orchestrator,
        webhooks,
        sync,
    })
    .layer(
        CorsLayer::new()
            .allow_methods([Method::GET, Method::POST])
            .allow_origin(Any)
            .allow_headers(Any),
    );

    let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
    let port = std::env::var("PORT").unwrap_or_else(|_| "8090".to_string());
    let addr = format!("{host}:{port}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(%addr, account = %config.name, "payout service listening");
    axum::serve(listener, app).await?;

    Ok(())
}
