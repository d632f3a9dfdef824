mod common;

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

use common::{signed_webhook, test_env, upi_payment_entry, TestEnv};
use payouts_rs::erp::DocumentStore;
use payouts_rs::handlers::{self, AppState};
use payouts_rs::models::fields;
use payouts_rs::webhook::{EVENT_ID_HEADER, SIGNATURE_HEADER};

fn app(env: &TestEnv) -> axum::Router {
    handlers::router(AppState {
        orchestrator: Arc::new(payouts_rs::orchestrator::PayoutOrchestrator::new(
            Arc::clone(&env.store) as _,
            Arc::clone(&env.cache),
            env.client.clone(),
        )),
        webhooks: Arc::new(test_webhook_engine(env)),
        sync: Arc::clone(&env.sync),
    })
}

fn test_webhook_engine(env: &TestEnv) -> payouts_rs::webhook::WebhookEngine {
    use payouts_rs::config::{ConfigRegistry, ProviderConfig};
    use payouts_rs::erp::InMemorySecrets;
    use payouts_rs::fees::FeeJournal;

    let secrets = Arc::new(InMemorySecrets::new());
    secrets.set("Test Account", common::WEBHOOK_SECRET);
    let config = ProviderConfig {
        name: "Test Account".to_string(),
        key_id: "rzp_test_key".to_string(),
        key_secret: "rzp_test_secret".to_string(),
        account_id: common::ACCOUNT_ID.to_string(),
        account_number: "2323230041626905".to_string(),
        bank_account: common::BANK_ACCOUNT.to_string(),
        base_path: env.provider.base_path(),
        disabled: false,
    };
    payouts_rs::webhook::WebhookEngine::new(
        Arc::clone(&env.store) as _,
        Arc::clone(&env.cache),
        Arc::clone(&env.log) as _,
        secrets as _,
        ConfigRegistry::new([config]),
        std::collections::HashMap::from([(common::ACCOUNT_ID.to_string(), env.client.clone())]),
        FeeJournal::new(
            Arc::clone(&env.store) as _,
            "Bank Charges - T",
            common::BANK_ACCOUNT,
        ),
        Arc::clone(&env.sync),
    )
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn health_reports_the_module() {
    let env = test_env().await;
    let response = app(&env)
        .oneshot(
            Request::builder()
                .uri("/api/health")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["module"], "payouts");
}

#[tokio::test]
async fn webhook_listener_always_answers_200() {
    let env = test_env().await;
    let response = app(&env)
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/webhooks/razorpayx")
                .header(EVENT_ID_HEADER, "evt_http_bad")
                .header(SIGNATURE_HEADER, "0".repeat(64))
                .header("content-type", "application/json")
                .body(Body::from(r#"{"event":"payout.queued"}"#))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn authorize_then_initiate_over_http() {
    let env = test_env().await;
    env.store.seed(upi_payment_entry("PE-3000", 500.0));
    let router = app(&env);

    let response = router
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/payouts/authorize")
                .header("content-type", "application/json")
                .body(Body::from(json!({"docnames": ["PE-3000"]}).to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let token = body_json(response).await["auth_token"]
        .as_str()
        .unwrap()
        .to_string();

    let response = router
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/payouts/initiate")
                .header("content-type", "application/json")
                .body(Body::from(
                    json!({
                        "doctype": "Payment Entry",
                        "docname": "PE-3000",
                        "auth_token": token,
                    })
                    .to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["payout_id"], "pout_mock_0001");
    assert_eq!(body["status"], "Queued");
}

#[tokio::test]
async fn initiate_without_authorization_is_401() {
    let env = test_env().await;
    env.store.seed(upi_payment_entry("PE-3001", 500.0));

    let response = app(&env)
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/payouts/initiate")
                .header("content-type", "application/json")
                .body(Body::from(
                    json!({"doctype": "Payment Entry", "docname": "PE-3001"}).to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn valid_webhook_over_http_reconciles_the_document() {
    let env = test_env().await;
    env.store.seed(
        upi_payment_entry("PE-3002", 100.0)
            .with_field(fields::PAYOUT_ID, "pout_http")
            .with_field(fields::PAYOUT_STATUS, "Queued"),
    );

    let (raw, signature) = signed_webhook(
        "payout.processed",
        "payout",
        json!({
            "id": "pout_http",
            "entity": "payout",
            "status": "processed",
            "utr": "UTR3002"
        }),
    );
    let response = app(&env)
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/webhooks/razorpayx")
                .header(EVENT_ID_HEADER, "evt_http_ok")
                .header(SIGNATURE_HEADER, signature)
                .header("content-type", "application/json")
                .body(Body::from(raw))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // processing is spawned off the request path
    for _ in 0..50 {
        let doc = env.store.get("Payment Entry", "PE-3002").await.unwrap();
        if doc.get_str(fields::PAYOUT_STATUS) == Some("Processed") {
            return;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    panic!("webhook was not processed in time");
}
