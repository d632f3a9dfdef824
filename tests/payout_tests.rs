mod common;

use std::sync::atomic::Ordering;

use common::{test_env, upi_payment_entry};
use payouts_rs::erp::DocumentStore;
use payouts_rs::error::EngineError;
use payouts_rs::models::{fields, PayoutContext};

#[tokio::test]
async fn unauthorized_without_a_token() {
    let env = test_env().await;
    env.store.seed(upi_payment_entry("PE-1000", 100.0));

    let ctx = PayoutContext {
        initiated_by: payouts_rs::models::InitiatedBy::User,
        skip_remote_cancel: false,
        auth_token: None,
    };
    let err = env
        .orchestrator
        .make_payout("Payment Entry", "PE-1000", &ctx)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Unauthorized(_)));
}

#[tokio::test]
async fn token_only_covers_the_documents_it_was_minted_for() {
    let env = test_env().await;
    env.store.seed(upi_payment_entry("PE-1001", 100.0));

    let token = env.orchestrator.register_auth(&["PE-9999".to_string()]);
    let err = env
        .orchestrator
        .make_payout("Payment Entry", "PE-1001", &PayoutContext::user(token))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Unauthorized(_)));
}

#[tokio::test]
async fn scheduler_bypasses_the_auth_gate() {
    let env = test_env().await;
    env.store.seed(upi_payment_entry("PE-1002", 100.0));

    let outcome = env
        .orchestrator
        .make_payout("Payment Entry", "PE-1002", &PayoutContext::scheduler())
        .await
        .unwrap();
    assert!(outcome.payout_id.is_some());
}

#[tokio::test]
async fn bank_channel_builds_a_bank_account_destination() {
    let env = test_env().await;
    let doc = upi_payment_entry("PE-1003", 250_000.0)
        .with_field(fields::TRANSFER_METHOD, "NEFT/RTGS")
        .with_field(fields::PARTY_BANK_ACCOUNT_NO, "000111222333")
        .with_field(fields::PARTY_BANK_IFSC, "HDFC0000001");
    env.store.seed(doc);

    env.orchestrator
        .make_payout("Payment Entry", "PE-1003", &PayoutContext::scheduler())
        .await
        .unwrap();

    let body = env
        .provider
        .state
        .last_payout_body
        .lock()
        .unwrap()
        .clone()
        .unwrap();
    assert_eq!(body["fund_account"]["account_type"], "bank_account");
    // 2,50,000 rupees is above the NEFT limit
    assert_eq!(body["mode"], "RTGS");
    assert_eq!(body["queue_if_low_balance"], true);
    assert_eq!(body["currency"], "INR");
}

#[tokio::test]
async fn link_channel_uses_contact_details_only() {
    let env = test_env().await;
    let doc = upi_payment_entry("PE-1004", 900.0)
        .with_field(fields::TRANSFER_METHOD, "Link")
        .with_field(fields::CONTACT_EMAIL, "acme@example.com")
        .with_field(fields::PAYOUT_DESCRIPTION, "Invoice 42 settlement");
    env.store.seed(doc);

    let outcome = env
        .orchestrator
        .make_payout("Payment Entry", "PE-1004", &PayoutContext::scheduler())
        .await
        .unwrap();
    assert_eq!(outcome.payout_link_id.as_deref(), Some("poutlk_mock_0001"));
    assert!(outcome.payout_id.is_none());

    let doc = env.store.get("Payment Entry", "PE-1004").await.unwrap();
    assert_eq!(doc.get_str(fields::PAYOUT_LINK_ID), Some("poutlk_mock_0001"));
    assert_eq!(doc.get_str(fields::PAYOUT_STATUS), Some("Pending"));
}

#[tokio::test]
async fn already_initiated_documents_are_rejected() {
    let env = test_env().await;
    env.store
        .seed(upi_payment_entry("PE-1005", 50.0).with_field(fields::PAYOUT_STATUS, "Queued"));

    let err = env
        .orchestrator
        .make_payout("Payment Entry", "PE-1005", &PayoutContext::scheduler())
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Validation(_)));
}

#[tokio::test]
async fn upi_channel_requires_an_address() {
    let env = test_env().await;
    let mut doc = upi_payment_entry("PE-1006", 50.0);
    doc.fields.remove(fields::PARTY_UPI_ADDRESS);
    env.store.seed(doc);

    let err = env
        .orchestrator
        .make_payout("Payment Entry", "PE-1006", &PayoutContext::scheduler())
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Validation(_)));
}

#[tokio::test]
async fn cancel_intent_cancels_a_queued_payout() {
    let env = test_env().await;
    env.store.seed(
        upi_payment_entry("PE-1007", 50.0)
            .with_field(fields::PAYOUT_ID, "pout_mock_0001")
            .with_field(fields::PAYOUT_STATUS, "Queued"),
    );
    env.provider
        .state
        .payout_status
        .lock()
        .unwrap()
        .insert("pout_mock_0001".to_string(), "queued".to_string());

    env.orchestrator.mark_for_cancellation("PE-1007");
    env.orchestrator
        .cancel_for_document("Payment Entry", "PE-1007", &PayoutContext::scheduler())
        .await
        .unwrap();
    assert_eq!(env.provider.state.cancel_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn cancel_without_intent_leaves_the_payout_alone() {
    let env = test_env().await;
    env.store.seed(
        upi_payment_entry("PE-1008", 50.0)
            .with_field(fields::PAYOUT_ID, "pout_mock_0001")
            .with_field(fields::PAYOUT_STATUS, "Queued"),
    );

    env.orchestrator
        .cancel_for_document("Payment Entry", "PE-1008", &PayoutContext::scheduler())
        .await
        .unwrap();
    assert_eq!(env.provider.state.cancel_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn webhook_context_never_cancels_remotely() {
    let env = test_env().await;
    env.store.seed(
        upi_payment_entry("PE-1009", 50.0)
            .with_field(fields::PAYOUT_ID, "pout_mock_0001")
            .with_field(fields::PAYOUT_STATUS, "Queued"),
    );

    env.orchestrator.mark_for_cancellation("PE-1009");
    env.orchestrator
        .cancel_for_document("Payment Entry", "PE-1009", &PayoutContext::webhook())
        .await
        .unwrap();
    assert_eq!(env.provider.state.cancel_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn processing_payout_is_not_cancellable() {
    let env = test_env().await;
    env.provider
        .state
        .payout_status
        .lock()
        .unwrap()
        .insert("pout_live".to_string(), "processing".to_string());

    let cancelled = env
        .orchestrator
        .cancel_payout_if_queued("pout_live")
        .await
        .unwrap();
    assert!(!cancelled);
    assert_eq!(env.provider.state.cancel_calls.load(Ordering::SeqCst), 0);
}
