//! HTTP surface: webhook listener, payout initiation, cancellation intent,
//! and sync trigger.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::json;
use tracing::warn;

use crate::error::EngineError;
use crate::models::{InitiatedBy, PayoutContext};
use crate::orchestrator::PayoutOrchestrator;
use crate::sync::BankTransactionSync;
use crate::webhook::{WebhookEngine, EVENT_ID_HEADER, SIGNATURE_HEADER};

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<PayoutOrchestrator>,
    pub webhooks: Arc<WebhookEngine>,
    pub sync: Arc<BankTransactionSync>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(health))
        .route("/api/webhooks/razorpayx", post(webhook_listener))
        .route("/api/payouts/authorize", post(authorize_payouts))
        .route("/api/payouts/initiate", post(initiate_payout))
        .route("/api/payouts/mark-cancel", post(mark_for_cancellation))
        .route("/api/transactions/sync", post(trigger_sync))
        .with_state(state)
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "module": "payouts",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Webhook listener. Always answers 200 so the Provider never retries into
/// a poison loop; failures are observable through the integration log.
async fn webhook_listener(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> StatusCode {
    let event_id = headers
        .get(EVENT_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    match state
        .webhooks
        .authenticate(event_id.as_deref(), signature.as_deref(), &body)
        .await
    {
        Ok(Some(event)) => {
            let engine = Arc::clone(&state.webhooks);
            tokio::spawn(async move {
                if let Err(e) = engine.process(&event).await {
                    warn!(event = %event.name, error = %e, "webhook processing failed");
                }
            });
        }
        Ok(None) => {}
        Err(e) => {
            warn!(error = %e, "webhook delivery rejected");
        }
    }
    StatusCode::OK
}

#[derive(Debug, Deserialize)]
struct AuthorizeBody {
    docnames: Vec<String>,
}

async fn authorize_payouts(
    State(state): State<AppState>,
    Json(body): Json<AuthorizeBody>,
) -> Json<serde_json::Value> {
    let token = state.orchestrator.register_auth(&body.docnames);
    Json(json!({ "auth_token": token }))
}

#[derive(Debug, Deserialize)]
struct InitiateBody {
    doctype: String,
    docname: String,
    #[serde(default)]
    auth_token: Option<String>,
    #[serde(default)]
    scheduled: bool,
}

async fn initiate_payout(
    State(state): State<AppState>,
    Json(body): Json<InitiateBody>,
) -> Response {
    let ctx = if body.scheduled {
        PayoutContext::scheduler()
    } else {
        PayoutContext {
            initiated_by: InitiatedBy::User,
            skip_remote_cancel: false,
            auth_token: body.auth_token,
        }
    };
    match state
        .orchestrator
        .make_payout(&body.doctype, &body.docname, &ctx)
        .await
    {
        Ok(outcome) => Json(json!({
            "payout_id": outcome.payout_id,
            "payout_link_id": outcome.payout_link_id,
            "status": outcome.status.as_title(),
        }))
        .into_response(),
        Err(e) => error_response(e),
    }
}

#[derive(Debug, Deserialize)]
struct MarkCancelBody {
    docname: String,
}

async fn mark_for_cancellation(
    State(state): State<AppState>,
    Json(body): Json<MarkCancelBody>,
) -> StatusCode {
    state.orchestrator.mark_for_cancellation(&body.docname);
    StatusCode::OK
}

#[derive(Debug, Deserialize)]
struct SyncBody {
    from: Option<NaiveDate>,
    to: Option<NaiveDate>,
}

async fn trigger_sync(State(state): State<AppState>, Json(body): Json<SyncBody>) -> Response {
    let result = match (body.from, body.to) {
        (Some(from), Some(to)) => state.sync.sync_window(from, to).await,
        _ => state.sync.sync_daily().await,
    };
    match result {
        Ok(summary) => Json(json!({
            "inserted": summary.inserted,
            "skipped": summary.skipped,
            "failed": summary.failed,
        }))
        .into_response(),
        Err(e) => error_response(e),
    }
}

fn error_response(error: EngineError) -> Response {
    let status = match &error {
        EngineError::Validation(_) => StatusCode::BAD_REQUEST,
        EngineError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
        EngineError::Correlation(_) => StatusCode::UNPROCESSABLE_ENTITY,
        EngineError::Provider { .. } if error.is_client_error() => StatusCode::BAD_REQUEST,
        EngineError::Provider { .. } | EngineError::ProviderUnreachable(_) => {
            StatusCode::BAD_GATEWAY
        }
    };
    (status, Json(json!({ "error": error.to_string() }))).into_response()
}
