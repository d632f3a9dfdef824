//! Webhook reconciliation engine: authenticates Provider deliveries,
//! correlates them back to source documents, and applies status forward
//! while compensating local state (cancellation, fees, transactions).

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use hmac::{Hmac, Mac};
use serde_json::Value;
use sha2::Sha256;
use tracing::{info, warn};

use crate::cache::TtlCache;
use crate::config::ConfigRegistry;
use crate::erp::{
    DocumentStore, Filters, IntegrationLog, IntegrationRequest, RequestOutcome, SecretStore,
};
use crate::error::{EngineError, EngineResult};
use crate::fees::FeeJournal;
use crate::models::{fields, PayoutLinkStatus, PayoutStatus};
use crate::razorpayx::types::TransactionEntity;
use crate::razorpayx::RazorpayXClient;
use crate::sync::BankTransactionSync;

pub const EVENT_ID_HEADER: &str = "X-Razorpay-Event-Id";
pub const SIGNATURE_HEADER: &str = "X-Razorpay-Signature";

const DUPLICATE_TTL: Duration = Duration::from_secs(60);
const AMENDMENT_CHAIN_CAP: usize = 50;

pub const SUPPORTED_EVENTS: [&str; 12] = [
    "payout.pending",
    "payout.rejected",
    "payout.queued",
    "payout.initiated",
    "payout.processed",
    "payout.reversed",
    "payout.failed",
    "payout.updated",
    "payout_link.cancelled",
    "payout_link.rejected",
    "payout_link.expired",
    "transaction.created",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Payout,
    PayoutLink,
    Transaction,
}

/// How to pull the entity out of the delivery payload for one event family.
struct EventStrategy {
    kind: EventKind,
    payload_key: &'static str,
}

fn strategy_for(event: &str) -> Option<EventStrategy> {
    if event.starts_with("payout_link.") {
        Some(EventStrategy {
            kind: EventKind::PayoutLink,
            payload_key: "payout_link",
        })
    } else if event.starts_with("payout.") {
        Some(EventStrategy {
            kind: EventKind::Payout,
            payload_key: "payout",
        })
    } else if event.starts_with("transaction.") {
        Some(EventStrategy {
            kind: EventKind::Transaction,
            payload_key: "transaction",
        })
    } else {
        None
    }
}

/// A fully authenticated, parsed delivery ready for reconciliation.
#[derive(Debug, Clone)]
pub struct WebhookEvent {
    pub name: String,
    pub kind: EventKind,
    pub account_id: String,
    pub entity_id: String,
    pub status: Option<PayoutStatus>,
    pub link_status: Option<PayoutLinkStatus>,
    pub utr: Option<String>,
    pub fees: i64,
    pub tax: i64,
    pub source_doctype: Option<String>,
    pub source_docname: Option<String>,
    pub transaction: Option<TransactionEntity>,
}

pub struct WebhookEngine {
    store: Arc<dyn DocumentStore>,
    cache: Arc<TtlCache>,
    log: Arc<dyn IntegrationLog>,
    secrets: Arc<dyn SecretStore>,
    configs: ConfigRegistry,
    clients: HashMap<String, RazorpayXClient>,
    fees: FeeJournal,
    sync: Arc<BankTransactionSync>,
    doc_locks: tokio::sync::Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl WebhookEngine {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<dyn DocumentStore>,
        cache: Arc<TtlCache>,
        log: Arc<dyn IntegrationLog>,
        secrets: Arc<dyn SecretStore>,
        configs: ConfigRegistry,
        clients: HashMap<String, RazorpayXClient>,
        fees: FeeJournal,
        sync: Arc<BankTransactionSync>,
    ) -> Self {
        WebhookEngine {
            store,
            cache,
            log,
            secrets,
            configs,
            clients,
            fees,
            sync,
            doc_locks: tokio::sync::Mutex::new(HashMap::new()),
        }
    }

    /// Authenticate one delivery. Returns the parsed event, or `None` when
    /// the delivery was dropped (duplicate or unsupported event). Every
    /// outcome leaves an inbound log entry.
    pub async fn authenticate(
        &self,
        event_id: Option<&str>,
        signature: Option<&str>,
        raw_body: &[u8],
    ) -> EngineResult<Option<WebhookEvent>> {
        let event_id = match event_id {
            Some(id) if !id.is_empty() => id,
            _ => {
                self.log_inbound(raw_body, RequestOutcome::Failed, Some("Missing event id"))
                    .await;
                return Err(EngineError::Unauthorized(
                    "Webhook delivery is missing the event id header".into(),
                ));
            }
        };
        let signature = match signature {
            Some(sig) if !sig.is_empty() => sig,
            _ => {
                self.log_inbound(raw_body, RequestOutcome::Failed, Some("Missing signature"))
                    .await;
                return Err(EngineError::Unauthorized(
                    "Webhook delivery is missing the signature header".into(),
                ));
            }
        };

        if !self
            .cache
            .set_if_absent(format!("webhook-event:{event_id}:{signature}"), DUPLICATE_TTL)
        {
            info!(event_id = %event_id, "duplicate webhook delivery suppressed");
            self.log_inbound(raw_body, RequestOutcome::Cancelled, Some("Duplicate delivery"))
                .await;
            return Ok(None);
        }

        let body: Value = match serde_json::from_slice(raw_body) {
            Ok(body) => body,
            Err(e) => {
                self.log_inbound(raw_body, RequestOutcome::Failed, Some("Malformed payload"))
                    .await;
                return Err(EngineError::validation(format!(
                    "Malformed webhook payload: {e}"
                )));
            }
        };

        let account_id = body
            .get("account_id")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let config = match self.configs.by_account_id(&account_id) {
            Some(config) => config,
            None => {
                self.log_inbound(raw_body, RequestOutcome::Failed, Some("Unknown account"))
                    .await;
                return Err(EngineError::Unauthorized(format!(
                    "No configuration for account {account_id}"
                )));
            }
        };
        let secret = match self.secrets.webhook_secret(&config.name).await? {
            Some(secret) => secret,
            None => {
                self.log_inbound(raw_body, RequestOutcome::Failed, Some("Missing secret"))
                    .await;
                return Err(EngineError::Unauthorized(format!(
                    "No webhook secret configured for account {}",
                    config.name
                )));
            }
        };
        if !verify_signature(raw_body, &secret, signature) {
            self.log_inbound(raw_body, RequestOutcome::Failed, Some("Invalid signature"))
                .await;
            return Err(EngineError::Unauthorized(
                "Webhook signature verification failed".into(),
            ));
        }

        let event_name = body
            .get("event")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        if !SUPPORTED_EVENTS.contains(&event_name.as_str()) {
            info!(event = %event_name, "unsupported webhook event dropped");
            self.log_inbound(raw_body, RequestOutcome::Cancelled, Some("Unsupported event"))
                .await;
            return Ok(None);
        }

        let event = parse_event(&event_name, &account_id, &body)?;
        self.log_inbound(raw_body, RequestOutcome::Completed, None).await;
        Ok(Some(event))
    }

    /// Reconcile one authenticated event against local state.
    pub async fn process(&self, event: &WebhookEvent) -> EngineResult<()> {
        match event.kind {
            EventKind::Payout | EventKind::PayoutLink => self.process_document_event(event).await,
            EventKind::Transaction => self.process_transaction_event(event).await,
        }
    }

    async fn process_document_event(&self, event: &WebhookEvent) -> EngineResult<()> {
        let (docname, superseded) = self.correlate(event).await?;
        let doctype = event
            .source_doctype
            .clone()
            .unwrap_or_else(|| "Payment Entry".to_string());

        let lock = self.lock_for(&docname).await;
        let result = {
            let _guard = lock.lock().await;
            self.apply_document_update(event, &doctype, &docname, &superseded)
                .await
        };
        drop(lock);
        self.release_lock(&docname).await;
        result
    }

    async fn apply_document_update(
        &self,
        event: &WebhookEvent,
        doctype: &str,
        docname: &str,
        superseded: &[String],
    ) -> EngineResult<()> {
        let doc = self.store.get(doctype, docname).await?;
        let current = doc
            .get_str(fields::PAYOUT_STATUS)
            .and_then(PayoutStatus::from_wire)
            .unwrap_or(PayoutStatus::NotInitiated);
        let incoming = match event.status {
            Some(status) => status,
            None => return Ok(()),
        };

        if !current.allows_update_to(incoming) {
            info!(
                docname = %docname,
                current = current.as_title(),
                incoming = incoming.as_title(),
                "stale webhook status ignored"
            );
            return Ok(());
        }

        let mut values: HashMap<String, Value> = HashMap::from([(
            fields::PAYOUT_STATUS.to_string(),
            Value::from(incoming.as_title()),
        )]);
        let id_field = match event.kind {
            EventKind::PayoutLink => fields::PAYOUT_LINK_ID,
            _ => fields::PAYOUT_ID,
        };
        if doc.is_unset(id_field) {
            values.insert(id_field.to_string(), Value::from(event.entity_id.clone()));
        }
        if let Some(utr) = &event.utr {
            values.insert(fields::REFERENCE_NO.to_string(), Value::from(utr.clone()));
            if let (Some(remarks), Some(old_ref)) =
                (doc.get_str(fields::REMARKS), doc.get_str(fields::REFERENCE_NO))
            {
                if !old_ref.is_empty() {
                    values.insert(
                        fields::REMARKS.to_string(),
                        Value::from(remarks.replace(old_ref, utr)),
                    );
                }
            }
        }
        self.store.set_values(doctype, docname, values).await?;
        info!(
            docname = %docname,
            status = incoming.as_title(),
            event = %event.name,
            "payout status reconciled"
        );

        // superseded amendments carry the terminal status too
        for name in superseded {
            let mirror: HashMap<String, Value> = HashMap::from([(
                fields::PAYOUT_STATUS.to_string(),
                Value::from(incoming.as_title()),
            )]);
            if let Err(e) = self.store.set_values(doctype, name, mirror).await {
                warn!(docname = %name, error = %e, "failed to mirror status to amendment");
            }
        }

        self.compensate(event, doctype, docname, incoming).await
    }

    async fn compensate(
        &self,
        event: &WebhookEvent,
        doctype: &str,
        docname: &str,
        status: PayoutStatus,
    ) -> EngineResult<()> {
        if status == PayoutStatus::Processed && event.fees > 0 {
            if let Some(utr) = &event.utr {
                self.fees
                    .record(&event.entity_id, utr, event.fees, event.tax)
                    .await?;
            }
        }

        if status.is_terminal_failure() {
            let doc = self.store.get(doctype, docname).await?;
            if doc.is_submitted() {
                // a live payout link would just re-issue the payout, so the
                // document stays put until the link is confirmed dead
                if let Some(link_id) = doc.get_str(fields::PAYOUT_LINK_ID) {
                    if event.kind != EventKind::PayoutLink
                        && !self.try_cancel_link(&event.account_id, link_id).await
                    {
                        warn!(
                            docname = %docname,
                            payout_link_id = %link_id,
                            "payout link not confirmed dead, document left submitted"
                        );
                        return Ok(());
                    }
                }
                self.store.cancel(doctype, docname).await?;
                info!(docname = %docname, "source document cancelled after terminal payout status");
            }
        }
        Ok(())
    }

    /// Returns true only when the link is confirmed dead: already
    /// cancelled/rejected/expired, or issued and cancelled here.
    async fn try_cancel_link(&self, account_id: &str, link_id: &str) -> bool {
        let Some(client) = self.clients.get(crate::config::strip_account_prefix(account_id))
        else {
            warn!(payout_link_id = %link_id, account_id = %account_id, "no client for account");
            return false;
        };
        let result: EngineResult<bool> = async {
            let link = client.fetch_payout_link(link_id).await?;
            match PayoutLinkStatus::from_wire(&link.status) {
                Some(status) if status.is_cancelled_class() => Ok(true),
                Some(PayoutLinkStatus::Issued) => {
                    client.cancel_payout_link(link_id).await?;
                    Ok(true)
                }
                _ => Ok(false),
            }
        }
        .await;
        match result {
            Ok(confirmed) => confirmed,
            Err(e) => {
                warn!(payout_link_id = %link_id, error = %e, "payout link cancel failed");
                false
            }
        }
    }

    async fn process_transaction_event(&self, event: &WebhookEvent) -> EngineResult<()> {
        let Some(transaction) = &event.transaction else {
            return Ok(());
        };
        self.sync.ingest(transaction).await?;

        let Some(source) = &transaction.source else {
            return Ok(());
        };
        // statement records created while the payout was still processing
        // have no reference number yet
        if let Some(utr) = &source.utr {
            self.sync.backfill_reference(&transaction.id, utr).await?;
        }

        let payout_id = match source.entity.as_str() {
            "payout" => Some(source.id.clone()),
            "reversal" => source.payout_id.clone(),
            _ => None,
        };
        let Some(payout_id) = payout_id else {
            return Ok(());
        };
        let status = match source.entity.as_str() {
            "reversal" => source
                .status
                .as_deref()
                .and_then(PayoutStatus::from_wire)
                .or(Some(PayoutStatus::Reversed)),
            _ => source.status.as_deref().and_then(PayoutStatus::from_wire),
        };
        let Some(status) = status else {
            return Ok(());
        };

        let mut doc_event = event.clone();
        doc_event.kind = EventKind::Payout;
        doc_event.entity_id = payout_id;
        doc_event.status = Some(status);
        doc_event.utr = source.utr.clone();
        doc_event.source_doctype = source
            .notes
            .get("source_doctype")
            .and_then(Value::as_str)
            .map(str::to_string);
        doc_event.source_docname = source
            .notes
            .get("source_docname")
            .and_then(Value::as_str)
            .map(str::to_string);

        match self.process_document_event(&doc_event).await {
            // statement entries exist for non-payout account activity too
            Err(EngineError::Correlation(_)) => Ok(()),
            result => result,
        }
    }

    /// Resolve the event to a live source document. Returns the target name
    /// plus any superseded amendment chain behind it.
    async fn correlate(&self, event: &WebhookEvent) -> EngineResult<(String, Vec<String>)> {
        let doctype = event
            .source_doctype
            .clone()
            .unwrap_or_else(|| "Payment Entry".to_string());
        let id_field = match event.kind {
            EventKind::PayoutLink => fields::PAYOUT_LINK_ID,
            _ => fields::PAYOUT_ID,
        };

        let filters: Filters =
            HashMap::from([(id_field.to_string(), Value::from(event.entity_id.clone()))]);
        if let Some(doc) = self.store.find(&doctype, &filters).await?.into_iter().next() {
            return self.walk_amendments(&doctype, doc.name).await;
        }

        if let Some(docname) = &event.source_docname {
            if self.store.get(&doctype, docname).await.is_ok() {
                return self.walk_amendments(&doctype, docname.clone()).await;
            }
        }

        Err(EngineError::Correlation(format!(
            "No document found for {} {}",
            event.name, event.entity_id
        )))
    }

    async fn walk_amendments(
        &self,
        doctype: &str,
        start: String,
    ) -> EngineResult<(String, Vec<String>)> {
        let mut chain = Vec::new();
        let mut current = start;
        for _ in 0..AMENDMENT_CHAIN_CAP {
            match self.store.amended_successor(doctype, &current).await? {
                Some(next) => {
                    chain.push(current);
                    current = next;
                }
                None => return Ok((current, chain)),
            }
        }
        Err(EngineError::Correlation(format!(
            "Amendment chain for {doctype} {current} exceeds {AMENDMENT_CHAIN_CAP} hops"
        )))
    }

    async fn lock_for(&self, docname: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.doc_locks.lock().await;
        Arc::clone(
            locks
                .entry(docname.to_string())
                .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(()))),
        )
    }

    /// Drop the registry entry once no task holds the lock anymore.
    async fn release_lock(&self, docname: &str) {
        let mut locks = self.doc_locks.lock().await;
        if locks
            .get(docname)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            locks.remove(docname);
        }
    }

    async fn log_inbound(&self, raw_body: &[u8], outcome: RequestOutcome, error: Option<&str>) {
        let payload: Value = serde_json::from_slice(raw_body).unwrap_or(Value::Null);
        self.log
            .record(IntegrationRequest {
                service: "RazorpayX Webhook".to_string(),
                request_id: None,
                url: None,
                request_headers: None,
                payload: Some(payload),
                response: None,
                outcome,
                error: error.map(str::to_string),
                recorded_at: Utc::now(),
            })
            .await;
    }
}

/// Constant-time check of the hex HMAC-SHA256 signature over the raw body.
pub fn verify_signature(raw_body: &[u8], secret: &str, signature: &str) -> bool {
    let Ok(mut mac) = Hmac::<Sha256>::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(raw_body);
    let Ok(expected) = hex::decode(signature.trim()) else {
        return false;
    };
    mac.verify_slice(&expected).is_ok()
}

/// Hex HMAC-SHA256 of a body, as the Provider signs deliveries. Used by the
/// test suite to produce valid signatures.
pub fn sign_body(raw_body: &[u8], secret: &str) -> String {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes())
        .unwrap_or_else(|_| unreachable!("hmac accepts any key length"));
    mac.update(raw_body);
    hex::encode(mac.finalize().into_bytes())
}

fn parse_event(event_name: &str, account_id: &str, body: &Value) -> EngineResult<WebhookEvent> {
    let strategy = strategy_for(event_name)
        .ok_or_else(|| EngineError::validation(format!("Unrecognized event: {event_name}")))?;
    let entity = body
        .pointer(&format!("/payload/{}/entity", strategy.payload_key))
        .ok_or_else(|| {
            EngineError::validation(format!("Webhook payload has no {} entity", strategy.payload_key))
        })?;

    let notes = entity.get("notes").cloned().unwrap_or(Value::Null);
    let source_doctype = notes
        .get("source_doctype")
        .and_then(Value::as_str)
        .map(str::to_string);
    let source_docname = notes
        .get("source_docname")
        .and_then(Value::as_str)
        .map(str::to_string);

    let mut event = WebhookEvent {
        name: event_name.to_string(),
        kind: strategy.kind,
        account_id: account_id.to_string(),
        entity_id: entity
            .get("id")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        status: None,
        link_status: None,
        utr: entity
            .get("utr")
            .and_then(Value::as_str)
            .map(str::to_string),
        fees: entity.get("fees").and_then(Value::as_i64).unwrap_or(0),
        tax: entity.get("tax").and_then(Value::as_i64).unwrap_or(0),
        source_doctype,
        source_docname,
        transaction: None,
    };

    match strategy.kind {
        EventKind::Payout => {
            event.status = entity
                .get("status")
                .and_then(Value::as_str)
                .and_then(PayoutStatus::from_wire);
        }
        EventKind::PayoutLink => {
            event.link_status = entity
                .get("status")
                .and_then(Value::as_str)
                .and_then(PayoutLinkStatus::from_wire);
            // a dead link means the payout never happens
            event.status = Some(PayoutStatus::Cancelled);
        }
        EventKind::Transaction => {
            event.transaction = serde_json::from_value(entity.clone()).ok();
            if let Some(transaction) = &event.transaction {
                event.entity_id = transaction.id.clone();
            }
        }
    }
    Ok(event)
}
