//! Payout orchestrator: turns a submitted payment document into exactly one
//! Provider-side payout (or payout link) and drives user-initiated
//! cancellation.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tracing::info;
use uuid::Uuid;

use crate::cache::TtlCache;
use crate::erp::{Document, DocumentStore};
use crate::error::{EngineError, EngineResult};
use crate::models::{
    fields, InitiatedBy, PayoutChannel, PayoutContext, PayoutLinkStatus, PayoutRequest,
    PayoutStatus, UserPayoutMode, UTR_PLACEHOLDER,
};
use crate::razorpayx::RazorpayXClient;

const AUTH_TOKEN_TTL: Duration = Duration::from_secs(180);
const CANCEL_INTENT_TTL: Duration = Duration::from_secs(100);

fn auth_key(token: &str) -> String {
    format!("payout-auth:{token}")
}

fn cancel_intent_key(docname: &str) -> String {
    format!("cancel-payout:{docname}")
}

/// Result of a successful payout initiation, as written back onto the
/// source document.
#[derive(Debug, Clone)]
pub struct PayoutOutcome {
    pub payout_id: Option<String>,
    pub payout_link_id: Option<String>,
    pub status: PayoutStatus,
}

pub struct PayoutOrchestrator {
    store: Arc<dyn DocumentStore>,
    cache: Arc<TtlCache>,
    client: RazorpayXClient,
}

impl PayoutOrchestrator {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        cache: Arc<TtlCache>,
        client: RazorpayXClient,
    ) -> Self {
        PayoutOrchestrator {
            store,
            cache,
            client,
        }
    }

    /// Mint a short-lived token authorizing payout initiation for a set of
    /// documents. Called after the human confirmation step succeeds.
    pub fn register_auth(&self, docnames: &[String]) -> String {
        let token = Uuid::new_v4().to_string();
        let names = serde_json::to_string(docnames).unwrap_or_else(|_| "[]".to_string());
        self.cache.set(auth_key(&token), names, AUTH_TOKEN_TTL);
        token
    }

    /// Record that the user wants the Provider-side payout cancelled when
    /// the document is cancelled. Consulted by the cancel hook within its
    /// TTL window.
    pub fn mark_for_cancellation(&self, docname: &str) {
        self.cache
            .set(cancel_intent_key(docname), "1", CANCEL_INTENT_TTL);
    }

    /// Initiate the payout for a submitted payment document.
    pub async fn make_payout(
        &self,
        doctype: &str,
        docname: &str,
        ctx: &PayoutContext,
    ) -> EngineResult<PayoutOutcome> {
        let doc = self.store.get(doctype, docname).await?;
        let request = self.validate_prerequisites(&doc)?;
        self.check_authorization(docname, ctx)?;

        let mode_field = doc.get_str(fields::TRANSFER_METHOD).unwrap_or_default();
        let mode = UserPayoutMode::from_field(mode_field).ok_or_else(|| {
            EngineError::validation(format!("Unsupported payout channel: {mode_field}"))
        })?;

        let outcome = match PayoutChannel::from(mode) {
            PayoutChannel::CompositeBankAccount => {
                let entity = self.client.create_composite_bank_payout(&request).await?;
                PayoutOutcome {
                    status: PayoutStatus::from_wire(&entity.status)
                        .unwrap_or(PayoutStatus::Queued),
                    payout_id: Some(entity.id),
                    payout_link_id: None,
                }
            }
            PayoutChannel::CompositeUpi => {
                let entity = self.client.create_composite_upi_payout(&request).await?;
                PayoutOutcome {
                    status: PayoutStatus::from_wire(&entity.status)
                        .unwrap_or(PayoutStatus::Queued),
                    payout_id: Some(entity.id),
                    payout_link_id: None,
                }
            }
            PayoutChannel::LinkContactDetails => {
                let entity = self.client.create_payout_link(&request, None).await?;
                PayoutOutcome {
                    status: PayoutStatus::Pending,
                    payout_id: None,
                    payout_link_id: Some(entity.id),
                }
            }
        };

        let mut values: HashMap<String, Value> = HashMap::from([
            (
                fields::PAYOUT_STATUS.to_string(),
                Value::from(outcome.status.as_title()),
            ),
            (
                fields::REFERENCE_NO.to_string(),
                Value::from(UTR_PLACEHOLDER),
            ),
        ]);
        if let Some(payout_id) = &outcome.payout_id {
            values.insert(fields::PAYOUT_ID.to_string(), Value::from(payout_id.clone()));
        }
        if let Some(link_id) = &outcome.payout_link_id {
            values.insert(
                fields::PAYOUT_LINK_ID.to_string(),
                Value::from(link_id.clone()),
            );
        }
        self.store.set_values(doctype, docname, values).await?;

        info!(
            doctype = %doctype,
            docname = %docname,
            payout_id = outcome.payout_id.as_deref().unwrap_or(""),
            payout_link_id = outcome.payout_link_id.as_deref().unwrap_or(""),
            status = outcome.status.as_title(),
            "payout initiated"
        );
        Ok(outcome)
    }

    /// Cancel hook for the source document. Cancels the Provider-side
    /// payout or link only when the user asked for it and the remote state
    /// still allows it.
    pub async fn cancel_for_document(
        &self,
        doctype: &str,
        docname: &str,
        ctx: &PayoutContext,
    ) -> EngineResult<()> {
        if ctx.skip_remote_cancel {
            return Ok(());
        }
        if self.cache.remove(&cancel_intent_key(docname)).is_none() {
            return Ok(());
        }

        let doc = self.store.get(doctype, docname).await?;
        if let Some(link_id) = doc.get_str(fields::PAYOUT_LINK_ID) {
            self.cancel_link_if_issued(link_id).await?;
        } else if let Some(payout_id) = doc.get_str(fields::PAYOUT_ID) {
            self.cancel_payout_if_queued(payout_id).await?;
        }
        Ok(())
    }

    /// Cancel a payout only while it is still queued. Anything further
    /// along is left alone.
    pub async fn cancel_payout_if_queued(&self, payout_id: &str) -> EngineResult<bool> {
        let entity = self.client.fetch_payout(payout_id).await?;
        if PayoutStatus::from_wire(&entity.status) != Some(PayoutStatus::Queued) {
            return Ok(false);
        }
        self.client.cancel_payout(payout_id).await?;
        info!(payout_id = %payout_id, "payout cancelled");
        Ok(true)
    }

    /// Cancel a payout link only while it is still issued.
    pub async fn cancel_link_if_issued(&self, link_id: &str) -> EngineResult<bool> {
        let entity = self.client.fetch_payout_link(link_id).await?;
        if PayoutLinkStatus::from_wire(&entity.status) != Some(PayoutLinkStatus::Issued) {
            return Ok(false);
        }
        self.client.cancel_payout_link(link_id).await?;
        info!(payout_link_id = %link_id, "payout link cancelled");
        Ok(true)
    }

    fn check_authorization(&self, docname: &str, ctx: &PayoutContext) -> EngineResult<()> {
        if ctx.initiated_by == InitiatedBy::Scheduler {
            return Ok(());
        }
        let token = ctx
            .auth_token
            .as_deref()
            .ok_or_else(|| EngineError::Unauthorized("Payout authorization is required".into()))?;
        let names = self
            .cache
            .get(&auth_key(token))
            .ok_or_else(|| EngineError::Unauthorized("Payout authorization has expired".into()))?;
        let names: Vec<String> = serde_json::from_str(&names)
            .map_err(|_| EngineError::Unauthorized("Payout authorization is invalid".into()))?;
        if !names.iter().any(|n| n == docname) {
            return Err(EngineError::Unauthorized(format!(
                "Payout for {docname} was not authorized"
            )));
        }
        Ok(())
    }

    fn validate_prerequisites(&self, doc: &Document) -> EngineResult<PayoutRequest> {
        if !doc.is_submitted() {
            return Err(EngineError::validation(format!(
                "{} {} must be submitted before paying out",
                doc.doctype, doc.name
            )));
        }
        if doc.get_str(fields::PAYMENT_TYPE) != Some("Pay") {
            return Err(EngineError::validation("Payment type must be Pay"));
        }
        if doc.get(fields::MAKE_ONLINE_PAYMENT).and_then(Value::as_bool) != Some(true) {
            return Err(EngineError::validation(
                "Online payment is not enabled on this document",
            ));
        }
        let status = doc
            .get_str(fields::PAYOUT_STATUS)
            .and_then(PayoutStatus::from_wire)
            .unwrap_or(PayoutStatus::NotInitiated);
        if status != PayoutStatus::NotInitiated {
            return Err(EngineError::validation(format!(
                "Payout already initiated (status {})",
                status.as_title()
            )));
        }

        let mode_field = doc.get_str(fields::TRANSFER_METHOD).unwrap_or_default();
        let mode = UserPayoutMode::from_field(mode_field).ok_or_else(|| {
            EngineError::validation(format!("Unsupported payout channel: {mode_field}"))
        })?;
        match mode {
            UserPayoutMode::Bank => {
                if doc.is_unset(fields::PARTY_BANK_ACCOUNT_NO)
                    || doc.is_unset(fields::PARTY_BANK_IFSC)
                {
                    return Err(EngineError::validation(
                        "Bank transfers require the party's account number and IFSC",
                    ));
                }
            }
            UserPayoutMode::Upi => {
                if doc.is_unset(fields::PARTY_UPI_ADDRESS) {
                    return Err(EngineError::validation(
                        "UPI transfers require the party's UPI address",
                    ));
                }
            }
            UserPayoutMode::Link => {
                if doc.is_unset(fields::CONTACT_MOBILE) && doc.is_unset(fields::CONTACT_EMAIL) {
                    return Err(EngineError::validation(
                        "Payout links require the party's mobile or email",
                    ));
                }
                if doc.is_unset(fields::PAYOUT_DESCRIPTION) {
                    return Err(EngineError::validation(
                        "Payout links require a payout description",
                    ));
                }
            }
        }

        let amount = doc.get_f64(fields::PAID_AMOUNT).unwrap_or(0.0);
        if amount <= 0.0 {
            return Err(EngineError::validation("Paid amount must be positive"));
        }

        Ok(PayoutRequest {
            amount,
            party_type: doc.get_str(fields::PARTY_TYPE).unwrap_or_default().to_string(),
            party_name: doc.get_str(fields::PARTY_NAME).unwrap_or_default().to_string(),
            party_id: doc.get_str(fields::PARTY).map(str::to_string),
            party_mobile: doc.get_str(fields::CONTACT_MOBILE).map(str::to_string),
            party_email: doc.get_str(fields::CONTACT_EMAIL).map(str::to_string),
            bank_account_no: doc.get_str(fields::PARTY_BANK_ACCOUNT_NO).map(str::to_string),
            bank_ifsc: doc.get_str(fields::PARTY_BANK_IFSC).map(str::to_string),
            upi_address: doc.get_str(fields::PARTY_UPI_ADDRESS).map(str::to_string),
            description: doc.get_str(fields::PAYOUT_DESCRIPTION).map(str::to_string),
            purpose: None,
            reference_id: None,
            source_doctype: doc.doctype.clone(),
            source_docname: doc.name.clone(),
            pay_instantaneously: doc
                .get(fields::PAY_INSTANTANEOUSLY)
                .and_then(Value::as_bool)
                .unwrap_or(false),
            notes: HashMap::new(),
        })
    }
}
