//! Payout resource operations: plain (fund-account based), composite, and
//! payout link. All three share the base field mapping and diverge only in
//! how the destination is expressed.

use serde_json::Value;

use crate::error::{EngineError, EngineResult};
use crate::models::{
    bank_transfer_mode, contact_type_for, purpose_for, PayoutMode, PayoutRequest,
};
use crate::razorpayx::types::{
    BankAccountDetails, CompositePayoutRequest, ContactDetails, FundAccountDetails,
    PayoutEntity, PayoutLinkEntity, PayoutLinkRequest, PlainPayoutRequest, VpaDetails,
};
use crate::razorpayx::{CallOptions, RazorpayXClient};
use crate::util::{idempotency_key, sanitize_contact_name, validate_description};

/// Header carrying the Provider-side idempotency key, derived from the
/// source docname.
pub const IDEMPOTENCY_HEADER: &str = "X-Payout-Idempotency";

const PAYOUT_MASK: [&str; 3] = ["account_number", "ifsc", "address"];

impl RazorpayXClient {
    /// Payout to a pre-registered fund account. Link transfers have their
    /// own endpoint and are rejected here.
    pub async fn create_payout(
        &self,
        request: &PayoutRequest,
        fund_account_id: &str,
        mode: PayoutMode,
    ) -> EngineResult<PayoutEntity> {
        if mode == PayoutMode::Link {
            return Err(EngineError::validation(
                "Link transfers are created via payout links, not payouts",
            ));
        }
        self.validate_narration(request)?;
        let body = PlainPayoutRequest {
            account_number: self.config().account_number.clone(),
            amount: crate::util::rupees_to_paisa(request.amount),
            currency: "INR".to_string(),
            mode: mode.as_wire().to_string(),
            purpose: self.purpose(request),
            reference_id: request.reference_id(),
            narration: request.description.clone(),
            queue_if_low_balance: true,
            fund_account_id: fund_account_id.to_string(),
            notes: request.wire_notes(),
        };
        let response = self
            .post(
                &["payouts"],
                serde_json::to_value(&body).map_err(|e| EngineError::validation(e.to_string()))?,
                self.payout_options(request),
            )
            .await?;
        parse_entity(response)
    }

    /// Composite payout to a bank account, mode resolved from the amount.
    pub async fn create_composite_bank_payout(
        &self,
        request: &PayoutRequest,
    ) -> EngineResult<PayoutEntity> {
        let account_no = request
            .bank_account_no
            .clone()
            .ok_or_else(|| EngineError::validation("Party bank account number is required"))?;
        let ifsc = request
            .bank_ifsc
            .clone()
            .ok_or_else(|| EngineError::validation("Party bank routing code (IFSC) is required"))?;
        let mode = bank_transfer_mode(request.amount, request.pay_instantaneously);
        let fund_account = FundAccountDetails {
            account_type: "bank_account".to_string(),
            bank_account: Some(BankAccountDetails {
                name: sanitize_contact_name(&request.party_name),
                account_number: account_no,
                ifsc,
            }),
            vpa: None,
            contact: self.contact_details(request),
        };
        self.create_composite_payout(request, mode, fund_account)
            .await
    }

    /// Composite payout to a UPI address.
    pub async fn create_composite_upi_payout(
        &self,
        request: &PayoutRequest,
    ) -> EngineResult<PayoutEntity> {
        let address = request
            .upi_address
            .clone()
            .ok_or_else(|| EngineError::validation("Party UPI address is required"))?;
        let fund_account = FundAccountDetails {
            account_type: "vpa".to_string(),
            bank_account: None,
            vpa: Some(VpaDetails { address }),
            contact: self.contact_details(request),
        };
        self.create_composite_payout(request, PayoutMode::Upi, fund_account)
            .await
    }

    async fn create_composite_payout(
        &self,
        request: &PayoutRequest,
        mode: PayoutMode,
        fund_account: FundAccountDetails,
    ) -> EngineResult<PayoutEntity> {
        self.validate_narration(request)?;
        let body = CompositePayoutRequest {
            account_number: self.config().account_number.clone(),
            amount: crate::util::rupees_to_paisa(request.amount),
            currency: "INR".to_string(),
            mode: mode.as_wire().to_string(),
            purpose: self.purpose(request),
            reference_id: request.reference_id(),
            narration: request.description.clone(),
            queue_if_low_balance: true,
            fund_account,
            notes: request.wire_notes(),
        };
        let response = self
            .post(
                &["payouts"],
                serde_json::to_value(&body).map_err(|e| EngineError::validation(e.to_string()))?,
                self.payout_options(request),
            )
            .await?;
        parse_entity(response)
    }

    /// Payout link sent to the party's contact details. Requires a
    /// description and at least one of mobile/email.
    pub async fn create_payout_link(
        &self,
        request: &PayoutRequest,
        expire_by: Option<i64>,
    ) -> EngineResult<PayoutLinkEntity> {
        let description = request
            .description
            .clone()
            .ok_or_else(|| EngineError::validation("Payout link requires a description"))?;
        validate_description(&description)?;
        if request.party_mobile.is_none() && request.party_email.is_none() {
            return Err(EngineError::validation(
                "Payout link requires the party's mobile or email",
            ));
        }
        let body = PayoutLinkRequest {
            account_number: self.config().account_number.clone(),
            amount: crate::util::rupees_to_paisa(request.amount),
            currency: "INR".to_string(),
            purpose: self.purpose(request),
            description,
            contact: self.contact_details(request),
            send_sms: true,
            send_email: true,
            expire_by,
            notes: request.wire_notes(),
        };
        let response = self
            .post(
                &["payout-links"],
                serde_json::to_value(&body).map_err(|e| EngineError::validation(e.to_string()))?,
                self.payout_options(request),
            )
            .await?;
        parse_entity(response)
    }

    pub async fn fetch_payout(&self, payout_id: &str) -> EngineResult<PayoutEntity> {
        let response = self
            .get(&["payouts", payout_id], None, CallOptions::default())
            .await?;
        parse_entity(response)
    }

    pub async fn cancel_payout(&self, payout_id: &str) -> EngineResult<PayoutEntity> {
        let response = self
            .post(
                &["payouts", payout_id, "cancel"],
                Value::Object(Default::default()),
                CallOptions::default(),
            )
            .await?;
        parse_entity(response)
    }

    pub async fn fetch_payout_link(&self, link_id: &str) -> EngineResult<PayoutLinkEntity> {
        let response = self
            .get(&["payout-links", link_id], None, CallOptions::default())
            .await?;
        parse_entity(response)
    }

    pub async fn cancel_payout_link(&self, link_id: &str) -> EngineResult<PayoutLinkEntity> {
        let response = self
            .post(
                &["payout-links", link_id, "cancel"],
                Value::Object(Default::default()),
                CallOptions::default(),
            )
            .await?;
        parse_entity(response)
    }

    fn payout_options(&self, request: &PayoutRequest) -> CallOptions {
        CallOptions::for_source(&request.source_doctype, &request.source_docname)
            .header(IDEMPOTENCY_HEADER, &idempotency_key(&request.source_docname))
            .mask(&PAYOUT_MASK)
    }

    fn contact_details(&self, request: &PayoutRequest) -> ContactDetails {
        ContactDetails {
            name: sanitize_contact_name(&request.party_name),
            contact_type: contact_type_for(&request.party_type).to_string(),
            email: request.party_email.clone(),
            contact: request.party_mobile.clone(),
            reference_id: request.party_id.clone(),
        }
    }

    fn purpose(&self, request: &PayoutRequest) -> String {
        request
            .purpose
            .clone()
            .unwrap_or_else(|| purpose_for(&request.party_type).to_string())
    }

    fn validate_narration(&self, request: &PayoutRequest) -> EngineResult<()> {
        if let Some(description) = &request.description {
            validate_description(description)?;
        }
        Ok(())
    }
}

fn parse_entity<T: serde::de::DeserializeOwned>(response: Value) -> EngineResult<T> {
    serde_json::from_value(response).map_err(|e| {
        EngineError::Provider {
            status_code: 200,
            message: format!("Unexpected Provider response shape: {e}"),
        }
    })
}
