//! Contacts and fund-accounts resource operations.

use std::collections::HashMap;

use serde_json::Value;

use crate::error::{EngineError, EngineResult};
use crate::razorpayx::types::{
    BankAccountDetails, ContactRequest, FundAccountRequest, VpaDetails,
};
use crate::razorpayx::{CallOptions, RazorpayXClient};
use crate::util::sanitize_contact_name;

const CONTACT_TYPES: [&str; 4] = ["employee", "vendor", "customer", "self"];

impl RazorpayXClient {
    pub async fn create_contact(&self, mut request: ContactRequest) -> EngineResult<Value> {
        if !CONTACT_TYPES.contains(&request.contact_type.as_str()) {
            return Err(EngineError::validation(format!(
                "Invalid contact type: {}",
                request.contact_type
            )));
        }
        request.name = sanitize_contact_name(&request.name);
        let body = serde_json::to_value(&request)
            .map_err(|e| EngineError::validation(e.to_string()))?;
        self.post(&["contacts"], body, CallOptions::default()).await
    }

    pub async fn fetch_contact(&self, contact_id: &str) -> EngineResult<Value> {
        self.get(&["contacts", contact_id], None, CallOptions::default())
            .await
    }

    /// List contacts. Recognized filters: name, email, contact,
    /// reference_id, active, type.
    pub async fn list_contacts(
        &self,
        filters: HashMap<String, Value>,
        count: Option<i64>,
    ) -> EngineResult<Vec<Value>> {
        if let Some(Value::String(contact_type)) = filters.get("type") {
            if !CONTACT_TYPES.contains(&contact_type.as_str()) {
                return Err(EngineError::validation(format!(
                    "Invalid contact type: {contact_type}"
                )));
            }
        }
        self.get_all(&["contacts"], filters, count, CallOptions::default())
            .await
    }

    pub async fn create_bank_fund_account(
        &self,
        contact_id: &str,
        account: BankAccountDetails,
    ) -> EngineResult<Value> {
        let request = FundAccountRequest {
            contact_id: contact_id.to_string(),
            account_type: "bank_account".to_string(),
            bank_account: Some(account),
            vpa: None,
        };
        let body = serde_json::to_value(&request)
            .map_err(|e| EngineError::validation(e.to_string()))?;
        self.post(
            &["fund_accounts"],
            body,
            CallOptions::default().mask(&["account_number"]),
        )
        .await
    }

    pub async fn create_vpa_fund_account(
        &self,
        contact_id: &str,
        upi_address: &str,
    ) -> EngineResult<Value> {
        let request = FundAccountRequest {
            contact_id: contact_id.to_string(),
            account_type: "vpa".to_string(),
            bank_account: None,
            vpa: Some(VpaDetails {
                address: upi_address.to_string(),
            }),
        };
        let body = serde_json::to_value(&request)
            .map_err(|e| EngineError::validation(e.to_string()))?;
        self.post(
            &["fund_accounts"],
            body,
            CallOptions::default().mask(&["address"]),
        )
        .await
    }

    pub async fn list_fund_accounts(
        &self,
        contact_id: &str,
        count: Option<i64>,
    ) -> EngineResult<Vec<Value>> {
        let filters = HashMap::from([("contact_id".to_string(), Value::from(contact_id))]);
        self.get_all(&["fund_accounts"], filters, count, CallOptions::default())
            .await
    }

    pub async fn set_fund_account_active(
        &self,
        fund_account_id: &str,
        active: bool,
    ) -> EngineResult<Value> {
        self.patch(
            &["fund_accounts", fund_account_id],
            serde_json::json!({ "active": active }),
            CallOptions::default(),
        )
        .await
    }
}
