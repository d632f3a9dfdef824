//! Wire types for the RazorpayX API: request bodies sent to the Provider
//! and the entities that come back.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

// ============================================================================
// REQUEST SHAPES
// ============================================================================

/// Contact block embedded in composite payouts and payout links.
#[derive(Debug, Clone, Serialize)]
pub struct ContactDetails {
    pub name: String,
    #[serde(rename = "type")]
    pub contact_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contact: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference_id: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BankAccountDetails {
    pub name: String,
    pub account_number: String,
    pub ifsc: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct VpaDetails {
    pub address: String,
}

/// Destination of a composite payout. `account_type` is `bank_account` or
/// `vpa` and exactly one of the detail blocks is present.
#[derive(Debug, Clone, Serialize)]
pub struct FundAccountDetails {
    pub account_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bank_account: Option<BankAccountDetails>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vpa: Option<VpaDetails>,
    pub contact: ContactDetails,
}

/// Payout with full destination details inline.
#[derive(Debug, Clone, Serialize)]
pub struct CompositePayoutRequest {
    pub account_number: String,
    /// Minor units (paisa).
    pub amount: i64,
    pub currency: String,
    pub mode: String,
    pub purpose: String,
    pub reference_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub narration: Option<String>,
    pub queue_if_low_balance: bool,
    pub fund_account: FundAccountDetails,
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    pub notes: HashMap<String, String>,
}

/// Payout against a pre-registered fund account.
#[derive(Debug, Clone, Serialize)]
pub struct PlainPayoutRequest {
    pub account_number: String,
    pub amount: i64,
    pub currency: String,
    pub mode: String,
    pub purpose: String,
    pub reference_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub narration: Option<String>,
    pub queue_if_low_balance: bool,
    pub fund_account_id: String,
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    pub notes: HashMap<String, String>,
}

/// Payout link: no mode, no reference id, no queueing flag; narration
/// travels as `description`.
#[derive(Debug, Clone, Serialize)]
pub struct PayoutLinkRequest {
    pub account_number: String,
    pub amount: i64,
    pub currency: String,
    pub purpose: String,
    pub description: String,
    pub contact: ContactDetails,
    pub send_sms: bool,
    pub send_email: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expire_by: Option<i64>,
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    pub notes: HashMap<String, String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ContactRequest {
    pub name: String,
    #[serde(rename = "type")]
    pub contact_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contact: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference_id: Option<String>,
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    pub notes: HashMap<String, String>,
}

/// Fund account registered against an existing contact.
#[derive(Debug, Clone, Serialize)]
pub struct FundAccountRequest {
    pub contact_id: String,
    pub account_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bank_account: Option<BankAccountDetails>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vpa: Option<VpaDetails>,
}

// ============================================================================
// ENTITIES
// ============================================================================

fn default_i64() -> i64 {
    0
}

#[derive(Debug, Clone, Deserialize)]
pub struct PayoutEntity {
    pub id: String,
    pub entity: String,
    pub status: String,
    #[serde(default)]
    pub utr: Option<String>,
    #[serde(default)]
    pub mode: Option<String>,
    #[serde(default)]
    pub reference_id: Option<String>,
    #[serde(default = "default_i64")]
    pub amount: i64,
    #[serde(default = "default_i64")]
    pub fees: i64,
    #[serde(default = "default_i64")]
    pub tax: i64,
    #[serde(default)]
    pub notes: HashMap<String, Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PayoutLinkEntity {
    pub id: String,
    pub entity: String,
    pub status: String,
    #[serde(default = "default_i64")]
    pub amount: i64,
    #[serde(default)]
    pub notes: HashMap<String, Value>,
}

/// Originating entity of a bank transaction: a payout, a reversal, or an
/// external bank transfer.
#[derive(Debug, Clone, Deserialize)]
pub struct TransactionSource {
    pub id: String,
    pub entity: String,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub utr: Option<String>,
    #[serde(default)]
    pub payout_id: Option<String>,
    #[serde(default)]
    pub mode: Option<String>,
    #[serde(default)]
    pub bank_reference: Option<String>,
    #[serde(default)]
    pub notes: HashMap<String, Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TransactionEntity {
    pub id: String,
    pub account_number: String,
    #[serde(default = "default_i64")]
    pub amount: i64,
    #[serde(default = "default_i64")]
    pub debit: i64,
    #[serde(default = "default_i64")]
    pub credit: i64,
    #[serde(default = "default_i64")]
    pub balance: i64,
    /// Epoch seconds.
    pub created_at: i64,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub source: Option<TransactionSource>,
}
