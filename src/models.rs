//! Domain model for payout orchestration and webhook reconciliation.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Written as `reference_no` before the payout settles; replaced by the real
/// UTR during reconciliation.
pub const UTR_PLACEHOLDER: &str = "*** UTR WILL BE SET AUTOMATICALLY ***";

/// IMPS transfers are only offered up to this amount (rupees).
pub const IMPS_LIMIT_RUPEES: f64 = 500_000.0;
/// Above this amount (rupees) a bank payout goes out as RTGS instead of NEFT.
pub const NEFT_LIMIT_RUPEES: f64 = 200_000.0;

/// Field names this engine reads/writes on the source document. The document
/// itself is owned by the surrounding ERP.
pub mod fields {
    pub const PAYOUT_ID: &str = "payout_id";
    pub const PAYOUT_LINK_ID: &str = "payout_link_id";
    pub const PAYOUT_STATUS: &str = "payout_status";
    pub const REFERENCE_NO: &str = "reference_no";
    pub const REMARKS: &str = "remarks";
    pub const AMENDED_FROM: &str = "amended_from";
    pub const CLEARANCE_DATE: &str = "clearance_date";

    pub const PAYMENT_TYPE: &str = "payment_type";
    pub const MAKE_ONLINE_PAYMENT: &str = "make_online_payment";
    pub const TRANSFER_METHOD: &str = "transfer_method";
    pub const PAID_AMOUNT: &str = "paid_amount";
    pub const PARTY_TYPE: &str = "party_type";
    pub const PARTY: &str = "party";
    pub const PARTY_NAME: &str = "party_name";
    pub const CONTACT_MOBILE: &str = "contact_mobile";
    pub const CONTACT_EMAIL: &str = "contact_email";
    pub const PARTY_BANK_ACCOUNT_NO: &str = "party_bank_account_no";
    pub const PARTY_BANK_IFSC: &str = "party_bank_ifsc";
    pub const PARTY_UPI_ADDRESS: &str = "party_upi_address";
    pub const PAYOUT_DESCRIPTION: &str = "payout_description";
    pub const PAY_INSTANTANEOUSLY: &str = "pay_instantaneously";
    pub const CHEQUE_NO: &str = "cheque_no";
}

// ============================================================================
// PAYOUT STATUS
// ============================================================================

/// Payout lifecycle status mirrored onto the source document.
///
/// The order value drives the reconciliation invariant: an incoming webhook
/// status is applied only if its order is strictly greater than the
/// document's current order. The four order-5 statuses form one terminal
/// class and never overwrite each other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PayoutStatus {
    NotInitiated,
    Pending,
    Queued,
    Processing,
    Processed,
    Cancelled,
    Failed,
    Rejected,
    Reversed,
}

impl PayoutStatus {
    pub fn order(self) -> u8 {
        match self {
            PayoutStatus::NotInitiated => 1,
            PayoutStatus::Pending => 2,
            PayoutStatus::Queued => 3,
            PayoutStatus::Processing => 4,
            PayoutStatus::Processed
            | PayoutStatus::Cancelled
            | PayoutStatus::Failed
            | PayoutStatus::Rejected => 5,
            PayoutStatus::Reversed => 6,
        }
    }

    /// Parse a wire status. `initiated` shares the `processing` order class
    /// and normalizes to it.
    pub fn from_wire(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "not initiated" | "not_initiated" => Some(PayoutStatus::NotInitiated),
            "pending" => Some(PayoutStatus::Pending),
            "queued" => Some(PayoutStatus::Queued),
            "processing" | "initiated" => Some(PayoutStatus::Processing),
            "processed" => Some(PayoutStatus::Processed),
            "cancelled" => Some(PayoutStatus::Cancelled),
            "failed" => Some(PayoutStatus::Failed),
            "rejected" => Some(PayoutStatus::Rejected),
            "reversed" => Some(PayoutStatus::Reversed),
            _ => None,
        }
    }

    /// Title-cased form written to the source document.
    pub fn as_title(self) -> &'static str {
        match self {
            PayoutStatus::NotInitiated => "Not Initiated",
            PayoutStatus::Pending => "Pending",
            PayoutStatus::Queued => "Queued",
            PayoutStatus::Processing => "Processing",
            PayoutStatus::Processed => "Processed",
            PayoutStatus::Cancelled => "Cancelled",
            PayoutStatus::Failed => "Failed",
            PayoutStatus::Rejected => "Rejected",
            PayoutStatus::Reversed => "Reversed",
        }
    }

    /// Monotonic-forward gate: apply `incoming` only when it moves the
    /// document strictly ahead.
    pub fn allows_update_to(self, incoming: PayoutStatus) -> bool {
        incoming.order() > self.order()
    }

    /// Cancelled/failed/rejected trigger compensating cancellation of the
    /// source document.
    pub fn is_terminal_failure(self) -> bool {
        matches!(
            self,
            PayoutStatus::Cancelled | PayoutStatus::Failed | PayoutStatus::Rejected
        )
    }
}

/// Payout-link lifecycle. Tracked transiently during cancellation checks
/// only; no ordering guarantee is persisted for links.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayoutLinkStatus {
    Pending,
    Issued,
    Processing,
    Processed,
    Attempted,
    Cancelled,
    Rejected,
    Expired,
}

impl PayoutLinkStatus {
    pub fn from_wire(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "pending" => Some(PayoutLinkStatus::Pending),
            "issued" => Some(PayoutLinkStatus::Issued),
            "processing" => Some(PayoutLinkStatus::Processing),
            "processed" => Some(PayoutLinkStatus::Processed),
            "attempted" => Some(PayoutLinkStatus::Attempted),
            "cancelled" => Some(PayoutLinkStatus::Cancelled),
            "rejected" => Some(PayoutLinkStatus::Rejected),
            "expired" => Some(PayoutLinkStatus::Expired),
            _ => None,
        }
    }

    /// Links in these states are already dead; cancelling them again is a
    /// no-op.
    pub fn is_cancelled_class(self) -> bool {
        matches!(
            self,
            PayoutLinkStatus::Cancelled | PayoutLinkStatus::Expired | PayoutLinkStatus::Rejected
        )
    }
}

// ============================================================================
// MODES AND CHANNELS
// ============================================================================

/// Payment mode as selected on the source document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserPayoutMode {
    /// NEFT/RTGS/IMPS, picked at request-build time from the amount.
    Bank,
    Upi,
    Link,
}

impl UserPayoutMode {
    pub fn from_field(s: &str) -> Option<Self> {
        match s {
            "NEFT/RTGS" | "Bank" | "NEFT" | "RTGS" | "IMPS" => Some(UserPayoutMode::Bank),
            "UPI" => Some(UserPayoutMode::Upi),
            "Link" => Some(UserPayoutMode::Link),
            _ => None,
        }
    }
}

/// Wire-level transfer mode sent to the Provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayoutMode {
    Neft,
    Rtgs,
    Imps,
    Upi,
    Link,
}

impl PayoutMode {
    pub fn as_wire(self) -> &'static str {
        match self {
            PayoutMode::Neft => "NEFT",
            PayoutMode::Rtgs => "RTGS",
            PayoutMode::Imps => "IMPS",
            PayoutMode::Upi => "UPI",
            PayoutMode::Link => "Link",
        }
    }
}

/// The three supported payout channels. Closed set: the single call site in
/// the orchestrator matches exhaustively.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayoutChannel {
    CompositeBankAccount,
    CompositeUpi,
    LinkContactDetails,
}

impl From<UserPayoutMode> for PayoutChannel {
    fn from(mode: UserPayoutMode) -> Self {
        match mode {
            UserPayoutMode::Bank => PayoutChannel::CompositeBankAccount,
            UserPayoutMode::Upi => PayoutChannel::CompositeUpi,
            UserPayoutMode::Link => PayoutChannel::LinkContactDetails,
        }
    }
}

/// Resolve NEFT vs RTGS vs IMPS for a bank payout.
pub fn bank_transfer_mode(amount_rupees: f64, pay_instantaneously: bool) -> PayoutMode {
    if pay_instantaneously && amount_rupees <= IMPS_LIMIT_RUPEES {
        PayoutMode::Imps
    } else if amount_rupees > NEFT_LIMIT_RUPEES {
        PayoutMode::Rtgs
    } else {
        PayoutMode::Neft
    }
}

/// Provider contact type for a party type.
pub fn contact_type_for(party_type: &str) -> &'static str {
    match party_type {
        "Employee" => "employee",
        "Supplier" => "vendor",
        "Customer" => "customer",
        _ => "self",
    }
}

/// Default payout purpose for a party type.
pub fn purpose_for(party_type: &str) -> &'static str {
    match party_type {
        "Customer" => "refund",
        "Employee" => "salary",
        "Supplier" => "vendor_bill",
        _ => "payout",
    }
}

// ============================================================================
// PAYOUT REQUEST AND CONTEXT
// ============================================================================

/// Transient "pay this party" intent, built per call from the source
/// document. Exactly one of bank details / UPI address is used, selected by
/// the channel.
#[derive(Debug, Clone, Default)]
pub struct PayoutRequest {
    /// Amount in rupees; converted to paisa once at the wire boundary.
    pub amount: f64,
    pub party_type: String,
    pub party_name: String,
    pub party_id: Option<String>,
    pub party_mobile: Option<String>,
    pub party_email: Option<String>,
    pub bank_account_no: Option<String>,
    pub bank_ifsc: Option<String>,
    pub upi_address: Option<String>,
    pub description: Option<String>,
    pub purpose: Option<String>,
    pub reference_id: Option<String>,
    pub source_doctype: String,
    pub source_docname: String,
    pub pay_instantaneously: bool,
    pub notes: HashMap<String, String>,
}

impl PayoutRequest {
    /// `reference_id` defaults to `{doctype}-{docname}`.
    pub fn reference_id(&self) -> String {
        self.reference_id
            .clone()
            .unwrap_or_else(|| format!("{}-{}", self.source_doctype, self.source_docname))
    }

    /// Notes always carry the source correlation keys; caller notes are
    /// merged on top.
    pub fn wire_notes(&self) -> HashMap<String, String> {
        let mut notes = HashMap::new();
        notes.insert("source_doctype".to_string(), self.source_doctype.clone());
        notes.insert("source_docname".to_string(), self.source_docname.clone());
        notes.extend(self.notes.clone());
        notes
    }
}

/// Who kicked off the current operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitiatedBy {
    User,
    Scheduler,
    Webhook,
}

/// Explicit call context threaded through the orchestrator instead of
/// ambient process-wide flags.
#[derive(Debug, Clone)]
pub struct PayoutContext {
    pub initiated_by: InitiatedBy,
    /// Set when the document is being cancelled because the Provider already
    /// cancelled/failed the payout; suppresses the remote cancel call the
    /// document's own cancel hook would otherwise trigger.
    pub skip_remote_cancel: bool,
    /// Human-confirmation token minted by the external OTP/password flow.
    pub auth_token: Option<String>,
}

impl PayoutContext {
    pub fn user(auth_token: impl Into<String>) -> Self {
        PayoutContext {
            initiated_by: InitiatedBy::User,
            skip_remote_cancel: false,
            auth_token: Some(auth_token.into()),
        }
    }

    pub fn scheduler() -> Self {
        PayoutContext {
            initiated_by: InitiatedBy::Scheduler,
            skip_remote_cancel: false,
            auth_token: None,
        }
    }

    pub fn webhook() -> Self {
        PayoutContext {
            initiated_by: InitiatedBy::Webhook,
            skip_remote_cancel: true,
            auth_token: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_order_is_total() {
        use PayoutStatus::*;
        assert!(NotInitiated.order() < Pending.order());
        assert!(Pending.order() < Queued.order());
        assert!(Queued.order() < Processing.order());
        assert!(Processing.order() < Processed.order());
        assert_eq!(Processed.order(), Failed.order());
        assert!(Processed.order() < Reversed.order());
    }

    #[test]
    fn stale_status_is_rejected() {
        assert!(!PayoutStatus::Processed.allows_update_to(PayoutStatus::Queued));
        assert!(PayoutStatus::Queued.allows_update_to(PayoutStatus::Processed));
        // terminal class members never overwrite each other
        assert!(!PayoutStatus::Failed.allows_update_to(PayoutStatus::Processed));
        assert!(PayoutStatus::Processed.allows_update_to(PayoutStatus::Reversed));
    }

    #[test]
    fn initiated_normalizes_to_processing() {
        assert_eq!(
            PayoutStatus::from_wire("initiated"),
            Some(PayoutStatus::Processing)
        );
    }

    #[test]
    fn bank_mode_resolution() {
        assert_eq!(bank_transfer_mode(1_000.0, true), PayoutMode::Imps);
        assert_eq!(bank_transfer_mode(600_000.0, true), PayoutMode::Rtgs);
        assert_eq!(bank_transfer_mode(600_000.0, false), PayoutMode::Rtgs);
        assert_eq!(bank_transfer_mode(1_000.0, false), PayoutMode::Neft);
    }
}
