//! Payout fee accounting. When a payout is processed with nonzero fees, a
//! journal entry books the fee against the payout bank account, exactly
//! once per UTR.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::{json, Value};
use tracing::info;
use uuid::Uuid;

use crate::erp::{Document, DocumentStore, Filters};
use crate::error::EngineResult;
use crate::models::fields;
use crate::util::paisa_to_rupees;

pub fn fee_remark(utr: &str) -> String {
    format!("Payout Fees for UTR {utr}")
}

pub struct FeeJournal {
    store: Arc<dyn DocumentStore>,
    expense_account: String,
    bank_account: String,
}

impl FeeJournal {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        expense_account: impl Into<String>,
        bank_account: impl Into<String>,
    ) -> Self {
        FeeJournal {
            store,
            expense_account: expense_account.into(),
            bank_account: bank_account.into(),
        }
    }

    /// Book the fee journal entry for a processed payout. Returns the new
    /// entry name, or `None` when one already exists for this UTR.
    pub async fn record(
        &self,
        payout_id: &str,
        utr: &str,
        fees_paisa: i64,
        tax_paisa: i64,
    ) -> EngineResult<Option<String>> {
        let remark = fee_remark(utr);
        let existing: Filters =
            HashMap::from([("user_remark".to_string(), Value::from(remark.clone()))]);
        if self.store.exists("Journal Entry", &existing).await? {
            return Ok(None);
        }

        let fees = paisa_to_rupees(fees_paisa);
        let tax = paisa_to_rupees(tax_paisa);
        let name = format!("JE-{}", Uuid::new_v4());
        let entry = Document::new("Journal Entry", name.clone())
            .with_field("voucher_type", "Bank Entry")
            .with_field(fields::CHEQUE_NO, payout_id)
            .with_field("user_remark", remark)
            .with_field("tax_amount", tax)
            .with_field(
                "accounts",
                json!([
                    {"account": self.expense_account, "debit": fees, "credit": 0.0},
                    {"account": self.bank_account, "debit": 0.0, "credit": fees},
                ]),
            );
        self.store.insert(entry).await?;
        self.store.submit("Journal Entry", &name).await?;
        info!(payout_id = %payout_id, utr = %utr, journal_entry = %name, "payout fees booked");
        Ok(Some(name))
    }
}
