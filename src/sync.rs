//! Bank transaction sync: pulls account statement entries from the
//! Provider, inserts the ones not seen before, and attaches reconciliation
//! candidates.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::erp::{Document, DocumentStore, Filters};
use crate::error::EngineResult;
use crate::models::fields;
use crate::razorpayx::types::{TransactionEntity, TransactionSource};
use crate::razorpayx::RazorpayXClient;
use crate::util::paisa_to_rupees;

#[derive(Debug, Default, Clone, Copy)]
pub struct SyncSummary {
    pub inserted: usize,
    pub skipped: usize,
    pub failed: usize,
}

pub struct BankTransactionSync {
    store: Arc<dyn DocumentStore>,
    client: RazorpayXClient,
    bank_account: String,
}

impl BankTransactionSync {
    pub fn new(store: Arc<dyn DocumentStore>, client: RazorpayXClient) -> Self {
        let bank_account = client.config().bank_account.clone();
        BankTransactionSync {
            store,
            client,
            bank_account,
        }
    }

    /// Pull and ingest all transactions in an inclusive date window. One
    /// bad record never aborts the batch.
    pub async fn sync_window(
        &self,
        from: NaiveDate,
        to: NaiveDate,
    ) -> EngineResult<SyncSummary> {
        let transactions = self.client.list_transactions(Some(from), Some(to), None).await?;
        let mut summary = SyncSummary::default();
        for transaction in &transactions {
            match self.ingest(transaction).await {
                Ok(Some(_)) => summary.inserted += 1,
                Ok(None) => summary.skipped += 1,
                Err(e) => {
                    summary.failed += 1;
                    warn!(
                        transaction_id = %transaction.id,
                        error = %e,
                        "bank transaction skipped"
                    );
                }
            }
        }
        info!(
            from = %from,
            to = %to,
            inserted = summary.inserted,
            skipped = summary.skipped,
            failed = summary.failed,
            "bank transaction sync finished"
        );
        Ok(summary)
    }

    /// Daily scheduler entry point: sync yesterday through today and record
    /// the sync date on the account configuration document if one exists.
    pub async fn sync_daily(&self) -> EngineResult<SyncSummary> {
        let today = Utc::now().date_naive();
        let yesterday = today - Duration::days(1);
        let summary = self.sync_window(yesterday, today).await?;

        let values: HashMap<String, Value> =
            HashMap::from([("last_sync_on".to_string(), Value::from(today.to_string()))]);
        if let Err(e) = self
            .store
            .set_values("RazorpayX Configuration", &self.client.config().name, values)
            .await
        {
            warn!(error = %e, "could not record last sync date");
        }
        Ok(summary)
    }

    /// Insert one statement entry unless it is already present for this
    /// bank account. Returns the new record name.
    pub async fn ingest(&self, transaction: &TransactionEntity) -> EngineResult<Option<String>> {
        let dedup: Filters = HashMap::from([
            (
                "transaction_id".to_string(),
                Value::from(transaction.id.clone()),
            ),
            (
                "bank_account".to_string(),
                Value::from(self.bank_account.clone()),
            ),
        ]);
        if self.store.exists("Bank Transaction", &dedup).await? {
            return Ok(None);
        }

        let date = DateTime::from_timestamp(transaction.created_at, 0)
            .map(|dt| dt.date_naive().to_string())
            .unwrap_or_default();
        let source = transaction.source.as_ref();
        let reference_number = source.and_then(reference_number_for);

        let mut record = Document::new("Bank Transaction", transaction.id.clone())
            .with_field("transaction_id", transaction.id.clone())
            .with_field("bank_account", self.bank_account.clone())
            .with_field("date", date)
            .with_field("deposit", paisa_to_rupees(transaction.credit))
            .with_field("withdrawal", paisa_to_rupees(transaction.debit))
            .with_field("closing_balance", paisa_to_rupees(transaction.balance))
            .with_field(
                "currency",
                transaction.currency.clone().unwrap_or_else(|| "INR".to_string()),
            )
            .with_field(
                "transaction_type",
                source.and_then(|s| s.mode.clone()).unwrap_or_default(),
            )
            .with_field("description", describe(source));
        if let Some(reference) = &reference_number {
            record = record.with_field("reference_number", reference.clone());
        }

        let mut candidates = Vec::new();
        if let Some(source) = source {
            if let Some(payment) = self.match_payment(source).await? {
                candidates.push(json!({
                    "payment_document": "Payment Entry",
                    "payment_entry": payment,
                }));
            }
            if let Some(journal) = self.match_journal(source).await? {
                candidates.push(json!({
                    "payment_document": "Journal Entry",
                    "payment_entry": journal,
                }));
            }
        }
        if !candidates.is_empty() {
            record = record.with_field("payment_entries", Value::Array(candidates));
        }

        let inserted = self.store.insert(record).await?;
        self.store.submit("Bank Transaction", &inserted.name).await?;
        Ok(Some(inserted.name))
    }

    /// The Provider creates statement entries while a payout is still
    /// processing, before the UTR exists. Patch the reference number onto
    /// the already-synced record once a later event carries it.
    pub async fn backfill_reference(
        &self,
        transaction_id: &str,
        utr: &str,
    ) -> EngineResult<bool> {
        let Ok(record) = self.store.get("Bank Transaction", transaction_id).await else {
            return Ok(false);
        };
        if record.get_str("reference_number") == Some(utr) {
            return Ok(false);
        }
        let values: HashMap<String, Value> =
            HashMap::from([("reference_number".to_string(), Value::from(utr))]);
        self.store
            .set_values("Bank Transaction", transaction_id, values)
            .await?;
        Ok(true)
    }

    /// Submitted, not-yet-cleared payment document carrying this payout id
    /// or the UTR as reference number. Reversals never match a payment.
    async fn match_payment(&self, source: &TransactionSource) -> EngineResult<Option<String>> {
        if source.entity == "reversal" {
            return Ok(None);
        }
        let payout_id = match source.entity.as_str() {
            "payout" => source.id.clone(),
            _ => return Ok(None),
        };

        let mut filters: Filters = HashMap::from([
            ("docstatus".to_string(), Value::from(1)),
            (fields::CLEARANCE_DATE.to_string(), Value::Null),
            (fields::PAYOUT_ID.to_string(), Value::from(payout_id)),
        ]);
        if let Some(doc) = self.store.find("Payment Entry", &filters).await?.into_iter().next() {
            return Ok(Some(doc.name));
        }

        if let Some(utr) = &source.utr {
            filters.remove(fields::PAYOUT_ID);
            filters.insert(fields::REFERENCE_NO.to_string(), Value::from(utr.clone()));
            if let Some(doc) = self.store.find("Payment Entry", &filters).await?.into_iter().next()
            {
                return Ok(Some(doc.name));
            }
        }
        Ok(None)
    }

    /// Submitted, balanced journal entry whose cheque number matches any of
    /// the source identifiers.
    async fn match_journal(&self, source: &TransactionSource) -> EngineResult<Option<String>> {
        let mut keys: Vec<String> = vec![source.id.clone()];
        keys.extend(source.payout_id.clone());
        keys.extend(source.bank_reference.clone());
        keys.extend(source.utr.clone());

        for key in keys {
            let filters: Filters = HashMap::from([
                ("docstatus".to_string(), Value::from(1)),
                (fields::CHEQUE_NO.to_string(), Value::from(key)),
            ]);
            for doc in self.store.find("Journal Entry", &filters).await? {
                let debit = doc.get_f64("total_debit");
                let credit = doc.get_f64("total_credit");
                let balanced = match (debit, credit) {
                    (Some(debit), Some(credit)) => (debit - credit).abs() < f64::EPSILON,
                    _ => true,
                };
                if balanced {
                    return Ok(Some(doc.name));
                }
            }
        }
        Ok(None)
    }
}

fn reference_number_for(source: &TransactionSource) -> Option<String> {
    source
        .utr
        .clone()
        .or_else(|| source.bank_reference.clone())
}

fn describe(source: Option<&TransactionSource>) -> String {
    let Some(source) = source else {
        return String::new();
    };
    let mut parts = Vec::new();
    if let (Some(doctype), Some(docname)) = (
        source.notes.get("source_doctype").and_then(Value::as_str),
        source.notes.get("source_docname").and_then(Value::as_str),
    ) {
        parts.push(format!("{doctype}: {docname}"));
    }
    if let Some(narration) = source.notes.get("narration").and_then(Value::as_str) {
        parts.push(narration.to_string());
    }
    parts.join("\n")
}
