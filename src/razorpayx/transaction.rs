//! Bank account statement (transactions) resource operations.

use std::collections::HashMap;

use chrono::{NaiveDate, Utc};
use serde_json::Value;

use crate::error::{EngineError, EngineResult};
use crate::razorpayx::types::TransactionEntity;
use crate::razorpayx::{CallOptions, RazorpayXClient};
use crate::util::{end_of_day_epoch, start_of_day_epoch};

impl RazorpayXClient {
    pub async fn fetch_transaction(&self, transaction_id: &str) -> EngineResult<TransactionEntity> {
        let response = self
            .get(
                &["transactions", transaction_id],
                None,
                CallOptions::default(),
            )
            .await?;
        serde_json::from_value(response).map_err(|e| EngineError::Provider {
            status_code: 200,
            message: format!("Unexpected Provider response shape: {e}"),
        })
    }

    /// Transactions for the configured account, optionally bounded by an
    /// inclusive date window.
    pub async fn list_transactions(
        &self,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
        count: Option<i64>,
    ) -> EngineResult<Vec<TransactionEntity>> {
        if self.config().account_number.is_empty() {
            return Err(EngineError::validation(
                "RazorpayX account number is mandatory for transaction listing",
            ));
        }
        let mut filters: HashMap<String, Value> = HashMap::from([(
            "account_number".to_string(),
            Value::from(self.config().account_number.clone()),
        )]);
        if let Some(from) = from {
            filters.insert("from".to_string(), Value::from(start_of_day_epoch(from)));
        }
        if let Some(to) = to {
            filters.insert("to".to_string(), Value::from(end_of_day_epoch(to)));
        }

        let items = self
            .get_all(&["transactions"], filters, count, CallOptions::default())
            .await?;
        items
            .into_iter()
            .map(|item| {
                serde_json::from_value(item).map_err(|e| EngineError::Provider {
                    status_code: 200,
                    message: format!("Unexpected Provider response shape: {e}"),
                })
            })
            .collect()
    }

    /// Transactions for a single day.
    pub async fn list_transactions_on(
        &self,
        date: NaiveDate,
        count: Option<i64>,
    ) -> EngineResult<Vec<TransactionEntity>> {
        self.list_transactions(Some(date), Some(date), count).await
    }

    /// Today's transactions (UTC).
    pub async fn list_transactions_today(
        &self,
        count: Option<i64>,
    ) -> EngineResult<Vec<TransactionEntity>> {
        self.list_transactions_on(Utc::now().date_naive(), count)
            .await
    }
}
