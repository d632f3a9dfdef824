//! In-memory `DocumentStore` / `SecretStore` / `IntegrationLog`
//! implementations, used by the bundled server and the test suite.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, RwLock};

use async_trait::async_trait;
use serde_json::Value;

use crate::erp::{
    Document, DocumentStore, Filters, IntegrationLog, IntegrationRequest, SecretStore, CANCELLED,
    DRAFT, SUBMITTED,
};
use crate::error::{EngineError, EngineResult};
use crate::models::fields;

#[derive(Debug, Clone)]
struct StoredDoc {
    doc: Document,
    seq: u64,
}

/// Document store backed by a process-local map. Ordering for `find` is
/// newest insertion first.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    docs: RwLock<HashMap<(String, String), StoredDoc>>,
    counter: AtomicU64,
}

impl InMemoryStore {
    pub fn new() -> Self {
        InMemoryStore::default()
    }

    /// Seed a document directly, used by server bootstrap and tests.
    pub fn seed(&self, doc: Document) {
        let seq = self.counter.fetch_add(1, Ordering::SeqCst);
        let key = (doc.doctype.clone(), doc.name.clone());
        self.docs
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key, StoredDoc { doc, seq });
    }

    fn matches(doc: &Document, filters: &Filters) -> bool {
        filters.iter().all(|(field, expected)| {
            if field == "docstatus" {
                return expected.as_i64() == Some(doc.docstatus);
            }
            match expected {
                Value::Null => doc.is_unset(field),
                other => doc.get(field) == Some(other),
            }
        })
    }
}

#[async_trait]
impl DocumentStore for InMemoryStore {
    async fn get(&self, doctype: &str, name: &str) -> EngineResult<Document> {
        let docs = self.docs.read().unwrap_or_else(|e| e.into_inner());
        docs.get(&(doctype.to_string(), name.to_string()))
            .map(|s| s.doc.clone())
            .ok_or_else(|| EngineError::validation(format!("{doctype} {name} not found")))
    }

    async fn find(&self, doctype: &str, filters: &Filters) -> EngineResult<Vec<Document>> {
        let docs = self.docs.read().unwrap_or_else(|e| e.into_inner());
        let mut found: Vec<&StoredDoc> = docs
            .values()
            .filter(|s| s.doc.doctype == doctype && Self::matches(&s.doc, filters))
            .collect();
        found.sort_by(|a, b| b.seq.cmp(&a.seq));
        Ok(found.into_iter().map(|s| s.doc.clone()).collect())
    }

    async fn get_value(
        &self,
        doctype: &str,
        name: &str,
        field: &str,
    ) -> EngineResult<Option<Value>> {
        let doc = self.get(doctype, name).await?;
        Ok(doc.get(field).cloned())
    }

    async fn set_values(
        &self,
        doctype: &str,
        name: &str,
        values: HashMap<String, Value>,
    ) -> EngineResult<()> {
        let mut docs = self.docs.write().unwrap_or_else(|e| e.into_inner());
        let stored = docs
            .get_mut(&(doctype.to_string(), name.to_string()))
            .ok_or_else(|| EngineError::validation(format!("{doctype} {name} not found")))?;
        for (field, value) in values {
            stored.doc.fields.insert(field, value);
        }
        Ok(())
    }

    async fn insert(&self, doc: Document) -> EngineResult<Document> {
        let key = (doc.doctype.clone(), doc.name.clone());
        let mut docs = self.docs.write().unwrap_or_else(|e| e.into_inner());
        if docs.contains_key(&key) {
            return Err(EngineError::validation(format!(
                "{} {} already exists",
                doc.doctype, doc.name
            )));
        }
        let seq = self.counter.fetch_add(1, Ordering::SeqCst);
        docs.insert(
            key,
            StoredDoc {
                doc: doc.clone(),
                seq,
            },
        );
        Ok(doc)
    }

    async fn submit(&self, doctype: &str, name: &str) -> EngineResult<()> {
        let mut docs = self.docs.write().unwrap_or_else(|e| e.into_inner());
        let stored = docs
            .get_mut(&(doctype.to_string(), name.to_string()))
            .ok_or_else(|| EngineError::validation(format!("{doctype} {name} not found")))?;
        if stored.doc.docstatus != DRAFT {
            return Err(EngineError::validation(format!(
                "{doctype} {name} is not a draft"
            )));
        }
        stored.doc.docstatus = SUBMITTED;
        Ok(())
    }

    async fn cancel(&self, doctype: &str, name: &str) -> EngineResult<()> {
        let mut docs = self.docs.write().unwrap_or_else(|e| e.into_inner());
        let stored = docs
            .get_mut(&(doctype.to_string(), name.to_string()))
            .ok_or_else(|| EngineError::validation(format!("{doctype} {name} not found")))?;
        if stored.doc.docstatus != SUBMITTED {
            return Err(EngineError::validation(format!(
                "{doctype} {name} is not submitted"
            )));
        }
        stored.doc.docstatus = CANCELLED;
        Ok(())
    }

    async fn amended_successor(&self, doctype: &str, name: &str) -> EngineResult<Option<String>> {
        let docs = self.docs.read().unwrap_or_else(|e| e.into_inner());
        Ok(docs
            .values()
            .find(|s| {
                s.doc.doctype == doctype && s.doc.get_str(fields::AMENDED_FROM) == Some(name)
            })
            .map(|s| s.doc.name.clone()))
    }

    async fn exists(&self, doctype: &str, filters: &Filters) -> EngineResult<bool> {
        Ok(!self.find(doctype, filters).await?.is_empty())
    }
}

/// Secrets keyed by Provider account name.
#[derive(Debug, Default)]
pub struct InMemorySecrets {
    secrets: RwLock<HashMap<String, String>>,
}

impl InMemorySecrets {
    pub fn new() -> Self {
        InMemorySecrets::default()
    }

    pub fn set(&self, account_name: impl Into<String>, secret: impl Into<String>) {
        self.secrets
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(account_name.into(), secret.into());
    }
}

#[async_trait]
impl SecretStore for InMemorySecrets {
    async fn webhook_secret(&self, account_name: &str) -> EngineResult<Option<String>> {
        Ok(self
            .secrets
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(account_name)
            .cloned())
    }
}

/// Audit log kept in memory, inspectable from tests.
#[derive(Debug, Default)]
pub struct InMemoryLog {
    entries: Mutex<Vec<IntegrationRequest>>,
}

impl InMemoryLog {
    pub fn new() -> Self {
        InMemoryLog::default()
    }

    pub fn entries(&self) -> Vec<IntegrationRequest> {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

#[async_trait]
impl IntegrationLog for InMemoryLog {
    async fn record(&self, entry: IntegrationRequest) {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(entry);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn find_returns_newest_first() {
        let store = InMemoryStore::new();
        store.seed(Document::new("Payment Entry", "PE-0001").with_field("payout_id", "pout_A"));
        store.seed(Document::new("Payment Entry", "PE-0002").with_field("payout_id", "pout_A"));

        let filters: Filters =
            HashMap::from([("payout_id".to_string(), Value::from("pout_A"))]);
        let found = store.find("Payment Entry", &filters).await.unwrap();
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].name, "PE-0002");
    }

    #[tokio::test]
    async fn null_filter_matches_unset_field() {
        let store = InMemoryStore::new();
        store.seed(Document::new("Payment Entry", "PE-0001").with_field("clearance_date", ""));
        store.seed(
            Document::new("Payment Entry", "PE-0002").with_field("clearance_date", "2026-08-01"),
        );

        let filters: Filters = HashMap::from([("clearance_date".to_string(), Value::Null)]);
        let found = store.find("Payment Entry", &filters).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].name, "PE-0001");
    }

    #[tokio::test]
    async fn amended_successor_walks_one_hop() {
        let store = InMemoryStore::new();
        store.seed(Document::new("Payment Entry", "PE-0001"));
        store.seed(Document::new("Payment Entry", "PE-0001-1").with_field("amended_from", "PE-0001"));

        let next = store
            .amended_successor("Payment Entry", "PE-0001")
            .await
            .unwrap();
        assert_eq!(next.as_deref(), Some("PE-0001-1"));
        let end = store
            .amended_successor("Payment Entry", "PE-0001-1")
            .await
            .unwrap();
        assert_eq!(end, None);
    }
}
