//! Narrow interfaces onto the surrounding ERP: document storage, secret
//! resolution, and integration request logging. The engine only ever touches
//! the ERP through these traits.

pub mod memory;

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::error::EngineResult;

pub use memory::{InMemoryLog, InMemorySecrets, InMemoryStore};

/// Docstatus values as used by the document store.
pub const DRAFT: i64 = 0;
pub const SUBMITTED: i64 = 1;
pub const CANCELLED: i64 = 2;

/// A stored document: a doctype, a name, a workflow docstatus, and a flat
/// bag of fields.
#[derive(Debug, Clone)]
pub struct Document {
    pub doctype: String,
    pub name: String,
    pub docstatus: i64,
    pub fields: serde_json::Map<String, Value>,
}

impl Document {
    pub fn new(doctype: impl Into<String>, name: impl Into<String>) -> Self {
        Document {
            doctype: doctype.into(),
            name: name.into(),
            docstatus: DRAFT,
            fields: serde_json::Map::new(),
        }
    }

    pub fn with_field(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.fields.insert(key.to_string(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.fields.get(key).and_then(Value::as_str)
    }

    pub fn get_f64(&self, key: &str) -> Option<f64> {
        self.fields.get(key).and_then(Value::as_f64)
    }

    /// True when the field is absent, null, or an empty string.
    pub fn is_unset(&self, key: &str) -> bool {
        match self.fields.get(key) {
            None | Some(Value::Null) => true,
            Some(Value::String(s)) => s.is_empty(),
            Some(_) => false,
        }
    }

    pub fn is_submitted(&self) -> bool {
        self.docstatus == SUBMITTED
    }
}

/// Filters for `find`. A `Value::Null` filter value matches documents where
/// the field is unset.
pub type Filters = HashMap<String, Value>;

/// Document CRUD plus the workflow transitions the engine drives.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn get(&self, doctype: &str, name: &str) -> EngineResult<Document>;

    /// Documents of `doctype` matching every filter, newest first.
    async fn find(&self, doctype: &str, filters: &Filters) -> EngineResult<Vec<Document>>;

    async fn get_value(&self, doctype: &str, name: &str, field: &str)
        -> EngineResult<Option<Value>>;

    async fn set_values(
        &self,
        doctype: &str,
        name: &str,
        values: HashMap<String, Value>,
    ) -> EngineResult<()>;

    async fn insert(&self, doc: Document) -> EngineResult<Document>;

    async fn submit(&self, doctype: &str, name: &str) -> EngineResult<()>;

    async fn cancel(&self, doctype: &str, name: &str) -> EngineResult<()>;

    /// The document that amends `name`, if any.
    async fn amended_successor(&self, doctype: &str, name: &str) -> EngineResult<Option<String>>;

    async fn exists(&self, doctype: &str, filters: &Filters) -> EngineResult<bool>;
}

/// Resolves webhook signing secrets per Provider account.
#[async_trait]
pub trait SecretStore: Send + Sync {
    async fn webhook_secret(&self, account_name: &str) -> EngineResult<Option<String>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestOutcome {
    Queued,
    Completed,
    Failed,
    Cancelled,
}

impl RequestOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            RequestOutcome::Queued => "Queued",
            RequestOutcome::Completed => "Completed",
            RequestOutcome::Failed => "Failed",
            RequestOutcome::Cancelled => "Cancelled",
        }
    }
}

/// One recorded interaction with the Provider, outbound or inbound.
#[derive(Debug, Clone)]
pub struct IntegrationRequest {
    pub service: String,
    pub request_id: Option<String>,
    pub url: Option<String>,
    pub request_headers: Option<Value>,
    pub payload: Option<Value>,
    pub response: Option<Value>,
    pub outcome: RequestOutcome,
    pub error: Option<String>,
    pub recorded_at: DateTime<Utc>,
}

/// Audit sink for Provider traffic. Implementations must never fail the
/// calling flow.
#[async_trait]
pub trait IntegrationLog: Send + Sync {
    async fn record(&self, entry: IntegrationRequest);
}
