//! RazorpayX API client. This module holds the HTTP core; resource
//! operations live in the sibling files as further `impl` blocks on
//! [`RazorpayXClient`].

pub mod contact;
pub mod payout;
pub mod transaction;
pub mod types;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{NaiveDate, Utc};
use reqwest::Client;
use serde_json::Value;
use tracing::warn;

use crate::config::ProviderConfig;
use crate::erp::{IntegrationLog, IntegrationRequest, RequestOutcome};
use crate::error::{EngineError, EngineResult};

const PAGE_SIZE: i64 = 100;
const MASKED: &str = "*****";

/// Known Provider error strings translated to actionable messages.
fn translate_provider_error(message: &str) -> String {
    match message {
        "Different request body sent for the same Idempotency Header" => {
            "A different payout was already created for this document. \
             Cancel the document and pay with a new one."
                .to_string()
        }
        "Authentication failed" => {
            "RazorpayX authentication failed. Check the configured API key id and secret."
                .to_string()
        }
        "The RazorpayX Account number is invalid." => {
            "The configured RazorpayX account number is invalid.".to_string()
        }
        other => other.to_string(),
    }
}

/// Per-call options: extra headers, source-document correlation for the
/// integration log, and payload fields to mask before logging.
#[derive(Debug, Default, Clone)]
pub struct CallOptions {
    pub headers: Vec<(String, String)>,
    pub source: Option<(String, String)>,
    pub mask_fields: Vec<&'static str>,
}

impl CallOptions {
    pub fn for_source(doctype: &str, docname: &str) -> Self {
        CallOptions {
            source: Some((doctype.to_string(), docname.to_string())),
            ..CallOptions::default()
        }
    }

    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    pub fn mask(mut self, fields: &[&'static str]) -> Self {
        self.mask_fields.extend_from_slice(fields);
        self
    }
}

/// Authenticated client for one RazorpayX account.
#[derive(Clone)]
pub struct RazorpayXClient {
    config: Arc<ProviderConfig>,
    http: Client,
    log: Arc<dyn IntegrationLog>,
}

impl RazorpayXClient {
    pub fn new(config: Arc<ProviderConfig>, log: Arc<dyn IntegrationLog>) -> EngineResult<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| EngineError::ProviderUnreachable(e.to_string()))?;
        Ok(RazorpayXClient { config, http, log })
    }

    pub fn config(&self) -> &ProviderConfig {
        &self.config
    }

    fn url(&self, segments: &[&str]) -> String {
        let mut url = self.config.base_path.trim_end_matches('/').to_string();
        for segment in segments {
            url.push('/');
            url.push_str(segment.trim_matches('/'));
        }
        url
    }

    /// Execute one API call. Every call, successful or not, enqueues an
    /// integration-request log entry without blocking the caller.
    pub(crate) async fn request(
        &self,
        method: &str,
        segments: &[&str],
        params: Option<HashMap<String, Value>>,
        body: Option<Value>,
        opts: CallOptions,
    ) -> EngineResult<Value> {
        if !matches!(method, "GET" | "DELETE" | "POST" | "PUT" | "PATCH") {
            return Err(EngineError::validation(format!(
                "Unsupported HTTP method: {method}"
            )));
        }
        self.config.ensure_enabled()?;

        let url = self.url(segments);
        let params = params.map(clean_filters);

        let mut request = self
            .http
            .request(
                method.parse().map_err(|_| {
                    EngineError::validation(format!("Unsupported HTTP method: {method}"))
                })?,
                &url,
            )
            .basic_auth(&self.config.key_id, Some(&self.config.key_secret));
        for (name, value) in &opts.headers {
            request = request.header(name.as_str(), value.as_str());
        }
        if let Some(params) = &params {
            let query: Vec<(String, String)> = params
                .iter()
                .map(|(k, v)| (k.clone(), query_value(v)))
                .collect();
            request = request.query(&query);
        }
        if let Some(body) = &body {
            request = request.json(body);
        }

        // auth header is always masked in the log; per-call headers carry
        // docname-derived idempotency keys and are safe to keep
        let mut header_map = serde_json::Map::new();
        header_map.insert("Authorization".to_string(), Value::from(MASKED));
        for (name, value) in &opts.headers {
            header_map.insert(name.clone(), Value::from(value.clone()));
        }
        let logged_headers = Value::Object(header_map);
        let outcome = match request.send().await {
            Err(e) => {
                self.finalize_log(
                    &url,
                    logged_headers,
                    body,
                    None,
                    RequestOutcome::Failed,
                    Some(e.to_string()),
                    &opts,
                );
                return Err(EngineError::ProviderUnreachable(e.to_string()));
            }
            Ok(response) => response,
        };

        let status = outcome.status();
        let response_body: Value = outcome.json().await.unwrap_or(Value::Null);

        if status.as_u16() >= 400 {
            let raw = response_body
                .pointer("/error/description")
                .or_else(|| response_body.get("message"))
                .and_then(Value::as_str)
                .unwrap_or("Unknown Provider error")
                .to_string();
            let message = translate_provider_error(&raw);
            self.finalize_log(
                &url,
                logged_headers,
                body,
                Some(response_body),
                RequestOutcome::Failed,
                Some(message.clone()),
                &opts,
            );
            return Err(EngineError::Provider {
                status_code: status.as_u16(),
                message,
            });
        }

        self.finalize_log(
            &url,
            logged_headers,
            body,
            Some(response_body.clone()),
            RequestOutcome::Completed,
            None,
            &opts,
        );
        Ok(response_body)
    }

    pub(crate) async fn get(
        &self,
        segments: &[&str],
        params: Option<HashMap<String, Value>>,
        opts: CallOptions,
    ) -> EngineResult<Value> {
        self.request("GET", segments, params, None, opts).await
    }

    pub(crate) async fn post(
        &self,
        segments: &[&str],
        body: Value,
        opts: CallOptions,
    ) -> EngineResult<Value> {
        self.request("POST", segments, None, Some(body), opts).await
    }

    pub(crate) async fn patch(
        &self,
        segments: &[&str],
        body: Value,
        opts: CallOptions,
    ) -> EngineResult<Value> {
        self.request("PATCH", segments, None, Some(body), opts)
            .await
    }

    /// Paginated listing. A `count` of at most one page is a single call;
    /// otherwise pages of 100 are fetched until a short page arrives or the
    /// requested count is reached.
    pub(crate) async fn get_all(
        &self,
        segments: &[&str],
        filters: HashMap<String, Value>,
        count: Option<i64>,
        opts: CallOptions,
    ) -> EngineResult<Vec<Value>> {
        if let Some(count) = count {
            if count <= 0 {
                return Err(EngineError::validation(format!(
                    "Invalid count to fetch: {count}"
                )));
            }
        }

        let mut filters = clean_filters(filters);
        epoch_date_filters(&mut filters);

        if let Some(count) = count {
            if count <= PAGE_SIZE {
                filters.insert("count".to_string(), Value::from(count));
                let response = self.get(segments, Some(filters), opts).await?;
                return Ok(extract_items(&response));
            }
        }

        let mut items = Vec::new();
        let mut skip = 0_i64;
        loop {
            filters.insert("count".to_string(), Value::from(PAGE_SIZE));
            filters.insert("skip".to_string(), Value::from(skip));
            let response = self
                .get(segments, Some(filters.clone()), opts.clone())
                .await?;
            let page = extract_items(&response);
            let short_page = (page.len() as i64) < PAGE_SIZE;
            items.extend(page);
            if short_page || count.is_some_and(|c| (items.len() as i64) >= c) {
                break;
            }
            skip += PAGE_SIZE;
        }
        if let Some(count) = count {
            items.truncate(count as usize);
        }
        Ok(items)
    }

    #[allow(clippy::too_many_arguments)]
    fn finalize_log(
        &self,
        url: &str,
        request_headers: Value,
        payload: Option<Value>,
        response: Option<Value>,
        outcome: RequestOutcome,
        error: Option<String>,
        opts: &CallOptions,
    ) {
        let entry = IntegrationRequest {
            service: format!("RazorpayX - {}", self.config.name),
            request_id: opts.source.as_ref().map(|(_, name)| name.clone()),
            url: Some(url.to_string()),
            request_headers: Some(request_headers),
            payload: payload.map(|p| mask_fields(p, &opts.mask_fields)),
            response: response.map(|r| mask_fields(r, &opts.mask_fields)),
            outcome,
            error,
            recorded_at: Utc::now(),
        };
        let log = Arc::clone(&self.log);
        tokio::spawn(async move {
            log.record(entry).await;
        });
    }
}

/// `from`/`to` date filters travel as epoch seconds spanning the whole day.
/// Bounds already given as epochs pass through untouched.
fn epoch_date_filters(filters: &mut HashMap<String, Value>) {
    if let Some(epoch) = date_filter_epoch(filters.get("from"), crate::util::start_of_day_epoch) {
        filters.insert("from".to_string(), Value::from(epoch));
    }
    if let Some(epoch) = date_filter_epoch(filters.get("to"), crate::util::end_of_day_epoch) {
        filters.insert("to".to_string(), Value::from(epoch));
    }
}

fn date_filter_epoch(value: Option<&Value>, to_epoch: fn(NaiveDate) -> i64) -> Option<i64> {
    let date = value?.as_str()?.parse::<NaiveDate>().ok()?;
    Some(to_epoch(date))
}

/// Drop falsy filter values before transmission.
fn clean_filters(filters: HashMap<String, Value>) -> HashMap<String, Value> {
    filters
        .into_iter()
        .filter(|(_, v)| match v {
            Value::Null => false,
            Value::String(s) => !s.is_empty(),
            Value::Bool(b) => *b,
            Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
            _ => true,
        })
        .collect()
}

fn query_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn extract_items(response: &Value) -> Vec<Value> {
    match response.get("items").and_then(Value::as_array) {
        Some(items) => items.clone(),
        None => {
            warn!("Provider list response had no items array");
            Vec::new()
        }
    }
}

/// Replace named fields with a mask marker anywhere in the value tree.
/// Applied only when the log entry is finalized, never to the real request.
fn mask_fields(value: Value, fields: &[&'static str]) -> Value {
    if fields.is_empty() {
        return value;
    }
    match value {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(k, v)| {
                    if fields.contains(&k.as_str()) {
                        (k, Value::from(MASKED))
                    } else {
                        (k, mask_fields(v, fields))
                    }
                })
                .collect(),
        ),
        Value::Array(items) => Value::Array(
            items
                .into_iter()
                .map(|item| mask_fields(item, fields))
                .collect(),
        ),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn falsy_filters_are_dropped() {
        let filters = HashMap::from([
            ("name".to_string(), Value::from("Jane")),
            ("email".to_string(), Value::from("")),
            ("active".to_string(), Value::from(false)),
            ("skip".to_string(), Value::from(0)),
            ("count".to_string(), Value::from(50)),
        ]);
        let cleaned = clean_filters(filters);
        assert_eq!(cleaned.len(), 2);
        assert!(cleaned.contains_key("name"));
        assert!(cleaned.contains_key("count"));
    }

    #[test]
    fn date_filters_travel_as_epoch_seconds() {
        let mut filters = HashMap::from([
            ("from".to_string(), Value::from("2024-05-30")),
            ("to".to_string(), Value::from("2024-05-30")),
            ("type".to_string(), Value::from("employee")),
        ]);
        epoch_date_filters(&mut filters);
        let from = filters["from"].as_i64().unwrap();
        let to = filters["to"].as_i64().unwrap();
        assert_eq!(to - from, 86_399);
        assert_eq!(filters["type"], Value::from("employee"));

        let mut numeric = HashMap::from([("from".to_string(), Value::from(1_700_000_000))]);
        epoch_date_filters(&mut numeric);
        assert_eq!(numeric["from"], Value::from(1_700_000_000));
    }

    #[test]
    fn masking_reaches_nested_fields() {
        let payload = json!({
            "fund_account": {
                "bank_account": {"account_number": "000111222", "ifsc": "HDFC0000001"}
            },
            "amount": 50000
        });
        let masked = mask_fields(payload, &["account_number"]);
        assert_eq!(
            masked["fund_account"]["bank_account"]["account_number"],
            Value::from(MASKED)
        );
        assert_eq!(masked["amount"], Value::from(50000));
    }

    #[test]
    fn known_provider_errors_are_translated() {
        assert!(translate_provider_error("Authentication failed").contains("API key"));
        assert_eq!(translate_provider_error("anything else"), "anything else");
    }
}
