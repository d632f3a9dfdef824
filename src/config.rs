//! Provider account configuration and the registry used to resolve webhook
//! payloads back to an account.

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{EngineError, EngineResult};

pub const DEFAULT_BASE_PATH: &str = "https://api.razorpay.com/v1";

/// One configured RazorpayX account.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    /// Local name of this account configuration.
    pub name: String,
    pub key_id: String,
    pub key_secret: String,
    /// Provider-side account id, stored without the `acc_` prefix.
    pub account_id: String,
    /// Virtual account number payouts are debited from.
    pub account_number: String,
    /// Local bank account document the payouts reconcile against.
    pub bank_account: String,
    pub base_path: String,
    pub disabled: bool,
}

impl ProviderConfig {
    /// Load a single account from environment variables.
    pub fn from_env() -> EngineResult<Self> {
        let var = |key: &str| {
            std::env::var(key)
                .map_err(|_| EngineError::validation(format!("Missing {key} in environment")))
        };

        let account_id = var("RAZORPAYX_ACCOUNT_ID")?;
        Ok(ProviderConfig {
            name: std::env::var("RAZORPAYX_ACCOUNT_NAME")
                .unwrap_or_else(|_| "Default".to_string()),
            key_id: var("RAZORPAYX_KEY_ID")?,
            key_secret: var("RAZORPAYX_KEY_SECRET")?,
            account_id: strip_account_prefix(&account_id).to_string(),
            account_number: var("RAZORPAYX_ACCOUNT_NUMBER")?,
            bank_account: std::env::var("RAZORPAYX_BANK_ACCOUNT").unwrap_or_default(),
            base_path: std::env::var("RAZORPAYX_BASE_PATH")
                .unwrap_or_else(|_| DEFAULT_BASE_PATH.to_string()),
            disabled: std::env::var("RAZORPAYX_DISABLED")
                .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
                .unwrap_or(false),
        })
    }

    pub fn ensure_enabled(&self) -> EngineResult<()> {
        if self.disabled {
            return Err(EngineError::validation(format!(
                "RazorpayX account {} is disabled",
                self.name
            )));
        }
        Ok(())
    }
}

/// Webhook payloads identify the account with an `acc_` prefix that stored
/// configurations do not carry.
pub fn strip_account_prefix(account_id: &str) -> &str {
    account_id.strip_prefix("acc_").unwrap_or(account_id)
}

/// All configured accounts, looked up by Provider account id when a webhook
/// arrives.
#[derive(Debug, Default, Clone)]
pub struct ConfigRegistry {
    by_account_id: HashMap<String, Arc<ProviderConfig>>,
}

impl ConfigRegistry {
    pub fn new(configs: impl IntoIterator<Item = ProviderConfig>) -> Self {
        let by_account_id = configs
            .into_iter()
            .map(|c| (c.account_id.clone(), Arc::new(c)))
            .collect();
        ConfigRegistry { by_account_id }
    }

    pub fn by_account_id(&self, account_id: &str) -> Option<Arc<ProviderConfig>> {
        self.by_account_id
            .get(strip_account_prefix(account_id))
            .cloned()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<ProviderConfig>> {
        self.by_account_id.values()
    }
}
