use thiserror::Error;

/// Failure taxonomy for the payout engine.
///
/// `Validation` and `Unauthorized` are always surfaced synchronously before
/// any network call. `Provider` carries a 4xx/5xx body already passed through
/// the known-error translation table. `Correlation` is soft: webhook
/// deliveries that cannot be matched are logged and dropped, never returned
/// to the Provider.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("{0}")]
    Validation(String),

    #[error("RazorpayX API failed (status {status_code}): {message}")]
    Provider { status_code: u16, message: String },

    #[error("RazorpayX unreachable: {0}")]
    ProviderUnreachable(String),

    #[error("not authorized: {0}")]
    Unauthorized(String),

    #[error("webhook correlation failed: {0}")]
    Correlation(String),
}

impl EngineError {
    pub fn validation(msg: impl Into<String>) -> Self {
        EngineError::Validation(msg.into())
    }

    /// Check if this is a client error (4xx)
    pub fn is_client_error(&self) -> bool {
        matches!(self, EngineError::Provider { status_code, .. } if (400..500).contains(status_code))
    }

    /// Check if this is a server error (5xx)
    pub fn is_server_error(&self) -> bool {
        matches!(self, EngineError::Provider { status_code, .. } if (500..600).contains(status_code))
    }
}

pub type EngineResult<T> = Result<T, EngineError>;
