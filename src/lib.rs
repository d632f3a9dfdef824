//! Payout orchestration, webhook reconciliation, and RazorpayX gateway
//! integration.

pub mod cache;
pub mod config;
pub mod erp;
pub mod error;
pub mod fees;
pub mod handlers;
pub mod models;
pub mod orchestrator;
pub mod razorpayx;
pub mod sync;
pub mod util;
pub mod webhook;

pub use config::{ConfigRegistry, ProviderConfig};
pub use error::{EngineError, EngineResult};
pub use models::{
    InitiatedBy, PayoutChannel, PayoutContext, PayoutRequest, PayoutStatus, UserPayoutMode,
};
pub use orchestrator::PayoutOrchestrator;
pub use razorpayx::RazorpayXClient;
pub use sync::BankTransactionSync;
pub use webhook::WebhookEngine;
