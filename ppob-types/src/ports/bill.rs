//! Bill provider port.
//!
//! The core treats a provider as untrusted and possibly slow. Adapters may be
//! HTTP clients, sandboxes, or test doubles.

use crate::dto::{BillDetails, PayRequest, ProviderReceipt};

/// Error type for bill provider operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProviderError {
    #[error("Insufficient balance: available {available}, requested {requested}")]
    InsufficientBalance { available: i64, requested: i64 },

    #[error("Invalid customer id: {0}")]
    InvalidCustomerId(String),

    #[error("Bill not found: {0}")]
    BillNotFound(String),

    #[error("Provider rejected request: {0}")]
    Rejected(String),

    #[error("Provider timed out: {0}")]
    Timeout(String),

    #[error("Transport error: {0}")]
    Transport(String),

    /// The provider answered but the answer could not be read, so the
    /// payment may or may not have been applied.
    #[error("Provider outcome unknown: {0}")]
    UnknownOutcome(String),
}

impl ProviderError {
    /// Whether retrying the same request may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ProviderError::Timeout(_)
                | ProviderError::Transport(_)
                | ProviderError::UnknownOutcome(_)
        )
    }
}

/// Port trait for bill providers (PLN, PDAM, BPJS, ...).
#[async_trait::async_trait]
pub trait BillProvider: Send + Sync {
    /// Fetches the outstanding bill for a customer.
    async fn inquiry(&self, customer_id: &str) -> Result<BillDetails, ProviderError>;

    /// Pays a bill. Implementations must apply at most one financial effect
    /// per `request.transaction_id`, returning the original receipt on replay.
    async fn pay(&self, request: &PayRequest) -> Result<ProviderReceipt, ProviderError>;

    /// Checks the customer id format without contacting the provider.
    fn validate_customer_id(&self, customer_id: &str) -> bool;
}
