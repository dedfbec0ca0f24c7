//! Error types for the payment core.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::domain::{Currency, TransactionId};
use crate::ports::ProviderError;

/// Domain-level errors (business rule and invariant violations).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DomainError {
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Currency mismatch: expected {expected}, got {got}")]
    CurrencyMismatch { expected: Currency, got: Currency },

    #[error("Entity {entity} is owned by aggregate {owner}, cannot attach to {aggregate}")]
    Ownership {
        entity: String,
        owner: String,
        aggregate: String,
    },

    #[error("Entity {entity} already exists in aggregate {aggregate}")]
    DuplicateEntity { entity: String, aggregate: String },

    #[error("Entity {0} is not valid")]
    InvalidEntity(String),

    #[error("Transaction {id} is {status} and can no longer change")]
    TransactionClosed { id: TransactionId, status: String },

    #[error("Validation error: {0}")]
    ValidationError(String),
}

/// A single validator's rejection, reported by rule name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("rule `{rule}` rejected payment: {reason}")]
pub struct ValidationFailure {
    pub rule: String,
    pub reason: String,
}

impl ValidationFailure {
    pub fn new(rule: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            rule: rule.into(),
            reason: reason.into(),
        }
    }
}

/// Repository and unit-of-work errors (data access failures).
#[derive(Debug, thiserror::Error)]
pub enum RepoError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error("{kind} {id} not found")]
    NotFound { kind: String, id: String },

    #[error("Conflict on {kind} {id}: expected version {expected}, found {actual}")]
    Conflict {
        kind: String,
        id: String,
        expected: u64,
        actual: u64,
    },

    #[error("Unit of work {0} is closed")]
    UnitOfWorkClosed(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Database error: {0}")]
    Database(String),
}

impl From<serde_json::Error> for RepoError {
    fn from(err: serde_json::Error) -> Self {
        RepoError::Serialization(err.to_string())
    }
}

/// Lifecycle of a unit of work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UnitOfWorkState {
    Pending,
    Committed,
    RolledBack,
}

impl UnitOfWorkState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, UnitOfWorkState::Pending)
    }
}

impl fmt::Display for UnitOfWorkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnitOfWorkState::Pending => write!(f, "PENDING"),
            UnitOfWorkState::Committed => write!(f, "COMMITTED"),
            UnitOfWorkState::RolledBack => write!(f, "ROLLED_BACK"),
        }
    }
}

/// Pipeline stage at which a payment failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Inquiry,
    Load,
    Validate,
    Calculate,
    Provider,
    Record,
    Commit,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Inquiry => "inquiry",
            Stage::Load => "load",
            Stage::Validate => "validate",
            Stage::Calculate => "calculate",
            Stage::Provider => "provider",
            Stage::Record => "record",
            Stage::Commit => "commit",
        };
        f.write_str(name)
    }
}

/// What went wrong while processing a payment.
#[derive(Debug, thiserror::Error)]
pub enum PaymentErrorKind {
    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    #[error("validation failed: {0}")]
    Validation(#[source] ValidationFailure),

    #[error("insufficient balance: {0}")]
    InsufficientBalance(#[source] ProviderError),

    #[error("provider transaction failed: {0}")]
    Transaction(#[source] ProviderError),

    #[error("concurrent modification: {0}")]
    Conflict(#[source] RepoError),

    #[error("not found: {0}")]
    NotFound(#[source] RepoError),

    #[error("ownership violation: {0}")]
    Ownership(#[source] DomainError),

    #[error("unit of work closed: {0}")]
    UnitOfWorkClosed(#[source] RepoError),

    #[error("transaction closed: {0}")]
    TransactionClosed(#[source] DomainError),

    #[error("storage failure: {0}")]
    Storage(#[source] RepoError),

    #[error("domain rule violated: {0}")]
    Domain(#[source] DomainError),
}

impl From<DomainError> for PaymentErrorKind {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::InvalidAmount(msg) => PaymentErrorKind::InvalidAmount(msg),
            DomainError::Ownership { .. } => PaymentErrorKind::Ownership(err),
            DomainError::TransactionClosed { .. } => PaymentErrorKind::TransactionClosed(err),
            DomainError::ValidationError(ref msg) => {
                PaymentErrorKind::Validation(ValidationFailure::new("domain", msg.clone()))
            }
            other => PaymentErrorKind::Domain(other),
        }
    }
}

impl From<RepoError> for PaymentErrorKind {
    fn from(err: RepoError) -> Self {
        match err {
            RepoError::Domain(e) => e.into(),
            RepoError::NotFound { .. } => PaymentErrorKind::NotFound(err),
            RepoError::Conflict { .. } => PaymentErrorKind::Conflict(err),
            RepoError::UnitOfWorkClosed(_) => PaymentErrorKind::UnitOfWorkClosed(err),
            other => PaymentErrorKind::Storage(other),
        }
    }
}

impl From<ProviderError> for PaymentErrorKind {
    fn from(err: ProviderError) -> Self {
        match err {
            ProviderError::InsufficientBalance { .. } => PaymentErrorKind::InsufficientBalance(err),
            ProviderError::InvalidCustomerId(ref id) => PaymentErrorKind::Validation(
                ValidationFailure::new("customer_id", format!("invalid customer id {id}")),
            ),
            other => PaymentErrorKind::Transaction(other),
        }
    }
}

/// Error surfaced by the payment processor.
///
/// Carries the stage, the transaction it concerns and the final state of the
/// unit of work. By the time a caller sees this error the unit of work has
/// already been rolled back. Failures raised before any transaction was
/// opened, such as a failed bill inquiry, carry neither.
#[derive(Debug, thiserror::Error)]
#[error(
    "payment{} failed at {stage}{}: {kind}",
    transaction_label(.transaction_id),
    unit_of_work_label(.unit_of_work)
)]
pub struct PaymentError {
    pub stage: Stage,
    pub transaction_id: Option<TransactionId>,
    pub unit_of_work: Option<UnitOfWorkState>,
    #[source]
    pub kind: PaymentErrorKind,
}

fn transaction_label(id: &Option<TransactionId>) -> String {
    id.as_ref().map(|id| format!(" {id}")).unwrap_or_default()
}

fn unit_of_work_label(state: &Option<UnitOfWorkState>) -> String {
    match state {
        Some(state) => format!(" (unit of work {state})"),
        None => " (no unit of work)".to_string(),
    }
}

impl PaymentError {
    pub fn new(
        stage: Stage,
        transaction_id: TransactionId,
        unit_of_work: UnitOfWorkState,
        kind: impl Into<PaymentErrorKind>,
    ) -> Self {
        Self {
            stage,
            transaction_id: Some(transaction_id),
            unit_of_work: Some(unit_of_work),
            kind: kind.into(),
        }
    }

    /// A failure that happened before a transaction ID was assigned.
    pub fn before_transaction(stage: Stage, kind: impl Into<PaymentErrorKind>) -> Self {
        Self {
            stage,
            transaction_id: None,
            unit_of_work: None,
            kind: kind.into(),
        }
    }

    /// Transient failures the caller may retry with the same transaction ID.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.kind,
            PaymentErrorKind::Transaction(ref e) if e.is_transient()
        ) || matches!(self.kind, PaymentErrorKind::Conflict(_))
    }
}
