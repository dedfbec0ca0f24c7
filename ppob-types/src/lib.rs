//! # PPOB Types
//!
//! Domain types, payment policies and port traits for the PPOB payment core.
//! This crate has ZERO external IO dependencies - only data structures,
//! business rules, and trait definitions.
//!
//! ## Architecture
//!
//! This crate represents the **innermost core** of the hexagonal architecture:
//! - `domain/` - Pure domain types (Money, entities, TransactionAggregate, payables)
//! - `policy/` - Payment validators and calculators
//! - `ports/` - Trait definitions that adapters must implement
//! - `dto/` - Objects exchanged with bill providers
//! - `error/` - Domain, repository and payment error types

pub mod domain;
pub mod dto;
pub mod error;
pub mod policy;
pub mod ports;

// Re-export commonly used types
pub use domain::{
    AggregateRoot, BillPayment, Currency, Entity, EntityRef, EntryKind, Money, Payable,
    PaymentData, Settlement, TransactionAggregate, TransactionEntry, TransactionId,
    TransactionStatus,
};
pub use dto::*;
pub use error::{
    DomainError, PaymentError, PaymentErrorKind, RepoError, Stage, UnitOfWorkState,
    ValidationFailure,
};
pub use policy::{PaymentCalculator, PaymentValidator};
pub use ports::{
    Aggregate, BillProvider, NotificationError, NotificationSender, PersistenceBackend,
    ProviderError, StoreKey,
};
