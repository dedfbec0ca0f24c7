//! Domain models for the payment core.

pub mod entity;
pub mod money;
pub mod payment;
pub mod transaction;

pub use entity::{AggregateRoot, Entity, EntityRef};
pub use money::{Currency, Money};
pub use payment::{BillPayment, Payable, PaymentData};
pub use transaction::{
    EntryId, EntryKind, Settlement, TransactionAggregate, TransactionEntry, TransactionId,
    TransactionStatus,
};
