//! Port traits (interfaces for adapters).
//!
//! These are the contracts that adapters must implement.
//! The core depends on these traits, not concrete implementations.

mod bill;
mod notification;
mod store;

pub use bill::{BillProvider, ProviderError};
pub use notification::{NotificationError, NotificationSender};
pub use store::{Aggregate, Change, ChangeOp, ChangeSet, PersistenceBackend, Snapshot, StoreKey};
