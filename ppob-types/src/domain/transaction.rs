//! Transaction aggregate: the root that binds a transaction identity to its
//! line items and settlement record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::entity::{AggregateRoot, Entity, EntityRef};
use super::money::Money;
use crate::error::DomainError;
use crate::ports::Aggregate;

/// Globally unique, immutable transaction identity.
///
/// Generated as a UUID string unless the caller supplies its own
/// idempotency key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransactionId(String);

impl TransactionId {
    /// Creates a new random TransactionId.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for TransactionId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<&str> for TransactionId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for TransactionId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl std::fmt::Display for TransactionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identity of an entry inside a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntryId(Uuid);

impl EntryId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for EntryId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for EntryId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle of a transaction aggregate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionStatus {
    /// Accepted, may still gain entries
    Open,
    /// Settled and committed; terminal
    Committed,
    /// Abandoned before settlement; terminal
    Voided,
}

impl TransactionStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, TransactionStatus::Open)
    }
}

impl std::fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransactionStatus::Open => write!(f, "OPEN"),
            TransactionStatus::Committed => write!(f, "COMMITTED"),
            TransactionStatus::Voided => write!(f, "VOIDED"),
        }
    }
}

/// Outcome of a successful provider payment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settlement {
    /// Reference assigned by the bill provider
    pub provider_reference: String,
    pub bill_id: String,
    /// Amount before fees and discounts
    pub base_amount: Money,
    /// Amount actually charged
    pub charged_amount: Money,
    pub settled_at: DateTime<Utc>,
}

/// What a transaction entry records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntryKind {
    /// A bill being paid
    LineItem {
        bill_id: String,
        customer_id: String,
        description: String,
        amount: Money,
    },
    /// The provider's confirmation of payment
    Settlement(Settlement),
}

/// An entity owned by a [`TransactionAggregate`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionEntry {
    id: EntryId,
    owner: Option<TransactionId>,
    pub kind: EntryKind,
    pub recorded_at: DateTime<Utc>,
}

impl TransactionEntry {
    pub fn new(kind: EntryKind) -> Self {
        Self {
            id: EntryId::new(),
            owner: None,
            kind,
            recorded_at: Utc::now(),
        }
    }

    pub fn line_item(
        bill_id: impl Into<String>,
        customer_id: impl Into<String>,
        description: impl Into<String>,
        amount: Money,
    ) -> Self {
        Self::new(EntryKind::LineItem {
            bill_id: bill_id.into(),
            customer_id: customer_id.into(),
            description: description.into(),
            amount,
        })
    }

    pub fn settlement(settlement: Settlement) -> Self {
        Self::new(EntryKind::Settlement(settlement))
    }
}

impl Entity for TransactionEntry {
    type Id = EntryId;
    type Owner = TransactionId;

    fn id(&self) -> &EntryId {
        &self.id
    }

    fn owner(&self) -> Option<&TransactionId> {
        self.owner.as_ref()
    }

    fn claim(&mut self, owner: TransactionId) {
        self.owner = Some(owner);
    }

    fn is_valid(&self) -> bool {
        match &self.kind {
            EntryKind::LineItem { bill_id, .. } => !bill_id.trim().is_empty(),
            EntryKind::Settlement(s) => {
                !s.provider_reference.is_empty()
                    && s.base_amount.currency() == s.charged_amount.currency()
            }
        }
    }
}

/// Root aggregate of a payment transaction.
///
/// Mutated only while `Open`; sealing (`Committed`) or voiding (`Voided`) is
/// terminal and every later mutation fails with `TransactionClosed`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionAggregate {
    root: AggregateRoot<TransactionId, TransactionEntry>,
    status: TransactionStatus,
    void_reason: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TransactionAggregate {
    /// Creates an empty, open transaction.
    pub fn open(id: TransactionId) -> Self {
        let now = Utc::now();
        Self {
            root: AggregateRoot::new(id),
            status: TransactionStatus::Open,
            void_reason: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn id(&self) -> &TransactionId {
        self.root.id()
    }

    pub fn status(&self) -> TransactionStatus {
        self.status
    }

    pub fn void_reason(&self) -> Option<&str> {
        self.void_reason.as_deref()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub fn entries(&self) -> &[TransactionEntry] {
        self.root.entities()
    }

    pub fn entry_count(&self) -> usize {
        self.root.len()
    }

    pub fn entry(&self, entry_ref: &EntityRef<TransactionId>) -> Option<&TransactionEntry> {
        self.root.entity(entry_ref)
    }

    /// The settlement record, once the transaction has been paid.
    pub fn settlement(&self) -> Option<&Settlement> {
        self.entries().iter().find_map(|e| match &e.kind {
            EntryKind::Settlement(s) => Some(s),
            _ => None,
        })
    }

    fn ensure_open(&self) -> Result<(), DomainError> {
        if self.status.is_terminal() {
            return Err(DomainError::TransactionClosed {
                id: self.id().clone(),
                status: self.status.to_string(),
            });
        }
        Ok(())
    }

    /// Attaches an entry to this transaction.
    pub fn add_entry(
        &mut self,
        entry: TransactionEntry,
    ) -> Result<EntityRef<TransactionId>, DomainError> {
        self.ensure_open()?;
        let entry_ref = self.root.add_entity(entry)?;
        self.updated_at = Utc::now();
        Ok(entry_ref)
    }

    pub fn add_line_item(
        &mut self,
        bill_id: impl Into<String>,
        customer_id: impl Into<String>,
        description: impl Into<String>,
        amount: Money,
    ) -> Result<EntityRef<TransactionId>, DomainError> {
        self.add_entry(TransactionEntry::line_item(
            bill_id,
            customer_id,
            description,
            amount,
        ))
    }

    /// Records the provider's settlement. A transaction settles at most once.
    pub fn record_settlement(
        &mut self,
        settlement: Settlement,
    ) -> Result<EntityRef<TransactionId>, DomainError> {
        self.ensure_open()?;
        if self.settlement().is_some() {
            return Err(DomainError::ValidationError(format!(
                "transaction {} is already settled",
                self.id()
            )));
        }
        self.add_entry(TransactionEntry::settlement(settlement))
    }

    /// Moves an open, settled transaction to `Committed`.
    pub fn seal(&mut self) -> Result<(), DomainError> {
        self.ensure_open()?;
        if self.settlement().is_none() {
            return Err(DomainError::ValidationError(format!(
                "transaction {} has no settlement to commit",
                self.id()
            )));
        }
        self.status = TransactionStatus::Committed;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Moves an open transaction to `Voided`.
    pub fn void(&mut self, reason: impl Into<String>) -> Result<(), DomainError> {
        self.ensure_open()?;
        self.status = TransactionStatus::Voided;
        self.void_reason = Some(reason.into());
        self.updated_at = Utc::now();
        Ok(())
    }
}

impl Aggregate for TransactionAggregate {
    const KIND: &'static str = "transaction";
    type Id = TransactionId;

    fn aggregate_id(&self) -> &TransactionId {
        self.id()
    }
}
