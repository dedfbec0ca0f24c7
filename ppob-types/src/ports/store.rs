//! Persistence port.
//!
//! Backends (in-memory, SQLite) store aggregate snapshots as JSON keyed by
//! `(kind, id)` together with a version that increases on every committed
//! change. The unit of work builds a [`ChangeSet`] and the backend applies it
//! atomically, or not at all.

use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fmt;
use std::hash::Hash;

use crate::error::RepoError;

/// An aggregate root that can be stored through a repository.
pub trait Aggregate: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Storage namespace for this aggregate type.
    const KIND: &'static str;

    type Id: Clone + Eq + Hash + fmt::Display + Send + Sync;

    fn aggregate_id(&self) -> &Self::Id;
}

/// Storage key of one aggregate.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StoreKey {
    pub kind: String,
    pub id: String,
}

impl StoreKey {
    pub fn new(kind: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            id: id.into(),
        }
    }

    pub fn of<A: Aggregate>(id: &A::Id) -> Self {
        Self::new(A::KIND, id.to_string())
    }
}

impl fmt::Display for StoreKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.kind, self.id)
    }
}

/// Committed state of one key. Version 0 with no body means the key was
/// never written; a deleted key keeps its version and loses its body.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Snapshot {
    pub version: u64,
    pub body: Option<serde_json::Value>,
}

/// What to do with a key at commit time.
#[derive(Debug, Clone, PartialEq)]
pub enum ChangeOp {
    /// Read in the scope; only verify the version
    Check,
    Put(serde_json::Value),
    Delete,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Change {
    pub key: StoreKey,
    /// Version observed when the unit of work first touched the key
    pub expected_version: u64,
    pub op: ChangeOp,
}

/// Changes of one unit of work, ordered by key.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChangeSet {
    changes: Vec<Change>,
}

impl ChangeSet {
    pub fn new(mut changes: Vec<Change>) -> Self {
        changes.sort_by(|a, b| a.key.cmp(&b.key));
        Self { changes }
    }

    pub fn changes(&self) -> &[Change] {
        &self.changes
    }

    pub fn has_writes(&self) -> bool {
        self.changes.iter().any(|c| c.op != ChangeOp::Check)
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }
}

/// Port trait for aggregate storage.
#[async_trait::async_trait]
pub trait PersistenceBackend: Send + Sync + 'static {
    /// Reads the committed snapshot of a key.
    async fn load(&self, key: &StoreKey) -> Result<Snapshot, RepoError>;

    /// Applies every change or none.
    ///
    /// Fails with [`RepoError::Conflict`] if any key's current version differs
    /// from `expected_version`; successful puts and deletes bump the version
    /// by one.
    async fn apply(&self, changes: &ChangeSet) -> Result<(), RepoError>;
}
