//! In-memory persistence backend.

use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use dashmap::DashMap;
use tracing::debug;

use ppob_types::ports::{ChangeOp, ChangeSet, Snapshot};
use ppob_types::{PersistenceBackend, RepoError, StoreKey};

type Slot = Arc<Mutex<Snapshot>>;

/// Versioned snapshots in a sharded map, one mutex per key.
///
/// Commits lock only the keys they touch, in key order, so commits over
/// disjoint keys never wait on each other.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    slots: DashMap<StoreKey, Slot>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of keys the backend has seen (deleted keys keep their version).
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    fn slot(&self, key: &StoreKey) -> Slot {
        // The shard guard is released at the end of the statement, before
        // the slot mutex is taken.
        self.slots.entry(key.clone()).or_default().clone()
    }

    fn lock(slot: &Slot) -> Result<MutexGuard<'_, Snapshot>, RepoError> {
        slot.lock()
            .map_err(|_| RepoError::Database("snapshot lock poisoned".to_string()))
    }

    fn apply_locked(&self, changes: &ChangeSet) -> Result<(), RepoError> {
        let slots: Vec<Slot> = changes.changes().iter().map(|c| self.slot(&c.key)).collect();

        let mut guards = Vec::with_capacity(slots.len());
        for slot in &slots {
            guards.push(Self::lock(slot)?);
        }

        for (change, guard) in changes.changes().iter().zip(&guards) {
            if guard.version != change.expected_version {
                return Err(RepoError::Conflict {
                    kind: change.key.kind.clone(),
                    id: change.key.id.clone(),
                    expected: change.expected_version,
                    actual: guard.version,
                });
            }
        }

        for (change, guard) in changes.changes().iter().zip(guards.iter_mut()) {
            match &change.op {
                ChangeOp::Check => {}
                ChangeOp::Put(body) => {
                    guard.version += 1;
                    guard.body = Some(body.clone());
                }
                ChangeOp::Delete => {
                    guard.version += 1;
                    guard.body = None;
                }
            }
        }
        Ok(())
    }
}

#[async_trait]
impl PersistenceBackend for MemoryBackend {
    async fn load(&self, key: &StoreKey) -> Result<Snapshot, RepoError> {
        let slot = match self.slots.get(key) {
            Some(slot) => slot.clone(),
            None => return Ok(Snapshot::default()),
        };
        let snapshot = Self::lock(&slot)?.clone();
        Ok(snapshot)
    }

    async fn apply(&self, changes: &ChangeSet) -> Result<(), RepoError> {
        self.apply_locked(changes)?;
        debug!(keys = changes.len(), "memory backend applied change set");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ppob_types::ports::Change;
    use serde_json::json;

    fn put(id: &str, expected: u64, body: serde_json::Value) -> Change {
        Change {
            key: StoreKey::new("thing", id),
            expected_version: expected,
            op: ChangeOp::Put(body),
        }
    }

    #[tokio::test]
    async fn test_load_missing_key_is_empty_snapshot() {
        let backend = MemoryBackend::new();
        let snapshot = backend.load(&StoreKey::new("thing", "a")).await.unwrap();
        assert_eq!(snapshot, Snapshot::default());
        assert!(backend.is_empty());
    }

    #[tokio::test]
    async fn test_apply_bumps_versions() {
        let backend = MemoryBackend::new();
        backend
            .apply(&ChangeSet::new(vec![put("a", 0, json!({"n": 1}))]))
            .await
            .unwrap();
        backend
            .apply(&ChangeSet::new(vec![put("a", 1, json!({"n": 2}))]))
            .await
            .unwrap();

        let snapshot = backend.load(&StoreKey::new("thing", "a")).await.unwrap();
        assert_eq!(snapshot.version, 2);
        assert_eq!(snapshot.body, Some(json!({"n": 2})));
    }

    #[tokio::test]
    async fn test_conflict_applies_nothing() {
        let backend = MemoryBackend::new();
        backend
            .apply(&ChangeSet::new(vec![put("b", 0, json!(1))]))
            .await
            .unwrap();

        // "a" would succeed on its own; "b" is stale.
        let result = backend
            .apply(&ChangeSet::new(vec![
                put("a", 0, json!("new")),
                put("b", 0, json!(2)),
            ]))
            .await;
        assert!(matches!(result, Err(RepoError::Conflict { ref id, .. }) if id == "b"));

        let a = backend.load(&StoreKey::new("thing", "a")).await.unwrap();
        let b = backend.load(&StoreKey::new("thing", "b")).await.unwrap();
        assert_eq!(a.version, 0);
        assert_eq!(a.body, None);
        assert_eq!(b.body, Some(json!(1)));
    }

    #[tokio::test]
    async fn test_check_only_verifies_version() {
        let backend = MemoryBackend::new();
        backend
            .apply(&ChangeSet::new(vec![put("a", 0, json!(1))]))
            .await
            .unwrap();

        let check = Change {
            key: StoreKey::new("thing", "a"),
            expected_version: 0,
            op: ChangeOp::Check,
        };
        let result = backend
            .apply(&ChangeSet::new(vec![check, put("c", 0, json!(3))]))
            .await;
        assert!(matches!(result, Err(RepoError::Conflict { .. })));
    }
}
