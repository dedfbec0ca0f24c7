//! Unit of work: a scoped, all-or-nothing boundary over repository changes.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use ppob_types::ports::{Change, ChangeOp, ChangeSet, Snapshot};
use ppob_types::{Aggregate, PersistenceBackend, RepoError, StoreKey, UnitOfWorkState};

use crate::repository::Repository;

/// What `remove` does when the aggregate does not exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RemovePolicy {
    /// Removing an absent id is a no-op
    #[default]
    Ignore,
    /// Removing an absent id fails with `NotFound`
    Strict,
}

#[derive(Debug, Clone)]
enum Pending {
    Put(Value),
    Delete,
}

/// A key this unit of work has read or written.
#[derive(Debug)]
struct Tracked {
    /// Version observed on first touch; checked again at commit
    expected_version: u64,
    committed: Option<Value>,
    pending: Option<Pending>,
}

impl Tracked {
    fn from_snapshot(snapshot: Snapshot) -> Self {
        Self {
            expected_version: snapshot.version,
            committed: snapshot.body,
            pending: None,
        }
    }

    /// The value visible inside the scope (own writes first).
    fn visible(&self) -> Option<&Value> {
        match &self.pending {
            Some(Pending::Put(value)) => Some(value),
            Some(Pending::Delete) => None,
            None => self.committed.as_ref(),
        }
    }
}

/// Scoped transactional boundary.
///
/// Created `Pending` by [`Store::begin`](crate::Store::begin). Reads see the
/// committed state plus this scope's own writes; nothing is visible to other
/// readers until [`commit`](Self::commit) succeeds. Dropping a unit of work
/// that is still pending rolls it back, so every exit path (early return,
/// `?`, panic, cancelled future) finalizes it.
pub struct UnitOfWork {
    id: Uuid,
    backend: Arc<dyn PersistenceBackend>,
    remove_policy: RemovePolicy,
    state: UnitOfWorkState,
    tracked: BTreeMap<StoreKey, Tracked>,
}

impl UnitOfWork {
    pub(crate) fn begin(backend: Arc<dyn PersistenceBackend>, remove_policy: RemovePolicy) -> Self {
        let id = Uuid::new_v4();
        debug!(unit_of_work = %id, "unit of work started");
        Self {
            id,
            backend,
            remove_policy,
            state: UnitOfWorkState::Pending,
            tracked: BTreeMap::new(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn state(&self) -> UnitOfWorkState {
        self.state
    }

    /// True if the scope holds writes that a commit would apply.
    pub fn has_changes(&self) -> bool {
        self.tracked.values().any(|t| t.pending.is_some())
    }

    /// Typed repository view bound to this unit of work.
    pub fn repository<A: Aggregate>(&mut self) -> Repository<'_, A> {
        Repository::new(self)
    }

    fn ensure_pending(&self) -> Result<(), RepoError> {
        if self.state.is_terminal() {
            return Err(RepoError::UnitOfWorkClosed(format!("{} ({})", self.id, self.state)));
        }
        Ok(())
    }

    async fn track(&mut self, key: &StoreKey) -> Result<&mut Tracked, RepoError> {
        self.ensure_pending()?;
        if !self.tracked.contains_key(key) {
            let snapshot = self.backend.load(key).await?;
            self.tracked
                .insert(key.clone(), Tracked::from_snapshot(snapshot));
        }
        self.tracked
            .get_mut(key)
            .ok_or_else(|| RepoError::Database(format!("lost track of {key}")))
    }

    pub(crate) async fn read(&mut self, key: &StoreKey) -> Result<Option<Value>, RepoError> {
        let tracked = self.track(key).await?;
        Ok(tracked.visible().cloned())
    }

    pub(crate) async fn write(&mut self, key: &StoreKey, value: Value) -> Result<(), RepoError> {
        let tracked = self.track(key).await?;
        tracked.pending = Some(Pending::Put(value));
        Ok(())
    }

    pub(crate) async fn delete(&mut self, key: &StoreKey) -> Result<(), RepoError> {
        let policy = self.remove_policy;
        let tracked = self.track(key).await?;
        if tracked.visible().is_none() {
            return match policy {
                RemovePolicy::Ignore => Ok(()),
                RemovePolicy::Strict => Err(RepoError::NotFound {
                    kind: key.kind.clone(),
                    id: key.id.clone(),
                }),
            };
        }
        tracked.pending = if tracked.committed.is_some() {
            Some(Pending::Delete)
        } else {
            // Only this scope's own put existed.
            None
        };
        Ok(())
    }

    fn change_set(&self) -> ChangeSet {
        ChangeSet::new(
            self.tracked
                .iter()
                .map(|(key, tracked)| Change {
                    key: key.clone(),
                    expected_version: tracked.expected_version,
                    op: match &tracked.pending {
                        None => ChangeOp::Check,
                        Some(Pending::Put(value)) => ChangeOp::Put(value.clone()),
                        Some(Pending::Delete) => ChangeOp::Delete,
                    },
                })
                .collect(),
        )
    }

    fn finish(&mut self, state: UnitOfWorkState) {
        self.tracked.clear();
        self.state = state;
    }

    /// Atomically applies every buffered change.
    ///
    /// Fails with [`RepoError::Conflict`] if any touched aggregate was
    /// committed by someone else since this scope first saw it. On any
    /// failure the unit of work is rolled back before the error is returned.
    #[instrument(skip(self), fields(unit_of_work = %self.id))]
    pub async fn commit(&mut self) -> Result<(), RepoError> {
        self.ensure_pending()?;

        let changes = self.change_set();
        if !changes.has_writes() {
            self.finish(UnitOfWorkState::Committed);
            debug!("read-only unit of work committed");
            return Ok(());
        }

        match self.backend.apply(&changes).await {
            Ok(()) => {
                self.finish(UnitOfWorkState::Committed);
                debug!(changes = changes.len(), "unit of work committed");
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "commit failed, rolling back");
                self.finish(UnitOfWorkState::RolledBack);
                Err(e)
            }
        }
    }

    /// Discards all buffered changes. Always succeeds; a no-op once the unit
    /// of work is terminal.
    pub fn rollback(&mut self) {
        if self.state.is_terminal() {
            return;
        }
        debug!(unit_of_work = %self.id, discarded = self.tracked.len(), "unit of work rolled back");
        self.finish(UnitOfWorkState::RolledBack);
    }
}

impl Drop for UnitOfWork {
    fn drop(&mut self) {
        if self.state == UnitOfWorkState::Pending {
            self.rollback();
        }
    }
}

impl std::fmt::Debug for UnitOfWork {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UnitOfWork")
            .field("id", &self.id)
            .field("state", &self.state)
            .field("tracked", &self.tracked.len())
            .finish()
    }
}
