//! Shared handle to a persistence backend.

use std::sync::Arc;

use ppob_types::{Aggregate, PersistenceBackend, RepoError, StoreKey};

use crate::memory::MemoryBackend;
use crate::unit_of_work::{RemovePolicy, UnitOfWork};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreConfig {
    pub remove_policy: RemovePolicy,
}

/// Cheaply cloneable entry point: begins units of work and serves committed
/// reads.
#[derive(Clone)]
pub struct Store {
    backend: Arc<dyn PersistenceBackend>,
    config: StoreConfig,
}

impl Store {
    pub fn new(backend: Arc<dyn PersistenceBackend>, config: StoreConfig) -> Self {
        Self { backend, config }
    }

    /// Store over a fresh in-memory backend with the default configuration.
    pub fn in_memory() -> Self {
        Self::with_config(StoreConfig::default())
    }

    pub fn with_config(config: StoreConfig) -> Self {
        Self::new(Arc::new(MemoryBackend::new()), config)
    }

    pub fn config(&self) -> StoreConfig {
        self.config
    }

    /// Opens a new unit of work in the `Pending` state.
    pub fn begin(&self) -> UnitOfWork {
        UnitOfWork::begin(self.backend.clone(), self.config.remove_policy)
    }

    /// Committed state of an aggregate, outside any unit of work.
    pub async fn get<A: Aggregate>(&self, id: &A::Id) -> Result<A, RepoError> {
        let snapshot = self.backend.load(&StoreKey::of::<A>(id)).await?;
        match snapshot.body {
            Some(body) => Ok(serde_json::from_value(body)?),
            None => Err(RepoError::NotFound {
                kind: A::KIND.to_string(),
                id: id.to_string(),
            }),
        }
    }

    /// Committed version of an aggregate; 0 if it was never written.
    pub async fn version<A: Aggregate>(&self, id: &A::Id) -> Result<u64, RepoError> {
        Ok(self.backend.load(&StoreKey::of::<A>(id)).await?.version)
    }
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store").field("config", &self.config).finish()
    }
}
