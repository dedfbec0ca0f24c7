//! Typed repository view over a unit of work.

use std::marker::PhantomData;

use ppob_types::{Aggregate, RepoError, StoreKey};

use crate::unit_of_work::UnitOfWork;

/// Keyed store of one aggregate type, scoped to a unit of work.
///
/// Every operation is staged in the owning [`UnitOfWork`] and becomes durable
/// only when it commits.
pub struct Repository<'u, A> {
    uow: &'u mut UnitOfWork,
    _aggregate: PhantomData<fn() -> A>,
}

impl<'u, A: Aggregate> Repository<'u, A> {
    pub(crate) fn new(uow: &'u mut UnitOfWork) -> Self {
        Self {
            uow,
            _aggregate: PhantomData,
        }
    }

    /// Inserts or replaces the aggregate under its id.
    pub async fn add(&mut self, aggregate: &A) -> Result<(), RepoError> {
        let key = StoreKey::of::<A>(aggregate.aggregate_id());
        let body = serde_json::to_value(aggregate)?;
        self.uow.write(&key, body).await
    }

    /// Fetches an aggregate, failing with `NotFound` if it does not exist.
    pub async fn get(&mut self, id: &A::Id) -> Result<A, RepoError> {
        self.find(id).await?.ok_or_else(|| RepoError::NotFound {
            kind: A::KIND.to_string(),
            id: id.to_string(),
        })
    }

    pub async fn find(&mut self, id: &A::Id) -> Result<Option<A>, RepoError> {
        let key = StoreKey::of::<A>(id);
        match self.uow.read(&key).await? {
            Some(body) => Ok(Some(serde_json::from_value(body)?)),
            None => Ok(None),
        }
    }

    /// Deletes the aggregate by its id.
    pub async fn remove(&mut self, aggregate: &A) -> Result<(), RepoError> {
        self.remove_by_id(aggregate.aggregate_id()).await
    }

    pub async fn remove_by_id(&mut self, id: &A::Id) -> Result<(), RepoError> {
        self.uow.delete(&StoreKey::of::<A>(id)).await
    }
}
