//! Entity and aggregate-root building blocks.
//!
//! Entities live in an arena owned by their aggregate. Code outside the
//! aggregate refers to an entity through an [`EntityRef`] (aggregate id plus
//! arena index), never through a shared reference, so an entity can not be
//! reached through two aggregates.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::DomainError;

/// An object with identity that is owned by exactly one aggregate.
pub trait Entity {
    /// Identity, unique within the owning aggregate.
    type Id: PartialEq + fmt::Display;
    /// Identity type of the aggregate that owns this entity.
    type Owner: PartialEq + Clone + fmt::Display;

    fn id(&self) -> &Self::Id;

    /// The aggregate that claimed this entity, if any.
    fn owner(&self) -> Option<&Self::Owner>;

    /// Records `owner` as the owning aggregate. Called by [`AggregateRoot::add_entity`].
    fn claim(&mut self, owner: Self::Owner);

    /// Pure validity predicate; must not mutate state.
    fn is_valid(&self) -> bool {
        true
    }
}

/// Stable handle to an entity inside an aggregate.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntityRef<I> {
    pub aggregate_id: I,
    pub index: usize,
}

/// Aggregate root: identity plus an insertion-ordered arena of owned entities.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateRoot<I, E> {
    id: I,
    entities: Vec<E>,
}

impl<I, E> AggregateRoot<I, E>
where
    I: PartialEq + Clone + fmt::Display,
    E: Entity<Owner = I>,
{
    pub fn new(id: I) -> Self {
        Self {
            id,
            entities: Vec::new(),
        }
    }

    pub fn id(&self) -> &I {
        &self.id
    }

    /// Appends `entity`, claiming it for this aggregate.
    ///
    /// # Errors
    /// - `Ownership` if another aggregate already owns the entity
    /// - `DuplicateEntity` if an entity with the same id is already attached
    /// - `InvalidEntity` if the entity fails its validity predicate
    pub fn add_entity(&mut self, mut entity: E) -> Result<EntityRef<I>, DomainError> {
        if let Some(owner) = entity.owner() {
            if *owner != self.id {
                return Err(DomainError::Ownership {
                    entity: entity.id().to_string(),
                    owner: owner.to_string(),
                    aggregate: self.id.to_string(),
                });
            }
        }
        if self.entities.iter().any(|e| e.id() == entity.id()) {
            return Err(DomainError::DuplicateEntity {
                entity: entity.id().to_string(),
                aggregate: self.id.to_string(),
            });
        }
        if !entity.is_valid() {
            return Err(DomainError::InvalidEntity(entity.id().to_string()));
        }

        entity.claim(self.id.clone());
        self.entities.push(entity);
        Ok(EntityRef {
            aggregate_id: self.id.clone(),
            index: self.entities.len() - 1,
        })
    }

    /// Resolves a reference minted by this aggregate.
    pub fn entity(&self, entity_ref: &EntityRef<I>) -> Option<&E> {
        if entity_ref.aggregate_id != self.id {
            return None;
        }
        self.entities.get(entity_ref.index)
    }

    pub fn entities(&self) -> &[E] {
        &self.entities
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// True when every owned entity is valid and claimed by this aggregate.
    pub fn is_consistent(&self) -> bool {
        self.entities
            .iter()
            .all(|e| e.is_valid() && e.owner() == Some(&self.id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Line {
        id: u32,
        owner: Option<String>,
        qty: i32,
    }

    impl Line {
        fn new(id: u32, qty: i32) -> Self {
            Self {
                id,
                owner: None,
                qty,
            }
        }
    }

    impl Entity for Line {
        type Id = u32;
        type Owner = String;

        fn id(&self) -> &u32 {
            &self.id
        }

        fn owner(&self) -> Option<&String> {
            self.owner.as_ref()
        }

        fn claim(&mut self, owner: String) {
            self.owner = Some(owner);
        }

        fn is_valid(&self) -> bool {
            self.qty > 0
        }
    }

    #[test]
    fn test_add_entity_preserves_insertion_order() {
        let mut root = AggregateRoot::new("agg-1".to_string());
        root.add_entity(Line::new(3, 1)).unwrap();
        root.add_entity(Line::new(1, 1)).unwrap();
        root.add_entity(Line::new(2, 1)).unwrap();

        let ids: Vec<u32> = root.entities().iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![3, 1, 2]);
        assert!(root.is_consistent());
    }

    #[test]
    fn test_entity_owned_elsewhere_is_rejected() {
        let mut first = AggregateRoot::new("agg-1".to_string());
        let mut second = AggregateRoot::new("agg-2".to_string());

        let r = first.add_entity(Line::new(1, 1)).unwrap();
        let stolen = first.entity(&r).unwrap().clone();

        let result = second.add_entity(stolen);
        assert!(matches!(result, Err(DomainError::Ownership { .. })));
        assert!(second.is_empty());
    }

    #[test]
    fn test_duplicate_and_invalid_entities_are_rejected() {
        let mut root = AggregateRoot::new("agg-1".to_string());
        root.add_entity(Line::new(1, 1)).unwrap();

        assert!(matches!(
            root.add_entity(Line::new(1, 5)),
            Err(DomainError::DuplicateEntity { .. })
        ));
        assert!(matches!(
            root.add_entity(Line::new(2, 0)),
            Err(DomainError::InvalidEntity(_))
        ));
        assert_eq!(root.len(), 1);
    }

    #[test]
    fn test_foreign_ref_does_not_resolve() {
        let mut first = AggregateRoot::new("agg-1".to_string());
        let second: AggregateRoot<String, Line> = AggregateRoot::new("agg-2".to_string());
        let r = first.add_entity(Line::new(1, 1)).unwrap();

        assert!(first.entity(&r).is_some());
        assert!(second.entity(&r).is_none());
    }
}
