//! Component storage: the paged index map and the two table flavors.

pub use self::dense::*;
pub use self::sparse::*;
pub use self::stable::*;

mod dense;
mod page;
mod sparse;
mod stable;

use crate::{Entity, EntityNotFound};

/// A position inside a table's packed storage.
pub type EntityIndex = u32;

/// The reserved index marking "no such index".
pub const NULL_INDEX: EntityIndex = u32::MAX;

/// Operations shared by [`DenseTable`] and [`StableTable`].
///
/// Systems pick a concrete table type per component; the trait exists for
/// code generic over the flavor, not for dynamic dispatch on hot paths.
pub trait ComponentTable<C> {
    /// The number of live components.
    fn len(&self) -> usize;

    /// Whether the table holds no components.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether the entity has a component here.
    fn contains(&self, entity: Entity) -> bool;

    /// Attaches a component to an entity that must not be present.
    fn add(&mut self, entity: Entity, component: C) -> &mut C;

    /// Attaches a component, overwriting any existing one.
    fn try_add(&mut self, entity: Entity, component: C) -> &mut C;

    /// Detaches the component of an entity that must be present.
    fn remove(&mut self, entity: Entity);

    /// Detaches the component of an entity, if present.
    ///
    /// Returns whether a component was detached.
    fn try_remove(&mut self, entity: Entity) -> bool;

    /// Detaches and returns the component of an entity that must be
    /// present.
    fn extract(&mut self, entity: Entity) -> C;

    /// Returns the component of an entity, panicking when absent.
    fn get(&self, entity: Entity) -> &C;

    /// Returns the component of an entity, panicking when absent.
    fn get_mut(&mut self, entity: Entity) -> &mut C;

    /// Returns the component of an entity.
    fn try_get(&self, entity: Entity) -> Result<&C, EntityNotFound>;

    /// Returns the component of an entity.
    fn try_get_mut(&mut self, entity: Entity)
        -> Result<&mut C, EntityNotFound>;

    /// The current packed index of an entity, or [`NULL_INDEX`].
    fn index_of(&self, entity: Entity) -> EntityIndex;

    /// Drops every component, keeping allocated capacity.
    fn clear(&mut self);

    /// Drops every component and the backing buffers.
    fn release(&mut self);
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Exercises the surface shared by both flavors through the trait.
    fn round_trip<T: ComponentTable<u32>>(table: &mut T) {
        let entity = Entity::from_raw(5);

        assert!(table.is_empty());

        table.add(entity, 1);

        assert_eq!(table.len(), 1);
        assert!(table.contains(entity));
        assert_eq!(*table.get(entity), 1);

        *table.get_mut(entity) = 2;
        table.try_add(entity, 3);

        assert_eq!(table.try_get(entity), Ok(&3));
        assert_ne!(table.index_of(entity), NULL_INDEX);
        assert_eq!(table.extract(entity), 3);
        assert_eq!(table.index_of(entity), NULL_INDEX);
        assert!(!table.try_remove(entity));

        table.add(entity, 4);
        table.remove(entity);
        table.add(entity, 5);
        table.clear();

        assert!(table.is_empty());
        assert_eq!(
            table.try_get_mut(entity),
            Err(EntityNotFound(entity))
        );

        table.release();
    }

    #[test]
    fn trait_surface_round_trips() {
        round_trip(&mut DenseTable::new());
        round_trip(&mut StableTable::new());
    }
}
