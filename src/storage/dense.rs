use std::cmp::Ordering;
use std::iter::FusedIterator;
use std::ops::ControlFlow;
use std::{fmt, iter, slice};

use super::{
    ComponentTable, EntityIndex, SparseIndices, DEFAULT_ENTITY_PAGE_SIZE,
    NULL_INDEX,
};
use crate::{Entity, EntityNotFound, EntityRange};

/// A packed component table.
///
/// Components live in one contiguous array and iteration touches every
/// element in order, with no holes. The price is that removal swaps the
/// last component into the vacated position, so packed indices (and
/// component addresses) are invalidated by any mutation. Components whose
/// address must survive mutations belong in a
/// [`StableTable`](super::StableTable) instead.
pub struct DenseTable<C> {
    indices: SparseIndices,
    entities: Vec<Entity>,
    components: Vec<C>,
}

impl<C> DenseTable<C> {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::with_page_size(DEFAULT_ENTITY_PAGE_SIZE)
    }

    /// Creates an empty table with a custom index page size.
    ///
    /// `entity_page_size` must be a power of two.
    pub fn with_page_size(entity_page_size: usize) -> Self {
        let indices = SparseIndices::with_page_size(entity_page_size);
        let entities = Vec::new();
        let components = Vec::new();

        Self { indices, entities, components }
    }

    /// The number of components in the table.
    pub fn len(&self) -> usize {
        self.components.len()
    }

    /// Whether the table holds no components.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether the entity has a component here.
    pub fn contains(&self, entity: Entity) -> bool {
        self.indices.contains(entity)
    }

    /// The packed index of an entity's component, or [`NULL_INDEX`].
    ///
    /// The index is invalidated by any subsequent mutation.
    pub fn index_of(&self, entity: Entity) -> EntityIndex {
        self.indices.get(entity)
    }

    /// The entities in packed order, parallel to the components.
    pub fn entities(&self) -> &[Entity] {
        &self.entities
    }

    /// The components in packed order.
    pub fn components(&self) -> &[C] {
        &self.components
    }

    /// The components in packed order.
    pub fn components_mut(&mut self) -> &mut [C] {
        &mut self.components
    }

    /// Direct access by packed index.
    pub fn at_index(&self, index: EntityIndex) -> &C {
        &self.components[index as usize]
    }

    /// Direct access by packed index.
    pub fn at_index_mut(&mut self, index: EntityIndex) -> &mut C {
        &mut self.components[index as usize]
    }

    /// Returns the component of an entity.
    ///
    /// Panics when the entity has no component here;
    /// [`DenseTable::try_get`] is the checked variant.
    pub fn get(&self, entity: Entity) -> &C {
        let index = self.indices.get(entity);

        debug_assert!(index != NULL_INDEX, "no component for {entity:?}");

        &self.components[index as usize]
    }

    /// Returns the component of an entity.
    ///
    /// Panics when the entity has no component here;
    /// [`DenseTable::try_get_mut`] is the checked variant.
    pub fn get_mut(&mut self, entity: Entity) -> &mut C {
        let index = self.indices.get(entity);

        debug_assert!(index != NULL_INDEX, "no component for {entity:?}");

        &mut self.components[index as usize]
    }

    /// Returns the component of an entity, or an error when absent.
    pub fn try_get(&self, entity: Entity) -> Result<&C, EntityNotFound> {
        self.components
            .get(self.indices.get(entity) as usize)
            .ok_or(EntityNotFound(entity))
    }

    /// Returns the component of an entity, or an error when absent.
    pub fn try_get_mut(
        &mut self,
        entity: Entity,
    ) -> Result<&mut C, EntityNotFound> {
        let index = self.indices.get(entity) as usize;

        self.components.get_mut(index).ok_or(EntityNotFound(entity))
    }

    /// Attaches a component to an entity.
    ///
    /// The entity must not already be present.
    pub fn add(&mut self, entity: Entity, component: C) -> &mut C {
        debug_assert!(!entity.is_null());
        debug_assert!(self.components.len() < NULL_INDEX as usize);

        let index = self.components.len() as EntityIndex;

        self.indices.insert(entity, index);
        self.entities.push(entity);
        self.components.push(component);

        &mut self.components[index as usize]
    }

    /// Attaches a component, overwriting any existing one.
    pub fn try_add(&mut self, entity: Entity, component: C) -> &mut C {
        match self.indices.get(entity) {
            NULL_INDEX => self.add(entity, component),
            index => {
                let slot = &mut self.components[index as usize];

                *slot = component;

                slot
            }
        }
    }

    /// Updates the component of an entity in place, inserting a default
    /// one first when absent.
    ///
    /// The closure always receives a fully initialized component: either
    /// the existing one or the freshly inserted default.
    pub fn try_add_with(
        &mut self,
        entity: Entity,
        f: impl FnOnce(&mut C),
    ) -> &mut C
    where
        C: Default,
    {
        let slot = match self.indices.get(entity) {
            NULL_INDEX => self.add(entity, C::default()),
            index => &mut self.components[index as usize],
        };

        f(&mut *slot);

        slot
    }

    /// Attaches clones of a component to every entity of a range.
    ///
    /// No entity of the range may already be present.
    pub fn add_range(&mut self, range: EntityRange, component: C)
    where
        C: Clone,
    {
        self.add_range_with(range, |_| component.clone());
    }

    /// Attaches a computed component to every entity of a range.
    ///
    /// No entity of the range may already be present.
    pub fn add_range_with(
        &mut self,
        range: EntityRange,
        mut f: impl FnMut(Entity) -> C,
    ) {
        self.reserve(range.len() as usize);

        for entity in range {
            let index = self.components.len() as EntityIndex;

            self.indices.insert(entity, index);
            self.entities.push(entity);
            self.components.push(f(entity));
        }
    }

    /// Reserves capacity for at least `additional` more components.
    pub fn reserve(&mut self, additional: usize) {
        self.entities.reserve(additional);
        self.components.reserve(additional);
    }

    /// Detaches and returns the component of an entity.
    ///
    /// The entity must be present. The last component is swapped into the
    /// vacated position, invalidating its packed index.
    pub fn extract(&mut self, entity: Entity) -> C {
        let index = self.indices.extract(entity) as usize;

        self.entities.swap_remove(index);

        if index < self.entities.len() {
            self.indices.assign(self.entities[index], index as EntityIndex);
        }

        self.components.swap_remove(index)
    }

    /// Detaches the component of an entity.
    ///
    /// The entity must be present.
    pub fn remove(&mut self, entity: Entity) {
        self.extract(entity);
    }

    /// Detaches the component of an entity, if present.
    ///
    /// Returns whether a component was detached.
    pub fn try_remove(&mut self, entity: Entity) -> bool {
        let present = self.contains(entity);

        if present {
            self.remove(entity);
        }

        present
    }

    /// Detaches every entity of a range that is present.
    ///
    /// The packed indices of present entities are collected and the tail
    /// compacted into the holes from the highest index down, then both
    /// arrays are truncated. No-op when nothing in the range is present.
    pub fn remove_range(&mut self, range: EntityRange) {
        let mut holes: Vec<usize> = range
            .iter()
            .map(|entity| self.indices.get(entity))
            .filter(|&index| index != NULL_INDEX)
            .map(|index| index as usize)
            .collect();

        if holes.is_empty() {
            return;
        }

        holes.sort_unstable_by(|a, b| b.cmp(a));

        let mut last = self.entities.len() - 1;

        for &hole in &holes {
            self.indices.remove(self.entities[hole]);

            if hole != last {
                let moved = self.entities[last];

                self.entities[hole] = moved;
                self.components.swap(hole, last);
                self.indices.assign(moved, hole as EntityIndex);
            }

            // wraps when the table empties; the truncation length below is
            // `last + 1` either way
            last = last.wrapping_sub(1);
        }

        let len = last.wrapping_add(1);

        self.entities.truncate(len);
        self.components.truncate(len);
    }

    /// Iterates entity/component pairs in packed order.
    pub fn iter(&self) -> DenseIter<'_, C> {
        DenseIter {
            inner: self.entities.iter().copied().zip(&self.components),
        }
    }

    /// Iterates entity/component pairs in packed order.
    pub fn iter_mut(&mut self) -> DenseIterMut<'_, C> {
        DenseIterMut {
            inner: self.entities.iter().copied().zip(&mut self.components),
        }
    }

    /// Calls `f` with every entity in packed order.
    pub fn for_each_entity(&self, mut f: impl FnMut(Entity)) {
        for &entity in &self.entities {
            f(entity);
        }
    }

    /// Calls `f` with every component in packed order.
    pub fn for_each_component(&self, mut f: impl FnMut(&C)) {
        for component in &self.components {
            f(component);
        }
    }

    /// Calls `f` with every component in packed order.
    pub fn for_each_component_mut(&mut self, mut f: impl FnMut(&mut C)) {
        for component in &mut self.components {
            f(component);
        }
    }

    /// Calls `f` with every entity/component pair in packed order.
    pub fn for_each(&self, mut f: impl FnMut(Entity, &C)) {
        for (entity, component) in self.iter() {
            f(entity, component);
        }
    }

    /// Calls `f` with every entity/component pair in packed order.
    pub fn for_each_mut(&mut self, mut f: impl FnMut(Entity, &mut C)) {
        for (entity, component) in self.iter_mut() {
            f(entity, component);
        }
    }

    /// Like [`DenseTable::for_each`], stopping early when `f` breaks.
    pub fn try_for_each(
        &self,
        mut f: impl FnMut(Entity, &C) -> ControlFlow<()>,
    ) -> ControlFlow<()> {
        for (entity, component) in self.iter() {
            f(entity, component)?;
        }

        ControlFlow::Continue(())
    }

    /// Like [`DenseTable::for_each_mut`], stopping early when `f` breaks.
    pub fn try_for_each_mut(
        &mut self,
        mut f: impl FnMut(Entity, &mut C) -> ControlFlow<()>,
    ) -> ControlFlow<()> {
        for (entity, component) in self.iter_mut() {
            f(entity, component)?;
        }

        ControlFlow::Continue(())
    }

    /// Sorts the table so iteration visits components in `cmp` order.
    ///
    /// The entity array is reordered first; the components and the index
    /// map are then realigned by walking the permutation's cycles, one
    /// swap per element and no extra allocation.
    pub fn sort_by(&mut self, mut cmp: impl FnMut(&C, &C) -> Ordering) {
        let Self { indices, entities, components } = self;

        entities.sort_unstable_by(|&a, &b| {
            cmp(
                &components[indices.get(a) as usize],
                &components[indices.get(b) as usize],
            )
        });

        for i in 0..entities.len() {
            let mut current = i;
            let mut next = indices.get(entities[current]) as usize;

            while next != i {
                components.swap(current, next);
                indices.assign(entities[current], current as EntityIndex);

                current = next;
                next = indices.get(entities[current]) as usize;
            }

            indices.assign(entities[current], current as EntityIndex);
        }
    }

    /// Sorts the table by a key extracted from each component.
    pub fn sort_by_key<K: Ord>(&mut self, mut key: impl FnMut(&C) -> K) {
        self.sort_by(|a, b| key(a).cmp(&key(b)));
    }

    /// Drops every component, keeping allocated capacity.
    pub fn clear(&mut self) {
        self.components.clear();
        self.entities.clear();
        self.indices.clear();
    }

    /// Drops every component and the backing buffers.
    pub fn release(&mut self) {
        self.components = Vec::new();
        self.entities = Vec::new();
        self.indices.release();
    }
}

impl<C> Default for DenseTable<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C> fmt::Debug for DenseTable<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DenseTable")
            .field("len", &self.len())
            .finish_non_exhaustive()
    }
}

impl<C> ComponentTable<C> for DenseTable<C> {
    fn len(&self) -> usize {
        self.len()
    }

    fn contains(&self, entity: Entity) -> bool {
        self.contains(entity)
    }

    fn add(&mut self, entity: Entity, component: C) -> &mut C {
        self.add(entity, component)
    }

    fn try_add(&mut self, entity: Entity, component: C) -> &mut C {
        self.try_add(entity, component)
    }

    fn remove(&mut self, entity: Entity) {
        self.remove(entity);
    }

    fn try_remove(&mut self, entity: Entity) -> bool {
        self.try_remove(entity)
    }

    fn extract(&mut self, entity: Entity) -> C {
        self.extract(entity)
    }

    fn get(&self, entity: Entity) -> &C {
        self.get(entity)
    }

    fn get_mut(&mut self, entity: Entity) -> &mut C {
        self.get_mut(entity)
    }

    fn try_get(&self, entity: Entity) -> Result<&C, EntityNotFound> {
        self.try_get(entity)
    }

    fn try_get_mut(
        &mut self,
        entity: Entity,
    ) -> Result<&mut C, EntityNotFound> {
        self.try_get_mut(entity)
    }

    fn index_of(&self, entity: Entity) -> EntityIndex {
        self.index_of(entity)
    }

    fn clear(&mut self) {
        self.clear();
    }

    fn release(&mut self) {
        self.release();
    }
}

/// Iterator over a [`DenseTable`] in packed order.
pub struct DenseIter<'a, C> {
    inner: iter::Zip<iter::Copied<slice::Iter<'a, Entity>>, slice::Iter<'a, C>>,
}

impl<'a, C> Iterator for DenseIter<'a, C> {
    type Item = (Entity, &'a C);

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<C> DoubleEndedIterator for DenseIter<'_, C> {
    fn next_back(&mut self) -> Option<Self::Item> {
        self.inner.next_back()
    }
}

impl<C> ExactSizeIterator for DenseIter<'_, C> {}

impl<C> FusedIterator for DenseIter<'_, C> {}

/// Mutable iterator over a [`DenseTable`] in packed order.
pub struct DenseIterMut<'a, C> {
    inner:
        iter::Zip<iter::Copied<slice::Iter<'a, Entity>>, slice::IterMut<'a, C>>,
}

impl<'a, C> Iterator for DenseIterMut<'a, C> {
    type Item = (Entity, &'a mut C);

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<C> DoubleEndedIterator for DenseIterMut<'_, C> {
    fn next_back(&mut self) -> Option<Self::Item> {
        self.inner.next_back()
    }
}

impl<C> ExactSizeIterator for DenseIterMut<'_, C> {}

impl<C> FusedIterator for DenseIterMut<'_, C> {}

impl<'a, C> IntoIterator for &'a DenseTable<C> {
    type IntoIter = DenseIter<'a, C>;
    type Item = (Entity, &'a C);

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl<'a, C> IntoIterator for &'a mut DenseTable<C> {
    type IntoIter = DenseIterMut<'a, C>;
    type Item = (Entity, &'a mut C);

    fn into_iter(self) -> Self::IntoIter {
        self.iter_mut()
    }
}
