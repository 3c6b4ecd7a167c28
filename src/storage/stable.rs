use std::cmp::Ordering;
use std::iter::FusedIterator;
use std::marker::PhantomData;
use std::ops::ControlFlow;
use std::{fmt, iter, mem, ptr, slice};

use super::page::ComponentPage;
use super::{
    ComponentTable, EntityIndex, SparseIndices, DEFAULT_ENTITY_PAGE_SIZE,
    NULL_INDEX,
};
use crate::{Entity, EntityNotFound, EntityRange};

/// Target component page footprint, in bytes.
const PAGE_BYTES: usize = 4096;

/// A component table with stable addresses.
///
/// Components live in fixed pages and never move while their entity stays
/// in the table: removal drops the component in place and leaves a
/// tombstone instead of shifting neighbours. Tombstoned slots are reused
/// by later insertions (most recent first) and reclaimed wholesale by
/// [`StableTable::pack`]; operations that need density, such as sorting,
/// pack implicitly. Iteration skips tombstones.
pub struct StableTable<C> {
    indices: SparseIndices,
    /// Slot owners; [`Entity::NULL`] marks a tombstone.
    entities: Vec<Entity>,
    pages: Vec<ComponentPage<C>>,
    /// Vacant slot indices, reused last-in first-out.
    tombstones: Vec<EntityIndex>,
    page_shift: u32,
}

impl<C> StableTable<C> {
    /// Creates an empty table with default page sizes.
    ///
    /// Component pages default to roughly 4 KiB each.
    pub fn new() -> Self {
        Self::with_page_sizes(
            DEFAULT_ENTITY_PAGE_SIZE,
            default_component_page_size::<C>(),
        )
    }

    /// Creates an empty table with explicit page sizes.
    ///
    /// Both sizes must be powers of two.
    pub fn with_page_sizes(
        entity_page_size: usize,
        component_page_size: usize,
    ) -> Self {
        assert!(component_page_size.is_power_of_two());

        Self {
            indices: SparseIndices::with_page_size(entity_page_size),
            entities: Vec::new(),
            pages: Vec::new(),
            tombstones: Vec::new(),
            page_shift: component_page_size.trailing_zeros(),
        }
    }

    /// The number of components per page.
    pub const fn component_page_size(&self) -> usize {
        1 << self.page_shift
    }

    /// The number of live components in the table.
    pub fn len(&self) -> usize {
        self.entities.len() - self.tombstones.len()
    }

    /// Whether the table holds no live components.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether the entity has a component here.
    pub fn contains(&self, entity: Entity) -> bool {
        self.indices.contains(entity)
    }

    /// The slot index of an entity's component, or [`NULL_INDEX`].
    ///
    /// Slot indices stay valid until the entity is removed or the table
    /// is packed.
    pub fn index_of(&self, entity: Entity) -> EntityIndex {
        self.indices.get(entity)
    }

    /// The slot array, including [`Entity::NULL`] tombstones.
    pub fn entities(&self) -> &[Entity] {
        &self.entities
    }

    /// The number of tombstoned slots awaiting [`StableTable::pack`].
    pub fn tombstone_count(&self) -> usize {
        self.tombstones.len()
    }

    /// Direct access by slot index.
    ///
    /// Panics when the slot is out of range or tombstoned.
    pub fn at_index(&self, index: EntityIndex) -> &C {
        assert!(
            !self.entities[index as usize].is_null(),
            "slot {index} is vacant"
        );

        // SAFETY: non-tombstone slots are live
        unsafe { self.slot(index as usize) }
    }

    /// Direct access by slot index.
    ///
    /// Panics when the slot is out of range or tombstoned.
    pub fn at_index_mut(&mut self, index: EntityIndex) -> &mut C {
        assert!(
            !self.entities[index as usize].is_null(),
            "slot {index} is vacant"
        );

        // SAFETY: non-tombstone slots are live
        unsafe { self.slot_mut(index as usize) }
    }

    /// Returns the component of an entity.
    ///
    /// Panics when the entity has no component here;
    /// [`StableTable::try_get`] is the checked variant.
    pub fn get(&self, entity: Entity) -> &C {
        let index = self.indices.get(entity);

        assert!(index != NULL_INDEX, "no component for {entity:?}");

        // SAFETY: a mapped index is a live slot
        unsafe { self.slot(index as usize) }
    }

    /// Returns the component of an entity.
    ///
    /// Panics when the entity has no component here;
    /// [`StableTable::try_get_mut`] is the checked variant.
    pub fn get_mut(&mut self, entity: Entity) -> &mut C {
        let index = self.indices.get(entity);

        assert!(index != NULL_INDEX, "no component for {entity:?}");

        // SAFETY: a mapped index is a live slot
        unsafe { self.slot_mut(index as usize) }
    }

    /// Returns the component of an entity, or an error when absent.
    pub fn try_get(&self, entity: Entity) -> Result<&C, EntityNotFound> {
        match self.indices.get(entity) {
            NULL_INDEX => Err(EntityNotFound(entity)),
            // SAFETY: a mapped index is a live slot
            index => Ok(unsafe { self.slot(index as usize) }),
        }
    }

    /// Returns the component of an entity, or an error when absent.
    pub fn try_get_mut(
        &mut self,
        entity: Entity,
    ) -> Result<&mut C, EntityNotFound> {
        match self.indices.get(entity) {
            NULL_INDEX => Err(EntityNotFound(entity)),
            // SAFETY: a mapped index is a live slot
            index => Ok(unsafe { self.slot_mut(index as usize) }),
        }
    }

    /// Attaches a component to an entity.
    ///
    /// The most recently tombstoned slot is reused when one exists;
    /// otherwise a fresh slot is appended, growing the page list on
    /// demand. The entity must not already be present.
    pub fn add(&mut self, entity: Entity, component: C) -> &mut C {
        debug_assert!(!entity.is_null());

        let index = match self.tombstones.pop() {
            Some(index) => {
                self.entities[index as usize] = entity;

                index
            }
            None => {
                let index = self.entities.len() as EntityIndex;

                debug_assert!(index != NULL_INDEX);

                self.entities.push(entity);

                if self.pages.len() << self.page_shift < self.entities.len() {
                    self.pages
                        .push(ComponentPage::new(self.component_page_size()));
                }

                index
            }
        };

        self.indices.insert(entity, index);

        // SAFETY: the slot is a freshly appended cell or a popped
        // tombstone, vacant either way
        unsafe { self.slot_write(index as usize, component) }
    }

    /// Attaches a component, overwriting any existing one.
    pub fn try_add(&mut self, entity: Entity, component: C) -> &mut C {
        match self.indices.get(entity) {
            NULL_INDEX => self.add(entity, component),
            index => {
                // SAFETY: a mapped index is a live slot
                let slot = unsafe { self.slot_mut(index as usize) };

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
        let index = match self.indices.get(entity) {
            NULL_INDEX => {
                self.add(entity, C::default());

                self.indices.get(entity)
            }
            index => index,
        };

        // SAFETY: a mapped index is a live slot
        let slot = unsafe { self.slot_mut(index as usize) };

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
        for entity in range {
            self.add(entity, f(entity));
        }
    }

    /// Reserves slot capacity for at least `additional` more components.
    pub fn reserve(&mut self, additional: usize) {
        self.entities.reserve(additional);

        while self.pages.len() << self.page_shift
            < self.entities.len() + additional
        {
            self.pages.push(ComponentPage::new(self.component_page_size()));
        }
    }

    /// Detaches and returns the component of an entity.
    ///
    /// The slot becomes a tombstone; no other component moves and every
    /// other component address is preserved. The entity must be present.
    pub fn extract(&mut self, entity: Entity) -> C {
        let index = self.indices.extract(entity);

        self.entities[index as usize] = Entity::NULL;
        self.tombstones.push(index);

        // SAFETY: a mapped index is a live slot
        unsafe { self.slot_take(index as usize) }
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

    /// Detaches every entity of a range.
    ///
    /// Every entity of the range must be present.
    pub fn remove_range(&mut self, range: EntityRange) {
        for entity in range {
            self.remove(entity);
        }
    }

    /// Reclaims every tombstoned slot, restoring density.
    ///
    /// Live components shift down into the holes in a single pass, so
    /// live entries keep their relative slot order while their addresses
    /// and slot indices change; the slot array is truncated to the live
    /// length. No-op when there are no tombstones.
    pub fn pack(&mut self) {
        if self.tombstones.is_empty() {
            return;
        }

        let mut write = 0;

        for read in 0..self.entities.len() {
            let entity = self.entities[read];

            if entity.is_null() {
                continue;
            }

            if read != write {
                // SAFETY: slots below `write` are live and compacted;
                // the slots between `write` and `read` were tombstones
                // or have already been moved out, so `write` is vacant
                // and `read` live. The move leaves exactly one
                // initialized copy
                unsafe {
                    let component = self.slot_take(read);

                    self.slot_write(write, component);
                }

                self.entities[write] = entity;
                self.indices.assign(entity, write as EntityIndex);
            }

            write += 1;
        }

        self.entities.truncate(write);
        self.tombstones.clear();
    }

    /// Iterates live entity/component pairs in slot order.
    pub fn iter(&self) -> StableIter<'_, C> {
        StableIter {
            entities: self.entities.iter().enumerate(),
            table: self,
            len: self.len(),
        }
    }

    /// Iterates live entity/component pairs in slot order.
    pub fn iter_mut(&mut self) -> StableIterMut<'_, C> {
        let len = self.len();
        let page_shift = self.page_shift;
        let Self { entities, pages, .. } = self;

        StableIterMut {
            entities: entities.iter().enumerate(),
            pages: pages.as_mut_ptr(),
            page_shift,
            len,
            _marker: PhantomData,
        }
    }

    /// Calls `f` with every live entity in slot order.
    pub fn for_each_entity(&self, mut f: impl FnMut(Entity)) {
        for &entity in &self.entities {
            if !entity.is_null() {
                f(entity);
            }
        }
    }

    /// Calls `f` with every live component in slot order.
    pub fn for_each_component(&self, mut f: impl FnMut(&C)) {
        for (_, component) in self.iter() {
            f(component);
        }
    }

    /// Calls `f` with every live component in slot order.
    pub fn for_each_component_mut(&mut self, mut f: impl FnMut(&mut C)) {
        for (_, component) in self.iter_mut() {
            f(component);
        }
    }

    /// Calls `f` with every live entity/component pair in slot order.
    pub fn for_each(&self, mut f: impl FnMut(Entity, &C)) {
        for (entity, component) in self.iter() {
            f(entity, component);
        }
    }

    /// Calls `f` with every live entity/component pair in slot order.
    pub fn for_each_mut(&mut self, mut f: impl FnMut(Entity, &mut C)) {
        for (entity, component) in self.iter_mut() {
            f(entity, component);
        }
    }

    /// Like [`StableTable::for_each`], stopping early when `f` breaks.
    pub fn try_for_each(
        &self,
        mut f: impl FnMut(Entity, &C) -> ControlFlow<()>,
    ) -> ControlFlow<()> {
        for (entity, component) in self.iter() {
            f(entity, component)?;
        }

        ControlFlow::Continue(())
    }

    /// Like [`StableTable::for_each_mut`], stopping early when `f`
    /// breaks.
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
    /// Packs first, then realigns components and the index map with the
    /// same cycle walk as the dense table, swapping components through
    /// their page slots. Addresses and slot indices are rewritten.
    pub fn sort_by(&mut self, mut cmp: impl FnMut(&C, &C) -> Ordering) {
        self.pack();

        let shift = self.page_shift;
        let mask = (1usize << shift) - 1;
        let Self { indices, entities, pages, .. } = self;

        entities.sort_unstable_by(|&a, &b| {
            let a = indices.get(a) as usize;
            let b = indices.get(b) as usize;

            // SAFETY: a packed table is live below its length
            unsafe {
                cmp(
                    pages[a >> shift].get(a & mask),
                    pages[b >> shift].get(b & mask),
                )
            }
        });

        for i in 0..entities.len() {
            let mut current = i;
            let mut next = indices.get(entities[current]) as usize;

            while next != i {
                // SAFETY: both slots are live; positions within a cycle
                // are distinct
                unsafe { swap_slots(pages, shift, current, next) };
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

    /// Drops every live component, keeping pages and capacity.
    pub fn clear(&mut self) {
        let shift = self.page_shift;
        let mask = (1usize << shift) - 1;
        let Self { entities, pages, .. } = self;

        for (index, entity) in entities.iter().enumerate() {
            if !entity.is_null() {
                // SAFETY: non-tombstone slots are live
                unsafe { pages[index >> shift].drop_cell(index & mask) };
            }
        }

        entities.clear();
        self.tombstones.clear();
        self.indices.clear();
    }

    /// Drops every live component and all backing buffers.
    pub fn release(&mut self) {
        self.clear();

        self.pages = Vec::new();
        self.entities = Vec::new();
        self.tombstones = Vec::new();
        self.indices.release();
    }

    const fn page_coords(&self, index: usize) -> (usize, usize) {
        (index >> self.page_shift, index & (self.component_page_size() - 1))
    }

    /// # Safety
    ///
    /// The slot must be live.
    unsafe fn slot(&self, index: usize) -> &C {
        let (page, cell) = self.page_coords(index);

        unsafe { self.pages[page].get(cell) }
    }

    /// # Safety
    ///
    /// The slot must be live.
    unsafe fn slot_mut(&mut self, index: usize) -> &mut C {
        let (page, cell) = self.page_coords(index);

        unsafe { self.pages[page].get_mut(cell) }
    }

    /// # Safety
    ///
    /// The slot must be live; it becomes vacant.
    unsafe fn slot_take(&mut self, index: usize) -> C {
        let (page, cell) = self.page_coords(index);

        unsafe { self.pages[page].take(cell) }
    }

    /// # Safety
    ///
    /// The slot must be in-bounds and vacant.
    unsafe fn slot_write(&mut self, index: usize, component: C) -> &mut C {
        let (page, cell) = self.page_coords(index);

        unsafe { self.pages[page].write(cell, component) }
    }
}

/// Component page width such that a page spans roughly `PAGE_BYTES`.
const fn default_component_page_size<C>() -> usize {
    let size = mem::size_of::<C>();
    let per_page = if size == 0 { PAGE_BYTES } else { PAGE_BYTES / size };

    if per_page <= 1 {
        1
    } else {
        // round down to a power of two
        1 << (usize::BITS - 1 - per_page.leading_zeros())
    }
}

/// Swaps two live component slots.
///
/// # Safety
///
/// Both slots must be live, in-bounds, and distinct.
unsafe fn swap_slots<C>(
    pages: &mut [ComponentPage<C>],
    shift: u32,
    a: usize,
    b: usize,
) {
    let mask = (1usize << shift) - 1;
    let base = pages.as_mut_ptr();

    // SAFETY: the slots are distinct even when they share a page, so the
    // two pointers never alias
    unsafe {
        let a = (*base.add(a >> shift)).as_mut_ptr().add(a & mask);
        let b = (*base.add(b >> shift)).as_mut_ptr().add(b & mask);

        ptr::swap(a, b);
    }
}

impl<C> Default for StableTable<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C> Drop for StableTable<C> {
    fn drop(&mut self) {
        self.clear();
    }
}

impl<C> fmt::Debug for StableTable<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StableTable")
            .field("len", &self.len())
            .field("tombstones", &self.tombstones.len())
            .finish_non_exhaustive()
    }
}

impl<C> ComponentTable<C> for StableTable<C> {
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

/// Iterator over the live entries of a [`StableTable`], in slot order.
pub struct StableIter<'a, C> {
    entities: iter::Enumerate<slice::Iter<'a, Entity>>,
    table: &'a StableTable<C>,
    /// Live entries left to yield.
    len: usize,
}

impl<'a, C> Iterator for StableIter<'a, C> {
    type Item = (Entity, &'a C);

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let (index, &entity) = self.entities.next()?;

            if !entity.is_null() {
                self.len -= 1;

                // SAFETY: non-tombstone slots are live
                return Some((entity, unsafe { self.table.slot(index) }));
            }
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.len, Some(self.len))
    }
}

impl<C> DoubleEndedIterator for StableIter<'_, C> {
    fn next_back(&mut self) -> Option<Self::Item> {
        loop {
            let (index, &entity) = self.entities.next_back()?;

            if !entity.is_null() {
                self.len -= 1;

                // SAFETY: non-tombstone slots are live
                return Some((entity, unsafe { self.table.slot(index) }));
            }
        }
    }
}

impl<C> ExactSizeIterator for StableIter<'_, C> {}

impl<C> FusedIterator for StableIter<'_, C> {}

/// Mutable iterator over the live entries of a [`StableTable`], in slot
/// order.
pub struct StableIterMut<'a, C> {
    entities: iter::Enumerate<slice::Iter<'a, Entity>>,
    pages: *mut ComponentPage<C>,
    page_shift: u32,
    /// Live entries left to yield.
    len: usize,
    _marker: PhantomData<&'a mut C>,
}

impl<'a, C> StableIterMut<'a, C> {
    /// # Safety
    ///
    /// The slot must be live and not yielded before.
    unsafe fn slot(&mut self, index: usize) -> &'a mut C {
        let mask = (1usize << self.page_shift) - 1;

        // SAFETY: the page index is in-bounds for the table the iterator
        // borrows; distinct slots yield distinct references
        unsafe {
            let page = self.pages.add(index >> self.page_shift);
            let cell = (*page).as_mut_ptr().add(index & mask).cast::<C>();

            &mut *cell
        }
    }
}

impl<'a, C> Iterator for StableIterMut<'a, C> {
    type Item = (Entity, &'a mut C);

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let (index, &entity) = self.entities.next()?;

            if !entity.is_null() {
                self.len -= 1;

                // SAFETY: non-tombstone slots are live, each yielded once
                return Some((entity, unsafe { self.slot(index) }));
            }
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.len, Some(self.len))
    }
}

impl<C> DoubleEndedIterator for StableIterMut<'_, C> {
    fn next_back(&mut self) -> Option<Self::Item> {
        loop {
            let (index, &entity) = self.entities.next_back()?;

            if !entity.is_null() {
                self.len -= 1;

                // SAFETY: non-tombstone slots are live, each yielded once
                return Some((entity, unsafe { self.slot(index) }));
            }
        }
    }
}

impl<C> ExactSizeIterator for StableIterMut<'_, C> {}

impl<C> FusedIterator for StableIterMut<'_, C> {}

impl<'a, C> IntoIterator for &'a StableTable<C> {
    type IntoIter = StableIter<'a, C>;
    type Item = (Entity, &'a C);

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl<'a, C> IntoIterator for &'a mut StableTable<C> {
    type IntoIter = StableIterMut<'a, C>;
    type Item = (Entity, &'a mut C);

    fn into_iter(self) -> Self::IntoIter {
        self.iter_mut()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    fn entity(id: u32) -> Entity {
        Entity::from_raw(id)
    }

    #[test]
    fn tombstones_preserve_addresses() {
        let mut table = StableTable::new();

        for id in 1..=5 {
            table.add(entity(id), id as u64);
        }

        let addresses: Vec<_> = [1, 3, 5]
            .map(|id| table.get(entity(id)) as *const u64)
            .to_vec();

        table.remove(entity(2));
        table.remove(entity(4));

        assert_eq!(table.len(), 3);
        assert_eq!(table.tombstone_count(), 2);
        assert_eq!(
            table.entities(),
            [entity(1), Entity::NULL, entity(3), Entity::NULL, entity(5)]
        );

        for (i, id) in [1, 3, 5].into_iter().enumerate() {
            assert_eq!(table.get(entity(id)) as *const u64, addresses[i]);
            assert_eq!(*table.get(entity(id)), id as u64);
        }

        // the most recent tombstone is reused first
        table.add(entity(6), 6);

        assert_eq!(table.index_of(entity(6)), 3);
        assert_eq!(
            table.entities(),
            [entity(1), Entity::NULL, entity(3), entity(6), entity(5)]
        );
    }

    #[test]
    fn pack_restores_density() {
        let mut table = StableTable::new();

        for id in 1..=5 {
            table.add(entity(id), id as u64);
        }

        table.remove(entity(2));
        table.remove(entity(4));
        table.pack();

        assert_eq!(table.len(), 3);
        assert_eq!(table.tombstone_count(), 0);
        assert_eq!(table.entities(), [entity(1), entity(3), entity(5)]);

        let pairs: Vec<_> =
            table.iter().map(|(entity, &value)| (entity.raw(), value)).collect();

        assert_eq!(pairs, [(1, 1), (3, 3), (5, 5)]);

        // packing a dense table changes nothing
        table.pack();

        assert_eq!(table.entities(), [entity(1), entity(3), entity(5)]);
    }

    #[test]
    fn iteration_skips_tombstones() {
        let mut table = StableTable::new();

        for id in 1..=6 {
            table.add(entity(id), id);
        }

        table.remove(entity(1));
        table.remove(entity(4));
        table.remove(entity(6));

        let mut iter = table.iter();

        assert_eq!(iter.len(), 3);
        assert_eq!(iter.next().map(|(entity, _)| entity.raw()), Some(2));
        assert_eq!(iter.next_back().map(|(entity, _)| entity.raw()), Some(5));
        assert_eq!(iter.next().map(|(entity, _)| entity.raw()), Some(3));
        assert_eq!(iter.next(), None);
        assert_eq!(iter.next_back(), None);

        for (entity, value) in &mut table {
            *value += entity.raw();
        }

        assert_eq!(*table.get(entity(2)), 4);
        assert_eq!(*table.get(entity(3)), 6);
        assert_eq!(*table.get(entity(5)), 10);
    }

    #[test]
    fn sort_packs_first_and_realigns() {
        let mut table = StableTable::new();

        table.add(entity(1), 3);
        table.add(entity(2), 1);
        table.add(entity(3), 5);
        table.add(entity(4), 2);

        table.remove(entity(3));
        table.sort_by(|a, b| a.cmp(b));

        assert_eq!(table.tombstone_count(), 0);
        assert_eq!(table.entities(), [entity(2), entity(4), entity(1)]);

        let values: Vec<_> = table.iter().map(|(_, &value)| value).collect();

        assert_eq!(values, [1, 2, 3]);

        for (i, &entity) in table.entities().iter().enumerate() {
            assert_eq!(table.index_of(entity) as usize, i);
        }
    }

    #[test]
    fn range_round_trip_packs_clean() {
        let mut table = StableTable::new();

        table.add_range_with(EntityRange::from_raw(0, 100), |entity| {
            entity.raw() as u64
        });

        assert_eq!(table.len(), 100);

        table.remove_range(EntityRange::from_raw(0, 25));
        table.pack();

        assert_eq!(table.len(), 75);
        assert_eq!(table.tombstone_count(), 0);

        table.remove_range(EntityRange::from_raw(25, 50));
        table.pack();

        assert_eq!(table.len(), 50);
        assert_eq!(table.tombstone_count(), 0);

        for id in 50..100 {
            assert_eq!(*table.get(entity(id)), id as u64);
        }
    }

    #[test]
    fn small_pages_span_multiple_allocations() {
        let mut table = StableTable::with_page_sizes(16, 4);

        table.reserve(24);

        for id in 0..40 {
            table.add(entity(id), id);
        }

        assert_eq!(table.component_page_size(), 4);

        for id in 0..40 {
            assert_eq!(*table.get(entity(id)), id);
        }

        table.remove_range(EntityRange::from_raw(10, 30));
        table.pack();

        assert_eq!(table.len(), 20);

        for id in (0..10).chain(30..40) {
            assert_eq!(*table.get(entity(id)), id);
        }
    }

    #[test]
    fn drops_run_for_live_components_only() {
        static DROPS: AtomicUsize = AtomicUsize::new(0);

        struct Counted;

        impl Drop for Counted {
            fn drop(&mut self) {
                DROPS.fetch_add(1, Ordering::Relaxed);
            }
        }

        {
            let mut table = StableTable::new();

            for id in 1..=4 {
                table.add(entity(id), Counted);
            }

            table.remove(entity(2));

            assert_eq!(DROPS.load(Ordering::Relaxed), 1);

            table.clear();

            assert_eq!(DROPS.load(Ordering::Relaxed), 4);

            table.add(entity(1), Counted);
        }

        // dropping the table drops the remaining live component
        assert_eq!(DROPS.load(Ordering::Relaxed), 5);
    }

    #[test]
    fn traversals_skip_tombstones() {
        let mut table = StableTable::new();

        for id in 1..=5 {
            table.add(entity(id), u64::from(id));
        }

        table.remove(entity(3));

        let mut ids = Vec::new();
        table.for_each_entity(|entity| ids.push(entity.raw()));

        assert_eq!(ids, [1, 2, 4, 5]);

        let mut total = 0;
        table.for_each_component(|&value| total += value);

        assert_eq!(total, 12);

        table.for_each_component_mut(|value| *value *= 10);
        table.for_each_mut(|entity, value| *value += u64::from(entity.raw()));

        let mut pairs = Vec::new();
        table.for_each(|entity, &value| pairs.push((entity.raw(), value)));

        assert_eq!(pairs, [(1, 11), (2, 22), (4, 44), (5, 55)]);

        let mut visited = 0;
        let flow = table.try_for_each(|_, _| {
            visited += 1;

            ControlFlow::Break(())
        });

        assert_eq!(flow, ControlFlow::Break(()));
        assert_eq!(visited, 1);

        let _ = table.try_for_each_mut(|_, value| {
            *value = 0;

            ControlFlow::Continue(())
        });

        assert_eq!(*table.get(entity(5)), 0);
    }

    #[test]
    fn sort_by_key_and_slot_access() {
        let mut table = StableTable::new();

        table.add(entity(1), 30u64);
        table.add(entity(2), 10);
        table.add(entity(3), 20);

        table.sort_by_key(|&value| value);

        assert_eq!(*table.at_index(0), 10);
        assert_eq!(*table.at_index(2), 30);

        *table.at_index_mut(1) = 25;

        assert_eq!(*table.get(entity(3)), 25);
    }

    #[test]
    fn try_add_with_and_try_remove() {
        let mut table = StableTable::<u32>::new();

        table.try_add_with(entity(9), |value| *value += 1);
        table.try_add_with(entity(9), |value| *value += 1);

        assert_eq!(*table.get(entity(9)), 2);
        assert_eq!(*table.try_add(entity(9), 7), 7);

        assert!(table.try_remove(entity(9)));
        assert!(!table.try_remove(entity(9)));
        assert_eq!(table.try_get(entity(9)), Err(EntityNotFound(entity(9))));
    }

    #[test]
    fn clear_and_release_are_idempotent() {
        let mut table = StableTable::new();

        table.add(entity(1), String::from("a"));
        table.add(entity(2), String::from("b"));
        table.remove(entity(1));

        table.clear();
        table.clear();

        assert!(table.is_empty());
        assert_eq!(table.tombstone_count(), 0);

        table.add(entity(1), String::from("c"));

        assert_eq!(*table.get(entity(1)), "c");

        table.release();
        table.release();

        assert!(table.is_empty());
    }
}
