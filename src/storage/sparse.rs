use std::{fmt, mem};

use super::{EntityIndex, NULL_INDEX};
use crate::Entity;

/// Default number of index slots per page.
pub const DEFAULT_ENTITY_PAGE_SIZE: usize = 1024;

type Page = Box<[EntityIndex]>;

/// A paged map from entity ids to packed indices.
///
/// Pages materialize on the first insert into them, so a few outlying ids
/// do not cost memory proportional to the largest id seen. Absence is
/// encoded as [`NULL_INDEX`]: a lookup through a missing page or an empty
/// slot is a constant-time miss.
#[derive(Clone)]
pub struct SparseIndices {
    pages: Vec<Option<Page>>,
    page_shift: u32,
}

impl SparseIndices {
    /// Creates an empty map with the default page size.
    pub fn new() -> Self {
        Self::with_page_size(DEFAULT_ENTITY_PAGE_SIZE)
    }

    /// Creates an empty map with `page_size` slots per page.
    ///
    /// `page_size` must be a power of two.
    pub fn with_page_size(page_size: usize) -> Self {
        assert!(page_size.is_power_of_two());

        let pages = Vec::new();
        let page_shift = page_size.trailing_zeros();

        Self { pages, page_shift }
    }

    /// The number of slots per page.
    pub const fn page_size(&self) -> usize {
        1 << self.page_shift
    }

    const fn coords(&self, entity: Entity) -> (usize, usize) {
        let id = entity.raw() as usize;

        (id >> self.page_shift, id & (self.page_size() - 1))
    }

    /// Returns the index stored for an entity, or [`NULL_INDEX`].
    pub fn get(&self, entity: Entity) -> EntityIndex {
        let (page, slot) = self.coords(entity);

        match self.pages.get(page) {
            Some(Some(page)) => page[slot],
            _ => NULL_INDEX,
        }
    }

    /// Whether an index is stored for the entity.
    pub fn contains(&self, entity: Entity) -> bool {
        self.get(entity) != NULL_INDEX
    }

    /// Stores the index for an entity with no index yet.
    pub fn insert(&mut self, entity: Entity, index: EntityIndex) {
        debug_assert!(index != NULL_INDEX);

        let slot = self.slot_mut(entity);

        debug_assert!(
            *slot == NULL_INDEX,
            "an index is already stored for {entity:?}"
        );

        *slot = index;
    }

    /// Stores the index for an entity, overwriting any previous one.
    pub fn assign(&mut self, entity: Entity, index: EntityIndex) {
        debug_assert!(index != NULL_INDEX);

        *self.slot_mut(entity) = index;
    }

    /// Resets the slot of an entity back to [`NULL_INDEX`].
    ///
    /// The entity must have an index stored.
    pub fn remove(&mut self, entity: Entity) {
        self.extract(entity);
    }

    /// Resets the slot of an entity, returning the index it held.
    ///
    /// The entity must have an index stored.
    pub fn extract(&mut self, entity: Entity) -> EntityIndex {
        let (page, slot) = self.coords(entity);

        let previous = match self.pages.get_mut(page) {
            Some(Some(page)) => mem::replace(&mut page[slot], NULL_INDEX),
            _ => NULL_INDEX,
        };

        debug_assert!(
            previous != NULL_INDEX,
            "no index stored for {entity:?}"
        );

        previous
    }

    /// Resets every stored index without releasing pages.
    pub fn clear(&mut self) {
        for page in self.pages.iter_mut().flatten() {
            page.fill(NULL_INDEX);
        }
    }

    /// Drops all pages.
    pub fn release(&mut self) {
        self.pages = Vec::new();
    }

    fn slot_mut(&mut self, entity: Entity) -> &mut EntityIndex {
        let (page, slot) = self.coords(entity);
        let page_size = self.page_size();

        if page >= self.pages.len() {
            self.pages.resize_with(page + 1, || None);
        }

        let page = self.pages[page]
            .get_or_insert_with(|| vec![NULL_INDEX; page_size].into_boxed_slice());

        &mut page[slot]
    }
}

impl Default for SparseIndices {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for SparseIndices {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SparseIndices")
            .field("pages", &self.pages.len())
            .field("page_size", &self.page_size())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_get_remove() {
        let mut indices = SparseIndices::new();
        let entity = Entity::from_raw(7);

        assert_eq!(indices.get(entity), NULL_INDEX);
        assert!(!indices.contains(entity));

        indices.insert(entity, 3);

        assert_eq!(indices.get(entity), 3);
        assert!(indices.contains(entity));

        indices.remove(entity);

        assert_eq!(indices.get(entity), NULL_INDEX);
    }

    #[test]
    fn assign_overwrites() {
        let mut indices = SparseIndices::new();
        let entity = Entity::from_raw(12);

        indices.insert(entity, 1);
        indices.assign(entity, 2);

        assert_eq!(indices.extract(entity), 2);
    }

    #[test]
    fn pages_materialize_lazily() {
        let mut indices = SparseIndices::with_page_size(16);

        // far id: only its own page is backed
        indices.insert(Entity::from_raw(1000), 0);

        assert_eq!(indices.get(Entity::from_raw(999)), NULL_INDEX);
        assert_eq!(indices.get(Entity::from_raw(1000)), 0);
        assert_eq!(indices.get(Entity::from_raw(0)), NULL_INDEX);

        indices.insert(Entity::from_raw(15), 1);
        indices.insert(Entity::from_raw(16), 2);

        assert_eq!(indices.get(Entity::from_raw(15)), 1);
        assert_eq!(indices.get(Entity::from_raw(16)), 2);
    }

    #[test]
    fn clear_keeps_pages_but_forgets_slots() {
        let mut indices = SparseIndices::with_page_size(8);

        indices.insert(Entity::from_raw(3), 0);
        indices.insert(Entity::from_raw(21), 1);

        indices.clear();

        assert_eq!(indices.get(Entity::from_raw(3)), NULL_INDEX);
        assert_eq!(indices.get(Entity::from_raw(21)), NULL_INDEX);

        indices.clear();
        indices.release();

        assert_eq!(indices.get(Entity::from_raw(3)), NULL_INDEX);
    }
}
