use super::{Entity, EntityRange};

/// Issues and recycles entity ids.
///
/// Ids start at `1` and grow monotonically; released ids are kept as
/// disjoint, non-adjacent ranges sorted by `begin` and are reissued
/// front-first, so recycled ids come back in coalesced contiguous runs.
#[derive(Debug, Clone)]
pub struct EntityAllocator {
    /// The largest id ever issued.
    last: u32,
    free: Vec<EntityRange>,
}

impl EntityAllocator {
    /// Creates an allocator with no issued ids.
    pub const fn new() -> Self {
        let last = 0;
        let free = Vec::new();

        Self { last, free }
    }

    /// The largest id issued so far, `0` if none.
    pub const fn last(&self) -> u32 {
        self.last
    }

    /// The released ranges awaiting reissue, sorted by `begin`.
    pub fn free_ranges(&self) -> &[EntityRange] {
        &self.free
    }

    /// Issues a single id.
    ///
    /// Recycled ids are preferred, taken from the front of the lowest
    /// released range; otherwise the id space grows by one.
    pub fn add(&mut self) -> Entity {
        if let Some(head) = self.free.first_mut() {
            let entity = head.begin;

            head.begin = Entity::from_raw(entity.raw() + 1);

            if head.is_empty() {
                self.free.remove(0);
            }

            entity
        } else {
            self.grow(1).begin
        }
    }

    /// Issues `count` contiguous ids.
    ///
    /// The first released range that fits loses its front `count` ids;
    /// otherwise the id space grows by `count`.
    pub fn add_range(&mut self, count: u32) -> EntityRange {
        let position = self.free.iter().position(|range| range.len() >= count);

        match position {
            Some(i) => {
                let range = &mut self.free[i];
                let taken = EntityRange::new(
                    range.begin,
                    Entity::from_raw(range.begin.raw() + count),
                );

                range.begin = taken.end;

                if range.is_empty() {
                    self.free.remove(i);
                }

                taken
            }
            None => self.grow(count),
        }
    }

    /// Releases an id for reuse.
    ///
    /// Releasing the most recently issued id rewinds the id space instead
    /// of touching the released ranges; the two are never merged back
    /// together afterwards.
    pub fn remove(&mut self, entity: Entity) {
        let id = entity.raw();

        debug_assert!(id != 0 && !entity.is_null());
        debug_assert!(id <= self.last, "{entity:?} was never issued");

        if id == self.last {
            self.last -= 1;

            return;
        }

        let position =
            self.free.partition_point(|range| range.end.raw() < id);

        if let Some(range) = self.free.get_mut(position) {
            if range.end.raw() == id {
                range.end = Entity::from_raw(id + 1);
                self.merge_at(position);

                return;
            }

            debug_assert!(
                !range.contains(entity),
                "double release of {entity:?}"
            );

            if range.begin.raw() == id + 1 {
                range.begin = entity;

                return;
            }
        }

        self.free
            .insert(position, EntityRange::new(entity, Entity::from_raw(id + 1)));
    }

    /// Releases a whole range of ids.
    ///
    /// A range ending at the most recently issued id rewinds the id space,
    /// as in [`EntityAllocator::remove`].
    pub fn remove_range(&mut self, range: EntityRange) {
        if range.is_empty() {
            return;
        }

        debug_assert!(range.begin.raw() != 0);
        debug_assert!(range.end.raw() - 1 <= self.last);

        if range.end.raw() - 1 == self.last {
            self.last = range.begin.raw() - 1;

            return;
        }

        let position = self
            .free
            .partition_point(|other| other.end.raw() < range.begin.raw());

        if let Some(found) = self.free.get_mut(position) {
            if found.end == range.begin {
                found.end = range.end;
                self.merge_at(position);

                return;
            }

            debug_assert!(
                found.begin.raw() >= range.end.raw(),
                "double release within {range:?}"
            );

            if found.begin == range.end {
                found.begin = range.begin;

                return;
            }
        }

        self.free.insert(position, range);
    }

    /// Forgets all issued and released ids.
    pub fn clear(&mut self) {
        self.last = 0;
        self.free.clear();
    }

    /// Extends the id space by `count` fresh ids.
    fn grow(&mut self, count: u32) -> EntityRange {
        let begin = self.last.checked_add(1).expect("entity id overflow");
        let end = begin.checked_add(count).expect("entity id overflow");

        self.last = end - 1;

        EntityRange::from_raw(begin, end)
    }

    /// Re-joins `free[at]` with its successor after an extension made them
    /// adjacent.
    fn merge_at(&mut self, at: usize) {
        if at + 1 < self.free.len() && self.free[at].end == self.free[at + 1].begin {
            self.free[at].end = self.free[at + 1].end;
            self.free.remove(at + 1);
        }
    }
}

impl Default for EntityAllocator {
    fn default() -> Self {
        Self::new()
    }
}
