//! Entity identifiers, id ranges, and their allocation.

use std::fmt;

use thiserror::Error;

pub use self::allocator::*;
pub use self::range::*;

mod allocator;
mod range;

/// An identifier for an entity.
///
/// Entities are opaque 32-bit handles issued by an [`EntityAllocator`] and
/// used as keys into component tables. [`Entity::NULL`] is reserved as an
/// "absent" marker and is never issued; neither is id `0` (the first issued
/// id is `1`).
#[repr(transparent)]
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Entity(u32);

impl Entity {
    /// The reserved sentinel marking "no entity".
    pub const NULL: Self = Self(u32::MAX);

    /// Creates an entity from a raw id.
    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    /// The raw id of this entity.
    pub const fn raw(self) -> u32 {
        self.0
    }

    /// Whether this is the [`Entity::NULL`] sentinel.
    pub const fn is_null(self) -> bool {
        self.0 == u32::MAX
    }
}

impl fmt::Debug for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_null() {
            f.write_str("Entity(null)")
        } else {
            write!(f, "Entity({})", self.0)
        }
    }
}

/// An error for when a requested entity was not found in a table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("entity not found: {0:?}")]
pub struct EntityNotFound(pub Entity);
