use std::alloc::{alloc, dealloc, handle_alloc_error, Layout};
use std::mem::MaybeUninit;
use std::ptr::NonNull;

/// A fixed-width allocation of possibly-initialized component cells.
///
/// Liveness is tracked by the owning table; the page itself only reads or
/// drops a cell when explicitly asked to. Cells are addressed through the
/// stored base pointer, so references handed out for one cell survive
/// access to its siblings.
pub(crate) struct ComponentPage<C> {
    cells: NonNull<MaybeUninit<C>>,
    len: usize,
}

impl<C> ComponentPage<C> {
    /// Creates a page of `len` vacant cells.
    pub fn new(len: usize) -> Self {
        let layout = Self::layout(len);

        let cells = if layout.size() == 0 {
            NonNull::dangling()
        } else {
            NonNull::new(unsafe { alloc(layout) })
                .unwrap_or_else(|| handle_alloc_error(layout))
                .cast()
        };

        Self { cells, len }
    }

    /// Raw pointer to the first cell.
    pub fn as_mut_ptr(&mut self) -> *mut MaybeUninit<C> {
        self.cells.as_ptr()
    }

    /// Writes a component into a cell, returning a reference to it.
    ///
    /// Any previous value in the cell is overwritten without being
    /// dropped.
    ///
    /// # Safety
    ///
    /// The cell must be in-bounds, and no reference to it may be live.
    pub unsafe fn write(&mut self, cell: usize, component: C) -> &mut C {
        debug_assert!(cell < self.len);

        unsafe { (*self.cells.as_ptr().add(cell)).write(component) }
    }

    /// Returns the component in a cell.
    ///
    /// # Safety
    ///
    /// The cell must be in-bounds and hold an initialized component.
    pub unsafe fn get(&self, cell: usize) -> &C {
        debug_assert!(cell < self.len);

        unsafe { &*self.cells.as_ptr().add(cell).cast::<C>() }
    }

    /// Returns the component in a cell.
    ///
    /// # Safety
    ///
    /// The cell must be in-bounds and hold an initialized component.
    pub unsafe fn get_mut(&mut self, cell: usize) -> &mut C {
        debug_assert!(cell < self.len);

        unsafe { &mut *self.cells.as_ptr().add(cell).cast::<C>() }
    }

    /// Moves the component out of a cell, leaving it vacant.
    ///
    /// # Safety
    ///
    /// The cell must be in-bounds and hold an initialized component, and
    /// must not be read again before the next [`ComponentPage::write`] to
    /// it.
    pub unsafe fn take(&mut self, cell: usize) -> C {
        debug_assert!(cell < self.len);

        unsafe { self.cells.as_ptr().add(cell).cast::<C>().read() }
    }

    /// Drops the component in a cell, leaving it vacant.
    ///
    /// # Safety
    ///
    /// Same contract as [`ComponentPage::take`].
    pub unsafe fn drop_cell(&mut self, cell: usize) {
        debug_assert!(cell < self.len);

        unsafe { (*self.cells.as_ptr().add(cell)).assume_init_drop() }
    }

    fn layout(len: usize) -> Layout {
        Layout::array::<MaybeUninit<C>>(len).expect("page layout overflow")
    }
}

impl<C> Drop for ComponentPage<C> {
    fn drop(&mut self) {
        let layout = Self::layout(self.len);

        if layout.size() != 0 {
            unsafe { dealloc(self.cells.as_ptr().cast(), layout) };
        }
    }
}

// SAFETY: the page owns its cells exactly like a boxed slice would
unsafe impl<C: Send> Send for ComponentPage<C> {}
unsafe impl<C: Sync> Sync for ComponentPage<C> {}
