//! Build-once handles for expensive resources.
//!
//! Tokenizers and inference sessions take seconds to load. A
//! `LazyResource` is filled by the first call that needs it and then shared
//! for the owner's lifetime. A failed load returns its error to that
//! caller and leaves the slot empty; nothing retries on its own.

use once_cell::sync::OnceCell;

use siglip_core::Result;

pub struct LazyResource<T> {
    cell: OnceCell<T>,
}

impl<T> Default for LazyResource<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> LazyResource<T> {
    pub const fn new() -> Self {
        Self {
            cell: OnceCell::new(),
        }
    }

    /// Return the resource, running `init` if this is the first use.
    ///
    /// Concurrent first calls block until one of them finishes `init`.
    pub fn get_or_load<F>(&self, init: F) -> Result<&T>
    where
        F: FnOnce() -> Result<T>,
    {
        self.cell.get_or_try_init(init)
    }

    pub fn get(&self) -> Option<&T> {
        self.cell.get()
    }

    pub fn is_loaded(&self) -> bool {
        self.cell.get().is_some()
    }
}
