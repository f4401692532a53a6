//! Final ownership of an object's value and storage

use core::alloc::Layout;
use core::fmt;
use core::mem::ManuallyDrop;
use core::ops::{Deref, DerefMut};
use core::ptr::NonNull;
use std::rc::Rc;

use crate::allocator::Allocator;

/// What a destructor receives when the last handle goes away
///
/// Owns the value and the storage it lived in. Dropping a `Teardown` is the
/// default disposal: the value is dropped, then the storage is returned to
/// its allocator. [`Teardown::into_inner`] keeps the value instead.
pub struct Teardown<T> {
    value: ManuallyDrop<T>,
    storage: NonNull<u8>,
    layout: Layout,
    allocator: ManuallyDrop<Rc<dyn Allocator>>,
}

impl<T> Teardown<T> {
    /// # Safety
    /// `storage` must have been allocated from `allocator` with `layout`, must
    /// no longer hold a live value, and must not be released elsewhere.
    pub(crate) unsafe fn new(
        value: T,
        storage: NonNull<u8>,
        layout: Layout,
        allocator: Rc<dyn Allocator>,
    ) -> Self {
        Self {
            value: ManuallyDrop::new(value),
            storage,
            layout,
            allocator: ManuallyDrop::new(allocator),
        }
    }

    /// Move the value out and return the storage
    pub fn into_inner(self) -> T {
        let mut this = ManuallyDrop::new(self);

        // SAFETY: `this` is never dropped, so the value is taken exactly once
        // and the storage is released exactly once.
        unsafe {
            let value = ManuallyDrop::take(&mut this.value);
            this.release_storage();
            value
        }
    }

    /// # Safety
    /// Must be called once, after the value has been dropped or taken.
    unsafe fn release_storage(&mut self) {
        // SAFETY: constructor contract; the allocator Rc is taken once.
        unsafe {
            let allocator = ManuallyDrop::take(&mut self.allocator);
            allocator.deallocate(self.storage, self.layout);
        }
    }
}

impl<T> Deref for Teardown<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.value
    }
}

impl<T> DerefMut for Teardown<T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.value
    }
}

impl<T> Drop for Teardown<T> {
    fn drop(&mut self) {
        // SAFETY: drop runs once; the value is dropped before its storage goes.
        unsafe {
            ManuallyDrop::drop(&mut self.value);
            self.release_storage();
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Teardown<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Teardown")
            .field("value", &*self.value)
            .field("storage", &self.storage)
            .finish()
    }
}
