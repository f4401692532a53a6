//! Backend allocator trait
//!
//! Heaps and objects never talk to the platform directly. They request raw
//! regions through [`Allocator`], injected at construction as an
//! `Rc<dyn Allocator>`.
//!
//! # Safety
//!
//! `Allocator` is an unsafe trait: implementors promise that returned regions
//! are valid, aligned to the requested layout and not aliased until they are
//! handed back through `deallocate`.

use core::alloc::Layout;
use core::ptr::NonNull;
use std::rc::Rc;

use crate::error::{MemoryError, MemoryResult};

/// Validation of layout parameters
#[inline]
pub fn validate_layout(layout: Layout) -> MemoryResult<()> {
    if !layout.align().is_power_of_two() {
        return Err(MemoryError::invalid_alignment(layout.align()));
    }

    if layout.size() > isize::MAX as usize - (layout.align() - 1) {
        return Err(MemoryError::size_overflow("layout padding"));
    }

    Ok(())
}

/// Raw region provider
///
/// # Safety Requirements
///
/// Implementors must ensure that:
/// - Returned regions are valid for reads and writes of `layout.size()` bytes
/// - Regions are aligned according to the layout
/// - Deallocation only occurs for previously allocated regions
pub unsafe trait Allocator {
    /// Allocates a region with the given layout
    ///
    /// # Safety
    /// - Memory content is uninitialized and must be initialized before use
    ///
    /// # Errors
    /// - Returns an error if the memory cannot be supplied
    unsafe fn allocate(&self, layout: Layout) -> MemoryResult<NonNull<[u8]>>;

    /// Returns a region to the allocator
    ///
    /// # Safety
    /// - `ptr` must have been allocated by this allocator
    /// - `layout` must match the original allocation layout exactly
    /// - After this call, `ptr` becomes invalid and must not be used
    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout);

    /// Short human readable name used in log events
    fn name(&self) -> &'static str {
        "custom"
    }
}

unsafe impl<A: Allocator + ?Sized> Allocator for &A {
    #[inline]
    unsafe fn allocate(&self, layout: Layout) -> MemoryResult<NonNull<[u8]>> {
        unsafe { (**self).allocate(layout) }
    }

    #[inline]
    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) {
        unsafe { (**self).deallocate(ptr, layout) }
    }

    fn name(&self) -> &'static str {
        (**self).name()
    }
}

unsafe impl<A: Allocator + ?Sized> Allocator for Rc<A> {
    #[inline]
    unsafe fn allocate(&self, layout: Layout) -> MemoryResult<NonNull<[u8]>> {
        unsafe { (**self).allocate(layout) }
    }

    #[inline]
    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) {
        unsafe { (**self).deallocate(ptr, layout) }
    }

    fn name(&self) -> &'static str {
        (**self).name()
    }
}
