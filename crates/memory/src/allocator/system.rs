//! System allocator implementation
//!
//! Provides a backend that wraps the platform's general-purpose allocator.
//! This is the default backend for objects and for heaps that do not use
//! anonymous mappings.

use core::alloc::{GlobalAlloc, Layout};
use core::ptr::NonNull;
use std::alloc::System;

use super::Allocator;
use crate::error::{MemoryError, MemoryResult};

/// Wrapper for the system's default allocator
///
/// # Performance
/// Performance characteristics match the underlying system allocator. Heaps
/// only call into it when a block is added or released, never per element.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemAllocator;

impl SystemAllocator {
    /// Creates a new SystemAllocator
    ///
    /// This is a zero-cost operation as the SystemAllocator contains no state.
    #[inline]
    pub const fn new() -> Self {
        SystemAllocator
    }

    /// Returns information about the system allocator
    pub fn info() -> &'static str {
        #[cfg(target_os = "linux")]
        return "Linux system allocator (typically glibc malloc or musl)";

        #[cfg(target_os = "windows")]
        return "Windows HeapAlloc";

        #[cfg(target_os = "macos")]
        return "macOS system allocator (libsystem_malloc)";

        #[cfg(not(any(target_os = "linux", target_os = "windows", target_os = "macos")))]
        return "Platform-specific system allocator";
    }
}

unsafe impl Allocator for SystemAllocator {
    #[inline]
    unsafe fn allocate(&self, layout: Layout) -> MemoryResult<NonNull<[u8]>> {
        if layout.size() == 0 {
            // Zero-sized requests get a well-aligned dangling pointer
            let ptr = NonNull::<u8>::dangling();
            return Ok(NonNull::slice_from_raw_parts(ptr, 0));
        }

        // SAFETY: layout has a non-zero size.
        let ptr = unsafe { System.alloc(layout) };

        match NonNull::new(ptr) {
            Some(ptr) => Ok(NonNull::slice_from_raw_parts(ptr, layout.size())),
            None => Err(MemoryError::allocation_failed_with_layout(layout)),
        }
    }

    #[inline]
    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) {
        if layout.size() == 0 {
            return;
        }

        // SAFETY: caller guarantees ptr/layout came from `allocate`.
        unsafe { System.dealloc(ptr.as_ptr(), layout) };
    }

    fn name(&self) -> &'static str {
        "system"
    }
}
