//! Anonymous mapping backend
//!
//! Every allocation is its own private read/write mapping, rounded up to the
//! system page size. Heaps use it by default when no explicit backend is
//! supplied, so blocks go straight back to the OS on shrink.

use core::alloc::Layout;
use core::ptr::NonNull;

use super::{Allocator, validate_layout};
use crate::error::{MemoryError, MemoryResult};
use crate::syscalls;
use crate::utils::align_up;

/// Backend that maps fresh anonymous pages for every request
#[derive(Debug, Clone, Copy)]
pub struct MmapAllocator {
    page_size: usize,
}

impl MmapAllocator {
    /// Creates a mapping backend using the system page size
    pub fn new() -> Self {
        Self {
            page_size: syscalls::page_size(),
        }
    }

    /// Whether anonymous mappings are available on this platform
    #[inline]
    pub const fn is_supported() -> bool {
        syscalls::mapping_supported()
    }

    /// Granularity every mapping is rounded up to
    #[inline]
    pub fn page_size(&self) -> usize {
        self.page_size
    }

    fn mapped_len(&self, size: usize) -> MemoryResult<usize> {
        if size > usize::MAX - (self.page_size - 1) {
            return Err(MemoryError::size_overflow("mapping length"));
        }
        Ok(align_up(size, self.page_size))
    }
}

impl Default for MmapAllocator {
    fn default() -> Self {
        Self::new()
    }
}

unsafe impl Allocator for MmapAllocator {
    unsafe fn allocate(&self, layout: Layout) -> MemoryResult<NonNull<[u8]>> {
        validate_layout(layout)?;

        if layout.size() == 0 {
            let ptr = NonNull::<u8>::dangling();
            return Ok(NonNull::slice_from_raw_parts(ptr, 0));
        }

        // Mappings are page aligned and nothing stronger
        if layout.align() > self.page_size {
            return Err(MemoryError::invalid_alignment(layout.align()));
        }

        let len = self.mapped_len(layout.size())?;
        let raw = syscalls::memory_map(len)
            .map_err(|err| MemoryError::mapping_failed(len, &err))?;

        match NonNull::new(raw) {
            Some(ptr) => Ok(NonNull::slice_from_raw_parts(ptr, len)),
            None => Err(MemoryError::allocation_failed_with_layout(layout)),
        }
    }

    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) {
        if layout.size() == 0 {
            return;
        }

        let Ok(len) = self.mapped_len(layout.size()) else {
            return;
        };

        // SAFETY: caller guarantees ptr came from `allocate` with this layout,
        // so `len` is exactly the length that was mapped.
        if let Err(err) = unsafe { syscalls::memory_unmap(ptr.as_ptr(), len) } {
            #[cfg(feature = "logging")]
            tracing::warn!(len, error = %err, "munmap failed, region leaked");

            #[cfg(not(feature = "logging"))]
            let _ = err;
        }
    }

    fn name(&self) -> &'static str {
        "mmap"
    }
}
