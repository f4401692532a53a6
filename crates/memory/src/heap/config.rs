//! Heap configuration

use std::rc::Rc;

use bitflags::bitflags;

use crate::error::{MemoryError, MemoryResult};
use crate::fault::{AbortFaultHandler, FaultHandler};

bitflags! {
    /// Creation-time behavior flags
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct HeapFlags: u32 {
        /// Populate the first block during creation instead of on first `alloc`
        const ALLOCATE_NOW = 0b0000_0001;
    }
}

impl HeapFlags {
    /// Lazy creation, no block until the first allocation
    pub const NONE: Self = Self::empty();
}

/// Configuration for a block heap
#[derive(Debug, Clone)]
pub struct HeapConfig {
    /// Page size used for block fitting, `None` asks the platform
    pub page_size: Option<usize>,

    /// Back blocks with anonymous mappings when no explicit backend is given
    pub prefer_mmap: bool,

    /// Enable statistics tracking
    pub track_stats: bool,

    /// Fill pattern byte for newly allocated elements (for debugging)
    pub alloc_pattern: Option<u8>,
    /// Fill pattern byte for freed elements (for debugging)
    pub dealloc_pattern: Option<u8>,

    /// Receiver of fatal faults
    pub fault_handler: Rc<dyn FaultHandler>,
}

impl Default for HeapConfig {
    fn default() -> Self {
        Self {
            page_size: None,
            prefer_mmap: true,
            track_stats: cfg!(debug_assertions),
            alloc_pattern: if cfg!(debug_assertions) {
                Some(0xBB)
            } else {
                None
            },
            dealloc_pattern: if cfg!(debug_assertions) {
                Some(0xDD)
            } else {
                None
            },
            fault_handler: Rc::new(AbortFaultHandler),
        }
    }
}

impl HeapConfig {
    /// Production configuration - optimized for performance
    #[must_use]
    pub fn production() -> Self {
        Self {
            track_stats: false,
            alloc_pattern: None,
            dealloc_pattern: None,
            ..Self::default()
        }
    }

    /// Debug configuration - optimized for debugging
    #[must_use]
    pub fn debug() -> Self {
        Self {
            track_stats: true,
            alloc_pattern: Some(0xBB),
            dealloc_pattern: Some(0xDD),
            ..Self::default()
        }
    }

    /// Performance configuration - minimal overhead, blocks from the system allocator
    #[must_use]
    pub fn performance() -> Self {
        Self {
            prefer_mmap: false,
            ..Self::production()
        }
    }

    /// Use a fixed page size for block fitting
    #[must_use]
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = Some(page_size);
        self
    }

    /// Route faults to `handler`
    #[must_use]
    pub fn with_fault_handler(mut self, handler: Rc<dyn FaultHandler>) -> Self {
        self.fault_handler = handler;
        self
    }

    /// Check the configuration for values a heap cannot work with
    pub fn validate(&self) -> MemoryResult<()> {
        match self.page_size {
            Some(0) => Err(MemoryError::invalid_heap_config("page size must be non-zero")),
            Some(size) if !size.is_power_of_two() => Err(MemoryError::invalid_heap_config(
                "page size must be a power of two",
            )),
            _ => Ok(()),
        }
    }
}
