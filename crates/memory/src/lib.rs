//! # keel-memory
//!
//! Fixed-size block heaps and reference-counted object lifecycles.
//!
//! This crate provides:
//! - [`Heap`](heap::Heap): a slab of equally sized elements that grows by
//!   page-fitted blocks and gives emptied blocks back
//! - pluggable block backends through [`Allocator`](allocator::Allocator),
//!   including anonymous memory mappings
//! - [`Object`](object::Object): a named, reference-counted value with an
//!   optional custom destructor
//!
//! ## Quick Start
//!
//! ```rust
//! use keel_memory::prelude::*;
//!
//! let mut heap = Heap::new(48, 64, HeapFlags::NONE)?;
//! let element = heap.alloc();
//! assert!(heap.free(element));
//!
//! let session = Object::init(42u64, Some("session"), None)?;
//! let extra = session.retain();
//! drop(extra);
//! assert!(session.release());
//! # Ok::<(), keel_memory::MemoryError>(())
//! ```
//!
//! ## Features
//!
//! - `logging` (default): structured events through `tracing`
//!
//! ## Architecture
//!
//! - Standalone error handling via [`error`] module
//! - Fatal conditions via the [`fault`] module and an injectable handler
//! - Everything is single threaded; heaps, elements and objects are `!Send`

#![cfg_attr(docsrs, feature(doc_cfg))]
#![allow(unsafe_code)]
#![warn(rust_2018_idioms)]
// Block and slot offsets are derived from a validated geometry
#![allow(clippy::cast_ptr_alignment)]

// Error types
pub mod error;
pub mod fault;

// Core modules
pub mod allocator;
pub mod heap;
pub mod object;
pub mod syscalls;
pub mod utils;

pub use crate::error::{MemoryError, MemoryResult, Result};

// Public API exports
pub mod prelude {
    //! Convenient re-exports of commonly used types and traits.

    // Error types
    pub use crate::error::{MemoryError, MemoryResult, Result};
    pub use crate::fault::{AbortFaultHandler, Fault, FaultHandler, PanicFaultHandler};

    // Backends
    pub use crate::allocator::{Allocator, MmapAllocator, SystemAllocator};

    // Heaps
    pub use crate::heap::{Element, Heap, HeapConfig, HeapFlags, HeapId, HeapStats};

    // Objects
    pub use crate::object::{Destructor, Object, Teardown};

    // Utility traits for safe arithmetic
    pub use crate::utils::CheckedArithmetic;
}
