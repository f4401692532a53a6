//! Backend allocators
//!
//! - [`Allocator`]: the raw `allocate` / `deallocate` strategy a heap or
//!   object is built on
//! - [`SystemAllocator`]: pass-through to the platform allocator
//! - [`MmapAllocator`]: one anonymous mapping per request

mod mmap;
mod system;
mod traits;

pub use mmap::MmapAllocator;
pub use system::SystemAllocator;
pub use traits::{Allocator, validate_layout};
