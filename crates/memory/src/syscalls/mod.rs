//! Low-level system calls used by the mapping backend and heap geometry
//!
//! # Architecture
//!
//! - **direct.rs** - anonymous mapping wrappers (mmap, VirtualAlloc)
//! - **info.rs** - page size discovery
//!
//! # Safety
//!
//! [`memory_unmap`] is `unsafe` and requires careful usage. Incorrect use can
//! lead to memory corruption or segfaults.

mod info;
pub use info::*;

mod direct;
pub use direct::*;

/// Whether this platform can hand out anonymous mappings
#[inline]
pub const fn mapping_supported() -> bool {
    cfg!(any(unix, windows))
}
