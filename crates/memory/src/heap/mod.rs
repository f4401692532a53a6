//! Fixed-size block heap
//!
//! A [`Heap`] hands out equally sized elements from blocks of whole pages.
//! Each block is one region from an [`Allocator`](crate::allocator::Allocator)
//! backend, prefixed by a block header and split into slots that each carry a
//! [`SlotHeader`].
//!
//! # Architecture
//!
//! - **layout.rs** - slot and block headers, page fitting
//! - **block.rs** - one region and its intrusive free list
//! - **block_heap.rs** - the heap: growth, shrink policy, guards, faults
//! - **element.rs** - heap, block and element identities
//! - **config.rs** - [`HeapConfig`] presets and [`HeapFlags`]
//! - **stats.rs** - optional counters

mod block;
mod block_heap;
mod config;
mod element;
mod layout;
mod stats;

pub use block_heap::{Heap, MIN_RESIDENT_BLOCKS};
pub use config::{HeapConfig, HeapFlags};
pub use element::{BlockId, Element, HeapId};
pub use layout::{
    BLOCK_ALIGN, BLOCK_HEADER_SIZE, BlockGeometry, END_OF_LIST, SLOT_HEADER_SIZE, SlotHeader,
};
pub use stats::HeapStats;
