//! Growable heap of fixed-size elements

use core::alloc::Layout;
use core::fmt;
use core::ptr::NonNull;
use std::collections::VecDeque;
use std::rc::Rc;

#[cfg(feature = "logging")]
use tracing::{debug, error, warn};

use super::block::Block;
use super::config::{HeapConfig, HeapFlags};
use super::element::{BlockId, Element, HeapId};
use super::layout::{BlockGeometry, SlotHeader};
use super::stats::HeapStats;
use crate::allocator::{Allocator, MmapAllocator, SystemAllocator};
use crate::error::{MemoryError, MemoryResult};
use crate::fault::Fault;
use crate::syscalls;

/// Emptied blocks are only given back while the heap holds more than this
pub const MIN_RESIDENT_BLOCKS: usize = 2;

/// Heap of equally sized elements carved out of page-fitted blocks
///
/// Blocks are requested from the backend on demand and kept in residency
/// order, newest first. Allocation takes the head of the first block with a
/// free slot; freeing pushes the slot back onto its block's free list.
///
/// A heap is single threaded: it is neither `Send` nor `Sync`.
///
/// # Examples
///
/// ```
/// use keel_memory::heap::{Heap, HeapFlags};
///
/// let mut heap = Heap::new(64, 32, HeapFlags::NONE).unwrap();
/// let element = heap.alloc();
/// assert_eq!(heap.allocated_elems(), 1);
///
/// assert!(heap.free(element));
/// assert_eq!(heap.allocated_elems(), 0);
/// ```
pub struct Heap {
    id: HeapId,
    geometry: BlockGeometry,
    block_layout: Layout,
    page_size: usize,
    flags: HeapFlags,
    backend: Rc<dyn Allocator>,
    uses_mmap: bool,
    config: HeapConfig,

    /// Resident blocks, most recently added first
    blocks: VecDeque<Block>,
    free_elems: usize,
    next_block: u32,

    stats: HeapStats,
}

impl Heap {
    /// Creates a heap with the default configuration and backend
    pub fn new(elem_size: usize, elems_per_block: usize, flags: HeapFlags) -> MemoryResult<Self> {
        Self::with_config(
            elem_size,
            elems_per_block,
            flags,
            None,
            HeapConfig::default(),
        )
    }

    /// Creates a heap whose blocks come from `backend`
    ///
    /// An explicit backend always disables anonymous mappings.
    pub fn with_backend(
        elem_size: usize,
        elems_per_block: usize,
        flags: HeapFlags,
        backend: Rc<dyn Allocator>,
    ) -> MemoryResult<Self> {
        Self::with_config(
            elem_size,
            elems_per_block,
            flags,
            Some(backend),
            HeapConfig::default(),
        )
    }

    /// Creates a heap with custom configuration
    ///
    /// # Parameters
    /// - `elem_size`: payload bytes per element
    /// - `elems_per_block`: hint, grown to fill whole pages
    /// - `flags`: [`HeapFlags::ALLOCATE_NOW`] populates the first block now
    /// - `backend`: block provider; `None` picks anonymous mappings when
    ///   `config.prefer_mmap` is set and the platform has them, otherwise the
    ///   system allocator
    /// - `config`: page size, statistics, fill patterns and fault handler
    ///
    /// # Errors
    /// Returns an error if the configuration is invalid or the block geometry
    /// overflows. A backend failure during eager population is a fault, not
    /// an error.
    pub fn with_config(
        elem_size: usize,
        elems_per_block: usize,
        flags: HeapFlags,
        backend: Option<Rc<dyn Allocator>>,
        config: HeapConfig,
    ) -> MemoryResult<Self> {
        config.validate()?;

        let page_size = config.page_size.unwrap_or_else(syscalls::page_size);
        let geometry = BlockGeometry::fit(elem_size, elems_per_block, page_size)?;
        let block_layout = geometry.block_layout()?;

        let (backend, uses_mmap): (Rc<dyn Allocator>, bool) = match backend {
            Some(backend) => (backend, false),
            None if config.prefer_mmap && MmapAllocator::is_supported() => {
                (Rc::new(MmapAllocator::new()), true)
            }
            None => (Rc::new(SystemAllocator::new()), false),
        };

        let mut heap = Self {
            id: HeapId::next(),
            geometry,
            block_layout,
            page_size,
            flags,
            backend,
            uses_mmap,
            config,
            blocks: VecDeque::new(),
            free_elems: 0,
            next_block: 0,
            stats: HeapStats::default(),
        };

        #[cfg(feature = "logging")]
        debug!(
            heap = %heap.id,
            elem_size,
            elems_per_block = heap.geometry.elems_per_block,
            pages = heap.geometry.pages,
            backend = heap.backend.name(),
            "heap created"
        );

        if flags.contains(HeapFlags::ALLOCATE_NOW)
            && let Err(source) = heap.expand()
        {
            heap.exhausted(source);
        }

        Ok(heap)
    }

    /// Hands out one element
    ///
    /// Grows the heap by one block when no free element is left. Never fails
    /// in the `Result` sense: backend exhaustion and broken free-list
    /// accounting are raised through the configured fault handler, which does
    /// not return.
    pub fn alloc(&mut self) -> Element {
        if self.free_elems == 0
            && let Err(source) = self.expand()
        {
            self.exhausted(source);
        }

        let geometry = self.geometry;
        let found = self.blocks.iter_mut().find_map(|block| {
            let slot = block.pop_free(&geometry)?;
            let generation = block.generation(slot)?;
            Some((block.id(), slot, generation, block.payload(slot, &geometry)))
        });

        let Some((block, slot, generation, payload)) = found else {
            let source = self
                .blocks
                .iter()
                .find(|block| block.has_corrupt_head(&geometry))
                .map(|block| {
                    MemoryError::corruption(
                        "block free list",
                        &format!("{} has a free-list head that is not a free slot", block.id()),
                    )
                });

            self.fault(Fault::InvariantViolation {
                heap: self.id,
                free_elems: self.free_elems,
                blocks: self.blocks.len(),
                source,
            })
        };

        self.free_elems -= 1;

        if let Some(pattern) = self.config.alloc_pattern {
            // SAFETY: payload spans elem_size bytes inside a resident block,
            // and the slot was just taken off the free list.
            unsafe { payload.as_ptr().write_bytes(pattern, geometry.elem_size()) };
        }

        if self.config.track_stats {
            let allocated = self.allocated_elems();
            self.stats.record_alloc(allocated);
        }

        #[cfg(all(feature = "logging", debug_assertions))]
        tracing::trace!(
            heap = %self.id,
            ptr = ?payload,
            block = %block,
            slot,
            free_elems = self.free_elems,
            "alloc"
        );

        Element {
            heap: self.id,
            block,
            slot,
            generation,
            payload,
        }
    }

    /// Returns an element to its block
    ///
    /// Returns `false` and changes nothing when the element is not a live
    /// element of this heap: it came from another heap, its block has been
    /// released or has nothing allocated, its slot is out of range, the slot
    /// is already free, or the slot has since been handed out to a newer
    /// element.
    ///
    /// When the block becomes empty and the heap holds more than
    /// [`MIN_RESIDENT_BLOCKS`] blocks, the block goes back to the backend.
    pub fn free(&mut self, element: Element) -> bool {
        let index = match self.locate(&element) {
            Ok(index) => index,
            Err(reason) => return self.reject(&element, reason),
        };

        let geometry = self.geometry;

        if let Some(pattern) = self.config.dealloc_pattern {
            // SAFETY: locate() confirmed the slot is allocated in a resident
            // block, so the payload is valid for elem_size bytes.
            unsafe {
                element
                    .payload
                    .as_ptr()
                    .write_bytes(pattern, geometry.elem_size());
            }
        }

        let block = &mut self.blocks[index];
        block.push_free(element.slot, &geometry);
        let emptied = block.allocated() == 0;

        self.free_elems += 1;
        if self.config.track_stats {
            self.stats.record_free();
        }

        #[cfg(all(feature = "logging", debug_assertions))]
        tracing::trace!(
            heap = %self.id,
            ptr = ?element.payload,
            block = %element.block,
            slot = element.slot,
            free_elems = self.free_elems,
            "free"
        );

        if emptied && self.blocks.len() > MIN_RESIDENT_BLOCKS {
            self.shrink(index);
        }

        true
    }

    /// Releases every block and the heap itself
    ///
    /// Elements still handed out dangle afterwards. Dropping the heap does
    /// the same.
    pub fn destroy(self) {
        drop(self);
    }

    /// Payload of `element` if it is currently allocated from this heap
    pub fn payload(&self, element: &Element) -> Option<NonNull<u8>> {
        self.locate(element).ok().map(|_| element.payload)
    }

    /// Whether `element` is currently allocated from this heap
    pub fn contains(&self, element: &Element) -> bool {
        self.locate(element).is_ok()
    }

    pub fn id(&self) -> HeapId {
        self.id
    }

    pub fn elem_size(&self) -> usize {
        self.geometry.elem_size()
    }

    /// Element size plus slot header
    pub fn alloc_size(&self) -> usize {
        self.geometry.alloc_size
    }

    /// Elements per block after page fitting
    pub fn elems_per_block(&self) -> usize {
        self.geometry.elems_per_block as usize
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn flags(&self) -> HeapFlags {
        self.flags
    }

    /// Free elements across all resident blocks
    pub fn free_elems(&self) -> usize {
        self.free_elems
    }

    /// Elements currently handed out
    pub fn allocated_elems(&self) -> usize {
        self.capacity().saturating_sub(self.free_elems)
    }

    /// Resident blocks
    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    /// Elements the resident blocks can hold
    pub fn capacity(&self) -> usize {
        self.blocks.len() * self.elems_per_block()
    }

    /// Whether blocks are anonymous mappings
    pub fn uses_mmap(&self) -> bool {
        self.uses_mmap
    }

    /// Resident block ids, most recently added first
    pub fn block_ids(&self) -> impl Iterator<Item = BlockId> + '_ {
        self.blocks.iter().map(Block::id)
    }

    /// Allocated elements in `block`, `None` if it is not resident
    pub fn allocated_in(&self, block: BlockId) -> Option<usize> {
        self.blocks
            .iter()
            .find(|b| b.id() == block)
            .map(|b| b.allocated() as usize)
    }

    /// Get statistics (if tracking is enabled)
    pub fn stats(&self) -> Option<HeapStats> {
        self.config.track_stats.then_some(self.stats)
    }

    pub fn config(&self) -> &HeapConfig {
        &self.config
    }

    /// Add one block at the head of the residency order
    ///
    /// Fails when the backend refuses the region, and with `SizeOverflow`
    /// once the heap has used up all `u32` block ids. Callers raise both as
    /// [`Fault::AllocatorExhausted`].
    fn expand(&mut self) -> MemoryResult<()> {
        let id = BlockId(self.next_block);
        let next_block = self
            .next_block
            .checked_add(1)
            .ok_or_else(|| MemoryError::size_overflow("block id"))?;

        // SAFETY: block_layout has a non-zero size (it includes the block
        // header) and a power-of-two alignment.
        let region = unsafe { self.backend.allocate(self.block_layout) }?;

        if region.len() < self.block_layout.size() {
            // SAFETY: region came from this backend with this layout.
            unsafe { self.backend.deallocate(region.cast(), self.block_layout) };
            return Err(MemoryError::allocation_failed_with_layout(self.block_layout));
        }

        // SAFETY: the region is fresh, exclusively ours, at least block_size
        // bytes and aligned to the layout's BLOCK_ALIGN.
        let block = unsafe { Block::format(id, self.id, region.cast(), &self.geometry) };

        self.next_block = next_block;
        self.blocks.push_front(block);
        self.free_elems += self.elems_per_block();
        if self.config.track_stats {
            self.stats.expansions += 1;
        }

        #[cfg(feature = "logging")]
        debug!(
            heap = %self.id,
            block = %id,
            blocks = self.blocks.len(),
            free_elems = self.free_elems,
            "heap expanded"
        );

        Ok(())
    }

    /// Give the emptied block at `index` back to the backend
    fn shrink(&mut self, index: usize) {
        let Some(block) = self.blocks.remove(index) else {
            return;
        };

        self.free_elems -= self.elems_per_block();
        if self.config.track_stats {
            self.stats.shrinks += 1;
        }

        #[cfg(feature = "logging")]
        debug!(
            heap = %self.id,
            block = %block.id(),
            blocks = self.blocks.len(),
            free_elems = self.free_elems,
            "heap shrunk"
        );

        self.release(block);
    }

    fn release(&self, block: Block) {
        // SAFETY: every resident block's region was allocated from this
        // backend with block_layout, and the block is no longer resident.
        unsafe { self.backend.deallocate(block.region(), self.block_layout) };
    }

    /// Find the resident block of a live element
    fn locate(&self, element: &Element) -> Result<usize, &'static str> {
        if element.heap != self.id {
            return Err("element belongs to another heap");
        }

        let index = self
            .blocks
            .iter()
            .position(|block| block.id() == element.block)
            .ok_or("block is not resident")?;
        let block = &self.blocks[index];

        if block.allocated() == 0 {
            return Err("block has no allocated elements");
        }

        if element.slot >= self.geometry.elems_per_block {
            return Err("slot index out of range");
        }

        match block.slot_header(element.slot, &self.geometry) {
            Some(SlotHeader::Allocated { owner }) if owner == element.block.0 => {}
            Some(SlotHeader::Free { .. }) => return Err("slot is already free"),
            _ => return Err("slot header is corrupt"),
        }

        if block.generation(element.slot) != Some(element.generation) {
            return Err("slot was reused by a newer element");
        }

        let header = block.header();
        if header.heap != self.id.as_u64() || header.block != element.block.0 {
            return Err("block header is corrupt");
        }

        if block.payload(element.slot, &self.geometry) != element.payload {
            return Err("payload does not match slot");
        }

        Ok(index)
    }

    fn reject(&mut self, element: &Element, reason: &'static str) -> bool {
        if self.config.track_stats {
            self.stats.guard_violations += 1;
        }

        #[cfg(feature = "logging")]
        warn!(
            heap = %self.id,
            element_heap = %element.heap,
            block = %element.block,
            slot = element.slot,
            reason,
            "free rejected"
        );

        #[cfg(not(feature = "logging"))]
        let _ = (element, reason);

        false
    }

    fn exhausted(&self, source: MemoryError) -> ! {
        self.fault(Fault::AllocatorExhausted {
            heap: self.id,
            requested: self.block_layout.size(),
            source,
        })
    }

    fn fault(&self, fault: Fault) -> ! {
        #[cfg(feature = "logging")]
        error!(heap = %self.id, fault = fault.name(), "{fault}");

        let handler = Rc::clone(&self.config.fault_handler);
        handler.raise(fault)
    }
}

impl Drop for Heap {
    fn drop(&mut self) {
        let blocks = self.blocks.len();

        while let Some(block) = self.blocks.pop_front() {
            self.release(block);
        }
        self.free_elems = 0;

        #[cfg(feature = "logging")]
        debug!(heap = %self.id, blocks, "heap destroyed");

        #[cfg(not(feature = "logging"))]
        let _ = blocks;
    }
}

impl fmt::Debug for Heap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Heap")
            .field("id", &self.id)
            .field("elem_size", &self.elem_size())
            .field("elems_per_block", &self.geometry.elems_per_block)
            .field("blocks", &self.blocks.len())
            .field("free_elems", &self.free_elems)
            .field("backend", &self.backend.name())
            .finish_non_exhaustive()
    }
}
