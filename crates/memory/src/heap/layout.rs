//! In-region layout of a block
//!
//! ```text
//! +-------------+-------------------+-------------------+-----
//! | BlockHeader | SlotHeader | elem | SlotHeader | elem | ...
//! +-------------+-------------------+-------------------+-----
//! ```
//!
//! Every slot is `alloc_size = SLOT_HEADER_SIZE + elem_size` bytes and starts
//! with a [`SlotHeader`]. Slots are packed, so headers are accessed with
//! unaligned reads and writes.

use core::alloc::Layout;
use core::mem::size_of;

use crate::error::{MemoryError, MemoryResult};
use crate::utils::CheckedArithmetic;

/// Free-list terminator stored in [`SlotHeader::Free::next`]
pub const END_OF_LIST: u32 = u32::MAX;

/// Alignment requested for every block region
pub const BLOCK_ALIGN: usize = 16;

/// Bytes occupied by the header in front of every slot
pub const SLOT_HEADER_SIZE: usize = size_of::<SlotHeader>();

/// Bytes occupied by the header at the start of every block
pub const BLOCK_HEADER_SIZE: usize = size_of::<BlockHeader>();

const TAG_FREE: u32 = 0;
const TAG_ALLOCATED: u32 = 1;

/// Header stored in front of every slot
///
/// A free slot links to the next free slot of the same block
/// ([`END_OF_LIST`] terminates the list). An allocated slot records the id
/// of the block that owns it.
#[repr(C, u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotHeader {
    Free { next: u32 } = TAG_FREE,
    Allocated { owner: u32 } = TAG_ALLOCATED,
}

const _: () = assert!(SLOT_HEADER_SIZE == 8);

impl SlotHeader {
    /// Decode the header at `ptr`
    ///
    /// Returns `None` when the tag is neither free nor allocated, which means
    /// something overwrote the header.
    ///
    /// # Safety
    /// `ptr` must be valid for reads of [`SLOT_HEADER_SIZE`] bytes.
    #[inline]
    pub(crate) unsafe fn read(ptr: *const u8) -> Option<Self> {
        // SAFETY: caller guarantees 8 readable bytes. The tag and the variant
        // field are both u32 at offsets 0 and 4 in the repr(C, u32) layout.
        let (tag, value) = unsafe {
            (
                ptr.cast::<u32>().read_unaligned(),
                ptr.add(4).cast::<u32>().read_unaligned(),
            )
        };

        match tag {
            TAG_FREE => Some(Self::Free { next: value }),
            TAG_ALLOCATED => Some(Self::Allocated { owner: value }),
            _ => None,
        }
    }

    /// Encode this header at `ptr`
    ///
    /// # Safety
    /// `ptr` must be valid for writes of [`SLOT_HEADER_SIZE`] bytes.
    #[inline]
    pub(crate) unsafe fn write(self, ptr: *mut u8) {
        // SAFETY: caller guarantees 8 writable bytes, alignment is not required.
        unsafe { ptr.cast::<Self>().write_unaligned(self) }
    }
}

/// Header stamped at the start of every block region
///
/// Lets the heap confirm on `free` that the region an element points into
/// still belongs to the block and heap it claims.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct BlockHeader {
    pub heap: u64,
    pub block: u32,
    pub elems: u32,
}

const _: () = assert!(BLOCK_HEADER_SIZE % 8 == 0);

/// Block sizing derived from element size, hint and page size
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockGeometry {
    /// Element size plus slot header
    pub alloc_size: usize,
    /// Slots per block after page fitting
    pub elems_per_block: u32,
    /// Pages spanned by one block
    pub pages: usize,
    /// Bytes requested from the backend per block
    pub block_size: usize,
}

impl BlockGeometry {
    /// Fit as many slots as possible into whole pages
    ///
    /// `pages = ceil((BLOCK_HEADER_SIZE + hint * alloc_size) / page_size)`,
    /// then `elems_per_block = (pages * page_size - BLOCK_HEADER_SIZE) / alloc_size`.
    pub fn fit(elem_size: usize, hint: usize, page_size: usize) -> MemoryResult<Self> {
        if page_size == 0 || !page_size.is_power_of_two() {
            return Err(MemoryError::invalid_heap_config(
                "page size must be a non-zero power of two",
            ));
        }

        let alloc_size = elem_size.try_add(SLOT_HEADER_SIZE)?;
        let wanted = BLOCK_HEADER_SIZE.try_add(hint.try_mul(alloc_size)?)?;
        let pages = wanted.div_ceil(page_size);
        let span = pages.try_mul(page_size)?;
        let elems = span.try_sub(BLOCK_HEADER_SIZE)? / alloc_size;

        if elems == 0 {
            return Err(MemoryError::invalid_heap_config(
                "element does not fit in a single page-sized block",
            ));
        }

        let elems_per_block = u32::try_from(elems)
            .ok()
            .filter(|&n| n != END_OF_LIST)
            .ok_or_else(|| MemoryError::invalid_heap_config("too many elements per block"))?;

        let block_size = BLOCK_HEADER_SIZE.try_add(elems.try_mul(alloc_size)?)?;

        Ok(Self {
            alloc_size,
            elems_per_block,
            pages,
            block_size,
        })
    }

    /// Layout of one block region
    pub fn block_layout(&self) -> MemoryResult<Layout> {
        Layout::from_size_align(self.block_size, BLOCK_ALIGN)
            .map_err(|_| MemoryError::invalid_layout("block size exceeds isize::MAX"))
    }

    /// Offset of slot `slot`'s header from the region start
    #[inline]
    pub fn slot_offset(&self, slot: u32) -> usize {
        BLOCK_HEADER_SIZE + slot as usize * self.alloc_size
    }

    /// Offset of slot `slot`'s payload from the region start
    #[inline]
    pub fn payload_offset(&self, slot: u32) -> usize {
        self.slot_offset(slot) + SLOT_HEADER_SIZE
    }

    /// Element payload size
    #[inline]
    pub fn elem_size(&self) -> usize {
        self.alloc_size - SLOT_HEADER_SIZE
    }
}
