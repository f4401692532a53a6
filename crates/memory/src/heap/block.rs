//! A single block: one backend region carved into equal slots

use core::ptr::NonNull;

use super::element::{BlockId, HeapId};
use super::layout::{BlockGeometry, BlockHeader, END_OF_LIST, SlotHeader};

/// One resident block of a heap
///
/// The block owns its region for as long as it is resident. The free list
/// lives inside the region: `free_head` names the first free slot and each
/// free slot's header names the next.
///
/// `generations` counts how often each slot has been handed out, so a handle
/// to a freed slot stops matching once the slot is reused. Counters wrap.
#[derive(Debug)]
pub(crate) struct Block {
    id: BlockId,
    region: NonNull<u8>,
    free_head: u32,
    allocated: u32,
    generations: Box<[u32]>,
}

impl Block {
    /// Stamp the block header and thread every slot onto the free list
    ///
    /// Slots are linked in increasing address order, each pointing at the
    /// one before it, so the highest slot ends up at the head.
    ///
    /// # Safety
    /// `region` must be valid for writes of `geometry.block_size` bytes,
    /// aligned to `BLOCK_ALIGN` and not referenced by anything else.
    pub(crate) unsafe fn format(
        id: BlockId,
        heap: HeapId,
        region: NonNull<u8>,
        geometry: &BlockGeometry,
    ) -> Self {
        // SAFETY: region is aligned to BLOCK_ALIGN, which satisfies
        // BlockHeader, and has room for it (block_size includes it).
        unsafe {
            region.cast::<BlockHeader>().write(BlockHeader {
                heap: heap.as_u64(),
                block: id.0,
                elems: geometry.elems_per_block,
            });
        }

        let mut prev = END_OF_LIST;
        for slot in 0..geometry.elems_per_block {
            // SAFETY: slot < elems_per_block, so its header lies inside the
            // block_size bytes the caller vouched for.
            unsafe {
                SlotHeader::Free { next: prev }.write(region.as_ptr().add(geometry.slot_offset(slot)));
            }
            prev = slot;
        }

        Self {
            id,
            region,
            free_head: prev,
            allocated: 0,
            generations: vec![0; geometry.elems_per_block as usize].into_boxed_slice(),
        }
    }

    #[inline]
    pub(crate) fn id(&self) -> BlockId {
        self.id
    }

    #[inline]
    pub(crate) fn region(&self) -> NonNull<u8> {
        self.region
    }

    /// Slots currently handed out
    #[inline]
    pub(crate) fn allocated(&self) -> u32 {
        self.allocated
    }

    /// Times `slot` has been handed out, `None` if out of range
    #[inline]
    pub(crate) fn generation(&self, slot: u32) -> Option<u32> {
        self.generations.get(slot as usize).copied()
    }

    /// Whether the free list has a head that does not decode as a free slot
    pub(crate) fn has_corrupt_head(&self, geometry: &BlockGeometry) -> bool {
        let slot = self.free_head;
        slot != END_OF_LIST
            && (slot >= geometry.elems_per_block
                || !matches!(
                    self.slot_header(slot, geometry),
                    Some(SlotHeader::Free { .. })
                ))
    }

    /// Header stamped at the start of the region
    pub(crate) fn header(&self) -> BlockHeader {
        // SAFETY: written by `format`, aligned, and the region is still owned.
        unsafe { self.region.cast::<BlockHeader>().read() }
    }

    /// Decode the header of `slot`
    ///
    /// `slot` must be below `geometry.elems_per_block`.
    pub(crate) fn slot_header(&self, slot: u32, geometry: &BlockGeometry) -> Option<SlotHeader> {
        debug_assert!(slot < geometry.elems_per_block);
        // SAFETY: slot is in range, so the header lies inside the region.
        unsafe { SlotHeader::read(self.region.as_ptr().add(geometry.slot_offset(slot))) }
    }

    /// Payload address of `slot`
    #[inline]
    pub(crate) fn payload(&self, slot: u32, geometry: &BlockGeometry) -> NonNull<u8> {
        // SAFETY: slot < elems_per_block keeps the offset inside the region,
        // and an in-bounds offset of a non-null pointer is non-null.
        unsafe { self.region.add(geometry.payload_offset(slot)) }
    }

    /// Take the head of the free list and mark it allocated
    ///
    /// Returns `None` when the list is empty or the head does not decode as
    /// a free slot.
    pub(crate) fn pop_free(&mut self, geometry: &BlockGeometry) -> Option<u32> {
        let slot = self.free_head;
        if slot == END_OF_LIST || slot >= geometry.elems_per_block {
            return None;
        }

        let Some(SlotHeader::Free { next }) = self.slot_header(slot, geometry) else {
            return None;
        };

        // SAFETY: slot is in range (checked above).
        unsafe {
            SlotHeader::Allocated { owner: self.id.0 }
                .write(self.region.as_ptr().add(geometry.slot_offset(slot)));
        }

        let generation = &mut self.generations[slot as usize];
        *generation = generation.wrapping_add(1);

        self.free_head = next;
        self.allocated += 1;
        Some(slot)
    }

    /// Link `slot` back onto the head of the free list
    ///
    /// The caller has already checked that `slot` is in range and allocated.
    pub(crate) fn push_free(&mut self, slot: u32, geometry: &BlockGeometry) {
        debug_assert!(slot < geometry.elems_per_block);
        debug_assert!(self.allocated > 0);

        // SAFETY: slot is in range (caller contract).
        unsafe {
            SlotHeader::Free {
                next: self.free_head,
            }
            .write(self.region.as_ptr().add(geometry.slot_offset(slot)));
        }

        self.free_head = slot;
        self.allocated -= 1;
    }
}
