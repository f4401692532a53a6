//! Identities of heaps, blocks and the elements they hand out

use core::cell::Cell;
use core::fmt;
use core::ptr::NonNull;

/// Identity of a heap, unique among the heaps created on this thread
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HeapId(u64);

impl HeapId {
    pub(crate) fn next() -> Self {
        thread_local! {
            static NEXT_HEAP_ID: Cell<u64> = const { Cell::new(1) };
        }

        NEXT_HEAP_ID.with(|next| {
            let id = next.get();
            next.set(id.wrapping_add(1));
            Self(id)
        })
    }

    /// Build an id from its raw value
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for HeapId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "heap#{}", self.0)
    }
}

/// Identity of a block within its heap
///
/// Ids are handed out in increasing order and never reused, so an element
/// from a released block can never match a newer block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockId(pub(crate) u32);

impl BlockId {
    pub const fn as_u32(self) -> u32 {
        self.0
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "block#{}", self.0)
    }
}

/// Handle to an allocated slot
///
/// An element names its slot as `(heap, block, slot, generation)` and
/// carries the payload address for convenience. Handing it back to
/// [`Heap::free`](super::Heap::free) releases the slot; after that the
/// payload pointer dangles. The generation changes every time the slot is
/// handed out again, so a copy of a freed handle never matches the slot's
/// next owner and is rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Element {
    pub(crate) heap: HeapId,
    pub(crate) block: BlockId,
    pub(crate) slot: u32,
    pub(crate) generation: u32,
    pub(crate) payload: NonNull<u8>,
}

impl Element {
    /// Heap that handed out this element
    #[inline]
    pub fn heap(&self) -> HeapId {
        self.heap
    }

    /// Block holding the slot
    #[inline]
    pub fn block(&self) -> BlockId {
        self.block
    }

    /// Slot index within the block
    #[inline]
    pub fn slot(&self) -> u32 {
        self.slot
    }

    /// How many times the slot had been handed out, this time included
    #[inline]
    pub fn generation(&self) -> u32 {
        self.generation
    }

    /// Start of the element payload
    ///
    /// The payload is `elem_size` bytes. It is 8-byte aligned whenever the
    /// element size is a multiple of 8, and only byte aligned otherwise.
    #[inline]
    pub fn as_ptr(&self) -> NonNull<u8> {
        self.payload
    }
}
