//! Fatal heap faults
//!
//! A [`Fault`] means the heap cannot continue: either the backend refused to
//! supply a new block, or the free-element accounting no longer matches the
//! block free lists. Faults are never returned to the caller of
//! [`Heap::alloc`](crate::heap::Heap::alloc); they are handed to the heap's
//! [`FaultHandler`], which must not return.

use core::fmt;

use thiserror::Error;

use crate::error::MemoryError;
use crate::heap::HeapId;

/// Unrecoverable heap condition
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum Fault {
    /// The heap could not add a new block
    ///
    /// Usually the backend refused the region. A heap that has used up every
    /// block id reports the same fault with a `SizeOverflow` source.
    #[error("{heap}: backend could not supply a {requested} byte block")]
    AllocatorExhausted {
        heap: HeapId,
        requested: usize,
        #[source]
        source: MemoryError,
    },

    /// `free_elems` is non-zero but no block has a free slot
    ///
    /// `source` is set when a block's free list turned out to be corrupt.
    #[error("{heap}: {free_elems} free elements recorded but none of {blocks} blocks has a free slot")]
    InvariantViolation {
        heap: HeapId,
        free_elems: usize,
        blocks: usize,
        #[source]
        source: Option<MemoryError>,
    },
}

impl Fault {
    /// Stable name of the fault, suitable for log filters and panic matching
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::AllocatorExhausted { .. } => "heap.allocator_exhausted",
            Self::InvariantViolation { .. } => "heap.internal_error",
        }
    }

    /// Heap the fault was raised on
    #[must_use]
    pub fn heap(&self) -> HeapId {
        match self {
            Self::AllocatorExhausted { heap, .. } | Self::InvariantViolation { heap, .. } => *heap,
        }
    }
}

/// Receiver of fatal heap faults
///
/// Implementations decide how the process goes down. `raise` never returns,
/// so the heap never continues past a fault.
pub trait FaultHandler: fmt::Debug {
    fn raise(&self, fault: Fault) -> !;
}

/// Default handler: reports the fault on stderr and aborts the process
///
/// The heap has already emitted an `error` event for the fault by the time
/// a handler runs; the stderr line survives without a subscriber.
#[derive(Debug, Clone, Copy, Default)]
pub struct AbortFaultHandler;

impl FaultHandler for AbortFaultHandler {
    fn raise(&self, fault: Fault) -> ! {
        eprintln!("fatal {}: {fault}", fault.name());
        std::process::abort()
    }
}

/// Handler that turns faults into panics
///
/// Useful for hosts that isolate work with `catch_unwind`, and for tests. The
/// panic message starts with the fault name.
#[derive(Debug, Clone, Copy, Default)]
pub struct PanicFaultHandler;

impl FaultHandler for PanicFaultHandler {
    fn raise(&self, fault: Fault) -> ! {
        panic!("{}: {fault}", fault.name())
    }
}
