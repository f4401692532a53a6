//! Shared backends and probes for the integration tests

#![allow(dead_code)]

use std::alloc::Layout;
use std::cell::{Cell, RefCell};
use std::ptr::NonNull;
use std::rc::Rc;

use keel_memory::allocator::{Allocator, SystemAllocator};
use keel_memory::error::{MemoryError, MemoryResult};
use keel_memory::fault::PanicFaultHandler;
use keel_memory::heap::HeapConfig;

/// Something observable that happened during a test
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Alloc(usize),
    Dealloc(usize),
    Dropped(&'static str),
    Destructor(&'static str),
}

pub type EventLog = Rc<RefCell<Vec<Event>>>;

pub fn event_log() -> EventLog {
    Rc::new(RefCell::new(Vec::new()))
}

/// System allocator that records every request in an event log
#[derive(Debug)]
pub struct RecordingAllocator {
    log: EventLog,
    live: Cell<usize>,
}

impl RecordingAllocator {
    pub fn new(log: &EventLog) -> Self {
        Self {
            log: Rc::clone(log),
            live: Cell::new(0),
        }
    }

    /// Regions handed out and not yet returned
    pub fn live(&self) -> usize {
        self.live.get()
    }

    pub fn deallocations(&self) -> usize {
        self.log
            .borrow()
            .iter()
            .filter(|event| matches!(event, Event::Dealloc(_)))
            .count()
    }
}

unsafe impl Allocator for RecordingAllocator {
    unsafe fn allocate(&self, layout: Layout) -> MemoryResult<NonNull<[u8]>> {
        let region = unsafe { SystemAllocator.allocate(layout) }?;
        self.log.borrow_mut().push(Event::Alloc(layout.size()));
        self.live.set(self.live.get() + 1);
        Ok(region)
    }

    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) {
        self.log.borrow_mut().push(Event::Dealloc(layout.size()));
        self.live.set(self.live.get() - 1);
        unsafe { SystemAllocator.deallocate(ptr, layout) };
    }

    fn name(&self) -> &'static str {
        "recording"
    }
}

/// Backend that refuses every request
#[derive(Debug, Default)]
pub struct FailingAllocator {
    attempts: Cell<usize>,
}

impl FailingAllocator {
    pub fn attempts(&self) -> usize {
        self.attempts.get()
    }
}

unsafe impl Allocator for FailingAllocator {
    unsafe fn allocate(&self, layout: Layout) -> MemoryResult<NonNull<[u8]>> {
        self.attempts.set(self.attempts.get() + 1);
        Err(MemoryError::allocation_failed_with_layout(layout))
    }

    unsafe fn deallocate(&self, _ptr: NonNull<u8>, _layout: Layout) {
        unreachable!("nothing was ever allocated");
    }
}

/// Value that records when it is dropped
#[derive(Debug)]
pub struct Tracked {
    pub label: &'static str,
    log: EventLog,
}

impl Tracked {
    pub fn new(label: &'static str, log: &EventLog) -> Self {
        Self {
            label,
            log: Rc::clone(log),
        }
    }
}

impl Drop for Tracked {
    fn drop(&mut self) {
        self.log.borrow_mut().push(Event::Dropped(self.label));
    }
}

/// Debug preset with a fixed page size and panicking faults
pub fn test_config() -> HeapConfig {
    HeapConfig::debug()
        .with_page_size(4096)
        .with_fault_handler(Rc::new(PanicFaultHandler))
}

/// Install a test subscriber so `RUST_LOG=keel_memory=trace` shows heap events
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
