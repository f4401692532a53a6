//! Reference-counted object handles

use core::alloc::Layout;
use core::cell::Cell;
use core::fmt;
use core::marker::PhantomData;
use core::mem::ManuallyDrop;
use core::ops::Deref;
use core::ptr::{self, NonNull};
use std::rc::Rc;

use super::teardown::Teardown;
use crate::allocator::{Allocator, SystemAllocator};
use crate::error::{MemoryError, MemoryResult};

/// Custom disposal run once, when the last handle is released
///
/// The destructor takes over the value and its storage. Dropping the
/// [`Teardown`] it receives performs the default disposal.
pub type Destructor<T> = Box<dyn FnOnce(Teardown<T>)>;

/// Name bytes copied into storage owned by the object
struct OwnedName {
    ptr: NonNull<u8>,
    layout: Layout,
}

impl OwnedName {
    fn copy_from(name: &str, allocator: &dyn Allocator) -> MemoryResult<Self> {
        let layout = Layout::array::<u8>(name.len())
            .map_err(|_| MemoryError::size_overflow("object name"))?;

        // SAFETY: the layout is valid; zero-length names get a dangling
        // pointer that is never read through.
        let ptr = unsafe { allocator.allocate(layout) }?.cast::<u8>();

        // SAFETY: the fresh region holds at least name.len() bytes and cannot
        // overlap the borrowed name.
        unsafe { ptr::copy_nonoverlapping(name.as_ptr(), ptr.as_ptr(), name.len()) };

        Ok(Self { ptr, layout })
    }

    fn as_str(&self) -> &str {
        // SAFETY: the bytes were copied from a &str and are never mutated.
        unsafe {
            core::str::from_utf8_unchecked(core::slice::from_raw_parts(
                self.ptr.as_ptr(),
                self.layout.size(),
            ))
        }
    }

    /// # Safety
    /// `allocator` must be the allocator the name was copied into.
    unsafe fn release(self, allocator: &dyn Allocator) {
        unsafe { allocator.deallocate(self.ptr, self.layout) };
    }
}

struct ObjectInner<T> {
    refcount: Cell<isize>,
    name: Option<OwnedName>,
    destructor: Option<Destructor<T>>,
    allocator: Rc<dyn Allocator>,
    value: T,
}

/// Handle to a reference-counted object
///
/// Every handle holds one reference. [`Object::retain`] (or `clone`) adds a
/// handle, [`Object::release`] (or dropping) gives one up. When the count
/// reaches zero the object is torn down on the spot:
///
/// 1. the owned name is returned to the allocator
/// 2. the destructor runs if one was given, otherwise the value is dropped
///    and its storage returned
///
/// Objects are single threaded: they are neither `Send` nor `Sync`.
///
/// # Examples
///
/// ```
/// use keel_memory::object::Object;
///
/// let session = Object::init(String::from("state"), Some("session"), None).unwrap();
/// let again = session.retain();
/// assert_eq!(session.refcount(), 2);
/// assert_eq!(again.name(), Some("session"));
///
/// assert!(!again.release());
/// assert!(session.release());
/// ```
pub struct Object<T> {
    inner: NonNull<ObjectInner<T>>,
    _marker: PhantomData<ObjectInner<T>>,
}

impl<T> Object<T> {
    /// Creates an unnamed object without a destructor
    pub fn new(value: T) -> MemoryResult<Self> {
        Self::init(value, None, None)
    }

    /// Creates an object in the system allocator
    ///
    /// The name, if any, is copied. The refcount starts at 1.
    pub fn init(
        value: T,
        name: Option<&str>,
        destructor: Option<Destructor<T>>,
    ) -> MemoryResult<Self> {
        Self::init_in(Rc::new(SystemAllocator::new()), value, name, destructor)
    }

    /// Creates an object whose storage and name live in `allocator`
    pub fn init_in(
        allocator: Rc<dyn Allocator>,
        value: T,
        name: Option<&str>,
        destructor: Option<Destructor<T>>,
    ) -> MemoryResult<Self> {
        let name = name
            .map(|name| OwnedName::copy_from(name, &*allocator))
            .transpose()?;

        let layout = Layout::new::<ObjectInner<T>>();

        // SAFETY: ObjectInner always has a non-zero size (the refcount).
        let storage = match unsafe { allocator.allocate(layout) } {
            Ok(region) => region.cast::<ObjectInner<T>>(),
            Err(err) => {
                if let Some(name) = name {
                    // SAFETY: copied into this allocator just above.
                    unsafe { name.release(&*allocator) };
                }
                return Err(err);
            }
        };

        #[cfg(all(feature = "logging", debug_assertions))]
        tracing::trace!(
            name = name.as_ref().map(OwnedName::as_str),
            allocator = allocator.name(),
            "object initialized"
        );

        // SAFETY: storage is fresh, sized and aligned for ObjectInner<T>.
        unsafe {
            storage.write(ObjectInner {
                refcount: Cell::new(1),
                name,
                destructor,
                allocator,
                value,
            });
        }

        Ok(Self {
            inner: storage,
            _marker: PhantomData,
        })
    }

    #[inline]
    fn inner(&self) -> &ObjectInner<T> {
        // SAFETY: a live handle keeps the refcount at 1 or more, so the inner
        // value has not been torn down.
        unsafe { self.inner.as_ref() }
    }

    /// Adds a reference and returns a handle for it
    pub fn retain(&self) -> Self {
        let refcount = &self.inner().refcount;
        let count = refcount.get();
        if count == isize::MAX {
            // same policy as Rc: an overflowing count cannot be recovered
            std::process::abort();
        }
        refcount.set(count + 1);

        Self {
            inner: self.inner,
            _marker: PhantomData,
        }
    }

    /// Gives up this handle's reference
    ///
    /// Returns `true` if this was the last reference and the object was torn
    /// down.
    pub fn release(self) -> bool {
        let this = ManuallyDrop::new(self);
        // SAFETY: the handle is consumed without running Drop, so its
        // reference is given up exactly once.
        unsafe { Self::release_ref(this.inner) }
    }

    /// Current number of references
    pub fn refcount(&self) -> isize {
        self.inner().refcount.get()
    }

    /// Name given at creation
    pub fn name(&self) -> Option<&str> {
        self.inner().name.as_ref().map(OwnedName::as_str)
    }

    /// Whether a custom destructor will run at teardown
    pub fn has_destructor(&self) -> bool {
        self.inner().destructor.is_some()
    }

    /// Whether both handles refer to the same object
    pub fn ptr_eq(this: &Self, other: &Self) -> bool {
        this.inner == other.inner
    }

    /// # Safety
    /// `inner` must be live and the caller must own one of its references.
    unsafe fn release_ref(inner: NonNull<ObjectInner<T>>) -> bool {
        // SAFETY: caller owns a reference, so inner is live.
        let refcount = unsafe { &inner.as_ref().refcount };
        let remaining = refcount.get() - 1;
        refcount.set(remaining);

        if remaining > 0 {
            return false;
        }

        // SAFETY: that was the last reference.
        unsafe { Self::teardown(inner) };
        true
    }

    /// # Safety
    /// `inner` must be live and unreachable from any handle.
    unsafe fn teardown(inner: NonNull<ObjectInner<T>>) {
        // SAFETY: moving every field out leaves the storage logically
        // uninitialized; it is only released from here on.
        let ObjectInner {
            name,
            destructor,
            allocator,
            value,
            ..
        } = unsafe { inner.as_ptr().read() };

        #[cfg(all(feature = "logging", debug_assertions))]
        tracing::trace!(
            name = name.as_ref().map(OwnedName::as_str),
            custom = destructor.is_some(),
            "object destroyed"
        );

        if let Some(name) = name {
            // SAFETY: the name was copied into this allocator at init.
            unsafe { name.release(&*allocator) };
        }

        // SAFETY: storage came from `allocator` with this layout and its
        // value has just been moved out.
        let teardown = unsafe {
            Teardown::new(
                value,
                inner.cast::<u8>(),
                Layout::new::<ObjectInner<T>>(),
                allocator,
            )
        };

        match destructor {
            Some(destructor) => destructor(teardown),
            None => drop(teardown),
        }
    }
}

impl<T> Clone for Object<T> {
    fn clone(&self) -> Self {
        self.retain()
    }
}

impl<T> Deref for Object<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.inner().value
    }
}

impl<T> Drop for Object<T> {
    fn drop(&mut self) {
        // SAFETY: this handle owns one reference and is going away.
        unsafe { Self::release_ref(self.inner) };
    }
}

impl<T: fmt::Debug> fmt::Debug for Object<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Object")
            .field("name", &self.name())
            .field("refcount", &self.refcount())
            .field("value", &**self)
            .finish()
    }
}
