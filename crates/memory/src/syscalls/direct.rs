//! Direct system call wrappers for anonymous memory mappings
//!
//! # Safety
//!
//! Every function here performs an FFI call to an OS primitive:
//! - **Unix**: `libc::mmap` / `libc::munmap`
//! - **Windows**: `VirtualAlloc` / `VirtualFree`
//!
//! Callers must ensure:
//! 1. **Validity**: pointers passed to [`memory_unmap`] came from [`memory_map`]
//! 2. **Lifecycle**: a region is unmapped exactly once
//! 3. **Access**: a region is not touched after it is unmapped

use std::io;

/// Map `size` bytes of private, zero-filled, read/write anonymous memory
///
/// The OS rounds `size` up to its page granularity. The returned pointer is
/// page aligned.
///
/// # Errors
///
/// Returns the OS error when the mapping is refused, and
/// `ErrorKind::Unsupported` on platforms without anonymous mappings.
pub fn memory_map(size: usize) -> io::Result<*mut u8> {
    if size == 0 {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "cannot map zero bytes",
        ));
    }

    #[cfg(unix)]
    {
        use libc::{MAP_ANONYMOUS, MAP_FAILED, MAP_PRIVATE, PROT_READ, PROT_WRITE, mmap};

        // SAFETY: FFI call to libc mmap with a null hint, a non-zero size and
        // fd=-1/offset=0 for an anonymous mapping. The OS validates the rest
        // and reports MAP_FAILED on error.
        let ptr = unsafe {
            mmap(
                std::ptr::null_mut(),
                size,
                PROT_READ | PROT_WRITE,
                MAP_PRIVATE | MAP_ANONYMOUS,
                -1,
                0,
            )
        };

        if ptr == MAP_FAILED {
            Err(io::Error::last_os_error())
        } else {
            Ok(ptr.cast::<u8>())
        }
    }

    #[cfg(windows)]
    {
        use winapi::um::memoryapi::VirtualAlloc;
        use winapi::um::winnt::{MEM_COMMIT, MEM_RESERVE, PAGE_READWRITE};

        // SAFETY: FFI call to VirtualAlloc with a null hint and commit+reserve
        // flags. Returns null on error.
        let ptr = unsafe {
            VirtualAlloc(
                std::ptr::null_mut(),
                size,
                MEM_COMMIT | MEM_RESERVE,
                PAGE_READWRITE,
            )
        };

        if ptr.is_null() {
            Err(io::Error::last_os_error())
        } else {
            Ok(ptr.cast::<u8>())
        }
    }

    #[cfg(not(any(unix, windows)))]
    {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "anonymous mappings are not available on this platform",
        ))
    }
}

/// Unmap a region obtained from [`memory_map`]
///
/// # Safety
///
/// - `addr` must have been returned by [`memory_map`]
/// - `size` must match the size passed to [`memory_map`]
/// - the region must not be accessed after this call
/// - must not be called more than once for the same region
pub unsafe fn memory_unmap(addr: *mut u8, size: usize) -> io::Result<()> {
    #[cfg(unix)]
    {
        // SAFETY: caller guarantees addr/size describe a live mapping.
        let result = unsafe { libc::munmap(addr.cast::<libc::c_void>(), size) };
        if result == -1 {
            Err(io::Error::last_os_error())
        } else {
            Ok(())
        }
    }

    #[cfg(windows)]
    {
        use winapi::um::memoryapi::VirtualFree;
        use winapi::um::winnt::MEM_RELEASE;

        // MEM_RELEASE frees the whole reservation and requires a zero size
        let _ = size;

        // SAFETY: caller guarantees addr came from VirtualAlloc.
        let result = unsafe { VirtualFree(addr.cast::<winapi::ctypes::c_void>(), 0, MEM_RELEASE) };
        if result == 0 {
            Err(io::Error::last_os_error())
        } else {
            Ok(())
        }
    }

    #[cfg(not(any(unix, windows)))]
    {
        let _ = (addr, size);
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "anonymous mappings are not available on this platform",
        ))
    }
}
