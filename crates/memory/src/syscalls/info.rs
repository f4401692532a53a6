//! Page size discovery
//!
//! # Safety
//!
//! Uses platform-specific syscalls:
//! - Unix: `libc::sysconf(_SC_PAGESIZE)`
//! - Windows: `GetSystemInfo`

use std::sync::OnceLock;

/// Page size assumed when the platform cannot report one
pub const FALLBACK_PAGE_SIZE: usize = 4096;

/// System page size in bytes
///
/// Queried once and cached. Falls back to [`FALLBACK_PAGE_SIZE`] when the
/// query fails or reports something that is not a power of two.
pub fn page_size() -> usize {
    static PAGE_SIZE: OnceLock<usize> = OnceLock::new();

    *PAGE_SIZE.get_or_init(|| match query_page_size() {
        Some(size) if size.is_power_of_two() => size,
        _ => FALLBACK_PAGE_SIZE,
    })
}

fn query_page_size() -> Option<usize> {
    #[cfg(unix)]
    {
        // SAFETY: FFI call to libc::sysconf with a valid parameter. Returns
        // the page size or -1 on error.
        let size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
        usize::try_from(size).ok()
    }

    #[cfg(windows)]
    {
        use winapi::um::sysinfoapi::{GetSystemInfo, SYSTEM_INFO};

        // SAFETY: SYSTEM_INFO is plain data, zeroed is a valid value, and
        // GetSystemInfo fills it in.
        let info = unsafe {
            let mut info: SYSTEM_INFO = std::mem::zeroed();
            GetSystemInfo(&mut info);
            info
        };
        Some(info.dwPageSize as usize)
    }

    #[cfg(not(any(unix, windows)))]
    {
        None
    }
}
