//! Alignment and checked arithmetic helpers used by the heap geometry code

use crate::error::{MemoryError, MemoryResult};

/// Aligns a value up to the nearest multiple of alignment
///
/// # Examples
/// ```
/// use keel_memory::utils::align_up;
///
/// assert_eq!(align_up(7, 8), 8);
/// assert_eq!(align_up(8, 8), 8);
/// assert_eq!(align_up(9, 8), 16);
/// ```
#[inline(always)]
pub const fn align_up(value: usize, alignment: usize) -> usize {
    debug_assert!(alignment.is_power_of_two());
    (value + alignment - 1) & !(alignment - 1)
}

/// Checked arithmetic that reports overflow as a [`MemoryError`]
///
/// # Examples
///
/// ```
/// use keel_memory::utils::CheckedArithmetic;
///
/// let a: usize = 10;
/// let b: usize = 20;
///
/// assert_eq!(a.try_add(b).unwrap(), 30);
/// assert!(usize::MAX.try_add(1).is_err());
/// ```
pub trait CheckedArithmetic: Sized {
    /// Checked addition. Returns `SizeOverflow` on overflow.
    fn try_add(self, rhs: Self) -> MemoryResult<Self>;

    /// Checked subtraction. Returns `SizeOverflow` on underflow.
    fn try_sub(self, rhs: Self) -> MemoryResult<Self>;

    /// Checked multiplication. Returns `SizeOverflow` on overflow.
    fn try_mul(self, rhs: Self) -> MemoryResult<Self>;
}

impl CheckedArithmetic for usize {
    #[inline]
    fn try_add(self, rhs: Self) -> MemoryResult<Self> {
        self.checked_add(rhs)
            .ok_or_else(|| MemoryError::size_overflow("usize addition"))
    }

    #[inline]
    fn try_sub(self, rhs: Self) -> MemoryResult<Self> {
        self.checked_sub(rhs)
            .ok_or_else(|| MemoryError::size_overflow("usize subtraction"))
    }

    #[inline]
    fn try_mul(self, rhs: Self) -> MemoryResult<Self> {
        self.checked_mul(rhs)
            .ok_or_else(|| MemoryError::size_overflow("usize multiplication"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alignment_functions() {
        assert_eq!(align_up(0, 8), 0);
        assert_eq!(align_up(1, 8), 8);
        assert_eq!(align_up(7, 8), 8);
        assert_eq!(align_up(8, 8), 8);
        assert_eq!(align_up(9, 8), 16);
        assert_eq!(align_up(4097, 4096), 8192);
    }

    #[test]
    fn test_checked_arithmetic() {
        assert_eq!(3usize.try_mul(4).unwrap(), 12);
        assert_eq!(3usize.try_sub(1).unwrap(), 2);

        let err = 0usize.try_sub(1).unwrap_err();
        assert_eq!(err.code(), "MEM:ALLOC:OVERFLOW");
        assert!(usize::MAX.try_mul(2).is_err());
    }
}
