//! Standalone error types for keel-memory
//!
//! Uses thiserror for clean, idiomatic Rust error definitions.
//!
//! Only recoverable conditions live here. Conditions that mean a heap can no
//! longer be trusted are [`Fault`](crate::fault::Fault)s and go through the
//! fault handler instead.

use core::alloc::Layout;
use thiserror::Error;

#[cfg(feature = "logging")]
use tracing::error;

// ============================================================================
// Main Error Types
// ============================================================================

/// Memory management errors
#[must_use = "errors should be handled"]
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MemoryError {
    // --- Allocation Errors ---
    #[error("Memory allocation failed: {size} bytes with {align} byte alignment")]
    AllocationFailed { size: usize, align: usize },

    #[error("Invalid memory layout: {reason}")]
    InvalidLayout { reason: String },

    #[error("Size overflow during operation: {operation}")]
    SizeOverflow { operation: String },

    #[error("Invalid alignment: {alignment}")]
    InvalidAlignment { alignment: usize },

    // --- Mapping Errors ---
    #[error("Anonymous mapping of {size} bytes failed: {reason}")]
    MappingFailed { size: usize, reason: String },

    // --- Configuration Errors ---
    #[error("Invalid configuration: {reason}")]
    InvalidConfig { reason: String },

    // --- System Errors ---
    #[error("Memory corruption detected in {component}: {details}")]
    Corruption { component: String, details: String },
}

impl MemoryError {
    /// Get error code for categorization
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::AllocationFailed { .. } => "MEM:ALLOC:FAILED",
            Self::InvalidLayout { .. } => "MEM:ALLOC:LAYOUT",
            Self::SizeOverflow { .. } => "MEM:ALLOC:OVERFLOW",
            Self::InvalidAlignment { .. } => "MEM:ALLOC:ALIGN",
            Self::MappingFailed { .. } => "MEM:MAP:FAILED",
            Self::InvalidConfig { .. } => "MEM:CONFIG:INVALID",
            Self::Corruption { .. } => "MEM:SYSTEM:CORRUPTION",
        }
    }

    /// Whether the error came from a backend running out of memory
    #[must_use]
    pub fn is_exhaustion(&self) -> bool {
        matches!(
            self,
            Self::AllocationFailed { .. } | Self::MappingFailed { .. }
        )
    }

    // ============================================================================
    // Convenience Constructors - Allocation Errors
    // ============================================================================

    /// Create allocation failed error
    pub fn allocation_failed(size: usize, align: usize) -> Self {
        #[cfg(feature = "logging")]
        error!(size, align, "memory allocation failed");

        Self::AllocationFailed { size, align }
    }

    /// Create allocation failed error from layout
    pub fn allocation_failed_with_layout(layout: Layout) -> Self {
        Self::allocation_failed(layout.size(), layout.align())
    }

    /// Create invalid layout error
    pub fn invalid_layout(reason: &str) -> Self {
        Self::InvalidLayout {
            reason: reason.to_string(),
        }
    }

    /// Create size overflow error
    pub fn size_overflow(operation: &str) -> Self {
        Self::SizeOverflow {
            operation: operation.to_string(),
        }
    }

    /// Create invalid alignment error
    pub fn invalid_alignment(alignment: usize) -> Self {
        Self::InvalidAlignment { alignment }
    }

    /// Create mapping failed error from the OS error
    pub fn mapping_failed(size: usize, err: &std::io::Error) -> Self {
        #[cfg(feature = "logging")]
        error!(size, error = %err, "anonymous mapping failed");

        Self::MappingFailed {
            size,
            reason: err.to_string(),
        }
    }

    // --- Configuration Errors ---

    /// Create invalid config error
    pub fn invalid_config(reason: &str) -> Self {
        Self::InvalidConfig {
            reason: reason.to_string(),
        }
    }

    /// Create invalid heap config error
    pub fn invalid_heap_config(reason: &str) -> Self {
        Self::invalid_config(&format!("invalid heap config: {reason}"))
    }

    // --- System Errors ---

    /// Create memory corruption error
    pub fn corruption(component: &str, details: &str) -> Self {
        #[cfg(feature = "logging")]
        error!(component, details, "memory corruption");

        Self::Corruption {
            component: component.to_string(),
            details: details.to_string(),
        }
    }

    /// Check if this is an invalid alignment error
    #[must_use]
    pub fn is_invalid_alignment(&self) -> bool {
        matches!(self, Self::InvalidAlignment { .. })
    }
}

// ============================================================================
// Result Types
// ============================================================================

/// Result type for memory operations
pub type MemoryResult<T> = core::result::Result<T, MemoryError>;

/// Generic result type alias
pub type Result<T> = MemoryResult<T>;

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_error_creation() {
        let error = MemoryError::allocation_failed(1024, 8);
        assert!(error.to_string().contains("1024"));
        assert!(error.is_exhaustion());
    }

    #[test]
    fn test_error_with_layout() {
        let layout = Layout::new::<u64>();
        let error = MemoryError::allocation_failed_with_layout(layout);
        assert!(error.to_string().contains(&layout.size().to_string()));
    }

    #[test]
    fn test_mapping_error_keeps_os_reason() {
        let os = std::io::Error::from(std::io::ErrorKind::OutOfMemory);
        let error = MemoryError::mapping_failed(8192, &os);
        assert!(error.to_string().contains("8192"));
        assert!(error.is_exhaustion());
        assert_eq!(error.code(), "MEM:MAP:FAILED");
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(
            MemoryError::allocation_failed(1024, 8).code(),
            "MEM:ALLOC:FAILED"
        );
        assert_eq!(
            MemoryError::invalid_heap_config("page size").code(),
            "MEM:CONFIG:INVALID"
        );
        assert_eq!(
            MemoryError::size_overflow("block size").code(),
            "MEM:ALLOC:OVERFLOW"
        );
    }

    #[test]
    fn test_heap_config_reason_is_prefixed() {
        let error = MemoryError::invalid_heap_config("page size must be non-zero");
        assert_eq!(
            error,
            MemoryError::InvalidConfig {
                reason: "invalid heap config: page size must be non-zero".to_string()
            }
        );
    }

    #[test]
    fn test_corruption_error() {
        let error = MemoryError::corruption("block free list", "head is not free");
        assert_eq!(error.code(), "MEM:SYSTEM:CORRUPTION");
        assert!(!error.is_exhaustion());
    }

    #[test]
    fn test_config_errors_are_not_exhaustion() {
        assert!(!MemoryError::invalid_config("x").is_exhaustion());
        assert!(!MemoryError::invalid_alignment(3).is_exhaustion());
        assert!(MemoryError::invalid_alignment(3).is_invalid_alignment());
    }
}
