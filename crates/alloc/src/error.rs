//! Error types for nebula-alloc
//!
//! Capacity exhaustion is never an error: `allocate` signals it with `None`.
//! The variants here cover construction problems and contract violations
//! on the deallocation path (foreign, misaligned, out-of-bounds or double
//! frees), which the arena engine checks unless the `trusted-caller`
//! feature strips those checks.

use core::alloc::Layout;
use thiserror::Error;

#[cfg(feature = "logging")]
use tracing::error;

// ============================================================================
// Main Error Type
// ============================================================================

/// Allocator errors
#[must_use = "errors should be handled"]
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AllocError {
    // --- Construction Errors ---
    #[error("Invalid configuration: {reason}")]
    InvalidConfig { reason: String },

    #[error("Invalid memory layout: {reason}")]
    InvalidLayout { reason: String },

    #[error("Backing region unavailable: {size} bytes with {align} byte alignment")]
    RegionUnavailable { size: usize, align: usize },

    // --- Contract Violations ---
    #[error("Pointer {address:#x} is not owned by any reachable allocator")]
    ForeignPointer { address: usize },

    #[error("Pointer {address:#x} is not aligned to the {align} byte block granule")]
    Misaligned { address: usize, align: usize },

    #[error("Block at {address:#x} of {size} bytes extends past arena capacity {capacity}")]
    OutOfBounds {
        address: usize,
        size: usize,
        capacity: usize,
    },

    #[error("Block at {address:#x} of {size} bytes overlaps free memory (double free?)")]
    DoubleFree { address: usize, size: usize },

    #[error("Freeing {size} bytes at {address:#x} exceeds what is outstanding (mis-sized free?)")]
    Unbalanced { address: usize, size: usize },

    // --- System Errors ---
    #[error("Memory corruption detected in {component}: {details}")]
    Corruption { component: String, details: String },
}

impl AllocError {
    /// Whether the error reports a broken deallocation contract
    #[must_use]
    pub fn is_contract_violation(&self) -> bool {
        matches!(
            self,
            Self::ForeignPointer { .. }
                | Self::Misaligned { .. }
                | Self::OutOfBounds { .. }
                | Self::DoubleFree { .. }
                | Self::Unbalanced { .. }
        )
    }

    /// Get error code for categorization
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidConfig { .. } => "ALLOC:CONFIG:INVALID",
            Self::InvalidLayout { .. } => "ALLOC:LAYOUT:INVALID",
            Self::RegionUnavailable { .. } => "ALLOC:REGION:UNAVAILABLE",
            Self::ForeignPointer { .. } => "ALLOC:CONTRACT:FOREIGN",
            Self::Misaligned { .. } => "ALLOC:CONTRACT:MISALIGNED",
            Self::OutOfBounds { .. } => "ALLOC:CONTRACT:BOUNDS",
            Self::DoubleFree { .. } => "ALLOC:CONTRACT:DOUBLE_FREE",
            Self::Unbalanced { .. } => "ALLOC:CONTRACT:UNBALANCED",
            Self::Corruption { .. } => "ALLOC:SYSTEM:CORRUPTION",
        }
    }

    // ========================================================================
    // Convenience Constructors
    // ========================================================================

    /// Create invalid config error
    pub fn invalid_config(reason: &str) -> Self {
        Self::InvalidConfig {
            reason: reason.to_string(),
        }
    }

    /// Create invalid layout error
    pub fn invalid_layout(reason: &str) -> Self {
        Self::InvalidLayout {
            reason: reason.to_string(),
        }
    }

    /// Create region unavailable error from the layout that could not be obtained
    pub fn region_unavailable(layout: Layout) -> Self {
        #[cfg(feature = "logging")]
        error!(
            size = layout.size(),
            align = layout.align(),
            "backing region allocation failed"
        );

        Self::RegionUnavailable {
            size: layout.size(),
            align: layout.align(),
        }
    }

    /// Create foreign pointer error
    pub fn foreign_pointer(address: usize) -> Self {
        #[cfg(feature = "logging")]
        error!(address, "deallocation of foreign pointer");

        Self::ForeignPointer { address }
    }

    /// Create misaligned pointer error
    pub fn misaligned(address: usize, align: usize) -> Self {
        #[cfg(feature = "logging")]
        error!(address, align, "misaligned deallocation");

        Self::Misaligned { address, align }
    }

    /// Create out of bounds error
    pub fn out_of_bounds(address: usize, size: usize, capacity: usize) -> Self {
        #[cfg(feature = "logging")]
        error!(address, size, capacity, "deallocation extends past arena");

        Self::OutOfBounds {
            address,
            size,
            capacity,
        }
    }

    /// Create double free error
    pub fn double_free(address: usize, size: usize) -> Self {
        #[cfg(feature = "logging")]
        error!(address, size, "double free detected");

        Self::DoubleFree { address, size }
    }

    /// Create unbalanced deallocation error
    pub fn unbalanced(address: usize, size: usize) -> Self {
        #[cfg(feature = "logging")]
        error!(address, size, "deallocation exceeds outstanding usage");

        Self::Unbalanced { address, size }
    }

    /// Create memory corruption error
    pub fn corruption(component: &str, details: &str) -> Self {
        #[cfg(feature = "logging")]
        error!("Memory corruption: {component} - {details}");

        Self::Corruption {
            component: component.to_string(),
            details: details.to_string(),
        }
    }
}

// ============================================================================
// Result Types
// ============================================================================

/// Result type for allocator operations
pub type AllocResult<T> = core::result::Result<T, AllocError>;

// ============================================================================
// Tests
// ============================================================================
