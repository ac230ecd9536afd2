//! Arena and guard configuration

use crate::arena::GRANULE;
use crate::error::{AllocError, AllocResult};

/// Configuration for an arena allocator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArenaConfig {
    /// Region size in bytes (rounded down to whole granules)
    pub capacity: usize,

    /// Fill pattern byte for newly allocated blocks (for debugging)
    pub alloc_pattern: Option<u8>,
    /// Fill pattern byte for freed blocks (for debugging)
    pub dealloc_pattern: Option<u8>,
}

impl Default for ArenaConfig {
    fn default() -> Self {
        Self {
            capacity: 64 * 1024,
            alloc_pattern: if cfg!(debug_assertions) {
                Some(0xBB)
            } else {
                None
            },
            dealloc_pattern: if cfg!(debug_assertions) {
                Some(0xDD)
            } else {
                None
            },
        }
    }
}

impl ArenaConfig {
    /// Default configuration with the given capacity
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity,
            ..Self::default()
        }
    }

    /// Production configuration - no fill patterns
    #[must_use]
    pub fn production(capacity: usize) -> Self {
        Self {
            capacity,
            alloc_pattern: None,
            dealloc_pattern: None,
        }
    }

    /// Debug configuration - poison fresh and freed blocks
    #[must_use]
    pub fn debug(capacity: usize) -> Self {
        Self {
            capacity,
            alloc_pattern: Some(0xBB),
            dealloc_pattern: Some(0xDD),
        }
    }

    /// Check that the capacity can hold at least one free-list footer
    pub fn validate(&self) -> AllocResult<()> {
        if self.capacity < GRANULE {
            return Err(AllocError::invalid_config(&format!(
                "arena capacity {} is smaller than one {GRANULE} byte footer",
                self.capacity
            )));
        }
        Ok(())
    }
}

/// Configuration for the guard regions of an overflow-checking wrapper
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OverflowConfig {
    /// Bytes of guard pattern before and after every block
    pub guard_size: usize,
    /// Repeating byte written into both guards
    pub pattern: u8,
}

impl Default for OverflowConfig {
    fn default() -> Self {
        Self {
            guard_size: 16,
            pattern: 0b1010_1010,
        }
    }
}

impl OverflowConfig {
    /// Guards of `guard_size` bytes with the default pattern
    #[must_use]
    pub fn with_guard_size(guard_size: usize) -> Self {
        Self {
            guard_size,
            ..Self::default()
        }
    }

    /// Zero-length guards would detect nothing
    pub fn validate(&self) -> AllocResult<()> {
        if self.guard_size == 0 {
            return Err(AllocError::invalid_config("guard size cannot be zero"));
        }
        Ok(())
    }
}
