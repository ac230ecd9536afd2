//! System allocator implementation
//!
//! The one place the crate talks to the platform heap. `SystemAllocator` is
//! the unbounded allocator used as the secondary of a fallback composition,
//! and the source of heap-backed arena regions.

use core::alloc::{GlobalAlloc, Layout};
use core::ptr::NonNull;
use std::alloc::System;

use crate::error::AllocResult;
use crate::traits::{Allocator, Constructible, SizeBounded, ThreadSafeAllocator};

/// Wrapper for the system's default allocator
///
/// Has no capacity limit of its own and cannot answer ownership queries,
/// so it only ever appears as a fallback secondary or a segregator side
/// that is routed to by size.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SystemAllocator;

impl SystemAllocator {
    /// Creates a new SystemAllocator
    #[inline]
    pub const fn new() -> Self {
        SystemAllocator
    }
}

// SAFETY: `System` returns blocks that satisfy `layout` or null.
unsafe impl Allocator for SystemAllocator {
    #[inline]
    fn allocate(&self, layout: Layout) -> Option<NonNull<u8>> {
        if layout.size() == 0 {
            // Zero-sized requests get a well-aligned dangling pointer
            return NonNull::new(core::ptr::without_provenance_mut(layout.align()));
        }

        // SAFETY: layout has non-zero size.
        NonNull::new(unsafe { System.alloc(layout) })
    }

    #[inline]
    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) -> AllocResult<()> {
        if layout.size() == 0 {
            return Ok(());
        }

        // SAFETY: caller guarantees `ptr` came from `allocate` with `layout`.
        unsafe { System.dealloc(ptr.as_ptr(), layout) };
        Ok(())
    }
}

impl SizeBounded for SystemAllocator {
    fn max_size(&self) -> usize {
        isize::MAX as usize
    }
}

impl Constructible for SystemAllocator {}

// SAFETY: the system heap is inherently thread-safe.
unsafe impl ThreadSafeAllocator for SystemAllocator {}
