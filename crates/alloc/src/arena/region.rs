//! Byte ranges an arena can manage
//!
//! A region is a raw `(base, length)` pair plus whatever keeps it alive.
//! The arena never looks beyond `[base, base + len)` and never checks two
//! regions for overlap.

use core::alloc::Layout;
use core::marker::PhantomData;
use core::ptr::NonNull;

use super::GRANULE;
use crate::error::{AllocError, AllocResult};
use crate::system::SystemAllocator;
use crate::traits::Allocator;

/// Backing storage for an arena
///
/// # Safety
///
/// `base()` must be valid for reads and writes of `len()` bytes for as long
/// as the region is alive, must not move while the region is alive, and
/// must not be accessed through any other path during that time.
pub unsafe trait Region {
    /// First byte of the range
    fn base(&self) -> NonNull<u8>;

    /// Length of the range in bytes
    fn len(&self) -> usize;

    /// Whether the range is empty
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Heap-obtained region, released when dropped
#[derive(Debug)]
pub struct HeapRegion {
    ptr: NonNull<u8>,
    layout: Layout,
}

impl HeapRegion {
    /// Obtains `size` granule-aligned bytes from the system heap
    pub fn new(size: usize) -> AllocResult<Self> {
        if size == 0 {
            return Err(AllocError::invalid_config("region size cannot be zero"));
        }

        let layout = Layout::from_size_align(size, GRANULE)
            .map_err(|_| AllocError::invalid_layout("region size overflows isize"))?;

        let ptr = SystemAllocator
            .allocate(layout)
            .ok_or_else(|| AllocError::region_unavailable(layout))?;

        Ok(Self { ptr, layout })
    }
}

impl Drop for HeapRegion {
    fn drop(&mut self) {
        // SAFETY: `ptr` was obtained from `SystemAllocator` with `layout`
        // and is released exactly once.
        let released = unsafe { SystemAllocator.deallocate(self.ptr, self.layout) };
        debug_assert!(released.is_ok());
    }
}

// SAFETY: the heap block is exclusively owned by this value.
unsafe impl Send for HeapRegion {}

// SAFETY: `ptr` stays valid and pinned until drop; nothing else aliases it.
unsafe impl Region for HeapRegion {
    #[inline]
    fn base(&self) -> NonNull<u8> {
        self.ptr
    }

    #[inline]
    fn len(&self) -> usize {
        self.layout.size()
    }
}

/// Caller-provided region: a stack buffer, a leaked box or static storage
///
/// The borrow keeps the bytes pinned and exclusive for the arena's lifetime.
#[derive(Debug)]
pub struct BorrowedRegion<'a> {
    ptr: NonNull<u8>,
    len: usize,
    _bytes: PhantomData<&'a mut [u8]>,
}

impl<'a> BorrowedRegion<'a> {
    /// Borrows `bytes` for the lifetime of the region
    pub fn new(bytes: &'a mut [u8]) -> Self {
        Self {
            ptr: NonNull::from(&mut *bytes).cast(),
            len: bytes.len(),
            _bytes: PhantomData,
        }
    }
}

impl<'a> From<&'a mut [u8]> for BorrowedRegion<'a> {
    fn from(bytes: &'a mut [u8]) -> Self {
        Self::new(bytes)
    }
}

// SAFETY: equivalent to holding the `&'a mut [u8]`, which is `Send`.
unsafe impl Send for BorrowedRegion<'_> {}

// SAFETY: the exclusive borrow pins the bytes for `'a`.
unsafe impl Region for BorrowedRegion<'_> {
    #[inline]
    fn base(&self) -> NonNull<u8> {
        self.ptr
    }

    #[inline]
    fn len(&self) -> usize {
        self.len
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn heap_region_is_granule_aligned() {
        let region = HeapRegion::new(1000).unwrap();
        assert_eq!(region.len(), 1000);
        assert_eq!(region.base().as_ptr() as usize % GRANULE, 0);
    }

    #[test]
    fn zero_sized_heap_region_is_rejected() {
        let error = HeapRegion::new(0).unwrap_err();
        assert_eq!(error.code(), "ALLOC:CONFIG:INVALID");
    }

    #[test]
    fn borrowed_region_covers_the_slice() {
        let mut buffer = [0u8; 128];
        let start = buffer.as_ptr() as usize;
        let region = BorrowedRegion::from(&mut buffer[..]);

        assert_eq!(region.base().as_ptr() as usize, start);
        assert_eq!(region.len(), 128);
        assert!(!region.is_empty());
    }
}
