//! Primary-then-secondary composition

use core::alloc::Layout;
use core::ptr::NonNull;

use crate::error::AllocResult;
use crate::traits::{Allocator, Constructible, Owns, SizeBounded};

/// Tries `primary`, then `secondary` when the primary returns `None`
///
/// The primary must answer ownership queries: deallocation and in-place
/// construction are routed to the primary when it owns the pointer and to
/// the secondary otherwise.
///
/// # Examples
/// ```
/// use core::alloc::Layout;
/// use nebula_alloc::{Allocator, ArenaAllocator, FallbackAllocator, Owns, SystemAllocator};
///
/// let alloc = FallbackAllocator::new(ArenaAllocator::new(256)?, SystemAllocator);
/// let big = Layout::from_size_align(4096, 8).unwrap();
/// let ptr = alloc.allocate(big).unwrap();
/// assert!(!alloc.primary().owns(ptr));
/// unsafe { alloc.deallocate(ptr, big)? };
/// # Ok::<(), nebula_alloc::AllocError>(())
/// ```
#[derive(Debug, Default)]
pub struct FallbackAllocator<P, S> {
    primary: P,
    secondary: S,
}

impl<P, S> FallbackAllocator<P, S> {
    pub const fn new(primary: P, secondary: S) -> Self {
        Self { primary, secondary }
    }

    #[inline]
    pub fn primary(&self) -> &P {
        &self.primary
    }

    #[inline]
    pub fn secondary(&self) -> &S {
        &self.secondary
    }

    pub fn into_parts(self) -> (P, S) {
        (self.primary, self.secondary)
    }
}

// SAFETY: every block comes from exactly one side and is returned to the
// side that claims it.
unsafe impl<P: Owns, S: Allocator> Allocator for FallbackAllocator<P, S> {
    #[inline]
    #[track_caller]
    fn allocate(&self, layout: Layout) -> Option<NonNull<u8>> {
        // No closure here: it would hide the caller from `#[track_caller]`
        match self.primary.allocate(layout) {
            Some(ptr) => Some(ptr),
            None => self.secondary.allocate(layout),
        }
    }

    #[inline]
    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) -> AllocResult<()> {
        // SAFETY: caller contract forwarded to the side that served `ptr`.
        unsafe {
            if self.primary.owns(ptr) {
                self.primary.deallocate(ptr, layout)
            } else {
                self.secondary.deallocate(ptr, layout)
            }
        }
    }
}

// SAFETY: true only when one of the sides claims the block.
unsafe impl<P: Owns, S: Owns> Owns for FallbackAllocator<P, S> {
    #[inline]
    fn owns(&self, ptr: NonNull<u8>) -> bool {
        self.primary.owns(ptr) || self.secondary.owns(ptr)
    }
}

impl<P: Owns + SizeBounded, S: SizeBounded> SizeBounded for FallbackAllocator<P, S> {
    /// The larger of the two bounds
    fn max_size(&self) -> usize {
        self.primary.max_size().max(self.secondary.max_size())
    }
}

impl<P: Owns + Constructible, S: Constructible> Constructible for FallbackAllocator<P, S> {
    unsafe fn construct<T>(&self, ptr: NonNull<T>, value: T) {
        // SAFETY: caller contract forwarded to the owning side.
        unsafe {
            if self.primary.owns(ptr.cast()) {
                self.primary.construct(ptr, value);
            } else {
                self.secondary.construct(ptr, value);
            }
        }
    }

    unsafe fn destroy<T>(&self, ptr: NonNull<T>) {
        // SAFETY: caller contract forwarded to the owning side.
        unsafe {
            if self.primary.owns(ptr.cast()) {
                self.primary.destroy(ptr);
            } else {
                self.secondary.destroy(ptr);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arena::ArenaAllocator;
    use crate::system::SystemAllocator;

    fn layout(size: usize) -> Layout {
        Layout::from_size_align(size, 8).unwrap()
    }

    #[test]
    fn oversized_request_goes_to_secondary() {
        let alloc = FallbackAllocator::new(ArenaAllocator::new(256).unwrap(), SystemAllocator);

        let ptr = alloc.allocate(layout(257)).unwrap();
        assert!(!alloc.primary().owns(ptr));
        assert_eq!(alloc.primary().used(), 0);

        unsafe { alloc.deallocate(ptr, layout(257)).unwrap() };
    }

    #[test]
    fn primary_serves_while_it_can() {
        let alloc = FallbackAllocator::new(
            ArenaAllocator::new(128).unwrap(),
            ArenaAllocator::new(1024).unwrap(),
        );

        let first = alloc.allocate(layout(128)).unwrap();
        let second = alloc.allocate(layout(64)).unwrap();
        assert!(alloc.primary().owns(first));
        assert!(alloc.secondary().owns(second));
        assert!(alloc.owns(first) && alloc.owns(second));

        unsafe {
            alloc.deallocate(second, layout(64)).unwrap();
            alloc.deallocate(first, layout(128)).unwrap();
        }
        assert_eq!(alloc.primary().used(), 0);
        assert_eq!(alloc.secondary().used(), 0);
    }

    #[test]
    fn max_size_is_the_larger_bound() {
        let alloc = FallbackAllocator::new(
            ArenaAllocator::new(128).unwrap(),
            ArenaAllocator::new(1024).unwrap(),
        );
        assert_eq!(alloc.max_size(), 1024);
    }

    #[test]
    fn construct_routes_by_owner() {
        let alloc = FallbackAllocator::new(ArenaAllocator::new(64).unwrap(), SystemAllocator);
        let string_layout = Layout::new::<[String; 8]>();

        let ptr = alloc.allocate(string_layout).unwrap().cast::<String>();
        unsafe {
            alloc.construct(ptr, String::from("fallback"));
            assert_eq!(ptr.as_ref(), "fallback");
            alloc.destroy(ptr);
            alloc.deallocate(ptr.cast(), string_layout).unwrap();
        }
    }
}
