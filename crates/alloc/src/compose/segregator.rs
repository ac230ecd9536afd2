//! Static size routing

use core::alloc::Layout;
use core::ptr::NonNull;

use crate::error::AllocResult;
use crate::traits::{Allocator, Constructible, Owns, SizeBounded};

/// Routes requests of at most `THRESHOLD` bytes to `P`, larger ones to `S`
///
/// The same test is applied on deallocation, so a block must be released
/// with the size it was requested with. Nothing else records which side
/// served it.
///
/// # Examples
/// ```
/// use core::alloc::Layout;
/// use nebula_alloc::{Allocator, ArenaAllocator, Owns, Segregator, SystemAllocator};
///
/// let alloc: Segregator<64, _, _> = Segregator::new(ArenaAllocator::new(4096)?, SystemAllocator);
/// let small = Layout::from_size_align(64, 8).unwrap();
/// let ptr = alloc.allocate(small).unwrap();
/// assert!(alloc.small().owns(ptr));
/// unsafe { alloc.deallocate(ptr, small)? };
/// # Ok::<(), nebula_alloc::AllocError>(())
/// ```
#[derive(Debug, Default)]
pub struct Segregator<const THRESHOLD: usize, P, S> {
    small: P,
    large: S,
}

impl<const THRESHOLD: usize, P, S> Segregator<THRESHOLD, P, S> {
    pub const fn new(small: P, large: S) -> Self {
        Self { small, large }
    }

    /// Largest size routed to the small side
    pub const fn threshold(&self) -> usize {
        THRESHOLD
    }

    #[inline]
    pub fn small(&self) -> &P {
        &self.small
    }

    #[inline]
    pub fn large(&self) -> &S {
        &self.large
    }

    pub fn into_parts(self) -> (P, S) {
        (self.small, self.large)
    }

    #[inline]
    const fn is_small(layout: Layout) -> bool {
        layout.size() <= THRESHOLD
    }
}

// SAFETY: allocation and deallocation apply the same size test, so each
// block goes back to the side that produced it.
unsafe impl<const THRESHOLD: usize, P: Allocator, S: Allocator> Allocator
    for Segregator<THRESHOLD, P, S>
{
    #[inline]
    #[track_caller]
    fn allocate(&self, layout: Layout) -> Option<NonNull<u8>> {
        if Self::is_small(layout) {
            self.small.allocate(layout)
        } else {
            self.large.allocate(layout)
        }
    }

    #[inline]
    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) -> AllocResult<()> {
        // SAFETY: caller contract forwarded to the side selected by size.
        unsafe {
            if Self::is_small(layout) {
                self.small.deallocate(ptr, layout)
            } else {
                self.large.deallocate(ptr, layout)
            }
        }
    }
}

// SAFETY: true only when one of the sides claims the block.
unsafe impl<const THRESHOLD: usize, P: Owns, S: Owns> Owns for Segregator<THRESHOLD, P, S> {
    #[inline]
    fn owns(&self, ptr: NonNull<u8>) -> bool {
        self.small.owns(ptr) || self.large.owns(ptr)
    }
}

impl<const THRESHOLD: usize, P: SizeBounded, S: SizeBounded> SizeBounded
    for Segregator<THRESHOLD, P, S>
{
    fn max_size(&self) -> usize {
        let large = self.large.max_size();
        if large > THRESHOLD {
            large
        } else {
            self.small.max_size().min(THRESHOLD)
        }
    }
}

// Construction has no size to route by, so the small side must answer
// ownership queries.
impl<const THRESHOLD: usize, P: Owns + Constructible, S: Constructible> Constructible
    for Segregator<THRESHOLD, P, S>
{
    unsafe fn construct<T>(&self, ptr: NonNull<T>, value: T) {
        // SAFETY: caller contract forwarded to the owning side.
        unsafe {
            if self.small.owns(ptr.cast()) {
                self.small.construct(ptr, value);
            } else {
                self.large.construct(ptr, value);
            }
        }
    }

    unsafe fn destroy<T>(&self, ptr: NonNull<T>) {
        // SAFETY: caller contract forwarded to the owning side.
        unsafe {
            if self.small.owns(ptr.cast()) {
                self.small.destroy(ptr);
            } else {
                self.large.destroy(ptr);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arena::ArenaAllocator;

    type Split = Segregator<128, ArenaAllocator, ArenaAllocator>;

    fn split() -> Split {
        Segregator::new(
            ArenaAllocator::new(1024).unwrap(),
            ArenaAllocator::new(4096).unwrap(),
        )
    }

    fn layout(size: usize) -> Layout {
        Layout::from_size_align(size, 8).unwrap()
    }

    #[test]
    fn threshold_is_inclusive() {
        let alloc = split();

        let at = alloc.allocate(layout(128)).unwrap();
        let above = alloc.allocate(layout(129)).unwrap();
        assert!(alloc.small().owns(at));
        assert!(alloc.large().owns(above));

        unsafe {
            alloc.deallocate(at, layout(128)).unwrap();
            alloc.deallocate(above, layout(129)).unwrap();
        }
        assert_eq!(alloc.small().used(), 0);
        assert_eq!(alloc.large().used(), 0);
    }

    #[test]
    fn small_side_exhaustion_is_not_rerouted() {
        let alloc: Segregator<64, _, _> = Segregator::new(
            ArenaAllocator::new(64).unwrap(),
            ArenaAllocator::new(4096).unwrap(),
        );
        let _full = alloc.allocate(layout(64)).unwrap();
        assert!(alloc.allocate(layout(16)).is_none());
    }

    #[test]
    fn max_size_prefers_the_large_side() {
        assert_eq!(split().max_size(), 4096);

        let capped: Segregator<2048, _, _> = Segregator::new(
            ArenaAllocator::new(4096).unwrap(),
            ArenaAllocator::new(1024).unwrap(),
        );
        assert_eq!(capped.max_size(), 2048);
    }

    #[test]
    fn construct_routes_by_owner() {
        let alloc = split();
        let ptr = alloc.allocate(Layout::new::<u64>()).unwrap().cast::<u64>();
        unsafe {
            alloc.construct(ptr, 42);
            assert_eq!(*ptr.as_ref(), 42);
            alloc.destroy(ptr);
            alloc.deallocate(ptr.cast(), Layout::new::<u64>()).unwrap();
        }
    }
}
