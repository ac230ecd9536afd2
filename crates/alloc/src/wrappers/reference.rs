//! Non-owning allocator handle

use core::alloc::Layout;
use core::fmt;
use core::ptr::{self, NonNull};

use crate::error::AllocResult;
use crate::traits::{Allocator, Constructible, Owns, SizeBounded, ThreadSafeAllocator};

/// Borrowed handle to an allocator owned elsewhere
///
/// Copies freely and compares by identity: two handles are equal when they
/// point at the same allocator instance. The borrow keeps the allocator
/// alive for as long as any handle exists.
pub struct RefAllocator<'a, A: ?Sized> {
    inner: &'a A,
}

impl<'a, A: ?Sized> RefAllocator<'a, A> {
    pub const fn new(inner: &'a A) -> Self {
        Self { inner }
    }

    /// The referenced allocator
    #[inline]
    pub fn get(&self) -> &'a A {
        self.inner
    }
}

impl<'a, A: ?Sized> From<&'a A> for RefAllocator<'a, A> {
    fn from(inner: &'a A) -> Self {
        Self::new(inner)
    }
}

impl<A: ?Sized> Clone for RefAllocator<'_, A> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<A: ?Sized> Copy for RefAllocator<'_, A> {}

impl<A: ?Sized> PartialEq for RefAllocator<'_, A> {
    fn eq(&self, other: &Self) -> bool {
        ptr::addr_eq(self.inner, other.inner)
    }
}

impl<A: ?Sized> Eq for RefAllocator<'_, A> {}

impl<A: ?Sized> fmt::Debug for RefAllocator<'_, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("RefAllocator")
            .field(&ptr::from_ref(self.inner).cast::<()>())
            .finish()
    }
}

// SAFETY: forwards to the referenced allocator.
unsafe impl<A: Allocator + ?Sized> Allocator for RefAllocator<'_, A> {
    #[inline]
    #[track_caller]
    fn allocate(&self, layout: Layout) -> Option<NonNull<u8>> {
        self.inner.allocate(layout)
    }

    #[inline]
    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) -> AllocResult<()> {
        // SAFETY: caller contract forwarded unchanged.
        unsafe { self.inner.deallocate(ptr, layout) }
    }
}

// SAFETY: forwards to the referenced allocator.
unsafe impl<A: Owns + ?Sized> Owns for RefAllocator<'_, A> {
    #[inline]
    fn owns(&self, ptr: NonNull<u8>) -> bool {
        self.inner.owns(ptr)
    }
}

impl<A: SizeBounded + ?Sized> SizeBounded for RefAllocator<'_, A> {
    #[inline]
    fn max_size(&self) -> usize {
        self.inner.max_size()
    }
}

impl<A: Constructible> Constructible for RefAllocator<'_, A> {
    #[inline]
    unsafe fn construct<T>(&self, ptr: NonNull<T>, value: T) {
        // SAFETY: caller contract forwarded unchanged.
        unsafe { self.inner.construct(ptr, value) }
    }

    #[inline]
    unsafe fn destroy<T>(&self, ptr: NonNull<T>) {
        // SAFETY: caller contract forwarded unchanged.
        unsafe { self.inner.destroy(ptr) }
    }
}

// SAFETY: `&A` is `Send + Sync` exactly when `A` is `Sync`.
unsafe impl<A: ThreadSafeAllocator> ThreadSafeAllocator for RefAllocator<'_, A> {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arena::ArenaAllocator;
    use crate::compose::FallbackAllocator;

    #[test]
    fn equality_is_identity() {
        let first = ArenaAllocator::new(256).unwrap();
        let second = ArenaAllocator::new(256).unwrap();

        let a = RefAllocator::new(&first);
        let b = a;
        assert_eq!(a, b);
        assert_ne!(a, RefAllocator::new(&second));
    }

    #[test]
    fn composes_over_a_borrowed_arena() {
        let arena = ArenaAllocator::new(128).unwrap();
        let fallback = FallbackAllocator::new(RefAllocator::new(&arena), ArenaAllocator::new(1024).unwrap());
        let layout = Layout::from_size_align(64, 8).unwrap();

        let ptr = fallback.allocate(layout).unwrap();
        assert!(arena.owns(ptr));
        assert_eq!(arena.used(), 64);

        unsafe { fallback.deallocate(ptr, layout).unwrap() };
        assert_eq!(arena.used(), 0);
    }
}
