//! Reference-counted sharing of one allocator instance

use core::alloc::Layout;
use core::fmt;
use core::marker::PhantomData;
use core::ptr::NonNull;

use super::counter::{LocalCounter, RefCounter};
use crate::error::AllocResult;
use crate::traits::{Allocator, Constructible, Owns, SizeBounded, ThreadSafeAllocator};

struct ControlBlock<A, C> {
    counter: C,
    allocator: A,
}

/// Clonable handle to one allocator instance
///
/// Every clone observes the same allocator; the allocator is dropped exactly
/// once, with the last handle.
///
/// There is no locking. With the default [`LocalCounter`] the handle is
/// neither `Send` nor `Sync`, so the compiler confines it to one thread.
/// With [`AtomicCounter`](super::AtomicCounter) it crosses threads exactly
/// when the wrapped allocator is itself `Send + Sync`, e.g. a
/// [`ThreadedAllocator`](crate::ThreadedAllocator).
///
/// # Examples
/// ```
/// use core::alloc::Layout;
/// use nebula_alloc::{Allocator, ArenaAllocator, SharedAllocator};
///
/// let shared = SharedAllocator::new(ArenaAllocator::new(1024)?);
/// let copy = shared.clone();
/// assert_eq!(shared.ref_count(), 2);
///
/// let layout = Layout::from_size_align(64, 8).unwrap();
/// let ptr = shared.allocate(layout).unwrap();
/// unsafe { copy.deallocate(ptr, layout)? };
/// # Ok::<(), nebula_alloc::AllocError>(())
/// ```
pub struct SharedAllocator<A, C: RefCounter = LocalCounter> {
    block: NonNull<ControlBlock<A, C>>,
    _owns: PhantomData<ControlBlock<A, C>>,
}

impl<A> SharedAllocator<A> {
    /// Shares `allocator` with a single-threaded counter
    pub fn new(allocator: A) -> Self {
        Self::with_counter(allocator)
    }
}

impl<A, C: RefCounter> SharedAllocator<A, C> {
    /// Shares `allocator` with the counter type chosen by the caller
    pub fn with_counter(allocator: A) -> Self {
        let block = Box::new(ControlBlock {
            counter: C::one(),
            allocator,
        });
        Self {
            block: NonNull::from(Box::leak(block)),
            _owns: PhantomData,
        }
    }

    #[inline]
    fn block(&self) -> &ControlBlock<A, C> {
        // SAFETY: the block lives until the last handle drops, and this
        // handle is alive.
        unsafe { self.block.as_ref() }
    }

    /// The shared allocator
    #[inline]
    pub fn inner(&self) -> &A {
        &self.block().allocator
    }

    /// Number of live handles
    pub fn ref_count(&self) -> usize {
        self.block().counter.get()
    }

    /// Whether both handles share one instance
    pub fn ptr_eq(&self, other: &Self) -> bool {
        self.block == other.block
    }
}

impl<A, C: RefCounter> Clone for SharedAllocator<A, C> {
    fn clone(&self) -> Self {
        self.block().counter.increment();
        Self {
            block: self.block,
            _owns: PhantomData,
        }
    }
}

impl<A, C: RefCounter> Drop for SharedAllocator<A, C> {
    fn drop(&mut self) {
        if self.block().counter.decrement() == 0 {
            // SAFETY: the count reached zero, so this was the last handle
            // and the block came from `Box::leak`.
            drop(unsafe { Box::from_raw(self.block.as_ptr()) });
        }
    }
}

// SAFETY: like `Arc`, a handle moved to another thread gives shared access
// to the allocator and the counter from both threads.
unsafe impl<A: Send + Sync, C: RefCounter + Send + Sync> Send for SharedAllocator<A, C> {}

// SAFETY: see `Send`.
unsafe impl<A: Send + Sync, C: RefCounter + Send + Sync> Sync for SharedAllocator<A, C> {}

// SAFETY: forwards to the shared instance, which upholds the contract.
unsafe impl<A: Allocator, C: RefCounter> Allocator for SharedAllocator<A, C> {
    #[inline]
    #[track_caller]
    fn allocate(&self, layout: Layout) -> Option<NonNull<u8>> {
        self.inner().allocate(layout)
    }

    #[inline]
    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) -> AllocResult<()> {
        // SAFETY: caller contract forwarded unchanged.
        unsafe { self.inner().deallocate(ptr, layout) }
    }
}

// SAFETY: forwards to the shared instance.
unsafe impl<A: Owns, C: RefCounter> Owns for SharedAllocator<A, C> {
    #[inline]
    fn owns(&self, ptr: NonNull<u8>) -> bool {
        self.inner().owns(ptr)
    }
}

impl<A: SizeBounded, C: RefCounter> SizeBounded for SharedAllocator<A, C> {
    #[inline]
    fn max_size(&self) -> usize {
        self.inner().max_size()
    }
}

impl<A: Constructible, C: RefCounter> Constructible for SharedAllocator<A, C> {
    #[inline]
    unsafe fn construct<T>(&self, ptr: NonNull<T>, value: T) {
        // SAFETY: caller contract forwarded unchanged.
        unsafe { self.inner().construct(ptr, value) }
    }

    #[inline]
    unsafe fn destroy<T>(&self, ptr: NonNull<T>) {
        // SAFETY: caller contract forwarded unchanged.
        unsafe { self.inner().destroy(ptr) }
    }
}

// SAFETY: a thread-safe allocator behind a `Send + Sync` counter.
unsafe impl<A, C> ThreadSafeAllocator for SharedAllocator<A, C>
where
    A: ThreadSafeAllocator,
    C: RefCounter + Send + Sync,
{
}

impl<A: fmt::Debug, C: RefCounter> fmt::Debug for SharedAllocator<A, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedAllocator")
            .field("ref_count", &self.ref_count())
            .field("allocator", self.inner())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arena::ArenaAllocator;
    use crate::wrappers::AtomicCounter;
    use crate::wrappers::ThreadedAllocator;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn clones_share_one_instance() {
        let first = SharedAllocator::new(ArenaAllocator::new(512).unwrap());
        let second = first.clone();
        assert!(first.ptr_eq(&second));
        assert_eq!(first.ref_count(), 2);

        let layout = Layout::from_size_align(128, 8).unwrap();
        let ptr = first.allocate(layout).unwrap();
        assert!(second.owns(ptr));
        assert_eq!(second.inner().used(), 128);

        drop(first);
        assert_eq!(second.ref_count(), 1);
        unsafe { second.deallocate(ptr, layout).unwrap() };
    }

    #[test]
    fn distinct_instances_are_not_equal() {
        let first = SharedAllocator::new(ArenaAllocator::new(256).unwrap());
        let second = SharedAllocator::new(ArenaAllocator::new(256).unwrap());
        assert!(!first.ptr_eq(&second));
    }

    struct DropCounter<'a>(&'a AtomicUsize);

    impl Drop for DropCounter<'_> {
        fn drop(&mut self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn inner_value_dropped_exactly_once() {
        let drops = AtomicUsize::new(0);
        let shared = SharedAllocator::new(DropCounter(&drops));
        let clones: Vec<_> = (0..5).map(|_| shared.clone()).collect();

        drop(shared);
        assert_eq!(drops.load(Ordering::SeqCst), 0);
        drop(clones);
        assert_eq!(drops.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn atomic_handles_cross_threads() {
        let shared: SharedAllocator<_, AtomicCounter> =
            SharedAllocator::with_counter(ThreadedAllocator::new(ArenaAllocator::new(4096).unwrap()));
        let layout = Layout::from_size_align(32, 8).unwrap();

        std::thread::scope(|scope| {
            for _ in 0..4 {
                let handle = shared.clone();
                scope.spawn(move || {
                    for _ in 0..50 {
                        let ptr = handle.allocate(layout).unwrap();
                        unsafe { handle.deallocate(ptr, layout).unwrap() };
                    }
                });
            }
        });

        assert_eq!(shared.ref_count(), 1);
        assert_eq!(shared.inner().with_inner(|arena| arena.used()), 0);
    }
}
