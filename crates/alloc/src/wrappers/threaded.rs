//! Lock-serialized access to one allocator

use core::alloc::Layout;
use core::ptr::NonNull;

use parking_lot::ReentrantMutex;

use crate::error::AllocResult;
use crate::traits::{Allocator, Constructible, Owns, SizeBounded, ThreadSafeAllocator};

/// Serializes every call on the wrapped allocator behind one mutex
///
/// Locking is per call: `allocate`, `deallocate`, `owns`, `construct` and
/// `destroy` each hold the lock for their own duration only. Contending
/// threads block; there is no timeout.
///
/// The lock is reentrant for the thread holding it, so a value whose
/// `Drop` frees into this same wrapper can be passed to `destroy`.
///
/// # Examples
/// ```
/// use core::alloc::Layout;
/// use nebula_alloc::{Allocator, ArenaAllocator, ThreadedAllocator};
///
/// let threaded = ThreadedAllocator::new(ArenaAllocator::new(4096)?);
/// let layout = Layout::from_size_align(64, 8).unwrap();
///
/// std::thread::scope(|scope| {
///     for _ in 0..4 {
///         scope.spawn(|| {
///             let ptr = threaded.allocate(layout).unwrap();
///             unsafe { threaded.deallocate(ptr, layout).unwrap() };
///         });
///     }
/// });
/// assert_eq!(threaded.with_inner(|arena| arena.used()), 0);
/// # Ok::<(), nebula_alloc::AllocError>(())
/// ```
#[derive(Debug, Default)]
pub struct ThreadedAllocator<A> {
    inner: ReentrantMutex<A>,
}

impl<A> ThreadedAllocator<A> {
    pub fn new(allocator: A) -> Self {
        Self {
            inner: ReentrantMutex::new(allocator),
        }
    }

    /// Runs `f` with the lock held
    pub fn with_inner<R>(&self, f: impl FnOnce(&A) -> R) -> R {
        f(&*self.inner.lock())
    }

    /// Unwraps the allocator
    pub fn into_inner(self) -> A {
        self.inner.into_inner()
    }

    /// Exclusive access without locking
    pub fn get_mut(&mut self) -> &mut A {
        self.inner.get_mut()
    }
}

// SAFETY: forwards to `A` under the lock, so the calls never overlap.
unsafe impl<A: Allocator> Allocator for ThreadedAllocator<A> {
    #[inline]
    #[track_caller]
    fn allocate(&self, layout: Layout) -> Option<NonNull<u8>> {
        self.inner.lock().allocate(layout)
    }

    #[inline]
    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) -> AllocResult<()> {
        let inner = self.inner.lock();
        // SAFETY: caller contract forwarded unchanged.
        unsafe { inner.deallocate(ptr, layout) }
    }
}

// SAFETY: forwards to `A` under the lock.
unsafe impl<A: Owns> Owns for ThreadedAllocator<A> {
    #[inline]
    fn owns(&self, ptr: NonNull<u8>) -> bool {
        self.inner.lock().owns(ptr)
    }
}

impl<A: SizeBounded> SizeBounded for ThreadedAllocator<A> {
    #[inline]
    fn max_size(&self) -> usize {
        self.inner.lock().max_size()
    }
}

impl<A: Constructible> Constructible for ThreadedAllocator<A> {
    #[inline]
    unsafe fn construct<T>(&self, ptr: NonNull<T>, value: T) {
        let inner = self.inner.lock();
        // SAFETY: caller contract forwarded unchanged.
        unsafe { inner.construct(ptr, value) }
    }

    #[inline]
    unsafe fn destroy<T>(&self, ptr: NonNull<T>) {
        let inner = self.inner.lock();
        // SAFETY: caller contract forwarded unchanged.
        unsafe { inner.destroy(ptr) }
    }
}

// SAFETY: every operation runs under the lock, which makes the wrapper
// `Sync` whenever `A` is `Send`; reentry is confined to the owning thread.
unsafe impl<A: Allocator + Send> ThreadSafeAllocator for ThreadedAllocator<A> {}
