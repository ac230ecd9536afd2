//! Process-wide allocator instances
//!
//! There is no hidden per-type static: the caller declares a
//! [`GlobalSlot`] and hands out [`GlobalAllocator`] handles that borrow it.
//! The slot builds its allocator on first use.
//!
//! Statics are never dropped, so the allocator lives until the process
//! exits and its own `Drop` never runs.

use core::alloc::Layout;
use core::fmt;
use core::ptr::NonNull;
use std::sync::OnceLock;

use crate::error::AllocResult;
use crate::traits::{Allocator, Constructible, Owns, SizeBounded, ThreadSafeAllocator};

/// Lazily initialized storage for one process-wide allocator
///
/// Meant for a `static`, which requires `A: Send + Sync`: wrap
/// single-threaded allocators in a
/// [`ThreadedAllocator`](crate::ThreadedAllocator).
///
/// # Examples
/// ```
/// use core::alloc::Layout;
/// use nebula_alloc::{Allocator, GlobalAllocator, GlobalSlot, SystemAllocator};
///
/// static HEAP: GlobalSlot<SystemAllocator> = GlobalSlot::new(SystemAllocator::new);
///
/// let alloc = GlobalAllocator::new(&HEAP);
/// let layout = Layout::from_size_align(32, 8).unwrap();
/// let ptr = alloc.allocate(layout).unwrap();
/// unsafe { GlobalAllocator::new(&HEAP).deallocate(ptr, layout)? };
/// # Ok::<(), nebula_alloc::AllocError>(())
/// ```
pub struct GlobalSlot<A> {
    cell: OnceLock<A>,
    init: fn() -> A,
}

impl<A> GlobalSlot<A> {
    pub const fn new(init: fn() -> A) -> Self {
        Self {
            cell: OnceLock::new(),
            init,
        }
    }

    /// The allocator, built on first call
    pub fn get(&self) -> &A {
        self.cell.get_or_init(self.init)
    }

    /// Whether the allocator has been built yet
    pub fn is_initialized(&self) -> bool {
        self.cell.get().is_some()
    }
}

impl<A: fmt::Debug> fmt::Debug for GlobalSlot<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GlobalSlot")
            .field("allocator", &self.cell.get())
            .finish()
    }
}

/// Handle to the allocator in a `'static` [`GlobalSlot`]
///
/// All handles to one slot alias the same instance; copying needs no
/// reference counting.
pub struct GlobalAllocator<A: 'static> {
    slot: &'static GlobalSlot<A>,
}

impl<A: 'static> GlobalAllocator<A> {
    pub const fn new(slot: &'static GlobalSlot<A>) -> Self {
        Self { slot }
    }

    /// The process-wide allocator, built on first call
    #[inline]
    pub fn get(&self) -> &'static A {
        self.slot.get()
    }
}

impl<A: 'static> Clone for GlobalAllocator<A> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<A: 'static> Copy for GlobalAllocator<A> {}

impl<A: 'static> PartialEq for GlobalAllocator<A> {
    fn eq(&self, other: &Self) -> bool {
        core::ptr::eq(self.slot, other.slot)
    }
}

impl<A: 'static> Eq for GlobalAllocator<A> {}

impl<A: fmt::Debug + 'static> fmt::Debug for GlobalAllocator<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("GlobalAllocator").field(self.slot).finish()
    }
}

// SAFETY: forwards to the slot's allocator.
unsafe impl<A: Allocator + 'static> Allocator for GlobalAllocator<A> {
    #[inline]
    #[track_caller]
    fn allocate(&self, layout: Layout) -> Option<NonNull<u8>> {
        self.get().allocate(layout)
    }

    #[inline]
    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) -> AllocResult<()> {
        // SAFETY: caller contract forwarded unchanged.
        unsafe { self.get().deallocate(ptr, layout) }
    }
}

// SAFETY: forwards to the slot's allocator.
unsafe impl<A: Owns + 'static> Owns for GlobalAllocator<A> {
    #[inline]
    fn owns(&self, ptr: NonNull<u8>) -> bool {
        self.get().owns(ptr)
    }
}

impl<A: SizeBounded + 'static> SizeBounded for GlobalAllocator<A> {
    #[inline]
    fn max_size(&self) -> usize {
        self.get().max_size()
    }
}

impl<A: Constructible + 'static> Constructible for GlobalAllocator<A> {
    #[inline]
    unsafe fn construct<T>(&self, ptr: NonNull<T>, value: T) {
        // SAFETY: caller contract forwarded unchanged.
        unsafe { self.get().construct(ptr, value) }
    }

    #[inline]
    unsafe fn destroy<T>(&self, ptr: NonNull<T>) {
        // SAFETY: caller contract forwarded unchanged.
        unsafe { self.get().destroy(ptr) }
    }
}

// SAFETY: a shared reference to a thread-safe allocator.
unsafe impl<A: ThreadSafeAllocator + 'static> ThreadSafeAllocator for GlobalAllocator<A> {}
