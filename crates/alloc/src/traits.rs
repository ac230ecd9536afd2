//! Capability traits every allocator and wrapper is built against
//!
//! The contract is split into one required trait and three opt-in
//! capabilities, so composition policies state in their bounds exactly
//! which capabilities they need from the layers below:
//! - [`Allocator`]: `allocate` / `deallocate` (required)
//! - [`Owns`]: ownership query, required from the primary of any routing policy
//! - [`SizeBounded`]: largest request the allocator may satisfy
//! - [`Constructible`]: in-place construction and destruction hooks
//!
//! `SizeBounded` and `Constructible` carry default bodies (unbounded size,
//! plain `ptr::write` / `drop_in_place`), so an allocator that has nothing
//! special to say opts in with an empty `impl`.
//!
//! # Safety
//!
//! `Allocator` and `Owns` are `unsafe` traits: routing policies hand a
//! pointer back to whichever side claims it, and trust the answer.
//! - **Allocator**: returned blocks are valid for `layout.size()` bytes,
//!   aligned to `layout.align()`, and never overlap another live block
//! - **Owns**: `owns(p)` is `true` for every live block the allocator
//!   returned and `false` for every block returned by anything else

use core::alloc::Layout;
use core::ptr::NonNull;

use crate::error::AllocResult;

/// Core allocation contract
///
/// Capacity exhaustion is not an error: `allocate` returns `None` and
/// leaves the allocator unchanged. The `Err` path of `deallocate` carries
/// contract violations (foreign pointers, double frees) that an
/// implementation was able to detect.
///
/// # Safety
///
/// Implementors must ensure that:
/// - Returned pointers are valid for reads and writes of `layout.size()` bytes
/// - Returned pointers are aligned to `layout.align()`
/// - No two live blocks overlap
/// - A block stays valid until it is passed back to `deallocate`
pub unsafe trait Allocator {
    /// Allocates a block for `layout`, or returns `None` when the request
    /// cannot be satisfied.
    ///
    /// The block content is uninitialized.
    fn allocate(&self, layout: Layout) -> Option<NonNull<u8>>;

    /// Returns a block to the allocator
    ///
    /// # Safety
    /// - `ptr` must have been returned by `allocate` on this allocator
    ///   (or on the same composition) with the same `layout`
    /// - `ptr` must not be used after this call
    ///
    /// Allocators that validate their input report a violation of the above
    /// as `Err` without modifying their state; others have undefined
    /// behavior on violation.
    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) -> AllocResult<()>;
}

/// Ownership query
///
/// # Safety
///
/// `owns` must answer truthfully for every block this allocator handed out,
/// and must never claim a block that came from somewhere else. Routing
/// policies forward deallocation to whichever side claims the pointer.
pub unsafe trait Owns: Allocator {
    /// Whether `ptr` points into memory managed by this allocator
    fn owns(&self, ptr: NonNull<u8>) -> bool;
}

/// Upper bound on a single request
pub trait SizeBounded: Allocator {
    /// Largest size a single `allocate` call may succeed with
    ///
    /// This is a bound, not a promise: a request below it can still fail.
    fn max_size(&self) -> usize {
        usize::MAX
    }
}

/// In-place construction hooks
pub trait Constructible: Allocator {
    /// Moves `value` into the block at `ptr`
    ///
    /// # Safety
    /// `ptr` must point to a live block from this allocator that is valid
    /// for writes of `T` and currently holds no initialized `T`.
    unsafe fn construct<T>(&self, ptr: NonNull<T>, value: T) {
        // SAFETY: caller guarantees `ptr` is valid, aligned and uninitialized.
        unsafe { ptr.write(value) };
    }

    /// Drops the `T` stored at `ptr`, leaving the block allocated
    ///
    /// # Safety
    /// `ptr` must point to an initialized `T` inside a live block from this
    /// allocator; the value must not be used afterwards.
    unsafe fn destroy<T>(&self, ptr: NonNull<T>) {
        // SAFETY: caller guarantees `ptr` holds an initialized `T`.
        unsafe { ptr.drop_in_place() };
    }
}

// ============================================================================
// Blanket implementations
// ============================================================================

// SAFETY: forwards to `A`, which upholds the contract.
unsafe impl<A: Allocator + ?Sized> Allocator for &A {
    #[inline]
    #[track_caller]
    fn allocate(&self, layout: Layout) -> Option<NonNull<u8>> {
        (**self).allocate(layout)
    }

    #[inline]
    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) -> AllocResult<()> {
        // SAFETY: caller contract forwarded unchanged.
        unsafe { (**self).deallocate(ptr, layout) }
    }
}

// SAFETY: forwards to `A`.
unsafe impl<A: Owns + ?Sized> Owns for &A {
    #[inline]
    fn owns(&self, ptr: NonNull<u8>) -> bool {
        (**self).owns(ptr)
    }
}

impl<A: SizeBounded + ?Sized> SizeBounded for &A {
    #[inline]
    fn max_size(&self) -> usize {
        (**self).max_size()
    }
}

impl<A: Constructible> Constructible for &A {
    #[inline]
    unsafe fn construct<T>(&self, ptr: NonNull<T>, value: T) {
        // SAFETY: caller contract forwarded unchanged.
        unsafe { (**self).construct(ptr, value) }
    }

    #[inline]
    unsafe fn destroy<T>(&self, ptr: NonNull<T>) {
        // SAFETY: caller contract forwarded unchanged.
        unsafe { (**self).destroy(ptr) }
    }
}

// SAFETY: forwards to the boxed allocator.
unsafe impl<A: Allocator + ?Sized> Allocator for Box<A> {
    #[inline]
    #[track_caller]
    fn allocate(&self, layout: Layout) -> Option<NonNull<u8>> {
        (**self).allocate(layout)
    }

    #[inline]
    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) -> AllocResult<()> {
        // SAFETY: caller contract forwarded unchanged.
        unsafe { (**self).deallocate(ptr, layout) }
    }
}

// SAFETY: forwards to the boxed allocator.
unsafe impl<A: Owns + ?Sized> Owns for Box<A> {
    #[inline]
    fn owns(&self, ptr: NonNull<u8>) -> bool {
        (**self).owns(ptr)
    }
}

impl<A: SizeBounded + ?Sized> SizeBounded for Box<A> {
    #[inline]
    fn max_size(&self) -> usize {
        (**self).max_size()
    }
}

impl<A: Constructible> Constructible for Box<A> {
    #[inline]
    unsafe fn construct<T>(&self, ptr: NonNull<T>, value: T) {
        // SAFETY: caller contract forwarded unchanged.
        unsafe { (**self).construct(ptr, value) }
    }

    #[inline]
    unsafe fn destroy<T>(&self, ptr: NonNull<T>) {
        // SAFETY: caller contract forwarded unchanged.
        unsafe { (**self).destroy(ptr) }
    }
}

/// Marker for allocators whose every operation is safe to call from
/// several threads at once.
///
/// Implemented by [`ThreadedAllocator`](crate::ThreadedAllocator) and
/// [`SystemAllocator`](crate::SystemAllocator); the engine and routing
/// policies are single-threaded.
///
/// # Safety
/// Implementors must serialize or otherwise synchronize all state changes.
pub unsafe trait ThreadSafeAllocator: Allocator + Send + Sync {}
