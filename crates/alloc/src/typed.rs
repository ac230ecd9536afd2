//! Element-typed front end for an allocator chain
//!
//! [`TypedAllocator`] is the outermost layer: it does not implement
//! [`Allocator`] itself, so nothing can be stacked on top of it and a chain
//! carries at most one element type.

use core::alloc::Layout;
use core::fmt;
use core::marker::PhantomData;
use core::mem::size_of;
use core::ptr::NonNull;

use crate::error::{AllocError, AllocResult};
use crate::traits::{Allocator, Constructible, SizeBounded};

/// Allocates arrays of `T` from `A`
///
/// # Examples
/// ```
/// use nebula_alloc::{ArenaAllocator, TypedAllocator};
///
/// let strings = TypedAllocator::<String, _>::new(ArenaAllocator::new(1024)?);
/// let ptr = strings.emplace(String::from("typed")).unwrap();
/// assert_eq!(unsafe { ptr.as_ref() }, "typed");
/// unsafe { strings.dispose(ptr)? };
/// # Ok::<(), nebula_alloc::AllocError>(())
/// ```
pub struct TypedAllocator<T, A> {
    inner: A,
    _element: PhantomData<fn() -> T>,
}

impl<T, A> TypedAllocator<T, A> {
    pub const fn new(inner: A) -> Self {
        Self {
            inner,
            _element: PhantomData,
        }
    }

    pub fn inner(&self) -> &A {
        &self.inner
    }

    pub fn into_inner(self) -> A {
        self.inner
    }
}

impl<T, A: Allocator> TypedAllocator<T, A> {
    /// Uninitialized storage for `count` elements, or `None` when the chain
    /// is exhausted or the array size overflows
    #[track_caller]
    pub fn allocate(&self, count: usize) -> Option<NonNull<T>> {
        let layout = Layout::array::<T>(count).ok()?;
        self.inner.allocate(layout).map(NonNull::cast)
    }

    /// Releases storage for `count` elements
    ///
    /// # Safety
    /// `ptr` must come from [`Self::allocate`] with the same `count`, and
    /// every element in it must already be destroyed or never constructed.
    pub unsafe fn deallocate(&self, ptr: NonNull<T>, count: usize) -> AllocResult<()> {
        let layout = Layout::array::<T>(count)
            .map_err(|_| AllocError::invalid_layout("array size overflows isize"))?;
        // SAFETY: caller contract forwarded unchanged.
        unsafe { self.inner.deallocate(ptr.cast(), layout) }
    }
}

impl<T, A: Constructible> TypedAllocator<T, A> {
    /// Moves `value` into uninitialized storage at `ptr`
    ///
    /// # Safety
    /// `ptr` must point to an unconstructed element of a live allocation
    /// from this chain.
    pub unsafe fn construct(&self, ptr: NonNull<T>, value: T) {
        // SAFETY: caller contract forwarded unchanged.
        unsafe { self.inner.construct(ptr, value) }
    }

    /// Drops the element at `ptr` in place
    ///
    /// # Safety
    /// `ptr` must point to a constructed element of a live allocation from
    /// this chain; the element must not be used again.
    pub unsafe fn destroy(&self, ptr: NonNull<T>) {
        // SAFETY: caller contract forwarded unchanged.
        unsafe { self.inner.destroy(ptr) }
    }

    /// Allocates one element and moves `value` into it
    ///
    /// Hands `value` back when the chain is exhausted.
    #[track_caller]
    pub fn emplace(&self, value: T) -> Result<NonNull<T>, T> {
        let Some(ptr) = self.allocate(1) else {
            return Err(value);
        };
        // SAFETY: `ptr` is a fresh, unconstructed single-element block.
        unsafe { self.inner.construct(ptr, value) };
        Ok(ptr)
    }

    /// Drops and releases an element created by [`Self::emplace`]
    ///
    /// # Safety
    /// `ptr` must come from [`Self::emplace`] on this allocator and must not
    /// be used afterwards.
    pub unsafe fn dispose(&self, ptr: NonNull<T>) -> AllocResult<()> {
        // SAFETY: caller guarantees `ptr` holds a live element from `emplace`.
        unsafe {
            self.inner.destroy(ptr);
            self.deallocate(ptr, 1)
        }
    }
}

impl<T, A: SizeBounded> TypedAllocator<T, A> {
    /// Largest element count a single request may succeed with
    pub fn max_size(&self) -> usize {
        self.inner.max_size() / size_of::<T>().max(1)
    }
}

impl<T, A: fmt::Debug> fmt::Debug for TypedAllocator<T, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypedAllocator")
            .field("element", &core::any::type_name::<T>())
            .field("inner", &self.inner)
            .finish()
    }
}
