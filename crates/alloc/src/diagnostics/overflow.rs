//! Guard-byte overflow detection
//!
//! Every block is bracketed by two guard regions filled with a repeating
//! pattern:
//!
//! ```text
//! [ front guard ][ caller block: layout.size() ][ back guard ]
//! ^ inner block  ^ returned pointer
//! ```
//!
//! The front guard is `guard_size` rounded up to the block alignment so the
//! returned pointer keeps the requested alignment. Both guards are checked
//! on deallocation; damage is reported to the sink and the block is still
//! released.

use core::alloc::Layout;
use core::fmt;
use core::ptr::NonNull;
use core::slice;
use core::sync::atomic::{AtomicUsize, Ordering};
use std::io::Write;

use parking_lot::Mutex;

use super::usage::{Usage, UsageCounters, emit, report_leaks};
use crate::config::OverflowConfig;
use crate::error::{AllocError, AllocResult};
use crate::traits::{Allocator, Constructible, Owns, SizeBounded};

/// Detects writes just outside the bounds of every block
///
/// Reports go to `sink` and never interrupt the caller: a corrupted block
/// is still deallocated normally. Dropping the wrapper with outstanding
/// allocations or constructed objects writes a leak report.
///
/// # Examples
/// ```
/// use core::alloc::Layout;
/// use nebula_alloc::{Allocator, ArenaAllocator, OverflowAllocator};
///
/// let mut report: Vec<u8> = Vec::new();
/// let alloc = OverflowAllocator::new(ArenaAllocator::new(1024)?, &mut report);
/// let layout = Layout::from_size_align(8, 8).unwrap();
///
/// let ptr = alloc.allocate(layout).unwrap();
/// unsafe {
///     ptr.as_ptr().add(8).write(0); // one byte past the end
///     alloc.deallocate(ptr, layout)?;
/// }
/// assert_eq!(alloc.corruptions(), 1);
/// # Ok::<(), nebula_alloc::AllocError>(())
/// ```
pub struct OverflowAllocator<A, W: Write> {
    inner: A,
    config: OverflowConfig,
    sink: Mutex<W>,
    usage: UsageCounters,
    corruptions: AtomicUsize,
}

impl<A, W: Write> OverflowAllocator<A, W> {
    /// Wraps `inner` with default 16-byte guards
    pub fn new(inner: A, sink: W) -> Self {
        Self::build(inner, OverflowConfig::default(), sink)
    }

    /// Wraps `inner` with custom guards
    pub fn with_config(inner: A, config: OverflowConfig, sink: W) -> AllocResult<Self> {
        config.validate()?;
        Ok(Self::build(inner, config, sink))
    }

    fn build(inner: A, config: OverflowConfig, sink: W) -> Self {
        Self {
            inner,
            config,
            sink: Mutex::new(sink),
            usage: UsageCounters::new(),
            corruptions: AtomicUsize::new(0),
        }
    }

    pub fn inner(&self) -> &A {
        &self.inner
    }

    pub fn config(&self) -> OverflowConfig {
        self.config
    }

    /// Damaged guards reported so far
    pub fn corruptions(&self) -> usize {
        self.corruptions.load(Ordering::Relaxed)
    }

    /// Outstanding bytes, allocations and objects
    pub fn usage(&self) -> Usage {
        self.usage.snapshot()
    }

    /// Runs `f` against the report sink
    pub fn with_sink<R>(&self, f: impl FnOnce(&mut W) -> R) -> R {
        f(&mut *self.sink.lock())
    }

    /// Inner layout for `layout`, and the front guard length
    fn guarded(&self, layout: Layout) -> Option<(Layout, usize)> {
        let front = self.config.guard_size.checked_next_multiple_of(layout.align())?;
        let size = front
            .checked_add(layout.size())?
            .checked_add(self.config.guard_size)?;
        let outer = Layout::from_size_align(size, layout.align()).ok()?;
        Some((outer, front))
    }

    /// Offset of the first byte in `guard` that lost the pattern
    fn damage(&self, guard: &[u8]) -> Option<usize> {
        guard.iter().position(|&byte| byte != self.config.pattern)
    }

    fn report(&self, guard: &str, address: usize, size: usize, offset: usize) {
        self.corruptions.fetch_add(1, Ordering::Relaxed);
        let error = AllocError::corruption(
            "overflow guard",
            &format!("{guard} guard of {size} byte block at {address:#x} overwritten at byte {offset}"),
        );
        emit(&self.sink, format_args!("{error}"));
    }
}

// SAFETY: the caller block is a disjoint sub-range of one inner block,
// aligned because the front guard is a multiple of the alignment.
unsafe impl<A: Allocator, W: Write> Allocator for OverflowAllocator<A, W> {
    #[track_caller]
    fn allocate(&self, layout: Layout) -> Option<NonNull<u8>> {
        let (outer, front) = self.guarded(layout)?;
        let base = self.inner.allocate(outer)?;

        // SAFETY: both guards lie inside the `outer.size()` bytes just
        // obtained.
        let ptr = unsafe {
            base.as_ptr().write_bytes(self.config.pattern, front);
            base.as_ptr()
                .add(front + layout.size())
                .write_bytes(self.config.pattern, self.config.guard_size);
            base.add(front)
        };

        self.usage.record_allocation(layout.size());
        Some(ptr)
    }

    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) -> AllocResult<()> {
        let (outer, front) = self
            .guarded(layout)
            .ok_or_else(|| AllocError::invalid_layout("guarded block size overflows"))?;

        // SAFETY: the caller passes a pointer from `allocate` with the same
        // layout, so the front guard starts `front` bytes earlier and both
        // guards are inside the inner block.
        let base = unsafe { ptr.sub(front) };
        // SAFETY: both ranges are inside the inner block and initialized by
        // `allocate`.
        let (front_guard, back_guard) = unsafe {
            (
                slice::from_raw_parts(base.as_ptr(), front),
                slice::from_raw_parts(ptr.as_ptr().add(layout.size()), self.config.guard_size),
            )
        };

        let address = ptr.as_ptr() as usize;
        if let Some(offset) = self.damage(front_guard) {
            self.report("front", address, layout.size(), offset);
        }
        if let Some(offset) = self.damage(back_guard) {
            self.report("back", address, layout.size(), offset);
        }

        // SAFETY: `base` and `outer` are what the inner allocator returned.
        unsafe { self.inner.deallocate(base, outer)? };
        self.usage.record_deallocation(layout.size());
        Ok(())
    }
}

// SAFETY: every caller block lies inside an inner block.
unsafe impl<A: Owns, W: Write> Owns for OverflowAllocator<A, W> {
    fn owns(&self, ptr: NonNull<u8>) -> bool {
        self.inner.owns(ptr)
    }
}

impl<A: SizeBounded, W: Write> SizeBounded for OverflowAllocator<A, W> {
    /// Inner bound minus both guards at the minimum alignment
    fn max_size(&self) -> usize {
        self.inner
            .max_size()
            .saturating_sub(2 * self.config.guard_size)
    }
}

impl<A: Constructible, W: Write> Constructible for OverflowAllocator<A, W> {
    unsafe fn construct<T>(&self, ptr: NonNull<T>, value: T) {
        // SAFETY: caller contract forwarded unchanged.
        unsafe { self.inner.construct(ptr, value) };
        self.usage.record_construct();
    }

    unsafe fn destroy<T>(&self, ptr: NonNull<T>) {
        // SAFETY: caller contract forwarded unchanged.
        unsafe { self.inner.destroy(ptr) };
        self.usage.record_destroy();
    }
}

impl<A, W: Write> Drop for OverflowAllocator<A, W> {
    fn drop(&mut self) {
        report_leaks(&self.sink, "overflow allocator", self.usage.snapshot());
    }
}

impl<A: fmt::Debug, W: Write> fmt::Debug for OverflowAllocator<A, W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OverflowAllocator")
            .field("inner", &self.inner)
            .field("config", &self.config)
            .field("usage", &self.usage.snapshot())
            .field("corruptions", &self.corruptions())
            .finish_non_exhaustive()
    }
}
