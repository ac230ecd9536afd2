//! Provenance and usage accounting

use core::alloc::Layout;
use core::cell::RefCell;
use core::fmt;
use core::panic::Location;
use core::ptr::NonNull;
use std::io::Write;

use parking_lot::Mutex;

use super::usage::{Usage, UsageCounters, report_leaks};
use crate::error::AllocResult;
use crate::traits::{Allocator, Constructible, Owns, SizeBounded};

/// One allocation request, as seen by a [`DebugAllocator`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AllocationRecord {
    /// Caller of `allocate`
    pub location: &'static Location<'static>,
    pub size: usize,
    pub align: usize,
    /// Address returned, or `None` when the request failed
    pub address: Option<usize>,
}

impl fmt::Display for AllocationRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {} bytes (align {}) -> ", self.location, self.size, self.align)?;
        match self.address {
            Some(address) => write!(f, "{address:#x}"),
            None => f.write_str("failed"),
        }
    }
}

/// Destination for allocation records
pub trait AllocationLog {
    fn record(&self, record: AllocationRecord);
}

impl AllocationLog for RefCell<Vec<AllocationRecord>> {
    fn record(&self, record: AllocationRecord) {
        self.borrow_mut().push(record);
    }
}

impl AllocationLog for Mutex<Vec<AllocationRecord>> {
    fn record(&self, record: AllocationRecord) {
        self.lock().push(record);
    }
}

impl<L: AllocationLog + ?Sized> AllocationLog for &L {
    fn record(&self, record: AllocationRecord) {
        (**self).record(record);
    }
}

/// Records every allocation request and tracks outstanding usage
///
/// Each `allocate` appends an [`AllocationRecord`] with the caller's
/// location to `log`. Dropping the wrapper with outstanding allocations or
/// constructed objects writes a leak report to `sink`.
///
/// # Examples
/// ```
/// use core::alloc::Layout;
/// use core::cell::RefCell;
/// use nebula_alloc::{AllocationRecord, Allocator, ArenaAllocator, DebugAllocator};
///
/// let log = RefCell::new(Vec::<AllocationRecord>::new());
/// let mut report: Vec<u8> = Vec::new();
/// {
///     let alloc = DebugAllocator::new(ArenaAllocator::new(1024)?, &log, &mut report);
///     let layout = Layout::from_size_align(48, 8).unwrap();
///     let _leaked = alloc.allocate(layout).unwrap();
/// }
/// assert_eq!(log.borrow().len(), 1);
/// assert!(String::from_utf8(report).unwrap().contains("leaked 1 allocations"));
/// # Ok::<(), nebula_alloc::AllocError>(())
/// ```
pub struct DebugAllocator<A, L: AllocationLog, W: Write> {
    inner: A,
    log: L,
    sink: Mutex<W>,
    usage: UsageCounters,
}

impl<A, L: AllocationLog, W: Write> DebugAllocator<A, L, W> {
    pub fn new(inner: A, log: L, sink: W) -> Self {
        Self {
            inner,
            log,
            sink: Mutex::new(sink),
            usage: UsageCounters::new(),
        }
    }

    pub fn inner(&self) -> &A {
        &self.inner
    }

    pub fn log(&self) -> &L {
        &self.log
    }

    /// Outstanding bytes, allocations and objects
    pub fn usage(&self) -> Usage {
        self.usage.snapshot()
    }

    /// Runs `f` against the report sink
    pub fn with_sink<R>(&self, f: impl FnOnce(&mut W) -> R) -> R {
        f(&mut *self.sink.lock())
    }
}

// SAFETY: forwards to `A`; bookkeeping never touches the blocks.
unsafe impl<A: Allocator, L: AllocationLog, W: Write> Allocator for DebugAllocator<A, L, W> {
    #[track_caller]
    fn allocate(&self, layout: Layout) -> Option<NonNull<u8>> {
        let ptr = self.inner.allocate(layout);
        self.log.record(AllocationRecord {
            location: Location::caller(),
            size: layout.size(),
            align: layout.align(),
            address: ptr.map(|ptr| ptr.as_ptr() as usize),
        });
        if ptr.is_some() {
            self.usage.record_allocation(layout.size());
        }
        ptr
    }

    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) -> AllocResult<()> {
        // SAFETY: caller contract forwarded unchanged.
        unsafe { self.inner.deallocate(ptr, layout)? };
        self.usage.record_deallocation(layout.size());
        Ok(())
    }
}

// SAFETY: forwards to `A`.
unsafe impl<A: Owns, L: AllocationLog, W: Write> Owns for DebugAllocator<A, L, W> {
    fn owns(&self, ptr: NonNull<u8>) -> bool {
        self.inner.owns(ptr)
    }
}

impl<A: SizeBounded, L: AllocationLog, W: Write> SizeBounded for DebugAllocator<A, L, W> {
    fn max_size(&self) -> usize {
        self.inner.max_size()
    }
}

impl<A: Constructible, L: AllocationLog, W: Write> Constructible for DebugAllocator<A, L, W> {
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

impl<A, L: AllocationLog, W: Write> Drop for DebugAllocator<A, L, W> {
    fn drop(&mut self) {
        report_leaks(&self.sink, "debug allocator", self.usage.snapshot());
    }
}

impl<A: fmt::Debug, L: AllocationLog, W: Write> fmt::Debug for DebugAllocator<A, L, W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DebugAllocator")
            .field("inner", &self.inner)
            .field("usage", &self.usage.snapshot())
            .finish_non_exhaustive()
    }
}
