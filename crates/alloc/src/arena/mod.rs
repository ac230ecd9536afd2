//! Free-list arena engine
//!
//! An [`ArenaAllocator`] manages one fixed, contiguous region with an
//! intrusive free list: every free block starts with a footer recording its
//! size and the offset of the next free block. It is the only component in
//! the crate that reads or writes raw region memory.
//!
//! # Algorithm
//!
//! - **allocate**: first fit in address order. The request is rounded up to
//!   whole granules; a larger block is split and the tail is re-linked as a
//!   smaller free block, an exact fit is unlinked.
//! - **deallocate**: the block is re-inserted at its sorted position, then
//!   merged with its successor and with its predecessor when they are
//!   address-adjacent. The insertion search starts from a cached "guess"
//!   node when that node precedes the freed block, which keeps clustered
//!   frees cheap.
//!
//! ## Invariants
//!
//! - The free list is sorted by ascending offset
//! - No two free blocks are adjacent (they would have been merged)
//! - Every offset and size is a multiple of [`GRANULE`]
//! - `guess` is `NIL` or a node currently on the free list
//!
//! # Safety
//!
//! Footers live in region memory and are read and written through raw
//! pointers derived from the region base. All such accesses happen at
//! granule-aligned offsets inside `[0, capacity)`, which the allocation
//! path guarantees by construction and the deallocation path checks unless
//! the `trusted-caller` feature is enabled.

mod footer;
mod region;
mod stats;

use core::alloc::Layout;
use core::cell::Cell;
use core::fmt;
use core::ops::Range;
use core::ptr::NonNull;

#[cfg(feature = "logging")]
use tracing::debug;

pub use footer::GRANULE;
pub use region::{BorrowedRegion, HeapRegion, Region};
pub use stats::FragmentationStats;

use footer::{Footer, NIL, block_size, granule_floor};

use crate::config::ArenaConfig;
use crate::error::{AllocError, AllocResult};
use crate::traits::{Allocator, Constructible, Owns, SizeBounded};

/// Fixed-capacity free-list allocator
///
/// Single-threaded: state lives in `Cell`s, so the type is `Send` (when its
/// region is) but never `Sync`. Wrap it in a
/// [`ThreadedAllocator`](crate::ThreadedAllocator) to share it.
///
/// # Memory Layout
/// ```text
/// base                                                    base + capacity
/// [ live ][ free: {size, next} ........ ][ live ][ live ][ free ........ ]
///          ^ head ---------------------------------------^
/// ```
pub struct ArenaAllocator<R: Region = HeapRegion> {
    /// Keeps the bytes alive
    region: R,

    /// Granule-aligned start of the managed range
    base: NonNull<u8>,

    /// Managed bytes, a multiple of `GRANULE`
    capacity: usize,

    /// Offset of the lowest free block, or `NIL` when full
    head: Cell<usize>,

    /// Insertion-search shortcut for deallocation
    guess: Cell<usize>,

    /// Bytes handed out, in granules
    used: Cell<usize>,

    /// Number of live blocks
    live: Cell<usize>,

    alloc_pattern: Option<u8>,
    dealloc_pattern: Option<u8>,
}

impl ArenaAllocator<HeapRegion> {
    /// Creates a heap-backed arena with default configuration
    pub fn new(capacity: usize) -> AllocResult<Self> {
        Self::with_config(ArenaConfig::with_capacity(capacity))
    }

    /// Creates a heap-backed arena with custom configuration
    pub fn with_config(config: ArenaConfig) -> AllocResult<Self> {
        config.validate()?;
        let region = HeapRegion::new(granule_floor(config.capacity))?;
        Self::from_region_with_config(region, &config)
    }
}

impl<'a> ArenaAllocator<BorrowedRegion<'a>> {
    /// Creates an arena over caller-provided bytes (stack or static storage)
    pub fn from_slice(bytes: &'a mut [u8]) -> AllocResult<Self> {
        Self::from_region(BorrowedRegion::new(bytes))
    }
}

impl<R: Region> ArenaAllocator<R> {
    /// Creates an arena over the whole of `region`, without fill patterns
    pub fn from_region(region: R) -> AllocResult<Self> {
        let config = ArenaConfig::production(region.len());
        Self::from_region_with_config(region, &config)
    }

    /// Creates an arena over `region`, managing at most `config.capacity`
    /// bytes of it
    pub fn from_region_with_config(region: R, config: &ArenaConfig) -> AllocResult<Self> {
        let raw = region.base();
        let pad = raw.as_ptr().align_offset(GRANULE);
        if pad >= region.len() {
            return Err(AllocError::invalid_config(
                "region too small to align its base to a granule",
            ));
        }

        let capacity = granule_floor((region.len() - pad).min(config.capacity));
        if capacity < GRANULE {
            return Err(AllocError::invalid_config(&format!(
                "usable region of {capacity} bytes cannot hold a {GRANULE} byte footer"
            )));
        }

        // SAFETY: pad < region.len(), so the result stays inside the region.
        let base = unsafe { raw.add(pad) };

        let arena = Self {
            region,
            base,
            capacity,
            head: Cell::new(0),
            guess: Cell::new(0),
            used: Cell::new(0),
            live: Cell::new(0),
            alloc_pattern: config.alloc_pattern,
            dealloc_pattern: config.dealloc_pattern,
        };

        // SAFETY: offset 0 is granule-aligned and capacity >= GRANULE.
        unsafe {
            arena.write_footer(
                0,
                Footer {
                    available: capacity,
                    next: NIL,
                },
            );
        }

        #[cfg(feature = "logging")]
        debug!(capacity, region_len = arena.region.len(), "arena ready");

        Ok(arena)
    }

    /// Backing region
    #[inline]
    pub fn region(&self) -> &R {
        &self.region
    }

    /// Managed bytes
    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Bytes currently handed out (rounded to granules)
    #[inline]
    pub fn used(&self) -> usize {
        self.used.get()
    }

    /// Bytes currently free, across all fragments
    #[inline]
    pub fn available(&self) -> usize {
        self.capacity - self.used.get()
    }

    /// Number of live blocks
    #[inline]
    pub fn allocations(&self) -> usize {
        self.live.get()
    }

    /// Whether no block is live
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.live.get() == 0
    }

    /// Free blocks as offset ranges, in address order
    pub fn free_blocks(&self) -> Vec<Range<usize>> {
        self.free_list().collect()
    }

    /// Walks the free list and summarizes fragmentation
    pub fn fragmentation(&self) -> FragmentationStats {
        self.free_list().map(|block| block.len()).collect()
    }

    fn free_list(&self) -> impl Iterator<Item = Range<usize>> + '_ {
        let mut current = self.head.get();
        core::iter::from_fn(move || {
            if current == NIL {
                return None;
            }
            // SAFETY: list nodes are in-bounds, granule-aligned offsets.
            let block = unsafe { self.footer(current) };
            let range = current..current + block.available;
            current = block.next;
            Some(range)
        })
    }

    /// Checks the free-list invariants
    ///
    /// Reports the first violation found: out-of-range or unaligned nodes,
    /// unsorted or adjacent (uncoalesced) nodes, a stale guess, or free
    /// space that disagrees with the bytes handed out.
    pub fn validate(&self) -> AllocResult<()> {
        let max_nodes = self.capacity / GRANULE;
        let mut nodes = 0;
        let mut total_free = 0;
        let mut guess_seen = self.guess.get() == NIL;
        let mut previous_end: Option<usize> = None;
        let mut current = self.head.get();

        while current != NIL {
            nodes += 1;
            if nodes > max_nodes {
                return Err(AllocError::corruption("arena", "free list has a cycle"));
            }
            if current % GRANULE != 0 || current >= self.capacity {
                return Err(AllocError::corruption(
                    "arena",
                    &format!("free node at invalid offset {current}"),
                ));
            }

            // SAFETY: offset checked above.
            let block = unsafe { self.footer(current) };
            let end = current.checked_add(block.available);
            let in_range = end.is_some_and(|end| end <= self.capacity);
            if block.available < GRANULE || block.available % GRANULE != 0 || !in_range {
                return Err(AllocError::corruption(
                    "arena",
                    &format!("free node {current} has invalid size {}", block.available),
                ));
            }
            if let Some(previous_end) = previous_end {
                if current < previous_end {
                    return Err(AllocError::corruption("arena", "free list is not sorted"));
                }
                if current == previous_end {
                    return Err(AllocError::corruption(
                        "arena",
                        &format!("adjacent free blocks at {current} were not coalesced"),
                    ));
                }
            }

            guess_seen |= current == self.guess.get();
            total_free += block.available;
            previous_end = Some(current + block.available);
            current = block.next;
        }

        if !guess_seen {
            return Err(AllocError::corruption(
                "arena",
                "guess does not point at a free node",
            ));
        }
        if total_free != self.available() {
            return Err(AllocError::corruption(
                "arena",
                &format!(
                    "free list holds {total_free} bytes but {} are unaccounted for",
                    self.available()
                ),
            ));
        }
        Ok(())
    }

    /// Forgets every live block and restores a single free block
    ///
    /// # Safety
    /// No block handed out by this arena may be used or deallocated after
    /// the reset.
    pub unsafe fn reset(&self) {
        // SAFETY: offset 0 always holds a footer-sized, aligned slot.
        unsafe {
            self.write_footer(
                0,
                Footer {
                    available: self.capacity,
                    next: NIL,
                },
            );
        }
        self.head.set(0);
        self.guess.set(0);
        self.used.set(0);
        self.live.set(0);
    }

    // ========================================================================
    // Free-list primitives
    // ========================================================================

    #[inline]
    fn addr(&self) -> usize {
        self.base.as_ptr() as usize
    }

    /// # Safety
    /// `offset` must be granule-aligned and `offset + GRANULE <= capacity`.
    #[inline]
    unsafe fn footer(&self, offset: usize) -> Footer {
        // SAFETY: in-bounds, aligned for `Footer` (caller contract).
        unsafe { self.base.as_ptr().add(offset).cast::<Footer>().read() }
    }

    /// # Safety
    /// Same as [`Self::footer`], and the slot must not belong to a live block.
    #[inline]
    unsafe fn write_footer(&self, offset: usize, footer: Footer) {
        // SAFETY: in-bounds, aligned for `Footer` (caller contract).
        unsafe { self.base.as_ptr().add(offset).cast::<Footer>().write(footer) };
    }

    /// Points `prev` (or the head when `prev` is `NIL`) at `next`
    #[inline]
    fn link(&self, prev: usize, next: usize) {
        if prev == NIL {
            self.head.set(next);
        } else {
            // SAFETY: `prev` is a node on the free list.
            unsafe {
                let mut footer = self.footer(prev);
                footer.next = next;
                self.write_footer(prev, footer);
            }
        }
    }

    /// Sorted insertion point for a block at `offset`: `(prev, next)`
    fn insertion_point(&self, offset: usize) -> (usize, usize) {
        let head = self.head.get();
        if head == NIL || offset < head {
            return (NIL, head);
        }

        let guess = self.guess.get();
        let mut current = if guess != NIL && guess < offset {
            guess
        } else {
            head
        };

        loop {
            // SAFETY: `current` is a node on the free list.
            let next = unsafe { self.footer(current) }.next;
            if next == NIL || next >= offset {
                return (current, next);
            }
            current = next;
        }
    }

    /// Merges `node` with its successor when they touch
    fn merge_with_next(&self, node: usize) -> bool {
        // SAFETY: `node` and its successor are nodes on the free list.
        unsafe {
            let block = self.footer(node);
            if block.next == NIL || node + block.available != block.next {
                return false;
            }
            let absorbed = self.footer(block.next);
            self.write_footer(
                node,
                Footer {
                    available: block.available + absorbed.available,
                    next: absorbed.next,
                },
            );
        }
        true
    }

    /// Contract checks on a block about to be freed
    #[cfg(not(feature = "trusted-caller"))]
    fn check_extent(&self, address: usize, size: usize) -> AllocResult<usize> {
        if !self.contains(address) {
            return Err(AllocError::foreign_pointer(address));
        }
        let offset = address - self.addr();
        if offset % GRANULE != 0 {
            return Err(AllocError::misaligned(address, GRANULE));
        }
        if size > self.capacity - offset {
            return Err(AllocError::out_of_bounds(address, size, self.capacity));
        }
        Ok(offset)
    }

    /// Rejects a block that overlaps its free neighbours (double free)
    #[cfg(not(feature = "trusted-caller"))]
    fn check_disjoint(
        &self,
        prev: usize,
        next: usize,
        offset: usize,
        size: usize,
    ) -> AllocResult<()> {
        let address = self.addr() + offset;
        if prev != NIL {
            // SAFETY: `prev` is a node on the free list.
            let block = unsafe { self.footer(prev) };
            if prev + block.available > offset {
                return Err(AllocError::double_free(address, size));
            }
        }
        if next != NIL && offset + size > next {
            return Err(AllocError::double_free(address, size));
        }
        Ok(())
    }

    #[inline]
    fn contains(&self, address: usize) -> bool {
        let base = self.addr();
        address >= base && address - base < self.capacity
    }
}

// SAFETY: blocks come from disjoint granule-aligned ranges of the region;
// the free list never hands out a range that is live.
unsafe impl<R: Region> Allocator for ArenaAllocator<R> {
    fn allocate(&self, layout: Layout) -> Option<NonNull<u8>> {
        if layout.align() > GRANULE {
            return None;
        }
        let request = block_size(layout.size())?;

        let mut prev = NIL;
        let mut current = self.head.get();
        while current != NIL {
            // SAFETY: `current` is a node on the free list.
            let block = unsafe { self.footer(current) };
            if block.available < request {
                prev = current;
                current = block.next;
                continue;
            }

            // Both sizes are granule multiples: the tail is empty or fits a footer
            let successor = if block.available > request {
                let split = current + request;
                // SAFETY: `split` lies inside the block being split.
                unsafe {
                    self.write_footer(
                        split,
                        Footer {
                            available: block.available - request,
                            next: block.next,
                        },
                    );
                }
                split
            } else {
                block.next
            };

            self.link(prev, successor);
            self.guess.set(if successor == NIL { prev } else { successor });
            self.used.set(self.used.get() + request);
            self.live.set(self.live.get() + 1);

            // SAFETY: `current` is an in-bounds offset.
            let ptr = unsafe { self.base.add(current) };
            if let Some(pattern) = self.alloc_pattern {
                // SAFETY: the whole block now belongs to the caller.
                unsafe { ptr.as_ptr().write_bytes(pattern, request) };
            }
            return Some(ptr);
        }

        None
    }

    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) -> AllocResult<()> {
        let address = ptr.as_ptr() as usize;
        let size = block_size(layout.size())
            .ok_or_else(|| AllocError::invalid_layout("deallocation size overflows"))?;

        #[cfg(not(feature = "trusted-caller"))]
        let offset = self.check_extent(address, size)?;
        #[cfg(feature = "trusted-caller")]
        let offset = address - self.addr();

        let (prev, next) = self.insertion_point(offset);

        #[cfg(not(feature = "trusted-caller"))]
        self.check_disjoint(prev, next, offset, size)?;

        // Counters are checked even for trusted callers; a free that passes
        // the range checks can still release more than was handed out.
        let (Some(used), Some(live)) = (
            self.used.get().checked_sub(size),
            self.live.get().checked_sub(1),
        ) else {
            return Err(AllocError::unbalanced(address, size));
        };

        if let Some(pattern) = self.dealloc_pattern {
            // SAFETY: the block is in-bounds and no longer live.
            unsafe { ptr.as_ptr().write_bytes(pattern, size) };
        }

        // SAFETY: `offset` is an aligned, in-bounds slot of a block that is
        // no longer live.
        unsafe {
            self.write_footer(
                offset,
                Footer {
                    available: size,
                    next,
                },
            );
        }
        self.link(prev, offset);

        self.merge_with_next(offset);
        let merged = if prev != NIL && self.merge_with_next(prev) {
            prev
        } else {
            offset
        };
        self.guess.set(merged);

        self.used.set(used);
        self.live.set(live);
        Ok(())
    }
}

// SAFETY: answers from the managed address range only.
unsafe impl<R: Region> Owns for ArenaAllocator<R> {
    #[inline]
    fn owns(&self, ptr: NonNull<u8>) -> bool {
        self.contains(ptr.as_ptr() as usize)
    }
}

impl<R: Region> SizeBounded for ArenaAllocator<R> {
    #[inline]
    fn max_size(&self) -> usize {
        self.capacity
    }
}

impl<R: Region> Constructible for ArenaAllocator<R> {}

// SAFETY: the arena exclusively owns its region and `Cell` state; moving
// it to another thread moves all of that together.
unsafe impl<R: Region + Send> Send for ArenaAllocator<R> {}

impl<R: Region> fmt::Debug for ArenaAllocator<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArenaAllocator")
            .field("base", &self.base)
            .field("capacity", &self.capacity)
            .field("used", &self.used.get())
            .field("allocations", &self.live.get())
            .field("fragments", &self.fragmentation().fragment_count)
            .finish()
    }
}
