//! Growing chain of same-kind allocators
//!
//! [`CascadingAllocator`] starts empty and creates a new node through its
//! factory whenever the newest node cannot satisfy a request. Deallocation
//! scans the chain for the owning node, newest first.
//!
//! ## Node lifetime
//!
//! Every node carries a live-allocation counter. A node whose counter drops
//! to zero is released immediately unless it is the only node left, which
//! is kept warm so that a single alloc/free pair does not rebuild the
//! arena every time. When the newest node empties while older nodes still
//! hold blocks, the newest remaining node becomes the head.

use core::alloc::Layout;
use core::cell::RefCell;
use core::fmt;
use core::ptr::NonNull;

#[cfg(feature = "logging")]
use tracing::trace;

use crate::error::{AllocError, AllocResult};
use crate::traits::{Allocator, Constructible, Owns, SizeBounded};

struct CascadeNode<A> {
    allocator: A,
    live: usize,
}

/// Unbounded chain of allocators built on demand
///
/// `F` creates a fresh node; it is called only when the head cannot serve
/// a request. Nodes are stored oldest first, so the head is the last one.
///
/// # Examples
/// ```
/// use core::alloc::Layout;
/// use nebula_alloc::{Allocator, ArenaAllocator, CascadingAllocator};
///
/// let cascade = CascadingAllocator::new(|| ArenaAllocator::new(1024));
/// let layout = Layout::from_size_align(1024, 8).unwrap();
///
/// let first = cascade.allocate(layout).unwrap();
/// let second = cascade.allocate(layout).unwrap();
/// assert_eq!(cascade.node_count(), 2);
///
/// unsafe {
///     cascade.deallocate(second, layout)?;
///     cascade.deallocate(first, layout)?;
/// }
/// assert_eq!(cascade.node_count(), 1);
/// # Ok::<(), nebula_alloc::AllocError>(())
/// ```
pub struct CascadingAllocator<A, F> {
    // Boxed so a node stays put while `destroy` runs outside the borrow
    #[allow(clippy::vec_box)]
    nodes: RefCell<Vec<Box<CascadeNode<A>>>>,
    factory: F,
}

impl<A, F> CascadingAllocator<A, F>
where
    A: Owns,
    F: Fn() -> AllocResult<A>,
{
    /// Creates an empty chain; no node is built until the first request
    pub fn new(factory: F) -> Self {
        Self {
            nodes: RefCell::new(Vec::new()),
            factory,
        }
    }

    /// Number of nodes currently alive
    pub fn node_count(&self) -> usize {
        self.nodes.borrow().len()
    }

    /// Live allocations per node, oldest first
    pub fn live_counts(&self) -> Vec<usize> {
        self.nodes.borrow().iter().map(|node| node.live).collect()
    }

    /// Runs `f` against the head node, if any
    pub fn with_head<R>(&self, f: impl FnOnce(&A) -> R) -> Option<R> {
        self.nodes.borrow().last().map(|node| f(&node.allocator))
    }

    /// Node that claims `ptr`, detached from the `RefCell` borrow
    ///
    /// The pointee stays valid while the node holds a live block: nodes are
    /// boxed and released only once their live count reaches zero.
    fn owner(&self, ptr: NonNull<u8>) -> Option<NonNull<A>> {
        self.nodes
            .borrow()
            .iter()
            .find(|node| node.allocator.owns(ptr))
            .map(|node| NonNull::from(&node.allocator))
    }

    /// Builds a node and serves `layout` from it
    #[track_caller]
    fn grow(&self, layout: Layout) -> Option<NonNull<u8>> {
        let allocator = match (self.factory)() {
            Ok(allocator) => allocator,
            Err(_error) => {
                #[cfg(feature = "logging")]
                trace!(error = %_error, "cascade factory failed");
                return None;
            }
        };

        // A fresh node that cannot serve the request is dropped unused
        let ptr = allocator.allocate(layout)?;

        let mut nodes = self.nodes.borrow_mut();
        if nodes.last().is_some_and(|head| head.live == 0) {
            nodes.pop();
        }
        nodes.push(Box::new(CascadeNode { allocator, live: 1 }));

        #[cfg(feature = "logging")]
        trace!(nodes = nodes.len(), size = layout.size(), "cascade grew");

        Some(ptr)
    }
}

// SAFETY: each block is served by exactly one node and returned to the
// node that claims it; nodes are released only when they hold no blocks.
unsafe impl<A, F> Allocator for CascadingAllocator<A, F>
where
    A: Owns,
    F: Fn() -> AllocResult<A>,
{
    #[track_caller]
    fn allocate(&self, layout: Layout) -> Option<NonNull<u8>> {
        {
            let mut nodes = self.nodes.borrow_mut();
            if let Some(head) = nodes.last_mut()
                && let Some(ptr) = head.allocator.allocate(layout)
            {
                head.live += 1;
                return Some(ptr);
            }
        }
        self.grow(layout)
    }

    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) -> AllocResult<()> {
        let mut nodes = self.nodes.borrow_mut();
        let Some(index) = nodes.iter().rposition(|node| node.allocator.owns(ptr)) else {
            return Err(AllocError::foreign_pointer(ptr.as_ptr() as usize));
        };

        let node = &mut nodes[index];
        let Some(live) = node.live.checked_sub(1) else {
            return Err(AllocError::unbalanced(ptr.as_ptr() as usize, layout.size()));
        };

        // SAFETY: caller contract forwarded to the owning node.
        unsafe { node.allocator.deallocate(ptr, layout)? };
        node.live = live;

        if nodes[index].live == 0 && nodes.len() > 1 {
            nodes.remove(index);

            #[cfg(feature = "logging")]
            trace!(nodes = nodes.len(), "cascade released an empty node");
        }
        Ok(())
    }
}

// SAFETY: true only when some node claims the block.
unsafe impl<A, F> Owns for CascadingAllocator<A, F>
where
    A: Owns,
    F: Fn() -> AllocResult<A>,
{
    fn owns(&self, ptr: NonNull<u8>) -> bool {
        self.nodes
            .borrow()
            .iter()
            .any(|node| node.allocator.owns(ptr))
    }
}

impl<A, F> SizeBounded for CascadingAllocator<A, F>
where
    A: Owns + SizeBounded,
    F: Fn() -> AllocResult<A>,
{
    /// The head's bound, or unbounded before the first node exists
    fn max_size(&self) -> usize {
        self.with_head(|head| head.max_size())
            .unwrap_or(usize::MAX)
    }
}

impl<A, F> Constructible for CascadingAllocator<A, F>
where
    A: Owns + Constructible,
    F: Fn() -> AllocResult<A>,
{
    // The chain is not borrowed while these run, so a value may allocate
    // from or free back into this cascade from its constructor or `Drop`.

    unsafe fn construct<T>(&self, ptr: NonNull<T>, value: T) {
        // SAFETY: caller contract forwarded to the owning node, which holds
        // `ptr` live and so outlives the call; a plain write when no node
        // claims the block.
        unsafe {
            match self.owner(ptr.cast()) {
                Some(node) => node.as_ref().construct(ptr, value),
                None => ptr.write(value),
            }
        }
    }

    unsafe fn destroy<T>(&self, ptr: NonNull<T>) {
        // SAFETY: see `construct`.
        unsafe {
            match self.owner(ptr.cast()) {
                Some(node) => node.as_ref().destroy(ptr),
                None => ptr.drop_in_place(),
            }
        }
    }
}

impl<A, F> fmt::Debug for CascadingAllocator<A, F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let nodes = self.nodes.borrow();
        f.debug_struct("CascadingAllocator")
            .field("nodes", &nodes.len())
            .field(
                "live",
                &nodes.iter().map(|node| node.live).collect::<Vec<_>>(),
            )
            .finish_non_exhaustive()
    }
}
