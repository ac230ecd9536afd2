//! In-place free-list records
//!
//! Every free block starts with a [`Footer`]. Links are byte offsets from
//! the arena base, with [`NIL`] terminating the list.

use core::mem::size_of;

/// Offset sentinel for "no block"
pub(crate) const NIL: usize = usize::MAX;

/// Allocation granule: one footer. Block sizes and offsets are multiples
/// of it, so a split never leaves a remainder too small to hold a footer.
pub const GRANULE: usize = size_of::<Footer>();

/// Free-block record stored at the block's first byte
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Footer {
    /// Bytes covered by this free block, footer included
    pub(crate) available: usize,
    /// Offset of the next free block in address order, or [`NIL`]
    pub(crate) next: usize,
}

/// Rounds a request up to whole granules (at least one)
#[inline]
pub(crate) const fn block_size(size: usize) -> Option<usize> {
    let size = if size < GRANULE { GRANULE } else { size };
    match size.checked_add(GRANULE - 1) {
        Some(padded) => Some(padded & !(GRANULE - 1)),
        None => None,
    }
}

/// Rounds down to whole granules
#[inline]
pub(crate) const fn granule_floor(size: usize) -> usize {
    size & !(GRANULE - 1)
}
