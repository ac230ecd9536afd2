//! Free-list shape summary

use core::fmt;

/// Shape of an arena's free space at one instant
///
/// Built from the lengths of the free blocks, in any order. A request of
/// `n` bytes can succeed only if `n <= largest_block`, however large
/// `total_free` is.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FragmentationStats {
    /// Free bytes summed over every block
    pub total_free: usize,
    /// Longest single free block
    pub largest_block: usize,
    /// Number of free blocks
    pub fragment_count: usize,
    /// Share of free bytes outside the largest block, 0 to 100
    pub fragmentation_percent: u8,
}

impl FragmentationStats {
    /// Summary of free blocks with the given lengths
    pub fn from_free_sizes(sizes: impl IntoIterator<Item = usize>) -> Self {
        let mut stats = Self::default();
        for size in sizes {
            stats.total_free += size;
            stats.largest_block = stats.largest_block.max(size);
            stats.fragment_count += 1;
        }

        if stats.total_free > 0 {
            let stranded = (stats.total_free - stats.largest_block) as u128;
            stats.fragmentation_percent = (stranded * 100 / stats.total_free as u128) as u8;
        }
        stats
    }

    /// More than half the free bytes sit outside the largest block
    #[inline]
    pub fn is_fragmented(&self) -> bool {
        self.fragmentation_percent > 50
    }

    /// Whether one free block is long enough for `size` bytes
    #[inline]
    pub fn fits(&self, size: usize) -> bool {
        size <= self.largest_block
    }
}

impl FromIterator<usize> for FragmentationStats {
    fn from_iter<I: IntoIterator<Item = usize>>(sizes: I) -> Self {
        Self::from_free_sizes(sizes)
    }
}

impl fmt::Display for FragmentationStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "free {} bytes in {} fragments (largest {} bytes, {}% fragmented)",
            self.total_free, self.fragment_count, self.largest_block, self.fragmentation_percent
        )
    }
}
