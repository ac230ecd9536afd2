//! Multi-threshold size routing
//!
//! A [`SegregatorTree`] generalizes [`Segregator`](super::Segregator) to any
//! number of size classes. Thresholds are kept in a balanced binary search
//! tree rooted at the median, so routing costs `O(log n)` comparisons.
//!
//! ```text
//! thresholds: [64, 256, 1024]          root: 256
//! leaves:     [A0, A1, A2, A3]        /         \
//!                                   64          1024
//!                                  /  \        /    \
//!                                A0    A1    A2      A3
//! ```

use core::alloc::Layout;
use core::ptr::NonNull;

use crate::error::{AllocError, AllocResult};
use crate::traits::{Allocator, Constructible, Owns, SizeBounded};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Node {
    /// Sizes `<= threshold` go left, larger ones go right
    Split {
        threshold: usize,
        left: usize,
        right: usize,
    },
    Leaf(usize),
}

/// Size-class router over `thresholds.len() + 1` leaf allocators
///
/// Leaf `i` serves sizes in `(thresholds[i - 1], thresholds[i]]`; the first
/// leaf takes everything up to the first threshold and the last leaf takes
/// everything above the last one.
#[derive(Debug)]
pub struct SegregatorTree<A> {
    thresholds: Vec<usize>,
    leaves: Vec<A>,
    nodes: Vec<Node>,
    root: usize,
}

impl<A> SegregatorTree<A> {
    /// Builds the tree from strictly ascending thresholds
    pub fn new(thresholds: Vec<usize>, leaves: Vec<A>) -> AllocResult<Self> {
        if leaves.len() != thresholds.len() + 1 {
            return Err(AllocError::invalid_config(&format!(
                "{} thresholds need {} leaves, got {}",
                thresholds.len(),
                thresholds.len() + 1,
                leaves.len()
            )));
        }
        if thresholds.windows(2).any(|pair| pair[0] >= pair[1]) {
            return Err(AllocError::invalid_config(
                "thresholds must be strictly ascending",
            ));
        }

        let mut nodes = Vec::with_capacity(2 * leaves.len() - 1);
        let root = Self::build(&thresholds, &mut nodes, 0, leaves.len() - 1);

        Ok(Self {
            thresholds,
            leaves,
            nodes,
            root,
        })
    }

    /// Appends the subtree over leaves `first..=last` and returns its index
    fn build(thresholds: &[usize], nodes: &mut Vec<Node>, first: usize, last: usize) -> usize {
        if first == last {
            nodes.push(Node::Leaf(first));
            return nodes.len() - 1;
        }

        // Thresholds separating these leaves are `first..last`
        let median = first + (last - first - 1) / 2;
        let left = Self::build(thresholds, nodes, first, median);
        let right = Self::build(thresholds, nodes, median + 1, last);
        nodes.push(Node::Split {
            threshold: thresholds[median],
            left,
            right,
        });
        nodes.len() - 1
    }

    /// Index of the leaf serving `size`
    pub fn leaf_index(&self, size: usize) -> usize {
        let mut current = self.root;
        loop {
            match self.nodes[current] {
                Node::Leaf(leaf) => return leaf,
                Node::Split {
                    threshold,
                    left,
                    right,
                } => current = if size <= threshold { left } else { right },
            }
        }
    }

    /// Threshold tested first
    pub fn root_threshold(&self) -> Option<usize> {
        match self.nodes[self.root] {
            Node::Split { threshold, .. } => Some(threshold),
            Node::Leaf(_) => None,
        }
    }

    pub fn thresholds(&self) -> &[usize] {
        &self.thresholds
    }

    pub fn leaves(&self) -> &[A] {
        &self.leaves
    }

    pub fn leaf(&self, index: usize) -> Option<&A> {
        self.leaves.get(index)
    }

    #[inline]
    fn route(&self, layout: Layout) -> &A {
        &self.leaves[self.leaf_index(layout.size())]
    }
}

impl<A: Owns> SegregatorTree<A> {
    /// Leaf that owns `ptr`, if any
    fn owner(&self, ptr: NonNull<u8>) -> Option<&A> {
        self.leaves.iter().find(|leaf| leaf.owns(ptr))
    }
}

// SAFETY: allocation and deallocation resolve the same leaf from the size.
unsafe impl<A: Allocator> Allocator for SegregatorTree<A> {
    #[inline]
    #[track_caller]
    fn allocate(&self, layout: Layout) -> Option<NonNull<u8>> {
        self.route(layout).allocate(layout)
    }

    #[inline]
    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) -> AllocResult<()> {
        // SAFETY: caller contract forwarded to the leaf selected by size.
        unsafe { self.route(layout).deallocate(ptr, layout) }
    }
}

// SAFETY: true only when a leaf claims the block.
unsafe impl<A: Owns> Owns for SegregatorTree<A> {
    fn owns(&self, ptr: NonNull<u8>) -> bool {
        self.owner(ptr).is_some()
    }
}

impl<A: SizeBounded> SizeBounded for SegregatorTree<A> {
    /// Largest size any leaf can serve within its own size class
    fn max_size(&self) -> usize {
        self.leaves
            .iter()
            .enumerate()
            .map(|(index, leaf)| {
                let upper = self.thresholds.get(index).copied().unwrap_or(usize::MAX);
                leaf.max_size().min(upper)
            })
            .max()
            .unwrap_or(0)
    }
}

impl<A: Owns + Constructible> Constructible for SegregatorTree<A> {
    unsafe fn construct<T>(&self, ptr: NonNull<T>, value: T) {
        // SAFETY: caller contract forwarded to the owning leaf, or a plain
        // write when no leaf claims the block.
        unsafe {
            match self.owner(ptr.cast()) {
                Some(leaf) => leaf.construct(ptr, value),
                None => ptr.write(value),
            }
        }
    }

    unsafe fn destroy<T>(&self, ptr: NonNull<T>) {
        // SAFETY: see `construct`.
        unsafe {
            match self.owner(ptr.cast()) {
                Some(leaf) => leaf.destroy(ptr),
                None => ptr.drop_in_place(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arena::ArenaAllocator;

    fn tree() -> SegregatorTree<ArenaAllocator> {
        let leaves = (0..4)
            .map(|_| ArenaAllocator::new(8192).unwrap())
            .collect();
        SegregatorTree::new(vec![64, 256, 1024], leaves).unwrap()
    }

    #[test]
    fn root_is_the_median_threshold() {
        assert_eq!(tree().root_threshold(), Some(256));
    }

    #[test]
    fn leaves_cover_half_open_size_classes() {
        let tree = tree();
        let expected = [
            (0, 0),
            (64, 0),
            (65, 1),
            (256, 1),
            (257, 2),
            (1024, 2),
            (1025, 3),
            (usize::MAX, 3),
        ];
        for (size, leaf) in expected {
            assert_eq!(tree.leaf_index(size), leaf, "size {size}");
        }
    }

    #[test]
    fn allocation_lands_in_the_routed_leaf() {
        let tree = tree();
        let layout = Layout::from_size_align(300, 8).unwrap();

        let ptr = tree.allocate(layout).unwrap();
        assert!(tree.leaf(2).unwrap().owns(ptr));
        assert!(tree.owns(ptr));

        unsafe { tree.deallocate(ptr, layout).unwrap() };
        assert_eq!(tree.leaf(2).unwrap().used(), 0);
    }

    #[test]
    fn single_leaf_tree_routes_everything() {
        let tree = SegregatorTree::new(Vec::new(), vec![ArenaAllocator::new(256).unwrap()]).unwrap();
        assert_eq!(tree.root_threshold(), None);
        assert_eq!(tree.leaf_index(1 << 20), 0);
    }

    #[test]
    fn malformed_thresholds_are_rejected() {
        let leaves = |n| (0..n).map(|_| ArenaAllocator::new(256).unwrap()).collect::<Vec<_>>();

        assert!(SegregatorTree::new(vec![64, 64], leaves(3)).is_err());
        assert!(SegregatorTree::new(vec![256, 64], leaves(3)).is_err());
        assert!(SegregatorTree::new(vec![64], leaves(3)).is_err());
    }

    #[test]
    fn max_size_is_clamped_to_size_classes() {
        let leaves = vec![
            ArenaAllocator::new(4096).unwrap(),
            ArenaAllocator::new(512).unwrap(),
        ];
        let tree = SegregatorTree::new(vec![1024], leaves).unwrap();
        // The first leaf could hold 4096 bytes but only sees requests up to 1024
        assert_eq!(tree.max_size(), 1024);
    }
}
