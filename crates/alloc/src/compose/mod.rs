//! Composition policies
//!
//! Policies combine allocators without knowing their concrete types; each
//! call is routed to exactly one underlying allocator:
//! - [`FallbackAllocator`]: primary first, secondary when the primary fails
//! - [`Segregator`]: static size threshold
//! - [`SegregatorTree`]: several thresholds, searched as a balanced tree
//! - [`CascadingAllocator`]: a chain of same-kind allocators that grows on demand
//!
//! Deallocation and construction routing relies on [`Owns`](crate::Owns)
//! wherever the size alone cannot tell which side served a pointer.

mod cascading;
mod fallback;
mod segregator;
mod tree;

pub use cascading::CascadingAllocator;
pub use fallback::FallbackAllocator;
pub use segregator::Segregator;
pub use tree::SegregatorTree;
