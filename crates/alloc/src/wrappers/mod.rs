//! Lifetime and concurrency wrappers
//!
//! Each wrapper forwards the full capability set of the allocator it holds
//! and changes only who owns it and who may call it:
//! - [`SharedAllocator`]: reference-counted sharing, pluggable counter
//! - [`ThreadedAllocator`]: one mutex around every call
//! - [`RefAllocator`]: non-owning borrowed handle
//! - [`GlobalAllocator`]: handle to a process-wide [`GlobalSlot`]

mod counter;
mod global;
mod reference;
mod shared;
mod threaded;

pub use counter::{AtomicCounter, LocalCounter, RefCounter};
pub use global::{GlobalAllocator, GlobalSlot};
pub use reference::RefAllocator;
pub use shared::SharedAllocator;
pub use threaded::ThreadedAllocator;
