//! Instrumentation wrappers
//!
//! [`DebugAllocator`] records where allocations come from;
//! [`OverflowAllocator`] brackets blocks with guard bytes. Both count
//! outstanding usage and write a leak report to their sink when dropped
//! with anything still live. Reports are text written to a caller-chosen
//! [`std::io::Write`] and never interrupt control flow.

mod debug;
mod overflow;
mod usage;

pub use debug::{AllocationLog, AllocationRecord, DebugAllocator};
pub use overflow::OverflowAllocator;
pub use usage::{Usage, UsageCounters};
