//! # nebula-alloc
//!
//! Composable allocator building blocks for the Nebula workflow automation
//! ecosystem.
//!
//! Small, swappable layers that nest into a custom allocation strategy:
//! - A fixed-capacity free-list arena engine with coalescing
//! - Composition policies: fallback, size segregation, cascading growth
//! - Lifetime and concurrency wrappers: shared, threaded, borrowed, global
//! - Instrumentation: provenance logging, guard-byte overflow and leak reports
//!
//! ## Quick Start
//!
//! ```rust
//! use core::alloc::Layout;
//! use nebula_alloc::prelude::*;
//!
//! // Small requests from an arena, large ones (and arena overflow) from the heap
//! let alloc: Segregator<256, _, _> = Segregator::new(
//!     FallbackAllocator::new(ArenaAllocator::new(64 * 1024)?, SystemAllocator),
//!     SystemAllocator,
//! );
//!
//! let layout = Layout::from_size_align(128, 8).unwrap();
//! let ptr = alloc.allocate(layout).expect("arena has room");
//! unsafe { alloc.deallocate(ptr, layout)? };
//! # Ok::<(), AllocError>(())
//! ```
//!
//! ## Capabilities
//!
//! Every layer implements [`Allocator`]; the optional capabilities
//! [`Owns`], [`SizeBounded`] and [`Constructible`] are forwarded whenever
//! the wrapped layers provide them, and required only where routing
//! depends on them.
//!
//! ## Threading
//!
//! The engine and the composition policies are single-threaded (`!Sync`).
//! Wrap them in [`ThreadedAllocator`] to share across threads.
//!
//! ## Features
//!
//! - `logging` (default): `tracing` events for arena setup, cascade growth,
//!   leak and corruption reports
//! - `trusted-caller`: Strip the arena's deallocation contract checks

#![cfg_attr(docsrs, feature(doc_cfg))]
#![allow(unsafe_code)]
#![warn(rust_2018_idioms)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
// Address arithmetic goes through usize on purpose
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::cast_precision_loss)]
// Footers are read at granule-aligned offsets
#![allow(clippy::cast_ptr_alignment)]

// Error types
pub mod error;

// Contract
pub mod traits;

// Core modules
pub mod arena;
pub mod compose;
pub mod config;
pub mod diagnostics;
pub mod system;
pub mod typed;
pub mod wrappers;

pub use crate::arena::{
    ArenaAllocator, BorrowedRegion, FragmentationStats, GRANULE, HeapRegion, Region,
};
pub use crate::compose::{CascadingAllocator, FallbackAllocator, Segregator, SegregatorTree};
pub use crate::config::{ArenaConfig, OverflowConfig};
pub use crate::diagnostics::{
    AllocationLog, AllocationRecord, DebugAllocator, OverflowAllocator, Usage, UsageCounters,
};
pub use crate::error::{AllocError, AllocResult};
pub use crate::system::SystemAllocator;
pub use crate::traits::{Allocator, Constructible, Owns, SizeBounded, ThreadSafeAllocator};
pub use crate::typed::TypedAllocator;
pub use crate::wrappers::{
    AtomicCounter, GlobalAllocator, GlobalSlot, LocalCounter, RefAllocator, RefCounter,
    SharedAllocator, ThreadedAllocator,
};

pub mod prelude {
    //! Convenient re-exports of commonly used types and traits.

    // Contract
    pub use crate::traits::{Allocator, Constructible, Owns, SizeBounded, ThreadSafeAllocator};

    // Error types
    pub use crate::error::{AllocError, AllocResult};

    // Engine
    pub use crate::arena::ArenaAllocator;
    pub use crate::config::{ArenaConfig, OverflowConfig};
    pub use crate::system::SystemAllocator;

    // Composition
    pub use crate::compose::{CascadingAllocator, FallbackAllocator, Segregator, SegregatorTree};

    // Wrappers
    pub use crate::wrappers::{
        AtomicCounter, GlobalAllocator, GlobalSlot, RefAllocator, SharedAllocator,
        ThreadedAllocator,
    };

    // Instrumentation
    pub use crate::diagnostics::{DebugAllocator, OverflowAllocator};

    pub use crate::typed::TypedAllocator;
}
