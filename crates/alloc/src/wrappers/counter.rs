//! Reference counters for shared allocators
//!
//! The counter decides whether a [`SharedAllocator`](super::SharedAllocator)
//! may cross threads: [`LocalCounter`] is a plain `Cell` and keeps the
//! wrapper `!Send`/`!Sync`, [`AtomicCounter`] lifts that restriction.

use core::cell::Cell;
use core::sync::atomic::{AtomicUsize, Ordering, fence};

/// Count of live handles to a shared control block
///
/// A new counter starts at one, for the handle that created it.
pub trait RefCounter {
    /// Counter holding one reference
    fn one() -> Self;

    /// Current count
    fn get(&self) -> usize;

    /// Adds a reference
    fn increment(&self);

    /// Drops a reference and returns the remaining count
    ///
    /// When this returns zero every prior use of the shared value
    /// happens-before the caller's next access.
    fn decrement(&self) -> usize;
}

/// Single-threaded counter
#[derive(Debug)]
pub struct LocalCounter(Cell<usize>);

impl RefCounter for LocalCounter {
    #[inline]
    fn one() -> Self {
        Self(Cell::new(1))
    }

    #[inline]
    fn get(&self) -> usize {
        self.0.get()
    }

    #[inline]
    fn increment(&self) {
        self.0.set(self.0.get() + 1);
    }

    #[inline]
    fn decrement(&self) -> usize {
        let remaining = self.0.get() - 1;
        self.0.set(remaining);
        remaining
    }
}

/// Thread-safe counter
#[derive(Debug)]
pub struct AtomicCounter(AtomicUsize);

impl RefCounter for AtomicCounter {
    #[inline]
    fn one() -> Self {
        Self(AtomicUsize::new(1))
    }

    #[inline]
    fn get(&self) -> usize {
        self.0.load(Ordering::Acquire)
    }

    #[inline]
    fn increment(&self) {
        // A new handle is made from an existing one, so no ordering is needed
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    fn decrement(&self) -> usize {
        let remaining = self.0.fetch_sub(1, Ordering::Release) - 1;
        if remaining == 0 {
            fence(Ordering::Acquire);
        }
        remaining
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exercise<C: RefCounter>() {
        let counter = C::one();
        assert_eq!(counter.get(), 1);

        counter.increment();
        counter.increment();
        assert_eq!(counter.get(), 3);

        assert_eq!(counter.decrement(), 2);
        assert_eq!(counter.decrement(), 1);
        assert_eq!(counter.decrement(), 0);
    }

    #[test]
    fn local_counter_operations() {
        exercise::<LocalCounter>();
    }

    #[test]
    fn atomic_counter_operations() {
        exercise::<AtomicCounter>();
    }

    #[test]
    fn atomic_counter_across_threads() {
        let counter = AtomicCounter::one();
        std::thread::scope(|scope| {
            for _ in 0..4 {
                scope.spawn(|| {
                    for _ in 0..1000 {
                        counter.increment();
                    }
                });
            }
        });
        assert_eq!(counter.get(), 4001);
    }
}
