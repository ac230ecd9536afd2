//! Property tests for the free-list engine

use std::alloc::Layout;
use std::ops::Range;
use std::ptr::NonNull;

use nebula_alloc::{Allocator, ArenaAllocator, ArenaConfig, GRANULE, Owns};
use proptest::prelude::*;

const CAPACITY: usize = 4096;

#[derive(Debug, Clone)]
enum Op {
    Alloc(usize),
    Free(usize),
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => (1usize..=300).prop_map(Op::Alloc),
        2 => any::<usize>().prop_map(Op::Free),
    ]
}

fn arena() -> ArenaAllocator {
    ArenaAllocator::with_config(ArenaConfig::production(CAPACITY)).unwrap()
}

fn layout(size: usize) -> Layout {
    Layout::from_size_align(size, 8).unwrap()
}

fn rounded(size: usize) -> usize {
    size.max(1).next_multiple_of(GRANULE)
}

fn extent(ptr: NonNull<u8>, size: usize) -> Range<usize> {
    let start = ptr.as_ptr() as usize;
    start..start + rounded(size)
}

fn overlaps(a: &Range<usize>, b: &Range<usize>) -> bool {
    a.start < b.end && b.start < a.end
}

proptest! {
    #[test]
    fn live_blocks_never_overlap(ops in prop::collection::vec(op(), 1..200)) {
        let arena = arena();
        let mut live: Vec<(NonNull<u8>, usize)> = Vec::new();

        for op in ops {
            match op {
                Op::Alloc(size) => {
                    let largest = arena.fragmentation().largest_block;
                    match arena.allocate(layout(size)) {
                        Some(ptr) => {
                            let new = extent(ptr, size);
                            for &(other, other_size) in &live {
                                prop_assert!(!overlaps(&new, &extent(other, other_size)));
                            }
                            live.push((ptr, size));
                        }
                        // First fit only fails when no single block is large enough
                        None => prop_assert!(largest < rounded(size)),
                    }
                }
                Op::Free(index) if !live.is_empty() => {
                    let (ptr, size) = live.swap_remove(index % live.len());
                    unsafe { arena.deallocate(ptr, layout(size)).unwrap() };
                }
                Op::Free(_) => {}
            }

            for &(ptr, _) in &live {
                prop_assert!(arena.owns(ptr));
            }
            prop_assert!(arena.validate().is_ok());
        }
    }

    #[test]
    fn requests_within_capacity_succeed(sizes in prop::collection::vec(1usize..=256, 1..64)) {
        let arena = arena();
        let mut total = 0;
        let mut live = Vec::new();

        for size in sizes {
            let ptr = arena.allocate(layout(size));
            if total + rounded(size) <= CAPACITY {
                prop_assert!(ptr.is_some());
                total += rounded(size);
            } else {
                prop_assert!(ptr.is_none());
                continue;
            }
            live.push((ptr.unwrap(), size));
        }
        prop_assert_eq!(arena.used(), total);

        for (ptr, size) in live {
            unsafe { arena.deallocate(ptr, layout(size)).unwrap() };
        }
        prop_assert!(arena.validate().is_ok());
        prop_assert_eq!(arena.used(), 0);
    }

    #[test]
    fn freeing_everything_restores_one_block(
        (sizes, order) in prop::collection::vec(1usize..=200, 1..48).prop_flat_map(|sizes| {
            let order = Just((0..sizes.len()).collect::<Vec<_>>()).prop_shuffle();
            (Just(sizes), order)
        })
    ) {
        let arena = arena();
        let blocks: Vec<_> = sizes
            .iter()
            .map(|&size| arena.allocate(layout(size)).map(|ptr| (ptr, size)))
            .collect();

        for index in order {
            if let Some((ptr, size)) = blocks[index] {
                unsafe { arena.deallocate(ptr, layout(size)).unwrap() };
                prop_assert!(arena.validate().is_ok());
            }
        }

        prop_assert_eq!(arena.free_blocks(), vec![0..CAPACITY]);
        prop_assert_eq!(arena.used(), 0);
    }
}

#[test]
fn stack_buffer_arena_round_trip() {
    let mut buffer = [0u8; 1024];
    let arena = ArenaAllocator::from_slice(&mut buffer).unwrap();
    let capacity = arena.capacity();

    let blocks: Vec<_> = (0..8)
        .map(|_| arena.allocate(layout(48)).unwrap())
        .collect();
    for ptr in blocks.into_iter().rev() {
        unsafe { arena.deallocate(ptr, layout(48)).unwrap() };
    }

    assert_eq!(arena.free_blocks(), vec![0..capacity]);
}
