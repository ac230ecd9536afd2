//! Routing behaviour of nested compositions

use std::alloc::Layout;

use nebula_alloc::prelude::*;
use pretty_assertions::assert_eq;

fn layout(size: usize) -> Layout {
    Layout::from_size_align(size, 8).unwrap()
}

#[test]
fn fallback_takes_what_the_primary_cannot() {
    const CAPACITY: usize = 1024;
    let alloc = FallbackAllocator::new(ArenaAllocator::new(CAPACITY).unwrap(), SystemAllocator);

    let ptr = alloc.allocate(layout(CAPACITY + 1)).unwrap();
    assert!(!alloc.primary().owns(ptr));

    unsafe { alloc.deallocate(ptr, layout(CAPACITY + 1)).unwrap() };
    assert_eq!(alloc.primary().used(), 0);
}

#[test]
fn segregator_threshold_routes_both_ways() {
    const THRESHOLD: usize = 256;
    let alloc: Segregator<THRESHOLD, _, _> = Segregator::new(
        ArenaAllocator::new(4096).unwrap(),
        ArenaAllocator::new(4096).unwrap(),
    );

    let at = alloc.allocate(layout(THRESHOLD)).unwrap();
    let above = alloc.allocate(layout(THRESHOLD + 1)).unwrap();
    assert!(alloc.small().owns(at) && !alloc.large().owns(at));
    assert!(alloc.large().owns(above) && !alloc.small().owns(above));

    unsafe {
        alloc.deallocate(at, layout(THRESHOLD)).unwrap();
        alloc.deallocate(above, layout(THRESHOLD + 1)).unwrap();
    }
    assert_eq!((alloc.small().used(), alloc.large().used()), (0, 0));
}

#[test]
fn cascade_grows_once_and_keeps_the_survivor() {
    const CAPACITY: usize = 512;
    let cascade = CascadingAllocator::new(|| ArenaAllocator::new(CAPACITY));

    let filler = cascade.allocate(layout(CAPACITY)).unwrap();
    assert_eq!(cascade.node_count(), 1);

    let overflow = cascade.allocate(layout(1)).unwrap();
    assert_eq!(cascade.node_count(), 2);

    unsafe { cascade.deallocate(overflow, layout(1)).unwrap() };
    assert_eq!(cascade.node_count(), 1);
    assert!(cascade.owns(filler));

    unsafe { cascade.deallocate(filler, layout(CAPACITY)).unwrap() };
    assert_eq!(cascade.node_count(), 1);
    assert_eq!(cascade.live_counts(), vec![0]);
}

#[test]
fn nested_strategy_routes_each_request_to_one_engine() {
    // Segregator<4096, Arena, Fallback<Arena, Cascading<Arena>>>
    let alloc: Segregator<4096, _, _> = Segregator::new(
        ArenaAllocator::new(16 * 1024).unwrap(),
        FallbackAllocator::new(
            ArenaAllocator::new(16 * 1024).unwrap(),
            CascadingAllocator::new(|| ArenaAllocator::new(64 * 1024)),
        ),
    );

    let small = alloc.allocate(layout(64)).unwrap();
    let large = alloc.allocate(layout(8 * 1024)).unwrap();
    let spill = alloc.allocate(layout(12 * 1024)).unwrap();

    assert!(alloc.small().owns(small));
    assert!(alloc.large().primary().owns(large));
    assert!(alloc.large().secondary().owns(spill));
    assert_eq!(alloc.large().secondary().node_count(), 1);

    unsafe {
        alloc.deallocate(spill, layout(12 * 1024)).unwrap();
        alloc.deallocate(large, layout(8 * 1024)).unwrap();
        alloc.deallocate(small, layout(64)).unwrap();
    }
    assert_eq!(alloc.small().used(), 0);
    assert_eq!(alloc.large().primary().used(), 0);
}

#[test]
fn over_aligned_requests_fall_through_to_the_heap() {
    let alloc = FallbackAllocator::new(ArenaAllocator::new(4096).unwrap(), SystemAllocator);
    let page = Layout::from_size_align(64, 4096).unwrap();

    let ptr = alloc.allocate(page).unwrap();
    assert_eq!(ptr.as_ptr() as usize % 4096, 0);
    assert!(!alloc.primary().owns(ptr));
    unsafe { alloc.deallocate(ptr, page).unwrap() };
}

#[test]
fn tree_and_typed_front_end() {
    let leaves = (0..3).map(|_| ArenaAllocator::new(8192).unwrap()).collect();
    let tree = SegregatorTree::new(vec![32, 512], leaves).unwrap();
    let numbers = TypedAllocator::<u64, _>::new(&tree);

    let few = numbers.allocate(4).unwrap();
    let many = numbers.allocate(100).unwrap();
    assert!(tree.leaf(0).unwrap().owns(few.cast()));
    assert!(tree.leaf(2).unwrap().owns(many.cast()));

    unsafe {
        numbers.deallocate(few, 4).unwrap();
        numbers.deallocate(many, 100).unwrap();
    }
    assert!(tree.leaves().iter().all(|leaf| leaf.used() == 0));
}

#[cfg(not(feature = "trusted-caller"))]
#[test]
fn contract_violations_surface_through_compositions() {
    let alloc = FallbackAllocator::new(
        ArenaAllocator::new(1024).unwrap(),
        ArenaAllocator::new(1024).unwrap(),
    );
    let ptr = alloc.allocate(layout(64)).unwrap();
    let _neighbour = alloc.allocate(layout(64)).unwrap();

    unsafe {
        alloc.deallocate(ptr, layout(64)).unwrap();
        let error = alloc.deallocate(ptr, layout(64)).unwrap_err();
        assert!(error.is_contract_violation());
        assert_eq!(error.code(), "ALLOC:CONTRACT:DOUBLE_FREE");
    }
}
