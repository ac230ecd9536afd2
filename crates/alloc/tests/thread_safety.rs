//! Which wrappers may cross threads, and what happens when they do

use std::alloc::Layout;

use nebula_alloc::{
    Allocator, ArenaAllocator, AtomicCounter, GlobalAllocator, GlobalSlot, RefAllocator,
    SharedAllocator, SystemAllocator, ThreadSafeAllocator, ThreadedAllocator,
};

fn assert_send<T: Send>() {}
fn assert_send_sync<T: Send + Sync>() {}
fn assert_thread_safe<T: ThreadSafeAllocator>() {}

#[test]
fn thread_safety_follows_the_wrappers() {
    assert_send::<ArenaAllocator>();
    assert_send_sync::<ThreadedAllocator<ArenaAllocator>>();
    assert_thread_safe::<ThreadedAllocator<ArenaAllocator>>();
    assert_thread_safe::<SystemAllocator>();
    assert_thread_safe::<SharedAllocator<ThreadedAllocator<ArenaAllocator>, AtomicCounter>>();
    assert_thread_safe::<RefAllocator<'static, ThreadedAllocator<ArenaAllocator>>>();
    assert_thread_safe::<GlobalAllocator<ThreadedAllocator<ArenaAllocator>>>();
}

#[test]
fn arena_moves_between_threads() {
    let arena = ArenaAllocator::new(1024).unwrap();
    let layout = Layout::from_size_align(64, 8).unwrap();

    let arena = std::thread::spawn(move || {
        let ptr = arena.allocate(layout).unwrap();
        unsafe { arena.deallocate(ptr, layout).unwrap() };
        arena
    })
    .join()
    .unwrap();

    assert_eq!(arena.used(), 0);
}

fn shared_arena() -> ThreadedAllocator<ArenaAllocator> {
    ThreadedAllocator::new(ArenaAllocator::new(32 * 1024).unwrap())
}

static SHARED: GlobalSlot<ThreadedAllocator<ArenaAllocator>> = GlobalSlot::new(shared_arena);

#[test]
fn global_slot_serves_every_thread() {
    let layout = Layout::from_size_align(128, 8).unwrap();

    let handles: Vec<_> = (0..4)
        .map(|_| {
            std::thread::spawn(move || {
                let alloc = GlobalAllocator::new(&SHARED);
                let blocks: Vec<_> = (0..16).map(|_| alloc.allocate(layout).unwrap()).collect();
                for ptr in blocks {
                    unsafe { alloc.deallocate(ptr, layout).unwrap() };
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    SHARED.get().with_inner(|arena| {
        assert_eq!(arena.used(), 0);
        arena.validate().unwrap();
    });
}
