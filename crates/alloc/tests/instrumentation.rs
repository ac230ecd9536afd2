//! Overflow and leak reporting through the public API

use std::alloc::Layout;
use std::cell::RefCell;

use nebula_alloc::{
    AllocationRecord, Allocator, ArenaAllocator, DebugAllocator, OverflowAllocator,
    OverflowConfig, SystemAllocator,
};
use pretty_assertions::assert_eq;

fn layout(size: usize) -> Layout {
    Layout::from_size_align(size, 8).unwrap()
}

fn overflow_report(write: impl FnOnce(*mut u8)) -> (usize, String) {
    let mut sink: Vec<u8> = Vec::new();
    let corruptions = {
        let alloc = OverflowAllocator::new(ArenaAllocator::new(4096).unwrap(), &mut sink);
        let ptr = alloc.allocate(layout(32)).unwrap();
        write(ptr.as_ptr());
        unsafe { alloc.deallocate(ptr, layout(32)).unwrap() };
        alloc.corruptions()
    };
    (corruptions, String::from_utf8(sink).unwrap())
}

#[test]
fn byte_before_block_is_reported() {
    let (corruptions, report) = overflow_report(|ptr| unsafe { ptr.sub(1).write(0) });
    assert_eq!(corruptions, 1);
    assert!(report.contains("front guard"), "{report}");
}

#[test]
fn byte_after_block_is_reported() {
    let (corruptions, report) = overflow_report(|ptr| unsafe { ptr.add(32).write(0) });
    assert_eq!(corruptions, 1);
    assert!(report.contains("back guard"), "{report}");
}

#[test]
fn writes_inside_block_are_silent() {
    let (corruptions, report) = overflow_report(|ptr| unsafe { ptr.write_bytes(0, 32) });
    assert_eq!(corruptions, 0);
    assert_eq!(report, "");
}

#[test]
fn overflow_leak_report_cites_count() {
    let mut sink: Vec<u8> = Vec::new();
    {
        let alloc = OverflowAllocator::with_config(
            SystemAllocator,
            OverflowConfig::with_guard_size(8),
            &mut sink,
        )
        .unwrap();
        for size in [8, 16, 24, 32] {
            assert!(alloc.allocate(layout(size)).is_some());
        }
        assert_eq!(alloc.usage().allocations, 4);
    }
    let report = String::from_utf8(sink).unwrap();
    assert!(report.contains("leaked 4 allocations (80 bytes)"), "{report}");
}

#[test]
fn debug_leak_report_cites_count() {
    let log = RefCell::new(Vec::<AllocationRecord>::new());
    let mut sink: Vec<u8> = Vec::new();
    {
        let alloc = DebugAllocator::new(ArenaAllocator::new(4096).unwrap(), &log, &mut sink);
        let _kept = alloc.allocate(layout(100)).unwrap();
        let freed = alloc.allocate(layout(50)).unwrap();
        unsafe { alloc.deallocate(freed, layout(50)).unwrap() };
    }

    assert_eq!(log.borrow().len(), 2);
    let report = String::from_utf8(sink).unwrap();
    assert!(report.contains("leaked 1 allocations (100 bytes)"), "{report}");
}

#[test]
fn balanced_wrappers_drop_silently() {
    let log = RefCell::new(Vec::<AllocationRecord>::new());
    let mut debug_sink: Vec<u8> = Vec::new();
    let mut overflow_sink: Vec<u8> = Vec::new();
    {
        let debug = DebugAllocator::new(ArenaAllocator::new(4096).unwrap(), &log, &mut debug_sink);
        let alloc = OverflowAllocator::new(&debug, &mut overflow_sink);
        let ptr = alloc.allocate(layout(64)).unwrap();
        unsafe { alloc.deallocate(ptr, layout(64)).unwrap() };
    }
    assert!(debug_sink.is_empty());
    assert!(overflow_sink.is_empty());
    assert_eq!(log.borrow()[0].size, 64 + 16 + 16);
}
