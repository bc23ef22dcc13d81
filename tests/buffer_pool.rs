//! Concurrency behavior of the Buffer Pool across real OS threads: fix
//! mode compatibility, pin/unfix balance, and exhaustion under load.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Barrier};
use std::time::Duration;

use syd_store::buffer::BufferPool;
use syd_store::error::Error;
use syd_store::file::MemoryFile;
use syd_store::ids::{FixMode, PageID, Priority, Timestamp, UnfixMode};
use syd_store::version::VersionManager;

fn pool_with_file(page_size: usize, frames: usize) -> (Arc<BufferPool<MemoryFile>>, syd_store::buffer::frame::FileId) {
    let pool = Arc::new(BufferPool::new(page_size, frames, Duration::from_millis(300)));
    let vm = VersionManager::recover(
        MemoryFile::new(),
        MemoryFile::new(),
        MemoryFile::new(),
        page_size,
    )
    .unwrap();
    let file = pool.register_file(vm);
    (pool, file)
}

#[test]
fn two_threads_holding_write_fixes_serialize_through_the_same_page() {
    let (pool, file) = pool_with_file(8, 4);
    let holder = pool
        .fix(file, PageID::new(0), FixMode::Allocate, Priority::Middle, Timestamp::ZERO)
        .unwrap();

    let released = Arc::new(AtomicBool::new(false));
    let released_writer = released.clone();
    let pool_writer = pool.clone();

    let writer = std::thread::spawn(move || {
        let fixed = pool_writer
            .fix(file, PageID::new(0), FixMode::Write { discardable: false }, Priority::Middle, Timestamp::ZERO)
            .unwrap();
        assert!(released_writer.load(Ordering::SeqCst), "writer must not observe the frame before the holder releases it");
        fixed.unfix(UnfixMode::NotDirty);
    });

    std::thread::sleep(Duration::from_millis(50));
    released.store(true, Ordering::SeqCst);
    holder.unfix(UnfixMode::NotDirty);

    writer.join().unwrap();
}

#[test]
fn many_read_only_fixes_run_concurrently() {
    let (pool, file) = pool_with_file(8, 8);
    pool.fix(file, PageID::new(0), FixMode::Allocate, Priority::Middle, Timestamp::ZERO)
        .unwrap()
        .unfix(UnfixMode::NotDirty);

    let barrier = Arc::new(Barrier::new(4));
    let mut handles = Vec::new();
    for _ in 0..4 {
        let pool = pool.clone();
        let barrier = barrier.clone();
        handles.push(std::thread::spawn(move || {
            let fixed = pool
                .fix(file, PageID::new(0), FixMode::ReadOnly, Priority::Middle, Timestamp::ZERO)
                .unwrap();
            barrier.wait();
            fixed.unfix(UnfixMode::NotDirty);
        }));
    }
    for h in handles {
        h.join().unwrap();
    }
}

#[test]
fn pool_exhaustion_times_out_when_every_frame_stays_pinned() {
    let (pool, file) = pool_with_file(8, 2);
    let _a = pool
        .fix(file, PageID::new(0), FixMode::Allocate, Priority::Middle, Timestamp::ZERO)
        .unwrap();
    let _b = pool
        .fix(file, PageID::new(1), FixMode::Allocate, Priority::Middle, Timestamp::ZERO)
        .unwrap();

    let third = pool.fix(file, PageID::new(2), FixMode::Allocate, Priority::Middle, Timestamp::ZERO);
    assert!(matches!(third, Err(Error::Timeout(_))));
}

#[test]
fn releasing_a_pin_wakes_a_fix_blocked_on_exhaustion() {
    let (pool, file) = pool_with_file(8, 1);
    let first = pool
        .fix(file, PageID::new(0), FixMode::Allocate, Priority::Middle, Timestamp::ZERO)
        .unwrap();

    let pool2 = pool.clone();
    let waiter = std::thread::spawn(move || {
        pool2
            .fix(file, PageID::new(1), FixMode::Allocate, Priority::Middle, Timestamp::ZERO)
            .unwrap()
    });

    std::thread::sleep(Duration::from_millis(50));
    first.unfix(UnfixMode::NotDirty);

    let second = waiter.join().unwrap();
    assert_eq!(second.page_id(), PageID::new(1));
}
