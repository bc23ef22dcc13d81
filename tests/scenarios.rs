//! End-to-end scenarios exercising the storage core's externally visible
//! contract: fix/unfix, commit, snapshot reads, area allocation, crash
//! recovery, discardable rollback, and verify-and-correct.

use std::sync::Arc;
use std::time::Duration;

use syd_store::buffer::BufferPool;
use syd_store::error::Error;
use syd_store::file::MemoryFile;
use syd_store::ids::{FixMode, PageID, Priority, Timestamp, UnfixMode};
use syd_store::physical::{AreaManagedFile, PageManagedFile};
use syd_store::version::synclog::SyncLog;
use syd_store::version::VersionManager;
use syd_store::verify::{self, Treatment};

struct SilentProgress;
impl verify::Progress for SilentProgress {
    fn report(&mut self, _message: &str) {}
}

fn page_managed_pool(page_size: usize, frames: usize) -> (Arc<BufferPool<MemoryFile>>, syd_store::physical::FileHandle) {
    let pool = Arc::new(BufferPool::new(page_size, frames, Duration::from_millis(200)));
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
fn simple_write_read() {
    let page_size = 64;
    let (pool, file) = page_managed_pool(page_size, 8);
    let pmf = PageManagedFile::create(pool.clone(), file).unwrap();

    let page_id = pmf.allocate_page(Timestamp::new(1)).unwrap();

    let fixed = pmf
        .attach(page_id, FixMode::Write { discardable: false }, Priority::Middle, Timestamp::new(1))
        .unwrap();
    fixed.clear(0x01);
    fixed.unfix(UnfixMode::Dirty);
    pmf.flush(page_id, Timestamp::new(10)).unwrap();

    let fixed = pmf
        .attach(page_id, FixMode::ReadOnly, Priority::Middle, Timestamp::new(10))
        .unwrap();
    assert_eq!(fixed.read(), vec![0x01; page_size]);
}

#[test]
fn snapshot_isolation_between_concurrent_readers() {
    let page_size = 64;
    let (pool, file) = page_managed_pool(page_size, 8);
    let pmf = PageManagedFile::create(pool.clone(), file).unwrap();
    let page_id = pmf.allocate_page(Timestamp::new(1)).unwrap();

    let fixed = pmf
        .attach(page_id, FixMode::Write { discardable: false }, Priority::Middle, Timestamp::new(1))
        .unwrap();
    fixed.clear(0x01);
    fixed.unfix(UnfixMode::Dirty);
    pmf.flush(page_id, Timestamp::new(10)).unwrap();

    // tx_A reads at ts=10 and holds its snapshot.
    let tx_a = pmf
        .attach(page_id, FixMode::ReadOnly, Priority::Middle, Timestamp::new(10))
        .unwrap();
    assert_eq!(tx_a.read(), vec![0x01; page_size]);
    drop(tx_a);

    // tx_B commits a new version at ts=11.
    let fixed = pmf
        .attach(page_id, FixMode::Write { discardable: false }, Priority::Middle, Timestamp::new(10))
        .unwrap();
    fixed.clear(0x02);
    fixed.unfix(UnfixMode::Dirty);
    pmf.flush(page_id, Timestamp::new(11)).unwrap();

    // A reader still pinned to ts=10 must observe the old content.
    let tx_a_again = pmf
        .attach(page_id, FixMode::ReadOnly, Priority::Middle, Timestamp::new(10))
        .unwrap();
    assert_eq!(tx_a_again.read(), vec![0x01; page_size]);
    drop(tx_a_again);

    let tx_c = pmf
        .attach(page_id, FixMode::ReadOnly, Priority::Middle, Timestamp::new(11))
        .unwrap();
    assert_eq!(tx_c.read(), vec![0x02; page_size]);
}

#[test]
fn area_allocate_and_free_reuses_slot_and_tracks_free_space() {
    let page_size = 4096usize;
    let (pool, file) = page_managed_pool(page_size, 8);
    let amf = AreaManagedFile::create(pool, file).unwrap();

    let (page, a1) = amf.allocate_area(100, Timestamp::new(1)).unwrap();
    let (page2, a2) = amf.allocate_area(200, Timestamp::new(2)).unwrap();
    let (page3, a3) = amf.allocate_area(300, Timestamp::new(3)).unwrap();
    assert_eq!(page, page2);
    assert_eq!(page, page3);

    let offsets: Vec<u32> = amf
        .entries(page, Timestamp::new(3))
        .unwrap()
        .iter()
        .map(|(_, _, offset, _)| *offset)
        .collect();
    // Payload grows backward from the page end, so each new area's offset
    // is strictly less than the one before it.
    assert!(offsets.windows(2).all(|w| w[0] > w[1]));

    amf.free_area(page, a2, Timestamp::new(4)).unwrap();
    let (reused_page, reused_area) = amf.allocate_area(150, Timestamp::new(5)).unwrap();
    assert_eq!(reused_page, page);
    assert_eq!(reused_area, a2);

    let entries = amf.entries(page, Timestamp::new(5)).unwrap();
    let directory_overhead = 8 + entries.len() as u32 * 12; // PageDirHeader + AreaDirEntry sizes
    let used: u32 = entries
        .iter()
        .filter(|(id, used, _, _)| *used || *id == a1 || *id == a3)
        .map(|(_, _, _, length)| *length)
        .sum();
    let free = page_size as u32 - directory_overhead - used;
    assert_eq!(used, 100 + 150 + 300);
    assert!(free < page_size as u32);
}

#[test]
fn crash_during_fold_back_is_recovered_from_the_pre_image() {
    let master_file = MemoryFile::new();
    let vlog_file = MemoryFile::new();
    let slog_file = MemoryFile::new();
    let page_size = 16;

    {
        let mut vm = VersionManager::recover(
            master_file.clone(),
            vlog_file.clone(),
            slog_file.clone(),
            page_size,
        )
        .unwrap();
        vm.write_version(PageID::new(0), Timestamp::new(1), &[0xAA; 16]).unwrap();
        vm.sync(PageID::new(0)).unwrap();

        vm.write_version(PageID::new(0), Timestamp::new(2), &[0xBB; 16]).unwrap();

        // Simulate a crash between "pre-image flushed" and "master write
        // completes": the pre-image records the pre-crash content, but no
        // "done" marker is ever appended.
        let mut slog = SyncLog::open(slog_file.clone(), page_size).unwrap();
        slog.write_pre_image(PageID::new(0), &[0xAA; 16]).unwrap();
    }

    let vm = VersionManager::recover(master_file, vlog_file, slog_file, page_size).unwrap();
    let recovered = vm.fetch(PageID::new(0), Timestamp::new(1)).unwrap();
    assert_eq!(recovered, vec![0xAA; 16]);
}

#[test]
fn discardable_rollback_restores_the_pre_fix_committed_content() {
    let page_size = 32;
    let (pool, file) = page_managed_pool(page_size, 8);
    let pmf = PageManagedFile::create(pool.clone(), file).unwrap();
    let page_id = pmf.allocate_page(Timestamp::new(1)).unwrap();

    let fixed = pmf
        .attach(page_id, FixMode::Write { discardable: false }, Priority::Middle, Timestamp::new(1))
        .unwrap();
    fixed.clear(0x01);
    fixed.unfix(UnfixMode::Dirty);
    pmf.flush(page_id, Timestamp::new(2)).unwrap();

    let fixed = pmf
        .attach(page_id, FixMode::Write { discardable: true }, Priority::Middle, Timestamp::new(2))
        .unwrap();
    fixed.clear(0xff);
    fixed.unfix(UnfixMode::Dirty);

    pool.abort_discardable(file, page_id);

    let fixed = pmf
        .attach(page_id, FixMode::ReadOnly, Priority::Middle, Timestamp::new(2))
        .unwrap();
    assert_eq!(fixed.read(), vec![0x01; page_size]);
}

#[test]
fn verify_detects_then_corrects_a_corrupt_free_list() {
    let page_size = 16;
    let (pool, file) = page_managed_pool(page_size, 8);
    let pmf = PageManagedFile::create(pool.clone(), file).unwrap();

    let a = pmf.allocate_page(Timestamp::new(1)).unwrap();
    pmf.free_page(a, Timestamp::new(2)).unwrap();

    // Corrupt the free list into a self-referencing cycle by writing a's
    // own id into its "next free" slot.
    let fixed = pmf
        .attach(a, FixMode::Write { discardable: false }, Priority::Middle, Timestamp::new(2))
        .unwrap();
    fixed.write(0, &a.value().to_le_bytes());
    fixed.unfix(UnfixMode::Dirty);
    pmf.flush(a, Timestamp::new(3)).unwrap();

    let mut progress = SilentProgress;
    let found = verify::verify_page_managed(&pmf, Treatment::ReadOnly, &mut progress, Timestamp::new(3)).unwrap();
    assert!(found.iter().any(|e| matches!(e, Error::DiscordPageArray)));

    let corrected = verify::verify_page_managed(&pmf, Treatment::Correct, &mut progress, Timestamp::new(3)).unwrap();
    assert!(corrected
        .iter()
        .any(|e| matches!(e, Error::CorrectedPageUseSituation(p) if *p == a)));
}
