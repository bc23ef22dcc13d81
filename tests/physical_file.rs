//! Physical File behavior across all three allocator variants: page
//! reuse, area directory packing and the `NoSpace` boundary, slot
//! arithmetic for `DirectArea`, and on-disk persistence across a
//! simulated restart.

use std::sync::Arc;
use std::time::Duration;

use tempfile::tempdir;

use syd_store::buffer::BufferPool;
use syd_store::error::Error;
use syd_store::file::master::MasterDataFile;
use syd_store::file::{MemoryFile, OsFile};
use syd_store::ids::{FixMode, Priority, Timestamp, UnfixMode};
use syd_store::physical::{AreaManagedFile, DirectAreaFile, PageManagedFile};
use syd_store::version::VersionManager;

fn memory_pool(page_size: usize, frames: usize) -> (Arc<BufferPool<MemoryFile>>, syd_store::physical::FileHandle) {
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

fn os_pool(
    dir: &std::path::Path,
    stem: &str,
    page_size: usize,
    frames: usize,
) -> (Arc<BufferPool<OsFile>>, syd_store::physical::FileHandle) {
    let pool = Arc::new(BufferPool::new(page_size, frames, Duration::from_millis(200)));
    let master = OsFile::open(dir.join(format!("{stem}.master"))).unwrap();
    let vlog = OsFile::open(dir.join(format!("{stem}.vlog"))).unwrap();
    let slog = OsFile::open(dir.join(format!("{stem}.slog"))).unwrap();
    let vm = VersionManager::recover(master, vlog, slog, page_size).unwrap();
    let file = pool.register_file(vm);
    (pool, file)
}

#[test]
fn allocated_pages_outlive_a_simulated_restart() {
    let dir = tempdir().unwrap();
    let page_size = 64;

    let page_id = {
        let (pool, file) = os_pool(dir.path(), "heap", page_size, 8);
        let pmf = PageManagedFile::create(pool.clone(), file).unwrap();
        let page_id = pmf.allocate_page(Timestamp::new(1)).unwrap();
        let fixed = pmf
            .attach(page_id, FixMode::Write { discardable: false }, Priority::Middle, Timestamp::new(1))
            .unwrap();
        fixed.clear(0x42);
        fixed.unfix(UnfixMode::Dirty);
        pmf.flush(page_id, Timestamp::new(2)).unwrap();
        page_id
    };

    let (pool, file) = os_pool(dir.path(), "heap", page_size, 8);
    let pmf = PageManagedFile::open(pool, file, Timestamp::new(2)).unwrap();
    let fixed = pmf
        .attach(page_id, FixMode::ReadOnly, Priority::Middle, Timestamp::new(2))
        .unwrap();
    assert_eq!(fixed.read(), vec![0x42; page_size]);
}

#[test]
fn freed_page_is_reused_before_the_file_grows() {
    let (pool, file) = memory_pool(32, 8);
    let pmf = PageManagedFile::create(pool, file).unwrap();

    let count_before = pmf.page_count(Timestamp::new(1)).unwrap();
    let a = pmf.allocate_page(Timestamp::new(1)).unwrap();
    let b = pmf.allocate_page(Timestamp::new(2)).unwrap();
    pmf.free_page(b, Timestamp::new(3)).unwrap();

    let reused = pmf.allocate_page(Timestamp::new(4)).unwrap();
    assert_eq!(reused, b);
    assert_eq!(pmf.page_count(Timestamp::new(4)).unwrap(), count_before + 2);
    let _ = a;
}

#[test]
fn largest_single_area_that_fits_exactly_succeeds() {
    let page_size = 64usize;
    let (pool, file) = memory_pool(page_size, 8);
    let amf = AreaManagedFile::create(pool, file).unwrap();

    // One directory entry costs 12 bytes on top of the 8-byte page
    // header; anything up to the remainder fits on the header page.
    let max_len = (page_size - 8 - 12) as u32;
    let (page, area) = amf.allocate_area(max_len, Timestamp::new(1)).unwrap();
    amf.write_area(page, area, &vec![9u8; max_len as usize], Timestamp::new(2))
        .unwrap();
    assert_eq!(
        amf.read_area(page, area, Timestamp::new(2)).unwrap(),
        vec![9u8; max_len as usize]
    );
}

#[test]
fn one_byte_larger_than_the_largest_area_never_fits_on_any_page() {
    let page_size = 64usize;
    let (pool, file) = memory_pool(page_size, 8);
    let amf = AreaManagedFile::create(pool, file).unwrap();

    let too_large = (page_size - 8 - 12 + 1) as u32;
    let err = amf.allocate_area(too_large, Timestamp::new(1)).unwrap_err();
    assert!(matches!(err, Error::NoSpace(_)));
}

#[test]
fn direct_area_slots_round_trip_and_reuse_after_free() {
    let page_size = 64usize;
    let (pool, file) = memory_pool(page_size, 8);
    let daf = DirectAreaFile::create(pool, file, 8).unwrap();

    let id1 = daf.allocate_direct_area(Timestamp::new(1)).unwrap();
    daf.write_direct_area(id1, &[1u8; 8], Timestamp::new(2)).unwrap();
    assert_eq!(daf.read_direct_area(id1, Timestamp::new(2)).unwrap(), vec![1u8; 8]);

    daf.free_direct_area(id1, Timestamp::new(3)).unwrap();
    let id2 = daf.allocate_direct_area(Timestamp::new(4)).unwrap();
    assert_eq!(id1, id2);
}

#[test]
fn direct_area_slots_roll_onto_a_new_page_once_the_first_is_full() {
    let page_size = 64usize;
    let slot_size = 8u32;
    let (pool, file) = memory_pool(page_size, 8);
    let daf = DirectAreaFile::create(pool, file, slot_size).unwrap();

    let slots_per_page = page_size / slot_size as usize;
    let mut ids = Vec::new();
    for i in 0..slots_per_page + 1 {
        ids.push(daf.allocate_direct_area(Timestamp::new(i as u64 + 1)).unwrap());
    }

    // The page field of the last allocated id must differ from the first,
    // once the first page's slots are exhausted.
    assert_ne!(ids[0].page, ids[slots_per_page].page);
}

#[test]
fn write_past_end_of_master_data_file_fails_out_of_range() {
    let master = MasterDataFile::open(MemoryFile::new(), 16);
    master.extend(1).unwrap();
    let err = master.write(5, &[0u8; 16]).unwrap_err();
    assert!(matches!(err, Error::OutOfRange(5, 1)));
}
