//! `FileKind::DirectArea`: fixed-size slots addressed arithmetically by
//! `DirectAreaID { page, area }`, with no per-page directory to consult —
//! the "direct" half of the Physical File's two area-allocation
//! strategies, for drivers (B-tree node storage, record overflow areas)
//! that want every area the same size and addressing with no indirection
//! on the read path.

use std::sync::Arc;

use zerocopy::little_endian::U64;

use crate::buffer::BufferPool;
use crate::error::Result;
use crate::file::File;
use crate::ids::{AreaID, DirectAreaID, FixMode, PageID, Priority, Timestamp, UnfixMode};

use super::header::FileKind;
use super::page_managed::PageManagedFile;
use super::FileHandle;

pub struct DirectAreaFile<F> {
    pages: PageManagedFile<F>,
}

impl<F: File> DirectAreaFile<F> {
    pub fn create(pool: Arc<BufferPool<F>>, file: FileHandle, slot_size: u32) -> Result<Self> {
        let page_size = pool.page_size() as u32;
        let slots_per_page = page_size / slot_size;
        debug_assert!(slots_per_page > 0, "slot_size must not exceed the page size");

        let pages = PageManagedFile::create_with_kind(pool, file, FileKind::DirectArea)?;
        let mut header = pages.read_header(Timestamp::ZERO)?;
        header.directory_page_count = U64::new(slot_size as u64);
        header.area_count = U64::new(slots_per_page as u64);
        pages.write_header(&header, Timestamp::ZERO)?;

        Ok(DirectAreaFile { pages })
    }

    pub fn open(pool: Arc<BufferPool<F>>, file: FileHandle, read_timestamp: Timestamp) -> Result<Self> {
        let pages = PageManagedFile::open_with_kind(pool, file, read_timestamp, FileKind::DirectArea)?;
        Ok(DirectAreaFile { pages })
    }

    fn slots_per_page(&self, read_timestamp: Timestamp) -> Result<u32> {
        Ok(self.pages.read_header(read_timestamp)?.area_count.get() as u32)
    }

    fn slot_size(&self, read_timestamp: Timestamp) -> Result<u32> {
        Ok(self.pages.read_header(read_timestamp)?.directory_page_count.get() as u32)
    }

    fn location(global: u64, slots_per_page: u32) -> DirectAreaID {
        let page = PageID::new(1 + global / slots_per_page as u64);
        let area = AreaID::new((global % slots_per_page as u64) as u32);
        DirectAreaID::new(page, area)
    }

    fn global_index(id: DirectAreaID, slots_per_page: u32) -> u64 {
        (id.page.value() - 1) * slots_per_page as u64 + id.area.value() as u64
    }

    /// Allocates the next free slot: reused from the free list if one
    /// exists, else the next never-touched slot, extending the file by a
    /// page whenever a fresh slot starts a new page.
    pub fn allocate_direct_area(&self, commit_timestamp: Timestamp) -> Result<DirectAreaID> {
        let mut header = self.pages.read_header(commit_timestamp)?;
        let slots_per_page = header.area_count.get() as u32;
        let slot_size = header.directory_page_count.get() as u32;

        if header.free_list_head.get() != u64::MAX {
            let global = header.free_list_head.get();
            let id = Self::location(global, slots_per_page);
            let fixed = self.pages.attach(id.page, FixMode::ReadOnly, Priority::Middle, commit_timestamp)?;
            let bytes = fixed.read();
            let offset = id.area.value() as usize * slot_size as usize;
            let next = u64::from_le_bytes(bytes[offset..offset + 8].try_into().unwrap());
            header.free_list_head = U64::new(next);
            self.pages.write_header(&header, commit_timestamp)?;
            return Ok(id);
        }

        let cursor = header.next_cursor.get();
        let id = Self::location(cursor, slots_per_page);
        if id.area.value() == 0 {
            self.pages.allocate_page(commit_timestamp)?;
            // `allocate_page` above persisted its own incremented
            // `page_count` on the header; re-read it fresh so the
            // `next_cursor` update below doesn't write back a stale copy
            // and revert that count.
            header = self.pages.read_header(commit_timestamp)?;
        }
        header.next_cursor = U64::new(cursor + 1);
        self.pages.write_header(&header, commit_timestamp)?;
        Ok(id)
    }

    pub fn free_direct_area(&self, id: DirectAreaID, commit_timestamp: Timestamp) -> Result<()> {
        let mut header = self.pages.read_header(commit_timestamp)?;
        let slots_per_page = header.area_count.get() as u32;
        let slot_size = header.directory_page_count.get() as u32;
        let global = Self::global_index(id, slots_per_page);

        let fixed = self.pages.attach(
            id.page,
            FixMode::Write { discardable: false },
            Priority::Middle,
            commit_timestamp,
        )?;
        let mut bytes = fixed.read();
        let offset = id.area.value() as usize * slot_size as usize;
        bytes[offset..offset + 8].copy_from_slice(&header.free_list_head.get().to_le_bytes());
        fixed.write(0, &bytes);
        fixed.unfix(UnfixMode::Dirty);
        self.pages.flush(id.page, commit_timestamp)?;

        header.free_list_head = U64::new(global);
        self.pages.write_header(&header, commit_timestamp)
    }

    pub fn read_direct_area(&self, id: DirectAreaID, read_timestamp: Timestamp) -> Result<Vec<u8>> {
        let slot_size = self.slot_size(read_timestamp)?;
        let fixed = self.pages.attach(id.page, FixMode::ReadOnly, Priority::Middle, read_timestamp)?;
        let bytes = fixed.read();
        let offset = id.area.value() as usize * slot_size as usize;
        Ok(bytes[offset..offset + slot_size as usize].to_vec())
    }

    pub fn write_direct_area(&self, id: DirectAreaID, data: &[u8], commit_timestamp: Timestamp) -> Result<()> {
        let slot_size = self.slot_size(commit_timestamp)? as usize;
        debug_assert_eq!(data.len(), slot_size);

        let fixed = self.pages.attach(
            id.page,
            FixMode::Write { discardable: false },
            Priority::Middle,
            commit_timestamp,
        )?;
        let mut bytes = fixed.read();
        let offset = id.area.value() as usize * slot_size;
        bytes[offset..offset + slot_size].copy_from_slice(data);
        fixed.write(0, &bytes);
        fixed.unfix(UnfixMode::Dirty);
        self.pages.flush(id.page, commit_timestamp)
    }

    #[cfg(test)]
    fn slots_per_page_for_test(&self, ts: Timestamp) -> u32 {
        self.slots_per_page(ts).unwrap()
    }
}
