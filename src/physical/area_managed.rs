//! `FileKind::AreaManaged`: variable-length areas packed onto pages in
//! the classic slotted-page shape — a directory of (offset, length,
//! used) entries growing from the front of the page, payload bytes
//! growing from the back — the same layout every slotted-page store in
//! the reference pool uses (e.g. `c2449f65_misssonder-rustdb`'s
//! `buffer_pool_manager.rs` and `4fbb3d1f_lina-roether-beedb`'s
//! `page_store/cache.rs`), built here on top of `PageManagedFile` for
//! page allocation.

use std::sync::Arc;

use zerocopy::little_endian::U32;
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

use crate::buffer::BufferPool;
use crate::error::{Error, Result};
use crate::file::File;
use crate::ids::{AreaID, FixMode, PageID, Priority, Timestamp, UnfixMode};

use super::header::FileKind;
use super::page_managed::PageManagedFile;
use super::FileHandle;

const DIR_HEADER_SIZE: usize = std::mem::size_of::<PageDirHeader>();
const ENTRY_SIZE: usize = std::mem::size_of::<AreaDirEntry>();

#[derive(FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned, Debug, Clone, Copy)]
#[repr(C)]
struct PageDirHeader {
    entry_count: U32,
    data_begin: U32,
}

#[derive(FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned, Debug, Clone, Copy)]
#[repr(C)]
struct AreaDirEntry {
    offset: U32,
    length: U32,
    used: u8,
    _pad: [u8; 3],
}

fn dir_header(bytes: &[u8]) -> PageDirHeader {
    PageDirHeader::read_from_bytes(&bytes[..DIR_HEADER_SIZE]).expect("page large enough for directory header")
}

fn set_dir_header(bytes: &mut [u8], header: &PageDirHeader) {
    bytes[..DIR_HEADER_SIZE].copy_from_slice(header.as_bytes());
}

fn entry_at(bytes: &[u8], index: u32) -> AreaDirEntry {
    let start = DIR_HEADER_SIZE + index as usize * ENTRY_SIZE;
    AreaDirEntry::read_from_bytes(&bytes[start..start + ENTRY_SIZE]).expect("entry within page bounds")
}

fn set_entry_at(bytes: &mut [u8], index: u32, entry: &AreaDirEntry) {
    let start = DIR_HEADER_SIZE + index as usize * ENTRY_SIZE;
    bytes[start..start + ENTRY_SIZE].copy_from_slice(entry.as_bytes());
}

fn format_page(bytes: &mut [u8], page_size: usize) {
    set_dir_header(
        bytes,
        &PageDirHeader {
            entry_count: U32::new(0),
            data_begin: U32::new(page_size as u32),
        },
    );
}

pub struct AreaManagedFile<F> {
    pages: PageManagedFile<F>,
}

impl<F: File> AreaManagedFile<F> {
    pub fn create(pool: Arc<BufferPool<F>>, file: FileHandle) -> Result<Self> {
        let pages = PageManagedFile::create_with_kind(pool, file, FileKind::AreaManaged)?;
        Ok(AreaManagedFile { pages })
    }

    pub fn open(pool: Arc<BufferPool<F>>, file: FileHandle, read_timestamp: Timestamp) -> Result<Self> {
        let pages = PageManagedFile::open_with_kind(pool, file, read_timestamp, FileKind::AreaManaged)?;
        Ok(AreaManagedFile { pages })
    }

    pub fn page_count(&self, read_timestamp: Timestamp) -> Result<u64> {
        self.pages.page_count(read_timestamp)
    }

    pub fn page_size(&self) -> usize {
        self.pages.page_size()
    }

    /// Allocates an area of `length` bytes, reusing a freed directory
    /// slot on the current page before trying to append a new one, and
    /// allocating a fresh page only once the current page has no room.
    pub fn allocate_area(&self, length: u32, commit_timestamp: Timestamp) -> Result<(PageID, AreaID)> {
        let active = self.pages.read_header(commit_timestamp)?.free_list_head.get();

        if active != u64::MAX {
            let page_id = PageID::new(active);
            if let Some(area_id) = self.try_allocate_on(page_id, length, commit_timestamp)? {
                return Ok((page_id, area_id));
            }
        }

        let page_id = self.pages.allocate_page(commit_timestamp)?;
        let page_size = self.pages.page_size();
        {
            let fixed = self.pages.attach(
                page_id,
                FixMode::Write { discardable: false },
                Priority::Middle,
                commit_timestamp,
            )?;
            let mut bytes = fixed.read();
            format_page(&mut bytes, page_size);
            fixed.write(0, &bytes);
            fixed.unfix(UnfixMode::Dirty);
        }
        self.pages.flush(page_id, commit_timestamp)?;

        // Re-read the header fresh: `allocate_page` above persisted its own
        // incremented `page_count`, so mutating the copy read before that
        // call and writing it back would revert the page count.
        let mut header = self.pages.read_header(commit_timestamp)?;
        header.free_list_head = zerocopy::little_endian::U64::new(page_id.value());
        self.pages.write_header(&header, commit_timestamp)?;

        let area_id = self
            .try_allocate_on(page_id, length, commit_timestamp)?
            .ok_or(Error::NoSpace(page_id))?;
        Ok((page_id, area_id))
    }

    fn try_allocate_on(
        &self,
        page_id: PageID,
        length: u32,
        commit_timestamp: Timestamp,
    ) -> Result<Option<AreaID>> {
        let fixed = self.pages.attach(
            page_id,
            FixMode::Write { discardable: false },
            Priority::Middle,
            commit_timestamp,
        )?;
        let mut bytes = fixed.read();
        let mut header = dir_header(&bytes);

        for index in 0..header.entry_count.get() {
            let mut entry = entry_at(&bytes, index);
            if entry.used == 0 && entry.length.get() >= length {
                entry.used = 1;
                entry.length = U32::new(length);
                set_entry_at(&mut bytes, index, &entry);
                fixed.write(0, &bytes);
                fixed.unfix(UnfixMode::Dirty);
                self.pages.flush(page_id, commit_timestamp)?;
                return Ok(Some(AreaID::new(index)));
            }
        }

        let new_index = header.entry_count.get();
        let directory_end = (DIR_HEADER_SIZE + (new_index as usize + 1) * ENTRY_SIZE) as u32;
        if directory_end > header.data_begin.get().saturating_sub(length) {
            fixed.unfix(UnfixMode::NotDirty);
            return Ok(None);
        }

        let offset = header.data_begin.get() - length;
        set_entry_at(
            &mut bytes,
            new_index,
            &AreaDirEntry {
                offset: U32::new(offset),
                length: U32::new(length),
                used: 1,
                _pad: [0; 3],
            },
        );
        header.data_begin = U32::new(offset);
        header.entry_count = U32::new(new_index + 1);
        set_dir_header(&mut bytes, &header);

        fixed.write(0, &bytes);
        fixed.unfix(UnfixMode::Dirty);
        self.pages.flush(page_id, commit_timestamp)?;
        Ok(Some(AreaID::new(new_index)))
    }

    /// Marks an area's directory slot free without compacting the page.
    pub fn free_area(&self, page_id: PageID, area_id: AreaID, commit_timestamp: Timestamp) -> Result<()> {
        let fixed = self.pages.attach(
            page_id,
            FixMode::Write { discardable: false },
            Priority::Middle,
            commit_timestamp,
        )?;
        let mut bytes = fixed.read();
        let header = dir_header(&bytes);
        if area_id.value() >= header.entry_count.get() {
            fixed.unfix(UnfixMode::NotDirty);
            return Err(Error::DiscordAreaUseSituation(page_id, area_id));
        }

        let mut entry = entry_at(&bytes, area_id.value());
        entry.used = 0;
        set_entry_at(&mut bytes, area_id.value(), &entry);
        fixed.write(0, &bytes);
        fixed.unfix(UnfixMode::Dirty);
        self.pages.flush(page_id, commit_timestamp)
    }

    pub fn read_area(&self, page_id: PageID, area_id: AreaID, read_timestamp: Timestamp) -> Result<Vec<u8>> {
        let fixed = self.pages.attach(page_id, FixMode::ReadOnly, Priority::Middle, read_timestamp)?;
        let bytes = fixed.read();
        let header = dir_header(&bytes);
        if area_id.value() >= header.entry_count.get() {
            return Err(Error::DiscordAreaUseSituation(page_id, area_id));
        }
        let entry = entry_at(&bytes, area_id.value());
        let start = entry.offset.get() as usize;
        let len = entry.length.get() as usize;
        Ok(bytes[start..start + len].to_vec())
    }

    /// Returns every directory slot on `page_id` as
    /// `(area_id, used, offset, length)`, for `verify` to walk without
    /// needing to know this module's on-page layout.
    pub fn entries(&self, page_id: PageID, read_timestamp: Timestamp) -> Result<Vec<(AreaID, bool, u32, u32)>> {
        let fixed = self.pages.attach(page_id, FixMode::ReadOnly, Priority::Middle, read_timestamp)?;
        let bytes = fixed.read();
        let header = dir_header(&bytes);
        Ok((0..header.entry_count.get())
            .map(|index| {
                let entry = entry_at(&bytes, index);
                (AreaID::new(index), entry.used != 0, entry.offset.get(), entry.length.get())
            })
            .collect())
    }

    /// Force-marks a directory slot unused, for `verify` to repair a
    /// structurally corrupt area without touching its payload bytes.
    pub fn force_free_entry(&self, page_id: PageID, area_id: AreaID, commit_timestamp: Timestamp) -> Result<()> {
        self.free_area(page_id, area_id, commit_timestamp)
    }

    pub fn write_area(
        &self,
        page_id: PageID,
        area_id: AreaID,
        data: &[u8],
        commit_timestamp: Timestamp,
    ) -> Result<()> {
        let fixed = self.pages.attach(
            page_id,
            FixMode::Write { discardable: false },
            Priority::Middle,
            commit_timestamp,
        )?;
        let mut bytes = fixed.read();
        let header = dir_header(&bytes);
        if area_id.value() >= header.entry_count.get() {
            fixed.unfix(UnfixMode::NotDirty);
            return Err(Error::DiscordAreaUseSituation(page_id, area_id));
        }
        let entry = entry_at(&bytes, area_id.value());
        let start = entry.offset.get() as usize;
        let len = entry.length.get() as usize;
        if data.len() != len {
            fixed.unfix(UnfixMode::NotDirty);
            return Err(Error::ExistProtrusiveArea(page_id, area_id));
        }
        bytes[start..start + len].copy_from_slice(data);
        fixed.write(0, &bytes);
        fixed.unfix(UnfixMode::Dirty);
        self.pages.flush(page_id, commit_timestamp)
    }
}
