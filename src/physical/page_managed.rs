//! `FileKind::PageManaged`: a flat sequence of whole pages with no
//! internal structure beyond a free list threaded through freed pages'
//! own bytes, matching `original_source/`'s `PageManageFile` (the
//! simplest of the three allocator variants it implements).

use std::sync::Arc;

use zerocopy::little_endian::U64;

use crate::buffer::{BufferPool, Fixed};
use crate::error::{Error, Result};
use crate::file::File;
use crate::ids::{FixMode, PageID, Priority, Timestamp, UnfixMode};

use super::header::{FileKind, HeaderPage};
use super::FileHandle;

pub struct PageManagedFile<F> {
    pool: Arc<BufferPool<F>>,
    file: FileHandle,
}

impl<F: File> PageManagedFile<F> {
    /// Formats a freshly registered, empty file with a page-managed
    /// header at page 0.
    pub fn create(pool: Arc<BufferPool<F>>, file: FileHandle) -> Result<Self> {
        Self::create_with_kind(pool, file, FileKind::PageManaged)
    }

    /// Formats a freshly registered, empty file, tagging its header with
    /// `kind`. Used by `AreaManagedFile`/`DirectAreaFile`, which build on
    /// top of this same page-allocation substrate but write their own
    /// `FileKind` tag.
    pub(crate) fn create_with_kind(
        pool: Arc<BufferPool<F>>,
        file: FileHandle,
        kind: FileKind,
    ) -> Result<Self> {
        let header = HeaderPage::new(kind);
        let page_size = pool.page_size();
        let fixed = pool.fix(
            file,
            PageID::new(0),
            FixMode::Allocate,
            Priority::High,
            Timestamp::ZERO,
        )?;
        let mut bytes = vec![0u8; page_size];
        header.encode_into(&mut bytes);
        fixed.write(0, &bytes);
        fixed.unfix(UnfixMode::Dirty);
        pool.flush(file, PageID::new(0), Timestamp::ZERO)?;

        Ok(PageManagedFile { pool, file })
    }

    /// Opens an already-formatted page-managed file.
    pub fn open(pool: Arc<BufferPool<F>>, file: FileHandle, read_timestamp: Timestamp) -> Result<Self> {
        Self::open_with_kind(pool, file, read_timestamp, FileKind::PageManaged)
    }

    pub(crate) fn open_with_kind(
        pool: Arc<BufferPool<F>>,
        file: FileHandle,
        read_timestamp: Timestamp,
        kind: FileKind,
    ) -> Result<Self> {
        let fixed = pool.fix(
            file,
            PageID::new(0),
            FixMode::ReadOnly,
            Priority::High,
            read_timestamp,
        )?;
        let header = HeaderPage::decode(&fixed.read())?;
        if FileKind::from_tag(header.kind) != Some(kind) {
            return Err(Error::CanNotFixHeaderPage);
        }
        drop(fixed);
        Ok(PageManagedFile { pool, file })
    }

    pub fn page_size(&self) -> usize {
        self.pool.page_size()
    }

    pub(crate) fn read_header(&self, read_timestamp: Timestamp) -> Result<HeaderPage> {
        let fixed = self.pool.fix(
            self.file,
            PageID::new(0),
            FixMode::ReadOnly,
            Priority::High,
            read_timestamp,
        )?;
        HeaderPage::decode(&fixed.read())
    }

    pub(crate) fn write_header(&self, header: &HeaderPage, commit_timestamp: Timestamp) -> Result<()> {
        let fixed = self.pool.fix(
            self.file,
            PageID::new(0),
            FixMode::Write { discardable: false },
            Priority::High,
            commit_timestamp,
        )?;
        let mut bytes = fixed.read();
        header.encode_into(&mut bytes);
        fixed.write(0, &bytes);
        fixed.unfix(UnfixMode::Dirty);
        self.pool.flush(self.file, PageID::new(0), commit_timestamp)
    }

    pub fn page_count(&self, read_timestamp: Timestamp) -> Result<u64> {
        Ok(self.read_header(read_timestamp)?.page_count.get())
    }

    /// Allocates a page, preferring a freed page off the free list over
    /// growing the file.
    pub fn allocate_page(&self, commit_timestamp: Timestamp) -> Result<PageID> {
        let mut header = self.read_header(commit_timestamp)?;

        let page_id = if header.free_list_head.get() != u64::MAX {
            let reused = PageID::new(header.free_list_head.get());
            let fixed = self.pool.fix(
                self.file,
                reused,
                FixMode::ReadOnly,
                Priority::Middle,
                commit_timestamp,
            )?;
            let next = u64::from_le_bytes(fixed.read()[0..8].try_into().unwrap());
            header.free_list_head = U64::new(next);
            reused
        } else {
            let id = PageID::new(header.page_count.get());
            header.page_count = U64::new(header.page_count.get() + 1);
            id
        };

        self.write_header(&header, commit_timestamp)?;

        let fixed = self.pool.fix(
            self.file,
            page_id,
            FixMode::Allocate,
            Priority::Middle,
            commit_timestamp,
        )?;
        fixed.clear(0);
        fixed.unfix(UnfixMode::Dirty);
        self.pool.flush(self.file, page_id, commit_timestamp)?;

        Ok(page_id)
    }

    /// Returns a page to the free list, threading it onto the previous
    /// head via the page's own first eight bytes.
    pub fn free_page(&self, page_id: PageID, commit_timestamp: Timestamp) -> Result<()> {
        let mut header = self.read_header(commit_timestamp)?;

        let fixed = self.pool.fix(
            self.file,
            page_id,
            FixMode::Write { discardable: false },
            Priority::Middle,
            commit_timestamp,
        )?;
        fixed.write(0, &header.free_list_head.get().to_le_bytes());
        fixed.unfix(UnfixMode::Dirty);
        self.pool.flush(self.file, page_id, commit_timestamp)?;

        header.free_list_head = U64::new(page_id.value());
        self.write_header(&header, commit_timestamp)
    }

    /// The page-managed free list's head, or `PageID::UNDEFINED` if empty.
    pub fn free_list_head(&self, read_timestamp: Timestamp) -> Result<PageID> {
        let head = self.read_header(read_timestamp)?.free_list_head.get();
        Ok(if head == u64::MAX { PageID::UNDEFINED } else { PageID::new(head) })
    }

    /// The next entry in the free list chain starting at `page_id`.
    pub fn next_free(&self, page_id: PageID, read_timestamp: Timestamp) -> Result<PageID> {
        let fixed = self.pool.fix(
            self.file,
            page_id,
            FixMode::ReadOnly,
            Priority::Middle,
            read_timestamp,
        )?;
        let next = u64::from_le_bytes(fixed.read()[0..8].try_into().unwrap());
        Ok(if next == u64::MAX { PageID::UNDEFINED } else { PageID::new(next) })
    }

    /// Fixes a user page through the underlying Buffer Pool.
    pub fn attach(
        &self,
        page_id: PageID,
        fix_mode: FixMode,
        priority: Priority,
        read_timestamp: Timestamp,
    ) -> Result<Fixed<'_, F>> {
        self.pool.fix(self.file, page_id, fix_mode, priority, read_timestamp)
    }

    pub fn flush(&self, page_id: PageID, commit_timestamp: Timestamp) -> Result<()> {
        self.pool.flush(self.file, page_id, commit_timestamp)
    }
}
