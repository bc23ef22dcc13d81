//! Page Wrapper: the ref-counted, affine handle index drivers actually
//! hold — thin enough to copy around by value inside a driver's call
//! stack, but never across threads without going through
//! `SharedPageRef` first.
//!
//! A cheap wrapper that derefs to the underlying bytes and whose `Drop`
//! releases the pin, built on the fix-mode-aware RAII contract the
//! Buffer Pool exposes via `buffer::Fixed`.

use std::sync::Arc;

use crate::buffer::{BufferPool, Fixed};
use crate::error::Result;
use crate::file::File;
use crate::ids::{FixMode, PageID, Priority, Timestamp, UnfixMode};
use crate::physical::FileHandle;

/// A pinned page, held by exactly one driver call stack at a time.
///
/// `PageHandle` does not implement `Clone`: a second reference to the
/// same page is a second `fix`, not a second owner of this one. Moving a
/// page across threads requires `into_shared`, which hands the pin to an
/// `Arc` the caller is responsible for not fixing twice concurrently
/// under incompatible modes.
pub struct PageHandle<'a, F: File> {
    fixed: Fixed<'a, F>,
    explicit_dirty: bool,
}

impl<'a, F: File> PageHandle<'a, F> {
    pub fn new(fixed: Fixed<'a, F>) -> Self {
        PageHandle {
            fixed,
            explicit_dirty: false,
        }
    }

    pub fn page_id(&self) -> PageID {
        self.fixed.page_id()
    }

    pub fn fix_mode(&self) -> FixMode {
        self.fixed.fix_mode()
    }

    /// Returns a private copy of the page's current bytes.
    ///
    /// Debug builds assert the page was actually fixed for reading or
    /// writing — calling this on a page fixed `Allocate` before its first
    /// `write`/`clear` would observe undefined zero-filled content, which
    /// is legal but usually a driver bug.
    pub fn buffer(&self) -> Vec<u8> {
        self.fixed.read()
    }

    /// Overwrites `data` at `offset`. Panics in debug builds if the page
    /// was not fixed under a write-family `FixMode`.
    pub fn buffer_mut(&mut self, offset: usize, data: &[u8]) {
        debug_assert!(
            self.fix_mode().is_write(),
            "buffer_mut called on a page fixed ReadOnly"
        );
        self.fixed.write(offset, data);
        self.explicit_dirty = true;
    }

    pub fn clear(&mut self, byte: u8) {
        debug_assert!(self.fix_mode().is_write(), "clear called on a page fixed ReadOnly");
        self.fixed.clear(byte);
        self.explicit_dirty = true;
    }

    /// True if this handle has been written to since it was fixed.
    pub fn dirty(&self) -> bool {
        self.explicit_dirty
    }

    /// Releases the pin, letting the Buffer Pool infer dirtiness from the
    /// `FixMode` the page was fixed under.
    pub fn unfix(self) {
        let mode = if self.explicit_dirty {
            UnfixMode::Dirty
        } else {
            UnfixMode::Omit
        };
        self.fixed.unfix(mode);
    }
}

/// Promotes a `PageHandle` to a form that can cross a thread boundary —
/// used by drivers handing a page off to a background writer once they
/// are done mutating it locally.
pub struct SharedPageRef<F> {
    pool: Arc<BufferPool<F>>,
    file: FileHandle,
    page_id: PageID,
}

impl<F: File> SharedPageRef<F> {
    pub fn new(pool: Arc<BufferPool<F>>, file: FileHandle, page_id: PageID) -> Self {
        SharedPageRef { pool, file, page_id }
    }

    /// Re-fixes the page on whichever thread calls this, yielding a fresh
    /// affine `PageHandle`.
    pub fn fix(&self, fix_mode: FixMode, priority: Priority, read_timestamp: Timestamp) -> Result<PageHandle<'_, F>> {
        let fixed = self.pool.fix(self.file, self.page_id, fix_mode, priority, read_timestamp)?;
        Ok(PageHandle::new(fixed))
    }
}
