//! The fixed header occupying page 0 of every Physical File, identifying
//! which allocator variant (`FileKind`) owns the rest of the file and
//! carrying that variant's bookkeeping.
//!
//! Laid out with `zerocopy` exactly the way `pager/page.rs` lays out its
//! `PageHeader`: a `#[repr(C)]` struct of little-endian fields, cast
//! directly over a page-sized byte buffer with no intermediate copy.

use zerocopy::little_endian::{U32, U64};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

pub const MAGIC: u32 = 0x5359_4446; // "SYDF"

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum FileKind {
    PageManaged = 0,
    AreaManaged = 1,
    DirectArea = 2,
}

impl FileKind {
    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(FileKind::PageManaged),
            1 => Some(FileKind::AreaManaged),
            2 => Some(FileKind::DirectArea),
            _ => None,
        }
    }
}

#[derive(FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned, Debug, Clone, Copy)]
#[repr(C)]
pub struct HeaderPage {
    pub magic: U32,
    pub kind: u8,
    _reserved: [u8; 3],
    /// Total page count including the header page itself.
    pub page_count: U64,
    /// Head of the page-managed free list, or `PageID::UNDEFINED`'s raw
    /// value when empty.
    pub free_list_head: U64,
    /// For `DirectArea`: number of directory pages immediately following
    /// the header. Unused by the other two kinds.
    pub directory_page_count: U64,
    /// For `DirectArea`: number of area slots recorded in the directory.
    pub area_count: U64,
    /// For `DirectArea`: the next never-yet-used global slot index.
    /// Unused by the other two kinds.
    pub next_cursor: U64,
}

impl HeaderPage {
    pub fn new(kind: FileKind) -> Self {
        HeaderPage {
            magic: U32::new(MAGIC),
            kind: kind as u8,
            _reserved: [0; 3],
            page_count: U64::new(1),
            free_list_head: U64::new(u64::MAX),
            directory_page_count: U64::new(0),
            area_count: U64::new(0),
            next_cursor: U64::new(0),
        }
    }

    pub fn decode(bytes: &[u8]) -> crate::error::Result<Self> {
        let size = std::mem::size_of::<HeaderPage>();
        let header = HeaderPage::read_from_bytes(&bytes[..size])
            .map_err(|_| crate::error::Error::CanNotFixHeaderPage)?;
        if header.magic.get() != MAGIC {
            return Err(crate::error::Error::CanNotFixHeaderPage);
        }
        Ok(header)
    }

    pub fn encode_into(&self, bytes: &mut [u8]) {
        bytes[..std::mem::size_of::<HeaderPage>()].copy_from_slice(self.as_bytes());
    }
}
