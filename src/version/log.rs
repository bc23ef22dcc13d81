//! On-disk Version Log Block format:
//!
//! ```text
//! u32 len; u64 timestamp; u32 pageID; u64 prevLSN; u32 crc; bytes[pageSize]
//! ```
//!
//! All fields little-endian, laid out with `zerocopy::little_endian`
//! integers in a `#[repr(C)]` struct.

use zerocopy::little_endian::{U32, U64};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

use crate::error::{Error, Result};
use crate::file::File;
use crate::ids::{PageID, Timestamp};

pub const HEADER_SIZE: usize = std::mem::size_of::<BlockHeader>();

#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned)]
#[repr(C)]
pub struct BlockHeader {
    pub len: U32,
    pub timestamp: U64,
    pub page_id: U64,
    pub prev_lsn: U64,
    pub crc: U32,
}

/// Log Sequence Number: byte offset of a block within the version log
/// file. `INVALID` (`u64::MAX`) terminates a backward chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Lsn(pub u64);

impl Lsn {
    pub const INVALID: Lsn = Lsn(u64::MAX);

    pub fn is_valid(self) -> bool {
        self != Self::INVALID
    }
}

pub struct VersionBlock {
    pub page_id: PageID,
    pub timestamp: Timestamp,
    pub prev_lsn: Lsn,
    pub payload: Vec<u8>,
}

/// Append-only writer/reader over the Version Log file.
pub struct VersionLog<F> {
    file: F,
    next_offset: u64,
}

impl<F: File> VersionLog<F> {
    pub fn open(file: F) -> Result<Self> {
        let next_offset = file.len()?;
        Ok(VersionLog { file, next_offset })
    }

    /// Appends a new block, returning its LSN.
    pub fn append(
        &mut self,
        page_id: PageID,
        timestamp: Timestamp,
        prev_lsn: Lsn,
        payload: &[u8],
    ) -> Result<Lsn> {
        let crc = crc32fast::hash(payload);
        let header = BlockHeader {
            len: U32::from(payload.len() as u32),
            timestamp: U64::from(timestamp.value()),
            page_id: U64::from(page_id.value()),
            prev_lsn: U64::from(prev_lsn.0),
            crc: U32::from(crc),
        };

        let offset = self.next_offset;
        self.file.write_at(header.as_bytes(), offset)?;
        self.file
            .write_at(payload, offset + HEADER_SIZE as u64)?;

        self.next_offset = offset + HEADER_SIZE as u64 + payload.len() as u64;
        Ok(Lsn(offset))
    }

    pub fn read(&self, lsn: Lsn, page_size: usize) -> Result<VersionBlock> {
        if !lsn.is_valid() {
            return Err(Error::VersionLogIDInconsistent(lsn.0));
        }

        let mut header_buf = [0u8; HEADER_SIZE];
        self.file.read_at(&mut header_buf, lsn.0)?;
        let header =
            BlockHeader::read_from_bytes(&header_buf).map_err(|_| Error::VersionLogIDInconsistent(lsn.0))?;

        let len = header.len.get() as usize;
        let mut payload = vec![0u8; len.max(page_size)];
        payload.truncate(len);
        self.file
            .read_at(&mut payload, lsn.0 + HEADER_SIZE as u64)?;

        let crc = crc32fast::hash(&payload);
        if crc != header.crc.get() {
            return Err(Error::ChecksumMismatch {
                expected: header.crc.get(),
                computed: crc,
            });
        }

        Ok(VersionBlock {
            page_id: PageID::new(header.page_id.get()),
            timestamp: Timestamp::new(header.timestamp.get()),
            prev_lsn: Lsn(header.prev_lsn.get()),
            payload,
        })
    }

    pub fn sync(&self) -> Result<()> {
        self.file.sync_data()
    }

    /// Scans every block from the beginning of the file, in on-disk
    /// order, for recovery's index rebuild.
    pub fn scan_all(&self, page_size: usize) -> Result<Vec<(Lsn, VersionBlock)>> {
        let mut out = Vec::new();
        let mut offset = 0u64;
        let len = self.file.len()?;

        while offset < len {
            let lsn = Lsn(offset);
            let block = self.read(lsn, page_size)?;
            offset += HEADER_SIZE as u64 + block.payload.len() as u64;
            out.push((lsn, block));
        }

        Ok(out)
    }
}
