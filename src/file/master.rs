//! Master Data File: a raw contiguous page file accessed by
//! offset. No caching of its own — the Version Manager and Buffer Pool
//! own caching policy.

use super::File;
use crate::error::{Error, Result};

pub struct MasterDataFile<F> {
    file: F,
    page_size: usize,
}

impl<F: File> MasterDataFile<F> {
    pub fn open(file: F, page_size: usize) -> Self {
        MasterDataFile { file, page_size }
    }

    /// Number of whole pages currently stored.
    pub fn extent(&self) -> Result<u64> {
        Ok(self.file.len()? / self.page_size as u64)
    }

    fn check_in_range(&self, page_index: u64) -> Result<()> {
        let extent = self.extent()?;
        if page_index >= extent {
            return Err(Error::OutOfRange(page_index, extent));
        }
        Ok(())
    }

    /// Reads one page's worth of bytes into `buf`. `buf.len()` must equal
    /// the configured page size.
    pub fn read(&self, page_index: u64, buf: &mut [u8]) -> Result<()> {
        debug_assert_eq!(buf.len(), self.page_size);
        self.check_in_range(page_index)?;
        let offset = page_index * self.page_size as u64;
        let n = self.file.read_at(buf, offset)?;
        if n < buf.len() {
            buf[n..].fill(0);
        }
        Ok(())
    }

    /// Writes one page's worth of bytes, extending the file if the page
    /// index is exactly at the current extent (appends), but failing with
    /// `OutOfRange` for any index beyond that.
    pub fn write(&self, page_index: u64, buf: &[u8]) -> Result<()> {
        debug_assert_eq!(buf.len(), self.page_size);
        let extent = self.extent()?;
        if page_index > extent {
            return Err(Error::OutOfRange(page_index, extent));
        }
        let offset = page_index * self.page_size as u64;
        self.file.write_at(buf, offset)?;
        Ok(())
    }

    /// Grows the file by `n` pages, zero-filled.
    pub fn extend(&self, n: u64) -> Result<()> {
        let extent = self.extent()?;
        let new_len = (extent + n) * self.page_size as u64;
        self.file.set_len(new_len)?;
        Ok(())
    }

    /// Shrinks the file to `n` pages.
    pub fn truncate(&self, n: u64) -> Result<()> {
        self.file.set_len(n * self.page_size as u64)?;
        Ok(())
    }

    pub fn sync(&self) -> Result<()> {
        self.file.sync_data()
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::file::MemoryFile;

    fn master(page_size: usize) -> MasterDataFile<MemoryFile> {
        MasterDataFile::open(MemoryFile::new(), page_size)
    }

    #[test]
    fn extend_then_write_then_read() {
        let m = master(16);
        m.extend(2).unwrap();
        assert_eq!(m.extent().unwrap(), 2);

        m.write(1, &[7; 16]).unwrap();
        let mut buf = [0u8; 16];
        m.read(1, &mut buf).unwrap();
        assert_eq!(buf, [7; 16]);
    }

    #[test]
    fn read_out_of_range_fails() {
        let m = master(16);
        m.extend(1).unwrap();
        let mut buf = [0u8; 16];
        assert!(matches!(m.read(5, &mut buf), Err(Error::OutOfRange(5, 1))));
    }

    #[test]
    fn write_beyond_extent_fails() {
        let m = master(16);
        m.extend(1).unwrap();
        assert!(matches!(
            m.write(5, &[0; 16]),
            Err(Error::OutOfRange(5, 1))
        ));
    }

    #[test]
    fn truncate_shrinks_extent() {
        let m = master(16);
        m.extend(4).unwrap();
        m.truncate(1).unwrap();
        assert_eq!(m.extent().unwrap(), 1);
    }
}
