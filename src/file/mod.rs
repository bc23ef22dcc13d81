//! File abstraction shared by the Master Data File, Version Log and Sync
//! Log: a `len`/`read_at`/`write_at`/`sync_data` core plus
//! `extend`/`truncate` for the Master Data File's page-count management.

pub mod master;

use crate::error::Result;

/// Raw byte-addressable file. No caching of its own — every layer above
/// this (Version Manager, Buffer Pool) is responsible for its own
/// caching policy.
pub trait File: Send + Sync {
    fn len(&self) -> Result<u64>;
    fn read_at(&self, buf: &mut [u8], offset: u64) -> Result<usize>;
    fn write_at(&self, buf: &[u8], offset: u64) -> Result<usize>;
    fn sync_data(&self) -> Result<()>;
    fn set_len(&self, len: u64) -> Result<()>;
}

/// `std::fs::File`-backed implementation used in production.
#[derive(Debug)]
pub struct OsFile {
    inner: std::fs::File,
}

impl OsFile {
    pub fn open(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let inner = std::fs::OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(path)?;
        Ok(OsFile { inner })
    }
}

impl File for OsFile {
    fn len(&self) -> Result<u64> {
        Ok(self.inner.metadata()?.len())
    }

    fn read_at(&self, buf: &mut [u8], offset: u64) -> Result<usize> {
        use std::os::unix::fs::FileExt;
        Ok(self.inner.read_at(buf, offset)?)
    }

    fn write_at(&self, buf: &[u8], offset: u64) -> Result<usize> {
        use std::os::unix::fs::FileExt;
        self.inner.write_at(buf, offset)?;
        Ok(buf.len())
    }

    fn sync_data(&self) -> Result<()> {
        Ok(self.inner.sync_data()?)
    }

    fn set_len(&self, len: u64) -> Result<()> {
        Ok(self.inner.set_len(len)?)
    }
}

/// In-memory `File` test double, backed by `Arc<Mutex<..>>` rather than
/// `Rc<RefCell<..>>` so it satisfies `File: Send + Sync`, required once
/// the Buffer Pool fixes pages from more than one thread.
#[derive(Clone, Default, Debug)]
pub struct MemoryFile {
    data: std::sync::Arc<parking_lot::Mutex<Vec<u8>>>,
}

impl MemoryFile {
    pub fn new() -> Self {
        MemoryFile::default()
    }
}

impl File for MemoryFile {
    fn len(&self) -> Result<u64> {
        Ok(self.data.lock().len() as u64)
    }

    fn read_at(&self, buf: &mut [u8], offset: u64) -> Result<usize> {
        let data = self.data.lock();
        let offset = offset as usize;

        if offset >= data.len() {
            buf.fill(0);
            return Ok(0);
        }

        let available = data.len() - offset;
        let to_read = buf.len().min(available);
        buf[..to_read].copy_from_slice(&data[offset..offset + to_read]);
        if to_read < buf.len() {
            buf[to_read..].fill(0);
        }
        Ok(to_read)
    }

    fn write_at(&self, buf: &[u8], offset: u64) -> Result<usize> {
        let mut data = self.data.lock();
        let offset = offset as usize;

        if offset + buf.len() > data.len() {
            data.resize(offset + buf.len(), 0);
        }
        data[offset..offset + buf.len()].copy_from_slice(buf);
        Ok(buf.len())
    }

    fn sync_data(&self) -> Result<()> {
        Ok(())
    }

    fn set_len(&self, len: u64) -> Result<()> {
        self.data.lock().resize(len as usize, 0);
        Ok(())
    }
}
