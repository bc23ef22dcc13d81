//! Transaction identity and the on-disk open convention: every logical
//! file is really three physical files sharing a stem —
//! `<stem>.master`, `<stem>.vlog`, `<stem>.slog` — plus, for files an
//! index driver builds on top of, a `<stem>.idx` that this crate reserves
//! the name for but does not itself parse (driver internals are out of
//! scope here).

use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::buffer::BufferPool;
use crate::error::Result;
use crate::file::{File, OsFile};
use crate::ids::{Timestamp, TimestampClock};
use crate::physical::{AreaManagedFile, DirectAreaFile, FileKind, PageManagedFile};
use crate::version::VersionManager;

/// Identifies one logical transaction across every file it touches.
pub trait Transaction {
    fn id(&self) -> u64;
    fn read_timestamp(&self) -> Timestamp;
    fn commit_timestamp(&self) -> Option<Timestamp>;
    fn is_read_only(&self) -> bool;
}

#[derive(Debug, Default)]
pub struct TransactionIdAllocator(AtomicU64);

impl TransactionIdAllocator {
    pub fn next(&self) -> u64 {
        self.0.fetch_add(1, Ordering::Relaxed)
    }
}

/// A straightforward snapshot-isolated transaction: born with a read
/// timestamp fixed at `begin`, assigned a commit timestamp only if and
/// when it actually commits.
pub struct SimpleTransaction {
    id: u64,
    read_timestamp: Timestamp,
    commit_timestamp: Option<Timestamp>,
    read_only: bool,
}

impl SimpleTransaction {
    pub fn begin(ids: &TransactionIdAllocator, clock: &TimestampClock, read_only: bool) -> Self {
        SimpleTransaction {
            id: ids.next(),
            read_timestamp: clock.current(),
            commit_timestamp: None,
            read_only,
        }
    }

    /// Mints and records this transaction's commit timestamp. Panics if
    /// called on a transaction opened read-only, or more than once.
    pub fn commit(&mut self, clock: &TimestampClock) -> Timestamp {
        assert!(!self.read_only, "a read-only transaction cannot commit a write");
        assert!(self.commit_timestamp.is_none(), "commit called twice");
        let ts = clock.tick();
        self.commit_timestamp = Some(ts);
        ts
    }
}

impl Transaction for SimpleTransaction {
    fn id(&self) -> u64 {
        self.id
    }

    fn read_timestamp(&self) -> Timestamp {
        self.read_timestamp
    }

    fn commit_timestamp(&self) -> Option<Timestamp> {
        self.commit_timestamp
    }

    fn is_read_only(&self) -> bool {
        self.read_only
    }
}

/// One opened logical file, already dispatched to its `FileKind`'s
/// allocator.
pub enum OpenedFile<F> {
    PageManaged(PageManagedFile<F>),
    AreaManaged(AreaManagedFile<F>),
    DirectArea(DirectAreaFile<F>),
}

/// Default slot size for a freshly created `DirectArea` file absent any
/// caller-specified value — an eighth of the page, matching the smallest
/// node-pointer-sized records index drivers tend to pack into such files.
fn default_slot_size(page_size: usize) -> u32 {
    (page_size / 8).max(8) as u32
}

/// Opens (creating on first use) the `.master`/`.vlog`/`.slog` triple for
/// `stem` under `directory`, registers it with `pool`, and returns the
/// allocator matching `kind`.
pub fn open(
    pool: Arc<BufferPool<OsFile>>,
    directory: &Path,
    stem: &str,
    kind: FileKind,
    page_size: usize,
    read_timestamp: Timestamp,
) -> Result<OpenedFile<OsFile>> {
    let master = OsFile::open(directory.join(format!("{stem}.master")))?;
    let vlog = OsFile::open(directory.join(format!("{stem}.vlog")))?;
    let slog = OsFile::open(directory.join(format!("{stem}.slog")))?;
    let fresh = master.len()? == 0;

    let vm = VersionManager::recover(master, vlog, slog, page_size)?;
    let file = pool.register_file(vm);

    Ok(if fresh {
        match kind {
            FileKind::PageManaged => OpenedFile::PageManaged(PageManagedFile::create(pool, file)?),
            FileKind::AreaManaged => OpenedFile::AreaManaged(AreaManagedFile::create(pool, file)?),
            FileKind::DirectArea => {
                OpenedFile::DirectArea(DirectAreaFile::create(pool, file, default_slot_size(page_size))?)
            }
        }
    } else {
        match kind {
            FileKind::PageManaged => OpenedFile::PageManaged(PageManagedFile::open(pool, file, read_timestamp)?),
            FileKind::AreaManaged => OpenedFile::AreaManaged(AreaManagedFile::open(pool, file, read_timestamp)?),
            FileKind::DirectArea => OpenedFile::DirectArea(DirectAreaFile::open(pool, file, read_timestamp)?),
        }
    })
}
