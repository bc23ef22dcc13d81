//! Sync Log: a pre-image file that makes the fold-back of a committed
//! version from the Version Log into the Master Data File crash-safe.
//!
//! On-disk record shapes:
//! ```text
//! pre-image: u8 phase; u32 pageID; u32 crcOld; bytes[pageSize]
//! done:      u8=done;  u32 pageID
//! ```

use crate::error::{Error, Result};
use crate::file::File;
use crate::ids::PageID;

const PHASE_PRE_IMAGE: u8 = 0;
const PHASE_DONE: u8 = 1;

pub enum SyncLogEntry {
    PreImage {
        page_id: PageID,
        crc_old: u32,
        payload: Vec<u8>,
    },
    Done {
        page_id: PageID,
    },
}

pub struct SyncLog<F> {
    file: F,
    next_offset: u64,
    page_size: usize,
}

impl<F: File> SyncLog<F> {
    pub fn open(file: F, page_size: usize) -> Result<Self> {
        let next_offset = file.len()?;
        Ok(SyncLog {
            file,
            next_offset,
            page_size,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.next_offset == 0
    }

    /// Writes the pre-image of a page about to be overwritten in Master
    /// Data, then flushes (fold-back step 1).
    pub fn write_pre_image(&mut self, page_id: PageID, old_contents: &[u8]) -> Result<()> {
        let crc_old = crc32fast::hash(old_contents);

        let mut buf = Vec::with_capacity(1 + 4 + 4 + old_contents.len());
        buf.push(PHASE_PRE_IMAGE);
        buf.extend_from_slice(&(page_id.value() as u32).to_le_bytes());
        buf.extend_from_slice(&crc_old.to_le_bytes());
        buf.extend_from_slice(old_contents);

        self.file.write_at(&buf, self.next_offset)?;
        self.next_offset += buf.len() as u64;
        self.file.sync_data()?;

        Ok(())
    }

    /// Appends the "sync complete" marker (fold-back step 4).
    pub fn write_done(&mut self, page_id: PageID) -> Result<()> {
        let mut buf = [0u8; 5];
        buf[0] = PHASE_DONE;
        buf[1..5].copy_from_slice(&(page_id.value() as u32).to_le_bytes());

        self.file.write_at(&buf, self.next_offset)?;
        self.next_offset += buf.len() as u64;
        self.file.sync_data()?;

        Ok(())
    }

    /// Scans the whole log in order, used both by recovery and by tests
    /// that want to assert on its contents.
    pub fn scan(&self) -> Result<Vec<SyncLogEntry>> {
        let mut out = Vec::new();
        let mut offset = 0u64;
        let len = self.file.len()?;

        while offset < len {
            let mut phase_buf = [0u8; 1];
            self.file.read_at(&mut phase_buf, offset)?;

            match phase_buf[0] {
                PHASE_PRE_IMAGE => {
                    let mut head = [0u8; 8];
                    self.file.read_at(&mut head, offset + 1)?;
                    let page_id = u32::from_le_bytes(head[0..4].try_into().unwrap());
                    let crc_old = u32::from_le_bytes(head[4..8].try_into().unwrap());

                    let mut payload = vec![0u8; self.page_size];
                    self.file.read_at(&mut payload, offset + 9)?;

                    out.push(SyncLogEntry::PreImage {
                        page_id: PageID::new(page_id as u64),
                        crc_old,
                        payload,
                    });
                    offset += 9 + self.page_size as u64;
                }
                PHASE_DONE => {
                    let mut page_buf = [0u8; 4];
                    self.file.read_at(&mut page_buf, offset + 1)?;
                    let page_id = u32::from_le_bytes(page_buf);

                    out.push(SyncLogEntry::Done {
                        page_id: PageID::new(page_id as u64),
                    });
                    offset += 5;
                }
                other => return Err(Error::PhysicalLogIDInconsistent(other as u64)),
            }
        }

        Ok(out)
    }

    /// Clears the log (after all entries have been folded back and the
    /// checkpoint executor has confirmed durability).
    pub fn truncate(&mut self) -> Result<()> {
        self.file.set_len(0)?;
        self.next_offset = 0;
        Ok(())
    }
}

/// Pairs up pre-image entries with their matching "done" marker, per page
/// id, so recovery can tell which pre-images still need restoring. Pairs
/// in log order rather than by set membership: a `Done` only closes out
/// the oldest still-open pre-image for its page, so a pre-image from a
/// fold-back that never completed stays pending even if that same page
/// completed an earlier fold-back (and so has a `Done` somewhere before
/// it in the log).
pub fn pending_restores(entries: &[SyncLogEntry]) -> Vec<(PageID, u32, Vec<u8>)> {
    use std::collections::{HashMap, VecDeque};

    let mut open: HashMap<PageID, VecDeque<(u32, Vec<u8>)>> = HashMap::new();

    for entry in entries {
        match entry {
            SyncLogEntry::PreImage {
                page_id,
                crc_old,
                payload,
            } => {
                open.entry(*page_id).or_default().push_back((*crc_old, payload.clone()));
            }
            SyncLogEntry::Done { page_id } => {
                if let Some(queue) = open.get_mut(page_id) {
                    queue.pop_front();
                }
            }
        }
    }

    open.into_iter()
        .flat_map(|(page_id, queue)| {
            queue
                .into_iter()
                .map(move |(crc_old, payload)| (page_id, crc_old, payload))
        })
        .collect()
}
