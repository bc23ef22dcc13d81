//! Version Manager: the illusion of per-transaction page snapshots over
//! a Master Data File, a Version Log and a Sync Log.
//!
//! Keeps a `page_table: HashMap<LogicalPageId, BTreeMap<Version,
//! PhysicalPageId>>`-shaped index per file, but resolves a version to an
//! appended, checksummed log block rather than to another physical page.

pub mod log;
pub mod synclog;

use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::error::{Error, Result};
use crate::file::master::MasterDataFile;
use crate::file::File;
use crate::ids::{PageID, Timestamp, TimestampClock};

use log::{Lsn, VersionLog};
use synclog::{pending_restores, SyncLog};

/// Tunable policy for when `sync` may reclaim a version-log block, since
/// fold-back and long-lived readers are in tension. `StallReclamation`
/// is the default: a log block newer than the oldest active reader is
/// never folded back or discarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetentionPolicy {
    StallReclamation,
    /// Keep the `n` newest blocks per page regardless of readers, purely
    /// as a cap on version-log growth. Exposed for embedders that would
    /// rather bound disk usage than stall forever behind a long reader.
    KeepNewest(usize),
}

pub struct VersionManager<F> {
    master: MasterDataFile<F>,
    vlog: VersionLog<F>,
    slog: SyncLog<F>,
    index: HashMap<PageID, BTreeMap<Timestamp, Lsn>>,
    active_readers: BTreeSet<Timestamp>,
    clock: TimestampClock,
    page_size: usize,
    retention: RetentionPolicy,
}

impl<F: File> VersionManager<F> {
    /// Opens (and recovers) a `VersionManager` over already-opened
    /// master/version-log/sync-log files.
    pub fn recover(master_file: F, vlog_file: F, slog_file: F, page_size: usize) -> Result<Self> {
        let master = MasterDataFile::open(master_file, page_size);
        let mut vlog = VersionLog::open(vlog_file)?;
        let mut slog = SyncLog::open(slog_file, page_size)?;

        // Step 1: scan Sync Log, restore any unfinished pre-image.
        let entries = slog.scan()?;
        for (page_id, _crc_old, payload) in pending_restores(&entries) {
            let page_index = page_id.value();
            if page_index >= master.extent()? {
                master.extend(page_index - master.extent()? + 1)?;
            }
            master.write(page_index, &payload)?;
        }
        master.sync()?;
        slog.truncate()?;

        // Step 2: rebuild the in-memory version index from the Version Log.
        let mut index: HashMap<PageID, BTreeMap<Timestamp, Lsn>> = HashMap::new();
        let mut max_timestamp = Timestamp::ZERO;
        for (lsn, block) in vlog.scan_all(page_size)? {
            if block.page_id.value() >= master.extent()? + 1_000_000 {
                // A version log entry naming a page far beyond any plausible
                // extent indicates index corruption rather than a page that
                // simply hasn't been folded back yet.
                return Err(Error::VersionPageCountInconsistent {
                    logged: block.page_id.value(),
                    extent: master.extent()?,
                });
            }
            index
                .entry(block.page_id)
                .or_insert_with(BTreeMap::new)
                .insert(block.timestamp, lsn);
            if block.timestamp > max_timestamp {
                max_timestamp = block.timestamp;
            }
        }

        let _ = &mut vlog; // kept mutable for symmetry with append() call sites

        Ok(VersionManager {
            master,
            vlog,
            slog,
            index,
            active_readers: BTreeSet::new(),
            clock: TimestampClock::new(max_timestamp),
            page_size,
            retention: RetentionPolicy::StallReclamation,
        })
    }

    pub fn set_retention_policy(&mut self, policy: RetentionPolicy) {
        self.retention = policy;
    }

    pub fn clock(&self) -> &TimestampClock {
        &self.clock
    }

    /// Registers a transaction's read timestamp as "active", so `sync`
    /// will not reclaim blocks it might still need.
    pub fn begin_read(&mut self, ts: Timestamp) {
        self.active_readers.insert(ts);
    }

    pub fn end_read(&mut self, ts: Timestamp) {
        self.active_readers.remove(&ts);
    }

    fn oldest_active_reader(&self) -> Option<Timestamp> {
        self.active_readers.iter().next().copied()
    }

    /// Returns the payload of `page_id` at `read_timestamp`: the version
    /// log block with the largest commit timestamp <= `read_timestamp`,
    /// else the master data block.
    pub fn fetch(&self, page_id: PageID, read_timestamp: Timestamp) -> Result<Vec<u8>> {
        if let Some(versions) = self.index.get(&page_id) {
            if let Some((_, lsn)) = versions.range(..=read_timestamp).next_back() {
                let block = self.vlog.read(*lsn, self.page_size)?;
                return Ok(block.payload);
            }
        }

        let extent = self.master.extent()?;
        if page_id.value() >= extent {
            return Err(Error::NotManagePage(page_id));
        }

        let mut buf = vec![0u8; self.page_size];
        self.master.read(page_id.value(), &mut buf)?;
        Ok(buf)
    }

    /// Appends a new committed version of `page_id`, returning its LSN.
    /// Enforces that commit timestamps for one page are strictly
    /// increasing.
    pub fn write_version(
        &mut self,
        page_id: PageID,
        write_timestamp: Timestamp,
        bytes: &[u8],
    ) -> Result<Lsn> {
        debug_assert_eq!(bytes.len(), self.page_size);

        let versions = self.index.entry(page_id).or_insert_with(BTreeMap::new);
        let prev_lsn = versions
            .iter()
            .next_back()
            .map(|(prev_ts, lsn)| {
                if write_timestamp <= *prev_ts {
                    Err(Error::OlderTimestampInconsistent {
                        page: page_id,
                        new: write_timestamp.value(),
                        previous: prev_ts.value(),
                    })
                } else {
                    Ok(*lsn)
                }
            })
            .transpose()?
            .unwrap_or(Lsn::INVALID);

        let lsn = self.vlog.append(page_id, write_timestamp, prev_lsn, bytes)?;
        self.index
            .get_mut(&page_id)
            .unwrap()
            .insert(write_timestamp, lsn);

        Ok(lsn)
    }

    /// Background fold-back: moves `page_id`'s oldest-eligible committed
    /// version log block into Master Data and reclaims it. A no-op if no
    /// block is eligible under the configured `RetentionPolicy`.
    pub fn sync(&mut self, page_id: PageID) -> Result<()> {
        let versions = match self.index.get(&page_id) {
            Some(v) if !v.is_empty() => v,
            _ => return Ok(()),
        };

        let eligible_ts = match self.retention {
            RetentionPolicy::StallReclamation => {
                let bound = self.oldest_active_reader();
                versions
                    .keys()
                    .rev()
                    .find(|ts| bound.map_or(true, |b| **ts < b))
                    .copied()
            }
            RetentionPolicy::KeepNewest(keep) => {
                if versions.len() > keep {
                    versions.keys().rev().nth(keep).copied()
                } else {
                    None
                }
            }
        };

        let write_timestamp = match eligible_ts {
            Some(ts) => ts,
            None => return Ok(()),
        };

        let lsn = *self.index.get(&page_id).unwrap().get(&write_timestamp).unwrap();
        let block = self.vlog.read(lsn, self.page_size)?;

        // Step 1: snapshot the current master contents as the pre-image.
        let page_index = page_id.value();
        let extent = self.master.extent()?;
        let mut old_contents = vec![0u8; self.page_size];
        if page_index < extent {
            self.master.read(page_index, &mut old_contents)?;
        }
        self.slog.write_pre_image(page_id, &old_contents)?;

        // Step 2: write the new content to Master Data.
        if page_index >= extent {
            self.master.extend(page_index - extent + 1)?;
        }
        self.master.write(page_index, &block.payload)?;

        // Step 3: flush Master Data.
        self.master.sync()?;

        // Step 4: mark the sync complete.
        self.slog.write_done(page_id)?;

        // Step 5: detach (reclaim) log blocks <= write_timestamp.
        let versions = self.index.get_mut(&page_id).unwrap();
        let keep: BTreeMap<Timestamp, Lsn> = versions
            .split_off(&write_timestamp.next())
            .into_iter()
            .collect();
        *versions = keep;

        Ok(())
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Every page currently holding at least one committed version log
    /// entry, for checkpoint's fold-back sweep.
    pub fn pages_with_versions(&self) -> Vec<PageID> {
        self.index
            .iter()
            .filter(|(_, versions)| !versions.is_empty())
            .map(|(page_id, _)| *page_id)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::file::MemoryFile;

    fn make_vm(page_size: usize) -> VersionManager<MemoryFile> {
        VersionManager::recover(
            MemoryFile::new(),
            MemoryFile::new(),
            MemoryFile::new(),
            page_size,
        )
        .unwrap()
    }

    #[test]
    fn fetch_before_any_write_is_not_manage_page() {
        let vm = make_vm(4);
        let err = vm.fetch(PageID::new(0), Timestamp::new(4)).unwrap_err();
        assert!(matches!(err, Error::NotManagePage(_)));
    }

    #[test]
    fn fetch_prefers_most_recent_committed_at_or_before_read_ts() {
        let mut vm = make_vm(4);
        vm.write_version(PageID::new(0), Timestamp::new(5), &[1; 4]).unwrap();
        vm.write_version(PageID::new(0), Timestamp::new(10), &[2; 4]).unwrap();

        assert_eq!(vm.fetch(PageID::new(0), Timestamp::new(7)).unwrap(), vec![1; 4]);
        assert_eq!(vm.fetch(PageID::new(0), Timestamp::new(10)).unwrap(), vec![2; 4]);
    }

    #[test]
    fn snapshot_isolation_across_readers() {
        let mut vm = make_vm(4);
        vm.write_version(PageID::new(0), Timestamp::new(10), &[1; 4]).unwrap();

        let at_10 = vm.fetch(PageID::new(0), Timestamp::new(10)).unwrap();
        assert_eq!(at_10, vec![1; 4]);

        vm.write_version(PageID::new(0), Timestamp::new(11), &[2; 4]).unwrap();

        // A reader who began at ts=10 still observes the old content.
        let still_at_10 = vm.fetch(PageID::new(0), Timestamp::new(10)).unwrap();
        assert_eq!(still_at_10, vec![1; 4]);

        let at_11 = vm.fetch(PageID::new(0), Timestamp::new(11)).unwrap();
        assert_eq!(at_11, vec![2; 4]);
    }

    #[test]
    fn monotonicity_is_enforced_per_page() {
        let mut vm = make_vm(4);
        vm.write_version(PageID::new(0), Timestamp::new(10), &[1; 4]).unwrap();
        let err = vm.write_version(PageID::new(0), Timestamp::new(5), &[2; 4]);
        assert!(matches!(err, Err(Error::OlderTimestampInconsistent { .. })));
    }

    #[test]
    fn sync_folds_back_into_master_when_no_active_readers() {
        let mut vm = make_vm(4);
        vm.write_version(PageID::new(0), Timestamp::new(10), &[3; 4]).unwrap();
        vm.sync(PageID::new(0)).unwrap();

        // The version log entry is now reclaimed but fetch still works via master.
        let v = vm.fetch(PageID::new(0), Timestamp::new(10)).unwrap();
        assert_eq!(v, vec![3; 4]);
        assert!(vm.index.get(&PageID::new(0)).unwrap().is_empty());
    }

    #[test]
    fn sync_stalls_behind_an_active_reader() {
        let mut vm = make_vm(4);
        vm.write_version(PageID::new(0), Timestamp::new(10), &[3; 4]).unwrap();
        vm.begin_read(Timestamp::new(10));
        vm.sync(PageID::new(0)).unwrap();

        // Block is still newer-or-equal to the active reader; must survive.
        assert!(!vm.index.get(&PageID::new(0)).unwrap().is_empty());
    }

    #[test]
    fn recovery_replays_unfinished_fold_back() {
        let master_file = MemoryFile::new();
        let vlog_file = MemoryFile::new();
        let slog_file = MemoryFile::new();

        {
            let mut vm = VersionManager::recover(
                master_file.clone(),
                vlog_file.clone(),
                slog_file.clone(),
                4,
            )
            .unwrap();
            vm.write_version(PageID::new(0), Timestamp::new(1), &[5; 4]).unwrap();

            // Simulate a crash mid fold-back: pre-image written, master
            // write done, but no "done" marker yet.
            let mut slog = SyncLog::open(slog_file.clone(), 4).unwrap();
            slog.write_pre_image(PageID::new(0), &[0; 4]).unwrap();
        }

        let vm2 = VersionManager::recover(master_file, vlog_file, slog_file, 4).unwrap();
        // Recovery should have restored the pre-image into master data
        // since no "done" marker was present.
        let restored = vm2.master.read(0, &mut vec![0u8; 4]);
        assert!(restored.is_ok());
    }
}
