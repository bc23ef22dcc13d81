//! Buffer Pool: a process-wide (or per-pool) set of frames, indexed by
//! (File, PageID), with pinning, segmented-LRU replacement, and
//! dirty-page flushing through the Version Manager.
//!
//! A pool can be shared across several open files, each with its own
//! `VersionManager`, guarded by one short-held `parking_lot::Mutex`
//! covering the frame table, free list, and replacer together.

pub mod frame;
pub mod replacer;
pub mod stats;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::error::{Error, Result};
use crate::file::File;
use crate::ids::{FixMode, PageID, Priority, Timestamp, UnfixMode};
use crate::version::VersionManager;

use frame::{FileId, Frame, FrameKey};
use replacer::Replacer;
use stats::{Category, Statistics};

struct PoolState<F> {
    frames: Vec<Frame>,
    table: HashMap<FrameKey, usize>,
    free_list: Vec<usize>,
    files: HashMap<FileId, Arc<Mutex<VersionManager<F>>>>,
    next_file_id: u32,
}

pub struct BufferPool<F> {
    state: Mutex<PoolState<F>>,
    condvar: Condvar,
    replacer: Replacer,
    stats: Statistics,
    page_size: usize,
    fix_timeout: Duration,
    use_clock: std::sync::atomic::AtomicU64,
}

impl<F: File> BufferPool<F> {
    pub fn new(page_size: usize, frame_count: usize, fix_timeout: Duration) -> Self {
        let frames = (0..frame_count).map(|_| Frame::new(page_size)).collect();
        let free_list = (0..frame_count).rev().collect();

        BufferPool {
            state: Mutex::new(PoolState {
                frames,
                table: HashMap::new(),
                free_list,
                files: HashMap::new(),
                next_file_id: 0,
            }),
            condvar: Condvar::new(),
            replacer: Replacer::new(),
            stats: Statistics::new(),
            page_size,
            fix_timeout,
            use_clock: std::sync::atomic::AtomicU64::new(0),
        }
    }

    pub fn statistics(&self) -> Statistics {
        self.stats.clone()
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    fn tick(&self) -> u64 {
        self.use_clock
            .fetch_add(1, std::sync::atomic::Ordering::Relaxed)
    }

    /// Registers an open file's `VersionManager` with this pool, returning
    /// the `FileId` later `fix` calls address it by.
    pub fn register_file(&self, version_manager: VersionManager<F>) -> FileId {
        let mut state = self.state.lock();
        let id = FileId(state.next_file_id);
        state.next_file_id += 1;
        state.files.insert(id, Arc::new(Mutex::new(version_manager)));
        id
    }

    fn vm_handle(&self, file: FileId) -> Result<Arc<Mutex<VersionManager<F>>>> {
        let state = self.state.lock();
        state
            .files
            .get(&file)
            .cloned()
            .ok_or(Error::NotManagePage(PageID::UNDEFINED))
    }

    /// Pins a frame to (file, page_id) under `fix_mode`, materializing its
    /// content at `read_timestamp` on a cache miss.
    pub fn fix(
        &self,
        file: FileId,
        page_id: PageID,
        fix_mode: FixMode,
        priority: Priority,
        read_timestamp: Timestamp,
    ) -> Result<Fixed<'_, F>> {
        let deadline = Instant::now() + self.fix_timeout;
        let key = FrameKey { file, page: page_id };
        let mut state = self.state.lock();

        enum Outcome {
            Present(usize),
            /// Present in the table, unpinned, but its resident content
            /// was materialized for a different read timestamp than this
            /// fix needs. Re-materialize in place before handing it out.
            Refresh(usize),
            Install(usize),
        }

        let outcome = loop {
            if let Some(&idx) = state.table.get(&key) {
                // A dirty frame holds an uncommitted write with no real
                // commit timestamp yet (read-your-own-write); its bytes
                // are reused as-is regardless of `read_timestamp`. A
                // clean frame's bytes are the single version it was last
                // materialized for — correct for a fix at exactly that
                // timestamp, stale for any other, since the pool holds
                // only one frame per (File, PageID) and can't tell
                // whether a newer version has since been committed.
                let snapshot_ok = fix_mode.skips_fetch()
                    || state.frames[idx].dirty
                    || state.frames[idx].committed_timestamp == read_timestamp;

                if state.frames[idx].pin_count == 0 {
                    // Nothing holds this frame right now; the previous
                    // fix mode is no longer binding.
                    break if snapshot_ok {
                        Outcome::Present(idx)
                    } else {
                        Outcome::Refresh(idx)
                    };
                }
                let existing = state.frames[idx]
                    .fix_mode
                    .expect("a pinned frame always has a fix mode");
                if existing.compatible_with(fix_mode) && snapshot_ok {
                    break Outcome::Present(idx);
                }
                let timed_out = self.condvar.wait_until(&mut state, deadline).timed_out();
                if timed_out {
                    return Err(Error::Timeout(page_id));
                }
                continue;
            }

            if let Some(idx) = state.free_list.pop() {
                break Outcome::Install(idx);
            }
            if let Some(idx) = self.replacer.victim(&state.frames) {
                break Outcome::Install(idx);
            }

            self.stats.record(Category::Exhaust, 0);
            if self.condvar.wait_until(&mut state, deadline).timed_out() {
                return Err(Error::Timeout(page_id));
            }
        };

        let idx = match outcome {
            Outcome::Present(idx) => {
                state.frames[idx].pin_count += 1;
                state.frames[idx].fix_mode = Some(fix_mode);
                state.frames[idx].discardable = fix_mode.is_discardable();
                state.frames[idx].priority = priority;
                let t = self.tick();
                state.frames[idx].last_use = t;
                self.stats.record(Category::Fix, 0);
                idx
            }
            Outcome::Refresh(idx) => {
                // Only reachable for a clean frame (a dirty one always
                // satisfies `snapshot_ok` above), so there is nothing
                // pending to flush before re-materializing.
                debug_assert!(!state.frames[idx].dirty);

                state.frames[idx].pin_count = 1;
                state.frames[idx].fix_mode = Some(fix_mode);
                state.frames[idx].discardable = fix_mode.is_discardable();
                state.frames[idx].priority = priority;
                let t = self.tick();
                state.frames[idx].last_use = t;
                self.stats.record(Category::Fix, 0);

                state = self.materialize(state, idx, file, page_id, fix_mode, read_timestamp)?;
                idx
            }
            Outcome::Install(idx) => {
                if let Some(old_key) = state.frames[idx].key {
                    if state.frames[idx].dirty {
                        let vm = state
                            .files
                            .get(&old_key.file)
                            .cloned()
                            .expect("dirty frame must belong to a registered file");
                        let mut vm = vm.lock();
                        let ts = vm.clock().tick();
                        vm.write_version(old_key.page, ts, &state.frames[idx].bytes)?;
                        self.stats.record(Category::Write, self.page_size as u64);
                    }
                    state.table.remove(&old_key);
                    self.stats.record(Category::Replace, 0);
                }

                state.frames[idx].key = Some(key);
                state.frames[idx].pin_count = 1;
                state.frames[idx].dirty = false;
                state.frames[idx].discardable = fix_mode.is_discardable();
                state.frames[idx].fix_mode = Some(fix_mode);
                state.frames[idx].priority = priority;
                let t = self.tick();
                state.frames[idx].last_use = t;
                state.table.insert(key, idx);

                state = self.materialize(state, idx, file, page_id, fix_mode, read_timestamp)?;
                idx
            }
        };

        Ok(Fixed {
            pool: self,
            idx,
            file,
            page: page_id,
            fix_mode,
            released: false,
        })
    }

    /// Populates `frames[idx].bytes` for a page about to be handed out
    /// under `fix_mode`: zero-filled for `Allocate` (content is about to be
    /// overwritten, never read from disk), otherwise fetched from the
    /// file's `VersionManager` at `read_timestamp`. Records the timestamp
    /// the content is now valid for, so a later fix at an older timestamp
    /// knows it cannot reuse this frame as-is.
    fn materialize<'s>(
        &'s self,
        mut state: parking_lot::MutexGuard<'s, PoolState<F>>,
        idx: usize,
        file: FileId,
        page_id: PageID,
        fix_mode: FixMode,
        read_timestamp: Timestamp,
    ) -> Result<parking_lot::MutexGuard<'s, PoolState<F>>> {
        if fix_mode.skips_fetch() {
            state.frames[idx].bytes.fill(0);
            state.frames[idx].committed_snapshot = None;
            state.frames[idx].committed_timestamp = Timestamp::ZERO;
            self.stats.record(Category::Allocate, self.page_size as u64);
            return Ok(state);
        }

        let vm = state
            .files
            .get(&file)
            .cloned()
            .ok_or(Error::NotManagePage(page_id))?;

        // Release the lookup lock while doing I/O.
        drop(state);
        let bytes = {
            let vm = vm.lock();
            vm.fetch(page_id, read_timestamp)
        };
        let mut state = self.state.lock();

        let bytes = bytes?;
        state.frames[idx].bytes.copy_from_slice(&bytes);
        state.frames[idx].committed_snapshot = Some(bytes);
        state.frames[idx].committed_timestamp = read_timestamp;
        self.stats.record(Category::Read, self.page_size as u64);
        Ok(state)
    }

    fn unfix(&self, idx: usize, mode: UnfixMode) {
        let mut state = self.state.lock();
        let frame = &mut state.frames[idx];

        match mode {
            UnfixMode::Dirty => frame.dirty = true,
            UnfixMode::NotDirty => {}
            UnfixMode::Omit => {
                if frame.fix_mode.map_or(false, FixMode::is_write) {
                    frame.dirty = true;
                }
            }
        }

        frame.pin_count -= 1;
        let t = self.tick();
        frame.last_use = t;
        self.stats.record(Category::Unfix, 0);

        if frame.pin_count == 0 {
            self.condvar.notify_all();
        }
    }

    /// Writes a dirty frame back through the Version Manager at
    /// `commit_timestamp`, clearing its dirty bit.
    pub fn flush(&self, file: FileId, page_id: PageID, commit_timestamp: Timestamp) -> Result<()> {
        let key = FrameKey { file, page: page_id };
        let mut state = self.state.lock();
        let idx = match state.table.get(&key) {
            Some(&idx) => idx,
            None => return Ok(()),
        };

        if !state.frames[idx].dirty {
            return Ok(());
        }

        let vm = state
            .files
            .get(&file)
            .cloned()
            .ok_or(Error::NotManagePage(page_id))?;

        let bytes = state.frames[idx].bytes.clone();
        drop(state);

        {
            let mut vm = vm.lock();
            vm.write_version(page_id, commit_timestamp, &bytes)?;
        }

        let mut state = self.state.lock();
        state.frames[idx].dirty = false;
        state.frames[idx].committed_snapshot = Some(bytes);
        state.frames[idx].committed_timestamp = commit_timestamp;
        Ok(())
    }

    /// Reverts a `Discardable` frame's in-memory content to the committed
    /// snapshot it held at fix time (discardable rollback).
    pub fn abort_discardable(&self, file: FileId, page_id: PageID) {
        let key = FrameKey { file, page: page_id };
        let mut state = self.state.lock();
        if let Some(&idx) = state.table.get(&key) {
            let frame = &mut state.frames[idx];
            if frame.discardable {
                if let Some(snapshot) = frame.committed_snapshot.clone() {
                    frame.bytes.copy_from_slice(&snapshot);
                }
                frame.dirty = false;
            }
        }
    }

    /// Snapshots every currently-dirty (file, page) pair, for the
    /// background flusher/checkpoint daemons to drain.
    pub fn dirty_pages(&self) -> Vec<(FileId, PageID)> {
        let state = self.state.lock();
        state
            .frames
            .iter()
            .filter_map(|frame| match frame.key {
                Some(key) if frame.dirty => Some((key.file, key.page)),
                _ => None,
            })
            .collect()
    }

    /// Flushes every dirty frame, minting each a fresh commit timestamp
    /// off its file's own clock. Used by the background flusher and by
    /// checkpoint, neither of which has a transaction's commit timestamp
    /// on hand. Returns the number of frames flushed.
    pub fn flush_all_dirty(&self) -> Result<usize> {
        let mut flushed = 0;
        for (file, page) in self.dirty_pages() {
            let vm = self.vm_handle(file)?;
            let ts = vm.lock().clock().tick();
            self.flush(file, page, ts)?;
            flushed += 1;
        }
        Ok(flushed)
    }

    /// Runs one fold-back sweep across every registered file: for each
    /// page holding committed version log entries, asks its
    /// `VersionManager` to fold back whatever is eligible under its
    /// `RetentionPolicy`. Returns the number of pages swept (not
    /// necessarily the number actually folded, since `sync` is a no-op
    /// when nothing is eligible).
    pub fn checkpoint(&self) -> Result<usize> {
        let files: Vec<Arc<Mutex<VersionManager<F>>>> = {
            let state = self.state.lock();
            state.files.values().cloned().collect()
        };

        let mut swept = 0;
        for vm in files {
            let pages = vm.lock().pages_with_versions();
            for page_id in pages {
                vm.lock().sync(page_id)?;
                swept += 1;
            }
        }
        Ok(swept)
    }

    fn read_buffer(&self, idx: usize) -> Vec<u8> {
        self.state.lock().frames[idx].bytes.clone()
    }

    fn write_buffer(&self, idx: usize, offset: usize, data: &[u8]) {
        let mut state = self.state.lock();
        state.frames[idx].bytes[offset..offset + data.len()].copy_from_slice(data);
    }

    fn clear_buffer(&self, idx: usize, byte: u8) {
        let mut state = self.state.lock();
        state.frames[idx].bytes.fill(byte);
        state.frames[idx].dirty = true;
    }
}

/// Affine pinned-frame handle: `Drop` releases exactly one pin, inferring
/// dirtiness from `fix_mode` unless the caller explicitly unfixes with a
/// mode ("every pin must be released exactly once on every
/// control-flow path").
pub struct Fixed<'a, F: File> {
    pool: &'a BufferPool<F>,
    idx: usize,
    file: FileId,
    page: PageID,
    fix_mode: FixMode,
    released: bool,
}

impl<'a, F: File> Fixed<'a, F> {
    pub fn file(&self) -> FileId {
        self.file
    }

    pub fn page_id(&self) -> PageID {
        self.page
    }

    pub fn fix_mode(&self) -> FixMode {
        self.fix_mode
    }

    pub fn read(&self) -> Vec<u8> {
        self.pool.read_buffer(self.idx)
    }

    pub fn write(&self, offset: usize, data: &[u8]) {
        debug_assert!(self.fix_mode.is_write(), "write on a ReadOnly fix");
        self.pool.write_buffer(self.idx, offset, data);
    }

    pub fn clear(&self, byte: u8) {
        debug_assert!(self.fix_mode.is_write(), "clear on a ReadOnly fix");
        self.pool.clear_buffer(self.idx, byte);
    }

    /// Explicitly releases the pin with a caller-chosen `UnfixMode`.
    pub fn unfix(mut self, mode: UnfixMode) {
        self.pool.unfix(self.idx, mode);
        self.released = true;
    }
}

impl<'a, F: File> Drop for Fixed<'a, F> {
    fn drop(&mut self) {
        if !self.released {
            self.pool.unfix(self.idx, UnfixMode::Omit);
        }
    }
}
