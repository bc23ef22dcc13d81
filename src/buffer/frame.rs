//! An in-memory fixed-size slot owned by the Buffer Pool.

use crate::ids::{FixMode, Priority, Timestamp};

/// Identifies a file within one `BufferPool`. Plain opaque handle handed
/// out by `BufferPool::register_file`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FileId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameKey {
    pub file: FileId,
    pub page: crate::ids::PageID,
}

/// One page-sized buffer slot, plus the bookkeeping the pool needs to
/// decide whether it can be reused, evicted, or must be flushed first.
pub struct Frame {
    pub bytes: Vec<u8>,
    pub key: Option<FrameKey>,
    pub pin_count: u32,
    pub dirty: bool,
    pub discardable: bool,
    pub last_use: u64,
    pub fix_mode: Option<FixMode>,
    pub priority: Priority,
    pub committed_snapshot: Option<Vec<u8>>,
    /// The read timestamp the currently resident content was materialized
    /// for: either the `read_timestamp` of the `fetch()` that populated
    /// `bytes`, or the `commit_timestamp` of the most recent `flush()`.
    /// A fix whose own `read_timestamp` is older than this cannot safely
    /// reuse the resident content as-is — it must be re-fetched.
    pub committed_timestamp: Timestamp,
}

impl Frame {
    pub fn new(page_size: usize) -> Self {
        Frame {
            bytes: vec![0u8; page_size],
            key: None,
            pin_count: 0,
            dirty: false,
            discardable: false,
            last_use: 0,
            fix_mode: None,
            priority: Priority::Middle,
            committed_snapshot: None,
            committed_timestamp: Timestamp::ZERO,
        }
    }

    pub fn is_free(&self) -> bool {
        self.key.is_none() && self.pin_count == 0
    }

    pub fn is_evictable(&self) -> bool {
        self.pin_count == 0
    }
}
