//! Typed error taxonomy for the storage core.
//!
//! Every variant names exactly which condition or cross-file invariant was
//! violated, using `#[error("...")] #[from]` throughout rather than a
//! single opaque `anyhow`-flavored error.

use crate::ids::{AreaID, PageID};

pub type Result<T> = std::result::Result<T, Error>;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("fix on page {0} timed out")]
    Timeout(PageID),

    #[error("operation cancelled")]
    Cancelled,

    #[error("page/area id {0} out of range (extent is {1})")]
    OutOfRange(u64, u64),

    #[error("no space left on page {0}")]
    NoSpace(PageID),

    #[error("page {0} is not managed by this file (it was freed or never allocated)")]
    NotManagePage(PageID),

    #[error("allocation bitmap entry for page {0} disagrees with the page's actual state")]
    AllocationBitInconsistent(PageID),

    #[error("version log block count inconsistent: expected {expected}, found {found}")]
    BlockCountInconsistent { expected: u64, found: u64 },

    #[error("version log index structure corrupt for page {0}")]
    ChildCountInconsistent(PageID),

    #[error("count of latest versions mismatches for page {0}")]
    LatestCountInconsistent(PageID),

    #[error("master data file not found: {0}")]
    MasterDataFileNotFound(String),

    #[error("version log file not found: {0}")]
    VersionLogFileNotFound(String),

    #[error("timestamp monotonicity violated on page {page}: new {new} <= previous {previous}")]
    OlderTimestampInconsistent {
        page: PageID,
        new: u64,
        previous: u64,
    },

    #[error("oldest-timestamp bookkeeping inconsistent: recorded {recorded}, observed {observed}")]
    OldestTimestampInconsistent { recorded: u64, observed: u64 },

    #[error("physical log id chain broken at LSN {0}")]
    PhysicalLogIDInconsistent(u64),

    #[error("version log id chain broken at LSN {0}")]
    VersionLogIDInconsistent(u64),

    #[error("page move landed on an occupied slot: page {0}")]
    PreservedDifferentPage(PageID),

    #[error("unexpected sync log file found on clean start: {0}")]
    SyncLogFileFound(String),

    #[error("version log implies {logged} pages but master extent is {extent}")]
    VersionPageCountInconsistent { logged: u64, extent: u64 },

    #[error("page {0} use situation disagrees with its directory/bitmap entry")]
    DiscordPageUseSituation(PageID),

    #[error("area {1} use situation on page {0} disagrees with its directory entry")]
    DiscordAreaUseSituation(PageID, AreaID),

    #[error("free area rate for page {0} disagrees with the recomputed value")]
    DiscordFreeAreaRate(PageID),

    #[error("unused-area rate for page {0} disagrees with the recomputed value")]
    DiscordUnuseAreaRate(PageID),

    #[error("page array for file disagrees with the recomputed traversal")]
    DiscordPageArray,

    #[error("managed page count disagrees with the recomputed traversal: expected {expected}, found {found}")]
    DiscordManagePageNum { expected: u64, found: u64 },

    #[error("used page count disagrees with the recomputed traversal: expected {expected}, found {found}")]
    DiscordUsePageNum { expected: u64, found: u64 },

    #[error("unused page count in bitmap table disagrees: expected {expected}, found {found}")]
    DiscordUnusePageNumInTable { expected: u64, found: u64 },

    #[error("used page count in bitmap table disagrees: expected {expected}, found {found}")]
    DiscordUsePageNumInTable { expected: u64, found: u64 },

    #[error("managed page count in bitmap table disagrees: expected {expected}, found {found}")]
    DiscordManagePageNumInTable { expected: u64, found: u64 },

    #[error("duplicate area {1} found on page {0}")]
    ExistDuplicateArea(PageID, AreaID),

    #[error("area {1} on page {0} protrudes past the page boundary")]
    ExistProtrusiveArea(PageID, AreaID),

    #[error("could not fix the area-manage table page")]
    CanNotFixAreaManageTable,

    #[error("could not fix the page table page")]
    CanNotFixPageTable,

    #[error("could not fix the header page")]
    CanNotFixHeaderPage,

    #[error("could not fix node page {0}")]
    CanNotFixNode(PageID),

    #[error("verify could not correct the area use situation on page {0}")]
    CanNotCorrectAreaUseSituation(PageID),

    #[error("verify could not correct the page use situation for page {0}")]
    CanNotCorrectPageUseSituation(PageID),

    #[error("verify corrected the area use situation on page {0}")]
    CorrectedAreaUseSituation(PageID),

    #[error("verify corrected the page use situation for page {0}")]
    CorrectedPageUseSituation(PageID),

    #[error("checksum mismatch: expected {expected:08x}, computed {computed:08x}")]
    ChecksumMismatch { expected: u32, computed: u32 },
}

impl Error {
    /// True for the structural-consistency family of errors that `verify`
    /// records in its progress sink rather than propagating as a hard
    /// failure.
    pub fn is_structural_consistency(&self) -> bool {
        matches!(
            self,
            Error::AllocationBitInconsistent(_)
                | Error::BlockCountInconsistent { .. }
                | Error::ChildCountInconsistent(_)
                | Error::LatestCountInconsistent(_)
                | Error::OlderTimestampInconsistent { .. }
                | Error::OldestTimestampInconsistent { .. }
                | Error::PhysicalLogIDInconsistent(_)
                | Error::VersionLogIDInconsistent(_)
                | Error::PreservedDifferentPage(_)
                | Error::VersionPageCountInconsistent { .. }
                | Error::DiscordPageUseSituation(_)
                | Error::DiscordAreaUseSituation(_, _)
                | Error::DiscordFreeAreaRate(_)
                | Error::DiscordUnuseAreaRate(_)
                | Error::DiscordPageArray
                | Error::DiscordManagePageNum { .. }
                | Error::DiscordUsePageNum { .. }
                | Error::DiscordUnusePageNumInTable { .. }
                | Error::DiscordUsePageNumInTable { .. }
                | Error::DiscordManagePageNumInTable { .. }
                | Error::ExistDuplicateArea(_, _)
                | Error::ExistProtrusiveArea(_, _)
        )
    }
}
