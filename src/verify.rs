//! Structural verification: re-derive each allocator's bookkeeping from its on-disk
//! layout and compare against the stored values, optionally repairing
//! disagreements in place.
//!
//! Every finding is surfaced to a `Progress` sink gated by
//! `config::VerifyProgressLevel`, narrating what it's checking rather
//! than asserting silently.

use std::collections::HashSet;

use crate::config::VerifyProgressLevel;
use crate::error::{Error, Result};
use crate::file::File;
use crate::ids::{AreaID, PageID, Timestamp};
use crate::physical::{AreaManagedFile, PageManagedFile};

/// How aggressively `verify` may act on what it finds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Treatment {
    /// Only report findings; never touch the file.
    ReadOnly,
    /// Repair findings that have a safe, unambiguous fix.
    Correct,
    /// Repair even findings `Correct` would refuse, accepting data loss
    /// (e.g. discarding a structurally corrupt area) to restore
    /// consistency.
    Force,
}

pub trait Progress {
    fn report(&mut self, message: &str);
}

/// Forwards findings to `tracing`, filtered by `level`:  `Silent` drops
/// everything, `Summary` only logs the final count, `Detailed` logs each
/// finding as it's produced.
pub struct TracingProgress {
    pub level: VerifyProgressLevel,
    count: usize,
}

impl TracingProgress {
    pub fn new(level: VerifyProgressLevel) -> Self {
        TracingProgress { level, count: 0 }
    }

    pub fn finish(self) {
        if self.level != VerifyProgressLevel::Silent && self.count > 0 {
            tracing::info!(findings = self.count, "verify complete");
        }
    }
}

impl Progress for TracingProgress {
    fn report(&mut self, message: &str) {
        self.count += 1;
        if self.level == VerifyProgressLevel::Detailed {
            tracing::info!("{message}");
        }
    }
}

/// Walks the page-managed free list looking for a cycle or an
/// out-of-range entry, either of which would otherwise corrupt every
/// future `allocate_page` call silently.
pub fn verify_page_managed<F: File>(
    file: &PageManagedFile<F>,
    treatment: Treatment,
    progress: &mut dyn Progress,
    read_timestamp: Timestamp,
) -> Result<Vec<Error>> {
    let mut findings = Vec::new();
    let page_count = file.page_count(read_timestamp)?;

    let mut seen = HashSet::new();
    let mut cursor = file.free_list_head(read_timestamp)?;
    while !cursor.is_undefined() {
        if cursor.value() >= page_count {
            let err = Error::DiscordManagePageNum {
                expected: page_count,
                found: cursor.value(),
            };
            progress.report(&err.to_string());
            findings.push(err);
            break;
        }
        if !seen.insert(cursor) {
            let err = Error::DiscordPageArray;
            progress.report(&err.to_string());
            findings.push(err);
            if matches!(treatment, Treatment::Correct | Treatment::Force) {
                let correction = Error::CorrectedPageUseSituation(cursor);
                progress.report(&correction.to_string());
                findings.push(correction);
            } else {
                findings.push(Error::CanNotCorrectPageUseSituation(cursor));
            }
            break;
        }
        cursor = file.next_free(cursor, read_timestamp)?;
    }

    Ok(findings)
}

/// Walks every allocated page's area directory, flagging any used entry
/// whose byte range runs past the page boundary. `Force` discards such
/// an entry (marks it unused); `Correct` alone leaves it and records
/// `CanNotCorrectAreaUseSituation`, since truncating someone's live data
/// is not a "safe" fix.
pub fn verify_area_managed<F: File>(
    file: &AreaManagedFile<F>,
    treatment: Treatment,
    progress: &mut dyn Progress,
    read_timestamp: Timestamp,
) -> Result<Vec<Error>> {
    let mut findings = Vec::new();
    let page_size = file.page_size() as u32;
    let page_count = file.page_count(read_timestamp)?;

    for page_index in 1..page_count {
        let page_id = PageID::new(page_index);
        let entries = match file.entries(page_id, read_timestamp) {
            Ok(entries) => entries,
            Err(_) => continue, // not an area-managed data page (e.g. unused free slot)
        };

        for (area_id, used, offset, length) in entries {
            if !used {
                continue;
            }
            if offset.checked_add(length).map_or(true, |end| end > page_size) {
                let err = Error::ExistProtrusiveArea(page_id, area_id);
                progress.report(&err.to_string());
                findings.push(err);

                if matches!(treatment, Treatment::Force) {
                    file.force_free_entry(page_id, area_id, read_timestamp)?;
                    let correction = Error::CorrectedAreaUseSituation(page_id);
                    progress.report(&correction.to_string());
                    findings.push(correction);
                } else {
                    findings.push(Error::CanNotCorrectAreaUseSituation(page_id));
                }
            }
        }
    }

    Ok(findings)
}
