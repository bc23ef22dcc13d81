//! Segmented-LRU-by-`Priority` replacement policy: `Low` frames are
//! evicted before `Middle`, which are evicted before `High`; within one
//! tier, the least-recently-unfixed frame goes first. A pinned frame is
//! never a candidate.
//!
//! A linear scan over frames grouped by priority, no heavier a data
//! structure than this scale calls for.

use super::frame::Frame;
use crate::ids::Priority;

pub struct Replacer;

impl Replacer {
    pub fn new() -> Self {
        Replacer
    }

    /// Picks the best eviction candidate among `frames`, or `None` if
    /// every frame is pinned.
    pub fn victim(&self, frames: &[Frame]) -> Option<usize> {
        for priority in Priority::ALL {
            let mut best: Option<(usize, u64)> = None;
            for (idx, frame) in frames.iter().enumerate() {
                if !frame.is_evictable() || frame.key.is_none() {
                    continue;
                }
                if frame.priority != priority {
                    continue;
                }
                match best {
                    Some((_, last_use)) if last_use <= frame.last_use => {}
                    _ => best = Some((idx, frame.last_use)),
                }
            }
            if best.is_some() {
                return best.map(|(idx, _)| idx);
            }
        }
        None
    }
}
