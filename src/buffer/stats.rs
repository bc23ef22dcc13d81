//! Statistics & Daemons: process-wide counters per category, kept behind
//! a single latch since they're off the hot path, plus the long-lived
//! background reporter task.
//!
//! The category enum mirrors `Statistics.h`'s buffer statistics class;
//! translated here into a plain mutex-guarded snapshot rather than
//! per-field critical sections.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    Fix,
    Unfix,
    Read,
    Write,
    Allocate,
    Free,
    Replace,
    Exhaust,
}

impl Category {
    pub const ALL: [Category; 8] = [
        Category::Fix,
        Category::Unfix,
        Category::Read,
        Category::Write,
        Category::Allocate,
        Category::Free,
        Category::Replace,
        Category::Exhaust,
    ];

    fn index(self) -> usize {
        match self {
            Category::Fix => 0,
            Category::Unfix => 1,
            Category::Read => 2,
            Category::Write => 3,
            Category::Allocate => 4,
            Category::Free => 5,
            Category::Replace => 6,
            Category::Exhaust => 7,
        }
    }

    fn name(self) -> &'static str {
        match self {
            Category::Fix => "fix",
            Category::Unfix => "unfix",
            Category::Read => "read",
            Category::Write => "write",
            Category::Allocate => "allocate",
            Category::Free => "free",
            Category::Replace => "replace",
            Category::Exhaust => "exhaust",
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Counter {
    pub count: u64,
    pub bytes: u64,
}

#[derive(Debug, Clone, Default)]
struct Snapshot {
    counters: [Counter; Category::ALL.len()],
}

/// Shared, cloneable handle to the counters for one `BufferPool`.
#[derive(Clone, Default)]
pub struct Statistics {
    inner: Arc<Mutex<Snapshot>>,
}

impl Statistics {
    pub fn new() -> Self {
        Statistics::default()
    }

    pub fn record(&self, category: Category, bytes: u64) {
        let mut snapshot = self.inner.lock();
        let counter = &mut snapshot.counters[category.index()];
        counter.count += 1;
        counter.bytes += bytes;
    }

    pub fn get(&self, category: Category) -> Counter {
        self.inner.lock().counters[category.index()]
    }

    pub fn reset(&self) {
        *self.inner.lock() = Snapshot::default();
    }
}

/// Background task that periodically snapshots and logs `Statistics`
/// Modeled as a plain OS thread, owned by and started/stopped with the
/// storage instance — no async runtime is introduced for three timer
/// loops.
pub struct StatisticsReporter {
    handle: Option<std::thread::JoinHandle<()>>,
    stop: Arc<std::sync::atomic::AtomicBool>,
}

impl StatisticsReporter {
    pub fn start(stats: Statistics, interval: Duration) -> Self {
        let stop = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let stop_flag = stop.clone();

        let handle = std::thread::spawn(move || {
            while !stop_flag.load(std::sync::atomic::Ordering::Relaxed) {
                std::thread::sleep(interval);
                if stop_flag.load(std::sync::atomic::Ordering::Relaxed) {
                    break;
                }
                for category in Category::ALL {
                    let counter = stats.get(category);
                    tracing::info!(
                        category = category.name(),
                        count = counter.count,
                        bytes = counter.bytes,
                        "buffer pool statistics"
                    );
                }
            }
        });

        StatisticsReporter {
            handle: Some(handle),
            stop,
        }
    }

    pub fn stop(mut self) {
        self.stop.store(true, std::sync::atomic::Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for StatisticsReporter {
    fn drop(&mut self) {
        self.stop.store(true, std::sync::atomic::Ordering::Relaxed);
    }
}
