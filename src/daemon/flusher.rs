//! Periodically writes every dirty frame back through its file's Version
//! Manager, bounding how much uncommitted-to-disk work a crash can lose
//! without forcing every writer to flush synchronously.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::buffer::BufferPool;
use crate::file::File;

pub struct DirtyPageFlusher {
    handle: Option<std::thread::JoinHandle<()>>,
    stop: Arc<AtomicBool>,
}

impl DirtyPageFlusher {
    pub fn start<F: File + 'static>(pool: Arc<BufferPool<F>>, interval: Duration) -> Self {
        let stop = Arc::new(AtomicBool::new(false));
        let stop_flag = stop.clone();

        let handle = std::thread::spawn(move || {
            while !stop_flag.load(Ordering::Relaxed) {
                std::thread::sleep(interval);
                if stop_flag.load(Ordering::Relaxed) {
                    break;
                }
                match pool.flush_all_dirty() {
                    Ok(0) => {}
                    Ok(n) => tracing::debug!(flushed = n, "dirty page flusher"),
                    Err(err) => tracing::warn!(error = %err, "dirty page flusher failed"),
                }
            }
        });

        DirtyPageFlusher {
            handle: Some(handle),
            stop,
        }
    }

    pub fn stop(mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for DirtyPageFlusher {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
    }
}
