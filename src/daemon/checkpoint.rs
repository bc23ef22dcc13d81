//! Periodically flushes dirty frames and then sweeps every registered
//! file's Version Manager for fold-back-eligible pages, bounding how far
//! the version log can grow behind the oldest active reader.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::buffer::BufferPool;
use crate::file::File;

pub struct CheckpointExecutor {
    handle: Option<std::thread::JoinHandle<()>>,
    stop: Arc<AtomicBool>,
}

impl CheckpointExecutor {
    pub fn start<F: File + 'static>(pool: Arc<BufferPool<F>>, interval: Duration) -> Self {
        let stop = Arc::new(AtomicBool::new(false));
        let stop_flag = stop.clone();

        let handle = std::thread::spawn(move || {
            while !stop_flag.load(Ordering::Relaxed) {
                std::thread::sleep(interval);
                if stop_flag.load(Ordering::Relaxed) {
                    break;
                }

                if let Err(err) = pool.flush_all_dirty() {
                    tracing::warn!(error = %err, "checkpoint: flushing dirty frames failed");
                    continue;
                }
                match pool.checkpoint() {
                    Ok(swept) => tracing::debug!(pages_swept = swept, "checkpoint"),
                    Err(err) => tracing::warn!(error = %err, "checkpoint: fold-back sweep failed"),
                }
            }
        });

        CheckpointExecutor {
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

impl Drop for CheckpointExecutor {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
    }
}
