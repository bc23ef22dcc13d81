//! Background daemons: long-lived OS threads owned by an
//! open storage instance, started and stopped with it rather than
//! running on a shared runtime. See `buffer::stats::StatisticsReporter`
//! for the third daemon (statistics logging), kept alongside the
//! counters it reports on.

pub mod checkpoint;
pub mod flusher;

pub use checkpoint::CheckpointExecutor;
pub use flusher::DirtyPageFlusher;
