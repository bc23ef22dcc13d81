//! Recognized configuration options, loadable from environment variables.
//!
//! Kept as a plain struct with a `Default` impl plus an env-var loader,
//! mirroring how the rest of the pack configures small scalar knobs
//! without reaching for a config crate when there are only a handful of
//! values.

use std::env;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerifyProgressLevel {
    Silent,
    Summary,
    Detailed,
}

impl VerifyProgressLevel {
    fn from_str(s: &str) -> Option<Self> {
        match s {
            "silent" => Some(VerifyProgressLevel::Silent),
            "summary" => Some(VerifyProgressLevel::Summary),
            "detailed" => Some(VerifyProgressLevel::Detailed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    /// `buffer.pool.size` — total frames.
    pub buffer_pool_size: usize,
    /// `buffer.flusher.interval_ms` — flusher period.
    pub flusher_interval: Duration,
    /// `buffer.statistics.interval_ms` — reporter period.
    pub statistics_interval: Duration,
    /// `checkpoint.interval_ms` — automatic checkpoint cadence.
    pub checkpoint_interval: Duration,
    /// `verify.progress.level`.
    pub verify_progress_level: VerifyProgressLevel,
    /// `fix.timeout_ms` — default fix deadline.
    pub fix_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            buffer_pool_size: 1024,
            flusher_interval: Duration::from_millis(500),
            statistics_interval: Duration::from_secs(60),
            checkpoint_interval: Duration::from_secs(300),
            verify_progress_level: VerifyProgressLevel::Summary,
            fix_timeout: Duration::from_secs(30),
        }
    }
}

impl Config {
    /// Builds a `Config` starting from defaults and overriding each field
    /// whose matching environment variable is present and parses cleanly.
    /// Unset or unparsable variables silently keep the default — every
    /// setting is optional.
    pub fn from_env() -> Self {
        let mut config = Config::default();

        if let Some(v) = env_usize("buffer.pool.size") {
            config.buffer_pool_size = v;
        }
        if let Some(v) = env_millis("buffer.flusher.interval_ms") {
            config.flusher_interval = v;
        }
        if let Some(v) = env_millis("buffer.statistics.interval_ms") {
            config.statistics_interval = v;
        }
        if let Some(v) = env_millis("checkpoint.interval_ms") {
            config.checkpoint_interval = v;
        }
        if let Ok(v) = env::var("verify.progress.level") {
            if let Some(level) = VerifyProgressLevel::from_str(v.trim()) {
                config.verify_progress_level = level;
            }
        }
        if let Some(v) = env_millis("fix.timeout_ms") {
            config.fix_timeout = v;
        }

        config
    }
}

fn env_usize(key: &str) -> Option<usize> {
    env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

fn env_millis(key: &str) -> Option<Duration> {
    env_usize(key).map(|ms| Duration::from_millis(ms as u64))
}
