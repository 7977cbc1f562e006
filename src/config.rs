//! Engine configuration.
//!
//! [`EngineConfig`] carries every tunable the engine and its HTTP client use.
//! Defaults match the constants in [`crate::download::constants`]; callers
//! override individual fields and call [`EngineConfig::validate`] (the engine
//! validates again on construction).

use std::path::PathBuf;
use std::time::Duration;

use crate::download::EngineError;
use crate::download::constants::{
    BUFFER_SIZE, CONNECT_TIMEOUT_SECS, DEFAULT_BASE_DIR, DEFAULT_CONCURRENCY, MAX_BUFFER_SIZE,
    MAX_CONCURRENCY, MIN_BUFFER_SIZE, MIN_CONCURRENCY, PROGRESS_UPDATE_INTERVAL, READ_TIMEOUT_SECS,
};
use crate::user_agent;

/// Configuration for a [`DownloadEngine`](crate::DownloadEngine).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Maximum number of simultaneously executing transfers.
    pub concurrency: usize,
    /// Size of a single read/write buffer in bytes.
    pub buffer_size: usize,
    /// Minimum delay between two progress events of the same task.
    pub progress_interval: Duration,
    /// TCP/TLS connect timeout.
    pub connect_timeout: Duration,
    /// Maximum time a single socket read may stall.
    pub read_timeout: Duration,
    /// Root under which per-category directories are created.
    pub base_dir: PathBuf,
    /// User-Agent header sent with every request.
    pub user_agent: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            buffer_size: BUFFER_SIZE,
            progress_interval: PROGRESS_UPDATE_INTERVAL,
            connect_timeout: Duration::from_secs(CONNECT_TIMEOUT_SECS),
            read_timeout: Duration::from_secs(READ_TIMEOUT_SECS),
            base_dir: PathBuf::from(DEFAULT_BASE_DIR),
            user_agent: user_agent::default_download_user_agent(),
        }
    }
}

impl EngineConfig {
    /// Creates a default configuration rooted at `base_dir`.
    #[must_use]
    pub fn with_base_dir(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            ..Self::default()
        }
    }

    /// Checks every field against its allowed range.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidConcurrency`] when `concurrency` is
    /// outside 1..=100 and [`EngineError::InvalidConfig`] for any other
    /// out-of-range field.
    pub fn validate(&self) -> Result<(), EngineError> {
        if !(MIN_CONCURRENCY..=MAX_CONCURRENCY).contains(&self.concurrency) {
            return Err(EngineError::InvalidConcurrency {
                value: self.concurrency,
            });
        }
        if !(MIN_BUFFER_SIZE..=MAX_BUFFER_SIZE).contains(&self.buffer_size) {
            return Err(EngineError::invalid_config(format!(
                "buffer_size {} must be between {MIN_BUFFER_SIZE} and {MAX_BUFFER_SIZE}",
                self.buffer_size
            )));
        }
        if self.connect_timeout.is_zero() {
            return Err(EngineError::invalid_config("connect_timeout must be non-zero"));
        }
        if self.read_timeout.is_zero() {
            return Err(EngineError::invalid_config("read_timeout must be non-zero"));
        }
        if self.user_agent.trim().is_empty() {
            return Err(EngineError::invalid_config("user_agent must not be empty"));
        }
        Ok(())
    }
}
