//! Constants for the download module (pool size, buffers, timeouts).

use std::time::Duration;

/// Minimum allowed concurrency value.
pub const MIN_CONCURRENCY: usize = 1;

/// Maximum allowed concurrency value.
pub const MAX_CONCURRENCY: usize = 100;

/// Default number of simultaneously executing transfers.
pub const DEFAULT_CONCURRENCY: usize = 3;

/// Size of one read/write buffer (8 KiB).
pub const BUFFER_SIZE: usize = 8192;

/// Smallest accepted buffer size.
pub const MIN_BUFFER_SIZE: usize = 512;

/// Largest accepted buffer size (1 MiB).
pub const MAX_BUFFER_SIZE: usize = 1024 * 1024;

/// At most one progress event per task per interval.
pub const PROGRESS_UPDATE_INTERVAL: Duration = Duration::from_secs(1);

/// Default HTTP connect timeout (30 seconds).
pub const CONNECT_TIMEOUT_SECS: u64 = 30;

/// Default HTTP read timeout (30 seconds per stalled read).
pub const READ_TIMEOUT_SECS: u64 = 30;

/// Default root directory for category subdirectories.
pub const DEFAULT_BASE_DIR: &str = "Downloads";
