//! Task state, progress snapshots and progress rate limiting.

use std::fmt;
use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;

/// Lifecycle state of a download task.
///
/// `Cancelled`, `Completed` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum TaskState {
    /// Registered, waiting for a worker slot.
    Queued = 0,
    /// Transfer loop executing.
    Running = 1,
    /// Stopped on request; the partial file stays on disk.
    Paused = 2,
    Cancelled = 3,
    Completed = 4,
    Failed = 5,
}

impl TaskState {
    /// True for states no transition leaves.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Cancelled | Self::Completed | Self::Failed)
    }

    pub(crate) fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Queued,
            1 => Self::Running,
            2 => Self::Paused,
            3 => Self::Cancelled,
            4 => Self::Completed,
            _ => Self::Failed,
        }
    }

    /// Stable lowercase label.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Paused => "paused",
            Self::Cancelled => "cancelled",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable point-in-time view of a task's progress.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DownloadProgress {
    /// Bytes present in the destination file.
    pub downloaded_bytes: u64,
    /// Full resource size, when the server announced it.
    pub total_bytes: Option<u64>,
    /// Completion percentage, 0 when the total is unknown.
    pub percent: u8,
    /// Destination file name.
    pub file_name: String,
    /// State at the time of the snapshot.
    pub state: TaskState,
    /// Average bytes per second since the task was created.
    pub speed: u64,
}

/// Completion percentage, clamped to 100.
#[must_use]
pub fn percent(downloaded: u64, total: Option<u64>) -> u8 {
    match total {
        None => 0,
        Some(0) => 100,
        Some(total) => {
            let pct = u128::from(downloaded) * 100 / u128::from(total);
            u8::try_from(pct.min(100)).unwrap_or(100)
        }
    }
}

/// Average throughput in bytes per second.
#[must_use]
pub fn speed(downloaded: u64, elapsed: Duration) -> u64 {
    let millis = elapsed.as_millis();
    if millis == 0 {
        return 0;
    }
    u64::try_from(u128::from(downloaded) * 1000 / millis).unwrap_or(u64::MAX)
}

/// Lets at most one progress event through per interval.
#[derive(Debug)]
pub struct ProgressThrottle {
    interval: Duration,
    last: Instant,
}

impl ProgressThrottle {
    /// Starts the window now, so the first event fires one interval later.
    #[must_use]
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last: Instant::now(),
        }
    }

    /// Returns true (and restarts the window) when an event may be emitted.
    pub fn ready(&mut self) -> bool {
        self.ready_at(Instant::now())
    }

    fn ready_at(&mut self, now: Instant) -> bool {
        if now.saturating_duration_since(self.last) >= self.interval {
            self.last = now;
            true
        } else {
            false
        }
    }
}
