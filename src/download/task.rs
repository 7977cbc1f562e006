//! A single resumable transfer and its state machine.
//!
//! The worker that runs a task is the only writer of its counters; every
//! other thread reads them through atomics or a [`DownloadProgress`]
//! snapshot. State changes go through compare-and-swap so no transition can
//! leave a terminal state, whichever thread gets there first.

use std::borrow::Borrow;
use std::fmt;
use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicU64, Ordering};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use serde::Serialize;
use tokio::fs::OpenOptions;
use tokio::io::{AsyncSeekExt, AsyncWriteExt, BufWriter};
use tracing::{debug, info, instrument, warn};

use super::dispatch::{DownloadEvent, EventSender};
use super::error::DownloadError;
use super::progress::{DownloadProgress, ProgressThrottle, TaskState, percent, speed};
use super::HttpClient;

/// Sentinel stored in `total_bytes` while the size is unknown.
const UNKNOWN_TOTAL: u64 = u64::MAX;

/// Opaque, unique task identifier (`download_<unix-millis>_<sequence>`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(Arc<str>);

impl TaskId {
    pub(crate) fn generate(sequence: u64) -> Self {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or(0);
        Self(Arc::from(format!("download_{millis}_{sequence}")))
    }

    /// The identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Serialize for TaskId {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for TaskId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl std::ops::Deref for TaskId {
    type Target = str;

    fn deref(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for TaskId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<&str> for TaskId {
    fn from(value: &str) -> Self {
        Self(Arc::from(value))
    }
}

/// Everything a worker needs besides the task itself.
#[derive(Debug)]
pub(crate) struct TaskContext {
    pub(crate) client: HttpClient,
    pub(crate) events: EventSender,
    pub(crate) buffer_size: usize,
    pub(crate) progress_interval: Duration,
}

/// How a transfer loop ended when no error occurred.
#[derive(Debug)]
enum TransferOutcome {
    Finished(PathBuf),
    Paused,
    Cancelled,
}

/// One file transfer.
#[derive(Debug)]
pub(crate) struct DownloadTask {
    id: TaskId,
    url: String,
    file_name: String,
    target_dir: PathBuf,
    state: AtomicU8,
    downloaded_bytes: AtomicU64,
    total_bytes: AtomicU64,
    pause_requested: AtomicBool,
    cancel_requested: AtomicBool,
    started_at: Instant,
}

impl DownloadTask {
    pub(crate) fn new(id: TaskId, url: String, file_name: String, target_dir: PathBuf) -> Self {
        Self {
            id,
            url,
            file_name,
            target_dir,
            state: AtomicU8::new(TaskState::Queued as u8),
            downloaded_bytes: AtomicU64::new(0),
            total_bytes: AtomicU64::new(UNKNOWN_TOTAL),
            pause_requested: AtomicBool::new(false),
            cancel_requested: AtomicBool::new(false),
            started_at: Instant::now(),
        }
    }

    pub(crate) fn id(&self) -> &TaskId {
        &self.id
    }

    pub(crate) fn file_path(&self) -> PathBuf {
        self.target_dir.join(&self.file_name)
    }

    pub(crate) fn state(&self) -> TaskState {
        TaskState::from_u8(self.state.load(Ordering::SeqCst))
    }

    fn total(&self) -> Option<u64> {
        let total = self.total_bytes.load(Ordering::SeqCst);
        (total != UNKNOWN_TOTAL).then_some(total)
    }

    /// Moves `from → to` atomically; false if the current state is not `from`.
    pub(crate) fn transition(&self, from: TaskState, to: TaskState) -> bool {
        self.state
            .compare_exchange(from as u8, to as u8, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    /// Sets the cooperative pause flag. False once the task is terminal.
    pub(crate) fn request_pause(&self) -> bool {
        if self.state().is_terminal() {
            return false;
        }
        self.pause_requested.store(true, Ordering::SeqCst);
        true
    }

    /// Clears the pause flag and moves `Paused → Queued`, ready for
    /// resubmission.
    ///
    /// The flag is cleared while the task is still `Paused`, so a pause
    /// requested after the transition survives and is honored by the worker.
    pub(crate) fn prepare_resume(&self) -> bool {
        if self.state() != TaskState::Paused {
            return false;
        }
        self.pause_requested.store(false, Ordering::SeqCst);
        self.transition(TaskState::Paused, TaskState::Queued)
    }

    /// Sets the cancel flag and moves any non-terminal state to `Cancelled`.
    ///
    /// Returns true only for the call that performed the transition.
    pub(crate) fn cancel(&self) -> bool {
        self.cancel_requested.store(true, Ordering::SeqCst);
        let mut current = self.state.load(Ordering::SeqCst);
        loop {
            if TaskState::from_u8(current).is_terminal() {
                return false;
            }
            match self.state.compare_exchange(
                current,
                TaskState::Cancelled as u8,
                Ordering::SeqCst,
                Ordering::SeqCst,
            ) {
                Ok(_) => return true,
                Err(actual) => current = actual,
            }
        }
    }

    fn is_cancel_requested(&self) -> bool {
        self.cancel_requested.load(Ordering::SeqCst)
    }

    pub(crate) fn is_pause_requested(&self) -> bool {
        self.pause_requested.load(Ordering::SeqCst)
    }

    pub(crate) fn snapshot(&self) -> DownloadProgress {
        let downloaded = self.downloaded_bytes.load(Ordering::SeqCst);
        let total = self.total();
        DownloadProgress {
            downloaded_bytes: downloaded,
            total_bytes: total,
            percent: percent(downloaded, total),
            file_name: self.file_name.clone(),
            state: self.state(),
            speed: speed(downloaded, self.started_at.elapsed()),
        }
    }

    /// Runs one submission of the task; called once a worker slot is held.
    ///
    /// Every error is converted into `Failed` here and never reaches the
    /// spawned future's join handle.
    #[instrument(skip(self, ctx), fields(task_id = %self.id, url = %self.url))]
    pub(crate) async fn execute(&self, ctx: &TaskContext) {
        if self.is_cancel_requested() {
            debug!("task cancelled before start");
            return;
        }
        if self.is_pause_requested() {
            if self.transition(TaskState::Queued, TaskState::Paused) {
                debug!("task paused before start");
                ctx.events.emit(DownloadEvent::Paused {
                    task_id: self.id.clone(),
                });
            }
            return;
        }
        if !self.transition(TaskState::Queued, TaskState::Running) {
            return;
        }

        match self.transfer(ctx).await {
            Ok(TransferOutcome::Finished(path)) => {
                if self.transition(TaskState::Running, TaskState::Completed) {
                    info!(
                        path = %path.display(),
                        bytes = self.downloaded_bytes.load(Ordering::SeqCst),
                        "download complete"
                    );
                    ctx.events.emit(DownloadEvent::Completed {
                        task_id: self.id.clone(),
                        file_path: path,
                    });
                }
            }
            Ok(TransferOutcome::Paused) => {
                if self.transition(TaskState::Running, TaskState::Paused) {
                    debug!(
                        bytes = self.downloaded_bytes.load(Ordering::SeqCst),
                        "download paused"
                    );
                    ctx.events.emit(DownloadEvent::Paused {
                        task_id: self.id.clone(),
                    });
                }
            }
            Ok(TransferOutcome::Cancelled) => {
                // The engine already moved the task to Cancelled and reported it.
                debug!("download cancelled");
            }
            Err(error) => {
                if self.transition(TaskState::Running, TaskState::Failed) {
                    warn!(error = %error, "download failed");
                    ctx.events.emit(DownloadEvent::Failed {
                        task_id: self.id.clone(),
                        message: error.to_string(),
                    });
                }
            }
        }
    }

    async fn transfer(&self, ctx: &TaskContext) -> Result<TransferOutcome, DownloadError> {
        let path = self.file_path();
        tokio::fs::create_dir_all(&self.target_dir)
            .await
            .map_err(|e| DownloadError::io(self.target_dir.clone(), e))?;

        let existing = existing_length(&path).await?;
        self.downloaded_bytes.store(existing, Ordering::SeqCst);

        let response = ctx.client.open(&self.url, existing).await?;
        let offset = response.start_offset();
        let total = response.total_bytes();
        if offset != existing {
            debug!(existing, "server ignored range request; restarting from zero");
        }
        self.downloaded_bytes.store(offset, Ordering::SeqCst);
        self.total_bytes
            .store(total.unwrap_or(UNKNOWN_TOTAL), Ordering::SeqCst);

        ctx.events.emit(DownloadEvent::Started {
            task_id: self.id.clone(),
            file_name: self.file_name.clone(),
            total_bytes: total,
        });

        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .await
            .map_err(|e| DownloadError::io(path.clone(), e))?;
        if offset < existing {
            file.set_len(offset)
                .await
                .map_err(|e| DownloadError::io(path.clone(), e))?;
        }
        let mut writer = BufWriter::with_capacity(ctx.buffer_size, file);
        writer
            .seek(SeekFrom::Start(offset))
            .await
            .map_err(|e| DownloadError::io(path.clone(), e))?;

        let mut body = response.into_body();
        let mut throttle = ProgressThrottle::new(ctx.progress_interval);
        let mut downloaded = offset;

        let outcome = 'read: loop {
            let Some(chunk) = body.next_chunk().await else {
                break 'read None;
            };
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(error) => {
                    // Keep what was received so a later run can resume from it.
                    if let Err(flush_error) = writer.flush().await {
                        warn!(
                            path = %path.display(),
                            error = %flush_error,
                            "flush after network error failed"
                        );
                    }
                    return Err(error);
                }
            };

            for piece in chunk.chunks(ctx.buffer_size) {
                if self.is_cancel_requested() {
                    break 'read Some(TransferOutcome::Cancelled);
                }
                if self.is_pause_requested() {
                    break 'read Some(TransferOutcome::Paused);
                }

                writer
                    .write_all(piece)
                    .await
                    .map_err(|e| DownloadError::io(path.clone(), e))?;
                downloaded += piece.len() as u64;
                self.downloaded_bytes.store(downloaded, Ordering::SeqCst);

                if throttle.ready() {
                    ctx.events.emit(DownloadEvent::Progress {
                        task_id: self.id.clone(),
                        downloaded_bytes: downloaded,
                        total_bytes: total,
                        percent: percent(downloaded, total),
                    });
                }
            }
        };

        writer
            .flush()
            .await
            .map_err(|e| DownloadError::io(path.clone(), e))?;
        drop(writer);

        if let Some(stopped) = outcome {
            return Ok(stopped);
        }

        if let Some(expected) = total
            && expected != downloaded
        {
            return Err(DownloadError::integrity(path, expected, downloaded));
        }
        Ok(TransferOutcome::Finished(path))
    }
}

/// Length of a partial file from an earlier run, zero when absent.
async fn existing_length(path: &Path) -> Result<u64, DownloadError> {
    match tokio::fs::metadata(path).await {
        Ok(meta) => Ok(meta.len()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(0),
        Err(e) => Err(DownloadError::io(path, e)),
    }
}
