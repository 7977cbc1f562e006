//! Terminal progress bars and outcome collection for a CLI run.

use std::path::{Path, PathBuf};

use dashmap::DashMap;
use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};
use rangeget_core::{DownloadListener, TaskId};
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::warn;

/// How a task ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Outcome {
    Completed(PathBuf),
    Failed(String),
    Cancelled,
}

/// Global listener drawing one bar per task and forwarding terminal events.
pub(crate) struct ProgressReporter {
    multi: MultiProgress,
    bars: DashMap<TaskId, ProgressBar>,
    outcomes: mpsc::UnboundedSender<(TaskId, Outcome)>,
}

impl ProgressReporter {
    /// Returns the reporter and the receiving end of the outcome channel.
    ///
    /// With `visible == false` bars are tracked but never drawn.
    pub(crate) fn new(visible: bool) -> (Self, mpsc::UnboundedReceiver<(TaskId, Outcome)>) {
        let target = if visible {
            ProgressDrawTarget::stderr()
        } else {
            ProgressDrawTarget::hidden()
        };
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                multi: MultiProgress::with_draw_target(target),
                bars: DashMap::new(),
                outcomes: tx,
            },
            rx,
        )
    }

    fn bar_for(&self, task_id: &TaskId) -> ProgressBar {
        self.bars
            .entry(task_id.clone())
            .or_insert_with(|| self.multi.add(ProgressBar::new_spinner()))
            .clone()
    }

    fn finish(&self, task_id: &TaskId, message: String, outcome: Outcome) {
        if let Some((_, bar)) = self.bars.remove(task_id) {
            bar.abandon_with_message(message);
        }
        if self.outcomes.send((task_id.clone(), outcome)).is_err() {
            warn!(%task_id, "outcome dropped: run summary no longer collecting");
        }
    }
}

fn sized_style() -> ProgressStyle {
    ProgressStyle::with_template(
        "{msg:30!} [{bar:30}] {bytes}/{total_bytes} {bytes_per_sec} eta {eta}",
    )
    .unwrap_or_else(|_| ProgressStyle::default_bar())
    .progress_chars("=> ")
}

fn unsized_style() -> ProgressStyle {
    ProgressStyle::with_template("{spinner} {msg:30!} {bytes} {bytes_per_sec}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
}

impl DownloadListener for ProgressReporter {
    fn on_download_started(&self, task_id: &TaskId, file_name: &str, total_bytes: Option<u64>) {
        let bar = self.bar_for(task_id);
        match total_bytes {
            Some(total) => {
                bar.set_style(sized_style());
                bar.set_length(total);
            }
            None => bar.set_style(unsized_style()),
        }
        bar.set_message(file_name.to_string());
    }

    fn on_download_progress(
        &self,
        task_id: &TaskId,
        downloaded_bytes: u64,
        _total_bytes: Option<u64>,
        _percent: u8,
    ) {
        if let Some(bar) = self.bars.get(task_id) {
            bar.set_position(downloaded_bytes);
        }
    }

    fn on_download_completed(&self, task_id: &TaskId, file_path: &Path) {
        self.finish(
            task_id,
            format!("done {}", file_path.display()),
            Outcome::Completed(file_path.to_path_buf()),
        );
    }

    fn on_download_failed(&self, task_id: &TaskId, message: &str) {
        self.finish(
            task_id,
            format!("failed: {message}"),
            Outcome::Failed(message.to_string()),
        );
    }

    fn on_download_cancelled(&self, task_id: &TaskId) {
        self.finish(task_id, "cancelled".to_string(), Outcome::Cancelled);
    }
}

/// Tally of a CLI run, printed as JSON with `--json`.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub(crate) struct RunSummary {
    pub(crate) completed: Vec<PathBuf>,
    pub(crate) failed: Vec<FailedTask>,
    pub(crate) cancelled: usize,
    /// URLs the engine refused to queue.
    pub(crate) rejected: Vec<RejectedUrl>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub(crate) struct FailedTask {
    pub(crate) task_id: TaskId,
    pub(crate) error: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub(crate) struct RejectedUrl {
    pub(crate) url: String,
    pub(crate) error: String,
}

impl RunSummary {
    pub(crate) fn record(&mut self, task_id: TaskId, outcome: Outcome) {
        match outcome {
            Outcome::Completed(path) => self.completed.push(path),
            Outcome::Failed(error) => self.failed.push(FailedTask { task_id, error }),
            Outcome::Cancelled => self.cancelled += 1,
        }
    }

    pub(crate) fn finished(&self) -> usize {
        self.completed.len() + self.failed.len() + self.cancelled
    }

    pub(crate) fn reject(&mut self, url: &str, error: String) {
        self.rejected.push(RejectedUrl {
            url: url.to_string(),
            error,
        });
    }

    pub(crate) fn is_success(&self) -> bool {
        self.failed.is_empty() && self.cancelled == 0 && self.rejected.is_empty()
    }
}
