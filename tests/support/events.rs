//! Listener that records every callback for assertions.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use rangeget_core::{DownloadListener, TaskId};
use tokio::sync::mpsc;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Started { total: Option<u64> },
    Progress { downloaded: u64, total: Option<u64>, percent: u8 },
    Paused,
    Resumed,
    Completed(PathBuf),
    Failed(String),
    Cancelled,
}

impl Event {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed(_) | Self::Failed(_) | Self::Cancelled)
    }
}

pub struct RecordingListener {
    log: Mutex<Vec<(TaskId, Event)>>,
    tx: mpsc::UnboundedSender<(TaskId, Event)>,
}

pub struct EventStream {
    rx: mpsc::UnboundedReceiver<(TaskId, Event)>,
    backlog: Vec<(TaskId, Event)>,
}

impl RecordingListener {
    pub fn new() -> (Arc<Self>, EventStream) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Arc::new(Self {
                log: Mutex::new(Vec::new()),
                tx,
            }),
            EventStream {
                rx,
                backlog: Vec::new(),
            },
        )
    }

    fn push(&self, task_id: &TaskId, event: Event) {
        self.log.lock().unwrap().push((task_id.clone(), event.clone()));
        let _ = self.tx.send((task_id.clone(), event));
    }

    /// Events recorded for one task, in delivery order.
    pub fn events_for(&self, task_id: &TaskId) -> Vec<Event> {
        self.log
            .lock()
            .unwrap()
            .iter()
            .filter(|(id, _)| id == task_id)
            .map(|(_, event)| event.clone())
            .collect()
    }

    pub fn terminal_count(&self, task_id: &TaskId) -> usize {
        self.events_for(task_id)
            .iter()
            .filter(|event| event.is_terminal())
            .count()
    }
}

impl DownloadListener for RecordingListener {
    fn on_download_started(&self, task_id: &TaskId, _file_name: &str, total_bytes: Option<u64>) {
        self.push(task_id, Event::Started { total: total_bytes });
    }

    fn on_download_progress(
        &self,
        task_id: &TaskId,
        downloaded_bytes: u64,
        total_bytes: Option<u64>,
        percent: u8,
    ) {
        self.push(
            task_id,
            Event::Progress {
                downloaded: downloaded_bytes,
                total: total_bytes,
                percent,
            },
        );
    }

    fn on_download_paused(&self, task_id: &TaskId) {
        self.push(task_id, Event::Paused);
    }

    fn on_download_resumed(&self, task_id: &TaskId) {
        self.push(task_id, Event::Resumed);
    }

    fn on_download_completed(&self, task_id: &TaskId, file_path: &Path) {
        self.push(task_id, Event::Completed(file_path.to_path_buf()));
    }

    fn on_download_failed(&self, task_id: &TaskId, message: &str) {
        self.push(task_id, Event::Failed(message.to_string()));
    }

    fn on_download_cancelled(&self, task_id: &TaskId) {
        self.push(task_id, Event::Cancelled);
    }
}

impl EventStream {
    /// Waits for the first event of `task_id` matching `pred`.
    ///
    /// Events of other tasks are kept for later calls.
    pub async fn wait_for(
        &mut self,
        task_id: &TaskId,
        timeout: Duration,
        pred: impl Fn(&Event) -> bool,
    ) -> Option<Event> {
        if let Some(index) = self
            .backlog
            .iter()
            .position(|(id, event)| id == task_id && pred(event))
        {
            return Some(self.backlog.remove(index).1);
        }
        let rx = &mut self.rx;
        let backlog = &mut self.backlog;
        tokio::time::timeout(timeout, async {
            while let Some((id, event)) = rx.recv().await {
                if &id == task_id && pred(&event) {
                    return Some(event);
                }
                backlog.push((id, event));
            }
            None
        })
        .await
        .ok()
        .flatten()
    }

    /// Waits for the terminal event of `task_id`.
    pub async fn wait_terminal(&mut self, task_id: &TaskId, timeout: Duration) -> Option<Event> {
        self.wait_for(task_id, timeout, Event::is_terminal).await
    }
}

/// Polls `cond` every 10 ms until it holds or `timeout` elapses.
pub async fn eventually(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if cond() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    cond()
}
