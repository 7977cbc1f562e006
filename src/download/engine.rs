//! Download engine façade: task registry, bounded worker pool and control.
//!
//! # Overview
//!
//! [`DownloadEngine`] is a cheaply cloneable handle. Every call returns
//! immediately; transfers run on the Tokio runtime the engine was created
//! in, at most `concurrency` at a time (a FIFO semaphore), and report back
//! through [`DownloadListener`]s.
//!
//! # Example
//!
//! ```no_run
//! use rangeget_core::{DownloadEngine, EngineConfig};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let engine = DownloadEngine::new(EngineConfig::with_base_dir("./downloads"))?;
//! let id = engine.start_download("https://example.com/video.mp4", None, None, None)?;
//! engine.pause_download(&id);
//! engine.resume_download(&id);
//! # Ok(())
//! # }
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use tokio::runtime::Handle;
use tokio::sync::Semaphore;
use tracing::{debug, info, instrument};
use url::Url;

use super::HttpClient;
use super::classify::classify;
use super::constants::{MAX_CONCURRENCY, MIN_CONCURRENCY};
use super::dispatch::{
    DownloadEvent, DownloadListener, EventSender, FileProcessor, ListenerSlot, Registry,
    spawn_dispatcher,
};
use super::filename::resolve_file_name;
use super::progress::{DownloadProgress, TaskState};
use super::task::{DownloadTask, TaskContext, TaskId};
use crate::config::EngineConfig;

/// Error type for download engine operations.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Invalid concurrency value provided.
    #[error(
        "invalid concurrency value {value}: must be between {MIN_CONCURRENCY} and {MAX_CONCURRENCY}"
    )]
    InvalidConcurrency {
        /// The invalid value that was provided.
        value: usize,
    },

    /// Another configuration field is out of range.
    #[error("invalid engine configuration: {message}")]
    InvalidConfig {
        /// What was wrong.
        message: String,
    },

    /// The HTTP client could not be built from the configuration.
    #[error("failed to build HTTP client: {0}")]
    ClientBuild(#[source] reqwest::Error),

    /// The engine was created outside a Tokio runtime.
    #[error("no Tokio runtime available: create the engine from within a runtime")]
    NoRuntime,

    /// The event dispatcher thread could not be started.
    #[error("failed to start event dispatcher: {0}")]
    Dispatcher(#[source] std::io::Error),

    /// The URL could not be parsed.
    #[error("invalid URL: {url}")]
    InvalidUrl {
        /// The URL as given.
        url: String,
    },

    /// Only `http` and `https` are supported.
    #[error("unsupported URL scheme '{scheme}' in {url}")]
    UnsupportedScheme {
        /// The URL as given.
        url: String,
        /// The rejected scheme.
        scheme: String,
    },

    /// An active task already writes to this path.
    #[error("another active download already writes to {path}")]
    DuplicateTarget {
        /// The contested destination.
        path: PathBuf,
    },

    /// `shutdown` was called; no new downloads are accepted.
    #[error("download engine has been shut down")]
    ShutDown,
}

impl EngineError {
    pub(crate) fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }
}

/// Handle to a download engine. Clones share the same engine.
#[derive(Debug, Clone)]
pub struct DownloadEngine {
    inner: Arc<EngineInner>,
}

#[derive(Debug)]
struct EngineInner {
    config: EngineConfig,
    runtime: Handle,
    slots: Arc<Semaphore>,
    registry: Arc<Registry>,
    context: Arc<TaskContext>,
    events: EventSender,
    next_sequence: AtomicU64,
    shut_down: AtomicBool,
}

impl DownloadEngine {
    /// Creates an engine on the current Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidConcurrency`] or
    /// [`EngineError::InvalidConfig`] for an invalid configuration,
    /// [`EngineError::NoRuntime`] outside a runtime,
    /// [`EngineError::ClientBuild`] if the HTTP client cannot be built and
    /// [`EngineError::Dispatcher`] if the dispatcher thread cannot start.
    pub fn new(config: EngineConfig) -> Result<Self, EngineError> {
        Self::build(config, None)
    }

    /// Like [`DownloadEngine::new`], with a hook run on every completed file.
    ///
    /// # Errors
    ///
    /// Same as [`DownloadEngine::new`].
    pub fn with_file_processor(
        config: EngineConfig,
        processor: Arc<dyn FileProcessor>,
    ) -> Result<Self, EngineError> {
        Self::build(config, Some(processor))
    }

    fn build(
        config: EngineConfig,
        processor: Option<Arc<dyn FileProcessor>>,
    ) -> Result<Self, EngineError> {
        config.validate()?;
        let runtime = Handle::try_current().map_err(|_| EngineError::NoRuntime)?;
        let client = HttpClient::from_config(&config)?;

        let registry = Arc::new(Registry::default());
        let (events, _dispatcher) =
            spawn_dispatcher(Arc::clone(&registry), processor).map_err(EngineError::Dispatcher)?;
        let context = Arc::new(TaskContext {
            client,
            events: events.clone(),
            buffer_size: config.buffer_size,
            progress_interval: config.progress_interval,
        });

        info!(
            concurrency = config.concurrency,
            base_dir = %config.base_dir.display(),
            "download engine started"
        );

        Ok(Self {
            inner: Arc::new(EngineInner {
                slots: Arc::new(Semaphore::new(config.concurrency)),
                config,
                runtime,
                registry,
                context,
                events,
                next_sequence: AtomicU64::new(1),
                shut_down: AtomicBool::new(false),
            }),
        })
    }

    /// Registers a download and queues it for the worker pool.
    ///
    /// `file_name` defaults to the URL's last path segment (or a timestamp
    /// name) and `target_dir` to `<base_dir>/<category>` by file type. The
    /// optional listener is registered before the task can start.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidUrl`], [`EngineError::UnsupportedScheme`],
    /// [`EngineError::DuplicateTarget`] or [`EngineError::ShutDown`]. Network
    /// and disk problems are reported later through `on_download_failed`.
    #[instrument(skip(self, listener), fields(task_id))]
    pub fn start_download(
        &self,
        url: &str,
        file_name: Option<&str>,
        target_dir: Option<&Path>,
        listener: Option<Arc<dyn DownloadListener>>,
    ) -> Result<TaskId, EngineError> {
        if self.is_shut_down() {
            return Err(EngineError::ShutDown);
        }
        let parsed = Url::parse(url).map_err(|_| EngineError::InvalidUrl {
            url: url.to_string(),
        })?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(EngineError::UnsupportedScheme {
                url: url.to_string(),
                scheme: parsed.scheme().to_string(),
            });
        }

        let file_name = resolve_file_name(&parsed, file_name);
        let target_dir = target_dir.map_or_else(
            || self.inner.config.base_dir.join(classify(&file_name).dir_name()),
            Path::to_path_buf,
        );
        let destination = target_dir.join(&file_name);
        if self
            .inner
            .registry
            .tasks
            .iter()
            .any(|entry| !entry.state().is_terminal() && entry.file_path() == destination)
        {
            return Err(EngineError::DuplicateTarget { path: destination });
        }

        let sequence = self.inner.next_sequence.fetch_add(1, Ordering::SeqCst);
        let task_id = TaskId::generate(sequence);
        tracing::Span::current().record("task_id", task_id.as_str());

        let task = Arc::new(DownloadTask::new(
            task_id.clone(),
            url.to_string(),
            file_name,
            target_dir,
        ));
        if let Some(listener) = listener {
            self.inner
                .registry
                .listeners
                .insert(task_id.clone(), ListenerSlot::new(listener));
        }
        self.inner
            .registry
            .tasks
            .insert(task_id.clone(), Arc::clone(&task));

        info!(path = %destination.display(), "download queued");
        self.submit(task);
        Ok(task_id)
    }

    fn submit(&self, task: Arc<DownloadTask>) {
        let slots = Arc::clone(&self.inner.slots);
        let context = Arc::clone(&self.inner.context);
        self.inner.runtime.spawn(async move {
            let Ok(_permit) = slots.acquire_owned().await else {
                debug!(task_id = %task.id(), "worker pool closed before task started");
                return;
            };
            task.execute(&context).await;
        });
    }

    /// Requests a cooperative pause; the worker stops at its next buffer.
    ///
    /// Returns false for unknown or finished tasks.
    #[instrument(skip(self))]
    pub fn pause_download(&self, task_id: &str) -> bool {
        self.inner
            .registry
            .tasks
            .get(task_id)
            .is_some_and(|task| task.request_pause())
    }

    /// Resumes a paused task from the bytes already on disk.
    ///
    /// Only a task in state `Paused` can be resumed; a pause that has been
    /// requested but not yet observed by the worker returns false.
    #[instrument(skip(self))]
    pub fn resume_download(&self, task_id: &str) -> bool {
        // The write guard keeps `pause_download` and `cancel_download` for
        // this id out until the task is back in `Queued`.
        let task = {
            let Some(entry) = self.inner.registry.tasks.get_mut(task_id) else {
                return false;
            };
            if !entry.prepare_resume() {
                return false;
            }
            Arc::clone(entry.value())
        };
        self.inner.events.emit(DownloadEvent::Resumed {
            task_id: task.id().clone(),
        });
        self.submit(task);
        true
    }

    /// Cancels a task and forgets it. The partial file is kept on disk.
    ///
    /// Returns true exactly once per task; later calls return false.
    #[instrument(skip(self))]
    pub fn cancel_download(&self, task_id: &str) -> bool {
        let Some((_, task)) = self.inner.registry.tasks.remove(task_id) else {
            return false;
        };
        if !task.cancel() {
            // Finished while we raced it; its own terminal event is in flight.
            return false;
        }
        info!(task_id = %task.id(), "download cancelled");
        self.inner.events.emit(DownloadEvent::Cancelled {
            task_id: task.id().clone(),
        });
        true
    }

    /// Cancels every registered task and returns how many were cancelled.
    pub fn cancel_all(&self) -> usize {
        let ids: Vec<TaskId> = self
            .inner
            .registry
            .tasks
            .iter()
            .map(|entry| entry.key().clone())
            .collect();
        ids.iter()
            .filter(|id| self.cancel_download(id.as_str()))
            .count()
    }

    /// Snapshot of a registered task, `None` once it is gone.
    #[must_use]
    pub fn download_progress(&self, task_id: &str) -> Option<DownloadProgress> {
        self.inner
            .registry
            .tasks
            .get(task_id)
            .map(|task| task.snapshot())
    }

    /// Snapshots of every registered task.
    #[must_use]
    pub fn tasks(&self) -> Vec<(TaskId, DownloadProgress)> {
        self.inner
            .registry
            .tasks
            .iter()
            .map(|entry| (entry.key().clone(), entry.snapshot()))
            .collect()
    }

    /// Replaces the listener of a registered task.
    ///
    /// Returns false when the task is unknown.
    pub fn add_download_listener(&self, task_id: &str, listener: Arc<dyn DownloadListener>) -> bool {
        // Inserted under the task entry: terminal cleanup removes the task
        // before the listener, so the insert cannot outlive the task.
        let replaced = {
            let Some(task) = self.inner.registry.tasks.get(task_id) else {
                return false;
            };
            self.inner
                .registry
                .listeners
                .insert(task.key().clone(), ListenerSlot::new(listener))
        };
        if let Some(replaced) = replaced {
            self.inner.registry.detach(&replaced);
        }
        true
    }

    /// Detaches a task's listener. Once this returns the listener is not
    /// called again; a callback already running on another thread is
    /// waited for.
    pub fn remove_download_listener(&self, task_id: &str) -> bool {
        self.inner.registry.remove_listener(task_id)
    }

    /// Sets a listener that observes every task, replacing any previous one.
    pub fn set_global_listener(&self, listener: Arc<dyn DownloadListener>) {
        self.inner.registry.replace_global(Some(listener));
    }

    /// Removes the listener set by [`DownloadEngine::set_global_listener`].
    pub fn clear_global_listener(&self) {
        self.inner.registry.replace_global(None);
    }

    /// Tasks currently transferring.
    #[must_use]
    pub fn running_count(&self) -> usize {
        self.count_in(TaskState::Running)
    }

    /// Tasks waiting for a worker slot.
    #[must_use]
    pub fn queued_count(&self) -> usize {
        self.count_in(TaskState::Queued)
    }

    /// All registered tasks, whatever their state.
    #[must_use]
    pub fn task_count(&self) -> usize {
        self.inner.registry.tasks.len()
    }

    fn count_in(&self, state: TaskState) -> usize {
        self.inner
            .registry
            .tasks
            .iter()
            .filter(|entry| entry.state() == state)
            .count()
    }

    /// Maximum number of simultaneous transfers.
    #[must_use]
    pub fn concurrency(&self) -> usize {
        self.inner.config.concurrency
    }

    /// The validated configuration this engine was built with.
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    /// Stops accepting downloads, cancels every task and closes the pool.
    ///
    /// Returns the number of tasks cancelled.
    pub fn shutdown(&self) -> usize {
        if self.inner.shut_down.swap(true, Ordering::SeqCst) {
            return 0;
        }
        let cancelled = self.cancel_all();
        self.inner.slots.close();
        info!(cancelled, "download engine shut down");
        cancelled
    }

    /// True once [`DownloadEngine::shutdown`] has run.
    #[must_use]
    pub fn is_shut_down(&self) -> bool {
        self.inner.shut_down.load(Ordering::SeqCst)
    }
}
