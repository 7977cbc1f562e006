//! Listener traits and the event dispatcher thread.
//!
//! Workers and the engine never call listeners directly. They push a
//! [`DownloadEvent`] onto an unbounded channel and one dedicated OS thread
//! delivers events in order, so callbacks for a task never run concurrently
//! with each other and never run on a runtime worker.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, OnceLock, PoisonError, RwLock};
use std::thread::{self, JoinHandle, ThreadId};

use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::{debug, trace};

use super::task::{DownloadTask, TaskId};

/// Receives lifecycle notifications for download tasks.
///
/// Every method has an empty default, so implementors only override what
/// they need. Callbacks run on the engine's dispatcher thread, one at a
/// time. A slow callback delays later events but never a transfer.
///
/// Callbacks may call back into the engine, for example to start the next
/// download from `on_download_completed`. Once removal of a listener has
/// returned it is never called again; a removal issued from another thread
/// waits for a callback already in progress.
pub trait DownloadListener: Send + Sync {
    /// The transfer started (or restarted after a resume).
    fn on_download_started(
        &self,
        _task_id: &TaskId,
        _file_name: &str,
        _total_bytes: Option<u64>,
    ) {
    }

    /// Rate-limited progress, roughly once per progress interval.
    fn on_download_progress(
        &self,
        _task_id: &TaskId,
        _downloaded_bytes: u64,
        _total_bytes: Option<u64>,
        _percent: u8,
    ) {
    }

    fn on_download_paused(&self, _task_id: &TaskId) {}

    fn on_download_resumed(&self, _task_id: &TaskId) {}

    /// Terminal. `file_path` is the complete file on disk.
    fn on_download_completed(&self, _task_id: &TaskId, _file_path: &Path) {}

    /// Terminal. `message` describes the failure.
    fn on_download_failed(&self, _task_id: &TaskId, _message: &str) {}

    /// Terminal.
    fn on_download_cancelled(&self, _task_id: &TaskId) {}
}

/// Post-processing hook for completed files (indexing, moving, scanning).
///
/// Runs on the dispatcher thread after listeners saw the completion.
pub trait FileProcessor: Send + Sync {
    fn process(&self, task_id: &TaskId, file_path: &Path);
}

#[derive(Debug, Clone)]
pub(crate) enum DownloadEvent {
    Started {
        task_id: TaskId,
        file_name: String,
        total_bytes: Option<u64>,
    },
    Progress {
        task_id: TaskId,
        downloaded_bytes: u64,
        total_bytes: Option<u64>,
        percent: u8,
    },
    Paused {
        task_id: TaskId,
    },
    Resumed {
        task_id: TaskId,
    },
    Completed {
        task_id: TaskId,
        file_path: PathBuf,
    },
    Failed {
        task_id: TaskId,
        message: String,
    },
    Cancelled {
        task_id: TaskId,
    },
}

impl DownloadEvent {
    fn task_id(&self) -> &TaskId {
        match self {
            Self::Started { task_id, .. }
            | Self::Progress { task_id, .. }
            | Self::Paused { task_id }
            | Self::Resumed { task_id }
            | Self::Completed { task_id, .. }
            | Self::Failed { task_id, .. }
            | Self::Cancelled { task_id } => task_id,
        }
    }

    fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Completed { .. } | Self::Failed { .. } | Self::Cancelled { .. }
        )
    }

    fn deliver(&self, listener: &dyn DownloadListener) {
        match self {
            Self::Started {
                task_id,
                file_name,
                total_bytes,
            } => listener.on_download_started(task_id, file_name, *total_bytes),
            Self::Progress {
                task_id,
                downloaded_bytes,
                total_bytes,
                percent,
            } => listener.on_download_progress(task_id, *downloaded_bytes, *total_bytes, *percent),
            Self::Paused { task_id } => listener.on_download_paused(task_id),
            Self::Resumed { task_id } => listener.on_download_resumed(task_id),
            Self::Completed { task_id, file_path } => {
                listener.on_download_completed(task_id, file_path);
            }
            Self::Failed { task_id, message } => listener.on_download_failed(task_id, message),
            Self::Cancelled { task_id } => listener.on_download_cancelled(task_id),
        }
    }
}

/// A registered listener plus the gate that makes removal final.
pub(crate) struct ListenerSlot {
    listener: Arc<dyn DownloadListener>,
    detached: AtomicBool,
    delivering: Mutex<()>,
}

impl ListenerSlot {
    pub(crate) fn new(listener: Arc<dyn DownloadListener>) -> Arc<Self> {
        Arc::new(Self {
            listener,
            detached: AtomicBool::new(false),
            delivering: Mutex::new(()),
        })
    }

    fn deliver(&self, event: &DownloadEvent) {
        let _delivering = self.delivering.lock().unwrap_or_else(PoisonError::into_inner);
        if self.detached.load(Ordering::SeqCst) {
            return;
        }
        event.deliver(self.listener.as_ref());
    }
}

/// Registries shared by the engine façade and the dispatcher.
#[derive(Default)]
pub(crate) struct Registry {
    pub(crate) tasks: DashMap<TaskId, Arc<DownloadTask>>,
    pub(crate) listeners: DashMap<TaskId, Arc<ListenerSlot>>,
    pub(crate) global: RwLock<Option<Arc<ListenerSlot>>>,
    dispatcher: OnceLock<ThreadId>,
}

impl Registry {
    /// Stops `slot` from being called again.
    ///
    /// Off the dispatcher thread this waits for a callback in progress. On
    /// it, the caller is that callback, so only the flag is set. Must be
    /// called without any registry guard held.
    pub(crate) fn detach(&self, slot: &ListenerSlot) {
        slot.detached.store(true, Ordering::SeqCst);
        let on_dispatcher = self
            .dispatcher
            .get()
            .is_some_and(|id| *id == thread::current().id());
        if !on_dispatcher {
            drop(slot.delivering.lock().unwrap_or_else(PoisonError::into_inner));
        }
    }

    pub(crate) fn remove_listener(&self, task_id: &str) -> bool {
        let Some((_, slot)) = self.listeners.remove(task_id) else {
            return false;
        };
        self.detach(&slot);
        true
    }

    pub(crate) fn replace_global(&self, listener: Option<Arc<dyn DownloadListener>>) {
        let previous = match self.global.write() {
            Ok(mut global) => std::mem::replace(&mut *global, listener.map(ListenerSlot::new)),
            Err(_) => None,
        };
        if let Some(previous) = previous {
            self.detach(&previous);
        }
    }

    fn task_listener(&self, task_id: &TaskId) -> Option<Arc<ListenerSlot>> {
        self.listeners
            .get(task_id)
            .map(|entry| Arc::clone(entry.value()))
    }

    fn global_listener(&self) -> Option<Arc<ListenerSlot>> {
        self.global.read().ok().and_then(|global| global.clone())
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("tasks", &self.tasks.len())
            .field("listeners", &self.listeners.len())
            .finish_non_exhaustive()
    }
}

/// Cloneable producer side of the event channel.
#[derive(Debug, Clone)]
pub(crate) struct EventSender(mpsc::UnboundedSender<DownloadEvent>);

impl EventSender {
    pub(crate) fn emit(&self, event: DownloadEvent) {
        if self.0.send(event).is_err() {
            trace!("dispatcher gone, dropping event");
        }
    }
}

/// Starts the dispatcher thread; it runs until every sender is dropped.
pub(crate) fn spawn_dispatcher(
    registry: Arc<Registry>,
    processor: Option<Arc<dyn FileProcessor>>,
) -> io::Result<(EventSender, JoinHandle<()>)> {
    let (tx, mut rx) = mpsc::unbounded_channel::<DownloadEvent>();
    let handle = thread::Builder::new()
        .name("rangeget-dispatch".to_string())
        .spawn(move || {
            let _ = registry.dispatcher.set(thread::current().id());
            while let Some(event) = rx.blocking_recv() {
                dispatch(&registry, processor.as_deref(), &event);
            }
            debug!("event dispatcher stopped");
        })?;
    Ok((EventSender(tx), handle))
}

fn dispatch(registry: &Registry, processor: Option<&dyn FileProcessor>, event: &DownloadEvent) {
    let task_id = event.task_id();

    // A task missing from the registry was cancelled; anything still queued
    // for it is stale. Terminal events are emitted at most once per task.
    if !event.is_terminal() && !registry.tasks.contains_key(task_id) {
        trace!(task_id = %task_id, "dropping event for unregistered task");
        return;
    }

    // Slots are cloned out so no registry guard is held during a callback.
    if let Some(slot) = registry.task_listener(task_id) {
        slot.deliver(event);
    }
    if let Some(slot) = registry.global_listener() {
        slot.deliver(event);
    }

    // Task first: `add_download_listener` inserts while holding the task
    // entry, so a listener added concurrently is either refused or removed
    // here.
    match event {
        DownloadEvent::Completed { file_path, .. } => {
            registry.tasks.remove(task_id);
            registry.remove_listener(task_id);
            if let Some(processor) = processor {
                processor.process(task_id, file_path);
            }
        }
        DownloadEvent::Failed { .. } => {
            registry.tasks.remove(task_id);
            registry.remove_listener(task_id);
        }
        DownloadEvent::Cancelled { .. } => {
            registry.remove_listener(task_id);
        }
        _ => {}
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<String>>,
    }

    impl Recorder {
        fn events(&self) -> Vec<String> {
            self.events.lock().unwrap().clone()
        }
    }

    impl DownloadListener for Recorder {
        fn on_download_started(&self, _: &TaskId, file_name: &str, _: Option<u64>) {
            self.events.lock().unwrap().push(format!("started:{file_name}"));
        }
        fn on_download_progress(&self, _: &TaskId, downloaded: u64, _: Option<u64>, _: u8) {
            self.events.lock().unwrap().push(format!("progress:{downloaded}"));
        }
        fn on_download_completed(&self, _: &TaskId, _: &Path) {
            self.events.lock().unwrap().push("completed".to_string());
        }
        fn on_download_cancelled(&self, _: &TaskId) {
            self.events.lock().unwrap().push("cancelled".to_string());
        }
    }

    struct CountingProcessor(Mutex<Vec<PathBuf>>);

    impl FileProcessor for CountingProcessor {
        fn process(&self, _: &TaskId, file_path: &Path) {
            self.0.lock().unwrap().push(file_path.to_path_buf());
        }
    }

    fn registry_with(id: &TaskId, listener: Arc<Recorder>) -> Registry {
        let registry = Registry::default();
        registry.tasks.insert(
            id.clone(),
            Arc::new(DownloadTask::new(
                id.clone(),
                "http://localhost/a.bin".to_string(),
                "a.bin".to_string(),
                PathBuf::from("/tmp"),
            )),
        );
        registry
            .listeners
            .insert(id.clone(), ListenerSlot::new(listener));
        registry
    }

    #[test]
    fn test_completed_event_cleans_up_and_runs_processor() {
        let id = TaskId::from("download_1_1");
        let recorder = Arc::new(Recorder::default());
        let registry = registry_with(&id, Arc::clone(&recorder));
        let processor = CountingProcessor(Mutex::new(Vec::new()));

        dispatch(
            &registry,
            Some(&processor),
            &DownloadEvent::Started {
                task_id: id.clone(),
                file_name: "a.bin".to_string(),
                total_bytes: Some(3),
            },
        );
        dispatch(
            &registry,
            Some(&processor),
            &DownloadEvent::Completed {
                task_id: id.clone(),
                file_path: PathBuf::from("/tmp/a.bin"),
            },
        );

        assert_eq!(recorder.events(), vec!["started:a.bin", "completed"]);
        assert!(registry.tasks.is_empty());
        assert!(registry.listeners.is_empty());
        assert_eq!(
            processor.0.lock().unwrap().as_slice(),
            &[PathBuf::from("/tmp/a.bin")]
        );
    }

    #[test]
    fn test_no_events_after_cancellation() {
        let id = TaskId::from("download_1_2");
        let recorder = Arc::new(Recorder::default());
        let registry = registry_with(&id, Arc::clone(&recorder));

        // The engine removes the task before emitting Cancelled.
        registry.tasks.remove(&id);
        dispatch(
            &registry,
            None,
            &DownloadEvent::Cancelled {
                task_id: id.clone(),
            },
        );
        dispatch(
            &registry,
            None,
            &DownloadEvent::Progress {
                task_id: id.clone(),
                downloaded_bytes: 10,
                total_bytes: None,
                percent: 0,
            },
        );

        assert_eq!(recorder.events(), vec!["cancelled"]);
        assert!(registry.listeners.is_empty());
    }

    #[test]
    fn test_global_listener_receives_every_task() {
        let id = TaskId::from("download_1_3");
        let per_task = Arc::new(Recorder::default());
        let global = Arc::new(Recorder::default());
        let registry = registry_with(&id, Arc::clone(&per_task));
        registry.replace_global(Some(global.clone()));

        dispatch(
            &registry,
            None,
            &DownloadEvent::Progress {
                task_id: id.clone(),
                downloaded_bytes: 5,
                total_bytes: Some(10),
                percent: 50,
            },
        );

        assert_eq!(per_task.events(), vec!["progress:5"]);
        assert_eq!(global.events(), vec!["progress:5"]);
    }

    #[test]
    fn test_dispatcher_stops_when_senders_dropped() {
        let registry = Arc::new(Registry::default());
        let (sender, handle) = spawn_dispatcher(registry, None).unwrap();
        sender.emit(DownloadEvent::Paused {
            task_id: TaskId::from("download_1_4"),
        });
        drop(sender);
        handle.join().unwrap();
    }

    struct Reentrant {
        registry: Arc<Registry>,
        clears_global: bool,
        calls: Mutex<usize>,
    }

    impl Reentrant {
        fn new(registry: &Arc<Registry>, clears_global: bool) -> Arc<Self> {
            Arc::new(Self {
                registry: Arc::clone(registry),
                clears_global,
                calls: Mutex::new(0),
            })
        }
    }

    impl DownloadListener for Reentrant {
        fn on_download_completed(&self, task_id: &TaskId, _: &Path) {
            *self.calls.lock().unwrap() += 1;
            let next = TaskId::from(format!("{task_id}_next").as_str());
            self.registry
                .listeners
                .insert(next, ListenerSlot::new(Arc::new(Recorder::default())));
            if self.clears_global {
                self.registry.replace_global(None);
            }
        }
    }

    #[test]
    fn test_callback_can_modify_registries() {
        let registry = Arc::new(Registry::default());
        let id = TaskId::from("download_1_5");
        let per_task = Reentrant::new(&registry, false);
        let global = Reentrant::new(&registry, true);
        registry.tasks.insert(
            id.clone(),
            Arc::new(DownloadTask::new(
                id.clone(),
                "http://localhost/b.bin".to_string(),
                "b.bin".to_string(),
                PathBuf::from("/tmp"),
            )),
        );
        registry
            .listeners
            .insert(id.clone(), ListenerSlot::new(per_task.clone()));
        registry.replace_global(Some(global.clone()));

        let (sender, handle) = spawn_dispatcher(Arc::clone(&registry), None).unwrap();
        sender.emit(DownloadEvent::Completed {
            task_id: id.clone(),
            file_path: PathBuf::from("/tmp/b.bin"),
        });
        drop(sender);
        handle.join().unwrap();

        assert_eq!(*per_task.calls.lock().unwrap(), 1);
        assert_eq!(*global.calls.lock().unwrap(), 1);
        assert!(registry.listeners.contains_key("download_1_5_next"));
        assert!(registry.global.read().unwrap().is_none());
        assert!(!registry.tasks.contains_key(&id));
    }

    struct SlowCompletion {
        entered: AtomicBool,
        left: AtomicBool,
    }

    impl DownloadListener for SlowCompletion {
        fn on_download_completed(&self, _: &TaskId, _: &Path) {
            self.entered.store(true, Ordering::SeqCst);
            thread::sleep(std::time::Duration::from_millis(200));
            self.left.store(true, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_removal_waits_for_callback_in_progress() {
        let id = TaskId::from("download_1_6");
        let registry = Arc::new(registry_with(&id, Arc::new(Recorder::default())));
        let slow = Arc::new(SlowCompletion {
            entered: AtomicBool::new(false),
            left: AtomicBool::new(false),
        });
        registry.replace_global(Some(slow.clone()));

        let (sender, handle) = spawn_dispatcher(Arc::clone(&registry), None).unwrap();
        sender.emit(DownloadEvent::Completed {
            task_id: id.clone(),
            file_path: PathBuf::from("/tmp/a.bin"),
        });
        while !slow.entered.load(Ordering::SeqCst) {
            thread::yield_now();
        }

        registry.replace_global(None);
        assert!(slow.left.load(Ordering::SeqCst));

        drop(sender);
        handle.join().unwrap();
    }

    #[test]
    fn test_detached_slot_is_not_called() {
        let recorder = Arc::new(Recorder::default());
        let slot = ListenerSlot::new(recorder.clone());
        Registry::default().detach(&slot);
        slot.deliver(&DownloadEvent::Cancelled {
            task_id: TaskId::from("download_1_7"),
        });
        assert!(recorder.events().is_empty());
    }
}
