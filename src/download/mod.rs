//! Resumable HTTP download engine.
//!
//! This module provides the [`DownloadEngine`] façade and everything behind
//! it: the range-aware [`HttpClient`], per-task state machines, the event
//! dispatcher that drives [`DownloadListener`]s, and the file-type
//! classifier that picks default destination directories.
//!
//! # Features
//!
//! - Byte-range resume from the length of the partial file on disk
//! - Bounded worker pool (3 transfers by default)
//! - Cooperative pause, resume and cancel, checked once per 8 KiB buffer
//! - Progress events rate-limited to one per second per task
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use rangeget_core::download::{DownloadEngine, DownloadListener, TaskId};
//! use rangeget_core::EngineConfig;
//!
//! struct Printer;
//!
//! impl DownloadListener for Printer {
//!     fn on_download_completed(&self, id: &TaskId, path: &std::path::Path) {
//!         println!("{id} saved to {}", path.display());
//!     }
//! }
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let engine = DownloadEngine::new(EngineConfig::default())?;
//! engine.start_download("https://example.com/a.pdf", None, None, Some(Arc::new(Printer)))?;
//! # Ok(())
//! # }
//! ```

pub mod classify;
mod client;
pub mod constants;
mod dispatch;
mod engine;
mod error;
pub mod filename;
mod progress;
mod task;

pub use classify::{FileCategory, classify};
pub use client::{BodyStream, HttpClient, RangeResponse, range_header_value};
pub use constants::DEFAULT_CONCURRENCY;
pub use dispatch::{DownloadListener, FileProcessor};
pub use engine::{DownloadEngine, EngineError};
pub use error::DownloadError;
pub use filename::resolve_file_name;
pub use progress::{DownloadProgress, ProgressThrottle, TaskState, percent, speed};
pub use task::TaskId;
