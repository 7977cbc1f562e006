//! Rangeget Core Library
//!
//! This library provides a resumable, concurrent HTTP download engine:
//! byte-range resume, a bounded worker pool, cooperative pause/resume/cancel
//! and rate-limited progress reporting.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//! - [`config`] - Engine configuration and validation
//! - [`download`] - Download engine, tasks, HTTP client, progress dispatch
//!
//! The engine is an explicitly constructed handle; there is no global
//! instance. Create one at startup and clone it where needed.

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod download;
pub(crate) mod user_agent;

// Re-export commonly used types
pub use config::EngineConfig;
pub use download::{
    DEFAULT_CONCURRENCY, DownloadEngine, DownloadError, DownloadListener, DownloadProgress,
    EngineError, FileCategory, FileProcessor, HttpClient, TaskId, TaskState, classify,
};
