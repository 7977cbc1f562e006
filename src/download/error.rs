//! Transfer errors.
//!
//! [`DownloadError`] covers everything that can go wrong inside a single
//! transfer. These errors never escape a task: the worker converts them into
//! a `Failed` state and hands the `Display` text to listeners.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur during a file transfer.
#[derive(Debug, Error)]
pub enum DownloadError {
    /// Connection could not be established or broke mid-body.
    #[error("network error fetching {url}: {source}")]
    Network {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// Connect or read timed out.
    #[error("timed out fetching {url}")]
    Timeout { url: String },

    /// Response status other than 200 or 206.
    #[error("HTTP {status} from {url}")]
    HttpStatus {
        url: String,
        /// The HTTP status code.
        status: u16,
    },

    /// File system error (create directory, open, seek, write, flush).
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The task URL no longer parses.
    #[error("invalid URL: {url}")]
    InvalidUrl { url: String },

    /// Written file size does not match the announced content length.
    #[error(
        "size mismatch for {path}: server announced {expected_bytes} bytes, wrote {actual_bytes}"
    )]
    Integrity {
        path: PathBuf,
        /// `Content-Length` based total.
        expected_bytes: u64,
        /// Bytes actually written.
        actual_bytes: u64,
    },
}

impl DownloadError {
    /// Creates a network error from a reqwest error, promoting timeouts.
    pub fn network(url: impl Into<String>, source: reqwest::Error) -> Self {
        if source.is_timeout() {
            return Self::Timeout { url: url.into() };
        }
        Self::Network {
            url: url.into(),
            source,
        }
    }

    pub fn http_status(url: impl Into<String>, status: u16) -> Self {
        Self::HttpStatus {
            url: url.into(),
            status,
        }
    }

    pub fn timeout(url: impl Into<String>) -> Self {
        Self::Timeout { url: url.into() }
    }

    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn invalid_url(url: impl Into<String>) -> Self {
        Self::InvalidUrl { url: url.into() }
    }

    pub fn integrity(path: impl Into<PathBuf>, expected_bytes: u64, actual_bytes: u64) -> Self {
        Self::Integrity {
            path: path.into(),
            expected_bytes,
            actual_bytes,
        }
    }
}

// No `From<reqwest::Error>` / `From<std::io::Error>`: every variant needs the
// url or path the source error does not carry. Use the constructors above.
