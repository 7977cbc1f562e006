//! Filename derivation and sanitization for downloads.
//!
//! A task writes to `<target_dir>/<file_name>`. The name is either supplied
//! by the caller (sanitized here) or taken from the last URL path segment,
//! falling back to a timestamp-based name when the path yields nothing usable.

use std::path::{Component, Path};
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::debug;
use url::Url;

/// Resolves the file name for a download.
///
/// A non-empty `preferred` name wins after sanitization. Otherwise the URL's
/// last path segment is used when it is non-empty and carries an extension;
/// anything else yields `download_<unix-millis>`.
#[must_use]
pub fn resolve_file_name(url: &Url, preferred: Option<&str>) -> String {
    if let Some(name) = preferred
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(sanitize_filename)
    {
        return name;
    }
    file_name_from_url(url).unwrap_or_else(timestamp_file_name)
}

/// Extracts a usable file name from the URL path, if there is one.
///
/// The segment is percent-decoded and sanitized. Names without a `.` are
/// rejected so that paths like `/download?id=7` don't produce `download`.
pub(crate) fn file_name_from_url(url: &Url) -> Option<String> {
    let last = url.path_segments()?.next_back()?;
    if last.is_empty() {
        return None;
    }
    let decoded = urlencoding::decode(last).unwrap_or_else(|e| {
        debug!(segment = %last, error = %e, "URL decoding failed, using raw segment");
        last.into()
    });
    let name = sanitize_filename(&decoded);
    let has_extension = name
        .rfind('.')
        .is_some_and(|dot| dot > 0 && dot + 1 < name.len());
    has_extension.then_some(name)
}

/// `download_<unix-millis>`, used when neither caller nor URL names the file.
pub(crate) fn timestamp_file_name() -> String {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0);
    format!("download_{millis}")
}

/// Sanitizes filename for filesystem safety.
///
/// Replaces characters that are invalid on common filesystems
/// (`/ \ : * ? " < > |` and control characters) and rewrites names that
/// would resolve to `.`, `..` or a root.
pub(crate) fn sanitize_filename(name: &str) -> String {
    let sanitized: String = name
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();

    if sanitized.is_empty() {
        return "_".to_string();
    }

    if is_safe_filename_segment(&sanitized) {
        sanitized
    } else {
        sanitized
            .chars()
            .map(|c| if c == '.' { '_' } else { c })
            .collect()
    }
}

fn is_safe_filename_segment(name: &str) -> bool {
    !Path::new(name).components().any(|component| {
        matches!(
            component,
            Component::CurDir | Component::ParentDir | Component::RootDir | Component::Prefix(_)
        )
    })
}
