//! File type classification by extension.
//!
//! Maps a file name to a [`FileCategory`], which picks the default
//! per-category download directory. Pure and total: unknown or missing
//! extensions map to [`FileCategory::Other`].

use std::fmt;

use serde::Serialize;

/// Broad content category of a downloaded file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum FileCategory {
    Image,
    Video,
    Audio,
    Document,
    Archive,
    Installer,
    Other,
}

const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "bmp", "webp", "svg", "avif"];
const VIDEO_EXTENSIONS: &[&str] = &["mp4", "avi", "mkv", "mov", "wmv", "flv", "webm", "m4v"];
const AUDIO_EXTENSIONS: &[&str] = &["mp3", "wav", "flac", "aac", "ogg", "m4a", "opus"];
const DOCUMENT_EXTENSIONS: &[&str] = &[
    "pdf", "doc", "docx", "xls", "xlsx", "ppt", "pptx", "txt", "epub", "odt", "rtf", "md",
];
const ARCHIVE_EXTENSIONS: &[&str] = &["zip", "rar", "7z", "tar", "gz", "bz2", "xz", "zst", "tgz"];
const INSTALLER_EXTENSIONS: &[&str] = &[
    "apk", "exe", "msi", "dmg", "pkg", "deb", "rpm", "appimage",
];

impl FileCategory {
    /// All categories, in classification order.
    pub const ALL: [Self; 7] = [
        Self::Image,
        Self::Video,
        Self::Audio,
        Self::Document,
        Self::Archive,
        Self::Installer,
        Self::Other,
    ];

    /// Directory name used under the base download directory.
    #[must_use]
    pub fn dir_name(self) -> &'static str {
        match self {
            Self::Image => "Image",
            Self::Video => "Video",
            Self::Audio => "Audio",
            Self::Document => "Document",
            Self::Archive => "Archive",
            Self::Installer => "Installer",
            Self::Other => "Other",
        }
    }

    fn extensions(self) -> &'static [&'static str] {
        match self {
            Self::Image => IMAGE_EXTENSIONS,
            Self::Video => VIDEO_EXTENSIONS,
            Self::Audio => AUDIO_EXTENSIONS,
            Self::Document => DOCUMENT_EXTENSIONS,
            Self::Archive => ARCHIVE_EXTENSIONS,
            Self::Installer => INSTALLER_EXTENSIONS,
            Self::Other => &[],
        }
    }
}

impl fmt::Display for FileCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.dir_name())
    }
}

/// Classifies a file name by its (case-insensitive) extension.
///
/// The extension is the text after the last `.`; a leading dot (`.bashrc`)
/// does not count as an extension.
#[must_use]
pub fn classify(file_name: &str) -> FileCategory {
    let Some(extension) = extension_of(file_name) else {
        return FileCategory::Other;
    };
    let extension = extension.to_ascii_lowercase();
    FileCategory::ALL
        .into_iter()
        .find(|category| category.extensions().contains(&extension.as_str()))
        .unwrap_or(FileCategory::Other)
}

fn extension_of(file_name: &str) -> Option<&str> {
    let dot = file_name.rfind('.')?;
    if dot == 0 || dot + 1 == file_name.len() {
        return None;
    }
    Some(&file_name[dot + 1..])
}
