//! Text vs. binary file content.
//!
//! The decision is made purely from the file extension against a fixed
//! allowlist; content is never sniffed.

use serde::{Deserialize, Serialize};

/// Extensions stored as binary. Everything else is text.
pub const BINARY_EXTENSIONS: &[&str] = &[
    // images
    "png", "jpg", "jpeg", "gif", "bmp", "ico", "webp", "tiff", "tif", "avif", "psd",
    // audio
    "mp3", "wav", "ogg", "flac", "aac", "m4a", "opus", "mid", "midi",
    // video
    "mp4", "webm", "avi", "mov", "mkv", "m4v", "wmv", "flv",
    // fonts
    "ttf", "otf", "woff", "woff2", "eot",
    // archives
    "zip", "tar", "gz", "tgz", "bz2", "xz", "7z", "rar", "zst",
    // documents
    "pdf", "doc", "docx", "xls", "xlsx", "ppt", "pptx", "odt", "ods", "odp", "epub",
    // generic binary
    "bin", "dat", "exe", "dll", "so", "dylib", "wasm", "o", "a", "class", "pyc", "sqlite", "db",
];

/// Whether a path's extension marks it as binary (case-insensitive).
pub fn is_binary_path(path: &str) -> bool {
    let name = path.rsplit('/').next().unwrap_or(path);
    match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => {
            let ext = ext.to_ascii_lowercase();
            BINARY_EXTENSIONS.contains(&ext.as_str())
        }
        _ => false,
    }
}

/// File content as the virtual store keeps it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "lowercase")]
pub enum FileContent {
    Text(String),
    Binary(Vec<u8>),
}

impl FileContent {
    /// Classify raw bytes for `path`.
    ///
    /// Text-classified bytes that are not valid UTF-8 fall back to binary
    /// rather than being lossily decoded.
    pub fn from_bytes(path: &str, bytes: Vec<u8>) -> Self {
        if is_binary_path(path) {
            return FileContent::Binary(bytes);
        }
        match String::from_utf8(bytes) {
            Ok(text) => FileContent::Text(text),
            Err(e) => FileContent::Binary(e.into_bytes()),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            FileContent::Text(s) => s.len(),
            FileContent::Binary(b) => b.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_binary(&self) -> bool {
        matches!(self, FileContent::Binary(_))
    }

    pub fn as_bytes(&self) -> &[u8] {
        match self {
            FileContent::Text(s) => s.as_bytes(),
            FileContent::Binary(b) => b,
        }
    }

    pub fn into_bytes(self) -> Vec<u8> {
        match self {
            FileContent::Text(s) => s.into_bytes(),
            FileContent::Binary(b) => b,
        }
    }
}
