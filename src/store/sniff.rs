//! Content-based type detection for extension-less files.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use tracing::{debug, warn};

/// Bytes read from a file before sniffing.
const SNIFF_LIMIT: u64 = 1024 * 1024;

/// Generic classification when nothing better is known.
pub const OCTET_STREAM: &str = "application/octet-stream";

/// Detected MIME type and its extension (with dot, empty when unknown).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SniffResult {
    pub mime_type: String,
    pub extension: &'static str,
}

impl SniffResult {
    fn generic() -> Self {
        Self {
            mime_type: OCTET_STREAM.to_string(),
            extension: "",
        }
    }

    /// `true` when the file can be renamed with a real extension.
    pub fn is_known(&self) -> bool {
        !self.extension.is_empty()
    }
}

/// Classify `bytes` by their content.
///
/// Magic numbers come first; plain text and markup are recognised as a
/// fallback. Unmapped types come back as [`OCTET_STREAM`] with no extension.
pub fn sniff_bytes(bytes: &[u8]) -> SniffResult {
    let mime_type = match infer::get(bytes) {
        Some(kind) => kind.mime_type(),
        None => match sniff_text(bytes) {
            Some(mime) => mime,
            None => return SniffResult::generic(),
        },
    };

    match extension_for_mime(mime_type) {
        Some(extension) => SniffResult {
            mime_type: mime_type.to_string(),
            extension,
        },
        None => {
            debug!(mime_type, "No extension mapped for detected type");
            SniffResult::generic()
        }
    }
}

/// Classify the first megabyte of the file at `path`.
///
/// Read failures are logged and reported as the generic type.
pub fn sniff_file(path: &Path) -> SniffResult {
    let mut head = Vec::new();
    let read = File::open(path).and_then(|f| f.take(SNIFF_LIMIT).read_to_end(&mut head));
    match read {
        Ok(_) => sniff_bytes(&head),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Failed to read file for type detection");
            SniffResult::generic()
        }
    }
}

/// Extension (with dot) for a MIME type, if the type is one we rename.
pub fn extension_for_mime(mime_type: &str) -> Option<&'static str> {
    let ext = match mime_type {
        "application/pdf" => ".pdf",
        "application/msword" => ".doc",
        "application/vnd.openxmlformats-officedocument.wordprocessingml.document" => ".docx",
        "application/vnd.ms-excel" => ".xls",
        "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet" => ".xlsx",
        "application/vnd.ms-powerpoint" => ".ppt",
        "application/vnd.openxmlformats-officedocument.presentationml.presentation" => ".pptx",
        "image/jpeg" => ".jpg",
        "image/png" => ".png",
        "image/gif" => ".gif",
        "image/bmp" => ".bmp",
        "image/tiff" => ".tiff",
        "image/webp" => ".webp",
        "application/zip" => ".zip",
        "application/vnd.rar" | "application/x-rar-compressed" => ".rar",
        "application/x-7z-compressed" => ".7z",
        "application/gzip" => ".gz",
        "application/x-tar" => ".tar",
        "text/plain" => ".txt",
        "text/html" => ".html",
        "text/csv" => ".csv",
        "text/rtf" | "application/rtf" => ".rtf",
        "application/json" => ".json",
        "text/xml" | "application/xml" => ".xml",
        _ => return None,
    };
    Some(ext)
}

/// Markup or plain text: valid UTF-8 without NUL bytes.
fn sniff_text(bytes: &[u8]) -> Option<&'static str> {
    if bytes.is_empty() || bytes.contains(&0) {
        return None;
    }
    let text = std::str::from_utf8(bytes).ok()?;
    let head = text
        .trim_start_matches('\u{feff}')
        .trim_start()
        .chars()
        .take(64)
        .collect::<String>()
        .to_ascii_lowercase();
    if head.starts_with("<!doctype html") || head.starts_with("<html") {
        Some("text/html")
    } else {
        Some("text/plain")
    }
}
