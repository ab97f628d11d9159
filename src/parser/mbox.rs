//! Streaming MBOX splitter.
//!
//! Reads MBOX files line-by-line through a large buffer and never holds more
//! than one message in memory. Tolerant of malformed input.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use tracing::warn;

use crate::error::{MboxError, Result};

/// Size of the internal read buffer (1 MB).
const READ_BUFFER_SIZE: usize = 1024 * 1024;

/// Default maximum message size in bytes (256 MB).
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 256 * 1024 * 1024;

/// Progress is reported at most every 4 MB.
const PROGRESS_INTERVAL: u64 = 4 * 1024 * 1024;

/// Streaming MBOX parser.
///
/// Every line starting with `From ` opens a new message. The parser is
/// tolerant of:
///
/// - Mixed `\n` and `\r\n` line endings
/// - `From ` lines not preceded by a blank line (logs a warning)
/// - Truncated messages at EOF
/// - NUL bytes and other binary content in the body
/// - UTF-8 BOM at the start of the file
/// - Blank lines before the first separator
pub struct MboxParser {
    path: PathBuf,
    file_size: u64,
    max_message_size: usize,
}

impl MboxParser {
    /// Create a parser for the given MBOX file.
    ///
    /// Verifies that the file exists and is a regular file, but does NOT
    /// validate that it is actually an MBOX.
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let metadata = std::fs::metadata(&path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                MboxError::FileNotFound(path.clone())
            } else {
                MboxError::io(&path, e)
            }
        })?;
        if !metadata.is_file() {
            return Err(MboxError::InvalidMbox(path));
        }
        Ok(Self {
            path,
            file_size: metadata.len(),
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
        })
    }

    /// Override the per-message size cap. Bytes beyond it are dropped.
    pub fn with_max_message_size(mut self, max_message_size: usize) -> Self {
        self.max_message_size = max_message_size.max(1);
        self
    }

    /// Total size of the underlying file in bytes.
    pub fn file_size(&self) -> u64 {
        self.file_size
    }

    /// Path to the MBOX file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Count the messages in the file without buffering their contents.
    pub fn count_messages(&self) -> Result<u64> {
        let mut count = 0;
        self.scan(false, &mut |_, _| {
            count += 1;
            true
        }, None)?;
        Ok(count)
    }

    /// Walk the MBOX, calling `message_callback` for each message found.
    ///
    /// The callback receives `(offset, raw_bytes)` where `raw_bytes` starts
    /// with the `From ` separator line. It returns `true` to continue or
    /// `false` to stop early.
    ///
    /// Returns the number of messages handed to the callback.
    pub fn parse(
        &self,
        message_callback: &mut dyn FnMut(u64, &[u8]) -> bool,
        progress_callback: Option<&dyn Fn(u64, u64)>,
    ) -> Result<u64> {
        self.scan(true, message_callback, progress_callback)
    }

    fn scan(
        &self,
        keep_bytes: bool,
        callback: &mut dyn FnMut(u64, &[u8]) -> bool,
        progress: Option<&dyn Fn(u64, u64)>,
    ) -> Result<u64> {
        if self.file_size == 0 {
            return Ok(0);
        }

        let file = File::open(&self.path).map_err(|e| MboxError::io(&self.path, e))?;
        let mut reader = BufReader::with_capacity(READ_BUFFER_SIZE, file);

        let mut count: u64 = 0;
        let mut offset: u64 = 0;
        let mut message_start: u64 = 0;
        let mut message_buf: Vec<u8> = Vec::with_capacity(64 * 1024);
        let mut has_content = false;
        let mut truncated = false;
        let mut prev_line_was_empty = true;
        let mut last_progress: u64 = 0;
        let mut line_buf: Vec<u8> = Vec::with_capacity(4096);

        loop {
            line_buf.clear();
            let line_len = reader
                .read_until(b'\n', &mut line_buf)
                .map_err(|e| MboxError::io(&self.path, e))? as u64;
            if line_len == 0 {
                break;
            }

            if is_mbox_separator(&line_buf) {
                if !prev_line_was_empty && has_content {
                    warn!(
                        offset,
                        "Found 'From ' separator without preceding blank line"
                    );
                }
                if has_content {
                    if !callback(message_start, &message_buf) {
                        return Ok(count);
                    }
                    count += 1;
                }
                message_start = offset;
                message_buf.clear();
                truncated = false;
                has_content = true;
                if keep_bytes {
                    message_buf.extend_from_slice(&line_buf);
                }
            } else {
                has_content = has_content || !is_blank_line(&line_buf);
                if keep_bytes {
                    if message_buf.len() + line_buf.len() <= self.max_message_size {
                        message_buf.extend_from_slice(&line_buf);
                    } else if !truncated {
                        warn!(
                            offset = message_start,
                            max_size = self.max_message_size,
                            "Message exceeds maximum size, truncating body"
                        );
                        truncated = true;
                    }
                }
            }

            prev_line_was_empty = is_blank_line(&line_buf);
            offset += line_len;

            if let Some(cb) = progress {
                if offset - last_progress >= PROGRESS_INTERVAL {
                    cb(offset, self.file_size);
                    last_progress = offset;
                }
            }
        }

        if has_content && callback(message_start, &message_buf) {
            count += 1;
        }

        if let Some(cb) = progress {
            cb(self.file_size, self.file_size);
        }

        Ok(count)
    }
}

/// Check whether a line is an MBOX separator (`From ` at the start).
fn is_mbox_separator(line: &[u8]) -> bool {
    let line = line.strip_prefix(&[0xEF, 0xBB, 0xBF]).unwrap_or(line);
    line.starts_with(b"From ")
}

/// Check whether a line is blank (empty or only whitespace / CR / LF).
fn is_blank_line(line: &[u8]) -> bool {
    line.iter()
        .all(|&b| b == b'\n' || b == b'\r' || b == b' ' || b == b'\t')
}
