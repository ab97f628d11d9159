//! Attachment records.
//!
//! An attachment goes through two stages:
//!
//! 1. [`ExtractedAttachment`]: produced by the MIME walk, knows nothing about
//!    the message it came from.
//! 2. [`ContextualAttachment`]: the same payload decorated with an
//!    [`AttachmentContext`] (message id, date, sender). Only this form can be
//!    named or saved, so a missing context is impossible by construction.

use std::path::{Path, PathBuf};

use chrono::{DateTime, FixedOffset};

use crate::error::{MboxError, Result};

/// Longest suffix accepted as a real file extension.
const MAX_EXTENSION_LEN: usize = 10;

/// An attachment as found in the part tree.
#[derive(Debug, Clone)]
pub struct ExtractedAttachment {
    /// `Content-ID` header value (empty if absent).
    pub content_id: String,
    /// Declared filename. Synthetic `attachment_N` when the part had none.
    pub filename: Option<String>,
    /// Declared MIME type, e.g. `"application/pdf"`.
    pub content_type: String,
    /// `attachment` or `inline`.
    pub disposition: String,
    /// Decoded payload.
    pub payload: Vec<u8>,
    /// Declared (decoded) size in bytes.
    pub size: u64,
}

impl ExtractedAttachment {
    /// Lower-cased suffix of the declared filename, including the dot.
    ///
    /// Empty when the filename is absent or has no suffix (see
    /// [`suffix_of`]).
    pub fn extension(&self) -> String {
        self.filename
            .as_deref()
            .map(extension_of)
            .unwrap_or_default()
    }

    /// `true` if the declared filename ends in a plausible extension.
    pub fn has_plausible_extension(&self) -> bool {
        self.filename
            .as_deref()
            .is_some_and(has_plausible_extension)
    }

    /// Attach message context, producing the only form the store accepts.
    pub fn with_context(self, context: AttachmentContext) -> ContextualAttachment {
        ContextualAttachment {
            attachment: self,
            context,
            saved_path: None,
        }
    }
}

/// Message-derived fields every attachment needs before it can be named.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachmentContext {
    /// Owning message id (may be empty, never assumed unique).
    pub message_id: String,
    /// Owning message timestamp, in the offset of its `Date:` header.
    pub date: DateTime<FixedOffset>,
    /// Raw sender string, e.g. `"Jane <jane@example.com>"`.
    pub sender: String,
}

impl AttachmentContext {
    /// Build a context. Fails when the sender is blank, since the sender
    /// determines both the bucket directory and the file name.
    pub fn new(
        message_id: impl Into<String>,
        date: impl Into<DateTime<FixedOffset>>,
        sender: impl Into<String>,
    ) -> Result<Self> {
        let sender = sender.into();
        if sender.trim().is_empty() {
            return Err(MboxError::MissingContext(
                "sender is required to name attachments".into(),
            ));
        }
        Ok(Self {
            message_id: message_id.into(),
            date: date.into(),
            sender,
        })
    }
}

/// An attachment bound to its message, ready to be persisted exactly once.
#[derive(Debug, Clone)]
pub struct ContextualAttachment {
    attachment: ExtractedAttachment,
    context: AttachmentContext,
    saved_path: Option<PathBuf>,
}

impl ContextualAttachment {
    pub fn attachment(&self) -> &ExtractedAttachment {
        &self.attachment
    }

    pub fn context(&self) -> &AttachmentContext {
        &self.context
    }

    /// Declared filename, or `"unnamed"` for log messages.
    pub fn display_name(&self) -> &str {
        self.attachment.filename.as_deref().unwrap_or("unnamed")
    }

    pub fn payload(&self) -> &[u8] {
        &self.attachment.payload
    }

    pub fn extension(&self) -> String {
        self.attachment.extension()
    }

    pub fn has_plausible_extension(&self) -> bool {
        self.attachment.has_plausible_extension()
    }

    /// Where the payload was written, once saved.
    pub fn saved_path(&self) -> Option<&Path> {
        self.saved_path.as_deref()
    }

    /// Record the final on-disk path. The path is immutable afterwards.
    pub fn mark_saved(&mut self, path: PathBuf) -> Result<()> {
        if let Some(existing) = &self.saved_path {
            return Err(MboxError::AlreadySaved(existing.clone()));
        }
        self.saved_path = Some(path);
        Ok(())
    }
}

/// `true` if `name` ends in a dot followed by 1–10 ASCII alphanumerics.
pub fn has_plausible_extension(name: &str) -> bool {
    match name.rsplit_once('.') {
        Some((_, ext)) => {
            !ext.is_empty()
                && ext.len() <= MAX_EXTENSION_LEN
                && ext.chars().all(|c| c.is_ascii_alphanumeric())
        }
        None => false,
    }
}

/// Suffix of the last path component of `name`, from its final dot.
///
/// `"report.final-v2"` gives `".final-v2"`. Dotfiles (`".hidden"`) and names
/// ending in a dot have no suffix.
pub fn suffix_of(name: &str) -> Option<&str> {
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name);
    match base.rfind('.') {
        Some(dot) if dot > 0 && dot + 1 < base.len() => Some(&base[dot..]),
        _ => None,
    }
}

/// Lower-cased suffix of `name` including the dot, or `""`.
pub fn extension_of(name: &str) -> String {
    suffix_of(name).map(str::to_lowercase).unwrap_or_default()
}
