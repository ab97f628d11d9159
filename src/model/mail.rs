//! Message records.

use chrono::{DateTime, FixedOffset, Utc};

use super::address::EmailAddress;
use super::attachment::{AttachmentContext, ContextualAttachment, ExtractedAttachment};
use crate::parser::header::parse_date;

/// Placeholder body for messages without any text or markup part.
pub const NO_CONTENT: &str = "[No content]";

/// Subject used when the header is missing.
pub const NO_SUBJECT: &str = "(No Subject)";

/// Body content and attachments pulled out of a part tree.
#[derive(Debug, Clone, Default)]
pub struct MessageContent {
    /// Plain-text body. Always `Some` after extraction (placeholder or
    /// converted markup when no plain part exists).
    pub text: Option<String>,

    /// Markup body, only kept when the extractor is asked to retain it.
    pub html: Option<String>,

    /// Attachments in depth-first document order.
    pub attachments: Vec<ExtractedAttachment>,
}

/// Everything the content extractor reads from one raw message.
#[derive(Debug, Clone, Default)]
pub struct ExtractedMessage {
    /// Decoded subject, `"(No Subject)"` when absent.
    pub subject: String,
    /// Decoded `From:` header as written, e.g. `"Jane <jane@example.com>"`.
    pub from: String,
    pub to: Vec<String>,
    pub cc: Vec<String>,
    pub bcc: Vec<String>,
    /// `Message-ID` header (empty when absent).
    pub message_id: String,
    pub in_reply_to: Option<String>,
    pub references: Vec<String>,
    /// Raw `Date:` header value, parsed later.
    pub date_header: Option<String>,
    /// Gmail labels from `X-Gmail-Labels`.
    pub labels: Vec<String>,
    pub content: MessageContent,
}

/// A fully decoded message.
///
/// Built once per MBOX record and dropped when the pipeline moves on. The
/// only later mutation is the store recording saved paths on `attachments`.
#[derive(Debug, Clone)]
pub struct Message {
    /// `Message-ID` value. May be empty and is not assumed unique.
    pub message_id: String,
    /// Raw sender string.
    pub from: String,
    /// Parsed sender, if the `From:` header contained an address.
    pub sender: Option<EmailAddress>,
    pub to: Vec<String>,
    pub cc: Vec<String>,
    pub bcc: Vec<String>,
    pub subject: String,
    /// Parsed `Date:` header in the sender's offset, or the processing time.
    pub date: DateTime<FixedOffset>,
    /// `true` when `date` is the processing time because the header was
    /// missing or unparseable.
    pub date_is_fallback: bool,
    pub in_reply_to: Option<String>,
    pub references: Vec<String>,
    pub labels: Vec<String>,
    pub text: Option<String>,
    pub html: Option<String>,
    pub attachments: Vec<ContextualAttachment>,
    /// Original record bytes.
    pub raw: Vec<u8>,
}

impl Message {
    /// Build a message from extracted parts.
    ///
    /// The timestamp comes from the `Date:` header, falling back to `now`.
    /// Attachments that cannot receive a context (no sender) are returned
    /// separately so the caller can report them.
    pub fn assemble(
        extracted: ExtractedMessage,
        raw: Vec<u8>,
        now: DateTime<Utc>,
    ) -> (Self, Vec<ExtractedAttachment>) {
        let parsed_date = extracted.date_header.as_deref().and_then(parse_date);
        let date_is_fallback = parsed_date.is_none();
        let date = parsed_date.unwrap_or_else(|| now.fixed_offset());

        let ExtractedMessage {
            subject,
            from,
            to,
            cc,
            bcc,
            message_id,
            in_reply_to,
            references,
            labels,
            content,
            ..
        } = extracted;

        let (attachments, orphaned) =
            match AttachmentContext::new(message_id.clone(), date, from.clone()) {
                Ok(context) => (
                    content
                        .attachments
                        .into_iter()
                        .map(|a| a.with_context(context.clone()))
                        .collect(),
                    Vec::new(),
                ),
                Err(_) => (Vec::new(), content.attachments),
            };

        let message = Self {
            sender: EmailAddress::parse(&from),
            message_id,
            from,
            to,
            cc,
            bcc,
            subject,
            date,
            date_is_fallback,
            in_reply_to,
            references,
            labels,
            text: content.text,
            html: content.html,
            attachments,
            raw,
        };
        (message, orphaned)
    }

    /// Number of attachments already written to disk.
    pub fn saved_attachment_count(&self) -> usize {
        self.attachments
            .iter()
            .filter(|a| a.saved_path().is_some())
            .count()
    }
}
