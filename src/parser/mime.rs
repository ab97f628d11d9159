//! MIME message decomposition: header fields, part-tree walk, attachment
//! capture and HTML-to-text conversion.

use std::borrow::Cow;
use std::sync::OnceLock;

use mail_parser::decoders::base64::base64_decode;
use mail_parser::decoders::quoted_printable::quoted_printable_decode;
use mail_parser::{
    Encoding, Message as MimeMessage, MessageParser, MessagePart, MimeHeaders, PartType,
};
use regex::Regex;
use tracing::{debug, warn};

use crate::error::{MboxError, Result};
use crate::model::address::extract_addresses;
use crate::model::attachment::ExtractedAttachment;
use crate::model::mail::{ExtractedMessage, MessageContent, NO_CONTENT, NO_SUBJECT};
use crate::parser::header::{extract_all_angle_brackets, extract_angle_bracket, HeaderBlock};

/// Maximum nesting of multipart / message parts (adversarial input guard).
const MAX_DEPTH: usize = 32;

/// Elements that start a new line when converting markup to text.
const BLOCK_TAGS: [&str; 16] = [
    "br", "p", "div", "tr", "li", "ul", "ol", "table", "h1", "h2", "h3", "h4", "h5", "h6",
    "blockquote", "hr",
];

static TAG_RE: OnceLock<Regex> = OnceLock::new();
static NUMERIC_ENTITY_RE: OnceLock<Regex> = OnceLock::new();

/// Splits raw messages into header fields, body text and attachments.
#[derive(Debug, Clone, Copy, Default)]
pub struct ContentExtractor {
    keep_html: bool,
}

impl ContentExtractor {
    /// `keep_html` retains the markup body next to the plain text.
    pub fn new(keep_html: bool) -> Self {
        Self { keep_html }
    }

    /// Decode one raw MBOX record.
    ///
    /// Fails only when the record has no header fields or the MIME structure
    /// cannot be walked. Individual undecodable text parts are logged and
    /// skipped.
    pub fn extract(&self, raw_message: &[u8]) -> Result<ExtractedMessage> {
        let message_bytes = skip_from_line(raw_message);

        let headers = HeaderBlock::parse(message_bytes);
        if headers.is_empty() {
            return Err(MboxError::MimeError("message has no header fields".into()));
        }

        let parsed = MessageParser::default()
            .parse(message_bytes)
            .ok_or_else(|| MboxError::MimeError("unparseable MIME structure".into()))?;

        let tree = walk_part(&parsed, 0, 0, 0)?;
        let content = self.finish(tree);

        let address_list =
            |name: &str| extract_addresses(&headers.get_decoded(name).unwrap_or_default());

        Ok(ExtractedMessage {
            subject: headers
                .get_decoded("subject")
                .unwrap_or_else(|| NO_SUBJECT.to_string()),
            from: headers.get_decoded("from").unwrap_or_default(),
            to: address_list("to"),
            cc: address_list("cc"),
            bcc: address_list("bcc"),
            message_id: headers
                .get("message-id")
                .map(extract_angle_bracket)
                .unwrap_or_default(),
            in_reply_to: headers.get("in-reply-to").map(extract_angle_bracket),
            references: headers
                .get("references")
                .map(extract_all_angle_brackets)
                .unwrap_or_default(),
            date_header: headers.get("date").map(String::from),
            labels: headers
                .get_decoded("x-gmail-labels")
                .map(|labels| {
                    labels
                        .split(',')
                        .map(|l| l.trim().to_string())
                        .filter(|l| !l.is_empty())
                        .collect()
                })
                .unwrap_or_default(),
            content,
        })
    }

    /// Join collected text, convert markup when no plain text exists and
    /// substitute the placeholder when neither does.
    fn finish(&self, tree: PartContent) -> MessageContent {
        let html = (!tree.html.is_empty()).then(|| tree.html.join("\n"));
        let mut text = (!tree.text.is_empty()).then(|| tree.text.join("\n\n"));

        let has_text = text.as_deref().is_some_and(|t| !t.is_empty());
        let has_html = html.as_deref().is_some_and(|h| !h.is_empty());
        if !has_text {
            if let Some(markup) = html.as_deref().filter(|_| has_html) {
                text = Some(html_to_text(markup));
            } else {
                text = Some(NO_CONTENT.to_string());
            }
        }

        MessageContent {
            text,
            html: if self.keep_html { html } else { None },
            attachments: tree.attachments,
        }
    }
}

/// Text, markup and attachments found below one node of the part tree.
#[derive(Debug, Default)]
struct PartContent {
    text: Vec<String>,
    html: Vec<String>,
    attachments: Vec<ExtractedAttachment>,
}

impl PartContent {
    fn merge(&mut self, other: PartContent) {
        self.text.extend(other.text);
        self.html.extend(other.html);
        self.attachments.extend(other.attachments);
    }
}

/// Walk the subtree rooted at `part_id`.
///
/// `found` is the number of attachments already captured in this message,
/// used to number unnamed attachments `attachment_1`, `attachment_2`, ….
fn walk_part(
    message: &MimeMessage<'_>,
    part_id: usize,
    depth: usize,
    found: usize,
) -> Result<PartContent> {
    if depth > MAX_DEPTH {
        return Err(MboxError::MimeError(format!(
            "part tree nested deeper than {MAX_DEPTH} levels"
        )));
    }
    let part = message
        .parts
        .get(part_id)
        .ok_or_else(|| MboxError::MimeError(format!("missing MIME part {part_id}")))?;

    let mut content = PartContent::default();

    match &part.body {
        PartType::Multipart(children) => {
            for &child in children {
                let sub = walk_part(
                    message,
                    child as usize,
                    depth + 1,
                    found + content.attachments.len(),
                )?;
                content.merge(sub);
            }
            return Ok(content);
        }
        PartType::Message(nested) => return walk_part(nested, 0, depth + 1, found),
        _ => {}
    }

    if let Some(disposition) = attachment_disposition(part) {
        let payload = transfer_decoded(message, part, part_id);
        if !payload.is_empty() {
            let filename = part
                .attachment_name()
                .map(String::from)
                .unwrap_or_else(|| format!("attachment_{}", found + 1));
            content.attachments.push(ExtractedAttachment {
                content_id: part.content_id().unwrap_or_default().to_string(),
                filename: Some(filename),
                content_type: declared_type(part),
                disposition,
                size: payload.len() as u64,
                payload: payload.into_owned(),
            });
        }
        return Ok(content);
    }

    let mime_type = declared_type(part);
    if mime_type != "text/plain" && mime_type != "text/html" {
        return Ok(content);
    }
    let bytes = transfer_decoded(message, part, part_id);
    if bytes.is_empty() {
        return Ok(content);
    }

    match decode_text(part, &bytes) {
        Ok(text) if mime_type == "text/plain" => content.text.push(text),
        Ok(text) => content.html.push(text),
        Err(e) => warn!(part = part_id, error = %e, "Skipping undecodable text part"),
    }
    Ok(content)
}

/// `Some("attachment" | "inline")` when the part is to be saved.
fn attachment_disposition(part: &MessagePart<'_>) -> Option<String> {
    let disposition = part.content_disposition()?.ctype().to_ascii_lowercase();
    matches!(disposition.as_str(), "attachment" | "inline").then_some(disposition)
}

/// Lower-cased `type/subtype`, `text/plain` when undeclared (RFC 2045 §5.2).
fn declared_type(part: &MessagePart<'_>) -> String {
    match part.content_type() {
        Some(ct) => match ct.subtype() {
            Some(sub) => format!("{}/{}", ct.ctype(), sub).to_ascii_lowercase(),
            None => ct.ctype().to_ascii_lowercase(),
        },
        None => "text/plain".to_string(),
    }
}

/// Leaf payload with only the Content-Transfer-Encoding undone.
///
/// mail-parser hands text parts back already converted to UTF-8, so for those
/// the original bytes are re-read from the raw message and decoded here.
fn transfer_decoded<'a>(
    message: &'a MimeMessage<'_>,
    part: &'a MessagePart<'_>,
    part_id: usize,
) -> Cow<'a, [u8]> {
    if !matches!(part.body, PartType::Text(_) | PartType::Html(_)) {
        return Cow::Borrowed(part.contents());
    }
    let Some(raw) = message
        .raw_message
        .get(part.raw_body_offset()..part.raw_end_offset())
    else {
        return Cow::Borrowed(part.contents());
    };
    let decoded = match part.encoding {
        Encoding::None => return Cow::Borrowed(raw),
        Encoding::Base64 => base64_decode(raw),
        Encoding::QuotedPrintable => quoted_printable_decode(raw),
    };
    match decoded {
        Some(bytes) => Cow::Owned(bytes),
        None => {
            warn!(part = part_id, "Transfer decoding failed, keeping parser output");
            Cow::Borrowed(part.contents())
        }
    }
}

/// Decode a leaf's bytes using its declared charset (default UTF-8).
fn decode_text(part: &MessagePart<'_>, bytes: &[u8]) -> Result<String> {
    let charset = part
        .content_type()
        .and_then(|ct| ct.attribute("charset"))
        .unwrap_or("utf-8");
    decode_with_charset(charset, bytes)
}

/// Decode `bytes` as `charset`, replacing malformed sequences.
pub fn decode_with_charset(charset: &str, bytes: &[u8]) -> Result<String> {
    let label = charset.trim().trim_matches('"');
    if label.eq_ignore_ascii_case("utf-8") || label.eq_ignore_ascii_case("utf8") {
        return Ok(String::from_utf8_lossy(bytes).into_owned());
    }
    let encoding = encoding_rs::Encoding::for_label(label.as_bytes())
        .ok_or_else(|| MboxError::UnsupportedEncoding(label.to_string()))?;
    Ok(encoding.decode(bytes).0.into_owned())
}

/// Skip the `From ` separator line at the start of MBOX messages.
pub fn skip_from_line(data: &[u8]) -> &[u8] {
    let data = data.strip_prefix(&[0xEF, 0xBB, 0xBF]).unwrap_or(data);
    if data.starts_with(b"From ") {
        if let Some(pos) = data.iter().position(|&b| b == b'\n') {
            return &data[pos + 1..];
        }
    }
    data
}

/// Convert HTML to plain text.
///
/// - Removes `<script>` and `<style>` blocks entirely
/// - Breaks lines at block elements (`<br>`, `<p>`, `<div>`, `<li>`, …)
/// - Decodes common HTML entities
/// - Trims every line, splits on runs of two or more spaces and drops blanks
///
/// Markup that ends inside an unterminated tag falls back to [`strip_tags`].
pub fn html_to_text(html: &str) -> String {
    match convert_markup(html) {
        Some(text) => text,
        None => {
            debug!("Markup conversion failed, stripping tags");
            strip_tags(html)
        }
    }
}

/// Blunt fallback: delete everything that looks like a tag.
pub fn strip_tags(html: &str) -> String {
    TAG_RE
        .get_or_init(|| Regex::new(r"<[^>]+>").expect("valid tag pattern"))
        .replace_all(html, "")
        .into_owned()
}

fn convert_markup(html: &str) -> Option<String> {
    let without_scripts = remove_tag_block(&remove_tag_block(html, "script"), "style");

    let mut visible = String::with_capacity(without_scripts.len());
    let mut tag = String::new();
    let mut in_tag = false;
    for ch in without_scripts.chars() {
        match ch {
            '<' if !in_tag => {
                in_tag = true;
                tag.clear();
            }
            '>' if in_tag => {
                in_tag = false;
                if is_block_tag(&tag) {
                    visible.push('\n');
                }
            }
            _ if in_tag => tag.push(ch),
            _ => visible.push(ch),
        }
    }
    if in_tag {
        return None;
    }

    let decoded = decode_entities(&visible);
    let lines: Vec<&str> = decoded
        .lines()
        .flat_map(|line| line.trim().split("  "))
        .map(str::trim)
        .filter(|phrase| !phrase.is_empty())
        .collect();
    Some(lines.join("\n"))
}

fn is_block_tag(tag: &str) -> bool {
    let name: String = tag
        .trim_start_matches('/')
        .chars()
        .take_while(|c| c.is_ascii_alphanumeric())
        .collect::<String>()
        .to_ascii_lowercase();
    BLOCK_TAGS.contains(&name.as_str())
}

fn decode_entities(text: &str) -> String {
    let named = text
        .replace("&nbsp;", " ")
        .replace("&#160;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'");
    let numeric = NUMERIC_ENTITY_RE
        .get_or_init(|| {
            Regex::new(r"&#([xX][0-9a-fA-F]{1,6}|[0-9]{1,7});").expect("valid entity pattern")
        })
        .replace_all(&named, |caps: &regex::Captures<'_>| {
            let digits = &caps[1];
            let code = match digits.strip_prefix(['x', 'X']) {
                Some(hex) => u32::from_str_radix(hex, 16),
                None => digits.parse(),
            };
            code.ok()
                .and_then(char::from_u32)
                .map(String::from)
                .unwrap_or_else(|| caps[0].to_string())
        });
    // Last, so `&amp;lt;` stays `&lt;`.
    numeric.replace("&amp;", "&")
}

/// Remove an entire tag block (e.g. `<script>…</script>`), case-insensitively.
fn remove_tag_block(html: &str, tag: &str) -> String {
    let open = format!("<{tag}");
    let close = format!("</{tag}>");
    let lower = html.to_ascii_lowercase();

    let mut result = String::with_capacity(html.len());
    let mut pos = 0;
    while let Some(start) = lower[pos..].find(&open).map(|i| pos + i) {
        result.push_str(&html[pos..start]);
        match lower[start..].find(&close) {
            Some(end) => pos = start + end + close.len(),
            None => {
                pos = html.len();
                break;
            }
        }
    }
    result.push_str(&html[pos..]);
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    const PDF_B64: &str = "JVBERi0xLjQKJcOkw7zDtsOfCjEgMCBvYmoKPDw+PgplbmRvYmoKdHJhaWxlcgo8PD4+CiUlRU9GCg==";

    fn mixed_message(parts: &str) -> String {
        format!(
            "From jane@example.com Fri Mar 01 10:00:00 2024\n\
From: Jane Doe <jane@example.com>\n\
To: Bob <bob@example.com>, carol@example.org\n\
Cc: dave@example.net\n\
Subject: Quarterly report\n\
Date: Fri, 01 Mar 2024 10:00:00 +0000\n\
Message-ID: <q1@example.com>\n\
MIME-Version: 1.0\n\
Content-Type: multipart/mixed; boundary=\"outer\"\n\
\n\
{parts}--outer--\n"
        )
    }

    #[test]
    fn test_extract_text_and_pdf() {
        let raw = mixed_message(&format!(
            "--outer\n\
Content-Type: text/plain; charset=utf-8\n\
\n\
See attached.\n\
--outer\n\
Content-Type: application/pdf; name=\"report.pdf\"\n\
Content-Disposition: attachment; filename=\"report.pdf\"\n\
Content-Transfer-Encoding: base64\n\
\n\
{PDF_B64}\n"
        ));
        let msg = ContentExtractor::new(false).extract(raw.as_bytes()).unwrap();
        assert_eq!(msg.subject, "Quarterly report");
        assert_eq!(msg.from, "Jane Doe <jane@example.com>");
        assert_eq!(msg.to, vec!["bob@example.com", "carol@example.org"]);
        assert_eq!(msg.cc, vec!["dave@example.net"]);
        assert!(msg.bcc.is_empty());
        assert_eq!(msg.message_id, "<q1@example.com>");
        assert_eq!(msg.content.text.as_deref().map(str::trim), Some("See attached."));

        assert_eq!(msg.content.attachments.len(), 1);
        let att = &msg.content.attachments[0];
        assert_eq!(att.filename.as_deref(), Some("report.pdf"));
        assert_eq!(att.content_type, "application/pdf");
        assert_eq!(att.disposition, "attachment");
        assert!(att.payload.starts_with(b"%PDF-1.4"));
        assert_eq!(att.size, att.payload.len() as u64);
    }

    #[test]
    fn test_unnamed_attachments_are_numbered_per_message() {
        let raw = mixed_message(
            "--outer\n\
Content-Type: application/octet-stream\n\
Content-Disposition: attachment\n\
\n\
first\n\
--outer\n\
Content-Type: application/octet-stream\n\
Content-Disposition: attachment\n\
\n\
second\n",
        );
        let extractor = ContentExtractor::new(false);
        for _ in 0..2 {
            let msg = extractor.extract(raw.as_bytes()).unwrap();
            let names: Vec<_> = msg
                .content
                .attachments
                .iter()
                .map(|a| a.filename.clone().unwrap())
                .collect();
            assert_eq!(names, vec!["attachment_1", "attachment_2"]);
        }
    }

    #[test]
    fn test_nested_parts_keep_document_order() {
        let raw = mixed_message(
            "--outer\n\
Content-Type: multipart/alternative; boundary=\"inner\"\n\
\n\
--inner\n\
Content-Type: text/plain\n\
\n\
First part\n\
--inner\n\
Content-Type: application/octet-stream\n\
Content-Disposition: inline\n\
\n\
inline-bytes\n\
--inner--\n\
--outer\n\
Content-Type: text/plain\n\
\n\
Second part\n\
--outer\n\
Content-Type: application/octet-stream\n\
Content-Disposition: attachment\n\
\n\
tail-bytes\n",
        );
        let msg = ContentExtractor::new(false).extract(raw.as_bytes()).unwrap();
        let text = msg.content.text.unwrap();
        let first = text.find("First part").unwrap();
        let second = text.find("Second part").unwrap();
        assert!(first < second);
        assert!(text[first..second].contains("\n\n"));

        let atts = &msg.content.attachments;
        assert_eq!(atts.len(), 2);
        assert_eq!(atts[0].disposition, "inline");
        assert_eq!(atts[0].filename.as_deref(), Some("attachment_1"));
        assert_eq!(atts[1].filename.as_deref(), Some("attachment_2"));
    }

    #[test]
    fn test_html_only_is_converted() {
        let raw = "From: a@example.com\n\
Subject: Promo\n\
Content-Type: text/html; charset=utf-8\n\
\n\
<html><head><style>p { color: red; }</style></head>\
<body><p>Hello   <b>world</b></p><script>alert(1)</script><p>Tom &amp; Jerry</p></body></html>\n";
        let msg = ContentExtractor::new(false).extract(raw.as_bytes()).unwrap();
        let text = msg.content.text.unwrap();
        assert!(text.contains("Hello"));
        assert!(text.contains("world"));
        assert!(text.contains("Tom & Jerry"));
        assert!(!text.contains("alert"));
        assert!(!text.contains("color"));
        assert!(msg.content.html.is_none());

        let kept = ContentExtractor::new(true).extract(raw.as_bytes()).unwrap();
        assert!(kept.content.html.unwrap().contains("<b>world</b>"));
    }

    #[test]
    fn test_attachment_only_gets_placeholder() {
        let raw = mixed_message(
            "--outer\n\
Content-Type: application/octet-stream\n\
Content-Disposition: attachment; filename=\"data.bin\"\n\
\n\
payload\n",
        );
        let msg = ContentExtractor::new(false).extract(raw.as_bytes()).unwrap();
        assert_eq!(msg.content.text.as_deref(), Some(NO_CONTENT));
        assert_eq!(msg.content.attachments.len(), 1);
    }

    #[test]
    fn test_forwarded_message_is_walked() {
        let raw = mixed_message(
            "--outer\n\
Content-Type: text/plain\n\
\n\
Forwarding this\n\
--outer\n\
Content-Type: message/rfc822\n\
\n\
From: inner@example.com\n\
Subject: Inner\n\
Content-Type: multipart/mixed; boundary=\"fwd\"\n\
\n\
--fwd\n\
Content-Type: text/plain\n\
\n\
Inner body\n\
--fwd\n\
Content-Type: text/csv\n\
Content-Disposition: attachment; filename=\"numbers.csv\"\n\
\n\
a,b\n\
1,2\n\
--fwd--\n",
        );
        let msg = ContentExtractor::new(false).extract(raw.as_bytes()).unwrap();
        let text = msg.content.text.unwrap();
        assert!(text.contains("Forwarding this"));
        assert!(text.contains("Inner body"));
        assert_eq!(msg.content.attachments.len(), 1);
        assert_eq!(
            msg.content.attachments[0].filename.as_deref(),
            Some("numbers.csv")
        );
    }

    #[test]
    fn test_missing_subject_and_headers() {
        let raw = b"From: a@example.com\n\nJust text\n";
        let msg = ContentExtractor::new(false).extract(raw).unwrap();
        assert_eq!(msg.subject, NO_SUBJECT);
        assert!(msg.to.is_empty());
        assert_eq!(msg.message_id, "");
        assert_eq!(msg.content.text.as_deref().map(str::trim), Some("Just text"));
    }

    #[test]
    fn test_record_without_headers_fails() {
        let raw = b"From nobody Thu Jan 01 00:00:00 2024\nthis is not a header block\n\nbody\n";
        let err = ContentExtractor::new(false).extract(raw).unwrap_err();
        assert!(matches!(err, MboxError::MimeError(_)));
    }

    #[test]
    fn test_threading_and_labels() {
        let raw = b"From: a@example.com\n\
In-Reply-To: <root@example.com>\n\
References: <root@example.com> <mid@example.com>\n\
X-Gmail-Labels: Inbox,Important, Work\n\
\n\
Reply\n";
        let msg = ContentExtractor::new(false).extract(raw).unwrap();
        assert_eq!(msg.in_reply_to.as_deref(), Some("<root@example.com>"));
        assert_eq!(msg.references, vec!["<root@example.com>", "<mid@example.com>"]);
        assert_eq!(msg.labels, vec!["Inbox", "Important", "Work"]);
    }

    #[test]
    fn test_latin1_csv_attachment_keeps_original_bytes() {
        let raw = mixed_message(
            "--outer\n\
Content-Type: text/csv; charset=iso-8859-1\n\
Content-Disposition: attachment; filename=\"prices.csv\"\n\
Content-Transfer-Encoding: base64\n\
\n\
Y2Fm6SwxCg==\n",
        );
        let msg = ContentExtractor::new(false).extract(raw.as_bytes()).unwrap();
        let att = &msg.content.attachments[0];
        assert_eq!(att.payload, b"caf\xe9,1\n");
        assert_eq!(att.size, 7);
    }

    #[test]
    fn test_binary_text_attachment_is_not_reencoded() {
        let raw = mixed_message(
            "--outer\n\
Content-Type: text/plain\n\
Content-Disposition: attachment; filename=\"dump.txt\"\n\
Content-Transfer-Encoding: base64\n\
\n\
AP/+gAE=\n",
        );
        let msg = ContentExtractor::new(false).extract(raw.as_bytes()).unwrap();
        assert_eq!(msg.content.attachments[0].payload, [0x00, 0xFF, 0xFE, 0x80, 0x01]);
    }

    #[test]
    fn test_quoted_printable_text_attachment() {
        let raw = mixed_message(
            "--outer\n\
Content-Type: text/plain; charset=iso-8859-1\n\
Content-Disposition: attachment; filename=\"note.txt\"\n\
Content-Transfer-Encoding: quoted-printable\n\
\n\
caf=E9\n",
        );
        let msg = ContentExtractor::new(false).extract(raw.as_bytes()).unwrap();
        assert!(msg.content.attachments[0].payload.starts_with(b"caf\xe9"));
    }

    #[test]
    fn test_body_uses_declared_charset() {
        let raw = mixed_message(
            "--outer\n\
Content-Type: text/plain; charset=iso-8859-1\n\
Content-Transfer-Encoding: base64\n\
\n\
aOlsbG8gd/ZybGQ=\n",
        );
        let msg = ContentExtractor::new(false).extract(raw.as_bytes()).unwrap();
        assert_eq!(msg.content.text.as_deref(), Some("héllo wörld"));
    }

    #[test]
    fn test_unknown_charset_skips_only_that_part() {
        let raw = mixed_message(
            "--outer\n\
Content-Type: text/plain; charset=x-no-such-charset\n\
\n\
lost\n\
--outer\n\
Content-Type: text/plain; charset=utf-8\n\
\n\
kept\n\
--outer\n\
Content-Type: application/pdf\n\
Content-Disposition: attachment; filename=\"a.pdf\"\n\
\n\
%PDF\n",
        );
        let msg = ContentExtractor::new(false).extract(raw.as_bytes()).unwrap();
        let text = msg.content.text.unwrap();
        assert!(text.contains("kept"));
        assert!(!text.contains("lost"));
        assert_eq!(msg.content.attachments.len(), 1);
    }

    #[test]
    fn test_decode_with_charset() {
        assert_eq!(decode_with_charset("utf-8", "héllo".as_bytes()).unwrap(), "héllo");
        assert_eq!(decode_with_charset("ISO-8859-1", &[0x63, 0x61, 0x66, 0xE9]).unwrap(), "café");
        assert_eq!(decode_with_charset("utf-8", &[0x61, 0xFF]).unwrap(), "a\u{FFFD}");
        assert!(matches!(
            decode_with_charset("x-no-such-charset", b"abc"),
            Err(MboxError::UnsupportedEncoding(_))
        ));
    }

    #[test]
    fn test_skip_from_line() {
        let data = b"From user@example.com Thu Jan 01 00:00:00 2024\nSubject: Test\n\nBody\n";
        assert!(skip_from_line(data).starts_with(b"Subject:"));
        let plain = b"Subject: Test\n\nBody\n";
        assert_eq!(skip_from_line(plain), plain);
    }

    #[test]
    fn test_html_to_text_blocks_and_whitespace() {
        let html = "<div>Line one</div><div>Line   two</div><br/>\n\n\n<p>End</p>";
        assert_eq!(html_to_text(html), "Line one\nLine\ntwo\nEnd");
    }

    #[test]
    fn test_html_to_text_falls_back_on_unterminated_tag() {
        let html = "<p>Visible</p><img src=\"x";
        let text = html_to_text(html);
        assert_eq!(text, "Visible<img src=\"x");
    }

    #[test]
    fn test_numeric_entities() {
        assert_eq!(
            html_to_text("<p>It&#8217;s &#x2019;ok&#X21; &amp;#39; &#xD800;</p>"),
            "It\u{2019}s \u{2019}ok! &#39; &#xD800;"
        );
    }

    #[test]
    fn test_strip_tags() {
        assert_eq!(strip_tags("<b>bold</b> and <i>italic</i>"), "bold and italic");
    }
}
