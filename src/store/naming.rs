//! Sender buckets, attachment file names and the collision probe.

use std::path::{Path, PathBuf};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::writer::STAGING_DIR_NAME;
use crate::error::{MboxError, Result};
use crate::model::attachment::{suffix_of, ContextualAttachment};

/// Longest bucket directory name kept on disk.
const MAX_BUCKET_LEN: usize = 100;

/// Directory name for a sender: `"Jane <Jane.Doe+x@Example.com>"` becomes
/// `"jane_doe_x_example_com"`.
///
/// The angle-bracketed address is used when present, otherwise the whole
/// string. Characters that are not alphanumeric, `-` or `_` become `_`.
/// The staging directory name is reserved and gets a trailing `_`.
pub fn bucket_name(sender: &str) -> String {
    let source = match (sender.find('<'), sender.rfind('>')) {
        (Some(open), Some(close)) if open < close => &sender[open + 1..close],
        _ => sender,
    };
    let bucket: String = source
        .trim()
        .to_lowercase()
        .chars()
        .map(|c| match c {
            '@' | '.' | '+' => '_',
            c if c.is_alphanumeric() || c == '-' || c == '_' => c,
            _ => '_',
        })
        .take(MAX_BUCKET_LEN)
        .collect();

    if bucket.is_empty() {
        "unknown".to_string()
    } else if bucket == STAGING_DIR_NAME {
        format!("{bucket}_")
    } else {
        bucket
    }
}

/// Produces `{YYYY-MM-DD}_{bucket}_{NNNNN}{ext}` names.
pub struct AttachmentNamer {
    rng: StdRng,
}

impl Default for AttachmentNamer {
    fn default() -> Self {
        Self::new()
    }
}

impl AttachmentNamer {
    pub fn new() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }

    /// Reproducible disambiguators, for tests and benchmarks.
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// File name for `attachment` with a fresh 5-digit disambiguator.
    pub fn file_name(&mut self, attachment: &ContextualAttachment) -> String {
        let disambiguator = self.next_disambiguator();
        file_name_with(attachment, disambiguator)
    }

    /// Name for a staged attachment: no extension until its type is sniffed.
    pub fn staged_file_name(&mut self, attachment: &ContextualAttachment) -> String {
        let disambiguator = self.next_disambiguator();
        compose(attachment, disambiguator, "")
    }

    fn next_disambiguator(&mut self) -> u32 {
        self.rng.gen_range(10000..=99999)
    }
}

/// File name for `attachment` using the given disambiguator.
pub fn file_name_with(attachment: &ContextualAttachment, disambiguator: u32) -> String {
    compose(attachment, disambiguator, &attachment.extension())
}

fn compose(attachment: &ContextualAttachment, disambiguator: u32, extension: &str) -> String {
    let context = attachment.context();
    format!(
        "{}_{}_{:05}{}",
        context.date.format("%Y-%m-%d"),
        bucket_name(&context.sender),
        disambiguator,
        extension
    )
}

/// Return `candidate` if nothing exists there, otherwise the first free
/// `{stem}_{n}{ext}` sibling.
///
/// At most `entries + 1` suffixes are tried, where `entries` is the number of
/// entries in the parent directory, so one of them is free unless the
/// directory changes underneath us.
pub fn probe_unused_path(candidate: &Path) -> Result<PathBuf> {
    if !candidate.exists() {
        return Ok(candidate.to_path_buf());
    }

    let parent = candidate.parent().unwrap_or(Path::new("."));
    let file_name = candidate
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("file");
    let (stem, ext) = split_extension(file_name);

    let entries = std::fs::read_dir(parent)
        .map_err(|e| MboxError::io(parent, e))?
        .count();

    for n in 1..=entries + 1 {
        let probe = parent.join(format!("{stem}_{n}{ext}"));
        if !probe.exists() {
            return Ok(probe);
        }
    }
    Err(MboxError::NameExhausted(candidate.to_path_buf()))
}

/// `("report", ".pdf")`, or `(name, "")` when there is no suffix.
fn split_extension(name: &str) -> (&str, &str) {
    match suffix_of(name) {
        Some(suffix) => name.split_at(name.len() - suffix.len()),
        None => (name, ""),
    }
}
