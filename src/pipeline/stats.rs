//! Run statistics.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::model::attachment::extension_of;

/// Sender key for messages without a `From:` header.
pub const UNKNOWN_SENDER: &str = "unknown@unknown.com";

/// Aggregate counters for one extraction run.
///
/// `saved_attachments`, `attachments_size_bytes` and `attachments_by_type`
/// only ever count files that existed on disk when they were recorded.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ProcessingStats {
    pub total_messages: u64,
    pub processed_messages: u64,
    pub failed_messages: u64,
    /// Attachments found in processed messages, saved or not.
    pub total_attachments: u64,
    pub saved_attachments: u64,
    /// Staged files renamed after content sniffing.
    pub post_processed: u64,
    /// Saved attachments per lower-cased extension (`""` for none).
    pub attachments_by_type: BTreeMap<String, u64>,
    /// Processed messages per raw `From:` value.
    pub senders: BTreeMap<String, u64>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub duration_seconds: f64,
    pub attachments_size_bytes: u64,
    pub messages_with_attachments: u64,
    pub messages_per_second: f64,
}

impl ProcessingStats {
    /// Empty statistics with the start time set.
    pub fn started_at(start: DateTime<Utc>) -> Self {
        Self {
            start_time: Some(start),
            ..Self::default()
        }
    }

    /// Count a successfully decoded message.
    ///
    /// `extracted` is the number of attachments found in it and `saved` the
    /// paths actually written. Paths that no longer exist are not counted.
    pub fn record_message(&mut self, sender: &str, extracted: usize, saved: &[PathBuf]) {
        self.processed_messages += 1;
        self.total_attachments += extracted as u64;

        let key = if sender.trim().is_empty() {
            UNKNOWN_SENDER
        } else {
            sender
        };
        *self.senders.entry(key.to_string()).or_insert(0) += 1;

        let mut counted = 0;
        for path in saved {
            let Ok(metadata) = std::fs::metadata(path) else {
                continue;
            };
            counted += 1;
            self.saved_attachments += 1;
            self.attachments_size_bytes += metadata.len();
            *self.attachments_by_type.entry(file_extension(path)).or_insert(0) += 1;
        }
        if counted > 0 {
            self.messages_with_attachments += 1;
        }
    }

    pub fn record_failure(&mut self) {
        self.failed_messages += 1;
    }

    /// Move the type counts of promoted files from `""` to their new extension.
    pub fn record_promotions(&mut self, moved: &BTreeMap<PathBuf, PathBuf>) {
        for (staged, promoted) in moved {
            self.post_processed += 1;
            let old = file_extension(staged);
            if let Some(count) = self.attachments_by_type.get_mut(&old) {
                *count = count.saturating_sub(1);
                if *count == 0 {
                    self.attachments_by_type.remove(&old);
                }
            }
            *self
                .attachments_by_type
                .entry(file_extension(promoted))
                .or_insert(0) += 1;
        }
    }

    /// Set the end time and derive duration and throughput.
    pub fn finish(&mut self, end: DateTime<Utc>) {
        self.end_time = Some(end);
        let start = self.start_time.unwrap_or(end);
        self.duration_seconds = (end - start).num_milliseconds().max(0) as f64 / 1000.0;
        self.messages_per_second = if self.duration_seconds > 0.0 {
            self.processed_messages as f64 / self.duration_seconds
        } else {
            0.0
        };
    }

    /// Senders with the most messages, ties broken alphabetically.
    pub fn top_senders(&self, n: usize) -> Vec<(&str, u64)> {
        top_n(&self.senders, n)
    }

    /// Extensions with the most saved attachments.
    pub fn top_types(&self, n: usize) -> Vec<(&str, u64)> {
        top_n(&self.attachments_by_type, n)
    }
}

fn file_extension(path: &Path) -> String {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(extension_of)
        .unwrap_or_default()
}

fn top_n(counts: &BTreeMap<String, u64>, n: usize) -> Vec<(&str, u64)> {
    let mut entries: Vec<(&str, u64)> = counts.iter().map(|(k, &v)| (k.as_str(), v)).collect();
    entries.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
    entries.truncate(n);
    entries
}
