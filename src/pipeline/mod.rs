//! Extraction run: MBOX → messages → attachments on disk → statistics.

pub mod stats;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, error, info, info_span, warn};

use crate::config::ProcessorConfig;
use crate::error::{MboxError, Result};
use crate::model::mail::Message;
use crate::parser::mbox::MboxParser;
use crate::parser::mime::ContentExtractor;
use crate::store::AttachmentStore;

pub use stats::ProcessingStats;

/// Where a run currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Init,
    Running,
    Extracting,
    Saving,
    Counting,
    Finalizing,
    Done,
}

/// Outcome of [`MailboxPipeline::run`]: statistics are always present, the
/// error only when the container itself could not be processed.
#[derive(Debug)]
pub struct RunReport {
    pub stats: ProcessingStats,
    pub error: Option<MboxError>,
}

impl RunReport {
    pub fn into_result(self) -> Result<ProcessingStats> {
        match self.error {
            Some(e) => Err(e),
            None => Ok(self.stats),
        }
    }
}

/// Drives one extraction run over a single MBOX file.
pub struct MailboxPipeline {
    config: ProcessorConfig,
    extractor: ContentExtractor,
    store: AttachmentStore,
    state: PipelineState,
    interrupted: Arc<AtomicBool>,
}

impl MailboxPipeline {
    /// Validate `config` and prepare the store. Nothing is written yet.
    pub fn new(config: ProcessorConfig) -> Result<Self> {
        config.validate()?;
        let store =
            AttachmentStore::new(config.attachments_dir(), config.post_process, config.keep_temp);
        Ok(Self::with_store(config, store))
    }

    /// Use a preconfigured store (e.g. with a seeded namer).
    pub fn with_store(config: ProcessorConfig, store: AttachmentStore) -> Self {
        Self {
            extractor: ContentExtractor::new(config.keep_html),
            config,
            store,
            state: PipelineState::Init,
            interrupted: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Stop before the next message once `flag` is set. The run then ends
    /// with [`MboxError::Interrupted`].
    pub fn with_interrupt_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.interrupted = flag;
        self
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn config(&self) -> &ProcessorConfig {
        &self.config
    }

    /// Process the whole mailbox.
    ///
    /// `progress` is called with `(messages_done, total_messages)`.
    /// Finalization (end time, deferred type detection) runs even when the
    /// container fails; that failure is returned in the report.
    pub fn run(&mut self, progress: Option<&dyn Fn(u64, u64)>) -> RunReport {
        let mut stats = ProcessingStats::started_at(Utc::now());
        self.state = PipelineState::Running;

        let outcome = self.process_container(&mut stats, progress);
        match outcome {
            Err(MboxError::Interrupted) => warn!(
                processed = stats.processed_messages,
                "Interrupted, stopping before the next message"
            ),
            Err(ref e) => error!(
                path = %self.config.input_file.display(),
                error = %e,
                "Failed to process mailbox"
            ),
            Ok(()) => {}
        }

        self.finalize(&mut stats);
        RunReport {
            stats,
            error: outcome.err(),
        }
    }

    fn process_container(
        &mut self,
        stats: &mut ProcessingStats,
        progress: Option<&dyn Fn(u64, u64)>,
    ) -> Result<()> {
        let parser = MboxParser::new(&self.config.input_file)?
            .with_max_message_size(self.config.max_message_size);

        stats.total_messages = parser.count_messages()?;
        let limit = self.config.message_limit();
        let target = limit.map_or(stats.total_messages, |l| l.min(stats.total_messages));
        info!(
            path = %parser.path().display(),
            total = stats.total_messages,
            limit = ?limit,
            "Processing mailbox"
        );

        let total = stats.total_messages;
        let interval = self.config.progress_interval.max(1);
        let mut index: u64 = 0;
        let mut interrupted = false;

        parser.parse(
            &mut |_offset, raw| {
                if self.interrupted.load(Ordering::Relaxed) {
                    interrupted = true;
                    return false;
                }
                if limit.is_some_and(|l| index >= l) {
                    info!(limit = index, "Message limit reached, stopping");
                    return false;
                }
                index += 1;
                self.process_message(index, raw, stats);

                if let Some(cb) = progress {
                    cb(index, total);
                }
                if index % interval == 0 || index == target {
                    log_progress(index, target, stats);
                }
                true
            },
            None,
        )?;
        if interrupted {
            return Err(MboxError::Interrupted);
        }
        Ok(())
    }

    /// Extract, save and count one record. Failures stay inside this message.
    fn process_message(&mut self, index: u64, raw: &[u8], stats: &mut ProcessingStats) {
        let _span = info_span!("message", message_index = index).entered();

        self.state = PipelineState::Extracting;
        let extracted = match self.extractor.extract(raw) {
            Ok(extracted) => extracted,
            Err(e) => {
                if self.config.verbose {
                    error!(message_index = index, error = ?e, "Failed to process message");
                } else {
                    error!(message_index = index, error = %e, "Failed to process message");
                }
                stats.record_failure();
                return;
            }
        };

        let extracted_count = extracted.content.attachments.len();
        let (mut message, orphaned) = Message::assemble(extracted, raw.to_vec(), Utc::now());
        if message.date_is_fallback {
            debug!(message_index = index, "Missing or unparseable Date, using processing time");
        }
        if !orphaned.is_empty() {
            warn!(
                message_index = index,
                attachments = orphaned.len(),
                "Message has no sender, attachments not saved"
            );
        }

        self.state = PipelineState::Saving;
        let saved = self.store.save_message(&mut message);
        debug!(
            message_index = index,
            sender = message.sender.as_ref().map_or("", |s| s.address.as_str()),
            attachments = extracted_count,
            saved = message.saved_attachment_count(),
            "Message processed"
        );

        self.state = PipelineState::Counting;
        stats.record_message(&message.from, extracted_count, &saved);
    }

    fn finalize(&mut self, stats: &mut ProcessingStats) {
        self.state = PipelineState::Finalizing;

        if self.config.post_process {
            let moved = self.store.promote_staged();
            stats.record_promotions(&moved);
        }

        stats.finish(Utc::now());
        info!(
            processed = stats.processed_messages,
            failed = stats.failed_messages,
            saved = stats.saved_attachments,
            duration_secs = stats.duration_seconds,
            "Run finished"
        );
        self.state = PipelineState::Done;
    }
}

fn log_progress(done: u64, target: u64, stats: &ProcessingStats) {
    let elapsed = stats
        .start_time
        .map(|start| (Utc::now() - start).num_milliseconds().max(1) as f64 / 1000.0)
        .unwrap_or(1.0);
    info!(
        done,
        total = target,
        rate_per_sec = done as f64 / elapsed,
        saved_attachments = stats.saved_attachments,
        "Progress"
    );
}
