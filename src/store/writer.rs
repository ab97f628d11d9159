//! On-disk attachment tree.
//!
//! Layout under the root (`{output_dir}/attachments`):
//!
//! ```text
//! {bucket}/{YYYY-MM-DD}_{bucket}_{NNNNN}{ext}
//! temp/{bucket}/{YYYY-MM-DD}_{bucket}_{NNNNN}      (deferred detection only)
//! ```

use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};
use walkdir::WalkDir;

use super::naming::{bucket_name, probe_unused_path, AttachmentNamer};
use super::sniff::sniff_file;
use crate::error::{MboxError, Result};
use crate::model::attachment::{has_plausible_extension, ContextualAttachment};
use crate::model::mail::Message;

/// Name of the staging directory below the root.
pub const STAGING_DIR_NAME: &str = "temp";

/// Bucket used when a staged file's sender cannot be recovered from its path.
const FALLBACK_BUCKET: &str = "unknown";

/// Owns the attachment root and every file written below it.
pub struct AttachmentStore {
    root: PathBuf,
    staging: PathBuf,
    deferred_detection: bool,
    keep_staging: bool,
    namer: AttachmentNamer,
}

impl AttachmentStore {
    /// Store rooted at `root`. With `deferred_detection`, attachments whose
    /// declared name has no plausible extension go to `root/temp` until
    /// [`promote_staged`](Self::promote_staged) runs.
    pub fn new(root: impl Into<PathBuf>, deferred_detection: bool, keep_staging: bool) -> Self {
        let root = root.into();
        Self {
            staging: root.join(STAGING_DIR_NAME),
            root,
            deferred_detection,
            keep_staging,
            namer: AttachmentNamer::new(),
        }
    }

    /// Replace the name generator (seeded namers make runs reproducible).
    pub fn with_namer(mut self, namer: AttachmentNamer) -> Self {
        self.namer = namer;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn staging_dir(&self) -> &Path {
        &self.staging
    }

    /// Write one attachment and record its final path on it.
    pub fn save(&mut self, attachment: &mut ContextualAttachment) -> Result<PathBuf> {
        if let Some(existing) = attachment.saved_path() {
            return Err(MboxError::AlreadySaved(existing.to_path_buf()));
        }

        let bucket = bucket_name(&attachment.context().sender);
        let staged = self.deferred_detection && !attachment.has_plausible_extension();
        let (dir, name) = if staged {
            (self.staging.join(&bucket), self.namer.staged_file_name(attachment))
        } else {
            (self.root.join(&bucket), self.namer.file_name(attachment))
        };
        fs::create_dir_all(&dir).map_err(|e| MboxError::io(&dir, e))?;

        let candidate = dir.join(name);
        let path = probe_unused_path(&candidate)?;
        write_new(&path, attachment.payload())?;

        debug!(
            attachment = attachment.display_name(),
            path = %path.display(),
            bytes = attachment.payload().len(),
            "Saved attachment"
        );
        attachment.mark_saved(path.clone())?;
        Ok(path)
    }

    /// Save every attachment of `message`, returning the paths written.
    ///
    /// A failure on one attachment is logged and does not stop the others.
    pub fn save_message(&mut self, message: &mut Message) -> Vec<PathBuf> {
        let mut saved = Vec::with_capacity(message.attachments.len());
        for attachment in &mut message.attachments {
            match self.save(attachment) {
                Ok(path) => saved.push(path),
                Err(e) => warn!(
                    message_id = %message.message_id,
                    attachment = attachment.display_name(),
                    error = %e,
                    "Failed to save attachment"
                ),
            }
        }
        saved
    }

    /// Sniff staged files and move the recognised ones into their bucket.
    ///
    /// Returns `staged path → promoted path` for every file moved. A file
    /// that cannot be moved is logged and stays in staging, as do files of
    /// unrecognised type. Unless staging is kept, empty staging directories
    /// are removed afterwards.
    pub fn promote_staged(&mut self) -> BTreeMap<PathBuf, PathBuf> {
        let mut moved = BTreeMap::new();
        if !self.deferred_detection || !self.staging.is_dir() {
            return moved;
        }

        let staged: Vec<PathBuf> = WalkDir::new(&self.staging)
            .into_iter()
            .filter_map(|entry| match entry {
                Ok(entry) => Some(entry),
                Err(e) => {
                    warn!(error = %e, "Skipping unreadable staging entry");
                    None
                }
            })
            .filter(|entry| entry.file_type().is_file())
            .map(|entry| entry.into_path())
            .collect();

        for path in staged {
            let name = match path.file_name().and_then(|n| n.to_str()) {
                Some(name) => name.to_string(),
                None => continue,
            };
            if has_plausible_extension(&name) {
                continue;
            }

            let sniffed = sniff_file(&path);
            if !sniffed.is_known() {
                debug!(path = %path.display(), "Type not recognised, leaving in staging");
                continue;
            }

            let bucket = self.bucket_of_staged(&path);
            let dir = self.root.join(&bucket);
            if let Err(e) = fs::create_dir_all(&dir) {
                warn!(path = %dir.display(), error = %e, "Failed to create bucket directory");
                continue;
            }
            let target = match probe_unused_path(&dir.join(format!("{name}{}", sniffed.extension))) {
                Ok(target) => target,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "No free name for staged file");
                    continue;
                }
            };

            match fs::rename(&path, &target) {
                Ok(()) => {
                    debug!(
                        from = %path.display(),
                        to = %target.display(),
                        mime_type = %sniffed.mime_type,
                        "Promoted staged attachment"
                    );
                    moved.insert(path, target);
                }
                Err(e) => warn!(path = %path.display(), error = %e, "Failed to promote staged file"),
            }
        }

        info!(promoted = moved.len(), "Deferred type detection finished");

        if !self.keep_staging {
            self.remove_staging();
        }
        moved
    }

    /// Bucket directory a staged file belongs to (`temp/{bucket}/file`).
    fn bucket_of_staged(&self, path: &Path) -> String {
        path.parent()
            .and_then(|parent| parent.strip_prefix(&self.staging).ok())
            .and_then(|rel| rel.components().next())
            .and_then(|c| c.as_os_str().to_str())
            .map(String::from)
            .unwrap_or_else(|| FALLBACK_BUCKET.to_string())
    }

    /// Remove empty directories under staging, then staging itself if empty.
    fn remove_staging(&self) {
        let dirs: Vec<PathBuf> = WalkDir::new(&self.staging)
            .contents_first(true)
            .into_iter()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_dir())
            .map(|entry| entry.into_path())
            .collect();

        for dir in dirs {
            let is_empty = fs::read_dir(&dir)
                .map(|mut entries| entries.next().is_none())
                .unwrap_or(false);
            if !is_empty {
                continue;
            }
            if let Err(e) = fs::remove_dir(&dir) {
                warn!(path = %dir.display(), error = %e, "Failed to remove staging directory");
            }
        }

        if self.staging.exists() {
            warn!(
                path = %self.staging.display(),
                "Staging directory kept: it still holds files of unknown type"
            );
        }
    }
}

/// Create `path` and write `bytes`, never replacing an existing file.
fn write_new(path: &Path, bytes: &[u8]) -> Result<()> {
    let mut file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .map_err(|e| MboxError::io(path, e))?;
    file.write_all(bytes).map_err(|e| MboxError::io(path, e))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::attachment::{AttachmentContext, ExtractedAttachment};
    use crate::model::mail::{ExtractedMessage, MessageContent};
    use crate::pipeline::ProcessingStats;
    use chrono::{TimeZone, Utc};
    use std::collections::HashSet;

    const PNG_HEAD: [u8; 33] = [
        0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0x00, 0x00, 0x00, 0x0D, 0x49, 0x48, 0x44,
        0x52, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x01, 0x08, 0x06, 0x00, 0x00, 0x00, 0x1F,
        0x15, 0xC4, 0x89,
    ];

    fn extracted(filename: &str, payload: &[u8]) -> ExtractedAttachment {
        ExtractedAttachment {
            content_id: String::new(),
            filename: Some(filename.to_string()),
            content_type: "application/octet-stream".into(),
            disposition: "attachment".into(),
            payload: payload.to_vec(),
            size: payload.len() as u64,
        }
    }

    fn attachment_from(sender: &str, filename: &str, payload: &[u8]) -> ContextualAttachment {
        extracted(filename, payload).with_context(
            AttachmentContext::new(
                "<m@example.com>",
                Utc.with_ymd_and_hms(2024, 3, 1, 8, 0, 0).unwrap(),
                sender,
            )
            .unwrap(),
        )
    }

    fn attachment(filename: &str, payload: &[u8]) -> ContextualAttachment {
        attachment_from("Jane <jane@example.com>", filename, payload)
    }

    #[test]
    fn test_save_into_bucket() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = AttachmentStore::new(dir.path().join("attachments"), false, false);
        let mut att = attachment("report.pdf", b"%PDF-1.4");

        let path = store.save(&mut att).unwrap();
        assert_eq!(att.saved_path(), Some(path.as_path()));
        assert_eq!(fs::read(&path).unwrap(), b"%PDF-1.4");
        assert_eq!(
            path.parent().unwrap(),
            dir.path().join("attachments").join("jane_example_com")
        );
        let name = path.file_name().unwrap().to_str().unwrap();
        assert!(name.starts_with("2024-03-01_jane_example_com_"));
        assert!(name.ends_with(".pdf"));
    }

    #[test]
    fn test_save_twice_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = AttachmentStore::new(dir.path(), false, false);
        let mut att = attachment("a.txt", b"hello");
        store.save(&mut att).unwrap();
        assert!(matches!(store.save(&mut att), Err(MboxError::AlreadySaved(_))));
    }

    #[test]
    fn test_identical_names_get_unique_paths() {
        let dir = tempfile::tempdir().unwrap();
        let mut paths = HashSet::new();
        for _ in 0..4 {
            // Same seed, same disambiguator: only the probe keeps paths apart.
            let mut store = AttachmentStore::new(dir.path(), false, false)
                .with_namer(AttachmentNamer::seeded(1));
            let mut att = attachment("a.txt", b"hello");
            assert!(paths.insert(store.save(&mut att).unwrap()));
        }
        assert_eq!(paths.len(), 4);
    }

    #[test]
    fn test_extensionless_goes_to_staging_then_promoted() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("attachments");
        let mut store = AttachmentStore::new(&root, true, false);

        let mut image = attachment("attachment_1", &PNG_HEAD);
        let staged = store.save(&mut image).unwrap();
        assert!(staged.starts_with(root.join("temp").join("jane_example_com")));

        let mut pdf = attachment("doc.pdf", b"%PDF-1.4");
        assert!(store.save(&mut pdf).unwrap().starts_with(root.join("jane_example_com")));

        let moved = store.promote_staged();
        assert_eq!(moved.len(), 1);
        let promoted = &moved[&staged];
        assert_eq!(promoted.parent().unwrap(), root.join("jane_example_com"));
        assert_eq!(promoted.extension().unwrap(), "png");
        assert!(promoted.exists());
        assert!(!staged.exists());
        assert!(!root.join("temp").exists());
    }

    #[test]
    fn test_unrecognised_files_stay_in_staging() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = AttachmentStore::new(dir.path(), true, false);
        let mut blob = attachment("mystery", &[0x00, 0x13, 0x37, 0x00]);
        let staged = store.save(&mut blob).unwrap();

        let moved = store.promote_staged();
        assert!(moved.is_empty());
        assert!(staged.exists());
    }

    #[test]
    fn test_keep_staging() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = AttachmentStore::new(dir.path(), true, true);
        let mut image = attachment("attachment_1", &PNG_HEAD);
        store.save(&mut image).unwrap();

        assert_eq!(store.promote_staged().len(), 1);
        assert!(store.staging_dir().join("jane_example_com").is_dir());
    }

    #[test]
    fn test_without_deferred_detection_nothing_is_staged() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = AttachmentStore::new(dir.path(), false, false);
        let mut image = attachment("attachment_1", &PNG_HEAD);
        let path = store.save(&mut image).unwrap();
        assert!(path.starts_with(dir.path().join("jane_example_com")));
        assert!(store.promote_staged().is_empty());
    }

    #[test]
    fn test_failed_write_does_not_stop_siblings() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = AttachmentStore::new(dir.path(), false, false);
        let extracted_message = ExtractedMessage {
            from: "Jane <jane@example.com>".into(),
            date_header: Some("Fri, 01 Mar 2024 10:00:00 +0000".into()),
            content: MessageContent {
                text: Some("body".into()),
                html: None,
                attachments: vec![
                    extracted("first.pdf", b"%PDF-1"),
                    // NUL is never valid in a path, so this write fails.
                    extracted("broken.p\0df", b"%PDF-2"),
                    extracted("third.pdf", b"%PDF-3"),
                ],
            },
            ..Default::default()
        };
        let (mut message, orphaned) =
            Message::assemble(extracted_message, Vec::new(), Utc::now());
        assert!(orphaned.is_empty());

        let saved = store.save_message(&mut message);
        assert_eq!(saved.len(), 2);
        assert_eq!(message.saved_attachment_count(), 2);
        assert!(message.attachments[1].saved_path().is_none());
        assert_eq!(fs::read(&saved[0]).unwrap(), b"%PDF-1");
        assert_eq!(fs::read(&saved[1]).unwrap(), b"%PDF-3");

        let mut stats = ProcessingStats::default();
        stats.record_message(&message.from, message.attachments.len(), &saved);
        assert_eq!(stats.processed_messages, 1);
        assert_eq!(stats.total_attachments, 3);
        assert_eq!(stats.saved_attachments, 2);
        assert_eq!(stats.messages_with_attachments, 1);
        assert_eq!(stats.attachments_by_type.get(".pdf"), Some(&2));
    }

    #[test]
    fn test_reserved_bucket_is_not_promoted() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("attachments");
        let mut store = AttachmentStore::new(&root, true, false);
        let mut att = attachment_from("temp", "report.pdf", b"%PDF-1.4");
        let path = store.save(&mut att).unwrap();
        assert_eq!(path.parent().unwrap(), root.join("temp_"));

        assert!(store.promote_staged().is_empty());
        assert!(path.exists());
    }

    #[test]
    fn test_promotion_failure_keeps_other_results() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("attachments");
        let mut store = AttachmentStore::new(&root, true, false);

        let jane_staged = store.save(&mut attachment("attachment_1", &PNG_HEAD)).unwrap();
        let bob_staged = store
            .save(&mut attachment_from("bob@example.com", "attachment_1", &PNG_HEAD))
            .unwrap();
        // A regular file where bob's bucket directory would go.
        fs::write(root.join("bob_example_com"), b"not a directory").unwrap();

        let moved = store.promote_staged();
        assert_eq!(moved.len(), 1);
        assert!(moved[&jane_staged].exists());
        assert!(!moved.contains_key(&bob_staged));
        assert!(bob_staged.exists());
        assert!(!root.join("temp").join("jane_example_com").exists());
    }

    #[test]
    fn test_staged_name_has_no_suffix() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = AttachmentStore::new(dir.path(), true, false);
        let staged = store.save(&mut attachment("scan.final-v2", &PNG_HEAD)).unwrap();
        assert!(staged.starts_with(store.staging_dir()));
        assert!(staged.extension().is_none());

        let moved = store.promote_staged();
        assert_eq!(moved[&staged].extension().unwrap(), "png");
    }

    #[test]
    fn test_any_suffix_names_the_file_without_deferred_detection() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = AttachmentStore::new(dir.path(), false, false);
        let path = store.save(&mut attachment("report.final-v2", b"x")).unwrap();
        let name = path.file_name().unwrap().to_str().unwrap();
        assert!(name.ends_with(".final-v2"));
    }
}
