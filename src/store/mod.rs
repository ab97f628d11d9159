//! Attachment persistence: naming, content sniffing and the on-disk tree.

pub mod naming;
pub mod sniff;
pub mod writer;

pub use writer::AttachmentStore;
