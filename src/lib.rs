//! `mboxextract`: pull every attachment out of an MBOX file.
//!
//! The library streams the mailbox one message at a time, walks each MIME
//! part tree, writes attachments into per-sender directories with
//! collision-free names and accumulates run statistics. Extension-less
//! attachments can be staged and renamed after content sniffing.

pub mod config;
pub mod error;
pub mod model;
pub mod parser;
pub mod pipeline;
pub mod store;
