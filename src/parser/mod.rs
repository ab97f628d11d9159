//! Email parsing: MBOX streaming splitter, header decoding and MIME walk.

pub mod header;
pub mod mbox;
pub mod mime;
