//! Shared protocol and data types for the siglog upload pipeline.
//!
//! Canonical definitions live here so the client, the test harness, and any
//! future server share one wire vocabulary.

pub mod messages;
pub mod models;

pub use messages::{
    CompletePayload, ErrorPayload, MetadataUploadPayload, ProgressPayload, UploadChunkPayload,
    UploadCompletePayload, UploadInitPayload, WsMessage, msg,
};
pub use models::{FileInfo, FileStatus};
