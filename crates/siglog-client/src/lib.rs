//! WebSocket upload client for large industrial signal logs.
//!
//! One [`TransportSession`] owns one persistent connection and turns the
//! asynchronous message stream into request/response steps via
//! `wait_for_message`. The [`Uploader`] drives a payload through
//! compress → chunk → init → chunks → complete on top of it.
//!
//! There is no retry logic anywhere in this crate: a failed upload surfaces
//! as one error and retrying is the caller's decision (a fresh
//! `upload_file` call).

pub mod error;
pub mod transport;
pub mod upload;

pub use error::{TransportError, UploadError};
pub use transport::{SessionState, Subscription, TransportConfig, TransportSession};
pub use upload::{MetadataKind, UploadConfig, Uploader};
