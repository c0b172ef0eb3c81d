use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle of an uploaded log file on the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileStatus {
    Uploaded,
    Parsing,
    Parsed,
    Error,
}

/// Server-side record of a stored log file, returned in the `complete`
/// message after a successful chunked upload.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileInfo {
    pub id: String,
    pub name: String,
    pub size: u64,
    pub uploaded_at: DateTime<Utc>,
    pub status: FileStatus,
}
