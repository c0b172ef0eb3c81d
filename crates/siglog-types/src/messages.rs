use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::models::FileInfo;

/// Message type strings used on the wire. One flat namespace for both
/// directions; the prefix (`upload:`, `map:`, ...) groups related flows.
pub mod msg {
    // Client -> server
    pub const UPLOAD_INIT: &str = "upload:init";
    pub const UPLOAD_CHUNK: &str = "upload:chunk";
    pub const UPLOAD_COMPLETE: &str = "upload:complete";
    pub const MAP_UPLOAD: &str = "map:upload";
    pub const RULES_UPLOAD: &str = "rules:upload";
    pub const CARRIER_UPLOAD: &str = "carrier:upload";

    // Server -> client
    pub const ACK: &str = "ack";
    pub const PROGRESS: &str = "progress";
    pub const PROCESSING: &str = "processing";
    pub const COMPLETE: &str = "complete";
    pub const ERROR: &str = "error";

    // Either direction
    pub const PING: &str = "ping";
    pub const PONG: &str = "pong";
}

/// The protocol envelope. Every logical message in either direction is one
/// JSON text frame shaped like this; `payload` is opaque to the transport and
/// interpreted per `kind` by the endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WsMessage {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
    pub timestamp: i64,
}

impl WsMessage {
    /// Build a message of `kind` with no payload, stamped with the current
    /// Unix-millisecond time.
    pub fn new(kind: &str) -> Self {
        Self {
            kind: kind.to_string(),
            id: None,
            payload: None,
            timestamp: Utc::now().timestamp_millis(),
        }
    }

    /// Build a message carrying a serializable payload.
    ///
    /// # Panics
    /// Panics if `payload` fails to serialize, which cannot happen for the
    /// payload structs in this module (plain data, no custom Serialize).
    pub fn with_payload<T: Serialize>(kind: &str, payload: &T) -> Self {
        Self {
            kind: kind.to_string(),
            id: None,
            payload: Some(serde_json::to_value(payload).expect("payload serialization")),
            timestamp: Utc::now().timestamp_millis(),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Deserialize the payload into a concrete type.
    pub fn parse_payload<T: for<'de> Deserialize<'de>>(&self) -> Result<T, serde_json::Error> {
        let value = self.payload.clone().unwrap_or(serde_json::Value::Null);
        serde_json::from_value(value)
    }
}

/// `upload:init` — opens a chunked upload session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadInitPayload {
    pub file_name: String,
    pub total_chunks: u32,
    pub total_size: u64,
    /// "gzip" if the payload was compressed client-side, "none" otherwise.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encoding: Option<String>,
}

/// `upload:chunk` — one base64-encoded byte range of the payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadChunkPayload {
    pub upload_id: String,
    pub chunk_index: u32,
    /// Base64 (standard alphabet, padded) chunk bytes.
    pub data: String,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_last: bool,
}

/// `upload:complete` — all chunks sent; asks the server to assemble.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadCompletePayload {
    pub upload_id: String,
    pub file_name: String,
    pub total_chunks: u32,
    pub original_size: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compressed_size: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encoding: Option<String>,
}

/// `map:upload` / `rules:upload` / `carrier:upload` — small metadata files
/// sent whole in a single message instead of being chunked.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetadataUploadPayload {
    pub name: String,
    /// Base64-encoded file contents.
    pub data: String,
}

/// `progress` / `processing` — server-side progress for one upload.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upload_id: Option<String>,
    /// Percentage in 0..=100.
    pub progress: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stage: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// `complete` — terminal success. File uploads carry `file_info`; metadata
/// uploads carry a free-form `result` instead.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletePayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upload_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_info: Option<FileInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
}

/// `error` — terminal failure, message passed through to the caller verbatim.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_roundtrip_with_payload() {
        let init = UploadInitPayload {
            file_name: "plant7.log".into(),
            total_chunks: 3,
            total_size: 12 * 1024 * 1024,
            encoding: Some("gzip".into()),
        };
        let msg = WsMessage::with_payload(msg::UPLOAD_INIT, &init);

        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"type\":\"upload:init\""));
        assert!(json.contains("\"fileName\":\"plant7.log\""));
        // Absent id must not appear on the wire.
        assert!(!json.contains("\"id\""));

        let back: WsMessage = serde_json::from_str(&json).unwrap();
        let payload: UploadInitPayload = back.parse_payload().unwrap();
        assert_eq!(payload.total_chunks, 3);
        assert_eq!(payload.encoding.as_deref(), Some("gzip"));
    }

    #[test]
    fn chunk_is_last_omitted_when_false() {
        let chunk = UploadChunkPayload {
            upload_id: "u1".into(),
            chunk_index: 0,
            data: "AAAA".into(),
            is_last: false,
        };
        let json = serde_json::to_string(&chunk).unwrap();
        assert!(!json.contains("isLast"));

        let back: UploadChunkPayload = serde_json::from_str(&json).unwrap();
        assert!(!back.is_last);
    }

    #[test]
    fn error_payload_code_optional() {
        let err: ErrorPayload = serde_json::from_str(r#"{"message":"boom"}"#).unwrap();
        assert_eq!(err.message, "boom");
        assert!(err.code.is_none());
    }
}
