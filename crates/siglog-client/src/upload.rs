use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use flate2::Compression;
use flate2::write::GzEncoder;
use std::io::Write;
use tracing::{debug, info, trace};

use siglog_types::{
    CompletePayload, ErrorPayload, FileInfo, MetadataUploadPayload, UploadChunkPayload,
    UploadCompletePayload, UploadInitPayload, WsMessage, msg,
};

use crate::error::UploadError;
use crate::transport::TransportSession;

/// Chunk size for file payloads: 5 MiB per `upload:chunk` message.
pub const CHUNK_SIZE: usize = 5 * 1024 * 1024;

/// Upload tuning knobs; defaults match the production constants.
#[derive(Debug, Clone)]
pub struct UploadConfig {
    pub chunk_size: usize,
    /// Deadline for the server `ack` after `upload:init`.
    pub ack_timeout: Duration,
    /// Deadline for the `complete`/`error` race — generous because the
    /// server assembles, decompresses, and stores the file in this window.
    pub complete_timeout: Duration,
    /// Sleep `pacing_delay` after every `pacing_interval` chunks so a burst
    /// of large frames doesn't saturate the channel.
    pub pacing_interval: u32,
    pub pacing_delay: Duration,
    /// Compression is kept only if it saves at least this fraction of the
    /// original size.
    pub compression_min_gain: f64,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            chunk_size: CHUNK_SIZE,
            ack_timeout: Duration::from_secs(10),
            complete_timeout: Duration::from_secs(120),
            pacing_interval: 5,
            pacing_delay: Duration::from_millis(50),
            compression_min_gain: 0.05,
        }
    }
}

/// Small metadata files that ride the same connection as log uploads but
/// fit in a single message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetadataKind {
    Map,
    Rules,
    Carrier,
}

impl MetadataKind {
    fn message_type(self) -> &'static str {
        match self {
            Self::Map => msg::MAP_UPLOAD,
            Self::Rules => msg::RULES_UPLOAD,
            Self::Carrier => msg::CARRIER_UPLOAD,
        }
    }
}

/// Drives one payload through compress → chunk → init → chunks → complete
/// over a [`TransportSession`] owned by the caller.
///
/// Progress reporting is optimistic: chunk percentages are computed at
/// send time, not server acknowledgment, and mapped into 5–85% so the
/// remaining range is left for server-side processing. Treat it as UX, not
/// as a correctness signal. Server-side `progress`/`processing` stages can
/// be observed separately via `session.on(..)`.
///
/// Concurrent uploads on one session are not supported; run them
/// sequentially or use separate sessions.
pub struct Uploader {
    session: TransportSession,
    config: UploadConfig,
}

impl Uploader {
    pub fn new(session: TransportSession) -> Self {
        Self::with_config(session, UploadConfig::default())
    }

    pub fn with_config(session: TransportSession, config: UploadConfig) -> Self {
        Self { session, config }
    }

    /// Upload one file, reporting progress percentages to `on_progress`.
    /// Resolves with the server's stored-file record.
    pub async fn upload_file<F>(
        &self,
        file_name: &str,
        data: &[u8],
        on_progress: F,
    ) -> Result<FileInfo, UploadError>
    where
        F: Fn(f64),
    {
        self.session.connect().await?;

        let (payload, encoding) = self.maybe_compress(data);
        let total_chunks = chunk_count(payload.len(), self.config.chunk_size);

        info!(
            file_name,
            original_size = data.len(),
            payload_size = payload.len(),
            encoding,
            total_chunks,
            "starting upload"
        );

        let init = UploadInitPayload {
            file_name: file_name.to_string(),
            total_chunks,
            total_size: payload.len() as u64,
            encoding: Some(encoding.to_string()),
        };
        self.session
            .send(WsMessage::with_payload(msg::UPLOAD_INIT, &init));

        let ack = self
            .session
            .wait_for_message(msg::ACK, self.config.ack_timeout)
            .await?;
        let upload_id = ack
            .id
            .ok_or_else(|| UploadError::Protocol("ack without upload id".into()))?;
        debug!(%upload_id, "upload session acknowledged");
        on_progress(5.0);

        for index in 0..total_chunks {
            let start = index as usize * self.config.chunk_size;
            let end = (start + self.config.chunk_size).min(payload.len());
            let is_last = index + 1 == total_chunks;

            let chunk = UploadChunkPayload {
                upload_id: upload_id.clone(),
                chunk_index: index,
                data: BASE64.encode(&payload[start..end]),
                is_last,
            };
            self.session
                .send(WsMessage::with_payload(msg::UPLOAD_CHUNK, &chunk));
            trace!(%upload_id, index, is_last, "chunk sent");

            // Optimistic send-time progress.
            on_progress(chunk_progress(index + 1, total_chunks));

            if !is_last && (index + 1) % self.config.pacing_interval == 0 {
                tokio::time::sleep(self.config.pacing_delay).await;
            }
        }

        let complete = UploadCompletePayload {
            upload_id: upload_id.clone(),
            file_name: file_name.to_string(),
            total_chunks,
            original_size: data.len() as u64,
            compressed_size: (encoding == "gzip").then_some(payload.len() as u64),
            encoding: Some(encoding.to_string()),
        };
        self.session
            .send(WsMessage::with_payload(msg::UPLOAD_COMPLETE, &complete));

        let done = self.race_completion().await?;
        on_progress(100.0);

        let payload: CompletePayload = done.parse_payload()?;
        let file_info = payload
            .file_info
            .ok_or_else(|| UploadError::Protocol("complete without fileInfo".into()))?;
        info!(%upload_id, file_id = %file_info.id, "upload complete");
        Ok(file_info)
    }

    /// Upload a small metadata file (map layout, coloring rules, carrier
    /// log) as a single message. Same connect → send → race shape as file
    /// uploads, without chunking; resolves with the server's lightweight
    /// result payload.
    pub async fn upload_metadata<F>(
        &self,
        kind: MetadataKind,
        name: &str,
        data: &[u8],
        on_progress: F,
    ) -> Result<serde_json::Value, UploadError>
    where
        F: Fn(f64),
    {
        self.session.connect().await?;
        on_progress(5.0);

        let payload = MetadataUploadPayload {
            name: name.to_string(),
            data: BASE64.encode(data),
        };
        self.session
            .send(WsMessage::with_payload(kind.message_type(), &payload));
        debug!(name, size = data.len(), "metadata upload sent");

        let done = self.race_completion().await?;
        on_progress(100.0);

        let complete: CompletePayload = done.parse_payload()?;
        Ok(complete.result.unwrap_or(serde_json::Value::Null))
    }

    /// Race the terminal `complete` against an explicit server `error`;
    /// whichever arrives first decides the outcome.
    async fn race_completion(&self) -> Result<WsMessage, UploadError> {
        tokio::select! {
            done = self
                .session
                .wait_for_message(msg::COMPLETE, self.config.complete_timeout) =>
            {
                Ok(done?)
            }
            failed = self
                .session
                .wait_for_message(msg::ERROR, self.config.complete_timeout) =>
            {
                let message = failed?;
                let err: ErrorPayload = message.parse_payload()?;
                Err(UploadError::Server {
                    message: err.message,
                    code: err.code,
                })
            }
        }
    }

    /// Gzip the whole payload, keeping it only if the saving clears the
    /// configured margin; otherwise the original bytes go out unmodified
    /// with `encoding = "none"`. All-or-nothing, never per-chunk.
    fn maybe_compress(&self, data: &[u8]) -> (Vec<u8>, &'static str) {
        let mut encoder = GzEncoder::new(
            Vec::with_capacity(data.len() / 2 + 64),
            Compression::default(),
        );
        let compressed = if encoder.write_all(data).is_ok() {
            encoder.finish().unwrap_or_default()
        } else {
            Vec::new()
        };

        let limit = data.len() as f64 * (1.0 - self.config.compression_min_gain);
        if !compressed.is_empty() && compressed.len() as f64 <= limit {
            debug!(
                original = data.len(),
                compressed = compressed.len(),
                "compression accepted"
            );
            (compressed, "gzip")
        } else {
            (data.to_vec(), "none")
        }
    }
}

/// `ceil(payload / chunk_size)`; a zero-byte payload still sends one empty
/// chunk so the protocol has an `isLast` to hang completion on.
pub fn chunk_count(payload_len: usize, chunk_size: usize) -> u32 {
    payload_len.div_ceil(chunk_size).max(1) as u32
}

/// Map sent-chunk count into the 5–85% display range.
fn chunk_progress(sent: u32, total: u32) -> f64 {
    5.0 + (sent as f64 / total as f64) * 80.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_count_matches_ceil() {
        const MIB: usize = 1024 * 1024;
        // 12 MiB at 5 MiB chunks -> 3 chunks (5, 5, 2).
        assert_eq!(chunk_count(12 * MIB, 5 * MIB), 3);
        assert_eq!(chunk_count(10 * MIB, 5 * MIB), 2);
        assert_eq!(chunk_count(5 * MIB + 1, 5 * MIB), 2);
        assert_eq!(chunk_count(1, 5 * MIB), 1);
        assert_eq!(chunk_count(0, 5 * MIB), 1);
    }

    #[test]
    fn progress_maps_into_display_range() {
        assert_eq!(chunk_progress(3, 3), 85.0);
        let first = chunk_progress(1, 3);
        assert!(first > 5.0 && first < 85.0);
    }

    #[test]
    fn compression_gate_rejects_incompressible() {
        let uploader = Uploader::new(TransportSession::new("ws://127.0.0.1:0"));

        // Pseudo-random bytes gzip poorly; the gate must pass them through
        // untouched.
        let mut x: u64 = 0x9E37_79B9_7F4A_7C15;
        let noise: Vec<u8> = (0..64 * 1024)
            .map(|_| {
                x = x
                    .wrapping_mul(6364136223846793005)
                    .wrapping_add(1442695040888963407);
                (x >> 56) as u8
            })
            .collect();
        let (payload, encoding) = uploader.maybe_compress(&noise);
        assert_eq!(encoding, "none");
        assert_eq!(payload, noise);
    }

    #[test]
    fn compression_gate_accepts_repetitive_payload() {
        let uploader = Uploader::new(TransportSession::new("ws://127.0.0.1:0"));
        let text = b"conveyor02 motor_running true\n".repeat(4096);
        let (payload, encoding) = uploader.maybe_compress(&text);
        assert_eq!(encoding, "gzip");
        assert!(payload.len() as f64 <= text.len() as f64 * 0.95);
    }

    #[test]
    fn empty_payload_stays_uncompressed() {
        let uploader = Uploader::new(TransportSession::new("ws://127.0.0.1:0"));
        let (payload, encoding) = uploader.maybe_compress(&[]);
        assert_eq!(encoding, "none");
        assert!(payload.is_empty());
    }
}
