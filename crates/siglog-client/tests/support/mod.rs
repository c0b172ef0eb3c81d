//! In-process WebSocket server implementing just enough of the upload
//! protocol to exercise the client: init/ack, chunk assembly, gzip
//! decompression, complete/error, metadata uploads, and keepalive.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::Utc;
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{WebSocketStream, accept_async};
use uuid::Uuid;

use siglog_types::{
    CompletePayload, ErrorPayload, FileInfo, FileStatus, MetadataUploadPayload, ProgressPayload,
    UploadChunkPayload, UploadCompletePayload, UploadInitPayload, WsMessage, msg,
};

type WsTx = SplitSink<WebSocketStream<TcpStream>, Message>;

#[derive(Clone, Default)]
pub struct ServerOptions {
    /// Never answer `upload:init`, forcing the client's ack timeout.
    pub drop_init: bool,
    /// Answer `upload:complete` with an `error` message instead.
    pub fail_complete: Option<(String, Option<String>)>,
    /// Emit unrelated `processing` messages before the `ack`.
    pub noise_before_ack: bool,
    /// Send a protocol-level ping right after accepting.
    pub ping_on_connect: bool,
}

#[derive(Default)]
pub struct ServerState {
    /// Assembled (and decompressed, if applicable) payload of the last
    /// finished upload.
    pub assembled: Mutex<Option<Vec<u8>>>,
    /// Encoding the client declared for the last finished upload.
    pub encoding: Mutex<Option<String>>,
    pub chunks_received: AtomicU32,
    pub saw_pong: AtomicBool,
}

pub struct TestServer {
    pub addr: SocketAddr,
    pub state: Arc<ServerState>,
}

static TRACING: std::sync::Once = std::sync::Once::new();

/// Route client/server logs through tracing; `RUST_LOG` overrides.
fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| "siglog=debug".into()),
            )
            .with_test_writer()
            .try_init();
    });
}

impl TestServer {
    pub async fn start(options: ServerOptions) -> Self {
        init_tracing();
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let state = Arc::new(ServerState::default());

        let accept_state = state.clone();
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                tokio::spawn(handle_connection(
                    stream,
                    options.clone(),
                    accept_state.clone(),
                ));
            }
        });

        Self { addr, state }
    }

    pub fn url(&self) -> String {
        format!("ws://{}", self.addr)
    }
}

struct UploadSession {
    file_name: String,
    total_chunks: u32,
    encoding: Option<String>,
    chunks: BTreeMap<u32, Vec<u8>>,
}

async fn handle_connection(stream: TcpStream, options: ServerOptions, state: Arc<ServerState>) {
    let ws = match accept_async(stream).await {
        Ok(ws) => ws,
        Err(_) => return,
    };
    let (mut tx, mut rx) = ws.split();

    if options.ping_on_connect {
        send(&mut tx, WsMessage::new(msg::PING)).await;
    }

    let mut session: Option<(String, UploadSession)> = None;

    while let Some(Ok(frame)) = rx.next().await {
        let Message::Text(text) = frame else { continue };
        let Ok(message) = serde_json::from_str::<WsMessage>(text.as_str()) else {
            continue;
        };

        match message.kind.as_str() {
            msg::PING => send(&mut tx, WsMessage::new(msg::PONG)).await,
            msg::PONG => state.saw_pong.store(true, Ordering::Relaxed),
            msg::UPLOAD_INIT => {
                if options.drop_init {
                    continue;
                }
                let init: UploadInitPayload = message.parse_payload().unwrap();

                if options.noise_before_ack {
                    for i in 0..3 {
                        let noise = ProgressPayload {
                            upload_id: None,
                            progress: i as f64,
                            stage: Some("warmup".into()),
                            message: None,
                        };
                        send(&mut tx, WsMessage::with_payload(msg::PROCESSING, &noise)).await;
                    }
                }

                let id = Uuid::new_v4().to_string();
                session = Some((
                    id.clone(),
                    UploadSession {
                        file_name: init.file_name,
                        total_chunks: init.total_chunks,
                        encoding: init.encoding,
                        chunks: BTreeMap::new(),
                    },
                ));
                send(&mut tx, WsMessage::new(msg::ACK).with_id(id)).await;
            }
            msg::UPLOAD_CHUNK => {
                let chunk: UploadChunkPayload = message.parse_payload().unwrap();
                let Some((id, sess)) = session.as_mut() else {
                    continue;
                };
                if *id != chunk.upload_id {
                    continue;
                }
                let bytes = BASE64.decode(chunk.data.as_bytes()).unwrap();
                sess.chunks.insert(chunk.chunk_index, bytes);
                state.chunks_received.fetch_add(1, Ordering::Relaxed);

                let progress = ProgressPayload {
                    upload_id: Some(id.clone()),
                    progress: sess.chunks.len() as f64 / sess.total_chunks as f64 * 100.0,
                    stage: Some("uploading".into()),
                    message: None,
                };
                send(
                    &mut tx,
                    WsMessage::with_payload(msg::PROGRESS, &progress).with_id(id.clone()),
                )
                .await;
            }
            msg::UPLOAD_COMPLETE => {
                let done: UploadCompletePayload = message.parse_payload().unwrap();
                let Some((id, sess)) = session.take() else {
                    continue;
                };
                if id != done.upload_id {
                    continue;
                }

                // Concatenate in index order, then undo client compression.
                let mut payload = Vec::new();
                for chunk in sess.chunks.values() {
                    payload.extend_from_slice(chunk);
                }
                let encoding = done.encoding.clone().or(sess.encoding.clone());
                let final_bytes = if encoding.as_deref() == Some("gzip") {
                    use std::io::Read;
                    let mut out = Vec::new();
                    flate2::read::GzDecoder::new(payload.as_slice())
                        .read_to_end(&mut out)
                        .unwrap();
                    out
                } else {
                    payload
                };
                *state.encoding.lock().unwrap() = encoding;
                *state.assembled.lock().unwrap() = Some(final_bytes.clone());

                if let Some((err_message, code)) = options.fail_complete.clone() {
                    let err = ErrorPayload {
                        message: err_message,
                        code,
                    };
                    send(&mut tx, WsMessage::with_payload(msg::ERROR, &err)).await;
                    continue;
                }

                let info = FileInfo {
                    id: Uuid::new_v4().to_string(),
                    name: sess.file_name,
                    size: final_bytes.len() as u64,
                    uploaded_at: Utc::now(),
                    status: FileStatus::Uploaded,
                };
                let complete = CompletePayload {
                    upload_id: Some(id.clone()),
                    file_info: Some(info),
                    result: None,
                };
                send(
                    &mut tx,
                    WsMessage::with_payload(msg::COMPLETE, &complete).with_id(id),
                )
                .await;
            }
            msg::MAP_UPLOAD | msg::RULES_UPLOAD | msg::CARRIER_UPLOAD => {
                let meta: MetadataUploadPayload = message.parse_payload().unwrap();
                let bytes = BASE64.decode(meta.data.as_bytes()).unwrap();
                *state.assembled.lock().unwrap() = Some(bytes);

                let complete = CompletePayload {
                    upload_id: None,
                    file_info: None,
                    result: Some(serde_json::json!({ "name": meta.name, "accepted": true })),
                };
                send(&mut tx, WsMessage::with_payload(msg::COMPLETE, &complete)).await;
            }
            _ => {}
        }
    }
}

async fn send(tx: &mut WsTx, message: WsMessage) {
    let text = serde_json::to_string(&message).unwrap();
    let _ = tx.send(Message::Text(text.into())).await;
}

/// Deterministic pseudo-random bytes that gzip cannot usefully compress.
pub fn noise_bytes(len: usize) -> Vec<u8> {
    let mut x: u64 = 0x9E37_79B9_7F4A_7C15;
    (0..len)
        .map(|_| {
            x = x
                .wrapping_mul(6364136223846793005)
                .wrapping_add(1442695040888963407);
            (x >> 56) as u8
        })
        .collect()
}
