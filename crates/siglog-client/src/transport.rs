use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, trace, warn};

use siglog_types::{WsMessage, msg};

use crate::error::TransportError;

type WsConn = WebSocketStream<MaybeTlsStream<TcpStream>>;
type Handler = Arc<dyn Fn(&WsMessage) + Send + Sync>;

/// How long `connect()` waits for the channel to open.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Keepalive interval: a protocol-level `ping` message every 30 seconds
/// while connected, so idle-timeout proxies don't drop the channel in the
/// middle of a long chunked upload.
const PING_INTERVAL: Duration = Duration::from_secs(30);

/// Connection lifecycle. Close returns to `Disconnected` from any state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connecting,
    Connected,
}

/// Transport tuning knobs; defaults match the production constants.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    pub connect_timeout: Duration,
    pub ping_interval: Duration,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            connect_timeout: CONNECT_TIMEOUT,
            ping_interval: PING_INTERVAL,
        }
    }
}

/// One logical connection to the upload endpoint.
///
/// An explicit value owned by the caller — construct once, clone the handle
/// wherever it is needed (cheap `Arc` clone), and pass it into the upload
/// orchestrator. All sends serialize onto the single underlying channel.
#[derive(Clone)]
pub struct TransportSession {
    inner: Arc<Inner>,
}

struct Inner {
    url: String,
    config: TransportConfig,
    state: Mutex<SessionState>,
    handlers: Mutex<HashMap<String, Vec<(u64, Handler)>>>,
    next_handler_id: AtomicU64,
    /// Messages sent while disconnected, replayed FIFO once connected.
    pending: Mutex<VecDeque<WsMessage>>,
    /// Sender into the writer task; present only while connected.
    outbound: Mutex<Option<mpsc::UnboundedSender<WsMessage>>>,
    /// Serializes connection attempts so concurrent `connect()` callers
    /// coalesce onto one in-flight attempt.
    connect_gate: tokio::sync::Mutex<()>,
}

impl TransportSession {
    pub fn new(url: impl Into<String>) -> Self {
        Self::with_config(url, TransportConfig::default())
    }

    pub fn with_config(url: impl Into<String>, config: TransportConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                url: url.into(),
                config,
                state: Mutex::new(SessionState::Disconnected),
                handlers: Mutex::new(HashMap::new()),
                next_handler_id: AtomicU64::new(0),
                pending: Mutex::new(VecDeque::new()),
                outbound: Mutex::new(None),
                connect_gate: tokio::sync::Mutex::new(()),
            }),
        }
    }

    pub fn state(&self) -> SessionState {
        *self.inner.state.lock().expect("state lock poisoned")
    }

    /// Establish the connection. Idempotent: already-connected calls return
    /// immediately, and callers racing an in-flight attempt wait for it and
    /// observe its result instead of opening a second channel.
    pub async fn connect(&self) -> Result<(), TransportError> {
        let _gate = self.inner.connect_gate.lock().await;
        if self.state() == SessionState::Connected {
            return Ok(());
        }

        self.inner.set_state(SessionState::Connecting);
        debug!(url = %self.inner.url, "connecting");

        let attempt = connect_async(self.inner.url.as_str());
        let conn = match tokio::time::timeout(self.inner.config.connect_timeout, attempt).await {
            Ok(Ok((conn, _response))) => conn,
            Ok(Err(e)) => {
                self.inner.set_state(SessionState::Disconnected);
                return Err(TransportError::Connect(e));
            }
            Err(_) => {
                self.inner.set_state(SessionState::Disconnected);
                return Err(TransportError::ConnectTimeout);
            }
        };

        let (sink, stream) = conn.split();
        let (tx, rx) = mpsc::unbounded_channel();

        *self.inner.outbound.lock().expect("outbound lock poisoned") = Some(tx.clone());
        self.inner.set_state(SessionState::Connected);

        tokio::spawn(run_writer(sink, rx, self.inner.config.ping_interval));
        tokio::spawn(run_reader(self.inner.clone(), stream));

        // Replay messages queued while disconnected, in order.
        let queued: Vec<WsMessage> = {
            let mut pending = self.inner.pending.lock().expect("pending lock poisoned");
            pending.drain(..).collect()
        };
        for m in queued {
            let _ = tx.send(m);
        }

        debug!(url = %self.inner.url, "connected");
        Ok(())
    }

    /// Send a message. While connected it goes straight to the writer task;
    /// otherwise it is queued and replayed when a later `connect()`
    /// succeeds.
    pub fn send(&self, message: WsMessage) {
        let tx = self
            .inner
            .outbound
            .lock()
            .expect("outbound lock poisoned")
            .clone();
        match tx {
            Some(tx) => {
                if let Err(e) = tx.send(message) {
                    // Writer already gone; keep the message for the next
                    // connection.
                    self.inner
                        .pending
                        .lock()
                        .expect("pending lock poisoned")
                        .push_back(e.0);
                }
            }
            None => {
                self.inner
                    .pending
                    .lock()
                    .expect("pending lock poisoned")
                    .push_back(message);
            }
        }
    }

    /// Register a handler for every inbound message of `kind`. Multiple
    /// handlers per kind are allowed and all fire. The handler stays
    /// registered until the returned [`Subscription`] is dropped.
    pub fn on<F>(&self, kind: &str, handler: F) -> Subscription
    where
        F: Fn(&WsMessage) + Send + Sync + 'static,
    {
        let id = self.inner.next_handler_id.fetch_add(1, Ordering::Relaxed);
        self.inner
            .handlers
            .lock()
            .expect("handlers lock poisoned")
            .entry(kind.to_string())
            .or_default()
            .push((id, Arc::new(handler)));
        Subscription {
            inner: self.inner.clone(),
            kind: kind.to_string(),
            id,
        }
    }

    /// Resolve with the next inbound message of `kind`, or fail with
    /// `WaitTimeout` after `timeout`. Interleaved non-matching traffic is
    /// ignored. This is the primitive that turns the message stream into
    /// sequential request/response steps.
    pub async fn wait_for_message(
        &self,
        kind: &str,
        timeout: Duration,
    ) -> Result<WsMessage, TransportError> {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let _sub = self.on(kind, move |m| {
            let _ = tx.send(m.clone());
        });

        match tokio::time::timeout(timeout, rx.recv()).await {
            Ok(Some(message)) => Ok(message),
            Ok(None) => Err(TransportError::Closed),
            Err(_) => Err(TransportError::WaitTimeout {
                message_type: kind.to_string(),
            }),
        }
    }

    /// Drop the connection. Outstanding `wait_for_message` calls are not
    /// failed eagerly; they run into their own timeouts.
    pub fn close(&self) {
        *self.inner.outbound.lock().expect("outbound lock poisoned") = None;
        self.inner.set_state(SessionState::Disconnected);
    }
}

impl Inner {
    fn set_state(&self, state: SessionState) {
        *self.state.lock().expect("state lock poisoned") = state;
    }

    fn dispatch(&self, message: &WsMessage) {
        // Snapshot under the lock, invoke outside it so handlers can
        // register/unregister freely.
        let snapshot: Vec<Handler> = {
            let handlers = self.handlers.lock().expect("handlers lock poisoned");
            handlers
                .get(&message.kind)
                .map(|list| list.iter().map(|(_, h)| h.clone()).collect())
                .unwrap_or_default()
        };
        if snapshot.is_empty() {
            trace!(kind = %message.kind, "no handler for inbound message");
        }
        for handler in snapshot {
            handler(message);
        }
    }
}

/// Registered-handler handle; dropping it unregisters the handler.
pub struct Subscription {
    inner: Arc<Inner>,
    kind: String,
    id: u64,
}

impl Subscription {
    /// Explicitly unregister (same as dropping).
    pub fn cancel(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        let mut handlers = self.inner.handlers.lock().expect("handlers lock poisoned");
        let now_empty = match handlers.get_mut(&self.kind) {
            Some(list) => {
                list.retain(|(id, _)| *id != self.id);
                list.is_empty()
            }
            None => false,
        };
        if now_empty {
            handlers.remove(&self.kind);
        }
    }
}

/// Owns the sink: drains the outbound queue and emits the keepalive ping.
async fn run_writer(
    mut sink: SplitSink<WsConn, Message>,
    mut rx: mpsc::UnboundedReceiver<WsMessage>,
    ping_interval: Duration,
) {
    let mut keepalive = tokio::time::interval(ping_interval);
    keepalive.tick().await; // first tick fires immediately; skip it

    loop {
        tokio::select! {
            maybe = rx.recv() => {
                let Some(message) = maybe else { break };
                let text = match serde_json::to_string(&message) {
                    Ok(t) => t,
                    Err(e) => {
                        warn!("dropping unserializable message: {e}");
                        continue;
                    }
                };
                if sink.send(Message::Text(text.into())).await.is_err() {
                    break;
                }
            }
            _ = keepalive.tick() => {
                let ping = WsMessage::new(msg::PING);
                let text = serde_json::to_string(&ping).expect("ping serialization");
                trace!("keepalive ping");
                if sink.send(Message::Text(text.into())).await.is_err() {
                    break;
                }
            }
        }
    }
    let _ = sink.close().await;
}

/// Owns the stream: parses envelopes, absorbs keepalive traffic, and
/// dispatches everything else to registered handlers.
async fn run_reader(inner: Arc<Inner>, mut stream: SplitStream<WsConn>) {
    while let Some(item) = stream.next().await {
        let frame = match item {
            Ok(frame) => frame,
            Err(e) => {
                warn!("websocket read error: {e}");
                break;
            }
        };
        let text = match frame {
            Message::Text(text) => text,
            Message::Close(_) => break,
            // Binary/ping/pong frames are not part of the protocol.
            _ => continue,
        };
        let message: WsMessage = match serde_json::from_str(text.as_str()) {
            Ok(m) => m,
            Err(e) => {
                warn!("unparseable frame: {e}");
                continue;
            }
        };

        match message.kind.as_str() {
            // Keepalive is the transport's business; never surfaced.
            msg::PING => {
                let tx = inner.outbound.lock().expect("outbound lock poisoned").clone();
                if let Some(tx) = tx {
                    let _ = tx.send(WsMessage::new(msg::PONG));
                }
            }
            msg::PONG => trace!("pong absorbed"),
            _ => inner.dispatch(&message),
        }
    }

    debug!("connection closed");
    *inner.outbound.lock().expect("outbound lock poisoned") = None;
    inner.set_state(SessionState::Disconnected);
}
