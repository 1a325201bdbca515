use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use parking_lot::RwLock;
use tokio::net::TcpStream;
use tokio::sync::Mutex as AsyncMutex;
use tokio::time::interval;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{HeaderName, HeaderValue};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, warn};
use url::Url;

use crate::error::WsChannelError;

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;
type Writer = SplitSink<Socket, Message>;
type Reader = SplitStream<Socket>;

/// How the upgrade request authenticates itself. Header values are computed
/// by the caller (the control channel owns the credentials); the channel
/// itself only knows how to attach them to the handshake request (§4.2).
pub enum AuthStrategy {
    None,
    Headers(Vec<(String, String)>),
}

/// Frame kind for an outbound `SendMessage` — the wire codec always produces
/// binary frames, but the channel is kept frame-kind-agnostic so it can also
/// carry text control frames if ever needed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    Text,
    Binary,
}

#[derive(Debug, Clone)]
pub struct WebSocketChannelConfig {
    pub ping_interval: Duration,
    pub read_retry_limit: u32,
}

impl Default for WebSocketChannelConfig {
    fn default() -> Self {
        Self {
            ping_interval: Duration::from_secs(30),
            read_retry_limit: 3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChannelState {
    Closed,
    Open,
}

/// One full-duplex socket (§4.2). `Open` starts the read loop and pinger as
/// tracked tasks; `Close` cancels them and waits for teardown before
/// returning, so callers never observe a half-torn-down channel.
pub struct WebSocketChannel {
    state: Arc<RwLock<ChannelState>>,
    writer: Arc<AsyncMutex<Option<Writer>>>,
    shutdown: CancellationToken,
    tasks: TaskTracker,
}

impl Default for WebSocketChannel {
    fn default() -> Self {
        Self::new()
    }
}

impl WebSocketChannel {
    pub fn new() -> Self {
        Self {
            state: Arc::new(RwLock::new(ChannelState::Closed)),
            writer: Arc::new(AsyncMutex::new(None)),
            shutdown: CancellationToken::new(),
            tasks: TaskTracker::new(),
        }
    }

    pub fn is_open(&self) -> bool {
        *self.state.read() == ChannelState::Open
    }

    /// Performs the signed upgrade handshake and starts the read loop and
    /// keep-alive pinger. `on_message` receives the payload of each inbound
    /// text/binary frame; `on_error` fires at most once, when the read loop
    /// exhausts its retry budget on transient errors.
    pub async fn open<H, E>(&self, url: Url, auth: AuthStrategy, config: WebSocketChannelConfig, on_message: H, on_error: E) -> Result<(), WsChannelError>
    where
        H: Fn(Bytes) + Send + Sync + 'static,
        E: Fn(WsChannelError) + Send + Sync + 'static,
    {
        let mut request = url.as_str().into_client_request().map_err(|e| WsChannelError::ConnectFailed(e.to_string()))?;

        if let AuthStrategy::Headers(headers) = &auth {
            for (name, value) in headers {
                let header_name = HeaderName::from_bytes(name.as_bytes()).map_err(|e| WsChannelError::InvalidHeader(e.to_string()))?;
                let header_value = HeaderValue::from_str(value).map_err(|e| WsChannelError::InvalidHeader(e.to_string()))?;
                request.headers_mut().insert(header_name, header_value);
            }
        }

        let (stream, _response) = connect_async(request).await.map_err(|e| WsChannelError::ConnectFailed(e.to_string()))?;
        let (writer, reader) = stream.split();

        *self.writer.lock().await = Some(writer);
        *self.state.write() = ChannelState::Open;

        let read_state = self.state.clone();
        let read_shutdown = self.shutdown.clone();
        let read_writer = self.writer.clone();
        self.tasks.spawn(read_loop(reader, read_writer, read_state, read_shutdown, config.read_retry_limit, on_message, on_error));

        let ping_writer = self.writer.clone();
        let ping_shutdown = self.shutdown.clone();
        self.tasks.spawn(pinger_loop(ping_writer, ping_shutdown, config.ping_interval));

        Ok(())
    }

    /// Sends one frame. Serialized against concurrent callers by the writer
    /// lock (§4.8): two `SendMessage` calls never interleave bytes.
    pub async fn send_message(&self, bytes: Bytes, kind: FrameKind) -> Result<(), WsChannelError> {
        if !self.is_open() {
            return Err(WsChannelError::ChannelClosed);
        }
        if bytes.is_empty() {
            return Err(WsChannelError::EmptyPayload);
        }

        let message = match kind {
            FrameKind::Binary => Message::Binary(bytes.to_vec().into()),
            FrameKind::Text => Message::Text(String::from_utf8_lossy(&bytes).into_owned().into()),
        };

        let mut guard = self.writer.lock().await;
        match guard.as_mut() {
            Some(writer) => writer.send(message).await.map_err(|e| WsChannelError::WriteError(e.to_string())),
            None => Err(WsChannelError::ChannelClosed),
        }
    }

    /// Stops the read loop and pinger, sends a close frame, and releases the
    /// socket. Returns only once teardown is complete.
    pub async fn close(&self) {
        *self.state.write() = ChannelState::Closed;
        self.shutdown.cancel();
        self.tasks.close();
        self.tasks.wait().await;

        if let Some(mut writer) = self.writer.lock().await.take() {
            let _ = writer.send(Message::Close(None)).await;
            let _ = writer.close().await;
        }
    }
}

async fn read_loop<H, E>(mut reader: Reader, writer: Arc<AsyncMutex<Option<Writer>>>, state: Arc<RwLock<ChannelState>>, shutdown: CancellationToken, retry_limit: u32, on_message: H, on_error: E)
where
    H: Fn(Bytes) + Send + Sync + 'static,
    E: Fn(WsChannelError) + Send + Sync + 'static,
{
    let mut consecutive_errors = 0u32;
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => return,
            next = reader.next() => {
                match next {
                    None => {
                        *state.write() = ChannelState::Closed;
                        on_error(WsChannelError::ReadError("stream ended".to_string()));
                        return;
                    }
                    Some(Ok(Message::Binary(data))) => {
                        consecutive_errors = 0;
                        on_message(Bytes::from(data.to_vec()));
                    }
                    Some(Ok(Message::Text(data))) => {
                        consecutive_errors = 0;
                        on_message(Bytes::from(data.into_bytes()));
                    }
                    Some(Ok(Message::Ping(payload))) => {
                        consecutive_errors = 0;
                        let mut guard = writer.lock().await;
                        if let Some(w) = guard.as_mut() {
                            let _ = w.send(Message::Pong(payload)).await;
                        }
                    }
                    Some(Ok(Message::Close(_))) => {
                        *state.write() = ChannelState::Closed;
                        on_error(WsChannelError::ReadError("closed by peer".to_string()));
                        return;
                    }
                    Some(Ok(other)) => {
                        warn!(target: "ws", "discarding unsupported frame kind: {other:?}");
                    }
                    Some(Err(err)) => {
                        consecutive_errors += 1;
                        debug!(target: "ws", "transient read error ({consecutive_errors}/{retry_limit}): {err}");
                        if consecutive_errors >= retry_limit {
                            *state.write() = ChannelState::Closed;
                            on_error(WsChannelError::ReadError(err.to_string()));
                            return;
                        }
                    }
                }
            }
        }
    }
}

async fn pinger_loop(writer: Arc<AsyncMutex<Option<Writer>>>, shutdown: CancellationToken, ping_interval: Duration) {
    let mut ticker = interval(ping_interval);
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => return,
            _ = ticker.tick() => {
                let mut guard = writer.lock().await;
                let Some(w) = guard.as_mut() else { return };
                if w.send(Message::Ping(Vec::new().into())).await.is_err() {
                    return;
                }
            }
        }
    }
}
