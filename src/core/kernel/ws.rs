use crate::core::errors::ExchangeError;
use async_trait::async_trait;
use flate2::read::GzDecoder;
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use std::io::Read;
use std::pin::Pin;
use std::time::Duration;
use tokio_tungstenite::{connect_async, tungstenite::protocol::Message};
use tracing::{debug, instrument};

/// Write half of a dialed connection
pub type FrameSink = Pin<Box<dyn Sink<Message, Error = ExchangeError> + Send>>;

/// Read half of a dialed connection
pub type FrameStream = Pin<Box<dyn Stream<Item = Result<Message, ExchangeError>> + Send>>;

/// WebSocket session configuration
#[derive(Debug, Clone)]
pub struct WsConfig {
    /// Dial timeout
    pub connect_timeout: Duration,
    /// Client ping interval; `None` disables the heartbeat task
    pub heartbeat_interval: Option<Duration>,
    /// Fixed delay between reconnect attempts
    pub reconnect_delay: Duration,
    /// Upper bound on any pending waiter (subscribe ack, auth, request)
    pub request_timeout: Duration,
    /// Reconnect when the connection drops
    pub auto_reconnect: bool,
}

impl Default for WsConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            heartbeat_interval: Some(Duration::from_secs(5)),
            reconnect_delay: Duration::from_secs(1),
            request_timeout: Duration::from_secs(10),
            auto_reconnect: true,
        }
    }
}

impl WsConfig {
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_heartbeat_interval(mut self, interval: Option<Duration>) -> Self {
        self.heartbeat_interval = interval;
        self
    }

    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_auto_reconnect(mut self, auto_reconnect: bool) -> Self {
        self.auto_reconnect = auto_reconnect;
        self
    }
}

/// Transport seam: dials a URL and hands back the two halves of the socket
#[async_trait]
pub trait WsTransport: Send + Sync + 'static {
    async fn dial(&self, url: &str) -> Result<(FrameSink, FrameStream), ExchangeError>;
}

/// Tungstenite-based transport over TLS
#[derive(Debug, Clone)]
pub struct TungsteniteWs {
    connect_timeout: Duration,
}

impl Default for TungsteniteWs {
    fn default() -> Self {
        Self::new(WsConfig::default().connect_timeout)
    }
}

impl TungsteniteWs {
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }
}

#[async_trait]
impl WsTransport for TungsteniteWs {
    #[instrument(skip(self), fields(url = %url))]
    async fn dial(&self, url: &str) -> Result<(FrameSink, FrameStream), ExchangeError> {
        let (ws_stream, response) = tokio::time::timeout(self.connect_timeout, connect_async(url))
            .await
            .map_err(|_| {
                ExchangeError::ConnectionTimeout("WebSocket connection timeout".to_string())
            })?
            .map_err(|e| {
                ExchangeError::NetworkError(format!("WebSocket connection failed: {}", e))
            })?;

        if response.status().as_u16() >= 400 {
            return Err(ExchangeError::NetworkError(format!(
                "WebSocket handshake rejected with status {}",
                response.status()
            )));
        }
        debug!("WebSocket connected");

        let (write, read) = ws_stream.split();
        let sink = write.sink_map_err(|e| {
            ExchangeError::NetworkError(format!("Failed to send WebSocket message: {}", e))
        });
        let stream = read.map(|frame| {
            frame.map_err(|e| ExchangeError::NetworkError(format!("WebSocket error: {}", e)))
        });

        Ok((Box::pin(sink), Box::pin(stream)))
    }
}

/// Extract the JSON payload bytes of a frame
///
/// Returns `Ok(None)` for control frames. A close frame is reported as
/// `ConnectionClosed` so the receive loop stops.
pub fn frame_payload(message: Message, compressed: bool) -> Result<Option<Vec<u8>>, ExchangeError> {
    match message {
        Message::Text(text) => Ok(Some(text.into_bytes())),
        Message::Binary(data) if compressed => inflate(&data).map(Some),
        Message::Binary(data) => Ok(Some(data)),
        Message::Close(_) => Err(ExchangeError::ConnectionClosed),
        Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => Ok(None),
    }
}

/// Gunzip a compressed frame
pub fn inflate(data: &[u8]) -> Result<Vec<u8>, ExchangeError> {
    let mut decoder = GzDecoder::new(data);
    let mut out = Vec::new();
    decoder
        .read_to_end(&mut out)
        .map_err(|e| ExchangeError::DecodeError(format!("gzip: {}", e)))?;
    Ok(out)
}
