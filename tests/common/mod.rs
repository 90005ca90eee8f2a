#![allow(dead_code)]

use async_trait::async_trait;
use flate2::write::GzEncoder;
use flate2::Compression;
use futures::channel::mpsc::{unbounded, UnboundedReceiver, UnboundedSender};
use futures::{SinkExt, StreamExt};
use huobi_api::core::kernel::{FrameSink, FrameStream, WsConfig, WsTransport};
use huobi_api::ExchangeError;
use serde_json::Value;
use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_tungstenite::tungstenite::Message;

const STEP_TIMEOUT: Duration = Duration::from_secs(5);

/// Session settings for tests: no client heartbeat, fast redial
pub fn test_config() -> WsConfig {
    WsConfig::default()
        .with_heartbeat_interval(None)
        .with_reconnect_delay(Duration::from_millis(10))
        .with_request_timeout(Duration::from_secs(2))
}

pub fn gzip(data: &[u8]) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}

/// Exchange side of one dialed connection
pub struct Peer {
    outbound: UnboundedReceiver<Message>,
    inbound: UnboundedSender<Result<Message, ExchangeError>>,
    compressed: bool,
}

impl Peer {
    /// Next text frame the client sent, parsed
    pub async fn next_json(&mut self) -> Value {
        loop {
            let message = tokio::time::timeout(STEP_TIMEOUT, self.outbound.next())
                .await
                .expect("client sent nothing")
                .expect("client hung up");
            if let Message::Text(text) = message {
                return serde_json::from_str(&text).unwrap();
            }
        }
    }

    /// Assert the client sends nothing for `window`
    pub async fn assert_silent(&mut self, window: Duration) {
        if let Ok(Some(message)) = tokio::time::timeout(window, self.outbound.next()).await {
            panic!("unexpected frame {:?}", message);
        }
    }

    /// Deliver `value` to the client, gzip-compressed on compressed channels
    pub fn send(&self, value: Value) {
        let text = value.to_string();
        let message = if self.compressed {
            Message::Binary(gzip(text.as_bytes()))
        } else {
            Message::Text(text)
        };
        self.inbound.unbounded_send(Ok(message)).unwrap();
    }

    /// Deliver raw bytes as a binary frame
    pub fn send_raw(&self, data: Vec<u8>) {
        self.inbound
            .unbounded_send(Ok(Message::Binary(data)))
            .unwrap();
    }
}

pub struct MockTransport {
    peers: UnboundedSender<Peer>,
    dials: Arc<AtomicUsize>,
    compressed: bool,
}

#[async_trait]
impl WsTransport for MockTransport {
    async fn dial(&self, _url: &str) -> Result<(FrameSink, FrameStream), ExchangeError> {
        self.dials.fetch_add(1, Ordering::SeqCst);
        let (out_tx, out_rx) = unbounded();
        let (in_tx, in_rx) = unbounded();
        self.peers
            .unbounded_send(Peer {
                outbound: out_rx,
                inbound: in_tx,
                compressed: self.compressed,
            })
            .map_err(|_| ExchangeError::NetworkError("exchange is gone".to_string()))?;

        let sink = out_tx.sink_map_err(|e| ExchangeError::NetworkError(e.to_string()));
        Ok((Box::pin(sink), Box::pin(in_rx)))
    }
}

/// Accepts the connections the client dials
pub struct MockExchange {
    peers: UnboundedReceiver<Peer>,
    dials: Arc<AtomicUsize>,
}

impl MockExchange {
    pub async fn accept(&mut self) -> Peer {
        tokio::time::timeout(STEP_TIMEOUT, self.peers.next())
            .await
            .expect("client did not dial")
            .expect("transport dropped")
    }

    pub fn dials(&self) -> usize {
        self.dials.load(Ordering::SeqCst)
    }
}

pub fn mock_transport(compressed: bool) -> (Arc<dyn WsTransport>, MockExchange) {
    let (peers_tx, peers_rx) = unbounded();
    let dials = Arc::new(AtomicUsize::new(0));
    let transport = MockTransport {
        peers: peers_tx,
        dials: dials.clone(),
        compressed,
    };
    (
        Arc::new(transport),
        MockExchange {
            peers: peers_rx,
            dials,
        },
    )
}
