use crate::core::errors::ExchangeError;
use crate::core::kernel::codec::{Inbound, WsCodec};
use crate::core::kernel::query::Params;
use crate::core::kernel::registry::{
    CorrelationTable, KeyedLocks, Listener, SubscriptionRegistry, WaiterResult,
};
use crate::core::kernel::signer::Signer;
use crate::core::kernel::ws::{frame_payload, FrameSink, FrameStream, WsConfig, WsTransport};
use futures_util::future::BoxFuture;
use futures_util::{FutureExt, SinkExt, StreamExt};
use serde_json::Value;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::{mpsc, watch, Mutex};
use tokio_retry::strategy::FixedInterval;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, instrument, warn};

/// Waiter key of the auth handshake
pub const AUTH_KEY: &str = "auth";

/// Lifecycle of a session's connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
    Closed,
}

/// A push waiting to be handed to its listener
struct Delivery {
    listener: Listener,
    topic: String,
    document: Value,
}

struct SessionInner<C: WsCodec> {
    url: String,
    host: String,
    path: String,
    codec: C,
    transport: Arc<dyn WsTransport>,
    signer: Option<Arc<dyn Signer>>,
    config: WsConfig,
    /// Write half of the live connection; every write goes through this lock
    sink: Mutex<Option<FrameSink>>,
    generation: AtomicU64,
    alive: AtomicBool,
    auto_reconnect: AtomicBool,
    reconnecting: AtomicBool,
    closed: AtomicBool,
    state: watch::Sender<ConnectionState>,
    subscriptions: SubscriptionRegistry,
    acks: CorrelationTable,
    responses: CorrelationTable,
    issue_locks: KeyedLocks,
    deliveries: mpsc::UnboundedSender<Delivery>,
}

/// Long-lived WebSocket session over one protocol codec
///
/// Owns a single connection at a time. Keeps subscriptions across
/// reconnects, correlates acknowledgements and responses with the calls
/// waiting for them, and hands pushes to listeners off the receive loop.
/// Cloning yields another handle to the same session.
pub struct WsSession<C: WsCodec> {
    inner: Arc<SessionInner<C>>,
}

impl<C: WsCodec> Clone for WsSession<C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<C: WsCodec> std::fmt::Debug for WsSession<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WsSession")
            .field("protocol", &self.inner.codec.name())
            .field("url", &self.inner.url)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl<C: WsCodec> WsSession<C> {
    /// Dial `url`, authenticate when the codec requires it and start the
    /// receive loop (plus the heartbeat task when configured).
    ///
    /// Must be called from within a tokio runtime.
    #[instrument(skip(codec, transport, signer, config), fields(exchange = codec.name()))]
    pub async fn connect(
        url: String,
        codec: C,
        transport: Arc<dyn WsTransport>,
        signer: Option<Arc<dyn Signer>>,
        config: WsConfig,
    ) -> Result<Self, ExchangeError> {
        let parsed = reqwest::Url::parse(&url)
            .map_err(|e| ExchangeError::ConfigurationError(format!("Invalid URL {}: {}", url, e)))?;
        let host = match (parsed.host_str(), parsed.port()) {
            (Some(host), Some(port)) => format!("{}:{}", host, port),
            (Some(host), None) => host.to_string(),
            (None, _) => {
                return Err(ExchangeError::ConfigurationError(format!(
                    "URL has no host: {}",
                    url
                )))
            }
        };
        let path = parsed.path().to_string();

        let (deliveries, delivery_rx) = mpsc::unbounded_channel();
        tokio::spawn(deliver(delivery_rx));

        let (state, _) = watch::channel(ConnectionState::Disconnected);
        let inner = Arc::new(SessionInner {
            url,
            host,
            path,
            codec,
            transport,
            signer,
            auto_reconnect: AtomicBool::new(config.auto_reconnect),
            config,
            sink: Mutex::new(None),
            generation: AtomicU64::new(0),
            alive: AtomicBool::new(false),
            reconnecting: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            state,
            subscriptions: SubscriptionRegistry::new(),
            acks: CorrelationTable::new(),
            responses: CorrelationTable::new(),
            issue_locks: KeyedLocks::new(),
            deliveries,
        });

        inner.connect().await?;
        Ok(Self { inner })
    }

    /// Subscribe `listener` to `topic`
    ///
    /// Blocks until the exchange acknowledges the subscription. Subscribing
    /// an already-subscribed topic only rebinds the listener.
    pub async fn subscribe<F>(&self, topic: &str, listener: F) -> Result<(), ExchangeError>
    where
        F: Fn(&str, &Value) + Send + Sync + 'static,
    {
        self.subscribe_listener(topic, Arc::new(listener)).await
    }

    #[instrument(skip(self, listener), fields(exchange = self.inner.codec.name(), topic = %topic))]
    pub async fn subscribe_listener(
        &self,
        topic: &str,
        listener: Listener,
    ) -> Result<(), ExchangeError> {
        let inner = &self.inner;
        inner.wait_ready().await?;
        let _guard = inner.issue_locks.lock(&subscription_key(topic)).await;

        if inner.subscriptions.contains(topic).await {
            inner.subscriptions.insert(topic, listener).await;
            debug!("Listener rebound without resubscribing");
            return Ok(());
        }

        inner.subscribe_on_wire(topic).await?;
        inner.subscriptions.insert(topic, listener).await;
        Ok(())
    }

    /// Remove the subscription for `topic`
    ///
    /// The registry entry is dropped immediately; the unsubscribe frame, if
    /// the protocol has one, is sent without waiting for an answer.
    #[instrument(skip(self), fields(exchange = self.inner.codec.name(), topic = %topic))]
    pub async fn unsubscribe(&self, topic: &str) -> Result<(), ExchangeError> {
        let inner = &self.inner;
        let _guard = inner.issue_locks.lock(&subscription_key(topic)).await;
        if !inner.subscriptions.remove(topic).await {
            return Ok(());
        }

        match inner.codec.encode_unsubscription(topic) {
            Some(frame) => inner.send_value(&frame).await,
            None => {
                debug!("Protocol has no unsubscribe operation, removed locally");
                Ok(())
            }
        }
    }

    /// One-shot request answered by a single response frame
    #[instrument(skip(self, params), fields(exchange = self.inner.codec.name(), topic = %topic))]
    pub async fn request(&self, topic: &str, params: Option<Params>) -> Result<Value, ExchangeError> {
        let inner = &self.inner;
        let frame = inner
            .codec
            .encode_request(topic, params.unwrap_or_default())
            .ok_or_else(|| {
                ExchangeError::InvalidParameters(format!(
                    "{} channel has no request operation",
                    inner.codec.name()
                ))
            })?;

        inner.wait_ready().await?;
        let _guard = inner.issue_locks.lock(&request_key(topic)).await;
        inner.round_trip(&inner.responses, topic, &frame).await
    }

    /// Toggle whether a dropped connection is redialed
    pub fn set_auto_reconnect(&self, auto_reconnect: bool) {
        self.inner
            .auto_reconnect
            .store(auto_reconnect, Ordering::SeqCst);
    }

    /// Close the current connection, dial a new one, re-authenticate and
    /// replay every subscription. Retries until it succeeds or the session
    /// is closed.
    pub async fn reconnect(&self) {
        SessionInner::reconnect_loop(Arc::downgrade(&self.inner)).await;
        let mut state = self.inner.state.subscribe();
        let _ = state
            .wait_for(|s| matches!(s, ConnectionState::Connected | ConnectionState::Closed))
            .await;
    }

    /// Shut the session down and fail every pending call
    #[instrument(skip(self), fields(exchange = self.inner.codec.name()))]
    pub async fn close(&self) {
        let inner = &self.inner;
        inner.closed.store(true, Ordering::SeqCst);
        inner.auto_reconnect.store(false, Ordering::SeqCst);
        inner.teardown().await;
        inner.set_state(ConnectionState::Closed);
        inner.fail_pending().await;
        info!("WebSocket session closed");
    }

    pub fn state(&self) -> ConnectionState {
        *self.inner.state.borrow()
    }

    pub fn is_connected(&self) -> bool {
        self.inner.alive.load(Ordering::SeqCst)
    }

    pub fn auto_reconnect(&self) -> bool {
        self.inner.auto_reconnect.load(Ordering::SeqCst)
    }

    pub fn url(&self) -> &str {
        &self.inner.url
    }

    /// Topics currently registered, sorted
    pub async fn topics(&self) -> Vec<String> {
        self.inner.subscriptions.topics().await
    }
}

fn subscription_key(topic: &str) -> String {
    format!("sub:{}", topic)
}

fn request_key(topic: &str) -> String {
    format!("req:{}", topic)
}

impl<C: WsCodec> SessionInner<C> {
    fn set_state(&self, state: ConnectionState) {
        self.state.send_replace(state);
    }

    fn should_reconnect(&self) -> bool {
        self.auto_reconnect.load(Ordering::SeqCst) && !self.closed.load(Ordering::SeqCst)
    }

    fn is_current(&self, generation: u64) -> bool {
        self.generation.load(Ordering::SeqCst) == generation
    }

    async fn connect(self: &Arc<Self>) -> Result<(), ExchangeError> {
        self.set_state(ConnectionState::Connecting);

        let generation = {
            let mut sink = self.sink.lock().await;
            let (new_sink, stream) = self.transport.dial(&self.url).await?;
            *sink = Some(new_sink);
            let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
            self.alive.store(true, Ordering::SeqCst);
            tokio::spawn(receive_loop(Arc::downgrade(self), generation, stream));
            generation
        };
        info!(exchange = self.codec.name(), url = %self.url, "WebSocket connected");

        if let Err(e) = self.authenticate().await {
            warn!(exchange = self.codec.name(), "Auth failed: {}", e);
            self.teardown().await;
            self.set_state(ConnectionState::Disconnected);
            return Err(e);
        }

        if let (Some(interval), Some(_)) = (self.config.heartbeat_interval, self.codec.heartbeat())
        {
            tokio::spawn(heartbeat_loop(Arc::downgrade(self), generation, interval));
        }

        self.set_state(ConnectionState::Connected);
        Ok(())
    }

    async fn authenticate(&self) -> Result<(), ExchangeError> {
        let Some(signer) = &self.signer else {
            return Ok(());
        };
        let Some(frame) = self
            .codec
            .encode_auth(signer.as_ref(), &self.host, &self.path)?
        else {
            return Ok(());
        };

        self.round_trip(&self.acks, AUTH_KEY, &frame).await?;
        info!(exchange = self.codec.name(), "WebSocket auth successful");
        Ok(())
    }

    /// Close the live transport; loops bound to it stop at their next check
    async fn teardown(&self) {
        let mut sink = self.sink.lock().await;
        self.alive.store(false, Ordering::SeqCst);
        self.generation.fetch_add(1, Ordering::SeqCst);
        if let Some(mut old) = sink.take() {
            if let Err(e) = old.close().await {
                debug!("Closing old transport: {}", e);
            }
        }
    }

    async fn fail_pending(&self) {
        self.acks.fail_all(|| ExchangeError::ConnectionClosed).await;
        self.responses
            .fail_all(|| ExchangeError::ConnectionClosed)
            .await;
    }

    /// Wait until operations may be issued (connected and authenticated)
    async fn wait_ready(&self) -> Result<(), ExchangeError> {
        let mut state = self.state.subscribe();
        let ready = tokio::time::timeout(
            self.config.request_timeout,
            state.wait_for(|s| {
                matches!(
                    s,
                    ConnectionState::Connected
                        | ConnectionState::Disconnected
                        | ConnectionState::Closed
                )
            }),
        )
        .await;

        match ready {
            Ok(Ok(s)) if *s == ConnectionState::Connected => Ok(()),
            Ok(Ok(s)) if *s == ConnectionState::Disconnected => Err(
                ExchangeError::NetworkError("WebSocket not connected".to_string()),
            ),
            Ok(_) => Err(ExchangeError::ConnectionClosed),
            Err(_) => Err(ExchangeError::RequestTimeout(
                "connection did not become ready".to_string(),
            )),
        }
    }

    /// Serialize and write one text frame under the connection lock
    async fn send_value(&self, value: &Value) -> Result<(), ExchangeError> {
        let text = serde_json::to_string(value).map_err(|e| {
            warn!("Dropping malformed outbound message: {}", e);
            ExchangeError::SerializationError(e.to_string())
        })?;
        debug!(exchange = self.codec.name(), "Send message: {}", text);

        let mut sink = self.sink.lock().await;
        let Some(sink) = sink.as_mut() else {
            return Err(ExchangeError::NetworkError(
                "WebSocket not connected".to_string(),
            ));
        };
        if let Err(e) = sink.send(Message::Text(text)).await {
            self.alive.store(false, Ordering::SeqCst);
            warn!(exchange = self.codec.name(), "Send message error: {}", e);
            return Err(e);
        }
        Ok(())
    }

    /// Register a waiter under `key`, send `frame` and wait for the answer
    async fn round_trip(
        &self,
        table: &CorrelationTable,
        key: &str,
        frame: &Value,
    ) -> WaiterResult {
        let rx = table.register(key).await?;
        if let Err(e) = self.send_value(frame).await {
            table.cancel(key).await;
            return Err(e);
        }

        match tokio::time::timeout(self.config.request_timeout, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(ExchangeError::ConnectionClosed),
            Err(_) => {
                table.cancel(key).await;
                Err(ExchangeError::RequestTimeout(format!(
                    "no answer for '{}' within {:?}",
                    key, self.config.request_timeout
                )))
            }
        }
    }

    async fn subscribe_on_wire(&self, topic: &str) -> Result<(), ExchangeError> {
        let frame = self.codec.encode_subscription(topic);
        self.round_trip(&self.acks, topic, &frame).await.map(|_| ())
    }

    /// Route one inbound document
    async fn dispatch(&self, document: Value) {
        match self.codec.classify(&document) {
            Inbound::Push { topic } => match self.subscriptions.get(&topic).await {
                Some(listener) => {
                    let delivery = Delivery {
                        listener,
                        topic,
                        document,
                    };
                    if self.deliveries.send(delivery).is_err() {
                        warn!("Delivery task is gone, dropping push");
                    }
                }
                None => debug!("No listener for '{}'", topic),
            },
            Inbound::Reply(reply) => {
                if let Err(e) = self.send_value(&reply).await {
                    warn!(exchange = self.codec.name(), "Failed to answer ping: {}", e);
                }
            }
            Inbound::Ack { key, result } => {
                self.acks.fulfil(&key, result).await;
            }
            Inbound::Response { key, result } => {
                self.responses.fulfil(&key, result).await;
            }
            Inbound::Ignore => {}
        }
    }

    /// Called by the loops bound to `generation` when it stops working
    async fn connection_lost(self: &Arc<Self>, generation: u64) {
        if !self.is_current(generation) {
            return;
        }
        self.alive.store(false, Ordering::SeqCst);
        self.fail_pending().await;

        if self.closed.load(Ordering::SeqCst) {
            return;
        }
        if self.should_reconnect() {
            if !self.reconnecting.load(Ordering::SeqCst) {
                self.set_state(ConnectionState::Reconnecting);
                tokio::spawn(Self::reconnect_loop(Arc::downgrade(self)));
            }
        } else {
            debug!(exchange = self.codec.name(), "Connection lost, auto reconnect disabled");
            self.set_state(ConnectionState::Disconnected);
        }
    }

    /// Unbounded fixed-delay redial, then replay of every subscription
    fn reconnect_loop(weak: Weak<Self>) -> BoxFuture<'static, ()> {
        async move {
            let delay = {
                let Some(inner) = weak.upgrade() else {
                    return;
                };
                if inner.reconnecting.swap(true, Ordering::SeqCst) {
                    return;
                }
                inner.set_state(ConnectionState::Reconnecting);
                inner.config.reconnect_delay
            };

            for pause in FixedInterval::new(delay) {
                debug!("Begin reconnecting");
                tokio::time::sleep(pause).await;

                let Some(inner) = weak.upgrade() else {
                    return;
                };
                if inner.closed.load(Ordering::SeqCst) {
                    inner.reconnecting.store(false, Ordering::SeqCst);
                    return;
                }

                // the old receive loop exits silently once the generation moves on
                inner.teardown().await;
                inner.fail_pending().await;
                if let Err(e) = inner.connect().await {
                    warn!(exchange = inner.codec.name(), "Reconnecting error: {}", e);
                    inner.set_state(ConnectionState::Reconnecting);
                    continue;
                }
                if let Err(e) = inner.replay_subscriptions().await {
                    warn!(exchange = inner.codec.name(), "Replay interrupted: {}", e);
                    inner.set_state(ConnectionState::Reconnecting);
                    continue;
                }

                info!(exchange = inner.codec.name(), "Reconnecting successful");
                inner.reconnecting.store(false, Ordering::SeqCst);

                // a drop during replay was not acted on while we held the flag
                if inner.alive.load(Ordering::SeqCst) || !inner.should_reconnect() {
                    return;
                }
                if inner.reconnecting.swap(true, Ordering::SeqCst) {
                    return;
                }
                inner.set_state(ConnectionState::Reconnecting);
            }
        }
        .boxed()
    }

    /// Re-run the subscribe handshake for every registered topic
    ///
    /// Rejections are logged and skipped; a transport failure aborts so the
    /// reconnect loop can start over.
    async fn replay_subscriptions(&self) -> Result<(), ExchangeError> {
        for topic in self.subscriptions.topics().await {
            let _guard = self.issue_locks.lock(&subscription_key(&topic)).await;
            if !self.subscriptions.contains(&topic).await {
                continue;
            }
            match self.subscribe_on_wire(&topic).await {
                Ok(()) => debug!("Resubscribed '{}'", topic),
                Err(e) if e.is_transport() => return Err(e),
                Err(e) => warn!("Reconnecting subscribe error for '{}': {}", topic, e),
            }
        }
        Ok(())
    }
}

async fn receive_loop<C: WsCodec>(
    weak: Weak<SessionInner<C>>,
    generation: u64,
    mut stream: FrameStream,
) {
    let compressed = match weak.upgrade() {
        Some(inner) => inner.codec.compressed(),
        None => return,
    };

    while let Some(frame) = stream.next().await {
        let Some(inner) = weak.upgrade() else {
            return;
        };
        if !inner.is_current(generation) {
            return;
        }

        let payload = match frame.and_then(|message| frame_payload(message, compressed)) {
            Ok(Some(payload)) => payload,
            Ok(None) => continue,
            Err(e) => {
                warn!(exchange = inner.codec.name(), "Handle message loop error: {}", e);
                break;
            }
        };

        match serde_json::from_slice::<Value>(&payload) {
            Ok(document) => {
                debug!(exchange = inner.codec.name(), "Receive: {}", document);
                inner.dispatch(document).await;
            }
            Err(e) => warn!(exchange = inner.codec.name(), "Discarding malformed frame: {}", e),
        }
    }

    if let Some(inner) = weak.upgrade() {
        inner.connection_lost(generation).await;
    }
}

async fn heartbeat_loop<C: WsCodec>(
    weak: Weak<SessionInner<C>>,
    generation: u64,
    interval: Duration,
) {
    loop {
        {
            let Some(inner) = weak.upgrade() else {
                return;
            };
            if !inner.is_current(generation) || !inner.alive.load(Ordering::SeqCst) {
                return;
            }
            let Some(ping) = inner.codec.heartbeat() else {
                return;
            };
            if let Err(e) = inner.send_value(&ping).await {
                warn!(exchange = inner.codec.name(), "Heartbeat failed: {}", e);
                inner.connection_lost(generation).await;
                return;
            }
        }
        tokio::time::sleep(interval).await;
    }
}

/// Hands pushes to listeners in arrival order, off the receive loop
async fn deliver(mut rx: mpsc::UnboundedReceiver<Delivery>) {
    while let Some(Delivery {
        listener,
        topic,
        document,
    }) = rx.recv().await
    {
        let outcome = std::panic::catch_unwind(AssertUnwindSafe(|| listener(&topic, &document)));
        if outcome.is_err() {
            error!(topic = %topic, "Listener panicked");
        }
    }
}
