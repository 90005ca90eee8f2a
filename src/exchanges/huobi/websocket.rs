use crate::core::config::ExchangeConfig;
use crate::core::errors::ExchangeError;
use crate::core::kernel::codec::WsCodec;
use crate::core::kernel::query::Params;
use crate::core::kernel::rest::decode_document;
use crate::core::kernel::session::{ConnectionState, WsSession};
use crate::core::kernel::signer::{HmacSigner, SignatureVersion, Signer};
use crate::core::kernel::ws::{WsConfig, WsTransport};
use crate::exchanges::huobi::codec::{MarketCodec, TradeV1Codec, TradeV2Codec};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;

/// Market data WebSocket client (`/ws`)
pub type MarketWsClient = HuobiWsClient<MarketCodec>;

/// Authenticated trade WebSocket client, legacy channel (`/ws/v1`)
pub type TradeWsClient = HuobiWsClient<TradeV1Codec>;

/// Authenticated trade WebSocket client, current channel (`/ws/v2`)
pub type TradeWsV2Client = HuobiWsClient<TradeV2Codec>;

/// WebSocket client over one Huobi channel
///
/// Operations shared by every channel live here; channel-specific
/// constructors and the request calls are on the concrete aliases.
#[derive(Debug, Clone)]
pub struct HuobiWsClient<C: WsCodec> {
    session: WsSession<C>,
}

fn trade_signer(
    credentials: &ExchangeConfig,
    version: SignatureVersion,
) -> Result<Arc<dyn Signer>, ExchangeError> {
    if !credentials.has_credentials() {
        return Err(ExchangeError::AuthError(
            "trade channels require an access key and secret".to_string(),
        ));
    }
    Ok(Arc::new(HmacSigner::new(
        credentials.api_key().to_string(),
        credentials.secret_key().to_string(),
        version,
    )))
}

impl<C: WsCodec> HuobiWsClient<C> {
    /// Subscribe `listener` to `topic`; resolves once the exchange acknowledges
    pub async fn subscribe<F>(&self, topic: &str, listener: F) -> Result<(), ExchangeError>
    where
        F: Fn(&str, &Value) + Send + Sync + 'static,
    {
        self.session.subscribe(topic, listener).await
    }

    pub async fn unsubscribe(&self, topic: &str) -> Result<(), ExchangeError> {
        self.session.unsubscribe(topic).await
    }

    /// Redial on connection loss (default on)
    pub fn set_auto_reconnect(&self, auto_reconnect: bool) {
        self.session.set_auto_reconnect(auto_reconnect);
    }

    /// Close the current connection, open a new one, re-authenticate and
    /// resubscribe every topic
    pub async fn reconnect(&self) {
        self.session.reconnect().await;
    }

    pub async fn close(&self) {
        self.session.close().await;
    }

    pub fn state(&self) -> ConnectionState {
        self.session.state()
    }

    pub fn session(&self) -> &WsSession<C> {
        &self.session
    }
}

impl HuobiWsClient<MarketCodec> {
    pub async fn connect(
        endpoint: String,
        transport: Arc<dyn WsTransport>,
        config: WsConfig,
    ) -> Result<Self, ExchangeError> {
        let session = WsSession::connect(endpoint, MarketCodec, transport, None, config).await?;
        Ok(Self { session })
    }
}

impl HuobiWsClient<TradeV1Codec> {
    /// Connect and authenticate with signature version 2
    pub async fn connect(
        endpoint: String,
        credentials: &ExchangeConfig,
        transport: Arc<dyn WsTransport>,
        config: WsConfig,
    ) -> Result<Self, ExchangeError> {
        let signer = trade_signer(credentials, SignatureVersion::V2)?;
        let session =
            WsSession::connect(endpoint, TradeV1Codec, transport, Some(signer), config).await?;
        Ok(Self { session })
    }

    /// One-shot request; `params` are sent at the top level of the frame
    pub async fn request(&self, topic: &str, params: Option<Params>) -> Result<Value, ExchangeError> {
        self.session.request(topic, params).await
    }

    /// Request and decode the response's `data` into `T`
    pub async fn request_as<T: DeserializeOwned>(
        &self,
        topic: &str,
        params: Option<Params>,
    ) -> Result<T, ExchangeError> {
        let mut response = self.request(topic, params).await?;
        let data = response
            .get_mut("data")
            .map(Value::take)
            .unwrap_or(Value::Null);
        decode_document(data)
    }
}

impl HuobiWsClient<TradeV2Codec> {
    /// Connect and authenticate with signature version 2.1
    pub async fn connect(
        endpoint: String,
        credentials: &ExchangeConfig,
        transport: Arc<dyn WsTransport>,
        config: WsConfig,
    ) -> Result<Self, ExchangeError> {
        let signer = trade_signer(credentials, SignatureVersion::V2_1)?;
        let session =
            WsSession::connect(endpoint, TradeV2Codec, transport, Some(signer), config).await?;
        Ok(Self { session })
    }

    /// One-shot request; `params` are nested under `params` in the frame
    pub async fn request(&self, topic: &str, params: Option<Params>) -> Result<Value, ExchangeError> {
        self.session.request(topic, params).await
    }
}
