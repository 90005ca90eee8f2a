use crate::core::config::ExchangeConfig;
use crate::core::errors::ExchangeError;
use crate::core::kernel::signer::{HmacSigner, SignatureVersion};
use crate::core::kernel::ws::{TungsteniteWs, WsConfig, WsTransport};
use crate::core::kernel::{ReqwestRest, RestClientBuilder, RestClientConfig};
use crate::exchanges::huobi::rest::{MarketClient, TradeClient};
use crate::exchanges::huobi::websocket::{MarketWsClient, TradeWsClient, TradeWsV2Client};
use std::sync::Arc;
use std::time::Duration;

/// Builder for Huobi REST and WebSocket clients
///
/// Every client built from the same builder targets the same host. The
/// transport defaults to tungstenite over TLS and can be swapped, e.g. for
/// an in-memory transport in tests.
pub struct HuobiBuilder {
    config: ExchangeConfig,
    ws_config: WsConfig,
    rest_timeout: u64,
    transport: Option<Arc<dyn WsTransport>>,
}

impl Default for HuobiBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl HuobiBuilder {
    /// Create a new `HuobiBuilder` with default settings
    pub fn new() -> Self {
        Self {
            config: ExchangeConfig::read_only(),
            ws_config: WsConfig::default(),
            rest_timeout: 30,
            transport: None,
        }
    }

    /// Set the exchange configuration (credentials and host)
    pub fn with_config(mut self, config: ExchangeConfig) -> Self {
        self.config = config;
        self
    }

    /// Set API credentials, keeping the configured host
    pub fn with_credentials(mut self, access_key: String, secret_key: String) -> Self {
        let host = self.config.host.clone();
        self.config = ExchangeConfig::new(access_key, secret_key).host(host);
        self
    }

    /// Use the AWS host, lower latency from inside AWS
    pub fn with_aws_host(mut self) -> Self {
        self.config = self.config.use_aws_host();
        self
    }

    /// Use a custom API host (no scheme, no path)
    pub fn with_host(mut self, host: String) -> Self {
        self.config = self.config.host(host);
        self
    }

    pub fn with_ws_config(mut self, ws_config: WsConfig) -> Self {
        self.ws_config = ws_config;
        self
    }

    /// Client ping interval on the market channel; `None` turns it off
    pub fn with_heartbeat_interval(mut self, interval: Option<Duration>) -> Self {
        self.ws_config.heartbeat_interval = interval;
        self
    }

    /// Upper bound on waiting for an ack or a response
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.ws_config.request_timeout = timeout;
        self
    }

    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.ws_config.reconnect_delay = delay;
        self
    }

    pub fn with_auto_reconnect(mut self, auto_reconnect: bool) -> Self {
        self.ws_config.auto_reconnect = auto_reconnect;
        self
    }

    /// Set REST client timeout in seconds
    pub fn with_rest_timeout(mut self, timeout: u64) -> Self {
        self.rest_timeout = timeout;
        self
    }

    /// Replace the WebSocket transport
    pub fn with_transport(mut self, transport: Arc<dyn WsTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    fn transport(&self) -> Arc<dyn WsTransport> {
        self.transport.clone().unwrap_or_else(|| {
            Arc::new(TungsteniteWs::new(self.ws_config.connect_timeout)) as Arc<dyn WsTransport>
        })
    }

    fn rest_builder(&self) -> RestClientBuilder {
        let rest_config = RestClientConfig::new(self.config.host.clone(), "huobi".to_string())
            .with_timeout(self.rest_timeout);
        RestClientBuilder::new(rest_config)
    }

    /// Build the public market REST client
    pub fn build_market_rest(&self) -> Result<MarketClient<ReqwestRest>, ExchangeError> {
        Ok(MarketClient::new(self.rest_builder().build()?))
    }

    /// Build the signed trade REST client
    pub fn build_trade_rest(&self) -> Result<TradeClient<ReqwestRest>, ExchangeError> {
        if !self.config.has_credentials() {
            return Err(ExchangeError::AuthError(
                "trade client requires an access key and secret".to_string(),
            ));
        }
        let signer = Arc::new(HmacSigner::new(
            self.config.api_key().to_string(),
            self.config.secret_key().to_string(),
            SignatureVersion::V2,
        ));
        let rest = self.rest_builder().with_signer(signer).build()?;
        Ok(TradeClient::new(rest))
    }

    /// Connect the market data channel
    pub async fn build_market_ws(&self) -> Result<MarketWsClient, ExchangeError> {
        MarketWsClient::connect(
            self.config.endpoints().market_ws,
            self.transport(),
            self.ws_config.clone(),
        )
        .await
    }

    /// Connect and authenticate the legacy trade channel
    pub async fn build_trade_ws(&self) -> Result<TradeWsClient, ExchangeError> {
        TradeWsClient::connect(
            self.config.endpoints().trade_ws,
            &self.config,
            self.transport(),
            self.ws_config.clone(),
        )
        .await
    }

    /// Connect and authenticate the current trade channel
    pub async fn build_trade_ws_v2(&self) -> Result<TradeWsV2Client, ExchangeError> {
        TradeWsV2Client::connect(
            self.config.endpoints().trade_ws_v2,
            &self.config,
            self.transport(),
            self.ws_config.clone(),
        )
        .await
    }
}

/// Market REST client against the default host
pub fn new_market_client() -> Result<MarketClient<ReqwestRest>, ExchangeError> {
    HuobiBuilder::new().build_market_rest()
}

/// Trade REST client against the default host
pub fn new_trade_client(
    access_key: String,
    secret_key: String,
) -> Result<TradeClient<ReqwestRest>, ExchangeError> {
    HuobiBuilder::new()
        .with_credentials(access_key, secret_key)
        .build_trade_rest()
}

/// Market WebSocket client against the default host
pub async fn new_market_ws_client() -> Result<MarketWsClient, ExchangeError> {
    HuobiBuilder::new().build_market_ws().await
}

/// Legacy trade WebSocket client against the default host
pub async fn new_trade_ws_client(
    access_key: String,
    secret_key: String,
) -> Result<TradeWsClient, ExchangeError> {
    HuobiBuilder::new()
        .with_credentials(access_key, secret_key)
        .build_trade_ws()
        .await
}

/// Current trade WebSocket client against the default host
pub async fn new_trade_ws_v2_client(
    access_key: String,
    secret_key: String,
) -> Result<TradeWsV2Client, ExchangeError> {
    HuobiBuilder::new()
        .with_credentials(access_key, secret_key)
        .build_trade_ws_v2()
        .await
}
