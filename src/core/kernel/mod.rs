/// Kernel - exchange-agnostic transport layer
///
/// Everything here is protocol plumbing; nothing knows about Huobi's
/// envelopes. The exchange module plugs in through two traits.
///
/// # Architecture
///
/// ## Transport Layer
/// - `RestClient`: signed/unsigned HTTP calls returning decoded documents
/// - `WsTransport`: dials a URL and hands back a frame sink and stream
/// - `WsSession`: long-lived WebSocket session with subscription replay,
///   request/ack correlation and automatic reconnection
///
/// ## Authentication
/// - `Signer`: builds sign fields and signs a canonical request line
/// - `HmacSigner`: HMAC-SHA256 for signature versions 2 and 2.1
///
/// ## Message Handling
/// - `WsCodec`: protocol-specific framing and inbound classification
///
/// # Usage
///
/// ```rust,no_run
/// use huobi_api::core::kernel::*;
/// use huobi_api::exchanges::huobi::codec::MarketCodec;
/// use std::sync::Arc;
///
/// # async fn example() -> Result<(), huobi_api::ExchangeError> {
/// let session = WsSession::connect(
///     "wss://api.huobi.pro/ws".to_string(),
///     MarketCodec,
///     Arc::new(TungsteniteWs::default()),
///     None,
///     WsConfig::default(),
/// )
/// .await?;
///
/// session
///     .subscribe("market.btcusdt.trade.detail", |topic, document| {
///         println!("{}: {}", topic, document);
///     })
///     .await?;
/// # Ok(())
/// # }
/// ```
pub mod codec;
pub mod query;
pub mod registry;
pub mod rest;
pub mod session;
pub mod signer;
pub mod ws;

// Re-export key types for convenience
pub use codec::{Inbound, WsCodec};
pub use query::{canonical_query, Params};
pub use registry::{CorrelationTable, KeyGuard, KeyedLocks, Listener, SubscriptionRegistry};
pub use rest::{ReqwestRest, RestClient, RestClientBuilder, RestClientConfig};
pub use session::{ConnectionState, WsSession};
pub use signer::{HmacSigner, SignatureVersion, Signer};
pub use ws::{FrameSink, FrameStream, TungsteniteWs, WsConfig, WsTransport};
