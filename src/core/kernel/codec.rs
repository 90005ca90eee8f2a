use crate::core::errors::ExchangeError;
use crate::core::kernel::query::Params;
use crate::core::kernel::signer::Signer;
use serde_json::Value;

/// What the session should do with one inbound document
#[derive(Debug)]
pub enum Inbound {
    /// Server push for a subscribed topic; the document goes to its listener
    Push { topic: String },
    /// Frame that must be answered inline (server ping)
    Reply(Value),
    /// Acknowledgement for a subscribe or auth waiter
    Ack {
        key: String,
        result: Result<Value, ExchangeError>,
    },
    /// Answer to a one-shot request
    Response {
        key: String,
        result: Result<Value, ExchangeError>,
    },
    /// Nothing to do (pong, unsubscribe confirmation, unknown frames)
    Ignore,
}

/// Codec trait for exchange-specific WebSocket envelopes
///
/// The session kernel only talks to a protocol through this trait: it asks
/// the codec to build outbound frames and to classify inbound documents, and
/// does the waking/delivery itself.
pub trait WsCodec: Send + Sync + 'static {
    /// Protocol name for logging and tracing
    fn name(&self) -> &'static str;

    /// Whether binary frames arrive gzip-compressed
    fn compressed(&self) -> bool;

    /// Subscribe frame for `topic`
    fn encode_subscription(&self, topic: &str) -> Value;

    /// Unsubscribe frame for `topic`, `None` when the protocol has no such
    /// operation and removal is local only
    fn encode_unsubscription(&self, topic: &str) -> Option<Value>;

    /// One-shot request frame, `None` when the protocol has no request envelope
    fn encode_request(&self, topic: &str, fields: Params) -> Option<Value>;

    /// Signed auth frame for the connection at `host` + `path`, `None` when
    /// the protocol needs no auth handshake
    fn encode_auth(
        &self,
        signer: &dyn Signer,
        host: &str,
        path: &str,
    ) -> Result<Option<Value>, ExchangeError>;

    /// Client-initiated ping payload, `None` when the server drives heartbeats
    fn heartbeat(&self) -> Option<Value>;

    /// Exchange-reported error carried by `document`, if any
    fn decode_error(&self, document: &Value) -> Option<ExchangeError>;

    /// Classify an inbound document
    fn classify(&self, document: &Value) -> Inbound;

    /// `Ok(document)` unless the document carries an error
    fn check(&self, document: &Value) -> Result<Value, ExchangeError> {
        self.decode_error(document)
            .map_or_else(|| Ok(document.clone()), Err)
    }
}
