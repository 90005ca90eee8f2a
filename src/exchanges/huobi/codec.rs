use crate::core::errors::ExchangeError;
use crate::core::kernel::codec::{Inbound, WsCodec};
use crate::core::kernel::query::{render_scalar, Params};
use crate::core::kernel::session::AUTH_KEY;
use crate::core::kernel::signer::Signer;
use serde_json::{json, Value};
use tracing::debug;

fn str_field<'a>(document: &'a Value, field: &str) -> &'a str {
    document.get(field).and_then(Value::as_str).unwrap_or_default()
}

/// Copy of `document` with `field` rewritten to `"pong"`
fn as_pong(document: &Value, field: &str) -> Value {
    let mut reply = document.clone();
    if let Some(object) = reply.as_object_mut() {
        object.insert(field.to_string(), Value::String("pong".to_string()));
    }
    reply
}

/// Market data channel (`/ws`)
///
/// Frames arrive gzip-compressed. Pushes carry `ch`, subscribe acks carry
/// `subbed`, failures are `{"status":"error","err-msg":..}` correlated by
/// the `id` we sent. The server pings with `{"ping":n}`; the client also
/// pings on its own heartbeat.
#[derive(Debug, Clone, Copy, Default)]
pub struct MarketCodec;

impl WsCodec for MarketCodec {
    fn name(&self) -> &'static str {
        "huobi-market"
    }

    fn compressed(&self) -> bool {
        true
    }

    fn encode_subscription(&self, topic: &str) -> Value {
        json!({ "sub": topic, "id": topic })
    }

    fn encode_unsubscription(&self, topic: &str) -> Option<Value> {
        Some(json!({ "unsub": topic }))
    }

    fn encode_request(&self, _topic: &str, _fields: Params) -> Option<Value> {
        None
    }

    fn encode_auth(
        &self,
        _signer: &dyn Signer,
        _host: &str,
        _path: &str,
    ) -> Result<Option<Value>, ExchangeError> {
        Ok(None)
    }

    fn heartbeat(&self) -> Option<Value> {
        Some(json!({ "ping": chrono::Utc::now().timestamp_millis() }))
    }

    fn decode_error(&self, document: &Value) -> Option<ExchangeError> {
        if str_field(document, "status") != "error" {
            return None;
        }
        let code = document.get("err-code").map(render_scalar).unwrap_or_default();
        Some(ExchangeError::api(
            code,
            str_field(document, "err-msg"),
            Some(document.clone()),
        ))
    }

    fn classify(&self, document: &Value) -> Inbound {
        if let Some(topic) = document.get("ch") {
            return Inbound::Push {
                topic: render_scalar(topic),
            };
        }
        if let Some(ping) = document.get("ping") {
            return Inbound::Reply(json!({ "pong": ping }));
        }
        if document.get("pong").is_some() {
            return Inbound::Ignore;
        }
        if let Some(topic) = document.get("subbed") {
            return Inbound::Ack {
                key: render_scalar(topic),
                result: Ok(document.clone()),
            };
        }
        if let Some(topic) = document.get("unsubbed") {
            debug!(
                "Unsubscribe {} {}",
                render_scalar(topic),
                str_field(document, "status")
            );
            return Inbound::Ignore;
        }
        if let Some(error) = self.decode_error(document) {
            if let Some(id) = document.get("id") {
                return Inbound::Ack {
                    key: render_scalar(id),
                    result: Err(error),
                };
            }
        }
        Inbound::Ignore
    }
}

/// Legacy authenticated trade channel (`/ws/v1`)
///
/// Every frame is dispatched on `op`. Auth uses signature version 2 with the
/// sign fields at the top level of the frame. Errors are a non-zero
/// `err-code` with `err-msg`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TradeV1Codec;

impl WsCodec for TradeV1Codec {
    fn name(&self) -> &'static str {
        "huobi-trade-v1"
    }

    fn compressed(&self) -> bool {
        true
    }

    fn encode_subscription(&self, topic: &str) -> Value {
        json!({ "op": "sub", "topic": topic })
    }

    fn encode_unsubscription(&self, topic: &str) -> Option<Value> {
        Some(json!({ "op": "unsub", "topic": topic }))
    }

    fn encode_request(&self, topic: &str, mut fields: Params) -> Option<Value> {
        fields.insert("topic".to_string(), Value::String(topic.to_string()));
        fields.insert("op".to_string(), Value::String("req".to_string()));
        Some(Value::Object(fields))
    }

    fn encode_auth(
        &self,
        signer: &dyn Signer,
        host: &str,
        path: &str,
    ) -> Result<Option<Value>, ExchangeError> {
        let mut params = signer.signed_params("GET", host, path, None)?;
        params.insert("op".to_string(), Value::String("auth".to_string()));
        Ok(Some(Value::Object(params)))
    }

    fn heartbeat(&self) -> Option<Value> {
        None
    }

    fn decode_error(&self, document: &Value) -> Option<ExchangeError> {
        let code = document.get("err-code")?;
        if code.as_i64().unwrap_or(0) == 0 {
            return None;
        }
        Some(ExchangeError::api(
            render_scalar(code),
            str_field(document, "err-msg"),
            Some(document.clone()),
        ))
    }

    fn classify(&self, document: &Value) -> Inbound {
        let topic = str_field(document, "topic");
        match str_field(document, "op") {
            "ping" => Inbound::Reply(as_pong(document, "op")),
            "auth" => Inbound::Ack {
                key: AUTH_KEY.to_string(),
                result: self.check(document),
            },
            "sub" => Inbound::Ack {
                key: topic.to_string(),
                result: self.check(document),
            },
            "unsub" => {
                debug!("Unsub {}", topic);
                Inbound::Ignore
            }
            "req" => Inbound::Response {
                key: topic.to_string(),
                result: self.check(document),
            },
            "notify" => Inbound::Push {
                topic: topic.to_string(),
            },
            // no client-initiated ping on this channel, so pongs are unexpected
            _ => Inbound::Ignore,
        }
    }
}

/// Current authenticated trade channel (`/ws/v2`)
///
/// Plain-text frames dispatched on `action`, keyed by `ch`. Auth uses
/// signature version 2.1 nested under `params`. Errors are any `code`
/// other than 200, described by `message`. The exchange offers no
/// unsubscribe operation.
#[derive(Debug, Clone, Copy, Default)]
pub struct TradeV2Codec;

impl WsCodec for TradeV2Codec {
    fn name(&self) -> &'static str {
        "huobi-trade-v2"
    }

    fn compressed(&self) -> bool {
        false
    }

    fn encode_subscription(&self, topic: &str) -> Value {
        json!({ "action": "sub", "ch": topic })
    }

    fn encode_unsubscription(&self, _topic: &str) -> Option<Value> {
        None
    }

    fn encode_request(&self, topic: &str, fields: Params) -> Option<Value> {
        Some(json!({ "action": "req", "ch": topic, "params": fields }))
    }

    fn encode_auth(
        &self,
        signer: &dyn Signer,
        host: &str,
        path: &str,
    ) -> Result<Option<Value>, ExchangeError> {
        let mut params = signer.signed_params("GET", host, path, None)?;
        // not part of the signed set
        params.insert("authType".to_string(), Value::String("api".to_string()));
        Ok(Some(json!({
            "action": "req",
            "ch": AUTH_KEY,
            "params": params,
        })))
    }

    fn heartbeat(&self) -> Option<Value> {
        None
    }

    fn decode_error(&self, document: &Value) -> Option<ExchangeError> {
        let code = document.get("code");
        if code.and_then(Value::as_i64).unwrap_or(0) == 200 {
            return None;
        }
        Some(ExchangeError::api(
            code.map(render_scalar).unwrap_or_default(),
            str_field(document, "message"),
            Some(document.clone()),
        ))
    }

    fn classify(&self, document: &Value) -> Inbound {
        let ch = str_field(document, "ch");
        match str_field(document, "action") {
            "ping" => Inbound::Reply(as_pong(document, "action")),
            "req" if ch == AUTH_KEY => Inbound::Ack {
                key: AUTH_KEY.to_string(),
                result: self.check(document),
            },
            "req" => Inbound::Response {
                key: ch.to_string(),
                result: self.check(document),
            },
            "sub" => Inbound::Ack {
                key: ch.to_string(),
                result: self.check(document),
            },
            "push" => Inbound::Push {
                topic: ch.to_string(),
            },
            _ => Inbound::Ignore,
        }
    }
}
