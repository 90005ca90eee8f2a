use serde_json::{Map, Value};

/// Request parameters as a JSON object. Values are expected to be scalars
/// when they end up in a query string.
pub type Params = Map<String, Value>;

/// Render parameters as a canonical query string.
///
/// Keys are sorted by byte value, each key and value is percent-encoded
/// (space as `+`), pairs are joined with `&`. The signer hashes this exact
/// string, so REST and WebSocket auth must both go through here.
pub fn canonical_query(params: &Params) -> String {
    let mut keys: Vec<&String> = params.keys().collect();
    keys.sort_unstable_by(|a, b| a.as_bytes().cmp(b.as_bytes()));

    keys.into_iter()
        .map(|key| {
            format!(
                "{}={}",
                query_escape(key),
                query_escape(&render_scalar(&params[key.as_str()]))
            )
        })
        .collect::<Vec<_>>()
        .join("&")
}

/// JSON rendering of a value with the surrounding quotes of a string dropped.
pub fn render_scalar(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// True when every value can be carried in a query string.
pub fn is_flat(params: &Params) -> bool {
    params
        .values()
        .all(|v| !matches!(v, Value::Object(_) | Value::Array(_)))
}

/// Merge `extra` into `base`, overwriting duplicate keys.
pub fn merge(mut base: Params, extra: &Params) -> Params {
    for (key, value) in extra {
        base.insert(key.clone(), value.clone());
    }
    base
}

fn query_escape(s: &str) -> String {
    urlencoding::encode(s).replace("%20", "+")
}
