use crate::core::errors::ExchangeError;
use crate::core::kernel::query::{canonical_query, merge, Params};
use base64::engine::general_purpose;
use base64::Engine;
use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, Secret};
use serde_json::Value;
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Signature method name sent alongside every signature
pub const SIGNATURE_METHOD: &str = "HmacSHA256";

/// Signer trait for request authentication
///
/// The same signer serves REST calls and the WebSocket auth handshake; both
/// hash the canonical string built by [`canonical_string`].
pub trait Signer: Send + Sync {
    /// Fields every signed call carries: key id, method, version and a fresh timestamp
    fn sign_fields(&self) -> Params;

    /// Name of the parameter the signature travels under
    fn signature_field(&self) -> &'static str;

    /// Sign `params` for the given request line
    fn sign(
        &self,
        method: &str,
        host: &str,
        path: &str,
        params: &Params,
    ) -> Result<String, ExchangeError>;

    /// Merge the sign fields with `extra`, sign the merged set and add the signature
    fn signed_params(
        &self,
        method: &str,
        host: &str,
        path: &str,
        extra: Option<&Params>,
    ) -> Result<Params, ExchangeError> {
        let mut params = match extra {
            Some(extra) => merge(self.sign_fields(), extra),
            None => self.sign_fields(),
        };
        let signature = self.sign(method, host, path, &params)?;
        params.insert(
            self.signature_field().to_string(),
            Value::String(signature),
        );
        Ok(params)
    }
}

/// Signature scheme versions accepted by the exchange
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureVersion {
    /// Legacy scheme used by REST and the v1 trade channel
    V2,
    /// Scheme used by the v2 trade channel
    V2_1,
}

impl SignatureVersion {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::V2 => "2",
            Self::V2_1 => "2.1",
        }
    }
}

/// HMAC-SHA256 signer producing base64 digests
pub struct HmacSigner {
    access_key: String,
    secret_key: Secret<String>,
    version: SignatureVersion,
}

impl std::fmt::Debug for HmacSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HmacSigner")
            .field("access_key", &self.access_key)
            .field("version", &self.version)
            .finish_non_exhaustive()
    }
}

impl HmacSigner {
    /// Create a new HMAC signer
    ///
    /// # Arguments
    /// * `access_key` - Access key id from the exchange
    /// * `secret_key` - Secret key for signing
    /// * `version` - Which signature scheme to emit
    pub fn new(access_key: String, secret_key: String, version: SignatureVersion) -> Self {
        Self {
            access_key,
            secret_key: Secret::new(secret_key),
            version,
        }
    }

    pub fn version(&self) -> SignatureVersion {
        self.version
    }

    /// UTC, second precision, no zone suffix
    fn timestamp() -> String {
        chrono::Utc::now().format("%Y-%m-%dT%H:%M:%S").to_string()
    }
}

impl Signer for HmacSigner {
    fn sign_fields(&self) -> Params {
        let names = match self.version {
            SignatureVersion::V2 => [
                "AccessKeyId",
                "SignatureMethod",
                "SignatureVersion",
                "Timestamp",
            ],
            SignatureVersion::V2_1 => [
                "accessKey",
                "signatureMethod",
                "signatureVersion",
                "timestamp",
            ],
        };
        let values = [
            self.access_key.clone(),
            SIGNATURE_METHOD.to_string(),
            self.version.as_str().to_string(),
            Self::timestamp(),
        ];

        names
            .into_iter()
            .map(str::to_string)
            .zip(values.into_iter().map(Value::String))
            .collect()
    }

    fn signature_field(&self) -> &'static str {
        match self.version {
            SignatureVersion::V2 => "Signature",
            SignatureVersion::V2_1 => "signature",
        }
    }

    fn sign(
        &self,
        method: &str,
        host: &str,
        path: &str,
        params: &Params,
    ) -> Result<String, ExchangeError> {
        let payload = canonical_string(method, host, path, params);
        compute_hmac256(&payload, self.secret_key.expose_secret())
    }
}

/// `method \n host \n path \n canonical-query`
pub fn canonical_string(method: &str, host: &str, path: &str, params: &Params) -> String {
    format!(
        "{}\n{}\n{}\n{}",
        method.to_uppercase(),
        host.to_lowercase(),
        path,
        canonical_query(params)
    )
}

/// base64(HMAC-SHA256(payload, secret))
pub fn compute_hmac256(payload: &str, secret: &str) -> Result<String, ExchangeError> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| ExchangeError::AuthError(format!("Invalid secret key: {}", e)))?;

    mac.update(payload.as_bytes());
    Ok(general_purpose::STANDARD.encode(mac.finalize().into_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn params(value: Value) -> Params {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn test_known_signature_v2() {
        let p = params(json!({
            "AccessKeyId": "e2xxxxxx-99xxxxxx-84xxxxxx-7xxxx",
            "SignatureMethod": "HmacSHA256",
            "SignatureVersion": "2",
            "Timestamp": "2017-05-11T15:19:30",
            "order-id": "1234567890"
        }));
        let signer = HmacSigner::new(
            "e2xxxxxx-99xxxxxx-84xxxxxx-7xxxx".to_string(),
            "b0xxxxxx-c6xxxxxx-94xxxxxx-dxxxx".to_string(),
            SignatureVersion::V2,
        );

        let signature = signer
            .sign("GET", "api.huobi.pro", "/v1/order/orders", &p)
            .unwrap();
        assert_eq!(signature, "Nmd8AU8uAe0mkFpxNbiava0aeZzBEtYjCdie1ZYZjoM=");
    }

    #[test]
    fn test_known_signature_v2_1_ws_auth() {
        let p = params(json!({
            "accessKey": "key",
            "signatureMethod": "HmacSHA256",
            "signatureVersion": "2.1",
            "timestamp": "2019-12-05T02:46:14"
        }));
        let signer = HmacSigner::new("key".to_string(), "secret".to_string(), SignatureVersion::V2_1);

        let signature = signer.sign("GET", "api.huobi.pro", "/ws/v2", &p).unwrap();
        assert_eq!(signature, "W4G0ReKjzAAo10ZnNhBhrCxUA5RqdF+ttdLdUYuD8p8=");
    }

    #[test]
    fn test_signature_independent_of_insertion_order() {
        let signer = HmacSigner::new("k".to_string(), "s".to_string(), SignatureVersion::V2);
        let mut forward = Params::new();
        let mut backward = Params::new();
        let entries = [("z", json!(1)), ("a", json!("x")), ("m", json!(true))];
        for (k, v) in &entries {
            forward.insert((*k).to_string(), v.clone());
        }
        for (k, v) in entries.iter().rev() {
            backward.insert((*k).to_string(), v.clone());
        }

        assert_eq!(
            signer.sign("GET", "h", "/p", &forward).unwrap(),
            signer.sign("GET", "h", "/p", &backward).unwrap()
        );
    }

    #[test]
    fn test_sign_fields_v2() {
        let signer = HmacSigner::new("id".to_string(), "s".to_string(), SignatureVersion::V2);
        let fields = signer.sign_fields();
        assert_eq!(fields["AccessKeyId"], "id");
        assert_eq!(fields["SignatureMethod"], "HmacSHA256");
        assert_eq!(fields["SignatureVersion"], "2");
        let ts = fields["Timestamp"].as_str().unwrap();
        assert!(chrono::NaiveDateTime::parse_from_str(ts, "%Y-%m-%dT%H:%M:%S").is_ok());
        assert_eq!(signer.signature_field(), "Signature");
    }

    #[test]
    fn test_sign_fields_v2_1() {
        let signer = HmacSigner::new("id".to_string(), "s".to_string(), SignatureVersion::V2_1);
        let fields = signer.sign_fields();
        assert_eq!(fields.len(), 4);
        assert_eq!(fields["accessKey"], "id");
        assert_eq!(fields["signatureMethod"], "HmacSHA256");
        assert_eq!(fields["signatureVersion"], "2.1");
        assert!(fields.contains_key("timestamp"));
        assert_eq!(signer.signature_field(), "signature");
    }

    #[test]
    fn test_signed_params_adds_signature_over_merged_set() {
        let signer = HmacSigner::new("id".to_string(), "s".to_string(), SignatureVersion::V2);
        let extra = params(json!({"account-id": "1"}));
        let signed = signer
            .signed_params("GET", "api.huobi.pro", "/v1/account", Some(&extra))
            .unwrap();

        let mut unsigned = signed.clone();
        let signature = unsigned.remove("Signature").unwrap();
        assert_eq!(unsigned["account-id"], "1");
        assert_eq!(
            signature,
            signer
                .sign("GET", "api.huobi.pro", "/v1/account", &unsigned)
                .unwrap()
        );
    }

    #[test]
    fn test_debug_hides_secret() {
        let signer = HmacSigner::new("id".to_string(), "topsecret".to_string(), SignatureVersion::V2);
        assert!(!format!("{:?}", signer).contains("topsecret"));
    }
}
