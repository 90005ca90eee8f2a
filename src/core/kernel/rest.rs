use crate::core::errors::ExchangeError;
use crate::core::kernel::query::{canonical_query, is_flat, Params};
use crate::core::kernel::signer::Signer;
use async_trait::async_trait;
use reqwest::header::{CONTENT_TYPE, USER_AGENT};
use reqwest::{Client, Method, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;
use tracing::{instrument, trace};

/// REST client trait for making HTTP requests
///
/// Every call returns the decoded response document, or an error built from
/// the exchange's `{"status":"error","err-msg":...}` envelope.
#[async_trait]
pub trait RestClient: Send + Sync {
    /// Issue one request
    ///
    /// # Arguments
    /// * `method` - HTTP method
    /// * `path` - The API endpoint path
    /// * `params` - Query parameters for GET/HEAD, JSON body otherwise
    /// * `authenticated` - Whether to sign the request
    async fn request(
        &self,
        method: Method,
        path: &str,
        params: Option<&Params>,
        authenticated: bool,
    ) -> Result<Value, ExchangeError>;

    /// Make a GET request
    async fn get(
        &self,
        path: &str,
        params: Option<&Params>,
        authenticated: bool,
    ) -> Result<Value, ExchangeError> {
        self.request(Method::GET, path, params, authenticated).await
    }

    /// Make a POST request
    async fn post(
        &self,
        path: &str,
        params: Option<&Params>,
        authenticated: bool,
    ) -> Result<Value, ExchangeError> {
        self.request(Method::POST, path, params, authenticated)
            .await
    }

    /// Make a GET request with strongly-typed response
    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        params: Option<&Params>,
        authenticated: bool,
    ) -> Result<T, ExchangeError> {
        let value = self.get(path, params, authenticated).await?;
        decode_document(value)
    }

    /// Make a POST request with strongly-typed response
    async fn post_json<T: DeserializeOwned>(
        &self,
        path: &str,
        params: Option<&Params>,
        authenticated: bool,
    ) -> Result<T, ExchangeError> {
        let value = self.post(path, params, authenticated).await?;
        decode_document(value)
    }
}

/// Deserialize a response document into `T`
pub fn decode_document<T: DeserializeOwned>(value: Value) -> Result<T, ExchangeError> {
    serde_json::from_value(value).map_err(|e| {
        ExchangeError::DeserializationError(format!("Failed to deserialize JSON: {}", e))
    })
}

/// Configuration for the REST client
#[derive(Clone, Debug)]
pub struct RestClientConfig {
    /// Base URL for the API, e.g. `https://api.huobi.pro`
    pub base_url: String,
    /// Host name that goes into the signature string
    pub host: String,
    /// Exchange name for logging and tracing
    pub exchange_name: String,
    /// Request timeout in seconds
    pub timeout_seconds: u64,
    /// User agent string to include in requests
    pub user_agent: String,
}

impl RestClientConfig {
    /// Create a new configuration for an API host
    ///
    /// # Arguments
    /// * `host` - Bare host name; the base URL is `https://{host}`
    /// * `exchange_name` - Name of the exchange
    pub fn new(host: String, exchange_name: String) -> Self {
        Self {
            base_url: format!("https://{}", host),
            host,
            exchange_name,
            timeout_seconds: 30,
            user_agent: concat!("huobi-api/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }

    /// Override the base URL (the signing host is unchanged)
    pub fn with_base_url(mut self, base_url: String) -> Self {
        self.base_url = base_url;
        self
    }

    /// Set the request timeout
    pub fn with_timeout(mut self, timeout_seconds: u64) -> Self {
        self.timeout_seconds = timeout_seconds;
        self
    }

    /// Set the user agent string
    pub fn with_user_agent(mut self, user_agent: String) -> Self {
        self.user_agent = user_agent;
        self
    }
}

/// Builder for creating REST client instances
pub struct RestClientBuilder {
    config: RestClientConfig,
    signer: Option<Arc<dyn Signer>>,
}

impl RestClientBuilder {
    pub fn new(config: RestClientConfig) -> Self {
        Self {
            config,
            signer: None,
        }
    }

    /// Set the signer for authenticated requests
    pub fn with_signer(mut self, signer: Arc<dyn Signer>) -> Self {
        self.signer = Some(signer);
        self
    }

    pub fn build(self) -> Result<ReqwestRest, ExchangeError> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(self.config.timeout_seconds))
            .build()
            .map_err(|e| {
                ExchangeError::ConfigurationError(format!("Failed to build HTTP client: {}", e))
            })?;

        Ok(ReqwestRest {
            client,
            config: self.config,
            signer: self.signer,
        })
    }
}

/// Implementation of `RestClient` using reqwest
#[derive(Clone)]
pub struct ReqwestRest {
    client: Client,
    config: RestClientConfig,
    signer: Option<Arc<dyn Signer>>,
}

impl std::fmt::Debug for ReqwestRest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReqwestRest")
            .field("config", &self.config)
            .field("has_signer", &self.signer.is_some())
            .finish_non_exhaustive()
    }
}

/// GET and HEAD carry parameters in the query string
fn is_query_method(method: &Method) -> bool {
    *method == Method::GET || *method == Method::HEAD
}

impl ReqwestRest {
    pub fn config(&self) -> &RestClientConfig {
        &self.config
    }

    /// Build the URL and body for a request
    ///
    /// Query methods put everything (plus the signature) in the query
    /// string. Other methods sign only the sign fields, carried in the query
    /// string, while the caller's parameters go unsigned in the JSON body.
    pub fn prepare(
        &self,
        method: &Method,
        path: &str,
        params: Option<&Params>,
        authenticated: bool,
    ) -> Result<(String, Option<Vec<u8>>), ExchangeError> {
        let signer = if authenticated {
            Some(self.signer.as_ref().ok_or_else(|| {
                ExchangeError::AuthError(
                    "Authentication required but no signer provided".to_string(),
                )
            })?)
        } else {
            None
        };

        let base = format!("{}{}", self.config.base_url, path);

        if is_query_method(method) {
            if let Some(params) = params {
                if !is_flat(params) {
                    return Err(ExchangeError::InvalidParameters(
                        "query parameters must be scalar values".to_string(),
                    ));
                }
            }
            let query = match signer {
                Some(signer) => canonical_query(&signer.signed_params(
                    method.as_str(),
                    &self.config.host,
                    path,
                    params,
                )?),
                None => params.map(canonical_query).unwrap_or_default(),
            };
            let url = if query.is_empty() {
                base
            } else {
                format!("{}?{}", base, query)
            };
            return Ok((url, None));
        }

        let url = match signer {
            Some(signer) => format!(
                "{}?{}",
                base,
                canonical_query(&signer.signed_params(
                    method.as_str(),
                    &self.config.host,
                    path,
                    None,
                )?)
            ),
            None => base,
        };
        let body = serde_json::to_vec(&params.cloned().unwrap_or_default()).map_err(|e| {
            ExchangeError::SerializationError(format!("Failed to serialize request body: {}", e))
        })?;

        Ok((url, Some(body)))
    }

    /// Handle the response and apply the exchange's error envelope
    #[instrument(skip(self, response), fields(exchange = %self.config.exchange_name, status = %response.status()))]
    async fn handle_response(&self, response: Response) -> Result<Value, ExchangeError> {
        let status = response.status();
        let response_text = response.text().await?;

        trace!("Response body: {}", response_text);

        parse_body(status, response_text)
    }
}

/// Decode a response body, falling back to the HTTP status when a failed
/// call carries no JSON
pub fn parse_body(status: StatusCode, body: String) -> Result<Value, ExchangeError> {
    match serde_json::from_str::<Value>(&body) {
        Ok(document) => check_envelope(document),
        Err(_) if !status.is_success() => {
            Err(ExchangeError::api(status.as_u16().to_string(), body, None))
        }
        Err(e) => Err(e.into()),
    }
}

/// Fail with an `ApiError` when the document is an error envelope
pub fn check_envelope(document: Value) -> Result<Value, ExchangeError> {
    if document.get("status").and_then(Value::as_str) != Some("error") {
        return Ok(document);
    }
    let code = document
        .get("err-code")
        .map(crate::core::kernel::query::render_scalar)
        .unwrap_or_default();
    let message = document
        .get("err-msg")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    Err(ExchangeError::api(code, message, Some(document)))
}

#[async_trait]
impl RestClient for ReqwestRest {
    #[instrument(skip(self, params), fields(exchange = %self.config.exchange_name, method = %method, path = %path))]
    async fn request(
        &self,
        method: Method,
        path: &str,
        params: Option<&Params>,
        authenticated: bool,
    ) -> Result<Value, ExchangeError> {
        let (url, body) = self.prepare(&method, path, params, authenticated)?;

        let content_type = if is_query_method(&method) {
            "application/x-www-form-urlencoded"
        } else {
            "application/json"
        };

        let mut request = self
            .client
            .request(method, &url)
            .header(USER_AGENT, &self.config.user_agent)
            .header(CONTENT_TYPE, content_type);
        if let Some(body) = body {
            request = request.body(body);
        }

        let response = request.send().await?;

        self.handle_response(response).await
    }
}
