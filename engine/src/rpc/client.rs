//! The client handle every backend is built on.
//!
//! One [`RpcClient`] owns one HTTP connection pool. It is created
//! explicitly from a [`ClientConfig`], shared between fetchers behind an
//! `Arc`, and released with [`RpcClient::dispose`] when the caller is done.

use std::fmt;
use std::time::Duration;

use reqwest::{Client, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::{DEFAULT_FAST_INDEX_URL, DEFAULT_REQUEST_TIMEOUT, DEFAULT_RPC_URL};
use crate::error::{FetchError, ScanError};
use crate::rpc::{RpcRequest, RpcResponse};

// ---------------------------------------------------------------------------
// ClientConfig
// ---------------------------------------------------------------------------

/// Endpoints and credentials for one client handle.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ClientConfig {
    /// Ledger JSON-RPC endpoint.
    pub rpc_url: String,
    /// Fast-index endpoint, only used when `api_key` is set.
    pub fast_index_url: String,
    /// Fast-index credential.
    pub api_key: Option<String>,
    pub timeout_ms: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            rpc_url: DEFAULT_RPC_URL.to_string(),
            fast_index_url: DEFAULT_FAST_INDEX_URL.to_string(),
            api_key: None,
            timeout_ms: DEFAULT_REQUEST_TIMEOUT.as_millis() as u64,
        }
    }
}

impl ClientConfig {
    pub fn new(rpc_url: impl Into<String>) -> Self {
        Self {
            rpc_url: rpc_url.into(),
            ..Self::default()
        }
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn with_fast_index_url(mut self, url: impl Into<String>) -> Self {
        self.fast_index_url = url.into();
        self
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    fn credential(&self) -> Option<&str> {
        self.api_key.as_deref().filter(|k| !k.is_empty())
    }
}

// Keeps the credential out of logs.
impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("rpc_url", &self.rpc_url)
            .field("fast_index_url", &self.fast_index_url)
            .field("api_key", &self.credential().map(|_| "<redacted>"))
            .field("timeout_ms", &self.timeout_ms)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// RpcClient
// ---------------------------------------------------------------------------

pub struct RpcClient {
    http: Client,
    config: ClientConfig,
    rpc_url: Url,
    /// Present only when a credential is configured.
    fast_index_url: Option<Url>,
}

impl RpcClient {
    /// Validates the endpoints and builds the connection pool.
    pub fn create(config: ClientConfig) -> Result<Self, ScanError> {
        let rpc_url = parse_url("rpc url", &config.rpc_url)?;
        let fast_index_url = match config.credential() {
            Some(key) => {
                let mut url = parse_url("fast-index url", &config.fast_index_url)?;
                url.query_pairs_mut().append_pair("api-key", key);
                Some(url)
            }
            None => None,
        };

        let http = Client::builder()
            .timeout(config.timeout())
            .user_agent(concat!("holdscan/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ScanError::InvalidConfig(format!("http client: {}", e)))?;

        info!(
            host = rpc_url.host_str().unwrap_or("<none>"),
            fast_index = fast_index_url.is_some(),
            timeout_ms = config.timeout_ms,
            "rpc client created"
        );

        Ok(Self {
            http,
            config,
            rpc_url,
            fast_index_url,
        })
    }

    /// Releases the handle. Requests still in flight on clones of the
    /// underlying pool complete; no new ones can be issued through `self`.
    pub fn dispose(self) {
        debug!(host = self.host().unwrap_or("<none>"), "rpc client disposed");
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Host of the ledger endpoint, used to pick a paging dialect.
    pub fn host(&self) -> Option<&str> {
        self.rpc_url.host_str()
    }

    pub fn has_fast_index(&self) -> bool {
        self.fast_index_url.is_some()
    }

    /// Calls `method` on the ledger endpoint.
    pub async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        params: serde_json::Value,
    ) -> Result<T, FetchError> {
        self.post(&self.rpc_url, method, params).await
    }

    /// Calls `method` on the fast-index endpoint.
    pub async fn call_fast_index<T: DeserializeOwned>(
        &self,
        method: &str,
        params: serde_json::Value,
    ) -> Result<T, FetchError> {
        let url = self
            .fast_index_url
            .as_ref()
            .ok_or_else(|| FetchError::Unsupported("fast index requires an api key".into()))?;
        self.post(url, method, params).await
    }

    async fn post<T: DeserializeOwned>(
        &self,
        url: &Url,
        method: &str,
        params: serde_json::Value,
    ) -> Result<T, FetchError> {
        let request = RpcRequest::new(
            serde_json::Value::String(Uuid::new_v4().to_string()),
            method,
            params,
        );
        debug!(method, id = %request.id, "rpc call");

        let response = self
            .http
            .post(url.clone())
            .json(&request)
            .send()
            .await
            .map_err(|e| transport_error(method, e))?;
        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|e| transport_error(method, e))?;

        // A JSON-RPC error object says more than the status line, so look
        // for one first.
        let envelope: Option<RpcResponse> = serde_json::from_slice(&body).ok();
        if let Some(RpcResponse { error: Some(err), .. }) = &envelope {
            return Err(err.classify(method));
        }
        if !status.is_success() {
            return Err(status_error(method, status));
        }

        let envelope = envelope.ok_or_else(|| {
            FetchError::Decode(format!("{}: response is not a JSON-RPC envelope", method))
        })?;
        let result = envelope.result.ok_or_else(|| {
            FetchError::Decode(format!("{}: response carries neither result nor error", method))
        })?;
        serde_json::from_value(result).map_err(|e| FetchError::Decode(format!("{}: {}", method, e)))
    }
}

fn parse_url(what: &str, raw: &str) -> Result<Url, ScanError> {
    Url::parse(raw).map_err(|e| ScanError::InvalidConfig(format!("{} '{}': {}", what, raw, e)))
}

fn transport_error(method: &str, err: reqwest::Error) -> FetchError {
    if err.is_timeout() {
        FetchError::Transient(format!("{}: request timed out", method))
    } else {
        FetchError::Transient(format!("{}: {}", method, err))
    }
}

/// Throttling and server faults are worth another try. Refusals of the
/// route itself are not.
fn status_error(method: &str, status: StatusCode) -> FetchError {
    let detail = format!("{}: HTTP {}", method, status);
    match status {
        StatusCode::UNAUTHORIZED
        | StatusCode::FORBIDDEN
        | StatusCode::NOT_FOUND
        | StatusCode::METHOD_NOT_ALLOWED
        | StatusCode::GONE => FetchError::Unsupported(detail),
        _ => FetchError::Transient(detail),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fast_index_needs_a_credential() {
        let client = RpcClient::create(ClientConfig::default()).unwrap();
        assert!(!client.has_fast_index());
        assert_eq!(client.host(), Some("api.mainnet-beta.solana.com"));

        let client = RpcClient::create(ClientConfig::default().with_api_key("")).unwrap();
        assert!(!client.has_fast_index());
    }

    #[test]
    fn credential_goes_into_the_query() {
        let client = RpcClient::create(
            ClientConfig::default()
                .with_fast_index_url("https://index.example.com/")
                .with_api_key("s3cret"),
        )
        .unwrap();
        let url = client.fast_index_url.as_ref().unwrap();
        assert_eq!(url.as_str(), "https://index.example.com/?api-key=s3cret");
    }

    #[test]
    fn bad_url_is_invalid_config() {
        let err = RpcClient::create(ClientConfig::new("not a url")).err().unwrap();
        assert!(matches!(err, ScanError::InvalidConfig(_)));
    }

    #[test]
    fn debug_output_redacts_the_key() {
        let config = ClientConfig::default().with_api_key("s3cret");
        let printed = format!("{:?}", config);
        assert!(!printed.contains("s3cret"));
        assert!(printed.contains("<redacted>"));
    }

    #[test]
    fn status_classification() {
        assert!(status_error("m", StatusCode::TOO_MANY_REQUESTS).is_transient());
        assert!(status_error("m", StatusCode::BAD_GATEWAY).is_transient());
        assert!(status_error("m", StatusCode::GONE).is_unsupported());
    }

    #[test]
    fn config_deserializes_with_defaults() {
        let config: ClientConfig =
            serde_json::from_str(r#"{"rpcUrl":"http://localhost:8899","apiKey":"k"}"#).unwrap();
        assert_eq!(config.rpc_url, "http://localhost:8899");
        assert_eq!(config.timeout(), DEFAULT_REQUEST_TIMEOUT);
        assert_eq!(config.fast_index_url, DEFAULT_FAST_INDEX_URL);
    }
}
