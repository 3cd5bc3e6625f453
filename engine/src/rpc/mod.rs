//! # JSON-RPC Backends
//!
//! Wire types for JSON-RPC 2.0, the [`RpcClient`] handle that owns the HTTP
//! connection pool, and the concrete fetchers built on it.
//!
//! ## Method Index
//!
//! | Method                     | Used by                                  |
//! |----------------------------|------------------------------------------|
//! | `getProgramAccounts`       | [`LedgerIndex`] pages, key listing       |
//! | `getMultipleAccounts`      | [`LedgerIndex`] chunk loads, owner lookup |
//! | `getTokenLargestAccounts`  | [`LedgerIndex`] ranking                  |
//! | `getTokenSupply`           | [`LedgerIndex::token_supply`]            |
//! | `getTokenAccounts`         | [`FastIndexFetcher`]                     |

pub mod client;
pub mod decode;
pub mod fast_index;
pub mod ledger;

use serde::{Deserialize, Serialize};

use crate::error::FetchError;

pub use client::{ClientConfig, RpcClient};
pub use fast_index::FastIndexFetcher;
pub use ledger::{LedgerIndex, PagingDialect, TokenSupply};

// ---------------------------------------------------------------------------
// Request / Response
// ---------------------------------------------------------------------------

/// A JSON-RPC 2.0 request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcRequest {
    /// Always "2.0".
    pub jsonrpc: String,
    /// Echoed back in the response.
    pub id: serde_json::Value,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

impl RpcRequest {
    pub fn new(id: serde_json::Value, method: impl Into<String>, params: serde_json::Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            method: method.into(),
            params,
        }
    }
}

/// A JSON-RPC 2.0 response. Exactly one of `result` and `error` is set by
/// a conforming server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcResponse {
    #[serde(default)]
    pub jsonrpc: Option<String>,
    #[serde(default)]
    pub id: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// JSON-RPC 2.0 error object.
///
/// Standard codes:
/// - `-32700`: Parse error
/// - `-32600`: Invalid request
/// - `-32601`: Method not found
/// - `-32602`: Invalid params
/// - `-32603`: Internal error
/// - `-32000` to `-32099`: Server error (application-specific)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

pub const METHOD_NOT_FOUND: i64 = -32601;
pub const INVALID_PARAMS: i64 = -32602;

/// Phrases backends use when refusing a method or parameter outright.
const REFUSAL_PHRASES: [&str; 6] = [
    "not supported",
    "unsupported",
    "excluded",
    "disabled",
    "unknown field",
    "not available",
];

impl RpcError {
    /// Whether the server refused the request shape rather than failing
    /// to serve it.
    pub fn is_refusal(&self) -> bool {
        if self.code == METHOD_NOT_FOUND || self.code == INVALID_PARAMS {
            return true;
        }
        let message = self.message.to_ascii_lowercase();
        REFUSAL_PHRASES.iter().any(|p| message.contains(p))
    }

    /// Maps the error onto the fetch taxonomy.
    pub fn classify(&self, method: &str) -> FetchError {
        let detail = format!("{} returned {}: {}", method, self.code, self.message);
        if self.is_refusal() {
            FetchError::Unsupported(detail)
        } else {
            FetchError::Transient(detail)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn err(code: i64, message: &str) -> RpcError {
        RpcError {
            code,
            message: message.to_string(),
            data: None,
        }
    }

    #[test]
    fn request_serializes_as_jsonrpc_2() {
        let req = RpcRequest::new(serde_json::json!("id-1"), "getTokenSupply", serde_json::json!(["Mint"]));
        let value = serde_json::to_value(&req).unwrap();
        assert_eq!(value["jsonrpc"], "2.0");
        assert_eq!(value["method"], "getTokenSupply");
        assert_eq!(value["params"][0], "Mint");
    }

    #[test]
    fn response_without_jsonrpc_field_still_decodes() {
        let resp: RpcResponse =
            serde_json::from_str(r#"{"id":1,"error":{"code":-32000,"message":"busy"}}"#).unwrap();
        assert!(resp.result.is_none());
        assert_eq!(resp.error.map(|e| e.code), Some(-32000));
    }

    #[test]
    fn refusals_map_to_unsupported() {
        assert!(err(METHOD_NOT_FOUND, "Method not found").classify("m").is_unsupported());
        assert!(err(INVALID_PARAMS, "Invalid params: unknown field `limit`").classify("m").is_unsupported());
        assert!(err(-32010, "TokenkegQ excluded from account secondary indexes")
            .classify("m")
            .is_unsupported());
        assert!(err(-32000, "pagination not supported").classify("m").is_unsupported());
    }

    #[test]
    fn other_errors_are_transient() {
        let classified = err(-32005, "Node is behind by 42 slots").classify("getProgramAccounts");
        assert!(classified.is_transient());
        assert!(classified.to_string().contains("getProgramAccounts returned -32005"));
    }
}
