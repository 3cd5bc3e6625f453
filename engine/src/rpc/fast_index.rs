//! Fast-index backend: a cursor-paged "token accounts by mint" method that
//! returns already-decoded accounts. Preferred whenever a credential is
//! configured.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use tracing::debug;

use crate::error::FetchError;
use crate::fetch::{retain_valid, ContinuationMode, PageFetcher};
use crate::model::{PageRequest, PageResult};
use crate::rpc::decode::{decode_indexed, TokenAccountsPage};
use crate::rpc::RpcClient;

pub struct FastIndexFetcher {
    client: Arc<RpcClient>,
    /// Used for entries that do not carry their own decimals.
    decimals: Option<u8>,
}

impl FastIndexFetcher {
    pub fn new(client: Arc<RpcClient>) -> Self {
        Self {
            client,
            decimals: None,
        }
    }

    pub fn with_decimals(mut self, decimals: Option<u8>) -> Self {
        self.decimals = decimals;
        self
    }

    fn params(request: &PageRequest) -> Value {
        let mut params = Map::new();
        params.insert("mint".into(), json!(request.token));
        if let Some(limit) = request.page_size {
            params.insert("limit".into(), json!(limit));
        }
        if let Some(cursor) = &request.continuation {
            params.insert("cursor".into(), json!(cursor));
        }
        Value::Object(params)
    }
}

#[async_trait]
impl PageFetcher for FastIndexFetcher {
    fn name(&self) -> &str {
        "fast-index"
    }

    fn continuation_mode(&self) -> ContinuationMode {
        ContinuationMode::Cursor
    }

    async fn fetch(&self, request: &PageRequest) -> Result<PageResult, FetchError> {
        if request.filter.prefix.is_some() {
            return Err(FetchError::Unsupported(
                "fast index cannot filter by key prefix".into(),
            ));
        }

        let page: TokenAccountsPage = self
            .client
            .call_fast_index("getTokenAccounts", Self::params(request))
            .await?;

        let raw_entries = page.token_accounts.len();
        let last_key = page
            .token_accounts
            .last()
            .and_then(|e| e.get("address"))
            .and_then(Value::as_str)
            .map(str::to_string);
        let decimals = self.decimals;
        let (records, malformed) = retain_valid(
            self.name(),
            page.token_accounts.iter().map(|e| decode_indexed(e, decimals)),
        );

        debug!(
            raw_entries,
            holders = records.len(),
            malformed,
            total = ?page.total,
            has_cursor = page.cursor.is_some(),
            "token accounts page decoded"
        );

        Ok(PageResult {
            records,
            continuation: page.cursor.filter(|c| !c.is_empty()),
            raw_entries,
            last_key,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::FilterSpec;

    #[test]
    fn params_carry_cursor_only_when_continuing() {
        let first = PageRequest::first("Mint", FilterSpec::token_accounts("Mint"), Some(1000));
        let params = FastIndexFetcher::params(&first);
        assert_eq!(params["mint"], "Mint");
        assert_eq!(params["limit"], 1000);
        assert!(params.get("cursor").is_none());

        let next = first.next("abc".into());
        assert_eq!(FastIndexFetcher::params(&next)["cursor"], "abc");
    }
}
