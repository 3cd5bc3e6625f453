//! Ledger index backend over the standard account-query methods.
//!
//! `getProgramAccounts` was never designed to page. Some providers bolt
//! paging on with `limit` + `before`, one uses `pageKey`, and the rest
//! return everything in one response or refuse outright. [`PagingDialect`]
//! says which bolt-on to speak; the controller works out the rest.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::{debug, warn};

use crate::config::{DEFAULT_DELAY_MS, KEY_LENGTH, MAX_KEYS_PER_CALL, TOKEN_PROGRAM_ID};
use crate::error::{FetchError, ScanError};
use crate::fetch::{retain_valid, ContinuationMode, KeyListing, PageFetcher, RankingSource};
use crate::model::{FilterSpec, HolderRecord, PageRequest, PageResult};
use crate::rpc::decode::{
    decode_account, decode_keyed, entry_key, LargestAccounts, MultipleAccounts, ProgramAccounts,
    SupplyEnvelope,
};
use crate::rpc::RpcClient;

/// How paging parameters are spelled on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PagingDialect {
    /// `limit` + `before: <last account key>`. No cursor comes back.
    LimitBefore,
    /// `pageSize` + `pageKey`, with the next `pageKey` in the response.
    PageKey,
}

impl PagingDialect {
    /// Picks the dialect a host is known to speak.
    pub fn detect(host: Option<&str>) -> Self {
        match host {
            Some(h) if h.contains("alchemy.com") => PagingDialect::PageKey,
            _ => PagingDialect::LimitBefore,
        }
    }
}

/// Circulating supply of a mint.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenSupply {
    pub ui_amount: f64,
    pub decimals: u8,
}

/// Checks that `key` is base-58 text of a 32-byte ledger key.
pub fn validate_key(key: &str) -> Result<(), ScanError> {
    let bytes = bs58::decode(key)
        .into_vec()
        .map_err(|e| ScanError::InvalidConfig(format!("'{}' is not base-58: {}", key, e)))?;
    if bytes.len() != KEY_LENGTH {
        return Err(ScanError::InvalidConfig(format!(
            "'{}' decodes to {} bytes, expected {}",
            key,
            bytes.len(),
            KEY_LENGTH
        )));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// LedgerIndex
// ---------------------------------------------------------------------------

pub struct LedgerIndex {
    client: Arc<RpcClient>,
    dialect: PagingDialect,
    /// Pause between the batches of one `fetch_accounts` call.
    delay: Duration,
}

impl LedgerIndex {
    pub fn new(client: Arc<RpcClient>) -> Self {
        let dialect = PagingDialect::detect(client.host());
        Self {
            client,
            dialect,
            delay: Duration::from_millis(DEFAULT_DELAY_MS),
        }
    }

    pub fn with_dialect(mut self, dialect: PagingDialect) -> Self {
        self.dialect = dialect;
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn dialect(&self) -> PagingDialect {
        self.dialect
    }

    /// Circulating supply, for percent-of-supply reporting and for
    /// normalizing raw amounts from the fast index.
    pub async fn token_supply(&self, token: &str) -> Result<TokenSupply, FetchError> {
        let supply: SupplyEnvelope = self.client.call("getTokenSupply", json!([token])).await?;
        let ui_amount = supply
            .value
            .human()
            .map_err(|e| FetchError::Decode(format!("getTokenSupply: {}", e)))?;
        Ok(TokenSupply {
            ui_amount,
            decimals: supply.value.decimals,
        })
    }

    /// The `getProgramAccounts` config object for one page request.
    fn page_config(&self, request: &PageRequest) -> Result<Value, FetchError> {
        if let Some(prefix) = &request.filter.prefix {
            return Err(FetchError::Unsupported(format!(
                "ledger index cannot filter by {} prefix '{}'",
                prefix.field, prefix.prefix
            )));
        }

        let mut config = Map::new();
        config.insert("encoding".into(), json!("jsonParsed"));
        config.insert("filters".into(), filters(&request.filter));

        match self.dialect {
            PagingDialect::LimitBefore => {
                if let Some(limit) = request.page_size {
                    config.insert("limit".into(), json!(limit));
                }
                if let Some(before) = &request.continuation {
                    config.insert("before".into(), json!(before));
                }
            }
            PagingDialect::PageKey => {
                config.insert("withContext".into(), json!(true));
                config.insert("order".into(), json!("asc"));
                if let Some(size) = request.page_size {
                    config.insert("pageSize".into(), json!(size));
                }
                if let Some(key) = &request.continuation {
                    config.insert("pageKey".into(), json!(key));
                }
            }
        }
        Ok(Value::Object(config))
    }
}

/// Wire form of a [`FilterSpec`] without its prefix constraint.
fn filters(filter: &FilterSpec) -> Value {
    let mut out = Vec::new();
    if let Some(size) = filter.data_size {
        out.push(json!({ "dataSize": size }));
    }
    for eq in &filter.equals {
        out.push(json!({ "memcmp": { "offset": eq.offset, "bytes": eq.bytes } }));
    }
    Value::Array(out)
}

#[async_trait]
impl PageFetcher for LedgerIndex {
    fn name(&self) -> &str {
        "ledger-index"
    }

    fn continuation_mode(&self) -> ContinuationMode {
        match self.dialect {
            PagingDialect::LimitBefore => ContinuationMode::KeyOffset,
            PagingDialect::PageKey => ContinuationMode::Cursor,
        }
    }

    async fn fetch(&self, request: &PageRequest) -> Result<PageResult, FetchError> {
        let config = self.page_config(request)?;
        let listing: ProgramAccounts = self
            .client
            .call("getProgramAccounts", json!([TOKEN_PROGRAM_ID, config]))
            .await?;

        let (entries, page_key) = listing.into_parts();
        let raw_entries = entries.len();
        let last_key = entries.last().and_then(entry_key).map(str::to_string);
        let (records, malformed) = retain_valid(self.name(), entries.iter().map(decode_keyed));

        debug!(
            dialect = ?self.dialect,
            raw_entries,
            holders = records.len(),
            malformed,
            "program accounts page decoded"
        );

        let continuation = match self.dialect {
            PagingDialect::PageKey => page_key,
            PagingDialect::LimitBefore => None,
        };
        Ok(PageResult {
            records,
            continuation,
            raw_entries,
            last_key,
        })
    }
}

#[async_trait]
impl KeyListing for LedgerIndex {
    async fn list_keys(&self, token: &str) -> Result<Vec<String>, FetchError> {
        let config = json!({
            "encoding": "base64",
            "dataSlice": { "offset": 0, "length": 0 },
            "filters": filters(&FilterSpec::token_accounts(token)),
        });
        let listing: ProgramAccounts = self
            .client
            .call("getProgramAccounts", json!([TOKEN_PROGRAM_ID, config]))
            .await?;

        let (entries, _) = listing.into_parts();
        let total = entries.len();
        let keys: Vec<String> = entries
            .iter()
            .filter_map(|e| entry_key(e).map(str::to_string))
            .collect();
        if keys.len() < total {
            warn!(skipped = total - keys.len(), "key listing entries without a pubkey");
        }
        Ok(keys)
    }

    async fn fetch_accounts(&self, keys: &[String]) -> Result<Vec<HolderRecord>, FetchError> {
        let mut records = Vec::with_capacity(keys.len());
        for (i, batch) in keys.chunks(MAX_KEYS_PER_CALL).enumerate() {
            if i > 0 {
                tokio::time::sleep(self.delay).await;
            }
            let accounts: MultipleAccounts = self
                .client
                .call("getMultipleAccounts", json!([batch, { "encoding": "jsonParsed" }]))
                .await?;
            if accounts.value.len() != batch.len() {
                return Err(FetchError::Decode(format!(
                    "getMultipleAccounts returned {} slots for {} keys",
                    accounts.value.len(),
                    batch.len()
                )));
            }

            let missing = accounts.value.iter().filter(|slot| slot.is_none()).count();
            let decoded = batch
                .iter()
                .zip(&accounts.value)
                .filter_map(|(key, slot)| slot.as_ref().map(|v| decode_account(key, v)));
            let (batch_records, malformed) = retain_valid("ledger-index", decoded);
            debug!(
                batch = i + 1,
                keys = batch.len(),
                holders = batch_records.len(),
                missing,
                malformed,
                "account batch decoded"
            );
            records.extend(batch_records);
        }
        Ok(records)
    }
}

#[async_trait]
impl RankingSource for LedgerIndex {
    async fn largest(&self, token: &str, limit: usize) -> Result<Vec<HolderRecord>, FetchError> {
        let largest: LargestAccounts = self
            .client
            .call("getTokenLargestAccounts", json!([token, { "commitment": "confirmed" }]))
            .await?;
        let addresses: Vec<String> = largest
            .value
            .into_iter()
            .take(limit)
            .map(|a| a.address)
            .collect();
        // The ranking carries no owners; resolve them in one batch.
        self.fetch_accounts(&addresses).await
    }
}
