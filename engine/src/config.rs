//! # Constants & Run Options
//!
//! Every tunable default lives here, next to [`ScanOptions`], the one struct
//! a caller fills in to describe a run. Controllers take their own small
//! config structs; `ScanOptions` knows how to produce each of them.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ScanError;
use crate::pagination::PaginationConfig;
use crate::sharding::ShardConfig;

pub use crate::model::KeyField as ShardField;

// ---------------------------------------------------------------------------
// Ledger layout
// ---------------------------------------------------------------------------

/// Program that owns every fungible token account.
pub const TOKEN_PROGRAM_ID: &str = "TokenkegQfeZyiNwAJbNbGKPFXCWuBvf9Ss623VQ5DA";

/// Size in bytes of a token account. Anything else under the token program
/// is a mint or a multisig and is filtered out server-side.
pub const TOKEN_ACCOUNT_DATA_SIZE: usize = 165;

/// The mint key sits at the very start of the account layout.
pub const MINT_OFFSET: usize = 0;

/// Decoded length of a ledger key.
pub const KEY_LENGTH: usize = 32;

/// Symbols a base-58 key can start with, in the order shards are scanned.
pub const BASE58_ALPHABET: &str = "123456789ABCDEFGHJKLMNPQRSTUVWXYZabcdefghijkmnopqrstuvwxyz";

/// Public endpoint used when nothing else is configured. Rate limits are
/// tight and `getProgramAccounts` on popular mints will be refused.
pub const DEFAULT_RPC_URL: &str = "https://api.mainnet-beta.solana.com";

/// Fast-index service. The credential travels as the `api-key` query
/// parameter.
pub const DEFAULT_FAST_INDEX_URL: &str = "https://mainnet.helius-rpc.com";

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

/// Records requested per page.
pub const DEFAULT_PAGE_SIZE: u32 = 1000;

/// Page budget for a single paginated run.
pub const DEFAULT_MAX_PAGES: u32 = 100;

/// Alphabet symbols scanned by a prefix-sharded run.
pub const DEFAULT_MAX_PREFIXES: usize = 10;

/// Minimum pause between two consecutive remote calls.
pub const DEFAULT_DELAY_MS: u64 = 100;

/// Accounts per bucket in a chunked scan.
pub const DEFAULT_CHUNK_SIZE: usize = 5000;

/// Rows requested from the ranking service.
pub const DEFAULT_TOP_N: usize = 20;

/// Retries for one failed page before the controller gives up.
pub const DEFAULT_MAX_RETRIES: u32 = 2;

/// `getMultipleAccounts` refuses more keys than this in one call.
pub const MAX_KEYS_PER_CALL: usize = 100;

/// Per-request HTTP timeout.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Quantity thresholds reported by the summary.
pub const DISTRIBUTION_THRESHOLDS: [f64; 5] = [1_000_000.0, 100_000.0, 10_000.0, 1_000.0, 100.0];

// ---------------------------------------------------------------------------
// Strategy selection
// ---------------------------------------------------------------------------

/// Retrieval strategies a run can be built from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StrategyKind {
    /// The default chain: fast index (when credentialed), paged ledger
    /// listing, chunked scan, top-N.
    Auto,
    /// Cursor pagination over the fast-index service.
    Cursor,
    /// Paged `getProgramAccounts` on the ledger index.
    Paged,
    /// Prefix sharding over the base-58 alphabet.
    Sharded,
    /// Key listing cut into fixed-size buckets.
    Chunked,
    /// Largest-N ranking only.
    Top,
}

impl StrategyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StrategyKind::Auto => "auto",
            StrategyKind::Cursor => "cursor",
            StrategyKind::Paged => "paged",
            StrategyKind::Sharded => "sharded",
            StrategyKind::Chunked => "chunked",
            StrategyKind::Top => "top",
        }
    }

    /// Parses `"auto"` or a comma-separated priority list such as
    /// `"paged,top"`.
    pub fn parse_list(s: &str) -> Result<Vec<Self>, ScanError> {
        let kinds = s
            .split(',')
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .map(Self::from_str)
            .collect::<Result<Vec<_>, _>>()?;
        if kinds.is_empty() {
            return Err(ScanError::InvalidConfig("empty strategy list".into()));
        }
        Ok(kinds)
    }
}

impl FromStr for StrategyKind {
    type Err = ScanError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "auto" => Ok(StrategyKind::Auto),
            "cursor" | "fast-index" => Ok(StrategyKind::Cursor),
            "paged" | "paginated" => Ok(StrategyKind::Paged),
            "sharded" | "prefix" => Ok(StrategyKind::Sharded),
            "chunked" | "manual" => Ok(StrategyKind::Chunked),
            "top" | "top-holders" => Ok(StrategyKind::Top),
            other => Err(ScanError::InvalidConfig(format!("unknown strategy '{}'", other))),
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the orchestrator does when a strategy succeeds with zero records.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EmptyResultPolicy {
    /// An empty success is a success. Stop there.
    #[default]
    Accept,
    /// Treat an empty success as inconclusive and keep going. If every
    /// strategy comes back empty, the last empty result is returned.
    TryNext,
}

impl FromStr for EmptyResultPolicy {
    type Err = ScanError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "accept" => Ok(EmptyResultPolicy::Accept),
            "try-next" | "next" => Ok(EmptyResultPolicy::TryNext),
            other => Err(ScanError::InvalidConfig(format!(
                "unknown empty-result policy '{}'",
                other
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// ScanOptions
// ---------------------------------------------------------------------------

/// Everything a caller can tune about one enumeration run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ScanOptions {
    /// Records per page request.
    pub page_size: u32,
    /// Page budget. `None` pages until the backend runs dry.
    pub max_pages: Option<u32>,
    /// How many alphabet symbols a sharded run covers.
    pub max_prefixes: usize,
    /// Pause between consecutive remote calls, in milliseconds.
    pub delay_ms: u64,
    /// Strategy priority list.
    pub strategy: Vec<StrategyKind>,
    /// Bucket size for chunked scans.
    pub chunk_size: usize,
    /// Truncates the key listing of a chunked scan.
    pub max_accounts: Option<usize>,
    /// Rows requested from the ranking service.
    pub top_n: usize,
    /// Retries per failed page.
    pub max_retries: u32,
    /// Key a sharded run partitions on.
    pub shard_field: ShardField,
    pub empty_policy: EmptyResultPolicy,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            max_pages: Some(DEFAULT_MAX_PAGES),
            max_prefixes: DEFAULT_MAX_PREFIXES,
            delay_ms: DEFAULT_DELAY_MS,
            strategy: vec![StrategyKind::Auto],
            chunk_size: DEFAULT_CHUNK_SIZE,
            max_accounts: None,
            top_n: DEFAULT_TOP_N,
            max_retries: DEFAULT_MAX_RETRIES,
            shard_field: ShardField::Owner,
            empty_policy: EmptyResultPolicy::Accept,
        }
    }
}

impl ScanOptions {
    /// Rejects options no strategy could run with.
    pub fn validate(&self) -> Result<(), ScanError> {
        let invalid = |msg: &str| Err(ScanError::InvalidConfig(msg.to_string()));

        if self.page_size == 0 {
            return invalid("pageSize must be at least 1");
        }
        if self.max_pages == Some(0) {
            return invalid("maxPages must be at least 1 when set");
        }
        let alphabet_len = BASE58_ALPHABET.chars().count();
        if self.max_prefixes == 0 || self.max_prefixes > alphabet_len {
            return Err(ScanError::InvalidConfig(format!(
                "maxPrefixes must be between 1 and {}",
                alphabet_len
            )));
        }
        if self.chunk_size == 0 {
            return invalid("chunkSize must be at least 1");
        }
        if self.max_accounts == Some(0) {
            return invalid("maxAccounts must be at least 1 when set");
        }
        if self.top_n == 0 {
            return invalid("topN must be at least 1");
        }
        if self.strategy.is_empty() {
            return invalid("strategy list is empty");
        }
        if self.strategy.len() > 1 && self.strategy.contains(&StrategyKind::Auto) {
            return invalid("'auto' cannot be combined with other strategies");
        }
        Ok(())
    }

    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }

    pub fn pagination_config(&self) -> PaginationConfig {
        PaginationConfig {
            page_size: self.page_size,
            max_pages: self.max_pages,
            delay: self.delay(),
            max_retries: self.max_retries,
        }
    }

    pub fn shard_config(&self) -> ShardConfig {
        ShardConfig {
            delay: self.delay(),
            max_shards: None,
        }
    }
}
