//! # CLI Interface
//!
//! Command-line argument structure for `holdscan`, using `clap` derive.
//! Endpoint settings are global and can come from the environment, so a
//! credential never has to appear in shell history.

use clap::{Args, Parser, Subcommand};

use holdscan_engine::config::{
    DEFAULT_CHUNK_SIZE, DEFAULT_DELAY_MS, DEFAULT_FAST_INDEX_URL, DEFAULT_MAX_PAGES,
    DEFAULT_MAX_PREFIXES, DEFAULT_MAX_RETRIES, DEFAULT_PAGE_SIZE, DEFAULT_RPC_URL, DEFAULT_TOP_N,
};
use holdscan_engine::rpc::ClientConfig;
use holdscan_engine::{EmptyResultPolicy, ScanError, ScanOptions, ShardField, StrategyKind};

use crate::logging::LogFormat;

/// Token holder enumeration.
///
/// Lists every account holding a token, falling back across listing
/// strategies when the endpoint refuses one, and reports how complete the
/// result is.
#[derive(Parser, Debug)]
#[command(
    name = "holdscan",
    about = "Token holder enumeration for account-indexed ledgers",
    version,
    propagate_version = true
)]
pub struct HoldscanCli {
    #[command(flatten)]
    pub endpoint: EndpointArgs,

    /// Log output format.
    #[arg(long, value_enum, global = true, default_value_t = LogFormat::Pretty)]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Enumerate every holder of a token.
    Scan(ScanArgs),
    /// Show only the largest holders, with their share of supply.
    Top(TopArgs),
    /// Print version information and exit.
    Version,
}

/// Where to send requests.
#[derive(Args, Debug, Clone)]
pub struct EndpointArgs {
    /// Ledger JSON-RPC endpoint.
    #[arg(long, global = true, env = "HOLDSCAN_RPC_URL", default_value = DEFAULT_RPC_URL)]
    pub rpc_url: String,

    /// Fast-index endpoint, used only when an API key is set.
    #[arg(
        long,
        global = true,
        env = "HOLDSCAN_FAST_INDEX_URL",
        default_value = DEFAULT_FAST_INDEX_URL
    )]
    pub fast_index_url: String,

    /// Fast-index API key. Enables the cursor strategy.
    #[arg(long, global = true, env = "HOLDSCAN_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Per-request timeout in milliseconds.
    #[arg(long, global = true, default_value_t = 60_000)]
    pub timeout_ms: u64,
}

impl EndpointArgs {
    pub fn client_config(&self) -> ClientConfig {
        let config = ClientConfig {
            timeout_ms: self.timeout_ms,
            ..ClientConfig::new(self.rpc_url.clone())
        }
        .with_fast_index_url(self.fast_index_url.clone());
        match &self.api_key {
            Some(key) => config.with_api_key(key.clone()),
            None => config,
        }
    }
}

/// Arguments for the `scan` subcommand.
#[derive(Args, Debug)]
pub struct ScanArgs {
    /// Token mint address (base-58).
    pub mint: String,

    /// `auto`, or a comma-separated priority list of
    /// cursor, paged, sharded, chunked, top.
    #[arg(long, default_value = "auto")]
    pub strategy: String,

    /// Records per page request.
    #[arg(long, default_value_t = DEFAULT_PAGE_SIZE)]
    pub page_size: u32,

    /// Stop after this many pages.
    #[arg(long, default_value_t = DEFAULT_MAX_PAGES, conflicts_with = "unbounded")]
    pub max_pages: u32,

    /// Page until the endpoint runs dry.
    #[arg(long)]
    pub unbounded: bool,

    /// Alphabet symbols a sharded scan covers (58 for full coverage).
    #[arg(long, default_value_t = DEFAULT_MAX_PREFIXES)]
    pub max_prefixes: usize,

    /// Pause between remote calls, in milliseconds.
    #[arg(long, default_value_t = DEFAULT_DELAY_MS)]
    pub delay_ms: u64,

    /// Accounts per bucket in a chunked scan.
    #[arg(long, default_value_t = DEFAULT_CHUNK_SIZE)]
    pub chunk_size: usize,

    /// Cap on accounts loaded by a chunked scan.
    #[arg(long)]
    pub max_accounts: Option<usize>,

    /// Rows requested by the top-holders fallback.
    #[arg(long, default_value_t = DEFAULT_TOP_N)]
    pub top_n: usize,

    /// Retries per failed page.
    #[arg(long, default_value_t = DEFAULT_MAX_RETRIES)]
    pub max_retries: u32,

    /// Key a sharded scan partitions on: owner or account.
    #[arg(long, default_value = "owner", value_parser = parse_shard_field)]
    pub shard_field: ShardField,

    /// What to do when a strategy succeeds with nothing: accept or try-next.
    #[arg(long, default_value = "accept")]
    pub empty_policy: EmptyResultPolicy,

    /// Holder rows to print.
    #[arg(long, default_value_t = 20)]
    pub top: usize,

    /// Print the full report as JSON on stdout.
    #[arg(long)]
    pub json: bool,

    /// Print run metrics (Prometheus text format) on stderr.
    #[arg(long)]
    pub metrics: bool,
}

impl ScanArgs {
    pub fn options(&self) -> Result<ScanOptions, ScanError> {
        let options = ScanOptions {
            page_size: self.page_size,
            max_pages: (!self.unbounded).then_some(self.max_pages),
            max_prefixes: self.max_prefixes,
            delay_ms: self.delay_ms,
            strategy: StrategyKind::parse_list(&self.strategy)?,
            chunk_size: self.chunk_size,
            max_accounts: self.max_accounts,
            top_n: self.top_n,
            max_retries: self.max_retries,
            shard_field: self.shard_field,
            empty_policy: self.empty_policy,
        };
        options.validate()?;
        Ok(options)
    }
}

/// Arguments for the `top` subcommand.
#[derive(Args, Debug)]
pub struct TopArgs {
    /// Token mint address (base-58).
    pub mint: String,

    /// How many holders to show.
    #[arg(long, default_value_t = DEFAULT_TOP_N)]
    pub limit: usize,

    /// Print the report as JSON on stdout.
    #[arg(long)]
    pub json: bool,
}

fn parse_shard_field(s: &str) -> Result<ShardField, String> {
    match s.to_ascii_lowercase().as_str() {
        "owner" => Ok(ShardField::Owner),
        "account" => Ok(ShardField::Account),
        other => Err(format!("expected 'owner' or 'account', got '{}'", other)),
    }
}
