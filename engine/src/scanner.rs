//! # Holder Scanner
//!
//! Front door of the engine: turns [`ScanOptions`] and a client handle into
//! a strategy chain and runs it.
//!
//! `auto` expands to
//!
//! ```text
//!   cursor (fast index, only with a credential)
//!     -> paged (ledger index)
//!     -> chunked (key listing + batched loads)
//!     -> top (largest-N ranking)
//! ```

use std::sync::Arc;

use tokio::sync::watch;
use tracing::{info, warn};

use crate::config::{ScanOptions, StrategyKind};
use crate::error::{FetchError, ScanError};
use crate::orchestrator::{FallbackOrchestrator, ScanReport};
use crate::rpc::ledger::validate_key;
use crate::rpc::{FastIndexFetcher, LedgerIndex, RpcClient, TokenSupply};
use crate::sharding::PrefixShardSource;
use crate::strategy::{CursorPagination, ShardedScan, Strategy, TopHolders};

pub struct HolderScanner {
    client: Arc<RpcClient>,
    options: ScanOptions,
    shutdown: Option<watch::Receiver<bool>>,
}

impl HolderScanner {
    pub fn new(client: Arc<RpcClient>, options: ScanOptions) -> Result<Self, ScanError> {
        options.validate()?;
        Ok(Self {
            client,
            options,
            shutdown: None,
        })
    }

    pub fn with_shutdown(mut self, shutdown: watch::Receiver<bool>) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    pub fn options(&self) -> &ScanOptions {
        &self.options
    }

    fn ledger(&self) -> Arc<LedgerIndex> {
        Arc::new(LedgerIndex::new(self.client.clone()).with_delay(self.options.delay()))
    }

    pub async fn token_supply(&self, token: &str) -> Result<TokenSupply, FetchError> {
        self.ledger().token_supply(token).await
    }

    /// The configured strategy list with `auto` expanded.
    pub fn chain_kinds(&self) -> Vec<StrategyKind> {
        if self.options.strategy == [StrategyKind::Auto] {
            let mut kinds = Vec::with_capacity(4);
            if self.client.has_fast_index() {
                kinds.push(StrategyKind::Cursor);
            }
            kinds.extend([StrategyKind::Paged, StrategyKind::Chunked, StrategyKind::Top]);
            return kinds;
        }
        self.options.strategy.clone()
    }

    /// Builds the strategy chain for `token`.
    ///
    /// When the fast index is in the chain the mint's decimals are looked
    /// up first, so raw amounts can be normalized even for entries that do
    /// not carry their own.
    pub async fn build_chain(&self, token: &str) -> Vec<Box<dyn Strategy>> {
        let kinds = self.chain_kinds();
        let ledger = self.ledger();
        let decimals = if kinds.contains(&StrategyKind::Cursor) && self.client.has_fast_index() {
            match ledger.token_supply(token).await {
                Ok(supply) => Some(supply.decimals),
                Err(err) => {
                    warn!(error = %err, "could not resolve decimals, fast-index amounts used as returned");
                    None
                }
            }
        } else {
            None
        };

        let opts = &self.options;
        kinds
            .into_iter()
            .filter_map(|kind| -> Option<Box<dyn Strategy>> {
                match kind {
                    StrategyKind::Cursor => {
                        let fetcher = FastIndexFetcher::new(self.client.clone()).with_decimals(decimals);
                        Some(Box::new(CursorPagination::new(
                            "cursor",
                            Arc::new(fetcher),
                            opts.pagination_config(),
                        )))
                    }
                    StrategyKind::Paged => Some(Box::new(CursorPagination::new(
                        "paged",
                        ledger.clone(),
                        opts.pagination_config(),
                    ))),
                    StrategyKind::Sharded => {
                        let source = PrefixShardSource::new(ledger.clone(), opts.shard_field, None);
                        Some(Box::new(ShardedScan::prefixes(
                            Arc::new(source),
                            opts.max_prefixes,
                            opts.shard_config(),
                        )))
                    }
                    StrategyKind::Chunked => Some(Box::new(ShardedScan::chunked(
                        ledger.clone(),
                        opts.chunk_size,
                        opts.max_accounts,
                        opts.shard_config(),
                    ))),
                    StrategyKind::Top => Some(Box::new(TopHolders::new(ledger.clone(), opts.top_n))),
                    // validate() keeps auto from appearing alongside others.
                    StrategyKind::Auto => None,
                }
            })
            .collect()
    }

    /// Enumerates every holder of `token`.
    pub async fn scan(&self, token: &str) -> Result<ScanReport, ScanError> {
        validate_key(token)?;
        let chain = self.build_chain(token).await;
        info!(token, strategies = chain.len(), "scan chain assembled");
        self.orchestrator(chain).run(token).await
    }

    /// Only the `limit` largest holders, in one ranking call.
    pub async fn top(&self, token: &str, limit: usize) -> Result<ScanReport, ScanError> {
        validate_key(token)?;
        if limit == 0 {
            return Err(ScanError::InvalidConfig("limit must be at least 1".into()));
        }
        let chain: Vec<Box<dyn Strategy>> = vec![Box::new(TopHolders::new(self.ledger(), limit))];
        self.orchestrator(chain).run(token).await
    }

    fn orchestrator(&self, chain: Vec<Box<dyn Strategy>>) -> FallbackOrchestrator {
        let orchestrator = FallbackOrchestrator::new(chain).with_policy(self.options.empty_policy);
        match &self.shutdown {
            Some(rx) => orchestrator.with_shutdown(rx.clone()),
            None => orchestrator,
        }
    }
}
