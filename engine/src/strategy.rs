//! # Strategies
//!
//! One capability interface, [`Strategy`], and the three ways of answering
//! "who holds this token" built on it. The orchestrator only ever sees
//! `dyn Strategy`; which controllers and backends sit behind one is fixed
//! when the chain is assembled.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::aggregate::Aggregator;
use crate::error::FetchError;
use crate::fetch::{KeyListing, PageFetcher, RankingSource};
use crate::model::{FilterSpec, HolderRecord, PageRequest, ShardKey};
use crate::pagination::{PageTrace, PaginationConfig, PaginationController, PaginationOutcome};
use crate::sharding::{
    chunk_shards, prefix_plan_is_complete, prefix_shards, ChunkShardSource, ShardConfig,
    ShardOutcome, ShardSource, ShardingController,
};

// ---------------------------------------------------------------------------
// Interface
// ---------------------------------------------------------------------------

/// What one successful strategy attempt produced.
#[derive(Debug, Clone, Default, Serialize)]
pub struct StrategyOutput {
    /// Deduplicated, sorted by amount descending.
    pub records: Vec<HolderRecord>,
    pub partial: bool,
    /// Human-readable reasons the result may be incomplete.
    pub partial_reasons: Vec<String>,
    pub pagination: Option<PaginationOutcome>,
    pub sharding: Option<ShardOutcome>,
}

impl StrategyOutput {
    fn from_sink(sink: Aggregator) -> Self {
        Self {
            records: sink.materialize(),
            ..Self::default()
        }
    }

    fn flag_partial(&mut self, reason: impl Into<String>) {
        self.partial = true;
        self.partial_reasons.push(reason.into());
    }

    /// Page traces, empty for strategies that do not paginate.
    pub fn traces(&self) -> &[PageTrace] {
        self.pagination.as_ref().map_or(&[], |p| p.traces.as_slice())
    }
}

/// One way of enumerating the holders of a token.
///
/// `attempt` either returns a (possibly partial) holder set or the error
/// that made the strategy give up. It must check `shutdown` at every loop
/// boundary and return what it has once it fires.
#[async_trait]
pub trait Strategy: Send + Sync {
    fn name(&self) -> &str;

    async fn attempt(
        &self,
        token: &str,
        shutdown: &watch::Receiver<bool>,
    ) -> Result<StrategyOutput, FetchError>;
}

// ---------------------------------------------------------------------------
// Cursor pagination
// ---------------------------------------------------------------------------

/// Pages through a [`PageFetcher`] with the pagination controller.
pub struct CursorPagination {
    name: String,
    fetcher: Arc<dyn PageFetcher>,
    config: PaginationConfig,
}

impl CursorPagination {
    pub fn new(name: impl Into<String>, fetcher: Arc<dyn PageFetcher>, config: PaginationConfig) -> Self {
        Self {
            name: name.into(),
            fetcher,
            config,
        }
    }
}

#[async_trait]
impl Strategy for CursorPagination {
    fn name(&self) -> &str {
        &self.name
    }

    async fn attempt(
        &self,
        token: &str,
        shutdown: &watch::Receiver<bool>,
    ) -> Result<StrategyOutput, FetchError> {
        let request = PageRequest::first(
            token,
            FilterSpec::token_accounts(token),
            Some(self.config.page_size),
        );
        let mut sink = Aggregator::new();
        let outcome = PaginationController::new(self.fetcher.as_ref(), self.config.clone())
            .with_shutdown(shutdown.clone())
            .run(request, &mut sink)
            .await?;

        let mut output = StrategyOutput::from_sink(sink);
        if outcome.partial {
            output.flag_partial(format!(
                "{} after {} pages",
                outcome.stop_reason.describe(),
                outcome.pages
            ));
        }
        output.pagination = Some(outcome);
        Ok(output)
    }
}

// ---------------------------------------------------------------------------
// Sharded scan
// ---------------------------------------------------------------------------

enum ShardPlan {
    /// The first `n` alphabet symbols.
    Prefixes(usize),
    /// Every listed key, cut into buckets.
    Chunks {
        listing: Arc<dyn KeyListing>,
        chunk_size: usize,
        max_accounts: Option<usize>,
    },
}

/// Runs the sharding controller over a prefix or key-set plan.
pub struct ShardedScan {
    name: String,
    source: Arc<dyn ShardSource>,
    plan: ShardPlan,
    config: ShardConfig,
}

impl ShardedScan {
    /// Prefix sharding over the first `max_prefixes` alphabet symbols.
    pub fn prefixes(source: Arc<dyn ShardSource>, max_prefixes: usize, config: ShardConfig) -> Self {
        Self {
            name: format!("sharded:{}", source.name()),
            source,
            plan: ShardPlan::Prefixes(max_prefixes),
            config,
        }
    }

    /// Lists every account key, then loads them `chunk_size` at a time.
    pub fn chunked(
        listing: Arc<dyn KeyListing>,
        chunk_size: usize,
        max_accounts: Option<usize>,
        config: ShardConfig,
    ) -> Self {
        Self {
            name: "chunked".to_string(),
            source: Arc::new(ChunkShardSource::new(listing.clone())),
            plan: ShardPlan::Chunks {
                listing,
                chunk_size,
                max_accounts,
            },
            config,
        }
    }

    async fn chunk_plan(
        &self,
        token: &str,
        listing: &dyn KeyListing,
        chunk_size: usize,
        max_accounts: Option<usize>,
        output: &mut StrategyOutput,
    ) -> Result<Vec<ShardKey>, FetchError> {
        let mut keys = listing.list_keys(token).await?;
        info!(strategy = %self.name, accounts = keys.len(), "key listing complete");

        if let Some(max) = max_accounts {
            if keys.len() > max {
                warn!(strategy = %self.name, listed = keys.len(), max, "truncating key listing");
                output.flag_partial(format!("key listing truncated to {} of {} accounts", max, keys.len()));
                keys.truncate(max);
            }
        }
        if !keys.is_empty() {
            tokio::time::sleep(self.config.delay).await;
        }
        Ok(chunk_shards(keys, chunk_size))
    }
}

#[async_trait]
impl Strategy for ShardedScan {
    fn name(&self) -> &str {
        &self.name
    }

    async fn attempt(
        &self,
        token: &str,
        shutdown: &watch::Receiver<bool>,
    ) -> Result<StrategyOutput, FetchError> {
        let mut output = StrategyOutput::default();

        let (plan, complete) = match &self.plan {
            ShardPlan::Prefixes(n) => {
                if !prefix_plan_is_complete(*n) {
                    output.flag_partial(format!("only {} of 58 key prefixes scanned", n));
                }
                (prefix_shards(*n), prefix_plan_is_complete(*n))
            }
            ShardPlan::Chunks {
                listing,
                chunk_size,
                max_accounts,
            } => {
                let plan = self
                    .chunk_plan(token, listing.as_ref(), *chunk_size, *max_accounts, &mut output)
                    .await?;
                (plan, !output.partial)
            }
        };

        let mut sink = Aggregator::new();
        let outcome = ShardingController::new(self.source.as_ref(), self.config.clone())
            .with_shutdown(shutdown.clone())
            .run(token, &plan, complete, &mut sink)
            .await?;

        if outcome.failed_shards > 0 {
            output.flag_partial(format!(
                "{} of {} shards failed",
                outcome.failed_shards, outcome.attempted_shards
            ));
        }
        if outcome.cancelled {
            output.flag_partial("shutdown requested");
        }
        let StrategyOutput {
            partial,
            partial_reasons,
            ..
        } = output;
        Ok(StrategyOutput {
            partial: partial || outcome.partial,
            partial_reasons,
            sharding: Some(outcome),
            ..StrategyOutput::from_sink(sink)
        })
    }
}

// ---------------------------------------------------------------------------
// Top holders
// ---------------------------------------------------------------------------

/// One bounded ranking call. Never complete, by definition.
pub struct TopHolders {
    source: Arc<dyn RankingSource>,
    limit: usize,
}

impl TopHolders {
    pub fn new(source: Arc<dyn RankingSource>, limit: usize) -> Self {
        Self { source, limit }
    }
}

#[async_trait]
impl Strategy for TopHolders {
    fn name(&self) -> &str {
        "top"
    }

    async fn attempt(
        &self,
        token: &str,
        _shutdown: &watch::Receiver<bool>,
    ) -> Result<StrategyOutput, FetchError> {
        let started = std::time::Instant::now();
        let records = self.source.largest(token, self.limit).await?;
        info!(
            limit = self.limit,
            found = records.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "ranking fetched"
        );

        let mut output = StrategyOutput::from_sink(records.into_iter().collect());
        output.flag_partial(format!("capped at the largest {} accounts", self.limit));
        Ok(output)
    }
}
