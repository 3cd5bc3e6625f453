//! # Fallback Orchestrator
//!
//! Tries strategies strictly in priority order. Any failure is logged and
//! recorded, then the next strategy gets its turn. The first strategy that
//! returns without failing wins, even with an empty result, unless the
//! [`EmptyResultPolicy`] says an empty success should keep the chain going.
//!
//! When nothing succeeds the caller gets one
//! [`ScanError::ExhaustedStrategies`] with every strategy's failure.

use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::watch;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::EmptyResultPolicy;
use crate::error::{ScanError, StrategyFailure};
use crate::model::HolderRecord;
use crate::pagination::{PageTrace, StopReason};
use crate::sharding::ShardFailure;
use crate::stats::{summarize, Summary};
use crate::strategy::{Strategy, StrategyOutput};

// ---------------------------------------------------------------------------
// Run metadata
// ---------------------------------------------------------------------------

/// Everything a caller needs to judge how far to trust a result.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunMetadata {
    pub run_id: Uuid,
    pub token: String,
    pub started_at: DateTime<Utc>,
    pub elapsed_ms: u64,
    /// Strategy whose result was returned.
    pub strategy_used: String,
    /// Every strategy tried, in order, the winner included.
    pub attempted: Vec<String>,
    pub failures: Vec<StrategyFailure>,
    /// Strategies that succeeded empty and were passed over.
    pub empty_skipped: Vec<String>,
    pub pages_fetched: u32,
    pub page_calls: u32,
    pub failed_page_calls: u32,
    pub stop_reason: Option<StopReason>,
    pub shards_attempted: usize,
    pub successful_shards: usize,
    pub failed_shards: usize,
    pub shard_failures: Vec<ShardFailure>,
    pub partial: bool,
    pub partial_reasons: Vec<String>,
    pub traces: Vec<PageTrace>,
}

impl RunMetadata {
    /// Blank metadata for a run over `token`, stamped with a fresh run id.
    pub fn new(token: &str) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            token: token.to_string(),
            started_at: Utc::now(),
            elapsed_ms: 0,
            strategy_used: String::new(),
            attempted: Vec::new(),
            failures: Vec::new(),
            empty_skipped: Vec::new(),
            pages_fetched: 0,
            page_calls: 0,
            failed_page_calls: 0,
            stop_reason: None,
            shards_attempted: 0,
            successful_shards: 0,
            failed_shards: 0,
            shard_failures: Vec::new(),
            partial: false,
            partial_reasons: Vec::new(),
            traces: Vec::new(),
        }
    }

    fn absorb(&mut self, strategy: &str, output: &mut StrategyOutput) {
        self.strategy_used = strategy.to_string();
        self.partial = output.partial;
        self.partial_reasons = std::mem::take(&mut output.partial_reasons);
        if let Some(pages) = output.pagination.take() {
            self.pages_fetched = pages.pages;
            self.page_calls = pages.fetch_calls;
            self.failed_page_calls = pages.failed_calls;
            self.stop_reason = Some(pages.stop_reason);
            self.traces = pages.traces;
        }
        if let Some(shards) = output.sharding.take() {
            self.shards_attempted = shards.attempted_shards;
            self.successful_shards = shards.successful_shards;
            self.failed_shards = shards.failed_shards;
            self.shard_failures = shards.failures;
        }
    }
}

/// A finished run: holders sorted by amount descending, plus metadata.
#[derive(Debug, Clone, Serialize)]
pub struct ScanReport {
    pub holders: Vec<HolderRecord>,
    pub metadata: RunMetadata,
}

impl ScanReport {
    pub fn summary(&self) -> Option<Summary> {
        summarize(&self.holders)
    }

    pub fn is_partial(&self) -> bool {
        self.metadata.partial
    }
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

pub struct FallbackOrchestrator {
    strategies: Vec<Box<dyn Strategy>>,
    policy: EmptyResultPolicy,
    shutdown: watch::Receiver<bool>,
}

impl FallbackOrchestrator {
    pub fn new(strategies: Vec<Box<dyn Strategy>>) -> Self {
        // A receiver whose sender is gone keeps reading `false`.
        let (_tx, shutdown) = watch::channel(false);
        Self {
            strategies,
            policy: EmptyResultPolicy::default(),
            shutdown,
        }
    }

    pub fn with_policy(mut self, policy: EmptyResultPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_shutdown(mut self, shutdown: watch::Receiver<bool>) -> Self {
        self.shutdown = shutdown;
        self
    }

    pub fn strategy_names(&self) -> Vec<&str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }

    pub async fn run(&self, token: &str) -> Result<ScanReport, ScanError> {
        if self.strategies.is_empty() {
            return Err(ScanError::NoStrategies);
        }

        let started = Instant::now();
        let mut metadata = RunMetadata::new(token);
        let mut held_empty: Option<(String, StrategyOutput)> = None;

        info!(
            run_id = %metadata.run_id,
            token,
            chain = ?self.strategy_names(),
            policy = ?self.policy,
            "holder scan starting"
        );

        for (i, strategy) in self.strategies.iter().enumerate() {
            let name = strategy.name().to_string();
            let is_last = i + 1 == self.strategies.len();
            metadata.attempted.push(name.clone());
            info!(strategy = %name, position = i + 1, "trying strategy");

            match strategy.attempt(token, &self.shutdown).await {
                Ok(output) => {
                    let cancelled = *self.shutdown.borrow();
                    if output.records.is_empty()
                        && self.policy == EmptyResultPolicy::TryNext
                        && !is_last
                        && !cancelled
                    {
                        warn!(strategy = %name, "strategy returned no holders, trying next");
                        metadata.empty_skipped.push(name.clone());
                        held_empty = Some((name, output));
                        continue;
                    }
                    return Ok(self.finish(metadata, name, output, started));
                }
                Err(err) => {
                    warn!(strategy = %name, kind = err.kind(), error = %err, "strategy failed, falling back");
                    metadata.failures.push(StrategyFailure::new(name, &err));
                }
            }

            if *self.shutdown.borrow() {
                info!("shutdown requested, not trying further strategies");
                break;
            }
        }

        if let Some((name, output)) = held_empty {
            return Ok(self.finish(metadata, name, output, started));
        }

        warn!(
            run_id = %metadata.run_id,
            failures = metadata.failures.len(),
            "every strategy failed"
        );
        Err(ScanError::ExhaustedStrategies {
            attempts: metadata.failures,
        })
    }

    fn finish(
        &self,
        mut metadata: RunMetadata,
        name: String,
        mut output: StrategyOutput,
        started: Instant,
    ) -> ScanReport {
        metadata.absorb(&name, &mut output);
        metadata.elapsed_ms = started.elapsed().as_millis() as u64;
        info!(
            run_id = %metadata.run_id,
            strategy = %name,
            holders = output.records.len(),
            partial = metadata.partial,
            elapsed_ms = metadata.elapsed_ms,
            "holder scan finished"
        );
        ScanReport {
            holders: output.records,
            metadata,
        }
    }
}
