//! # Sharding Controller
//!
//! Splits the key space into shards and fetches them one after another,
//! merging every shard into the same [`Aggregator`]. This is the fallback
//! for backends that will not page: each shard is small enough to ask for
//! in one call, or at least smaller than "everything".
//!
//! Two ways to cut the space:
//!
//! - **Prefix shards** — one per leading base-58 symbol of the owner or
//!   account key. Only a run over the whole alphabet can be complete.
//! - **Key-set shards** — the account keys are listed up front (cheap: no
//!   account data) and cut into fixed-size buckets, each loaded by key.
//!
//! Shards run strictly in plan order, never concurrently. A shard that
//! fails is recorded and skipped; the next one still runs. If a future
//! version fans shards out in parallel, each shard must still be merged
//! into the sink by a single writer after it completes.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::{watch, OnceCell};
use tracing::{debug, info, warn};

use crate::aggregate::Aggregator;
use crate::config::{BASE58_ALPHABET, DEFAULT_DELAY_MS};
use crate::error::FetchError;
use crate::fetch::{KeyListing, PageFetcher};
use crate::model::{FilterSpec, HolderRecord, KeyField, PageRequest, ShardKey};

// ---------------------------------------------------------------------------
// Plans
// ---------------------------------------------------------------------------

/// The first `n` alphabet symbols as prefix shards, in alphabet order.
pub fn prefix_shards(n: usize) -> Vec<ShardKey> {
    BASE58_ALPHABET
        .chars()
        .take(n)
        .map(|c| ShardKey::Prefix(c.to_string()))
        .collect()
}

/// Whether a prefix plan of `n` shards covers every possible key.
pub fn prefix_plan_is_complete(n: usize) -> bool {
    n >= BASE58_ALPHABET.chars().count()
}

/// Cuts a key listing into buckets of `chunk_size` keys.
pub fn chunk_shards(keys: Vec<String>, chunk_size: usize) -> Vec<ShardKey> {
    let chunk_size = chunk_size.max(1);
    keys.chunks(chunk_size)
        .enumerate()
        .map(|(index, chunk)| ShardKey::Keys {
            index,
            keys: chunk.to_vec(),
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Configuration & outcome
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShardConfig {
    /// Pause between consecutive shards, applied after failures too.
    pub delay: Duration,
    /// Stop after this many shards even if the plan has more.
    pub max_shards: Option<usize>,
}

impl Default for ShardConfig {
    fn default() -> Self {
        Self {
            delay: Duration::from_millis(DEFAULT_DELAY_MS),
            max_shards: None,
        }
    }
}

/// One shard that could not be fetched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ShardFailure {
    pub shard: String,
    pub kind: String,
    pub reason: String,
}

/// What a sharded run covered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ShardOutcome {
    pub planned_shards: usize,
    pub attempted_shards: usize,
    pub successful_shards: usize,
    pub failed_shards: usize,
    pub failures: Vec<ShardFailure>,
    /// True when the plan did not span the whole key space, a shard
    /// failed, a shard was skipped, or the run was cancelled.
    pub partial: bool,
    pub cancelled: bool,
}

// ---------------------------------------------------------------------------
// ShardSource
// ---------------------------------------------------------------------------

/// Fetches every holder in one shard.
#[async_trait]
pub trait ShardSource: Send + Sync {
    fn name(&self) -> &str;

    async fn fetch_shard(&self, token: &str, shard: &ShardKey) -> Result<Vec<HolderRecord>, FetchError>;
}

// ---------------------------------------------------------------------------
// Controller
// ---------------------------------------------------------------------------

pub struct ShardingController<'a> {
    source: &'a dyn ShardSource,
    config: ShardConfig,
    shutdown: Option<watch::Receiver<bool>>,
}

impl<'a> ShardingController<'a> {
    pub fn new(source: &'a dyn ShardSource, config: ShardConfig) -> Self {
        Self {
            source,
            config,
            shutdown: None,
        }
    }

    pub fn with_shutdown(mut self, shutdown: watch::Receiver<bool>) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    /// Fetches `plan` shard by shard into `sink`.
    ///
    /// `plan_is_complete` says whether the plan, fully fetched, spans the
    /// whole key space. The result is partial unless it does and every
    /// shard succeeded.
    ///
    /// Individual shard failures are absorbed. The run only fails when
    /// shards were attempted and not one of them succeeded; the error
    /// returned is the first `Unsupported` seen, otherwise the last error.
    pub async fn run(
        &mut self,
        token: &str,
        plan: &[ShardKey],
        plan_is_complete: bool,
        sink: &mut Aggregator,
    ) -> Result<ShardOutcome, FetchError> {
        let name = self.source.name().to_string();
        let limit = self
            .config
            .max_shards
            .map_or(plan.len(), |max| max.min(plan.len()));
        let shards = &plan[..limit];

        info!(
            source = %name,
            token,
            shards = shards.len(),
            planned = plan.len(),
            delay_ms = self.config.delay.as_millis() as u64,
            "sharded scan starting"
        );

        let mut outcome = ShardOutcome {
            planned_shards: plan.len(),
            attempted_shards: 0,
            successful_shards: 0,
            failed_shards: 0,
            failures: Vec::new(),
            partial: false,
            cancelled: false,
        };
        let mut unsupported: Option<FetchError> = None;
        let mut last_error: Option<FetchError> = None;

        for (i, shard) in shards.iter().enumerate() {
            if self.shutdown.as_ref().map_or(false, |rx| *rx.borrow()) {
                info!(source = %name, completed = i, "sharded scan cancelled");
                outcome.cancelled = true;
                break;
            }
            if i > 0 {
                debug!(delay_ms = self.config.delay.as_millis() as u64, "pacing");
                tokio::time::sleep(self.config.delay).await;
            }

            outcome.attempted_shards += 1;
            match self.source.fetch_shard(token, shard).await {
                Ok(records) => {
                    let found = records.len();
                    let new_accounts = sink.extend(records);
                    outcome.successful_shards += 1;
                    info!(
                        source = %name,
                        shard = %shard,
                        index = i + 1,
                        of = shards.len(),
                        found,
                        new_accounts,
                        total = sink.len(),
                        "shard merged"
                    );
                }
                Err(err) => {
                    outcome.failed_shards += 1;
                    warn!(source = %name, shard = %shard, error = %err, "shard failed, skipping");
                    outcome.failures.push(ShardFailure {
                        shard: shard.label(),
                        kind: err.kind().to_string(),
                        reason: err.to_string(),
                    });
                    if err.is_unsupported() && unsupported.is_none() {
                        unsupported = Some(err.clone());
                    }
                    last_error = Some(err);
                }
            }
        }

        if outcome.attempted_shards > 0 && outcome.successful_shards == 0 {
            if let Some(err) = unsupported.or(last_error) {
                return Err(err);
            }
        }

        outcome.partial = !plan_is_complete
            || limit < plan.len()
            || outcome.failed_shards > 0
            || outcome.cancelled;

        info!(
            source = %name,
            successful = outcome.successful_shards,
            failed = outcome.failed_shards,
            holders = sink.len(),
            partial = outcome.partial,
            "sharded scan finished"
        );
        if !plan_is_complete {
            warn!(
                source = %name,
                "shard plan does not cover the whole key space, result is partial by construction"
            );
        }
        Ok(outcome)
    }
}

// ---------------------------------------------------------------------------
// Prefix shards
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PrefixMode {
    /// Ask the backend to filter by prefix.
    ServerSide,
    /// The backend refused; filter one full listing locally.
    ClientSide,
}

/// Serves prefix shards from a [`PageFetcher`].
///
/// Starts by asking the backend for a prefix-filtered listing. The first
/// `Unsupported` flips the source to client-side mode for the rest of its
/// life: one unpaged listing of the whole mint is fetched, cached, and
/// filtered per shard.
pub struct PrefixShardSource {
    fetcher: Arc<dyn PageFetcher>,
    field: KeyField,
    page_size: Option<u32>,
    mode: Mutex<PrefixMode>,
    full_listing: OnceCell<Vec<HolderRecord>>,
}

impl PrefixShardSource {
    pub fn new(fetcher: Arc<dyn PageFetcher>, field: KeyField, page_size: Option<u32>) -> Self {
        Self {
            fetcher,
            field,
            page_size,
            mode: Mutex::new(PrefixMode::ServerSide),
            full_listing: OnceCell::new(),
        }
    }

    /// Skips the server-side attempt entirely.
    pub fn client_side(fetcher: Arc<dyn PageFetcher>, field: KeyField) -> Self {
        let source = Self::new(fetcher, field, None);
        *source.mode.lock() = PrefixMode::ClientSide;
        source
    }

    pub fn is_client_side(&self) -> bool {
        *self.mode.lock() == PrefixMode::ClientSide
    }

    fn matching(&self, records: &[HolderRecord], prefix: &str) -> Vec<HolderRecord> {
        records
            .iter()
            .filter(|r| self.field.of(r).starts_with(prefix))
            .cloned()
            .collect()
    }

    async fn server_side(&self, token: &str, prefix: &str) -> Result<Vec<HolderRecord>, FetchError> {
        let filter = FilterSpec::token_accounts(token).with_prefix(self.field, prefix);
        let request = PageRequest::first(token, filter, self.page_size);
        let page = self.fetcher.fetch(&request).await?;
        // The backend filtered already; this only guards against one that
        // accepted the filter and ignored it.
        Ok(self.matching(&page.records, prefix))
    }

    async fn client_side_shard(&self, token: &str, prefix: &str) -> Result<Vec<HolderRecord>, FetchError> {
        let all = self
            .full_listing
            .get_or_try_init(|| async {
                info!(field = %self.field, "fetching full listing for client-side prefix filtering");
                let request = PageRequest::first(token, FilterSpec::token_accounts(token), None);
                let page = self.fetcher.fetch(&request).await?;
                info!(entries = page.raw_entries, holders = page.records.len(), "full listing cached");
                Ok::<_, FetchError>(page.records)
            })
            .await?;
        Ok(self.matching(all, prefix))
    }
}

#[async_trait]
impl ShardSource for PrefixShardSource {
    fn name(&self) -> &str {
        match self.field {
            KeyField::Owner => "owner-prefix",
            KeyField::Account => "account-prefix",
        }
    }

    async fn fetch_shard(&self, token: &str, shard: &ShardKey) -> Result<Vec<HolderRecord>, FetchError> {
        let ShardKey::Prefix(prefix) = shard else {
            return Err(FetchError::Unsupported(format!(
                "{} cannot serve {}",
                self.name(),
                shard
            )));
        };

        let mode = *self.mode.lock();
        if mode == PrefixMode::ServerSide {
            match self.server_side(token, prefix).await {
                Ok(records) => return Ok(records),
                Err(err) if err.is_unsupported() => {
                    info!(error = %err, "server-side prefix filter unsupported, filtering client-side");
                    *self.mode.lock() = PrefixMode::ClientSide;
                }
                Err(err) => return Err(err),
            }
        }
        self.client_side_shard(token, prefix).await
    }
}

// ---------------------------------------------------------------------------
// Key-set shards
// ---------------------------------------------------------------------------

/// Serves key-set shards by loading each bucket of keys directly.
pub struct ChunkShardSource {
    listing: Arc<dyn KeyListing>,
}

impl ChunkShardSource {
    pub fn new(listing: Arc<dyn KeyListing>) -> Self {
        Self { listing }
    }
}

#[async_trait]
impl ShardSource for ChunkShardSource {
    fn name(&self) -> &str {
        "key-chunks"
    }

    async fn fetch_shard(&self, _token: &str, shard: &ShardKey) -> Result<Vec<HolderRecord>, FetchError> {
        match shard {
            ShardKey::Keys { keys, .. } => self.listing.fetch_accounts(keys).await,
            ShardKey::Prefix(_) => Err(FetchError::Unsupported(format!(
                "key-chunks cannot serve {}",
                shard
            ))),
        }
    }
}
