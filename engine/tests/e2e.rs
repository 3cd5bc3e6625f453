//! End-to-end tests for the enumeration engine over in-memory backends.
//!
//! Every test builds a real strategy chain (controllers, aggregator,
//! orchestrator) and swaps only the network for scripted stubs, so what is
//! exercised is exactly what runs against a live endpoint.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::watch;

use holdscan_engine::fetch::{ContinuationMode, PageFetcher, RankingSource};
use holdscan_engine::model::{PageRequest, ShardKey};
use holdscan_engine::pagination::{PaginationConfig, StopReason};
use holdscan_engine::sharding::{ShardConfig, ShardSource};
use holdscan_engine::strategy::{CursorPagination, ShardedScan, Strategy, TopHolders};
use holdscan_engine::{
    summarize, Aggregator, EmptyResultPolicy, FallbackOrchestrator, FetchError, HolderRecord,
    PageResult, ScanError,
};

// ---------------------------------------------------------------------------
// Test Helpers
// ---------------------------------------------------------------------------

fn rec(owner: &str, account: &str, amount: f64) -> HolderRecord {
    HolderRecord::new(owner, account, amount)
}

/// Plays back a fixed list of page results and logs every continuation it
/// was asked for.
struct ScriptedPages {
    mode: ContinuationMode,
    script: Mutex<VecDeque<Result<PageResult, FetchError>>>,
    seen: Mutex<Vec<Option<String>>>,
}

impl ScriptedPages {
    fn new(mode: ContinuationMode, script: Vec<Result<PageResult, FetchError>>) -> Arc<Self> {
        Arc::new(Self {
            mode,
            script: Mutex::new(script.into()),
            seen: Mutex::new(Vec::new()),
        })
    }

    fn calls(&self) -> usize {
        self.seen.lock().len()
    }
}

#[async_trait]
impl PageFetcher for ScriptedPages {
    fn name(&self) -> &str {
        "scripted"
    }

    fn continuation_mode(&self) -> ContinuationMode {
        self.mode
    }

    async fn fetch(&self, request: &PageRequest) -> Result<PageResult, FetchError> {
        self.seen.lock().push(request.continuation.clone());
        self.script
            .lock()
            .pop_front()
            .unwrap_or_else(|| Ok(PageResult::empty()))
    }
}

/// Never runs dry; fires `trip` on the given call number.
struct Endless {
    calls: Mutex<u32>,
    trip: Option<(u32, watch::Sender<bool>)>,
}

#[async_trait]
impl PageFetcher for Endless {
    fn name(&self) -> &str {
        "endless"
    }

    async fn fetch(&self, _request: &PageRequest) -> Result<PageResult, FetchError> {
        let n = {
            let mut calls = self.calls.lock();
            *calls += 1;
            *calls
        };
        if let Some((at, tx)) = &self.trip {
            if n == *at {
                let _ = tx.send(true);
            }
        }
        Ok(PageResult::new(
            vec![rec("O", &format!("A{}", n), n as f64)],
            None,
        ))
    }
}

/// One holder per prefix shard; listed prefixes fail.
struct Prefixes {
    failing: Vec<&'static str>,
}

#[async_trait]
impl ShardSource for Prefixes {
    fn name(&self) -> &str {
        "prefixes"
    }

    async fn fetch_shard(&self, _token: &str, shard: &ShardKey) -> Result<Vec<HolderRecord>, FetchError> {
        let ShardKey::Prefix(p) = shard else {
            return Err(FetchError::Unsupported("key sets".into()));
        };
        if self.failing.contains(&p.as_str()) {
            return Err(FetchError::Transient(format!("shard {} reset", p)));
        }
        Ok(vec![rec(&format!("{}owner", p), &format!("{}acct", p), 10.0)])
    }
}

struct Ranking(Vec<HolderRecord>);

#[async_trait]
impl RankingSource for Ranking {
    async fn largest(&self, _token: &str, limit: usize) -> Result<Vec<HolderRecord>, FetchError> {
        Ok(self.0.iter().take(limit).cloned().collect())
    }
}

fn paging(max_pages: Option<u32>) -> PaginationConfig {
    PaginationConfig {
        page_size: 2,
        max_pages,
        delay: Duration::from_millis(100),
        max_retries: 1,
    }
}

fn unpaced_shards() -> ShardConfig {
    ShardConfig {
        delay: Duration::ZERO,
        max_shards: None,
    }
}

// ---------------------------------------------------------------------------
// 1. Pagination through the orchestrator
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn duplicate_across_pages_is_collapsed() {
    let fetcher = ScriptedPages::new(
        ContinuationMode::KeyOffset,
        vec![
            Ok(PageResult::new(
                vec![rec("O1", "A1", 100.0), rec("O1", "A2", 50.0)],
                None,
            )),
            Ok(PageResult::new(vec![rec("O1", "A1", 100.0)], None)),
            Ok(PageResult::empty()),
        ],
    );
    let chain: Vec<Box<dyn Strategy>> = vec![Box::new(CursorPagination::new(
        "paged",
        fetcher.clone(),
        paging(None),
    ))];

    let report = FallbackOrchestrator::new(chain).run("Mint").await.unwrap();

    assert_eq!(report.holders, vec![rec("O1", "A1", 100.0), rec("O1", "A2", 50.0)]);
    assert_eq!(fetcher.calls(), 3);
    assert_eq!(report.metadata.page_calls, 3);
    assert_eq!(report.metadata.pages_fetched, 2);
    assert_eq!(report.metadata.stop_reason, Some(StopReason::Exhausted));
    assert!(!report.is_partial());
}

#[tokio::test(start_paused = true)]
async fn page_limit_surfaces_as_partial_metadata() {
    let chain: Vec<Box<dyn Strategy>> = vec![Box::new(CursorPagination::new(
        "paged",
        Arc::new(Endless {
            calls: Mutex::new(0),
            trip: None,
        }),
        paging(Some(3)),
    ))];

    let report = FallbackOrchestrator::new(chain).run("Mint").await.unwrap();

    assert_eq!(report.holders.len(), 3);
    assert_eq!(report.metadata.page_calls, 3);
    assert_eq!(report.metadata.stop_reason, Some(StopReason::PageLimit));
    assert!(report.is_partial());
    assert!(report.metadata.partial_reasons[0].contains("page limit"));
    assert_eq!(report.metadata.traces.len(), 3);
}

#[tokio::test(start_paused = true)]
async fn cursor_chain_ends_on_final_cursor() {
    let fetcher = ScriptedPages::new(
        ContinuationMode::Cursor,
        vec![
            Ok(PageResult::new(vec![rec("O1", "A1", 3.0)], Some("c-2".into()))),
            Ok(PageResult::new(vec![rec("O2", "A2", 4.0)], None)),
        ],
    );
    let chain: Vec<Box<dyn Strategy>> = vec![Box::new(CursorPagination::new(
        "cursor",
        fetcher.clone(),
        paging(None),
    ))];

    let report = FallbackOrchestrator::new(chain).run("Mint").await.unwrap();

    assert_eq!(*fetcher.seen.lock(), vec![None, Some("c-2".to_string())]);
    assert_eq!(report.metadata.stop_reason, Some(StopReason::FinalCursor));
    assert_eq!(report.holders[0].account, "A2");
}

// ---------------------------------------------------------------------------
// 2. Fallback across strategies
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn unsupported_paging_falls_back_to_sharding() {
    let refusing = ScriptedPages::new(
        ContinuationMode::KeyOffset,
        vec![Err(FetchError::Unsupported("limit is not supported".into()))],
    );
    let chain: Vec<Box<dyn Strategy>> = vec![
        Box::new(CursorPagination::new("paged", refusing.clone(), paging(None))),
        Box::new(ShardedScan::prefixes(
            Arc::new(Prefixes { failing: vec!["2"] }),
            3,
            unpaced_shards(),
        )),
        Box::new(TopHolders::new(Arc::new(Ranking(vec![])), 5)),
    ];

    let report = FallbackOrchestrator::new(chain).run("Mint").await.unwrap();

    assert_eq!(refusing.calls(), 1, "unsupported must not be retried");
    assert_eq!(report.metadata.strategy_used, "sharded:prefixes");
    assert_eq!(report.metadata.failures.len(), 1);
    assert_eq!(report.metadata.failures[0].strategy, "paged");
    assert_eq!(report.metadata.failures[0].kind, "unsupported");
    assert_eq!(report.metadata.successful_shards, 2);
    assert_eq!(report.metadata.failed_shards, 1);
    assert_eq!(report.metadata.shard_failures[0].shard, "prefix '2'");
    assert_eq!(report.holders.len(), 2);
    assert!(report.is_partial());
}

#[tokio::test(start_paused = true)]
async fn every_backend_failing_reports_each_strategy() {
    let chain: Vec<Box<dyn Strategy>> = vec![
        Box::new(CursorPagination::new(
            "paged",
            ScriptedPages::new(
                ContinuationMode::KeyOffset,
                vec![Err(FetchError::Unsupported("before".into()))],
            ),
            paging(None),
        )),
        Box::new(ShardedScan::prefixes(
            Arc::new(Prefixes {
                failing: vec!["1", "2"],
            }),
            2,
            unpaced_shards(),
        )),
    ];

    let err = FallbackOrchestrator::new(chain).run("Mint").await.unwrap_err();
    match &err {
        ScanError::ExhaustedStrategies { attempts } => {
            assert_eq!(attempts.len(), 2);
            assert_eq!(attempts[0].kind, "unsupported");
            assert_eq!(attempts[1].strategy, "sharded:prefixes");
            assert_eq!(attempts[1].kind, "transient");
        }
        other => panic!("unexpected error {}", other),
    }
    assert!(err.to_string().contains("paged [unsupported]"));
}

#[tokio::test(start_paused = true)]
async fn empty_first_result_policy_is_configurable() {
    let build = || -> Vec<Box<dyn Strategy>> {
        vec![
            Box::new(CursorPagination::new(
                "paged",
                ScriptedPages::new(ContinuationMode::KeyOffset, vec![Ok(PageResult::empty())]),
                paging(None),
            )),
            Box::new(TopHolders::new(
                Arc::new(Ranking(vec![rec("O", "A", 1.0)])),
                10,
            )),
        ]
    };

    let accepted = FallbackOrchestrator::new(build()).run("Mint").await.unwrap();
    assert!(accepted.holders.is_empty());
    assert_eq!(accepted.metadata.strategy_used, "paged");

    let next = FallbackOrchestrator::new(build())
        .with_policy(EmptyResultPolicy::TryNext)
        .run("Mint")
        .await
        .unwrap();
    assert_eq!(next.holders.len(), 1);
    assert_eq!(next.metadata.strategy_used, "top");
    assert!(next.is_partial());
}

// ---------------------------------------------------------------------------
// 3. Cancellation
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn shutdown_mid_run_returns_partial_result() {
    let (tx, rx) = watch::channel(false);
    let chain: Vec<Box<dyn Strategy>> = vec![
        Box::new(CursorPagination::new(
            "paged",
            Arc::new(Endless {
                calls: Mutex::new(0),
                trip: Some((2, tx)),
            }),
            paging(None),
        )),
        Box::new(TopHolders::new(Arc::new(Ranking(vec![])), 5)),
    ];

    let report = FallbackOrchestrator::new(chain)
        .with_shutdown(rx)
        .run("Mint")
        .await
        .unwrap();

    assert_eq!(report.metadata.strategy_used, "paged");
    assert_eq!(report.metadata.stop_reason, Some(StopReason::Cancelled));
    assert_eq!(report.holders.len(), 2);
    assert!(report.is_partial());
}

// ---------------------------------------------------------------------------
// 4. Aggregation invariants
// ---------------------------------------------------------------------------

#[test]
fn aggregated_set_is_unique_sorted_and_last_write_wins() {
    let mut agg = Aggregator::new();
    let mut expected = std::collections::HashMap::new();
    // Deterministic pseudo-random stream with plenty of repeats.
    let mut x: u64 = 0x2545_f491;
    for _ in 0..2_000 {
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        let account = format!("A{}", x % 300);
        let amount = (x % 1_000) as f64;
        agg.insert(rec("O", &account, amount));
        if amount > 0.0 {
            expected.insert(account, amount);
        }
    }

    let out = agg.materialize();
    assert_eq!(out.len(), expected.len());
    assert!(out.windows(2).all(|w| w[0].amount >= w[1].amount));
    assert!(out.iter().all(|r| r.amount > 0.0));
    for r in &out {
        assert_eq!(expected.get(&r.account), Some(&r.amount));
    }

    let summary = summarize(&out).unwrap();
    assert_eq!(summary.holders, out.len());
    assert_eq!(summary.max, out[0].amount);
}
