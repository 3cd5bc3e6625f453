//! # Pagination Controller
//!
//! Walks a [`PageFetcher`] along its continuation chain, merging every page
//! into an [`Aggregator`], until the backend runs dry or a safety bound
//! fires.
//!
//! ```text
//!   START ──► FETCHING ──┬──► FETCHING   (non-empty page, next token known)
//!                        ├──► DONE       (empty page, final cursor, page
//!                        │                limit, repeated token, shutdown)
//!                        └──► ABORTED    (unsupported, or retries spent)
//! ```
//!
//! ## Termination
//!
//! Every step either sees an empty page, advances a page counter bounded
//! by `max_pages`, or issues a continuation token. Tokens are remembered;
//! a token the run has already issued means the backend is ignoring the
//! paging parameters and would hand us the same page forever, so the run
//! stops there and is flagged partial.
//!
//! ## Pacing
//!
//! Consecutive fetches are separated by at least `delay`. Retries of a
//! failed page back off from there, doubling each time.

use std::collections::HashSet;
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::aggregate::Aggregator;
use crate::config::{DEFAULT_DELAY_MS, DEFAULT_MAX_RETRIES, DEFAULT_PAGE_SIZE};
use crate::error::FetchError;
use crate::fetch::{ContinuationMode, PageFetcher};
use crate::model::PageRequest;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Knobs for one paginated run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaginationConfig {
    /// Advisory page size passed to the fetcher.
    pub page_size: u32,
    /// Stop after this many successful pages. `None` means unbounded,
    /// which relies entirely on the backend running dry.
    pub max_pages: Option<u32>,
    /// Minimum pause between consecutive fetches.
    pub delay: Duration,
    /// Extra attempts for a page that failed with a retryable error.
    pub max_retries: u32,
}

impl Default for PaginationConfig {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            max_pages: None,
            delay: Duration::from_millis(DEFAULT_DELAY_MS),
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }
}

// ---------------------------------------------------------------------------
// State & outcome
// ---------------------------------------------------------------------------

/// Where the controller is in its run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaginationState {
    Start,
    Fetching,
    Done,
    Aborted,
}

/// Why a run stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// The backend returned an empty page.
    Exhausted,
    /// A cursor backend returned its last page.
    FinalCursor,
    /// `max_pages` was reached with more data possibly remaining.
    PageLimit,
    /// A continuation token came around a second time.
    RepeatedContinuation,
    /// A page kept failing after some pages had already been merged.
    Aborted,
    /// The shutdown signal fired.
    Cancelled,
}

impl StopReason {
    /// Whether a run that stopped for this reason may be missing holders.
    pub fn is_partial(&self) -> bool {
        !matches!(self, StopReason::Exhausted | StopReason::FinalCursor)
    }

    pub fn describe(&self) -> &'static str {
        match self {
            StopReason::Exhausted => "backend returned an empty page",
            StopReason::FinalCursor => "backend returned no further cursor",
            StopReason::PageLimit => "page limit reached",
            StopReason::RepeatedContinuation => "continuation token repeated",
            StopReason::Aborted => "page retries exhausted",
            StopReason::Cancelled => "shutdown requested",
        }
    }
}

/// Timing and size of one successful page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PageTrace {
    /// 1-based page number.
    pub index: u32,
    /// Records kept after filtering.
    pub records: usize,
    /// Entries the backend returned.
    pub raw_entries: usize,
    pub latency_ms: u64,
    /// Fetch calls spent on this page, retries included.
    pub attempts: u32,
}

/// Summary of a finished run. The records themselves went into the sink.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PaginationOutcome {
    /// Successful fetch calls.
    pub pages: u32,
    /// All fetch calls, failed attempts included.
    pub fetch_calls: u32,
    pub failed_calls: u32,
    pub stop_reason: StopReason,
    pub partial: bool,
    pub traces: Vec<PageTrace>,
}

// ---------------------------------------------------------------------------
// Controller
// ---------------------------------------------------------------------------

/// Drives one fetcher across consecutive pages.
pub struct PaginationController<'a> {
    fetcher: &'a dyn PageFetcher,
    config: PaginationConfig,
    state: PaginationState,
    shutdown: Option<watch::Receiver<bool>>,
}

impl<'a> PaginationController<'a> {
    pub fn new(fetcher: &'a dyn PageFetcher, config: PaginationConfig) -> Self {
        Self {
            fetcher,
            config,
            state: PaginationState::Start,
            shutdown: None,
        }
    }

    /// Checks `shutdown` before each page; `true` ends the run early.
    pub fn with_shutdown(mut self, shutdown: watch::Receiver<bool>) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    pub fn state(&self) -> PaginationState {
        self.state
    }

    /// Runs to completion, merging every page into `sink`.
    ///
    /// `Unsupported` always propagates, as does any failure of the very
    /// first page. A failure after some pages have been merged ends the run
    /// as a partial success instead: those pages are real data.
    pub async fn run(
        &mut self,
        request: PageRequest,
        sink: &mut Aggregator,
    ) -> Result<PaginationOutcome, FetchError> {
        let mode = self.fetcher.continuation_mode();
        let name = self.fetcher.name().to_string();
        let request = PageRequest {
            page_size: Some(self.config.page_size),
            ..request
        };

        info!(
            fetcher = %name,
            token = %request.token,
            page_size = self.config.page_size,
            max_pages = ?self.config.max_pages,
            "pagination starting"
        );

        self.state = PaginationState::Fetching;

        let mut outcome = PaginationOutcome {
            pages: 0,
            fetch_calls: 0,
            failed_calls: 0,
            stop_reason: StopReason::Exhausted,
            partial: false,
            traces: Vec::new(),
        };
        let mut seen_tokens: HashSet<String> = HashSet::new();
        let mut continuation: Option<String> = request.continuation.clone();
        if let Some(token) = &continuation {
            seen_tokens.insert(token.clone());
        }

        loop {
            if self.shutdown_requested() {
                return Ok(self.finish(outcome, StopReason::Cancelled, &name, sink));
            }

            if outcome.fetch_calls > 0 {
                debug!(delay_ms = self.config.delay.as_millis() as u64, "pacing");
                tokio::time::sleep(self.config.delay).await;
            }

            let page_request = match &continuation {
                Some(token) => request.next(token.clone()),
                None => request.clone(),
            };

            let page_number = outcome.pages + 1;
            let mut attempts = 0u32;
            let started = Instant::now();
            let page = loop {
                attempts += 1;
                outcome.fetch_calls += 1;
                match self.fetcher.fetch(&page_request).await {
                    Ok(page) => break page,
                    Err(err) => {
                        outcome.failed_calls += 1;
                        if err.is_unsupported() {
                            warn!(fetcher = %name, page = page_number, error = %err, "backend refused pagination");
                            self.state = PaginationState::Aborted;
                            return Err(err);
                        }
                        if attempts > self.config.max_retries {
                            warn!(
                                fetcher = %name,
                                page = page_number,
                                attempts,
                                error = %err,
                                "page failed, giving up"
                            );
                            self.state = PaginationState::Aborted;
                            if outcome.pages == 0 {
                                return Err(err);
                            }
                            outcome.stop_reason = StopReason::Aborted;
                            outcome.partial = true;
                            return Ok(outcome);
                        }
                        let backoff = self.config.delay.saturating_mul(1 << attempts.min(16));
                        warn!(
                            fetcher = %name,
                            page = page_number,
                            attempt = attempts,
                            backoff_ms = backoff.as_millis() as u64,
                            error = %err,
                            "page failed, retrying"
                        );
                        tokio::time::sleep(backoff).await;
                    }
                }
            };

            if page.is_empty() {
                info!(fetcher = %name, page = page_number, "reached end of results");
                return Ok(self.finish(outcome, StopReason::Exhausted, &name, sink));
            }

            outcome.pages += 1;
            let new_accounts = sink.extend(page.records.iter().cloned());
            outcome.traces.push(PageTrace {
                index: page_number,
                records: page.records.len(),
                raw_entries: page.raw_entries,
                latency_ms: started.elapsed().as_millis() as u64,
                attempts,
            });
            info!(
                fetcher = %name,
                page = page_number,
                entries = page.raw_entries,
                holders = page.records.len(),
                new_accounts,
                total = sink.len(),
                "page merged"
            );

            let next = match mode {
                ContinuationMode::Cursor => page.continuation,
                ContinuationMode::KeyOffset => page.continuation.or(page.last_key),
            };
            let Some(next) = next else {
                let reason = match mode {
                    ContinuationMode::Cursor => StopReason::FinalCursor,
                    // A non-empty page without any key to continue from:
                    // nothing sensible to ask for next.
                    ContinuationMode::KeyOffset => StopReason::Aborted,
                };
                return Ok(self.finish(outcome, reason, &name, sink));
            };

            if let Some(max) = self.config.max_pages {
                if outcome.pages >= max {
                    warn!(fetcher = %name, max_pages = max, "page limit reached, result may be incomplete");
                    return Ok(self.finish(outcome, StopReason::PageLimit, &name, sink));
                }
            }

            if !seen_tokens.insert(next.clone()) {
                warn!(fetcher = %name, token = %next, "continuation token repeated, stopping");
                return Ok(self.finish(outcome, StopReason::RepeatedContinuation, &name, sink));
            }
            continuation = Some(next);
        }
    }

    fn shutdown_requested(&self) -> bool {
        self.shutdown.as_ref().map_or(false, |rx| *rx.borrow())
    }

    fn finish(
        &mut self,
        mut outcome: PaginationOutcome,
        reason: StopReason,
        name: &str,
        sink: &Aggregator,
    ) -> PaginationOutcome {
        self.state = PaginationState::Done;
        outcome.stop_reason = reason;
        outcome.partial = reason.is_partial();
        info!(
            fetcher = %name,
            pages = outcome.pages,
            calls = outcome.fetch_calls,
            holders = sink.len(),
            reason = reason.describe(),
            partial = outcome.partial,
            "pagination finished"
        );
        outcome
    }
}
