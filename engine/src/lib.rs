// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # holdscan — Holder Enumeration Engine
//!
//! Finds every account holding a given fungible token on an account-indexed
//! ledger, when the data source only offers partial, rate-limited, or
//! inconsistent listing primitives.
//!
//! No single listing primitive can be trusted: some endpoints page with an
//! opaque cursor, some emulate paging with a "before this key" offset, some
//! reject paging parameters outright, and the one call that always works
//! (largest-N accounts) caps the answer at a handful of rows. The engine
//! composes these into one deduplicated, sorted holder set and says plainly
//! when that set is incomplete.
//!
//! ## Architecture
//!
//! ```text
//!   caller ──► FallbackOrchestrator ──► Strategy (in priority order)
//!                                          │
//!                     ┌────────────────────┼────────────────────┐
//!                     ▼                    ▼                    ▼
//!            PaginationController  ShardingController      TopHolders
//!                     │                    │                    │
//!                     └──────── PageFetcher / ShardSource ──────┘
//!                                          │
//!                                     Aggregator ──► stats::summarize
//! ```
//!
//! - **model** — `HolderRecord` and the page/shard value types.
//! - **fetch** — capability traits every backend implements.
//! - **rpc** — the JSON-RPC client handle and concrete backends.
//! - **pagination** — drives a fetcher across a continuation chain.
//! - **sharding** — partitions the key space and drives per-shard fetches.
//! - **aggregate** — dedup by account, stable sort by quantity.
//! - **strategy** / **orchestrator** — the fallback chain.
//! - **stats** — descriptive metrics over a finished set.
//! - **scanner** — assembles a chain from `ScanOptions`.
//! - **config** — constants and run options.
//!
//! Everything runs on a single logical thread of control. Pages and shards
//! are fetched one at a time with a pacing delay in between; the backends
//! this talks to rate-limit aggressively and parallel fan-out only gets you
//! throttled faster.

pub mod aggregate;
pub mod config;
pub mod error;
pub mod fetch;
pub mod model;
pub mod orchestrator;
pub mod pagination;
pub mod rpc;
pub mod scanner;
pub mod sharding;
pub mod stats;
pub mod strategy;

pub use aggregate::Aggregator;
pub use config::{EmptyResultPolicy, ScanOptions, ShardField, StrategyKind};
pub use error::{FetchError, ScanError};
pub use model::{HolderRecord, PageResult, ShardKey};
pub use orchestrator::{FallbackOrchestrator, RunMetadata, ScanReport};
pub use scanner::HolderScanner;
pub use stats::{summarize, Summary};
