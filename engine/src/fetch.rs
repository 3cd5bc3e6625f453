//! # Page Fetcher Capabilities
//!
//! The traits controllers are written against. Each backend implements the
//! subset it can actually serve; the stubs in tests implement them too,
//! which is what keeps the controllers testable without a network.
//!
//! Contract shared by every implementation: records with a non-positive
//! quantity never leave the fetcher, and an entry that cannot be decoded is
//! logged and skipped rather than failing the call.

use async_trait::async_trait;
use tracing::warn;

use crate::error::FetchError;
use crate::model::{HolderRecord, PageRequest, PageResult};

/// How a fetcher's pages chain together.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ContinuationMode {
    /// The backend hands back an opaque cursor. No cursor means the page
    /// just returned was the last one.
    Cursor,
    /// The backend has no cursor. The next page is requested "after the
    /// last key seen", so the controller synthesizes the continuation from
    /// the page's last raw key and stops on an empty page.
    #[default]
    KeyOffset,
}

/// One bounded listing call.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &str;

    fn continuation_mode(&self) -> ContinuationMode {
        ContinuationMode::KeyOffset
    }

    async fn fetch(&self, request: &PageRequest) -> Result<PageResult, FetchError>;
}

/// Two-step scanning: list every matching account key, then load accounts
/// by key in batches.
#[async_trait]
pub trait KeyListing: Send + Sync {
    /// Keys of every token account of `token`, with no account data.
    async fn list_keys(&self, token: &str) -> Result<Vec<String>, FetchError>;

    /// Loads the given accounts. Missing or zero-balance accounts are
    /// omitted from the result.
    async fn fetch_accounts(&self, keys: &[String]) -> Result<Vec<HolderRecord>, FetchError>;
}

/// "Largest N accounts of this collection" as one bounded call.
#[async_trait]
pub trait RankingSource: Send + Sync {
    async fn largest(&self, token: &str, limit: usize) -> Result<Vec<HolderRecord>, FetchError>;
}

/// Folds per-entry decode results into the records that may leave a
/// fetcher: malformed entries are logged and dropped, zero balances are
/// dropped silently. Returns the records and the number of malformed
/// entries.
pub fn retain_valid<I>(source: &str, entries: I) -> (Vec<HolderRecord>, usize)
where
    I: IntoIterator<Item = Result<HolderRecord, FetchError>>,
{
    let mut records = Vec::new();
    let mut malformed = 0usize;
    for entry in entries {
        match entry {
            Ok(record) if record.is_positive() => records.push(record),
            Ok(_) => {}
            Err(err) => {
                malformed += 1;
                warn!(source, error = %err, "skipping malformed record");
            }
        }
    }
    (records, malformed)
}
