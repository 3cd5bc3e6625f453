//! # Entry Record Model
//!
//! The value types that flow between fetchers, controllers, and the
//! aggregator. None of these are persisted; a [`PageResult`] lives exactly
//! as long as the controller step that requested it.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::config::{MINT_OFFSET, TOKEN_ACCOUNT_DATA_SIZE};

// ---------------------------------------------------------------------------
// HolderRecord
// ---------------------------------------------------------------------------

/// One token account with a positive balance.
///
/// `account` is the primary key. `owner` is not unique: one owner may
/// control several token accounts for the same mint, and each shows up as
/// its own record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HolderRecord {
    /// Key of the controlling entity.
    pub owner: String,
    /// Key of the token account itself.
    pub account: String,
    /// Balance in human units (already divided by `10^decimals`).
    pub amount: f64,
}

impl HolderRecord {
    pub fn new(owner: impl Into<String>, account: impl Into<String>, amount: f64) -> Self {
        Self {
            owner: owner.into(),
            account: account.into(),
            amount,
        }
    }

    /// Only records for which this holds may leave a fetcher.
    /// NaN fails the comparison and is rejected along with zero.
    pub fn is_positive(&self) -> bool {
        self.amount > 0.0
    }
}

// ---------------------------------------------------------------------------
// Filters and requests
// ---------------------------------------------------------------------------

/// Which key a prefix constraint applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyField {
    Owner,
    Account,
}

impl KeyField {
    /// Picks the constrained key out of a record.
    pub fn of<'a>(&self, record: &'a HolderRecord) -> &'a str {
        match self {
            KeyField::Owner => &record.owner,
            KeyField::Account => &record.account,
        }
    }
}

impl fmt::Display for KeyField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyField::Owner => write!(f, "owner"),
            KeyField::Account => write!(f, "account"),
        }
    }
}

/// Byte-equality constraint at a fixed offset of the account layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyEquals {
    pub offset: usize,
    /// Base-58 text of the bytes to compare.
    pub bytes: String,
}

/// Leading-symbol constraint on the base-58 text of a key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyPrefix {
    pub field: KeyField,
    pub prefix: String,
}

/// Structural predicate a listing call is restricted to.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterSpec {
    /// Exact account data length.
    pub data_size: Option<usize>,
    /// All must match.
    pub equals: Vec<KeyEquals>,
    /// Prefix constraint, if the caller is sharding.
    pub prefix: Option<KeyPrefix>,
}

impl FilterSpec {
    /// The canonical "token accounts of this mint" predicate: fixed-size
    /// account layout, mint key at offset zero.
    pub fn token_accounts(mint: &str) -> Self {
        Self {
            data_size: Some(TOKEN_ACCOUNT_DATA_SIZE),
            equals: vec![KeyEquals {
                offset: MINT_OFFSET,
                bytes: mint.to_string(),
            }],
            prefix: None,
        }
    }

    /// Same filter narrowed to one key prefix.
    pub fn with_prefix(mut self, field: KeyField, prefix: impl Into<String>) -> Self {
        self.prefix = Some(KeyPrefix {
            field,
            prefix: prefix.into(),
        });
        self
    }
}

/// One bounded listing call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRequest {
    /// Mint (collection) key.
    pub token: String,
    pub filter: FilterSpec,
    /// Advisory page size. `None` asks for the whole filtered set at once.
    pub page_size: Option<u32>,
    /// Continuation from the previous page, absent on the first call.
    pub continuation: Option<String>,
}

impl PageRequest {
    pub fn first(token: impl Into<String>, filter: FilterSpec, page_size: Option<u32>) -> Self {
        Self {
            token: token.into(),
            filter,
            page_size,
            continuation: None,
        }
    }

    /// The same request positioned after `continuation`.
    pub fn next(&self, continuation: String) -> Self {
        Self {
            continuation: Some(continuation),
            ..self.clone()
        }
    }
}

// ---------------------------------------------------------------------------
// PageResult
// ---------------------------------------------------------------------------

/// What one listing call returned.
///
/// `records` is already filtered to positive balances, so it can be empty
/// while the page was not: `raw_entries` counts what the backend sent, and
/// "empty page" always means `raw_entries == 0`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PageResult {
    pub records: Vec<HolderRecord>,
    /// Backend-issued continuation. `None` means either "final page" or
    /// "this backend has no continuation concept", depending on the
    /// fetcher's `ContinuationMode`.
    pub continuation: Option<String>,
    /// Entries the backend returned before zero-balance and malformed
    /// entries were dropped.
    pub raw_entries: usize,
    /// Account key of the last raw entry, used to synthesize a
    /// continuation for offset-by-key paging.
    pub last_key: Option<String>,
}

impl PageResult {
    /// A page where every returned entry became a record.
    pub fn new(records: Vec<HolderRecord>, continuation: Option<String>) -> Self {
        let raw_entries = records.len();
        let last_key = records.last().map(|r| r.account.clone());
        Self {
            records,
            continuation,
            raw_entries,
            last_key,
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.raw_entries == 0
    }
}

// ---------------------------------------------------------------------------
// ShardKey
// ---------------------------------------------------------------------------

/// One partition of the key space.
///
/// Sharding is best effort. Prefix shards only cover the full holder set
/// when every symbol of the alphabet is enumerated; key-set shards only
/// cover it when the key listing they were cut from was complete.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShardKey {
    /// Keys whose base-58 text starts with this symbol.
    Prefix(String),
    /// An artificial bucket of concrete, previously listed account keys.
    Keys { index: usize, keys: Vec<String> },
}

impl ShardKey {
    /// Short label for logs and failure reports.
    pub fn label(&self) -> String {
        match self {
            ShardKey::Prefix(p) => format!("prefix '{}'", p),
            ShardKey::Keys { index, keys } => format!("chunk {} ({} keys)", index, keys.len()),
        }
    }
}

impl fmt::Display for ShardKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_and_nan_are_not_positive() {
        assert!(HolderRecord::new("O", "A", 0.5).is_positive());
        assert!(!HolderRecord::new("O", "A", 0.0).is_positive());
        assert!(!HolderRecord::new("O", "A", -1.0).is_positive());
        assert!(!HolderRecord::new("O", "A", f64::NAN).is_positive());
    }

    #[test]
    fn page_emptiness_counts_raw_entries() {
        let page = PageResult {
            records: Vec::new(),
            continuation: None,
            raw_entries: 3,
            last_key: Some("Z".into()),
        };
        assert!(!page.is_empty());
        assert!(PageResult::empty().is_empty());
    }

    #[test]
    fn new_page_tracks_last_key() {
        let page = PageResult::new(
            vec![
                HolderRecord::new("O1", "A1", 1.0),
                HolderRecord::new("O2", "A2", 2.0),
            ],
            None,
        );
        assert_eq!(page.raw_entries, 2);
        assert_eq!(page.last_key.as_deref(), Some("A2"));
    }

    #[test]
    fn token_account_filter_layout() {
        let filter = FilterSpec::token_accounts("Mint111").with_prefix(KeyField::Owner, "9");
        assert_eq!(filter.data_size, Some(165));
        assert_eq!(filter.equals[0].offset, 0);
        assert_eq!(filter.equals[0].bytes, "Mint111");
        assert_eq!(filter.prefix.as_ref().map(|p| p.prefix.as_str()), Some("9"));
    }

    #[test]
    fn next_request_keeps_filter() {
        let first = PageRequest::first("M", FilterSpec::token_accounts("M"), Some(10));
        let next = first.next("A9".into());
        assert_eq!(next.continuation.as_deref(), Some("A9"));
        assert_eq!(next.filter, first.filter);
        assert_eq!(next.page_size, Some(10));
    }

    #[test]
    fn shard_labels() {
        assert_eq!(ShardKey::Prefix("A".into()).label(), "prefix 'A'");
        let chunk = ShardKey::Keys {
            index: 2,
            keys: vec!["x".into(), "y".into()],
        };
        assert_eq!(chunk.to_string(), "chunk 2 (2 keys)");
    }
}
