//! Strict decoding of backend payloads into [`HolderRecord`]s.
//!
//! Envelopes (the list, the context wrapper, the page key) are decoded as a
//! whole; a bad envelope fails the call with `FetchError::Decode`. Entries
//! are decoded one at a time, so one bad entry becomes a
//! `FetchError::MalformedRecord` for that entry alone.

use std::fmt;

use serde::Deserialize;
use serde_json::Value;

use crate::error::FetchError;
use crate::model::HolderRecord;

const UNKNOWN_ACCOUNT: &str = "<unknown>";

// ---------------------------------------------------------------------------
// Envelopes
// ---------------------------------------------------------------------------

/// `getProgramAccounts` result. Plain nodes return a bare list; with
/// `withContext` (and on page-key backends) the list is wrapped.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum ProgramAccounts {
    Wrapped {
        value: Vec<Value>,
        #[serde(rename = "pageKey", default)]
        page_key: Option<String>,
    },
    Plain(Vec<Value>),
}

impl ProgramAccounts {
    pub fn into_parts(self) -> (Vec<Value>, Option<String>) {
        match self {
            ProgramAccounts::Wrapped { value, page_key } => (value, page_key),
            ProgramAccounts::Plain(value) => (value, None),
        }
    }
}

/// `getMultipleAccounts` result: one slot per requested key, `null` for
/// accounts that do not exist.
#[derive(Debug, Deserialize)]
pub struct MultipleAccounts {
    pub value: Vec<Option<Value>>,
}

/// `getTokenLargestAccounts` result.
#[derive(Debug, Deserialize)]
pub struct LargestAccounts {
    pub value: Vec<LargestAccount>,
}

#[derive(Debug, Deserialize)]
pub struct LargestAccount {
    pub address: String,
}

/// `getTokenSupply` result.
#[derive(Debug, Deserialize)]
pub struct SupplyEnvelope {
    pub value: TokenAmount,
}

/// Fast-index `getTokenAccounts` result.
#[derive(Debug, Deserialize)]
pub struct TokenAccountsPage {
    #[serde(default)]
    pub total: Option<u64>,
    #[serde(default)]
    pub cursor: Option<String>,
    pub token_accounts: Vec<Value>,
}

// ---------------------------------------------------------------------------
// Entries
// ---------------------------------------------------------------------------

/// The `tokenAmount` object of a parsed token account.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenAmount {
    /// Raw integer units, as a decimal string.
    pub amount: String,
    pub decimals: u8,
    #[serde(default)]
    pub ui_amount: Option<f64>,
    #[serde(default)]
    pub ui_amount_string: Option<String>,
}

impl TokenAmount {
    /// Human units. Prefers the server's own conversion, then its string
    /// form, then divides the raw amount.
    pub fn human(&self) -> Result<f64, String> {
        if let Some(ui) = self.ui_amount {
            return Ok(ui);
        }
        if let Some(text) = &self.ui_amount_string {
            return text
                .parse::<f64>()
                .map_err(|e| format!("uiAmountString '{}': {}", text, e));
        }
        let raw = self
            .amount
            .parse::<u64>()
            .map_err(|e| format!("amount '{}': {}", self.amount, e))?;
        Ok(normalize(raw, self.decimals))
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TokenAccountInfo {
    owner: String,
    token_amount: TokenAmount,
}

#[derive(Debug, Deserialize)]
struct ParsedInfo {
    info: TokenAccountInfo,
}

#[derive(Debug, Deserialize)]
struct ParsedData {
    parsed: ParsedInfo,
}

#[derive(Debug, Deserialize)]
struct ParsedAccount {
    data: ParsedData,
}

#[derive(Debug, Deserialize)]
struct KeyedAccount {
    pubkey: String,
    account: Value,
}

#[derive(Debug, Deserialize)]
struct IndexedTokenAccount {
    address: String,
    owner: String,
    amount: u64,
    #[serde(default)]
    decimals: Option<u8>,
}

/// `raw / 10^decimals`.
pub fn normalize(raw: u64, decimals: u8) -> f64 {
    raw as f64 / 10f64.powi(i32::from(decimals))
}

fn malformed(account: &str, reason: impl fmt::Display) -> FetchError {
    FetchError::MalformedRecord {
        account: account.to_string(),
        reason: reason.to_string(),
    }
}

/// Account key of a keyed entry, if it has one.
pub fn entry_key(entry: &Value) -> Option<&str> {
    entry.get("pubkey").and_then(Value::as_str)
}

/// Decodes one `jsonParsed` token account whose key is already known.
pub fn decode_account(account: &str, value: &Value) -> Result<HolderRecord, FetchError> {
    let parsed = ParsedAccount::deserialize(value).map_err(|e| malformed(account, e))?;
    let info = parsed.data.parsed.info;
    let amount = info.token_amount.human().map_err(|e| malformed(account, e))?;
    Ok(HolderRecord::new(info.owner, account, amount))
}

/// Decodes one `{ pubkey, account }` entry of a program-accounts listing.
pub fn decode_keyed(entry: &Value) -> Result<HolderRecord, FetchError> {
    let account = entry_key(entry).unwrap_or(UNKNOWN_ACCOUNT);
    let keyed = KeyedAccount::deserialize(entry).map_err(|e| malformed(account, e))?;
    decode_account(&keyed.pubkey, &keyed.account)
}

/// Decodes one fast-index entry. The raw amount is divided by the
/// entry's own decimals, else `fallback_decimals`, else taken as is.
pub fn decode_indexed(entry: &Value, fallback_decimals: Option<u8>) -> Result<HolderRecord, FetchError> {
    let account = entry.get("address").and_then(Value::as_str).unwrap_or(UNKNOWN_ACCOUNT);
    let indexed = IndexedTokenAccount::deserialize(entry).map_err(|e| malformed(account, e))?;
    let amount = match indexed.decimals.or(fallback_decimals) {
        Some(decimals) => normalize(indexed.amount, decimals),
        None => indexed.amount as f64,
    };
    Ok(HolderRecord::new(indexed.owner, indexed.address, amount))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parsed(owner: &str, amount: &str, decimals: u8, ui: Option<f64>) -> Value {
        json!({
            "data": {
                "parsed": {
                    "info": {
                        "mint": "Mint",
                        "owner": owner,
                        "tokenAmount": {
                            "amount": amount,
                            "decimals": decimals,
                            "uiAmount": ui
                        }
                    },
                    "type": "account"
                },
                "program": "spl-token",
                "space": 165
            },
            "lamports": 2039280
        })
    }

    #[test]
    fn keyed_entry_decodes() {
        let entry = json!({ "pubkey": "Acct1", "account": parsed("Owner1", "1500000", 6, Some(1.5)) });
        let record = decode_keyed(&entry).unwrap();
        assert_eq!(record, HolderRecord::new("Owner1", "Acct1", 1.5));
    }

    #[test]
    fn missing_ui_amount_falls_back_to_raw() {
        let record = decode_account("A", &parsed("O", "2500", 3, None)).unwrap();
        assert_eq!(record.amount, 2.5);
    }

    #[test]
    fn missing_owner_is_malformed_with_account_key() {
        let entry = json!({
            "pubkey": "Broken",
            "account": { "data": { "parsed": { "info": { "tokenAmount": { "amount": "1", "decimals": 0 } } } } }
        });
        match decode_keyed(&entry) {
            Err(FetchError::MalformedRecord { account, reason }) => {
                assert_eq!(account, "Broken");
                assert!(reason.contains("owner"));
            }
            other => panic!("expected malformed record, got {:?}", other),
        }
    }

    #[test]
    fn raw_base64_data_is_malformed_not_zero() {
        let value = json!({ "data": ["AAAA", "base64"] });
        assert!(matches!(
            decode_account("A", &value),
            Err(FetchError::MalformedRecord { .. })
        ));
    }

    #[test]
    fn entry_without_pubkey_reports_unknown() {
        let entry = json!({ "account": parsed("O", "1", 0, Some(1.0)) });
        match decode_keyed(&entry) {
            Err(FetchError::MalformedRecord { account, .. }) => assert_eq!(account, UNKNOWN_ACCOUNT),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn program_accounts_accepts_both_shapes() {
        let plain: ProgramAccounts = serde_json::from_value(json!([{ "pubkey": "A" }])).unwrap();
        let (entries, key) = plain.into_parts();
        assert_eq!(entries.len(), 1);
        assert!(key.is_none());

        let wrapped: ProgramAccounts = serde_json::from_value(json!({
            "context": { "slot": 1 },
            "value": [],
            "pageKey": "next"
        }))
        .unwrap();
        let (entries, key) = wrapped.into_parts();
        assert!(entries.is_empty());
        assert_eq!(key.as_deref(), Some("next"));
    }

    #[test]
    fn indexed_decimals_precedence() {
        let with_own = json!({ "address": "A", "owner": "O", "amount": 1_000_000u64, "decimals": 6 });
        assert_eq!(decode_indexed(&with_own, Some(2)).unwrap().amount, 1.0);

        let without = json!({ "address": "A", "owner": "O", "amount": 1_000u64 });
        assert_eq!(decode_indexed(&without, Some(2)).unwrap().amount, 10.0);
        assert_eq!(decode_indexed(&without, None).unwrap().amount, 1000.0);
    }
}
