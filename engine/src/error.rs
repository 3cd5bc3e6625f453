//! Error types for the enumeration engine.
//!
//! Two layers. [`FetchError`] describes what went wrong with one remote call
//! and is what every backend returns; controllers decide whether to retry,
//! skip, or give up. [`ScanError`] describes why a whole run produced no
//! result at all.
//!
//! A result that is merely incomplete is *not* an error. Safety bounds and
//! partial shard coverage are reported through `RunMetadata::partial`.

use std::fmt;

use thiserror::Error;

/// Failure of a single remote call (one page, one shard, one ranking query).
#[derive(Debug, Clone, Error)]
pub enum FetchError {
    /// Network fault, timeout, throttling, or a backend-side error that may
    /// well succeed if asked again.
    #[error("fetch failed: {0}")]
    Transient(String),

    /// The backend does not support something the request relies on
    /// (a paging parameter, a filter, a method). Retrying is pointless;
    /// the orchestrator should switch strategy instead.
    #[error("unsupported by backend: {0}")]
    Unsupported(String),

    /// One entry in a page could not be decoded into a holder record.
    /// Decoders log and skip these; they never abort a page.
    #[error("malformed record {account}: {reason}")]
    MalformedRecord {
        /// Account key of the offending entry, or `"<unknown>"`.
        account: String,
        /// What was wrong with it.
        reason: String,
    },

    /// The response envelope itself did not have the expected shape.
    #[error("undecodable response: {0}")]
    Decode(String),
}

impl FetchError {
    /// True for the condition that triggers strategy switching.
    pub fn is_unsupported(&self) -> bool {
        matches!(self, FetchError::Unsupported(_))
    }

    /// True for failures a controller may retry.
    pub fn is_transient(&self) -> bool {
        matches!(self, FetchError::Transient(_) | FetchError::Decode(_))
    }

    /// Short machine-friendly label, used in run metadata and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            FetchError::Transient(_) => "transient",
            FetchError::Unsupported(_) => "unsupported",
            FetchError::MalformedRecord { .. } => "malformed_record",
            FetchError::Decode(_) => "decode",
        }
    }
}

/// Why one strategy in the fallback chain failed.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct StrategyFailure {
    /// Strategy name as reported by `Strategy::name`.
    pub strategy: String,
    /// `FetchError::kind` of the failure.
    pub kind: String,
    /// Human-readable reason.
    pub reason: String,
}

impl StrategyFailure {
    /// Records a strategy failure from the error that caused it.
    pub fn new(strategy: impl Into<String>, err: &FetchError) -> Self {
        Self {
            strategy: strategy.into(),
            kind: err.kind().to_string(),
            reason: err.to_string(),
        }
    }
}

impl fmt::Display for StrategyFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}]: {}", self.strategy, self.kind, self.reason)
    }
}

/// Failure of a whole enumeration run.
#[derive(Debug, Error)]
pub enum ScanError {
    /// Every configured strategy failed. Carries the full history so the
    /// caller can see which backend capability is missing.
    #[error("all {} strategies failed: {}", .attempts.len(), join_failures(.attempts))]
    ExhaustedStrategies {
        /// One entry per attempted strategy, in attempt order.
        attempts: Vec<StrategyFailure>,
    },

    /// The orchestrator was given an empty chain.
    #[error("no strategies configured")]
    NoStrategies,

    /// Options or inputs failed validation before any call was made.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

fn join_failures(attempts: &[StrategyFailure]) -> String {
    attempts
        .iter()
        .map(|a| a.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification_helpers() {
        assert!(FetchError::Unsupported("limit".into()).is_unsupported());
        assert!(!FetchError::Unsupported("limit".into()).is_transient());
        assert!(FetchError::Transient("timeout".into()).is_transient());
        assert!(FetchError::Decode("missing result".into()).is_transient());
        assert!(!FetchError::MalformedRecord {
            account: "A".into(),
            reason: "no owner".into()
        }
        .is_transient());
    }

    #[test]
    fn exhausted_error_names_every_strategy() {
        let err = ScanError::ExhaustedStrategies {
            attempts: vec![
                StrategyFailure::new("cursor", &FetchError::Unsupported("before".into())),
                StrategyFailure::new("top", &FetchError::Transient("503".into())),
            ],
        };
        let msg = err.to_string();
        assert!(msg.starts_with("all 2 strategies failed"));
        assert!(msg.contains("cursor [unsupported]"));
        assert!(msg.contains("top [transient]"));
    }
}
