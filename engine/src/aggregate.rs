//! # Aggregator / Deduplicator
//!
//! Collects records from any number of pages and shards into one set keyed
//! by account. Inserting an account that is already present overwrites it
//! (last write wins). Two observations of the same account with different
//! balances means the source changed underneath us mid-run; reconciling
//! that is not this component's job.
//!
//! Insertion order is remembered so the final sort can be stable: equal
//! balances come out in the order their accounts were first seen.

use std::collections::HashMap;

use crate::model::HolderRecord;

/// Account-keyed holder set under construction.
///
/// Owned by whichever controller is running; there is never more than one
/// writer, so no locking.
#[derive(Debug, Default, Clone)]
pub struct Aggregator {
    /// Records in first-insertion order.
    records: Vec<HolderRecord>,
    /// account -> position in `records`.
    by_account: HashMap<String, usize>,
    /// Inserts that replaced an existing account.
    overwrites: usize,
    /// Inserts refused for a non-positive amount.
    rejected: usize,
}

impl Aggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts one record. Returns `true` if the account was new.
    pub fn insert(&mut self, record: HolderRecord) -> bool {
        if !record.is_positive() {
            self.rejected += 1;
            return false;
        }
        match self.by_account.get(&record.account) {
            Some(&idx) => {
                self.records[idx] = record;
                self.overwrites += 1;
                false
            }
            None => {
                self.by_account
                    .insert(record.account.clone(), self.records.len());
                self.records.push(record);
                true
            }
        }
    }

    /// Inserts a batch. Returns how many accounts were new.
    pub fn extend<I>(&mut self, records: I) -> usize
    where
        I: IntoIterator<Item = HolderRecord>,
    {
        records
            .into_iter()
            .map(|r| self.insert(r))
            .filter(|new| *new)
            .count()
    }

    /// Folds another aggregator in, as if its records were inserted after
    /// ours in their own insertion order.
    pub fn merge(&mut self, other: Aggregator) -> usize {
        self.extend(other.records)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn contains(&self, account: &str) -> bool {
        self.by_account.contains_key(account)
    }

    pub fn get(&self, account: &str) -> Option<&HolderRecord> {
        self.by_account.get(account).map(|&idx| &self.records[idx])
    }

    pub fn overwrites(&self) -> usize {
        self.overwrites
    }

    pub fn rejected(&self) -> usize {
        self.rejected
    }

    /// Terminal step: every record, sorted by amount descending. The sort
    /// is stable, so ties keep insertion order.
    pub fn materialize(self) -> Vec<HolderRecord> {
        let mut records = self.records;
        records.sort_by(|a, b| b.amount.total_cmp(&a.amount));
        records
    }
}

impl FromIterator<HolderRecord> for Aggregator {
    fn from_iter<T: IntoIterator<Item = HolderRecord>>(iter: T) -> Self {
        let mut agg = Aggregator::new();
        agg.extend(iter);
        agg
    }
}
