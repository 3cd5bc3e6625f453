//! # Summary Statistics
//!
//! Descriptive numbers over a finished, materialized holder set. Pure:
//! nothing here mutates its input or touches the network.

use serde::Serialize;

use crate::config::DISTRIBUTION_THRESHOLDS;
use crate::model::HolderRecord;

/// How many leading owner symbols the distribution keeps.
const OWNER_PREFIX_TOP: usize = 10;

/// Holders whose balance is strictly above `threshold`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ThresholdCount {
    pub threshold: f64,
    pub holders: usize,
}

/// Owner keys starting with `symbol`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PrefixCount {
    pub symbol: char,
    pub holders: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Summary {
    pub holders: usize,
    pub unique_owners: usize,
    pub total: f64,
    pub mean: f64,
    pub max: f64,
    pub min: f64,
    pub median: f64,
    pub p90: f64,
    pub p99: f64,
    /// Percent of `total` held by the largest 10 % of holders.
    pub top_decile_share: f64,
    /// Holders with more than 1 % of `total`.
    pub above_one_percent: usize,
    /// Holders with more than 0.1 % of `total`.
    pub above_tenth_percent: usize,
    pub thresholds: Vec<ThresholdCount>,
    pub owner_prefixes: Vec<PrefixCount>,
}

/// Summarizes `records`, which must be sorted by amount descending as
/// [`Aggregator::materialize`](crate::aggregate::Aggregator::materialize)
/// leaves them. Returns `None` for an empty set.
pub fn summarize(records: &[HolderRecord]) -> Option<Summary> {
    let n = records.len();
    let first = records.first()?;
    let last = records.last()?;

    let total: f64 = records.iter().map(|r| r.amount).sum();
    let share = |fraction: f64| records.iter().filter(|r| r.amount > total * fraction).count();

    let decile = (n as f64 * 0.1).ceil() as usize;
    let decile_sum: f64 = records[..decile].iter().map(|r| r.amount).sum();
    let top_decile_share = if total > 0.0 {
        decile_sum / total * 100.0
    } else {
        0.0
    };

    let thresholds = DISTRIBUTION_THRESHOLDS
        .iter()
        .map(|&threshold| ThresholdCount {
            threshold,
            holders: records.iter().filter(|r| r.amount > threshold).count(),
        })
        .collect();

    let mut owners: Vec<&str> = records.iter().map(|r| r.owner.as_str()).collect();
    owners.sort_unstable();
    owners.dedup();

    Some(Summary {
        holders: n,
        unique_owners: owners.len(),
        total,
        mean: total / n as f64,
        max: first.amount,
        min: last.amount,
        median: records[n / 2].amount,
        p90: percentile(records, 90.0),
        p99: percentile(records, 99.0),
        top_decile_share,
        above_one_percent: share(0.01),
        above_tenth_percent: share(0.001),
        thresholds,
        owner_prefixes: owner_prefixes(records),
    })
}

/// Nearest-rank percentile over a descending sequence.
fn percentile(desc: &[HolderRecord], p: f64) -> f64 {
    let n = desc.len();
    let rank = ((p / 100.0) * n as f64).ceil().max(1.0) as usize;
    // rank counts from the small end; flip it onto the descending order.
    desc[n - rank.min(n)].amount
}

/// Most common leading symbols of owner keys, ties in symbol order.
fn owner_prefixes(records: &[HolderRecord]) -> Vec<PrefixCount> {
    let mut counts: Vec<PrefixCount> = Vec::new();
    for symbol in records.iter().filter_map(|r| r.owner.chars().next()) {
        match counts.iter_mut().find(|c| c.symbol == symbol) {
            Some(c) => c.holders += 1,
            None => counts.push(PrefixCount { symbol, holders: 1 }),
        }
    }
    counts.sort_by(|a, b| b.holders.cmp(&a.holders).then(a.symbol.cmp(&b.symbol)));
    counts.truncate(OWNER_PREFIX_TOP);
    counts
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descending(amounts: &[f64]) -> Vec<HolderRecord> {
        amounts
            .iter()
            .enumerate()
            .map(|(i, &a)| HolderRecord::new(format!("O{}", i), format!("A{}", i), a))
            .collect()
    }

    #[test]
    fn empty_set_has_no_summary() {
        assert!(summarize(&[]).is_none());
    }

    #[test]
    fn basic_aggregates() {
        let records = descending(&[100.0, 50.0, 25.0, 25.0]);
        let s = summarize(&records).unwrap();
        assert_eq!(s.holders, 4);
        assert_eq!(s.total, 200.0);
        assert_eq!(s.mean, 50.0);
        assert_eq!(s.max, 100.0);
        assert_eq!(s.min, 25.0);
        assert_eq!(s.median, 25.0);
    }

    #[test]
    fn nearest_rank_percentiles() {
        let amounts: Vec<f64> = (1..=100).rev().map(f64::from).collect();
        let s = summarize(&descending(&amounts)).unwrap();
        assert_eq!(s.p90, 90.0);
        assert_eq!(s.p99, 99.0);

        let one = summarize(&descending(&[7.0])).unwrap();
        assert_eq!(one.p90, 7.0);
        assert_eq!(one.median, 7.0);
    }

    #[test]
    fn thresholds_count_strictly_greater() {
        let records = descending(&[2_000_000.0, 1_000.0, 999.0, 100.0]);
        let s = summarize(&records).unwrap();
        let by_threshold: Vec<(f64, usize)> =
            s.thresholds.iter().map(|t| (t.threshold, t.holders)).collect();
        assert_eq!(
            by_threshold,
            vec![
                (1_000_000.0, 1),
                (100_000.0, 1),
                (10_000.0, 1),
                (1_000.0, 1),
                (100.0, 3)
            ]
        );
    }

    #[test]
    fn concentration_metrics() {
        let mut amounts = vec![910.0];
        amounts.extend(std::iter::repeat(10.0).take(9));
        let s = summarize(&descending(&amounts)).unwrap();
        // Top 10% of 10 holders is one holder with 910 of 1000.
        assert!((s.top_decile_share - 91.0).abs() < 1e-9);
        // 10.0 is exactly 1%, not above it.
        assert_eq!(s.above_one_percent, 1);
        assert_eq!(s.above_tenth_percent, 10);
    }

    #[test]
    fn owner_prefix_distribution() {
        let records = vec![
            HolderRecord::new("Abc", "1", 3.0),
            HolderRecord::new("Axy", "2", 2.0),
            HolderRecord::new("9zz", "3", 1.0),
            HolderRecord::new("Abc", "4", 0.5),
        ];
        let s = summarize(&records).unwrap();
        assert_eq!(s.unique_owners, 3);
        assert_eq!(
            s.owner_prefixes,
            vec![
                PrefixCount { symbol: 'A', holders: 3 },
                PrefixCount { symbol: '9', holders: 1 }
            ]
        );
    }

    #[test]
    fn input_is_not_mutated() {
        let records = descending(&[3.0, 2.0, 1.0]);
        let before = records.clone();
        summarize(&records);
        assert_eq!(records, before);
    }
}
