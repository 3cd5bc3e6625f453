//! # Report Rendering
//!
//! Console and JSON output for a finished run. Console output is a plain
//! text block meant for a terminal; JSON output carries everything,
//! metadata included, for scripts.

use std::fmt;

use serde::Serialize;

use holdscan_engine::rpc::TokenSupply;
use holdscan_engine::{HolderRecord, RunMetadata, ScanReport, Summary};

/// Full machine-readable report.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct JsonReport<'a> {
    metadata: &'a RunMetadata,
    #[serde(skip_serializing_if = "Option::is_none")]
    supply: Option<&'a TokenSupply>,
    summary: Option<Summary>,
    holders: &'a [HolderRecord],
}

pub fn to_json(report: &ScanReport, supply: Option<&TokenSupply>) -> serde_json::Result<String> {
    serde_json::to_string_pretty(&JsonReport {
        metadata: &report.metadata,
        supply,
        summary: report.summary(),
        holders: &report.holders,
    })
}

/// Console rendering of a report: run facts, the largest `rows` holders,
/// and the distribution summary.
pub struct ConsoleReport<'a> {
    pub report: &'a ScanReport,
    pub rows: usize,
    pub supply: Option<&'a TokenSupply>,
}

impl fmt::Display for ConsoleReport<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let meta = &self.report.metadata;
        let holders = &self.report.holders;

        writeln!(f, "Token     : {}", meta.token)?;
        writeln!(f, "Run       : {} ({} ms)", meta.run_id, meta.elapsed_ms)?;
        writeln!(f, "Strategy  : {}", meta.strategy_used)?;
        if !meta.failures.is_empty() {
            for failure in &meta.failures {
                writeln!(f, "  fell back after {}", failure)?;
            }
        }
        if let Some(reason) = meta.stop_reason {
            writeln!(
                f,
                "Pages     : {} in {} calls, stopped: {}",
                meta.pages_fetched,
                meta.page_calls,
                reason.describe()
            )?;
        }
        if meta.shards_attempted > 0 {
            writeln!(
                f,
                "Shards    : {} ok, {} failed",
                meta.successful_shards, meta.failed_shards
            )?;
        }
        if meta.partial {
            writeln!(f, "PARTIAL   : {}", meta.partial_reasons.join("; "))?;
        }
        writeln!(f)?;

        if holders.is_empty() {
            return writeln!(f, "No holders found.");
        }

        let total: f64 = holders.iter().map(|h| h.amount).sum();
        let shown = self.rows.min(holders.len());
        writeln!(f, "Top {} of {} holders", shown, holders.len())?;
        writeln!(
            f,
            "{:>5}  {:<44}  {:<44}  {:>22}  {:>8}{}",
            "#",
            "owner",
            "account",
            "amount",
            "% held",
            if self.supply.is_some() { "  % supply" } else { "" }
        )?;
        for (i, holder) in holders.iter().take(shown).enumerate() {
            write!(
                f,
                "{:>5}  {:<44}  {:<44}  {:>22}  {:>7.3}%",
                i + 1,
                holder.owner,
                holder.account,
                format_amount(holder.amount),
                percent(holder.amount, total)
            )?;
            if let Some(supply) = self.supply {
                write!(f, "  {:>9.4}%", percent(holder.amount, supply.ui_amount))?;
            }
            writeln!(f)?;
        }

        if let Some(summary) = self.report.summary() {
            writeln!(f)?;
            write_summary(f, &summary)?;
        }
        Ok(())
    }
}

fn write_summary(f: &mut fmt::Formatter<'_>, s: &Summary) -> fmt::Result {
    writeln!(f, "Holders          : {}", s.holders)?;
    writeln!(f, "Unique owners    : {}", s.unique_owners)?;
    writeln!(f, "Total held       : {}", format_amount(s.total))?;
    writeln!(f, "Mean / median    : {} / {}", format_amount(s.mean), format_amount(s.median))?;
    writeln!(f, "Max / min        : {} / {}", format_amount(s.max), format_amount(s.min))?;
    writeln!(f, "p90 / p99        : {} / {}", format_amount(s.p90), format_amount(s.p99))?;
    writeln!(f, "Top 10% share    : {:.2}%", s.top_decile_share)?;
    writeln!(f, "Above 1% / 0.1%  : {} / {}", s.above_one_percent, s.above_tenth_percent)?;

    writeln!(f, "Balance above:")?;
    for t in &s.thresholds {
        writeln!(f, "  {:>12}  {}", format_amount(t.threshold), t.holders)?;
    }
    writeln!(f, "Owner key starts with:")?;
    for p in &s.owner_prefixes {
        writeln!(f, "  {}  {}", p.symbol, p.holders)?;
    }
    Ok(())
}

/// Percent of `whole`, or zero when there is nothing to divide by.
fn percent(part: f64, whole: f64) -> f64 {
    if whole > 0.0 {
        part / whole * 100.0
    } else {
        0.0
    }
}

/// Thousands-grouped amount, with up to six decimals and trailing zeros
/// trimmed.
fn format_amount(amount: f64) -> String {
    let fixed = format!("{:.6}", amount);
    let (int_part, frac_part) = fixed.split_once('.').unwrap_or((fixed.as_str(), ""));
    let (sign, digits) = match int_part.strip_prefix('-') {
        Some(rest) => ("-", rest),
        None => ("", int_part),
    };

    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(c);
    }

    let frac = frac_part.trim_end_matches('0');
    if frac.is_empty() {
        format!("{}{}", sign, grouped)
    } else {
        format!("{}{}.{}", sign, grouped, frac)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(holders: Vec<HolderRecord>, partial: bool) -> ScanReport {
        let mut metadata = RunMetadata::new("Mint");
        metadata.strategy_used = "paged".into();
        metadata.partial = partial;
        if partial {
            metadata.partial_reasons = vec!["page limit reached after 3 pages".into()];
        }
        ScanReport { holders, metadata }
    }

    fn holders() -> Vec<HolderRecord> {
        vec![
            HolderRecord::new("OwnerA", "AcctA", 750.0),
            HolderRecord::new("OwnerB", "AcctB", 250.0),
        ]
    }

    #[test]
    fn amounts_are_grouped_and_trimmed() {
        assert_eq!(format_amount(0.0), "0");
        assert_eq!(format_amount(999.5), "999.5");
        assert_eq!(format_amount(1_234_567.25), "1,234,567.25");
        assert_eq!(format_amount(1_000_000.0), "1,000,000");
        assert_eq!(format_amount(0.000001), "0.000001");
    }

    #[test]
    fn console_shows_shares_and_partial_flag() {
        let report = report(holders(), true);
        let text = ConsoleReport { report: &report, rows: 10, supply: None }.to_string();
        assert!(text.contains("Strategy  : paged"));
        assert!(text.contains("PARTIAL   : page limit reached after 3 pages"));
        assert!(text.contains("Top 2 of 2 holders"));
        assert!(text.contains("75.000%"));
        assert!(text.contains("Unique owners    : 2"));
        assert!(!text.contains("% supply"));
    }

    #[test]
    fn console_adds_supply_column_when_known() {
        let report = report(holders(), false);
        let supply = TokenSupply { ui_amount: 10_000.0, decimals: 6 };
        let text = ConsoleReport { report: &report, rows: 1, supply: Some(&supply) }.to_string();
        assert!(text.contains("% supply"));
        assert!(text.contains("7.5000%"));
        assert!(text.contains("Top 1 of 2 holders"));
        assert!(!text.contains("PARTIAL"));
    }

    #[test]
    fn empty_result_says_so() {
        let report = report(Vec::new(), false);
        let text = ConsoleReport { report: &report, rows: 10, supply: None }.to_string();
        assert!(text.contains("No holders found."));
    }

    #[test]
    fn json_carries_holders_summary_and_metadata() {
        let report = report(holders(), false);
        let value: serde_json::Value = serde_json::from_str(&to_json(&report, None).unwrap()).unwrap();
        assert_eq!(value["holders"][0]["owner"], "OwnerA");
        assert_eq!(value["holders"][0]["amount"], 750.0);
        assert_eq!(value["summary"]["holders"], 2);
        assert_eq!(value["metadata"]["strategyUsed"], "paged");
        assert!(value.get("supply").is_none());
    }
}
