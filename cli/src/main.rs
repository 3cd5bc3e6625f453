// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # holdscan
//!
//! Entry point for the `holdscan` binary. Parses CLI arguments, initializes
//! logging, runs a scan through the engine and renders the result.
//!
//! The binary supports three subcommands:
//!
//! - `scan`    — enumerate every holder of a token
//! - `top`     — the largest holders only, with share of supply
//! - `version` — print build version information

mod cli;
mod logging;
mod metrics;
mod report;

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use holdscan_engine::rpc::{RpcClient, TokenSupply};
use holdscan_engine::{HolderScanner, ScanOptions, ScanReport};

use cli::{Commands, EndpointArgs, HoldscanCli};
use metrics::ScanMetrics;
use report::ConsoleReport;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = HoldscanCli::parse();

    match cli.command {
        Commands::Scan(args) => {
            logging::init_logging(logging::DEFAULT_FILTER, cli.log_format);
            run_scan(&cli.endpoint, args).await
        }
        Commands::Top(args) => {
            logging::init_logging(logging::DEFAULT_FILTER, cli.log_format);
            run_top(&cli.endpoint, args).await
        }
        Commands::Version => {
            print_version();
            Ok(())
        }
    }
}

/// Full enumeration.
async fn run_scan(endpoint: &EndpointArgs, args: cli::ScanArgs) -> Result<()> {
    let options = args.options().context("invalid scan options")?;
    let client = connect(endpoint)?;
    let metrics = ScanMetrics::new().context("failed to create metrics registry")?;

    tracing::info!(
        mint = %args.mint,
        endpoint = client.host().unwrap_or("?"),
        fast_index = client.has_fast_index(),
        strategy = %args.strategy,
        "starting holder scan"
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let interrupt = watch_interrupt(shutdown_tx);
    let scanner = HolderScanner::new(Arc::clone(&client), options)?.with_shutdown(shutdown_rx.clone());

    let timer = metrics.run_duration_seconds.start_timer();
    let outcome = scanner.scan(&args.mint).await;
    timer.observe_duration();
    interrupt.abort();

    let report = outcome.with_context(|| format!("scan of {} failed", args.mint))?;
    metrics.record(&report);

    // A supply lookup after Ctrl+C would only delay exit.
    let supply = if *shutdown_rx.borrow() {
        None
    } else {
        lookup_supply(&scanner, &args.mint).await
    };

    emit(&report, supply.as_ref(), args.top, args.json)?;
    if args.metrics {
        eprintln!("{}", metrics.encode()?);
    }

    drop(scanner);
    if let Ok(client) = Arc::try_unwrap(client) {
        client.dispose();
    }
    Ok(())
}

/// Largest holders only.
async fn run_top(endpoint: &EndpointArgs, args: cli::TopArgs) -> Result<()> {
    let client = connect(endpoint)?;
    let scanner = HolderScanner::new(client, ScanOptions::default())?;

    let report = scanner
        .top(&args.mint, args.limit)
        .await
        .with_context(|| format!("top holders of {} failed", args.mint))?;
    let supply = lookup_supply(&scanner, &args.mint).await;

    emit(&report, supply.as_ref(), args.limit, args.json)
}

fn connect(endpoint: &EndpointArgs) -> Result<Arc<RpcClient>> {
    let client = RpcClient::create(endpoint.client_config())
        .with_context(|| format!("cannot use endpoint {}", endpoint.rpc_url))?;
    Ok(Arc::new(client))
}

/// Supply is only used for display, so a failed lookup is logged and
/// the report goes out without the column.
async fn lookup_supply(scanner: &HolderScanner, mint: &str) -> Option<TokenSupply> {
    match scanner.token_supply(mint).await {
        Ok(supply) => Some(supply),
        Err(e) => {
            tracing::warn!(error = %e, "token supply unavailable");
            None
        }
    }
}

fn emit(report: &ScanReport, supply: Option<&TokenSupply>, rows: usize, json: bool) -> Result<()> {
    if json {
        println!("{}", report::to_json(report, supply)?);
    } else {
        print!("{}", ConsoleReport { report, rows, supply });
    }
    if report.is_partial() {
        tracing::warn!(
            reasons = ?report.metadata.partial_reasons,
            "result is partial, some holders may be missing"
        );
    }
    Ok(())
}

/// Flips the shutdown channel on Ctrl+C. The scan then returns whatever it
/// has merged so far, flagged partial.
fn watch_interrupt(shutdown: watch::Sender<bool>) -> JoinHandle<()> {
    tokio::spawn(async move {
        match signal::ctrl_c().await {
            Ok(()) => {
                tracing::warn!("interrupt received, finishing with partial results");
                let _ = shutdown.send(true);
            }
            Err(e) => tracing::error!("failed to install Ctrl+C handler: {}", e),
        }
    })
}

/// Prints version information to stdout.
fn print_version() {
    println!("holdscan {}", env!("CARGO_PKG_VERSION"));
    println!("rustc    {}", rustc_version());
}

/// Returns the Rust compiler version used to build this binary.
fn rustc_version() -> &'static str {
    option_env!("RUSTC_VERSION").unwrap_or("unknown")
}
