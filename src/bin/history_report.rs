//! Ledger Summary
//!
//! Prints the balance curve and trade log the bot keeps on disk:
//! sample counts, latest and peak P/L, max drawdown, trades by side/action.
use anyhow::{Context, Result};
use clap::Parser;
use fxbot::persistence::history::load;
use fxbot::persistence::{BalanceHistory, LedgerSummary, TradeHistory};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "history_report", about = "Summarize the persisted balance and trade history")]
struct Args {
    #[arg(long, default_value = "./balance.json")]
    balance: PathBuf,

    #[arg(long, default_value = "./trade.json")]
    trade: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().with_env_filter("fxbot=warn").init();

    let args = Args::parse();

    let balance: BalanceHistory = load(&args.balance)
        .await
        .with_context(|| format!("reading {}", args.balance.display()))?;
    let trades: TradeHistory = load(&args.trade)
        .await
        .with_context(|| format!("reading {}", args.trade.display()))?;

    println!("\n═══════════════════════════════════════════════════════");
    println!("                  FXBOT HISTORY REPORT");
    println!("═══════════════════════════════════════════════════════\n");

    println!("{}", LedgerSummary::from_histories(&balance, &trades));

    println!("\n═══════════════════════════════════════════════════════\n");

    Ok(())
}
