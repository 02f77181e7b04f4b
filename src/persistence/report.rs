use chrono::DateTime;
use std::fmt;

use super::history::{BalanceHistory, TradeAction, TradeHistory};
use crate::models::Side;

/// Aggregate view of the persisted balance curve and trade log
#[derive(Debug, Clone, PartialEq, Default)]
pub struct LedgerSummary {
    pub balance_samples: usize,
    pub first_time: Option<i64>,
    pub last_time: Option<i64>,
    pub latest_pl: Option<f64>,
    pub peak_pl: Option<f64>,
    /// Largest fall from a running peak of the P/L curve
    pub max_drawdown: f64,
    pub trades: usize,
    pub buys: usize,
    pub sells: usize,
    pub opens: usize,
    pub closes: usize,
}

impl LedgerSummary {
    pub fn from_histories(balance: &BalanceHistory, trades: &TradeHistory) -> Self {
        let mut peak = f64::MIN;
        let mut max_drawdown: f64 = 0.0;
        for &pl in &balance.total_pl {
            peak = peak.max(pl);
            max_drawdown = max_drawdown.max(peak - pl);
        }

        let count_side = |side: Side| trades.side.iter().filter(|s| **s == side).count();
        let count_action = |action: TradeAction| trades.action.iter().filter(|a| **a == action).count();

        Self {
            balance_samples: balance.len(),
            first_time: balance.x.first().copied(),
            last_time: balance.x.last().copied(),
            latest_pl: balance.total_pl.last().copied(),
            peak_pl: (!balance.is_empty()).then_some(peak),
            max_drawdown,
            trades: trades.len(),
            buys: count_side(Side::Buy),
            sells: count_side(Side::Sell),
            opens: count_action(TradeAction::Open),
            closes: count_action(TradeAction::Close),
        }
    }
}

fn time_label(ts: Option<i64>) -> String {
    ts.and_then(|t| DateTime::from_timestamp(t, 0))
        .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| "-".to_string())
}

fn amount(value: Option<f64>) -> String {
    value.map(|v| format!("{:.2}", v)).unwrap_or_else(|| "-".to_string())
}

impl fmt::Display for LedgerSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Balance samples: {}", self.balance_samples)?;
        writeln!(
            f,
            "  Period:       {} → {}",
            time_label(self.first_time),
            time_label(self.last_time)
        )?;
        writeln!(f, "  Latest P/L:   {}", amount(self.latest_pl))?;
        writeln!(f, "  Peak P/L:     {}", amount(self.peak_pl))?;
        writeln!(f, "  Max drawdown: {:.2}", self.max_drawdown)?;
        writeln!(f)?;
        writeln!(f, "Trades: {}", self.trades)?;
        writeln!(f, "  BUY:   {:>5}   SELL:  {:>5}", self.buys, self.sells)?;
        write!(f, "  OPEN:  {:>5}   CLOSE: {:>5}", self.opens, self.closes)
    }
}
