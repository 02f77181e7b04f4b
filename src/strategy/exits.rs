use crate::models::Side;
use std::fmt;

/// Why a held position is being closed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    /// Breakout against the held side on a wide enough range
    Reversal,
    TakeProfit,
    LossCut,
}

impl fmt::Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExitReason::Reversal => write!(f, "reversal"),
            ExitReason::TakeProfit => write!(f, "take-profit"),
            ExitReason::LossCut => write!(f, "loss-cut"),
        }
    }
}

/// Fractional move in the position's favour: `(price-avg)/avg` for a long,
/// `(avg-price)/avg` for a short
pub fn favourable_move(entry: Side, average_price: f64, price: f64) -> f64 {
    match entry {
        Side::Buy => (price - average_price) / average_price,
        Side::Sell => (average_price - price) / average_price,
    }
}

pub fn is_profit_filled(entry: Side, average_price: f64, price: f64, profit_rate: f64) -> bool {
    favourable_move(entry, average_price, price) >= profit_rate
}

pub fn is_loss_filled(entry: Side, average_price: f64, price: f64, loss_rate: f64) -> bool {
    favourable_move(entry, average_price, price) <= -loss_rate
}

/// Take-profit / loss-cut test for a held position
pub fn check_exit(
    entry: Side,
    average_price: f64,
    price: f64,
    profit_rate: f64,
    loss_rate: f64,
) -> Option<ExitReason> {
    if average_price <= 0.0 {
        tracing::warn!("Average entry price {} is not usable, skipping exit check", average_price);
        return None;
    }
    if is_loss_filled(entry, average_price, price, loss_rate) {
        return Some(ExitReason::LossCut);
    }
    if is_profit_filled(entry, average_price, price, profit_rate) {
        return Some(ExitReason::TakeProfit);
    }
    None
}
