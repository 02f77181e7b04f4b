use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Direction of an order or a breakout
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn opposite(self) -> Side {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }

    /// Apply the broker sign convention: buys are positive, sells negative
    pub fn signed(self, magnitude: u64) -> i64 {
        let units = magnitude as i64;
        match self {
            Side::Buy => units,
            Side::Sell => -units,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Buy => write!(f, "BUY"),
            Side::Sell => write!(f, "SELL"),
        }
    }
}

/// Which side of the book the account currently holds
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum PositionSide {
    #[default]
    Flat,
    Long,
    Short,
}

impl PositionSide {
    /// Order side that opened this position, `None` when flat
    pub fn entry_side(self) -> Option<Side> {
        match self {
            PositionSide::Flat => None,
            PositionSide::Long => Some(Side::Buy),
            PositionSide::Short => Some(Side::Sell),
        }
    }
}

impl fmt::Display for PositionSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PositionSide::Flat => write!(f, "FLAT"),
            PositionSide::Long => write!(f, "LONG"),
            PositionSide::Short => write!(f, "SHORT"),
        }
    }
}

/// Mid-price candle for one granularity window
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PriceBar {
    pub open_time: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    /// Only bars the broker marks final take part in range analysis
    pub complete: bool,
}

/// Latest quote for an instrument
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct LivePrice {
    pub bid: f64,
    pub ask: f64,
}

impl LivePrice {
    pub fn mid(&self) -> f64 {
        (self.ask + self.bid) / 2.0
    }

    pub fn spread(&self) -> f64 {
        self.ask - self.bid
    }
}

/// One side of the broker-reported position
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct SideHolding {
    /// Signed units: positive for long, negative for short
    pub units: i64,
    pub average_price: f64,
    pub trade_ids: Vec<String>,
    pub unrealized_pl: f64,
}

/// Raw per-instrument position as the broker reports it
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct PositionSnapshot {
    pub instrument: String,
    pub long: SideHolding,
    pub short: SideHolding,
    pub unrealized_pl: f64,
}

impl PositionSnapshot {
    /// Snapshot of an instrument the account has never held
    pub fn flat(instrument: &str) -> Self {
        Self {
            instrument: instrument.to_string(),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct AccountSummary {
    pub balance: f64,
    pub unrealized_pl: f64,
}

/// Broker-side order lifecycle state
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum OrderStatus {
    Pending,
    Filled,
    Triggered,
    Cancelled,
    Other(String),
}

impl OrderStatus {
    pub fn parse(state: &str) -> Self {
        match state {
            "PENDING" => OrderStatus::Pending,
            "FILLED" => OrderStatus::Filled,
            "TRIGGERED" => OrderStatus::Triggered,
            "CANCELLED" => OrderStatus::Cancelled,
            other => OrderStatus::Other(other.to_string()),
        }
    }
}

/// Sums over a set of trades
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
pub struct TradeTotals {
    pub realized_pl: f64,
    pub unrealized_pl: f64,
    /// Signed current units across the trades
    pub units: i64,
}
