pub mod notify;
pub mod oanda;

pub use notify::{LogNotifier, Notifier, NotifyError, WebhookNotifier};
pub use oanda::{OandaClient, OandaEnvironment};

use async_trait::async_trait;
use thiserror::Error;

use crate::models::{AccountSummary, LivePrice, OrderStatus, PositionSnapshot, PriceBar, TradeTotals};

/// Failures talking to the broker
///
/// `Ok(None)` from a [`Broker`] call means the data is simply absent; these
/// variants cover the cases where the call itself went wrong.
#[derive(Error, Debug)]
pub enum BrokerError {
    #[error("network error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("broker returned HTTP {status}: {message}")]
    Api { status: u16, message: String },

    #[error("malformed response: {0}")]
    Malformed(String),
}

impl From<serde_json::Error> for BrokerError {
    fn from(e: serde_json::Error) -> Self {
        BrokerError::Malformed(e.to_string())
    }
}

/// Operations the trading engine needs from a broker account
#[async_trait]
pub trait Broker: Send + Sync {
    /// Position for one instrument; both sides reported independently
    async fn get_position(&self, instrument: &str) -> Result<Option<PositionSnapshot>, BrokerError>;

    /// Most recent `count` mid-price bars, oldest first
    async fn get_recent_bars(
        &self,
        instrument: &str,
        granularity: &str,
        count: usize,
    ) -> Result<Option<Vec<PriceBar>>, BrokerError>;

    async fn get_live_price(&self, instrument: &str) -> Result<Option<LivePrice>, BrokerError>;

    async fn get_account(&self) -> Result<Option<AccountSummary>, BrokerError>;

    /// Submit a market order; positive units buy, negative units sell.
    /// Returns the broker order id if the order was accepted.
    async fn submit_market_order(
        &self,
        instrument: &str,
        units: i64,
    ) -> Result<Option<String>, BrokerError>;

    async fn get_order_status(&self, order_id: &str) -> Result<Option<OrderStatus>, BrokerError>;

    async fn get_closed_trades(&self, trade_ids: &[String]) -> Result<TradeTotals, BrokerError>;

    async fn get_open_trades(&self, trade_ids: &[String]) -> Result<TradeTotals, BrokerError>;
}
