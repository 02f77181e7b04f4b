#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{Duration, Utc};
use fxbot::api::{Broker, BrokerError};
use fxbot::config::{Parameters, RuntimeSettings};
use fxbot::models::{
    AccountSummary, LivePrice, OrderStatus, PositionSnapshot, PriceBar, SideHolding, TradeTotals,
};
use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard};

/// Scripted broker state; tests set it up and inspect it afterwards
#[derive(Default)]
pub struct MockState {
    pub position: Option<PositionSnapshot>,
    /// Returned by `get_position` once any order has been submitted
    pub position_after_order: Option<PositionSnapshot>,
    pub bars: Option<Vec<PriceBar>>,
    pub price: Option<LivePrice>,
    /// Served before `price` by successive quote requests
    pub price_queue: VecDeque<LivePrice>,
    pub account: Option<AccountSummary>,
    /// Orders are accepted but never get an id
    pub reject_orders: bool,
    /// Status polls until an order reports FILLED; `None` never fills
    pub fills_after: Option<u32>,
    /// Every order reports CANCELLED, as a killed FOK order does
    pub cancel_orders: bool,
    pub closed_totals: TradeTotals,
    pub open_totals: TradeTotals,

    pub submitted: Vec<(String, i64)>,
    pub polls: HashMap<String, u32>,
    pub quote_requests: u32,
    pub closed_trade_queries: Vec<Vec<String>>,
    pub open_trade_queries: Vec<Vec<String>>,
}

#[derive(Default)]
pub struct MockBroker {
    state: Mutex<MockState>,
}

impl MockBroker {
    pub fn new(state: MockState) -> Self {
        Self {
            state: Mutex::new(state),
        }
    }

    pub fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap()
    }

    pub fn total_polls(&self) -> u32 {
        self.state().polls.values().sum()
    }
}

#[async_trait]
impl Broker for MockBroker {
    async fn get_position(&self, _instrument: &str) -> Result<Option<PositionSnapshot>, BrokerError> {
        let state = self.state();
        if !state.submitted.is_empty() && state.position_after_order.is_some() {
            return Ok(state.position_after_order.clone());
        }
        Ok(state.position.clone())
    }

    async fn get_recent_bars(
        &self,
        _instrument: &str,
        _granularity: &str,
        _count: usize,
    ) -> Result<Option<Vec<PriceBar>>, BrokerError> {
        Ok(self.state().bars.clone())
    }

    async fn get_live_price(&self, _instrument: &str) -> Result<Option<LivePrice>, BrokerError> {
        let mut state = self.state();
        state.quote_requests += 1;
        if let Some(next) = state.price_queue.pop_front() {
            return Ok(Some(next));
        }
        Ok(state.price)
    }

    async fn get_account(&self) -> Result<Option<AccountSummary>, BrokerError> {
        Ok(self.state().account)
    }

    async fn submit_market_order(
        &self,
        instrument: &str,
        units: i64,
    ) -> Result<Option<String>, BrokerError> {
        let mut state = self.state();
        state.submitted.push((instrument.to_string(), units));
        if state.reject_orders {
            return Ok(None);
        }
        Ok(Some(format!("ord-{}", state.submitted.len())))
    }

    async fn get_order_status(&self, order_id: &str) -> Result<Option<OrderStatus>, BrokerError> {
        let mut state = self.state();
        let polls = state.polls.entry(order_id.to_string()).or_insert(0);
        *polls += 1;
        let polls = *polls;

        let status = match state.fills_after {
            _ if state.cancel_orders => OrderStatus::Cancelled,
            Some(n) if polls >= n => OrderStatus::Filled,
            _ => OrderStatus::Pending,
        };
        Ok(Some(status))
    }

    async fn get_closed_trades(&self, trade_ids: &[String]) -> Result<TradeTotals, BrokerError> {
        let mut state = self.state();
        state.closed_trade_queries.push(trade_ids.to_vec());
        Ok(state.closed_totals)
    }

    async fn get_open_trades(&self, trade_ids: &[String]) -> Result<TradeTotals, BrokerError> {
        let mut state = self.state();
        state.open_trade_queries.push(trade_ids.to_vec());
        Ok(state.open_totals)
    }
}

// ============================================================================
// Fixtures
// ============================================================================

pub fn params() -> Parameters {
    Parameters {
        instrument: "EUR_USD".to_string(),
        granularity: "M1".to_string(),
        granularity_secs: 60,
        span: 3,
        threshold: 0.001,
        profit_rate: 0.001,
        loss_rate: 0.001,
        max_spread: 0.0002,
        units: 100,
    }
}

pub fn runtime() -> RuntimeSettings {
    let tag = uuid::Uuid::new_v4();
    RuntimeSettings {
        initial_balance: 500_000.0,
        balance_file: temp_file(&format!("balance-{}", tag)),
        trade_file: temp_file(&format!("trade-{}", tag)),
        history_cap: 5000,
        notify_interval_secs: 14_400,
    }
}

pub fn temp_file(name: &str) -> PathBuf {
    std::env::temp_dir().join(format!("fxbot-test-{}.json", name))
}

/// Removes a test's ledger files when dropped
pub struct LedgerFiles(Vec<PathBuf>);

impl LedgerFiles {
    pub fn of(runtime: &RuntimeSettings) -> Self {
        Self(vec![runtime.balance_file.clone(), runtime.trade_file.clone()])
    }
}

impl Drop for LedgerFiles {
    fn drop(&mut self) {
        for path in &self.0 {
            let _ = std::fs::remove_file(path);
            let mut tmp = path.as_os_str().to_owned();
            tmp.push(".tmp");
            let _ = std::fs::remove_file(PathBuf::from(tmp));
        }
    }
}

/// Three completed bars (highs 1.11..1.13, lows 1.04..1.06) plus one
/// forming bar, the last completed one opened `2 * granularity` ago
pub fn recent_bars() -> Vec<PriceBar> {
    bars_ending(Utc::now() - Duration::seconds(60))
}

/// Same bars, the forming one opened at `last_open`
pub fn bars_ending(last_open: chrono::DateTime<Utc>) -> Vec<PriceBar> {
    let ranges = [(1.11, 1.04), (1.12, 1.05), (1.13, 1.06)];
    let mut bars: Vec<PriceBar> = ranges
        .iter()
        .enumerate()
        .map(|(i, &(high, low))| PriceBar {
            open_time: last_open - Duration::seconds(60 * (3 - i as i64)),
            open: low,
            high,
            low,
            close: high,
            complete: true,
        })
        .collect();

    bars.push(PriceBar {
        open_time: last_open,
        open: 1.13,
        high: 1.20,
        low: 1.00,
        close: 1.13,
        complete: false,
    });
    bars
}

/// Quote with a 0.0001 spread around `mid`
pub fn quote(mid: f64) -> LivePrice {
    LivePrice {
        bid: mid - 0.00005,
        ask: mid + 0.00005,
    }
}

pub fn wide_quote(mid: f64) -> LivePrice {
    LivePrice {
        bid: mid - 0.0005,
        ask: mid + 0.0005,
    }
}

pub fn long(units: i64, average_price: f64, ids: &[&str]) -> PositionSnapshot {
    PositionSnapshot {
        long: holding(units, average_price, ids),
        ..PositionSnapshot::flat("EUR_USD")
    }
}

pub fn short(units: i64, average_price: f64, ids: &[&str]) -> PositionSnapshot {
    PositionSnapshot {
        short: holding(-units, average_price, ids),
        ..PositionSnapshot::flat("EUR_USD")
    }
}

fn holding(units: i64, average_price: f64, ids: &[&str]) -> SideHolding {
    SideHolding {
        units,
        average_price,
        trade_ids: ids.iter().map(|s| s.to_string()).collect(),
        unrealized_pl: 0.0,
    }
}

/// Open market with a flat account and every order filling on first poll
pub fn open_market(position: PositionSnapshot, mid: f64) -> MockState {
    MockState {
        position: Some(position),
        bars: Some(recent_bars()),
        price: Some(quote(mid)),
        account: Some(AccountSummary {
            balance: 500_100.0,
            unrealized_pl: 5.0,
        }),
        fills_after: Some(1),
        ..Default::default()
    }
}
