// Per-frame decision cycle: read broker state, decide, trade, record
pub mod message;
pub mod runner;

pub use message::NotificationMessage;
pub use runner::run_until;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::Instrument;
use uuid::Uuid;

use crate::api::Broker;
use crate::config::{Parameters, RuntimeSettings};
use crate::execution::{ExecutionPolicy, OrderExecutor, OrderOutcome, OrderRequest, PositionError, PositionView};
use crate::models::{PositionSide, PriceBar, Side};
use crate::persistence::{HistoryLedger, LedgerError, TradeAction};
use crate::strategy::{completed_window, BreakoutStrategy, ExitReason, RangeSnapshot};

/// Bars older than this many granularities mean the market is closed
const MARKET_CLOSED_FACTOR: i64 = 3;

#[derive(Error, Debug)]
pub enum EngineError {
    /// Only consistency faults reach the caller; I/O trouble is logged
    #[error("history ledger fault: {0}")]
    Ledger(#[from] LedgerError),
}

/// Why a frame stopped before deciding anything
#[derive(Debug, Clone, PartialEq)]
pub enum SkipReason {
    PositionUnavailable,
    BarsUnavailable,
    PriceUnavailable,
    Hedged(PositionError),
    MarketClosed { last_bar: DateTime<Utc>, age_secs: i64 },
}

#[derive(Debug, Clone)]
pub struct FrameSummary {
    pub message: NotificationMessage,
    pub breakout: Option<Side>,
    pub exit: Option<ExitReason>,
    /// Outcome of the close leg, if one was attempted
    pub close: Option<OrderOutcome>,
    /// Outcome of the open leg, if one was attempted
    pub open: Option<OrderOutcome>,
}

#[derive(Debug, Clone)]
pub enum FrameOutcome {
    Skipped(SkipReason),
    Completed(Box<FrameSummary>),
}

impl FrameOutcome {
    pub fn message(&self) -> Option<&NotificationMessage> {
        match self {
            FrameOutcome::Completed(summary) => Some(&summary.message),
            FrameOutcome::Skipped(_) => None,
        }
    }
}

pub struct Engine<B: Broker> {
    broker: B,
    params: Parameters,
    strategy: BreakoutStrategy,
    policy: ExecutionPolicy,
    ledger: HistoryLedger,
    initial_balance: f64,
}

impl<B: Broker> Engine<B> {
    pub fn new(broker: B, params: Parameters, runtime: &RuntimeSettings) -> Self {
        let ledger = HistoryLedger::new(
            runtime.balance_file.clone(),
            runtime.trade_file.clone(),
            runtime.history_cap,
        );

        Self {
            broker,
            strategy: BreakoutStrategy::new(&params),
            params,
            policy: ExecutionPolicy::default(),
            ledger,
            initial_balance: runtime.initial_balance,
        }
    }

    pub fn with_policy(mut self, policy: ExecutionPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn broker(&self) -> &B {
        &self.broker
    }

    pub fn ledger(&self) -> &HistoryLedger {
        &self.ledger
    }

    /// Run one decision frame
    ///
    /// Missing broker data or a closed market end the frame early as
    /// [`FrameOutcome::Skipped`]. The only error is a ledger consistency
    /// fault, which must stop the bot.
    pub async fn run_frame(&self) -> Result<FrameOutcome, EngineError> {
        let span = tracing::info_span!("frame", id = %Uuid::new_v4());
        self.frame().instrument(span).await
    }

    async fn frame(&self) -> Result<FrameOutcome, EngineError> {
        let started = Utc::now();
        let instrument = self.params.instrument.as_str();

        // ====================================================================
        // Read broker state
        // ====================================================================
        let (position, bars, price) = tokio::join!(
            self.broker.get_position(instrument),
            self.broker
                .get_recent_bars(instrument, &self.params.granularity, self.params.span + 1),
            self.broker.get_live_price(instrument),
        );

        let snapshot = match position {
            Ok(Some(s)) => s,
            Ok(None) => return Ok(skip(SkipReason::PositionUnavailable)),
            Err(e) => {
                tracing::warn!("Position request failed: {}", e);
                return Ok(skip(SkipReason::PositionUnavailable));
            }
        };
        let bars = match bars {
            Ok(Some(b)) => b,
            Ok(None) => return Ok(skip(SkipReason::BarsUnavailable)),
            Err(e) => {
                tracing::warn!("Candle request failed: {}", e);
                return Ok(skip(SkipReason::BarsUnavailable));
            }
        };
        let price = match price {
            Ok(Some(p)) => p,
            Ok(None) => return Ok(skip(SkipReason::PriceUnavailable)),
            Err(e) => {
                tracing::warn!("Pricing request failed: {}", e);
                return Ok(skip(SkipReason::PriceUnavailable));
            }
        };

        let (window, full) = completed_window(&bars, self.params.span);
        let Some(last_bar) = window.last().map(|b: &PriceBar| b.open_time) else {
            return Ok(skip(SkipReason::BarsUnavailable));
        };
        if !full {
            tracing::warn!(
                "Only {} completed bars available, expected {}",
                window.len(),
                self.params.span
            );
        }

        let age_secs = (started - last_bar).num_seconds();
        if age_secs >= MARKET_CLOSED_FACTOR * self.params.granularity_secs as i64 {
            return Ok(skip(SkipReason::MarketClosed { last_bar, age_secs }));
        }

        let position = match PositionView::reconcile(&snapshot) {
            Ok(view) => view,
            Err(e) => return Ok(skip(SkipReason::Hedged(e))),
        };

        // ====================================================================
        // Decide
        // ====================================================================
        let live = price.mid();
        let Some(range) = RangeSnapshot::from_bars(&window, live) else {
            return Ok(skip(SkipReason::BarsUnavailable));
        };
        let plan = self.strategy.plan(range, live, &position);

        tracing::info!(
            "📈 {} mid {:.5} range [{:.5}, {:.5}] width {:.5} | held {} {} | breakout {}",
            instrument,
            live,
            range.low,
            range.high,
            range.width(),
            position.side,
            position.units(),
            plan.breakout.map(|s| s.to_string()).unwrap_or_else(|| "-".to_string())
        );

        // ====================================================================
        // Trade
        // ====================================================================
        let executor = OrderExecutor::new(&self.broker, &self.policy, self.params.max_spread);
        let mut quote = price;

        let mut close_outcome = None;
        if let Some(reason) = plan.close {
            if let Some(request) = OrderRequest::close(instrument, &position) {
                tracing::info!("🔻 Closing {} position: {}", position.side, reason);
                let (outcome, latest) = executor.execute(&request, quote).await;
                quote = latest;
                if outcome.is_filled() {
                    self.record_trade(last_bar, live, request.side(), TradeAction::Close)
                        .await?;
                }
                close_outcome = Some(outcome);
            }
        }
        let closed = close_outcome.as_ref().is_some_and(OrderOutcome::is_filled);

        let mut open_outcome = None;
        if let Some(side) = plan.should_open(position.has_position(), closed) {
            tracing::info!("🚀 Opening {} on breakout", side);
            let request = OrderRequest::open(instrument, side, self.params.units);
            let (outcome, _) = executor.execute(&request, quote).await;
            if outcome.is_filled() {
                self.record_trade(last_bar, live, side, TradeAction::Open).await?;
            }
            open_outcome = Some(outcome);
        }
        let opened = open_outcome.as_ref().is_some_and(OrderOutcome::is_filled);

        // ====================================================================
        // Report
        // ====================================================================
        let mut message = NotificationMessage::new(instrument, started);
        message.closed = closed;
        message.opened = opened;

        if closed {
            match self.broker.get_closed_trades(&position.trade_ids).await {
                Ok(totals) => message.realized_pl = totals.realized_pl,
                Err(e) => tracing::warn!("Closed trade lookup failed: {}", e),
            }
        }

        let held_ids = if opened {
            self.refreshed_trade_ids(instrument).await
        } else if closed {
            Vec::new()
        } else {
            position.trade_ids.clone()
        };
        if !held_ids.is_empty() {
            match self.broker.get_open_trades(&held_ids).await {
                Ok(totals) => {
                    message.units = totals.units;
                    message.side = side_of(totals.units);
                    message.unrealized_pl = totals.unrealized_pl;
                }
                Err(e) => tracing::warn!("Open trade lookup failed: {}", e),
            }
        }

        match self.broker.get_account().await {
            Ok(Some(account)) => {
                message.total_pl = account.balance - self.initial_balance;
                let balance = message.total_pl + account.unrealized_pl;
                absorb(
                    self.ledger.append_balance_sample(last_bar, live, balance).await,
                    "balance",
                )?;
            }
            Ok(None) => tracing::warn!("Account unavailable, skipping balance sample"),
            Err(e) => tracing::warn!("Account request failed, skipping balance sample: {}", e),
        }

        tracing::info!(
            "✓ Frame done (closed: {}, opened: {}, total P/L {:.2})",
            closed,
            opened,
            message.total_pl
        );

        Ok(FrameOutcome::Completed(Box::new(FrameSummary {
            message,
            breakout: plan.breakout,
            exit: plan.close,
            close: close_outcome,
            open: open_outcome,
        })))
    }

    async fn record_trade(
        &self,
        time: DateTime<Utc>,
        price: f64,
        side: Side,
        action: TradeAction,
    ) -> Result<(), EngineError> {
        absorb(
            self.ledger.append_trade_sample(time, price, side, action).await,
            "trade",
        )
    }

    /// Trade ids of the position as it stands after this frame's orders
    async fn refreshed_trade_ids(&self, instrument: &str) -> Vec<String> {
        match self.broker.get_position(instrument).await {
            Ok(Some(snapshot)) => match PositionView::reconcile(&snapshot) {
                Ok(view) => view.trade_ids,
                Err(e) => {
                    tracing::warn!("Position after open is unusable: {}", e);
                    Vec::new()
                }
            },
            Ok(None) => Vec::new(),
            Err(e) => {
                tracing::warn!("Position refresh failed: {}", e);
                Vec::new()
            }
        }
    }
}

fn skip(reason: SkipReason) -> FrameOutcome {
    match &reason {
        SkipReason::MarketClosed { last_bar, age_secs } => {
            tracing::info!("💤 Market looks closed (last bar {}, {}s old)", last_bar, age_secs);
        }
        SkipReason::Hedged(e) => tracing::error!("✗ Cannot reconcile position: {}", e),
        other => tracing::warn!("✗ Skipping frame: {:?}", other),
    }
    FrameOutcome::Skipped(reason)
}

fn side_of(units: i64) -> PositionSide {
    match units {
        u if u > 0 => PositionSide::Long,
        u if u < 0 => PositionSide::Short,
        _ => PositionSide::Flat,
    }
}

/// Log non-fatal ledger failures; pass consistency faults up
fn absorb(result: Result<usize, LedgerError>, kind: &str) -> Result<(), EngineError> {
    match result {
        Ok(len) => {
            tracing::debug!("Appended {} sample ({} retained)", kind, len);
            Ok(())
        }
        Err(e) if e.is_fatal() => Err(e.into()),
        Err(e) => {
            tracing::warn!("Could not write {} sample: {}", kind, e);
            Ok(())
        }
    }
}
