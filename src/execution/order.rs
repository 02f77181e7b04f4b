use std::fmt;
use tokio::time::{sleep, Duration};

use crate::api::Broker;
use crate::config::ExecutionSettings;
use crate::execution::position::PositionView;
use crate::models::{LivePrice, OrderStatus, Side};

/// Timing budgets for spread gating and fill confirmation
#[derive(Debug, Clone)]
pub struct ExecutionPolicy {
    /// How long to wait for an acceptable spread before skipping the leg
    pub spread_wait: Duration,
    pub spread_poll: Duration,
    /// How long to wait for the broker to report the order filled
    pub fill_timeout: Duration,
    pub fill_poll: Duration,
}

impl Default for ExecutionPolicy {
    fn default() -> Self {
        Self {
            spread_wait: Duration::from_secs(15),
            spread_poll: Duration::from_secs(1),
            fill_timeout: Duration::from_secs(6),
            fill_poll: Duration::from_millis(300),
        }
    }
}

impl From<&ExecutionSettings> for ExecutionPolicy {
    fn from(settings: &ExecutionSettings) -> Self {
        Self {
            spread_wait: Duration::from_secs(settings.spread_wait_secs),
            spread_poll: Duration::from_millis(settings.spread_poll_ms),
            fill_timeout: Duration::from_millis(settings.fill_timeout_ms),
            fill_poll: Duration::from_millis(settings.fill_poll_ms),
        }
    }
}

impl ExecutionPolicy {
    fn spread_attempts(&self) -> u32 {
        ratio(self.spread_wait, self.spread_poll)
    }

    /// 6s at 300ms gives 20 status polls
    pub fn fill_attempts(&self) -> u32 {
        ratio(self.fill_timeout, self.fill_poll)
    }
}

fn ratio(budget: Duration, step: Duration) -> u32 {
    let step = step.as_millis().max(1);
    (budget.as_millis() / step).max(1) as u32
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderIntent {
    Open,
    Close,
}

impl fmt::Display for OrderIntent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderIntent::Open => write!(f, "open"),
            OrderIntent::Close => write!(f, "close"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderRequest {
    pub instrument: String,
    /// Positive buys, negative sells
    pub units: i64,
    pub intent: OrderIntent,
}

impl OrderRequest {
    pub fn open(instrument: &str, side: Side, units: u64) -> Self {
        Self {
            instrument: instrument.to_string(),
            units: side.signed(units),
            intent: OrderIntent::Open,
        }
    }

    /// Order flattening the whole held position, `None` when flat
    pub fn close(instrument: &str, position: &PositionView) -> Option<Self> {
        let side = position.closing_side()?;
        Some(Self {
            instrument: instrument.to_string(),
            units: side.signed(position.units()),
            intent: OrderIntent::Close,
        })
    }

    pub fn side(&self) -> Side {
        if self.units < 0 {
            Side::Sell
        } else {
            Side::Buy
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum OrderOutcome {
    Filled { order_id: String },
    /// Submitted but never confirmed within the fill budget
    TimedOut { order_id: String },
    /// The broker cancelled the order; a killed FOK order ends here
    Cancelled { order_id: String },
    /// The broker returned no order id
    NotSubmitted,
    /// Spread never came within the limit; nothing was sent
    SpreadTooWide,
}

impl OrderOutcome {
    pub fn is_filled(&self) -> bool {
        matches!(self, OrderOutcome::Filled { .. })
    }
}

/// Drives one order from spread check through fill confirmation
pub struct OrderExecutor<'a, B: Broker + ?Sized> {
    broker: &'a B,
    policy: &'a ExecutionPolicy,
    max_spread: f64,
}

impl<'a, B: Broker + ?Sized> OrderExecutor<'a, B> {
    pub fn new(broker: &'a B, policy: &'a ExecutionPolicy, max_spread: f64) -> Self {
        Self {
            broker,
            policy,
            max_spread,
        }
    }

    /// Run the full leg. Returns the outcome and the latest observed price.
    pub async fn execute(&self, request: &OrderRequest, price: LivePrice) -> (OrderOutcome, LivePrice) {
        let price = match self.await_spread(&request.instrument, price).await {
            Some(p) => p,
            None => {
                tracing::warn!(
                    "Spread stayed above {} for {:?}, skipping {} order",
                    self.max_spread,
                    self.policy.spread_wait,
                    request.intent
                );
                return (OrderOutcome::SpreadTooWide, price);
            }
        };

        tracing::info!(
            "→ {} {} {} units of {} (spread {:.5})",
            request.intent,
            request.side(),
            request.units.unsigned_abs(),
            request.instrument,
            price.spread()
        );

        (self.submit_and_wait(request).await, price)
    }

    /// Wait for `spread <= max_spread`, re-fetching the quote once per poll
    pub async fn await_spread(&self, instrument: &str, price: LivePrice) -> Option<LivePrice> {
        if price.spread() <= self.max_spread {
            return Some(price);
        }

        for _ in 0..self.policy.spread_attempts() {
            sleep(self.policy.spread_poll).await;

            match self.broker.get_live_price(instrument).await {
                Ok(Some(latest)) if latest.spread() <= self.max_spread => return Some(latest),
                Ok(Some(latest)) => {
                    tracing::debug!("Spread {:.5} still above {}", latest.spread(), self.max_spread);
                }
                Ok(None) => tracing::debug!("No quote for {} while waiting on spread", instrument),
                Err(e) => tracing::warn!("Quote refresh failed while waiting on spread: {}", e),
            }
        }

        None
    }

    /// Submit a market order and poll until it is filled or the budget runs out
    pub async fn submit_and_wait(&self, request: &OrderRequest) -> OrderOutcome {
        let order_id = match self
            .broker
            .submit_market_order(&request.instrument, request.units)
            .await
        {
            Ok(Some(id)) if !id.is_empty() => id,
            Ok(_) => {
                tracing::warn!("✗ Broker returned no order id for {} order", request.intent);
                return OrderOutcome::NotSubmitted;
            }
            Err(e) => {
                tracing::error!("✗ Failed to submit {} order: {}", request.intent, e);
                return OrderOutcome::NotSubmitted;
            }
        };

        self.wait_for_fill(order_id).await
    }

    /// Poll until filled or cancelled, at most `fill_attempts` times
    async fn wait_for_fill(&self, order_id: String) -> OrderOutcome {
        let attempts = self.policy.fill_attempts();

        for attempt in 1..=attempts {
            match self.broker.get_order_status(&order_id).await {
                Ok(Some(OrderStatus::Filled)) => {
                    tracing::info!("✓ Order {} filled", order_id);
                    return OrderOutcome::Filled { order_id };
                }
                Ok(Some(OrderStatus::Cancelled)) => {
                    tracing::warn!("✗ Order {} was cancelled by the broker", order_id);
                    return OrderOutcome::Cancelled { order_id };
                }
                Ok(Some(status)) => {
                    tracing::debug!("Order {} is {:?} (poll {})", order_id, status, attempt);
                }
                Ok(None) => tracing::debug!("Could not get order {} (poll {})", order_id, attempt),
                Err(e) => tracing::warn!("Order {} status check failed: {}", order_id, e),
            }
            if attempt < attempts {
                sleep(self.policy.fill_poll).await;
            }
        }

        tracing::warn!(
            "✗ Order {} not confirmed filled within {:?}",
            order_id,
            self.policy.fill_timeout
        );
        OrderOutcome::TimedOut { order_id }
    }
}
