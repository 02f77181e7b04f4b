use async_trait::async_trait;
use chrono::{DateTime, Utc};
use governor::{Quota, RateLimiter};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use serde_json::json;
use std::num::NonZeroU32;
use std::sync::Arc;
use tokio::time::{sleep, Duration};

use super::{Broker, BrokerError};
use crate::models::{
    AccountSummary, LivePrice, OrderStatus, PositionSnapshot, PriceBar, SideHolding, TradeTotals,
};

// OANDA v20 REST API
// Docs: https://developer.oanda.com/rest-live-v20/introduction/
const LIVE_API: &str = "https://api-fxtrade.oanda.com";
const PRACTICE_API: &str = "https://api-fxpractice.oanda.com";
const REQUESTS_PER_SECOND: u32 = 20; // Well below the documented 100/s per connection
const MAX_RETRIES: u32 = 3;
const INITIAL_BACKOFF_MS: u64 = 250;

type OandaRateLimiter = RateLimiter<
    governor::state::direct::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OandaEnvironment {
    Live,
    Practice,
}

impl OandaEnvironment {
    pub fn base_url(self) -> &'static str {
        match self {
            OandaEnvironment::Live => LIVE_API,
            OandaEnvironment::Practice => PRACTICE_API,
        }
    }
}

/// Client for one OANDA account
///
/// Cloneable; clones share the HTTP connection pool and the rate limiter.
#[derive(Clone)]
pub struct OandaClient {
    client: Client,
    base_url: String,
    account_id: String,
    token: String,
    rate_limiter: Arc<OandaRateLimiter>,
}

// ----------------------------------------------------------------------------
// Response shapes. OANDA encodes decimals as JSON strings.
// ----------------------------------------------------------------------------

fn decimal<'de, D: Deserializer<'de>>(d: D) -> Result<f64, D::Error> {
    let raw = String::deserialize(d)?;
    raw.parse().map_err(serde::de::Error::custom)
}

fn units<'de, D: Deserializer<'de>>(d: D) -> Result<i64, D::Error> {
    let value = decimal(d)?;
    Ok(value.round() as i64)
}

#[derive(Debug, Deserialize)]
struct PositionResponse {
    position: PositionBody,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PositionBody {
    instrument: String,
    #[serde(default, rename = "unrealizedPL", deserialize_with = "decimal")]
    unrealized_pl: f64,
    long: PositionSideBody,
    short: PositionSideBody,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PositionSideBody {
    #[serde(deserialize_with = "units")]
    units: i64,
    #[serde(default, deserialize_with = "decimal")]
    average_price: f64,
    #[serde(default, rename = "tradeIDs")]
    trade_ids: Vec<String>,
    #[serde(default, rename = "unrealizedPL", deserialize_with = "decimal")]
    unrealized_pl: f64,
}

impl From<PositionSideBody> for SideHolding {
    fn from(body: PositionSideBody) -> Self {
        SideHolding {
            units: body.units,
            average_price: body.average_price,
            trade_ids: body.trade_ids,
            unrealized_pl: body.unrealized_pl,
        }
    }
}

#[derive(Debug, Deserialize)]
struct CandlesResponse {
    #[serde(default)]
    candles: Vec<CandleBody>,
}

#[derive(Debug, Deserialize)]
struct CandleBody {
    complete: bool,
    time: String,
    mid: Option<Ohlc>,
}

#[derive(Debug, Deserialize)]
struct Ohlc {
    #[serde(deserialize_with = "decimal")]
    o: f64,
    #[serde(deserialize_with = "decimal")]
    h: f64,
    #[serde(deserialize_with = "decimal")]
    l: f64,
    #[serde(deserialize_with = "decimal")]
    c: f64,
}

#[derive(Debug, Deserialize)]
struct PricingResponse {
    #[serde(default)]
    prices: Vec<PriceBody>,
}

#[derive(Debug, Deserialize)]
struct PriceBody {
    instrument: String,
    #[serde(default)]
    asks: Vec<PriceBucket>,
    #[serde(default)]
    bids: Vec<PriceBucket>,
}

#[derive(Debug, Deserialize)]
struct PriceBucket {
    #[serde(deserialize_with = "decimal")]
    price: f64,
}

#[derive(Debug, Deserialize)]
struct AccountResponse {
    account: AccountBody,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AccountBody {
    #[serde(deserialize_with = "decimal")]
    balance: f64,
    #[serde(default, rename = "unrealizedPL", deserialize_with = "decimal")]
    unrealized_pl: f64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OrderCreateResponse {
    order_create_transaction: Option<Transaction>,
}

#[derive(Debug, Deserialize)]
struct Transaction {
    id: String,
}

#[derive(Debug, Deserialize)]
struct OrderResponse {
    order: OrderBody,
}

#[derive(Debug, Deserialize)]
struct OrderBody {
    state: String,
}

#[derive(Debug, Deserialize)]
struct TradesResponse {
    #[serde(default)]
    trades: Vec<TradeBody>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TradeBody {
    #[serde(default, deserialize_with = "units")]
    current_units: i64,
    #[serde(default, rename = "realizedPL", deserialize_with = "decimal")]
    realized_pl: f64,
    #[serde(default, rename = "unrealizedPL", deserialize_with = "decimal")]
    unrealized_pl: f64,
}

impl OandaClient {
    pub fn new(
        environment: OandaEnvironment,
        account_id: String,
        token: String,
    ) -> Result<Self, BrokerError> {
        Self::with_base_url(environment.base_url(), account_id, token)
    }

    /// Point the client at another host (used by tests)
    pub fn with_base_url(
        base_url: &str,
        account_id: String,
        token: String,
    ) -> Result<Self, BrokerError> {
        let client = Client::builder().timeout(Duration::from_secs(10)).build()?;
        let quota = Quota::per_second(NonZeroU32::new(REQUESTS_PER_SECOND).unwrap_or(NonZeroU32::MIN));

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            account_id,
            token,
            rate_limiter: Arc::new(RateLimiter::direct(quota)),
        })
    }

    fn account_path(&self, rest: &str) -> String {
        format!("/v3/accounts/{}{}", self.account_id, rest)
    }

    /// GET with retry on transport errors; 404 maps to `None`
    async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<Option<T>, BrokerError> {
        let url = format!("{}{}", self.base_url, path);
        let mut attempt = 1;

        loop {
            let request = self.client.get(&url).query(query);
            match self.send(request).await {
                Err(BrokerError::Transport(e)) if attempt < MAX_RETRIES => {
                    let backoff_ms = INITIAL_BACKOFF_MS * 2_u64.pow(attempt - 1);
                    tracing::warn!(
                        "Attempt {}/{} for {} failed: {}. Retrying in {}ms...",
                        attempt,
                        MAX_RETRIES,
                        path,
                        e,
                        backoff_ms
                    );
                    sleep(Duration::from_millis(backoff_ms)).await;
                    attempt += 1;
                }
                result => return result,
            }
        }
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<Option<T>, BrokerError> {
        self.rate_limiter.until_ready().await;

        let response = request.bearer_auth(&self.token).send().await?;
        let status = response.status();

        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(BrokerError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let body = response.text().await?;
        Ok(Some(serde_json::from_str(&body)?))
    }

    async fn get_trades(&self, trade_ids: &[String], state: &str) -> Result<TradeTotals, BrokerError> {
        // An empty id filter would return every trade on the account
        if trade_ids.is_empty() {
            return Ok(TradeTotals::default());
        }

        let query = [("ids", trade_ids.join(",")), ("state", state.to_string())];
        let response: Option<TradesResponse> = self.get(&self.account_path("/trades"), &query).await?;

        Ok(response
            .map(|r| {
                r.trades.iter().fold(TradeTotals::default(), |mut acc, t| {
                    acc.realized_pl += t.realized_pl;
                    acc.unrealized_pl += t.unrealized_pl;
                    acc.units += t.current_units;
                    acc
                })
            })
            .unwrap_or_default())
    }
}

#[async_trait]
impl Broker for OandaClient {
    /// An instrument the account has never traded comes back as 404 and
    /// is reported as a flat position
    async fn get_position(&self, instrument: &str) -> Result<Option<PositionSnapshot>, BrokerError> {
        let path = self.account_path(&format!("/positions/{}", instrument));
        let response: Option<PositionResponse> = self.get(&path, &[]).await?;

        let snapshot = match response {
            Some(r) => PositionSnapshot {
                instrument: r.position.instrument,
                unrealized_pl: r.position.unrealized_pl,
                long: r.position.long.into(),
                short: r.position.short.into(),
            },
            None => PositionSnapshot::flat(instrument),
        };

        Ok(Some(snapshot))
    }

    async fn get_recent_bars(
        &self,
        instrument: &str,
        granularity: &str,
        count: usize,
    ) -> Result<Option<Vec<PriceBar>>, BrokerError> {
        let path = format!("/v3/instruments/{}/candles", instrument);
        let query = [
            ("count", count.to_string()),
            ("granularity", granularity.to_string()),
            ("price", "M".to_string()),
        ];

        let Some(response) = self.get::<CandlesResponse>(&path, &query).await? else {
            return Ok(None);
        };

        let mut bars = Vec::with_capacity(response.candles.len());
        for candle in response.candles {
            let Some(mid) = candle.mid else { continue };
            let open_time = DateTime::parse_from_rfc3339(&candle.time)
                .map_err(|e| BrokerError::Malformed(format!("candle time {:?}: {}", candle.time, e)))?
                .with_timezone(&Utc);

            bars.push(PriceBar {
                open_time,
                open: mid.o,
                high: mid.h,
                low: mid.l,
                close: mid.c,
                complete: candle.complete,
            });
        }

        if bars.is_empty() {
            return Ok(None);
        }
        Ok(Some(bars))
    }

    async fn get_live_price(&self, instrument: &str) -> Result<Option<LivePrice>, BrokerError> {
        let query = [("instruments", instrument.to_string())];
        let response: Option<PricingResponse> = self.get(&self.account_path("/pricing"), &query).await?;

        let price = response.and_then(|r| {
            let body = r.prices.into_iter().find(|p| p.instrument == instrument)?;
            let ask = body.asks.last()?.price;
            let bid = body.bids.last()?.price;
            Some(LivePrice { bid, ask })
        });

        Ok(price)
    }

    async fn get_account(&self) -> Result<Option<AccountSummary>, BrokerError> {
        let response: Option<AccountResponse> = self.get(&self.account_path(""), &[]).await?;

        Ok(response.map(|r| AccountSummary {
            balance: r.account.balance,
            unrealized_pl: r.account.unrealized_pl,
        }))
    }

    /// Fill-or-kill market order. Never retried: a duplicate would double
    /// the position.
    async fn submit_market_order(
        &self,
        instrument: &str,
        units: i64,
    ) -> Result<Option<String>, BrokerError> {
        let url = format!("{}{}", self.base_url, self.account_path("/orders"));
        let body = json!({
            "order": {
                "type": "MARKET",
                "instrument": instrument,
                "units": units.to_string(),
                "timeInForce": "FOK",
                "positionFill": "DEFAULT",
            }
        });

        let response: Option<OrderCreateResponse> = self.send(self.client.post(&url).json(&body)).await?;

        Ok(response
            .and_then(|r| r.order_create_transaction)
            .map(|t| t.id)
            .filter(|id| !id.is_empty()))
    }

    async fn get_order_status(&self, order_id: &str) -> Result<Option<OrderStatus>, BrokerError> {
        let path = self.account_path(&format!("/orders/{}", order_id));
        let response: Option<OrderResponse> = self.get(&path, &[]).await?;

        Ok(response.map(|r| OrderStatus::parse(&r.order.state)))
    }

    async fn get_closed_trades(&self, trade_ids: &[String]) -> Result<TradeTotals, BrokerError> {
        self.get_trades(trade_ids, "CLOSED").await
    }

    async fn get_open_trades(&self, trade_ids: &[String]) -> Result<TradeTotals, BrokerError> {
        self.get_trades(trade_ids, "OPEN").await
    }
}
