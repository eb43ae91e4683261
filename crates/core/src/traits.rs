use crate::models::{ExchangeCredentials, Side};
use crate::signal::Candle;
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

#[derive(Debug, Clone)]
pub struct Kline {
    pub candle: Candle,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
}

#[derive(Debug, Clone)]
pub struct Ticker24h {
    pub symbol: String,
    pub quote_volume: Decimal,
    pub high: Decimal,
    pub low: Decimal,
}

impl Ticker24h {
    #[must_use]
    pub fn volatility_percent(&self) -> Decimal {
        if self.low.is_zero() {
            return Decimal::ZERO;
        }
        (self.high - self.low) / self.low * Decimal::ONE_HUNDRED
    }
}

#[derive(Debug, Clone)]
pub struct AccountBalance {
    pub total_equity: Decimal,
    pub available: Decimal,
}

#[derive(Debug, Clone)]
pub struct MarginSafety {
    pub total_margin_balance: Decimal,
    pub total_maint_margin: Decimal,
}

impl MarginSafety {
    #[must_use]
    pub fn ratio(&self) -> Decimal {
        if self.total_maint_margin.is_zero() {
            return Decimal::MAX;
        }
        self.total_margin_balance / self.total_maint_margin
    }
}

#[derive(Debug, Clone)]
pub struct VenuePosition {
    pub symbol: String,
    pub side: Side,
    pub quantity: Decimal,
    pub entry_price: Decimal,
}

#[derive(Debug, Clone)]
pub struct OrderResult {
    pub fill_price: Decimal,
    pub filled_quantity: Decimal,
    pub exchange_order_id: String,
    pub filled_at: DateTime<Utc>,
}

/// Every outbound call to the venue, scoped to one bot's credentials.
/// Implementations own rate-limiting, retries and result caching internally
/// so callers never need to reason about those concerns.
#[async_trait]
pub trait ExchangeGateway: Send + Sync {
    fn credentials(&self) -> &ExchangeCredentials;

    async fn get_usdt_perpetuals(&self) -> Result<Vec<String>>;
    async fn get_max_leverage(&self, symbol: &str) -> Result<Option<u32>>;
    async fn get_step_size(&self, symbol: &str) -> Result<Option<Decimal>>;
    async fn set_leverage(&self, symbol: &str, leverage: u32) -> Result<()>;
    async fn get_balance(&self) -> Result<AccountBalance>;
    async fn get_margin_safety(&self) -> Result<MarginSafety>;
    async fn get_ticker_24hr(&self, symbols: &[String]) -> Result<Vec<Ticker24h>>;
    async fn get_klines(&self, symbol: &str, interval: &str, limit: u32) -> Result<Vec<Kline>>;
    async fn place_market_order(
        &self,
        symbol: &str,
        side: Side,
        quantity: Decimal,
    ) -> Result<OrderResult>;
    async fn cancel_open_orders(&self, symbol: &str) -> Result<()>;
    async fn get_position(&self, symbol: &str) -> Result<Option<VenuePosition>>;

    /// Ensures a trade-stream subscription is running for `symbol`, so that
    /// [`Self::latest_price`] starts returning fresh values. Idempotent:
    /// calling it again for an already-subscribed symbol is a no-op.
    /// Implementations that don't stream (e.g. test stubs) may leave this as
    /// a no-op; callers fall back to a REST price lookup when
    /// `latest_price` returns `None`.
    async fn ensure_trade_stream(&self, _symbol: &str) {}

    /// The most recent price delivered by the trade stream for `symbol`, if
    /// any has arrived yet. Never makes a network call.
    async fn latest_price(&self, _symbol: &str) -> Option<Decimal> {
        None
    }
}
