//! Binance combined trade-stream WebSocket client. Reconnects automatically
//! on disconnect/error with a 5 s delay; suppresses duplicate ticks delivered
//! within 100 ms of the previous tick for the same symbol; caches the latest
//! seen price per symbol so it can be read without a REST round-trip.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use futures_util::StreamExt;
use rust_decimal::Decimal;
use tokio::net::TcpStream;
use tokio::sync::RwLock;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};

const RECONNECT_DELAY: Duration = Duration::from_secs(5);
const DUPLICATE_SUPPRESSION_WINDOW: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy)]
pub struct Trade {
    pub price: Decimal,
    pub timestamp_millis: i64,
}

struct LastTick {
    received_at: Instant,
    price: Decimal,
}

/// Holds the latest observed price per symbol, readable without touching the
/// socket. Shared between the reader task and any REST-path caller that
/// wants a cheap current price.
#[derive(Default)]
pub struct LatestPriceCache {
    prices: RwLock<HashMap<String, Decimal>>,
}

impl LatestPriceCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set(&self, symbol: &str, price: Decimal) {
        self.prices.write().await.insert(symbol.to_string(), price);
    }

    pub async fn get(&self, symbol: &str) -> Option<Decimal> {
        self.prices.read().await.get(symbol).copied()
    }
}

pub struct BinanceTradeStream {
    ws_url: String,
    symbols: Vec<String>,
    stream: Option<WebSocketStream<MaybeTlsStream<TcpStream>>>,
    last_ticks: HashMap<String, LastTick>,
    pub latest_prices: Arc<LatestPriceCache>,
}

impl BinanceTradeStream {
    #[must_use]
    pub fn new(ws_url: String, symbols: Vec<String>, latest_prices: Arc<LatestPriceCache>) -> Self {
        Self { ws_url, symbols, stream: None, last_ticks: HashMap::new(), latest_prices }
    }

    fn stream_url(&self) -> String {
        let streams = self
            .symbols
            .iter()
            .map(|s| format!("{}@trade", s.to_lowercase()))
            .collect::<Vec<_>>()
            .join("/");
        format!("{}?streams={streams}", self.ws_url)
    }

    /// # Errors
    /// Returns an error if the connection cannot be established.
    pub async fn connect(&mut self) -> Result<()> {
        let url = self.stream_url();
        tracing::debug!(%url, "connecting to binance trade stream");
        let (stream, response) = connect_async(&url)
            .await
            .map_err(|e| anyhow::anyhow!("failed to connect to {url}: {e}"))?;
        self.stream = Some(stream);
        tracing::info!(status = %response.status(), "binance trade stream connected");
        Ok(())
    }

    /// Awaits the next non-duplicate trade tick, transparently reconnecting
    /// on disconnect.
    ///
    /// # Errors
    /// Returns an error if the stream is not connected and reconnection
    /// fails.
    pub async fn next_trade(&mut self) -> Result<Option<(String, Trade)>> {
        loop {
            let Some(stream) = self.stream.as_mut() else {
                self.reconnect().await?;
                continue;
            };

            let Some(msg) = stream.next().await else {
                tracing::warn!("binance trade stream ended, reconnecting");
                self.reconnect().await?;
                continue;
            };

            let Message::Text(text) = msg? else {
                continue;
            };

            let Some((symbol, trade)) = parse_trade_message(&text) else {
                continue;
            };

            if self.is_duplicate(&symbol, trade) {
                continue;
            }

            self.latest_prices.set(&symbol, trade.price).await;
            return Ok(Some((symbol, trade)));
        }
    }

    fn is_duplicate(&mut self, symbol: &str, trade: Trade) -> bool {
        let now = Instant::now();
        if let Some(last) = self.last_ticks.get(symbol) {
            if now.duration_since(last.received_at) < DUPLICATE_SUPPRESSION_WINDOW
                && last.price == trade.price
            {
                return true;
            }
        }
        self.last_ticks.insert(symbol.to_string(), LastTick { received_at: now, price: trade.price });
        false
    }

    async fn reconnect(&mut self) -> Result<()> {
        self.stream = None;
        tokio::time::sleep(RECONNECT_DELAY).await;
        self.connect().await
    }
}

fn parse_trade_message(text: &str) -> Option<(String, Trade)> {
    let value: serde_json::Value = serde_json::from_str(text).ok()?;
    let data = value.get("data")?;
    let symbol = data.get("s")?.as_str()?.to_string();
    let price: Decimal = data.get("p")?.as_str()?.parse().ok()?;
    let timestamp_millis = data.get("T")?.as_i64()?;
    Some((symbol, Trade { price, timestamp_millis }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_combined_stream_trade_payload() {
        let text = r#"{"stream":"btcusdt@trade","data":{"s":"BTCUSDT","p":"65000.50","T":1690000000000}}"#;
        let (symbol, trade) = parse_trade_message(text).unwrap();
        assert_eq!(symbol, "BTCUSDT");
        assert_eq!(trade.price, Decimal::new(6500050, 2));
        assert_eq!(trade.timestamp_millis, 1_690_000_000_000);
    }

    #[test]
    fn malformed_payload_is_ignored() {
        assert!(parse_trade_message("not json").is_none());
        assert!(parse_trade_message(r#"{"stream":"x"}"#).is_none());
    }

    #[tokio::test]
    async fn latest_price_cache_roundtrips() {
        let cache = LatestPriceCache::new();
        assert_eq!(cache.get("BTCUSDT").await, None);
        cache.set("BTCUSDT", Decimal::new(65000, 0)).await;
        assert_eq!(cache.get("BTCUSDT").await, Some(Decimal::new(65000, 0)));
    }
}
