//! Implements `fleet_core::ExchangeGateway` for Binance USDT-M Futures over
//! the low-level [`crate::client::BinanceClient`], plus the trade-stream
//! price delivery path from [`crate::websocket`].

use std::collections::HashSet;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context as _, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fleet_core::traits::{AccountBalance, Kline, MarginSafety, OrderResult, Ticker24h, VenuePosition};
use fleet_core::{Candle, ExchangeCredentials, ExchangeGateway, Side};
use rust_decimal::Decimal;
use tokio::sync::RwLock;

use crate::client::BinanceClient;
use crate::websocket::{BinanceTradeStream, LatestPriceCache};

const STREAM_RETRY_DELAY: Duration = Duration::from_secs(5);

pub struct BinanceGateway {
    client: BinanceClient,
    ws_url: String,
    latest_prices: Arc<LatestPriceCache>,
    subscribed: RwLock<HashSet<String>>,
}

impl BinanceGateway {
    #[must_use]
    pub fn new(base_url: String, ws_url: String, credentials: ExchangeCredentials) -> Self {
        Self {
            client: BinanceClient::new(base_url, credentials),
            ws_url,
            latest_prices: Arc::new(LatestPriceCache::new()),
            subscribed: RwLock::new(HashSet::new()),
        }
    }
}

fn decimal_field(value: &serde_json::Value, field: &str) -> Result<Decimal> {
    let raw = value
        .get(field)
        .and_then(serde_json::Value::as_str)
        .with_context(|| format!("missing field '{field}' in binance response"))?;
    Decimal::from_str(raw).with_context(|| format!("field '{field}' was not a decimal: {raw}"))
}

#[async_trait]
impl ExchangeGateway for BinanceGateway {
    fn credentials(&self) -> &ExchangeCredentials {
        self.client.credentials()
    }

    async fn get_usdt_perpetuals(&self) -> Result<Vec<String>> {
        let Some(info) = self.client.exchange_info().await? else {
            return Ok(vec![]);
        };
        let symbols = info.get("symbols").and_then(serde_json::Value::as_array).cloned().unwrap_or_default();

        let perpetuals = symbols
            .into_iter()
            .filter(|s| {
                s.get("contractType").and_then(serde_json::Value::as_str) == Some("PERPETUAL")
                    && s.get("quoteAsset").and_then(serde_json::Value::as_str) == Some("USDT")
                    && s.get("status").and_then(serde_json::Value::as_str) == Some("TRADING")
            })
            .filter_map(|s| s.get("symbol").and_then(serde_json::Value::as_str).map(str::to_string))
            .collect();

        Ok(perpetuals)
    }

    async fn get_max_leverage(&self, symbol: &str) -> Result<Option<u32>> {
        if let Some(cached) = self.client.cached_leverage(symbol).await {
            return Ok(Some(cached));
        }

        // Binance exposes max leverage per symbol only through the signed
        // leverage-bracket endpoint, which is outside the consumed surface.
        // Setting leverage to a value Binance is guaranteed to cap (125x,
        // above any USDT-M symbol's bracket ceiling) returns the effective
        // max in the response body.
        const PROBE_LEVERAGE: &str = "125";
        let params = vec![
            ("symbol".to_string(), symbol.to_string()),
            ("leverage".to_string(), PROBE_LEVERAGE.to_string()),
        ];
        let Some(response) = self.client.post_signed("/fapi/v1/leverage", params).await? else {
            return Ok(None);
        };

        let leverage = response
            .get("leverage")
            .and_then(serde_json::Value::as_u64)
            .map(|v| v as u32);

        if let Some(leverage) = leverage {
            self.client.cache_leverage(symbol, leverage).await;
        }
        Ok(leverage)
    }

    async fn get_step_size(&self, symbol: &str) -> Result<Option<Decimal>> {
        let Some(info) = self.client.exchange_info().await? else {
            return Ok(None);
        };

        let symbols = info.get("symbols").and_then(serde_json::Value::as_array).cloned().unwrap_or_default();
        let Some(entry) = symbols
            .into_iter()
            .find(|s| s.get("symbol").and_then(serde_json::Value::as_str) == Some(symbol))
        else {
            return Ok(None);
        };

        let filters = entry.get("filters").and_then(serde_json::Value::as_array).cloned().unwrap_or_default();
        let step_size = filters
            .into_iter()
            .find(|f| f.get("filterType").and_then(serde_json::Value::as_str) == Some("LOT_SIZE"))
            .and_then(|f| f.get("stepSize").and_then(serde_json::Value::as_str).map(str::to_string))
            .and_then(|s| Decimal::from_str(&s).ok());

        Ok(step_size)
    }

    async fn set_leverage(&self, symbol: &str, leverage: u32) -> Result<()> {
        let params = vec![
            ("symbol".to_string(), symbol.to_string()),
            ("leverage".to_string(), leverage.to_string()),
        ];
        self.client.post_signed("/fapi/v1/leverage", params).await?;
        self.client.cache_leverage(symbol, leverage).await;
        Ok(())
    }

    async fn get_balance(&self) -> Result<AccountBalance> {
        let Some(account) = self.client.get_signed("/fapi/v2/account", vec![]).await? else {
            anyhow::bail!("account balance request returned unavailable");
        };

        Ok(AccountBalance {
            total_equity: decimal_field(&account, "totalMarginBalance")?,
            available: decimal_field(&account, "availableBalance")?,
        })
    }

    async fn get_margin_safety(&self) -> Result<MarginSafety> {
        let Some(account) = self.client.get_signed("/fapi/v2/account", vec![]).await? else {
            anyhow::bail!("margin safety request returned unavailable");
        };

        Ok(MarginSafety {
            total_margin_balance: decimal_field(&account, "totalMarginBalance")?,
            total_maint_margin: decimal_field(&account, "totalMaintMargin")?,
        })
    }

    async fn get_ticker_24hr(&self, symbols: &[String]) -> Result<Vec<Ticker24h>> {
        let Some(response) = self.client.get_unsigned("/fapi/v1/ticker/24hr", &[]).await? else {
            return Ok(vec![]);
        };

        let entries = response.as_array().cloned().unwrap_or_default();
        let wanted: std::collections::HashSet<&str> = symbols.iter().map(String::as_str).collect();

        let mut tickers = Vec::new();
        for entry in entries {
            let Some(symbol) = entry.get("symbol").and_then(serde_json::Value::as_str) else {
                continue;
            };
            if !wanted.is_empty() && !wanted.contains(symbol) {
                continue;
            }
            let (Ok(quote_volume), Ok(high), Ok(low)) = (
                decimal_field(&entry, "quoteVolume"),
                decimal_field(&entry, "highPrice"),
                decimal_field(&entry, "lowPrice"),
            ) else {
                continue;
            };
            tickers.push(Ticker24h { symbol: symbol.to_string(), quote_volume, high, low });
        }

        Ok(tickers)
    }

    async fn get_klines(&self, symbol: &str, interval: &str, limit: u32) -> Result<Vec<Kline>> {
        let params = vec![
            ("symbol".to_string(), symbol.to_string()),
            ("interval".to_string(), interval.to_string()),
            ("limit".to_string(), limit.to_string()),
        ];
        let Some(response) = self.client.get_unsigned("/fapi/v1/klines", &params).await? else {
            return Ok(vec![]);
        };

        let rows = response.as_array().cloned().unwrap_or_default();
        let mut klines = Vec::with_capacity(rows.len());
        for row in rows {
            let Some(fields) = row.as_array() else { continue };
            if fields.len() < 6 {
                continue;
            }
            let open_time_millis = fields[0].as_i64().unwrap_or_default();
            let Some(open_time) = DateTime::<Utc>::from_timestamp_millis(open_time_millis) else {
                continue;
            };
            let parse = |i: usize| -> Option<Decimal> { fields[i].as_str().and_then(|s| Decimal::from_str(s).ok()) };
            let (Some(open), Some(high), Some(low), Some(close), Some(volume)) =
                (parse(1), parse(2), parse(3), parse(4), parse(5))
            else {
                continue;
            };

            klines.push(Kline {
                candle: Candle {
                    open_time,
                    close: close.to_string().parse().unwrap_or_default(),
                    volume: volume.to_string().parse().unwrap_or_default(),
                },
                open,
                high,
                low,
                close,
                volume,
            });
        }

        Ok(klines)
    }

    async fn place_market_order(
        &self,
        symbol: &str,
        side: Side,
        quantity: Decimal,
    ) -> Result<OrderResult> {
        let side_str = match side {
            Side::Buy => "BUY",
            Side::Sell => "SELL",
        };
        let params = vec![
            ("symbol".to_string(), symbol.to_string()),
            ("side".to_string(), side_str.to_string()),
            ("type".to_string(), "MARKET".to_string()),
            ("quantity".to_string(), quantity.to_string()),
        ];
        let Some(response) = self.client.post_signed("/fapi/v1/order", params).await? else {
            anyhow::bail!("order placement for {symbol} returned unavailable");
        };

        let exchange_order_id = response
            .get("orderId")
            .map(serde_json::Value::to_string)
            .unwrap_or_default();
        let filled_price = decimal_field(&response, "avgPrice").unwrap_or(Decimal::ZERO);
        let filled_quantity = decimal_field(&response, "executedQty").unwrap_or(quantity);

        Ok(OrderResult {
            fill_price: filled_price,
            filled_quantity,
            exchange_order_id,
            filled_at: Utc::now(),
        })
    }

    async fn cancel_open_orders(&self, symbol: &str) -> Result<()> {
        let params = vec![("symbol".to_string(), symbol.to_string())];
        self.client.delete_signed("/fapi/v1/allOpenOrders", params).await?;
        Ok(())
    }

    async fn get_position(&self, symbol: &str) -> Result<Option<VenuePosition>> {
        let params = vec![("symbol".to_string(), symbol.to_string())];
        let Some(response) = self.client.get_signed("/fapi/v2/positionRisk", params).await? else {
            return Ok(None);
        };

        let entries = response.as_array().cloned().unwrap_or_default();
        let Some(entry) = entries.into_iter().find(|e| {
            e.get("positionAmt")
                .and_then(serde_json::Value::as_str)
                .and_then(|s| Decimal::from_str(s).ok())
                .is_some_and(|amt| !amt.is_zero())
        }) else {
            return Ok(None);
        };

        let quantity = decimal_field(&entry, "positionAmt")?;
        let side = if quantity.is_sign_positive() { Side::Buy } else { Side::Sell };

        Ok(Some(VenuePosition {
            symbol: symbol.to_string(),
            side,
            quantity: quantity.abs(),
            entry_price: decimal_field(&entry, "entryPrice")?,
        }))
    }

    async fn ensure_trade_stream(&self, symbol: &str) {
        let symbol = symbol.to_uppercase();
        {
            let mut subscribed = self.subscribed.write().await;
            if !subscribed.insert(symbol.clone()) {
                return;
            }
        }

        let ws_url = self.ws_url.clone();
        let latest_prices = Arc::clone(&self.latest_prices);
        tokio::spawn(async move {
            let mut stream = BinanceTradeStream::new(ws_url, vec![symbol.clone()], latest_prices);
            loop {
                match stream.next_trade().await {
                    Ok(Some(_)) => {}
                    Ok(None) => break,
                    Err(error) => {
                        tracing::warn!(%symbol, %error, "trade stream error, retrying");
                        tokio::time::sleep(STREAM_RETRY_DELAY).await;
                    }
                }
            }
        });
    }

    async fn latest_price(&self, symbol: &str) -> Option<Decimal> {
        self.latest_prices.get(&symbol.to_uppercase()).await
    }
}
