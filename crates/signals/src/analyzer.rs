//! Caches signal evaluations per symbol so a fleet of bots polling the same
//! market doesn't recompute RSI/volume-delta on every tick.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Utc};
use fleet_core::signal::evaluate_signal;
use fleet_core::traits::ExchangeGateway;
use fleet_core::{Candle, Signal, SignalAnalyzerConfig};
use tokio::sync::RwLock;

const CACHE_TTL_SECONDS: i64 = 30;
const KLINE_INTERVAL: &str = "5m";
const KLINE_LIMIT: u32 = 15;

#[derive(Debug, Clone)]
struct CacheEntry {
    computed_at: DateTime<Utc>,
    signal: Option<Signal>,
}

/// Wraps [`evaluate_signal`] with a short-lived per-symbol cache so repeated
/// lookups within the same polling window hit the exchange once.
pub struct SignalAnalyzer {
    cache: RwLock<HashMap<String, CacheEntry>>,
}

impl SignalAnalyzer {
    #[must_use]
    pub fn new() -> Self {
        Self { cache: RwLock::new(HashMap::new()) }
    }

    /// Returns the signal for `symbol` under `config`, fetching fresh klines
    /// from `gateway` only if the cached value is missing or stale.
    ///
    /// # Errors
    /// Returns an error if the kline fetch fails.
    pub async fn signal_for(
        &self,
        symbol: &str,
        config: SignalAnalyzerConfig,
        gateway: &Arc<dyn ExchangeGateway>,
        now: DateTime<Utc>,
    ) -> Result<Option<Signal>> {
        let cache_key = format!("{symbol}:{}:{}", config.rsi_period, config.volume_threshold_percent);
        {
            let cache = self.cache.read().await;
            if let Some(entry) = cache.get(&cache_key) {
                if (now - entry.computed_at).num_seconds() < CACHE_TTL_SECONDS {
                    return Ok(entry.signal);
                }
            }
        }

        let klines = gateway.get_klines(symbol, KLINE_INTERVAL, KLINE_LIMIT).await?;
        let candles: Vec<Candle> = klines.into_iter().map(|k| k.candle).collect();
        let signal = evaluate_signal(&candles, config);

        let mut cache = self.cache.write().await;
        cache.insert(cache_key, CacheEntry { computed_at: now, signal });
        Ok(signal)
    }
}

impl Default for SignalAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use fleet_core::traits::{AccountBalance, Kline, MarginSafety, OrderResult, Ticker24h, VenuePosition};
    use fleet_core::{ExchangeCredentials, Side};
    use rust_decimal::Decimal;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingGateway {
        credentials: ExchangeCredentials,
        calls: Arc<AtomicUsize>,
    }

    fn flat_candles() -> Vec<Kline> {
        let base = Utc::now();
        (0..15)
            .map(|i| Kline {
                candle: Candle {
                    open_time: base + chrono::Duration::minutes(5 * i),
                    close: 100.0,
                    volume: 1000.0,
                },
                open: Decimal::new(100, 0),
                high: Decimal::new(100, 0),
                low: Decimal::new(100, 0),
                close: Decimal::new(100, 0),
                volume: Decimal::new(1000, 0),
            })
            .collect()
    }

    #[async_trait]
    impl ExchangeGateway for CountingGateway {
        fn credentials(&self) -> &ExchangeCredentials {
            &self.credentials
        }
        async fn get_usdt_perpetuals(&self) -> Result<Vec<String>> {
            Ok(vec![])
        }
        async fn get_max_leverage(&self, _symbol: &str) -> Result<Option<u32>> {
            Ok(None)
        }
        async fn get_step_size(&self, _symbol: &str) -> Result<Option<Decimal>> {
            Ok(None)
        }
        async fn set_leverage(&self, _symbol: &str, _leverage: u32) -> Result<()> {
            Ok(())
        }
        async fn get_balance(&self) -> Result<AccountBalance> {
            Ok(AccountBalance { total_equity: Decimal::ZERO, available: Decimal::ZERO })
        }
        async fn get_margin_safety(&self) -> Result<MarginSafety> {
            Ok(MarginSafety { total_margin_balance: Decimal::ZERO, total_maint_margin: Decimal::ZERO })
        }
        async fn get_ticker_24hr(&self, _symbols: &[String]) -> Result<Vec<Ticker24h>> {
            Ok(vec![])
        }
        async fn get_klines(&self, _symbol: &str, _interval: &str, _limit: u32) -> Result<Vec<Kline>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(flat_candles())
        }
        async fn place_market_order(
            &self,
            _symbol: &str,
            _side: Side,
            _quantity: Decimal,
        ) -> Result<OrderResult> {
            unimplemented!()
        }
        async fn cancel_open_orders(&self, _symbol: &str) -> Result<()> {
            Ok(())
        }
        async fn get_position(&self, _symbol: &str) -> Result<Option<VenuePosition>> {
            Ok(None)
        }
    }

    #[tokio::test]
    async fn repeated_lookup_within_ttl_hits_cache_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let gateway: Arc<dyn ExchangeGateway> = Arc::new(CountingGateway {
            credentials: ExchangeCredentials { api_key: String::new(), api_secret: String::new() },
            calls: Arc::clone(&calls),
        });
        let analyzer = SignalAnalyzer::new();
        let now = Utc::now();

        analyzer.signal_for("BTCUSDT", SignalAnalyzerConfig::entry(), &gateway, now).await.unwrap();
        analyzer.signal_for("BTCUSDT", SignalAnalyzerConfig::entry(), &gateway, now).await.unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn distinct_thresholds_for_the_same_symbol_do_not_share_a_cache_entry() {
        let calls = Arc::new(AtomicUsize::new(0));
        let gateway: Arc<dyn ExchangeGateway> = Arc::new(CountingGateway {
            credentials: ExchangeCredentials { api_key: String::new(), api_secret: String::new() },
            calls: Arc::clone(&calls),
        });
        let analyzer = SignalAnalyzer::new();
        let now = Utc::now();

        analyzer.signal_for("BTCUSDT", SignalAnalyzerConfig::entry(), &gateway, now).await.unwrap();
        analyzer.signal_for("BTCUSDT", SignalAnalyzerConfig::exit(), &gateway, now).await.unwrap();
        analyzer.signal_for("BTCUSDT", SignalAnalyzerConfig::weak_reversal(), &gateway, now).await.unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
