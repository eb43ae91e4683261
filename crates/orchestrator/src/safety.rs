//! Per-bot margin-ratio probe. Each bot actor owns one of these and polls it
//! on its own tick cadence; a breach triggers that bot's stop-all-symbols
//! cascade. New logic for this fleet — grounded on the same periodic-check
//! idiom the bot actor uses for its census and symbol-refresh timers.

use std::sync::Arc;

use anyhow::Result;
use fleet_core::traits::ExchangeGateway;
use rust_decimal::Decimal;

pub struct SafetyGovernor {
    threshold: Decimal,
}

impl SafetyGovernor {
    #[must_use]
    pub const fn new(threshold: Decimal) -> Self {
        Self { threshold }
    }

    /// Probes the account's margin ratio via `gateway`. Returns `Some(ratio)`
    /// if the ratio breached the threshold (ratio ≤ threshold), `None`
    /// otherwise or if the probe failed (a transient gateway failure should
    /// not itself trip safety).
    pub async fn check(&self, gateway: &Arc<dyn ExchangeGateway>) -> Option<Decimal> {
        let safety = match gateway.get_margin_safety().await {
            Ok(safety) => safety,
            Err(error) => {
                tracing::warn!(%error, "margin safety probe failed, skipping this check");
                return None;
            }
        };

        let ratio = safety.ratio();
        (ratio <= self.threshold).then_some(ratio)
    }
}

#[allow(clippy::unused_async)]
#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use fleet_core::traits::{
        AccountBalance, Kline, MarginSafety, OrderResult, Ticker24h, VenuePosition,
    };
    use fleet_core::{ExchangeCredentials, Side};
    use rust_decimal_macros::dec;

    struct StubGateway {
        credentials: ExchangeCredentials,
        margin_balance: Decimal,
        maint_margin: Decimal,
    }

    #[async_trait]
    impl ExchangeGateway for StubGateway {
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
            Ok(MarginSafety {
                total_margin_balance: self.margin_balance,
                total_maint_margin: self.maint_margin,
            })
        }
        async fn get_ticker_24hr(&self, _symbols: &[String]) -> Result<Vec<Ticker24h>> {
            Ok(vec![])
        }
        async fn get_klines(&self, _symbol: &str, _interval: &str, _limit: u32) -> Result<Vec<Kline>> {
            Ok(vec![])
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

    fn gateway(margin_balance: Decimal, maint_margin: Decimal) -> Arc<dyn ExchangeGateway> {
        Arc::new(StubGateway {
            credentials: ExchangeCredentials { api_key: String::new(), api_secret: String::new() },
            margin_balance,
            maint_margin,
        })
    }

    #[tokio::test]
    async fn ratio_above_threshold_does_not_trip() {
        let governor = SafetyGovernor::new(dec!(1.15));
        let gw = gateway(dec!(10000), dec!(1000));
        assert_eq!(governor.check(&gw).await, None);
    }

    #[tokio::test]
    async fn ratio_at_or_below_threshold_trips() {
        let governor = SafetyGovernor::new(dec!(1.15));
        let gw = gateway(dec!(1100), dec!(1000));
        assert_eq!(governor.check(&gw).await, Some(dec!(1.1)));
    }
}
