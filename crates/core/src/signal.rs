//! The RSI + volume-delta decision rule shared by entry, exit and early-reversal
//! signal calls. The rule itself is pure and synchronous; the analyzer crate
//! wraps it with exchange I/O, caching and ranking.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Signal {
    Buy,
    Sell,
}

#[derive(Debug, Clone, Copy)]
pub struct Candle {
    pub open_time: DateTime<Utc>,
    pub close: f64,
    pub volume: f64,
}

/// `T` (the volume-delta threshold, a percent) differs between entry calls
/// (50) and exit calls (100); early reversal uses a weak threshold (20).
#[derive(Debug, Clone, Copy)]
pub struct SignalAnalyzerConfig {
    pub volume_threshold_percent: f64,
    pub rsi_period: usize,
}

impl SignalAnalyzerConfig {
    #[must_use]
    pub const fn entry() -> Self {
        Self { volume_threshold_percent: 50.0, rsi_period: 14 }
    }

    #[must_use]
    pub const fn exit() -> Self {
        Self { volume_threshold_percent: 100.0, rsi_period: 14 }
    }

    #[must_use]
    pub const fn weak_reversal() -> Self {
        Self { volume_threshold_percent: 20.0, rsi_period: 14 }
    }
}

/// Wilder-style RSI over the close series: simple averages over the first
/// `period` deltas. Requires at least `period + 1` closes; returns `None`
/// otherwise.
#[must_use]
pub fn rsi_wilder(closes: &[f64], period: usize) -> Option<f64> {
    if closes.len() < period + 1 {
        return None;
    }
    let deltas: Vec<f64> = closes.windows(2).map(|w| w[1] - w[0]).collect();
    let (gains, losses): (Vec<f64>, Vec<f64>) = deltas
        .iter()
        .map(|&d| (d.max(0.0), (-d).max(0.0)))
        .unzip();

    let avg_gain = gains[..period].iter().sum::<f64>() / period as f64;
    let avg_loss = losses[..period].iter().sum::<f64>() / period as f64;

    if avg_loss == 0.0 {
        return Some(100.0);
    }
    let rs = avg_gain / avg_loss;
    Some(100.0 - (100.0 / (1.0 + rs)))
}

/// Evaluates the seven-row decision table against the last 15 closed candles,
/// using the second-to-last candle as `current` and the third-to-last as `prev`.
/// Returns `None` when fewer than 15 candles are supplied or no row matches.
#[must_use]
pub fn evaluate_signal(candles: &[Candle], config: SignalAnalyzerConfig) -> Option<Signal> {
    if candles.len() < 15 {
        return None;
    }
    let closes: Vec<f64> = candles.iter().map(|c| c.close).collect();
    let rsi = rsi_wilder(&closes, config.rsi_period)?;

    let current = candles[candles.len() - 2];
    let prev = candles[candles.len() - 3];

    let delta_price = current.close - prev.close;
    let delta_volume_pct = if prev.volume != 0.0 {
        (current.volume - prev.volume) / prev.volume * 100.0
    } else {
        0.0
    };

    let price_up = delta_price > 0.0;
    let price_down = delta_price < 0.0;
    let vol_up = delta_volume_pct > config.volume_threshold_percent;
    let vol_down = delta_volume_pct < -config.volume_threshold_percent;

    decide(rsi, price_up, price_down, vol_up, vol_down)
}

fn decide(rsi: f64, price_up: bool, price_down: bool, vol_up: bool, vol_down: bool) -> Option<Signal> {
    if rsi > 80.0 && price_up && vol_up {
        Some(Signal::Sell)
    } else if rsi < 20.0 && price_down && vol_down {
        Some(Signal::Sell)
    } else if rsi > 80.0 && price_up && vol_down {
        Some(Signal::Buy)
    } else if rsi < 20.0 && price_down && vol_up {
        Some(Signal::Buy)
    } else if rsi > 20.0 && !price_down && vol_down {
        Some(Signal::Buy)
    } else if rsi < 80.0 && !price_up && vol_up {
        Some(Signal::Sell)
    } else {
        None
    }
}

#[must_use]
pub fn roi_delta_percent(current: f64, previous: f64) -> f64 {
    if previous == 0.0 {
        0.0
    } else {
        (current - previous) / previous * 100.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn row_one_rsi_high_price_up_vol_up_is_sell() {
        assert_eq!(decide(85.0, true, false, true, false), Some(Signal::Sell));
    }

    #[test]
    fn row_two_rsi_low_price_down_vol_down_is_sell() {
        assert_eq!(decide(15.0, false, true, false, true), Some(Signal::Sell));
    }

    #[test]
    fn row_three_rsi_high_price_up_vol_down_is_buy() {
        assert_eq!(decide(85.0, true, false, false, true), Some(Signal::Buy));
    }

    #[test]
    fn row_four_rsi_low_price_down_vol_up_is_buy() {
        assert_eq!(decide(15.0, false, true, true, false), Some(Signal::Buy));
    }

    #[test]
    fn row_five_mid_rsi_not_price_down_vol_down_is_buy() {
        assert_eq!(decide(50.0, true, false, false, true), Some(Signal::Buy));
    }

    #[test]
    fn row_six_mid_rsi_not_price_up_vol_up_is_sell() {
        assert_eq!(decide(50.0, false, true, true, false), Some(Signal::Sell));
    }

    #[test]
    fn otherwise_no_signal() {
        assert_eq!(decide(50.0, true, false, true, false), None);
    }

    #[test]
    fn rsi_wilder_all_gains_is_one_hundred() {
        let closes: Vec<f64> = (0..16).map(|i| 100.0 + i as f64).collect();
        let rsi = rsi_wilder(&closes, 14).unwrap();
        assert!((rsi - 100.0).abs() < 1e-9);
    }

    #[test]
    fn rsi_wilder_insufficient_data_is_none() {
        assert!(rsi_wilder(&[1.0, 2.0], 14).is_none());
    }

    #[test]
    fn evaluate_signal_requires_fifteen_candles() {
        let candles: Vec<Candle> = (0..5)
            .map(|i| Candle { open_time: Utc::now(), close: 100.0 + i as f64, volume: 10.0 })
            .collect();
        assert!(evaluate_signal(&candles, SignalAnalyzerConfig::entry()).is_none());
    }
}
