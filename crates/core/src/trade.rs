use crate::models::Side;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TradeReason {
    OpenSignal,
    OpenReverse,
    OpenStaticWait,
    Pyramid,
    TakeProfit,
    StopLoss,
    SmartExit,
    EarlyReversal,
    OperatorStop,
    SafetyTrip,
}

impl TradeReason {
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::OpenSignal => "entry signal",
            Self::OpenReverse => "reverse-mode entry",
            Self::OpenStaticWait => "wait-mode entry",
            Self::Pyramid => "pyramid",
            Self::TakeProfit => "TP hit",
            Self::StopLoss => "SL hit",
            Self::SmartExit => "ROI + exit-signal",
            Self::EarlyReversal => "early reversal",
            Self::OperatorStop => "operator stop",
            Self::SafetyTrip => "safety trip",
        }
    }
}

/// Append-only audit record of a single fill (open, pyramid, or close).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeEvent {
    pub bot_id: String,
    pub symbol: String,
    pub side: Side,
    pub price: Decimal,
    pub quantity: Decimal,
    pub pnl: Option<Decimal>,
    pub roi: Option<Decimal>,
    pub reason: TradeReason,
    pub created_at: DateTime<Utc>,
}

/// Per-bot rollup mutated on every close.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct BotStatistics {
    pub total_trades: u64,
    pub winning_trades: u64,
    pub losing_trades: u64,
    pub total_pnl: Decimal,
}

impl BotStatistics {
    pub fn record_close(&mut self, pnl: Decimal) {
        self.total_trades += 1;
        if pnl > Decimal::ZERO {
            self.winning_trades += 1;
        } else {
            self.losing_trades += 1;
        }
        self.total_pnl += pnl;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn record_close_counts_win() {
        let mut stats = BotStatistics::default();
        stats.record_close(dec!(10));
        assert_eq!(stats.total_trades, 1);
        assert_eq!(stats.winning_trades, 1);
        assert_eq!(stats.losing_trades, 0);
        assert_eq!(stats.total_pnl, dec!(10));
    }

    #[test]
    fn record_close_counts_loss_on_nonpositive_pnl() {
        let mut stats = BotStatistics::default();
        stats.record_close(dec!(0));
        stats.record_close(dec!(-5));
        assert_eq!(stats.total_trades, 2);
        assert_eq!(stats.winning_trades, 0);
        assert_eq!(stats.losing_trades, 2);
        assert_eq!(stats.total_pnl, dec!(-5));
    }
}
