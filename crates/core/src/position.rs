use crate::models::Side;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PositionStatus {
    Pending,
    Open,
    Closed,
}

/// Open or closed position record. At most one `status = Open` row exists per
/// `(bot_id, symbol)` pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub bot_id: String,
    pub symbol: String,
    pub side: Side,
    pub entry_price: Decimal,
    pub quantity: Decimal,
    pub pyramiding_count: u8,
    pub current_price: Decimal,
    pub status: PositionStatus,
    pub opened_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
    pub last_update: DateTime<Utc>,
}

impl Position {
    /// ROI as a percent against the notional-at-entry convention: `invested =
    /// entry * qty / leverage`. This is a notional convenience, not a true
    /// equity ROI — see the pnl/roi open question this crate's callers
    /// document at the orchestrator boundary.
    #[must_use]
    pub fn roi_percent(&self, leverage: u32) -> Decimal {
        position_roi(
            self.side,
            self.entry_price,
            self.current_price,
            self.quantity,
            leverage,
        )
    }

    #[must_use]
    pub fn pnl(&self) -> Decimal {
        match self.side {
            Side::Buy => (self.current_price - self.entry_price) * self.quantity,
            Side::Sell => (self.entry_price - self.current_price) * self.quantity,
        }
    }

    /// Folds a pyramid fill into the position's weighted-average entry price
    /// and accumulates quantity, per the pyramiding formula.
    pub fn apply_pyramid(&mut self, fill_price: Decimal, fill_qty: Decimal, now: DateTime<Utc>) {
        let total = self.entry_price * self.quantity + fill_price * fill_qty;
        self.quantity += fill_qty;
        self.entry_price = total / self.quantity;
        self.pyramiding_count += 1;
        self.last_update = now;
    }
}

/// `pnl = (current-entry)*qty` for BUY, `(entry-current)*qty` for SELL;
/// `roi = pnl / (entry*qty/leverage) * 100`.
#[must_use]
pub fn position_roi(
    side: Side,
    entry_price: Decimal,
    current_price: Decimal,
    quantity: Decimal,
    leverage: u32,
) -> Decimal {
    if quantity.is_zero() || leverage == 0 {
        return Decimal::ZERO;
    }
    let pnl = match side {
        Side::Buy => (current_price - entry_price) * quantity,
        Side::Sell => (entry_price - current_price) * quantity,
    };
    let invested = entry_price * quantity / Decimal::from(leverage);
    if invested.is_zero() {
        return Decimal::ZERO;
    }
    pnl / invested * Decimal::ONE_HUNDRED
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn buy_roi_is_one_hundred_percent_at_double_pnl_to_invested_ratio() {
        // entry 0.50, current 0.55, qty=100, leverage=10 -> invested=5, pnl=5 -> roi=100%
        let roi = position_roi(Side::Buy, dec!(0.50), dec!(0.55), dec!(100), 10);
        assert_eq!(roi, dec!(100));
    }

    #[test]
    fn sell_roi_profits_when_price_drops() {
        let roi = position_roi(Side::Sell, dec!(100), dec!(90), dec!(1), 10);
        // invested = 100*1/10 = 10, pnl = (100-90)*1 = 10 -> roi=100%
        assert_eq!(roi, dec!(100));
    }

    #[test]
    fn zero_quantity_has_zero_roi() {
        assert_eq!(position_roi(Side::Buy, dec!(1), dec!(2), Decimal::ZERO, 10), Decimal::ZERO);
    }

    #[test]
    fn pyramid_recomputes_weighted_average_entry() {
        let mut pos = Position {
            bot_id: "b".into(),
            symbol: "XRPUSDT".into(),
            side: Side::Sell,
            entry_price: dec!(100),
            quantity: dec!(10),
            pyramiding_count: 0,
            current_price: dec!(110),
            status: PositionStatus::Open,
            opened_at: Utc::now(),
            closed_at: None,
            last_update: Utc::now(),
        };
        pos.apply_pyramid(dec!(110), dec!(10), Utc::now());
        assert_eq!(pos.entry_price, dec!(105));
        assert_eq!(pos.quantity, dec!(20));
        assert_eq!(pos.pyramiding_count, 1);
    }
}
