//! Bot configuration and the small tagged-union of strategy variants a bot can run.
//!
//! A single `BotConfig` carries every variant (static/dynamic, signal/reverse/wait,
//! volume/volatility) rather than being a trait object per variant; dispatch on the
//! variant happens in the orchestrator crate's per-tick processing.

use crate::errors::FleetError;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    #[must_use]
    pub const fn opposite(self) -> Self {
        match self {
            Self::Buy => Self::Sell,
            Self::Sell => Self::Buy,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BotMode {
    Static,
    Dynamic,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DynamicStrategy {
    Volume,
    Volatility,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StaticEntryMode {
    Signal,
    Reverse,
    Wait,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BotRuntimeStatus {
    Running,
    Stopped,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default)]
pub struct PyramidingConfig {
    pub pyramiding_n: u8,
    pub pyramiding_x: Decimal,
}

impl PyramidingConfig {
    #[must_use]
    pub fn none() -> Self {
        Self::default()
    }

    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        self.pyramiding_n > 0
    }
}

/// Exchange credentials owned by a single bot. Every exchange call the bot
/// makes is signed with this keypair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExchangeCredentials {
    pub api_key: String,
    pub api_secret: String,
}

/// Immutable-after-create description of a bot, per the fleet's data model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotConfig {
    pub bot_id: String,
    pub mode: BotMode,
    pub symbol: Option<String>,
    pub leverage: u32,
    pub percent: Decimal,
    pub tp: Decimal,
    pub sl: Option<Decimal>,
    pub roi_trigger: Option<Decimal>,
    pub dynamic_strategy: Option<DynamicStrategy>,
    pub static_entry_mode: Option<StaticEntryMode>,
    pub reverse_on_stop: bool,
    pub pyramiding: PyramidingConfig,
    pub credentials: ExchangeCredentials,
    pub status: BotRuntimeStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl BotConfig {
    /// Validates the invariants named in the data model: static bots carry a
    /// symbol at creation, and a nonzero pyramid count implies a nonzero step.
    ///
    /// # Errors
    /// Returns [`FleetError::InvalidConfig`] if an invariant is violated.
    pub fn validate(&self) -> Result<(), FleetError> {
        match self.mode {
            BotMode::Static if self.symbol.is_none() => {
                return Err(FleetError::InvalidConfig(
                    "static bot requires a symbol at creation".into(),
                ));
            }
            BotMode::Static if self.static_entry_mode.is_none() => {
                return Err(FleetError::InvalidConfig(
                    "static bot requires an entry mode".into(),
                ));
            }
            BotMode::Dynamic if self.dynamic_strategy.is_none() => {
                return Err(FleetError::InvalidConfig(
                    "dynamic bot requires a discovery strategy".into(),
                ));
            }
            _ => {}
        }

        let pyramiding = self.pyramiding;
        if (pyramiding.pyramiding_n > 0) != (pyramiding.pyramiding_x > Decimal::ZERO) {
            return Err(FleetError::InvalidConfig(
                "pyramiding_n and pyramiding_x must both be zero or both be positive".into(),
            ));
        }

        Ok(())
    }

    #[must_use]
    pub const fn is_static(&self) -> bool {
        matches!(self.mode, BotMode::Static)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> BotConfig {
        let now = Utc::now();
        BotConfig {
            bot_id: "bot-1".into(),
            mode: BotMode::Static,
            symbol: Some("BTCUSDT".into()),
            leverage: 10,
            percent: Decimal::TEN,
            tp: Decimal::from(50),
            sl: None,
            roi_trigger: None,
            dynamic_strategy: None,
            static_entry_mode: Some(StaticEntryMode::Signal),
            reverse_on_stop: false,
            pyramiding: PyramidingConfig::none(),
            credentials: ExchangeCredentials {
                api_key: "k".into(),
                api_secret: "s".into(),
            },
            status: BotRuntimeStatus::Stopped,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }

    #[test]
    fn static_bot_without_symbol_is_invalid() {
        let mut cfg = base_config();
        cfg.symbol = None;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn static_bot_without_entry_mode_is_invalid() {
        let mut cfg = base_config();
        cfg.static_entry_mode = None;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn dynamic_bot_without_strategy_is_invalid() {
        let mut cfg = base_config();
        cfg.mode = BotMode::Dynamic;
        cfg.dynamic_strategy = None;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn mismatched_pyramiding_fields_are_invalid() {
        let mut cfg = base_config();
        cfg.pyramiding = PyramidingConfig {
            pyramiding_n: 2,
            pyramiding_x: Decimal::ZERO,
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn consistent_pyramiding_fields_are_valid() {
        let mut cfg = base_config();
        cfg.pyramiding = PyramidingConfig {
            pyramiding_n: 2,
            pyramiding_x: Decimal::from(100),
        };
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn side_opposite_round_trips() {
        assert_eq!(Side::Buy.opposite(), Side::Sell);
        assert_eq!(Side::Sell.opposite(), Side::Buy);
    }
}
