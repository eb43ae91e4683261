//! Fire-and-forget notification events, tagged with bot id and kind, that
//! the bot actor broadcasts for the (unimplemented) messaging sink to relay.

use chrono::{DateTime, Utc};
use fleet_core::{Side, TradeReason};
use rust_decimal::Decimal;

#[derive(Debug, Clone)]
pub enum BotEvent {
    Opened {
        bot_id: String,
        symbol: String,
        side: Side,
        price: Decimal,
        quantity: Decimal,
    },
    Closed {
        bot_id: String,
        symbol: String,
        side: Side,
        price: Decimal,
        pnl: Decimal,
        roi: Decimal,
        reason: TradeReason,
    },
    Pyramided {
        bot_id: String,
        symbol: String,
        new_entry: Decimal,
        new_quantity: Decimal,
        pyramiding_count: u8,
    },
    SafetyTripped {
        bot_id: String,
        margin_ratio: Decimal,
    },
    Error {
        bot_id: String,
        message: String,
        timestamp: DateTime<Utc>,
    },
}

impl BotEvent {
    #[must_use]
    pub fn bot_id(&self) -> &str {
        match self {
            Self::Opened { bot_id, .. }
            | Self::Closed { bot_id, .. }
            | Self::Pyramided { bot_id, .. }
            | Self::SafetyTripped { bot_id, .. }
            | Self::Error { bot_id, .. } => bot_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bot_id_is_extracted_for_every_variant() {
        let event = BotEvent::SafetyTripped { bot_id: "bot-1".to_string(), margin_ratio: Decimal::ONE };
        assert_eq!(event.bot_id(), "bot-1");
    }
}
