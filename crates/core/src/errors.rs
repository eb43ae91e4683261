use thiserror::Error;

/// Crate-local error type for invariant violations inside the domain model.
///
/// Call sites outside this crate generally propagate these through
/// `anyhow::Result` with added context; this type exists so the handful of
/// conditions a caller might want to match on (rather than just log) are
/// named rather than buried in a formatted string.
#[derive(Debug, Error)]
pub enum FleetError {
    #[error("symbol {0} already has an open position")]
    PositionAlreadyOpen(String),

    #[error("bot {bot_id} has no open position on {symbol}")]
    NoOpenPosition { bot_id: String, symbol: String },

    #[error("invalid bot config: {0}")]
    InvalidConfig(String),

    #[error("quantity rounds to zero at step size {step_size} for notional {notional}")]
    QuantityBelowStepSize {
        step_size: rust_decimal::Decimal,
        notional: rust_decimal::Decimal,
    },
}
