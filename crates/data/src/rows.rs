//! `sqlx::FromRow` row shapes and their conversions to/from the domain types
//! in `fleet_core`. Kept separate from `database.rs` so the DAO methods read
//! as a flat list of queries.

use chrono::{DateTime, Utc};
use fleet_core::{
    BotConfig, BotMode, BotRuntimeStatus, DynamicStrategy, PyramidingConfig, Side,
    StaticEntryMode,
};
use fleet_core::models::ExchangeCredentials;
use fleet_core::position::{Position, PositionStatus};
use fleet_core::trade::{BotStatistics, TradeEvent, TradeReason};
use rust_decimal::Decimal;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct BotConfigRow {
    pub bot_id: String,
    pub mode: String,
    pub symbol: Option<String>,
    pub leverage: i32,
    pub percent: Decimal,
    pub tp: Decimal,
    pub sl: Option<Decimal>,
    pub roi_trigger: Option<Decimal>,
    pub dynamic_strategy: Option<String>,
    pub static_entry_mode: Option<String>,
    pub reverse_on_stop: bool,
    pub pyramiding_n: i16,
    pub pyramiding_x: Decimal,
    pub api_key: String,
    pub api_secret: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl TryFrom<BotConfigRow> for BotConfig {
    type Error = anyhow::Error;

    fn try_from(row: BotConfigRow) -> Result<Self, Self::Error> {
        Ok(Self {
            bot_id: row.bot_id,
            mode: parse_mode(&row.mode)?,
            symbol: row.symbol,
            leverage: u32::try_from(row.leverage)?,
            percent: row.percent,
            tp: row.tp,
            sl: row.sl,
            roi_trigger: row.roi_trigger,
            dynamic_strategy: row.dynamic_strategy.as_deref().map(parse_dynamic_strategy).transpose()?,
            static_entry_mode: row.static_entry_mode.as_deref().map(parse_entry_mode).transpose()?,
            reverse_on_stop: row.reverse_on_stop,
            pyramiding: PyramidingConfig {
                pyramiding_n: u8::try_from(row.pyramiding_n)?,
                pyramiding_x: row.pyramiding_x,
            },
            credentials: ExchangeCredentials { api_key: row.api_key, api_secret: row.api_secret },
            status: parse_status(&row.status)?,
            created_at: row.created_at,
            updated_at: row.updated_at,
            deleted_at: row.deleted_at,
        })
    }
}

pub fn mode_str(mode: BotMode) -> &'static str {
    match mode {
        BotMode::Static => "static",
        BotMode::Dynamic => "dynamic",
    }
}

pub fn status_str(status: BotRuntimeStatus) -> &'static str {
    match status {
        BotRuntimeStatus::Running => "running",
        BotRuntimeStatus::Stopped => "stopped",
    }
}

pub fn dynamic_strategy_str(s: DynamicStrategy) -> &'static str {
    match s {
        DynamicStrategy::Volume => "volume",
        DynamicStrategy::Volatility => "volatility",
    }
}

pub fn entry_mode_str(m: StaticEntryMode) -> &'static str {
    match m {
        StaticEntryMode::Signal => "signal",
        StaticEntryMode::Reverse => "reverse",
        StaticEntryMode::Wait => "wait",
    }
}

pub fn side_str(side: Side) -> &'static str {
    match side {
        Side::Buy => "BUY",
        Side::Sell => "SELL",
    }
}

fn parse_mode(s: &str) -> anyhow::Result<BotMode> {
    match s {
        "static" => Ok(BotMode::Static),
        "dynamic" => Ok(BotMode::Dynamic),
        other => anyhow::bail!("unknown bot mode '{other}'"),
    }
}

fn parse_status(s: &str) -> anyhow::Result<BotRuntimeStatus> {
    match s {
        "running" => Ok(BotRuntimeStatus::Running),
        "stopped" => Ok(BotRuntimeStatus::Stopped),
        other => anyhow::bail!("unknown bot status '{other}'"),
    }
}

fn parse_dynamic_strategy(s: &str) -> anyhow::Result<DynamicStrategy> {
    match s {
        "volume" => Ok(DynamicStrategy::Volume),
        "volatility" => Ok(DynamicStrategy::Volatility),
        other => anyhow::bail!("unknown dynamic strategy '{other}'"),
    }
}

fn parse_entry_mode(s: &str) -> anyhow::Result<StaticEntryMode> {
    match s {
        "signal" => Ok(StaticEntryMode::Signal),
        "reverse" => Ok(StaticEntryMode::Reverse),
        "wait" => Ok(StaticEntryMode::Wait),
        other => anyhow::bail!("unknown static entry mode '{other}'"),
    }
}

fn parse_side(s: &str) -> anyhow::Result<Side> {
    match s {
        "BUY" => Ok(Side::Buy),
        "SELL" => Ok(Side::Sell),
        other => anyhow::bail!("unknown side '{other}'"),
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct PositionRow {
    pub bot_id: String,
    pub symbol: String,
    pub side: String,
    pub entry_price: Decimal,
    pub quantity: Decimal,
    pub current_price: Decimal,
    pub pyramiding_count: i16,
    pub status: String,
    pub opened_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
    pub last_update: DateTime<Utc>,
}

impl TryFrom<PositionRow> for Position {
    type Error = anyhow::Error;

    fn try_from(row: PositionRow) -> Result<Self, Self::Error> {
        Ok(Self {
            bot_id: row.bot_id,
            symbol: row.symbol,
            side: parse_side(&row.side)?,
            entry_price: row.entry_price,
            quantity: row.quantity,
            pyramiding_count: u8::try_from(row.pyramiding_count)?,
            current_price: row.current_price,
            status: match row.status.as_str() {
                "pending" => PositionStatus::Pending,
                "open" => PositionStatus::Open,
                "closed" => PositionStatus::Closed,
                other => anyhow::bail!("unknown position status '{other}'"),
            },
            opened_at: row.opened_at,
            closed_at: row.closed_at,
            last_update: row.last_update,
        })
    }
}

pub fn position_status_str(status: PositionStatus) -> &'static str {
    match status {
        PositionStatus::Pending => "pending",
        PositionStatus::Open => "open",
        PositionStatus::Closed => "closed",
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct TradeEventRow {
    pub bot_id: String,
    pub symbol: String,
    pub side: String,
    pub price: Decimal,
    pub quantity: Decimal,
    pub pnl: Option<Decimal>,
    pub roi: Option<Decimal>,
    pub reason: String,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<TradeEventRow> for TradeEvent {
    type Error = anyhow::Error;

    fn try_from(row: TradeEventRow) -> Result<Self, Self::Error> {
        Ok(Self {
            bot_id: row.bot_id,
            symbol: row.symbol,
            side: parse_side(&row.side)?,
            price: row.price,
            quantity: row.quantity,
            pnl: row.pnl,
            roi: row.roi,
            reason: parse_reason(&row.reason)?,
            created_at: row.created_at,
        })
    }
}

pub fn reason_str(reason: TradeReason) -> &'static str {
    match reason {
        TradeReason::OpenSignal => "open_signal",
        TradeReason::OpenReverse => "open_reverse",
        TradeReason::OpenStaticWait => "open_static_wait",
        TradeReason::Pyramid => "pyramid",
        TradeReason::TakeProfit => "take_profit",
        TradeReason::StopLoss => "stop_loss",
        TradeReason::SmartExit => "smart_exit",
        TradeReason::EarlyReversal => "early_reversal",
        TradeReason::OperatorStop => "operator_stop",
        TradeReason::SafetyTrip => "safety_trip",
    }
}

fn parse_reason(s: &str) -> anyhow::Result<TradeReason> {
    Ok(match s {
        "open_signal" => TradeReason::OpenSignal,
        "open_reverse" => TradeReason::OpenReverse,
        "open_static_wait" => TradeReason::OpenStaticWait,
        "pyramid" => TradeReason::Pyramid,
        "take_profit" => TradeReason::TakeProfit,
        "stop_loss" => TradeReason::StopLoss,
        "smart_exit" => TradeReason::SmartExit,
        "early_reversal" => TradeReason::EarlyReversal,
        "operator_stop" => TradeReason::OperatorStop,
        "safety_trip" => TradeReason::SafetyTrip,
        other => anyhow::bail!("unknown trade reason '{other}'"),
    })
}

#[derive(Debug, Clone, Copy, Default, sqlx::FromRow)]
pub struct BotStatisticsRow {
    pub total_trades: i64,
    pub winning_trades: i64,
    pub losing_trades: i64,
    pub total_pnl: Decimal,
}

impl From<BotStatisticsRow> for BotStatistics {
    fn from(row: BotStatisticsRow) -> Self {
        Self {
            total_trades: row.total_trades.max(0) as u64,
            winning_trades: row.winning_trades.max(0) as u64,
            losing_trades: row.losing_trades.max(0) as u64,
            total_pnl: row.total_pnl,
        }
    }
}
