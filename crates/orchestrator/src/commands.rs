//! Commands a [`crate::bot_handle::BotHandle`] can send into its
//! [`crate::bot_actor::BotActor`], and the runtime status snapshot the actor
//! publishes back.

use chrono::{DateTime, Utc};
use fleet_core::{BotConfig, BotRuntimeStatus};
use rust_decimal::Decimal;
use tokio::sync::oneshot;

#[derive(Debug)]
pub enum BotCommand {
    Start,
    Stop,
    UpdateConfig(Box<BotConfig>),
    GetStatus(oneshot::Sender<BotStatus>),
    Shutdown,
}

#[derive(Debug, Clone)]
pub struct SymbolStatus {
    pub symbol: String,
    pub side: Option<fleet_core::Side>,
    pub quantity: Decimal,
    pub entry_price: Decimal,
    pub current_price: Decimal,
    pub roi_percent: Decimal,
    pub pyramiding_count: u8,
}

#[derive(Debug, Clone)]
pub struct BotStatus {
    pub bot_id: String,
    pub state: BotRuntimeStatus,
    pub last_heartbeat: DateTime<Utc>,
    pub symbols: Vec<SymbolStatus>,
    pub error: Option<String>,
}
