pub mod clock;
pub mod config;
pub mod config_loader;
pub mod errors;
pub mod models;
pub mod position;
pub mod signal;
pub mod trade;
pub mod traits;

pub use clock::{Clock, SystemClock};
pub use config::{AppConfig, DatabaseConfig, ExchangeConfig, LoggingConfig, NotificationConfig, SafetyConfig};
pub use config_loader::ConfigLoader;
pub use errors::FleetError;
pub use models::{
    BotConfig, BotMode, BotRuntimeStatus, DynamicStrategy, ExchangeCredentials, PyramidingConfig,
    Side, StaticEntryMode,
};
pub use position::{position_roi, Position, PositionStatus};
pub use signal::{Candle, Signal, SignalAnalyzerConfig};
pub use trade::{BotStatistics, TradeEvent, TradeReason};
pub use traits::{ExchangeGateway, Kline, Ticker24h};
