pub mod bot_actor;
pub mod bot_handle;
pub mod commands;
pub mod coordinator;
pub mod events;
pub mod manager;
pub mod safety;

pub use bot_actor::BotActor;
pub use bot_handle::BotHandle;
pub use commands::{BotCommand, BotStatus, SymbolStatus};
pub use coordinator::{CoordinatorSnapshot, FleetCoordinator};
pub use events::BotEvent;
pub use manager::{AddBotParams, BotManager};
pub use safety::SafetyGovernor;
