//! Owns the fleet of spawned bot actors: bootstrap from persistence and from
//! the `BOOTSTRAP_BOTS` environment variable, and the operator-facing
//! add/stop/list surface. Every bot, whichever source created it, is spawned
//! through [`BotManager::add_bot`].

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use fleet_core::traits::ExchangeGateway;
use fleet_core::{
    BotConfig, BotMode, BotRuntimeStatus, Clock, DynamicStrategy, ExchangeCredentials,
    PyramidingConfig, StaticEntryMode,
};
use fleet_data::DatabaseClient;
use fleet_signals::SignalAnalyzer;
use rust_decimal::Decimal;
use serde::Deserialize;
use tokio::sync::{broadcast, mpsc, watch, RwLock};

use crate::bot_actor::BotActor;
use crate::bot_handle::BotHandle;
use crate::commands::BotStatus;
use crate::coordinator::FleetCoordinator;
use crate::safety::SafetyGovernor;

const EVENT_CHANNEL_CAPACITY: usize = 1000;
const COMMAND_CHANNEL_CAPACITY: usize = 32;

/// Everything `add_bot` needs besides the generated `bot_id`; shared by the
/// interactive add path and the `BOOTSTRAP_BOTS` parser.
#[derive(Debug, Clone)]
pub struct AddBotParams {
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
    pub pyramiding_n: u8,
    pub pyramiding_x: Decimal,
    pub credentials: ExchangeCredentials,
    pub bot_count: u32,
}

/// One entry of the `BOOTSTRAP_BOTS` JSON array, field-named after the
/// original Python implementation's `main.py` so operators can carry over
/// existing deployment configuration verbatim.
#[derive(Debug, Deserialize)]
struct BootstrapBotSpec {
    bot_mode: BotMode,
    symbol: Option<String>,
    lev: u32,
    percent: Decimal,
    tp: Decimal,
    sl: Option<Decimal>,
    roi_trigger: Option<Decimal>,
    static_entry_mode: Option<StaticEntryMode>,
    dynamic_strategy: Option<DynamicStrategy>,
    #[serde(default)]
    reverse_on_stop: bool,
    #[serde(default)]
    pyramiding_n: u8,
    #[serde(default)]
    pyramiding_x: Decimal,
    #[serde(default = "default_bot_count")]
    bot_count: u32,
}

const fn default_bot_count() -> u32 {
    1
}

pub struct BotManager {
    bots: RwLock<HashMap<String, BotHandle>>,
    db: Arc<DatabaseClient>,
    gateway: Arc<dyn ExchangeGateway>,
    signals: Arc<SignalAnalyzer>,
    coordinator: Arc<FleetCoordinator>,
    safety_threshold: Decimal,
    clock: Arc<dyn Clock>,
}

impl BotManager {
    #[must_use]
    pub fn new(
        db: Arc<DatabaseClient>,
        gateway: Arc<dyn ExchangeGateway>,
        signals: Arc<SignalAnalyzer>,
        coordinator: Arc<FleetCoordinator>,
        safety_threshold: Decimal,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            bots: RwLock::new(HashMap::new()),
            db,
            gateway,
            signals,
            coordinator,
            safety_threshold,
            clock,
        }
    }

    /// Loads every non-deleted `status=running` config, spawns its actor, and
    /// re-attaches any persisted open position. Does not touch
    /// `BOOTSTRAP_BOTS` — call [`Self::bootstrap_from_env`] separately.
    ///
    /// # Errors
    /// Returns an error if the initial config/position listing fails.
    pub async fn bootstrap(&self) -> Result<Vec<String>> {
        let configs = self.db.list_bots(true).await?;
        let open_positions = self.db.list_open_positions().await?;
        self.coordinator
            .restore(open_positions.iter().map(|p| p.bot_id.clone()))
            .await;

        let mut restored = Vec::new();
        for config in configs {
            let bot_id = config.bot_id.clone();
            let position = open_positions.iter().find(|p| p.bot_id == bot_id).cloned();
            match self.spawn_actor(config, position).await {
                Ok(()) => {
                    tracing::info!(%bot_id, "restored bot from persistence");
                    restored.push(bot_id);
                }
                Err(error) => tracing::error!(%bot_id, %error, "failed to restore bot"),
            }
        }
        Ok(restored)
    }

    /// Consumes `BOOTSTRAP_BOTS` if set, passing each entry through
    /// [`Self::add_bot`]. A missing or empty variable is a no-op; a
    /// malformed one logs a warning and applies nothing (not a partial set).
    ///
    /// # Errors
    /// Returns an error only if a successfully parsed entry fails to persist
    /// or spawn; a malformed environment variable itself never errors.
    pub async fn bootstrap_from_env(&self) -> Result<Vec<String>> {
        let Ok(raw) = std::env::var("BOOTSTRAP_BOTS") else {
            return Ok(Vec::new());
        };
        if raw.trim().is_empty() {
            return Ok(Vec::new());
        }

        let specs: Vec<BootstrapBotSpec> = match serde_json::from_str(&raw) {
            Ok(specs) => specs,
            Err(error) => {
                tracing::warn!(%error, "BOOTSTRAP_BOTS is malformed, skipping bootstrap entirely");
                return Ok(Vec::new());
            }
        };

        let mut spawned = Vec::new();
        for spec in specs {
            let params = AddBotParams {
                mode: spec.bot_mode,
                symbol: spec.symbol,
                leverage: spec.lev,
                percent: spec.percent,
                tp: spec.tp,
                sl: spec.sl,
                roi_trigger: spec.roi_trigger,
                dynamic_strategy: spec.dynamic_strategy,
                static_entry_mode: spec.static_entry_mode,
                reverse_on_stop: spec.reverse_on_stop,
                pyramiding_n: spec.pyramiding_n,
                pyramiding_x: spec.pyramiding_x,
                credentials: self.gateway.credentials().clone(),
                bot_count: spec.bot_count,
            };
            spawned.extend(self.add_bot(params).await?);
        }
        Ok(spawned)
    }

    /// Generates `bot_count` deterministic bot ids from `params`, persists
    /// each config, then spawns its actor. Shared by the operator surface and
    /// [`Self::bootstrap_from_env`].
    ///
    /// # Errors
    /// Returns an error if persistence or actor spawning fails.
    pub async fn add_bot(&self, params: AddBotParams) -> Result<Vec<String>> {
        let prefix = bot_id_prefix(params.mode, params.symbol.as_deref(), params.dynamic_strategy);

        let mut bot_ids = Vec::with_capacity(params.bot_count as usize);
        for index in 0..params.bot_count.max(1) {
            let bot_id = format!("{prefix}-{index}");
            let now = Utc::now();
            let config = BotConfig {
                bot_id: bot_id.clone(),
                mode: params.mode,
                symbol: params.symbol.clone(),
                leverage: params.leverage,
                percent: params.percent,
                tp: params.tp,
                sl: params.sl,
                roi_trigger: params.roi_trigger,
                dynamic_strategy: params.dynamic_strategy,
                static_entry_mode: params.static_entry_mode,
                reverse_on_stop: params.reverse_on_stop,
                pyramiding: PyramidingConfig { pyramiding_n: params.pyramiding_n, pyramiding_x: params.pyramiding_x },
                credentials: params.credentials.clone(),
                status: BotRuntimeStatus::Stopped,
                created_at: now,
                updated_at: now,
                deleted_at: None,
            };
            config.validate().with_context(|| format!("invalid config for {bot_id}"))?;

            self.db.upsert_bot_config(&config).await?;
            self.spawn_actor(config, None).await?;
            bot_ids.push(bot_id);
        }
        Ok(bot_ids)
    }

    async fn spawn_actor(&self, config: BotConfig, position: Option<fleet_core::Position>) -> Result<()> {
        let bot_id = config.bot_id.clone();
        let (tx, rx) = mpsc::channel(COMMAND_CHANNEL_CAPACITY);
        let (event_tx, _event_rx) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let (status_tx, _status_rx) = watch::channel(BotStatus {
            bot_id: bot_id.clone(),
            state: BotRuntimeStatus::Stopped,
            last_heartbeat: self.clock.now(),
            symbols: Vec::new(),
            error: None,
        });

        let mut actor = BotActor::new(
            config,
            rx,
            event_tx,
            status_tx,
            Arc::clone(&self.clock),
            Arc::clone(&self.gateway),
            Arc::clone(&self.db),
            Arc::clone(&self.signals),
            Arc::clone(&self.coordinator),
            SafetyGovernor::new(self.safety_threshold),
        );
        if let Some(position) = position {
            actor.restore_position(&position);
        }

        let handle = BotHandle::new(tx);
        let task_bot_id = bot_id.clone();
        tokio::spawn(async move {
            if let Err(error) = actor.run().await {
                tracing::error!(bot_id = %task_bot_id, %error, "bot actor exited with error");
            }
        });

        self.bots.write().await.insert(bot_id, handle);
        Ok(())
    }

    /// # Errors
    /// Returns an error if the bot is unknown or its shutdown command fails.
    pub async fn stop_bot(&self, bot_id: &str) -> Result<()> {
        let handle = self.bots.read().await.get(bot_id).cloned();
        match handle {
            Some(handle) => handle.stop().await,
            None => anyhow::bail!("unknown bot {bot_id}"),
        }
    }

    /// # Errors
    /// Returns an error if any bot's stop command fails.
    pub async fn stop_all(&self) -> Result<()> {
        let handles: Vec<BotHandle> = self.bots.read().await.values().cloned().collect();
        for handle in handles {
            handle.stop().await?;
        }
        Ok(())
    }

    /// Pull interface for the fleet census the operator surface reads.
    #[must_use]
    pub async fn list_bot_ids(&self) -> Vec<String> {
        self.bots.read().await.keys().cloned().collect()
    }

    pub async fn coordinator_snapshot(&self) -> crate::coordinator::CoordinatorSnapshot {
        self.coordinator.snapshot().await
    }
}

/// Deterministic prefix `add_bot` appends `-{index}` to; factored out so the
/// naming scheme is unit-testable without spawning an actor.
fn bot_id_prefix(mode: BotMode, symbol: Option<&str>, strategy: Option<DynamicStrategy>) -> String {
    match mode {
        BotMode::Static => format!("static-{}", symbol.unwrap_or_default()),
        BotMode::Dynamic => format!(
            "dynamic-{}",
            strategy.map_or("unset", |s| match s {
                DynamicStrategy::Volume => "volume",
                DynamicStrategy::Volatility => "volatility",
            })
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn static_prefix_includes_symbol() {
        assert_eq!(bot_id_prefix(BotMode::Static, Some("BTCUSDT"), None), "static-BTCUSDT");
    }

    #[test]
    fn dynamic_prefix_includes_strategy() {
        assert_eq!(
            bot_id_prefix(BotMode::Dynamic, None, Some(DynamicStrategy::Volatility)),
            "dynamic-volatility"
        );
    }

    #[test]
    fn bootstrap_from_env_is_noop_without_var() {
        std::env::remove_var("BOOTSTRAP_BOTS");
        assert!(std::env::var("BOOTSTRAP_BOTS").is_err());
    }
}
