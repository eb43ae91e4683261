//! The per-bot tick-based state machine: acquires at most one symbol, opens
//! and closes positions against it, and reacts to its own safety governor.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::{DateTime, Utc};
use fleet_core::traits::ExchangeGateway;
use fleet_core::{
    position_roi, BotConfig, BotRuntimeStatus, Clock, DynamicStrategy, Position, PositionStatus,
    Side, SignalAnalyzerConfig, StaticEntryMode, TradeEvent, TradeReason,
};
use fleet_data::DatabaseClient;
use fleet_signals::{top_by_quote_volume, top_by_volatility, SignalAnalyzer};
use rand::seq::SliceRandom;
use rust_decimal::Decimal;
use tokio::sync::{broadcast, mpsc, watch};

use crate::commands::{BotCommand, BotStatus, SymbolStatus};
use crate::coordinator::FleetCoordinator;
use crate::events::BotEvent;
use crate::safety::SafetyGovernor;

const SAFETY_CHECK_INTERVAL_SECS: i64 = 10;
const CENSUS_INTERVAL_SECS: i64 = 30;
const POSITION_REFRESH_INTERVAL_SECS: i64 = 30;
const OPEN_CLOSE_COOLDOWN_SECS: i64 = 30;
const CLOSE_DEBOUNCE_SECS: i64 = 30;
const PYRAMID_COOLDOWN_SECS: i64 = 60;
const RANKING_LIMIT: usize = 20;
const MIN_QUOTE_VOLUME: Decimal = Decimal::from_parts(50_000, 0, 0, false, 0);
const MIN_VOLATILITY_PERCENT: Decimal = Decimal::from_parts(3, 0, 0, false, 0);
const IMBALANCE_THRESHOLD_VOLUME: Decimal = Decimal::from_parts(1, 0, 0, false, 1); // 0.1
const IMBALANCE_THRESHOLD_VOLATILITY: Decimal = Decimal::from_parts(1, 0, 0, false, 2); // 0.01
const EARLY_REVERSAL_ROI_THRESHOLD: Decimal = Decimal::from_parts(50, 0, 0, true, 0); // -50
const RECENT_EVENTS_CAPACITY: usize = 10;

/// Everything the bot tracks about the one symbol it currently owns.
#[derive(Debug, Clone)]
struct SymbolState {
    symbol: String,
    position_open: bool,
    side: Option<Side>,
    quantity: Decimal,
    entry_price: Decimal,
    current_price: Decimal,
    last_trade_time: Option<DateTime<Utc>>,
    last_close_time: Option<DateTime<Utc>>,
    high_water_mark_roi: Decimal,
    roi_check_activated: bool,
    close_attempted_at: Option<DateTime<Utc>>,
    last_position_check: Option<DateTime<Utc>>,
    pyramiding_count: u8,
    pyramiding_base_roi: Decimal,
    last_pyramiding_time: Option<DateTime<Utc>>,
}

impl SymbolState {
    fn new(symbol: String) -> Self {
        Self {
            symbol,
            position_open: false,
            side: None,
            quantity: Decimal::ZERO,
            entry_price: Decimal::ZERO,
            current_price: Decimal::ZERO,
            last_trade_time: None,
            last_close_time: None,
            high_water_mark_roi: Decimal::ZERO,
            roi_check_activated: false,
            close_attempted_at: None,
            last_position_check: None,
            pyramiding_count: 0,
            pyramiding_base_roi: Decimal::ZERO,
            last_pyramiding_time: None,
        }
    }
}

/// Counts and leverage-weighted notionals across every bot's open positions,
/// refreshed every 30 s. The venue exposes no fleet-wide view, so this reads
/// persistence (which every bot's opening/closing protocol keeps in sync)
/// rather than re-querying the venue once per bot.
#[derive(Debug, Clone, Copy, Default)]
struct Census {
    long_notional: Decimal,
    short_notional: Decimal,
}

impl Census {
    fn imbalance(&self) -> Decimal {
        let total = self.long_notional + self.short_notional;
        if total.is_zero() {
            return Decimal::ZERO;
        }
        (self.long_notional - self.short_notional).abs() / total
    }

    /// The side carrying less notional, i.e. the side a balancing bot should
    /// take to reduce the fleet's net skew.
    fn minority_side(&self) -> Side {
        if self.long_notional <= self.short_notional {
            Side::Buy
        } else {
            Side::Sell
        }
    }
}

pub struct BotActor {
    config: BotConfig,
    status: BotRuntimeStatus,
    rx: mpsc::Receiver<BotCommand>,
    event_tx: broadcast::Sender<BotEvent>,
    status_tx: watch::Sender<BotStatus>,
    recent_events: VecDeque<BotEvent>,

    clock: Arc<dyn Clock>,
    gateway: Arc<dyn ExchangeGateway>,
    db: Arc<DatabaseClient>,
    signals: Arc<SignalAnalyzer>,
    coordinator: Arc<FleetCoordinator>,
    safety: SafetyGovernor,

    symbol: Option<SymbolState>,
    last_safety_check: Option<DateTime<Utc>>,
    last_census: Option<DateTime<Utc>>,
    census: Census,
}

impl BotActor {
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: BotConfig,
        rx: mpsc::Receiver<BotCommand>,
        event_tx: broadcast::Sender<BotEvent>,
        status_tx: watch::Sender<BotStatus>,
        clock: Arc<dyn Clock>,
        gateway: Arc<dyn ExchangeGateway>,
        db: Arc<DatabaseClient>,
        signals: Arc<SignalAnalyzer>,
        coordinator: Arc<FleetCoordinator>,
        safety: SafetyGovernor,
    ) -> Self {
        let symbol = config.symbol.clone().filter(|_| config.is_static()).map(SymbolState::new);
        Self {
            config,
            status: BotRuntimeStatus::Stopped,
            rx,
            event_tx,
            status_tx,
            recent_events: VecDeque::with_capacity(RECENT_EVENTS_CAPACITY),
            clock,
            gateway,
            db,
            signals,
            coordinator,
            safety,
            symbol,
            last_safety_check: None,
            last_census: None,
            census: Census::default(),
        }
    }

    /// Restores an already-open position from persistence, re-attaching the
    /// symbol this bot owns on the venue. Called by the bot manager on
    /// startup before the actor is spawned.
    pub fn restore_position(&mut self, position: &Position) {
        let mut state = SymbolState::new(position.symbol.clone());
        state.position_open = true;
        state.side = Some(position.side);
        state.quantity = position.quantity;
        state.entry_price = position.entry_price;
        state.current_price = position.current_price;
        self.symbol = Some(state);
    }

    pub async fn run(mut self) -> Result<()> {
        tracing::info!(bot_id = %self.config.bot_id, "bot actor starting");
        let mut ticker = tokio::time::interval(Duration::from_secs(1));

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if self.status == BotRuntimeStatus::Running {
                        if let Err(error) = self.tick().await {
                            tracing::error!(bot_id = %self.config.bot_id, %error, "tick failed");
                            self.emit(BotEvent::Error {
                                bot_id: self.config.bot_id.clone(),
                                message: error.to_string(),
                                timestamp: self.clock.now(),
                            });
                        }
                    }
                    self.publish_status();
                }
                cmd = self.rx.recv() => {
                    match cmd {
                        Some(cmd) => {
                            if self.handle_command(cmd).await {
                                break;
                            }
                        }
                        None => break,
                    }
                }
            }
        }

        tracing::info!(bot_id = %self.config.bot_id, "bot actor stopped");
        Ok(())
    }

    /// Returns `true` if the actor loop should exit.
    async fn handle_command(&mut self, cmd: BotCommand) -> bool {
        match cmd {
            BotCommand::Start => {
                if self.status == BotRuntimeStatus::Running {
                    tracing::warn!(bot_id = %self.config.bot_id, "already running, ignoring start");
                    return false;
                }
                tracing::info!(bot_id = %self.config.bot_id, "bot starting");
                self.status = BotRuntimeStatus::Running;
                if let Err(error) = self.db.set_bot_status(&self.config.bot_id, true).await {
                    tracing::error!(bot_id = %self.config.bot_id, %error, "failed to persist running status");
                }
                false
            }
            BotCommand::Stop => {
                tracing::info!(bot_id = %self.config.bot_id, "bot stopping");
                if let Err(error) = self.stop().await {
                    tracing::error!(bot_id = %self.config.bot_id, %error, "error while stopping");
                }
                false
            }
            BotCommand::UpdateConfig(new_config) => {
                tracing::info!(bot_id = %self.config.bot_id, "config updated");
                self.config = *new_config;
                false
            }
            BotCommand::GetStatus(tx) => {
                let _ = tx.send(self.build_status());
                false
            }
            BotCommand::Shutdown => {
                tracing::info!(bot_id = %self.config.bot_id, "bot shutting down");
                if let Err(error) = self.stop().await {
                    tracing::error!(bot_id = %self.config.bot_id, %error, "error while shutting down");
                }
                true
            }
        }
    }

    fn publish_status(&self) {
        let _ = self.status_tx.send(self.build_status());
    }

    fn build_status(&self) -> BotStatus {
        let symbols = self
            .symbol
            .as_ref()
            .map(|s| {
                vec![SymbolStatus {
                    symbol: s.symbol.clone(),
                    side: s.side,
                    quantity: s.quantity,
                    entry_price: s.entry_price,
                    current_price: s.current_price,
                    roi_percent: if s.position_open {
                        position_roi(
                            s.side.unwrap_or(Side::Buy),
                            s.entry_price,
                            s.current_price,
                            s.quantity,
                            self.config.leverage,
                        )
                    } else {
                        Decimal::ZERO
                    },
                    pyramiding_count: s.pyramiding_count,
                }]
            })
            .unwrap_or_default();

        BotStatus {
            bot_id: self.config.bot_id.clone(),
            state: self.status,
            last_heartbeat: self.clock.now(),
            symbols,
            error: None,
        }
    }

    fn emit(&mut self, event: BotEvent) {
        if self.recent_events.len() == RECENT_EVENTS_CAPACITY {
            self.recent_events.pop_front();
        }
        self.recent_events.push_back(event.clone());
        let _ = self.event_tx.send(event);
    }

    // ---- the tick ----------------------------------------------------

    async fn tick(&mut self) -> Result<()> {
        let now = self.clock.now();

        if self.due(self.last_safety_check, now, SAFETY_CHECK_INTERVAL_SECS) {
            self.last_safety_check = Some(now);
            if let Some(ratio) = self.safety.check(&self.gateway).await {
                tracing::warn!(bot_id = %self.config.bot_id, %ratio, "safety governor tripped");
                self.emit(BotEvent::SafetyTripped { bot_id: self.config.bot_id.clone(), margin_ratio: ratio });
                self.stop_all_symbols(TradeReason::SafetyTrip).await?;
                return Ok(());
            }
        }

        if self.due(self.last_census, now, CENSUS_INTERVAL_SECS) {
            self.last_census = Some(now);
            self.census = self.compute_census().await?;
        }

        self.acquire_symbol(now).await?;
        self.process_symbol(now).await?;
        Ok(())
    }

    fn due(&self, last: Option<DateTime<Utc>>, now: DateTime<Utc>, interval_secs: i64) -> bool {
        match last {
            None => true,
            Some(last) => (now - last).num_seconds() >= interval_secs,
        }
    }

    async fn compute_census(&self) -> Result<Census> {
        let positions = self.db.list_open_positions().await?;
        let bots = self.db.list_bots(false).await?;
        let leverage_by_bot: std::collections::HashMap<&str, u32> =
            bots.iter().map(|b| (b.bot_id.as_str(), b.leverage)).collect();

        let mut census = Census::default();
        for position in &positions {
            let leverage = leverage_by_bot.get(position.bot_id.as_str()).copied().unwrap_or(1);
            let notional = position.entry_price * position.quantity * Decimal::from(leverage);
            match position.side {
                Side::Buy => census.long_notional += notional,
                Side::Sell => census.short_notional += notional,
            }
        }
        Ok(census)
    }

    // ---- symbol acquisition (§4.6 step 3) -----------------------------

    async fn acquire_symbol(&mut self, now: DateTime<Utc>) -> Result<()> {
        if self.symbol.is_some() {
            return Ok(());
        }

        if self.config.is_static() {
            let symbol = self.config.symbol.clone().unwrap_or_default();
            if symbol.is_empty() {
                return Ok(());
            }
            if self.gateway.get_position(&symbol).await?.is_none() {
                tracing::info!(bot_id = %self.config.bot_id, %symbol, "attaching static symbol");
                self.symbol = Some(SymbolState::new(symbol));
            }
            return Ok(());
        }

        if !self.coordinator.request_search(&self.config.bot_id).await {
            return Ok(());
        }

        let candidate = self.search_dynamic_candidate(now).await?;
        match candidate {
            Some((symbol, side)) => {
                tracing::info!(bot_id = %self.config.bot_id, %symbol, ?side, "dynamic symbol acquired");
                let mut state = SymbolState::new(symbol.clone());
                state.side = Some(side);
                self.symbol = Some(state);
                self.coordinator
                    .finish_search(&self.config.bot_id, Some(&symbol), true)
                    .await;
                self.coordinator.mark_has_symbol(&self.config.bot_id).await;
            }
            None => {
                self.coordinator.finish_search(&self.config.bot_id, None, false).await;
            }
        }
        Ok(())
    }

    /// Ranks the universe, filters it down, and fetches an entry signal for
    /// each remaining candidate at a 0.5 s spacing, then picks uniformly at
    /// random among those whose signal agrees with the balancing side.
    async fn search_dynamic_candidate(&self, now: DateTime<Utc>) -> Result<Option<(String, Side)>> {
        let Some(strategy) = self.config.dynamic_strategy else {
            return Ok(None);
        };

        let symbols = self.gateway.get_usdt_perpetuals().await?;
        let tickers = self.gateway.get_ticker_24hr(&symbols).await?;
        let blacklist: std::collections::HashSet<String> = std::collections::HashSet::new();

        let ranked = match strategy {
            DynamicStrategy::Volume => {
                top_by_quote_volume(&tickers, &blacklist, MIN_QUOTE_VOLUME, RANKING_LIMIT)
            }
            DynamicStrategy::Volatility => {
                top_by_volatility(&tickers, &blacklist, MIN_VOLATILITY_PERCENT, RANKING_LIMIT)
            }
        };

        let desired_side = self.balancing_side(strategy);

        let mut matches = Vec::new();
        for symbol in ranked {
            if !self.coordinator.is_symbol_available(&symbol).await {
                continue;
            }
            if self.db.is_blacklisted(&symbol).await? || self.db.has_existing_position(&symbol).await? {
                continue;
            }
            if self.gateway.get_position(&symbol).await?.is_some() {
                continue;
            }
            if let Some(max_leverage) = self.gateway.get_max_leverage(&symbol).await? {
                if max_leverage < self.config.leverage {
                    continue;
                }
            }

            tokio::time::sleep(Duration::from_millis(500)).await;
            let signal = self
                .signals
                .signal_for(&symbol, SignalAnalyzerConfig::entry(), &self.gateway, now)
                .await?;

            let Some(signal) = signal else { continue };
            let side = signal_to_side(signal);
            if let Some(desired) = desired_side {
                if side != desired {
                    continue;
                }
            }
            matches.push((symbol, side));
        }

        Ok(matches.choose(&mut rand::thread_rng()).cloned())
    }

    /// `Some(side)` when the census imbalance crosses the strategy's
    /// threshold, `None` when the side should be chosen by random tiebreak.
    fn balancing_side(&self, strategy: DynamicStrategy) -> Option<Side> {
        let threshold = match strategy {
            DynamicStrategy::Volume => IMBALANCE_THRESHOLD_VOLUME,
            DynamicStrategy::Volatility => IMBALANCE_THRESHOLD_VOLATILITY,
        };
        (self.census.imbalance() > threshold).then(|| self.census.minority_side())
    }

    // ---- per-symbol processing (§4.6 step 4) --------------------------

    async fn process_symbol(&mut self, now: DateTime<Utc>) -> Result<()> {
        let Some(symbol) = self.symbol.as_ref().map(|s| s.symbol.clone()) else {
            return Ok(());
        };

        self.update_current_price(&symbol).await?;
        self.refresh_position(&symbol, now).await?;

        let position_open = self.symbol.as_ref().is_some_and(|s| s.position_open);
        if position_open {
            if matches!(self.config.dynamic_strategy, Some(DynamicStrategy::Volume)) {
                self.evaluate_smart_exit(&symbol, now).await?;
            }
            if matches!(self.config.dynamic_strategy, Some(DynamicStrategy::Volatility)) {
                self.evaluate_early_reversal(&symbol, now).await?;
            }
            self.evaluate_tp_sl(&symbol, now).await?;
            if self.config.pyramiding.is_enabled() {
                self.evaluate_pyramiding(&symbol, now).await?;
            }
        } else {
            self.attempt_entry(&symbol, now).await?;
        }

        Ok(())
    }

    /// Writes `current_price` from the trade-stream delivery path (§5),
    /// subscribing on first touch of a symbol. Falls back to the 24h ticker
    /// midpoint only until the stream has delivered its first tick.
    async fn update_current_price(&mut self, symbol: &str) -> Result<()> {
        self.gateway.ensure_trade_stream(symbol).await;
        if let Some(price) = self.gateway.latest_price(symbol).await {
            if let Some(state) = self.symbol.as_mut() {
                state.current_price = price;
            }
            return Ok(());
        }

        if let Some(ticker) = self.gateway.get_ticker_24hr(&[symbol.to_string()]).await?.first() {
            if let Some(state) = self.symbol.as_mut() {
                state.current_price = (ticker.high + ticker.low) / Decimal::from(2);
            }
        }
        Ok(())
    }

    async fn refresh_position(&mut self, symbol: &str, now: DateTime<Utc>) -> Result<()> {
        let should_refresh = self
            .symbol
            .as_ref()
            .is_some_and(|s| self.due(s.last_position_check, now, POSITION_REFRESH_INTERVAL_SECS));
        if !should_refresh {
            return Ok(());
        }

        let persisted = self.db.get_open_position(&self.config.bot_id, symbol).await?;
        let venue = self.gateway.get_position(symbol).await?;

        if let Some(state) = self.symbol.as_mut() {
            state.last_position_check = Some(now);
            match (persisted, venue) {
                (Some(position), _) => {
                    state.position_open = true;
                    state.side = Some(position.side);
                    state.quantity = position.quantity;
                    state.entry_price = position.entry_price;
                }
                (None, Some(venue_position)) => {
                    state.position_open = true;
                    state.side = Some(venue_position.side);
                    state.quantity = venue_position.quantity;
                    state.entry_price = venue_position.entry_price;
                }
                (None, None) => {
                    state.position_open = false;
                }
            }
        }
        Ok(())
    }

    // ---- §4.6.a TP / SL -------------------------------------------------

    async fn evaluate_tp_sl(&mut self, symbol: &str, now: DateTime<Utc>) -> Result<()> {
        let Some(state) = self.symbol.clone() else { return Ok(()) };
        let Some(side) = state.side else { return Ok(()) };

        let roi = position_roi(side, state.entry_price, state.current_price, state.quantity, self.config.leverage);
        if let Some(s) = self.symbol.as_mut() {
            s.high_water_mark_roi = s.high_water_mark_roi.max(roi);
        }

        if roi >= self.config.tp {
            self.close_position(symbol, side, now, TradeReason::TakeProfit).await?;
            return Ok(());
        }

        if let Some(sl) = self.config.sl {
            if sl > Decimal::ZERO && roi <= -sl {
                self.close_position(symbol, side, now, TradeReason::StopLoss).await?;
                return Ok(());
            }
        }

        if let Some(roi_trigger) = self.config.roi_trigger {
            let hwm = self.symbol.as_ref().map_or(Decimal::ZERO, |s| s.high_water_mark_roi);
            if hwm >= roi_trigger {
                if let Some(s) = self.symbol.as_mut() {
                    s.roi_check_activated = true;
                }
            }
        }
        Ok(())
    }

    // ---- §4.6.b smart exit ---------------------------------------------

    async fn evaluate_smart_exit(&mut self, symbol: &str, now: DateTime<Utc>) -> Result<()> {
        let Some(state) = self.symbol.clone() else { return Ok(()) };
        let Some(side) = state.side else { return Ok(()) };
        if !state.roi_check_activated {
            return Ok(());
        }
        let Some(roi_trigger) = self.config.roi_trigger else { return Ok(()) };
        let roi = position_roi(side, state.entry_price, state.current_price, state.quantity, self.config.leverage);
        if roi < roi_trigger {
            return Ok(());
        }

        let signal = self
            .signals
            .signal_for(symbol, SignalAnalyzerConfig::exit(), &self.gateway, now)
            .await?;
        if signal.is_some() {
            self.close_position(symbol, side, now, TradeReason::SmartExit).await?;
        }
        Ok(())
    }

    // ---- §4.6.c early reversal -------------------------------------------

    async fn evaluate_early_reversal(&mut self, symbol: &str, now: DateTime<Utc>) -> Result<()> {
        if !self.config.reverse_on_stop {
            return Ok(());
        }
        let Some(state) = self.symbol.clone() else { return Ok(()) };
        let Some(side) = state.side else { return Ok(()) };
        let roi = position_roi(side, state.entry_price, state.current_price, state.quantity, self.config.leverage);
        if roi > EARLY_REVERSAL_ROI_THRESHOLD {
            return Ok(());
        }

        let signal = self
            .signals
            .signal_for(symbol, SignalAnalyzerConfig::weak_reversal(), &self.gateway, now)
            .await?;
        let Some(signal) = signal else { return Ok(()) };
        let signaled_side = signal_to_side(signal);
        if signaled_side == side.opposite() {
            self.close_position(symbol, side, now, TradeReason::EarlyReversal).await?;
            self.open_position(symbol, signaled_side, now, TradeReason::EarlyReversal).await?;
        }
        Ok(())
    }

    // ---- §4.6.d pyramiding -----------------------------------------------

    async fn evaluate_pyramiding(&mut self, symbol: &str, now: DateTime<Utc>) -> Result<()> {
        let Some(state) = self.symbol.clone() else { return Ok(()) };
        let Some(side) = state.side else { return Ok(()) };

        if state.pyramiding_count >= self.config.pyramiding.pyramiding_n {
            return Ok(());
        }
        if !self.due(state.last_pyramiding_time, now, PYRAMID_COOLDOWN_SECS) {
            return Ok(());
        }

        let roi = position_roi(side, state.entry_price, state.current_price, state.quantity, self.config.leverage);
        let trigger = roi <= state.pyramiding_base_roi - self.config.pyramiding.pyramiding_x && roi < Decimal::ZERO;
        if !trigger {
            return Ok(());
        }

        let balance = self.gateway.get_balance().await?;
        let notional = balance.total_equity * self.config.percent / Decimal::ONE_HUNDRED;
        let Some(step_size) = self.gateway.get_step_size(symbol).await? else { return Ok(()) };
        let fill_qty = round_down_to_step(notional / state.current_price, step_size);
        if fill_qty.is_zero() {
            return Ok(());
        }

        let order = self.gateway.place_market_order(symbol, side, fill_qty).await?;

        if let Some(s) = self.symbol.as_mut() {
            let total_qty = s.quantity + order.filled_quantity;
            s.entry_price = (s.entry_price * s.quantity + order.fill_price * order.filled_quantity) / total_qty;
            s.quantity = total_qty;
            s.pyramiding_count += 1;
            s.pyramiding_base_roi = roi;
            s.last_pyramiding_time = Some(now);
        }

        if let Some(position) = self.db.get_open_position(&self.config.bot_id, symbol).await? {
            let mut position = position;
            position.apply_pyramid(order.fill_price, order.filled_quantity, now);
            self.db.upsert_open_position(&position).await?;
        }

        self.emit(BotEvent::Pyramided {
            bot_id: self.config.bot_id.clone(),
            symbol: symbol.to_string(),
            new_entry: self.symbol.as_ref().map_or(Decimal::ZERO, |s| s.entry_price),
            new_quantity: self.symbol.as_ref().map_or(Decimal::ZERO, |s| s.quantity),
            pyramiding_count: self.symbol.as_ref().map_or(0, |s| s.pyramiding_count),
        });
        Ok(())
    }

    // ---- entry attempt (static §4.6.f / dynamic §4.6.e) ------------------

    async fn attempt_entry(&mut self, symbol: &str, now: DateTime<Utc>) -> Result<()> {
        let Some(state) = self.symbol.clone() else { return Ok(()) };
        if !self.due(state.last_close_time, now, OPEN_CLOSE_COOLDOWN_SECS) {
            return Ok(());
        }
        if !self.due(state.last_trade_time, now, OPEN_CLOSE_COOLDOWN_SECS) {
            return Ok(());
        }

        let side = if self.config.is_static() {
            self.static_entry_side(symbol, now).await?
        } else {
            state.side
        };

        if let Some(side) = side {
            self.open_position(symbol, side, now, self.static_entry_reason()).await?;
        }
        Ok(())
    }

    fn static_entry_reason(&self) -> TradeReason {
        match self.config.static_entry_mode {
            Some(StaticEntryMode::Reverse) => TradeReason::OpenReverse,
            Some(StaticEntryMode::Wait) => TradeReason::OpenStaticWait,
            _ => TradeReason::OpenSignal,
        }
    }

    async fn static_entry_side(&self, symbol: &str, now: DateTime<Utc>) -> Result<Option<Side>> {
        match self.config.static_entry_mode {
            Some(StaticEntryMode::Signal | StaticEntryMode::Wait) | None => {
                let signal = self
                    .signals
                    .signal_for(symbol, SignalAnalyzerConfig::entry(), &self.gateway, now)
                    .await?;
                Ok(signal.map(signal_to_side))
            }
            Some(StaticEntryMode::Reverse) => {
                let balancing = self.balancing_side(DynamicStrategy::Volume).unwrap_or(Side::Buy);
                Ok(Some(balancing.opposite()))
            }
        }
    }

    // ---- §4.6.g opening protocol ------------------------------------------

    async fn open_position(&mut self, symbol: &str, side: Side, now: DateTime<Utc>, reason: TradeReason) -> Result<()> {
        if self.symbol.is_none() {
            self.symbol = Some(SymbolState::new(symbol.to_string()));
        }
        if self.gateway.get_position(symbol).await?.is_some() {
            tracing::debug!(bot_id = %self.config.bot_id, %symbol, "venue already has a position, refusing open");
            return Ok(());
        }

        let Some(max_leverage) = self.gateway.get_max_leverage(symbol).await? else {
            return Ok(());
        };
        if max_leverage < self.config.leverage {
            return Ok(());
        }
        self.gateway.set_leverage(symbol, self.config.leverage).await?;

        let balance = self.gateway.get_balance().await?;
        let notional = balance.total_equity * self.config.percent / Decimal::ONE_HUNDRED;
        let risk = notional / Decimal::from(self.config.leverage.max(1));
        if risk > balance.available {
            tracing::warn!(bot_id = %self.config.bot_id, %symbol, "insufficient available balance, refusing open");
            return Ok(());
        }

        let Some(step_size) = self.gateway.get_step_size(symbol).await? else {
            return Ok(());
        };
        let price = match self.gateway.latest_price(symbol).await {
            Some(price) => price,
            None => self
                .gateway
                .get_ticker_24hr(&[symbol.to_string()])
                .await?
                .first()
                .map_or(Decimal::ZERO, |t| (t.high + t.low) / Decimal::from(2)),
        };
        if price.is_zero() {
            return Ok(());
        }
        let quantity = round_down_to_step(notional / price, step_size);
        if quantity.is_zero() {
            tracing::warn!(bot_id = %self.config.bot_id, %symbol, "quantity rounds to zero at step size, refusing open");
            return Ok(());
        }

        self.gateway.cancel_open_orders(symbol).await?;
        tokio::time::sleep(Duration::from_secs(1)).await;

        let order = self.gateway.place_market_order(symbol, side, quantity).await?;

        let position = Position {
            bot_id: self.config.bot_id.clone(),
            symbol: symbol.to_string(),
            side,
            entry_price: order.fill_price,
            quantity: order.filled_quantity,
            pyramiding_count: 0,
            current_price: order.fill_price,
            status: PositionStatus::Open,
            opened_at: now,
            closed_at: None,
            last_update: now,
        };
        self.db.upsert_open_position(&position).await?;
        self.db
            .append_trade(&TradeEvent {
                bot_id: self.config.bot_id.clone(),
                symbol: symbol.to_string(),
                side,
                price: order.fill_price,
                quantity: order.filled_quantity,
                pnl: None,
                roi: None,
                reason,
                created_at: now,
            })
            .await?;

        if let Some(state) = self.symbol.as_mut() {
            state.position_open = true;
            state.side = Some(side);
            state.quantity = order.filled_quantity;
            state.entry_price = order.fill_price;
            state.current_price = order.fill_price;
            state.last_trade_time = Some(now);
            state.high_water_mark_roi = Decimal::ZERO;
            state.roi_check_activated = false;
            state.pyramiding_count = 0;
            state.pyramiding_base_roi = Decimal::ZERO;
        }

        self.coordinator.mark_has_symbol(&self.config.bot_id).await;
        self.emit(BotEvent::Opened {
            bot_id: self.config.bot_id.clone(),
            symbol: symbol.to_string(),
            side,
            price: order.fill_price,
            quantity: order.filled_quantity,
        });
        Ok(())
    }

    // ---- §4.6.h closing protocol -------------------------------------------

    async fn close_position(&mut self, symbol: &str, side: Side, now: DateTime<Utc>, reason: TradeReason) -> Result<()> {
        let debounced = self
            .symbol
            .as_ref()
            .and_then(|s| s.close_attempted_at)
            .is_some_and(|attempted_at| (now - attempted_at).num_seconds() < CLOSE_DEBOUNCE_SECS);
        if debounced {
            return Ok(());
        }
        if let Some(state) = self.symbol.as_mut() {
            state.close_attempted_at = Some(now);
        }

        let Some(state) = self.symbol.clone() else { return Ok(()) };

        self.gateway.cancel_open_orders(symbol).await?;
        let order = self.gateway.place_market_order(symbol, side.opposite(), state.quantity.abs()).await?;

        let pnl = match side {
            Side::Buy => (order.fill_price - state.entry_price) * state.quantity,
            Side::Sell => (state.entry_price - order.fill_price) * state.quantity,
        };
        let roi = position_roi(side, state.entry_price, order.fill_price, state.quantity, self.config.leverage);

        let position = Position {
            bot_id: self.config.bot_id.clone(),
            symbol: symbol.to_string(),
            side,
            entry_price: state.entry_price,
            quantity: state.quantity,
            pyramiding_count: state.pyramiding_count,
            current_price: order.fill_price,
            status: PositionStatus::Open,
            opened_at: state.last_trade_time.unwrap_or(now),
            closed_at: None,
            last_update: now,
        };
        self.db.close_position(&position, pnl, roi, reason).await?;

        // Static bots keep their symbol attached across the cooldown window;
        // dynamic bots release it and search afresh on their next tick.
        if self.config.is_static() {
            let mut fresh = SymbolState::new(symbol.to_string());
            fresh.last_close_time = Some(now);
            self.symbol = Some(fresh);
        } else {
            self.symbol = None;
        }

        self.coordinator.mark_lost_symbol(&self.config.bot_id).await;
        self.emit(BotEvent::Closed {
            bot_id: self.config.bot_id.clone(),
            symbol: symbol.to_string(),
            side,
            price: order.fill_price,
            pnl,
            roi,
            reason,
        });
        Ok(())
    }

    // ---- §4.6.i stop-symbol / stop-all / stop ------------------------------

    async fn stop_symbol(&mut self, symbol: &str, now: DateTime<Utc>, reason: TradeReason) -> Result<()> {
        let position_open = self.symbol.as_ref().is_some_and(|s| s.position_open);
        let side = self.symbol.as_ref().and_then(|s| s.side);
        if position_open {
            if let Some(side) = side {
                self.close_position(symbol, side, now, reason).await?;
            }
        }
        self.coordinator.mark_lost_symbol(&self.config.bot_id).await;
        self.db.delete_position(&self.config.bot_id, symbol).await?;
        self.symbol = None;
        Ok(())
    }

    async fn stop_all_symbols(&mut self, reason: TradeReason) -> Result<()> {
        if let Some(symbol) = self.symbol.as_ref().map(|s| s.symbol.clone()) {
            self.stop_symbol(&symbol, self.clock.now(), reason).await?;
        }
        Ok(())
    }

    async fn stop(&mut self) -> Result<()> {
        self.status = BotRuntimeStatus::Stopped;
        self.stop_all_symbols(TradeReason::OperatorStop).await?;
        self.db.set_bot_status(&self.config.bot_id, false).await?;
        Ok(())
    }
}

fn signal_to_side(signal: fleet_core::Signal) -> Side {
    match signal {
        fleet_core::Signal::Buy => Side::Buy,
        fleet_core::Signal::Sell => Side::Sell,
    }
}

fn round_down_to_step(quantity: Decimal, step_size: Decimal) -> Decimal {
    if step_size.is_zero() {
        return quantity;
    }
    (quantity / step_size).trunc() * step_size
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn census_imbalance_is_zero_with_no_positions() {
        let census = Census::default();
        assert_eq!(census.imbalance(), Decimal::ZERO);
    }

    #[test]
    fn census_imbalance_detects_long_skew() {
        let census = Census { long_notional: dec!(900), short_notional: dec!(100) };
        assert_eq!(census.imbalance(), dec!(0.8));
        assert_eq!(census.minority_side(), Side::Sell);
    }

    #[test]
    fn round_down_to_step_truncates_to_multiple() {
        assert_eq!(round_down_to_step(dec!(1.27), dec!(0.1)), dec!(1.2));
    }

    #[test]
    fn round_down_to_step_with_zero_step_is_identity() {
        assert_eq!(round_down_to_step(dec!(1.27), Decimal::ZERO), dec!(1.27));
    }
}
