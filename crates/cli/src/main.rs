use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use fleet_core::{BotMode, ConfigLoader, DynamicStrategy, ExchangeCredentials, StaticEntryMode, SystemClock};
use fleet_data::DatabaseClient;
use fleet_exchange_binance::BinanceGateway;
use fleet_orchestrator::{AddBotParams, BotManager, FleetCoordinator};
use fleet_signals::SignalAnalyzer;
use rust_decimal::Decimal;

#[derive(Parser)]
#[command(name = "fleet")]
#[command(about = "Binance USDT-M perpetual-futures trading bot fleet", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the fleet: restore persisted bots, apply `BOOTSTRAP_BOTS`, and
    /// keep every bot actor running until interrupted.
    Run,
    /// Persist a new bot config, ready to spawn on the next `run`.
    AddBot {
        #[arg(long, value_enum)]
        mode: ModeArg,
        #[arg(long)]
        symbol: Option<String>,
        #[arg(long)]
        leverage: u32,
        #[arg(long)]
        percent: Decimal,
        #[arg(long)]
        tp: Decimal,
        #[arg(long)]
        sl: Option<Decimal>,
        #[arg(long)]
        roi_trigger: Option<Decimal>,
        #[arg(long, value_enum)]
        static_entry_mode: Option<StaticEntryModeArg>,
        #[arg(long, value_enum)]
        dynamic_strategy: Option<DynamicStrategyArg>,
        #[arg(long, default_value_t = false)]
        reverse_on_stop: bool,
        #[arg(long, default_value_t = 0)]
        pyramiding_n: u8,
        #[arg(long, default_value_t = Decimal::ZERO)]
        pyramiding_x: Decimal,
        #[arg(long, default_value_t = 1)]
        bot_count: u32,
    },
    /// List every non-deleted bot config and its status.
    ListBots,
    /// Soft-stop a bot: flips its persisted status to stopped.
    StopBot { bot_id: String },
}

#[derive(Clone, clap::ValueEnum)]
enum ModeArg {
    Static,
    Dynamic,
}

#[derive(Clone, clap::ValueEnum)]
enum StaticEntryModeArg {
    Signal,
    Reverse,
    Wait,
}

#[derive(Clone, clap::ValueEnum)]
enum DynamicStrategyArg {
    Volume,
    Volatility,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = ConfigLoader::load().context("failed to load configuration")?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(config.logging.filter.clone())),
        )
        .init();

    let db = Arc::new(
        DatabaseClient::connect(&config.database.url, config.database.max_connections)
            .await
            .context("failed to connect to the database")?,
    );

    match cli.command {
        Commands::Run => run_fleet(db, config).await,
        Commands::AddBot {
            mode,
            symbol,
            leverage,
            percent,
            tp,
            sl,
            roi_trigger,
            static_entry_mode,
            dynamic_strategy,
            reverse_on_stop,
            pyramiding_n,
            pyramiding_x,
            bot_count,
        } => {
            let params = AddBotParams {
                mode: match mode {
                    ModeArg::Static => BotMode::Static,
                    ModeArg::Dynamic => BotMode::Dynamic,
                },
                symbol,
                leverage,
                percent,
                tp,
                sl,
                roi_trigger,
                dynamic_strategy: dynamic_strategy.map(|s| match s {
                    DynamicStrategyArg::Volume => DynamicStrategy::Volume,
                    DynamicStrategyArg::Volatility => DynamicStrategy::Volatility,
                }),
                static_entry_mode: static_entry_mode.map(|m| match m {
                    StaticEntryModeArg::Signal => StaticEntryMode::Signal,
                    StaticEntryModeArg::Reverse => StaticEntryMode::Reverse,
                    StaticEntryModeArg::Wait => StaticEntryMode::Wait,
                }),
                reverse_on_stop,
                pyramiding_n,
                pyramiding_x,
                credentials: ExchangeCredentials {
                    api_key: config.exchange.api_key.clone(),
                    api_secret: config.exchange.api_secret.clone(),
                },
                bot_count,
            };
            let bot_ids = persist_new_bots(&db, params).await?;
            for bot_id in bot_ids {
                println!("{bot_id}");
            }
            Ok(())
        }
        Commands::ListBots => list_bots(&db).await,
        Commands::StopBot { bot_id } => stop_bot(&db, &bot_id).await,
    }
}

const HOUSEKEEPING_INTERVAL_SECS: u64 = 6 * 3600;

async fn run_fleet(db: Arc<DatabaseClient>, config: fleet_core::AppConfig) -> Result<()> {
    tracing::info!("starting fleet");

    let housekeeping_db = Arc::clone(&db);
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(HOUSEKEEPING_INTERVAL_SECS));
        interval.tick().await;
        loop {
            interval.tick().await;
            if let Err(error) = housekeeping_db.housekeeping().await {
                tracing::warn!(%error, "housekeeping sweep failed");
            }
        }
    });

    let credentials = ExchangeCredentials {
        api_key: config.exchange.api_key.clone(),
        api_secret: config.exchange.api_secret.clone(),
    };
    let gateway: Arc<dyn fleet_core::ExchangeGateway> = Arc::new(BinanceGateway::new(
        config.exchange.api_url.clone(),
        config.exchange.ws_url.clone(),
        credentials,
    ));
    let signals = Arc::new(SignalAnalyzer::new());
    let coordinator = Arc::new(FleetCoordinator::new());
    let clock = Arc::new(SystemClock);

    let manager = Arc::new(BotManager::new(
        Arc::clone(&db),
        gateway,
        signals,
        coordinator,
        config.safety.margin_ratio_threshold,
        clock,
    ));

    let restored = manager.bootstrap().await.context("failed to restore persisted bots")?;
    tracing::info!(count = restored.len(), "restored bots from persistence");

    let bootstrapped = manager.bootstrap_from_env().await.context("failed to apply BOOTSTRAP_BOTS")?;
    if !bootstrapped.is_empty() {
        tracing::info!(count = bootstrapped.len(), "spawned bots from BOOTSTRAP_BOTS");
    }

    tracing::info!("fleet running, press ctrl-c to stop");
    tokio::signal::ctrl_c().await.context("failed to listen for ctrl-c")?;

    tracing::info!("shutting down fleet");
    manager.stop_all().await.context("failed to stop all bots cleanly")?;
    Ok(())
}

/// Persists a bot config (and `bot_count - 1` siblings) with `status =
/// stopped` without spawning an actor: this invocation may have no running
/// fleet process to own one. A running `fleet run` picks these up on its
/// next restart.
async fn persist_new_bots(db: &DatabaseClient, params: AddBotParams) -> Result<Vec<String>> {
    use chrono::Utc;
    use fleet_core::{BotConfig, BotRuntimeStatus, PyramidingConfig};

    let prefix = match params.mode {
        BotMode::Static => format!("static-{}", params.symbol.clone().unwrap_or_default()),
        BotMode::Dynamic => format!(
            "dynamic-{}",
            params.dynamic_strategy.map_or("unset", |s| match s {
                DynamicStrategy::Volume => "volume",
                DynamicStrategy::Volatility => "volatility",
            })
        ),
    };

    let mut bot_ids = Vec::new();
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
        db.upsert_bot_config(&config).await?;
        bot_ids.push(bot_id);
    }
    Ok(bot_ids)
}

async fn list_bots(db: &DatabaseClient) -> Result<()> {
    let bots = db.list_bots(false).await?;
    for bot in bots {
        println!(
            "{}\t{:?}\t{:?}\tsymbol={}\tstatus={:?}",
            bot.bot_id,
            bot.mode,
            bot.dynamic_strategy,
            bot.symbol.as_deref().unwrap_or("-"),
            bot.status
        );
    }
    Ok(())
}

async fn stop_bot(db: &DatabaseClient, bot_id: &str) -> Result<()> {
    db.require_bot_config(bot_id).await.context("bot not found")?;
    db.set_bot_status(bot_id, false).await?;
    println!("stopped {bot_id}");
    Ok(())
}
