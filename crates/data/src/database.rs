use crate::error::PersistenceError;
use crate::rows::{self, BotConfigRow, BotStatisticsRow, PositionRow};
use anyhow::Result;
use chrono::Utc;
use fleet_core::position::{Position, PositionStatus};
use fleet_core::trade::{BotStatistics, TradeEvent, TradeReason};
use fleet_core::BotConfig;
use rust_decimal::Decimal;
use sqlx::{postgres::PgPoolOptions, PgPool};

pub struct DatabaseClient {
    pool: PgPool,
}

impl DatabaseClient {
    /// Creates a new database client connected to the specified `PostgreSQL`
    /// database and ensures the fleet schema exists.
    ///
    /// # Errors
    /// Returns an error if the connection cannot be established or the
    /// schema cannot be created.
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        let client = Self { pool };
        client.ensure_schema().await?;
        Ok(client)
    }

    async fn ensure_schema(&self) -> Result<()> {
        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS bot_configs (
                bot_id TEXT PRIMARY KEY,
                mode TEXT NOT NULL,
                symbol TEXT,
                leverage INTEGER NOT NULL,
                percent NUMERIC NOT NULL,
                tp NUMERIC NOT NULL,
                sl NUMERIC,
                roi_trigger NUMERIC,
                dynamic_strategy TEXT,
                static_entry_mode TEXT,
                reverse_on_stop BOOLEAN NOT NULL DEFAULT FALSE,
                pyramiding_n SMALLINT NOT NULL DEFAULT 0,
                pyramiding_x NUMERIC NOT NULL DEFAULT 0,
                api_key TEXT NOT NULL,
                api_secret TEXT NOT NULL,
                status TEXT NOT NULL,
                created_at TIMESTAMPTZ NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL,
                deleted_at TIMESTAMPTZ
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS bot_positions (
                bot_id TEXT NOT NULL,
                symbol TEXT NOT NULL,
                side TEXT NOT NULL,
                entry_price NUMERIC NOT NULL,
                quantity NUMERIC NOT NULL,
                current_price NUMERIC NOT NULL,
                pyramiding_count SMALLINT NOT NULL DEFAULT 0,
                status TEXT NOT NULL,
                opened_at TIMESTAMPTZ NOT NULL,
                closed_at TIMESTAMPTZ,
                last_update TIMESTAMPTZ NOT NULL,
                PRIMARY KEY (bot_id, symbol)
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS trade_history (
                id BIGSERIAL PRIMARY KEY,
                bot_id TEXT NOT NULL,
                symbol TEXT NOT NULL,
                side TEXT NOT NULL,
                price NUMERIC NOT NULL,
                quantity NUMERIC NOT NULL,
                pnl NUMERIC,
                roi NUMERIC,
                reason TEXT NOT NULL,
                created_at TIMESTAMPTZ NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS bot_statistics (
                bot_id TEXT PRIMARY KEY,
                total_trades BIGINT NOT NULL DEFAULT 0,
                winning_trades BIGINT NOT NULL DEFAULT 0,
                losing_trades BIGINT NOT NULL DEFAULT 0,
                total_pnl NUMERIC NOT NULL DEFAULT 0
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS coin_blacklist (
                symbol TEXT PRIMARY KEY,
                reason TEXT NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Inserts or updates a bot's configuration row, keyed by `bot_id`.
    ///
    /// # Errors
    /// Returns an error if the database write fails.
    pub async fn upsert_bot_config(&self, config: &BotConfig) -> Result<()> {
        sqlx::query(
            r"
            INSERT INTO bot_configs
                (bot_id, mode, symbol, leverage, percent, tp, sl, roi_trigger,
                 dynamic_strategy, static_entry_mode, reverse_on_stop,
                 pyramiding_n, pyramiding_x, api_key, api_secret, status,
                 created_at, updated_at, deleted_at)
            VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$13,$14,$15,$16,$17,$18,$19)
            ON CONFLICT (bot_id) DO UPDATE SET
                mode = EXCLUDED.mode,
                symbol = EXCLUDED.symbol,
                leverage = EXCLUDED.leverage,
                percent = EXCLUDED.percent,
                tp = EXCLUDED.tp,
                sl = EXCLUDED.sl,
                roi_trigger = EXCLUDED.roi_trigger,
                dynamic_strategy = EXCLUDED.dynamic_strategy,
                static_entry_mode = EXCLUDED.static_entry_mode,
                reverse_on_stop = EXCLUDED.reverse_on_stop,
                pyramiding_n = EXCLUDED.pyramiding_n,
                pyramiding_x = EXCLUDED.pyramiding_x,
                status = EXCLUDED.status,
                updated_at = EXCLUDED.updated_at,
                deleted_at = EXCLUDED.deleted_at
            ",
        )
        .bind(&config.bot_id)
        .bind(rows::mode_str(config.mode))
        .bind(&config.symbol)
        .bind(i32::try_from(config.leverage).unwrap_or(i32::MAX))
        .bind(config.percent)
        .bind(config.tp)
        .bind(config.sl)
        .bind(config.roi_trigger)
        .bind(config.dynamic_strategy.map(rows::dynamic_strategy_str))
        .bind(config.static_entry_mode.map(rows::entry_mode_str))
        .bind(config.reverse_on_stop)
        .bind(i16::from(config.pyramiding.pyramiding_n))
        .bind(config.pyramiding.pyramiding_x)
        .bind(&config.credentials.api_key)
        .bind(&config.credentials.api_secret)
        .bind(rows::status_str(config.status))
        .bind(config.created_at)
        .bind(config.updated_at)
        .bind(config.deleted_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// # Errors
    /// Returns an error if the database query fails.
    pub async fn get_bot_config(&self, bot_id: &str) -> Result<Option<BotConfig>> {
        let row = sqlx::query_as::<_, BotConfigRow>(
            "SELECT * FROM bot_configs WHERE bot_id = $1 AND deleted_at IS NULL",
        )
        .bind(bot_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(BotConfig::try_from).transpose()
    }

    /// Like [`Self::get_bot_config`] but fails loudly when the bot is
    /// missing, for callers (the bot actor on restart) that cannot proceed
    /// without a config.
    ///
    /// # Errors
    /// Returns [`PersistenceError::BotConfigNotFound`] if no row exists, or
    /// any error from the underlying query.
    pub async fn require_bot_config(&self, bot_id: &str) -> Result<BotConfig> {
        self.get_bot_config(bot_id)
            .await?
            .ok_or_else(|| PersistenceError::BotConfigNotFound(bot_id.to_string()).into())
    }

    /// Lists non-deleted bot configs, optionally filtered by status.
    ///
    /// # Errors
    /// Returns an error if the database query fails.
    pub async fn list_bots(&self, running_only: bool) -> Result<Vec<BotConfig>> {
        let rows = if running_only {
            sqlx::query_as::<_, BotConfigRow>(
                "SELECT * FROM bot_configs WHERE deleted_at IS NULL AND status = 'running'",
            )
            .fetch_all(&self.pool)
            .await?
        } else {
            sqlx::query_as::<_, BotConfigRow>("SELECT * FROM bot_configs WHERE deleted_at IS NULL")
                .fetch_all(&self.pool)
                .await?
        };

        rows.into_iter().map(BotConfig::try_from).collect()
    }

    /// # Errors
    /// Returns an error if the database write fails.
    pub async fn set_bot_status(&self, bot_id: &str, running: bool) -> Result<()> {
        let status = if running { "running" } else { "stopped" };
        sqlx::query("UPDATE bot_configs SET status = $1, updated_at = $2 WHERE bot_id = $3")
            .bind(status)
            .bind(Utc::now())
            .bind(bot_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Soft-deletes a bot config.
    ///
    /// # Errors
    /// Returns an error if the database write fails.
    pub async fn soft_delete_bot(&self, bot_id: &str) -> Result<()> {
        sqlx::query("UPDATE bot_configs SET deleted_at = $1, status = 'stopped' WHERE bot_id = $2")
            .bind(Utc::now())
            .bind(bot_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Insert-or-update by `(bot_id, symbol)`; idempotent.
    ///
    /// # Errors
    /// Returns an error if the database write fails.
    pub async fn upsert_open_position(&self, position: &Position) -> Result<()> {
        sqlx::query(
            r"
            INSERT INTO bot_positions
                (bot_id, symbol, side, entry_price, quantity, current_price,
                 pyramiding_count, status, opened_at, closed_at, last_update)
            VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11)
            ON CONFLICT (bot_id, symbol) DO UPDATE SET
                side = EXCLUDED.side,
                entry_price = EXCLUDED.entry_price,
                quantity = EXCLUDED.quantity,
                current_price = EXCLUDED.current_price,
                pyramiding_count = EXCLUDED.pyramiding_count,
                status = EXCLUDED.status,
                closed_at = EXCLUDED.closed_at,
                last_update = EXCLUDED.last_update
            ",
        )
        .bind(&position.bot_id)
        .bind(&position.symbol)
        .bind(rows::side_str(position.side))
        .bind(position.entry_price)
        .bind(position.quantity)
        .bind(position.current_price)
        .bind(i16::from(position.pyramiding_count))
        .bind(rows::position_status_str(position.status))
        .bind(position.opened_at)
        .bind(position.closed_at)
        .bind(position.last_update)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// # Errors
    /// Returns an error if the database query fails.
    pub async fn get_open_position(&self, bot_id: &str, symbol: &str) -> Result<Option<Position>> {
        let row = sqlx::query_as::<_, PositionRow>(
            "SELECT * FROM bot_positions WHERE bot_id = $1 AND symbol = $2 AND status = 'open'",
        )
        .bind(bot_id)
        .bind(symbol)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Position::try_from).transpose()
    }

    /// Like [`Self::get_open_position`] but fails loudly when no open
    /// position exists, for callers that already believe one should be open.
    ///
    /// # Errors
    /// Returns [`PersistenceError::PositionNotFound`] if no row exists, or
    /// any error from the underlying query.
    pub async fn require_open_position(&self, bot_id: &str, symbol: &str) -> Result<Position> {
        self.get_open_position(bot_id, symbol).await?.ok_or_else(|| {
            PersistenceError::PositionNotFound {
                bot_id: bot_id.to_string(),
                symbol: symbol.to_string(),
            }
            .into()
        })
    }

    /// All open positions across the fleet, used to rebuild the coordinator's
    /// `bots_with_symbol` set on restart.
    ///
    /// # Errors
    /// Returns an error if the database query fails.
    pub async fn list_open_positions(&self) -> Result<Vec<Position>> {
        let rows = sqlx::query_as::<_, PositionRow>(
            "SELECT * FROM bot_positions WHERE status = 'open'",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Position::try_from).collect()
    }

    /// Flips a position to closed and stamps `closed_at`, then appends the
    /// close's trade event and bumps statistics, all in one transaction.
    ///
    /// # Errors
    /// Returns an error if the database transaction fails.
    pub async fn close_position(
        &self,
        position: &Position,
        pnl: Decimal,
        roi: Decimal,
        reason: TradeReason,
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        let now = Utc::now();

        sqlx::query(
            "UPDATE bot_positions SET status = 'closed', quantity = $1, closed_at = $2, last_update = $2 \
             WHERE bot_id = $3 AND symbol = $4",
        )
        .bind(Decimal::ZERO)
        .bind(now)
        .bind(&position.bot_id)
        .bind(&position.symbol)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
            INSERT INTO trade_history (bot_id, symbol, side, price, quantity, pnl, roi, reason, created_at)
            VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9)
            ",
        )
        .bind(&position.bot_id)
        .bind(&position.symbol)
        .bind(rows::side_str(position.side))
        .bind(position.current_price)
        .bind(position.quantity)
        .bind(pnl)
        .bind(roi)
        .bind(rows::reason_str(reason))
        .bind(now)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
            INSERT INTO bot_statistics (bot_id, total_trades, winning_trades, losing_trades, total_pnl)
            VALUES ($1, 1, $2, $3, $4)
            ON CONFLICT (bot_id) DO UPDATE SET
                total_trades = bot_statistics.total_trades + 1,
                winning_trades = bot_statistics.winning_trades + $2,
                losing_trades = bot_statistics.losing_trades + $3,
                total_pnl = bot_statistics.total_pnl + $4
            ",
        )
        .bind(&position.bot_id)
        .bind(i64::from(pnl > Decimal::ZERO))
        .bind(i64::from(pnl <= Decimal::ZERO))
        .bind(pnl)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    /// Deletes the open-position row outright (used by `stop_symbol`, which
    /// does not want a closed row left behind).
    ///
    /// # Errors
    /// Returns an error if the database write fails.
    pub async fn delete_position(&self, bot_id: &str, symbol: &str) -> Result<()> {
        sqlx::query("DELETE FROM bot_positions WHERE bot_id = $1 AND symbol = $2")
            .bind(bot_id)
            .bind(symbol)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// # Errors
    /// Returns an error if the database write fails.
    pub async fn append_trade(&self, trade: &TradeEvent) -> Result<()> {
        sqlx::query(
            r"
            INSERT INTO trade_history (bot_id, symbol, side, price, quantity, pnl, roi, reason, created_at)
            VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9)
            ",
        )
        .bind(&trade.bot_id)
        .bind(&trade.symbol)
        .bind(rows::side_str(trade.side))
        .bind(trade.price)
        .bind(trade.quantity)
        .bind(trade.pnl)
        .bind(trade.roi)
        .bind(rows::reason_str(trade.reason))
        .bind(trade.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// # Errors
    /// Returns an error if the database query fails.
    pub async fn get_statistics(&self, bot_id: &str) -> Result<BotStatistics> {
        let row = sqlx::query_as::<_, BotStatisticsRow>(
            "SELECT total_trades, winning_trades, losing_trades, total_pnl FROM bot_statistics WHERE bot_id = $1",
        )
        .bind(bot_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(BotStatistics::from).unwrap_or_default())
    }

    /// # Errors
    /// Returns an error if the database query fails.
    pub async fn is_blacklisted(&self, symbol: &str) -> Result<bool> {
        let row = sqlx::query_as::<_, (String,)>("SELECT symbol FROM coin_blacklist WHERE symbol = $1")
            .bind(symbol)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.is_some())
    }

    /// True if any bot in the fleet has an open position on `symbol`. Used by
    /// the entry guard that bars double-entering the same symbol.
    ///
    /// # Errors
    /// Returns an error if the database query fails.
    pub async fn has_existing_position(&self, symbol: &str) -> Result<bool> {
        let row = sqlx::query_as::<_, (String,)>(
            "SELECT bot_id FROM bot_positions WHERE symbol = $1 AND status = 'open' LIMIT 1",
        )
        .bind(symbol)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.is_some())
    }

    /// Deletes closed positions older than 7 days and trade rows older than
    /// 30 days. Invoked every 6 hours by the bot manager.
    ///
    /// # Errors
    /// Returns an error if the database write fails.
    pub async fn housekeeping(&self) -> Result<()> {
        let position_cutoff = Utc::now() - chrono::Duration::days(7);
        let trade_cutoff = Utc::now() - chrono::Duration::days(30);

        sqlx::query("DELETE FROM bot_positions WHERE status = 'closed' AND closed_at < $1")
            .bind(position_cutoff)
            .execute(&self.pool)
            .await?;

        sqlx::query("DELETE FROM trade_history WHERE created_at < $1")
            .bind(trade_cutoff)
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}
