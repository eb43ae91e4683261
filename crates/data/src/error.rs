use thiserror::Error;

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("no bot config found for bot_id {0}")]
    BotConfigNotFound(String),

    #[error("no open position for bot_id {bot_id} symbol {symbol}")]
    PositionNotFound { bot_id: String, symbol: String },

    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}
