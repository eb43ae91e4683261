use crate::commands::{BotCommand, BotStatus};
use anyhow::Result;
use fleet_core::BotConfig;
use tokio::sync::{mpsc, oneshot};

#[derive(Clone)]
pub struct BotHandle {
    tx: mpsc::Sender<BotCommand>,
}

impl BotHandle {
    #[must_use]
    pub const fn new(tx: mpsc::Sender<BotCommand>) -> Self {
        Self { tx }
    }

    /// # Errors
    /// Returns an error if the command cannot be sent to the bot actor.
    pub async fn start(&self) -> Result<()> {
        self.tx.send(BotCommand::Start).await?;
        Ok(())
    }

    /// # Errors
    /// Returns an error if the command cannot be sent to the bot actor.
    pub async fn stop(&self) -> Result<()> {
        self.tx.send(BotCommand::Stop).await?;
        Ok(())
    }

    /// # Errors
    /// Returns an error if the command cannot be sent to the bot actor.
    pub async fn update_config(&self, config: BotConfig) -> Result<()> {
        self.tx.send(BotCommand::UpdateConfig(Box::new(config))).await?;
        Ok(())
    }

    /// # Errors
    /// Returns an error if the command cannot be sent or the response cannot be received.
    pub async fn get_status(&self) -> Result<BotStatus> {
        let (tx, rx) = oneshot::channel();
        self.tx.send(BotCommand::GetStatus(tx)).await?;
        let status = rx.await?;
        Ok(status)
    }

    /// # Errors
    /// Returns an error if the command cannot be sent to the bot actor.
    pub async fn shutdown(&self) -> Result<()> {
        self.tx.send(BotCommand::Shutdown).await?;
        Ok(())
    }
}
