//! Gateway: the main event loop connecting the chat channel to a bot.
//!
//! Each inbound message is handled on its own task; background work (the
//! daily digest timer) runs beside the loop until shutdown.

mod pipeline;

use async_trait::async_trait;
use herald_core::{
    conversation::ConversationKey,
    message::{IncomingMessage, OutgoingMessage, ReplyTarget},
    traits::Channel,
};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// Everything a bot needs to answer one message.
pub struct MessageContext<'a> {
    pub message: &'a IncomingMessage,
    /// Stable identity of the conversation the message came from.
    pub key: &'a ConversationKey,
    /// Where the gateway will deliver the reply.
    pub target: &'a ReplyTarget,
}

/// A mention-driven bot plugged into the gateway.
#[async_trait]
pub trait Bot: Send + Sync {
    fn name(&self) -> &str;

    /// Handle one message. Returns the reply text, or `None` to stay silent.
    async fn handle(&self, ctx: &MessageContext<'_>) -> Option<String>;

    /// Spawn background work that lives as long as the gateway.
    fn start_background(&self) -> Option<JoinHandle<()>> {
        None
    }

    /// Flush state before the process exits.
    async fn shutdown(&self) {}
}

/// The gateway that routes messages between the channel and a bot.
pub struct Gateway {
    channel: Arc<dyn Channel>,
    bot: Arc<dyn Bot>,
}

impl Gateway {
    pub fn new(channel: Arc<dyn Channel>, bot: Arc<dyn Bot>) -> Self {
        Self { channel, bot }
    }

    /// Run the main event loop until Ctrl-C.
    pub async fn run(self: Arc<Self>) -> anyhow::Result<()> {
        info!(
            "Herald gateway running | bot: {} | channel: {} as {}",
            self.bot.name(),
            self.channel.name(),
            self.channel.bot_email(),
        );

        let mut rx = self
            .channel
            .start()
            .await
            .map_err(|e| anyhow::anyhow!("failed to start channel {}: {e}", self.channel.name()))?;

        let background = self.bot.start_background();

        // Main event loop with graceful shutdown.
        loop {
            tokio::select! {
                incoming = rx.recv() => {
                    let Some(incoming) = incoming else {
                        warn!("channel {} closed its stream", self.channel.name());
                        break;
                    };
                    let gw = self.clone();
                    tokio::spawn(async move {
                        gw.handle_message(incoming).await;
                    });
                }
                _ = tokio::signal::ctrl_c() => {
                    info!("Received shutdown signal");
                    break;
                }
            }
        }

        self.shutdown(background.as_ref()).await;
        Ok(())
    }

    /// Graceful shutdown: stop background work, flush the bot, stop the channel.
    async fn shutdown(&self, background: Option<&JoinHandle<()>>) {
        info!("Shutting down...");

        if let Some(h) = background {
            h.abort();
        }

        self.bot.shutdown().await;

        if let Err(e) = self.channel.stop().await {
            warn!("failed to stop channel {}: {e}", self.channel.name());
        }

        info!("Shutdown complete.");
    }

    /// Deliver a plain text reply. Failures are logged, never retried.
    async fn send_text(&self, target: &ReplyTarget, text: &str) {
        let msg = OutgoingMessage::new(text, target.clone());
        if let Err(e) = self.channel.send(msg).await {
            error!("failed to send reply to {}: {e}", target.describe());
        }
    }
}
