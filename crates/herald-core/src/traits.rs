use crate::{
    context::{Completion, Context},
    error::HeraldError,
    message::{IncomingMessage, OutgoingMessage, UserInfo},
    query::SearchResult,
};
use async_trait::async_trait;

/// Completion provider used by the assistant.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Human-readable provider name.
    fn name(&self) -> &str;

    /// Send a conversation context to the provider and get a completion.
    async fn complete(&self, context: &Context) -> Result<Completion, HeraldError>;
}

/// Messaging channel: receives mentions and delivers replies.
#[async_trait]
pub trait Channel: Send + Sync {
    /// Human-readable channel name.
    fn name(&self) -> &str;

    /// Address of the bot account, used to drop self-authored messages.
    fn bot_email(&self) -> &str;

    /// Start listening for incoming messages.
    /// Returns a receiver that yields incoming messages.
    async fn start(&self) -> Result<tokio::sync::mpsc::Receiver<IncomingMessage>, HeraldError>;

    /// Deliver a message.
    async fn send(&self, message: OutgoingMessage) -> Result<(), HeraldError>;

    /// List the users known to the platform.
    async fn list_users(&self) -> Result<Vec<UserInfo>, HeraldError> {
        Err(HeraldError::Channel(format!(
            "{} does not support listing users",
            self.name()
        )))
    }

    /// Graceful shutdown.
    async fn stop(&self) -> Result<(), HeraldError>;
}

/// External search source queried on behalf of subscriptions.
#[async_trait]
pub trait QuerySource: Send + Sync {
    fn name(&self) -> &str;

    /// Newest `max_results` results for `query`, most recent first.
    async fn search(&self, query: &str, max_results: usize)
        -> Result<Vec<SearchResult>, HeraldError>;
}
