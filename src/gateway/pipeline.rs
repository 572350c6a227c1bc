//! Per-message pipeline: filter, resolve identity, hand to the bot, reply.

use super::{Gateway, MessageContext};
use herald_core::{conversation, message::IncomingMessage, message::ReplyTarget};
use tracing::{debug, error, info};

impl Gateway {
    /// Process one inbound message end to end.
    pub(super) async fn handle_message(&self, incoming: IncomingMessage) {
        let bot_email = self.channel.bot_email();
        if incoming.sender_email == bot_email {
            debug!("ignoring own message {}", incoming.id);
            return;
        }

        let Some(target) = ReplyTarget::from_incoming(&incoming, bot_email) else {
            error!(
                "dropping message {} from {}: unsupported conversation type {}",
                incoming.id,
                incoming.sender_email,
                incoming.conversation.kind()
            );
            return;
        };

        let key = match conversation::resolve(&incoming) {
            Ok(key) => key,
            Err(e) => {
                error!("dropping message {}: {e}", incoming.id);
                return;
            }
        };

        let preview: String = incoming.text.chars().take(60).collect();
        info!(
            "[{}] {} in {key}: {preview}",
            self.bot.name(),
            incoming.sender_email
        );

        let ctx = MessageContext {
            message: &incoming,
            key: &key,
            target: &target,
        };
        if let Some(reply) = self.bot.handle(&ctx).await {
            self.send_text(&target, &reply).await;
        }
    }
}
