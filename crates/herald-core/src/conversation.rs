//! Conversation identity: a stable, order-independent key per conversation.
//!
//! - Private threads: participant ids sorted numerically, as strings.
//! - Streams: `(stream, topic)`.
//!
//! The key outlives the message it was derived from: subscriptions store it
//! and compare against it for the lifetime of the snapshot file.

use crate::error::HeraldError;
use crate::message::{Conversation, IncomingMessage};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Ordered tuple of strings identifying a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConversationKey(Vec<String>);

impl ConversationKey {
    /// Key for a stream topic.
    pub fn stream(stream: &str, topic: &str) -> Self {
        Self(vec![stream.to_string(), topic.to_string()])
    }

    /// Key for a private thread; order of `ids` does not matter.
    pub fn private<I: IntoIterator<Item = i64>>(ids: I) -> Self {
        let mut ids: Vec<i64> = ids.into_iter().collect();
        ids.sort_unstable();
        Self(ids.into_iter().map(|id| id.to_string()).collect())
    }

    pub fn parts(&self) -> &[String] {
        &self.0
    }
}

impl fmt::Display for ConversationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({})", self.0.join(", "))
    }
}

/// Resolve the conversation key of an inbound message.
pub fn resolve(message: &IncomingMessage) -> Result<ConversationKey, HeraldError> {
    match &message.conversation {
        Conversation::Private { participants } => {
            Ok(ConversationKey::private(participants.iter().map(|p| p.id)))
        }
        Conversation::Stream { stream, topic } => Ok(ConversationKey::stream(stream, topic)),
        other => Err(HeraldError::UnsupportedConversationType(
            other.kind().to_string(),
        )),
    }
}
