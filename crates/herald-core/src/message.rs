use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// An incoming message from the chat platform.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IncomingMessage {
    pub id: Uuid,
    /// Platform user ID of the author.
    pub sender_id: i64,
    /// Platform address of the author (Zulip email).
    pub sender_email: String,
    /// Human-readable sender name.
    pub sender_name: Option<String>,
    /// Whether the author is a bot account.
    #[serde(default)]
    pub sender_is_bot: bool,
    /// Raw message text, including the mention marker.
    pub text: String,
    pub timestamp: DateTime<Utc>,
    /// Where the message was posted.
    pub conversation: Conversation,
}

/// The conversation a message was posted in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Conversation {
    /// A private (direct) thread between one or more users.
    Private { participants: Vec<Participant> },
    /// A stream (channel) message under a topic.
    Stream { stream: String, topic: String },
    /// Any message type the engine does not understand.
    #[serde(other)]
    Unsupported,
}

impl Conversation {
    /// The platform's name for this message type.
    pub fn kind(&self) -> &str {
        match self {
            Self::Private { .. } => "private",
            Self::Stream { .. } => "stream",
            Self::Unsupported => "unsupported",
        }
    }
}

/// A participant of a private thread.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    pub id: i64,
    pub email: String,
    #[serde(default)]
    pub full_name: Option<String>,
}

/// Delivery mode for an outgoing message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryKind {
    Private,
    Stream,
}

/// Who to answer and how.
///
/// Captured from a live message so later deliveries (e.g. scheduled digests)
/// can reach the same conversation without the original event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplyTarget {
    pub kind: DeliveryKind,
    /// Recipient emails for private delivery, or the stream name.
    pub to: Vec<String>,
    /// Topic for stream delivery.
    #[serde(default)]
    pub topic: Option<String>,
}

/// Topic used when a stream message arrives without one.
pub const DEFAULT_TOPIC: &str = "arxiv";

impl ReplyTarget {
    /// Build the reply target for a live message.
    ///
    /// Private replies go to every participant except the bot itself, plus
    /// the sender when the participant list omits them. Returns `None` for
    /// conversation types that cannot be answered.
    pub fn from_incoming(message: &IncomingMessage, bot_email: &str) -> Option<Self> {
        match &message.conversation {
            Conversation::Private { participants } => {
                let mut to: Vec<String> = participants
                    .iter()
                    .map(|p| p.email.clone())
                    .filter(|email| email != bot_email)
                    .collect();
                if !to.contains(&message.sender_email) {
                    to.push(message.sender_email.clone());
                }
                Some(Self {
                    kind: DeliveryKind::Private,
                    to,
                    topic: None,
                })
            }
            Conversation::Stream { stream, topic } => {
                let topic = if topic.is_empty() {
                    DEFAULT_TOPIC.to_string()
                } else {
                    topic.clone()
                };
                Some(Self {
                    kind: DeliveryKind::Stream,
                    to: vec![stream.clone()],
                    topic: Some(topic),
                })
            }
            Conversation::Unsupported => None,
        }
    }

    /// Short human-readable description for logs.
    pub fn describe(&self) -> String {
        match self.kind {
            DeliveryKind::Private => format!("private:{}", self.to.join(",")),
            DeliveryKind::Stream => format!(
                "stream:{}>{}",
                self.to.first().map(String::as_str).unwrap_or(""),
                self.topic.as_deref().unwrap_or("")
            ),
        }
    }
}

/// An outgoing message to deliver through a channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutgoingMessage {
    pub text: String,
    pub target: ReplyTarget,
}

impl OutgoingMessage {
    pub fn new(text: impl Into<String>, target: ReplyTarget) -> Self {
        Self {
            text: text.into(),
            target,
        }
    }
}

/// A user known to the chat platform.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserInfo {
    pub user_id: i64,
    pub full_name: String,
    pub email: String,
    #[serde(default)]
    pub is_bot: bool,
}
