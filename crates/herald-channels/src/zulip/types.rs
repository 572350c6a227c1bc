//! Zulip REST API deserialization types.

use serde::Deserialize;

/// Fields every Zulip response carries.
#[derive(Debug, Deserialize)]
pub(crate) struct ZStatus {
    /// `"success"` or `"error"`.
    pub result: String,
    #[serde(default)]
    pub msg: String,
    /// Machine-readable error code, e.g. `BAD_EVENT_QUEUE_ID`.
    pub code: Option<String>,
}

impl ZStatus {
    pub fn is_success(&self) -> bool {
        self.result == "success"
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct ZRegister {
    #[serde(flatten)]
    pub status: ZStatus,
    pub queue_id: Option<String>,
    pub last_event_id: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ZEvents {
    #[serde(flatten)]
    pub status: ZStatus,
    /// Kept raw so one malformed event cannot fail the whole batch.
    #[serde(default)]
    pub events: Vec<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ZEvent {
    pub id: i64,
    /// `"message"`, `"heartbeat"`, ...
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(default)]
    pub message: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ZMessage {
    pub sender_id: i64,
    pub sender_email: String,
    #[serde(default)]
    pub sender_full_name: Option<String>,
    pub content: String,
    /// Unix seconds.
    #[serde(default)]
    pub timestamp: i64,
    /// `"stream"` or `"private"`.
    #[serde(rename = "type")]
    pub message_type: String,
    pub display_recipient: ZRecipient,
    /// Topic of a stream message.
    #[serde(default)]
    pub subject: String,
}

/// A stream name, or the participants of a private thread.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(crate) enum ZRecipient {
    Stream(String),
    Private(Vec<ZRecipientUser>),
}

#[derive(Debug, Deserialize)]
pub(crate) struct ZRecipientUser {
    pub id: i64,
    pub email: String,
    #[serde(default)]
    pub full_name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ZUsers {
    #[serde(flatten)]
    pub status: ZStatus,
    #[serde(default)]
    pub members: Vec<ZUser>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ZUser {
    pub user_id: i64,
    pub full_name: String,
    pub email: String,
    #[serde(default)]
    pub is_bot: bool,
}
