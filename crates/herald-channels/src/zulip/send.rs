//! Authenticated REST calls: queue registration, event fetch, send, users.

use super::types::{ZEvents, ZRegister, ZStatus, ZUsers};
use super::MAX_MESSAGE_LEN;
use herald_core::{
    error::HeraldError,
    message::{DeliveryKind, OutgoingMessage, UserInfo},
};
use std::time::Duration;
use tracing::debug;

/// Long-poll requests are held open by the server for up to ~90s.
const POLL_TIMEOUT: Duration = Duration::from_secs(100);

/// Thin client over the Zulip REST API, authenticated with the bot's key.
#[derive(Clone)]
pub(crate) struct ZulipApi {
    client: reqwest::Client,
    base_url: String,
    email: String,
    api_key: String,
}

impl ZulipApi {
    pub fn new(site: &str, email: &str, api_key: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: format!("{}/api/v1", site.trim_end_matches('/')),
            email: email.to_string(),
            api_key: api_key.to_string(),
        }
    }

    /// Register a message event queue. Returns `(queue_id, last_event_id)`.
    pub async fn register(&self) -> Result<(String, i64), HeraldError> {
        let resp: ZRegister = self
            .client
            .post(format!("{}/register", self.base_url))
            .basic_auth(&self.email, Some(&self.api_key))
            .form(&[
                ("event_types", r#"["message"]"#),
                ("apply_markdown", "false"),
            ])
            .send()
            .await
            .map_err(|e| HeraldError::Channel(format!("zulip register failed: {e}")))?
            .json()
            .await
            .map_err(|e| HeraldError::Channel(format!("zulip register parse failed: {e}")))?;

        if !resp.status.is_success() {
            return Err(HeraldError::Channel(format!(
                "zulip register error: {}",
                resp.status.msg
            )));
        }
        match (resp.queue_id, resp.last_event_id) {
            (Some(queue_id), Some(last_event_id)) => Ok((queue_id, last_event_id)),
            _ => Err(HeraldError::Channel(
                "zulip register returned no queue".into(),
            )),
        }
    }

    /// Block until events newer than `last_event_id` arrive.
    ///
    /// API-level errors are returned inside `ZEvents` so the caller can
    /// tell an expired queue from a transient failure.
    pub async fn events(&self, queue_id: &str, last_event_id: i64) -> Result<ZEvents, HeraldError> {
        let last_event_id = last_event_id.to_string();
        self.client
            .get(format!("{}/events", self.base_url))
            .basic_auth(&self.email, Some(&self.api_key))
            .query(&[
                ("queue_id", queue_id),
                ("last_event_id", last_event_id.as_str()),
            ])
            .timeout(POLL_TIMEOUT)
            .send()
            .await
            .map_err(|e| HeraldError::Channel(format!("zulip poll failed: {e}")))?
            .json()
            .await
            .map_err(|e| HeraldError::Channel(format!("zulip poll parse failed: {e}")))
    }

    /// Deliver a message, splitting content that exceeds Zulip's limit.
    pub async fn send_message(&self, message: &OutgoingMessage) -> Result<(), HeraldError> {
        let target = &message.target;
        let (kind, to) = match target.kind {
            DeliveryKind::Private => ("private", serde_json::to_string(&target.to)?),
            DeliveryKind::Stream => (
                "stream",
                target.to.first().cloned().ok_or_else(|| {
                    HeraldError::Channel("stream reply target has no stream".into())
                })?,
            ),
        };
        let topic = target.topic.clone().unwrap_or_default();

        for chunk in split_message(&message.text, MAX_MESSAGE_LEN) {
            let mut form = vec![("type", kind), ("to", to.as_str()), ("content", chunk)];
            if target.kind == DeliveryKind::Stream {
                form.push(("topic", topic.as_str()));
            }

            let status: ZStatus = self
                .client
                .post(format!("{}/messages", self.base_url))
                .basic_auth(&self.email, Some(&self.api_key))
                .form(&form)
                .send()
                .await
                .map_err(|e| HeraldError::Channel(format!("zulip send failed: {e}")))?
                .json()
                .await
                .map_err(|e| HeraldError::Channel(format!("zulip send parse failed: {e}")))?;

            if !status.is_success() {
                return Err(HeraldError::Channel(format!(
                    "zulip send error: {}",
                    status.msg
                )));
            }
        }
        debug!("zulip: delivered to {}", target.describe());
        Ok(())
    }

    /// All members of the organization.
    pub async fn users(&self) -> Result<Vec<UserInfo>, HeraldError> {
        let resp: ZUsers = self
            .client
            .get(format!("{}/users", self.base_url))
            .basic_auth(&self.email, Some(&self.api_key))
            .send()
            .await
            .map_err(|e| HeraldError::Channel(format!("zulip users failed: {e}")))?
            .json()
            .await
            .map_err(|e| HeraldError::Channel(format!("zulip users parse failed: {e}")))?;

        if !resp.status.is_success() {
            return Err(HeraldError::Channel(format!(
                "zulip users error: {}",
                resp.status.msg
            )));
        }
        Ok(resp
            .members
            .into_iter()
            .map(|u| UserInfo {
                user_id: u.user_id,
                full_name: u.full_name,
                email: u.email,
                is_bot: u.is_bot,
            })
            .collect())
    }
}

/// Split a long message into chunks of at most `max_len` bytes, preferring
/// line breaks and never cutting inside a UTF-8 character.
pub(crate) fn split_message(text: &str, max_len: usize) -> Vec<&str> {
    if text.len() <= max_len {
        return vec![text];
    }

    let mut chunks = Vec::new();
    let mut start = 0;

    while start < text.len() {
        let mut end = (start + max_len).min(text.len());
        while !text.is_char_boundary(end) {
            end -= 1;
        }
        let break_at = if end < text.len() {
            text[start..end]
                .rfind('\n')
                .map(|i| start + i + 1)
                .unwrap_or(end)
        } else {
            end
        };
        chunks.push(&text[start..break_at]);
        start = break_at;
    }

    chunks
}
