//! Event queue loop and Channel trait implementation.

use super::send::ZulipApi;
use super::types::{ZEvent, ZMessage, ZRecipient};
use super::ZulipChannel;
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use herald_core::{
    error::HeraldError,
    message::{Conversation, IncomingMessage, OutgoingMessage, Participant, UserInfo},
    traits::Channel,
};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

#[async_trait]
impl Channel for ZulipChannel {
    fn name(&self) -> &str {
        "zulip"
    }

    fn bot_email(&self) -> &str {
        &self.config.email
    }

    async fn start(&self) -> Result<mpsc::Receiver<IncomingMessage>, HeraldError> {
        let (tx, rx) = mpsc::channel(64);
        let api = self.api.clone();
        let bot_ids = self.bot_ids.clone();

        info!("Zulip channel starting event queue for {}", self.config.email);

        let handle = tokio::spawn(poll_events(api, bot_ids, tx));
        if let Some(previous) = self.poller.lock().await.replace(handle) {
            previous.abort();
        }

        Ok(rx)
    }

    async fn send(&self, message: OutgoingMessage) -> Result<(), HeraldError> {
        self.api.send_message(&message).await
    }

    async fn list_users(&self) -> Result<Vec<UserInfo>, HeraldError> {
        self.api.users().await
    }

    async fn stop(&self) -> Result<(), HeraldError> {
        if let Some(handle) = self.poller.lock().await.take() {
            handle.abort();
        }
        info!("Zulip channel stopped");
        Ok(())
    }
}

async fn backoff(backoff_secs: &mut u64) {
    tokio::time::sleep(Duration::from_secs(*backoff_secs)).await;
    *backoff_secs = (*backoff_secs * 2).min(60);
}

/// Register a queue, then long-poll it forever, re-registering when the
/// server garbage-collects it.
async fn poll_events(
    api: ZulipApi,
    bot_ids: Arc<RwLock<HashSet<i64>>>,
    tx: mpsc::Sender<IncomingMessage>,
) {
    let mut backoff_secs: u64 = 1;
    let mut queue: Option<(String, i64)> = None;

    loop {
        let (queue_id, last_event_id) = match queue.clone() {
            Some(q) => q,
            None => match api.register().await {
                Ok(q) => {
                    info!("zulip: registered event queue {}", q.0);
                    refresh_bot_ids(&api, &bot_ids).await;
                    backoff_secs = 1;
                    queue = Some(q.clone());
                    q
                }
                Err(e) => {
                    error!("{e} (retry in {backoff_secs}s)");
                    backoff(&mut backoff_secs).await;
                    continue;
                }
            },
        };

        let body = match api.events(&queue_id, last_event_id).await {
            Ok(b) => b,
            Err(e) => {
                error!("{e} (retry in {backoff_secs}s)");
                backoff(&mut backoff_secs).await;
                continue;
            }
        };

        if !body.status.is_success() {
            if body.status.code.as_deref() == Some("BAD_EVENT_QUEUE_ID") {
                warn!("zulip: event queue {queue_id} expired, re-registering");
                queue = None;
                continue;
            }
            error!(
                "zulip API error (retry in {backoff_secs}s): {}",
                body.status.msg
            );
            backoff(&mut backoff_secs).await;
            continue;
        }

        // Successful poll -- reset backoff.
        backoff_secs = 1;

        let mut newest = last_event_id;
        for raw in body.events {
            let (id, message) = decode_event(raw);
            if let Some(id) = id {
                newest = newest.max(id);
            }
            let Some(message) = message else {
                continue;
            };
            let incoming = {
                let bots = bot_ids.read().await;
                to_incoming(message, &bots)
            };
            if tx.send(incoming).await.is_err() {
                info!("zulip channel receiver dropped, stopping poll");
                return;
            }
        }
        queue = Some((queue_id, newest));
    }
}

async fn refresh_bot_ids(api: &ZulipApi, bot_ids: &RwLock<HashSet<i64>>) {
    match api.users().await {
        Ok(users) => {
            let ids: HashSet<i64> = users
                .into_iter()
                .filter(|u| u.is_bot)
                .map(|u| u.user_id)
                .collect();
            debug!("zulip: {} bot accounts known", ids.len());
            *bot_ids.write().await = ids;
        }
        Err(e) => warn!("zulip: could not refresh bot accounts: {e}"),
    }
}

/// Event id and, for message events, the decoded message.
///
/// Anything that does not fit is logged and yields no message; the id is
/// still returned when present so the queue moves past it.
pub(crate) fn decode_event(raw: serde_json::Value) -> (Option<i64>, Option<ZMessage>) {
    let id = raw.get("id").and_then(serde_json::Value::as_i64);
    let event: ZEvent = match serde_json::from_value(raw) {
        Ok(event) => event,
        Err(e) => {
            warn!("zulip: skipping undecodable event {id:?}: {e}");
            return (id, None);
        }
    };
    if event.event_type != "message" {
        debug!("zulip: ignoring {} event {}", event.event_type, event.id);
        return (id, None);
    }
    let Some(message) = event.message else {
        warn!("zulip: message event {} carries no message", event.id);
        return (id, None);
    };
    match serde_json::from_value(message) {
        Ok(message) => (id, Some(message)),
        Err(e) => {
            warn!("zulip: skipping malformed message event {}: {e}", event.id);
            (id, None)
        }
    }
}

/// Translate a Zulip message into the engine's message type.
pub(crate) fn to_incoming(message: ZMessage, bot_ids: &HashSet<i64>) -> IncomingMessage {
    let conversation = match (message.message_type.as_str(), message.display_recipient) {
        ("stream", ZRecipient::Stream(stream)) => Conversation::Stream {
            stream,
            topic: message.subject,
        },
        ("private", ZRecipient::Private(users)) => Conversation::Private {
            participants: users
                .into_iter()
                .map(|u| Participant {
                    id: u.id,
                    email: u.email,
                    full_name: u.full_name,
                })
                .collect(),
        },
        (other, _) => {
            debug!("zulip: unsupported message type {other:?}");
            Conversation::Unsupported
        }
    };

    IncomingMessage {
        id: Uuid::new_v4(),
        sender_id: message.sender_id,
        sender_email: message.sender_email,
        sender_name: message.sender_full_name,
        sender_is_bot: bot_ids.contains(&message.sender_id),
        text: message.content,
        timestamp: Utc
            .timestamp_opt(message.timestamp, 0)
            .single()
            .unwrap_or_else(Utc::now),
        conversation,
    }
}
