//! Test doubles shared by the bot and gateway tests.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use herald_core::{
    context::{Completion, Context},
    error::HeraldError,
    message::{
        Conversation, IncomingMessage, OutgoingMessage, Participant, ReplyTarget, UserInfo,
    },
    query::SearchResult,
    traits::{Channel, Provider, QuerySource},
};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use tokio::sync::mpsc;
use uuid::Uuid;

pub const BOT_EMAIL: &str = "bot@example.com";

/// A stream message from `sender_id` in `stream > topic`.
pub fn stream_message(sender_id: i64, stream: &str, topic: &str, text: &str) -> IncomingMessage {
    IncomingMessage {
        id: Uuid::new_v4(),
        sender_id,
        sender_email: format!("user{sender_id}@example.com"),
        sender_name: Some(format!("User {sender_id}")),
        sender_is_bot: false,
        text: text.to_string(),
        timestamp: Utc::now(),
        conversation: Conversation::Stream {
            stream: stream.to_string(),
            topic: topic.to_string(),
        },
    }
}

/// A private message from `sender_id` to the bot and `others`.
pub fn private_message(sender_id: i64, others: &[i64], text: &str) -> IncomingMessage {
    let mut participants = vec![Participant {
        id: 1,
        email: BOT_EMAIL.to_string(),
        full_name: None,
    }];
    for id in std::iter::once(&sender_id).chain(others) {
        participants.push(Participant {
            id: *id,
            email: format!("user{id}@example.com"),
            full_name: None,
        });
    }
    IncomingMessage {
        conversation: Conversation::Private { participants },
        ..stream_message(sender_id, "", "", text)
    }
}

/// Channel that records deliveries instead of sending them.
#[derive(Default)]
pub struct MockChannel {
    pub sent: Mutex<Vec<OutgoingMessage>>,
    /// Deliveries to these targets fail.
    pub failing_targets: Mutex<HashSet<String>>,
    pub users: Vec<UserInfo>,
}

impl MockChannel {
    pub fn sent(&self) -> Vec<OutgoingMessage> {
        self.sent.lock().unwrap().clone()
    }

    pub fn sent_texts(&self) -> Vec<String> {
        self.sent().into_iter().map(|m| m.text).collect()
    }

    pub fn fail_deliveries_to(&self, target: &ReplyTarget) {
        self.failing_targets.lock().unwrap().insert(target.describe());
    }
}

#[async_trait]
impl Channel for MockChannel {
    fn name(&self) -> &str {
        "mock"
    }

    fn bot_email(&self) -> &str {
        BOT_EMAIL
    }

    async fn start(&self) -> Result<mpsc::Receiver<IncomingMessage>, HeraldError> {
        let (_tx, rx) = mpsc::channel(1);
        Ok(rx)
    }

    async fn send(&self, message: OutgoingMessage) -> Result<(), HeraldError> {
        if self
            .failing_targets
            .lock()
            .unwrap()
            .contains(&message.target.describe())
        {
            return Err(HeraldError::Channel("delivery refused".into()));
        }
        self.sent.lock().unwrap().push(message);
        Ok(())
    }

    async fn list_users(&self) -> Result<Vec<UserInfo>, HeraldError> {
        Ok(self.users.clone())
    }

    async fn stop(&self) -> Result<(), HeraldError> {
        Ok(())
    }
}

/// Query source with canned results per query.
#[derive(Default)]
pub struct MockSource {
    pub results: Mutex<HashMap<String, Vec<SearchResult>>>,
    pub failing: Mutex<HashSet<String>>,
    pub calls: AtomicUsize,
}

impl MockSource {
    pub fn with_results(self, query: &str, results: Vec<SearchResult>) -> Self {
        self.results
            .lock()
            .unwrap()
            .insert(query.to_string(), results);
        self
    }

    pub fn failing_on(self, query: &str) -> Self {
        self.failing.lock().unwrap().insert(query.to_string());
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl QuerySource for MockSource {
    fn name(&self) -> &str {
        "mock"
    }

    async fn search(
        &self,
        query: &str,
        max_results: usize,
    ) -> Result<Vec<SearchResult>, HeraldError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.lock().unwrap().contains(query) {
            return Err(HeraldError::Query(format!("backend down for {query}")));
        }
        let mut results = self
            .results
            .lock()
            .unwrap()
            .get(query)
            .cloned()
            .unwrap_or_default();
        results.truncate(max_results);
        Ok(results)
    }
}

pub fn paper(n: u32, published: DateTime<Utc>) -> SearchResult {
    SearchResult {
        entry_id: format!("http://arxiv.org/abs/2405.{n:05}v1"),
        title: format!("Paper {n}"),
        published,
    }
}

/// Provider that answers from a script and records what it was sent.
#[derive(Default)]
pub struct MockProvider {
    pub replies: Mutex<Vec<Result<Completion, HeraldError>>>,
    pub contexts: Mutex<Vec<Context>>,
}

impl MockProvider {
    pub fn replying(replies: Vec<Result<Completion, HeraldError>>) -> Self {
        Self {
            replies: Mutex::new(replies),
            contexts: Mutex::new(Vec::new()),
        }
    }

    pub fn contexts(&self) -> Vec<Context> {
        self.contexts.lock().unwrap().clone()
    }
}

pub fn completion(text: &str, tokens: u64) -> Result<Completion, HeraldError> {
    Ok(Completion {
        text: text.to_string(),
        tokens_used: Some(tokens),
        model: Some("o4-mini".to_string()),
    })
}

#[async_trait]
impl Provider for MockProvider {
    fn name(&self) -> &str {
        "mock"
    }

    async fn complete(&self, context: &Context) -> Result<Completion, HeraldError> {
        self.contexts.lock().unwrap().push(context.clone());
        let mut replies = self.replies.lock().unwrap();
        if replies.is_empty() {
            return Err(HeraldError::Provider("no scripted reply".into()));
        }
        replies.remove(0)
    }
}
