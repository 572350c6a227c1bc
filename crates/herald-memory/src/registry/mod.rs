//! Subscription registry: thread-safe, JSON-persisted.
//!
//! Subscriptions are keyed by a generated id and deduplicated by conversation
//! key: a conversation holds at most one live subscription. All access goes
//! through one mutex; `list` and `ids` copy under the lock so callers never
//! hold it across network I/O. Snapshots are written with the lock held.


use herald_core::{conversation::ConversationKey, message::ReplyTarget};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{error, info, warn};
use uuid::Uuid;

/// A recurring search registered by a user for a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscription {
    #[serde(default = "new_id")]
    pub id: String,
    pub conversation_key: ConversationKey,
    pub query: String,
    pub owner_id: i64,
    pub reply_target: ReplyTarget,
}

fn new_id() -> String {
    Uuid::new_v4().to_string()
}

impl Subscription {
    /// Create a subscription with a fresh id.
    pub fn new(
        conversation_key: ConversationKey,
        query: impl Into<String>,
        owner_id: i64,
        reply_target: ReplyTarget,
    ) -> Self {
        Self {
            id: new_id(),
            conversation_key,
            query: query.into(),
            owner_id,
            reply_target,
        }
    }
}

/// Concurrent store of subscriptions in insertion order.
#[derive(Debug, Default)]
pub struct SubscriptionRegistry {
    subscriptions: Mutex<Vec<Subscription>>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Subscription>> {
        self.subscriptions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Insert unless a subscription for the same conversation exists.
    ///
    /// Returns `false` without mutation on duplicate.
    pub fn add(&self, subscription: Subscription) -> bool {
        let mut subs = self.lock();
        if subs
            .iter()
            .any(|s| s.conversation_key == subscription.conversation_key)
        {
            return false;
        }
        subs.push(subscription);
        true
    }

    /// Remove by id. Returns `false` if absent.
    pub fn remove(&self, id: &str) -> bool {
        let mut subs = self.lock();
        match subs.iter().position(|s| s.id == id) {
            Some(index) => {
                subs.remove(index);
                true
            }
            None => false,
        }
    }

    pub fn get(&self, id: &str) -> Option<Subscription> {
        self.lock().iter().find(|s| s.id == id).cloned()
    }

    /// Snapshot of all subscriptions.
    pub fn list(&self) -> Vec<Subscription> {
        self.lock().clone()
    }

    /// Snapshot of all ids.
    pub fn ids(&self) -> Vec<String> {
        self.lock().iter().map(|s| s.id.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Load a snapshot. Missing or unreadable files yield an empty registry.
    pub fn load_from_file(path: &Path) -> Self {
        let registry = Self::new();
        if !path.exists() {
            info!(
                "no subscription snapshot at {}, starting empty",
                path.display()
            );
            return registry;
        }

        let records: Vec<Subscription> = match std::fs::read_to_string(path)
            .map_err(|e| e.to_string())
            .and_then(|raw| serde_json::from_str(&raw).map_err(|e| e.to_string()))
        {
            Ok(records) => records,
            Err(e) => {
                error!(
                    "failed to load subscription snapshot {}: {e}",
                    path.display()
                );
                return registry;
            }
        };

        for record in records {
            let id = record.id.clone();
            let key = record.conversation_key.clone();
            if !registry.add(record) {
                warn!("snapshot: dropping {id}, conversation {key} already subscribed");
            }
        }
        info!(
            "loaded {} subscriptions from {}",
            registry.len(),
            path.display()
        );
        registry
    }

    /// Overwrite the snapshot with the current subscriptions.
    ///
    /// Errors are logged; the in-memory state stays authoritative.
    pub fn save_to_file(&self, path: &Path) {
        let subs = self.lock();
        if let Err(e) = write_snapshot(path, &subs) {
            error!(
                "failed to save subscription snapshot {}: {e}",
                path.display()
            );
        }
    }
}

/// Write via a sibling temp file and rename, so readers never see a torn file.
fn write_snapshot(path: &Path, subs: &[Subscription]) -> std::io::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(subs)?;
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let written = std::fs::write(&tmp, json).and_then(|()| std::fs::rename(&tmp, path));
    if written.is_err() {
        let _ = std::fs::remove_file(&tmp);
    }
    written
}
