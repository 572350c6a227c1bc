//! Bounded per-conversation turn history for the assistant.
//!
//! Each conversation keeps at most `capacity` turns; appending to a full
//! window evicts the oldest turn. Nothing here is persisted.

use herald_core::{context::ContextEntry, conversation::ConversationKey};
use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};

#[derive(Debug)]
pub struct ConversationMemory {
    capacity: usize,
    windows: Mutex<HashMap<ConversationKey, VecDeque<ContextEntry>>>,
}

impl ConversationMemory {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            windows: Mutex::new(HashMap::new()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<ConversationKey, VecDeque<ContextEntry>>> {
        self.windows.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Append a turn, evicting the oldest when the window is full.
    pub fn push(&self, key: &ConversationKey, entry: ContextEntry) {
        let mut windows = self.lock();
        let window = windows
            .entry(key.clone())
            .or_insert_with(|| VecDeque::with_capacity(self.capacity));
        if window.len() == self.capacity {
            window.pop_front();
        }
        window.push_back(entry);
    }

    /// Copy of the current window, oldest first.
    pub fn window(&self, key: &ConversationKey) -> Vec<ContextEntry> {
        self.lock()
            .get(key)
            .map(|w| w.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Forget a conversation. Returns the number of turns dropped.
    pub fn clear(&self, key: &ConversationKey) -> usize {
        self.lock().remove(key).map(|w| w.len()).unwrap_or(0)
    }
}
