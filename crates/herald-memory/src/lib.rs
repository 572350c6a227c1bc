//! # herald-memory
//!
//! State kept by the bots: the persisted subscription registry, the bounded
//! per-conversation memory window, and the SQLite-backed token quota table.

pub mod conversation;
pub mod quota;
pub mod registry;

pub use conversation::ConversationMemory;
pub use quota::QuotaStore;
pub use registry::{Subscription, SubscriptionRegistry};
