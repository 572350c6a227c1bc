//! Zulip channel.
//!
//! Registers an event queue and long-polls `/events` for new messages;
//! replies go out through `/messages`.
//! Docs: <https://zulip.com/api/real-time-events>

mod polling;
pub(crate) mod send;
pub(crate) mod types;


use herald_core::config::ZulipConfig;
use send::ZulipApi;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;

/// Zulip's per-message content limit, in bytes.
pub(crate) const MAX_MESSAGE_LEN: usize = 10_000;

/// Zulip channel using the REST API with an event queue.
pub struct ZulipChannel {
    config: ZulipConfig,
    api: ZulipApi,
    /// Ids of bot accounts, refreshed whenever the queue is (re)registered.
    bot_ids: Arc<RwLock<HashSet<i64>>>,
    /// Background poll task, aborted on stop.
    poller: Mutex<Option<JoinHandle<()>>>,
}

impl ZulipChannel {
    /// Create a new Zulip channel from config.
    pub fn new(config: ZulipConfig) -> Self {
        let api = ZulipApi::new(&config.site, &config.email, &config.api_key);
        Self {
            config,
            api,
            bot_ids: Arc::new(RwLock::new(HashSet::new())),
            poller: Mutex::new(None),
        }
    }
}
