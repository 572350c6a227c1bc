//! Subscription commands: set, list, rm, force.

use super::dispatcher::Dispatcher;
use crate::gateway::MessageContext;
use herald_memory::{Subscription, SubscriptionRegistry};
use std::path::Path;
use thiserror::Error;
use tracing::info;

/// A command that could not be carried out. `Display` is the user-facing reply.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommandError {
    #[error("This search topic already exists.")]
    Duplicate,
    #[error("No such request ID.")]
    NoSuchId,
    #[error("You don't have permission to remove this topic.")]
    NotOwner,
    #[error("Request ID `{0}` not found.")]
    UnknownForceId(String),
    #[error("⚠️ Update for `{id}` failed: {reason}")]
    DispatchFailed { id: String, reason: String },
    #[error("Unknown or malformed command. Use `{0} --help` for usage.")]
    Malformed(String),
}

/// Register a search for the current conversation.
pub fn handle_set(
    registry: &SubscriptionRegistry,
    snapshot: &Path,
    ctx: &MessageContext<'_>,
    query: &str,
) -> Result<String, CommandError> {
    let sub = Subscription::new(
        ctx.key.clone(),
        query,
        ctx.message.sender_id,
        ctx.target.clone(),
    );
    let id = sub.id.clone();
    if !registry.add(sub) {
        return Err(CommandError::Duplicate);
    }
    registry.save_to_file(snapshot);
    info!("set: {id} for {} by {}", ctx.key, ctx.message.sender_id);
    Ok(format!("✅ Search topic added!\nID: `{id}`"))
}

/// List the caller's subscriptions, or everyone's with `all`.
pub fn handle_list(registry: &SubscriptionRegistry, sender_id: i64, all: bool) -> String {
    let mut out = if all {
        String::from("🔎 All search topics:\n")
    } else {
        String::from("🔎 Your search topics:\n")
    };

    let mut found = false;
    for sub in registry
        .list()
        .into_iter()
        .filter(|s| all || s.owner_id == sender_id)
    {
        found = true;
        out.push_str(&format!(
            "- [`{}`] (owner: {})\n    query: `{}`\n",
            sub.id, sub.owner_id, sub.query
        ));
    }
    if !found {
        out.push_str("None.");
    }
    out
}

/// Remove a subscription. Only its owner or the administrator may.
pub fn handle_rm(
    registry: &SubscriptionRegistry,
    snapshot: &Path,
    sender_id: i64,
    admin_id: i64,
    id: &str,
) -> Result<String, CommandError> {
    let sub = registry.get(id).ok_or(CommandError::NoSuchId)?;
    if sender_id != sub.owner_id && sender_id != admin_id {
        return Err(CommandError::NotOwner);
    }
    if !registry.remove(id) {
        return Err(CommandError::NoSuchId);
    }
    registry.save_to_file(snapshot);
    info!("rm: {id} by {sender_id}");
    Ok("✅ Search topic removed!".to_string())
}

/// Run one subscription now. The digest goes to the subscription's own
/// conversation, so there is nothing to reply on success.
pub async fn handle_force(dispatcher: &Dispatcher, id: &str) -> Result<(), CommandError> {
    match dispatcher.dispatch_one(id).await {
        Ok(Some(_)) => Ok(()),
        Ok(None) => Err(CommandError::UnknownForceId(id.to_string())),
        Err(e) => Err(CommandError::DispatchFailed {
            id: id.to_string(),
            reason: e.to_string(),
        }),
    }
}
