//! The subscription bot ("arxiv"): recurring searches delivered daily.

pub mod commands;
pub mod dispatcher;
pub mod scheduler;

#[cfg(test)]
mod tests;

use crate::gateway::{Bot, MessageContext};
use async_trait::async_trait;
use commands::CommandError;
use dispatcher::Dispatcher;
use herald_core::grammar::{Grammar, Invocation, Parsed, Part};
use herald_memory::SubscriptionRegistry;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

const SUMMARY: &str = "A bot to manage arxiv queries.";

const DETAILS: &str = "\
Commands:
  set           Add a new arxiv query.
  list          List your queries, or all queries if 'all' is given.
  rm            Remove a saved query by its ID.
  force         Force update on a query by its ID.
  help          Show this help.

Arguments:
  <query>       Query to add (can be multiple tokens, e.g. cat:cs.LG AND all:GAN).
  <query_id>    ID of the query.

Examples:
  @**arxiv** --help
  @**arxiv** set cat:cs.LG AND all:GAN AND submittedDate:[20220101 TO 20231231]
  @**arxiv** rm 123456
  @**arxiv** list
  @**arxiv** list all
  @**arxiv** force 123456";

/// Command grammar of the subscription bot.
pub fn grammar() -> Grammar {
    Grammar::new("arxiv")
        .summary(SUMMARY)
        .details(DETAILS)
        .rule("set", &[Part::Word("set"), Part::Args("query")])
        .rule("list", &[Part::Word("list"), Part::Optional("all")])
        .rule("rm", &[Part::Word("rm"), Part::Arg("query_id")])
        .rule("force", &[Part::Word("force"), Part::Arg("query_id")])
}

/// Routes subscription commands and owns the daily digest timer.
pub struct SubscriptionBot {
    grammar: Grammar,
    registry: Arc<SubscriptionRegistry>,
    dispatcher: Arc<Dispatcher>,
    snapshot: PathBuf,
    admin_id: i64,
}

impl SubscriptionBot {
    pub fn new(
        registry: Arc<SubscriptionRegistry>,
        dispatcher: Arc<Dispatcher>,
        snapshot: PathBuf,
        admin_id: i64,
    ) -> Self {
        Self {
            grammar: grammar(),
            registry,
            dispatcher,
            snapshot,
            admin_id,
        }
    }

    async fn execute(
        &self,
        invocation: &Invocation,
        ctx: &MessageContext<'_>,
    ) -> Result<Option<String>, CommandError> {
        let sender_id = ctx.message.sender_id;
        match invocation.rule {
            "set" => {
                let query = invocation.args("query").join(" ");
                commands::handle_set(&self.registry, &self.snapshot, ctx, &query).map(Some)
            }
            "list" => Ok(Some(commands::handle_list(
                &self.registry,
                sender_id,
                invocation.flag("all"),
            ))),
            "rm" => {
                let id = invocation.arg("query_id").unwrap_or_default();
                commands::handle_rm(&self.registry, &self.snapshot, sender_id, self.admin_id, id)
                    .map(Some)
            }
            "force" => {
                let id = invocation.arg("query_id").unwrap_or_default();
                commands::handle_force(&self.dispatcher, id).await?;
                Ok(None)
            }
            _ => Err(CommandError::Malformed(self.grammar.mention())),
        }
    }
}

#[async_trait]
impl Bot for SubscriptionBot {
    fn name(&self) -> &str {
        self.grammar.bot()
    }

    async fn handle(&self, ctx: &MessageContext<'_>) -> Option<String> {
        let Some(parsed) = self.grammar.parse(&ctx.message.text) else {
            debug!("arxiv: message {} is not addressed to a bot", ctx.message.id);
            return None;
        };

        let outcome = match parsed {
            Parsed::Help(usage) => Ok(Some(format!("```text\n{usage}\n```"))),
            Parsed::Prompt(_) => Err(CommandError::Malformed(self.grammar.mention())),
            Parsed::Command(invocation) => self.execute(&invocation, ctx).await,
        };

        match outcome {
            Ok(reply) => reply,
            Err(e) => {
                info!("arxiv: {} in {}: {e}", ctx.message.sender_id, ctx.key);
                Some(e.to_string())
            }
        }
    }

    fn start_background(&self) -> Option<JoinHandle<()>> {
        let dispatcher = self.dispatcher.clone();
        Some(tokio::spawn(scheduler::digest_loop(dispatcher)))
    }

    async fn shutdown(&self) {
        self.registry.save_to_file(&self.snapshot);
        info!(
            "arxiv: saved {} subscriptions to {}",
            self.registry.len(),
            self.snapshot.display()
        );
    }
}
