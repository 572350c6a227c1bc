//! The assistant bot ("kita"): chat completions with a short per-conversation
//! memory and a per-user token ceiling.


use crate::gateway::{Bot, MessageContext};
use async_trait::async_trait;
use herald_core::{
    context::{Context, ContextEntry},
    grammar::{strip_mention, Grammar, Invocation, Parsed, Part},
    traits::{Channel, Provider},
};
use herald_memory::{ConversationMemory, QuotaStore};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

const SUMMARY: &str =
    "Know IT All (Kita) can help resolve conflicts and answer questions using OpenAI's GPT!";

const DETAILS: &str = "\
Commands:
  --reset         Reset the memory for this conversation.
  --tokens        Show your total token usage.
  --users         List all users and their IDs.
  --reset-tokens  Reset token usage for the given user ID.
  --model         See the OpenAI model used.

Arguments:
  <prompt>...   The prompt to send to the model.
  <user_id>     The user ID to reset token usage for.";

const PROVIDER_FAILED: &str = "Error calling OpenAI API. Please try again later.";

/// Command grammar of the assistant bot.
pub fn grammar() -> Grammar {
    Grammar::new("kita")
        .summary(SUMMARY)
        .details(DETAILS)
        .rule("reset", &[Part::Word("--reset")])
        .rule("tokens", &[Part::Word("--tokens")])
        .rule("users", &[Part::Word("--users")])
        .rule(
            "reset-tokens",
            &[Part::Word("--reset-tokens"), Part::Arg("user_id")],
        )
        .rule("model", &[Part::Word("--model")])
        .rule("prompt", &[Part::Args("prompt")])
}

/// Assistant settings taken from `[kita]` and `[zulip]`.
#[derive(Debug, Clone)]
pub struct AssistantSettings {
    pub model: String,
    pub max_tokens: i64,
    pub max_completion_tokens: u32,
    pub admin_id: i64,
}

/// Answers prompts through a completion provider.
pub struct AssistantBot {
    grammar: Grammar,
    provider: Arc<dyn Provider>,
    channel: Arc<dyn Channel>,
    memory: ConversationMemory,
    quota: QuotaStore,
    settings: AssistantSettings,
}

impl AssistantBot {
    pub fn new(
        provider: Arc<dyn Provider>,
        channel: Arc<dyn Channel>,
        memory: ConversationMemory,
        quota: QuotaStore,
        settings: AssistantSettings,
    ) -> Self {
        Self {
            grammar: grammar(),
            provider,
            channel,
            memory,
            quota,
            settings,
        }
    }

    async fn execute(&self, invocation: &Invocation, ctx: &MessageContext<'_>) -> String {
        let sender_id = ctx.message.sender_id;
        match invocation.rule {
            "reset" => {
                let dropped = self.memory.clear(ctx.key);
                debug!("kita: cleared {dropped} turns for {}", ctx.key);
                "💡 Memory reset for this conversation.".to_string()
            }
            "tokens" => match self.quota.usage(sender_id).await {
                Ok(used) => format!("💸 Total tokens used by you: {used}\n"),
                Err(e) => {
                    error!("kita: usage lookup for {sender_id} failed: {e}");
                    "⚠️ Could not read your token usage.".to_string()
                }
            },
            "users" => self.list_users().await,
            "reset-tokens" => {
                self.reset_tokens(sender_id, invocation.arg("user_id").unwrap_or_default())
                    .await
            }
            "model" => format!("🤖 GPT model: {}\n", self.settings.model),
            _ => {
                let prompt = strip_mention(&ctx.message.text).unwrap_or_default();
                self.complete(ctx, prompt).await
            }
        }
    }

    async fn list_users(&self) -> String {
        match self.channel.list_users().await {
            Ok(users) => {
                let mut lines = vec!["**👥 List of all users:**".to_string(), String::new()];
                lines.extend(
                    users
                        .iter()
                        .map(|u| format!("- `{}` | {} | `{}`", u.user_id, u.full_name, u.email)),
                );
                lines.join("\n")
            }
            Err(e) => {
                error!("kita: listing users failed: {e}");
                "⚠️ Could not fetch the user list.".to_string()
            }
        }
    }

    async fn reset_tokens(&self, sender_id: i64, raw_id: &str) -> String {
        if sender_id != self.settings.admin_id {
            return "🚫 You are not authorized to use this command.".to_string();
        }
        let Ok(user_id) = raw_id.parse::<i64>() else {
            return format!("❓ Usage: {} --reset-tokens user_id", self.grammar.mention());
        };
        match self.quota.reset(user_id).await {
            Ok(true) => {
                info!("kita: token usage reset for {user_id} by {sender_id}");
                format!("✅ Token usage reset for user ID {user_id}.")
            }
            Ok(false) => format!("❓ No user with token usage found with user ID {user_id}."),
            Err(e) => {
                error!("kita: reset for {user_id} failed: {e}");
                "⚠️ Could not reset token usage.".to_string()
            }
        }
    }

    /// Quota check, completion over the memory window, usage accounting.
    async fn complete(&self, ctx: &MessageContext<'_>, prompt: &str) -> String {
        let sender_id = ctx.message.sender_id;

        let used = match self.quota.usage(sender_id).await {
            Ok(used) => used,
            Err(e) => {
                error!("kita: usage lookup for {sender_id} failed: {e}");
                return PROVIDER_FAILED.to_string();
            }
        };
        if used > self.settings.max_tokens {
            info!("kita: {sender_id} is over quota ({used} tokens)");
            return "🚫 You have reached the maximum token usage for this month. \
                    You can ask an administrator to reset your token usage."
                .to_string();
        }

        self.memory.push(ctx.key, ContextEntry::user(prompt));
        let context = Context {
            history: self.memory.window(ctx.key),
            model: Some(self.settings.model.clone()),
            max_completion_tokens: Some(self.settings.max_completion_tokens),
        };
        debug!(
            "kita: sending {} turns for {} to {}",
            context.history.len(),
            ctx.key,
            self.provider.name()
        );

        let completion = match self.provider.complete(&context).await {
            Ok(c) => c,
            Err(e) => {
                error!("kita: completion for {} failed: {e}", ctx.key);
                return PROVIDER_FAILED.to_string();
            }
        };

        self.memory
            .push(ctx.key, ContextEntry::assistant(completion.text.clone()));

        if let Some(tokens) = completion.tokens_used {
            let tokens = i64::try_from(tokens).unwrap_or(i64::MAX);
            match self.quota.add_usage(sender_id, tokens).await {
                Ok(total) => debug!("kita: {sender_id} has used {total} tokens"),
                Err(e) => warn!("kita: failed to record {tokens} tokens for {sender_id}: {e}"),
            }
        }

        completion.text
    }
}

#[async_trait]
impl Bot for AssistantBot {
    fn name(&self) -> &str {
        self.grammar.bot()
    }

    async fn handle(&self, ctx: &MessageContext<'_>) -> Option<String> {
        let Some(parsed) = self.grammar.parse(&ctx.message.text) else {
            debug!("kita: message {} is not addressed to a bot", ctx.message.id);
            return None;
        };

        if ctx.message.sender_is_bot {
            info!("kita: refusing bot {}", ctx.message.sender_email);
            return Some("This bot does not respond to other bots.".to_string());
        }

        Some(match parsed {
            Parsed::Help(usage) => format!("```text\n{usage}\n```"),
            Parsed::Prompt(prompt) => self.complete(ctx, &prompt).await,
            Parsed::Command(invocation) => self.execute(&invocation, ctx).await,
        })
    }
}
