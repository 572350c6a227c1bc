mod assistant;
mod gateway;
mod rate_limit;
mod subscriptions;
#[cfg(test)]
mod testing;

use assistant::{AssistantBot, AssistantSettings};
use chrono::NaiveTime;
use clap::{Parser, Subcommand, ValueEnum};
use gateway::{Bot, Gateway};
use herald_channels::zulip::ZulipChannel;
use herald_core::{config, shellexpand, traits::Channel};
use herald_memory::{ConversationMemory, QuotaStore, SubscriptionRegistry};
use herald_providers::{arxiv::ArxivSource, openai::OpenAiProvider};
use rate_limit::RateLimiter;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use subscriptions::{dispatcher::Dispatcher, SubscriptionBot};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(
    name = "herald",
    version,
    about = "Mention-driven Zulip bots: daily arXiv digests and a quota-aware assistant"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to config file.
    #[arg(short, long, default_value = "config.toml")]
    config: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Connect to Zulip and serve one bot.
    Run {
        #[arg(value_enum)]
        bot: BotKind,
    },
    /// Run one digest pass over every subscription, then exit.
    Dispatch,
    /// Print the effective configuration and stored state.
    Status,
}

#[derive(Clone, Copy, ValueEnum)]
enum BotKind {
    /// Daily arXiv digests.
    Arxiv,
    /// Chat completions with memory and token quotas.
    Kita,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let cfg = config::load(&cli.config)?;
    let _log_guard = init_tracing(&cfg)?;

    match cli.command {
        Commands::Run { bot } => {
            require_zulip(&cfg)?;
            let channel = Arc::new(ZulipChannel::new(cfg.zulip.clone()));
            let bot: Arc<dyn Bot> = match bot {
                BotKind::Arxiv => {
                    let (registry, dispatcher) = build_dispatcher(&cfg, channel.clone())?;
                    Arc::new(SubscriptionBot::new(
                        registry,
                        dispatcher,
                        snapshot_path(&cfg),
                        cfg.zulip.admin_id,
                    ))
                }
                BotKind::Kita => Arc::new(build_assistant(&cfg, channel.clone()).await?),
            };

            info!(
                "{} starting {} on {}",
                cfg.herald.name,
                bot.name(),
                cfg.zulip.site
            );
            Arc::new(Gateway::new(channel, bot)).run().await?;
        }
        Commands::Dispatch => {
            require_zulip(&cfg)?;
            let channel = Arc::new(ZulipChannel::new(cfg.zulip.clone()));
            let (registry, dispatcher) = build_dispatcher(&cfg, channel)?;
            if registry.is_empty() {
                println!("No subscriptions in {}.", snapshot_path(&cfg).display());
                return Ok(());
            }
            let report = dispatcher.dispatch_all().await;
            println!(
                "Dispatched {} subscriptions: {} delivered, {} failed, {} skipped.",
                registry.len(),
                report.delivered,
                report.failed,
                report.skipped
            );
        }
        Commands::Status => {
            println!("Herald status\n");
            println!("Config: {}", cli.config);
            println!(
                "Zulip: {} ({})",
                cfg.zulip.site,
                if cfg.zulip.is_configured() {
                    "configured"
                } else {
                    "missing email or api_key"
                }
            );
            println!("Admin user id: {}", cfg.zulip.admin_id);
            println!();

            let snapshot = snapshot_path(&cfg);
            let registry = SubscriptionRegistry::load_from_file(&snapshot);
            println!("arxiv:");
            println!("  snapshot: {}", snapshot.display());
            println!("  subscriptions: {}", registry.len());
            println!(
                "  daily digest: {:02}:{:02} UTC, {} results, {}s between requests",
                cfg.arxiv.hour, cfg.arxiv.minute, cfg.arxiv.max_results, cfg.arxiv.min_interval_secs
            );
            println!();

            println!("kita:");
            println!("  model: {}", cfg.kita.model);
            println!(
                "  api_key: {}",
                if cfg.kita.api_key.is_empty() {
                    "missing"
                } else {
                    "set"
                }
            );
            println!("  token ceiling: {}", cfg.kita.max_tokens);
            let quota = QuotaStore::new(&cfg.kita.db_file).await?;
            let usage = quota.all().await?;
            let total: i64 = usage.iter().map(|(_, tokens)| tokens).sum();
            println!(
                "  usage: {} users, {total} tokens ({})",
                usage.len(),
                shellexpand(&cfg.kita.db_file)
            );
        }
    }

    Ok(())
}

/// Stdout plus a daily-rolling file under `<data_dir>/logs`.
fn init_tracing(
    cfg: &config::Config,
) -> anyhow::Result<tracing_appender::non_blocking::WorkerGuard> {
    let log_dir = PathBuf::from(shellexpand(&cfg.herald.data_dir)).join("logs");
    std::fs::create_dir_all(&log_dir)?;

    let file_appender = tracing_appender::rolling::daily(&log_dir, "herald.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("{},hyper=warn,sqlx=warn", cfg.herald.log_level)));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false),
        )
        .init();

    Ok(guard)
}

fn require_zulip(cfg: &config::Config) -> anyhow::Result<()> {
    if !cfg.zulip.is_configured() {
        anyhow::bail!(
            "Zulip credentials missing. Set zulip.email and zulip.api_key in config.toml, \
             ZULIP_EMAIL / ZULIP_API_KEY, or point zulip.zuliprc at a zuliprc file."
        );
    }
    Ok(())
}

fn snapshot_path(cfg: &config::Config) -> PathBuf {
    PathBuf::from(shellexpand(&cfg.arxiv.db_file))
}

fn build_dispatcher(
    cfg: &config::Config,
    channel: Arc<dyn Channel>,
) -> anyhow::Result<(Arc<SubscriptionRegistry>, Arc<Dispatcher>)> {
    let trigger = NaiveTime::from_hms_opt(cfg.arxiv.hour, cfg.arxiv.minute, 0).ok_or_else(|| {
        anyhow::anyhow!(
            "invalid digest time {:02}:{:02}",
            cfg.arxiv.hour,
            cfg.arxiv.minute
        )
    })?;
    let registry = Arc::new(SubscriptionRegistry::load_from_file(&snapshot_path(cfg)));
    let source = Arc::new(ArxivSource::new(cfg.arxiv.api_url.clone()));
    let limiter = Arc::new(RateLimiter::new(Duration::from_secs(
        cfg.arxiv.min_interval_secs,
    )));
    let dispatcher = Arc::new(Dispatcher::new(
        registry.clone(),
        source,
        channel,
        limiter,
        cfg.arxiv.max_results,
        trigger,
    ));
    Ok((registry, dispatcher))
}

async fn build_assistant(
    cfg: &config::Config,
    channel: Arc<dyn Channel>,
) -> anyhow::Result<AssistantBot> {
    if cfg.kita.api_key.is_empty() {
        anyhow::bail!("kita.api_key is empty. Set it in config.toml or OPENAI_API_KEY.");
    }
    let provider = Arc::new(OpenAiProvider::from_config(
        cfg.kita.base_url.clone(),
        cfg.kita.api_key.clone(),
        cfg.kita.model.clone(),
    ));
    let model = provider.model().to_string();
    let quota = QuotaStore::new(&cfg.kita.db_file).await?;
    Ok(AssistantBot::new(
        provider,
        channel,
        ConversationMemory::new(cfg.kita.memory_window),
        quota,
        AssistantSettings {
            model,
            max_tokens: cfg.kita.max_tokens,
            max_completion_tokens: cfg.kita.max_completion_tokens,
            admin_id: cfg.zulip.admin_id,
        },
    ))
}
