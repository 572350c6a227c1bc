//! Query-and-deliver path shared by the daily pass and `force`.

use crate::rate_limit::RateLimiter;
use chrono::{DateTime, Duration, NaiveTime, TimeZone, Utc};
use herald_core::{
    error::HeraldError,
    message::OutgoingMessage,
    query::SearchResult,
    traits::{Channel, QuerySource},
};
use herald_memory::SubscriptionRegistry;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Sent when a subscription has nothing new, so subscribers know it is alive.
pub const NO_RESULTS: &str = "No new results found.";

/// Outcome counts of one dispatch-all pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DispatchReport {
    pub delivered: usize,
    pub failed: usize,
    /// Subscriptions removed after the pass took its id snapshot.
    pub skipped: usize,
}

/// Runs subscription queries through the shared rate limiter and delivers
/// the digests.
pub struct Dispatcher {
    registry: Arc<SubscriptionRegistry>,
    source: Arc<dyn QuerySource>,
    channel: Arc<dyn Channel>,
    limiter: Arc<RateLimiter>,
    max_results: usize,
    trigger: NaiveTime,
}

impl Dispatcher {
    pub fn new(
        registry: Arc<SubscriptionRegistry>,
        source: Arc<dyn QuerySource>,
        channel: Arc<dyn Channel>,
        limiter: Arc<RateLimiter>,
        max_results: usize,
        trigger: NaiveTime,
    ) -> Self {
        Self {
            registry,
            source,
            channel,
            limiter,
            max_results,
            trigger,
        }
    }

    /// UTC time of day of the daily pass.
    pub fn trigger(&self) -> NaiveTime {
        self.trigger
    }

    /// Query and deliver one subscription.
    ///
    /// Returns `Ok(None)` without touching the rate limiter when the id is
    /// not registered, otherwise the number of results delivered.
    pub async fn dispatch_one(&self, id: &str) -> Result<Option<usize>, HeraldError> {
        let Some(sub) = self.registry.get(id) else {
            return Ok(None);
        };

        self.limiter.acquire().await;
        let results = self.source.search(&sub.query, self.max_results).await?;

        let (text, kept) = render_digest(&results, cutoff(Utc::now(), self.trigger));
        self.channel
            .send(OutgoingMessage::new(text, sub.reply_target.clone()))
            .await?;

        info!(
            "dispatch: {} -> {} ({kept} new of {})",
            sub.id,
            sub.reply_target.describe(),
            results.len()
        );
        Ok(Some(kept))
    }

    /// Dispatch every subscription once, sequentially, in registry order.
    ///
    /// A failure for one subscription is logged and the pass continues.
    pub async fn dispatch_all(&self) -> DispatchReport {
        let ids = self.registry.ids();
        info!("dispatch: starting pass over {} subscriptions", ids.len());

        let mut report = DispatchReport::default();
        for id in ids {
            match self.dispatch_one(&id).await {
                Ok(Some(_)) => report.delivered += 1,
                Ok(None) => {
                    warn!("dispatch: subscription {id} disappeared before its turn, skipping");
                    report.skipped += 1;
                }
                Err(e) => {
                    error!("dispatch: subscription {id} failed: {e}");
                    report.failed += 1;
                }
            }
        }

        info!(
            "dispatch: pass complete, {} delivered, {} failed, {} skipped ({} queries since start)",
            report.delivered,
            report.failed,
            report.skipped,
            self.limiter.granted()
        );
        report
    }
}

/// Results published after this instant are new: yesterday at the trigger time.
pub fn cutoff(now: DateTime<Utc>, trigger: NaiveTime) -> DateTime<Utc> {
    let yesterday = (now - Duration::days(1)).date_naive();
    Utc.from_utc_datetime(&yesterday.and_time(trigger))
}

/// Render the digest for newest-first `results`.
///
/// Stops at the first result not strictly newer than `cutoff`. Returns the
/// text and the number of results it lists.
pub fn render_digest(results: &[SearchResult], cutoff: DateTime<Utc>) -> (String, usize) {
    let lines: Vec<String> = results
        .iter()
        .take_while(|r| r.published > cutoff)
        .map(SearchResult::to_markdown_line)
        .collect();

    if lines.is_empty() {
        (NO_RESULTS.to_string(), 0)
    } else {
        let kept = lines.len();
        (lines.join("\n"), kept)
    }
}
