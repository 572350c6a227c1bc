//! Daily digest timer.

use super::dispatcher::Dispatcher;
use chrono::{DateTime, Duration, NaiveTime, TimeZone, Utc};
use std::sync::Arc;
use tracing::info;

/// Next instant strictly after `now` whose UTC time of day is `trigger`.
pub fn next_fire(now: DateTime<Utc>, trigger: NaiveTime) -> DateTime<Utc> {
    let today = Utc.from_utc_datetime(&now.date_naive().and_time(trigger));
    if today > now {
        today
    } else {
        today + Duration::days(1)
    }
}

/// Background task: sleep until the trigger time, run a full pass, repeat.
pub async fn digest_loop(dispatcher: Arc<Dispatcher>) {
    loop {
        let now = Utc::now();
        let next = next_fire(now, dispatcher.trigger());
        info!("scheduler: next digest pass at {next}");

        let wait = (next - now)
            .to_std()
            .unwrap_or(std::time::Duration::from_secs(1));
        tokio::time::sleep(wait).await;

        dispatcher.dispatch_all().await;
    }
}
