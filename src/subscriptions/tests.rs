use super::dispatcher::{cutoff, render_digest, DispatchReport, NO_RESULTS};
use super::scheduler::next_fire;
use super::*;
use crate::rate_limit::RateLimiter;
use crate::testing::{paper, private_message, stream_message, MockChannel, MockSource, BOT_EMAIL};
use chrono::{DateTime, Duration, NaiveTime, TimeZone, Utc};
use herald_core::{
    conversation::{self, ConversationKey},
    message::{DeliveryKind, IncomingMessage, ReplyTarget},
};
use herald_memory::Subscription;

const ADMIN: i64 = 99;

struct Fixture {
    bot: SubscriptionBot,
    registry: Arc<SubscriptionRegistry>,
    dispatcher: Arc<Dispatcher>,
    channel: Arc<MockChannel>,
    source: Arc<MockSource>,
    limiter: Arc<RateLimiter>,
    snapshot: PathBuf,
    _dir: tempfile::TempDir,
}

fn seven_am() -> NaiveTime {
    NaiveTime::from_hms_opt(7, 0, 0).unwrap()
}

fn fixture(source: MockSource) -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let snapshot = dir.path().join("data/arxiv.json");
    let registry = Arc::new(SubscriptionRegistry::new());
    let channel = Arc::new(MockChannel::default());
    let source = Arc::new(source);
    let limiter = Arc::new(RateLimiter::new(std::time::Duration::from_millis(1)));
    let dispatcher = Arc::new(Dispatcher::new(
        registry.clone(),
        source.clone(),
        channel.clone(),
        limiter.clone(),
        10,
        seven_am(),
    ));
    let bot = SubscriptionBot::new(registry.clone(), dispatcher.clone(), snapshot.clone(), ADMIN);
    Fixture {
        bot,
        registry,
        dispatcher,
        channel,
        source,
        limiter,
        snapshot,
        _dir: dir,
    }
}

async fn send(f: &Fixture, msg: &IncomingMessage) -> Option<String> {
    let target = ReplyTarget::from_incoming(msg, BOT_EMAIL).unwrap();
    let key = conversation::resolve(msg).unwrap();
    let ctx = MessageContext {
        message: msg,
        key: &key,
        target: &target,
    };
    f.bot.handle(&ctx).await
}

/// Subscribe `topic` in the `research` stream and return the new id.
async fn subscribe(f: &Fixture, owner: i64, topic: &str, query: &str) -> String {
    let reply = send(
        f,
        &stream_message(owner, "research", topic, &format!("@**arxiv** set {query}")),
    )
    .await
    .unwrap();
    assert!(reply.starts_with("✅ Search topic added!"), "{reply}");
    f.registry
        .list()
        .into_iter()
        .find(|s| s.conversation_key == ConversationKey::stream("research", topic))
        .unwrap()
        .id
}

fn hours_ago(h: i64) -> DateTime<Utc> {
    Utc::now() - Duration::hours(h)
}

// --- grammar and routing ---

#[tokio::test]
async fn test_set_creates_subscription_for_conversation() {
    let f = fixture(MockSource::default());
    let msg = stream_message(42, "research", "ml", "@**arxiv** set cat:cs.LG AND all:GAN");
    let reply = send(&f, &msg).await.unwrap();

    let subs = f.registry.list();
    assert_eq!(subs.len(), 1);
    let sub = &subs[0];
    assert_eq!(reply, format!("✅ Search topic added!\nID: `{}`", sub.id));
    assert_eq!(sub.conversation_key.parts(), ["research", "ml"]);
    assert_eq!(sub.query, "cat:cs.LG AND all:GAN");
    assert_eq!(sub.owner_id, 42);
    assert_eq!(sub.reply_target.kind, DeliveryKind::Stream);
    assert_eq!(sub.reply_target.topic.as_deref(), Some("ml"));

    // Persisted immediately.
    let loaded = SubscriptionRegistry::load_from_file(&f.snapshot);
    assert_eq!(loaded.list(), subs);
}

#[tokio::test]
async fn test_set_keeps_quoted_query_tokens() {
    let f = fixture(MockSource::default());
    let msg = stream_message(
        42,
        "research",
        "ml",
        r#"@**arxiv** set ti:"neural network" AND cat:cs.LG"#,
    );
    send(&f, &msg).await.unwrap();
    assert_eq!(f.registry.list()[0].query, "ti:neural network AND cat:cs.LG");
}

#[tokio::test]
async fn test_duplicate_set_in_same_conversation() {
    let f = fixture(MockSource::default());
    subscribe(&f, 42, "ml", "cat:cs.LG").await;

    // Different query, different user, same topic: still a duplicate.
    let msg = stream_message(7, "research", "ml", "@**arxiv** set all:diffusion");
    assert_eq!(
        send(&f, &msg).await.unwrap(),
        "This search topic already exists."
    );
    assert_eq!(f.registry.len(), 1);
    assert_eq!(f.registry.list()[0].query, "cat:cs.LG");
}

#[tokio::test]
async fn test_private_thread_dedup_ignores_sender() {
    let f = fixture(MockSource::default());
    let first = private_message(42, &[7], "@**arxiv** set cat:cs.LG");
    assert!(send(&f, &first).await.unwrap().starts_with("✅"));

    // Same participants, other author.
    let second = private_message(7, &[42], "@**arxiv** set cat:cs.AI");
    assert_eq!(
        send(&f, &second).await.unwrap(),
        "This search topic already exists."
    );

    let sub = &f.registry.list()[0];
    assert_eq!(sub.conversation_key.parts(), ["1", "7", "42"]);
    assert_eq!(sub.reply_target.kind, DeliveryKind::Private);
    assert!(!sub.reply_target.to.contains(&BOT_EMAIL.to_string()));
}

#[tokio::test]
async fn test_list_all_on_empty_registry() {
    let f = fixture(MockSource::default());
    let msg = stream_message(42, "research", "ml", "@**arxiv** list all");
    assert_eq!(
        send(&f, &msg).await.unwrap(),
        "🔎 All search topics:\nNone."
    );
}

#[tokio::test]
async fn test_list_own_and_all() {
    let f = fixture(MockSource::default());
    let mine = subscribe(&f, 42, "ml", "cat:cs.LG").await;
    let theirs = subscribe(&f, 7, "nlp", "cat:cs.CL").await;

    let own = send(&f, &stream_message(42, "research", "x", "@**arxiv** list"))
        .await
        .unwrap();
    assert_eq!(
        own,
        format!("🔎 Your search topics:\n- [`{mine}`] (owner: 42)\n    query: `cat:cs.LG`\n")
    );

    let all = send(&f, &stream_message(42, "research", "x", "@**arxiv** list all"))
        .await
        .unwrap();
    assert!(all.starts_with("🔎 All search topics:\n"));
    assert!(all.contains(&mine));
    assert!(all.contains(&theirs));
    assert!(all.find(&mine) < all.find(&theirs));

    let none = send(&f, &stream_message(5, "research", "x", "@**arxiv** list"))
        .await
        .unwrap();
    assert_eq!(none, "🔎 Your search topics:\nNone.");
}

#[tokio::test]
async fn test_rm_by_non_owner_is_denied() {
    let f = fixture(MockSource::default());
    let id = subscribe(&f, 42, "ml", "cat:cs.LG").await;

    let msg = stream_message(7, "research", "ml", &format!("@**arxiv** rm {id}"));
    assert_eq!(
        send(&f, &msg).await.unwrap(),
        "You don't have permission to remove this topic."
    );
    assert!(f.registry.get(&id).is_some());
}

#[tokio::test]
async fn test_rm_by_owner_and_admin() {
    let f = fixture(MockSource::default());
    let a = subscribe(&f, 42, "ml", "cat:cs.LG").await;
    let b = subscribe(&f, 42, "nlp", "cat:cs.CL").await;

    let by_owner = stream_message(42, "research", "ml", &format!("@**arxiv** rm {a}"));
    assert_eq!(send(&f, &by_owner).await.unwrap(), "✅ Search topic removed!");

    let by_admin = stream_message(ADMIN, "ops", "x", &format!("@**arxiv** rm {b}"));
    assert_eq!(send(&f, &by_admin).await.unwrap(), "✅ Search topic removed!");

    assert!(f.registry.is_empty());
    assert!(SubscriptionRegistry::load_from_file(&f.snapshot).is_empty());
}

#[tokio::test]
async fn test_rm_unknown_id() {
    let f = fixture(MockSource::default());
    let msg = stream_message(42, "research", "ml", "@**arxiv** rm nope");
    assert_eq!(send(&f, &msg).await.unwrap(), "No such request ID.");
}

#[tokio::test]
async fn test_help_is_fenced_usage() {
    let f = fixture(MockSource::default());
    for text in ["@**arxiv** --help", "@**arxiv** list -h", "@**arxiv** frobnicate"] {
        let reply = send(&f, &stream_message(42, "research", "ml", text))
            .await
            .unwrap();
        assert!(reply.starts_with("```text\nA bot to manage arxiv queries."), "{text}");
        assert!(reply.contains("  @**arxiv** set <query>...\n"));
        assert!(reply.contains("  @**arxiv** list [all]\n"));
        assert!(reply.ends_with("\n```"));
    }
}

#[tokio::test]
async fn test_untokenizable_input_gets_hint() {
    let f = fixture(MockSource::default());
    let msg = stream_message(42, "research", "ml", r#"@**arxiv** set "unclosed"#);
    assert_eq!(
        send(&f, &msg).await.unwrap(),
        "Unknown or malformed command. Use `@**arxiv** --help` for usage."
    );
    assert!(f.registry.is_empty());
}

#[tokio::test]
async fn test_unaddressed_message_is_ignored() {
    let f = fixture(MockSource::default());
    let msg = stream_message(42, "research", "ml", "set cat:cs.LG");
    assert!(send(&f, &msg).await.is_none());
    assert!(f.registry.is_empty());
}

// --- force ---

#[tokio::test]
async fn test_force_unknown_id_leaves_limiter_untouched() {
    let f = fixture(MockSource::default());
    let msg = stream_message(42, "research", "ml", "@**arxiv** force deadbeef");
    assert_eq!(
        send(&f, &msg).await.unwrap(),
        "Request ID `deadbeef` not found."
    );
    assert_eq!(f.limiter.granted(), 0);
    assert_eq!(f.source.calls(), 0);
    assert!(f.channel.sent().is_empty());
}

#[tokio::test]
async fn test_force_delivers_digest_to_subscription() {
    let source = MockSource::default().with_results(
        "cat:cs.LG",
        vec![paper(2, hours_ago(1)), paper(1, hours_ago(24 * 3))],
    );
    let f = fixture(source);
    let id = subscribe(&f, 42, "ml", "cat:cs.LG").await;

    // Forced from another topic; the digest still goes to the subscription.
    let msg = stream_message(42, "research", "elsewhere", &format!("@**arxiv** force {id}"));
    assert!(send(&f, &msg).await.is_none());

    let sent = f.channel.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].text, "- [Paper 2](http://arxiv.org/abs/2405.00002v1)");
    assert_eq!(sent[0].target.topic.as_deref(), Some("ml"));
    assert_eq!(f.limiter.granted(), 1);
}

#[tokio::test]
async fn test_force_reports_query_failure() {
    let f = fixture(MockSource::default().failing_on("cat:cs.LG"));
    let id = subscribe(&f, 42, "ml", "cat:cs.LG").await;
    let msg = stream_message(42, "research", "ml", &format!("@**arxiv** force {id}"));
    let reply = send(&f, &msg).await.unwrap();
    assert!(reply.starts_with(&format!("⚠️ Update for `{id}` failed:")), "{reply}");
    assert!(f.channel.sent().is_empty());
}

// --- dispatch ---

#[tokio::test]
async fn test_dispatch_all_isolates_failures() {
    let source = MockSource::default()
        .with_results("q-a", vec![paper(1, hours_ago(2))])
        .failing_on("q-b")
        .with_results("q-c", vec![]);
    let f = fixture(source);
    subscribe(&f, 1, "a", "q-a").await;
    subscribe(&f, 2, "b", "q-b").await;
    subscribe(&f, 3, "c", "q-c").await;

    let report = f.dispatcher.dispatch_all().await;
    assert_eq!(
        report,
        DispatchReport {
            delivered: 2,
            failed: 1,
            skipped: 0
        }
    );
    assert_eq!(f.source.calls(), 3);
    assert_eq!(f.limiter.granted(), 3);

    let sent = f.channel.sent();
    assert_eq!(sent.len(), 2);
    assert_eq!(sent[0].target.topic.as_deref(), Some("a"));
    assert_eq!(sent[0].text, "- [Paper 1](http://arxiv.org/abs/2405.00001v1)");
    assert_eq!(sent[1].target.topic.as_deref(), Some("c"));
    assert_eq!(sent[1].text, NO_RESULTS);
}

#[tokio::test]
async fn test_dispatch_all_survives_delivery_failure() {
    let f = fixture(MockSource::default());
    subscribe(&f, 1, "a", "q-a").await;
    subscribe(&f, 2, "b", "q-b").await;
    let broken = f.registry.list()[0].reply_target.clone();
    f.channel.fail_deliveries_to(&broken);

    let report = f.dispatcher.dispatch_all().await;
    assert_eq!(report.delivered, 1);
    assert_eq!(report.failed, 1);
    assert_eq!(f.channel.sent_texts(), vec![NO_RESULTS]);
}

#[tokio::test]
async fn test_vanished_subscription_is_skipped() {
    let f = fixture(MockSource::default());
    let id = subscribe(&f, 1, "a", "q-a").await;
    f.registry.remove(&id);

    assert_eq!(f.dispatcher.dispatch_one(&id).await.unwrap(), None);
    assert_eq!(f.limiter.granted(), 0);
    assert_eq!(f.source.calls(), 0);
}

#[tokio::test]
async fn test_dispatch_all_on_empty_registry() {
    let f = fixture(MockSource::default());
    assert_eq!(f.dispatcher.dispatch_all().await, DispatchReport::default());
    assert!(f.channel.sent().is_empty());
}

#[test]
fn test_cutoff_is_yesterday_at_trigger() {
    let now = Utc.with_ymd_and_hms(2024, 5, 2, 10, 30, 0).unwrap();
    assert_eq!(
        cutoff(now, seven_am()),
        Utc.with_ymd_and_hms(2024, 5, 1, 7, 0, 0).unwrap()
    );

    // Before the trigger time it is still yesterday's date.
    let early = Utc.with_ymd_and_hms(2024, 3, 1, 2, 0, 0).unwrap();
    assert_eq!(
        cutoff(early, seven_am()),
        Utc.with_ymd_and_hms(2024, 2, 29, 7, 0, 0).unwrap()
    );
}

#[test]
fn test_render_digest_stops_at_first_old_result() {
    let cut = Utc.with_ymd_and_hms(2024, 5, 1, 7, 0, 0).unwrap();
    let results = vec![
        paper(3, cut + Duration::hours(5)),
        paper(2, cut + Duration::seconds(1)),
        paper(1, cut),
        // Out of order: never reached.
        paper(4, cut + Duration::hours(9)),
    ];
    let (text, kept) = render_digest(&results, cut);
    assert_eq!(kept, 2);
    assert_eq!(
        text,
        "- [Paper 3](http://arxiv.org/abs/2405.00003v1)\n- [Paper 2](http://arxiv.org/abs/2405.00002v1)"
    );
}

#[test]
fn test_render_digest_empty() {
    let cut = Utc.with_ymd_and_hms(2024, 5, 1, 7, 0, 0).unwrap();
    assert_eq!(render_digest(&[], cut), (NO_RESULTS.to_string(), 0));
    let stale = vec![paper(1, cut - Duration::days(2))];
    assert_eq!(render_digest(&stale, cut), (NO_RESULTS.to_string(), 0));
}

#[test]
fn test_next_fire() {
    let before = Utc.with_ymd_and_hms(2024, 5, 2, 6, 59, 59).unwrap();
    assert_eq!(
        next_fire(before, seven_am()),
        Utc.with_ymd_and_hms(2024, 5, 2, 7, 0, 0).unwrap()
    );

    let at = Utc.with_ymd_and_hms(2024, 5, 2, 7, 0, 0).unwrap();
    assert_eq!(
        next_fire(at, seven_am()),
        Utc.with_ymd_and_hms(2024, 5, 3, 7, 0, 0).unwrap()
    );

    let after = Utc.with_ymd_and_hms(2024, 12, 31, 23, 0, 0).unwrap();
    assert_eq!(
        next_fire(after, seven_am()),
        Utc.with_ymd_and_hms(2025, 1, 1, 7, 0, 0).unwrap()
    );
}

// --- persistence ---

#[tokio::test]
async fn test_shutdown_saves_snapshot() {
    let f = fixture(MockSource::default());
    let sub = Subscription::new(
        ConversationKey::stream("research", "ml"),
        "cat:cs.LG",
        42,
        ReplyTarget {
            kind: DeliveryKind::Stream,
            to: vec!["research".into()],
            topic: Some("ml".into()),
        },
    );
    // Added behind the router's back: only shutdown writes it.
    f.registry.add(sub.clone());
    assert!(!f.snapshot.exists());

    f.bot.shutdown().await;
    assert_eq!(
        SubscriptionRegistry::load_from_file(&f.snapshot).list(),
        vec![sub]
    );
}
