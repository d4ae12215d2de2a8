//! Feed behaviour against the in-memory store.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use huddle_chats::{
    poll_bound, ChannelFeed, ChatError, Composer, FeedSettings, Member, MessageFeed,
};
use huddle_rowstore::{views, CallKind, MemoryStore, Row, StoreCall};
use serde_json::json;

const POLL: Duration = Duration::from_secs(2);

struct TestContext {
    store: MemoryStore,
    feed: ChannelFeed,
}

impl TestContext {
    async fn new() -> Self {
        let store = MemoryStore::new();
        store.alias(views::CHANNEL_MESSAGES, "messages").await;
        store.alias(views::MESSAGES_DEFAULT, "messages").await;
        store
            .seed(
                views::CHANNEL_DEFAULT,
                vec![
                    json!({"id": "c1", "name": "general", "type": "channel", "member1": ["m1"]}),
                    json!({"id": "dm-m2-m3", "name": "", "type": "private", "member1": ["m2", "m3"]}),
                ],
            )
            .await;

        let settings = FeedSettings {
            poll_interval: POLL,
            page_size: 10,
        };
        let feed = ChannelFeed::new(Arc::new(store.clone()), settings);
        Self { store, feed }
    }

    async fn seed(&self, channel: &str, count: u32, start_second: u32) {
        let rows: Vec<Row> = (0..count)
            .map(|n| message_row(&format!("{channel}-{:03}", start_second + n), channel, start_second + n))
            .collect();
        self.store.seed(views::CHANNEL_MESSAGES, rows).await;
    }

    async fn snapshot(&self) -> MessageFeed {
        self.feed.current().await.expect("a channel is open")
    }

    /// Lets the poll task run one more tick.
    async fn next_tick(&self) {
        tokio::time::sleep(POLL + Duration::from_millis(50)).await;
    }
}

fn message_row(id: &str, channel: &str, second: u32) -> Row {
    json!({
        "id": id,
        "message": format!("text {id}"),
        "from": [{"id": "m1", "displayField": "ada"}],
        "channel": [channel],
        "createdAt": format!(
            "2021-01-01T{:02}:{:02}:{:02}Z",
            second / 3600,
            (second / 60) % 60,
            second % 60
        ),
    })
}

fn assert_descending_unique(feed: &MessageFeed) {
    let messages = feed.messages();
    for pair in messages.windows(2) {
        assert!(
            (pair[0].created_at, &pair[0].id) > (pair[1].created_at, &pair[1].id),
            "{} must come before {}",
            pair[0].id,
            pair[1].id
        );
    }
    let ids: HashSet<_> = messages.iter().map(|m| &m.id).collect();
    assert_eq!(ids.len(), messages.len());
}

#[tokio::test(start_paused = true)]
async fn open_loads_the_newest_page() {
    let mut ctx = TestContext::new().await;
    ctx.seed("c1", 25, 100).await;
    ctx.seed("c2", 3, 500).await;

    ctx.feed.open("c1").await.unwrap();
    let feed = ctx.snapshot().await;

    assert_eq!(feed.channel_id(), "c1");
    assert_eq!(feed.len(), 10);
    assert_eq!(feed.messages()[0].id, "c1-124");
    assert_eq!(feed.watermark(), Some(feed.messages()[0].created_at));
    assert!(feed.has_older());
    assert!(ctx.feed.is_polling());
    assert_descending_unique(&feed);
}

#[tokio::test(start_paused = true)]
async fn load_more_appends_older_pages_after_existing_entries() {
    let mut ctx = TestContext::new().await;
    ctx.seed("c1", 25, 100).await;
    ctx.feed.open("c1").await.unwrap();
    let first_page: Vec<String> = ctx
        .snapshot()
        .await
        .messages()
        .iter()
        .map(|m| m.id.clone())
        .collect();

    assert!(ctx.feed.load_more().await.unwrap());
    let feed = ctx.snapshot().await;
    assert_eq!(feed.len(), 20);
    let head: Vec<_> = feed.messages()[..10].iter().map(|m| m.id.clone()).collect();
    assert_eq!(head, first_page);

    assert!(!ctx.feed.load_more().await.unwrap());
    let feed = ctx.snapshot().await;
    assert_eq!(feed.len(), 25);
    assert!(!feed.has_older());
    assert_descending_unique(&feed);

    let offsets: Vec<_> = ctx
        .store
        .calls_of(CallKind::List)
        .await
        .into_iter()
        .filter_map(|call| match call {
            StoreCall::List { query, .. } => Some((query.offset, query.limit)),
            _ => None,
        })
        .collect();
    assert_eq!(
        offsets,
        vec![(Some(0), Some(10)), (Some(10), Some(10)), (Some(20), Some(10))]
    );
}

#[tokio::test(start_paused = true)]
async fn poll_merges_new_messages_at_the_head() {
    let mut ctx = TestContext::new().await;
    ctx.seed("c1", 5, 100).await;
    ctx.feed.open("c1").await.unwrap();
    let watermark = ctx.snapshot().await.watermark();
    let mut updates = ctx.feed.subscribe();
    updates.borrow_and_update();

    ctx.seed("c1", 2, 200).await;
    ctx.seed("c2", 1, 300).await;
    ctx.next_tick().await;

    assert!(updates.has_changed().unwrap());
    let feed = ctx.snapshot().await;
    assert_eq!(feed.len(), 7);
    assert_eq!(feed.messages()[0].id, "c1-201");
    assert!(feed.watermark() > watermark);
    assert_descending_unique(&feed);

    let polls = ctx.store.calls_of(CallKind::List).await;
    match polls.last() {
        Some(StoreCall::List { view, query }) => {
            assert_eq!(view, views::CHANNEL_MESSAGES);
            assert_eq!(query.after, watermark.map(poll_bound));
            assert_eq!(query.filters.get("channel").map(String::as_str), Some("c1"));
        }
        other => panic!("expected a poll, got {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn quiet_polls_publish_nothing() {
    let mut ctx = TestContext::new().await;
    ctx.seed("c1", 3, 100).await;
    ctx.feed.open("c1").await.unwrap();
    let mut updates = ctx.feed.subscribe();
    updates.borrow_and_update();

    ctx.next_tick().await;
    ctx.next_tick().await;

    assert!(!updates.has_changed().unwrap());
    assert_eq!(ctx.store.calls_of(CallKind::List).await.len(), 3);
}

#[tokio::test(start_paused = true)]
async fn failed_poll_keeps_state_and_retries_on_schedule() {
    let mut ctx = TestContext::new().await;
    ctx.seed("c1", 3, 100).await;
    ctx.feed.open("c1").await.unwrap();
    let before = ctx.snapshot().await;

    ctx.store.fail_next(CallKind::List, 503).await;
    ctx.seed("c1", 1, 200).await;
    ctx.next_tick().await;
    assert_eq!(ctx.snapshot().await, before);

    ctx.next_tick().await;
    let after = ctx.snapshot().await;
    assert_eq!(after.len(), 4);
    assert_eq!(after.messages()[0].id, "c1-200");
}

#[tokio::test(start_paused = true)]
async fn switching_channels_never_leaks_old_rows() {
    let mut ctx = TestContext::new().await;
    ctx.seed("c1", 3, 100).await;
    ctx.seed("c2", 3, 150).await;
    ctx.feed.open("c1").await.unwrap();

    // the next c1 poll hangs in the store while the user switches away
    ctx.store.set_latency(CallKind::List, Duration::from_secs(1)).await;
    ctx.seed("c1", 1, 400).await;
    tokio::time::sleep(POLL + Duration::from_millis(100)).await;

    let mut updates = ctx.feed.subscribe();
    ctx.feed.open("c2").await.unwrap();
    ctx.next_tick().await;
    ctx.next_tick().await;

    let feed = ctx.snapshot().await;
    assert_eq!(feed.channel_id(), "c2");
    assert_eq!(feed.len(), 3);
    assert!(feed.messages().iter().all(|m| m.belongs_to("c2")));

    let latest = updates.borrow_and_update().clone().expect("snapshot published");
    assert!(latest.messages().iter().all(|m| m.belongs_to(latest.channel_id())));
}

#[tokio::test(start_paused = true)]
async fn close_stops_polling() {
    let mut ctx = TestContext::new().await;
    ctx.seed("c1", 2, 100).await;
    ctx.feed.open("c1").await.unwrap();
    ctx.feed.close().await;
    let polls = ctx.store.calls_of(CallKind::List).await.len();

    ctx.next_tick().await;
    ctx.next_tick().await;

    assert!(ctx.feed.current().await.is_none());
    assert!(ctx.feed.active_channel().is_none());
    assert_eq!(ctx.store.calls_of(CallKind::List).await.len(), polls);
}

#[tokio::test(start_paused = true)]
async fn sent_message_reaches_the_feed_through_the_poll() {
    let mut ctx = TestContext::new().await;
    ctx.seed("c1", 2, 100).await;
    ctx.feed.open("c1").await.unwrap();

    let member = Member::new("m1", "ada@example.com");
    let mut composer = Composer::new();
    composer.set_text("fresh from the composer");
    let sent = composer
        .send(&ctx.store, Some(&member), "c1")
        .await
        .unwrap()
        .expect("sendable");

    assert_eq!(ctx.store.calls_of(CallKind::Insert).await.len(), 1);
    ctx.next_tick().await;

    let feed = ctx.snapshot().await;
    assert_eq!(feed.messages()[0].id, sent.id);
    assert_eq!(feed.len(), 3);
}

#[tokio::test(start_paused = true)]
async fn poll_picks_up_rows_sharing_the_watermark_millisecond() {
    let mut ctx = TestContext::new().await;
    ctx.seed("c1", 3, 100).await;
    ctx.feed.open("c1").await.unwrap();
    let watermark = ctx.snapshot().await.watermark();

    // stored after the first page, with the newest row's timestamp
    let mut late = message_row("c1-102b", "c1", 102);
    late["message"] = json!("same millisecond");
    ctx.store.seed(views::CHANNEL_MESSAGES, vec![late]).await;
    ctx.next_tick().await;

    let feed = ctx.snapshot().await;
    assert_eq!(feed.len(), 4);
    assert_eq!(feed.messages()[0].id, "c1-102b");
    assert_eq!(feed.watermark(), watermark);
    assert_descending_unique(&feed);
}

#[tokio::test(start_paused = true)]
async fn open_for_resolves_the_channel_of_a_member() {
    let mut ctx = TestContext::new().await;
    ctx.seed("c1", 2, 100).await;
    let member = Member::new("m1", "ada@example.com");

    let channel = ctx.feed.open_for(&member, "c1").await.unwrap();

    assert_eq!(channel.title_for(Some("m1")), "#general");
    assert_eq!(ctx.feed.active_channel(), Some("c1"));
    assert_eq!(ctx.snapshot().await.len(), 2);
    assert_eq!(ctx.store.calls_of(CallKind::Get).await.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn open_for_refuses_unknown_and_foreign_channels() {
    let mut ctx = TestContext::new().await;
    ctx.seed("dm-m2-m3", 2, 100).await;
    let member = Member::new("m1", "ada@example.com");

    let unknown = ctx.feed.open_for(&member, "missing").await;
    assert!(matches!(unknown, Err(ChatError::ChannelNotFound { .. })));

    let foreign = ctx.feed.open_for(&member, "dm-m2-m3").await;
    assert!(matches!(foreign, Err(ChatError::NotMember { .. })));

    ctx.next_tick().await;
    assert!(ctx.feed.current().await.is_none());
    assert!(!ctx.feed.is_polling());
    assert!(ctx.store.calls_of(CallKind::List).await.is_empty());
}
