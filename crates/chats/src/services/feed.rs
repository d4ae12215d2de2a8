//! Incremental message feed for the open channel.
//!
//! [`MessageFeed`] is the cached, newest-first list of one channel plus the
//! watermark of the newest message merged so far. [`ChannelFeed`] owns the
//! active feed and its [`FeedSynchronizer`] task, which polls for rows newer
//! than the watermark and merges them at the head. Older pages are appended
//! at the tail by [`ChannelFeed::load_more`].

use std::cmp::Ordering;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use huddle_config::FeedConfig;
use huddle_rowstore::{views, ListQuery, Row, RowStore};
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::entities::{Channel, Member, Message};
use crate::services::directory::member_channel;
use crate::types::{ChatError, ChatResult};

const CREATED_AT: &str = "createdAt";
const POLL_OVERLAP_MS: i64 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeedSettings {
    pub poll_interval: Duration,
    pub page_size: u32,
}

impl Default for FeedSettings {
    fn default() -> Self {
        Self::from_config(&FeedConfig::default())
    }
}

impl FeedSettings {
    pub fn from_config(config: &FeedConfig) -> Self {
        Self {
            poll_interval: config.poll_interval(),
            page_size: config.page_size.max(1),
        }
    }
}

/// Cached messages of one channel, newest first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageFeed {
    channel_id: String,
    messages: Vec<Message>,
    watermark: Option<DateTime<Utc>>,
    has_older: bool,
}

impl MessageFeed {
    pub fn new(channel_id: impl Into<String>) -> Self {
        Self {
            channel_id: channel_id.into(),
            messages: Vec::new(),
            watermark: None,
            has_older: true,
        }
    }

    pub fn channel_id(&self) -> &str {
        &self.channel_id
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Newest `createdAt` merged so far.
    pub fn watermark(&self) -> Option<DateTime<Utc>> {
        self.watermark
    }

    /// False once a page came back shorter than requested.
    pub fn has_older(&self) -> bool {
        self.has_older
    }

    /// Merges polled rows. Returns how many were new.
    pub fn merge_newer(&mut self, rows: Vec<Message>) -> usize {
        let added = self.insert_all(rows);
        self.advance_watermark();
        added
    }

    /// Merges an older page at the tail. Existing entries keep their place.
    pub fn append_older(&mut self, rows: Vec<Message>) -> usize {
        let added = self.insert_all(rows);
        self.advance_watermark();
        added
    }

    fn insert_all(&mut self, rows: Vec<Message>) -> usize {
        let mut seen: HashSet<String> = self.messages.iter().map(|m| m.id.clone()).collect();
        let mut fresh: Vec<Message> = rows
            .into_iter()
            .filter(|row| row.belongs_to(&self.channel_id))
            .filter(|row| seen.insert(row.id.clone()))
            .collect();
        fresh.sort_by(Message::feed_order);

        let added = fresh.len();
        for row in fresh {
            let position = self
                .messages
                .partition_point(|existing| Message::feed_order(existing, &row) == Ordering::Less);
            self.messages.insert(position, row);
        }
        added
    }

    fn advance_watermark(&mut self) {
        if let Some(newest) = self.messages.first().map(|m| m.created_at) {
            self.watermark = Some(self.watermark.map_or(newest, |current| current.max(newest)));
        }
    }
}

pub(crate) fn decode_messages(rows: Vec<Row>) -> ChatResult<Vec<Message>> {
    rows.into_iter()
        .map(|row| serde_json::from_value(row).map_err(ChatError::from))
        .collect()
}

type SharedFeed = Arc<Mutex<Option<MessageFeed>>>;
type FeedUpdates = Arc<watch::Sender<Option<MessageFeed>>>;

/// Polls one channel for rows newer than its watermark.
#[derive(Clone)]
pub struct FeedSynchronizer {
    store: Arc<dyn RowStore>,
    feed: SharedFeed,
    updates: FeedUpdates,
    channel_id: String,
    settings: FeedSettings,
}

impl FeedSynchronizer {
    fn new(
        store: Arc<dyn RowStore>,
        feed: SharedFeed,
        updates: FeedUpdates,
        channel_id: String,
        settings: FeedSettings,
    ) -> Self {
        Self {
            store,
            feed,
            updates,
            channel_id,
            settings,
        }
    }

    /// Starts polling until `cancel` fires or the channel is closed.
    pub fn spawn(self, cancel: CancellationToken) -> PollHandle {
        let token = cancel.clone();
        let channel_id = self.channel_id.clone();
        let task = tokio::spawn(async move { self.run(token).await });
        PollHandle {
            channel_id,
            cancel,
            task: Some(task),
        }
    }

    async fn run(self, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.settings.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // the first tick completes immediately and the first page is already loaded
        ticker.tick().await;

        let mut failing = false;
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let outcome = tokio::select! {
                _ = cancel.cancelled() => break,
                outcome = self.poll_once() => outcome,
            };

            match outcome {
                Ok(added) => {
                    if failing {
                        info!(channel_id = %self.channel_id, "Message poll recovered");
                    }
                    failing = false;
                    if added > 0 {
                        debug!(channel_id = %self.channel_id, added, "Merged new messages");
                    }
                }
                Err(ChatError::StaleChannel { .. }) => break,
                Err(err) if failing => {
                    debug!(channel_id = %self.channel_id, error = %err, "Message poll failed");
                }
                Err(err) => {
                    failing = true;
                    warn!(channel_id = %self.channel_id, error = %err, "Message poll failed");
                }
            }
        }
        debug!(channel_id = %self.channel_id, "Message poll stopped");
    }

    /// One poll: fetch rows newer than the watermark and merge them.
    pub async fn poll_once(&self) -> ChatResult<usize> {
        let watermark = {
            let guard = self.feed.lock().await;
            match guard.as_ref() {
                Some(feed) if feed.channel_id() == self.channel_id => feed.watermark(),
                _ => return Err(ChatError::stale_channel(&self.channel_id)),
            }
        };

        let mut query = ListQuery::new()
            .filter("channel", self.channel_id.as_str())
            .newest_first(CREATED_AT)
            .after(watermark.map(poll_bound));
        if watermark.is_none() {
            query = query.limit(self.settings.page_size);
        }

        let page = self.store.list(views::CHANNEL_MESSAGES, &query).await?;
        let rows = decode_messages(page.nodes)?;
        self.apply(rows).await
    }

    async fn apply(&self, rows: Vec<Message>) -> ChatResult<usize> {
        let mut guard = self.feed.lock().await;
        let feed = match guard.as_mut() {
            Some(feed) if feed.channel_id() == self.channel_id => feed,
            _ => {
                debug!(channel_id = %self.channel_id, "Discarding poll response for closed channel");
                return Err(ChatError::stale_channel(&self.channel_id));
            }
        };

        let added = feed.merge_newer(rows);
        if added > 0 {
            self.updates.send_replace(Some(feed.clone()));
        }
        Ok(added)
    }
}

/// Lower bound of a poll, one millisecond below the watermark.
///
/// `after` is exclusive, so a row stored later with the same millisecond as
/// the newest merged row would otherwise never be fetched. Rows already in
/// the feed come back too and are dropped as duplicates.
pub fn poll_bound(watermark: DateTime<Utc>) -> DateTime<Utc> {
    watermark - chrono::Duration::milliseconds(POLL_OVERLAP_MS)
}

/// Running poll task. Dropping the handle cancels the task without waiting.
#[derive(Debug)]
pub struct PollHandle {
    channel_id: String,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl PollHandle {
    pub fn channel_id(&self) -> &str {
        &self.channel_id
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    /// Cancels the task and waits for it to exit.
    pub async fn stop(mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            if let Err(err) = task.await {
                if err.is_panic() {
                    warn!(channel_id = %self.channel_id, "Message poll task panicked");
                }
            }
        }
    }
}

impl Drop for PollHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Controller for the open channel: first page, polling and pagination.
pub struct ChannelFeed {
    store: Arc<dyn RowStore>,
    settings: FeedSettings,
    feed: SharedFeed,
    updates: FeedUpdates,
    poller: Option<PollHandle>,
}

impl ChannelFeed {
    pub fn new(store: Arc<dyn RowStore>, settings: FeedSettings) -> Self {
        let (updates, _) = watch::channel(None);
        Self {
            store,
            settings,
            feed: Arc::new(Mutex::new(None)),
            updates: Arc::new(updates),
            poller: None,
        }
    }

    pub fn settings(&self) -> FeedSettings {
        self.settings
    }

    /// Snapshots published after every change to the visible list.
    pub fn subscribe(&self) -> watch::Receiver<Option<MessageFeed>> {
        self.updates.subscribe()
    }

    pub async fn current(&self) -> Option<MessageFeed> {
        self.feed.lock().await.clone()
    }

    pub fn active_channel(&self) -> Option<&str> {
        self.poller.as_ref().map(PollHandle::channel_id)
    }

    pub fn is_polling(&self) -> bool {
        self.poller.as_ref().is_some_and(PollHandle::is_running)
    }

    /// Switches to `channel_id`: stops the previous poll, loads the newest
    /// page and starts polling the new channel.
    ///
    /// A failed first page leaves the channel open with an empty list; the
    /// poll task keeps trying on schedule.
    pub async fn open(&mut self, channel_id: &str) -> ChatResult<()> {
        self.stop_polling().await;
        info!(channel_id = %channel_id, "Opening channel");

        {
            let mut guard = self.feed.lock().await;
            let feed = MessageFeed::new(channel_id);
            self.updates.send_replace(Some(feed.clone()));
            *guard = Some(feed);
        }

        let first_page = self.fetch_page(channel_id, 0).await;

        let synchronizer = FeedSynchronizer::new(
            self.store.clone(),
            self.feed.clone(),
            self.updates.clone(),
            channel_id.to_string(),
            self.settings,
        );
        self.poller = Some(synchronizer.spawn(CancellationToken::new()));

        let rows = first_page?;
        let mut guard = self.feed.lock().await;
        if let Some(feed) = guard.as_mut().filter(|feed| feed.channel_id() == channel_id) {
            feed.has_older = rows.len() >= self.settings.page_size as usize;
            feed.merge_newer(rows);
            self.updates.send_replace(Some(feed.clone()));
        }
        Ok(())
    }

    /// Resolves `channel_id` for `member` and opens it.
    ///
    /// Unknown channels and channels the member does not belong to are
    /// refused before anything is fetched or polled. A failed first page is
    /// only logged since polling keeps retrying.
    pub async fn open_for(&mut self, member: &Member, channel_id: &str) -> ChatResult<Channel> {
        let channel = member_channel(self.store.as_ref(), member, channel_id).await?;
        if let Err(err) = self.open(&channel.id).await {
            warn!(channel_id = %channel.id, error = %err, "First page failed, polling continues");
        }
        Ok(channel)
    }

    /// Fetches the next older page and appends it at the tail. Returns
    /// whether older messages may remain.
    pub async fn load_more(&self) -> ChatResult<bool> {
        let mut guard = self.feed.lock().await;
        let Some(feed) = guard.as_mut() else {
            return Ok(false);
        };
        let channel_id = feed.channel_id().to_string();

        let rows = self.fetch_page(&channel_id, feed.len() as u32).await?;
        let has_older = rows.len() >= self.settings.page_size as usize;
        let added = feed.append_older(rows);
        feed.has_older = has_older;
        debug!(channel_id = %channel_id, added, has_older, "Loaded older messages");

        self.updates.send_replace(Some(feed.clone()));
        Ok(has_older)
    }

    /// Stops polling and forgets the open channel.
    pub async fn close(&mut self) {
        self.stop_polling().await;
        *self.feed.lock().await = None;
        self.updates.send_replace(None);
    }

    async fn stop_polling(&mut self) {
        if let Some(poller) = self.poller.take() {
            debug!(channel_id = %poller.channel_id(), "Stopping message poll");
            poller.stop().await;
        }
    }

    async fn fetch_page(&self, channel_id: &str, offset: u32) -> ChatResult<Vec<Message>> {
        let query = ListQuery::new()
            .filter("channel", channel_id)
            .newest_first(CREATED_AT)
            .page(offset, self.settings.page_size);
        let page = self.store.list(views::CHANNEL_MESSAGES, &query).await?;
        decode_messages(page.nodes)
    }
}
