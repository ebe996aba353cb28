//! Mention poller.
//!
//! Polls the notification feed on a fixed interval, picks out mentions and
//! replies newer than the watermark, and hands each one to the mention
//! handler exactly once. States: Stopped → LoggedIn → Polling → Stopped.

use super::types::{Identity, Mention, Notification};
use super::{BlueskyError, NotificationFeed};
use crate::bridge::HandlerError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

/// Receives each new mention once
#[async_trait]
pub trait MentionHandler: Send + Sync {
    async fn handle_mention(&self, mention: Mention) -> Result<(), HandlerError>;
}

/// Notification fetch failed; the cycle is skipped and the next tick proceeds
#[derive(Debug, Error)]
pub enum FeedError {
    #[error("notification feed rate limited")]
    RateLimited,
    #[error("notification feed unavailable: {0}")]
    Unavailable(#[source] BlueskyError),
}

impl From<BlueskyError> for FeedError {
    fn from(e: BlueskyError) -> Self {
        if e.is_rate_limited() {
            FeedError::RateLimited
        } else {
            FeedError::Unavailable(e)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PollerState {
    Stopped,
    LoggedIn,
    Polling,
}

impl PollerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Stopped => "stopped",
            Self::LoggedIn => "logged_in",
            Self::Polling => "polling",
        }
    }
}

/// Poller state visible to the dashboard
#[derive(Debug, Clone, Serialize)]
pub struct PollerStatus {
    pub state: PollerState,
    pub handle: Option<String>,
    pub watermark: Option<DateTime<Utc>>,
    pub last_poll: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub mentions_dispatched: u64,
}

impl Default for PollerStatus {
    fn default() -> Self {
        Self {
            state: PollerState::Stopped,
            handle: None,
            watermark: None,
            last_poll: None,
            last_error: None,
            mentions_dispatched: 0,
        }
    }
}

pub type SharedPollerStatus = Arc<RwLock<PollerStatus>>;

#[derive(Debug, Clone, Copy)]
pub struct PollerConfig {
    pub interval: Duration,
    pub notification_limit: u32,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(15_000),
            notification_limit: 50,
        }
    }
}

/// Watermark plus the identities dispatched since it was last advanced.
///
/// Identities at or before the watermark can never pass the `indexedAt`
/// filter again, so they are evicted whenever the watermark moves.
#[derive(Debug)]
pub struct MentionCursor {
    watermark: DateTime<Utc>,
    processed: HashMap<String, DateTime<Utc>>,
}

impl MentionCursor {
    pub fn new(watermark: DateTime<Utc>) -> Self {
        Self {
            watermark,
            processed: HashMap::new(),
        }
    }

    pub fn watermark(&self) -> DateTime<Utc> {
        self.watermark
    }

    pub fn is_processed(&self, uri: &str) -> bool {
        self.processed.contains_key(uri)
    }

    pub fn mark_processed(&mut self, uri: &str, indexed_at: DateTime<Utc>) {
        self.processed.insert(uri.to_string(), indexed_at);
    }

    #[cfg(test)]
    pub fn processed_len(&self) -> usize {
        self.processed.len()
    }

    /// Move the watermark forward; never backwards
    pub fn advance(&mut self, to: DateTime<Utc>) {
        if to <= self.watermark {
            return;
        }
        self.watermark = to;
        let watermark = self.watermark;
        self.processed.retain(|_, at| *at > watermark);
    }
}

/// Outcome of one poll cycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollSummary {
    pub fetched: usize,
    pub dispatched: usize,
    pub watermark: DateTime<Utc>,
}

pub struct MentionPoller {
    feed: Arc<dyn NotificationFeed>,
    handler: Arc<dyn MentionHandler>,
    config: PollerConfig,
    identity: Option<Identity>,
    cursor: MentionCursor,
    status: SharedPollerStatus,
}

impl MentionPoller {
    pub fn new(
        feed: Arc<dyn NotificationFeed>,
        handler: Arc<dyn MentionHandler>,
        config: PollerConfig,
    ) -> Self {
        Self {
            feed,
            handler,
            config,
            identity: None,
            cursor: MentionCursor::new(Utc::now()),
            status: Arc::new(RwLock::new(PollerStatus::default())),
        }
    }

    /// Use an externally owned status cell (shared with the dashboard)
    pub fn with_status(mut self, status: SharedPollerStatus) -> Self {
        self.status = status;
        self
    }

    #[cfg(test)]
    pub fn status(&self) -> SharedPollerStatus {
        self.status.clone()
    }

    #[cfg(test)]
    pub fn watermark(&self) -> DateTime<Utc> {
        self.cursor.watermark()
    }

    /// Authenticate and reset the watermark to now, so that only mentions
    /// arriving after login are answered
    pub async fn login(&mut self) -> Result<Identity, BlueskyError> {
        let identity = self.feed.login().await?;
        self.cursor = MentionCursor::new(Utc::now());
        self.identity = Some(identity.clone());

        let mut status = self.status.write();
        status.state = PollerState::LoggedIn;
        status.handle = Some(identity.handle.clone());
        status.watermark = Some(self.cursor.watermark());
        status.last_error = None;
        Ok(identity)
    }

    /// Run one poll cycle
    pub async fn poll_once(&mut self) -> Result<PollSummary, FeedError> {
        let notifications = match self.feed.list_notifications(self.config.notification_limit).await {
            Ok(n) => n,
            Err(e) => {
                let err = FeedError::from(e);
                let mut status = self.status.write();
                status.last_poll = Some(Utc::now());
                status.last_error = Some(err.to_string());
                return Err(err);
            }
        };

        let own_did = self.identity.as_ref().map(|i| i.did.clone());
        let watermark = self.cursor.watermark();
        let mut newest = watermark;
        let mut dispatched = 0;

        for notification in &notifications {
            let Some(indexed_at) = notification.indexed_at() else {
                log::debug!(
                    "Poller: Skipping {} with unparseable indexedAt {:?}",
                    notification.uri,
                    notification.indexed_at
                );
                continue;
            };
            if indexed_at <= watermark {
                continue;
            }
            if indexed_at > newest {
                newest = indexed_at;
            }

            if self.cursor.is_processed(&notification.uri) {
                continue;
            }
            if !is_relevant(notification, own_did.as_deref()) {
                continue;
            }

            self.cursor.mark_processed(&notification.uri, indexed_at);
            dispatched += 1;

            let mention = Mention::from_notification(notification, indexed_at);
            log::info!(
                "Poller: New {} from @{}: {}",
                notification.reason,
                mention.author_handle,
                mention.uri
            );

            if let Err(e) = self.handler.handle_mention(mention).await {
                log::error!("Poller: Handler failed for {}: {}", notification.uri, e);
            }
        }

        self.cursor.advance(newest);

        let summary = PollSummary {
            fetched: notifications.len(),
            dispatched,
            watermark: self.cursor.watermark(),
        };

        let mut status = self.status.write();
        status.watermark = Some(summary.watermark);
        status.last_poll = Some(Utc::now());
        status.last_error = None;
        status.mentions_dispatched += dispatched as u64;

        Ok(summary)
    }

    /// Log in, then poll on the configured interval until stopped.
    ///
    /// Login failure is returned to the caller and nothing is spawned.
    pub async fn start(mut self) -> Result<PollerHandle, BlueskyError> {
        let identity = self.login().await?;
        log::info!(
            "Poller: Watching notifications for @{} every {:?}",
            identity.handle,
            self.config.interval
        );

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let status = self.status.clone();
        let join = tokio::spawn(self.run(shutdown_rx));

        Ok(PollerHandle {
            shutdown_tx: Some(shutdown_tx),
            join,
            status,
        })
    }

    async fn run(mut self, mut shutdown_rx: oneshot::Receiver<()>) {
        let period = self.config.interval.max(Duration::from_millis(1));
        let mut ticker = interval_at(Instant::now() + period, period);
        // a cycle that outlasts the interval swallows the ticks it missed
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        self.status.write().state = PollerState::Polling;

        loop {
            tokio::select! {
                _ = &mut shutdown_rx => {
                    log::info!("Poller: Received shutdown signal");
                    break;
                }
                _ = ticker.tick() => {
                    match self.poll_once().await {
                        Ok(summary) if summary.dispatched > 0 => {
                            log::info!(
                                "Poller: Dispatched {} of {} notifications, watermark {}",
                                summary.dispatched,
                                summary.fetched,
                                summary.watermark
                            );
                        }
                        Ok(summary) => {
                            log::debug!("Poller: No new mentions in {} notifications", summary.fetched);
                        }
                        Err(FeedError::RateLimited) => {
                            log::warn!("Poller: Rate limited, waiting for next tick");
                        }
                        Err(e) => {
                            log::warn!("Poller: {}", e);
                        }
                    }
                }
            }
        }

        self.status.write().state = PollerState::Stopped;
    }
}

/// Mentions and replies, or any post whose facets name this account
fn is_relevant(notification: &Notification, own_did: Option<&str>) -> bool {
    matches!(notification.reason.as_str(), "mention" | "reply")
        || own_did.is_some_and(|did| notification.mentions_did(did))
}

/// Running poller task
pub struct PollerHandle {
    shutdown_tx: Option<oneshot::Sender<()>>,
    join: JoinHandle<()>,
    status: SharedPollerStatus,
}

impl PollerHandle {
    #[cfg(test)]
    pub fn status(&self) -> SharedPollerStatus {
        self.status.clone()
    }

    /// Stop scheduling ticks and wait for the cycle in flight to finish
    pub async fn stop(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Err(e) = self.join.await {
            log::error!("Poller: Task ended abnormally: {}", e);
            self.status.write().state = PollerState::Stopped;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bluesky::types::{ByteSlice, Facet, FacetFeature, NotificationAuthor, PostRecord};
    use parking_lot::Mutex;
    use std::collections::{HashSet, VecDeque};

    const BOT_DID: &str = "did:plc:bot";

    #[derive(Default)]
    struct MockFeed {
        pages: Mutex<VecDeque<Result<Vec<Notification>, BlueskyError>>>,
        reject_login: bool,
    }

    impl MockFeed {
        fn with_pages(pages: Vec<Result<Vec<Notification>, BlueskyError>>) -> Self {
            Self {
                pages: Mutex::new(pages.into()),
                reject_login: false,
            }
        }
    }

    #[async_trait]
    impl NotificationFeed for MockFeed {
        async fn login(&self) -> Result<Identity, BlueskyError> {
            if self.reject_login {
                return Err(BlueskyError::Xrpc {
                    status: 401,
                    error: "AuthenticationRequired".to_string(),
                    message: "Invalid identifier or password".to_string(),
                });
            }
            Ok(Identity {
                did: BOT_DID.to_string(),
                handle: "bot.example.com".to_string(),
            })
        }

        async fn list_notifications(&self, _limit: u32) -> Result<Vec<Notification>, BlueskyError> {
            self.pages.lock().pop_front().unwrap_or_else(|| Ok(Vec::new()))
        }
    }

    #[derive(Default)]
    struct RecordingHandler {
        seen: Mutex<Vec<Mention>>,
        fail_for: HashSet<String>,
    }

    #[async_trait]
    impl MentionHandler for RecordingHandler {
        async fn handle_mention(&self, mention: Mention) -> Result<(), HandlerError> {
            let fail = self.fail_for.contains(&mention.uri);
            self.seen.lock().push(mention);
            if fail {
                return Err(HandlerError::Plan(crate::threading::PlanError::EmptyAnswer));
            }
            Ok(())
        }
    }

    fn notification(uri: &str, reason: &str, at: DateTime<Utc>) -> Notification {
        Notification {
            uri: uri.to_string(),
            cid: format!("cid-{}", uri),
            author: NotificationAuthor {
                did: "did:plc:alice".to_string(),
                handle: "alice.test".to_string(),
            },
            reason: reason.to_string(),
            record: PostRecord {
                text: "@bot.example.com hello?".to_string(),
                facets: Vec::new(),
            },
            indexed_at: at.to_rfc3339(),
        }
    }

    async fn logged_in(
        pages: Vec<Result<Vec<Notification>, BlueskyError>>,
        handler: Arc<RecordingHandler>,
    ) -> MentionPoller {
        let mut poller = MentionPoller::new(
            Arc::new(MockFeed::with_pages(pages)),
            handler,
            PollerConfig::default(),
        );
        poller.login().await.unwrap();
        poller
    }

    fn after(poller: &MentionPoller, secs: i64) -> DateTime<Utc> {
        poller.watermark() + chrono::Duration::seconds(secs)
    }

    #[tokio::test]
    async fn test_login_sets_watermark_and_state() {
        let before = Utc::now();
        let poller = logged_in(Vec::new(), Arc::new(RecordingHandler::default())).await;
        assert!(poller.watermark() >= before);

        let status = poller.status();
        let status = status.read();
        assert_eq!(status.state, PollerState::LoggedIn);
        assert_eq!(status.handle.as_deref(), Some("bot.example.com"));
    }

    #[tokio::test]
    async fn test_dispatches_new_mentions_and_advances_watermark() {
        let handler = Arc::new(RecordingHandler::default());
        let mut poller = logged_in(Vec::new(), handler.clone()).await;
        let t1 = after(&poller, 1);
        let t2 = after(&poller, 2);
        let old = after(&poller, -60);

        poller.feed = Arc::new(MockFeed::with_pages(vec![Ok(vec![
            notification("at://a/post/2", "reply", t2),
            notification("at://a/post/1", "mention", t1),
            notification("at://a/post/0", "mention", old),
        ])]));

        let summary = poller.poll_once().await.unwrap();
        assert_eq!(summary.fetched, 3);
        assert_eq!(summary.dispatched, 2);
        assert_eq!(summary.watermark, t2);

        let seen = handler.seen.lock();
        // feed order is kept
        assert_eq!(seen[0].uri, "at://a/post/2");
        assert_eq!(seen[1].uri, "at://a/post/1");
        assert_eq!(seen[1].id, "1");
        assert_eq!(seen[1].created_at, t1);
    }

    #[tokio::test]
    async fn test_no_duplicate_dispatch_across_cycles() {
        let handler = Arc::new(RecordingHandler::default());
        let mut poller = logged_in(Vec::new(), handler.clone()).await;
        let t1 = after(&poller, 1);
        let n = notification("at://a/post/1", "mention", t1);

        poller.feed = Arc::new(MockFeed::with_pages(vec![
            Ok(vec![n.clone()]),
            Ok(vec![n.clone()]),
            Ok(vec![n]),
        ]));

        for _ in 0..3 {
            poller.poll_once().await.unwrap();
        }
        assert_eq!(handler.seen.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_same_indexed_at_both_dispatched() {
        let handler = Arc::new(RecordingHandler::default());
        let mut poller = logged_in(Vec::new(), handler.clone()).await;
        let t = after(&poller, 5);

        poller.feed = Arc::new(MockFeed::with_pages(vec![Ok(vec![
            notification("at://a/post/x", "mention", t),
            notification("at://a/post/y", "mention", t),
        ])]));

        let summary = poller.poll_once().await.unwrap();
        assert_eq!(summary.dispatched, 2);
        assert_eq!(poller.watermark(), t);
        assert_eq!(handler.seen.lock().len(), 2);
    }

    #[tokio::test]
    async fn test_irrelevant_notifications_still_advance_watermark() {
        let handler = Arc::new(RecordingHandler::default());
        let mut poller = logged_in(Vec::new(), handler.clone()).await;
        let t1 = after(&poller, 1);
        let t9 = after(&poller, 9);

        poller.feed = Arc::new(MockFeed::with_pages(vec![Ok(vec![
            notification("at://a/like/1", "like", t9),
            notification("at://a/post/1", "mention", t1),
        ])]));

        let summary = poller.poll_once().await.unwrap();
        assert_eq!(summary.dispatched, 1);
        assert_eq!(poller.watermark(), t9);
    }

    #[tokio::test]
    async fn test_facet_mention_of_own_did_is_relevant() {
        let handler = Arc::new(RecordingHandler::default());
        let mut poller = logged_in(Vec::new(), handler.clone()).await;

        let mut quote = notification("at://a/post/q", "quote", after(&poller, 1));
        quote.record.facets.push(Facet {
            index: ByteSlice { byte_start: 0, byte_end: 16 },
            features: vec![FacetFeature::Mention { did: BOT_DID.to_string() }],
        });
        let other_quote = notification("at://a/post/r", "quote", after(&poller, 2));

        poller.feed = Arc::new(MockFeed::with_pages(vec![Ok(vec![quote, other_quote])]));
        poller.poll_once().await.unwrap();

        let seen = handler.seen.lock();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].uri, "at://a/post/q");
    }

    #[tokio::test]
    async fn test_handler_error_does_not_abort_cycle() {
        let handler = Arc::new(RecordingHandler {
            fail_for: HashSet::from(["at://a/post/1".to_string()]),
            ..Default::default()
        });
        let mut poller = logged_in(Vec::new(), handler.clone()).await;
        let t1 = after(&poller, 1);
        let t2 = after(&poller, 2);
        let failing = notification("at://a/post/1", "mention", t1);

        poller.feed = Arc::new(MockFeed::with_pages(vec![
            Ok(vec![failing.clone(), notification("at://a/post/2", "mention", t2)]),
            Ok(vec![failing]),
        ]));

        let summary = poller.poll_once().await.unwrap();
        assert_eq!(summary.dispatched, 2);
        assert_eq!(summary.watermark, t2);

        // failed mention is not redelivered
        let summary = poller.poll_once().await.unwrap();
        assert_eq!(summary.dispatched, 0);
        assert_eq!(handler.seen.lock().len(), 2);
    }

    #[tokio::test]
    async fn test_feed_error_keeps_watermark() {
        let handler = Arc::new(RecordingHandler::default());
        let mut poller = logged_in(Vec::new(), handler.clone()).await;
        let before = poller.watermark();
        let t1 = after(&poller, 1);

        poller.feed = Arc::new(MockFeed::with_pages(vec![
            Err(BlueskyError::RateLimited),
            Err(BlueskyError::Xrpc {
                status: 502,
                error: "Bad Gateway".to_string(),
                message: String::new(),
            }),
            Ok(vec![notification("at://a/post/1", "mention", t1)]),
        ]));

        assert!(matches!(poller.poll_once().await, Err(FeedError::RateLimited)));
        assert!(matches!(poller.poll_once().await, Err(FeedError::Unavailable(_))));
        assert_eq!(poller.watermark(), before);
        assert!(poller.status().read().last_error.is_some());

        let summary = poller.poll_once().await.unwrap();
        assert_eq!(summary.dispatched, 1);
        assert!(poller.status().read().last_error.is_none());
    }

    #[tokio::test]
    async fn test_unparseable_indexed_at_is_skipped() {
        let handler = Arc::new(RecordingHandler::default());
        let mut poller = logged_in(Vec::new(), handler.clone()).await;
        let before = poller.watermark();

        let mut broken = notification("at://a/post/1", "mention", after(&poller, 1));
        broken.indexed_at = "yesterday".to_string();
        poller.feed = Arc::new(MockFeed::with_pages(vec![Ok(vec![broken])]));

        let summary = poller.poll_once().await.unwrap();
        assert_eq!(summary.dispatched, 0);
        assert_eq!(poller.watermark(), before);
    }

    #[tokio::test]
    async fn test_watermark_is_monotonic() {
        let handler = Arc::new(RecordingHandler::default());
        let mut poller = logged_in(Vec::new(), handler).await;
        let offsets = [5, 3, 8, 1, 8, 2];

        let pages = offsets
            .iter()
            .enumerate()
            .map(|(i, secs)| {
                Ok(vec![notification(
                    &format!("at://a/post/{}", i),
                    "mention",
                    after(&poller, *secs),
                )])
            })
            .collect();
        poller.feed = Arc::new(MockFeed::with_pages(pages));

        let base = poller.watermark();
        let mut previous = base;
        for _ in offsets {
            poller.poll_once().await.unwrap();
            assert!(poller.watermark() >= previous);
            previous = poller.watermark();
        }
        assert_eq!(previous, base + chrono::Duration::seconds(8));
    }

    #[test]
    fn test_cursor_evicts_entries_behind_watermark() {
        let base = Utc::now();
        let mut cursor = MentionCursor::new(base);
        cursor.mark_processed("a", base + chrono::Duration::seconds(1));
        cursor.mark_processed("b", base + chrono::Duration::seconds(3));
        assert_eq!(cursor.processed_len(), 2);

        cursor.advance(base + chrono::Duration::seconds(2));
        assert!(!cursor.is_processed("a"));
        assert!(cursor.is_processed("b"));

        // never moves backwards
        cursor.advance(base);
        assert_eq!(cursor.watermark(), base + chrono::Duration::seconds(2));
    }

    #[tokio::test]
    async fn test_start_fails_when_login_rejected() {
        let feed = MockFeed {
            reject_login: true,
            ..Default::default()
        };
        let poller = MentionPoller::new(
            Arc::new(feed),
            Arc::new(RecordingHandler::default()),
            PollerConfig::default(),
        );
        let status = poller.status();

        assert!(poller.start().await.is_err());
        assert_eq!(status.read().state, PollerState::Stopped);
    }

    #[tokio::test]
    async fn test_start_polls_and_stops() {
        let handler = Arc::new(RecordingHandler::default());
        let future = Utc::now() + chrono::Duration::seconds(60);
        let feed = MockFeed::with_pages(vec![Ok(vec![notification(
            "at://a/post/1",
            "mention",
            future,
        )])]);
        let poller = MentionPoller::new(
            Arc::new(feed),
            handler.clone(),
            PollerConfig {
                interval: Duration::from_millis(10),
                notification_limit: 50,
            },
        );

        let handle = poller.start().await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(handle.status().read().state, PollerState::Polling);
        assert_eq!(handler.seen.lock().len(), 1);

        let status = handle.status();
        handle.stop().await;
        assert_eq!(status.read().state, PollerState::Stopped);
        assert_eq!(status.read().watermark, Some(future));
    }
}
