//! List synchronizer
//!
//! Owns the in-memory list for one feed. All mutation goes through
//! `&mut self`, driven by a single task, so the list needs no locking.

use std::collections::HashSet;
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::mpsc::error::TryRecvError;
use tracing::{debug, info, warn};

use super::{FeedRecord, FeedSpec, FeedUpdate, FeedView, MergeOutcome};
use crate::error::FeedError;
use crate::gateway::{ChangeEvent, Direction, EventKind, Gateway, Query, Row, Subscription};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LoadState {
    Loading,
    Loaded,
    Failed,
}

/// Merges a bulk fetch and pushed inserts into one ordered, deduplicated list
pub struct ListSynchronizer<T: FeedRecord> {
    gateway: Arc<dyn Gateway>,
    spec: FeedSpec,
    items: Vec<T>,
    ids: HashSet<String>,
    subscription: Option<Subscription>,
    load: LoadState,
    channel_error: Option<FeedError>,
    torn_down: bool,
}

impl<T: FeedRecord> ListSynchronizer<T> {
    pub fn new(gateway: Arc<dyn Gateway>, spec: FeedSpec) -> Self {
        Self {
            gateway,
            spec,
            items: Vec::new(),
            ids: HashSet::new(),
            subscription: None,
            load: LoadState::Loading,
            channel_error: None,
            torn_down: false,
        }
    }

    /// Subscribe to inserts, then load the most recent page
    ///
    /// The subscription is opened first so no insert falls between the fetch
    /// and the channel; rows seen by both are dropped by id. A failed
    /// subscription only marks the feed stale. Calling this again reloads the
    /// list and reopens the channel if it was lost.
    ///
    /// Returns the number of items loaded.
    pub async fn initialize(&mut self) -> Result<usize, FeedError> {
        if self.torn_down {
            return Ok(0);
        }
        self.load = LoadState::Loading;

        if self.subscription.is_none() {
            match self.gateway.subscribe(&self.spec.table, EventKind::Insert).await {
                Ok(subscription) => {
                    self.subscription = Some(subscription);
                    self.channel_error = None;
                }
                Err(e) => {
                    warn!("Live updates for {} unavailable: {}", self.spec.table, e);
                    self.channel_error = Some(FeedError::Channel(e.to_string()));
                }
            }
        }

        let query = Query::table(&self.spec.table)
            .order_by("created_at", Direction::Descending)
            .limit(self.spec.page_size);

        let rows = match self.gateway.select(&query).await {
            Ok(rows) => rows,
            Err(e) => {
                warn!("Failed to load {}: {}", self.spec.table, e);
                self.items.clear();
                self.ids.clear();
                self.load = LoadState::Failed;
                return Err(FeedError::Fetch(e));
            }
        };

        let mut items = Vec::with_capacity(rows.len());
        let mut ids = HashSet::with_capacity(rows.len());
        // Newest first from the backend; keep oldest first
        for row in rows.into_iter().rev() {
            if let Some(item) = decode::<T>(row, &self.spec.table) {
                if ids.insert(item.id().to_string()) {
                    items.push(item);
                }
            }
        }

        self.items = items;
        self.ids = ids;
        self.load = LoadState::Loaded;
        info!("Loaded {} {}", self.items.len(), self.spec.table);
        Ok(self.items.len())
    }

    /// Append a pushed item unless its id is already present
    pub fn on_remote_insert(&mut self, item: T) -> MergeOutcome {
        if self.torn_down {
            debug!("Discarding late insert {}", item.id());
            return MergeOutcome::Discarded;
        }
        if self.ids.contains(item.id()) {
            return MergeOutcome::Duplicate;
        }
        self.push(item);
        MergeOutcome::Appended
    }

    /// Append a backend-confirmed local item
    ///
    /// If its pushed echo already arrived, the existing entry keeps its
    /// position and is marked local instead.
    pub fn append_local(&mut self, mut item: T) -> MergeOutcome {
        if self.torn_down {
            debug!("Discarding late submission {}", item.id());
            return MergeOutcome::Discarded;
        }
        item.mark_local();

        if self.ids.contains(item.id()) {
            if let Some(existing) = self.items.iter_mut().find(|i| i.id() == item.id()) {
                existing.mark_local();
            }
            return MergeOutcome::Upgraded;
        }
        self.push(item);
        MergeOutcome::Appended
    }

    /// Apply one pushed event
    pub fn apply(&mut self, event: ChangeEvent) -> FeedUpdate {
        match event {
            ChangeEvent::Insert(row) => match decode::<T>(row, &self.spec.table) {
                Some(item) => FeedUpdate::Merged(self.on_remote_insert(item)),
                None => FeedUpdate::Skipped,
            },
            ChangeEvent::Update(_) | ChangeEvent::Delete(_) => FeedUpdate::Skipped,
            ChangeEvent::ChannelDropped(reason) => {
                self.mark_dropped(&reason);
                FeedUpdate::ChannelDropped(reason)
            }
        }
    }

    /// Wait for the next pushed event and apply it
    ///
    /// Returns `None` when there is no live channel or the feed was torn
    /// down. Cancel-safe.
    pub async fn next_event(&mut self) -> Option<FeedUpdate> {
        if self.torn_down {
            return None;
        }
        let event = self.subscription.as_mut()?.recv().await;
        match event {
            Some(event) => Some(self.apply(event)),
            None => {
                let reason = "channel closed".to_string();
                self.mark_dropped(&reason);
                Some(FeedUpdate::ChannelDropped(reason))
            }
        }
    }

    /// Apply every event already delivered, without waiting
    ///
    /// Returns how many items were appended.
    pub fn pump(&mut self) -> usize {
        let mut appended = 0;
        while !self.torn_down {
            let next = match self.subscription.as_mut() {
                Some(subscription) => subscription.try_recv(),
                None => break,
            };
            match next {
                Ok(event) => {
                    if self.apply(event).appended() {
                        appended += 1;
                    }
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    self.mark_dropped("channel closed");
                    break;
                }
            }
        }
        appended
    }

    /// Release the push channel; the list is frozen from here on
    pub fn teardown(&mut self) {
        if self.torn_down {
            return;
        }
        self.torn_down = true;
        if let Some(subscription) = self.subscription.take() {
            subscription.unsubscribe();
        }
        debug!("Torn down {} feed", self.spec.table);
    }

    /// Items, oldest first
    pub fn items(&self) -> &[T] {
        &self.items
    }

    pub fn view(&self) -> FeedView {
        match self.load {
            LoadState::Loading => FeedView::Loading,
            LoadState::Failed => FeedView::Failed,
            LoadState::Loaded if self.items.is_empty() => FeedView::Empty,
            LoadState::Loaded => FeedView::Ready,
        }
    }

    /// Whether live updates have stopped
    pub fn is_stale(&self) -> bool {
        self.channel_error.is_some()
    }

    pub fn channel_error(&self) -> Option<&FeedError> {
        self.channel_error.as_ref()
    }

    /// Whether `next_event` can make progress
    pub fn is_live(&self) -> bool {
        !self.torn_down && self.subscription.is_some()
    }

    pub fn is_torn_down(&self) -> bool {
        self.torn_down
    }

    pub fn contains(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn spec(&self) -> &FeedSpec {
        &self.spec
    }

    fn push(&mut self, item: T) {
        self.ids.insert(item.id().to_string());
        self.items.push(item);
    }

    fn mark_dropped(&mut self, reason: &str) {
        warn!("Live updates for {} stopped: {}", self.spec.table, reason);
        self.subscription = None;
        self.channel_error = Some(FeedError::Channel(reason.to_string()));
    }
}

impl<T: FeedRecord> Drop for ListSynchronizer<T> {
    fn drop(&mut self) {
        self.teardown();
    }
}

fn decode<T: FeedRecord>(row: Row, table: &str) -> Option<T> {
    match serde_json::from_value(Value::Object(row)) {
        Ok(item) => Some(item),
        Err(e) => {
            warn!("Skipping undecodable {} row: {}", table, e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::SubmissionHandler;
    use crate::gateway::memory::Operation;
    use crate::gateway::MemoryGateway;
    use crate::models::{tables, Item, Origin};
    use serde_json::json;

    fn row(id: &str, text: &str, created_at: &str) -> Row {
        json!({ "id": id, "text": text, "created_at": created_at })
            .as_object()
            .cloned()
            .unwrap()
    }

    fn item(id: &str, text: &str, created_at: &str) -> Item {
        serde_json::from_value(Value::Object(row(id, text, created_at))).unwrap()
    }

    fn feed(gateway: &Arc<MemoryGateway>) -> ListSynchronizer<Item> {
        ListSynchronizer::new(gateway.clone(), FeedSpec::messages(50))
    }

    fn ids(feed: &ListSynchronizer<Item>) -> Vec<&str> {
        feed.items().iter().map(|i| i.id.as_str()).collect()
    }

    #[tokio::test]
    async fn test_fetch_then_push_keeps_order() {
        let gateway = Arc::new(MemoryGateway::new());
        gateway.seed(
            tables::MESSAGES,
            vec![
                row("b", "second", "2024-05-01T10:00:02Z"),
                row("a", "first", "2024-05-01T10:00:01Z"),
            ],
        );

        let mut feed = feed(&gateway);
        assert_eq!(feed.view(), FeedView::Loading);
        assert_eq!(feed.initialize().await.unwrap(), 2);
        assert_eq!(ids(&feed), vec!["a", "b"]);

        gateway.push(tables::MESSAGES, row("c", "third", "2024-05-01T10:00:03Z"));
        let update = feed.next_event().await;
        assert_eq!(update, Some(FeedUpdate::Merged(MergeOutcome::Appended)));
        assert_eq!(ids(&feed), vec!["a", "b", "c"]);
        assert_eq!(feed.view(), FeedView::Ready);
    }

    #[tokio::test]
    async fn test_initial_fetch_is_bounded_and_ascending() {
        let gateway = Arc::new(MemoryGateway::new());
        gateway.seed(
            tables::MESSAGES,
            (1..=5).map(|n| row(&format!("m{}", n), "x", &format!("2024-05-01T10:00:0{}Z", n))),
        );

        let mut feed = ListSynchronizer::<Item>::new(gateway.clone(), FeedSpec::messages(3));
        feed.initialize().await.unwrap();

        // Most recent three, oldest first
        assert_eq!(ids(&feed), vec!["m3", "m4", "m5"]);
        assert_eq!(gateway.calls(Operation::Select), 1);
    }

    #[tokio::test]
    async fn test_remote_inserts_are_deduplicated() {
        let gateway = Arc::new(MemoryGateway::new());
        let mut feed = feed(&gateway);
        feed.initialize().await.unwrap();

        let late = [
            ("x", "2024-05-01T10:00:05Z"),
            ("y", "2024-05-01T10:00:01Z"),
            ("x", "2024-05-01T10:00:05Z"),
            ("z", "2024-05-01T10:00:03Z"),
            ("y", "2024-05-01T10:00:01Z"),
        ];
        let outcomes: Vec<_> = late
            .iter()
            .map(|(id, at)| feed.on_remote_insert(item(id, "t", at)))
            .collect();

        assert_eq!(
            outcomes,
            vec![
                MergeOutcome::Appended,
                MergeOutcome::Appended,
                MergeOutcome::Duplicate,
                MergeOutcome::Appended,
                MergeOutcome::Duplicate,
            ]
        );
        // Arrival order; inserts never reorder the list
        assert_eq!(ids(&feed), vec!["x", "y", "z"]);
    }

    #[tokio::test]
    async fn test_pushed_rows_overlapping_fetch_are_dropped() {
        let gateway = Arc::new(MemoryGateway::new());
        let mut feed = feed(&gateway);

        gateway.seed(tables::MESSAGES, vec![row("a", "first", "2024-05-01T10:00:01Z")]);
        feed.initialize().await.unwrap();
        gateway.push(tables::MESSAGES, row("b", "second", "2024-05-01T10:00:02Z"));

        // Pushed between subscribe and fetch, so also in the fetched page
        let overlap = feed.apply(ChangeEvent::Insert(row("a", "first", "2024-05-01T10:00:01Z")));
        assert_eq!(overlap, FeedUpdate::Merged(MergeOutcome::Duplicate));

        assert_eq!(feed.pump(), 1);
        assert_eq!(ids(&feed), vec!["a", "b"]);
        assert_eq!(feed.pump(), 0);
    }

    #[tokio::test]
    async fn test_zero_rows_is_empty_not_failed() {
        let gateway = Arc::new(MemoryGateway::new());
        let mut feed = feed(&gateway);

        assert_eq!(feed.initialize().await.unwrap(), 0);
        assert!(feed.is_empty());
        assert_eq!(feed.view(), FeedView::Empty);
        assert!(!feed.is_stale());
    }

    #[tokio::test]
    async fn test_fetch_failure_leaves_list_empty() {
        let gateway = Arc::new(MemoryGateway::new());
        gateway.seed(tables::MESSAGES, vec![row("a", "first", "2024-05-01T10:00:01Z")]);
        gateway.fail(Operation::Select);

        let mut feed = feed(&gateway);
        let err = feed.initialize().await.unwrap_err();
        assert!(matches!(err, FeedError::Fetch(_)));
        assert!(err.is_retryable());
        assert!(feed.is_empty());
        assert_eq!(feed.view(), FeedView::Failed);

        // User-initiated retry; channel is reused, not reopened
        gateway.recover(Operation::Select);
        assert_eq!(feed.initialize().await.unwrap(), 1);
        assert_eq!(feed.view(), FeedView::Ready);
        assert_eq!(gateway.calls(Operation::Subscribe), 1);
    }

    #[tokio::test]
    async fn test_subscribe_failure_marks_stale() {
        let gateway = Arc::new(MemoryGateway::new());
        gateway.seed(tables::MESSAGES, vec![row("a", "first", "2024-05-01T10:00:01Z")]);
        gateway.fail(Operation::Subscribe);

        let mut feed = feed(&gateway);
        assert_eq!(feed.initialize().await.unwrap(), 1);
        assert!(feed.is_stale());
        assert!(!feed.is_live());
        assert!(matches!(feed.channel_error(), Some(FeedError::Channel(_))));
        assert_eq!(feed.next_event().await, None);
    }

    #[tokio::test]
    async fn test_channel_drop_marks_stale_and_reload_resubscribes() {
        let gateway = Arc::new(MemoryGateway::new());
        let mut feed = feed(&gateway);
        feed.initialize().await.unwrap();

        gateway.drop_channels("server restart");
        assert_eq!(
            feed.next_event().await,
            Some(FeedUpdate::ChannelDropped("server restart".into()))
        );
        assert!(feed.is_stale());

        feed.initialize().await.unwrap();
        assert!(!feed.is_stale());
        assert_eq!(gateway.calls(Operation::Subscribe), 2);
    }

    #[tokio::test]
    async fn test_undecodable_push_is_skipped() {
        let gateway = Arc::new(MemoryGateway::new());
        let mut feed = feed(&gateway);
        feed.initialize().await.unwrap();

        let bad = json!({ "id": "q", "created_at": "not a date" });
        let update = feed.apply(ChangeEvent::Insert(bad.as_object().cloned().unwrap()));
        assert_eq!(update, FeedUpdate::Skipped);
        assert!(feed.is_empty());
    }

    #[tokio::test]
    async fn test_submission_appears_once_as_local() {
        let gateway = Arc::new(MemoryGateway::new());
        gateway.seed(tables::MESSAGES, vec![row("a", "first", "2020-01-01T00:00:00Z")]);
        let mut feed = feed(&gateway);
        feed.initialize().await.unwrap();

        let mut composer = SubmissionHandler::new(gateway.clone(), tables::MESSAGES);
        let outcome = composer.submit("  hello  ", &mut feed).await.unwrap();
        assert_eq!(outcome, MergeOutcome::Appended);

        let last = feed.items().last().unwrap();
        assert_eq!(last.text, "hello");
        assert_eq!(last.origin, Origin::Local);
        let id = last.id.clone();

        // The backend echoes our insert; applying it changes nothing
        assert_eq!(feed.pump(), 0);
        assert_eq!(feed.len(), 2);
        assert_eq!(ids(&feed).iter().filter(|i| **i == id).count(), 1);
        assert!(feed.items().last().unwrap().is_local());
    }

    #[tokio::test]
    async fn test_echo_before_local_append_is_upgraded() {
        let gateway = Arc::new(MemoryGateway::new());
        let mut feed = feed(&gateway);
        feed.initialize().await.unwrap();

        feed.on_remote_insert(item("x", "hello", "2024-05-01T10:00:01Z"));
        feed.on_remote_insert(item("y", "other", "2024-05-01T10:00:02Z"));
        let outcome = feed.append_local(item("x", "hello", "2024-05-01T10:00:01Z"));

        assert_eq!(outcome, MergeOutcome::Upgraded);
        assert_eq!(ids(&feed), vec!["x", "y"]);
        assert!(feed.items()[0].is_local());
        assert!(!feed.items()[1].is_local());
    }

    #[tokio::test]
    async fn test_teardown_discards_late_results() {
        let gateway = Arc::new(MemoryGateway::new());
        let mut feed = feed(&gateway);
        feed.initialize().await.unwrap();
        assert_eq!(gateway.subscriber_count(), 1);

        feed.teardown();
        assert_eq!(gateway.subscriber_count(), 0);

        gateway.push(tables::MESSAGES, row("c", "late", "2024-05-01T10:00:03Z"));
        assert_eq!(
            feed.on_remote_insert(item("c", "late", "2024-05-01T10:00:03Z")),
            MergeOutcome::Discarded
        );
        assert_eq!(
            feed.append_local(item("d", "mine", "2024-05-01T10:00:04Z")),
            MergeOutcome::Discarded
        );
        assert_eq!(feed.pump(), 0);
        assert_eq!(feed.next_event().await, None);
        assert!(feed.is_empty());
    }
}
