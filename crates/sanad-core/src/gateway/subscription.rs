//! Push-notification subscriptions
//!
//! A `Subscription` is a disposable handle over a stream of row changes for
//! one table. Dropping it (or calling `unsubscribe`) releases the channel;
//! gateways with a network connection are told to leave through a oneshot.

use std::sync::Mutex;

use tokio::sync::mpsc::error::TryRecvError;
use tokio::sync::{mpsc, oneshot};
use tracing::debug;

use super::query::Row;

/// Kind of row change to subscribe to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Insert,
    Update,
    Delete,
}

impl EventKind {
    /// Name used by the realtime wire protocol
    pub fn as_str(self) -> &'static str {
        match self {
            EventKind::Insert => "INSERT",
            EventKind::Update => "UPDATE",
            EventKind::Delete => "DELETE",
        }
    }
}

/// Event delivered on a subscription
#[derive(Debug, Clone, PartialEq)]
pub enum ChangeEvent {
    Insert(Row),
    Update(Row),
    Delete(Row),
    /// The channel is gone; no further events will arrive
    ChannelDropped(String),
}

impl ChangeEvent {
    pub fn from_kind(kind: EventKind, row: Row) -> Self {
        match kind {
            EventKind::Insert => ChangeEvent::Insert(row),
            EventKind::Update => ChangeEvent::Update(row),
            EventKind::Delete => ChangeEvent::Delete(row),
        }
    }
}

/// Handle to a live push channel
pub struct Subscription {
    table: String,
    events: mpsc::UnboundedReceiver<ChangeEvent>,
    cancel: Option<oneshot::Sender<()>>,
}

impl Subscription {
    /// Wrap an event receiver; `cancel` is fired when the handle is released
    pub fn new(
        table: impl Into<String>,
        events: mpsc::UnboundedReceiver<ChangeEvent>,
        cancel: Option<oneshot::Sender<()>>,
    ) -> Self {
        Self {
            table: table.into(),
            events,
            cancel,
        }
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// Wait for the next event; `None` once the sending side is gone
    pub async fn recv(&mut self) -> Option<ChangeEvent> {
        self.events.recv().await
    }

    /// Take an already-delivered event without waiting
    pub fn try_recv(&mut self) -> Result<ChangeEvent, TryRecvError> {
        self.events.try_recv()
    }

    /// Release the channel
    pub fn unsubscribe(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            let _ = cancel.send(());
        }
        self.events.close();
        debug!("Unsubscribed from {}", self.table);
    }
}

struct Subscriber {
    table: String,
    kind: EventKind,
    tx: mpsc::UnboundedSender<ChangeEvent>,
}

/// In-process fan-out to subscribers, used by gateways that see every write
#[derive(Default)]
pub struct Broadcaster {
    subscribers: Mutex<Vec<Subscriber>>,
}

impl Broadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a subscriber for one table and event kind
    pub fn subscribe(&self, table: &str, kind: EventKind) -> Subscription {
        let (tx, rx) = mpsc::unbounded_channel();
        self.lock().push(Subscriber {
            table: table.to_string(),
            kind,
            tx,
        });
        Subscription::new(table, rx, None)
    }

    /// Deliver a change to every live subscriber; returns how many received it
    pub fn publish(&self, table: &str, kind: EventKind, row: &Row) -> usize {
        let mut subscribers = self.lock();
        subscribers.retain(|s| !s.tx.is_closed());

        subscribers
            .iter()
            .filter(|s| s.table == table && s.kind == kind)
            .filter(|s| s.tx.send(ChangeEvent::from_kind(kind, row.clone())).is_ok())
            .count()
    }

    /// Drop every channel, telling subscribers why
    pub fn drop_all(&self, reason: &str) {
        let mut subscribers = self.lock();
        for s in subscribers.drain(..) {
            let _ = s.tx.send(ChangeEvent::ChannelDropped(reason.to_string()));
        }
    }

    /// Number of subscribers whose handle is still alive
    pub fn subscriber_count(&self) -> usize {
        let mut subscribers = self.lock();
        subscribers.retain(|s| !s.tx.is_closed());
        subscribers.len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Subscriber>> {
        self.subscribers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(id: &str) -> Row {
        json!({ "id": id }).as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn test_publish_reaches_matching_subscribers() {
        let hub = Broadcaster::new();
        let mut messages = hub.subscribe("messages", EventKind::Insert);
        let mut problems = hub.subscribe("problems", EventKind::Insert);

        assert_eq!(hub.publish("messages", EventKind::Insert, &row("m1")), 1);
        assert_eq!(hub.publish("messages", EventKind::Delete, &row("m1")), 0);

        assert_eq!(messages.recv().await, Some(ChangeEvent::Insert(row("m1"))));
        assert!(problems.try_recv().is_err());
    }

    #[test]
    fn test_dropped_handle_is_pruned() {
        let hub = Broadcaster::new();
        let sub = hub.subscribe("messages", EventKind::Insert);
        assert_eq!(hub.subscriber_count(), 1);

        sub.unsubscribe();
        assert_eq!(hub.subscriber_count(), 0);
        assert_eq!(hub.publish("messages", EventKind::Insert, &row("m1")), 0);
    }

    #[tokio::test]
    async fn test_drop_all_notifies() {
        let hub = Broadcaster::new();
        let mut sub = hub.subscribe("messages", EventKind::Insert);

        hub.drop_all("server restart");

        assert_eq!(
            sub.recv().await,
            Some(ChangeEvent::ChannelDropped("server restart".into()))
        );
        assert_eq!(sub.recv().await, None);
    }

    #[tokio::test]
    async fn test_cancel_fires_on_drop() {
        let (_tx, rx) = mpsc::unbounded_channel();
        let (cancel_tx, cancel_rx) = oneshot::channel();
        let sub = Subscription::new("messages", rx, Some(cancel_tx));

        drop(sub);
        assert!(cancel_rx.await.is_ok());
    }
}
