//! Realtime push channel
//!
//! Phoenix-protocol frames exchanged with the hosted backend's realtime
//! endpoint, and the task that forwards row changes to a `Subscription`.
//!
//! ## Protocol
//!
//! 1. Connect via WebSocket to `{realtime_url}/websocket?apikey=..&vsn=1.0.0`
//! 2. Join topic `realtime:public:{table}` with a `postgres_changes` filter
//! 3. Receive `postgres_changes` frames carrying the new record
//! 4. Send a heartbeat on topic `phoenix` every 30 seconds
//! 5. Send `phx_leave` and close when the subscription is released
//!
//! The channel does not reconnect: a dropped connection is reported once as
//! `ChangeEvent::ChannelDropped` and the subscription ends.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

use super::error::GatewayResult;
use super::query::Row;
use super::subscription::{ChangeEvent, EventKind, Subscription};

/// Interval between heartbeats
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// Topic used for heartbeats
const PHOENIX_TOPIC: &str = "phoenix";

/// A Phoenix channel frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    pub topic: String,
    pub event: String,
    pub payload: Value,
    #[serde(rename = "ref", default)]
    pub reference: Option<String>,
}

impl Frame {
    /// Join a table's change feed
    pub fn join(table: &str, kind: EventKind, reference: u64) -> Self {
        Self {
            topic: topic_for(table),
            event: "phx_join".to_string(),
            payload: json!({
                "config": {
                    "postgres_changes": [{
                        "event": kind.as_str(),
                        "schema": "public",
                        "table": table,
                    }]
                }
            }),
            reference: Some(reference.to_string()),
        }
    }

    pub fn leave(table: &str, reference: u64) -> Self {
        Self {
            topic: topic_for(table),
            event: "phx_leave".to_string(),
            payload: json!({}),
            reference: Some(reference.to_string()),
        }
    }

    pub fn heartbeat(reference: u64) -> Self {
        Self {
            topic: PHOENIX_TOPIC.to_string(),
            event: "heartbeat".to_string(),
            payload: json!({}),
            reference: Some(reference.to_string()),
        }
    }

    pub fn encode(&self) -> String {
        // Frame holds only strings and JSON values
        serde_json::to_string(self).unwrap_or_default()
    }

    pub fn decode(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    /// Interpret an incoming frame
    pub fn classify(&self) -> Incoming {
        match self.event.as_str() {
            "postgres_changes" => {
                let data = &self.payload["data"];
                let kind = match data["type"].as_str() {
                    Some("INSERT") => EventKind::Insert,
                    Some("UPDATE") => EventKind::Update,
                    Some("DELETE") => EventKind::Delete,
                    _ => return Incoming::Other,
                };
                // Deletes carry only the old record
                let record = match kind {
                    EventKind::Delete => &data["old_record"],
                    _ => &data["record"],
                };
                match record.as_object() {
                    Some(row) => Incoming::Change(kind, row.clone()),
                    None => Incoming::Other,
                }
            }
            "phx_reply" => {
                if self.payload["status"] == "ok" {
                    Incoming::ReplyOk
                } else {
                    Incoming::ReplyError(self.payload["response"].to_string())
                }
            }
            "phx_error" | "phx_close" | "system" if self.is_failure() => {
                Incoming::Closed(self.payload.to_string())
            }
            _ => Incoming::Other,
        }
    }

    fn is_failure(&self) -> bool {
        match self.event.as_str() {
            "system" => self.payload["status"] == "error",
            _ => true,
        }
    }
}

/// Meaning of an incoming frame
#[derive(Debug, Clone, PartialEq)]
pub enum Incoming {
    Change(EventKind, Row),
    ReplyOk,
    ReplyError(String),
    Closed(String),
    Other,
}

/// Topic name for a table in the public schema
pub fn topic_for(table: &str) -> String {
    format!("realtime:public:{}", table)
}

/// Connect, join, and spawn the forwarding task
pub async fn open(url: &str, table: &str, kind: EventKind) -> GatewayResult<Subscription> {
    debug!("Connecting realtime channel for {}", table);
    let (ws_stream, _response) = connect_async(url).await?;
    let (mut write, read) = ws_stream.split();

    write
        .send(Message::Text(Frame::join(table, kind, 1).encode()))
        .await?;

    let (event_tx, event_rx) = mpsc::unbounded_channel();
    let (cancel_tx, cancel_rx) = oneshot::channel();

    tokio::spawn(channel_loop(
        table.to_string(),
        kind,
        write,
        read,
        HEARTBEAT_INTERVAL,
        event_tx,
        cancel_rx,
    ));

    info!("Subscribed to {} {}", table, kind.as_str());
    Ok(Subscription::new(table, event_rx, Some(cancel_tx)))
}

/// Forward change frames until cancelled or disconnected
async fn channel_loop<W, R>(
    table: String,
    kind: EventKind,
    mut write: W,
    mut read: R,
    every: Duration,
    event_tx: mpsc::UnboundedSender<ChangeEvent>,
    mut cancel_rx: oneshot::Receiver<()>,
) where
    W: futures_util::Sink<Message> + Unpin,
    R: futures_util::Stream<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin,
{
    let mut next_ref: u64 = 2;
    let mut heartbeat = tokio::time::interval(every);
    // The first tick completes immediately
    heartbeat.tick().await;

    let reason = loop {
        tokio::select! {
            _ = &mut cancel_rx => {
                let _ = write.send(Message::Text(Frame::leave(&table, next_ref).encode())).await;
                let _ = write.close().await;
                debug!("Left realtime channel for {}", table);
                return;
            }
            _ = heartbeat.tick() => {
                if write.send(Message::Text(Frame::heartbeat(next_ref).encode())).await.is_err() {
                    break "heartbeat failed".to_string();
                }
                next_ref += 1;
            }
            msg = read.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => match Frame::decode(&text) {
                        Ok(frame) => match frame.classify() {
                            Incoming::Change(changed, row) if changed == kind => {
                                if event_tx.send(ChangeEvent::from_kind(changed, row)).is_err() {
                                    // Receiver gone; cancel will follow
                                    debug!("Realtime receiver for {} dropped", table);
                                }
                            }
                            Incoming::ReplyError(message) => break format!("join rejected: {}", message),
                            Incoming::Closed(message) => break format!("channel closed: {}", message),
                            _ => {}
                        },
                        Err(e) => debug!("Ignoring undecodable realtime frame: {}", e),
                    },
                    Some(Ok(Message::Close(_))) | None => break "server closed connection".to_string(),
                    Some(Err(e)) => break format!("connection error: {}", e),
                    _ => {}
                }
            }
        }
    };

    warn!("Realtime channel for {} dropped: {}", table, reason);
    let _ = event_tx.send(ChangeEvent::ChannelDropped(reason));
}
