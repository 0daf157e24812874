//! Live lists
//!
//! A feed is one bulk fetch merged with a stream of pushed inserts into a
//! single list ordered by creation time, oldest first, with no two entries
//! sharing an id. Submissions from this client are appended only after the
//! backend confirms them, so the backend stays the only source of ids.
//!
//! ## Lifecycle
//!
//! 1. `ListSynchronizer::initialize` subscribes, then fetches
//! 2. `next_event` / `pump` apply pushed inserts
//! 3. `SubmissionHandler` appends confirmed local items
//! 4. `teardown` releases the channel; later results are discarded

mod submission;
mod synchronizer;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;

use crate::models::{tables, Comment, Item, Origin, Problem};

pub use submission::{Draft, SubmissionHandler, SubmissionState};
pub use synchronizer::ListSynchronizer;

/// A row type that can live in a feed
pub trait FeedRecord: DeserializeOwned + Clone + Send + 'static {
    /// Server-assigned identifier; the dedup key
    fn id(&self) -> &str;

    fn created_at(&self) -> DateTime<Utc>;

    /// Record that this client authored the row
    fn mark_local(&mut self) {}
}

impl FeedRecord for Item {
    fn id(&self) -> &str {
        &self.id
    }

    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    fn mark_local(&mut self) {
        self.origin = Origin::Local;
    }
}

impl FeedRecord for Problem {
    fn id(&self) -> &str {
        &self.id
    }

    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

impl FeedRecord for Comment {
    fn id(&self) -> &str {
        &self.id
    }

    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

/// Which rows a feed shows
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedSpec {
    /// Backend table
    pub table: String,
    /// Most recent rows fetched on load
    pub page_size: usize,
}

impl FeedSpec {
    pub fn new(table: impl Into<String>, page_size: usize) -> Self {
        Self {
            table: table.into(),
            page_size,
        }
    }

    /// The anonymous group chat
    pub fn messages(page_size: usize) -> Self {
        Self::new(tables::MESSAGES, page_size)
    }
}

/// What the list currently shows
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedView {
    /// Initial fetch not finished
    Loading,
    /// Loaded, no items
    Empty,
    /// Loaded, at least one item
    Ready,
    /// Initial fetch failed
    Failed,
}

/// Result of merging one item into the list
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    /// Added at the end
    Appended,
    /// Id already present; nothing changed
    Duplicate,
    /// Id already present from a push; now marked local
    Upgraded,
    /// Feed torn down; nothing changed
    Discarded,
}

/// Effect of one pushed event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedUpdate {
    Merged(MergeOutcome),
    /// Row could not be decoded or was not an insert
    Skipped,
    /// Channel is gone; the feed is stale
    ChannelDropped(String),
}

impl FeedUpdate {
    /// Whether the list gained an entry
    pub fn appended(&self) -> bool {
        matches!(self, FeedUpdate::Merged(MergeOutcome::Appended))
    }
}
