//! Optimistic submission
//!
//! Sends a trimmed message to the backend and appends the confirmed row to
//! the feed. The call is split into `prepare`, `Draft::send` and `finish` so
//! an event loop can keep drawing while a send is in flight; `submit` runs
//! all three in order.

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, warn};

use super::{FeedRecord, ListSynchronizer, MergeOutcome};
use crate::error::FeedError;
use crate::gateway::{Gateway, GatewayError, GatewayResult, Row};

/// Where the handler is in its send cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SubmissionState {
    #[default]
    Idle,
    /// Waiting on the backend; further submissions are rejected
    Submitting,
    /// Last send was confirmed and appended
    Confirmed,
    /// Last send failed; nothing was appended
    Failed,
}

/// A validated submission ready to send
#[derive(Debug, Clone)]
pub struct Draft {
    table: String,
    row: Row,
}

impl Draft {
    /// Insert the row; the backend assigns its id and timestamp
    pub async fn send(&self, gateway: &dyn Gateway) -> GatewayResult<Row> {
        gateway.insert(&self.table, self.row.clone()).await
    }

    pub fn row(&self) -> &Row {
        &self.row
    }
}

/// Submits text rows to one table
pub struct SubmissionHandler {
    gateway: Arc<dyn Gateway>,
    table: String,
    field: String,
    state: SubmissionState,
}

impl SubmissionHandler {
    /// Handler writing the trimmed text into the `text` column
    pub fn new(gateway: Arc<dyn Gateway>, table: impl Into<String>) -> Self {
        Self {
            gateway,
            table: table.into(),
            field: "text".to_string(),
            state: SubmissionState::Idle,
        }
    }

    /// Write the text into a different column
    pub fn with_field(mut self, field: impl Into<String>) -> Self {
        self.field = field.into();
        self
    }

    pub fn state(&self) -> SubmissionState {
        self.state
    }

    pub fn is_submitting(&self) -> bool {
        self.state == SubmissionState::Submitting
    }

    /// Shared handle for sending a draft from another task
    pub fn gateway(&self) -> Arc<dyn Gateway> {
        Arc::clone(&self.gateway)
    }

    /// Validate `text` and move to `Submitting`
    ///
    /// Empty or whitespace-only text is rejected without touching the
    /// backend.
    pub fn prepare(&mut self, text: &str) -> Result<Draft, FeedError> {
        if self.is_submitting() {
            return Err(FeedError::SubmissionInFlight);
        }
        let text = text.trim();
        if text.is_empty() {
            return Err(FeedError::EmptySubmission);
        }

        let mut row = Row::new();
        row.insert(self.field.clone(), Value::String(text.to_string()));
        self.state = SubmissionState::Submitting;
        debug!("Submitting to {}", self.table);

        Ok(Draft {
            table: self.table.clone(),
            row,
        })
    }

    /// Settle a send: append the confirmed row, or report the failure
    pub fn finish<T: FeedRecord>(
        &mut self,
        result: GatewayResult<Row>,
        feed: &mut ListSynchronizer<T>,
    ) -> Result<MergeOutcome, FeedError> {
        let confirmed = result.and_then(|row| {
            serde_json::from_value::<T>(Value::Object(row)).map_err(GatewayError::from)
        });

        match confirmed {
            Ok(item) => {
                self.state = SubmissionState::Confirmed;
                let outcome = feed.append_local(item);
                debug!("Submission to {} confirmed: {:?}", self.table, outcome);
                Ok(outcome)
            }
            Err(e) => {
                self.state = SubmissionState::Failed;
                warn!("Submission to {} failed: {}", self.table, e);
                Err(FeedError::Submission(e))
            }
        }
    }

    /// Return to `Idle` after a settled send has been shown to the user
    pub fn acknowledge(&mut self) {
        if !self.is_submitting() {
            self.state = SubmissionState::Idle;
        }
    }

    /// Validate, send and append in one call
    pub async fn submit<T: FeedRecord>(
        &mut self,
        text: &str,
        feed: &mut ListSynchronizer<T>,
    ) -> Result<MergeOutcome, FeedError> {
        let draft = self.prepare(text)?;
        let result = draft.send(self.gateway.as_ref()).await;
        self.finish(result, feed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::FeedSpec;
    use crate::gateway::memory::Operation;
    use crate::gateway::MemoryGateway;
    use crate::models::{tables, Item};

    async fn setup() -> (Arc<MemoryGateway>, ListSynchronizer<Item>, SubmissionHandler) {
        let gateway = Arc::new(MemoryGateway::new());
        let mut feed = ListSynchronizer::new(gateway.clone(), FeedSpec::messages(50));
        feed.initialize().await.unwrap();
        let handler = SubmissionHandler::new(gateway.clone(), tables::MESSAGES);
        (gateway, feed, handler)
    }

    #[tokio::test]
    async fn test_blank_submission_never_reaches_backend() {
        let (gateway, mut feed, mut handler) = setup().await;

        for text in ["", "   ", "\n\t "] {
            let err = handler.submit(text, &mut feed).await.unwrap_err();
            assert!(matches!(err, FeedError::EmptySubmission));
        }

        assert_eq!(gateway.calls(Operation::Insert), 0);
        assert!(feed.is_empty());
        assert_eq!(handler.state(), SubmissionState::Idle);
    }

    #[tokio::test]
    async fn test_state_machine() {
        let (_gateway, mut feed, mut handler) = setup().await;

        let draft = handler.prepare("hello").unwrap();
        assert_eq!(handler.state(), SubmissionState::Submitting);
        assert_eq!(draft.row()["text"], "hello");

        // Only one send in flight per handler
        assert!(matches!(
            handler.prepare("again"),
            Err(FeedError::SubmissionInFlight)
        ));

        let result = draft.send(handler.gateway().as_ref()).await;
        handler.finish(result, &mut feed).unwrap();
        assert_eq!(handler.state(), SubmissionState::Confirmed);

        handler.acknowledge();
        assert_eq!(handler.state(), SubmissionState::Idle);
        assert_eq!(feed.len(), 1);
    }

    #[tokio::test]
    async fn test_backend_failure_adds_nothing() {
        let (gateway, mut feed, mut handler) = setup().await;
        gateway.fail(Operation::Insert);

        let err = handler.submit("hello", &mut feed).await.unwrap_err();
        assert!(matches!(err, FeedError::Submission(_)));
        assert_eq!(handler.state(), SubmissionState::Failed);
        assert!(feed.is_empty());

        // A failed send does not block the next one
        gateway.recover(Operation::Insert);
        handler.submit("hello", &mut feed).await.unwrap();
        assert_eq!(feed.len(), 1);
    }

    #[tokio::test]
    async fn test_custom_field() {
        let (gateway, _feed, handler) = setup().await;
        let mut handler = handler.with_field("body");

        let draft = handler.prepare(" hi ").unwrap();
        draft.send(gateway.as_ref()).await.unwrap();

        let stored = gateway.rows(tables::MESSAGES);
        assert_eq!(stored[0]["body"], "hi");
    }

    #[tokio::test]
    async fn test_result_after_teardown_is_discarded() {
        let (_gateway, mut feed, mut handler) = setup().await;

        let draft = handler.prepare("bye").unwrap();
        let result = draft.send(handler.gateway().as_ref()).await;
        feed.teardown();

        let outcome = handler.finish(result, &mut feed).unwrap();
        assert_eq!(outcome, MergeOutcome::Discarded);
        assert!(feed.is_empty());
    }
}
