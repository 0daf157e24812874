//! Feed and board errors
//!
//! Every error here is non-fatal: it is reported at the UI boundary and the
//! user decides whether to retry. Nothing retries automatically.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::gateway::GatewayError;

/// Errors from the live list and its submission handler
#[derive(Error, Debug)]
pub enum FeedError {
    /// Initial load failed; the list is empty
    #[error("Failed to load messages: {0}")]
    Fetch(#[source] GatewayError),

    /// Backend rejected or never received a submission; the list is unchanged
    #[error("Failed to send: {0}")]
    Submission(#[source] GatewayError),

    /// Push channel could not be opened or was dropped
    #[error("Live updates unavailable: {0}")]
    Channel(String),

    /// Submission was empty after trimming
    #[error("Message is empty")]
    EmptySubmission,

    /// A submission from this handler is still waiting on the backend
    #[error("A message is already being sent")]
    SubmissionInFlight,
}

impl FeedError {
    /// Whether a user-initiated retry may succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            FeedError::Fetch(e) | FeedError::Submission(e) => e.is_retryable(),
            FeedError::Channel(_) | FeedError::SubmissionInFlight => true,
            FeedError::EmptySubmission => false,
        }
    }

    /// Get a recovery suggestion for this error
    pub fn recovery_suggestion(&self) -> Option<&'static str> {
        match self {
            FeedError::Fetch(_) => Some("Check your connection and reload."),
            FeedError::Submission(_) => Some("Your message was not posted. Try sending it again."),
            FeedError::Channel(_) => {
                Some("New messages will not appear until you reload.")
            }
            FeedError::SubmissionInFlight => Some("Wait for the current message to finish sending."),
            FeedError::EmptySubmission => None,
        }
    }
}

/// Errors from the problem board and admin review
#[derive(Error, Debug)]
pub enum BoardError {
    /// Loading problems failed
    #[error("Failed to load problems: {0}")]
    Fetch(#[source] GatewayError),

    /// A create, vote, report or delete call failed
    #[error("Backend request failed: {0}")]
    Submission(#[source] GatewayError),

    /// Title or description missing
    #[error("Invalid problem: {0}")]
    InvalidProblem(String),

    /// Comment was empty after trimming
    #[error("Comment is empty")]
    EmptyComment,

    /// This voter already voted on the comment
    #[error("You already voted on comment {0}")]
    AlreadyVoted(String),

    /// Referenced row is not in the loaded board
    #[error("No {kind} found with id {id}")]
    NotFound { kind: &'static str, id: String },

    /// Vote ledger could not be read or written
    #[error("Vote ledger error at '{path}': {source}")]
    Ledger {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Vote ledger exists but is not valid JSON
    #[error("Vote ledger at '{path}' is corrupted: {details}")]
    LedgerFormat { path: PathBuf, details: String },
}

impl BoardError {
    pub(crate) fn not_found(kind: &'static str, id: &str) -> Self {
        BoardError::NotFound {
            kind,
            id: id.to_string(),
        }
    }

    /// Whether a user-initiated retry may succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            BoardError::Fetch(e) | BoardError::Submission(e) => e.is_retryable(),
            _ => false,
        }
    }

    /// Get a recovery suggestion for this error
    pub fn recovery_suggestion(&self) -> Option<&'static str> {
        match self {
            BoardError::Fetch(_) => Some("Check your connection and try again."),
            BoardError::Submission(e) if e.is_retryable() => Some("Try again in a moment."),
            BoardError::InvalidProblem(_) => Some("Both a title and a description are required."),
            BoardError::NotFound { .. } => Some("Run `sanad problem list` to see current ids."),
            BoardError::LedgerFormat { .. } => {
                Some("Delete the vote ledger file to start fresh. Past votes will be forgotten.")
            }
            BoardError::Ledger { .. } => {
                Some("Check that the data directory exists and you have write permissions.")
            }
            _ => None,
        }
    }
}

/// Result type for board operations
pub type BoardResult<T> = Result<T, BoardError>;
