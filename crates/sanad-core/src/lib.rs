//! Sanad Core Library
//!
//! This crate provides the core functionality for Sanad, an anonymous
//! community forum: people post problems, others reply with advice, and a
//! group chat streams messages live.
//!
//! # Architecture
//!
//! - **Gateway**: thin client over the hosted relational backend (or a local
//!   SQLite file), with a push channel for row insertions
//! - **Feed**: merges an initial bulk fetch with live inserts into one
//!   ordered, id-deduplicated list, plus optimistic submission
//! - **Board**: problems with comments, helpful votes and reports
//! - **Admin**: report review and content removal
//!
//! # Quick Start
//!
//! ```text
//! let config = Config::load()?;
//! let gateway = gateway::connect(&config)?;
//!
//! let mut feed: ListSynchronizer<Item> =
//!     ListSynchronizer::new(gateway.clone(), FeedSpec::messages(config.page_size));
//! feed.initialize().await?;
//!
//! let mut composer = SubmissionHandler::new(gateway, tables::MESSAGES);
//! composer.submit("hello", &mut feed).await?;
//! ```
//!
//! # Modules
//!
//! - `gateway`: backend access (`Gateway` trait and implementations)
//! - `feed`: live list synchronization and optimistic submission
//! - `board`: problems, comments, votes and reports
//! - `admin`: report review and content removal
//! - `models`: data structures for messages, problems, comments and reports
//! - `tips`: random self-help tips
//! - `config`: application configuration

pub mod admin;
pub mod board;
pub mod config;
pub mod error;
pub mod feed;
pub mod gateway;
pub mod models;
pub mod tips;

pub use admin::AdminReview;
pub use board::{ProblemBoard, VoteLedger};
pub use config::{Backend, Config};
pub use error::{BoardError, FeedError};
pub use feed::{
    FeedRecord, FeedSpec, FeedUpdate, FeedView, ListSynchronizer, MergeOutcome, SubmissionHandler,
    SubmissionState,
};
pub use gateway::{Gateway, GatewayError, Subscription};
pub use models::{Comment, Item, Origin, Problem, Report, ReportReason, ReportTarget};
