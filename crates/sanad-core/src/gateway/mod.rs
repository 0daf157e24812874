//! Remote data gateway
//!
//! A thin client over the backend: CRUD queries on JSON rows plus a push
//! channel for row changes. Everything above this layer receives the
//! gateway as an injected `Arc<dyn Gateway>`.
//!
//! ## Implementations
//!
//! - `HostedGateway`: REST + realtime websocket against the hosted backend
//! - `SqliteGateway`: local SQLite file, polled for inserts from any process
//! - `MemoryGateway`: in-memory fake with failure injection, for tests
//!
//! ## Usage
//!
//! ```ignore
//! let gateway = gateway::connect(&config)?;
//! let rows = gateway
//!     .select(&Query::table(tables::MESSAGES).order_by("created_at", Direction::Descending).limit(50))
//!     .await?;
//! let mut inserts = gateway.subscribe(tables::MESSAGES, EventKind::Insert).await?;
//! ```

mod error;
mod hosted;
pub mod memory;
mod query;
pub mod realtime;
mod sqlite;
mod stamp;
mod subscription;

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::info;

use crate::config::{Backend, Config};

pub use error::{GatewayError, GatewayResult};
pub use hosted::HostedGateway;
pub use memory::MemoryGateway;
pub use query::{Direction, Filter, Order, Query, Row};
pub use sqlite::SqliteGateway;
pub use subscription::{Broadcaster, ChangeEvent, EventKind, Subscription};

/// Backend access used by feeds, the board and admin review
#[async_trait]
pub trait Gateway: Send + Sync {
    /// Rows matching `query`
    async fn select(&self, query: &Query) -> GatewayResult<Vec<Row>>;

    /// Insert one row; returns it with server-assigned columns
    async fn insert(&self, table: &str, row: Row) -> GatewayResult<Row>;

    /// Merge `patch` into the row with `id`; returns the updated row
    async fn update(&self, table: &str, id: &str, patch: Row) -> GatewayResult<Row>;

    /// Delete matching rows; returns how many were removed
    async fn delete(&self, table: &str, filter: &Filter) -> GatewayResult<u64>;

    /// Open a push channel for one table and event kind
    async fn subscribe(&self, table: &str, event: EventKind) -> GatewayResult<Subscription>;

    /// Short name for logs and status output
    fn name(&self) -> &'static str;
}

/// Build the gateway selected by the configuration
pub fn connect(config: &Config) -> Result<Arc<dyn Gateway>> {
    let gateway: Arc<dyn Gateway> = match config.backend {
        Backend::Local => {
            let path = config.database_path();
            Arc::new(
                SqliteGateway::open(&path)
                    .with_context(|| format!("Failed to open local store: {:?}", path))?,
            )
        }
        Backend::Hosted => {
            let api_url = config
                .api_url
                .as_deref()
                .context("Hosted backend selected but api_url is not set")?;
            let api_key = config
                .api_key
                .as_deref()
                .context("Hosted backend selected but api_key is not set")?;
            Arc::new(
                HostedGateway::new(api_url, api_key, config.realtime_url.as_deref())
                    .context("Failed to create backend client")?,
            )
        }
    };

    info!("Using {} backend", gateway.name());
    Ok(gateway)
}
