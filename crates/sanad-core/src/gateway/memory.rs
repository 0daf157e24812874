//! In-memory gateway
//!
//! Holds tables as vectors of JSON rows and echoes every insert to
//! subscribers, the way the hosted backend does. Failures can be injected
//! per operation and calls are counted, so feed and board logic can be
//! tested without a live backend.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;

use super::error::{GatewayError, GatewayResult};
use super::query::{Filter, Query, Row};
use super::stamp::RowStamper;
use super::subscription::{Broadcaster, EventKind, Subscription};
use super::Gateway;

/// Gateway operations, for failure injection and call counting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Select,
    Insert,
    Update,
    Delete,
    Subscribe,
}

#[derive(Default)]
struct MemoryState {
    tables: HashMap<String, Vec<Row>>,
    failing: HashSet<Operation>,
    calls: HashMap<Operation, usize>,
    next_id: u64,
    stamper: RowStamper,
}

impl MemoryState {
    fn begin(&mut self, op: Operation) -> GatewayResult<()> {
        *self.calls.entry(op).or_default() += 1;
        if self.failing.contains(&op) {
            return Err(GatewayError::Unavailable(format!("{:?} failed", op)));
        }
        Ok(())
    }

    fn stamp(&mut self, row: Row) -> Row {
        let next_id = &mut self.next_id;
        self.stamper.stamp(row, || {
            *next_id += 1;
            format!("mem-{}", next_id)
        })
    }
}

/// Fake backend held entirely in memory
#[derive(Default)]
pub struct MemoryGateway {
    state: Mutex<MemoryState>,
    hub: Broadcaster,
}

impl MemoryGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store rows without notifying subscribers (pre-existing data)
    pub fn seed(&self, table: &str, rows: impl IntoIterator<Item = Row>) {
        let mut state = self.lock();
        let stamped: Vec<Row> = rows.into_iter().map(|r| state.stamp(r)).collect();
        state
            .tables
            .entry(table.to_string())
            .or_default()
            .extend(stamped);
    }

    /// Insert a row as another client would: stored and pushed, not counted
    pub fn push(&self, table: &str, row: Row) -> Row {
        let stored = {
            let mut state = self.lock();
            let stored = state.stamp(row);
            state
                .tables
                .entry(table.to_string())
                .or_default()
                .push(stored.clone());
            stored
        };
        self.hub.publish(table, EventKind::Insert, &stored);
        stored
    }

    /// Make every call of `op` fail until `recover` is called
    pub fn fail(&self, op: Operation) {
        self.lock().failing.insert(op);
    }

    pub fn recover(&self, op: Operation) {
        self.lock().failing.remove(&op);
    }

    /// How many times `op` was called
    pub fn calls(&self, op: Operation) -> usize {
        self.lock().calls.get(&op).copied().unwrap_or(0)
    }

    /// Rows currently stored in a table
    pub fn rows(&self, table: &str) -> Vec<Row> {
        self.lock().tables.get(table).cloned().unwrap_or_default()
    }

    /// Drop every push channel, simulating a lost connection
    pub fn drop_channels(&self, reason: &str) {
        self.hub.drop_all(reason);
    }

    pub fn subscriber_count(&self) -> usize {
        self.hub.subscriber_count()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl Gateway for MemoryGateway {
    async fn select(&self, query: &Query) -> GatewayResult<Vec<Row>> {
        let mut state = self.lock();
        state.begin(Operation::Select)?;
        let rows = state.tables.get(&query.table).cloned().unwrap_or_default();
        Ok(query.apply(rows))
    }

    async fn insert(&self, table: &str, row: Row) -> GatewayResult<Row> {
        let stored = {
            let mut state = self.lock();
            state.begin(Operation::Insert)?;
            let stored = state.stamp(row);
            state
                .tables
                .entry(table.to_string())
                .or_default()
                .push(stored.clone());
            stored
        };
        // The backend echoes our own inserts on the push channel
        self.hub.publish(table, EventKind::Insert, &stored);
        Ok(stored)
    }

    async fn update(&self, table: &str, id: &str, patch: Row) -> GatewayResult<Row> {
        let updated = {
            let mut state = self.lock();
            state.begin(Operation::Update)?;
            let by_id = Filter::eq("id", id);
            let row = state
                .tables
                .get_mut(table)
                .and_then(|rows| rows.iter_mut().find(|r| by_id.matches(r)))
                .ok_or_else(|| GatewayError::NotFound {
                    table: table.to_string(),
                    id: id.to_string(),
                })?;
            row.extend(patch);
            row.clone()
        };
        self.hub.publish(table, EventKind::Update, &updated);
        Ok(updated)
    }

    async fn delete(&self, table: &str, filter: &Filter) -> GatewayResult<u64> {
        let removed = {
            let mut state = self.lock();
            state.begin(Operation::Delete)?;
            let Some(rows) = state.tables.get_mut(table) else {
                return Ok(0);
            };
            let (gone, kept): (Vec<Row>, Vec<Row>) =
                rows.drain(..).partition(|r| filter.matches(r));
            *rows = kept;
            gone
        };
        for row in &removed {
            self.hub.publish(table, EventKind::Delete, row);
        }
        Ok(removed.len() as u64)
    }

    async fn subscribe(&self, table: &str, event: EventKind) -> GatewayResult<Subscription> {
        self.lock().begin(Operation::Subscribe)?;
        Ok(self.hub.subscribe(table, event))
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}
