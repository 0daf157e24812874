//! Local SQLite gateway
//!
//! A single-machine stand-in for the hosted backend. Every table is stored
//! in one `rows` table as JSON documents, queried with `json_extract`.
//! Insert subscriptions poll the table for rows past the last seen `seq`,
//! so writes from other processes sharing the file are pushed as well.
//! Updates and deletes are pushed to subscribers in the same process.

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use rusqlite::types::Value as SqlValue;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use super::error::{GatewayError, GatewayResult};
use super::query::{validate_identifier, Direction, Filter, Query, Row};
use super::stamp::RowStamper;
use super::subscription::{Broadcaster, ChangeEvent, EventKind, Subscription};
use super::Gateway;

/// Current schema version for migrations
pub const SCHEMA_VERSION: i32 = 2;

/// How often insert subscriptions look for new rows
pub const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// How long a statement waits on another process's write lock
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Initialize the database schema
pub fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        r#"
        -- Schema version tracking
        CREATE TABLE IF NOT EXISTS schema_info (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );
        "#,
    )?;

    let version: Option<String> = conn
        .query_row(
            "SELECT value FROM schema_info WHERE key = 'version'",
            [],
            |row| row.get(0),
        )
        .optional()?;
    if version.as_deref() == Some("1") {
        migrate_v1(conn)?;
    }

    conn.execute_batch(
        r#"
        -- One JSON document per backend row; seq only ever grows
        CREATE TABLE IF NOT EXISTS rows (
            seq INTEGER PRIMARY KEY AUTOINCREMENT,
            tbl TEXT NOT NULL,
            id TEXT NOT NULL,
            created_at TEXT NOT NULL,
            data TEXT NOT NULL,
            UNIQUE (tbl, id)
        );

        -- Feeds read the newest rows of a table
        CREATE INDEX IF NOT EXISTS idx_rows_tbl_created_at ON rows(tbl, created_at);
        "#,
    )?;

    conn.execute(
        "INSERT OR REPLACE INTO schema_info (key, value) VALUES ('version', ?1)",
        params![SCHEMA_VERSION.to_string()],
    )?;

    Ok(())
}

/// Version 1 keyed rows by (tbl, id) only; copy them into the seq layout
fn migrate_v1(conn: &Connection) -> rusqlite::Result<()> {
    debug!("Migrating local store from schema version 1");
    conn.execute_batch(
        r#"
        BEGIN;
        DROP INDEX IF EXISTS idx_rows_tbl_created_at;
        ALTER TABLE rows RENAME TO rows_v1;
        CREATE TABLE rows (
            seq INTEGER PRIMARY KEY AUTOINCREMENT,
            tbl TEXT NOT NULL,
            id TEXT NOT NULL,
            created_at TEXT NOT NULL,
            data TEXT NOT NULL,
            UNIQUE (tbl, id)
        );
        INSERT INTO rows (tbl, id, created_at, data)
            SELECT tbl, id, created_at, data FROM rows_v1 ORDER BY rowid;
        DROP TABLE rows_v1;
        COMMIT;
        "#,
    )
}

/// Gateway backed by a local SQLite file
pub struct SqliteGateway {
    conn: Arc<Mutex<Connection>>,
    stamper: Mutex<RowStamper>,
    hub: Broadcaster,
}

impl SqliteGateway {
    /// Open (or create) the database at `path`
    pub fn open(path: &Path) -> GatewayResult<Self> {
        let conn = Connection::open(path)?;
        debug!("Opened local store at {:?}", path);
        Self::with_connection(conn)
    }

    /// Open an in-memory database (useful for testing)
    pub fn open_in_memory() -> GatewayResult<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> GatewayResult<Self> {
        conn.busy_timeout(BUSY_TIMEOUT)?;
        init_schema(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            stamper: Mutex::new(RowStamper::new()),
            hub: Broadcaster::new(),
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        lock(&self.conn)
    }

    fn stamp(&self, row: Row) -> Row {
        self.stamper
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .stamp(row, || uuid::Uuid::new_v4().to_string())
    }

    /// Start a task that pushes rows inserted into `table` from now on
    fn watch_inserts(&self, table: &str) -> GatewayResult<Subscription> {
        let last_seq: i64 = self.conn().query_row(
            "SELECT COALESCE(MAX(seq), 0) FROM rows WHERE tbl = ?1",
            params![table],
            |row| row.get(0),
        )?;

        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (cancel_tx, cancel_rx) = oneshot::channel();
        tokio::spawn(poll_inserts(
            Arc::clone(&self.conn),
            table.to_string(),
            last_seq,
            POLL_INTERVAL,
            event_tx,
            cancel_rx,
        ));

        debug!("Watching {} for inserts after seq {}", table, last_seq);
        Ok(Subscription::new(table, event_rx, Some(cancel_tx)))
    }
}

fn lock(conn: &Mutex<Connection>) -> MutexGuard<'_, Connection> {
    conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn select_on(conn: &Connection, query: &Query) -> GatewayResult<Vec<Row>> {
    query.validate()?;

    let mut sql = String::from("SELECT data FROM rows WHERE tbl = ?");
    let mut binds: Vec<SqlValue> = vec![SqlValue::Text(query.table.clone())];
    push_filters(&mut sql, &mut binds, &query.filters);

    if let Some(order) = &query.order {
        let dir = match order.direction {
            Direction::Ascending => "ASC",
            Direction::Descending => "DESC",
        };
        // seq breaks ties in insertion order
        sql.push_str(&format!(
            " ORDER BY json_extract(data, '$.{col}') {dir}, seq {dir}",
            col = order.column,
            dir = dir
        ));
    }

    if let Some(limit) = query.limit {
        sql.push_str(" LIMIT ?");
        binds.push(SqlValue::Integer(limit as i64));
    }

    let mut stmt = conn.prepare(&sql)?;
    let texts = stmt
        .query_map(params_from_iter(binds), |row| row.get::<_, String>(0))?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    texts.iter().map(|t| decode_row(t)).collect()
}

/// Rows of `table` stored after `after`, oldest first
fn rows_after(conn: &Connection, table: &str, after: i64) -> rusqlite::Result<Vec<(i64, String)>> {
    let mut stmt =
        conn.prepare_cached("SELECT seq, data FROM rows WHERE tbl = ?1 AND seq > ?2 ORDER BY seq")?;
    let rows = stmt
        .query_map(params![table, after], |row| Ok((row.get(0)?, row.get(1)?)))?
        .collect();
    rows
}

async fn poll_inserts(
    conn: Arc<Mutex<Connection>>,
    table: String,
    mut last_seq: i64,
    every: Duration,
    event_tx: mpsc::UnboundedSender<ChangeEvent>,
    mut cancel_rx: oneshot::Receiver<()>,
) {
    let mut ticker = tokio::time::interval(every);

    let reason = loop {
        tokio::select! {
            _ = &mut cancel_rx => {
                debug!("Stopped watching {}", table);
                return;
            }
            _ = ticker.tick() => {}
        }

        let fresh = {
            let conn = lock(&conn);
            rows_after(&conn, &table, last_seq)
        };

        let rows = match fresh {
            Ok(rows) => rows,
            Err(e) => break format!("local store error: {}", e),
        };

        for (seq, data) in rows {
            last_seq = seq;
            match decode_row(&data) {
                Ok(row) => {
                    if event_tx.send(ChangeEvent::Insert(row)).is_err() {
                        return;
                    }
                }
                Err(e) => warn!("Skipping unreadable {} row {}: {}", table, seq, e),
            }
        }
    };

    warn!("Watch on {} stopped: {}", table, reason);
    let _ = event_tx.send(ChangeEvent::ChannelDropped(reason));
}

#[async_trait]
impl Gateway for SqliteGateway {
    async fn select(&self, query: &Query) -> GatewayResult<Vec<Row>> {
        select_on(&self.conn(), query)
    }

    async fn insert(&self, table: &str, row: Row) -> GatewayResult<Row> {
        validate_identifier(table)?;
        let stored = self.stamp(row);
        let id = id_of(&stored)?;
        let created_at = stored
            .get("created_at")
            .map(super::query::value_text)
            .unwrap_or_default();

        self.conn().execute(
            "INSERT INTO rows (tbl, id, created_at, data) VALUES (?1, ?2, ?3, ?4)",
            params![table, id, created_at, serde_json::to_string(&stored)?],
        )?;

        Ok(stored)
    }

    async fn update(&self, table: &str, id: &str, patch: Row) -> GatewayResult<Row> {
        validate_identifier(table)?;
        let updated = {
            let conn = self.conn();
            let existing: Option<String> = conn
                .query_row(
                    "SELECT data FROM rows WHERE tbl = ?1 AND id = ?2",
                    params![table, id],
                    |row| row.get(0),
                )
                .optional()?;

            let Some(existing) = existing else {
                return Err(GatewayError::NotFound {
                    table: table.to_string(),
                    id: id.to_string(),
                });
            };

            let mut row = decode_row(&existing)?;
            row.extend(patch);
            conn.execute(
                "UPDATE rows SET data = ?3 WHERE tbl = ?1 AND id = ?2",
                params![table, id, serde_json::to_string(&row)?],
            )?;
            row
        };

        self.hub.publish(table, EventKind::Update, &updated);
        Ok(updated)
    }

    async fn delete(&self, table: &str, filter: &Filter) -> GatewayResult<u64> {
        let query = Query {
            table: table.to_string(),
            filters: vec![filter.clone()],
            order: None,
            limit: None,
        };

        let doomed = {
            let mut conn = self.conn();
            let tx = conn.transaction()?;
            let doomed = select_on(&tx, &query)?;
            for row in &doomed {
                tx.execute(
                    "DELETE FROM rows WHERE tbl = ?1 AND id = ?2",
                    params![table, id_of(row)?],
                )?;
            }
            tx.commit()?;
            doomed
        };

        for row in &doomed {
            self.hub.publish(table, EventKind::Delete, row);
        }
        Ok(doomed.len() as u64)
    }

    async fn subscribe(&self, table: &str, event: EventKind) -> GatewayResult<Subscription> {
        validate_identifier(table)?;
        match event {
            EventKind::Insert => self.watch_inserts(table),
            EventKind::Update | EventKind::Delete => Ok(self.hub.subscribe(table, event)),
        }
    }

    fn name(&self) -> &'static str {
        "local"
    }
}

/// Append `AND json_extract(...) = ?` clauses; column names are pre-validated
fn push_filters(sql: &mut String, binds: &mut Vec<SqlValue>, filters: &[Filter]) {
    for filter in filters {
        let path = format!("json_extract(data, '$.{}')", filter.column);
        match to_sql_value(&filter.value) {
            None => sql.push_str(&format!(" AND {} IS NULL", path)),
            Some(value) => {
                sql.push_str(&format!(" AND {} = ?", path));
                binds.push(value);
            }
        }
    }
}

fn to_sql_value(value: &Value) -> Option<SqlValue> {
    match value {
        Value::Null => None,
        Value::Bool(b) => Some(SqlValue::Integer(i64::from(*b))),
        Value::Number(n) => Some(match n.as_i64() {
            Some(i) => SqlValue::Integer(i),
            None => SqlValue::Real(n.as_f64().unwrap_or_default()),
        }),
        Value::String(s) => Some(SqlValue::Text(s.clone())),
        // Arrays and objects compare as their JSON text
        other => Some(SqlValue::Text(other.to_string())),
    }
}

fn decode_row(text: &str) -> GatewayResult<Row> {
    match serde_json::from_str::<Value>(text)? {
        Value::Object(row) => Ok(row),
        other => Err(GatewayError::Decode(format!(
            "stored row is not an object: {}",
            other
        ))),
    }
}

fn id_of(row: &Row) -> GatewayResult<String> {
    row.get("id")
        .map(super::query::value_text)
        .ok_or_else(|| GatewayError::Decode("row has no id".to_string()))
}
