//! Server-assigned columns for gateways that act as their own backend

use chrono::{DateTime, Duration, SecondsFormat, Utc};
use serde_json::Value;

use super::query::Row;

/// Assigns `id` and `created_at` to rows that lack them
///
/// Timestamps are strictly increasing so that ordering by `created_at`
/// matches insertion order even within one clock tick.
#[derive(Debug, Default)]
pub struct RowStamper {
    last_created: Option<DateTime<Utc>>,
}

impl RowStamper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_timestamp(&mut self) -> DateTime<Utc> {
        let now = Utc::now();
        let ts = match self.last_created {
            Some(last) if now <= last => last + Duration::microseconds(1),
            _ => now,
        };
        self.last_created = Some(ts);
        ts
    }

    /// Fill in missing columns; `make_id` is only called when `id` is absent
    pub fn stamp(&mut self, mut row: Row, make_id: impl FnOnce() -> String) -> Row {
        if !row.contains_key("id") {
            row.insert("id".into(), Value::String(make_id()));
        }
        if !row.contains_key("created_at") {
            let ts = self.next_timestamp();
            row.insert(
                "created_at".into(),
                Value::String(ts.to_rfc3339_opts(SecondsFormat::Micros, true)),
            );
        }
        row
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_stamp_keeps_existing_columns() {
        let mut stamper = RowStamper::new();
        let row = json!({"id": "given", "created_at": "2024-01-01T00:00:00Z"})
            .as_object()
            .cloned()
            .unwrap();

        let stamped = stamper.stamp(row.clone(), || unreachable!());
        assert_eq!(stamped, row);
    }

    #[test]
    fn test_timestamps_strictly_increase() {
        let mut stamper = RowStamper::new();
        let a = stamper.next_timestamp();
        let b = stamper.next_timestamp();
        let c = stamper.next_timestamp();
        assert!(a < b && b < c);
    }
}
