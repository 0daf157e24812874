//! Query description shared by all gateways
//!
//! A `Query` is a table name plus equality filters, an optional ordering and
//! an optional row limit. Each gateway translates it to its own dialect.

use std::cmp::Ordering;

use serde_json::{Map, Value};

use super::error::{GatewayError, GatewayResult};

/// A backend row
pub type Row = Map<String, Value>;

/// Sort direction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Ascending,
    Descending,
}

/// Column equality filter
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    pub column: String,
    pub value: Value,
}

impl Filter {
    pub fn eq(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            column: column.into(),
            value: value.into(),
        }
    }

    /// Whether a row satisfies this filter
    pub fn matches(&self, row: &Row) -> bool {
        match row.get(&self.column) {
            Some(found) => values_equal(found, &self.value),
            None => self.value.is_null(),
        }
    }
}

/// Ordering clause
#[derive(Debug, Clone, PartialEq)]
pub struct Order {
    pub column: String,
    pub direction: Direction,
}

/// A select query
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub table: String,
    pub filters: Vec<Filter>,
    pub order: Option<Order>,
    pub limit: Option<usize>,
}

impl Query {
    /// Select every row of a table
    pub fn table(name: impl Into<String>) -> Self {
        Self {
            table: name.into(),
            filters: Vec::new(),
            order: None,
            limit: None,
        }
    }

    pub fn eq(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filters.push(Filter::eq(column, value));
        self
    }

    pub fn order_by(mut self, column: impl Into<String>, direction: Direction) -> Self {
        self.order = Some(Order {
            column: column.into(),
            direction,
        });
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Whether a row satisfies every filter
    pub fn matches(&self, row: &Row) -> bool {
        self.filters.iter().all(|f| f.matches(row))
    }

    /// Check table and column names before they are spliced into a request
    pub fn validate(&self) -> GatewayResult<()> {
        validate_identifier(&self.table)?;
        for filter in &self.filters {
            validate_identifier(&filter.column)?;
        }
        if let Some(order) = &self.order {
            validate_identifier(&order.column)?;
        }
        Ok(())
    }

    /// Filter, sort and truncate rows in memory
    pub fn apply(&self, rows: impl IntoIterator<Item = Row>) -> Vec<Row> {
        let mut selected: Vec<Row> = rows.into_iter().filter(|r| self.matches(r)).collect();

        if let Some(order) = &self.order {
            // Stable sort keeps insertion order among equal keys
            selected.sort_by(|a, b| {
                let ord = compare_values(a.get(&order.column), b.get(&order.column));
                match order.direction {
                    Direction::Ascending => ord,
                    Direction::Descending => ord.reverse(),
                }
            });
        }

        if let Some(limit) = self.limit {
            selected.truncate(limit);
        }

        selected
    }
}

/// Table and column names are restricted to `[A-Za-z0-9_]`
pub fn validate_identifier(name: &str) -> GatewayResult<()> {
    let valid = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_');
    if valid {
        Ok(())
    } else {
        Err(GatewayError::InvalidQuery(format!(
            "'{}' is not a valid table or column name",
            name
        )))
    }
}

/// Render a filter value the way it appears in a URL or SQL text comparison
pub fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "null".to_string(),
        other => other.to_string(),
    }
}

fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        // Ids may be numbers in the row and strings in the filter
        (Value::Number(n), Value::String(s)) | (Value::String(s), Value::Number(n)) => {
            n.to_string() == *s
        }
        _ => a == b,
    }
}

fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (Some(Value::Number(x)), Some(Value::Number(y))) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        (Some(Value::Bool(x)), Some(Value::Bool(y))) => x.cmp(y),
        (None, None) | (Some(Value::Null), Some(Value::Null)) => Ordering::Equal,
        // Missing or null sorts first
        (None, Some(_)) | (Some(Value::Null), Some(_)) => Ordering::Less,
        (Some(_), None) | (Some(_), Some(Value::Null)) => Ordering::Greater,
        _ => Ordering::Equal,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(value: Value) -> Row {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_apply_filters_orders_and_limits() {
        let rows = vec![
            row(json!({"id": "a", "problem_id": "p1", "created_at": "2024-01-01T00:00:01Z"})),
            row(json!({"id": "b", "problem_id": "p2", "created_at": "2024-01-01T00:00:02Z"})),
            row(json!({"id": "c", "problem_id": "p1", "created_at": "2024-01-01T00:00:03Z"})),
        ];

        let query = Query::table("comments")
            .eq("problem_id", "p1")
            .order_by("created_at", Direction::Descending)
            .limit(5);
        let ids: Vec<_> = query
            .apply(rows.clone())
            .iter()
            .map(|r| r["id"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(ids, vec!["c", "a"]);

        let first = Query::table("comments")
            .order_by("created_at", Direction::Ascending)
            .limit(1)
            .apply(rows);
        assert_eq!(first[0]["id"], "a");
    }

    #[test]
    fn test_numeric_id_matches_string_filter() {
        let r = row(json!({"id": 42}));
        assert!(Filter::eq("id", "42").matches(&r));
        assert!(Filter::eq("id", 42).matches(&r));
        assert!(!Filter::eq("id", "41").matches(&r));
    }

    #[test]
    fn test_validate_identifier() {
        assert!(validate_identifier("problem_reports").is_ok());
        assert!(validate_identifier("").is_err());
        assert!(validate_identifier("id; drop table").is_err());
        assert!(Query::table("messages").eq("te-xt", "x").validate().is_err());
    }
}
