//! Hosted backend gateway
//!
//! REST calls against a PostgREST-style API (`{api_url}/rest/v1/{table}`)
//! and a realtime websocket for push notifications.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use serde_json::Value;
use tracing::debug;

use super::error::{GatewayError, GatewayResult};
use super::query::{validate_identifier, value_text, Direction, Filter, Query, Row};
use super::realtime;
use super::subscription::{EventKind, Subscription};
use super::Gateway;

/// Request timeout in seconds
const REQUEST_TIMEOUT: u64 = 15;

/// Gateway for the hosted backend
pub struct HostedGateway {
    client: Client,
    rest_url: String,
    realtime_url: String,
    api_key: String,
}

impl HostedGateway {
    /// Create a gateway for `api_url` (e.g. `https://xyz.example.co`)
    ///
    /// When `realtime_url` is `None` it is derived from `api_url`.
    pub fn new(api_url: &str, api_key: &str, realtime_url: Option<&str>) -> GatewayResult<Self> {
        let base = api_url.trim_end_matches('/');
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT))
            .user_agent(concat!("sanad/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            rest_url: format!("{}/rest/v1", base),
            realtime_url: realtime_url
                .map(|u| u.trim_end_matches('/').to_string())
                .unwrap_or_else(|| derive_realtime_url(base)),
            api_key: api_key.to_string(),
        })
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/{}", self.rest_url, table)
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .header("apikey", &self.api_key)
            .bearer_auth(&self.api_key)
    }

    /// Websocket URL with credentials, as the realtime endpoint expects
    fn socket_url(&self) -> String {
        format!(
            "{}/websocket?apikey={}&vsn=1.0.0",
            self.realtime_url, self.api_key
        )
    }
}

#[async_trait]
impl Gateway for HostedGateway {
    async fn select(&self, query: &Query) -> GatewayResult<Vec<Row>> {
        query.validate()?;
        let params = select_params(query);
        debug!("GET {} {:?}", query.table, params);

        let response = self
            .authorized(self.client.get(self.table_url(&query.table)))
            .query(&params)
            .send()
            .await?;

        decode_rows(check(response).await?).await
    }

    async fn insert(&self, table: &str, row: Row) -> GatewayResult<Row> {
        validate_identifier(table)?;
        debug!("POST {}", table);

        let response = self
            .authorized(self.client.post(self.table_url(table)))
            .header("Prefer", "return=representation")
            .json(&vec![Value::Object(row)])
            .send()
            .await?;

        first_row(decode_rows(check(response).await?).await?, table, "inserted")
    }

    async fn update(&self, table: &str, id: &str, patch: Row) -> GatewayResult<Row> {
        validate_identifier(table)?;
        debug!("PATCH {} id={}", table, id);

        let response = self
            .authorized(self.client.patch(self.table_url(table)))
            .header("Prefer", "return=representation")
            .query(&[("id", format!("eq.{}", id))])
            .json(&Value::Object(patch))
            .send()
            .await?;

        let rows = decode_rows(check(response).await?).await?;
        rows.into_iter().next().ok_or_else(|| GatewayError::NotFound {
            table: table.to_string(),
            id: id.to_string(),
        })
    }

    async fn delete(&self, table: &str, filter: &Filter) -> GatewayResult<u64> {
        validate_identifier(table)?;
        validate_identifier(&filter.column)?;
        debug!("DELETE {} {}={}", table, filter.column, value_text(&filter.value));

        let response = self
            .authorized(self.client.delete(self.table_url(table)))
            .header("Prefer", "return=representation")
            .query(&[filter_param(filter)])
            .send()
            .await?;

        Ok(decode_rows(check(response).await?).await?.len() as u64)
    }

    async fn subscribe(&self, table: &str, event: EventKind) -> GatewayResult<Subscription> {
        validate_identifier(table)?;
        realtime::open(&self.socket_url(), table, event).await
    }

    fn name(&self) -> &'static str {
        "hosted"
    }
}

/// `https://host` -> `wss://host/realtime/v1`
fn derive_realtime_url(api_url: &str) -> String {
    let ws = if let Some(rest) = api_url.strip_prefix("https://") {
        format!("wss://{}", rest)
    } else if let Some(rest) = api_url.strip_prefix("http://") {
        format!("ws://{}", rest)
    } else {
        api_url.to_string()
    };
    format!("{}/realtime/v1", ws)
}

fn filter_param(filter: &Filter) -> (String, String) {
    let value = match &filter.value {
        Value::Null => "is.null".to_string(),
        other => format!("eq.{}", value_text(other)),
    };
    (filter.column.clone(), value)
}

/// Query-string parameters for a select
fn select_params(query: &Query) -> Vec<(String, String)> {
    let mut params = vec![("select".to_string(), "*".to_string())];
    params.extend(query.filters.iter().map(filter_param));

    if let Some(order) = &query.order {
        let dir = match order.direction {
            Direction::Ascending => "asc",
            Direction::Descending => "desc",
        };
        params.push(("order".to_string(), format!("{}.{}", order.column, dir)));
    }
    if let Some(limit) = query.limit {
        params.push(("limit".to_string(), limit.to_string()));
    }

    params
}

/// Turn error statuses into `GatewayError::Backend` with the server's message
async fn check(response: Response) -> GatewayResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<Value>(&body)
        .ok()
        .and_then(|v| v["message"].as_str().map(str::to_string))
        .unwrap_or(body);

    Err(GatewayError::Backend {
        status: status.as_u16(),
        message,
    })
}

async fn decode_rows(response: Response) -> GatewayResult<Vec<Row>> {
    let text = response.text().await?;
    if text.trim().is_empty() {
        return Ok(Vec::new());
    }

    match serde_json::from_str::<Value>(&text)? {
        Value::Array(items) => items
            .into_iter()
            .map(|item| match item {
                Value::Object(row) => Ok(row),
                other => Err(GatewayError::Decode(format!("expected row, got {}", other))),
            })
            .collect(),
        Value::Object(row) => Ok(vec![row]),
        other => Err(GatewayError::Decode(format!("expected rows, got {}", other))),
    }
}

fn first_row(rows: Vec<Row>, table: &str, action: &str) -> GatewayResult<Row> {
    rows.into_iter().next().ok_or_else(|| {
        GatewayError::Decode(format!("backend returned no {} row for {}", action, table))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derive_realtime_url() {
        assert_eq!(
            derive_realtime_url("https://abc.example.co"),
            "wss://abc.example.co/realtime/v1"
        );
        assert_eq!(
            derive_realtime_url("http://localhost:54321"),
            "ws://localhost:54321/realtime/v1"
        );
    }

    #[test]
    fn test_select_params() {
        let query = Query::table("messages")
            .eq("problem_id", "p1")
            .order_by("created_at", Direction::Descending)
            .limit(50);

        let params = select_params(&query);
        assert_eq!(
            params,
            vec![
                ("select".to_string(), "*".to_string()),
                ("problem_id".to_string(), "eq.p1".to_string()),
                ("order".to_string(), "created_at.desc".to_string()),
                ("limit".to_string(), "50".to_string()),
            ]
        );
    }

    #[test]
    fn test_null_filter_param() {
        let (column, value) = filter_param(&Filter::eq("is_helpful", Value::Null));
        assert_eq!(column, "is_helpful");
        assert_eq!(value, "is.null");
    }

    #[test]
    fn test_gateway_urls() {
        let gateway = HostedGateway::new("https://abc.example.co/", "key123", None).unwrap();
        assert_eq!(gateway.table_url("problems"), "https://abc.example.co/rest/v1/problems");
        assert_eq!(
            gateway.socket_url(),
            "wss://abc.example.co/realtime/v1/websocket?apikey=key123&vsn=1.0.0"
        );
    }
}
