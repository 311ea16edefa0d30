//! Rate-limited JSON-over-HTTP client shared by the REST connectors.

use std::time::Duration;

use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;
use snafu::ResultExt;
use tracing::debug;

use crate::{
    models::order_book::PriceLevel,
    providers::{
        AuthenticationSnafu, ClientBuildSnafu, ConnectorError, ConnectorInitError, DecodeSnafu,
        ExchangeSnafu, RequestSnafu,
    },
};

pub(crate) struct RestClient {
    exchange: &'static str,
    base_url: String,
    client: Client,
    limiter: DefaultDirectRateLimiter,
}

impl RestClient {
    pub(crate) fn new(
        exchange: &'static str,
        base_url: &str,
        quota: Quota,
    ) -> Result<Self, ConnectorInitError> {
        let client = Client::builder()
            .user_agent(concat!("exchange_connector/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(10))
            .build()
            .context(ClientBuildSnafu)?;

        Ok(Self {
            exchange,
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
            limiter: RateLimiter::direct(quota),
        })
    }

    /// Issues a GET against `path` and decodes the JSON body.
    ///
    /// Waits for the rate limiter first. Non-success statuses are mapped to
    /// connector errors before the body is decoded.
    pub(crate) async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, ConnectorError> {
        self.limiter.until_ready().await;

        let url = format!("{}{}", self.base_url, path);
        debug!(exchange = self.exchange, %url, ?query, "GET");

        let response = self
            .client
            .get(&url)
            .query(query)
            .send()
            .await
            .context(RequestSnafu)?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown API error".to_string());
            return Err(status_error(self.exchange, status, &body));
        }

        response.json::<T>().await.context(RequestSnafu)
    }
}

fn status_error(exchange: &str, status: StatusCode, body: &str) -> ConnectorError {
    let message = format!("HTTP {status}: {body}");
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            AuthenticationSnafu { exchange, message }.build()
        }
        _ => ExchangeSnafu { exchange, message }.build(),
    }
}

/// Reads a number that venues send either as a JSON number or a decimal string.
pub(crate) fn number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

/// Reads an integer sent as a JSON number or a string.
pub(crate) fn integer(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

/// Reads a `[timestamp, a, b, c, d, e, ...]` candle row; the five numbers
/// come back in wire order.
pub(crate) fn candle_row(row: &[Value]) -> Option<(i64, [f64; 5])> {
    let timestamp = row.first().and_then(integer)?;
    let mut fields = [0.0; 5];
    for (i, field) in fields.iter_mut().enumerate() {
        *field = row.get(i + 1).and_then(number)?;
    }
    Some((timestamp, fields))
}

/// Parses `[[price, amount, ...], ...]` rows into price levels.
pub(crate) fn parse_levels(
    exchange: &str,
    rows: &[Vec<Value>],
) -> Result<Vec<PriceLevel>, ConnectorError> {
    rows.iter()
        .map(|row| {
            let price = row.first().and_then(number);
            let amount = row.get(1).and_then(number);
            match (price, amount) {
                (Some(price), Some(amount)) => Ok(PriceLevel { price, amount }),
                _ => DecodeSnafu {
                    exchange,
                    message: format!("malformed book level {row:?}"),
                }
                .fail(),
            }
        })
        .collect()
}
