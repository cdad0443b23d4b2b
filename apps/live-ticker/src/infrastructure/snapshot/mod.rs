//! HTTP Snapshot Adapter
//!
//! Implements `SnapshotSource` with a plain JSON GET:
//!
//! - `SnapshotRequest::Symbols` → `GET {url}?symbols=BTC,ETH`
//! - `SnapshotRequest::Top(n)` → `GET {url}?limit=n`
//!
//! The body is either an array of records or an object carrying the array
//! under `results` or `data`. Records that fail to decode are skipped.

use std::time::Duration;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::Value;

use crate::application::ports::{SnapshotError, SnapshotRequest, SnapshotSource};
use crate::domain::ticker::{Instrument, Symbol};
use crate::infrastructure::config::SnapshotSettings;

/// One element of the snapshot body.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SnapshotRecord {
    symbol: String,
    #[serde(default)]
    price: Option<Decimal>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    price_change_24h: Option<Decimal>,
}

/// Snapshot source backed by an HTTP endpoint.
#[derive(Debug, Clone)]
pub struct HttpSnapshotSource {
    client: reqwest::Client,
    url: String,
    timeout: Duration,
}

impl HttpSnapshotSource {
    /// Create an adapter for `url`.
    ///
    /// # Errors
    ///
    /// Returns `SnapshotError::Network` if the HTTP client cannot be built.
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, SnapshotError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SnapshotError::Network(e.to_string()))?;

        Ok(Self {
            client,
            url: url.into(),
            timeout,
        })
    }

    /// Create an adapter from settings.
    ///
    /// # Errors
    ///
    /// Returns `SnapshotError::Network` if the HTTP client cannot be built.
    pub fn from_settings(settings: &SnapshotSettings) -> Result<Self, SnapshotError> {
        Self::new(settings.url.clone(), settings.timeout)
    }

    fn query(request: &SnapshotRequest) -> (&'static str, String) {
        match request {
            SnapshotRequest::Symbols(set) => (
                "symbols",
                set.iter().map(Symbol::as_str).collect::<Vec<_>>().join(","),
            ),
            SnapshotRequest::Top(n) => ("limit", n.to_string()),
        }
    }
}

#[async_trait]
impl SnapshotSource for HttpSnapshotSource {
    async fn fetch(&self, request: &SnapshotRequest) -> Result<Vec<Instrument>, SnapshotError> {
        if let SnapshotRequest::Symbols(set) = request
            && set.is_empty()
        {
            return Ok(Vec::new());
        }

        let (key, value) = Self::query(request);
        let response = self
            .client
            .get(&self.url)
            .query(&[(key, value.as_str())])
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    SnapshotError::Timeout(self.timeout)
                } else {
                    SnapshotError::Network(e.to_string())
                }
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(SnapshotError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| SnapshotError::InvalidBody(e.to_string()))?;

        let mut instruments = parse_body(body)?;
        if let SnapshotRequest::Symbols(set) = request {
            instruments.retain(|i| set.contains(i.symbol.as_str()));
        }

        tracing::debug!(count = instruments.len(), "Snapshot fetched");
        Ok(instruments)
    }
}

/// Extract instruments from a snapshot body.
fn parse_body(body: Value) -> Result<Vec<Instrument>, SnapshotError> {
    let items = match body {
        Value::Array(items) => items,
        Value::Object(mut map) => match map
            .remove("results")
            .or_else(|| map.remove("data"))
        {
            Some(Value::Array(items)) => items,
            _ => {
                return Err(SnapshotError::InvalidBody(
                    "expected an array under `results` or `data`".to_string(),
                ));
            }
        },
        other => {
            return Err(SnapshotError::InvalidBody(format!(
                "expected array or object, got {other}"
            )));
        }
    };

    Ok(items.into_iter().filter_map(parse_record).collect())
}

fn parse_record(item: Value) -> Option<Instrument> {
    let record: SnapshotRecord = match serde_json::from_value(item) {
        Ok(record) => record,
        Err(e) => {
            tracing::warn!(error = %e, "Skipping malformed snapshot record");
            return None;
        }
    };

    let symbol = match Symbol::parse(&record.symbol) {
        Ok(symbol) => symbol,
        Err(e) => {
            tracing::warn!(error = %e, "Skipping snapshot record with invalid symbol");
            return None;
        }
    };

    let Some(price) = record.price else {
        tracing::warn!(symbol = %symbol, "Skipping snapshot record without price");
        return None;
    };

    let mut instrument = Instrument::new(symbol, price);
    if let Some(name) = record.name {
        instrument = instrument.with_display_name(name);
    }
    if let Some(change) = record.price_change_24h {
        instrument = instrument.with_change_24h(change);
    }
    Some(instrument)
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::domain::subscription::SubscriptionSet;

    fn set(names: &[&str]) -> SubscriptionSet {
        names.iter().map(|s| Symbol::parse(s).unwrap()).collect()
    }

    fn source(server: &MockServer) -> HttpSnapshotSource {
        HttpSnapshotSource::new(format!("{}/snapshot", server.uri()), Duration::from_secs(5))
            .unwrap()
    }

    #[tokio::test]
    async fn fetches_symbols_from_array_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/snapshot"))
            .and(query_param("symbols", "BTC,ETH"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"symbol": "BTC", "price": "50000", "name": "Bitcoin", "priceChange24h": 1.5},
                {"symbol": "ETH", "price": 3000}
            ])))
            .mount(&server)
            .await;

        let instruments = source(&server)
            .fetch(&SnapshotRequest::Symbols(set(&["BTC", "ETH"])))
            .await
            .unwrap();

        assert_eq!(instruments.len(), 2);
        assert_eq!(instruments[0].symbol.as_str(), "BTC");
        assert_eq!(instruments[0].baseline_price, Decimal::new(50_000, 0));
        assert_eq!(instruments[0].display_name.as_deref(), Some("Bitcoin"));
        assert_eq!(instruments[0].baseline_change_24h, Some(Decimal::new(15, 1)));
        assert_eq!(instruments[1].baseline_change_24h, None);
    }

    #[tokio::test]
    async fn fetches_top_from_envelope() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/snapshot"))
            .and(query_param("limit", "2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "results": [
                    {"symbol": "btc", "price": 1},
                    {"symbol": "sol", "price": 2}
                ]
            })))
            .mount(&server)
            .await;

        let instruments = source(&server).fetch(&SnapshotRequest::Top(2)).await.unwrap();
        let symbols: Vec<_> = instruments.iter().map(|i| i.symbol.as_str()).collect();
        assert_eq!(symbols, ["BTC", "SOL"]);
    }

    #[tokio::test]
    async fn skips_malformed_records() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [
                    {"symbol": "BTC"},
                    {"symbol": "B-T", "price": 1},
                    {"price": 1},
                    {"symbol": "ETH", "price": "2.5"}
                ]
            })))
            .mount(&server)
            .await;

        let instruments = source(&server).fetch(&SnapshotRequest::Top(10)).await.unwrap();
        assert_eq!(instruments.len(), 1);
        assert_eq!(instruments[0].symbol.as_str(), "ETH");
    }

    #[tokio::test]
    async fn drops_unrequested_symbols() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"symbol": "BTC", "price": 1},
                {"symbol": "DOGE", "price": 2}
            ])))
            .mount(&server)
            .await;

        let instruments = source(&server)
            .fetch(&SnapshotRequest::Symbols(set(&["BTC"])))
            .await
            .unwrap();
        assert_eq!(instruments.len(), 1);
    }

    #[tokio::test]
    async fn non_success_status_is_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(502).set_body_string("bad gateway"))
            .mount(&server)
            .await;

        let err = source(&server).fetch(&SnapshotRequest::Top(5)).await.unwrap_err();
        match err {
            SnapshotError::Status { status, body } => {
                assert_eq!(status, 502);
                assert_eq!(body, "bad gateway");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn unexpected_body_is_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
            .mount(&server)
            .await;

        let err = source(&server).fetch(&SnapshotRequest::Top(5)).await.unwrap_err();
        assert!(matches!(err, SnapshotError::InvalidBody(_)));
    }

    #[tokio::test]
    async fn empty_symbol_request_skips_network() {
        let source = HttpSnapshotSource::new("http://127.0.0.1:9/unused", Duration::from_secs(1))
            .unwrap();
        let instruments = source
            .fetch(&SnapshotRequest::Symbols(SubscriptionSet::new()))
            .await
            .unwrap();
        assert!(instruments.is_empty());
    }
}
