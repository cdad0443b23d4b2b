//! HTTP Server
//!
//! Serves the live price view, the forwarding routes and the operational
//! endpoints on one port.
//!
//! # Endpoints
//!
//! - `GET /health` - JSON health status
//! - `GET /healthz` - liveness probe (simple OK)
//! - `GET /readyz` - readiness probe (stream connected)
//! - `GET /metrics` - Prometheus metrics in text format
//! - `GET /api/prices` - current prices, optionally filtered by `symbols`
//! - `GET /api/prices/stream` - Server-Sent Events for `symbols` (top set when omitted)
//! - `GET|OPTIONS /api/drag-drop-cards` - forwarded to the admin API
//! - `GET /api/proxy/favorites` - forwarded to the favourites API

use std::collections::HashMap;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::extract::{Query, State};
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::net::TcpListener;
use tokio_stream::StreamExt as _;
use tokio_stream::wrappers::BroadcastStream;
use tokio_util::sync::CancellationToken;

use crate::application::services::LiveTickerHub;
use crate::domain::ticker::{LivePriceRecord, Symbol, SyncState};
use crate::infrastructure::metrics::{get_metrics_handle, record_proxy_request};
use crate::infrastructure::proxy::{FavoritesQuery, ProxyClient, ProxyError};

/// Records returned in `top10Data` when no symbols are requested.
const DEFAULT_TOP_LIMIT: usize = 10;

// =============================================================================
// Health Response Types
// =============================================================================

/// Health check response.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Overall status: "healthy", "degraded", or "unhealthy".
    pub status: HealthStatus,
    /// Service version.
    pub version: String,
    /// Server uptime in seconds.
    pub uptime_secs: u64,
    /// Current time.
    pub current_time: DateTime<Utc>,
    /// Ticker stream status.
    pub stream: StreamInfo,
    /// Attached consumers.
    pub consumers: usize,
    /// Subscription statistics.
    pub subscriptions: SubscriptionStatus,
}

/// Overall health status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Stream connected, or nothing to serve.
    Healthy,
    /// Stream opening or reconnecting.
    Degraded,
    /// Stream gave up while consumers are attached.
    Unhealthy,
}

/// Ticker stream status.
#[derive(Debug, Clone, Serialize)]
pub struct StreamInfo {
    /// Lifecycle state.
    pub state: SyncState,
    /// Whether the stream is connected.
    pub connected: bool,
    /// Current reconnect attempts (0 if connected).
    pub reconnect_attempts: u32,
    /// Updates applied.
    pub messages_received: u64,
    /// Malformed frames or elements.
    pub messages_malformed: u64,
}

/// Subscription statistics.
#[derive(Debug, Clone, Serialize)]
pub struct SubscriptionStatus {
    /// Symbols carried by the stream.
    pub symbols: usize,
    /// Total broadcast receivers.
    pub broadcast_receivers: usize,
}

// =============================================================================
// Price Response Types
// =============================================================================

/// Current view for a set of symbols.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PricesResponse {
    /// Whether the stream is connected.
    pub is_connected: bool,
    /// Lifecycle state.
    pub state: SyncState,
    /// Records in subscription (or request) order.
    pub top10_data: Vec<LivePriceRecord>,
    /// Symbol to last price.
    pub live_prices_map: HashMap<Symbol, Decimal>,
    /// Symbol to 24h change percentage.
    pub live_price_changes_map: HashMap<Symbol, Decimal>,
}

#[derive(Debug, Default, Deserialize)]
struct SymbolsQuery {
    symbols: Option<String>,
}

impl SymbolsQuery {
    fn parse(&self) -> Result<Vec<Symbol>, ApiError> {
        self.symbols
            .as_deref()
            .map_or_else(|| Ok(Vec::new()), Symbol::parse_list)
            .map_err(|e| ApiError::bad_request(e.to_string()))
    }
}

// =============================================================================
// Errors
// =============================================================================

/// JSON error body `{success: false, error, status}`.
#[derive(Debug)]
struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: String) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message,
        }
    }
}

impl From<ProxyError> for ApiError {
    fn from(e: ProxyError) -> Self {
        Self {
            status: StatusCode::from_u16(e.status_code())
                .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
            message: e.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = json!({
            "success": false,
            "error": self.message,
            "status": self.status.as_u16(),
        });
        (self.status, Json(body)).into_response()
    }
}

/// HTTP server errors.
#[derive(Debug, thiserror::Error)]
pub enum HttpServerError {
    /// Failed to bind to port.
    #[error("failed to bind to port {0}: {1}")]
    BindFailed(u16, String),

    /// Server error.
    #[error("server error: {0}")]
    ServerFailed(String),
}

// =============================================================================
// Server State
// =============================================================================

/// Shared state for the HTTP server.
pub struct HttpState {
    version: String,
    started_at: Instant,
    hub: LiveTickerHub,
    proxy: ProxyClient,
}

impl HttpState {
    /// Create new server state.
    #[must_use]
    pub fn new(version: String, hub: LiveTickerHub, proxy: ProxyClient) -> Self {
        Self {
            version,
            started_at: Instant::now(),
            hub,
            proxy,
        }
    }
}

/// Build the router. Exposed for in-process tests.
pub fn router(state: Arc<HttpState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/healthz", get(liveness_handler))
        .route("/readyz", get(readiness_handler))
        .route("/metrics", get(metrics_handler))
        .route("/api/prices", get(prices_handler))
        .route("/api/prices/stream", get(price_stream_handler))
        .route(
            "/api/drag-drop-cards",
            get(drag_drop_cards_handler).options(cors_preflight_handler),
        )
        .route("/api/proxy/favorites", get(favorites_handler))
        .with_state(state)
}

// =============================================================================
// HTTP Server
// =============================================================================

/// HTTP server.
pub struct HttpServer {
    port: u16,
    state: Arc<HttpState>,
    cancel: CancellationToken,
}

impl HttpServer {
    /// Create a new server.
    #[must_use]
    pub const fn new(port: u16, state: Arc<HttpState>, cancel: CancellationToken) -> Self {
        Self {
            port,
            state,
            cancel,
        }
    }

    /// Run the server until cancelled.
    ///
    /// # Errors
    ///
    /// Returns `HttpServerError` if binding fails or the HTTP server
    /// encounters a fatal error while running.
    pub async fn run(self) -> Result<(), HttpServerError> {
        let app = router(self.state);

        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| HttpServerError::BindFailed(self.port, e.to_string()))?;

        tracing::info!(port = self.port, "HTTP server listening");

        axum::serve(listener, app)
            .with_graceful_shutdown(self.cancel.cancelled_owned())
            .await
            .map_err(|e| HttpServerError::ServerFailed(e.to_string()))?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

// =============================================================================
// Operational Handlers
// =============================================================================

async fn health_handler(State(state): State<Arc<HttpState>>) -> impl IntoResponse {
    let response = build_health_response(&state);
    let status_code = match response.status {
        HealthStatus::Healthy | HealthStatus::Degraded => StatusCode::OK,
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };
    (status_code, Json(response))
}

async fn liveness_handler() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

async fn readiness_handler(State(state): State<Arc<HttpState>>) -> impl IntoResponse {
    if state.hub.sync().is_connected() {
        (StatusCode::OK, "READY")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "NOT READY")
    }
}

async fn metrics_handler() -> impl IntoResponse {
    get_metrics_handle().map_or_else(
        || {
            (
                StatusCode::SERVICE_UNAVAILABLE,
                [("content-type", "text/plain")],
                "Metrics not initialized".to_string(),
            )
        },
        |handle| {
            let body = handle.render();
            (
                StatusCode::OK,
                [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
                body,
            )
        },
    )
}

fn build_health_response(state: &HttpState) -> HealthResponse {
    let sync = state.hub.sync();
    let stats = sync.stats();
    let consumers = state.hub.stats().consumer_count;

    let stream = StreamInfo {
        state: stats.state,
        connected: stats.is_connected,
        reconnect_attempts: stats.reconnect_attempts,
        messages_received: stats.messages_received,
        messages_malformed: stats.messages_malformed,
    };

    HealthResponse {
        status: determine_health_status(&stream, consumers),
        version: state.version.clone(),
        uptime_secs: state.started_at.elapsed().as_secs(),
        current_time: Utc::now(),
        stream,
        consumers,
        subscriptions: SubscriptionStatus {
            symbols: stats.subscribed_symbols,
            broadcast_receivers: sync.broadcast().stats().total_receivers(),
        },
    }
}

fn determine_health_status(stream: &StreamInfo, consumers: usize) -> HealthStatus {
    if stream.connected || consumers == 0 {
        HealthStatus::Healthy
    } else if stream.state == SyncState::Closed {
        HealthStatus::Unhealthy
    } else {
        HealthStatus::Degraded
    }
}

// =============================================================================
// Price Handlers
// =============================================================================

async fn prices_handler(
    State(state): State<Arc<HttpState>>,
    Query(query): Query<SymbolsQuery>,
) -> Result<Json<PricesResponse>, ApiError> {
    let symbols = query.parse()?;
    let sync = state.hub.sync();

    let response = if symbols.is_empty() {
        PricesResponse {
            is_connected: sync.is_connected(),
            state: sync.state(),
            top10_data: sync.top(DEFAULT_TOP_LIMIT),
            live_prices_map: sync.live_prices(),
            live_price_changes_map: sync.live_price_changes(),
        }
    } else {
        let records: Vec<LivePriceRecord> = symbols
            .iter()
            .filter_map(|s| sync.record(s.as_str()))
            .collect();
        PricesResponse {
            is_connected: sync.is_connected(),
            state: sync.state(),
            live_prices_map: records
                .iter()
                .filter_map(|r| r.last_price.map(|p| (r.symbol.clone(), p)))
                .collect(),
            live_price_changes_map: records
                .iter()
                .filter_map(|r| r.price_change_percent_24h.map(|c| (r.symbol.clone(), c)))
                .collect(),
            top10_data: records,
        }
    };

    Ok(Json(response))
}

async fn price_stream_handler(
    State(state): State<Arc<HttpState>>,
    Query(query): Query<SymbolsQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let symbols = query.parse()?;
    let consumer = Arc::new(state.hub.attach(&symbols).await);

    tracing::debug!(consumer = consumer.id(), "SSE client attached");

    let initial = Event::default()
        .event("snapshot")
        .json_data(consumer.snapshot())
        .unwrap_or_else(|_| Event::default().event("snapshot").data("[]"));

    let prices = BroadcastStream::new(consumer.updates()).filter_map({
        let consumer = Arc::clone(&consumer);
        move |item| match item {
            Ok(update) if consumer.wants(update.record.symbol.as_str()) => {
                Event::default().event("price").json_data(&update).ok()
            }
            _ => None,
        }
    });

    // Holds the consumer; the stream ending detaches it.
    let status = BroadcastStream::new(consumer.status_updates()).filter_map(move |item| {
        let _held = &consumer;
        item.ok()
            .and_then(|status| Event::default().event("status").json_data(status).ok())
    });

    let stream = tokio_stream::once(initial)
        .chain(prices.merge(status))
        .map(Ok::<_, Infallible>);

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

// =============================================================================
// Proxy Handlers
// =============================================================================

async fn drag_drop_cards_handler(
    State(state): State<Arc<HttpState>>,
    Query(params): Query<Vec<(String, String)>>,
) -> Response {
    let result = state.proxy.drag_drop_cards(&params).await;

    let mut response = match result {
        Ok(results) => {
            record_proxy_request("drag_drop_cards", 200);
            Json(json!({ "success": true, "results": results })).into_response()
        }
        Err(e) => {
            tracing::warn!(error = %e, "Drag-drop cards proxy failed");
            record_proxy_request("drag_drop_cards", e.status_code());
            ApiError::from(e).into_response()
        }
    };

    response.headers_mut().insert(
        header::ACCESS_CONTROL_ALLOW_ORIGIN,
        HeaderValue::from_static("*"),
    );
    response
}

async fn cors_preflight_handler() -> impl IntoResponse {
    (
        StatusCode::OK,
        [
            (header::ACCESS_CONTROL_ALLOW_ORIGIN, "*"),
            (header::ACCESS_CONTROL_ALLOW_METHODS, "GET, OPTIONS"),
            (
                header::ACCESS_CONTROL_ALLOW_HEADERS,
                "Content-Type, Authorization",
            ),
        ],
    )
}

async fn favorites_handler(
    State(state): State<Arc<HttpState>>,
    Query(query): Query<FavoritesQuery>,
) -> Response {
    match state.proxy.favorites(&query).await {
        Ok((status, body)) => {
            record_proxy_request("favorites", status);
            let status = StatusCode::from_u16(status).unwrap_or(StatusCode::BAD_GATEWAY);
            (status, Json(body)).into_response()
        }
        Err(e) => {
            tracing::warn!(error = %e, "Favorites proxy failed");
            let status = match e {
                ProxyError::NotConfigured(_) => StatusCode::SERVICE_UNAVAILABLE,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            };
            record_proxy_request("favorites", status.as_u16());
            ApiError {
                status,
                message: e.to_string(),
            }
            .into_response()
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use axum::body::{Body, to_bytes};
    use axum::http::{Method, Request};
    use tower::ServiceExt;

    use super::*;
    use crate::application::ports::{
        SnapshotError, SnapshotRequest, SnapshotSource, StreamConnection, StreamError,
        StreamTransport,
    };
    use crate::application::services::{LiveTickerSync, SyncConfig};
    use crate::domain::subscription::SubscriptionSet;
    use crate::domain::ticker::{Instrument, TickerUpdate};
    use crate::infrastructure::broadcast::BroadcastHub;
    use crate::infrastructure::config::ProxySettings;
    use crate::infrastructure::stream::TickerCodec;

    struct StaticSnapshot;

    #[async_trait]
    impl SnapshotSource for StaticSnapshot {
        async fn fetch(
            &self,
            _request: &SnapshotRequest,
        ) -> Result<Vec<Instrument>, SnapshotError> {
            Ok(vec![Instrument::new(
                Symbol::parse("BTC").unwrap(),
                Decimal::new(50_000, 0),
            )])
        }
    }

    struct PendingTransport;

    #[async_trait]
    impl StreamTransport for PendingTransport {
        async fn open(
            &self,
            _subscription: &SubscriptionSet,
        ) -> Result<Box<dyn StreamConnection>, StreamError> {
            std::future::pending().await
        }
    }

    fn state() -> Arc<HttpState> {
        let sync = LiveTickerSync::new(
            Arc::new(StaticSnapshot),
            Arc::new(PendingTransport),
            TickerCodec::new("USDT"),
            Arc::new(BroadcastHub::with_defaults()),
            SyncConfig::default(),
        );
        let proxy = ProxyClient::new(ProxySettings::default()).unwrap();
        Arc::new(HttpState::new(
            "test".to_string(),
            LiveTickerHub::new(sync),
            proxy,
        ))
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    async fn json_body(response: Response) -> serde_json::Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[test]
    fn health_status_serialization() {
        assert_eq!(
            serde_json::to_string(&HealthStatus::Healthy).unwrap(),
            "\"healthy\""
        );
        assert_eq!(
            serde_json::to_string(&HealthStatus::Unhealthy).unwrap(),
            "\"unhealthy\""
        );
    }

    #[test]
    fn determine_status_by_connection() {
        let mut stream = StreamInfo {
            state: SyncState::Reconnecting,
            connected: false,
            reconnect_attempts: 3,
            messages_received: 0,
            messages_malformed: 0,
        };
        assert_eq!(determine_health_status(&stream, 0), HealthStatus::Healthy);
        assert_eq!(determine_health_status(&stream, 2), HealthStatus::Degraded);

        stream.state = SyncState::Closed;
        assert_eq!(determine_health_status(&stream, 2), HealthStatus::Unhealthy);

        stream.connected = true;
        assert_eq!(determine_health_status(&stream, 2), HealthStatus::Healthy);
    }

    #[tokio::test]
    async fn liveness_is_ok() {
        let response = router(state()).oneshot(get("/healthz")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn readiness_requires_connection() {
        let response = router(state()).oneshot(get("/readyz")).await.unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn health_reports_stream_state() {
        let response = router(state()).oneshot(get("/health")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = json_body(response).await;
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["stream"]["state"], "idle");
        assert_eq!(body["consumers"], 0);
    }

    #[tokio::test]
    async fn prices_filter_by_symbols() {
        let state = state();
        let sync = state.hub.sync();
        sync.apply_update(
            &TickerUpdate::new(Symbol::parse("BTC").unwrap(), Decimal::new(51_000, 0))
                .with_change_percent(Decimal::new(2, 0)),
        );
        sync.apply_update(&TickerUpdate::new(
            Symbol::parse("ETH").unwrap(),
            Decimal::new(3_000, 0),
        ));

        let response = router(Arc::clone(&state))
            .oneshot(get("/api/prices?symbols=btc,doge"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = json_body(response).await;
        assert_eq!(body["isConnected"], false);
        assert_eq!(body["top10Data"].as_array().unwrap().len(), 1);
        assert_eq!(body["livePricesMap"]["BTC"], "51000");
        assert_eq!(body["livePriceChangesMap"]["BTC"], "2");
        assert!(body["livePricesMap"].get("ETH").is_none());
        assert!(body["livePricesMap"].get("DOGE").is_none());
        assert_eq!(body["livePricesMap"].as_object().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn prices_reject_invalid_symbols() {
        let response = router(state())
            .oneshot(get("/api/prices?symbols=B-T"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(response).await["success"], false);
    }

    #[tokio::test]
    async fn price_stream_starts_with_snapshot() {
        let state = state();
        let response = router(Arc::clone(&state))
            .oneshot(get("/api/prices/stream?symbols=BTC"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(state.hub.stats().consumer_count, 1);

        let mut body = response.into_body().into_data_stream();
        let first = body.next().await.unwrap().unwrap();
        let text = String::from_utf8(first.to_vec()).unwrap();
        assert!(text.starts_with("event: snapshot"));
        assert!(text.contains("\"BTC\""));
    }

    #[tokio::test]
    async fn unconfigured_proxy_answers_503() {
        let response = router(state())
            .oneshot(get("/api/drag-drop-cards"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(
            response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN],
            "*"
        );

        let body = json_body(response).await;
        assert_eq!(body["success"], false);
        assert_eq!(body["status"], 503);
    }

    #[tokio::test]
    async fn preflight_allows_any_origin() {
        let request = Request::builder()
            .method(Method::OPTIONS)
            .uri("/api/drag-drop-cards")
            .body(Body::empty())
            .unwrap();
        let response = router(state()).oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::ACCESS_CONTROL_ALLOW_METHODS],
            "GET, OPTIONS"
        );
    }

    #[tokio::test]
    async fn unconfigured_favorites_answers_503() {
        let response = router(state())
            .oneshot(get("/api/proxy/favorites?userId=1"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
