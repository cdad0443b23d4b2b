//! Live Ticker Binary
//!
//! Starts the live price synchronization service.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin live-ticker
//! ```
//!
//! # Environment Variables
//!
//! ## Required
//! - `SNAPSHOT_URL`: Snapshot endpoint returning baseline prices
//!
//! ## Optional
//! - `SNAPSHOT_TIMEOUT_SECS`: Snapshot timeout (default: 10)
//! - `SNAPSHOT_TOP_N`: Size of the default top set (default: 10)
//! - `SNAPSHOT_FALLBACK`: placeholder | empty (default: placeholder)
//! - `STREAM_BASE_URL`: Ticker stream base URL (default: <wss://stream.binance.com:9443>)
//! - `STREAM_KIND`: ticker | miniTicker | trade (default: ticker)
//! - `LIVE_TICKER_CONNECT_TIMEOUT_SECS`: Stream connect timeout (default: 10)
//! - `LIVE_TICKER_HTTP_PORT`: HTTP port (default: 8083)
//! - `LIVE_TICKER_PRELOAD_TOP`: Keep the top set streaming from startup (default: true)
//! - `PROXY_ADMIN_API_URL` / `PROXY_FAVORITES_URL`: Forwarding upstreams
//! - `OTEL_ENABLED`: Enable OpenTelemetry (default: true)
//! - `OTEL_EXPORTER_OTLP_ENDPOINT`: OTLP endpoint (default: <http://localhost:4318>)
//! - `OTEL_SERVICE_NAME`: Service name (default: live-ticker)
//! - `RUST_LOG`: Log level (default: info)

use std::sync::Arc;
use std::time::Duration;

use live_ticker::infrastructure::broadcast::{BroadcastConfig, BroadcastHub};
use live_ticker::infrastructure::telemetry;
use live_ticker::{
    HttpServer, HttpSnapshotSource, HttpState, LiveTickerHub, LiveTickerSync, ProxyClient,
    ServiceConfig, StreamEndpoint, SyncConfig, TickerCodec, WorkerConfig, WsTransport,
    init_metrics,
};
use tokio::signal;
use tokio_util::sync::CancellationToken;

/// Graceful shutdown timeout.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("Failed to install rustls crypto provider");

    load_dotenv();

    // Initialize telemetry (OpenTelemetry + tracing)
    let _telemetry_guard = telemetry::init();

    tracing::info!("Starting Live Ticker");

    // Initialize Prometheus metrics
    let _metrics_handle = init_metrics();

    let config = ServiceConfig::from_env()?;
    log_config(&config);

    let shutdown_token = CancellationToken::new();

    let broadcast_hub = Arc::new(BroadcastHub::new(BroadcastConfig::from(
        config.broadcast.clone(),
    )));

    let snapshot = Arc::new(HttpSnapshotSource::from_settings(&config.snapshot)?);
    let endpoint = StreamEndpoint::new(
        config.stream.base_url.clone(),
        config.stream.kind,
        config.stream.quote_asset.clone(),
    );
    let transport = Arc::new(
        WsTransport::new(endpoint).with_connect_timeout(config.websocket.connect_timeout),
    );

    let sync = LiveTickerSync::new(
        snapshot,
        transport,
        TickerCodec::new(config.stream.quote_asset.clone()),
        Arc::clone(&broadcast_hub),
        SyncConfig {
            snapshot_timeout: config.snapshot.timeout,
            top_n: config.snapshot.top_n,
            fallback: config.snapshot.fallback.clone(),
            worker: WorkerConfig::from_websocket_settings(&config.websocket),
            ..SyncConfig::default()
        },
    );
    let hub = LiveTickerHub::new(sync.clone());

    let proxy = ProxyClient::new(config.proxy.clone())?;
    let http_state = Arc::new(HttpState::new(
        env!("CARGO_PKG_VERSION").to_string(),
        hub.clone(),
        proxy,
    ));
    let http_server = HttpServer::new(
        config.server.http_port,
        http_state,
        shutdown_token.clone(),
    );

    let http_task = tokio::spawn(async move {
        if let Err(e) = http_server.run().await {
            tracing::error!(error = %e, "HTTP server error");
        }
    });

    // Keep the dashboard set warm for the lifetime of the process.
    let preload = if config.server.preload_top {
        let consumer = hub.attach(&[]).await;
        tracing::info!(symbols = consumer.symbols().len(), "Top set preloaded");
        Some(consumer)
    } else {
        None
    };

    tracing::info!("Live ticker ready");

    await_shutdown(shutdown_token).await;

    let drain = async {
        if let Some(consumer) = preload {
            consumer.release().await;
        }
        sync.teardown().await;
        let _ = http_task.await;
    };
    if tokio::time::timeout(SHUTDOWN_TIMEOUT, drain).await.is_err() {
        tracing::warn!("Graceful shutdown timed out");
    }

    tracing::info!("Live ticker stopped");
    Ok(())
}

/// Log the parsed configuration.
fn log_config(config: &ServiceConfig) {
    tracing::info!(
        snapshot_url = %config.snapshot.url,
        top_n = config.snapshot.top_n,
        stream_kind = config.stream.kind.as_str(),
        http_port = config.server.http_port,
        preload_top = config.server.preload_top,
        "Configuration loaded"
    );
    tracing::debug!(
        stream_base_url = %config.stream.base_url,
        quote_asset = %config.stream.quote_asset,
        admin_api = config.proxy.admin_api_url.is_some(),
        favorites = config.proxy.favorites_url.is_some(),
        "Upstream endpoints"
    );
}

/// Load .env file from current directory or any ancestor directory.
fn load_dotenv() {
    if dotenvy::dotenv().is_ok() {
        return;
    }

    if let Ok(cwd) = std::env::current_dir() {
        let mut dir = cwd.as_path();
        while let Some(parent) = dir.parent() {
            let env_path = parent.join(".env");
            if env_path.exists() {
                let _ = dotenvy::from_path(&env_path);
                return;
            }
            dir = parent;
        }
    }
}

/// Wait for shutdown signal (SIGTERM or SIGINT).
#[allow(clippy::expect_used)]
async fn await_shutdown(shutdown_token: CancellationToken) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("signal handler installation is critical for graceful shutdown");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("SIGTERM handler installation is critical for graceful shutdown")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, initiating shutdown");
        }
    }

    shutdown_token.cancel();

    tracing::info!(
        timeout_secs = SHUTDOWN_TIMEOUT.as_secs(),
        "Graceful shutdown started"
    );
}
