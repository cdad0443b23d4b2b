#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::needless_pass_by_value,
        clippy::needless_collect,
        clippy::items_after_statements
    )
)]

//! Live Ticker - Market Price Synchronization
//!
//! Keeps a live, per-symbol view of crypto prices by combining a one-shot
//! REST snapshot with a continuous multiplexed ticker stream, and shares
//! that view with many consumers over one upstream connection.
//!
//! # Layers (inside → outside)
//!
//! - **Domain**: Core types with no I/O
//!   - `ticker`: symbols, instruments, live price records, the price book
//!   - `subscription`: subscription sets and per-consumer refcounting
//!
//! - **Application**: Use cases and port definitions
//!   - `ports`: snapshot source and stream transport interfaces
//!   - `services`: `LiveTickerSync` and the shared `LiveTickerHub`
//!
//! - **Infrastructure**: Adapters and external integrations
//!   - `stream`: WebSocket transport, codec, reconnect and heartbeat
//!   - `snapshot`: HTTP snapshot source
//!   - `broadcast`: change notification channels
//!   - `http`: prices, SSE, forwarding routes and health
//!   - `config`, `metrics`, `telemetry`
//!
//! # Data Flow
//!
//! ```text
//! Snapshot API ──► baseline ──┐
//!                             ▼
//! Ticker WS ──► StreamWorker ──► handler ──► PriceBook ──► Broadcast ──► SSE / consumers
//!                                                  │
//!                                                  └──► GET /api/prices
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Domain layer - Core types with no external dependencies.
pub mod domain;

/// Application layer - Use cases and port definitions.
pub mod application;

/// Infrastructure layer - Adapters and external integrations.
pub mod infrastructure;

// =============================================================================
// Re-exports
// =============================================================================

// Domain types
pub use domain::subscription::{
    ConsumerId, SubscriptionChanges, SubscriptionManager, SubscriptionSet, SubscriptionStats,
};
pub use domain::ticker::{
    ApplyOutcome, Instrument, LivePriceRecord, PriceBook, PriceSource, Symbol, SymbolError,
    SyncState, TickerUpdate,
};

// Ports
pub use application::ports::{
    Frame, SnapshotError, SnapshotRequest, SnapshotSource, StreamConnection, StreamError,
    StreamTransport,
};

// Services
pub use application::services::{
    FallbackPolicy, LiveTickerHub, LiveTickerSync, SyncConfig, SyncStats, TickerConsumer,
};

// Infrastructure config
pub use infrastructure::config::{
    BroadcastSettings, ConfigError, ProxySettings, ServerSettings, ServiceConfig,
    SnapshotSettings, StreamSettings, WebSocketSettings,
};

// Broadcast hub
pub use infrastructure::broadcast::{
    BroadcastConfig, BroadcastHub, BroadcastStats, ConnectionStatusBroadcast,
    PriceUpdateBroadcast,
};

// Stream adapters
pub use infrastructure::stream::{
    StreamEndpoint, StreamEvent, StreamKind, TickerCodec, WorkerConfig, WsTransport,
};

// HTTP
pub use infrastructure::http::{HttpServer, HttpServerError, HttpState};
pub use infrastructure::proxy::{ProxyClient, ProxyError};
pub use infrastructure::snapshot::HttpSnapshotSource;

// Metrics
pub use infrastructure::metrics::init_metrics;

// Telemetry
pub use infrastructure::telemetry::{TelemetryConfig, TelemetryGuard, init as init_telemetry};
