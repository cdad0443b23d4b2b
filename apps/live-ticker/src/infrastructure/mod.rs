//! Infrastructure Layer - Adapters and external integrations.
//!
//! This layer contains the concrete implementations of the port interfaces
//! defined in the application layer, plus the service's outer surfaces.

/// Ticker stream: codec, reconnect, heartbeat and WebSocket transport.
pub mod stream;

/// HTTP snapshot source.
pub mod snapshot;

/// Broadcast channel adapters for change notification.
pub mod broadcast;

/// Configuration from environment variables.
pub mod config;

/// HTTP server: prices, SSE, forwarding routes, health.
pub mod http;

/// Upstream forwarding client.
pub mod proxy;

/// Prometheus metrics instrumentation.
pub mod metrics;

/// OpenTelemetry tracing integration.
pub mod telemetry;
