//! Service Configuration Settings
//!
//! Configuration types for the live ticker service, loaded from environment
//! variables.

use std::time::Duration;

use crate::application::services::FallbackPolicy;
use crate::domain::ticker::{Symbol, SymbolError};
use crate::infrastructure::stream::StreamKind;

const DEFAULT_FALLBACK_SYMBOLS: &str = "BTC,ETH,BNB,SOL,XRP,ADA,DOGE,AVAX,DOT,LINK";

/// Snapshot source settings.
#[derive(Debug, Clone)]
pub struct SnapshotSettings {
    /// Snapshot endpoint URL.
    pub url: String,
    /// Per-request timeout.
    pub timeout: Duration,
    /// Size of the default "top" set.
    pub top_n: usize,
    /// What to show when the snapshot fails.
    pub fallback: FallbackPolicy,
}

/// Upstream ticker stream settings.
#[derive(Debug, Clone)]
pub struct StreamSettings {
    /// WebSocket base URL, without the `/stream` path.
    pub base_url: String,
    /// Which ticker variant to subscribe to.
    pub kind: StreamKind,
    /// Quote asset appended to symbols to form exchange pairs.
    pub quote_asset: String,
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            base_url: "wss://stream.binance.com:9443".to_string(),
            kind: StreamKind::Ticker,
            quote_asset: "USDT".to_string(),
        }
    }
}

/// WebSocket connection settings.
#[derive(Debug, Clone)]
pub struct WebSocketSettings {
    /// Heartbeat ping interval.
    pub heartbeat_interval: Duration,
    /// Heartbeat timeout before considering connection dead.
    pub heartbeat_timeout: Duration,
    /// Initial reconnection delay.
    pub reconnect_delay_initial: Duration,
    /// Maximum reconnection delay.
    pub reconnect_delay_max: Duration,
    /// Reconnection delay multiplier for exponential backoff.
    pub reconnect_delay_multiplier: f64,
    /// Maximum reconnection attempts before giving up (0 = unlimited).
    pub max_reconnect_attempts: u32,
    /// Limit on one connect and handshake.
    pub connect_timeout: Duration,
}

impl Default for WebSocketSettings {
    fn default() -> Self {
        Self {
            heartbeat_interval: Duration::from_secs(30),
            heartbeat_timeout: Duration::from_secs(60),
            reconnect_delay_initial: Duration::from_millis(500),
            reconnect_delay_max: Duration::from_secs(30),
            reconnect_delay_multiplier: 2.0,
            max_reconnect_attempts: 0, // Unlimited
            connect_timeout: Duration::from_secs(10),
        }
    }
}

/// Broadcast channel settings.
#[derive(Debug, Clone)]
pub struct BroadcastSettings {
    /// Capacity of the price update channel.
    pub price_updates_capacity: usize,
    /// Capacity of the connection status channel.
    pub status_capacity: usize,
}

impl Default for BroadcastSettings {
    fn default() -> Self {
        Self {
            price_updates_capacity: 4_096,
            status_capacity: 64,
        }
    }
}

/// HTTP server settings.
#[derive(Debug, Clone)]
pub struct ServerSettings {
    /// HTTP port for prices, proxy routes, health and metrics.
    pub http_port: u16,
    /// Attach a process-lifetime consumer for the top set at startup.
    pub preload_top: bool,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            http_port: 8083,
            preload_top: true,
        }
    }
}

/// Upstream settings for the forwarding routes.
#[derive(Debug, Clone)]
pub struct ProxySettings {
    /// Admin API serving drag-and-drop cards.
    pub admin_api_url: Option<String>,
    /// Favorites API.
    pub favorites_url: Option<String>,
    /// Injected `sentiment` when the caller omits it.
    pub default_sentiment: String,
    /// Injected `type` when the caller omits it.
    pub default_type: String,
    /// Injected `selectedUserId` when the caller omits it.
    pub default_selected_user_id: Option<String>,
    /// Upstream request timeout.
    pub timeout: Duration,
}

impl Default for ProxySettings {
    fn default() -> Self {
        Self {
            admin_api_url: None,
            favorites_url: None,
            default_sentiment: "strong_bullish".to_string(),
            default_type: "yearly".to_string(),
            default_selected_user_id: None,
            timeout: Duration::from_secs(60),
        }
    }
}

/// Complete service configuration.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Snapshot source settings.
    pub snapshot: SnapshotSettings,
    /// Ticker stream settings.
    pub stream: StreamSettings,
    /// WebSocket connection settings.
    pub websocket: WebSocketSettings,
    /// Broadcast channel settings.
    pub broadcast: BroadcastSettings,
    /// HTTP server settings.
    pub server: ServerSettings,
    /// Forwarding route settings.
    pub proxy: ProxySettings,
}

impl ServiceConfig {
    /// Create configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if required environment variables are missing.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create configuration from an arbitrary key lookup.
    ///
    /// # Errors
    ///
    /// Returns an error if required variables are missing or the fallback
    /// symbol list is invalid.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Env(lookup);

        let url = env
            .get("SNAPSHOT_URL")
            .ok_or_else(|| ConfigError::MissingEnvVar("SNAPSHOT_URL".to_string()))?;
        if url.trim().is_empty() {
            return Err(ConfigError::EmptyValue("SNAPSHOT_URL".to_string()));
        }

        let fallback = match env.get("SNAPSHOT_FALLBACK").as_deref().map(str::trim) {
            None | Some("placeholder") => {
                let raw = env
                    .get("SNAPSHOT_FALLBACK_SYMBOLS")
                    .unwrap_or_else(|| DEFAULT_FALLBACK_SYMBOLS.to_string());
                let symbols = Symbol::parse_list(&raw).map_err(|source| {
                    ConfigError::InvalidSymbol {
                        key: "SNAPSHOT_FALLBACK_SYMBOLS".to_string(),
                        source,
                    }
                })?;
                if symbols.is_empty() {
                    return Err(ConfigError::EmptyValue(
                        "SNAPSHOT_FALLBACK_SYMBOLS".to_string(),
                    ));
                }
                FallbackPolicy::Placeholder(symbols)
            }
            Some("empty") => FallbackPolicy::Empty,
            Some(other) => {
                return Err(ConfigError::InvalidValue {
                    key: "SNAPSHOT_FALLBACK".to_string(),
                    value: other.to_string(),
                });
            }
        };

        let snapshot = SnapshotSettings {
            url,
            timeout: env.duration_secs("SNAPSHOT_TIMEOUT_SECS", Duration::from_secs(10)),
            top_n: env.parse("SNAPSHOT_TOP_N", 10),
            fallback,
        };

        let stream_defaults = StreamSettings::default();
        let stream = StreamSettings {
            base_url: env
                .get("STREAM_BASE_URL")
                .unwrap_or(stream_defaults.base_url),
            kind: env
                .get("STREAM_KIND")
                .map_or(stream_defaults.kind, |s| {
                    StreamKind::from_str_case_insensitive(&s)
                }),
            quote_asset: env
                .get("STREAM_QUOTE_ASSET")
                .map_or(stream_defaults.quote_asset, |s| s.trim().to_uppercase()),
        };

        let ws_defaults = WebSocketSettings::default();
        let websocket = WebSocketSettings {
            heartbeat_interval: env.duration_secs(
                "LIVE_TICKER_HEARTBEAT_INTERVAL_SECS",
                ws_defaults.heartbeat_interval,
            ),
            heartbeat_timeout: env.duration_secs(
                "LIVE_TICKER_HEARTBEAT_TIMEOUT_SECS",
                ws_defaults.heartbeat_timeout,
            ),
            reconnect_delay_initial: env.duration_millis(
                "LIVE_TICKER_RECONNECT_DELAY_INITIAL_MS",
                ws_defaults.reconnect_delay_initial,
            ),
            reconnect_delay_max: env.duration_secs(
                "LIVE_TICKER_RECONNECT_DELAY_MAX_SECS",
                ws_defaults.reconnect_delay_max,
            ),
            reconnect_delay_multiplier: env.parse(
                "LIVE_TICKER_RECONNECT_DELAY_MULTIPLIER",
                ws_defaults.reconnect_delay_multiplier,
            ),
            max_reconnect_attempts: env.parse(
                "LIVE_TICKER_MAX_RECONNECT_ATTEMPTS",
                ws_defaults.max_reconnect_attempts,
            ),
            connect_timeout: env.duration_secs(
                "LIVE_TICKER_CONNECT_TIMEOUT_SECS",
                ws_defaults.connect_timeout,
            ),
        };

        let broadcast_defaults = BroadcastSettings::default();
        let broadcast = BroadcastSettings {
            price_updates_capacity: env.parse(
                "LIVE_TICKER_UPDATES_CAPACITY",
                broadcast_defaults.price_updates_capacity,
            ),
            status_capacity: env.parse(
                "LIVE_TICKER_STATUS_CAPACITY",
                broadcast_defaults.status_capacity,
            ),
        };

        let server_defaults = ServerSettings::default();
        let server = ServerSettings {
            http_port: env.parse("LIVE_TICKER_HTTP_PORT", server_defaults.http_port),
            preload_top: env.parse("LIVE_TICKER_PRELOAD_TOP", server_defaults.preload_top),
        };

        let proxy_defaults = ProxySettings::default();
        let proxy = ProxySettings {
            admin_api_url: env.non_empty("PROXY_ADMIN_API_URL"),
            favorites_url: env.non_empty("PROXY_FAVORITES_URL"),
            default_sentiment: env
                .non_empty("PROXY_DEFAULT_SENTIMENT")
                .unwrap_or(proxy_defaults.default_sentiment),
            default_type: env
                .non_empty("PROXY_DEFAULT_TYPE")
                .unwrap_or(proxy_defaults.default_type),
            default_selected_user_id: env.non_empty("PROXY_DEFAULT_SELECTED_USER_ID"),
            timeout: env.duration_secs("PROXY_TIMEOUT_SECS", proxy_defaults.timeout),
        };

        Ok(Self {
            snapshot,
            stream,
            websocket,
            broadcast,
            server,
            proxy,
        })
    }
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Required environment variable is missing.
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),
    /// Environment variable has empty value.
    #[error("environment variable {0} cannot be empty")]
    EmptyValue(String),
    /// Environment variable has an unsupported value.
    #[error("environment variable {key} has unsupported value {value:?}")]
    InvalidValue {
        /// Variable name.
        key: String,
        /// Offending value.
        value: String,
    },
    /// A symbol list contains an invalid entry.
    #[error("environment variable {key}: {source}")]
    InvalidSymbol {
        /// Variable name.
        key: String,
        /// Parse failure.
        source: SymbolError,
    },
}

/// Lookup wrapper with the default-on-invalid parsing helpers.
struct Env<F>(F);

impl<F> Env<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn get(&self, key: &str) -> Option<String> {
        (self.0)(key)
    }

    fn non_empty(&self, key: &str) -> Option<String> {
        self.get(key).filter(|v| !v.trim().is_empty())
    }

    fn parse<T: std::str::FromStr>(&self, key: &str, default: T) -> T {
        self.get(key)
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(default)
    }

    fn duration_secs(&self, key: &str, default: Duration) -> Duration {
        self.get(key)
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map_or(default, Duration::from_secs)
    }

    fn duration_millis(&self, key: &str, default: Duration) -> Duration {
        self.get(key)
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map_or(default, Duration::from_millis)
    }
}
