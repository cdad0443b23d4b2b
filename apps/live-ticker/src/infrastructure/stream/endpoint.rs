//! Combined-stream endpoint addressing.
//!
//! One connection carries every symbol: the URL lists one stream name per
//! pair, e.g. `{base}/stream?streams=btcusdt@ticker/ethusdt@ticker`.

use crate::domain::subscription::SubscriptionSet;
use crate::domain::ticker::Symbol;

/// Ticker stream variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StreamKind {
    /// Full 24h rolling ticker.
    #[default]
    Ticker,
    /// Reduced 24h rolling ticker.
    MiniTicker,
    /// Individual trades.
    Trade,
}

impl StreamKind {
    /// Parse a stream kind, defaulting to `Ticker` on unknown input.
    #[must_use]
    pub fn from_str_case_insensitive(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "miniticker" | "mini_ticker" => Self::MiniTicker,
            "trade" => Self::Trade,
            _ => Self::Ticker,
        }
    }

    /// Suffix used in stream names.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Ticker => "ticker",
            Self::MiniTicker => "miniTicker",
            Self::Trade => "trade",
        }
    }
}

/// Where and how to open the combined ticker stream.
#[derive(Debug, Clone)]
pub struct StreamEndpoint {
    base_url: String,
    kind: StreamKind,
    quote_asset: String,
}

impl StreamEndpoint {
    /// Create an endpoint.
    #[must_use]
    pub fn new(base_url: impl Into<String>, kind: StreamKind, quote_asset: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            kind,
            quote_asset: quote_asset.into().to_uppercase(),
        }
    }

    /// Stream variant.
    #[must_use]
    pub const fn kind(&self) -> StreamKind {
        self.kind
    }

    /// Quote asset, uppercase.
    #[must_use]
    pub fn quote_asset(&self) -> &str {
        &self.quote_asset
    }

    /// Stream name for one symbol, e.g. `btcusdt@ticker`.
    #[must_use]
    pub fn stream_name(&self, symbol: &Symbol) -> String {
        format!(
            "{}{}@{}",
            symbol.as_str().to_lowercase(),
            self.quote_asset.to_lowercase(),
            self.kind.as_str()
        )
    }

    /// Combined-stream URL covering every symbol in `subscription`.
    #[must_use]
    pub fn url_for(&self, subscription: &SubscriptionSet) -> String {
        let streams: Vec<String> = subscription.iter().map(|s| self.stream_name(s)).collect();
        format!("{}/stream?streams={}", self.base_url, streams.join("/"))
    }
}
