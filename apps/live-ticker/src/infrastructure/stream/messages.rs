//! Ticker Stream Message Types
//!
//! Wire shapes of the inbound frames. Numeric fields accept JSON strings
//! or numbers.
//!
//! # Message Types
//!
//! | `e` | Struct |
//! |-----|--------|
//! | `24hrTicker` | [`TickerEvent`] |
//! | `24hrMiniTicker` | [`MiniTickerEvent`] |
//! | `trade` | [`TradeEvent`] |
//! | (absent, has `symbol`) | [`NormalizedEvent`] |

use rust_decimal::Decimal;
use serde::Deserialize;

/// Combined-stream envelope: `{"stream": "btcusdt@ticker", "data": {...}}`.
#[derive(Debug, Clone, Deserialize)]
pub struct CombinedEnvelope {
    /// Stream name.
    pub stream: String,
    /// Wrapped payload.
    pub data: serde_json::Value,
}

/// 24h rolling ticker.
#[derive(Debug, Clone, Deserialize)]
pub struct TickerEvent {
    /// Event time (ms since epoch).
    #[serde(rename = "E", default)]
    pub event_time: Option<i64>,
    /// Exchange pair, e.g. `BTCUSDT`.
    #[serde(rename = "s")]
    pub pair: String,
    /// Last price.
    #[serde(rename = "c")]
    pub last_price: Decimal,
    /// Price change percent.
    #[serde(rename = "P", default)]
    pub price_change_percent: Option<Decimal>,
    /// High price.
    #[serde(rename = "h", default)]
    pub high: Option<Decimal>,
    /// Low price.
    #[serde(rename = "l", default)]
    pub low: Option<Decimal>,
    /// Base asset volume.
    #[serde(rename = "v", default)]
    pub volume: Option<Decimal>,
}

/// Reduced 24h rolling ticker.
#[derive(Debug, Clone, Deserialize)]
pub struct MiniTickerEvent {
    /// Event time (ms since epoch).
    #[serde(rename = "E", default)]
    pub event_time: Option<i64>,
    /// Exchange pair.
    #[serde(rename = "s")]
    pub pair: String,
    /// Close price.
    #[serde(rename = "c")]
    pub close: Decimal,
    /// Open price 24h ago.
    #[serde(rename = "o", default)]
    pub open: Option<Decimal>,
    /// High price.
    #[serde(rename = "h", default)]
    pub high: Option<Decimal>,
    /// Low price.
    #[serde(rename = "l", default)]
    pub low: Option<Decimal>,
    /// Base asset volume.
    #[serde(rename = "v", default)]
    pub volume: Option<Decimal>,
}

impl MiniTickerEvent {
    /// Percent change from open to close, when open is known and nonzero.
    ///
    /// `None` when the result does not fit in a `Decimal`.
    #[must_use]
    pub fn change_percent(&self) -> Option<Decimal> {
        let open = self.open.filter(|o| !o.is_zero())?;
        self.close
            .checked_sub(open)?
            .checked_div(open)?
            .checked_mul(Decimal::ONE_HUNDRED)
            .map(|change| change.round_dp(2))
    }
}

/// Single trade.
#[derive(Debug, Clone, Deserialize)]
pub struct TradeEvent {
    /// Event time (ms since epoch).
    #[serde(rename = "E", default)]
    pub event_time: Option<i64>,
    /// Exchange pair.
    #[serde(rename = "s")]
    pub pair: String,
    /// Trade price.
    #[serde(rename = "p")]
    pub price: Decimal,
}

/// Already-normalized update, as relayed by an internal feed.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedEvent {
    /// Symbol or exchange pair.
    pub symbol: String,
    /// Latest price.
    pub price: Decimal,
    /// 24h change percent.
    #[serde(default)]
    pub price_change_percent: Option<Decimal>,
    /// Event time (ms since epoch).
    #[serde(default)]
    pub timestamp: Option<i64>,
}

/// Tagged inbound message.
#[derive(Debug, Clone)]
pub enum StreamMessage {
    /// `24hrTicker`.
    Ticker(TickerEvent),
    /// `24hrMiniTicker`.
    MiniTicker(MiniTickerEvent),
    /// `trade`.
    Trade(TradeEvent),
    /// Untagged normalized update.
    Normalized(NormalizedEvent),
}

impl StreamMessage {
    /// Short name for metrics labels.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Ticker(_) => "ticker",
            Self::MiniTicker(_) => "mini_ticker",
            Self::Trade(_) => "trade",
            Self::Normalized(_) => "normalized",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ticker_accepts_strings_and_numbers() {
        let from_str: TickerEvent =
            serde_json::from_str(r#"{"s":"BTCUSDT","c":"51000.5","P":"2.0"}"#).unwrap();
        let from_num: TickerEvent =
            serde_json::from_str(r#"{"s":"BTCUSDT","c":51000.5,"P":2}"#).unwrap();

        assert_eq!(from_str.last_price, Decimal::new(510_005, 1));
        assert_eq!(from_num.last_price, Decimal::new(510_005, 1));
        assert_eq!(from_num.price_change_percent, Some(Decimal::TWO));
    }

    #[test]
    fn mini_ticker_change_from_open() {
        let event: MiniTickerEvent =
            serde_json::from_str(r#"{"s":"ETHUSDT","c":"110","o":"100"}"#).unwrap();
        assert_eq!(event.change_percent(), Some(Decimal::TEN));

        let zero_open: MiniTickerEvent =
            serde_json::from_str(r#"{"s":"ETHUSDT","c":"110","o":"0"}"#).unwrap();
        assert_eq!(zero_open.change_percent(), None);
    }

    #[test]
    fn mini_ticker_change_overflow_is_none() {
        let event = MiniTickerEvent {
            event_time: None,
            pair: "BTCUSDT".to_string(),
            close: Decimal::MAX,
            open: Some(Decimal::new(1, 28)),
            high: None,
            low: None,
            volume: None,
        };
        assert_eq!(event.change_percent(), None);

        let tiny_drop = MiniTickerEvent {
            close: Decimal::MIN,
            open: Some(Decimal::ONE),
            ..event
        };
        assert_eq!(tiny_drop.change_percent(), None);
    }

    #[test]
    fn ticker_missing_price_is_error() {
        assert!(serde_json::from_str::<TickerEvent>(r#"{"s":"BTCUSDT","P":"1"}"#).is_err());
    }
}
