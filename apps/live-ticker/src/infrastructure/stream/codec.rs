//! Ticker Stream Codec
//!
//! Decodes raw text frames into normalized [`TickerUpdate`]s.
//!
//! A frame may be a single event object, a JSON array of events, or a
//! combined-stream envelope wrapping either. Elements are decoded
//! independently: one malformed element is reported without discarding
//! its well-formed siblings.

use chrono::{DateTime, TimeZone, Utc};
use serde_json::Value;

use super::messages::{
    CombinedEnvelope, MiniTickerEvent, NormalizedEvent, StreamMessage, TickerEvent, TradeEvent,
};
use crate::domain::ticker::{Symbol, SymbolError, TickerUpdate};

/// Codec errors.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// JSON decoding failed.
    #[error("JSON codec error: {0}")]
    Json(#[from] serde_json::Error),

    /// Event type is not one the codec understands.
    #[error("unknown event type: {0}")]
    UnknownEventType(String),

    /// Object carries neither an event type nor a symbol.
    #[error("invalid message format: {0}")]
    InvalidFormat(String),

    /// Pair or symbol could not be mapped to an instrument symbol.
    #[error("invalid symbol in message: {0}")]
    Symbol(#[from] SymbolError),
}

/// Result of decoding one frame.
#[derive(Debug, Default)]
pub struct DecodedFrame {
    /// Every update recognized in the frame, in frame order.
    pub updates: Vec<(&'static str, TickerUpdate)>,
    /// Elements that failed to decode.
    pub errors: Vec<CodecError>,
}

/// JSON codec for the ticker stream.
#[derive(Debug, Clone)]
pub struct TickerCodec {
    quote_asset: String,
}

impl TickerCodec {
    /// Create a codec that strips `quote_asset` from exchange pairs.
    #[must_use]
    pub fn new(quote_asset: impl Into<String>) -> Self {
        Self {
            quote_asset: quote_asset.into().to_uppercase(),
        }
    }

    /// Decode a text frame.
    ///
    /// # Errors
    ///
    /// Returns an error when the frame is not JSON at all. Per-element
    /// failures are collected in [`DecodedFrame::errors`].
    pub fn decode(&self, text: &str) -> Result<DecodedFrame, CodecError> {
        let value: Value = serde_json::from_str(text.trim())?;
        let mut frame = DecodedFrame::default();
        self.decode_value(value, &mut frame);
        Ok(frame)
    }

    fn decode_value(&self, value: Value, frame: &mut DecodedFrame) {
        match value {
            Value::Array(items) => {
                for item in items {
                    self.decode_value(item, frame);
                }
            }
            Value::Object(ref map) if map.contains_key("stream") && map.contains_key("data") => {
                match serde_json::from_value::<CombinedEnvelope>(value) {
                    Ok(envelope) => self.decode_value(envelope.data, frame),
                    Err(e) => frame.errors.push(e.into()),
                }
            }
            Value::Object(ref map) if map.contains_key("result") && map.contains_key("id") => {
                tracing::trace!("Ignoring control response");
            }
            other => match Self::decode_message(other).and_then(|m| self.to_update(m)) {
                Ok(update) => frame.updates.push(update),
                Err(e) => frame.errors.push(e),
            },
        }
    }

    /// Decode one event object into a tagged message.
    ///
    /// # Errors
    ///
    /// Returns an error for unknown event types or missing required fields.
    pub fn decode_message(value: Value) -> Result<StreamMessage, CodecError> {
        let event_type = value.get("e").and_then(Value::as_str).map(str::to_owned);

        match event_type.as_deref() {
            Some("24hrTicker") => Ok(StreamMessage::Ticker(serde_json::from_value::<TickerEvent>(
                value,
            )?)),
            Some("24hrMiniTicker") => Ok(StreamMessage::MiniTicker(serde_json::from_value::<
                MiniTickerEvent,
            >(value)?)),
            Some("trade") => Ok(StreamMessage::Trade(serde_json::from_value::<TradeEvent>(
                value,
            )?)),
            Some(other) => Err(CodecError::UnknownEventType(other.to_string())),
            None if value.get("symbol").is_some() => Ok(StreamMessage::Normalized(
                serde_json::from_value::<NormalizedEvent>(value)?,
            )),
            None => Err(CodecError::InvalidFormat(truncate(&value.to_string()))),
        }
    }

    fn to_update(&self, message: StreamMessage) -> Result<(&'static str, TickerUpdate), CodecError> {
        let kind = message.kind();
        let update = match message {
            StreamMessage::Ticker(t) => {
                let mut update = TickerUpdate::new(self.symbol_for_pair(&t.pair)?, t.last_price);
                update.change_percent_24h = t.price_change_percent;
                update.high_24h = t.high;
                update.low_24h = t.low;
                update.volume_24h = t.volume;
                update.event_time = t.event_time.and_then(millis_to_utc);
                update
            }
            StreamMessage::MiniTicker(m) => {
                let mut update = TickerUpdate::new(self.symbol_for_pair(&m.pair)?, m.close);
                update.change_percent_24h = m.change_percent();
                update.high_24h = m.high;
                update.low_24h = m.low;
                update.volume_24h = m.volume;
                update.event_time = m.event_time.and_then(millis_to_utc);
                update
            }
            StreamMessage::Trade(t) => {
                let mut update = TickerUpdate::new(self.symbol_for_pair(&t.pair)?, t.price);
                update.event_time = t.event_time.and_then(millis_to_utc);
                update
            }
            StreamMessage::Normalized(n) => {
                let mut update = TickerUpdate::new(self.symbol_for_pair(&n.symbol)?, n.price);
                update.change_percent_24h = n.price_change_percent;
                update.event_time = n.timestamp.and_then(millis_to_utc);
                update
            }
        };
        Ok((kind, update))
    }

    /// Map an exchange pair (`BTCUSDT`) to its instrument symbol (`BTC`).
    ///
    /// Input that does not end in the quote asset is taken as a symbol.
    ///
    /// # Errors
    ///
    /// Returns an error if the result is not a valid symbol.
    pub fn symbol_for_pair(&self, pair: &str) -> Result<Symbol, SymbolError> {
        let upper = pair.trim().to_uppercase();
        let base = upper
            .strip_suffix(self.quote_asset.as_str())
            .filter(|b| !b.is_empty())
            .unwrap_or(&upper);
        Symbol::parse(base)
    }
}

fn millis_to_utc(millis: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_millis_opt(millis).single()
}

fn truncate(s: &str) -> String {
    s.chars().take(80).collect()
}
