use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use super::Symbol;

/// Normalized incremental price update for one instrument.
///
/// Produced by the stream codec regardless of which wire variant the
/// update arrived in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TickerUpdate {
    /// Instrument symbol.
    pub symbol: Symbol,
    /// Latest price.
    pub price: Decimal,
    /// 24h change percentage, when the stream variant carries one.
    pub change_percent_24h: Option<Decimal>,
    /// 24h high.
    pub high_24h: Option<Decimal>,
    /// 24h low.
    pub low_24h: Option<Decimal>,
    /// 24h base-asset volume.
    pub volume_24h: Option<Decimal>,
    /// Source event time, when the stream provides one.
    pub event_time: Option<DateTime<Utc>>,
}

impl TickerUpdate {
    /// Create an update carrying only a price.
    #[must_use]
    pub const fn new(symbol: Symbol, price: Decimal) -> Self {
        Self {
            symbol,
            price,
            change_percent_24h: None,
            high_24h: None,
            low_24h: None,
            volume_24h: None,
            event_time: None,
        }
    }

    /// Set the 24h change percentage.
    #[must_use]
    pub fn with_change_percent(mut self, change: Decimal) -> Self {
        self.change_percent_24h = Some(change);
        self
    }

    /// Set the source event time.
    #[must_use]
    pub fn with_event_time(mut self, time: DateTime<Utc>) -> Self {
        self.event_time = Some(time);
        self
    }
}
