use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

use super::{Instrument, Symbol, TickerUpdate};

/// Where the current values of a record came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PriceSource {
    /// Snapshot baseline, no stream update yet.
    Baseline,
    /// Placeholder values used because the snapshot failed.
    Fallback,
    /// At least one stream update applied.
    Stream,
}

/// The continuously merged price state of one instrument.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LivePriceRecord {
    /// Instrument symbol.
    pub symbol: Symbol,
    /// Human label from the snapshot.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    /// Latest price; `None` means unavailable.
    pub last_price: Option<Decimal>,
    /// Latest 24h change percentage.
    pub price_change_percent_24h: Option<Decimal>,
    /// 24h high.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub high_24h: Option<Decimal>,
    /// 24h low.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub low_24h: Option<Decimal>,
    /// 24h volume.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub volume_24h: Option<Decimal>,
    /// When the record last changed.
    pub last_update: Option<DateTime<Utc>>,
    /// Origin of the current values.
    pub source: PriceSource,
    #[serde(skip)]
    last_event_time: Option<DateTime<Utc>>,
}

impl LivePriceRecord {
    /// Build a record from snapshot data.
    #[must_use]
    pub fn from_instrument(
        instrument: &Instrument,
        source: PriceSource,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            symbol: instrument.symbol.clone(),
            display_name: instrument.display_name.clone(),
            last_price: Some(instrument.baseline_price),
            price_change_percent_24h: instrument.baseline_change_24h,
            high_24h: None,
            low_24h: None,
            volume_24h: None,
            last_update: Some(at),
            source,
            last_event_time: None,
        }
    }

    /// Build a record from the first stream update seen for a symbol.
    #[must_use]
    pub fn from_update(update: &TickerUpdate, received_at: DateTime<Utc>) -> Self {
        let mut record = Self {
            symbol: update.symbol.clone(),
            display_name: None,
            last_price: None,
            price_change_percent_24h: None,
            high_24h: None,
            low_24h: None,
            volume_24h: None,
            last_update: None,
            source: PriceSource::Stream,
            last_event_time: None,
        };
        record.merge(update, received_at);
        record
    }

    /// Whether an update is not strictly newer than what was already applied.
    #[must_use]
    pub fn is_stale(&self, update: &TickerUpdate) -> bool {
        matches!(
            (update.event_time, self.last_event_time),
            (Some(incoming), Some(applied)) if incoming <= applied
        )
    }

    /// Whether any stream update has been applied.
    #[must_use]
    pub fn has_stream_data(&self) -> bool {
        self.source == PriceSource::Stream
    }

    pub(super) fn merge(&mut self, update: &TickerUpdate, received_at: DateTime<Utc>) {
        self.last_price = Some(update.price);
        if let Some(change) = update.change_percent_24h {
            self.price_change_percent_24h = Some(change);
        }
        if let Some(high) = update.high_24h {
            self.high_24h = Some(high);
        }
        if let Some(low) = update.low_24h {
            self.low_24h = Some(low);
        }
        if let Some(volume) = update.volume_24h {
            self.volume_24h = Some(volume);
        }
        if update.event_time.is_some() {
            self.last_event_time = update.event_time;
        }
        self.last_update = Some(update.event_time.unwrap_or(received_at));
        self.source = PriceSource::Stream;
    }

    /// Refresh baseline fields without touching streamed values.
    pub(super) fn refresh_baseline(&mut self, instrument: &Instrument) {
        if instrument.display_name.is_some() {
            self.display_name.clone_from(&instrument.display_name);
        }
        if self.price_change_percent_24h.is_none() {
            self.price_change_percent_24h = instrument.baseline_change_24h;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn btc() -> Symbol {
        Symbol::parse("BTC").unwrap()
    }

    #[test]
    fn serializes_camel_case() {
        let record = LivePriceRecord::from_instrument(
            &Instrument::new(btc(), Decimal::new(50_000, 0)),
            PriceSource::Baseline,
            Utc::now(),
        );
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["symbol"], "BTC");
        assert_eq!(json["lastPrice"], "50000");
        assert!(json.get("priceChangePercent24h").is_some());
        assert_eq!(json["source"], "baseline");
        assert!(json.get("lastEventTime").is_none());
    }

    #[test]
    fn stale_only_when_both_times_known() {
        let t1 = Utc.timestamp_millis_opt(1_000).unwrap();
        let t2 = Utc.timestamp_millis_opt(2_000).unwrap();

        let mut record = LivePriceRecord::from_update(
            &TickerUpdate::new(btc(), Decimal::ONE).with_event_time(t2),
            Utc::now(),
        );

        assert!(record.is_stale(&TickerUpdate::new(btc(), Decimal::TWO).with_event_time(t1)));
        assert!(record.is_stale(&TickerUpdate::new(btc(), Decimal::TWO).with_event_time(t2)));
        assert!(!record.is_stale(&TickerUpdate::new(btc(), Decimal::TWO)));

        record.merge(&TickerUpdate::new(btc(), Decimal::TWO), Utc::now());
        assert!(record.is_stale(&TickerUpdate::new(btc(), Decimal::TEN).with_event_time(t1)));
    }

    #[test]
    fn merge_keeps_change_when_update_has_none() {
        let mut record = LivePriceRecord::from_instrument(
            &Instrument::new(btc(), Decimal::ONE).with_change_24h(Decimal::new(15, 1)),
            PriceSource::Baseline,
            Utc::now(),
        );

        record.merge(&TickerUpdate::new(btc(), Decimal::TWO), Utc::now());

        assert_eq!(record.last_price, Some(Decimal::TWO));
        assert_eq!(record.price_change_percent_24h, Some(Decimal::new(15, 1)));
        assert_eq!(record.source, PriceSource::Stream);
    }
}
