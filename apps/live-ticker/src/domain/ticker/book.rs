use std::collections::HashMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use super::{Instrument, LivePriceRecord, PriceSource, Symbol, TickerUpdate};

/// Result of applying one update to the book.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// Existing record updated.
    Applied,
    /// No record existed; one was created from the update.
    Created,
    /// Update was older than or equal to the last applied event time.
    Stale,
}

impl ApplyOutcome {
    /// Whether the book changed.
    #[must_use]
    pub const fn changed(self) -> bool {
        !matches!(self, Self::Stale)
    }
}

/// Merged per-symbol price state.
///
/// Every mutation touches at most one record, keyed by the update's symbol.
#[derive(Debug, Clone, Default)]
pub struct PriceBook {
    records: HashMap<Symbol, LivePriceRecord>,
}

impl PriceBook {
    /// Create an empty book.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the whole book with baseline records.
    pub fn replace_baseline(&mut self, instruments: &[Instrument], source: PriceSource) {
        self.records.clear();
        self.load_baseline(instruments, source);
    }

    /// Merge baseline records into the book.
    ///
    /// Records that already carry stream data keep their streamed values.
    pub fn load_baseline(&mut self, instruments: &[Instrument], source: PriceSource) {
        let now = Utc::now();
        for instrument in instruments {
            match self.records.get_mut(&instrument.symbol) {
                Some(existing) if existing.has_stream_data() => {
                    existing.refresh_baseline(instrument);
                }
                _ => {
                    self.records.insert(
                        instrument.symbol.clone(),
                        LivePriceRecord::from_instrument(instrument, source, now),
                    );
                }
            }
        }
    }

    /// Apply one stream update.
    pub fn apply(&mut self, update: &TickerUpdate, received_at: DateTime<Utc>) -> ApplyOutcome {
        match self.records.get_mut(&update.symbol) {
            Some(record) if record.is_stale(update) => ApplyOutcome::Stale,
            Some(record) => {
                record.merge(update, received_at);
                ApplyOutcome::Applied
            }
            None => {
                self.records.insert(
                    update.symbol.clone(),
                    LivePriceRecord::from_update(update, received_at),
                );
                ApplyOutcome::Created
            }
        }
    }

    /// Keep only the records whose symbol satisfies `keep`.
    pub fn retain(&mut self, mut keep: impl FnMut(&Symbol) -> bool) {
        self.records.retain(|symbol, _| keep(symbol));
    }

    /// Remove every record.
    pub fn clear(&mut self) {
        self.records.clear();
    }

    /// Look up one record.
    #[must_use]
    pub fn get(&self, symbol: &str) -> Option<&LivePriceRecord> {
        self.records.get(symbol)
    }

    /// Whether a record exists for `symbol`.
    #[must_use]
    pub fn contains(&self, symbol: &str) -> bool {
        self.records.contains_key(symbol)
    }

    /// Number of records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the book is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Copy of every record.
    #[must_use]
    pub fn snapshot(&self) -> HashMap<Symbol, LivePriceRecord> {
        self.records.clone()
    }

    /// Symbol to last price, skipping unavailable prices.
    #[must_use]
    pub fn prices(&self) -> HashMap<Symbol, Decimal> {
        self.records
            .iter()
            .filter_map(|(symbol, record)| record.last_price.map(|p| (symbol.clone(), p)))
            .collect()
    }

    /// Symbol to 24h change percentage, skipping unknown changes.
    #[must_use]
    pub fn changes(&self) -> HashMap<Symbol, Decimal> {
        self.records
            .iter()
            .filter_map(|(symbol, record)| {
                record
                    .price_change_percent_24h
                    .map(|c| (symbol.clone(), c))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use proptest::prelude::*;

    fn sym(s: &str) -> Symbol {
        Symbol::parse(s).unwrap()
    }

    #[test]
    fn stream_update_overrides_baseline() {
        let mut book = PriceBook::new();
        book.replace_baseline(
            &[Instrument::new(sym("BTC"), Decimal::new(50_000, 0))],
            PriceSource::Baseline,
        );

        let update = TickerUpdate::new(sym("BTC"), Decimal::new(51_000, 0))
            .with_change_percent(Decimal::new(20, 1));
        assert_eq!(book.apply(&update, Utc::now()), ApplyOutcome::Applied);

        let record = book.get("BTC").unwrap();
        assert_eq!(record.last_price, Some(Decimal::new(51_000, 0)));
        assert_eq!(record.price_change_percent_24h, Some(Decimal::new(20, 1)));
        assert_eq!(record.source, PriceSource::Stream);
    }

    #[test]
    fn unknown_symbol_creates_record() {
        let mut book = PriceBook::new();
        let outcome = book.apply(&TickerUpdate::new(sym("SOL"), Decimal::ONE), Utc::now());
        assert_eq!(outcome, ApplyOutcome::Created);
        assert!(book.contains("SOL"));
    }

    #[test]
    fn out_of_order_update_discarded() {
        let mut book = PriceBook::new();
        let t1 = Utc.timestamp_millis_opt(1_000).unwrap();
        let t2 = Utc.timestamp_millis_opt(2_000).unwrap();

        book.apply(
            &TickerUpdate::new(sym("BTC"), Decimal::TWO).with_event_time(t2),
            Utc::now(),
        );
        let outcome = book.apply(
            &TickerUpdate::new(sym("BTC"), Decimal::ONE).with_event_time(t1),
            Utc::now(),
        );

        assert_eq!(outcome, ApplyOutcome::Stale);
        assert!(!outcome.changed());
        assert_eq!(book.get("BTC").unwrap().last_price, Some(Decimal::TWO));
    }

    #[test]
    fn load_baseline_keeps_streamed_price() {
        let mut book = PriceBook::new();
        book.apply(&TickerUpdate::new(sym("ETH"), Decimal::TEN), Utc::now());

        book.load_baseline(
            &[
                Instrument::new(sym("ETH"), Decimal::ONE).with_display_name("Ethereum"),
                Instrument::new(sym("BTC"), Decimal::TWO),
            ],
            PriceSource::Baseline,
        );

        let eth = book.get("ETH").unwrap();
        assert_eq!(eth.last_price, Some(Decimal::TEN));
        assert_eq!(eth.display_name.as_deref(), Some("Ethereum"));
        assert_eq!(book.get("BTC").unwrap().last_price, Some(Decimal::TWO));
    }

    #[test]
    fn replace_baseline_drops_previous_records() {
        let mut book = PriceBook::new();
        book.apply(&TickerUpdate::new(sym("ETH"), Decimal::TEN), Utc::now());

        book.replace_baseline(
            &[Instrument::placeholder(sym("BTC"))],
            PriceSource::Fallback,
        );

        assert_eq!(book.len(), 1);
        assert!(!book.contains("ETH"));
        assert_eq!(book.get("BTC").unwrap().source, PriceSource::Fallback);
    }

    #[test]
    fn maps_skip_missing_values() {
        let mut book = PriceBook::new();
        book.replace_baseline(
            &[
                Instrument::new(sym("BTC"), Decimal::ONE).with_change_24h(Decimal::TWO),
                Instrument::new(sym("ETH"), Decimal::TEN),
            ],
            PriceSource::Baseline,
        );

        assert_eq!(book.prices().len(), 2);
        let changes = book.changes();
        assert_eq!(changes.len(), 1);
        assert_eq!(changes.get("BTC"), Some(&Decimal::TWO));
    }

    #[test]
    fn retain_drops_unreferenced() {
        let mut book = PriceBook::new();
        book.replace_baseline(
            &[
                Instrument::new(sym("BTC"), Decimal::ONE),
                Instrument::new(sym("ETH"), Decimal::ONE),
            ],
            PriceSource::Baseline,
        );
        book.retain(|s| s.as_str() == "BTC");
        assert_eq!(book.len(), 1);
        assert!(book.contains("BTC"));
    }

    fn symbol_strategy() -> impl Strategy<Value = Symbol> {
        prop::sample::select(vec!["BTC", "ETH", "SOL", "ADA", "DOT"]).prop_map(sym)
    }

    proptest! {
        #[test]
        fn update_never_touches_other_records(
            target in symbol_strategy(),
            price in 1i64..1_000_000,
            millis in 0i64..10_000,
        ) {
            let mut book = PriceBook::new();
            let baseline: Vec<Instrument> = ["BTC", "ETH", "SOL", "ADA", "DOT"]
                .iter()
                .map(|s| Instrument::new(sym(s), Decimal::ONE))
                .collect();
            book.replace_baseline(&baseline, PriceSource::Baseline);
            let before = book.snapshot();

            let time = Utc.timestamp_millis_opt(millis).unwrap();
            book.apply(
                &TickerUpdate::new(target.clone(), Decimal::new(price, 2)).with_event_time(time),
                Utc::now(),
            );

            for (symbol, record) in book.snapshot() {
                if symbol != target {
                    prop_assert_eq!(Some(&record), before.get(&symbol));
                }
            }
        }
    }
}
