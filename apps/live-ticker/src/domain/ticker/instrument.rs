use rust_decimal::Decimal;
use serde::Serialize;

use super::Symbol;

/// One tradable symbol tracked for live pricing, as returned by a snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Instrument {
    /// Unique key.
    pub symbol: Symbol,
    /// Optional human label.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    /// Baseline price from the snapshot.
    pub baseline_price: Decimal,
    /// Baseline 24h change percentage.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub baseline_change_24h: Option<Decimal>,
}

impl Instrument {
    /// Create an instrument with a baseline price.
    #[must_use]
    pub const fn new(symbol: Symbol, baseline_price: Decimal) -> Self {
        Self {
            symbol,
            display_name: None,
            baseline_price,
            baseline_change_24h: None,
        }
    }

    /// Placeholder instrument with zeroed price and change.
    #[must_use]
    pub const fn placeholder(symbol: Symbol) -> Self {
        Self {
            symbol,
            display_name: None,
            baseline_price: Decimal::ZERO,
            baseline_change_24h: Some(Decimal::ZERO),
        }
    }

    /// Set the display name.
    #[must_use]
    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }

    /// Set the baseline 24h change.
    #[must_use]
    pub fn with_change_24h(mut self, change: Decimal) -> Self {
        self.baseline_change_24h = Some(change);
        self
    }
}
