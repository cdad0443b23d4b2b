//! Subscription Management Types
//!
//! Domain types for tracking which consumers are interested in which
//! symbols, and the resulting union that drives the single upstream
//! stream connection.
//!
//! # Design
//!
//! The subscription manager tracks:
//! - Which symbols each consumer is subscribed to
//! - Reference counting per symbol
//! - First-interest order, so the upstream set is stable
//!
//! Many consumers can share a symbol while the stream carries it once.

mod set;

use std::collections::{HashMap, HashSet};

use parking_lot::RwLock;

pub use set::SubscriptionSet;

use crate::domain::ticker::Symbol;

// =============================================================================
// Types
// =============================================================================

/// Unique identifier for a consumer attached to the hub.
pub type ConsumerId = u64;

// =============================================================================
// Subscription Changes
// =============================================================================

/// Changes to the upstream symbol union.
#[derive(Debug, Clone, Default)]
pub struct SubscriptionChanges {
    /// Symbols that gained their first consumer.
    pub subscribe: HashSet<Symbol>,
    /// Symbols that lost their last consumer.
    pub unsubscribe: HashSet<Symbol>,
}

impl SubscriptionChanges {
    /// Check if there are any changes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.subscribe.is_empty() && self.unsubscribe.is_empty()
    }

    /// Create changes with only subscribes.
    #[must_use]
    pub fn subscribe_only(symbols: impl IntoIterator<Item = Symbol>) -> Self {
        Self {
            subscribe: symbols.into_iter().collect(),
            unsubscribe: HashSet::new(),
        }
    }

    /// Create changes with only unsubscribes.
    #[must_use]
    pub fn unsubscribe_only(symbols: impl IntoIterator<Item = Symbol>) -> Self {
        Self {
            subscribe: HashSet::new(),
            unsubscribe: symbols.into_iter().collect(),
        }
    }
}

// =============================================================================
// Subscription State
// =============================================================================

#[derive(Debug, Default)]
struct SubscriptionState {
    consumer_symbols: HashMap<ConsumerId, HashSet<Symbol>>,
    symbol_refcount: HashMap<Symbol, usize>,
    /// Symbols with a nonzero refcount, in first-interest order.
    order: Vec<Symbol>,
}

impl SubscriptionState {
    /// Returns symbols whose refcount went 0→1.
    fn add(&mut self, consumer: ConsumerId, symbols: &[Symbol]) -> Vec<Symbol> {
        let consumer_set = self.consumer_symbols.entry(consumer).or_default();
        let mut new_upstream = Vec::new();

        for symbol in symbols {
            if !consumer_set.insert(symbol.clone()) {
                continue;
            }

            let refcount = self.symbol_refcount.entry(symbol.clone()).or_insert(0);
            *refcount += 1;

            if *refcount == 1 {
                self.order.push(symbol.clone());
                new_upstream.push(symbol.clone());
            }
        }

        new_upstream
    }

    /// Returns symbols whose refcount went 1→0.
    fn remove_consumer(&mut self, consumer: ConsumerId) -> Vec<Symbol> {
        let Some(consumer_set) = self.consumer_symbols.remove(&consumer) else {
            return vec![];
        };

        self.release(consumer_set)
    }

    fn release(&mut self, symbols: HashSet<Symbol>) -> Vec<Symbol> {
        let mut remove_upstream = Vec::new();

        for symbol in symbols {
            if let Some(refcount) = self.symbol_refcount.get_mut(&symbol) {
                *refcount = refcount.saturating_sub(1);

                if *refcount == 0 {
                    self.symbol_refcount.remove(&symbol);
                    self.order.retain(|s| s != &symbol);
                    remove_upstream.push(symbol);
                }
            }
        }

        remove_upstream
    }
}

// =============================================================================
// Subscription Manager
// =============================================================================

/// Reference-counted interest in symbols across all consumers.
///
/// # Example
///
/// ```rust
/// use live_ticker::domain::subscription::SubscriptionManager;
/// use live_ticker::domain::ticker::Symbol;
///
/// let manager = SubscriptionManager::new();
/// let btc = Symbol::parse("BTC").unwrap();
///
/// // Consumer 1 subscribes to BTC
/// let changes = manager.add_subscriptions(1, &[btc.clone()]);
/// assert!(changes.subscribe.contains("BTC"));
///
/// // Consumer 2 also subscribes - the union is unchanged
/// let changes = manager.add_subscriptions(2, &[btc.clone()]);
/// assert!(changes.subscribe.is_empty());
///
/// // Consumer 1 leaves - BTC still held by consumer 2
/// let changes = manager.consumer_disconnected(1);
/// assert!(changes.unsubscribe.is_empty());
///
/// // Consumer 2 leaves - BTC drops out of the union
/// let changes = manager.consumer_disconnected(2);
/// assert!(changes.unsubscribe.contains("BTC"));
/// ```
#[derive(Debug, Default)]
pub struct SubscriptionManager {
    state: RwLock<SubscriptionState>,
}

impl SubscriptionManager {
    /// Create a new subscription manager.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add subscriptions for a consumer.
    pub fn add_subscriptions(&self, consumer: ConsumerId, symbols: &[Symbol]) -> SubscriptionChanges {
        let added = self.state.write().add(consumer, symbols);
        SubscriptionChanges::subscribe_only(added)
    }

    /// Remove every subscription held by `consumer`.
    pub fn consumer_disconnected(&self, consumer: ConsumerId) -> SubscriptionChanges {
        let removed = self.state.write().remove_consumer(consumer);
        SubscriptionChanges::unsubscribe_only(removed)
    }

    /// Union of all consumers' symbols, in first-interest order.
    #[must_use]
    pub fn active_symbols(&self) -> SubscriptionSet {
        self.state.read().order.iter().cloned().collect()
    }

    /// Get statistics.
    #[must_use]
    pub fn stats(&self) -> SubscriptionStats {
        let state = self.state.read();
        SubscriptionStats {
            symbol_count: state.symbol_refcount.len(),
            consumer_count: state.consumer_symbols.len(),
        }
    }
}

// =============================================================================
// Statistics
// =============================================================================

/// Subscription statistics.
#[derive(Debug, Clone, Copy, Default)]
pub struct SubscriptionStats {
    /// Number of unique symbols.
    pub symbol_count: usize,
    /// Number of consumers.
    pub consumer_count: usize,
}

// =============================================================================
// Tests
// =============================================================================
