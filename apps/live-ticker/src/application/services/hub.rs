//! Shared Ticker Hub
//!
//! Lets many consumers share one `LiveTickerSync`. Each consumer attaches
//! with the symbols it wants; the stream carries the union once. The
//! connection is torn down when the last consumer detaches.

use std::sync::Arc;

use tokio::sync::{Mutex, broadcast};

use super::sync::LiveTickerSync;
use crate::domain::subscription::{ConsumerId, SubscriptionManager, SubscriptionStats};
use crate::domain::ticker::{Instrument, LivePriceRecord, Symbol, SyncState};
use crate::infrastructure::broadcast::{ConnectionStatusBroadcast, PriceUpdateBroadcast};
use crate::infrastructure::metrics;

struct HubInner {
    sync: LiveTickerSync,
    subscriptions: SubscriptionManager,
    // Serializes union changes so each retarget sees the latest union.
    reconfigure: Mutex<()>,
}

/// Reference-counted access to one live ticker connection.
#[derive(Clone)]
pub struct LiveTickerHub {
    inner: Arc<HubInner>,
}

impl std::fmt::Debug for LiveTickerHub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LiveTickerHub")
            .field("sync", &self.inner.sync)
            .field("subscriptions", &self.inner.subscriptions.stats())
            .finish()
    }
}

impl LiveTickerHub {
    /// Wrap a sync instance.
    #[must_use]
    pub fn new(sync: LiveTickerSync) -> Self {
        Self {
            inner: Arc::new(HubInner {
                sync,
                subscriptions: SubscriptionManager::new(),
                reconfigure: Mutex::new(()),
            }),
        }
    }

    /// The shared sync instance.
    #[must_use]
    pub fn sync(&self) -> &LiveTickerSync {
        &self.inner.sync
    }

    /// Attach a consumer interested in `symbols`.
    ///
    /// An empty list means the top-N set. The shared connection is
    /// retargeted to the new union before this returns.
    pub async fn attach(&self, symbols: &[Symbol]) -> TickerConsumer {
        let _guard = self.inner.reconfigure.lock().await;

        let (wanted, known): (Vec<Symbol>, Vec<Instrument>) = if symbols.is_empty() {
            let top = self.inner.sync.resolve_top().await;
            (top.iter().map(|i| i.symbol.clone()).collect(), top)
        } else {
            let mut seen = std::collections::HashSet::new();
            let deduped = symbols
                .iter()
                .filter(|s| seen.insert(s.as_str().to_owned()))
                .cloned()
                .collect();
            (deduped, Vec::new())
        };

        let id = uuid::Uuid::new_v4().as_u64_pair().0;
        let changes = self.inner.subscriptions.add_subscriptions(id, &wanted);

        tracing::info!(
            consumer = id,
            symbols = wanted.len(),
            new_symbols = changes.subscribe.len(),
            "Consumer attached"
        );

        let union = self.inner.subscriptions.active_symbols();
        if !union.is_empty() {
            self.inner.sync.retarget(union, &known).await;
        }
        self.update_gauges();

        TickerConsumer {
            id,
            symbols: wanted,
            hub: self.clone(),
            released: false,
        }
    }

    /// Detach a consumer. Unknown ids are ignored.
    pub async fn detach(&self, consumer: ConsumerId) {
        let _guard = self.inner.reconfigure.lock().await;

        let changes = self.inner.subscriptions.consumer_disconnected(consumer);
        let union = self.inner.subscriptions.active_symbols();

        if union.is_empty() {
            tracing::info!(consumer, "Last consumer detached, closing stream");
            self.inner.sync.teardown().await;
        } else if !changes.is_empty() {
            tracing::info!(
                consumer,
                dropped = changes.unsubscribe.len(),
                "Consumer detached, narrowing stream"
            );
            self.inner.sync.retarget(union, &[]).await;
        }

        self.update_gauges();
    }

    /// Consumer and symbol counts.
    #[must_use]
    pub fn stats(&self) -> SubscriptionStats {
        self.inner.subscriptions.stats()
    }

    fn update_gauges(&self) {
        let stats = self.inner.subscriptions.stats();
        metrics::set_consumers(stats.consumer_count);
    }
}

// =============================================================================
// Consumer Handle
// =============================================================================

/// One attached consumer.
///
/// Detaches on `release`, or in the background when dropped inside a
/// Tokio runtime.
pub struct TickerConsumer {
    id: ConsumerId,
    symbols: Vec<Symbol>,
    hub: LiveTickerHub,
    released: bool,
}

impl std::fmt::Debug for TickerConsumer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TickerConsumer")
            .field("id", &self.id)
            .field("symbols", &self.symbols)
            .finish_non_exhaustive()
    }
}

impl TickerConsumer {
    /// Consumer id.
    #[must_use]
    pub const fn id(&self) -> ConsumerId {
        self.id
    }

    /// Symbols this consumer follows, in request order.
    #[must_use]
    pub fn symbols(&self) -> &[Symbol] {
        &self.symbols
    }

    /// Whether this consumer follows `symbol`.
    #[must_use]
    pub fn wants(&self, symbol: &str) -> bool {
        self.symbols.iter().any(|s| s.as_str() == symbol)
    }

    /// Current records for this consumer's symbols, in request order.
    ///
    /// Symbols without data are omitted.
    #[must_use]
    pub fn snapshot(&self) -> Vec<LivePriceRecord> {
        let sync = self.hub.sync();
        self.symbols
            .iter()
            .filter_map(|s| sync.record(s.as_str()))
            .collect()
    }

    /// Receiver for merged records. Filter with [`Self::wants`].
    #[must_use]
    pub fn updates(&self) -> broadcast::Receiver<PriceUpdateBroadcast> {
        self.hub.sync().broadcast().price_updates_rx()
    }

    /// Receiver for connection state changes.
    #[must_use]
    pub fn status_updates(&self) -> broadcast::Receiver<ConnectionStatusBroadcast> {
        self.hub.sync().broadcast().status_rx()
    }

    /// Current lifecycle state of the shared connection.
    #[must_use]
    pub fn state(&self) -> SyncState {
        self.hub.sync().state()
    }

    /// Whether the shared connection is up.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.hub.sync().is_connected()
    }

    /// Detach and wait for the shared connection to be reconfigured.
    pub async fn release(mut self) {
        self.released = true;
        self.hub.detach(self.id).await;
    }
}

impl Drop for TickerConsumer {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        if let Ok(runtime) = tokio::runtime::Handle::try_current() {
            let hub = self.hub.clone();
            let id = self.id;
            runtime.spawn(async move { hub.detach(id).await });
        } else {
            tracing::warn!(consumer = self.id, "Consumer dropped outside a runtime, not detached");
        }
    }
}
