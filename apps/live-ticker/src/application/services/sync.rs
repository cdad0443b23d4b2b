//! Live Ticker Synchronization
//!
//! Reconciles a request/response snapshot with the continuous ticker
//! stream into one consistent per-symbol view.
//!
//! # Lifecycle
//!
//! ```text
//! Idle ──initialize──► SnapshotLoading ──► Streaming ◄──► Reconnecting
//!                                                │ attempts exhausted
//!   any ──teardown──► Closed ◄───────────────────┘
//! ```
//!
//! Each live connection is one worker task emitting `StreamEvent`s to one
//! handler task; the handler is the only writer of stream updates.
//! Reconfiguration holds an async mutex and waits for both tasks to
//! finish before anything new is opened.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use chrono::Utc;
use parking_lot::RwLock;
use rust_decimal::Decimal;
use serde::Serialize;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::application::ports::{
    SnapshotError, SnapshotRequest, SnapshotSource, StreamTransport,
};
use crate::domain::subscription::SubscriptionSet;
use crate::domain::ticker::{
    ApplyOutcome, Instrument, LivePriceRecord, PriceBook, PriceSource, Symbol, SyncState,
    TickerUpdate,
};
use crate::infrastructure::broadcast::BroadcastHub;
use crate::infrastructure::metrics::{self, SnapshotOutcome};
use crate::infrastructure::stream::{StreamEvent, StreamWorker, TickerCodec, WorkerConfig};

// =============================================================================
// Configuration
// =============================================================================

/// What the book shows when the snapshot fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FallbackPolicy {
    /// Placeholder records with price and change of zero.
    Placeholder(Vec<Symbol>),
    /// Nothing; consumers see an empty view until the stream fills it.
    Empty,
}

impl FallbackPolicy {
    /// Placeholder instruments for a failed full snapshot.
    #[must_use]
    pub fn instruments(&self) -> Vec<Instrument> {
        match self {
            Self::Placeholder(symbols) => symbols.iter().cloned().map(Instrument::placeholder).collect(),
            Self::Empty => Vec::new(),
        }
    }

    /// Placeholder instruments for symbols whose baseline fetch failed.
    #[must_use]
    pub fn instruments_for(&self, symbols: &[Symbol]) -> Vec<Instrument> {
        match self {
            Self::Placeholder(_) => symbols.iter().cloned().map(Instrument::placeholder).collect(),
            Self::Empty => Vec::new(),
        }
    }
}

impl Default for FallbackPolicy {
    fn default() -> Self {
        Self::Placeholder(
            ["BTC", "ETH", "BNB", "SOL", "XRP", "ADA", "DOGE", "AVAX", "DOT", "LINK"]
                .iter()
                .filter_map(|s| Symbol::parse(s).ok())
                .collect(),
        )
    }
}

/// Synchronization settings.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Snapshot request timeout.
    pub snapshot_timeout: Duration,
    /// Size of the default "top" set.
    pub top_n: usize,
    /// Fallback when the snapshot fails.
    pub fallback: FallbackPolicy,
    /// Connection maintenance.
    pub worker: WorkerConfig,
    /// Buffer between the worker and the handler task.
    pub event_buffer: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            snapshot_timeout: Duration::from_secs(10),
            top_n: 10,
            fallback: FallbackPolicy::default(),
            worker: WorkerConfig::default(),
            event_buffer: 1_024,
        }
    }
}

// =============================================================================
// Statistics
// =============================================================================

/// Point-in-time counters for health reporting.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStats {
    /// Lifecycle state.
    pub state: SyncState,
    /// Stream connected.
    pub is_connected: bool,
    /// Reconnection attempts since the last successful connection.
    pub reconnect_attempts: u32,
    /// Updates applied since start.
    pub messages_received: u64,
    /// Malformed frames or elements since start.
    pub messages_malformed: u64,
    /// Symbols in the current subscription.
    pub subscribed_symbols: usize,
}

// =============================================================================
// Sync
// =============================================================================

struct Connection {
    cancel: CancellationToken,
    worker: JoinHandle<()>,
    handler: JoinHandle<()>,
}

struct Inner {
    book: RwLock<PriceBook>,
    state: RwLock<SyncState>,
    subscription: RwLock<SubscriptionSet>,
    is_connected: AtomicBool,
    reconnect_attempts: AtomicU32,
    messages_received: AtomicU64,
    messages_malformed: AtomicU64,
    snapshot: Arc<dyn SnapshotSource>,
    transport: Arc<dyn StreamTransport>,
    codec: TickerCodec,
    broadcast: Arc<BroadcastHub>,
    config: SyncConfig,
    connection: Mutex<Option<Connection>>,
}

/// Live price synchronization instance.
///
/// Cheap to clone; clones share the same book and connection.
#[derive(Clone)]
pub struct LiveTickerSync {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for LiveTickerSync {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LiveTickerSync")
            .field("state", &self.state())
            .field("is_connected", &self.is_connected())
            .field("symbols", &self.inner.subscription.read().len())
            .finish_non_exhaustive()
    }
}

impl LiveTickerSync {
    /// Create an idle instance.
    #[must_use]
    pub fn new(
        snapshot: Arc<dyn SnapshotSource>,
        transport: Arc<dyn StreamTransport>,
        codec: TickerCodec,
        broadcast: Arc<BroadcastHub>,
        config: SyncConfig,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                book: RwLock::new(PriceBook::new()),
                state: RwLock::new(SyncState::Idle),
                subscription: RwLock::new(SubscriptionSet::new()),
                is_connected: AtomicBool::new(false),
                reconnect_attempts: AtomicU32::new(0),
                messages_received: AtomicU64::new(0),
                messages_malformed: AtomicU64::new(0),
                snapshot,
                transport,
                codec,
                broadcast,
                config,
                connection: Mutex::new(None),
            }),
        }
    }

    // =========================================================================
    // Operations
    // =========================================================================

    /// Start (or restart) synchronization for `symbols`.
    ///
    /// Duplicates are ignored; an empty list means the top-N set. Any
    /// previous connection is fully closed before the snapshot is fetched.
    /// Snapshot failure applies the fallback policy and is never returned.
    #[tracing::instrument(name = "ticker.initialize", skip_all, fields(requested = symbols.len()))]
    pub async fn initialize(&self, symbols: &[Symbol]) {
        let mut connection = self.inner.connection.lock().await;
        self.close_connection(&mut connection).await;

        let requested: SubscriptionSet = symbols.iter().cloned().collect();
        self.set_state(SyncState::SnapshotLoading);

        let request = if requested.is_empty() {
            SnapshotRequest::Top(self.inner.config.top_n)
        } else {
            SnapshotRequest::Symbols(requested.clone())
        };

        let (instruments, source) = match self.fetch_snapshot(&request).await {
            Ok(instruments) => (instruments, PriceSource::Baseline),
            Err(e) => {
                tracing::warn!(error = %e, "Snapshot failed, applying fallback");
                (self.inner.config.fallback.instruments(), PriceSource::Fallback)
            }
        };

        let subscription = if requested.is_empty() {
            instruments.iter().map(|i| i.symbol.clone()).collect()
        } else {
            requested
        };

        self.inner.book.write().replace_baseline(&instruments, source);
        tracing::info!(
            symbols = subscription.len(),
            baselines = instruments.len(),
            source = ?source,
            "Live ticker initialized"
        );

        self.open_connection(&mut connection, subscription);
    }

    /// Switch to a new subscription set, keeping what is already known.
    ///
    /// Baselines are fetched only for symbols with no record yet; records
    /// outside the new set are dropped. `known` may carry instruments the
    /// caller already fetched.
    #[tracing::instrument(name = "ticker.retarget", skip_all, fields(symbols = subscription.len()))]
    pub async fn retarget(&self, subscription: SubscriptionSet, known: &[Instrument]) {
        let mut connection = self.inner.connection.lock().await;

        let unchanged = *self.inner.subscription.read() == subscription
            && connection.as_ref().is_some_and(|c| !c.worker.is_finished());
        if unchanged {
            return;
        }

        self.close_connection(&mut connection).await;

        if !known.is_empty() {
            let relevant: Vec<Instrument> = known
                .iter()
                .filter(|i| subscription.contains(i.symbol.as_str()))
                .cloned()
                .collect();
            self.inner
                .book
                .write()
                .load_baseline(&relevant, PriceSource::Baseline);
        }

        let missing: Vec<Symbol> = {
            let book = self.inner.book.read();
            subscription
                .iter()
                .filter(|s| !book.contains(s.as_str()))
                .cloned()
                .collect()
        };

        if !missing.is_empty() {
            self.set_state(SyncState::SnapshotLoading);
            let request = SnapshotRequest::Symbols(missing.iter().cloned().collect());
            match self.fetch_snapshot(&request).await {
                Ok(instruments) => {
                    self.inner
                        .book
                        .write()
                        .load_baseline(&instruments, PriceSource::Baseline);
                }
                Err(e) => {
                    tracing::warn!(error = %e, missing = missing.len(), "Baseline fetch failed");
                    let placeholders = self.inner.config.fallback.instruments_for(&missing);
                    self.inner
                        .book
                        .write()
                        .load_baseline(&placeholders, PriceSource::Fallback);
                }
            }
        }

        self.inner
            .book
            .write()
            .retain(|s| subscription.contains(s.as_str()));

        tracing::info!(
            symbols = subscription.len(),
            fetched = missing.len(),
            "Live ticker retargeted"
        );

        self.open_connection(&mut connection, subscription);
    }

    /// Fetch the top-N instruments, falling back on failure.
    pub async fn resolve_top(&self) -> Vec<Instrument> {
        match self
            .fetch_snapshot(&SnapshotRequest::Top(self.inner.config.top_n))
            .await
        {
            Ok(instruments) => instruments,
            Err(e) => {
                tracing::warn!(error = %e, "Top snapshot failed, applying fallback");
                self.inner.config.fallback.instruments()
            }
        }
    }

    /// Close the connection and clear the view. Idempotent.
    #[tracing::instrument(name = "ticker.teardown", skip_all)]
    pub async fn teardown(&self) {
        let mut connection = self.inner.connection.lock().await;
        self.close_connection(&mut connection).await;

        self.inner.book.write().clear();
        *self.inner.subscription.write() = SubscriptionSet::new();
        metrics::set_subscribed_symbols(0);
        self.set_state(SyncState::Closed);
    }

    /// Decode one raw frame and apply every recognized update.
    ///
    /// Returns the number of updates that changed the book. Malformed
    /// input is logged and counted, never propagated.
    pub fn on_stream_message(&self, raw: &str) -> usize {
        self.inner.on_stream_message(raw)
    }

    /// Apply one already-decoded update.
    pub fn apply_update(&self, update: &TickerUpdate) -> ApplyOutcome {
        self.inner.apply_update(update)
    }

    // =========================================================================
    // Read Views
    // =========================================================================

    /// Copy of every record. An absent symbol means unavailable.
    #[must_use]
    pub fn get_snapshot(&self) -> HashMap<Symbol, LivePriceRecord> {
        self.inner.book.read().snapshot()
    }

    /// One record.
    #[must_use]
    pub fn record(&self, symbol: &str) -> Option<LivePriceRecord> {
        self.inner.book.read().get(symbol).cloned()
    }

    /// Symbol to last price.
    #[must_use]
    pub fn live_prices(&self) -> HashMap<Symbol, Decimal> {
        self.inner.book.read().prices()
    }

    /// Symbol to 24h change percentage.
    #[must_use]
    pub fn live_price_changes(&self) -> HashMap<Symbol, Decimal> {
        self.inner.book.read().changes()
    }

    /// First `n` records in subscription order.
    #[must_use]
    pub fn top(&self, n: usize) -> Vec<LivePriceRecord> {
        let subscription = self.inner.subscription.read().clone();
        let book = self.inner.book.read();
        subscription
            .iter()
            .filter_map(|s| book.get(s.as_str()).cloned())
            .take(n)
            .collect()
    }

    /// Whether the stream is connected.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.inner.is_connected.load(Ordering::SeqCst)
    }

    /// Lifecycle state.
    #[must_use]
    pub fn state(&self) -> SyncState {
        *self.inner.state.read()
    }

    /// Current subscription set.
    #[must_use]
    pub fn subscription(&self) -> SubscriptionSet {
        self.inner.subscription.read().clone()
    }

    /// Configured top-N size.
    #[must_use]
    pub fn top_n(&self) -> usize {
        self.inner.config.top_n
    }

    /// Broadcast channels carrying this instance's notifications.
    #[must_use]
    pub fn broadcast(&self) -> &Arc<BroadcastHub> {
        &self.inner.broadcast
    }

    /// Counters for health reporting.
    #[must_use]
    pub fn stats(&self) -> SyncStats {
        SyncStats {
            state: self.state(),
            is_connected: self.is_connected(),
            reconnect_attempts: self.inner.reconnect_attempts.load(Ordering::Relaxed),
            messages_received: self.inner.messages_received.load(Ordering::Relaxed),
            messages_malformed: self.inner.messages_malformed.load(Ordering::Relaxed),
            subscribed_symbols: self.inner.subscription.read().len(),
        }
    }

    // =========================================================================
    // Internals
    // =========================================================================

    async fn fetch_snapshot(
        &self,
        request: &SnapshotRequest,
    ) -> Result<Vec<Instrument>, SnapshotError> {
        let timeout = self.inner.config.snapshot_timeout;
        let started = Instant::now();

        let result = match tokio::time::timeout(timeout, self.inner.snapshot.fetch(request)).await
        {
            Ok(result) => result,
            Err(_) => Err(SnapshotError::Timeout(timeout)),
        };

        let outcome = match &result {
            Ok(_) => SnapshotOutcome::Success,
            Err(SnapshotError::Timeout(_)) => SnapshotOutcome::Timeout,
            Err(_) => SnapshotOutcome::Error,
        };
        metrics::record_snapshot(outcome, started.elapsed());

        result
    }

    fn open_connection(&self, slot: &mut Option<Connection>, subscription: SubscriptionSet) {
        metrics::set_subscribed_symbols(subscription.len());
        *self.inner.subscription.write() = subscription.clone();

        if subscription.is_empty() {
            tracing::info!("Nothing to subscribe to, staying idle");
            self.set_state(SyncState::Idle);
            return;
        }

        let cancel = CancellationToken::new();
        let (event_tx, event_rx) = mpsc::channel(self.inner.config.event_buffer.max(1));

        let worker = StreamWorker::new(
            Arc::clone(&self.inner.transport),
            subscription,
            self.inner.config.worker.clone(),
            event_tx,
            cancel.clone(),
        );
        let worker = tokio::spawn(async move {
            if let Err(e) = worker.run().await {
                tracing::error!(error = %e, "Ticker stream worker stopped");
            }
        });

        let handler = tokio::spawn(handle_stream_events(
            Arc::clone(&self.inner),
            event_rx,
            cancel.clone(),
        ));

        self.inner.reconnect_attempts.store(0, Ordering::Relaxed);
        self.set_state(SyncState::Streaming);

        *slot = Some(Connection {
            cancel,
            worker,
            handler,
        });
    }

    async fn close_connection(&self, slot: &mut Option<Connection>) {
        if let Some(connection) = slot.take() {
            connection.cancel.cancel();
            if let Err(e) = connection.handler.await {
                tracing::warn!(error = %e, "Stream event handler task failed");
            }
            if let Err(e) = connection.worker.await {
                tracing::warn!(error = %e, "Stream worker task failed");
            }
            tracing::debug!("Ticker stream connection closed");
        }
        self.inner.set_connected(false);
    }

    fn set_state(&self, state: SyncState) {
        self.inner.set_state(state);
    }
}

impl Inner {
    fn on_stream_message(&self, raw: &str) -> usize {
        let frame = match self.codec.decode(raw) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::warn!(error = %e, "Discarding malformed stream frame");
                self.messages_malformed.fetch_add(1, Ordering::Relaxed);
                metrics::record_messages_malformed(1);
                return 0;
            }
        };

        if !frame.errors.is_empty() {
            for e in &frame.errors {
                tracing::warn!(error = %e, "Discarding malformed stream message");
            }
            let count = frame.errors.len() as u64;
            self.messages_malformed.fetch_add(count, Ordering::Relaxed);
            metrics::record_messages_malformed(count);
        }

        let mut applied = 0;
        for (kind, update) in &frame.updates {
            metrics::record_message_received(kind);
            if self.apply_update(update).changed() {
                applied += 1;
            }
        }
        applied
    }

    fn apply_update(&self, update: &TickerUpdate) -> ApplyOutcome {
        let (outcome, record) = {
            let mut book = self.book.write();
            let outcome = book.apply(update, Utc::now());
            (outcome, book.get(update.symbol.as_str()).cloned())
        };

        match outcome {
            ApplyOutcome::Stale => {
                tracing::trace!(symbol = %update.symbol, "Discarding stale update");
                metrics::record_update_stale();
            }
            ApplyOutcome::Applied | ApplyOutcome::Created => {
                self.messages_received.fetch_add(1, Ordering::Relaxed);
                if let Some(record) = record {
                    let _ = self.broadcast.send_price_update(record);
                }
            }
        }

        outcome
    }

    fn set_state(&self, state: SyncState) {
        let changed = {
            let mut current = self.state.write();
            let changed = *current != state;
            *current = state;
            changed
        };
        if changed {
            tracing::debug!(state = state.as_str(), "Live ticker state changed");
            let _ = self.broadcast.send_status(state, self.is_connected.load(Ordering::SeqCst));
        }
    }

    fn set_connected(&self, connected: bool) {
        let previous = self.is_connected.swap(connected, Ordering::SeqCst);
        if previous != connected {
            metrics::set_stream_connected(connected);
            let _ = self.broadcast.send_status(*self.state.read(), connected);
        }
    }
}

/// Apply worker events in arrival order until cancelled or the worker stops.
async fn handle_stream_events(
    inner: Arc<Inner>,
    mut events: mpsc::Receiver<StreamEvent>,
    cancel: CancellationToken,
) {
    loop {
        let event = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            event = events.recv() => match event {
                Some(event) => event,
                None => break,
            },
        };

        match event {
            StreamEvent::Connected => {
                tracing::info!("Ticker stream connected");
                inner.reconnect_attempts.store(0, Ordering::Relaxed);
                inner.set_connected(true);
                inner.set_state(SyncState::Streaming);
            }
            StreamEvent::Frame(text) => {
                inner.on_stream_message(&text);
            }
            StreamEvent::Disconnected { reason } => {
                tracing::warn!(reason = %reason, "Ticker stream disconnected");
                inner.set_connected(false);
            }
            StreamEvent::Reconnecting { attempt, delay } => {
                tracing::info!(attempt, delay_ms = delay.as_millis(), "Ticker stream reconnecting");
                inner.reconnect_attempts.store(attempt, Ordering::Relaxed);
                inner.set_state(SyncState::Reconnecting);
            }
            StreamEvent::GaveUp { attempts } => {
                tracing::error!(attempts, "Ticker stream gave up reconnecting");
                inner.set_connected(false);
                inner.set_state(SyncState::Closed);
            }
        }
    }
}
