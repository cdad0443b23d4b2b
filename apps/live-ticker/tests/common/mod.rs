//! Shared fakes for the integration tests.

#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use tokio::sync::mpsc;

use live_ticker::infrastructure::stream::{HeartbeatConfig, ReconnectConfig};
use live_ticker::{
    BroadcastHub, FallbackPolicy, Frame, Instrument, LiveTickerSync, SnapshotError,
    SnapshotRequest, SnapshotSource, StreamConnection, StreamError, StreamTransport,
    SubscriptionSet, Symbol, SyncConfig, TickerCodec, WorkerConfig,
};

// =============================================================================
// Helpers
// =============================================================================

pub fn sym(s: &str) -> Symbol {
    Symbol::parse(s).unwrap()
}

pub fn syms(names: &[&str]) -> Vec<Symbol> {
    names.iter().map(|s| sym(s)).collect()
}

pub fn set(names: &[&str]) -> SubscriptionSet {
    syms(names).into_iter().collect()
}

pub fn instrument(symbol: &str, price: i64) -> Instrument {
    Instrument::new(sym(symbol), Decimal::new(price, 0))
}

/// Combined-stream ticker frame.
pub fn ticker_frame(pair: &str, price: &str, change: &str, event_time: i64) -> String {
    format!(
        r#"{{"stream":"{lower}@ticker","data":{{"e":"24hrTicker","E":{event_time},"s":"{pair}","c":"{price}","P":"{change}"}}}}"#,
        lower = pair.to_lowercase(),
    )
}

/// Poll `condition` until it holds or two seconds pass.
pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while !condition() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not met within 2s"
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

/// Fast reconnects, no jitter, long heartbeat.
pub fn fast_worker(max_attempts: u32) -> WorkerConfig {
    WorkerConfig {
        reconnect: ReconnectConfig::fixed(Duration::from_millis(10), max_attempts),
        heartbeat: HeartbeatConfig::new(Duration::from_secs(30), Duration::from_secs(60)),
    }
}

pub fn sync_config(fallback: FallbackPolicy) -> SyncConfig {
    SyncConfig {
        snapshot_timeout: Duration::from_millis(200),
        top_n: 2,
        fallback,
        worker: fast_worker(0),
        event_buffer: 64,
    }
}

pub fn build_sync(
    snapshot: Arc<dyn SnapshotSource>,
    transport: Arc<FakeTransport>,
    config: SyncConfig,
) -> LiveTickerSync {
    LiveTickerSync::new(
        snapshot,
        transport,
        TickerCodec::new("USDT"),
        Arc::new(BroadcastHub::with_defaults()),
        config,
    )
}

// =============================================================================
// Fake Snapshot Source
// =============================================================================

/// How the fake snapshot answers.
#[derive(Debug, Clone)]
pub enum SnapshotBehavior {
    /// Serve these instruments, filtered by the request.
    Serve(Vec<Instrument>),
    /// Fail every request.
    Fail,
    /// Never answer.
    Hang,
}

pub struct FakeSnapshotSource {
    behavior: Mutex<SnapshotBehavior>,
    requests: Mutex<Vec<SnapshotRequest>>,
}

impl FakeSnapshotSource {
    pub fn new(behavior: SnapshotBehavior) -> Arc<Self> {
        Arc::new(Self {
            behavior: Mutex::new(behavior),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn serving(instruments: Vec<Instrument>) -> Arc<Self> {
        Self::new(SnapshotBehavior::Serve(instruments))
    }

    pub fn set_behavior(&self, behavior: SnapshotBehavior) {
        *self.behavior.lock() = behavior;
    }

    pub fn requests(&self) -> Vec<SnapshotRequest> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl SnapshotSource for FakeSnapshotSource {
    async fn fetch(&self, request: &SnapshotRequest) -> Result<Vec<Instrument>, SnapshotError> {
        self.requests.lock().push(request.clone());
        let behavior = self.behavior.lock().clone();
        match behavior {
            SnapshotBehavior::Serve(instruments) => Ok(match request {
                SnapshotRequest::Symbols(set) => instruments
                    .into_iter()
                    .filter(|i| set.contains(i.symbol.as_str()))
                    .collect(),
                SnapshotRequest::Top(n) => instruments.into_iter().take(*n).collect(),
            }),
            SnapshotBehavior::Fail => Err(SnapshotError::Network("connection refused".into())),
            SnapshotBehavior::Hang => std::future::pending().await,
        }
    }
}

// =============================================================================
// Fake Stream Transport
// =============================================================================

enum Feed {
    Text(String),
    RemoteClose,
}

/// Test-side view of one opened connection.
#[derive(Clone)]
pub struct ConnectionProbe {
    pub subscription: SubscriptionSet,
    /// Every earlier connection was closed when this one opened.
    pub previous_closed_at_open: bool,
    feed: mpsc::UnboundedSender<Feed>,
    closed: Arc<AtomicBool>,
}

impl ConnectionProbe {
    pub fn push(&self, text: impl Into<String>) {
        let _ = self.feed.send(Feed::Text(text.into()));
    }

    pub fn remote_close(&self) {
        let _ = self.feed.send(Feed::RemoteClose);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

struct FakeConnection {
    feed: mpsc::UnboundedReceiver<Feed>,
    closed: Arc<AtomicBool>,
}

#[async_trait]
impl StreamConnection for FakeConnection {
    async fn next_frame(&mut self) -> Option<Result<Frame, StreamError>> {
        match self.feed.recv().await {
            Some(Feed::Text(text)) => Some(Ok(Frame::Text(text))),
            Some(Feed::RemoteClose) | None => None,
        }
    }

    async fn ping(&mut self) -> Result<(), StreamError> {
        Ok(())
    }

    async fn close(&mut self) -> Result<(), StreamError> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

impl Drop for FakeConnection {
    fn drop(&mut self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

/// In-memory transport recording every opened connection.
#[derive(Default)]
pub struct FakeTransport {
    opened: Mutex<Vec<ConnectionProbe>>,
    refuse: AtomicBool,
}

impl FakeTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Refuse every open.
    pub fn refusing() -> Arc<Self> {
        let transport = Self::default();
        transport.refuse.store(true, Ordering::SeqCst);
        Arc::new(transport)
    }

    pub fn opened(&self) -> Vec<ConnectionProbe> {
        self.opened.lock().clone()
    }

    pub fn open_count(&self) -> usize {
        self.opened.lock().len()
    }

    pub fn last(&self) -> ConnectionProbe {
        self.opened.lock().last().cloned().expect("no connection opened")
    }

    pub fn all_closed(&self) -> bool {
        self.opened.lock().iter().all(ConnectionProbe::is_closed)
    }
}

#[async_trait]
impl StreamTransport for FakeTransport {
    async fn open(
        &self,
        subscription: &SubscriptionSet,
    ) -> Result<Box<dyn StreamConnection>, StreamError> {
        if self.refuse.load(Ordering::SeqCst) {
            return Err(StreamError::Connect("refused".into()));
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let closed = Arc::new(AtomicBool::new(false));

        let mut opened = self.opened.lock();
        let previous_closed_at_open = opened.iter().all(ConnectionProbe::is_closed);
        opened.push(ConnectionProbe {
            subscription: subscription.clone(),
            previous_closed_at_open,
            feed: tx,
            closed: Arc::clone(&closed),
        });

        Ok(Box::new(FakeConnection { feed: rx, closed }))
    }
}
