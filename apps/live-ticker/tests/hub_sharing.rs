//! Hub Sharing Integration Tests
//!
//! Tests reference-counted consumers sharing one stream connection.

#![allow(clippy::unwrap_used, clippy::expect_used)]

mod common;

use std::sync::Arc;
use std::time::Duration;

use rust_decimal::Decimal;
use tokio::time::timeout;

use common::{
    FakeSnapshotSource, FakeTransport, build_sync, instrument, set, sym, syms, sync_config,
    ticker_frame, wait_until,
};
use live_ticker::{FallbackPolicy, LiveTickerHub, SnapshotRequest, SnapshotSource, SyncState};

fn setup() -> (LiveTickerHub, Arc<FakeSnapshotSource>, Arc<FakeTransport>) {
    let snapshot = FakeSnapshotSource::serving(vec![
        instrument("BTC", 50_000),
        instrument("ETH", 3_000),
        instrument("SOL", 150),
    ]);
    let transport = FakeTransport::new();
    let sync = build_sync(
        Arc::clone(&snapshot) as Arc<dyn SnapshotSource>,
        Arc::clone(&transport),
        sync_config(FallbackPolicy::Empty),
    );
    (LiveTickerHub::new(sync), snapshot, transport)
}

#[tokio::test]
async fn overlapping_consumers_share_one_connection() {
    let (hub, _snapshot, transport) = setup();

    let first = hub.attach(&syms(&["BTC", "ETH"])).await;
    wait_until(|| transport.open_count() == 1).await;
    let second = hub.attach(&syms(&["ETH", "SOL"])).await;

    wait_until(|| transport.open_count() == 2).await;
    let opened = transport.opened();
    assert!(opened[0].is_closed());
    assert_eq!(transport.last().subscription, set(&["BTC", "ETH", "SOL"]));
    assert_eq!(hub.stats().consumer_count, 2);
    assert_eq!(hub.stats().symbol_count, 3);

    first.release().await;
    assert_eq!(hub.sync().subscription(), set(&["ETH", "SOL"]));
    assert!(hub.sync().record("BTC").is_none());
    assert!(hub.sync().record("ETH").is_some());

    second.release().await;
    assert_eq!(hub.stats().consumer_count, 0);
    assert_eq!(hub.sync().state(), SyncState::Closed);
    assert!(!hub.sync().is_connected());
    assert!(transport.all_closed());
}

#[tokio::test]
async fn attach_fetches_only_missing_baselines() {
    let (hub, snapshot, _transport) = setup();

    let first = hub.attach(&syms(&["BTC"])).await;
    let second = hub.attach(&syms(&["BTC", "ETH"])).await;

    let requests = snapshot.requests();
    assert_eq!(
        requests,
        vec![
            SnapshotRequest::Symbols(set(&["BTC"])),
            SnapshotRequest::Symbols(set(&["ETH"])),
        ]
    );

    first.release().await;
    second.release().await;
}

#[tokio::test]
async fn streamed_values_survive_retarget() {
    let (hub, _snapshot, transport) = setup();

    let first = hub.attach(&syms(&["BTC"])).await;
    wait_until(|| hub.sync().is_connected()).await;
    transport
        .last()
        .push(ticker_frame("BTCUSDT", "51000", "2.0", 1));
    wait_until(|| hub.sync().live_prices()[&sym("BTC")] == Decimal::new(51_000, 0)).await;

    let second = hub.attach(&syms(&["ETH"])).await;

    assert_eq!(
        hub.sync().live_prices()[&sym("BTC")],
        Decimal::new(51_000, 0)
    );
    assert_eq!(hub.sync().live_prices()[&sym("ETH")], Decimal::new(3_000, 0));

    first.release().await;
    second.release().await;
}

#[tokio::test]
async fn empty_attach_follows_top_set() {
    let (hub, snapshot, transport) = setup();

    let consumer = hub.attach(&[]).await;

    assert_eq!(consumer.symbols(), syms(&["BTC", "ETH"]).as_slice());
    assert_eq!(snapshot.requests(), vec![SnapshotRequest::Top(2)]);
    wait_until(|| transport.open_count() == 1).await;
    assert_eq!(transport.last().subscription, set(&["BTC", "ETH"]));
    assert_eq!(consumer.snapshot().len(), 2);

    consumer.release().await;
}

#[tokio::test]
async fn consumer_sees_only_its_symbols() {
    let (hub, _snapshot, transport) = setup();

    let btc = hub.attach(&syms(&["BTC"])).await;
    let eth = hub.attach(&syms(&["ETH"])).await;
    let mut updates = btc.updates();
    wait_until(|| hub.sync().is_connected()).await;

    let conn = transport.last();
    conn.push(ticker_frame("ETHUSDT", "3100", "1.0", 1));
    conn.push(ticker_frame("BTCUSDT", "51000", "2.0", 1));

    let received = timeout(Duration::from_secs(2), async {
        loop {
            let update = updates.recv().await.unwrap();
            if btc.wants(update.record.symbol.as_str()) {
                break update;
            }
        }
    })
    .await
    .unwrap();
    assert_eq!(received.record.symbol, sym("BTC"));

    let snapshot = btc.snapshot();
    assert_eq!(snapshot.len(), 1);
    assert_eq!(snapshot[0].symbol, sym("BTC"));

    btc.release().await;
    eth.release().await;
}

#[tokio::test]
async fn dropped_consumer_detaches() {
    let (hub, _snapshot, transport) = setup();

    let consumer = hub.attach(&syms(&["BTC"])).await;
    assert_eq!(hub.stats().consumer_count, 1);

    drop(consumer);

    wait_until(|| hub.stats().consumer_count == 0).await;
    wait_until(|| hub.sync().state() == SyncState::Closed).await;
    assert!(transport.all_closed());
}
