/*
[INPUT]:  In-memory fake transport and scripted server frames
[OUTPUT]: Test results for the stream client
[POS]:    Integration tests - subscription dispatch, sequencing, reconnect
[UPDATE]: When stream client behavior changes
*/

mod common;

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use common::{FakeConnector, ServerEnd, StaticCredentials, next_session, recv_within};
use grvt_adapter::ws::{ConnectionState, SubscribeOptions};
use grvt_adapter::{StreamClient, StreamConfig, Trade};
use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::sync::mpsc;
use tokio_test::{assert_err, assert_ok};

#[derive(Debug, Deserialize)]
struct Tick {
    price: String,
}

fn test_config() -> StreamConfig {
    StreamConfig {
        reconnect_base_delay_ms: 10,
        reconnect_max_delay_ms: 50,
        reconnect_jitter_ms: 0,
        ..StreamConfig::default()
    }
}

fn client_with(
    config: StreamConfig,
) -> (
    StreamClient,
    Arc<FakeConnector>,
    mpsc::UnboundedReceiver<ServerEnd>,
) {
    let (connector, sessions) = FakeConnector::new();
    let client = StreamClient::with_connector(
        "wss://stream.test/ws/full",
        config,
        Arc::new(StaticCredentials::default()),
        connector.clone(),
    );
    (client, connector, sessions)
}

fn tick(channel: &str, sequence: u64, price: &str) -> Value {
    json!({
        "channel": channel,
        "sequence_number": sequence.to_string(),
        "data": {"price": price},
    })
}

/// Subscribe a `Tick` handler that forwards prices into a channel
fn forward_ticks(client: &StreamClient, channel: &str) -> mpsc::UnboundedReceiver<String> {
    let (tx, rx) = mpsc::unbounded_channel();
    assert_ok!(client.subscribe(channel, move |tick: Tick| {
        let tx = tx.clone();
        async move {
            let _ = tx.send(tick.price);
            Ok(())
        }
    }));
    rx
}

#[tokio::test]
async fn test_subscribe_sends_frame_and_delivers_typed_payload() {
    let (client, _connector, mut sessions) = client_with(test_config());
    let (tx, mut trades) = mpsc::unbounded_channel();
    assert_ok!(client.subscribe_with(
        "trade",
        SubscribeOptions::default().param("instrument", "BTC_USDT_Perp"),
        move |trade: Trade| {
            let tx = tx.clone();
            async move {
                let _ = tx.send(trade);
                Ok(())
            }
        },
    ));
    let handle = client.start();

    let mut server = next_session(&mut sessions).await;
    assert_eq!(server.cookie, "gravity=session-token");
    assert_eq!(
        server.next_sent().await,
        json!({"op": "subscribe", "channel": "trade", "instrument": "BTC_USDT_Perp"})
    );

    server.push(json!({
        "channel": "trade.BTC_USDT_Perp",
        "sequence_number": 7,
        "data": {
            "trade_id": "t-1",
            "instrument": "BTC_USDT_Perp",
            "price": "65038.1",
            "size": "0.01",
            "is_taker_buyer": true,
            "created_time": "1700000000000000000"
        }
    }));

    let trade = recv_within(&mut trades).await;
    assert_eq!(trade.trade_id, "t-1");
    assert_eq!(trade.price.to_string(), "65038.1");
    assert_eq!(client.state(), ConnectionState::Connected);

    client.close();
    assert_ok!(handle.await.expect("stream task panicked"));
}

#[tokio::test]
async fn test_gap_reported_once_before_delivery() {
    let (client, _connector, mut sessions) = client_with(test_config());
    let events = Arc::new(Mutex::new(Vec::new()));

    let seen = events.clone();
    assert_ok!(client.subscribe("ticker", move |tick: Tick| {
        let seen = seen.clone();
        async move {
            seen.lock().push(format!("tick {}", tick.price));
            Ok(())
        }
    }));
    let gaps = events.clone();
    client.on_gap(move |channel, expected, actual| {
        let gaps = gaps.clone();
        async move {
            gaps.lock().push(format!("gap {channel} {expected} {actual}"));
            Ok(())
        }
    });
    let _handle = client.start();

    let mut server = next_session(&mut sessions).await;
    server.next_sent().await;
    server.push(tick("ticker.ETH", 1, "a"));
    server.push(tick("ticker.ETH", 2, "b"));
    server.push(tick("ticker.ETH", 4, "c"));
    server.push(tick("ticker.ETH", 5, "d"));

    tokio::time::timeout(Duration::from_secs(2), async {
        while events.lock().len() < 5 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("payloads not delivered");

    assert_eq!(
        *events.lock(),
        vec!["tick a", "tick b", "gap ticker.ETH 3 4", "tick c", "tick d"]
    );
    assert_eq!(client.stats().gaps_detected, 1);
    client.close();
}

#[tokio::test]
async fn test_sequences_are_tracked_per_delivered_channel() {
    let (client, _connector, mut sessions) = client_with(test_config());
    let mut prices = forward_ticks(&client, "ticker");
    let _handle = client.start();

    let mut server = next_session(&mut sessions).await;
    server.next_sent().await;
    server.push(tick("ticker.BTC", 100, "1"));
    server.push(tick("ticker.ETH", 5, "2"));
    server.push(tick("ticker.BTC", 101, "3"));
    server.push(tick("ticker.ETH", 6, "4"));

    for expected in ["1", "2", "3", "4"] {
        assert_eq!(recv_within(&mut prices).await, expected);
    }
    assert_eq!(client.stats().gaps_detected, 0);
    client.close();
}

#[tokio::test]
async fn test_failing_handlers_are_isolated() {
    let (client, _connector, mut sessions) = client_with(test_config());

    assert_ok!(client.subscribe_with(
        "book.BTC",
        SubscribeOptions::exact(),
        |_: Value| async { Err("downstream rejected the update".into()) },
    ));
    assert_ok!(client.subscribe("book", |_: Tick| async {
        panic!("handler bug")
    }));
    let mut healthy = forward_ticks(&client, "ticker");
    let _handle = client.start();

    let mut server = next_session(&mut sessions).await;
    for _ in 0..3 {
        server.next_sent().await;
    }

    server.push(tick("book.BTC", 1, "x"));
    server.push(tick("ticker.BTC", 1, "still flowing"));
    assert_eq!(recv_within(&mut healthy).await, "still flowing");

    let stats = client.stats();
    assert_eq!(stats.handler_failures, 2);
    assert_eq!(client.state(), ConnectionState::Connected);
    client.close();
}

#[tokio::test]
async fn test_undecodable_payload_only_skips_that_subscriber() {
    let (client, _connector, mut sessions) = client_with(test_config());
    let mut typed = forward_ticks(&client, "ticker");
    let (raw_tx, mut raw) = mpsc::unbounded_channel();
    assert_ok!(client.subscribe_with(
        "ticker.SOL",
        SubscribeOptions::exact(),
        move |value: Value| {
            let raw_tx = raw_tx.clone();
            async move {
                let _ = raw_tx.send(value);
                Ok(())
            }
        },
    ));
    let _handle = client.start();

    let mut server = next_session(&mut sessions).await;
    server.next_sent().await;
    server.next_sent().await;

    server.push(json!({"channel": "ticker.SOL", "data": {"unexpected": true}}));
    server.push_raw("{not json");
    server.push(tick("ticker.SOL", 2, "ok"));

    assert_eq!(recv_within(&mut raw).await, json!({"unexpected": true}));
    assert_eq!(recv_within(&mut typed).await, "ok");
    assert_eq!(client.stats().decode_failures, 2);
    client.close();
}

#[tokio::test]
async fn test_reconnect_resubscribes_without_spurious_gap() {
    let (client, connector, mut sessions) = client_with(test_config());
    let mut prices = forward_ticks(&client, "ticker");
    client.on_gap(|channel, expected, actual| async move {
        Err(format!("unexpected gap on {channel}: {expected} -> {actual}").into())
    });
    let mut states = client.state_changes();
    let _handle = client.start();

    let mut first = next_session(&mut sessions).await;
    first.next_sent().await;
    first.push(tick("ticker.BTC", 500, "before"));
    assert_eq!(recv_within(&mut prices).await, "before");

    first.push_error("connection reset by peer");
    let mut second = next_session(&mut sessions).await;
    assert_eq!(
        second.next_sent().await,
        json!({"op": "subscribe", "channel": "ticker"})
    );

    second.push(tick("ticker.BTC", 1, "after"));
    assert_eq!(recv_within(&mut prices).await, "after");

    let stats = client.stats();
    assert_eq!(stats.gaps_detected, 0);
    assert_eq!(stats.reconnects, 1);
    assert_eq!(connector.connects.load(Ordering::SeqCst), 2);
    assert_ok!(states.wait_for(|state| *state == ConnectionState::Connected).await);
    client.close();
}

#[tokio::test]
async fn test_connect_failures_back_off_and_recover() {
    let (client, connector, mut sessions) = client_with(test_config());
    connector.refuse_next(2);
    let _handle = client.start();

    let _server = next_session(&mut sessions).await;
    assert_eq!(connector.connects.load(Ordering::SeqCst), 3);
    assert_eq!(client.stats().reconnects, 2);
    client.close();
}

#[tokio::test]
async fn test_silent_transport_triggers_reconnect() {
    let config = StreamConfig {
        ping_interval_ms: 30,
        pong_timeout_ms: 30,
        ..test_config()
    };
    let (client, _connector, mut sessions) = client_with(config);
    let _handle = client.start();

    let _first = next_session(&mut sessions).await;
    let _second = next_session(&mut sessions).await;
    assert!(client.stats().reconnects >= 1);
    client.close();
}

#[tokio::test]
async fn test_unsubscribe_stops_delivery() {
    let (client, _connector, mut sessions) = client_with(test_config());
    let mut prices = forward_ticks(&client, "ticker");
    let _handle = client.start();

    let mut server = next_session(&mut sessions).await;
    server.next_sent().await;
    server.push(tick("ticker.BTC", 1, "first"));
    assert_eq!(recv_within(&mut prices).await, "first");

    assert!(client.unsubscribe("ticker"));
    assert!(!client.unsubscribe("ticker"));
    assert_eq!(
        server.next_sent().await,
        json!({"op": "unsubscribe", "channel": "ticker"})
    );

    server.push(tick("ticker.BTC", 2, "second"));
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(prices.try_recv().is_err());
    client.close();
}

#[tokio::test]
async fn test_resubscribe_replaces_handler() {
    let (client, _connector, mut sessions) = client_with(test_config());
    let mut old = forward_ticks(&client, "ticker");
    let mut new = forward_ticks(&client, "ticker");
    assert_eq!(client.subscriptions(), vec!["ticker".to_string()]);
    let _handle = client.start();

    let mut server = next_session(&mut sessions).await;
    server.next_sent().await;
    server.push(tick("ticker.BTC", 1, "p"));

    assert_eq!(recv_within(&mut new).await, "p");
    assert!(old.try_recv().is_err());
    assert!(server.try_next_sent().is_none());
    client.close();
}

#[tokio::test]
async fn test_send_raw_is_held_until_connected() {
    let (client, _connector, mut sessions) = client_with(test_config());
    assert_ok!(client.send_raw(&json!({"op": "create_order", "client_order_id": 7})));
    let _handle = client.start();

    let mut server = next_session(&mut sessions).await;
    assert_eq!(
        server.next_sent().await,
        json!({"op": "create_order", "client_order_id": 7})
    );
    client.close();
}

#[tokio::test]
async fn test_close_stops_loop_and_drops_subscriptions() {
    let (client, _connector, mut sessions) = client_with(test_config());
    let mut prices = forward_ticks(&client, "ticker");
    let handle = client.start();

    let mut server = next_session(&mut sessions).await;
    server.next_sent().await;

    client.close();
    let result = tokio::time::timeout(Duration::from_secs(2), handle)
        .await
        .expect("stream loop did not stop")
        .expect("stream task panicked");
    assert_ok!(result);

    server.push(tick("ticker.BTC", 1, "late"));
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(prices.try_recv().is_err());
    assert!(client.subscriptions().is_empty());
    assert_eq!(client.state(), ConnectionState::Closed);
    assert_err!(client.subscribe("ticker", |_: Tick| async { Ok(()) }));
}

#[tokio::test]
async fn test_second_run_is_rejected() {
    let (client, _connector, mut sessions) = client_with(test_config());
    let _handle = client.start();
    let _server = next_session(&mut sessions).await;

    assert_err!(client.run_forever().await);
    client.close();
}

#[tokio::test]
async fn test_close_interrupts_running_handler() {
    let (client, _connector, mut sessions) = client_with(test_config());
    let (started_tx, mut started) = mpsc::unbounded_channel();
    assert_ok!(client.subscribe("slow", move |_: Tick| {
        let started_tx = started_tx.clone();
        async move {
            let _ = started_tx.send(());
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        }
    }));
    let handle = client.start();

    let mut server = next_session(&mut sessions).await;
    server.next_sent().await;
    server.push(tick("slow", 1, "p"));
    recv_within(&mut started).await;

    client.close();
    let result = tokio::time::timeout(Duration::from_millis(500), handle)
        .await
        .expect("close waited for the handler")
        .expect("stream task panicked");
    assert_ok!(result);
    assert_eq!(client.state(), ConnectionState::Closed);
}

#[tokio::test]
async fn test_long_handler_is_not_treated_as_silence() {
    let config = StreamConfig {
        ping_interval_ms: 20,
        pong_timeout_ms: 200,
        ..test_config()
    };
    let (client, connector, mut sessions) = client_with(config);
    let (done_tx, mut done) = mpsc::unbounded_channel();
    assert_ok!(client.subscribe("slow", move |_: Tick| {
        let done_tx = done_tx.clone();
        async move {
            tokio::time::sleep(Duration::from_millis(400)).await;
            let _ = done_tx.send(());
            Ok(())
        }
    }));
    let _handle = client.start();

    let mut server = next_session(&mut sessions).await;
    server.next_sent().await;
    server.push(tick("slow", 1, "p"));
    recv_within(&mut done).await;

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(connector.connects.load(Ordering::SeqCst), 1);
    assert_eq!(client.stats().reconnects, 0);
    assert_eq!(client.state(), ConnectionState::Connected);
    client.close();
}

#[tokio::test]
async fn test_zero_ping_interval_does_not_panic() {
    let config = StreamConfig {
        ping_interval_ms: 0,
        pong_timeout_ms: 1_000,
        ..test_config()
    };
    let (client, _connector, mut sessions) = client_with(config);
    let mut prices = forward_ticks(&client, "ticker");
    let handle = client.start();

    let mut server = next_session(&mut sessions).await;
    server.next_sent().await;
    server.push(tick("ticker.BTC", 1, "alive"));
    assert_eq!(recv_within(&mut prices).await, "alive");

    client.close();
    let result = tokio::time::timeout(Duration::from_secs(2), handle)
        .await
        .expect("stream loop did not stop")
        .expect("stream task panicked");
    assert_ok!(result);
}
