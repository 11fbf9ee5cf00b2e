//! Integration tests driving the full client against an in-process mock
//! exchange server.
#![recursion_limit = "256"]

mod common;

use futures_util::future::BoxFuture;
use futures_util::{SinkExt, StreamExt};
use kucoin_futures_connector_rs::error::{KucoinError, Result as KucoinResult};
use kucoin_futures_connector_rs::types::{
    ConnectionState, FuturesMarket, KucoinWebsocketConfig, StreamDiagnostic,
};
use kucoin_futures_connector_rs::websocket::{
    EndpointResolver, KucoinFuturesWsClient, StreamHandlers,
};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::time::{sleep, timeout, timeout_at, Duration, Instant};
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::{accept_async, WebSocketStream};
use url::Url;

const WELCOME: &str = r#"{"id":"mock","type":"welcome"}"#;

// --- Test doubles ---

/// Resolver pointing at the local mock server, counting connect attempts.
struct StaticResolver {
    url: Url,
    calls: AtomicU32,
}

impl StaticResolver {
    fn for_addr(addr: SocketAddr) -> Arc<Self> {
        Arc::new(Self {
            url: Url::parse(&format!("ws://{}", addr)).unwrap(),
            calls: AtomicU32::new(0),
        })
    }

    fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

impl EndpointResolver for StaticResolver {
    fn resolve(&self) -> BoxFuture<'_, KucoinResult<Url>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let url = self.url.clone();
        Box::pin(async move { Ok(url) })
    }
}

/// Resolver whose future never completes, to exercise cancellation.
struct PendingResolver;

impl EndpointResolver for PendingResolver {
    fn resolve(&self) -> BoxFuture<'_, KucoinResult<Url>> {
        Box::pin(futures_util::future::pending())
    }
}

// --- Mock server helpers ---

async fn accept_with_welcome(listener: &TcpListener) -> WebSocketStream<TcpStream> {
    let (stream, _) = listener.accept().await.expect("accept failed");
    let mut ws = accept_async(stream).await.expect("ws handshake failed");
    ws.send(Message::Text(WELCOME.to_string()))
        .await
        .expect("welcome failed");
    ws
}

fn parse(text: &str) -> Value {
    serde_json::from_str(text).expect("client sent invalid JSON")
}

/// Replies to a client keep-alive ping; returns true when the frame was one.
async fn answer_if_ping(ws: &mut WebSocketStream<TcpStream>, value: &Value) -> bool {
    if value["type"] == "ping" {
        let pong = json!({"id": value["id"], "type": "pong"}).to_string();
        ws.send(Message::Text(pong)).await.ok();
        true
    } else {
        false
    }
}

fn ticker_message(symbol: &str, sequence: u64, price: f64) -> String {
    json!({
        "type": "message",
        "topic": format!("/contractMarket/ticker:{}", symbol),
        "subject": "ticker",
        "data": {
            "symbol": symbol,
            "sequence": sequence,
            "side": "sell",
            "price": price,
            "size": 16,
            "tradeId": "5c9dcf4170744d6f5a3d32fb",
            "bestBidSize": 795,
            "bestBidPrice": 3200.0,
            "bestAskPrice": 3600.0,
            "bestAskSize": 284,
            "ts": 1553846081210004941u64
        }
    })
    .to_string()
}

// --- Client helpers ---

fn fast_market_config() -> KucoinWebsocketConfig {
    let mut config = KucoinWebsocketConfig::market_stream(FuturesMarket::Coinm);
    config.reconnect_period = Duration::from_millis(100);
    config.ping_interval = Duration::from_millis(200);
    config.pong_timeout = Duration::from_millis(200);
    config.ack_timeout = Duration::from_millis(150);
    config
}

/// Subscribing in the instant before the first session publishes its writer
/// returns `NotConnected`; the topic is still queued for replay, which is
/// exactly what these tests rely on.
fn allow_disconnected<T>(result: KucoinResult<T>) {
    match result {
        Ok(_) => {}
        Err(KucoinError::NotConnected) => {}
        Err(e) => panic!("subscribe failed: {}", e),
    }
}

async fn wait_for_state(client: &KucoinFuturesWsClient, target: ConnectionState) {
    let mut state = client.state_stream();
    timeout(Duration::from_secs(5), state.wait_for(|s| *s == target))
        .await
        .unwrap_or_else(|_| panic!("timed out waiting for state {:?}", target))
        .expect("state channel closed");
}

// --- Tests ---

/// A market client subscribed to the XBTUSDM ticker receives exactly the
/// documented example event, decoded.
#[tokio::test]
async fn test_market_ticker_end_to_end() {
    common::setup();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server = tokio::spawn(async move {
        let mut ws = accept_with_welcome(&listener).await;
        while let Some(Ok(Message::Text(text))) = ws.next().await {
            let value = parse(&text);
            if answer_if_ping(&mut ws, &value).await {
                continue;
            }
            if value["type"] == "subscribe" {
                ws.send(Message::Text(ticker_message("XBTUSDM", 45, 3600.0)))
                    .await
                    .unwrap();
            }
        }
    });

    let (ticker_tx, mut ticker_rx) = mpsc::unbounded_channel();
    let handlers = StreamHandlers::new().on_symbol_ticker(move |event| {
        let _ = ticker_tx.send(event);
    });

    let resolver = StaticResolver::for_addr(addr);
    let client = KucoinFuturesWsClient::connect_with_resolver(
        fast_market_config(),
        handlers,
        resolver.clone(),
    )
    .await
    .expect("Failed to connect");

    allow_disconnected(client.subscribe_symbol_ticker(&["XBTUSDM"]).await);
    wait_for_state(&client, ConnectionState::Connected).await;

    let event = timeout(Duration::from_secs(5), ticker_rx.recv())
        .await
        .expect("timed out waiting for ticker")
        .expect("ticker channel closed");
    assert_eq!(event.symbol, "XBTUSDM");
    assert_eq!(event.price, 3600.00);
    assert_eq!(event.sequence, 45);
    assert_eq!(client.state(), ConnectionState::Connected);

    client.close().await;
    assert_eq!(client.state(), ConnectionState::Closed);
    server.abort();
}

/// Subscriptions made before a disconnect are replayed, in insertion order,
/// into the next session.
#[tokio::test]
async fn test_subscriptions_replay_after_reconnect() {
    common::setup();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let (replayed_tx, mut replayed_rx) = mpsc::unbounded_channel::<Vec<String>>();
    let server = tokio::spawn(async move {
        // First connection: wait until both subscriptions arrived, then
        // drop the socket without a close handshake.
        {
            let mut ws = accept_with_welcome(&listener).await;
            let mut seen = 0;
            while let Some(Ok(Message::Text(text))) = ws.next().await {
                let value = parse(&text);
                if answer_if_ping(&mut ws, &value).await {
                    continue;
                }
                if value["type"] == "subscribe" {
                    seen += 1;
                    if seen == 2 {
                        break;
                    }
                }
            }
        }
        // Second connection: collect the replay.
        let mut ws = accept_with_welcome(&listener).await;
        let mut topics = Vec::new();
        while let Some(Ok(Message::Text(text))) = ws.next().await {
            let value = parse(&text);
            if answer_if_ping(&mut ws, &value).await {
                continue;
            }
            if value["type"] == "subscribe" {
                topics.push(value["topic"].as_str().unwrap().to_string());
                if topics.len() == 2 {
                    replayed_tx.send(topics.clone()).unwrap();
                }
            }
        }
    });

    let resolver = StaticResolver::for_addr(addr);
    let client = KucoinFuturesWsClient::connect_with_resolver(
        fast_market_config(),
        StreamHandlers::new(),
        resolver,
    )
    .await
    .expect("Failed to connect");

    allow_disconnected(
        client
            .subscribe_topic("/contractMarket/ticker:XBTUSDM", false, false)
            .await,
    );
    allow_disconnected(
        client
            .subscribe_topic("/contractMarket/ticker:ETHUSDM", false, false)
            .await,
    );

    let replayed = timeout(Duration::from_secs(5), replayed_rx.recv())
        .await
        .expect("timed out waiting for replay")
        .expect("replay channel closed");
    assert_eq!(
        replayed,
        vec![
            "/contractMarket/ticker:XBTUSDM".to_string(),
            "/contractMarket/ticker:ETHUSDM".to_string(),
        ]
    );

    client.close().await;
    server.abort();
}

/// A topic unsubscribed before the disconnect is absent from the replay.
#[tokio::test]
async fn test_unsubscribed_topics_are_not_replayed() {
    common::setup();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let (both_seen_tx, mut both_seen_rx) = mpsc::unbounded_channel::<()>();
    let (replayed_tx, mut replayed_rx) = mpsc::unbounded_channel::<Vec<String>>();
    let server = tokio::spawn(async move {
        // First connection: report once both subscriptions arrived, then
        // drop the socket when the unsubscribe comes in.
        {
            let mut ws = accept_with_welcome(&listener).await;
            let mut seen = 0;
            while let Some(Ok(Message::Text(text))) = ws.next().await {
                let value = parse(&text);
                if answer_if_ping(&mut ws, &value).await {
                    continue;
                }
                if value["type"] == "subscribe" {
                    seen += 1;
                    if seen == 2 {
                        both_seen_tx.send(()).unwrap();
                    }
                }
                if value["type"] == "unsubscribe" {
                    break;
                }
            }
        }
        // Second connection: collect whatever is replayed within a window.
        let mut ws = accept_with_welcome(&listener).await;
        let mut topics = Vec::new();
        let deadline = Instant::now() + Duration::from_secs(1);
        loop {
            match timeout_at(deadline, ws.next()).await {
                Ok(Some(Ok(Message::Text(text)))) => {
                    let value = parse(&text);
                    if answer_if_ping(&mut ws, &value).await {
                        continue;
                    }
                    if value["type"] == "subscribe" {
                        topics.push(value["topic"].as_str().unwrap().to_string());
                    }
                }
                Ok(Some(Ok(_))) => {}
                _ => break,
            }
        }
        replayed_tx.send(topics).unwrap();
    });

    let resolver = StaticResolver::for_addr(addr);
    let client = KucoinFuturesWsClient::connect_with_resolver(
        fast_market_config(),
        StreamHandlers::new(),
        resolver,
    )
    .await
    .expect("Failed to connect");

    allow_disconnected(
        client
            .subscribe_topic("/contractMarket/ticker:XBTUSDM", false, false)
            .await,
    );
    let doomed = loop {
        // The id is needed for the unsubscribe; retry across the connect gap.
        match client
            .subscribe_topic("/contractMarket/ticker:ETHUSDM", false, false)
            .await
        {
            Ok(sub) => break sub,
            Err(KucoinError::NotConnected) => sleep(Duration::from_millis(20)).await,
            Err(e) => panic!("subscribe failed: {}", e),
        }
    };

    timeout(Duration::from_secs(5), both_seen_rx.recv())
        .await
        .expect("server never saw both subscriptions")
        .unwrap();
    client.unsubscribe(doomed.id).await.expect("unsubscribe failed");

    let replayed = timeout(Duration::from_secs(5), replayed_rx.recv())
        .await
        .expect("timed out waiting for replay")
        .expect("replay channel closed");
    assert_eq!(replayed, vec!["/contractMarket/ticker:XBTUSDM".to_string()]);

    client.close().await;
    server.abort();
}

/// A silent server trips the heartbeat deadline; the supervisor performs
/// exactly one reconnect attempt and the replacement session stays healthy.
#[tokio::test]
async fn test_heartbeat_timeout_triggers_single_reconnect() {
    common::setup();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server = tokio::spawn(async move {
        // First connection: welcome, then total silence.
        let mut ws1 = accept_with_welcome(&listener).await;
        let drain = tokio::spawn(async move { while let Some(Ok(_)) = ws1.next().await {} });
        // Second connection: healthy, answers every ping.
        let mut ws2 = accept_with_welcome(&listener).await;
        while let Some(Ok(Message::Text(text))) = ws2.next().await {
            let value = parse(&text);
            answer_if_ping(&mut ws2, &value).await;
        }
        drain.abort();
    });

    let mut config = fast_market_config();
    config.ping_interval = Duration::from_millis(100);
    config.pong_timeout = Duration::from_millis(100);

    let resolver = StaticResolver::for_addr(addr);
    let client = KucoinFuturesWsClient::connect_with_resolver(
        config,
        StreamHandlers::new(),
        resolver.clone(),
    )
    .await
    .expect("Failed to connect");

    wait_for_state(&client, ConnectionState::Connected).await;
    wait_for_state(&client, ConnectionState::Reconnecting).await;
    wait_for_state(&client, ConnectionState::Connected).await;
    assert_eq!(resolver.calls(), 2);

    // The replacement session is kept alive by its pongs; no further
    // attempts happen.
    sleep(Duration::from_millis(500)).await;
    assert_eq!(resolver.calls(), 2);
    assert_eq!(client.state(), ConnectionState::Connected);

    client.close().await;
    server.abort();
}

/// Closing while the reconnect delay is pending cancels the attempt: the
/// client reaches `Closed` without ever creating another session.
#[tokio::test]
async fn test_close_while_reconnecting_cancels_pending_attempt() {
    common::setup();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server = tokio::spawn(async move {
        // Accept one connection and drop it straight after the welcome.
        let ws = accept_with_welcome(&listener).await;
        drop(ws);
        // Keep the listener open so a second attempt would succeed if the
        // client (incorrectly) made one.
        loop {
            let _ = listener.accept().await;
        }
    });

    let mut config = fast_market_config();
    config.reconnect_period = Duration::from_secs(30);

    let resolver = StaticResolver::for_addr(addr);
    let client = KucoinFuturesWsClient::connect_with_resolver(
        config,
        StreamHandlers::new(),
        resolver.clone(),
    )
    .await
    .expect("Failed to connect");

    wait_for_state(&client, ConnectionState::Reconnecting).await;
    assert_eq!(resolver.calls(), 1);

    timeout(Duration::from_secs(2), client.close())
        .await
        .expect("close did not cancel the pending reconnect");
    assert_eq!(client.state(), ConnectionState::Closed);
    assert_eq!(resolver.calls(), 1);

    // Idempotent: a second close returns immediately with no effect.
    timeout(Duration::from_secs(1), client.close())
        .await
        .expect("second close did not return");
    assert_eq!(client.state(), ConnectionState::Closed);

    server.abort();
}

/// Closing cancels an in-flight endpoint resolution as well.
#[tokio::test]
async fn test_close_cancels_inflight_resolution() {
    common::setup();

    let client = KucoinFuturesWsClient::connect_with_resolver(
        fast_market_config(),
        StreamHandlers::new(),
        Arc::new(PendingResolver),
    )
    .await
    .expect("Failed to connect");

    wait_for_state(&client, ConnectionState::Connecting).await;

    // No session exists, so sends are guarded; the topic is still queued.
    let err = client
        .subscribe_topic("/contractMarket/ticker:XBTUSDM", false, false)
        .await
        .unwrap_err();
    assert!(matches!(err, KucoinError::NotConnected));

    timeout(Duration::from_secs(2), client.close())
        .await
        .expect("close did not cancel the pending resolution");
    assert_eq!(client.state(), ConnectionState::Closed);
}

/// A requested-but-missing subscribe receipt is reported as a diagnostic,
/// while an acked one stays quiet.
#[tokio::test]
async fn test_missing_subscribe_ack_is_reported() {
    common::setup();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server = tokio::spawn(async move {
        let mut ws = accept_with_welcome(&listener).await;
        while let Some(Ok(Message::Text(text))) = ws.next().await {
            let value = parse(&text);
            // Stay alive but never acknowledge the subscription.
            answer_if_ping(&mut ws, &value).await;
        }
    });

    let (diag_tx, mut diag_rx) = mpsc::unbounded_channel();
    let handlers = StreamHandlers::new().on_diagnostic(move |d| {
        let _ = diag_tx.send(d);
    });

    let resolver = StaticResolver::for_addr(addr);
    let client =
        KucoinFuturesWsClient::connect_with_resolver(fast_market_config(), handlers, resolver)
            .await
            .expect("Failed to connect");

    allow_disconnected(
        client
            .subscribe_topic("/contractMarket/ticker:XBTUSDM", false, true)
            .await,
    );

    let diagnostic = timeout(Duration::from_secs(5), diag_rx.recv())
        .await
        .expect("timed out waiting for ack diagnostic")
        .expect("diagnostic channel closed");
    match diagnostic {
        StreamDiagnostic::SubscriptionAckTimeout { topic, .. } => {
            assert_eq!(topic, "/contractMarket/ticker:XBTUSDM");
        }
        other => panic!("expected ack timeout, got {:?}", other),
    }

    client.close().await;
    server.abort();
}

/// An acknowledged subscription produces no diagnostic.
#[tokio::test]
async fn test_acked_subscription_stays_quiet() {
    common::setup();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server = tokio::spawn(async move {
        let mut ws = accept_with_welcome(&listener).await;
        while let Some(Ok(Message::Text(text))) = ws.next().await {
            let value = parse(&text);
            if answer_if_ping(&mut ws, &value).await {
                continue;
            }
            if value["type"] == "subscribe" {
                let ack = json!({"id": value["id"], "type": "ack"}).to_string();
                ws.send(Message::Text(ack)).await.unwrap();
            }
        }
    });

    let (diag_tx, mut diag_rx) = mpsc::unbounded_channel();
    let handlers = StreamHandlers::new().on_diagnostic(move |d| {
        let _ = diag_tx.send(d);
    });

    let resolver = StaticResolver::for_addr(addr);
    let client =
        KucoinFuturesWsClient::connect_with_resolver(fast_market_config(), handlers, resolver)
            .await
            .expect("Failed to connect");

    allow_disconnected(
        client
            .subscribe_topic("/contractMarket/ticker:XBTUSDM", false, true)
            .await,
    );

    // Several ack-timeout windows pass without a report.
    sleep(Duration::from_millis(600)).await;
    assert!(diag_rx.try_recv().is_err());

    client.close().await;
    server.abort();
}

/// User-stream events (order, balance, position) route to their typed
/// handlers end-to-end.
#[tokio::test]
async fn test_user_stream_events_route_to_typed_handlers() {
    common::setup();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server = tokio::spawn(async move {
        let mut ws = accept_with_welcome(&listener).await;
        while let Some(Ok(Message::Text(text))) = ws.next().await {
            let value = parse(&text);
            if answer_if_ping(&mut ws, &value).await {
                continue;
            }
            if value["type"] != "subscribe" {
                continue;
            }
            let topic = value["topic"].as_str().unwrap_or("").to_string();
            let reply = if topic.starts_with("/contract/position:") {
                json!({
                    "type": "message",
                    "userId": "5c32d69203aa676ce4b543c7",
                    "channelType": "private",
                    "topic": topic,
                    "subject": "position.change",
                    "data": {
                        "realisedGrossPnl": "0E-8",
                        "symbol": "XBTUSDM",
                        "crossMode": false,
                        "liquidationPrice": 1000000.0,
                        "posLoss": 0.0,
                        "avgEntryPrice": 7508.22,
                        "unrealisedPnl": -0.00014735,
                        "markPrice": 7947.83,
                        "posMargin": 0.00266779,
                        "autoDeposit": false,
                        "riskLimit": 100000,
                        "unrealisedCost": 0.00266375,
                        "posComm": 0.00000392,
                        "posMaint": 0.00001724,
                        "posCost": 0.00266375,
                        "maintMarginReq": 0.005,
                        "bankruptPrice": 1000000.0,
                        "realisedCost": 0.00000271,
                        "markValue": 0.00251640,
                        "posInit": 0.00266375,
                        "realisedPnl": -0.00000253,
                        "maintMargin": 0.00252044,
                        "realLeverage": 1.06,
                        "changeReason": "positionChange",
                        "currentCost": 0.00266375,
                        "openingTimestamp": 1558433191000u64,
                        "currentQty": -20,
                        "delevPercentage": 0.52,
                        "currentComm": 0.00000271,
                        "realisedGrossCost": 0.0,
                        "isOpen": true,
                        "posCross": 1.2e-7,
                        "currentTimestamp": 1558506060394u64,
                        "unrealisedRoePcnt": -0.0553,
                        "unrealisedPnlPcnt": -0.0553,
                        "settleCurrency": "XBT"
                    }
                })
            } else if topic == "/contractAccount/wallet" {
                json!({
                    "type": "message",
                    "userId": "xbc453tg732eba53a88ggyt8c",
                    "topic": topic,
                    "subject": "availableBalance.change",
                    "data": {
                        "availableBalance": 5923.0,
                        "holdBalance": 2312,
                        "currency": "USDT",
                        "timestamp": 1553842862614u64
                    }
                })
            } else if topic == "/contractMarket/tradeOrders" {
                json!({
                    "type": "message",
                    "topic": topic,
                    "subject": "orderChange",
                    "channelType": "private",
                    "data": {
                        "orderId": "5cdfc138b21023a909e5ad55",
                        "symbol": "XBTUSDM",
                        "type": "open",
                        "status": "open",
                        "orderType": "limit",
                        "side": "buy",
                        "price": "3600",
                        "size": "20000",
                        "remainSize": "20000",
                        "filledSize": "0",
                        "canceledSize": "0",
                        "clientOid": "5ce24c16b210233c36ee321d",
                        "orderTime": 1545914149935808589u64,
                        "liquidity": "maker",
                        "ts": 1545914149935808589u64
                    }
                })
            } else {
                continue;
            };
            ws.send(Message::Text(reply.to_string())).await.unwrap();
        }
    });

    let (position_tx, mut position_rx) = mpsc::unbounded_channel();
    let (balance_tx, mut balance_rx) = mpsc::unbounded_channel();
    let (order_tx, mut order_rx) = mpsc::unbounded_channel();
    let handlers = StreamHandlers::new()
        .on_position_change(move |e| {
            let _ = position_tx.send(e);
        })
        .on_balance_update(move |e| {
            let _ = balance_tx.send(e);
        })
        .on_order_update(move |e| {
            let _ = order_tx.send(e);
        });

    let mut config = KucoinWebsocketConfig::user_stream(
        FuturesMarket::Coinm,
        "test-key",
        "test-secret",
        "test-passphrase",
    );
    config.reconnect_period = Duration::from_millis(100);
    config.ping_interval = Duration::from_millis(200);
    config.pong_timeout = Duration::from_millis(200);

    let resolver = StaticResolver::for_addr(addr);
    let client = KucoinFuturesWsClient::connect_with_resolver(config, handlers, resolver)
        .await
        .expect("Failed to connect");

    allow_disconnected(client.subscribe_positions("XBTUSDM").await);
    allow_disconnected(client.subscribe_balance().await);
    allow_disconnected(client.subscribe_trade_orders().await);

    let position = timeout(Duration::from_secs(5), position_rx.recv())
        .await
        .expect("timed out waiting for position event")
        .unwrap();
    assert_eq!(position.symbol, "XBTUSDM");
    assert_eq!(position.change_reason, "positionChange");
    assert_eq!(position.current_qty, -20.0);

    let balance = timeout(Duration::from_secs(5), balance_rx.recv())
        .await
        .expect("timed out waiting for balance event")
        .unwrap();
    match balance {
        kucoin_futures_connector_rs::types::BalanceUpdateEvent::AvailableBalance(event) => {
            assert_eq!(event.available_balance, 5923.0);
            assert_eq!(event.hold_balance, 2312.0);
            assert_eq!(event.currency, "USDT");
        }
        other => panic!("expected available balance event, got {:?}", other),
    }

    let order = timeout(Duration::from_secs(5), order_rx.recv())
        .await
        .expect("timed out waiting for order event")
        .unwrap();
    assert_eq!(order.order_id, "5cdfc138b21023a909e5ad55");
    assert_eq!(order.status, "open");
    assert_eq!(order.price, "3600");

    // Market-only subscriptions are rejected synchronously on a user stream.
    let err = client.subscribe_symbol_ticker(&["XBTUSDM"]).await.unwrap_err();
    assert!(matches!(err, KucoinError::ParameterValueError { .. }));

    client.close().await;
    server.abort();
}

/// Private topics are rejected synchronously on a market stream.
#[tokio::test]
async fn test_private_topics_rejected_on_market_stream() {
    common::setup();

    let client = KucoinFuturesWsClient::connect_with_resolver(
        fast_market_config(),
        StreamHandlers::new(),
        Arc::new(PendingResolver),
    )
    .await
    .expect("Failed to connect");

    let err = client.subscribe_trade_orders().await.unwrap_err();
    assert!(matches!(err, KucoinError::ParameterValueError { .. }));
    let err = client.subscribe_positions("XBTUSDM").await.unwrap_err();
    assert!(matches!(err, KucoinError::ParameterValueError { .. }));

    client.close().await;
}

/// A user stream refuses to start without the full credential triple.
#[tokio::test]
async fn test_user_stream_requires_credentials() {
    common::setup();

    let mut config = KucoinWebsocketConfig::user_stream(
        FuturesMarket::Usdm,
        "test-key",
        "test-secret",
        "test-passphrase",
    );
    config.api_secret = None;

    let err = KucoinFuturesWsClient::connect_with_resolver(
        config,
        StreamHandlers::new(),
        Arc::new(PendingResolver),
    )
    .await
    .unwrap_err();
    assert!(matches!(
        err,
        KucoinError::ParameterRequiredError { ref param } if param == "api_secret"
    ));
}
