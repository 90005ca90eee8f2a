mod common;

use common::{mock_transport, test_config, MockExchange, Peer};
use huobi_api::core::kernel::{ConnectionState, WsConfig};
use huobi_api::exchanges::huobi::Account;
use huobi_api::{ExchangeConfig, ExchangeError, TradeWsClient, TradeWsV2Client};
use serde_json::{json, Value};
use std::time::Duration;
use tokio::sync::mpsc::unbounded_channel;

const ORDERS_TOPIC: &str = "orders.btcusdt";
const ACCOUNTS_CH: &str = "accounts.update#0";

fn credentials() -> ExchangeConfig {
    ExchangeConfig::new("key".to_string(), "secret".to_string())
}

/// Connect a v1 client, answering its auth frame with `reply`
async fn connect_v1_with(
    config: WsConfig,
    reply: Value,
) -> (Result<TradeWsClient, ExchangeError>, MockExchange, Peer) {
    let (transport, mut exchange) = mock_transport(true);
    let task = tokio::spawn(async move {
        TradeWsClient::connect(
            "wss://api.huobi.pro/ws/v1".to_string(),
            &credentials(),
            transport,
            config,
        )
        .await
    });

    let mut peer = exchange.accept().await;
    let auth = peer.next_json().await;
    assert_eq!(auth["op"], "auth");
    assert_eq!(auth["AccessKeyId"], "key");
    assert_eq!(auth["SignatureVersion"], "2");
    assert!(auth["Signature"].as_str().is_some());
    peer.send(reply);

    (task.await.unwrap(), exchange, peer)
}

async fn connect_v1() -> (TradeWsClient, MockExchange, Peer) {
    let (client, exchange, peer) =
        connect_v1_with(test_config(), json!({"op": "auth", "err-code": 0})).await;
    (client.unwrap(), exchange, peer)
}

async fn connect_v2(config: WsConfig) -> (TradeWsV2Client, MockExchange, Peer) {
    let (transport, mut exchange) = mock_transport(false);
    let task = tokio::spawn(async move {
        TradeWsV2Client::connect(
            "wss://api.huobi.pro/ws/v2".to_string(),
            &credentials(),
            transport,
            config,
        )
        .await
    });

    let mut peer = exchange.accept().await;
    let auth = peer.next_json().await;
    assert_eq!(auth["action"], "req");
    assert_eq!(auth["ch"], "auth");
    assert_eq!(auth["params"]["authType"], "api");
    assert_eq!(auth["params"]["signatureVersion"], "2.1");
    peer.send(json!({"action": "req", "ch": "auth", "code": 200, "data": {}}));

    (task.await.unwrap().unwrap(), exchange, peer)
}

#[tokio::test]
async fn test_v1_auth_failure_fails_connect() {
    let (result, exchange, _peer) = connect_v1_with(
        test_config(),
        json!({"op": "auth", "err-code": 2002, "err-msg": "invalid signature"}),
    )
    .await;

    match result {
        Err(ExchangeError::ApiError { message, .. }) => assert_eq!(message, "invalid signature"),
        other => panic!("expected auth rejection, got {:?}", other.map(|_| ())),
    }
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(exchange.dials(), 1);
}

#[tokio::test]
async fn test_v1_subscribe_and_notify() {
    let (client, _exchange, mut peer) = connect_v1().await;
    let (tx, mut rx) = unbounded_channel();

    let task = {
        let client = client.clone();
        tokio::spawn(async move {
            client
                .subscribe(ORDERS_TOPIC, move |topic: &str, document: &Value| {
                    let _ = tx.send((topic.to_string(), document["data"].clone()));
                })
                .await
        })
    };
    assert_eq!(
        peer.next_json().await,
        json!({"op": "sub", "topic": ORDERS_TOPIC})
    );
    peer.send(json!({"op": "sub", "topic": ORDERS_TOPIC, "err-code": 0, "ts": 1}));
    task.await.unwrap().unwrap();

    peer.send(json!({"op": "notify", "topic": ORDERS_TOPIC, "data": {"order-id": 7}}));
    let (topic, data) = rx.recv().await.unwrap();
    assert_eq!(topic, ORDERS_TOPIC);
    assert_eq!(data["order-id"], 7);
}

#[tokio::test]
async fn test_v1_subscribe_rejected() {
    let (client, _exchange, mut peer) = connect_v1().await;

    let task = {
        let client = client.clone();
        tokio::spawn(async move { client.subscribe("orders.nope", |_, _| {}).await })
    };
    peer.next_json().await;
    peer.send(json!({"op": "sub", "topic": "orders.nope", "err-code": 1, "err-msg": "invalid topic"}));

    match task.await.unwrap() {
        Err(ExchangeError::ApiError { message, .. }) => assert_eq!(message, "invalid topic"),
        other => panic!("expected api error, got {:?}", other),
    }
    assert!(client.session().topics().await.is_empty());
}

#[tokio::test]
async fn test_v1_request_as() {
    let (client, _exchange, mut peer) = connect_v1().await;

    let task = {
        let client = client.clone();
        tokio::spawn(async move { client.request_as::<Vec<Account>>("accounts.list", None).await })
    };
    assert_eq!(
        peer.next_json().await,
        json!({"op": "req", "topic": "accounts.list"})
    );
    peer.send(json!({
        "op": "req",
        "topic": "accounts.list",
        "err-code": 0,
        "data": [{"id": 100009, "type": "spot", "state": "working"}]
    }));

    let accounts = task.await.unwrap().unwrap();
    assert_eq!(accounts.len(), 1);
    assert_eq!(accounts[0].id, 100_009);
}

#[tokio::test]
async fn test_v1_request_error() {
    let (client, _exchange, mut peer) = connect_v1().await;

    let task = {
        let client = client.clone();
        tokio::spawn(async move { client.request("orders.detail", None).await })
    };
    peer.next_json().await;
    peer.send(json!({"op": "req", "topic": "orders.detail", "err-code": 40, "err-msg": "no such order"}));

    match task.await.unwrap() {
        Err(ExchangeError::ApiError { code, message, .. }) => {
            assert_eq!(code, "40");
            assert_eq!(message, "no such order");
        }
        other => panic!("expected api error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_v1_server_ping_echo() {
    let (_client, _exchange, mut peer) = connect_v1().await;

    peer.send(json!({"op": "ping", "ts": 1575513574985u64}));
    assert_eq!(
        peer.next_json().await,
        json!({"op": "pong", "ts": 1575513574985u64})
    );
}

#[tokio::test]
async fn test_v1_reauthenticates_before_replay() {
    let (client, mut exchange, mut peer) = connect_v1().await;

    let task = {
        let client = client.clone();
        tokio::spawn(async move { client.subscribe(ORDERS_TOPIC, |_, _| {}).await })
    };
    peer.next_json().await;
    peer.send(json!({"op": "sub", "topic": ORDERS_TOPIC, "err-code": 0}));
    task.await.unwrap().unwrap();

    drop(peer);
    let mut peer = exchange.accept().await;

    assert_eq!(peer.next_json().await["op"], "auth");
    peer.assert_silent(Duration::from_millis(100)).await;
    peer.send(json!({"op": "auth", "err-code": 0}));

    assert_eq!(
        peer.next_json().await,
        json!({"op": "sub", "topic": ORDERS_TOPIC})
    );
    peer.send(json!({"op": "sub", "topic": ORDERS_TOPIC, "err-code": 0}));
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(client.state(), ConnectionState::Connected);
}

#[tokio::test]
async fn test_v1_unsubscribe() {
    let (client, _exchange, mut peer) = connect_v1().await;

    let task = {
        let client = client.clone();
        tokio::spawn(async move { client.subscribe(ORDERS_TOPIC, |_, _| {}).await })
    };
    peer.next_json().await;
    peer.send(json!({"op": "sub", "topic": ORDERS_TOPIC, "err-code": 0}));
    task.await.unwrap().unwrap();

    client.unsubscribe(ORDERS_TOPIC).await.unwrap();
    assert_eq!(
        peer.next_json().await,
        json!({"op": "unsub", "topic": ORDERS_TOPIC})
    );
}

#[tokio::test]
async fn test_v2_subscribe_push_and_local_unsubscribe() {
    let (client, _exchange, mut peer) = connect_v2(test_config()).await;
    let (tx, mut rx) = unbounded_channel();

    let task = {
        let client = client.clone();
        tokio::spawn(async move {
            client
                .subscribe(ACCOUNTS_CH, move |_: &str, document: &Value| {
                    let _ = tx.send(document["data"].clone());
                })
                .await
        })
    };
    assert_eq!(
        peer.next_json().await,
        json!({"action": "sub", "ch": ACCOUNTS_CH})
    );
    peer.send(json!({"action": "sub", "code": 200, "ch": ACCOUNTS_CH, "data": {}}));
    task.await.unwrap().unwrap();

    peer.send(json!({"action": "push", "ch": ACCOUNTS_CH, "data": {"currency": "usdt"}}));
    assert_eq!(rx.recv().await.unwrap()["currency"], "usdt");

    client.unsubscribe(ACCOUNTS_CH).await.unwrap();
    peer.assert_silent(Duration::from_millis(100)).await;

    peer.send(json!({"action": "push", "ch": ACCOUNTS_CH, "data": {"currency": "btc"}}));
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn test_v2_subscribe_rejected() {
    let (client, _exchange, mut peer) = connect_v2(test_config()).await;

    let task = {
        let client = client.clone();
        tokio::spawn(async move { client.subscribe("orders#nope", |_, _| {}).await })
    };
    peer.next_json().await;
    peer.send(json!({"action": "sub", "code": 2001, "ch": "orders#nope", "message": "invalid.ch"}));

    match task.await.unwrap() {
        Err(ExchangeError::ApiError { code, message, .. }) => {
            assert_eq!(code, "2001");
            assert_eq!(message, "invalid.ch");
        }
        other => panic!("expected api error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_v2_server_ping_echo() {
    let (_client, _exchange, mut peer) = connect_v2(test_config()).await;

    peer.send(json!({"action": "ping", "data": {"ts": 1575513574985u64}}));
    assert_eq!(
        peer.next_json().await,
        json!({"action": "pong", "data": {"ts": 1575513574985u64}})
    );
}

#[tokio::test]
async fn test_v2_request_times_out_then_recovers() {
    let config = test_config().with_request_timeout(Duration::from_millis(100));
    let (client, _exchange, mut peer) = connect_v2(config).await;

    let result = client.request("orders#btcusdt", None).await;
    assert!(matches!(result, Err(ExchangeError::RequestTimeout(_))));
    assert_eq!(
        peer.next_json().await,
        json!({"action": "req", "ch": "orders#btcusdt", "params": {}})
    );

    let task = {
        let client = client.clone();
        tokio::spawn(async move { client.request("orders#btcusdt", None).await })
    };
    peer.next_json().await;
    peer.send(json!({"action": "req", "ch": "orders#btcusdt", "code": 200, "data": []}));
    assert_eq!(task.await.unwrap().unwrap()["data"], json!([]));
}

#[tokio::test]
async fn test_v2_manual_reconnect_fails_pending_request() {
    let config = test_config().with_request_timeout(Duration::from_secs(10));
    let (client, mut exchange, mut peer) = connect_v2(config).await;

    let task = {
        let client = client.clone();
        tokio::spawn(async move { client.request("orders#btcusdt", None).await })
    };
    peer.next_json().await;

    let reconnect = {
        let client = client.clone();
        tokio::spawn(async move { client.reconnect().await })
    };
    let result = tokio::time::timeout(Duration::from_secs(1), task)
        .await
        .expect("pending request outlived its connection")
        .unwrap();
    assert!(matches!(result, Err(ExchangeError::ConnectionClosed)));

    let mut fresh = exchange.accept().await;
    assert_eq!(fresh.next_json().await["ch"], "auth");
    fresh.send(json!({"action": "req", "ch": "auth", "code": 200, "data": {}}));
    reconnect.await.unwrap();

    assert_eq!(client.state(), ConnectionState::Connected);
    assert_eq!(exchange.dials(), 2);
}

#[tokio::test]
async fn test_v2_subscribe_waits_for_reauth() {
    let (client, mut exchange, peer) = connect_v2(test_config()).await;

    drop(peer);
    let mut fresh = exchange.accept().await;
    assert_eq!(fresh.next_json().await["ch"], "auth");

    let task = {
        let client = client.clone();
        tokio::spawn(async move { client.subscribe(ACCOUNTS_CH, |_, _| {}).await })
    };
    fresh.assert_silent(Duration::from_millis(100)).await;
    assert!(!task.is_finished());

    fresh.send(json!({"action": "req", "ch": "auth", "code": 200, "data": {}}));
    assert_eq!(
        fresh.next_json().await,
        json!({"action": "sub", "ch": ACCOUNTS_CH})
    );
    fresh.send(json!({"action": "sub", "code": 200, "ch": ACCOUNTS_CH, "data": {}}));
    task.await.unwrap().unwrap();
    assert_eq!(client.session().topics().await, vec![ACCOUNTS_CH.to_string()]);
}

#[tokio::test]
async fn test_v2_close_fails_pending_request() {
    let (client, _exchange, mut peer) = connect_v2(test_config()).await;

    let task = {
        let client = client.clone();
        tokio::spawn(async move { client.request("orders#btcusdt", None).await })
    };
    peer.next_json().await;
    client.close().await;

    assert!(matches!(
        task.await.unwrap(),
        Err(ExchangeError::ConnectionClosed)
    ));
    assert_eq!(client.state(), ConnectionState::Closed);
}
