use axum::http::StatusCode;
use graphcache::api;
use graphcache::cache::MemoryCache;
use graphcache::config::{ChainConfig, NetworkConfig};
use graphcache::domain::{ChainId, EthAddress, EthTxHash, NetworkName, PoolLocation};
use graphcache::orchestration::{Controller, ControllerOverNetwork};
use graphcache::refresh::RefreshMsg;
use graphcache::tables::{Balance, ChangeType, LiqChange, PositionType};
use std::sync::Arc;
use tokio::sync::mpsc;
use tower::util::ServiceExt;

const NOW: i64 = 1_700_000_000;

fn clock() -> i64 {
    NOW
}

fn addr(n: u8) -> String {
    format!("0x{:040x}", n)
}

struct TestApp {
    app: axum::Router,
    ctrl: ControllerOverNetwork,
    _updates: mpsc::Receiver<RefreshMsg>,
}

fn setup_test_app() -> TestApp {
    let mut cfg = NetworkConfig::default();
    cfg.insert(
        NetworkName::new("ethereum"),
        ChainConfig {
            chain_id: 1,
            subgraph: String::new(),
            query_contract: String::new(),
            knockout_tick_width: 4,
            rpc: String::new(),
        },
    );
    let net_cfg = Arc::new(cfg);
    let cache = Arc::new(MemoryCache::new());
    let (tx, rx) = mpsc::channel(10_000);
    let ctrl = Controller::with_updates(net_cfg.clone(), cache.clone(), tx, clock)
        .on_network(&NetworkName::new("ethereum"))
        .unwrap();
    let app = api::create_router(api::AppState::new(cache, net_cfg).with_clock(clock));
    TestApp {
        app,
        ctrl,
        _updates: rx,
    }
}

fn pool() -> PoolLocation {
    PoolLocation::canonical(
        ChainId::from_int(1),
        EthAddress::parse(&addr(1)).unwrap(),
        EthAddress::parse(&addr(2)).unwrap(),
        420,
    )
    .0
}

fn change(position_type: PositionType, time: i64) -> LiqChange {
    let knockout = position_type == PositionType::Knockout;
    LiqChange {
        id: format!("ethereum-{}", time),
        tx: EthTxHash::new(&format!("0x{:064x}", time)),
        call_index: 0,
        pool: pool(),
        user: EthAddress::parse(&addr(7)).unwrap(),
        block: time / 12,
        time,
        position_type,
        change_type: ChangeType::Mint,
        bid_tick: if knockout { -4 } else { -100 },
        ask_tick: if knockout { 0 } else { 100 },
        is_bid: knockout,
        liq: 0.0,
        base_flow: 20_000.0,
        quote_flow: 20_000.0,
        pivot_time: None,
    }
}

async fn request(app: axum::Router, uri: &str) -> (StatusCode, serde_json::Value) {
    let req = axum::http::Request::builder()
        .method("GET")
        .uri(uri)
        .body(axum::body::Body::empty())
        .unwrap();

    let resp = app.oneshot(req).await.unwrap();
    let status = resp.status();
    let body = axum::body::to_bytes(resp.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, serde_json::from_slice(&body).unwrap())
}

#[tokio::test]
async fn test_health() {
    let test_app = setup_test_app();
    let (status, body) = request(test_app.app, "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn test_user_positions_response_fields() {
    let test_app = setup_test_app();
    test_app
        .ctrl
        .ingest_liq_change(&change(PositionType::Concentrated, NOW - 86_400))
        .await;

    let (status, body) = request(
        test_app.app,
        &format!("/v1/user_positions?chainId=0x1&user={}", addr(7)),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let positions = body.as_array().unwrap();
    assert_eq!(positions.len(), 1);
    let pos = &positions[0];
    assert_eq!(pos["chainId"], "0x1");
    assert_eq!(pos["poolIdx"], 420);
    assert_eq!(pos["bidTick"], -100);
    assert_eq!(pos["askTick"], 100);
    assert_eq!(pos["user"], addr(7));
    assert_eq!(pos["timeFirstMint"], NOW - 86_400);
    assert_eq!(pos["refreshTime"], 0);
    assert!(pos.get("aprEst").is_some());
}

#[tokio::test]
async fn test_bad_parameters_are_rejected() {
    let test_app = setup_test_app();

    let (status, body) = request(
        test_app.app.clone(),
        &format!("/v1/user_positions?chainId=0x89&user={}", addr(7)),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("chainId"));

    let (status, _) = request(
        test_app.app.clone(),
        "/v1/user_txs?chainId=0x1&user=0x1234",
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = request(
        test_app.app,
        &format!(
            "/v1/pool_candles?chainId=0x1&base={}&quote={}&poolIdx=420&period=0&n=10",
            addr(1),
            addr(2)
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_pool_endpoints_accept_either_token_order() {
    let test_app = setup_test_app();
    test_app
        .ctrl
        .ingest_liq_change(&change(PositionType::Concentrated, NOW - 600))
        .await;
    test_app
        .ctrl
        .ingest_liq_change(&change(PositionType::Ambient, NOW - 300))
        .await;

    let (status, body) = request(
        test_app.app.clone(),
        &format!(
            "/v1/pool_txs?chainId=0x1&base={}&quote={}&poolIdx=420&n=1",
            addr(2),
            addr(1)
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let txs = body.as_array().unwrap();
    assert_eq!(txs.len(), 1);
    assert_eq!(txs[0]["txTime"], NOW - 300);

    let (status, body) = request(
        test_app.app,
        &format!(
            "/v1/pool_liq_curve?chainId=0x1&base={}&quote={}&poolIdx=420",
            addr(1),
            addr(2)
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["liquidityBumps"].as_array().unwrap().len(), 2);
    assert!(body["ambientLiq"].as_f64().unwrap() > 0.0);
}

#[tokio::test]
async fn test_unknown_pool_curve_is_not_found() {
    let test_app = setup_test_app();
    let (status, _) = request(
        test_app.app,
        &format!(
            "/v1/pool_liq_curve?chainId=0x1&base={}&quote={}&poolIdx=36000",
            addr(1),
            addr(2)
        ),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_limit_orders_and_balance_tokens() {
    let test_app = setup_test_app();
    test_app
        .ctrl
        .ingest_liq_change(&change(PositionType::Knockout, NOW - 900))
        .await;
    for (i, token) in [3u8, 4, 3].iter().enumerate() {
        test_app.ctrl.ingest_balance(&Balance {
            id: format!("bal-{}", i),
            tx: EthTxHash::new(&format!("0x{:064x}", i)),
            block: i as i64,
            time: NOW,
            user: EthAddress::parse(&addr(7)).unwrap(),
            token: EthAddress::parse(&addr(*token)).unwrap(),
        });
    }

    let (status, body) = request(
        test_app.app.clone(),
        &format!("/v1/user_limit_orders?chainId=0x1&user={}", addr(7)),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let orders = body.as_array().unwrap();
    assert_eq!(orders.len(), 1);
    assert_eq!(orders[0]["isBid"], true);
    assert_eq!(orders[0]["timeFirstMint"], NOW - 900);
    assert!(orders[0]["liq"]["active"]["concLiq"].as_u64().unwrap() > 0);

    let (status, body) = request(
        test_app.app,
        &format!("/v1/user_balance_tokens?chainId=0x1&user={}", addr(7)),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["tokens"], serde_json::json!([addr(3), addr(4)]));
}
