use graphcache::cache::MemoryCache;
use graphcache::config::{ChainConfig, NetworkConfig};
use graphcache::domain::{ChainId, EthAddress, EthTxHash, NetworkName, PoolLocation};
use graphcache::orchestration::{Controller, ControllerOverNetwork};
use graphcache::refresh::RefreshMsg;
use graphcache::tables::{ChangeType, LiqChange, PositionType};
use std::sync::Arc;
use tokio::sync::mpsc;

fn addr(n: u8) -> EthAddress {
    EthAddress::parse(&format!("0x{:040x}", n)).unwrap()
}

fn clock() -> i64 {
    1_700_000_000
}

fn controller() -> (ControllerOverNetwork, mpsc::Receiver<RefreshMsg>) {
    let mut cfg = NetworkConfig::default();
    cfg.insert(
        NetworkName::new("ethereum"),
        ChainConfig {
            chain_id: 1,
            subgraph: String::new(),
            query_contract: String::new(),
            knockout_tick_width: 750,
            rpc: String::new(),
        },
    );
    let (tx, rx) = mpsc::channel(10_000);
    let ctrl = Controller::with_updates(Arc::new(cfg), Arc::new(MemoryCache::new()), tx, clock)
        .on_network(&NetworkName::new("ethereum"))
        .unwrap();
    (ctrl, rx)
}

fn pool() -> PoolLocation {
    PoolLocation::canonical(ChainId::from_int(1), addr(1), addr(2), 420).0
}

fn change(
    id: &str,
    time: i64,
    position_type: PositionType,
    change_type: ChangeType,
    flows: f64,
    is_bid: bool,
) -> LiqChange {
    LiqChange {
        id: format!("ethereum{}", id),
        tx: EthTxHash::new(&format!("0x{:064x}", time)),
        call_index: 0,
        pool: pool(),
        user: addr(9),
        block: time,
        time,
        position_type,
        change_type,
        bid_tick: -250,
        ask_tick: 500,
        is_bid,
        liq: 0.0,
        base_flow: flows,
        quote_flow: flows,
        pivot_time: None,
    }
}

fn close(a: f64, b: f64) -> bool {
    (a - b).abs() <= 1e-6 * a.abs().max(b.abs()).max(1.0)
}

#[tokio::test]
async fn test_ambient_mint_only_moves_ambient_liq() {
    let (ctrl, _rx) = controller();
    ctrl.ingest_liq_change(&change(
        "a",
        100,
        PositionType::Ambient,
        ChangeType::Mint,
        30_000.0,
        false,
    ))
    .await;

    let curve = ctrl.cache().retrieve_pool_liq_curve(&pool()).unwrap();
    let curve = curve.read();
    assert!(curve.bumps.is_empty());
    assert!(close(curve.ambient_liq, 30_000.0));
}

#[tokio::test]
async fn test_range_mint_bumps_are_symmetric() {
    let (ctrl, _rx) = controller();
    ctrl.ingest_liq_change(&change(
        "r",
        100,
        PositionType::Concentrated,
        ChangeType::Mint,
        30_000.0,
        false,
    ))
    .await;

    let curve = ctrl.cache().retrieve_pool_liq_curve(&pool()).unwrap();
    let curve = curve.read();
    let lower = curve.bumps[&-250].liquidity_delta;
    let upper = curve.bumps[&500].liquidity_delta;
    assert!(lower > 0.0);
    assert!(upper < 0.0);
    assert_eq!(lower + upper, 0.0);
    assert_eq!(curve.total_bump_delta(), 0.0);
}

#[tokio::test]
async fn test_knockout_bid_cross_removes_knockout_contribution() {
    let (ctrl, _rx) = controller();
    ctrl.ingest_liq_change(&change(
        "r",
        100,
        PositionType::Concentrated,
        ChangeType::Mint,
        30_000.0,
        false,
    ))
    .await;
    let (lower_before, upper_before) = {
        let curve = ctrl.cache().retrieve_pool_liq_curve(&pool()).unwrap();
        let curve = curve.read();
        (
            curve.bumps[&-250].liquidity_delta,
            curve.bumps[&500].liquidity_delta,
        )
    };

    ctrl.ingest_liq_change(&change(
        "k",
        200,
        PositionType::Knockout,
        ChangeType::Mint,
        250_000.0,
        true,
    ))
    .await;
    {
        let curve = ctrl.cache().retrieve_pool_liq_curve(&pool()).unwrap();
        let curve = curve.read();
        assert!(curve.bumps[&-250].knockout_bid_liq > 0.0);
        assert_eq!(curve.bumps[&-250].knockout_bid_width, 750);
    }

    let mut cross = change(
        "x",
        300,
        PositionType::Knockout,
        ChangeType::Cross,
        0.0,
        true,
    );
    cross.ask_tick = -250;
    ctrl.ingest_liq_change(&cross).await;

    let curve = ctrl.cache().retrieve_pool_liq_curve(&pool()).unwrap();
    let curve = curve.read();
    let lower = &curve.bumps[&-250];
    assert!(close(lower.liquidity_delta, lower_before));
    assert_eq!(lower.knockout_bid_liq, 0.0);
    assert_eq!(lower.knockout_bid_width, 0);
    assert!(close(curve.bumps[&500].liquidity_delta, upper_before));
}

#[tokio::test]
async fn test_mints_and_burns_netting_to_zero_sum_to_zero() {
    let (ctrl, _rx) = controller();
    let mut time = 100;
    for (ticks, flows) in [((-250, 500), 30_000.0), ((-100, 100), 5_000.0), ((0, 700), 90_000.0)] {
        for change_type in [ChangeType::Mint, ChangeType::Burn] {
            let mut row = change(
                &time.to_string(),
                time,
                PositionType::Concentrated,
                change_type,
                flows,
                false,
            );
            row.bid_tick = ticks.0;
            row.ask_tick = ticks.1;
            ctrl.ingest_liq_change(&row).await;
            time += 10;
        }
    }

    let curve = ctrl.cache().retrieve_pool_liq_curve(&pool()).unwrap();
    let curve = curve.read();
    assert!(curve.total_bump_delta().abs() < 1e-6);
    for bump in curve.bumps.values() {
        assert!(bump.liquidity_delta.abs() < 1e-6, "tick {}", bump.tick);
    }
}
