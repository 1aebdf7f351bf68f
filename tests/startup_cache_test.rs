use graphcache::cache::MemoryCache;
use graphcache::config::{ChainConfig, NetworkConfig};
use graphcache::datasource::{MockSubgraphSource, SubgraphSource};
use graphcache::domain::{ChainId, EthAddress, NetworkName, PoolLocation};
use graphcache::orchestration::Controller;
use graphcache::refresh::RefreshMsg;
use graphcache::sync::{load_startup_cache, CombinedSyncer, StartupCacheProvider};
use serde_json::{json, Value};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

fn clock() -> i64 {
    1_700_000_000
}

fn addr(n: u8) -> String {
    format!("0x{:040x}", n)
}

fn syncer(source: MockSubgraphSource) -> (CombinedSyncer, mpsc::Receiver<RefreshMsg>) {
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
    let (tx, rx) = mpsc::channel(10_000);
    let ctrl = Controller::with_updates(Arc::new(cfg), Arc::new(MemoryCache::new()), tx, clock)
        .on_network(&NetworkName::new("ethereum"))
        .unwrap();
    let source: Arc<dyn SubgraphSource> = Arc::new(source);
    let syncer = CombinedSyncer::new(ctrl, source, Duration::from_millis(10))
        .with_retry_wait(Duration::from_millis(1));
    (syncer, rx)
}

fn mint(id: &str, block: i64, user: u8) -> Value {
    json!({
        "id": id,
        "transactionHash": format!("0x{:064x}", block),
        "user": addr(user),
        "pool": { "base": addr(1), "quote": addr(2), "poolIdx": "420" },
        "block": block.to_string(),
        "time": (block * 12).to_string(),
        "positionType": "concentrated",
        "changeType": "mint",
        "bidTick": -100,
        "askTick": 100,
        "baseFlow": "20000",
        "quoteFlow": "20000",
    })
}

fn balance(id: &str, block: i64, token: u8) -> Value {
    json!({
        "id": id,
        "transactionHash": format!("0x{:064x}", block),
        "block": block.to_string(),
        "time": (block * 12).to_string(),
        "user": addr(7),
        "token": addr(token),
    })
}

fn write_chunk(root: &Path, table: &str, first: i64, last: i64, rows: Value) {
    let dir = root.join("0x1").join(table);
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(
        dir.join(format!("{}_{}-{}.json", table, first, last)),
        serde_json::to_vec(&rows).unwrap(),
    )
    .unwrap();
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

/// Derived state that must match however the rows arrived.
fn snapshot(syncer: &CombinedSyncer) -> (Vec<(String, i64, i64)>, Vec<EthAddress>, usize) {
    let cache = syncer.controller().cache();
    let mut positions: Vec<_> = cache
        .retrieve_all_positions()
        .into_iter()
        .map(|(loc, pos)| {
            let pos = pos.read();
            (loc.user.to_string(), pos.time_first_mint, pos.latest_update_time)
        })
        .collect();
    positions.sort();
    let mut balances =
        cache.retrieve_user_balances(&ChainId::from_int(1), &EthAddress::parse(&addr(7)).unwrap());
    balances.sort();
    (positions, balances, cache.retrieve_pool_txs(&pool(), 1000).len())
}

#[tokio::test]
async fn test_replay_then_poll_matches_polling_from_genesis() {
    let dir = tempfile::tempdir().unwrap();
    write_chunk(
        dir.path(),
        "liquidityChanges",
        0,
        199,
        json!([mint("m1", 150, 7), mint("m2", 160, 8)]),
    );
    write_chunk(
        dir.path(),
        "liquidityChanges",
        200,
        229,
        json!([mint("m3", 210, 9)]),
    );
    write_chunk(dir.path(), "userBalances", 0, 199, json!([balance("a", 120, 3)]));

    let live = MockSubgraphSource::new().with_response(json!({
        "_meta": { "block": { "number": 300 } },
        "liquidityChanges": [mint("m3", 210, 9), mint("m4", 250, 10)],
        "userBalances": [balance("b", 260, 4)],
    }));
    let (mut cached, _rx_a) = syncer(live);
    let provider =
        StartupCacheProvider::new(dir.path().to_str().unwrap(), ChainId::from_int(1)).unwrap();
    let cursors = load_startup_cache(&provider, &mut cached).await;
    assert_eq!(cursors.liq, 210);
    assert_eq!(cursors.bal, 120);
    assert_eq!(cached.cursors(), cursors);
    cached.sync_startup().await;

    let genesis = MockSubgraphSource::new().with_response(json!({
        "_meta": { "block": { "number": 300 } },
        "liquidityChanges": [
            mint("m1", 150, 7), mint("m2", 160, 8), mint("m3", 210, 9), mint("m4", 250, 10)
        ],
        "userBalances": [balance("a", 120, 3), balance("b", 260, 4)],
    }));
    let (mut fresh, _rx_b) = syncer(genesis);
    fresh.sync_startup().await;

    assert_eq!(snapshot(&cached), snapshot(&fresh));
    assert_eq!(cached.cursors(), fresh.cursors());
    assert_eq!(snapshot(&cached).0.len(), 4);
}

#[tokio::test]
async fn test_bad_chunk_stops_replay_at_reached_cursors() {
    let dir = tempfile::tempdir().unwrap();
    write_chunk(
        dir.path(),
        "liquidityChanges",
        0,
        99,
        json!([mint("m1", 50, 7)]),
    );
    let mut broken = mint("m2", 150, 8);
    broken["changeType"] = json!("teleport");
    write_chunk(dir.path(), "liquidityChanges", 100, 199, json!([broken]));
    write_chunk(dir.path(), "userBalances", 200, 299, json!([balance("a", 220, 3)]));

    let (mut syncer, _rx) = syncer(MockSubgraphSource::new());
    let provider =
        StartupCacheProvider::new(dir.path().to_str().unwrap(), ChainId::from_int(1)).unwrap();
    let cursors = load_startup_cache(&provider, &mut syncer).await;

    assert_eq!(cursors.liq, 50);
    assert_eq!(cursors.bal, 0);
    assert_eq!(syncer.cursors(), cursors);
    assert_eq!(syncer.controller().cache().retrieve_all_positions().len(), 1);
}

#[tokio::test]
async fn test_empty_cache_dir_leaves_cursors_at_zero() {
    let dir = tempfile::tempdir().unwrap();
    let (mut syncer, _rx) = syncer(MockSubgraphSource::new());
    let provider =
        StartupCacheProvider::new(dir.path().to_str().unwrap(), ChainId::from_int(1)).unwrap();

    let cursors = load_startup_cache(&provider, &mut syncer).await;
    assert_eq!(cursors, Default::default());
}
