//! Turns typed source rows into model updates and refresh requests.

use crate::cache::MemoryCache;
use crate::config::NetworkConfig;
use crate::domain::{BookLocation, ChainId, NetworkName, PoolLocation, PositionLocation};
use crate::engine::liquidity_math::determine_liquidity_magn;
use crate::engine::{PoolTxEvent, SharedPosition};
use crate::refresh::{is_recent_event, Clock, LiquidityRefresher, RefreshMsg, RefreshRouter};
use crate::tables::{
    AggEvent, Balance, ChangeType, FeeChange, KnockoutCross, LiqChange, PositionType, Swap,
};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Most recently updated positions refreshed when a live swap moves a pool.
pub const N_POSITIONS_REFRESH_ON_SWAP: usize = 50;

#[derive(Debug, Error)]
pub enum ControllerError {
    #[error("No chain config for network {0}")]
    UnknownNetwork(NetworkName),
}

/// Process-wide ingestion entry point.
#[derive(Debug, Clone)]
pub struct Controller {
    net_cfg: Arc<NetworkConfig>,
    cache: Arc<MemoryCache>,
    updates: mpsc::Sender<RefreshMsg>,
    clock: Clock,
}

impl Controller {
    /// Build a controller whose refresh messages go through a new router
    /// feeding `refresher`. Also returns the router task.
    pub fn new(
        net_cfg: Arc<NetworkConfig>,
        cache: Arc<MemoryCache>,
        refresher: Arc<LiquidityRefresher>,
    ) -> (Self, JoinHandle<()>) {
        let clock = refresher.clock();
        let (updates, router) = RefreshRouter::spawn(refresher);
        (Self::with_updates(net_cfg, cache, updates, clock), router)
    }

    /// Build a controller sending refresh messages to `updates` directly.
    pub fn with_updates(
        net_cfg: Arc<NetworkConfig>,
        cache: Arc<MemoryCache>,
        updates: mpsc::Sender<RefreshMsg>,
        clock: Clock,
    ) -> Self {
        Self {
            net_cfg,
            cache,
            updates,
            clock,
        }
    }

    pub fn cache(&self) -> &Arc<MemoryCache> {
        &self.cache
    }

    pub fn network_config(&self) -> &NetworkConfig {
        &self.net_cfg
    }

    pub fn on_network(&self, network: &NetworkName) -> Result<ControllerOverNetwork, ControllerError> {
        let chain = self
            .net_cfg
            .chain_config(network)
            .ok_or_else(|| ControllerError::UnknownNetwork(network.clone()))?;
        Ok(ControllerOverNetwork {
            network: network.clone(),
            chain_id: chain.chain_id(),
            knockout_tick_width: chain.knockout_tick_width,
            cache: self.cache.clone(),
            updates: self.updates.clone(),
            clock: self.clock,
        })
    }

    /// Queue a poll for every position holding liquidity or never refreshed.
    /// Returns the number of polls queued.
    pub async fn resync_full_cycle(&self) -> usize {
        let targets: Vec<_> = self
            .cache
            .retrieve_all_positions()
            .into_iter()
            .filter(|(_, pos)| {
                let pos = pos.read();
                !pos.is_empty() || pos.refresh_time == 0
            })
            .collect();

        let count = targets.len();
        for (loc, pos) in targets {
            send_update(&self.updates, RefreshMsg::PosPoll { loc, pos }).await;
        }
        count
    }

    pub fn spawn_periodic_refresh(&self, interval: Duration) -> JoinHandle<()> {
        let ctrl = self.clone();
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(interval).await;
                info!(time = (ctrl.clock)(), "Running full position refresh");
                let queued = ctrl.resync_full_cycle().await;
                debug!(queued, "Full position refresh queued");
            }
        })
    }
}

async fn send_update(updates: &mpsc::Sender<RefreshMsg>, msg: RefreshMsg) {
    if updates.send(msg).await.is_err() {
        warn!("Refresh router closed, dropping refresh message");
    }
}

/// A row handler for one source table.
#[async_trait]
pub trait Ingest<R: Send + 'static>: Send + Sync {
    async fn ingest(&self, row: R);
}

/// Row handlers for one chain.
#[derive(Debug, Clone)]
pub struct ControllerOverNetwork {
    network: NetworkName,
    chain_id: ChainId,
    knockout_tick_width: i32,
    cache: Arc<MemoryCache>,
    updates: mpsc::Sender<RefreshMsg>,
    clock: Clock,
}

impl ControllerOverNetwork {
    pub fn network(&self) -> &NetworkName {
        &self.network
    }

    pub fn chain_id(&self) -> &ChainId {
        &self.chain_id
    }

    pub fn cache(&self) -> &Arc<MemoryCache> {
        &self.cache
    }

    pub fn ingest_balance(&self, bal: &Balance) {
        self.cache
            .add_user_balance(self.chain_id.clone(), bal.user.clone(), bal.token.clone());
    }

    pub async fn ingest_liq_change(&self, change: &LiqChange) {
        let msgs = if change.change_type == ChangeType::Cross {
            let book = self.cross_book(&change.pool, change);
            self.cache.reset_knockout_pivot(&book);
            Vec::new()
        } else if change.position_type == PositionType::Knockout {
            self.apply_to_knockout(change)
        } else {
            self.apply_to_passive_liq(change)
        };

        self.cache
            .materialize_pool_liq_curve(&change.pool)
            .write()
            .update_liq_change(change);
        self.cache
            .add_pool_event(PoolTxEvent::from_liq_change(change));

        for msg in msgs {
            send_update(&self.updates, msg).await;
        }
    }

    fn apply_to_passive_liq(&self, change: &LiqChange) -> Vec<RefreshMsg> {
        let loc = change.position_location();
        let pos = self.cache.materialize_position(&loc);
        if matches!(
            change.change_type,
            ChangeType::Mint | ChangeType::Burn | ChangeType::Harvest
        ) {
            pos.write().update_position(change);
        }
        vec![RefreshMsg::PosUpdate {
            loc,
            pos,
            event_time: change.time,
        }]
    }

    fn apply_to_knockout(&self, change: &LiqChange) -> Vec<RefreshMsg> {
        let loc = change.position_location();
        let book = loc.to_book_loc();
        let pivot = match change.change_type {
            ChangeType::Mint => self.cache.open_knockout_pivot(&book, change.time),
            _ => self.cache.knockout_pivot(&book),
        };

        let sub = self.cache.materialize_knockout_pos(&loc);
        let cands = {
            let mut sub = sub.write();
            if matches!(
                change.change_type,
                ChangeType::Mint | ChangeType::Burn | ChangeType::Harvest
            ) {
                sub.tracker.update_position(change);
            }
            if sub.liq.active.refresh_time == 0 {
                sub.liq
                    .apply_flow_estimate(change, determine_liquidity_magn(change));
            }
            sub.update_liq_change(change, pivot)
        };

        let mut msgs = Vec::with_capacity(cands.len() + 1);
        msgs.push(RefreshMsg::KoPosUpdate {
            loc: loc.clone(),
            sub: sub.clone(),
            event_time: change.time,
        });
        for cand in cands {
            msgs.push(RefreshMsg::KoClaimUpdate {
                loc: loc.to_claim_loc(cand.pivot_time),
                sub: sub.clone(),
                event_time: change.time,
            });
        }
        msgs
    }

    /// The book a cross at the change's knockout tick clears.
    fn cross_book(&self, pool: &PoolLocation, change: &LiqChange) -> BookLocation {
        let tick = if change.is_bid {
            change.bid_tick
        } else {
            change.ask_tick
        };
        BookLocation::from_cross(pool.clone(), tick, change.is_bid, self.knockout_tick_width)
    }

    pub async fn ingest_swap(&self, swap: &Swap) {
        self.cache.add_pool_event(PoolTxEvent::from_swap(swap));

        if !is_recent_event(swap.time, (self.clock)()) {
            return;
        }
        for (loc, pos) in self.recent_pool_positions(&swap.pool) {
            send_update(
                &self.updates,
                RefreshMsg::PosImpact {
                    loc,
                    pos,
                    event_time: swap.time,
                },
            )
            .await;
        }
    }

    /// Non-empty positions updated no earlier than the pool's
    /// `N_POSITIONS_REFRESH_ON_SWAP`th most recent update.
    fn recent_pool_positions(&self, pool: &PoolLocation) -> Vec<(PositionLocation, SharedPosition)> {
        let Some(positions) = self.cache.borrow_pool_positions(pool) else {
            return Vec::new();
        };

        let mut times: Vec<i64> = positions
            .values()
            .filter_map(|pos| {
                let pos = pos.read();
                (!pos.is_empty()).then_some(pos.latest_update_time)
            })
            .collect();
        if times.is_empty() {
            return Vec::new();
        }
        times.sort_unstable_by(|a, b| b.cmp(a));
        let cutoff = times[times.len().min(N_POSITIONS_REFRESH_ON_SWAP) - 1];

        positions
            .iter()
            .filter(|(_, pos)| {
                let pos = pos.read();
                !pos.is_empty() && pos.latest_update_time >= cutoff
            })
            .map(|(loc, pos)| (loc.clone(), pos.clone()))
            .collect()
    }

    pub fn ingest_agg_event(&self, event: &AggEvent) {
        self.cache
            .materialize_pool_trading_hist(&event.pool)
            .write()
            .next_event(event);
    }

    pub fn ingest_fee_change(&self, change: &FeeChange) {
        self.cache
            .materialize_pool_trading_hist(&change.pool)
            .write()
            .next_fee_change(change);
    }

    pub async fn ingest_knockout_cross(&self, cross: &KnockoutCross) {
        let book = BookLocation::from_cross(
            cross.pool.clone(),
            cross.tick,
            cross.is_bid,
            self.knockout_tick_width,
        );
        let saga = self.cache.materialize_knockout_book(&book);
        let cands = saga.update_cross(cross);
        self.cache.reset_knockout_pivot(&book);

        let mut msgs = Vec::with_capacity(cands.len());
        for cand in cands {
            let (sub, _) = saga.for_user(&cand.user);
            sub.write()
                .liq
                .update_ko_cross_liq(cand.pivot_time, cross.time);
            msgs.push(RefreshMsg::KoClaimUpdate {
                loc: book.to_position_loc(cand.user).to_claim_loc(cand.pivot_time),
                sub,
                event_time: cross.time,
            });
        }
        for msg in msgs {
            send_update(&self.updates, msg).await;
        }
    }
}

#[async_trait]
impl Ingest<Balance> for ControllerOverNetwork {
    async fn ingest(&self, row: Balance) {
        self.ingest_balance(&row);
    }
}

#[async_trait]
impl Ingest<LiqChange> for ControllerOverNetwork {
    async fn ingest(&self, row: LiqChange) {
        self.ingest_liq_change(&row).await;
    }
}

#[async_trait]
impl Ingest<Swap> for ControllerOverNetwork {
    async fn ingest(&self, row: Swap) {
        self.ingest_swap(&row).await;
    }
}

#[async_trait]
impl Ingest<AggEvent> for ControllerOverNetwork {
    async fn ingest(&self, row: AggEvent) {
        self.ingest_agg_event(&row);
    }
}

#[async_trait]
impl Ingest<FeeChange> for ControllerOverNetwork {
    async fn ingest(&self, row: FeeChange) {
        self.ingest_fee_change(&row);
    }
}

#[async_trait]
impl Ingest<KnockoutCross> for ControllerOverNetwork {
    async fn ingest(&self, row: KnockoutCross) {
        self.ingest_knockout_cross(&row).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ChainConfig;
    use crate::domain::{EthAddress, EthTxHash, LiquidityLocation};

    fn addr(n: u8) -> EthAddress {
        EthAddress::parse(&format!("0x{:040x}", n)).unwrap()
    }

    fn fixed_clock() -> i64 {
        10_000
    }

    fn setup() -> (ControllerOverNetwork, mpsc::Receiver<RefreshMsg>) {
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
        let (tx, rx) = mpsc::channel(1000);
        let ctrl = Controller::with_updates(
            Arc::new(cfg),
            Arc::new(MemoryCache::new()),
            tx,
            fixed_clock,
        );
        (ctrl.on_network(&NetworkName::new("ethereum")).unwrap(), rx)
    }

    fn pool() -> PoolLocation {
        PoolLocation::canonical(ChainId::from_int(1), addr(1), addr(2), 420).0
    }

    fn liq_change(
        position_type: PositionType,
        change_type: ChangeType,
        bid_tick: i32,
        ask_tick: i32,
        time: i64,
    ) -> LiqChange {
        LiqChange {
            id: format!("ethereum{}", time),
            tx: EthTxHash::new(&format!("0x{:064x}", time)),
            call_index: 0,
            pool: pool(),
            user: addr(7),
            block: time,
            time,
            position_type,
            change_type,
            bid_tick,
            ask_tick,
            is_bid: true,
            liq: 0.0,
            base_flow: 30_000.0,
            quote_flow: 30_000.0,
            pivot_time: None,
        }
    }

    fn drain(rx: &mut mpsc::Receiver<RefreshMsg>) -> Vec<RefreshMsg> {
        let mut msgs = Vec::new();
        while let Ok(msg) = rx.try_recv() {
            msgs.push(msg);
        }
        msgs
    }

    #[test]
    fn test_unknown_network_is_error() {
        let ctrl = Controller::with_updates(
            Arc::new(NetworkConfig::default()),
            Arc::new(MemoryCache::new()),
            mpsc::channel(1).0,
            fixed_clock,
        );
        assert!(matches!(
            ctrl.on_network(&NetworkName::new("nowhere")),
            Err(ControllerError::UnknownNetwork(_))
        ));
    }

    #[tokio::test]
    async fn test_range_mint_updates_position_curve_and_history() {
        let (net, mut rx) = setup();
        let change = liq_change(PositionType::Concentrated, ChangeType::Mint, -250, 500, 100);
        net.ingest_liq_change(&change).await;

        let loc = PositionLocation::new(pool(), LiquidityLocation::range(-250, 500), addr(7));
        let pos = net.cache().materialize_position(&loc);
        assert_eq!(pos.read().time_first_mint, 100);
        assert_eq!(net.cache().retrieve_pool_txs(&pool(), 10).len(), 1);
        let curve = net.cache().retrieve_pool_liq_curve(&pool()).unwrap();
        assert_eq!(curve.read().bumps.len(), 2);

        let msgs = drain(&mut rx);
        assert_eq!(msgs.len(), 1);
        assert!(matches!(&msgs[0], RefreshMsg::PosUpdate { event_time: 100, .. }));
    }

    #[tokio::test]
    async fn test_knockout_mint_opens_pivot_and_queues_alive_refresh() {
        let (net, mut rx) = setup();
        let change = liq_change(PositionType::Knockout, ChangeType::Mint, -4, 0, 200);
        net.ingest_liq_change(&change).await;

        let loc = change.position_location();
        assert_eq!(net.cache().knockout_pivot(&loc.to_book_loc()), 200);
        let sub = net.cache().materialize_knockout_pos(&loc);
        assert_eq!(sub.read().mints.len(), 1);
        assert!(sub.read().liq.active.conc_liq > 0);
        assert!(net.cache().retrieve_all_positions().is_empty());

        let msgs = drain(&mut rx);
        assert!(matches!(msgs.as_slice(), [RefreshMsg::KoPosUpdate { .. }]));
    }

    #[tokio::test]
    async fn test_knockout_cross_emits_claim_candidates() {
        let (net, mut rx) = setup();
        let mint = liq_change(PositionType::Knockout, ChangeType::Mint, -4, 0, 200);
        net.ingest_liq_change(&mint).await;
        drain(&mut rx);

        let cross = KnockoutCross {
            id: "ethereumko1".to_string(),
            tx: EthTxHash::new(&format!("0x{:064x}", 1)),
            pool: pool(),
            block: 300,
            time: 300,
            tick: -4,
            is_bid: true,
            pivot_time: 200,
            fee_mileage: 0.0,
        };
        net.ingest_knockout_cross(&cross).await;

        let book = mint.position_location().to_book_loc();
        assert_eq!(net.cache().knockout_pivot(&book), 0);
        let sub = net.cache().materialize_knockout_pos(&mint.position_location());
        assert_eq!(sub.read().liq.knocked_out[&200].cross_time, 300);

        let msgs = drain(&mut rx);
        assert_eq!(msgs.len(), 1);
        match &msgs[0] {
            RefreshMsg::KoClaimUpdate { loc, .. } => {
                assert_eq!(loc.pivot_time, 200);
                assert_eq!(loc.pos, mint.position_location());
            }
            other => panic!("unexpected message {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_old_swap_records_event_without_refresh() {
        let (net, mut rx) = setup();
        let mint = liq_change(PositionType::Concentrated, ChangeType::Mint, -10, 10, 100);
        net.ingest_liq_change(&mint).await;
        let pos = net.cache().materialize_position(&mint.position_location());
        pos.write().update_range(10, 0, 100);
        drain(&mut rx);

        let swap = Swap {
            id: "ethereumswap".to_string(),
            tx: EthTxHash::new(&format!("0x{:064x}", 2)),
            call_index: 0,
            user: addr(8),
            pool: pool(),
            block: 101,
            time: 101,
            is_buy: true,
            in_base_qty: true,
            qty: 5.0,
            limit_price: 0.0,
            min_out: 0.0,
            base_flow: 5.0,
            quote_flow: -5.0,
        };
        net.ingest_swap(&swap).await;
        assert_eq!(net.cache().retrieve_pool_txs(&pool(), 10).len(), 2);
        assert!(drain(&mut rx).is_empty());

        let live = Swap {
            time: fixed_clock() - 5,
            ..swap
        };
        net.ingest_swap(&live).await;
        let msgs = drain(&mut rx);
        assert!(matches!(msgs.as_slice(), [RefreshMsg::PosImpact { .. }]));
    }

    #[tokio::test]
    async fn test_full_cycle_polls_unrefreshed_and_live_positions() {
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
        let (tx, mut rx) = mpsc::channel(100);
        let ctrl = Controller::with_updates(Arc::new(cfg), Arc::new(MemoryCache::new()), tx, fixed_clock);

        let fresh = PositionLocation::new(pool(), LiquidityLocation::ambient(), addr(1));
        let drained = PositionLocation::new(pool(), LiquidityLocation::ambient(), addr(2));
        ctrl.cache().materialize_position(&fresh);
        ctrl.cache()
            .materialize_position(&drained)
            .write()
            .update_ambient(0, 50);

        assert_eq!(ctrl.resync_full_cycle().await, 1);
        assert!(matches!(drain(&mut rx).as_slice(), [RefreshMsg::PosPoll { loc, .. }] if *loc == fresh));
    }
}
