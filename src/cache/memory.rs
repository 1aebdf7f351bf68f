//! Process-wide in-memory index of every derived entity.
//!
//! Each canonical object (position, knockout subplot, curve, trading history)
//! is created exactly once by its `materialize_*` constructor and shared by
//! `Arc` across every index that references it. Cross-indexes are only ever
//! written by the constructor that created the canonical instance.

use super::keyed::{RwLockMap, RwLockMapArray, RwLockMapMap};
use crate::domain::{
    BookLocation, ChainAndAddr, ChainId, EthAddress, PoolLocation, PositionLocation, UserAndPool,
};
use crate::engine::{
    KnockoutSaga, LiquidityCurve, PoolTradingHistory, PoolTxEvent, PositionTracker, SharedPosition,
    SharedSubplot,
};
use parking_lot::{MappedRwLockReadGuard, RwLock};
use std::collections::HashMap;
use std::sync::Arc;

pub type SharedCurve = Arc<RwLock<LiquidityCurve>>;
pub type SharedHistory = Arc<RwLock<PoolTradingHistory>>;

pub type PositionSet = HashMap<PositionLocation, SharedPosition>;
pub type KnockoutSet = HashMap<PositionLocation, SharedSubplot>;

#[derive(Debug, Default)]
pub struct MemoryCache {
    latest_blocks: RwLockMap<ChainId, i64>,

    user_bal_tokens: RwLockMapArray<ChainAndAddr, EthAddress>,

    liq_position: RwLockMap<PositionLocation, SharedPosition>,
    user_positions: RwLockMapMap<ChainAndAddr, PositionLocation, SharedPosition>,
    pool_positions: RwLockMapMap<PoolLocation, PositionLocation, SharedPosition>,
    user_and_pool_positions: RwLockMapMap<UserAndPool, PositionLocation, SharedPosition>,

    liq_knockouts: RwLockMap<PositionLocation, SharedSubplot>,
    user_knockouts: RwLockMapMap<ChainAndAddr, PositionLocation, SharedSubplot>,
    pool_knockouts: RwLockMapMap<PoolLocation, PositionLocation, SharedSubplot>,
    user_and_pool_knockouts: RwLockMapMap<UserAndPool, PositionLocation, SharedSubplot>,

    knockout_sagas: RwLockMap<BookLocation, Arc<KnockoutSaga>>,
    knockout_pivot_times: RwLockMap<BookLocation, i64>,

    user_txs: RwLockMapArray<ChainAndAddr, PoolTxEvent>,
    pool_txs: RwLockMapArray<PoolLocation, PoolTxEvent>,

    pool_liq_curve: RwLockMap<PoolLocation, SharedCurve>,
    pool_trading_history: RwLockMap<PoolLocation, SharedHistory>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Highest block seen on the chain, or -1 before the first sync.
    pub fn latest_block(&self, chain_id: &ChainId) -> i64 {
        self.latest_blocks.lookup(chain_id).unwrap_or(-1)
    }

    pub fn set_latest_block(&self, chain_id: ChainId, block: i64) {
        self.latest_blocks
            .upsert(chain_id, |prev| prev.map_or(block, |prev| (*prev).max(block)));
    }

    pub fn add_user_balance(&self, chain_id: ChainId, user: EthAddress, token: EthAddress) {
        self.user_bal_tokens
            .insert(ChainAndAddr::new(chain_id, user), token);
    }

    pub fn retrieve_user_balances(&self, chain_id: &ChainId, user: &EthAddress) -> Vec<EthAddress> {
        self.user_bal_tokens
            .lookup_copy(&ChainAndAddr::new(chain_id.clone(), user.clone()))
    }

    pub fn materialize_position(&self, loc: &PositionLocation) -> SharedPosition {
        let (pos, created) = self
            .liq_position
            .get_or_insert_with(loc, || Arc::new(RwLock::new(PositionTracker::new())));
        if created {
            self.user_positions.insert(
                ChainAndAddr::new(loc.pool.chain_id.clone(), loc.user.clone()),
                loc.clone(),
                pos.clone(),
            );
            self.pool_positions
                .insert(loc.pool.clone(), loc.clone(), pos.clone());
            self.user_and_pool_positions.insert(
                UserAndPool::new(loc.user.clone(), loc.pool.clone()),
                loc.clone(),
                pos.clone(),
            );
        }
        pos
    }

    pub fn materialize_knockout_book(&self, loc: &BookLocation) -> Arc<KnockoutSaga> {
        self.knockout_sagas
            .get_or_insert_with(loc, KnockoutSaga::new)
            .0
    }

    pub fn materialize_knockout_pos(&self, loc: &PositionLocation) -> SharedSubplot {
        let (subplot, created) = self.liq_knockouts.get_or_insert_with(loc, || {
            let saga = self.materialize_knockout_book(&loc.to_book_loc());
            saga.for_user(&loc.user).0
        });
        if created {
            self.user_knockouts.insert(
                ChainAndAddr::new(loc.pool.chain_id.clone(), loc.user.clone()),
                loc.clone(),
                subplot.clone(),
            );
            self.pool_knockouts
                .insert(loc.pool.clone(), loc.clone(), subplot.clone());
            self.user_and_pool_knockouts.insert(
                UserAndPool::new(loc.user.clone(), loc.pool.clone()),
                loc.clone(),
                subplot.clone(),
            );
        }
        subplot
    }

    pub fn materialize_pool_liq_curve(&self, loc: &PoolLocation) -> SharedCurve {
        self.pool_liq_curve
            .get_or_insert_with(loc, || Arc::new(RwLock::new(LiquidityCurve::new())))
            .0
    }

    pub fn materialize_pool_trading_hist(&self, loc: &PoolLocation) -> SharedHistory {
        self.pool_trading_history
            .get_or_insert_with(loc, || Arc::new(RwLock::new(PoolTradingHistory::new())))
            .0
    }

    /// Current pivot time of a knockout book, zero if no liquidity is resting.
    pub fn knockout_pivot(&self, book: &BookLocation) -> i64 {
        self.knockout_pivot_times.lookup(book).unwrap_or(0)
    }

    /// A mint into an empty book opens a new pivot at the mint time. Returns
    /// the pivot the mint belongs to.
    pub fn open_knockout_pivot(&self, book: &BookLocation, time: i64) -> i64 {
        let mut pivot = time;
        self.knockout_pivot_times.upsert(book.clone(), |prev| {
            if let Some(prev) = prev.filter(|p| **p > 0) {
                pivot = *prev;
            }
            pivot
        });
        pivot
    }

    /// A cross knocks out the book; the next mint starts a new pivot.
    pub fn reset_knockout_pivot(&self, book: &BookLocation) {
        self.knockout_pivot_times.insert(book.clone(), 0);
    }

    pub fn add_pool_event(&self, event: PoolTxEvent) {
        let user_key = ChainAndAddr::new(event.pool.chain_id.clone(), event.user.clone());
        self.user_txs
            .insert_sorted(user_key, event.clone(), PoolTxEvent::comes_before);
        self.pool_txs
            .insert_sorted(event.pool.clone(), event, PoolTxEvent::comes_before);
    }

    pub fn retrieve_user_positions(&self, chain_id: &ChainId, user: &EthAddress) -> PositionSet {
        self.user_positions
            .lookup_set(&ChainAndAddr::new(chain_id.clone(), user.clone()))
    }

    pub fn retrieve_pool_positions(&self, pool: &PoolLocation) -> PositionSet {
        self.pool_positions.lookup_set(pool)
    }

    pub fn retrieve_user_pool_positions(&self, user: &EthAddress, pool: &PoolLocation) -> PositionSet {
        self.user_and_pool_positions
            .lookup_set(&UserAndPool::new(user.clone(), pool.clone()))
    }

    /// Borrow the pool's positions without copying. The pool index stays
    /// read-locked until the guard drops, so keep the borrow short.
    pub fn borrow_pool_positions(
        &self,
        pool: &PoolLocation,
    ) -> Option<MappedRwLockReadGuard<'_, PositionSet>> {
        self.pool_positions.borrow_set(pool)
    }

    pub fn retrieve_all_positions(&self) -> PositionSet {
        self.liq_position.clone_map()
    }

    pub fn retrieve_user_knockouts(&self, chain_id: &ChainId, user: &EthAddress) -> KnockoutSet {
        self.user_knockouts
            .lookup_set(&ChainAndAddr::new(chain_id.clone(), user.clone()))
    }

    pub fn retrieve_pool_knockouts(&self, pool: &PoolLocation) -> KnockoutSet {
        self.pool_knockouts.lookup_set(pool)
    }

    pub fn retrieve_user_pool_knockouts(&self, user: &EthAddress, pool: &PoolLocation) -> KnockoutSet {
        self.user_and_pool_knockouts
            .lookup_set(&UserAndPool::new(user.clone(), pool.clone()))
    }

    pub fn retrieve_all_knockouts(&self) -> KnockoutSet {
        self.liq_knockouts.clone_map()
    }

    /// Newest-first copy of the user's last `n` events.
    pub fn retrieve_user_txs(&self, chain_id: &ChainId, user: &EthAddress, n: usize) -> Vec<PoolTxEvent> {
        self.user_txs
            .lookup_last_n(&ChainAndAddr::new(chain_id.clone(), user.clone()), n)
    }

    pub fn retrieve_pool_txs(&self, pool: &PoolLocation, n: usize) -> Vec<PoolTxEvent> {
        self.pool_txs.lookup_last_n(pool, n)
    }

    pub fn retrieve_pool_liq_curve(&self, pool: &PoolLocation) -> Option<SharedCurve> {
        self.pool_liq_curve.lookup(pool)
    }

    pub fn retrieve_pool_trading_hist(&self, pool: &PoolLocation) -> Option<SharedHistory> {
        self.pool_trading_history.lookup(pool)
    }
}
