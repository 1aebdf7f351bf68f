//! Knockout order lifecycle: per-book sagas, per-user subplots and the
//! liquidity series tracking active and knocked-out quantities.

use super::position_tracker::PositionTracker;
use crate::domain::EthAddress;
use crate::tables::{ChangeType, KnockoutCross, LiqChange};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Weak};
use tracing::warn;

pub type SharedSubplot = Arc<RwLock<KnockoutSubplot>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct KnockoutSagaTx {
    pub tx_time: i64,
    pub pivot_time: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct KnockoutSagaCross {
    pub cross_time: i64,
    pub pivot_time: i64,
}

/// A (pivot, user) pair whose knocked-out liquidity may be claimable.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct KnockoutPivotCand {
    pub pivot_time: i64,
    pub user: EthAddress,
}

/// Minted liquidity may be knocked out by a cross if the mint landed between
/// the pivot and the cross.
fn is_mint_maybe_in_pivot(mint_time: i64, pivot_time: i64, cross_time: i64) -> bool {
    mint_time >= pivot_time && mint_time <= cross_time
}

fn mint_matches_cross(mint: &KnockoutSagaTx, cross: &KnockoutSagaCross) -> bool {
    mint.pivot_time == cross.pivot_time
        || is_mint_maybe_in_pivot(mint.pivot_time, cross.pivot_time, cross.cross_time)
        || is_mint_maybe_in_pivot(mint.tx_time, cross.pivot_time, cross.cross_time)
}

/// All knockout activity at one book, across users.
#[derive(Debug, Default)]
pub struct KnockoutSaga {
    users: Mutex<HashMap<EthAddress, SharedSubplot>>,
    crosses: Mutex<Vec<KnockoutSagaCross>>,
}

impl KnockoutSaga {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// The user's subplot, created on first use. The flag reports creation.
    pub fn for_user(self: &Arc<Self>, user: &EthAddress) -> (SharedSubplot, bool) {
        let mut users = self.users.lock();
        if let Some(subplot) = users.get(user) {
            return (subplot.clone(), false);
        }
        let subplot = Arc::new(RwLock::new(KnockoutSubplot::new(
            user.clone(),
            Arc::downgrade(self),
        )));
        users.insert(user.clone(), subplot.clone());
        (subplot, true)
    }

    /// Record a cross and return every (pivot, user) it may have knocked out.
    pub fn update_cross(&self, cross: &KnockoutCross) -> Vec<KnockoutPivotCand> {
        let event = KnockoutSagaCross {
            cross_time: cross.time,
            pivot_time: cross.pivot_time,
        };
        self.crosses.lock().push(event);

        let users: Vec<(EthAddress, SharedSubplot)> = self
            .users
            .lock()
            .iter()
            .map(|(user, subplot)| (user.clone(), subplot.clone()))
            .collect();

        let mut seen = HashSet::new();
        let mut cands = Vec::new();
        for (user, subplot) in users {
            let hit = subplot
                .read()
                .mints
                .iter()
                .any(|mint| mint_matches_cross(mint, &event));
            let cand = KnockoutPivotCand {
                pivot_time: event.pivot_time,
                user,
            };
            if hit && seen.insert(cand.clone()) {
                cands.push(cand);
            }
        }
        cands
    }

    pub fn crosses(&self) -> Vec<KnockoutSagaCross> {
        self.crosses.lock().clone()
    }

    pub fn cross_for_pivot(&self, pivot_time: i64) -> Option<i64> {
        self.crosses
            .lock()
            .iter()
            .find(|cross| cross.pivot_time == pivot_time)
            .map(|cross| cross.cross_time)
    }
}

/// One user's knockout activity at one book.
#[derive(Debug)]
pub struct KnockoutSubplot {
    pub user: EthAddress,
    pub mints: Vec<KnockoutSagaTx>,
    pub burns: Vec<KnockoutSagaTx>,
    pub liq: KnockoutLiquiditySeries,
    pub tracker: PositionTracker,
    saga: Weak<KnockoutSaga>,
}

impl KnockoutSubplot {
    fn new(user: EthAddress, saga: Weak<KnockoutSaga>) -> Self {
        KnockoutSubplot {
            user,
            mints: Vec::new(),
            burns: Vec::new(),
            liq: KnockoutLiquiditySeries::default(),
            tracker: PositionTracker::new(),
            saga,
        }
    }

    /// Record a mint, burn, recover or claim and return the claim candidates
    /// it implies. `pivot_time` is the book's current pivot for mints and burns.
    pub fn update_liq_change(&mut self, change: &LiqChange, pivot_time: i64) -> Vec<KnockoutPivotCand> {
        let event = KnockoutSagaTx {
            tx_time: change.time,
            pivot_time,
        };

        match change.change_type {
            ChangeType::Mint => {
                self.mints.push(event);
                self.scrape_cands_on_mint(&event)
            }
            ChangeType::Burn => {
                self.burns.push(event);
                Vec::new()
            }
            _ => match change.pivot_time {
                Some(pivot) if pivot > 0 => vec![KnockoutPivotCand {
                    pivot_time: pivot,
                    user: self.user.clone(),
                }],
                _ => {
                    warn!(id = %change.id, "Knockout change without pivot time");
                    Vec::new()
                }
            },
        }
    }

    fn scrape_cands_on_mint(&self, mint: &KnockoutSagaTx) -> Vec<KnockoutPivotCand> {
        let Some(saga) = self.saga.upgrade() else {
            return Vec::new();
        };
        let crosses = saga.crosses.lock();
        crosses
            .iter()
            .filter(|cross| is_mint_maybe_in_pivot(mint.tx_time, cross.pivot_time, cross.cross_time))
            .map(|cross| KnockoutPivotCand {
                pivot_time: cross.pivot_time,
                user: self.user.clone(),
            })
            .collect()
    }

    pub fn is_active_empty(&self) -> bool {
        self.liq.active.conc_liq == 0
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionLiquidity {
    pub conc_liq: u128,
    pub refresh_time: i64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PostKOLiq {
    pub conc_liq: u128,
    pub cross_time: i64,
    pub refresh_time: i64,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct KnockoutLiquiditySeries {
    pub active: PositionLiquidity,
    pub knocked_out: BTreeMap<i64, PostKOLiq>,
}

impl KnockoutLiquiditySeries {
    pub fn update_active_liq(&mut self, liq: u128, refresh_time: i64) {
        self.active.conc_liq = liq;
        self.active.refresh_time = refresh_time;
    }

    pub fn update_post_ko_liq(&mut self, pivot_time: i64, liq: u128, refresh_time: i64) {
        let entry = self.knocked_out.entry(pivot_time).or_default();
        entry.conc_liq = liq;
        entry.refresh_time = refresh_time;
    }

    /// Set the cross time for a pivot. The first recorded cross time sticks.
    pub fn update_ko_cross_liq(&mut self, pivot_time: i64, cross_time: i64) {
        let entry = self.knocked_out.entry(pivot_time).or_default();
        if entry.cross_time == 0 {
            entry.cross_time = cross_time;
        }
    }

    /// Provisional estimate from flows until an on-chain refresh lands.
    ///
    /// A burn that leaves under 10% of its own size is treated as a full
    /// withdrawal. Recover and claim empty both the active quantity and the
    /// claimed pivot.
    pub fn apply_flow_estimate(&mut self, change: &LiqChange, magn: f64) {
        let magn = if magn.is_finite() { magn.max(0.0) } else { 0.0 };
        match change.change_type {
            ChangeType::Mint => {
                self.active.conc_liq = self.active.conc_liq.saturating_add(magn as u128);
            }
            ChangeType::Burn => {
                let after = self.active.conc_liq.saturating_sub(magn as u128);
                self.active.conc_liq = if (after as f64) < magn * 0.10 { 0 } else { after };
            }
            ChangeType::Recover | ChangeType::Claim => {
                self.active.conc_liq = 0;
                if let Some(pivot) = change.pivot_time {
                    self.knocked_out.entry(pivot).or_default().conc_liq = 0;
                }
            }
            _ => {}
        }
    }
}
