//! Per-position liquidity state and the delta history behind APR.

use crate::tables::{ChangeType, LiqChange};
use parking_lot::RwLock;
use serde::Serialize;
use std::sync::Arc;
use tracing::warn;

use super::liquidity_math::{determine_liquidity_magn, MIN_NUMERIC_STABLE_FLOW};

pub type SharedPosition = Arc<RwLock<PositionTracker>>;

/// Derived state of one liquidity position.
///
/// Event fields (`time_first_mint`, `latest_update_time`, `block`) come from
/// ingestion; the liquidity fields are authoritative replacements written by
/// the refresh pipeline from on-chain queries.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionTracker {
    pub time_first_mint: i64,
    pub latest_update_time: i64,
    pub block: i64,
    pub ambient_seeds: u128,
    pub conc_liq: u128,
    pub reward_liq: u128,
    pub has_knocked_out: bool,
    /// Unix time of the last on-chain refresh, zero if never refreshed.
    pub refresh_time: i64,
    #[serde(skip)]
    liq_hist: LiquidityDeltaHist,
}

impl PositionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply an ingested liquidity change. Out-of-order events leave
    /// `latest_update_time` and `block` at the newest event seen.
    pub fn update_position(&mut self, change: &LiqChange) {
        if self.time_first_mint == 0 {
            self.time_first_mint = change.time;
        }
        if change.time >= self.latest_update_time {
            self.latest_update_time = change.time;
            self.block = change.block;
        }
        self.liq_hist.append_change(change);
    }

    pub fn update_ambient(&mut self, seeds: u128, refresh_time: i64) {
        self.ambient_seeds = seeds;
        self.refresh_time = refresh_time;
    }

    pub fn update_range(&mut self, conc_liq: u128, reward_liq: u128, refresh_time: i64) {
        self.conc_liq = conc_liq;
        self.reward_liq = reward_liq;
        self.refresh_time = refresh_time;
    }

    pub fn update_range_rewards(&mut self, reward_liq: u128, refresh_time: i64) {
        self.reward_liq = reward_liq;
        self.refresh_time = refresh_time;
    }

    pub fn update_knockout(&mut self, conc_liq: u128, has_knocked_out: bool, refresh_time: i64) {
        self.conc_liq = conc_liq;
        self.has_knocked_out = has_knocked_out;
        self.refresh_time = refresh_time;
    }

    pub fn is_empty(&self) -> bool {
        self.ambient_seeds == 0 && self.conc_liq == 0 && self.reward_liq == 0
    }

    pub fn is_concentrated(&self) -> bool {
        self.conc_liq > 0
    }

    pub fn liq_hist(&self) -> &LiquidityDeltaHist {
        &self.liq_hist
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LiquidityDelta {
    pub time: i64,
    pub liq_change: f64,
    pub reset_rewards: bool,
}

/// Ordered history of liquidity deltas, used to estimate how long capital
/// has been deposited for the APR calculation.
#[derive(Debug, Clone, Default)]
pub struct LiquidityDeltaHist {
    hist: Vec<LiquidityDelta>,
}

impl LiquidityDeltaHist {
    pub fn entries(&self) -> &[LiquidityDelta] {
        &self.hist
    }

    /// Harvest appends a reward reset marker. Mint and burn both append the
    /// negated flow magnitude.
    pub fn append_change(&mut self, change: &LiqChange) {
        if let Some(last) = self.hist.last() {
            if change.time < last.time {
                warn!(
                    id = %change.id,
                    last = last.time,
                    time = change.time,
                    "Liquidity delta history backward time step, skipping"
                );
                return;
            }
        }

        match change.change_type {
            ChangeType::Harvest => self.hist.push(LiquidityDelta {
                time: change.time,
                liq_change: 0.0,
                reset_rewards: true,
            }),
            ChangeType::Mint | ChangeType::Burn => self.hist.push(LiquidityDelta {
                time: change.time,
                liq_change: -determine_liquidity_magn(change),
                reset_rewards: false,
            }),
            _ => {}
        }
    }

    /// Net liquidity contributed, zero when under the noise threshold.
    pub fn net_cumulative_liquidity(&self) -> f64 {
        let total: f64 = self.hist.iter().map(|d| d.liq_change).sum();
        if total < MIN_NUMERIC_STABLE_FLOW {
            0.0
        } else {
            total
        }
    }

    /// Liquidity-weighted open time of the capital currently deposited.
    pub fn weighted_average_time(&self) -> i64 {
        let mut open_liq = 0.0;
        let mut open_time = 0.0;

        for delta in &self.hist {
            if delta.reset_rewards {
                open_time = delta.time as f64;
            }

            if delta.liq_change < 0.0 {
                open_liq += delta.liq_change;
                if open_liq < MIN_NUMERIC_STABLE_FLOW {
                    open_liq = 0.0;
                }
            }

            if delta.liq_change > 0.0 {
                let weight = open_liq / (open_liq + delta.liq_change);
                open_time = open_time * weight + delta.time as f64 * (1.0 - weight);
            }

            if delta.liq_change == 0.0 && open_liq == 0.0 {
                open_time = delta.time as f64;
            }
        }
        open_time as i64
    }

    pub fn weighted_average_duration(&self, now: i64) -> f64 {
        (now - self.weighted_average_time()) as f64
    }
}
