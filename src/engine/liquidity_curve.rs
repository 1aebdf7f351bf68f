//! Per-pool liquidity curve: ambient liquidity plus tick bumps.

use super::liquidity_math::determine_liquidity_magn;
use crate::tables::{ChangeType, LiqChange, PositionType};
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LiquidityCurve {
    pub ambient_liq: f64,
    pub bumps: BTreeMap<i32, LiquidityBump>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LiquidityBump {
    #[serde(rename = "bumpTick")]
    pub tick: i32,
    pub liquidity_delta: f64,
    pub knockout_bid_liq: f64,
    pub knockout_ask_liq: f64,
    pub knockout_bid_width: i32,
    pub knockout_ask_width: i32,
    pub latest_update_time: i64,
}

impl LiquidityCurve {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply a liquidity change to the curve.
    ///
    /// # Panics
    /// Panics if a touched bump would step backward in time.
    pub fn update_liq_change(&mut self, change: &LiqChange) {
        match change.change_type {
            ChangeType::Mint | ChangeType::Burn => {
                let mut magn = determine_liquidity_magn(change);
                if change.change_type == ChangeType::Burn {
                    magn = -magn;
                }
                if change.position_type == PositionType::Ambient {
                    self.ambient_liq += magn;
                } else {
                    self.update_user_liq(change, magn);
                }
            }
            ChangeType::Cross => self.update_ko_cross(change),
            _ => {}
        }
    }

    fn update_user_liq(&mut self, change: &LiqChange, magn: f64) {
        self.materialize_bump(change.bid_tick)
            .incr_liquidity(magn, change.time);
        self.materialize_bump(change.ask_tick)
            .incr_liquidity(-magn, change.time);

        if change.position_type == PositionType::Knockout {
            if change.is_bid {
                self.materialize_bump(change.bid_tick)
                    .incr_ko_bid(magn, change.ask_tick);
            } else {
                self.materialize_bump(change.ask_tick)
                    .incr_ko_ask(-magn, change.bid_tick);
            }
        }
    }

    fn update_ko_cross(&mut self, change: &LiqChange) {
        if change.is_bid {
            let (ko_liq, join_tick) = self
                .materialize_bump(change.bid_tick)
                .knockout_bid(change.time);
            self.materialize_bump(join_tick)
                .incr_liquidity(ko_liq, change.time);
        } else {
            let (ko_liq, join_tick) = self
                .materialize_bump(change.ask_tick)
                .knockout_ask(change.time);
            self.materialize_bump(join_tick)
                .incr_liquidity(ko_liq, change.time);
        }
    }

    fn materialize_bump(&mut self, tick: i32) -> &mut LiquidityBump {
        self.bumps.entry(tick).or_insert_with(|| LiquidityBump {
            tick,
            ..Default::default()
        })
    }

    pub fn total_bump_delta(&self) -> f64 {
        self.bumps.values().map(|b| b.liquidity_delta).sum()
    }
}

impl LiquidityBump {
    pub fn incr_liquidity(&mut self, delta: f64, time: i64) {
        self.update_time(time);
        self.liquidity_delta += delta;
    }

    pub fn incr_ko_bid(&mut self, delta: f64, join_tick: i32) {
        self.knockout_bid_liq += delta;
        self.knockout_bid_width = join_tick - self.tick;
    }

    pub fn incr_ko_ask(&mut self, delta: f64, join_tick: i32) {
        self.knockout_ask_liq += delta;
        self.knockout_ask_width = self.tick - join_tick;
    }

    /// Remove the bid knockout liquidity here, returning it and the join tick
    /// where it must be re-added.
    pub fn knockout_bid(&mut self, time: i64) -> (f64, i32) {
        self.update_time(time);
        let ko_liq = self.knockout_bid_liq;
        self.liquidity_delta -= ko_liq;
        let join_tick = self.tick + self.knockout_bid_width;
        self.knockout_bid_liq = 0.0;
        self.knockout_bid_width = 0;
        (ko_liq, join_tick)
    }

    pub fn knockout_ask(&mut self, time: i64) -> (f64, i32) {
        self.update_time(time);
        let ko_liq = self.knockout_ask_liq;
        self.liquidity_delta -= ko_liq;
        let join_tick = self.tick - self.knockout_ask_width;
        self.knockout_ask_liq = 0.0;
        self.knockout_ask_width = 0;
        (ko_liq, join_tick)
    }

    fn update_time(&mut self, time: i64) {
        if time < self.latest_update_time {
            panic!(
                "Liquidity curve updated out of time order at tick {}: {} -> {}",
                self.tick, self.latest_update_time, time
            );
        }
        self.latest_update_time = time;
    }
}
