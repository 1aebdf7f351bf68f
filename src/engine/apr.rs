//! Annualised return estimate for a position.

use super::liquidity_math::est_liq_amplification;
use super::position_tracker::PositionTracker;
use crate::domain::LiquidityLocation;
use serde::Serialize;

pub const MAX_APR_CAP: f64 = 10.0;

const SECS_PER_YEAR: f64 = 3600.0 * 24.0 * 365.0;

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AprCalcResult {
    #[serde(rename = "aprDuration")]
    pub duration: f64,
    #[serde(rename = "aprPostLiq")]
    pub post_liq: f64,
    #[serde(rename = "aprContributedLiq")]
    pub contributed_liq: f64,
    #[serde(rename = "aprEst")]
    pub apr: f64,
}

pub fn calc_apr(pos: &PositionTracker, loc: &LiquidityLocation, now: i64) -> AprCalcResult {
    if pos.is_empty() {
        return AprCalcResult::default();
    }

    let (numerator, denom) = if pos.is_concentrated() {
        let ampl = est_liq_amplification(loc.bid_tick, loc.ask_tick);
        (
            ampl * pos.reward_liq as f64 + pos.conc_liq as f64,
            pos.conc_liq as f64,
        )
    } else {
        (
            pos.ambient_seeds as f64,
            pos.liq_hist().net_cumulative_liquidity(),
        )
    };
    let duration = pos.liq_hist().weighted_average_duration(now);

    AprCalcResult {
        duration,
        post_liq: numerator,
        contributed_liq: denom,
        apr: normalize_apr(numerator, denom, duration),
    }
}

fn normalize_apr(num: f64, denom: f64, duration: f64) -> f64 {
    if denom <= 0.0 || duration <= 0.0 {
        return 0.0;
    }
    let growth = num / denom;
    let years = duration / SECS_PER_YEAR;
    let compounded = growth.powf(1.0 / years) - 1.0;

    if compounded.is_nan() || compounded < 0.0 {
        0.0
    } else {
        compounded.min(MAX_APR_CAP)
    }
}
