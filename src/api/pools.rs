use axum::extract::{Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use super::params::{parse_chain_id, PoolQuery};
use super::AppState;
use crate::domain::{EthAddress, PoolLocation};
use crate::engine::{Candle, LiquidityBump};
use crate::error::AppError;

pub const MAX_CANDLES: i64 = 3000;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LiqCurveResponse {
    pub ambient_liq: f64,
    pub liquidity_bumps: Vec<LiquidityBump>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CandlesQuery {
    pub chain_id: String,
    pub base: String,
    pub quote: String,
    pub pool_idx: u64,
    pub period: i64,
    pub n: i64,
    /// End of the series, defaults to now.
    pub time: Option<i64>,
}

pub async fn get_pool_liq_curve(
    Query(params): Query<PoolQuery>,
    State(state): State<AppState>,
) -> Result<Json<LiqCurveResponse>, AppError> {
    let pool = params.resolve(&state)?;
    let curve = state
        .cache
        .retrieve_pool_liq_curve(&pool)
        .ok_or_else(|| AppError::NotFound("No liquidity curve for pool".into()))?;
    let curve = curve.read();
    Ok(Json(LiqCurveResponse {
        ambient_liq: curve.ambient_liq,
        liquidity_bumps: curve.bumps.values().cloned().collect(),
    }))
}

pub async fn get_pool_candles(
    Query(params): Query<CandlesQuery>,
    State(state): State<AppState>,
) -> Result<Json<Vec<Candle>>, AppError> {
    if params.period <= 0 {
        return Err(AppError::BadRequest("period must be positive".into()));
    }
    if params.n <= 0 || params.n > MAX_CANDLES {
        return Err(AppError::BadRequest(format!(
            "n must be between 1 and {}",
            MAX_CANDLES
        )));
    }

    let (pool, _) = PoolLocation::canonical(
        parse_chain_id(&state, &params.chain_id)?,
        EthAddress::parse(&params.base)?,
        EthAddress::parse(&params.quote)?,
        params.pool_idx,
    );
    let hist = state
        .cache
        .retrieve_pool_trading_hist(&pool)
        .ok_or_else(|| AppError::NotFound("No trading history for pool".into()))?;

    let end = params.time.unwrap_or_else(|| (state.clock)());
    let start = end - params.period * params.n;
    let candles = hist.read().candles(params.period, start, end);
    Ok(Json(candles))
}
