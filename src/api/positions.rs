use axum::extract::{Query, State};
use axum::Json;
use serde::Serialize;

use super::params::{PoolQuery, UserQuery};
use super::AppState;
use crate::cache::{KnockoutSet, PositionSet};
use crate::domain::PositionLocation;
use crate::engine::{calc_apr, AprCalcResult, KnockoutLiquiditySeries, PositionTracker};
use crate::error::AppError;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionDto {
    #[serde(flatten)]
    pub loc: PositionLocation,
    #[serde(flatten)]
    pub tracker: PositionTracker,
    #[serde(flatten)]
    pub apr: AprCalcResult,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LimitOrderDto {
    #[serde(flatten)]
    pub loc: PositionLocation,
    pub time_first_mint: i64,
    pub latest_update_time: i64,
    pub liq: KnockoutLiquiditySeries,
}

pub async fn get_user_positions(
    Query(params): Query<UserQuery>,
    State(state): State<AppState>,
) -> Result<Json<Vec<PositionDto>>, AppError> {
    let (chain_id, user) = params.resolve(&state)?;
    let positions = state.cache.retrieve_user_positions(&chain_id, &user);
    Ok(Json(position_dtos(positions, (state.clock)())))
}

pub async fn get_pool_positions(
    Query(params): Query<PoolQuery>,
    State(state): State<AppState>,
) -> Result<Json<Vec<PositionDto>>, AppError> {
    let pool = params.resolve(&state)?;
    let positions = state.cache.retrieve_pool_positions(&pool);
    Ok(Json(position_dtos(positions, (state.clock)())))
}

pub async fn get_user_limit_orders(
    Query(params): Query<UserQuery>,
    State(state): State<AppState>,
) -> Result<Json<Vec<LimitOrderDto>>, AppError> {
    let (chain_id, user) = params.resolve(&state)?;
    let knockouts = state.cache.retrieve_user_knockouts(&chain_id, &user);
    Ok(Json(limit_order_dtos(knockouts)))
}

/// Non-empty positions, most recently updated first.
fn position_dtos(positions: PositionSet, now: i64) -> Vec<PositionDto> {
    let mut dtos: Vec<PositionDto> = positions
        .into_iter()
        .filter_map(|(loc, pos)| {
            let tracker = pos.read().clone();
            if tracker.is_empty() && tracker.refresh_time > 0 {
                return None;
            }
            let apr = calc_apr(&tracker, &loc.liq, now);
            Some(PositionDto { loc, tracker, apr })
        })
        .collect();
    dtos.sort_by(|a, b| {
        b.tracker
            .latest_update_time
            .cmp(&a.tracker.latest_update_time)
            .then_with(|| a.loc.user.cmp(&b.loc.user))
    });
    dtos
}

fn limit_order_dtos(knockouts: KnockoutSet) -> Vec<LimitOrderDto> {
    let mut dtos: Vec<LimitOrderDto> = knockouts
        .into_iter()
        .map(|(loc, sub)| {
            let sub = sub.read();
            LimitOrderDto {
                loc,
                time_first_mint: sub.tracker.time_first_mint,
                latest_update_time: sub.tracker.latest_update_time,
                liq: sub.liq.clone(),
            }
        })
        .collect();
    dtos.sort_by(|a, b| b.latest_update_time.cmp(&a.latest_update_time));
    dtos
}
